// ============================================================
// Layer 6: Embedding Store
// ============================================================
// Reads a pretrained model's input-embedding matrix out of a
// `.safetensors` checkpoint. Only the one named tensor is
// decoded; the rest of the checkpoint is never touched.
//
// Common tensor names:
//   bloom   → "word_embeddings.weight"
//   gpt2    → "wte.weight"
//   llama   → "model.embed_tokens.weight"
//
// Only f32 tensors are accepted. Half-precision checkpoints
// must be converted first.
//
// Reference: safetensors format documentation

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use safetensors::{tensor::Dtype, SafeTensors};

use crate::domain::embedding_table::EmbeddingTable;

pub fn load_embedding_table(path: &Path, tensor_name: &str) -> Result<EmbeddingTable> {
    let bytes = fs::read(path)
        .with_context(|| format!("Cannot read embeddings from '{}'", path.display()))?;
    let tensors = SafeTensors::deserialize(&bytes)
        .with_context(|| format!("'{}' is not a safetensors file", path.display()))?;

    let view = tensors.tensor(tensor_name).with_context(|| {
        let mut names = tensors.names();
        names.sort();
        format!("No tensor '{}' in '{}'. Available: {:?}", tensor_name, path.display(), names)
    })?;

    if view.dtype() != Dtype::F32 {
        bail!("Tensor '{}' has dtype {:?}, expected F32", tensor_name, view.dtype());
    }
    let [vocab_size, d_model] = view.shape() else {
        bail!("Tensor '{}' has shape {:?}, expected [vocab, d_model]", tensor_name, view.shape());
    };

    let values = f32_from_le_bytes(view.data());
    tracing::info!(
        "Loaded embedding table '{}': {} tokens x {} dims",
        tensor_name, vocab_size, d_model
    );
    EmbeddingTable::new(values, *vocab_size, *d_model)
}

pub(crate) fn f32_from_le_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub(crate) fn f32_to_le_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}
