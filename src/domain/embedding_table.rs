// ============================================================
// Layer 3: EmbeddingTable Domain Type
// ============================================================
// The frozen input-embedding matrix of a pretrained model,
// [vocab_size, d_model] in row-major order. Row i is the
// embedding of token id i. Immutable once loaded.

use anyhow::{bail, Result};

#[derive(Debug, Clone)]
pub struct EmbeddingTable {
    values:     Vec<f32>,
    vocab_size: usize,
    d_model:    usize,
}

impl EmbeddingTable {
    pub fn new(values: Vec<f32>, vocab_size: usize, d_model: usize) -> Result<Self> {
        if values.len() != vocab_size * d_model {
            bail!(
                "embedding table has {} values, expected {} x {} = {}",
                values.len(), vocab_size, d_model, vocab_size * d_model
            );
        }
        Ok(Self { values, vocab_size, d_model })
    }

    pub fn vocab_size(&self) -> usize { self.vocab_size }

    pub fn d_model(&self) -> usize { self.d_model }

    pub fn values(&self) -> &[f32] { &self.values }

    /// Embedding of one token, or None if the id is outside the table.
    pub fn row(&self, id: u32) -> Option<&[f32]> {
        let id = id as usize;
        if id >= self.vocab_size {
            return None;
        }
        Some(&self.values[id * self.d_model..(id + 1) * self.d_model])
    }
}
