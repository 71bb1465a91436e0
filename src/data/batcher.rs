// ============================================================
// Layer 4: Embedding Pair Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<EmbeddingPair>
// into tensors:
//
//   Input:  N EmbeddingPairs, each with d_model floats per side
//   Output: source/target [N, d_model]
//
// Word strings and token ids stay on the EmbeddingPair; the
// evaluator reads them from there, not from the batch.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::EmbeddingPair;

#[derive(Debug, Clone)]
pub struct EmbeddingBatch<B: Backend> {
    /// Source-language embeddings, [batch_size, d_model]
    pub source: Tensor<B, 2>,

    /// Target-language embeddings, [batch_size, d_model]
    pub target: Tensor<B, 2>,
}

#[derive(Clone, Debug)]
pub struct EmbeddingBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> EmbeddingBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<EmbeddingPair, EmbeddingBatch<B>> for EmbeddingBatcher<B> {
    fn batch(&self, items: Vec<EmbeddingPair>) -> EmbeddingBatch<B> {
        let batch_size = items.len();
        let d_model    = items.first().map(|p| p.d_model()).unwrap_or(0);

        let source_flat: Vec<f32> = items.iter().flat_map(|p| p.source.iter().copied()).collect();
        let target_flat: Vec<f32> = items.iter().flat_map(|p| p.target.iter().copied()).collect();

        let source = Tensor::<B, 2>::from_data(
            TensorData::new(source_flat, [batch_size, d_model]), &self.device,
        );
        let target = Tensor::<B, 2>::from_data(
            TensorData::new(target_flat, [batch_size, d_model]), &self.device,
        );

        EmbeddingBatch { source, target }
    }
}
