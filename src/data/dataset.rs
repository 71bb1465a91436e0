use anyhow::{anyhow, Result};
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::data::filter::TokenizedPair;
use crate::domain::embedding_table::EmbeddingTable;
use crate::domain::word_pair::WordPair;

/// One aligned training example: the two token ids, their embedding
/// rows, and the strings they came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingPair {
    pub pair:      WordPair,
    pub source_id: u32,
    pub target_id: u32,
    pub source:    Vec<f32>,
    pub target:    Vec<f32>,
}

impl EmbeddingPair {
    pub fn d_model(&self) -> usize {
        self.source.len()
    }
}

/// Look up the embedding rows of every tokenised pair.
///
/// With `embed_ln` each row is normalised to zero mean and unit
/// variance, matching what the transforms' `apply_ln` does to outputs.
pub fn embed_pairs(
    pairs:    &[TokenizedPair],
    table:    &EmbeddingTable,
    embed_ln: bool,
) -> Result<Vec<EmbeddingPair>> {
    pairs
        .iter()
        .map(|p| {
            let lookup = |id: u32| {
                table
                    .row(id)
                    .map(|r| if embed_ln { normalize(r) } else { r.to_vec() })
                    .ok_or_else(|| anyhow!("token id {id} outside embedding table ({} rows)", table.vocab_size()))
            };
            Ok(EmbeddingPair {
                pair:      p.pair.clone(),
                source_id: p.source_id,
                target_id: p.target_id,
                source:    lookup(p.source_id)?,
                target:    lookup(p.target_id)?,
            })
        })
        .collect()
}

fn normalize(row: &[f32]) -> Vec<f32> {
    let n = row.len() as f32;
    let mean = row.iter().sum::<f32>() / n;
    let var = row.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    let denom = (var + crate::ml::transforms::LN_EPS as f32).sqrt();
    row.iter().map(|v| (v - mean) / denom).collect()
}

pub struct EmbeddingPairDataset {
    samples: Vec<EmbeddingPair>,
}

impl EmbeddingPairDataset {
    pub fn new(samples: Vec<EmbeddingPair>) -> Self { Self { samples } }
}

impl Dataset<EmbeddingPair> for EmbeddingPairDataset {
    fn get(&self, index: usize) -> Option<EmbeddingPair> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> EmbeddingTable {
        EmbeddingTable::new(vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0], 2, 3).unwrap()
    }

    fn tokenized(source_id: u32, target_id: u32) -> TokenizedPair {
        TokenizedPair { pair: WordPair::new(" a", " b"), source_id, target_id }
    }

    #[test]
    fn test_embed_pairs_looks_up_rows() {
        let pairs = embed_pairs(&[tokenized(0, 1)], &table(), false).unwrap();
        assert_eq!(pairs[0].source, vec![1.0, 2.0, 3.0]);
        assert_eq!(pairs[0].target, vec![10.0, 20.0, 30.0]);
        assert_eq!(pairs[0].d_model(), 3);
    }

    #[test]
    fn test_embed_ln_normalises_rows() {
        let pairs = embed_pairs(&[tokenized(1, 0)], &table(), true).unwrap();
        let mean: f32 = pairs[0].source.iter().sum::<f32>() / 3.0;
        assert!(mean.abs() < 1e-6);
        // both rows are affine copies of each other, so they normalise identically
        for (a, b) in pairs[0].source.iter().zip(&pairs[0].target) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_out_of_range_id_is_an_error() {
        assert!(embed_pairs(&[tokenized(0, 7)], &table(), false).is_err());
    }
}
