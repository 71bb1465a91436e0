// ============================================================
// Layer 5: Evaluator
// ============================================================
// Scores a fitted transform on the held-out pairs:
//
//   prediction = transform(source)
//   nearest    = argmax_v cos(prediction, table[v])   (whole table)
//   correct    = decode(nearest) matches target
//
// The table is L2-normalised once so one matmul gives the cosine
// against every row. Matching is exact, or trimmed and case-folded
// when `exact_match` is off.
//
// The same scoring runs on the train split (SplitMetrics) so a run
// reports how well the map fits the pairs it was fitted on.

use anyhow::{anyhow, Result};
use burn::{data::dataloader::batcher::Batcher, prelude::*};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::data::{batcher::EmbeddingBatcher, dataset::EmbeddingPair, loader::MarkTranslations};
use crate::domain::{embedding_table::EmbeddingTable, kinds::LossKind, traits::Vocabulary};
use crate::ml::{
    linalg::{determinant, orthogonality_error},
    loss::EmbeddingLoss,
    trainer::mean_loss,
    transforms::EmbeddingTransform,
};

const NORM_EPS: f64 = 1e-8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub n_test:               usize,
    pub test_accuracy:        f64,
    pub mark_translation_acc: Option<f64>,
    pub cos_sim_test_loss:    f64,
    pub mse_test_loss:        f64,
    pub pred_same_as_input:   f64,
}

/// Accuracy and losses of a transform on one split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitMetrics {
    pub n_pairs:      usize,
    pub accuracy:     f64,
    pub cos_sim_loss: f64,
    pub mse_loss:     f64,
}

/// Geometry of a transform's linear part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixDiagnostics {
    pub determinant:         f64,
    pub orthogonality_error: f64,
}

impl MatrixDiagnostics {
    pub fn of(matrix: &DMatrix<f64>) -> Self {
        Self {
            determinant:         determinant(matrix),
            orthogonality_error: orthogonality_error(matrix),
        }
    }
}

/// Predicted token for one test pair.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub token_id: u32,
    pub text:     String,
}

pub fn is_match(predicted: &str, expected: &str, exact_match: bool) -> bool {
    if exact_match {
        predicted == expected
    } else {
        predicted.trim().to_lowercase() == expected.trim().to_lowercase()
    }
}

pub struct Evaluator<'a, B: Backend> {
    normalized_table: Tensor<B, 2>,
    vocab:            &'a dyn Vocabulary,
    exact_match:      bool,
    batch_size:       usize,
    device:           B::Device,
}

impl<'a, B: Backend> Evaluator<'a, B> {
    pub fn new(
        table:       &EmbeddingTable,
        vocab:       &'a dyn Vocabulary,
        exact_match: bool,
        batch_size:  usize,
        device:      &B::Device,
    ) -> Self {
        let values = Tensor::<B, 2>::from_data(
            TensorData::new(table.values().to_vec(), [table.vocab_size(), table.d_model()]),
            device,
        );
        Self {
            normalized_table: normalize_rows(values),
            vocab,
            exact_match,
            batch_size: batch_size.max(1),
            device: device.clone(),
        }
    }

    /// Nearest table row (by cosine) to each transformed source.
    pub fn predict<M: EmbeddingTransform<B>>(
        &self,
        model: &M,
        pairs: &[EmbeddingPair],
    ) -> Result<Vec<Prediction>> {
        let batcher = EmbeddingBatcher::<B>::new(self.device.clone());
        let mut predictions = Vec::with_capacity(pairs.len());

        for chunk in pairs.chunks(self.batch_size) {
            let batch = batcher.batch(chunk.to_vec());
            let pred = normalize_rows(model.forward(batch.source));
            let sims = pred.matmul(self.normalized_table.clone().transpose());
            let ids: Vec<i64> = sims
                .argmax(1)
                .into_data()
                .convert::<i64>()
                .to_vec::<i64>()
                .map_err(|e| anyhow!("cannot read predicted ids: {e:?}"))?;

            for id in ids {
                let token_id = u32::try_from(id)?;
                let text = self.vocab.token_text(token_id)?;
                predictions.push(Prediction { token_id, text });
            }
        }
        Ok(predictions)
    }

    pub fn evaluate<M: EmbeddingTransform<B>>(
        &self,
        model: &M,
        test:  &[EmbeddingPair],
        marks: Option<&MarkTranslations>,
    ) -> Result<EvalReport> {
        let predictions = self.predict(model, test)?;
        let scores = self.score(model, test, &predictions);

        let same_as_input = test
            .iter()
            .zip(&predictions)
            .filter(|(p, pred)| pred.token_id == p.source_id)
            .count();

        let report = EvalReport {
            n_test:               scores.n_pairs,
            test_accuracy:        scores.accuracy,
            mark_translation_acc: marks.and_then(|m| mark_accuracy(test, &predictions, m)),
            cos_sim_test_loss:    scores.cos_sim_loss,
            mse_test_loss:        scores.mse_loss,
            pred_same_as_input:   fraction(same_as_input, test.len()),
        };
        tracing::info!(
            "Test accuracy {:.4} over {} pairs (pred_same_as_input {:.4})",
            report.test_accuracy, report.n_test, report.pred_same_as_input,
        );
        Ok(report)
    }

    /// Accuracy and losses on any split, e.g. the training pairs.
    pub fn split_metrics<M: EmbeddingTransform<B>>(
        &self,
        model: &M,
        pairs: &[EmbeddingPair],
    ) -> Result<SplitMetrics> {
        let predictions = self.predict(model, pairs)?;
        Ok(self.score(model, pairs, &predictions))
    }

    fn score<M: EmbeddingTransform<B>>(
        &self,
        model:       &M,
        pairs:       &[EmbeddingPair],
        predictions: &[Prediction],
    ) -> SplitMetrics {
        let correct = pairs
            .iter()
            .zip(predictions)
            .filter(|(p, pred)| is_match(&pred.text, &p.pair.target, self.exact_match))
            .count();
        let cos_loss = EmbeddingLoss::new(LossKind::CosSim);
        let mse_loss = EmbeddingLoss::new(LossKind::Mse);

        SplitMetrics {
            n_pairs:      pairs.len(),
            accuracy:     fraction(correct, pairs.len()),
            cos_sim_loss: mean_loss::<B, _>(model, pairs, &cos_loss, self.batch_size, &self.device),
            mse_loss:     mean_loss::<B, _>(model, pairs, &mse_loss, self.batch_size, &self.device),
        }
    }
}

/// Fraction of scored sources whose prediction is an accepted translation.
/// Sources missing from the reference are skipped; None if none were scored.
fn mark_accuracy(
    test:        &[EmbeddingPair],
    predictions: &[Prediction],
    marks:       &MarkTranslations,
) -> Option<f64> {
    let mut scored = 0usize;
    let mut correct = 0usize;
    for (pair, pred) in test.iter().zip(predictions) {
        let source = pair.pair.source.trim();
        let Some(accepted) = marks.get(source) else {
            tracing::debug!("No reference translations for '{}', skipping", source);
            continue;
        };
        scored += 1;
        let guess = pred.text.trim().to_lowercase();
        if accepted.iter().any(|a| a.trim().to_lowercase() == guess) {
            correct += 1;
        }
    }
    if scored < test.len() {
        tracing::warn!("{} of {} test sources have no reference translations", test.len() - scored, test.len());
    }
    (scored > 0).then(|| fraction(correct, scored))
}

fn normalize_rows<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let norm = x.clone().powf_scalar(2.0).sum_dim(1).sqrt().clamp_min(NORM_EPS);
    x / norm
}

fn fraction(count: usize, total: usize) -> f64 {
    if total == 0 { f64::NAN } else { count as f64 / total as f64 }
}
