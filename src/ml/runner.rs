// ============================================================
// Layer 5: Experiment Runner
// ============================================================
// The one place that maps a TransformKind onto a concrete module.
// Every arm ends in one of two generic paths:
//
//   trainable   fit on B (autodiff) → .valid() → evaluate → save
//   fixed       build on B::InnerBackend       → evaluate → save
//
// so each family is monomorphised once and the rest of the crate
// never matches on the kind.

use anyhow::Result;
use burn::{
    module::AutodiffModule,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use nalgebra::DMatrix;

use crate::data::{dataset::EmbeddingPair, loader::MarkTranslations};
use crate::domain::{embedding_table::EmbeddingTable, kinds::TransformKind, traits::Vocabulary};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{
    analytical::{least_squares_map, mean_difference, procrustes, DEFAULT_RIDGE},
    evaluator::{EvalReport, Evaluator, MatrixDiagnostics, SplitMetrics},
    linalg::{matrix_to_tensor, tensor_to_matrix, vector_to_tensor},
    trainer::{fit, FitConfig},
    transforms::{EmbeddingTransform, TransformConfig},
};

/// What to build and how to fit it.
#[derive(Debug, Clone)]
pub struct ExperimentSpec {
    pub kind:        TransformKind,
    pub transform:   TransformConfig,
    pub fit:         FitConfig,
    pub exact_match: bool,
}

/// Everything a run reads but never changes.
pub struct ExperimentInputs<'a> {
    pub train: &'a [EmbeddingPair],
    pub test:  &'a [EmbeddingPair],
    pub table: &'a EmbeddingTable,
    pub vocab: &'a dyn Vocabulary,
    pub marks: Option<&'a MarkTranslations>,
}

#[derive(Debug, Clone)]
pub struct ExperimentOutcome {
    pub history:       Vec<EpochMetrics>,
    pub report:        EvalReport,
    pub train_metrics: SplitMetrics,
    pub diagnostics:   Option<MatrixDiagnostics>,
}

pub fn run_experiment<B: AutodiffBackend>(
    spec:    &ExperimentSpec,
    inputs:  &ExperimentInputs<'_>,
    ckpt:    &CheckpointManager,
    metrics: Option<&MetricsLogger>,
    device:  &B::Device,
) -> Result<ExperimentOutcome> {
    B::seed(spec.fit.seed);
    let cfg = &spec.transform;
    let how = if spec.kind.is_analytical() {
        "closed form from the train split"
    } else if spec.kind.is_trainable() {
        "gradient descent"
    } else {
        "fixed"
    };
    tracing::info!("Building '{}' transform (d_model={}, {})", spec.kind, cfg.d_model, how);

    match spec.kind {
        TransformKind::LinearMap => {
            train_then_finish::<B, _>(cfg.init_linear::<B>(false, false, device), spec, inputs, ckpt, metrics, device)
        }
        TransformKind::BiasedLinearMap => {
            train_then_finish::<B, _>(cfg.init_linear::<B>(true, false, device), spec, inputs, ckpt, metrics, device)
        }
        TransformKind::UncenteredLinearMap => {
            train_then_finish::<B, _>(cfg.init_linear::<B>(false, true, device), spec, inputs, ckpt, metrics, device)
        }
        TransformKind::BiasedUncenteredLinearMap => {
            train_then_finish::<B, _>(cfg.init_linear::<B>(true, true, device), spec, inputs, ckpt, metrics, device)
        }
        TransformKind::Translation => {
            train_then_finish::<B, _>(cfg.init_translation::<B>(device), spec, inputs, ckpt, metrics, device)
        }
        TransformKind::Rotation => {
            train_then_finish::<B, _>(cfg.init_rotation::<B>(false, false, device)?, spec, inputs, ckpt, metrics, device)
        }
        TransformKind::BiasedRotation => {
            train_then_finish::<B, _>(cfg.init_rotation::<B>(true, false, device)?, spec, inputs, ckpt, metrics, device)
        }
        TransformKind::UncenteredRotation => {
            train_then_finish::<B, _>(cfg.init_rotation::<B>(false, true, device)?, spec, inputs, ckpt, metrics, device)
        }

        // Fixed kinds never touch autodiff
        TransformKind::Identity => {
            finish::<B::InnerBackend, _>(&cfg.init_identity(), Vec::new(), spec, inputs, ckpt, device)
        }
        TransformKind::MeanTranslation | TransformKind::AnalyticalTranslation => {
            let offset = vector_to_tensor::<B::InnerBackend>(&mean_difference(inputs.train)?, device);
            finish::<B::InnerBackend, _>(&cfg.init_mat_add(offset), Vec::new(), spec, inputs, ckpt, device)
        }
        TransformKind::AnalyticalLinearMap => {
            let w = least_squares_map(inputs.train, DEFAULT_RIDGE)?;
            let matrix = matrix_to_tensor::<B::InnerBackend>(&w, device);
            finish::<B::InnerBackend, _>(&cfg.init_mat_mul(matrix), Vec::new(), spec, inputs, ckpt, device)
        }
        TransformKind::AnalyticalRotation => {
            let (r, t) = procrustes(inputs.train)?;
            let model = cfg.init_rotate_translate(
                matrix_to_tensor::<B::InnerBackend>(&r, device),
                vector_to_tensor::<B::InnerBackend>(&t, device),
            );
            finish::<B::InnerBackend, _>(&model, Vec::new(), spec, inputs, ckpt, device)
        }
    }
}

fn train_then_finish<B, M>(
    model:   M,
    spec:    &ExperimentSpec,
    inputs:  &ExperimentInputs<'_>,
    ckpt:    &CheckpointManager,
    metrics: Option<&MetricsLogger>,
    device:  &B::Device,
) -> Result<ExperimentOutcome>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + EmbeddingTransform<B>,
    M::InnerModule: EmbeddingTransform<B::InnerBackend>,
{
    tracing::info!(
        "Training on {} pairs ({} held out) for {} epochs",
        inputs.train.len(), inputs.test.len(), spec.fit.epochs,
    );
    let (model, history) = fit::<B, _>(model, inputs.train, inputs.test, &spec.fit, metrics, device)?;
    finish(&model.valid(), history, spec, inputs, ckpt, device)
}

fn finish<B, M>(
    model:   &M,
    history: Vec<EpochMetrics>,
    spec:    &ExperimentSpec,
    inputs:  &ExperimentInputs<'_>,
    ckpt:    &CheckpointManager,
    device:  &B::Device,
) -> Result<ExperimentOutcome>
where
    B: Backend,
    M: Module<B> + EmbeddingTransform<B>,
{
    let evaluator = evaluator_for::<B>(spec, inputs, device);
    let (report, diagnostics) = evaluate_model(model, &evaluator, inputs)?;

    let train_metrics = evaluator.split_metrics(model, inputs.train)?;
    tracing::info!(
        "Train accuracy {:.4} over {} pairs (cos_sim loss {:.4})",
        train_metrics.accuracy, train_metrics.n_pairs, train_metrics.cos_sim_loss,
    );

    ckpt.save_transform(model)?;
    Ok(ExperimentOutcome { history, report, train_metrics, diagnostics })
}

fn evaluator_for<'a, B: Backend>(
    spec:   &ExperimentSpec,
    inputs: &ExperimentInputs<'a>,
    device: &B::Device,
) -> Evaluator<'a, B> {
    Evaluator::new(inputs.table, inputs.vocab, spec.exact_match, spec.fit.test_batch_size, device)
}

fn evaluate_model<B, M>(
    model:     &M,
    evaluator: &Evaluator<'_, B>,
    inputs:    &ExperimentInputs<'_>,
) -> Result<(EvalReport, Option<MatrixDiagnostics>)>
where
    B: Backend,
    M: EmbeddingTransform<B>,
{
    let report = evaluator.evaluate(model, inputs.test, inputs.marks)?;

    let diagnostics = match model.linear_part() {
        Some(matrix) => {
            let d = MatrixDiagnostics::of(&tensor_to_matrix(matrix)?);
            tracing::info!(
                "Linear part: det={:.4}, orthogonality error={:.2e}",
                d.determinant, d.orthogonality_error,
            );
            Some(d)
        }
        None => None,
    };
    Ok((report, diagnostics))
}

/// Rebuild a saved transform from its run directory and score it again.
/// The skeleton only fixes the record layout; every value comes from disk.
pub fn reevaluate<B: Backend>(
    spec:   &ExperimentSpec,
    inputs: &ExperimentInputs<'_>,
    ckpt:   &CheckpointManager,
    device: &B::Device,
) -> Result<(EvalReport, Option<MatrixDiagnostics>)> {
    let cfg = &spec.transform;
    let d = cfg.d_model;
    let eye = DMatrix::<f64>::identity(d, d);

    match spec.kind {
        TransformKind::Identity => load_and_score::<B, _>(cfg.init_identity(), spec, inputs, ckpt, device),
        TransformKind::LinearMap => load_and_score::<B, _>(cfg.init_linear::<B>(false, false, device), spec, inputs, ckpt, device),
        TransformKind::BiasedLinearMap => load_and_score::<B, _>(cfg.init_linear::<B>(true, false, device), spec, inputs, ckpt, device),
        TransformKind::UncenteredLinearMap => load_and_score::<B, _>(cfg.init_linear::<B>(false, true, device), spec, inputs, ckpt, device),
        TransformKind::BiasedUncenteredLinearMap => load_and_score::<B, _>(cfg.init_linear::<B>(true, true, device), spec, inputs, ckpt, device),
        TransformKind::Translation => load_and_score::<B, _>(cfg.init_translation::<B>(device), spec, inputs, ckpt, device),
        TransformKind::Rotation => load_and_score::<B, _>(cfg.init_rotation_with_base::<B>(&eye, false, false, device), spec, inputs, ckpt, device),
        TransformKind::BiasedRotation => load_and_score::<B, _>(cfg.init_rotation_with_base::<B>(&eye, true, false, device), spec, inputs, ckpt, device),
        TransformKind::UncenteredRotation => load_and_score::<B, _>(cfg.init_rotation_with_base::<B>(&eye, false, true, device), spec, inputs, ckpt, device),
        TransformKind::MeanTranslation | TransformKind::AnalyticalTranslation => {
            load_and_score::<B, _>(cfg.init_mat_add(Tensor::<B, 1>::zeros([d], device)), spec, inputs, ckpt, device)
        }
        TransformKind::AnalyticalLinearMap => {
            load_and_score::<B, _>(cfg.init_mat_mul(Tensor::<B, 2>::zeros([d, d], device)), spec, inputs, ckpt, device)
        }
        TransformKind::AnalyticalRotation => load_and_score::<B, _>(cfg.init_rotate_translate(
            Tensor::<B, 2>::zeros([d, d], device),
            Tensor::<B, 1>::zeros([d], device),
        ), spec, inputs, ckpt, device),
    }
}

fn load_and_score<B, M>(
    skeleton: M,
    spec:     &ExperimentSpec,
    inputs:   &ExperimentInputs<'_>,
    ckpt:     &CheckpointManager,
    device:   &B::Device,
) -> Result<(EvalReport, Option<MatrixDiagnostics>)>
where
    B: Backend,
    M: Module<B> + EmbeddingTransform<B>,
{
    let model = ckpt.load_transform::<B, _>(skeleton, device)?;
    evaluate_model(&model, &evaluator_for::<B>(spec, inputs, device), inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{kinds::LossKind, traits::test_support::InMemoryVocabulary, word_pair::WordPair};
    use crate::ml::loss::EmbeddingLoss;
    use burn::backend::{Autodiff, NdArray};

    type TrainBackend = Autodiff<NdArray>;

    // Source words on the first two axes, their translations rotated
    // by 90° in that plane.
    fn fixture() -> (EmbeddingTable, InMemoryVocabulary, Vec<EmbeddingPair>) {
        let words = ["a", "b", "c", "d", "w", "x", "y", "z"];
        let sources = [[1.0, 0.0, 0.2], [0.0, 1.0, 0.1], [-1.0, 0.0, -0.1], [0.7, 0.7, 0.0]];
        let mut values = Vec::new();
        for s in sources {
            values.extend_from_slice(&s);
        }
        for s in sources {
            values.extend([-s[1], s[0], s[2]]);
        }
        let table = EmbeddingTable::new(values, 8, 3).unwrap();
        let pairs = (0..4u32)
            .map(|i| EmbeddingPair {
                pair:      WordPair::new(words[i as usize], words[i as usize + 4]),
                source_id: i,
                target_id: i + 4,
                source:    table.row(i).unwrap().to_vec(),
                target:    table.row(i + 4).unwrap().to_vec(),
            })
            .collect();
        (table, InMemoryVocabulary::new(&words), pairs)
    }

    fn spec(kind: TransformKind, epochs: usize) -> ExperimentSpec {
        ExperimentSpec {
            kind,
            transform: TransformConfig::new(3),
            fit: FitConfig {
                epochs,
                lr:               0.05,
                weight_decay:     0.0,
                train_batch_size: 4,
                test_batch_size:  4,
                seed:             1,
                loss:             EmbeddingLoss::new(LossKind::CosSim),
            },
            exact_match: false,
        }
    }

    #[test]
    fn test_every_kind_runs_and_saves() {
        let (table, vocab, pairs) = fixture();
        let inputs = ExperimentInputs { train: &pairs, test: &pairs, table: &table, vocab: &vocab, marks: None };
        let device = Default::default();

        for kind in TransformKind::ALL {
            let dir = tempfile::tempdir().unwrap();
            let ckpt = CheckpointManager::new(dir.path()).unwrap();
            let outcome = run_experiment::<TrainBackend>(&spec(kind, 2), &inputs, &ckpt, None, &device)
                .unwrap_or_else(|e| panic!("{kind} failed: {e}"));

            assert_eq!(outcome.history.len(), if kind.is_trainable() { 2 } else { 0 });
            assert_eq!(outcome.report.n_test, 4);
            assert_eq!(outcome.train_metrics.n_pairs, 4);
            assert!(dir.path().join("transform.mpk.gz").exists(), "{kind} saved nothing");
        }
    }

    #[test]
    fn test_analytical_rotation_solves_the_fixture() {
        let (table, vocab, pairs) = fixture();
        let inputs = ExperimentInputs { train: &pairs, test: &pairs, table: &table, vocab: &vocab, marks: None };
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();

        let outcome = run_experiment::<TrainBackend>(
            &spec(TransformKind::AnalyticalRotation, 0), &inputs, &ckpt, None, &Default::default(),
        )
        .unwrap();
        assert_eq!(outcome.report.test_accuracy, 1.0);
        assert_eq!(outcome.train_metrics.accuracy, 1.0);
        assert!(outcome.train_metrics.mse_loss < 1e-6);
        let diag = outcome.diagnostics.unwrap();
        assert!((diag.determinant - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_reevaluate_matches_saved_run() {
        let (table, vocab, pairs) = fixture();
        let inputs = ExperimentInputs { train: &pairs, test: &pairs, table: &table, vocab: &vocab, marks: None };
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let device = Default::default();
        let spec = spec(TransformKind::BiasedRotation, 3);

        let outcome = run_experiment::<TrainBackend>(&spec, &inputs, &ckpt, None, &device).unwrap();
        let (report, diag) = reevaluate::<NdArray>(&spec, &inputs, &ckpt, &device).unwrap();

        assert_eq!(report.test_accuracy, outcome.report.test_accuracy);
        assert!((report.cos_sim_test_loss - outcome.report.cos_sim_test_loss).abs() < 1e-6);
        let (a, b) = (diag.unwrap(), outcome.diagnostics.unwrap());
        assert!((a.determinant - b.determinant).abs() < 1e-6);
    }
}
