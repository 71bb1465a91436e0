// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one experiment run in order:
//
//   Step 1: Load embedding table + tokenizer   (Layer 6 - infra)
//   Step 2: Save the run config                (Layer 6 - infra)
//   Step 3: Load word pairs (+ reference list) (Layer 4 - data)
//   Step 4: Filter to single tokens and embed  (Layer 4 - data, cached by Layer 6)
//   Step 5: Split train/test                   (Layer 4 - data)
//   Step 6: Fit / derive and evaluate          (Layer 5 - ml)
//   Step 7: Save results                       (Layer 6 - infra)
//
// Step 1 is separate (Resources) so a sweep loads the table and
// tokenizer once and shares them across all its runs.
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use std::{fmt, path::{Path, PathBuf}, str::FromStr};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::data::{
    dataset::{embed_pairs, EmbeddingPair},
    filter::{filter_word_pairs, FilterOptions},
    loader::{load_mark_translations, JsonPairLoader, MarkTranslations},
    splitter::split_train_test,
};
use crate::domain::{
    embedding_table::EmbeddingTable,
    kinds::{LossKind, TransformKind},
    traits::{PairSource, Vocabulary},
    word_pair::SpaceConfig,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    embedding_store::load_embedding_table,
    metrics::{EpochMetrics, MetricsLogger},
    pair_cache::{CacheKey, PairCache},
    tokenizer_store::HfVocabulary,
};
use crate::ml::{
    evaluator::{EvalReport, MatrixDiagnostics, SplitMetrics},
    loss::{EmbeddingLoss, DEFAULT_LAMBDA},
    runner::{run_experiment, ExperimentInputs, ExperimentSpec},
    trainer::FitConfig,
    transforms::TransformConfig,
    CpuTrainBackend, GpuTrainBackend,
};

// ─── Backend choice ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Wgpu,
    Ndarray,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Wgpu    => "wgpu",
            BackendKind::Ndarray => "ndarray",
        })
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "wgpu"    => Ok(BackendKind::Wgpu),
            "ndarray" => Ok(BackendKind::Ndarray),
            other     => bail!("unknown backend '{other}' (expected 'wgpu' or 'ndarray')"),
        }
    }
}

// ─── Run Configuration ────────────────────────────────────────────────────────
// Everything that determines a run. Saved as run_config.json so
// `evaluate` can rebuild the same transform and the same test split.
// Missing fields fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    // Inputs and outputs
    pub embeddings:        PathBuf,
    pub tensor_name:       String,
    pub tokenizer:         PathBuf,
    pub pairs:             PathBuf,
    pub mark_translations: Option<PathBuf>,
    pub cache_dir:         Option<PathBuf>,
    pub output_dir:        PathBuf,

    // Dataset
    pub min_length:        usize,
    pub discard_if_same:   bool,
    pub capture_diff_case: bool,
    pub space_configs:     Vec<SpaceConfig>,
    pub embed_ln:          bool,

    // Transform and loss
    pub transform:         TransformKind,
    pub apply_ln:          bool,
    pub loss:              LossKind,
    pub loss_lambda:       f64,

    // Training
    pub epochs:            usize,
    pub lr:                f64,
    pub weight_decay:      f64,
    pub train_batch_size:  usize,
    pub test_batch_size:   usize,
    pub seed:              u64,
    pub train_fraction:    f64,

    // Evaluation
    pub exact_match:       bool,

    pub backend:           BackendKind,
}

impl Default for RunConfig {
    fn default() -> Self {
        let filter = FilterOptions::default();
        Self {
            embeddings:        PathBuf::from("model/model.safetensors"),
            tensor_name:       "wte.weight".to_string(),
            tokenizer:         PathBuf::from("model/tokenizer.json"),
            pairs:             PathBuf::from("data/en-fr.json"),
            mark_translations: None,
            cache_dir:         None,
            output_dir:        PathBuf::from("runs/latest"),
            min_length:        filter.min_length,
            discard_if_same:   filter.discard_if_same,
            capture_diff_case: filter.capture_diff_case,
            space_configs:     filter.space_configs,
            embed_ln:          false,
            transform:         TransformKind::Rotation,
            apply_ln:          false,
            loss:              LossKind::CosSim,
            loss_lambda:       DEFAULT_LAMBDA,
            epochs:            100,
            lr:                8e-5,
            weight_decay:      2e-5,
            train_batch_size:  128,
            test_batch_size:   256,
            seed:              1,
            train_fraction:    0.97,
            exact_match:       false,
            backend:           BackendKind::Wgpu,
        }
    }
}

impl RunConfig {
    pub fn filter_options(&self) -> FilterOptions {
        FilterOptions {
            min_length:        self.min_length,
            discard_if_same:   self.discard_if_same,
            capture_diff_case: self.capture_diff_case,
            space_configs:     self.space_configs.clone(),
        }
    }

    pub fn experiment_spec(&self, d_model: usize) -> ExperimentSpec {
        ExperimentSpec {
            kind:        self.transform,
            transform:   TransformConfig::new(d_model).with_apply_ln(self.apply_ln),
            fit: FitConfig {
                epochs:           self.epochs,
                lr:               self.lr,
                weight_decay:     self.weight_decay,
                train_batch_size: self.train_batch_size,
                test_batch_size:  self.test_batch_size,
                seed:             self.seed,
                loss:             EmbeddingLoss::new(self.loss).with_lambda(self.loss_lambda),
            },
            exact_match: self.exact_match,
        }
    }
}

// ─── Run Results ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResults {
    pub transform:        TransformKind,
    pub loss:             LossKind,
    pub n_train:          usize,
    pub n_test:           usize,
    pub final_train_loss: Option<f64>,
    pub final_test_loss:  Option<f64>,
    pub train_metrics:    SplitMetrics,
    pub evaluation:       EvalReport,
    pub diagnostics:      Option<MatrixDiagnostics>,
    pub history:          Vec<EpochMetrics>,
}

// ─── Shared resources ─────────────────────────────────────────────────────────
/// The embedding table and tokenizer, loaded once and shared read-only.
pub struct Resources {
    pub vocab: HfVocabulary,
    pub table: EmbeddingTable,
}

impl Resources {
    pub fn load(embeddings: &Path, tensor_name: &str, tokenizer: &Path) -> Result<Self> {
        let table = load_embedding_table(embeddings, tensor_name)?;
        let vocab = HfVocabulary::from_file(tokenizer)?;
        // Every token id must index a row of the table
        if vocab.vocab_size() > table.vocab_size() {
            bail!(
                "tokenizer '{}' has {} tokens but '{}' has only {} embedding rows; \
                 are they from the same model?",
                tokenizer.display(),
                vocab.vocab_size(),
                embeddings.display(),
                table.vocab_size(),
            );
        }
        Ok(Self { vocab, table })
    }
}

/// The train/test pairs of a run and its optional reference list.
pub struct PreparedData {
    pub train: Vec<EmbeddingPair>,
    pub test:  Vec<EmbeddingPair>,
    pub marks: Option<MarkTranslations>,
}

impl PreparedData {
    pub fn inputs<'a>(&'a self, resources: &'a Resources) -> ExperimentInputs<'a> {
        ExperimentInputs {
            train: &self.train,
            test:  &self.test,
            table: &resources.table,
            vocab: &resources.vocab,
            marks: self.marks.as_ref(),
        }
    }
}

/// Steps 3–5: word pairs → filtered embedding pairs → seeded split.
/// Deterministic in the config, so `evaluate` gets the same test set.
pub fn prepare_data(cfg: &RunConfig, resources: &Resources) -> Result<PreparedData> {
    let build = || -> Result<Vec<EmbeddingPair>> {
        let word_pairs = JsonPairLoader::new(&cfg.pairs).load_pairs()?;
        let tokenized = filter_word_pairs(&resources.vocab, &word_pairs, &cfg.filter_options());
        embed_pairs(&tokenized, &resources.table, cfg.embed_ln)
    };

    let pairs = match &cfg.cache_dir {
        Some(dir) => {
            let key = CacheKey {
                dataset:           &cfg.pairs,
                tensor_name:       &cfg.tensor_name,
                space_configs:     &cfg.space_configs,
                min_length:        cfg.min_length,
                discard_if_same:   cfg.discard_if_same,
                capture_diff_case: cfg.capture_diff_case,
                embed_ln:          cfg.embed_ln,
            };
            PairCache::new(dir).load_or_build(&key, build)?
        }
        None => build()?,
    };
    tracing::info!("{} embedding pairs after filtering", pairs.len());

    let (train, test) = split_train_test(pairs, cfg.train_fraction, cfg.seed);
    tracing::info!("Split: {} train, {} test", train.len(), test.len());
    if train.is_empty() || test.is_empty() {
        bail!(
            "need at least one train and one test pair (got {} / {}); \
             check the dataset, filters and train_fraction",
            train.len(),
            test.len()
        );
    }

    let marks = cfg.mark_translations.as_ref().map(load_mark_translations).transpose()?;
    Ok(PreparedData { train, test, marks })
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: RunConfig,
}

impl TrainUseCase {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Execute the full pipeline end to end
    pub fn execute(&self) -> Result<RunResults> {
        let cfg = &self.config;

        // ── Step 1: Load the embedding table and tokenizer ───────────────────
        tracing::info!("Loading embeddings from '{}'", cfg.embeddings.display());
        let resources = Resources::load(&cfg.embeddings, &cfg.tensor_name, &cfg.tokenizer)?;

        run_with(cfg, &resources)
    }
}

/// Steps 2–7 against already-loaded resources.
pub fn run_with(cfg: &RunConfig, resources: &Resources) -> Result<RunResults> {
    // ── Step 2: Save config so the run can be re-evaluated ───────────────────
    let ckpt = CheckpointManager::new(&cfg.output_dir)?;
    ckpt.save_config(cfg)?;

    // ── Steps 3–5: Pairs, filtering, split ───────────────────────────────────
    let data = prepare_data(cfg, resources)?;

    // ── Step 6: Fit (or derive) and evaluate (Layer 5) ───────────────────────
    let spec = cfg.experiment_spec(resources.table.d_model());
    let metrics = MetricsLogger::new(ckpt.dir())?;
    tracing::debug!("Epoch metrics go to '{}'", metrics.csv_path().display());
    let inputs = data.inputs(resources);
    let outcome = match cfg.backend {
        BackendKind::Wgpu => run_experiment::<GpuTrainBackend>(
            &spec, &inputs, &ckpt, Some(&metrics), &burn::backend::wgpu::WgpuDevice::default(),
        )?,
        BackendKind::Ndarray => run_experiment::<CpuTrainBackend>(
            &spec, &inputs, &ckpt, Some(&metrics), &burn::backend::ndarray::NdArrayDevice::default(),
        )?,
    };

    // ── Step 7: Save results ─────────────────────────────────────────────────
    let last = outcome.history.last();
    let results = RunResults {
        transform:        cfg.transform,
        loss:             cfg.loss,
        n_train:          data.train.len(),
        n_test:           data.test.len(),
        final_train_loss: last.map(|m| m.train_loss),
        final_test_loss:  last.map(|m| m.test_loss),
        train_metrics:    outcome.train_metrics,
        evaluation:       outcome.report,
        diagnostics:      outcome.diagnostics,
        history:          outcome.history,
    };
    ckpt.save_results(&results)?;
    tracing::info!("Run saved to '{}'", ckpt.dir().display());
    Ok(results)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::infra::{embedding_store::tests::write_table, tokenizer_store::tests::write_tokenizer};

    pub(crate) const WORDS: &[&str] = &["[UNK]", "cat", "dog", "sun", "moon", "chat", "chien", "soleil", "lune"];

    /// Files for a tiny en→fr problem whose answer is a 90° rotation.
    /// Returns a config pointing at them, on the CPU backend.
    pub(crate) fn fixture(dir: &Path) -> RunConfig {
        let sources: [[f32; 3]; 4] = [[1.0, 0.0, 0.3], [0.0, 1.0, 0.2], [-1.0, 0.2, -0.1], [0.6, 0.8, -0.4]];
        let mut values = vec![0.1f32, 0.1, 0.1];
        for s in sources {
            values.extend_from_slice(&s);
        }
        for s in sources {
            values.extend([-s[1], s[0], s[2]]);
        }
        let embeddings = dir.join("model.safetensors");
        write_table(&embeddings, "wte.weight", &values, [WORDS.len(), 3]);

        let pairs = dir.join("en-fr.json");
        let json = serde_json::json!([
            ["cat", "chat"], ["dog", "chien"], ["sun", "soleil"], ["moon", "lune"],
            ["cat", "cat"], ["a", "une"], ["horse", "cheval"],
        ]);
        std::fs::write(&pairs, json.to_string()).unwrap();

        RunConfig {
            embeddings,
            tokenizer: write_tokenizer(dir, WORDS),
            pairs,
            output_dir: dir.join("run"),
            epochs: 3,
            lr: 0.05,
            train_batch_size: 2,
            test_batch_size: 2,
            train_fraction: 0.5,
            backend: BackendKind::Ndarray,
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: RunConfig = serde_json::from_str(r#"{ "transform": "biased_rotation", "epochs": 5 }"#).unwrap();
        assert_eq!(cfg.transform, TransformKind::BiasedRotation);
        assert_eq!(cfg.epochs, 5);
        assert_eq!(cfg.loss, LossKind::CosSim);
        assert_eq!(cfg.backend, BackendKind::Wgpu);
    }

    #[test]
    fn test_backend_names() {
        assert_eq!("ndarray".parse::<BackendKind>().unwrap(), BackendKind::Ndarray);
        assert!("cuda".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Wgpu.to_string(), "wgpu");
    }

    #[test]
    fn test_tokenizer_larger_than_table_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = fixture(dir.path());
        let mut words = WORDS.to_vec();
        words.push("extra");
        let big = dir.path().join("big");
        std::fs::create_dir(&big).unwrap();
        let tokenizer = write_tokenizer(&big, &words);

        let err = Resources::load(&cfg.embeddings, &cfg.tensor_name, &tokenizer).err().unwrap();
        assert!(err.to_string().contains("embedding rows"), "{err}");
    }

    #[test]
    fn test_prepare_data_filters_and_splits() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = fixture(dir.path());
        let resources = Resources::load(&cfg.embeddings, &cfg.tensor_name, &cfg.tokenizer).unwrap();

        let data = prepare_data(&cfg, &resources).unwrap();
        // "cat"/"cat" is the same word, "a"/"une" is too short and
        // "horse"/"cheval" is not in the vocabulary
        assert_eq!(data.train.len() + data.test.len(), 4);
        assert_eq!(data.train.len(), 2);
        assert!(data.marks.is_none());
    }

    #[test]
    fn test_cached_pairs_match_fresh_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RunConfig { cache_dir: Some(dir.path().join("cache")), ..fixture(dir.path()) };
        let resources = Resources::load(&cfg.embeddings, &cfg.tensor_name, &cfg.tokenizer).unwrap();

        let first = prepare_data(&cfg, &resources).unwrap();
        let second = prepare_data(&cfg, &resources).unwrap();
        assert_eq!(first.test.len(), second.test.len());
        for (a, b) in first.test.iter().zip(&second.test) {
            assert_eq!(a.pair, b.pair);
            assert_eq!(a.source, b.source);
        }
    }

    #[test]
    fn test_full_run_writes_run_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = fixture(dir.path());

        let results = TrainUseCase::new(cfg.clone()).execute().unwrap();
        assert_eq!(results.history.len(), 3);
        assert_eq!(results.n_test, 2);
        assert!(results.final_test_loss.is_some());
        assert_eq!(results.train_metrics.n_pairs, results.n_train);
        assert!((0.0..=1.0).contains(&results.train_metrics.accuracy));
        for file in ["run_config.json", "metrics.csv", "transform.mpk.gz", "results.json"] {
            assert!(cfg.output_dir.join(file).exists(), "missing {file}");
        }
    }
}
