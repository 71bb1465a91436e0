// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands, `train`, `sweep` and `evaluate`,
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, TransformKind, etc.)
//
// Transform and loss names are parsed by their FromStr impls, so
// a typo fails here with the list of valid names.
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::application::train_use_case::{BackendKind, RunConfig};
use crate::domain::{
    kinds::{LossKind, TransformKind},
    word_pair::SpaceConfig,
};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fit one transform and evaluate it
    Train(TrainArgs),

    /// Run every combination in a sweep config file
    Sweep(SweepArgs),

    /// Re-evaluate a finished run from its directory
    Evaluate(EvaluateArgs),
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Safetensors file holding the embedding table
    #[arg(long, default_value = "model/model.safetensors")]
    pub embeddings: PathBuf,

    /// Name of the [vocab, d_model] tensor inside that file
    #[arg(long, default_value = "wte.weight")]
    pub tensor_name: String,

    /// HuggingFace tokenizer.json of the same model
    #[arg(long, default_value = "model/tokenizer.json")]
    pub tokenizer: PathBuf,

    /// JSON list of [source, target] word pairs
    #[arg(long, default_value = "data/en-fr.json")]
    pub pairs: PathBuf,

    /// Optional JSON object: source word → accepted translations
    #[arg(long)]
    pub mark_translations: Option<PathBuf>,

    /// Cache filtered embedding pairs here
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Run directory for config, metrics, weights and results
    #[arg(long, default_value = "runs/latest")]
    pub output_dir: PathBuf,

    /// Drop pairs where either word is shorter than this
    #[arg(long, default_value_t = 3)]
    pub min_length: usize,

    /// Keep pairs whose source and target are the same word
    #[arg(long)]
    pub keep_same: bool,

    /// Also use each pair with its source and/or target capitalised
    #[arg(long)]
    pub capture_diff_case: bool,

    /// Leading-space setting(s) as source:target, each 'space' or 'none'
    #[arg(long = "space-config", num_args = 1.., default_value = "space:space")]
    pub space_configs: Vec<SpaceConfig>,

    /// Normalise embedding rows before fitting
    #[arg(long)]
    pub embed_ln: bool,

    /// Transformation to fit, e.g. rotation, linear_map, analytical_rotation
    #[arg(long, default_value = "rotation")]
    pub transform: TransformKind,

    /// Normalise transform outputs (zero mean, unit variance)
    #[arg(long)]
    pub apply_ln: bool,

    /// cos_sim, l1_cos_sim, l2_cos_sim or mse_loss
    #[arg(long, default_value = "cos_sim")]
    pub loss: LossKind,

    /// Weight of the distance term in l1_cos_sim / l2_cos_sim
    #[arg(long, default_value_t = 0.5)]
    pub loss_lambda: f64,

    /// Number of full passes through the training pairs
    #[arg(long, default_value_t = 100)]
    pub epochs: usize,

    #[arg(long, default_value_t = 8e-5)]
    pub lr: f64,

    /// AdamW decoupled weight decay
    #[arg(long, default_value_t = 2e-5)]
    pub weight_decay: f64,

    #[arg(long, default_value_t = 128)]
    pub train_batch_size: usize,

    #[arg(long, default_value_t = 256)]
    pub test_batch_size: usize,

    /// Seeds the split, the shuffling and parameter init
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Share of pairs used for training; the rest is the test set
    #[arg(long, default_value_t = 0.97)]
    pub train_fraction: f64,

    /// Require exact string equality instead of trimmed, case-insensitive
    #[arg(long)]
    pub exact_match: bool,

    /// wgpu (GPU) or ndarray (CPU)
    #[arg(long, default_value = "wgpu")]
    pub backend: BackendKind,
}

/// Convert CLI TrainArgs into the application-layer RunConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for RunConfig {
    fn from(a: TrainArgs) -> Self {
        RunConfig {
            embeddings:        a.embeddings,
            tensor_name:       a.tensor_name,
            tokenizer:         a.tokenizer,
            pairs:             a.pairs,
            mark_translations: a.mark_translations,
            cache_dir:         a.cache_dir,
            output_dir:        a.output_dir,
            min_length:        a.min_length,
            discard_if_same:   !a.keep_same,
            capture_diff_case: a.capture_diff_case,
            space_configs:     a.space_configs,
            embed_ln:          a.embed_ln,
            transform:         a.transform,
            apply_ln:          a.apply_ln,
            loss:              a.loss,
            loss_lambda:       a.loss_lambda,
            epochs:            a.epochs,
            lr:                a.lr,
            weight_decay:      a.weight_decay,
            train_batch_size:  a.train_batch_size,
            test_batch_size:   a.test_batch_size,
            seed:              a.seed,
            train_fraction:    a.train_fraction,
            exact_match:       a.exact_match,
            backend:           a.backend,
        }
    }
}

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Sweep config JSON (base run config plus lists of values)
    #[arg(long)]
    pub config: PathBuf,

    /// Overrides the config's worker count
    #[arg(long)]
    pub workers: Option<usize>,
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory written by a previous `train` run
    #[arg(long)]
    pub run_dir: PathBuf,

    /// Evaluate on this backend instead of the one used for training
    #[arg(long)]
    pub backend: Option<BackendKind>,
}
