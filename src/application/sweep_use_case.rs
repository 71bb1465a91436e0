// ============================================================
// Layer 2 — SweepUseCase
// ============================================================
// Runs the cartesian product of a config of value lists:
//
//   datasets × transforms × losses × seeds × lrs × weight_decays
//            × epochs × embed_ln × apply_ln
//
// Parallelism mirrors a multi-process sweep: the `datasets` list is
// split into `workers` contiguous chunks, each chunk runs on its own
// rayon thread, and every worker goes through its runs one by one.
// The embedding table and tokenizer are loaded once and shared
// read-only; nothing else is shared. A failed run is logged and
// recorded, and its worker moves on to the next run.
//
// Output: <output_dir>/<run name>/...      one run directory per run
//         <output_dir>/sweep_results.json  every run's outcome
//
// Reference: rayon crate documentation (ThreadPool, par_iter)

use std::{collections::HashSet, fs, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::{run_with, Resources, RunConfig, RunResults};
use crate::domain::kinds::{LossKind, TransformKind};

const RESULTS_FILE: &str = "sweep_results.json";

// ─── Sweep Configuration ──────────────────────────────────────────────────────
// `base` supplies every setting not swept. An empty list means
// "use the base value".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub base:          RunConfig,
    pub output_dir:    PathBuf,
    pub workers:       usize,

    pub datasets:      Vec<PathBuf>,
    pub transforms:    Vec<TransformKind>,
    pub losses:        Vec<LossKind>,
    pub seeds:         Vec<u64>,
    pub lrs:           Vec<f64>,
    pub weight_decays: Vec<f64>,
    pub epochs:        Vec<usize>,
    pub embed_ln:      Vec<bool>,
    pub apply_ln:      Vec<bool>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            base:          RunConfig::default(),
            output_dir:    PathBuf::from("runs/sweep"),
            workers:       1,
            datasets:      Vec::new(),
            transforms:    Vec::new(),
            losses:        Vec::new(),
            seeds:         Vec::new(),
            lrs:           Vec::new(),
            weight_decays: Vec::new(),
            epochs:        Vec::new(),
            embed_ln:      Vec::new(),
            apply_ln:      Vec::new(),
        }
    }
}

fn or_base<T: Clone>(values: &[T], base: T) -> Vec<T> {
    if values.is_empty() { vec![base] } else { values.to_vec() }
}

impl SweepConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read sweep config '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("'{}' is not a valid sweep config", path.display()))
    }

    /// Swept datasets in order, each listed once; workers are split by
    /// dataset, so a repeat would hand the same runs to two workers.
    pub fn datasets(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        or_base(&self.datasets, self.base.pairs.clone())
            .into_iter()
            .filter(|d| seen.insert(d.clone()))
            .collect()
    }

    /// Every run of the sweep, in a fixed order, each with its own
    /// output directory under `output_dir`.
    pub fn expand(&self) -> Vec<RunConfig> {
        let b = &self.base;
        let mut runs = Vec::new();
        for dataset in self.datasets() {
            for &transform in &or_base(&self.transforms, b.transform) {
                for &loss in &or_base(&self.losses, b.loss) {
                    for &seed in &or_base(&self.seeds, b.seed) {
                        for &lr in &or_base(&self.lrs, b.lr) {
                            for &weight_decay in &or_base(&self.weight_decays, b.weight_decay) {
                                for &epochs in &or_base(&self.epochs, b.epochs) {
                                    for &embed_ln in &or_base(&self.embed_ln, b.embed_ln) {
                                        for &apply_ln in &or_base(&self.apply_ln, b.apply_ln) {
                                            let mut cfg = RunConfig {
                                                pairs: dataset.clone(),
                                                transform,
                                                loss,
                                                seed,
                                                lr,
                                                weight_decay,
                                                epochs,
                                                embed_ln,
                                                apply_ln,
                                                ..b.clone()
                                            };
                                            cfg.output_dir = self.output_dir.join(run_name(runs.len(), &cfg));
                                            runs.push(cfg);
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        runs
    }
}

fn run_name(index: usize, cfg: &RunConfig) -> String {
    let dataset = cfg.pairs.file_stem().and_then(|s| s.to_str()).unwrap_or("dataset");
    format!("{index:04}-{dataset}-{}-{}-seed{}", cfg.transform, cfg.loss, cfg.seed)
}

/// Split `items` into at most `workers` contiguous chunks whose sizes
/// differ by at most one, larger chunks first.
pub fn split_for_workers<T: Clone>(items: &[T], workers: usize) -> Vec<Vec<T>> {
    let n = workers.clamp(1, items.len().max(1));
    let (base, extra) = (items.len() / n, items.len() % n);
    let mut chunks = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let len = base + usize::from(i < extra);
        chunks.push(items[start..start + len].to_vec());
        start += len;
    }
    chunks.retain(|c| !c.is_empty());
    chunks
}

// ─── Sweep Results ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepEntry {
    pub output_dir: PathBuf,
    pub dataset:    PathBuf,
    pub transform:  TransformKind,
    pub loss:       LossKind,
    pub seed:       u64,
    pub worker:     usize,
    pub results:    Option<RunResults>,
    pub error:      Option<String>,
}

impl SweepEntry {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

// ─── SweepUseCase ─────────────────────────────────────────────────────────────
pub struct SweepUseCase {
    config: SweepConfig,
}

impl SweepUseCase {
    pub fn new(config: SweepConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<Vec<SweepEntry>> {
        let cfg = &self.config;
        let runs = cfg.expand();
        let chunks = split_for_workers(&cfg.datasets(), cfg.workers);
        tracing::info!("Sweep: {} runs over {} worker(s)", runs.len(), chunks.len());

        // Shared by every worker
        let b = &cfg.base;
        let resources = Resources::load(&b.embeddings, &b.tensor_name, &b.tokenizer)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(chunks.len())
            .build()
            .context("Cannot start sweep worker threads")?;

        let per_worker: Vec<Vec<SweepEntry>> = pool.install(|| {
            chunks
                .par_iter()
                .enumerate()
                .map(|(worker, datasets)| {
                    let mine: Vec<&RunConfig> = runs.iter().filter(|r| datasets.contains(&r.pairs)).collect();
                    tracing::info!("Worker {} starting {} runs", worker, mine.len());
                    mine.into_iter().map(|run| run_one(worker, run, &resources)).collect()
                })
                .collect()
        });

        let mut entries: Vec<SweepEntry> = per_worker.into_iter().flatten().collect();
        entries.sort_by(|a, b| a.output_dir.cmp(&b.output_dir));

        let failed = entries.iter().filter(|e| !e.succeeded()).count();
        tracing::info!("Sweep finished: {} ok, {} failed", entries.len() - failed, failed);

        fs::create_dir_all(&cfg.output_dir)
            .with_context(|| format!("Cannot create sweep directory '{}'", cfg.output_dir.display()))?;
        let path = cfg.output_dir.join(RESULTS_FILE);
        fs::write(&path, serde_json::to_string_pretty(&entries)?)
            .with_context(|| format!("Cannot write sweep results to '{}'", path.display()))?;
        Ok(entries)
    }
}

fn run_one(worker: usize, run: &RunConfig, resources: &Resources) -> SweepEntry {
    tracing::info!("[worker {}] {}", worker, run.output_dir.display());
    let outcome = run_with(run, resources);
    if let Err(e) = &outcome {
        tracing::warn!("[worker {}] run '{}' failed: {:#}", worker, run.output_dir.display(), e);
    }
    let (results, error) = match outcome {
        Ok(r)  => (Some(r), None),
        Err(e) => (None, Some(format!("{e:#}"))),
    };
    SweepEntry {
        output_dir: run.output_dir.clone(),
        dataset:    run.pairs.clone(),
        transform:  run.transform,
        loss:       run.loss,
        seed:       run.seed,
        worker,
        results,
        error,
    }
}
