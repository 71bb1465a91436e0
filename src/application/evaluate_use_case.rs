// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Re-scores a finished run from its directory alone:
//
//   Step 1: Read run_config.json               (Layer 6 - infra)
//   Step 2: Reload table, tokenizer, pairs     (Layers 4 + 6)
//           and rebuild the same seeded split
//   Step 3: Rebuild the transform skeleton and load its weights
//   Step 4: Evaluate on the test split         (Layer 5 - ml)
//
// No gradients are needed, so this runs on the plain backend.

use std::path::PathBuf;

use anyhow::Result;

use crate::application::train_use_case::{prepare_data, BackendKind, Resources};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    evaluator::{EvalReport, MatrixDiagnostics},
    runner::reevaluate,
    CpuBackend, GpuBackend,
};

pub struct EvaluateUseCase {
    run_dir: PathBuf,
    backend: Option<BackendKind>,
}

impl EvaluateUseCase {
    /// `backend` overrides the one the run was trained on.
    pub fn new(run_dir: PathBuf, backend: Option<BackendKind>) -> Self {
        Self { run_dir, backend }
    }

    pub fn execute(&self) -> Result<(EvalReport, Option<MatrixDiagnostics>)> {
        // ── Step 1: Config of the saved run ──────────────────────────────────
        let ckpt = CheckpointManager::new(&self.run_dir)?;
        let cfg = ckpt.load_config()?;
        tracing::info!("Re-evaluating '{}' run in '{}'", cfg.transform, self.run_dir.display());

        // ── Step 2: Same inputs, same split ──────────────────────────────────
        let resources = Resources::load(&cfg.embeddings, &cfg.tensor_name, &cfg.tokenizer)?;
        let data = prepare_data(&cfg, &resources)?;
        let inputs = data.inputs(&resources);

        // ── Steps 3–4: Load weights and score ────────────────────────────────
        let spec = cfg.experiment_spec(resources.table.d_model());
        match self.backend.unwrap_or(cfg.backend) {
            BackendKind::Wgpu => reevaluate::<GpuBackend>(
                &spec, &inputs, &ckpt, &burn::backend::wgpu::WgpuDevice::default(),
            ),
            BackendKind::Ndarray => reevaluate::<CpuBackend>(
                &spec, &inputs, &ckpt, &burn::backend::ndarray::NdArrayDevice::default(),
            ),
        }
    }
}
