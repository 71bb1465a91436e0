// ============================================================
// Layer 5 — ML Layer (Burn)
// ============================================================
// All tensor math lives here. The application layer only sees
// ExperimentSpec / ExperimentOutcome and the backend aliases.
//
// What's in this layer:
//
//   linalg.rs      — host-side f64 linear algebra (nalgebra):
//                    QR rotation base, SVD polar factor, determinant
//
//   transforms.rs  — the EmbeddingTransform trait and every
//                    transform family (identity, linear, translation,
//                    rotation, fixed manual maps)
//
//   loss.rs        — cos_sim, l1_cos_sim, l2_cos_sim, mse_loss
//
//   trainer.rs     — mini-batch AdamW loop with per-epoch test loss
//
//   evaluator.rs   — nearest-embedding accuracy, reference-list
//                    ("mark") accuracy and matrix diagnostics
//
//   analytical.rs  — closed-form baselines (mean shift, least
//                    squares, Procrustes)
//
//   runner.rs      — maps a TransformKind onto a module and drives
//                    fit → evaluate → save
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

pub mod linalg;

pub mod transforms;

pub mod loss;

pub mod trainer;

pub mod evaluator;

pub mod analytical;

pub mod runner;

// ─── Backends ─────────────────────────────────────────────────────────────────
/// GPU training backend and its no-autodiff inner backend.
pub type GpuTrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;
pub type GpuBackend      = burn::backend::Wgpu;

/// CPU fallback, also what the tests run on.
pub type CpuTrainBackend = burn::backend::Autodiff<burn::backend::NdArray>;
pub type CpuBackend      = burn::backend::NdArray;
