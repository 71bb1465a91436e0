// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one goal: a single run, a sweep of runs, or re-scoring a
// finished run.
//
// Rules for this layer:
//   - No tensor math here (that's Layer 5)
//   - No argument parsing or printing (that's Layer 1)
//   - File formats belong to Layers 4 and 6
//   - Only workflow coordination and configuration
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// One experiment run, plus RunConfig / RunResults
pub mod train_use_case;

// Cartesian sweep split across worker threads
pub mod sweep_use_case;

// Reload a saved run and evaluate it again
pub mod evaluate_use_case;
