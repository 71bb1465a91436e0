// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// File formats and external libraries, kept out of the layers
// that do the actual work:
//
//   embedding_store.rs — reads the embedding table out of a
//                        .safetensors file
//
//   tokenizer_store.rs — loads a HuggingFace tokenizer.json and
//                        exposes it as a domain Vocabulary
//
//   pair_cache.rs      — caches filtered embedding pairs as
//                        safetensors, keyed by dataset options
//
//   checkpoint.rs      — run directory: config, transform
//                        weights (Burn recorder) and results
//
//   metrics.rs         — per-epoch train/test loss CSV
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Embedding table loading (safetensors)
pub mod embedding_store;

/// HuggingFace tokenizer behind the Vocabulary trait
pub mod tokenizer_store;

/// Embedding-pair cache (safetensors)
pub mod pair_cache;

/// Run directory: config, weights, results
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;
