// ============================================================
// Layer 4: Data Pipeline
// ============================================================
// Everything from a dictionary file to tensor batches:
//
//   pairs.json
//       │
//       ▼
//   JsonPairLoader     → reads [source, target] word pairs
//       │
//       ▼
//   filter_word_pairs  → keeps pairs whose words are single tokens
//       │
//       ▼
//   embed_pairs        → looks up embedding rows for both sides
//       │
//       ▼
//   split_train_test   → seeded shuffle + split
//       │
//       ▼
//   EmbeddingPairDataset / EmbeddingBatcher → Burn DataLoader
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads word pairs and reference translations from JSON
pub mod loader;

/// Single-token filtering through the vocabulary
pub mod filter;

/// Implements Burn's Dataset trait for embedding pairs
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Seeded shuffle and train/test split
pub mod splitter;
