// ============================================================
// Layer 3: Core Traits (Abstractions)
// ============================================================
// The data and ml layers never touch the tokenizers crate or the
// filesystem directly. They see these traits instead, which keeps
// them testable with small in-memory fakes.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::word_pair::WordPair;

// ─── PairSource ───────────────────────────────────────────────────────────────
/// Any component that can produce bilingual word pairs.
///
/// Implementations:
///   - JsonPairLoader → reads `[["cat", "chat"], ...]` files
pub trait PairSource {
    fn load_pairs(&self) -> Result<Vec<WordPair>>;
}

// ─── Vocabulary ───────────────────────────────────────────────────────────────
/// The token vocabulary that indexes the embedding table.
///
/// Implementations:
///   - HfVocabulary → wraps a HuggingFace `tokenizer.json`
///
/// Shared read-only between sweep workers, hence `Send + Sync`.
pub trait Vocabulary: Send + Sync {
    /// Token id of `text` if it encodes to exactly one token.
    fn single_token(&self, text: &str) -> Result<Option<u32>>;

    /// Decoded text of a single token id.
    fn token_text(&self, id: u32) -> Result<String>;

    fn vocab_size(&self) -> usize;
}
