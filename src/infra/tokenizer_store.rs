// ============================================================
// Layer 6: Tokenizer Store
// ============================================================
// Loads the pretrained model's HuggingFace `tokenizer.json` and
// exposes it through the domain's Vocabulary trait. Token ids
// index rows of the embedding table, so the tokenizer must come
// from the same checkpoint as the embeddings.

use std::path::Path;

use anyhow::{anyhow, Result};
use tokenizers::Tokenizer;

use crate::domain::traits::Vocabulary;

pub struct HfVocabulary {
    tokenizer: Tokenizer,
}

impl HfVocabulary {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))?;
        tracing::info!(
            "Loaded tokenizer from '{}' ({} tokens)",
            path.display(),
            tokenizer.get_vocab_size(true)
        );
        Ok(Self { tokenizer })
    }
}

impl Vocabulary for HfVocabulary {
    fn single_token(&self, text: &str) -> Result<Option<u32>> {
        // No special tokens: we want the word's own tokens only
        let enc = self.tokenizer
            .encode(text, false)
            .map_err(|e| anyhow!("Tokenisation error: {e}"))?;
        let [id] = enc.get_ids() else {
            return Ok(None);
        };
        // Out-of-vocabulary words encode to the unknown token, whose
        // text ("[UNK]", "<unk>") does not give the word back
        let decoded = self.token_text(*id)?;
        Ok((decoded.trim() == text.trim()).then_some(*id))
    }

    fn token_text(&self, id: u32) -> Result<String> {
        self.tokenizer
            .decode(&[id], false)
            .map_err(|e| anyhow!("Decode error for token {id}: {e}"))
    }

    fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }
}
