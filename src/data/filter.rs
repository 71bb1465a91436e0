// ============================================================
// Layer 4: Word Pair Filter
// ============================================================
// Keeps only dictionary entries that map cleanly onto the
// embedding table: both words must encode to exactly ONE token
// so each side is a single embedding row.
//
// Filtering steps (per pair):
//   1. Drop pairs whose sides are the same word (optional)
//   2. Drop pairs where either word is shorter than min_length
//   3. With capture_diff_case, expand to four case variants:
//      (s, t), (S, t), (s, T), (S, T) where S is s capitalised
//   4. For each space configuration, tokenise both sides and keep
//      the variant if both are single tokens
//   5. Drop duplicate (source_id, target_id) combinations
//
// A tokenisation failure on one word is logged and skipped.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::traits::Vocabulary;
use crate::domain::word_pair::{SpaceConfig, WordPair};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterOptions {
    pub min_length:        usize,
    pub discard_if_same:   bool,
    pub capture_diff_case: bool,
    pub space_configs:     Vec<SpaceConfig>,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            min_length:        3,
            discard_if_same:   true,
            capture_diff_case: false,
            space_configs:     vec![SpaceConfig::default()],
        }
    }
}

/// A word pair whose (spaced) sides are single tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedPair {
    pub pair:      WordPair,
    pub source_id: u32,
    pub target_id: u32,
}

pub fn filter_word_pairs(
    vocab: &dyn Vocabulary,
    pairs: &[WordPair],
    opts:  &FilterOptions,
) -> Vec<TokenizedPair> {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    let mut same = 0usize;
    let mut short = 0usize;

    for pair in pairs {
        if opts.discard_if_same && pair.is_same_word() {
            same += 1;
            continue;
        }
        if pair.min_chars() < opts.min_length {
            short += 1;
            continue;
        }
        for variant in case_variants(pair, opts.capture_diff_case) {
            for space in &opts.space_configs {
                let spaced = space.apply(&variant);
                let Some(source_id) = single_token(vocab, &spaced.source) else { continue };
                let Some(target_id) = single_token(vocab, &spaced.target) else { continue };
                if seen.insert((source_id, target_id)) {
                    kept.push(TokenizedPair { pair: spaced, source_id, target_id });
                }
            }
        }
    }

    tracing::info!(
        "Filtered {} pairs → {} single-token pairs ({} same-word, {} too short)",
        pairs.len(), kept.len(), same, short
    );
    kept
}

fn case_variants(pair: &WordPair, diff_case: bool) -> Vec<WordPair> {
    if !diff_case {
        return vec![pair.clone()];
    }
    let (source, target) = (capitalize(&pair.source), capitalize(&pair.target));
    vec![
        pair.clone(),
        WordPair::new(source.clone(), pair.target.clone()),
        WordPair::new(pair.source.clone(), target.clone()),
        WordPair::new(source, target),
    ]
}

/// First character upper-cased, the rest lower-cased.
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn single_token(vocab: &dyn Vocabulary, text: &str) -> Option<u32> {
    match vocab.single_token(text) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("Skipping '{}': {}", text, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::traits::test_support::InMemoryVocabulary;

    fn vocab() -> InMemoryVocabulary {
        InMemoryVocabulary::new(&[" cat", " chat", "cat", "chat", " dog", " Dog", " chien", " bus", " la"])
    }

    #[test]
    fn test_keeps_single_token_pairs() {
        let pairs = vec![WordPair::new("cat", "chat"), WordPair::new("dog", "chien")];
        let kept = filter_word_pairs(&vocab(), &pairs, &FilterOptions::default());
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].pair, WordPair::new(" cat", " chat"));
        assert_eq!((kept[0].source_id, kept[0].target_id), (0, 1));
    }

    #[test]
    fn test_drops_multi_token_and_same_words() {
        let pairs = vec![
            WordPair::new("horse", "cheval"), // not in vocab
            WordPair::new("bus", "bus"),      // same word
            WordPair::new("Dog", "dog"),      // same word, different case
        ];
        let kept = filter_word_pairs(&vocab(), &pairs, &FilterOptions::default());
        assert!(kept.is_empty());
    }

    #[test]
    fn test_min_length_applies_to_both_sides() {
        let pairs = vec![WordPair::new("the", "la")];
        let opts = FilterOptions { min_length: 3, ..FilterOptions::default() };
        assert!(filter_word_pairs(&vocab(), &pairs, &opts).is_empty());
    }

    #[test]
    fn test_each_space_config_adds_a_variant_once() {
        let pairs = vec![WordPair::new("cat", "chat"), WordPair::new("cat", "chat")];
        let opts = FilterOptions {
            space_configs: vec![SpaceConfig::new(true, true), SpaceConfig::new(false, false)],
            ..FilterOptions::default()
        };
        let kept = filter_word_pairs(&vocab(), &pairs, &opts);
        // spaced and unspaced variants, duplicates removed
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].pair, WordPair::new("cat", "chat"));
    }

    #[test]
    fn test_diff_case_adds_capitalised_variants() {
        let vocab = InMemoryVocabulary::new(&[" cat", " chat", " Cat", " Chat", " dog", " chien", " Dog"]);
        let pairs = vec![WordPair::new("cat", "chat"), WordPair::new("dog", "chien")];
        let opts = FilterOptions { capture_diff_case: true, ..FilterOptions::default() };

        let kept: Vec<WordPair> = filter_word_pairs(&vocab, &pairs, &opts).into_iter().map(|p| p.pair).collect();
        assert_eq!(
            kept,
            vec![
                WordPair::new(" cat", " chat"),
                WordPair::new(" Cat", " chat"),
                WordPair::new(" cat", " Chat"),
                WordPair::new(" Cat", " Chat"),
                WordPair::new(" dog", " chien"),
                // " Chien" is not a token
                WordPair::new(" Dog", " chien"),
            ]
        );
        assert_eq!(filter_word_pairs(&vocab, &pairs, &FilterOptions::default()).len(), 2);
    }

    #[test]
    fn test_capitalize_lowercases_the_rest() {
        assert_eq!(capitalize("paris"), "Paris");
        assert_eq!(capitalize("NASA"), "Nasa");
        assert_eq!(capitalize("élan"), "Élan");
        assert_eq!(capitalize(""), "");
    }
}
