// ============================================================
// Layer 4: Word Pair Loader
// ============================================================
// Loads bilingual dictionaries stored as JSON arrays of
// two-element arrays:
//
//   [["cat", "chat"], ["dog", "chien"], ...]
//
// and reference translation lists used for "mark" accuracy:
//
//   {"cat": ["chat", "chatte"], "dog": ["chien"]}
//
// Reference: serde_json documentation
//            Rust Book §9 (Error Handling)

use std::collections::HashMap;
use std::{fs, path::PathBuf};

use anyhow::{Context, Result};

use crate::domain::traits::PairSource;
use crate::domain::word_pair::WordPair;

/// Reads word pairs from a JSON file. Implements PairSource.
pub struct JsonPairLoader {
    path: PathBuf,
}

impl JsonPairLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PairSource for JsonPairLoader {
    fn load_pairs(&self) -> Result<Vec<WordPair>> {
        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read word pairs from '{}'", self.path.display()))?;
        let raw: Vec<(String, String)> = serde_json::from_str(&json)
            .with_context(|| format!("'{}' is not a JSON list of [source, target] pairs", self.path.display()))?;

        tracing::info!("Loaded {} word pairs from '{}'", raw.len(), self.path.display());
        Ok(raw.into_iter().map(|(s, t)| WordPair::new(s, t)).collect())
    }
}

/// Source word → every accepted translation of it.
pub type MarkTranslations = HashMap<String, Vec<String>>;

pub fn load_mark_translations(path: &PathBuf) -> Result<MarkTranslations> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read reference translations from '{}'", path.display()))?;
    let table: MarkTranslations = serde_json::from_str(&json)
        .with_context(|| format!("'{}' is not a JSON object of word → [translations]", path.display()))?;
    tracing::info!("Loaded reference translations for {} words", table.len());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loads_pairs_from_json_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.json");
        fs::write(&path, r#"[["cat", "chat"], ["dog", "chien"]]"#).unwrap();

        let pairs = JsonPairLoader::new(&path).load_pairs().unwrap();
        assert_eq!(pairs, vec![WordPair::new("cat", "chat"), WordPair::new("dog", "chien")]);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.json");
        fs::write(&path, r#"{"cat": "chat"}"#).unwrap();
        assert!(JsonPairLoader::new(&path).load_pairs().is_err());
        assert!(JsonPairLoader::new(dir.path().join("missing.json")).load_pairs().is_err());
    }

    #[test]
    fn test_loads_mark_translations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mark.json");
        fs::write(&path, r#"{"cat": ["chat", "chatte"]}"#).unwrap();
        let table = load_mark_translations(&path).unwrap();
        assert_eq!(table["cat"], vec!["chat".to_string(), "chatte".to_string()]);
    }
}
