// ============================================================
// Layer 3: WordPair Domain Type
// ============================================================
// A single (source, target) entry from a bilingual dictionary,
// e.g. ("cat", "chat") for English → French.
//
// Before a pair is tokenised, a SpaceConfig decides whether each
// side gets a leading space. BPE vocabularies usually store
// " chat" (word-initial) and "chat" (word-internal) as different
// tokens, so the same dictionary gives different datasets.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// A bilingual dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WordPair {
    pub source: String,
    pub target: String,
}

impl WordPair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self { source: source.into(), target: target.into() }
    }

    /// True when both sides are the same word ignoring case and
    /// surrounding whitespace. Such pairs teach the transform nothing.
    pub fn is_same_word(&self) -> bool {
        self.source.trim().to_lowercase() == self.target.trim().to_lowercase()
    }

    /// Length in characters of the shorter side.
    pub fn min_chars(&self) -> usize {
        self.source.trim().chars().count().min(self.target.trim().chars().count())
    }
}

// ─── SpaceConfig ──────────────────────────────────────────────────────────────
/// Whether the source and target words are tokenised with a leading space.
///
/// Written in configs as `"<source>:<target>"` where each side is
/// `space` or `none`, e.g. `"space:space"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SpaceConfig {
    pub source_space: bool,
    pub target_space: bool,
}

impl SpaceConfig {
    pub fn new(source_space: bool, target_space: bool) -> Self {
        Self { source_space, target_space }
    }

    /// Apply the spacing to a pair, returning the exact strings to tokenise.
    pub fn apply(&self, pair: &WordPair) -> WordPair {
        WordPair {
            source: with_space(pair.source.trim(), self.source_space),
            target: with_space(pair.target.trim(), self.target_space),
        }
    }
}

fn with_space(word: &str, space: bool) -> String {
    if space { format!(" {word}") } else { word.to_string() }
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl fmt::Display for SpaceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |s: bool| if s { "space" } else { "none" };
        write!(f, "{}:{}", side(self.source_space), side(self.target_space))
    }
}

impl FromStr for SpaceConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parse_side = |side: &str| match side.trim() {
            "space" => Ok(true),
            "none"  => Ok(false),
            other   => bail!("unknown space setting '{other}' (expected 'space' or 'none')"),
        };
        let Some((src, tgt)) = s.split_once(':') else {
            bail!("space config '{s}' must look like 'space:none'");
        };
        Ok(Self::new(parse_side(src)?, parse_side(tgt)?))
    }
}

impl TryFrom<String> for SpaceConfig {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<SpaceConfig> for String {
    fn from(c: SpaceConfig) -> Self {
        c.to_string()
    }
}
