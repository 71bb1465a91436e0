// ============================================================
// Layer 6: Embedding Pair Cache
// ============================================================
// Filtering a dictionary through the tokenizer and gathering
// embedding rows is repeated by every run of a sweep that uses
// the same dataset. The result is cached as a safetensors file:
//
//   source      f32 [n, d_model]
//   target      f32 [n, d_model]
//   source_ids  u32 [n]
//   target_ids  u32 [n]
//   metadata    "pairs" → JSON list of the (spaced) word pairs
//
// The file name encodes everything that changes the contents:
//   <dataset>__<tensor>__<space configs>__min<N>[__keepsame][__diffcase][__ln].safetensors
//
// Saving then loading reproduces every value bit for bit.

use std::collections::HashMap;
use std::{fs, path::{Path, PathBuf}};

use anyhow::{bail, Context, Result};
use safetensors::{
    tensor::{Dtype, TensorView},
    SafeTensors,
};

use crate::data::dataset::EmbeddingPair;
use crate::domain::word_pair::{SpaceConfig, WordPair};
use crate::infra::embedding_store::{f32_from_le_bytes, f32_to_le_bytes};

const PAIRS_KEY: &str = "pairs";

/// Everything that determines the contents of a cached dataset.
#[derive(Debug, Clone)]
pub struct CacheKey<'a> {
    pub dataset:           &'a Path,
    pub tensor_name:       &'a str,
    pub space_configs:     &'a [SpaceConfig],
    pub min_length:        usize,
    pub discard_if_same:   bool,
    pub capture_diff_case: bool,
    pub embed_ln:          bool,
}

impl CacheKey<'_> {
    pub fn file_name(&self) -> String {
        let dataset = self.dataset
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dataset");
        let spaces: Vec<String> = self.space_configs
            .iter()
            .map(|c| c.to_string().replace(':', "-"))
            .collect();
        let mut name = format!(
            "{}__{}__{}__min{}",
            sanitize(dataset),
            sanitize(self.tensor_name),
            spaces.join("+"),
            self.min_length,
        );
        if !self.discard_if_same {
            name.push_str("__keepsame");
        }
        if self.capture_diff_case {
            name.push_str("__diffcase");
        }
        if self.embed_ln {
            name.push_str("__ln");
        }
        name + ".safetensors"
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

pub struct PairCache {
    dir: PathBuf,
}

impl PairCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &CacheKey<'_>) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Load the cached pairs for `key`, or build and cache them.
    pub fn load_or_build<F>(&self, key: &CacheKey<'_>, build: F) -> Result<Vec<EmbeddingPair>>
    where
        F: FnOnce() -> Result<Vec<EmbeddingPair>>,
    {
        let path = self.path_for(key);
        if path.exists() {
            tracing::info!("Loading cached embedding pairs from '{}'", path.display());
            return load_pairs(&path);
        }
        let pairs = build()?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create cache directory '{}'", self.dir.display()))?;
        save_pairs(&path, &pairs)?;
        tracing::info!("Cached {} embedding pairs to '{}'", pairs.len(), path.display());
        Ok(pairs)
    }
}

pub fn save_pairs(path: &Path, pairs: &[EmbeddingPair]) -> Result<()> {
    let n = pairs.len();
    let d = pairs.first().map(|p| p.d_model()).unwrap_or(0);
    if let Some(bad) = pairs.iter().find(|p| p.source.len() != d || p.target.len() != d) {
        bail!("pair '{}' → '{}' has a different embedding width than the rest", bad.pair.source, bad.pair.target);
    }

    let source: Vec<f32> = pairs.iter().flat_map(|p| p.source.iter().copied()).collect();
    let target: Vec<f32> = pairs.iter().flat_map(|p| p.target.iter().copied()).collect();
    let source_ids: Vec<u8> = pairs.iter().flat_map(|p| p.source_id.to_le_bytes()).collect();
    let target_ids: Vec<u8> = pairs.iter().flat_map(|p| p.target_id.to_le_bytes()).collect();
    let source = f32_to_le_bytes(&source);
    let target = f32_to_le_bytes(&target);

    let words: Vec<&WordPair> = pairs.iter().map(|p| &p.pair).collect();
    let metadata = HashMap::from([(PAIRS_KEY.to_string(), serde_json::to_string(&words)?)]);

    let tensors = [
        ("source",     TensorView::new(Dtype::F32, vec![n, d], &source)?),
        ("target",     TensorView::new(Dtype::F32, vec![n, d], &target)?),
        ("source_ids", TensorView::new(Dtype::U32, vec![n], &source_ids)?),
        ("target_ids", TensorView::new(Dtype::U32, vec![n], &target_ids)?),
    ];
    let bytes = safetensors::serialize(tensors, &Some(metadata))?;
    fs::write(path, bytes)
        .with_context(|| format!("Cannot write cache file '{}'", path.display()))?;
    Ok(())
}

pub fn load_pairs(path: &Path) -> Result<Vec<EmbeddingPair>> {
    let bytes = fs::read(path)
        .with_context(|| format!("Cannot read cache file '{}'", path.display()))?;

    let (_, header) = SafeTensors::read_metadata(&bytes)?;
    let words: Vec<WordPair> = match header.metadata().as_ref().and_then(|m| m.get(PAIRS_KEY)) {
        Some(json) => serde_json::from_str(json)?,
        None => bail!("cache file '{}' has no word-pair metadata", path.display()),
    };

    let tensors = SafeTensors::deserialize(&bytes)?;
    let source = tensors.tensor("source")?;
    let d = source.shape().get(1).copied().unwrap_or(0);
    let source = f32_from_le_bytes(source.data());
    let target = f32_from_le_bytes(tensors.tensor("target")?.data());
    let source_ids = u32_from_le_bytes(tensors.tensor("source_ids")?.data());
    let target_ids = u32_from_le_bytes(tensors.tensor("target_ids")?.data());

    let n = words.len();
    if source_ids.len() != n || target_ids.len() != n || source.len() != n * d || target.len() != n * d {
        bail!("cache file '{}' is inconsistent ({} pairs, {} ids)", path.display(), n, source_ids.len());
    }

    Ok(words
        .into_iter()
        .enumerate()
        .map(|(i, pair)| EmbeddingPair {
            pair,
            source_id: source_ids[i],
            target_id: target_ids[i],
            source:    source[i * d..(i + 1) * d].to_vec(),
            target:    target[i * d..(i + 1) * d].to_vec(),
        })
        .collect())
}

fn u32_from_le_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
