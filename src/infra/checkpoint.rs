// ============================================================
// Layer 6: Checkpoint Manager
// ============================================================
// Saves and restores everything a run leaves behind:
//
//   <run_dir>/
//     run_config.json      ← the RunConfig that produced this run
//     transform.mpk.gz     ← the fitted transform's parameters
//     results.json         ← evaluation results and loss history
//
// The config is what makes the weights usable again: `evaluate`
// reads it to rebuild a transform of the same kind and width,
// then loads the saved record into it.
//
// Weights are stored with Burn's named MessagePack recorder at full
// precision. Rotations must stay orthogonal after a reload and
// half precision would break that.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};

use crate::application::train_use_case::{RunConfig, RunResults};

const CONFIG_FILE:    &str = "run_config.json";
const RESULTS_FILE:   &str = "results.json";
const TRANSFORM_FILE: &str = "transform";

type TransformRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

/// Manages the files of one run directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create run directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save a transform's parameters (any transform family).
    pub fn save_transform<B: Backend, M: Module<B>>(&self, model: &M) -> Result<()> {
        // Recorder appends the .mpk.gz extension itself
        let path = self.dir.join(TRANSFORM_FILE);
        TransformRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save transform to '{}'", path.display()))?;
        tracing::debug!("Saved transform to '{}'", path.display());
        Ok(())
    }

    /// Load saved parameters into `model`, which must have the same
    /// family and width as the transform that was saved.
    pub fn load_transform<B: Backend, M: Module<B>>(&self, model: M, device: &B::Device) -> Result<M> {
        let path = self.dir.join(TRANSFORM_FILE);
        let record = TransformRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load transform '{}'. Has this run finished training?", path.display())
            })?;
        Ok(model.load_record(record))
    }

    pub fn save_config(&self, cfg: &RunConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved run config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<RunConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. \
                 Make sure you have run 'train' with this output directory.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save_results(&self, results: &RunResults) -> Result<()> {
        let path = self.dir.join(RESULTS_FILE);
        fs::write(&path, serde_json::to_string_pretty(results)?)
            .with_context(|| format!("Cannot write results to '{}'", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::transforms::{EmbeddingTransform, TransformConfig};
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    #[test]
    fn test_transform_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let device = Default::default();

        let cfg = TransformConfig::new(4);
        let saved = cfg.init_linear::<NdArray>(true, true, &device);
        ckpt.save_transform(&saved).unwrap();

        // A fresh transform has different random weights until loaded
        let fresh = cfg.init_linear::<NdArray>(true, true, &device);
        let loaded = ckpt.load_transform(fresh, &device).unwrap();

        let x = Tensor::<NdArray, 2>::random([3, 4], Distribution::Normal(0.0, 1.0), &device);
        let diff: f32 = (saved.forward(x.clone()) - loaded.forward(x)).abs().max().into_scalar();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let cfg = RunConfig { epochs: 7, ..RunConfig::default() };
        ckpt.save_config(&cfg).unwrap();
        assert_eq!(ckpt.load_config().unwrap().epochs, 7);
    }

    #[test]
    fn test_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        assert!(ckpt.load_config().is_err());
    }
}
