// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Owns one run directory and everything written into it.
//
//   <checkpoint_dir>/
//     lora-knee-20261016-101500/         ← one directory per run
//       train_config.json                ← every hyperparameter
//       lora-knee-20261016-101500_best.mpk.gz
//                                        ← best-validation weights
//       lora-knee-20261016-101500_adapters.mpk.gz
//                                        ← LoRA runs only: adapters + head
//       best.json                        ← {epoch, val_score, test_auc}
//       metrics.csv                      ← written by MetricsLogger
//
// Weights go through Burn's CompactRecorder (MessagePack, gzip,
// half precision). The recorder appends the extension itself.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{prelude::*, record::CompactRecorder};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::domain::{sample::DatasetKind, strategy::TrainType};
use crate::ml::classifier::{ImageClassifier, LoraExport};

const CONFIG_FILE: &str = "train_config.json";
const BEST_FILE:   &str = "best.json";

/// Summary of the best epoch, rewritten whenever it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestRecord {
    pub epoch:     usize,
    pub val_score: f64,
    pub test_auc:  Option<f64>,
}

/// Manages saving and loading of everything in one run directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir:  PathBuf,
    /// File name prefix, the run directory's own name
    stem: String,
}

impl CheckpointManager {
    /// Create a fresh, timestamped run directory under `root`.
    pub fn init_run(root: &Path, train_type: TrainType, dataset: DatasetKind) -> Result<Self> {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let name  = format!("{}-{}-{stamp}", train_type.as_str(), dataset.slug());
        let dir   = root.join(&name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create run directory '{}'", dir.display()))?;
        tracing::info!("Run directory: '{}'", dir.display());
        Ok(Self { dir, stem: name })
    }

    /// Reopen an existing run directory.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            anyhow::bail!("'{}' is not a run directory", dir.display());
        }
        let stem = dir
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned)
            .with_context(|| format!("Run directory '{}' has no usable name", dir.display()))?;
        Ok(Self { dir: dir.to_path_buf(), stem })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the best model, without the recorder's extension
    pub fn best_model_path(&self) -> PathBuf {
        self.dir.join(format!("{}_best", self.stem))
    }

    pub fn adapters_path(&self) -> PathBuf {
        self.dir.join(format!("{}_adapters", self.stem))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!("Cannot read config from '{}'. Is this a training run directory?", path.display())
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Overwrite the best checkpoint with `model`.
    pub fn save_best<B: Backend>(&self, model: &ImageClassifier<B>) -> Result<()> {
        let path = self.best_model_path();
        model
            .clone()
            .save_file(path.clone(), &CompactRecorder::new())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;
        tracing::debug!("Saved best checkpoint '{}'", path.display());
        Ok(())
    }

    /// Load the best checkpoint into a model of the same structure.
    pub fn load_best<B: Backend>(
        &self,
        model:  ImageClassifier<B>,
        device: &B::Device,
    ) -> Result<ImageClassifier<B>> {
        let path = self.best_model_path();
        model
            .load_file(path.clone(), &CompactRecorder::new(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Did the run finish an epoch?", path.display())
            })
    }

    pub fn save_adapters<B: Backend>(&self, export: LoraExport<B>) -> Result<()> {
        let path = self.adapters_path();
        export
            .save_file(path.clone(), &CompactRecorder::new())
            .with_context(|| format!("Failed to save adapters to '{}'", path.display()))?;
        Ok(())
    }

    pub fn load_adapters<B: Backend>(
        &self,
        export: LoraExport<B>,
        device: &B::Device,
    ) -> Result<LoraExport<B>> {
        let path = self.adapters_path();
        export
            .load_file(path.clone(), &CompactRecorder::new(), device)
            .with_context(|| format!("Cannot load adapters '{}'", path.display()))
    }

    pub fn save_best_record(&self, best: &BestRecord) -> Result<()> {
        let path = self.dir.join(BEST_FILE);
        fs::write(&path, serde_json::to_string_pretty(best)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        Ok(())
    }

    pub fn load_best_record(&self) -> Result<BestRecord> {
        let path = self.dir.join(BEST_FILE);
        let s    = fs::read_to_string(&path)
            .with_context(|| format!("Cannot find '{}'", path.display()))?;
        Ok(serde_json::from_str(&s)?)
    }
}
