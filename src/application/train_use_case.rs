// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one training run in order:
//
//   Step 1: Resolve the dataset from the data path   (Layer 3 - domain)
//   Step 2: Create the run directory, save config    (Layer 6 - infra)
//   Step 3: Discover labelled images                 (Layer 4 - data)
//   Step 4: Split train / val / test for the fold    (Layer 4 - data)
//   Step 5: Pick the compute backend                 (this file)
//   Step 6: Build the model for the strategy         (Layer 5 - ml)
//   Step 7: Run the epoch loop                       (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{bail, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::{
    error::DataError,
    loader::load_samples,
    splitter::{split_for_fold, FoldSplit},
};
use crate::domain::{
    sample::DatasetKind,
    strategy::{ComputeBackend, TrainType, VitSize},
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::MetricsLogger,
    result::ResultTracker,
};
use crate::ml::{
    classifier::{params_in_millions, ClassifierConfig},
    lora::LoraConfig,
    trainer::{run_training, MIN_LR},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Every hyperparameter of a run. Written to train_config.json in
// the run directory so `evaluate` can rebuild the same model and
// the same split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub batch_size:     usize,
    pub fold:           usize,
    pub data_path:      String,
    /// Split file name, relative to the data path
    pub data_info:      String,
    /// Annotation CSV name, relative to the data path
    pub annotation:     String,
    pub lr:             f64,
    pub epochs:         usize,
    pub num_workers:    usize,
    pub num_classes:    usize,
    pub train_type:     TrainType,
    pub rank:           usize,
    /// LoRA scaling numerator; defaults to the rank (scale 1)
    pub lora_alpha:     Option<f64>,
    pub vit:            VitSize,
    pub pretrained:     Option<PathBuf>,
    pub checkpoint_dir: String,
    pub backend:        ComputeBackend,
    pub amp:            bool,
    pub seed:           u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size:     16,
            fold:           0,
            data_path:      "../data/NIH_X-ray/".to_string(),
            data_info:      "nih_split_712.json".to_string(),
            annotation:     "Data_Entry_2017_jpg.csv".to_string(),
            lr:             1e-3,
            epochs:         20,
            num_workers:    4,
            num_classes:    14,
            train_type:     TrainType::Linear,
            rank:           4,
            lora_alpha:     None,
            vit:            VitSize::Base,
            pretrained:     None,
            checkpoint_dir: "checkpoints".to_string(),
            backend:        ComputeBackend::Wgpu,
            amp:            false,
            seed:           42,
        }
    }
}

impl TrainConfig {
    /// Reject settings that would only fail later, mid-run.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("--batch-size must be at least 1");
        }
        if self.epochs == 0 {
            bail!("--epochs must be at least 1");
        }
        if self.num_classes < 2 {
            bail!("--num-classes must be at least 2, got {}", self.num_classes);
        }
        if self.train_type == TrainType::Lora && self.rank == 0 {
            bail!("--rank must be at least 1 for LoRA");
        }
        // the cosine schedule anneals down to MIN_LR and caps the start at 1
        if !(MIN_LR..=1.0).contains(&self.lr) {
            bail!("--lr must lie in [{MIN_LR:e}, 1], got {}", self.lr);
        }
        Ok(())
    }

    pub fn dataset_kind(&self) -> Result<DatasetKind, DataError> {
        DatasetKind::from_data_path(&self.data_path)
            .ok_or_else(|| DataError::UnknownDataset(self.data_path.clone()))
    }

    pub fn data_root(&self) -> &Path {
        Path::new(&self.data_path)
    }

    pub fn lora_config(&self) -> LoraConfig {
        LoraConfig::new(self.rank, self.lora_alpha.unwrap_or(self.rank as f64))
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig::for_strategy(self.train_type, self.vit, self.num_classes, self.lora_config())
    }

    /// Discover samples and cut this run's fold. Deterministic for a
    /// given config, so evaluation sees the same test split.
    pub fn load_split(&self) -> Result<FoldSplit> {
        let kind = self.dataset_kind()?;
        let root = self.data_root();
        let (samples, class_names) = load_samples(kind, root, Some(&root.join(&self.annotation)))?;
        tracing::info!(
            "Found {} images in {} classes: {}",
            samples.len(),
            class_names.len(),
            class_names.join(", ")
        );

        if class_names.len() != self.num_classes {
            tracing::warn!(
                "--num-classes is {} but the data has {} classes ({} natively)",
                self.num_classes,
                class_names.len(),
                kind.native_num_classes()
            );
        }
        if let Some(bad) = samples.iter().find(|s| s.label >= self.num_classes) {
            return Err(DataError::LabelOutOfRange {
                path:        bad.path.clone(),
                label:       bad.label,
                num_classes: self.num_classes,
            }
            .into());
        }

        let split = split_for_fold(samples, root, Some(&root.join(&self.data_info)), self.fold, self.seed)?;
        split.ensure_non_empty()?;
        tracing::info!(
            "Split: {} train, {} validation, {} test",
            split.train.len(),
            split.val.len(),
            split.test.len()
        );
        Ok(split)
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end.
    /// Returns the run directory.
    pub fn execute(&self) -> Result<PathBuf> {
        let cfg = &self.config;
        cfg.validate()?;
        tracing::info!("{cfg:?}");

        // ── Steps 1-2: dataset + run directory ───────────────────────────────
        let kind = cfg.dataset_kind()?;
        let ckpt = CheckpointManager::init_run(Path::new(&cfg.checkpoint_dir), cfg.train_type, kind)?;
        ckpt.save_config(cfg)?;
        let metrics = MetricsLogger::new(ckpt.dir())?;

        // ── Steps 3-4: samples + fold ────────────────────────────────────────
        let split = cfg.load_split()?;

        // ── Steps 5-7: backend, model, training ──────────────────────────────
        let tracker = match (cfg.backend, cfg.amp) {
            (ComputeBackend::Wgpu, false) => {
                train_on::<Autodiff<Wgpu>>(cfg, split, &ckpt, &metrics, WgpuDevice::default())?
            }
            (ComputeBackend::Wgpu, true) => {
                tracing::info!("Mixed precision: f16 weights and activations");
                train_on::<Autodiff<Wgpu<half::f16>>>(cfg, split, &ckpt, &metrics, WgpuDevice::default())?
            }
            (ComputeBackend::Ndarray, amp) => {
                if amp {
                    tracing::warn!("--amp has no effect on the ndarray backend");
                }
                train_on::<Autodiff<NdArray>>(cfg, split, &ckpt, &metrics, NdArrayDevice::Cpu)?
            }
        };

        if tracker.test.is_none() {
            tracing::warn!("No epoch produced a usable validation score; no checkpoint was saved");
        }
        Ok(ckpt.dir().to_path_buf())
    }
}

fn train_on<B: AutodiffBackend>(
    cfg:     &TrainConfig,
    split:   FoldSplit,
    ckpt:    &CheckpointManager,
    metrics: &MetricsLogger,
    device:  B::Device,
) -> Result<ResultTracker> {
    tracing::info!("Using device: {:?}", device);

    let model_cfg = cfg.classifier_config();
    let model     = model_cfg.build::<B>(cfg.pretrained.as_deref(), &device)?;
    let trainable = model.trainable_params(cfg.train_type);
    println!("trainable parameters: {:.3}M", params_in_millions(trainable));

    run_training(cfg, &model_cfg, model, split, ckpt, metrics, &device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_script() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.batch_size, 16);
        assert_eq!(cfg.num_classes, 14);
        assert_eq!(cfg.train_type, TrainType::Linear);
        assert_eq!(cfg.lora_config().scale(), 1.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_unknown_data_path_is_an_error() {
        let cfg = TrainConfig::default();
        let err = cfg.dataset_kind().unwrap_err();
        assert!(matches!(err, DataError::UnknownDataset(_)));
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let zero_bs = TrainConfig { batch_size: 0, ..TrainConfig::default() };
        assert!(zero_bs.validate().is_err());

        let lora_r0 = TrainConfig { train_type: TrainType::Lora, rank: 0, ..TrainConfig::default() };
        assert!(lora_r0.validate().is_err());
    }

    #[test]
    fn test_lr_outside_schedule_range_is_rejected() {
        for lr in [2.0, 1e-7, 0.0, -1e-3, f64::NAN] {
            let cfg = TrainConfig { lr, ..TrainConfig::default() };
            assert!(cfg.validate().is_err(), "lr {lr} should be rejected");
        }
        for lr in [MIN_LR, 1e-3, 1.0] {
            let cfg = TrainConfig { lr, ..TrainConfig::default() };
            assert!(cfg.validate().is_ok(), "lr {lr} should be accepted");
        }
    }

    #[test]
    fn test_config_json_round_trip() {
        let cfg  = TrainConfig { train_type: TrainType::Lora, lora_alpha: Some(8.0), ..TrainConfig::default() };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"train_type\":\"lora\""));

        let back: TrainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.lora_config().scale(), 2.0);
        assert_eq!(back.vit, VitSize::Base);
    }

    #[test]
    fn test_label_beyond_num_classes_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let data = root.path().join(DatasetKind::BLOOD_CELL_DIR);
        for class in ["EOSINOPHIL", "LYMPHOCYTE", "MONOCYTE"] {
            let dir = data.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            image::RgbImage::new(4, 4).save(dir.join("a.png")).unwrap();
        }
        let cfg = TrainConfig {
            data_path: data.to_string_lossy().into_owned(),
            num_classes: 2,
            ..TrainConfig::default()
        };
        let err = cfg.load_split().unwrap_err();
        assert!(err.downcast_ref::<DataError>().is_some_and(|e| matches!(e, DataError::LabelOutOfRange { .. })));
    }
}
