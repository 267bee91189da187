// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Re-scores a finished run on its test split:
//
//   Step 1: Open the run directory, read train_config.json
//   Step 2: Rebuild the same fold (the split is deterministic)
//   Step 3: Rebuild the model and load the best checkpoint,
//           or, with `from_adapters`, pretrained backbone +
//           exported LoRA adapters and head
//   Step 4: One test pass through the result tracker
//
// Runs on a plain (non-autodiff) backend.

use anyhow::{bail, Context, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, NdArray, Wgpu},
    prelude::*,
};
use std::path::PathBuf;

use crate::application::train_use_case::TrainConfig;
use crate::domain::strategy::ComputeBackend;
use crate::infra::{
    checkpoint::CheckpointManager,
    result::{EvalSummary, Phase, ResultTracker},
};
use crate::ml::trainer::{eval_epoch, eval_loader, image_transform, num_batches};

#[derive(Debug, Clone)]
pub struct EvaluateRequest {
    pub run_dir:       PathBuf,
    /// Overrides the backend the run was trained on
    pub backend:       Option<ComputeBackend>,
    /// Rebuild from pretrained weights + the adapter export
    pub from_adapters: bool,
}

pub struct EvaluateUseCase {
    request: EvaluateRequest,
}

impl EvaluateUseCase {
    pub fn new(request: EvaluateRequest) -> Self {
        Self { request }
    }

    pub fn execute(&self) -> Result<EvalSummary> {
        let ckpt = CheckpointManager::open(&self.request.run_dir)?;
        let cfg  = ckpt.load_config()?;
        if self.request.from_adapters && cfg.pretrained.is_none() {
            bail!(
                "--from-adapters needs the run's pretrained backbone, but '{}' was trained \
                 from random init; use the full checkpoint instead",
                ckpt.dir().display()
            );
        }

        let best = ckpt.load_best_record().ok();
        if let Some(best) = &best {
            tracing::info!("Best epoch {} (val score {:.3})", best.epoch, best.val_score);
        }

        match self.request.backend.unwrap_or(cfg.backend) {
            ComputeBackend::Wgpu if cfg.amp => {
                self.evaluate_on::<Wgpu<half::f16>>(&cfg, &ckpt, WgpuDevice::default(), best.map(|b| b.epoch))
            }
            ComputeBackend::Wgpu => {
                self.evaluate_on::<Wgpu>(&cfg, &ckpt, WgpuDevice::default(), best.map(|b| b.epoch))
            }
            ComputeBackend::Ndarray => {
                self.evaluate_on::<NdArray>(&cfg, &ckpt, NdArrayDevice::Cpu, best.map(|b| b.epoch))
            }
        }
    }

    fn evaluate_on<B: Backend>(
        &self,
        cfg:    &TrainConfig,
        ckpt:   &CheckpointManager,
        device: B::Device,
        epoch:  Option<usize>,
    ) -> Result<EvalSummary> {
        let split     = cfg.load_split()?;
        let model_cfg = cfg.classifier_config();

        let model = if self.request.from_adapters {
            let base = model_cfg.build::<B>(cfg.pretrained.as_deref(), &device)?;
            let template = base
                .lora_export()
                .context("--from-adapters only applies to LoRA runs")?;
            let export = ckpt.load_adapters(template, &device)?;
            base.with_lora_export(export)
        } else {
            ckpt.load_best(model_cfg.init::<B>(&device), &device)?
        };

        let transform = image_transform(&model_cfg);
        let batches   = num_batches(split.test.len(), cfg.batch_size);
        let loader    = eval_loader::<B>(split.test, &transform, cfg, &device);

        let mut tracker = ResultTracker::new(cfg.num_classes);
        eval_epoch(epoch.unwrap_or(0), &model, &loader, &mut tracker, Phase::Test, batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{sample::DatasetKind, strategy::TrainType};

    fn lora_run(root: &std::path::Path) -> CheckpointManager {
        let cfg  = TrainConfig { train_type: TrainType::Lora, pretrained: None, ..TrainConfig::default() };
        let ckpt = CheckpointManager::init_run(root, TrainType::Lora, DatasetKind::Knee).unwrap();
        ckpt.save_config(&cfg).unwrap();
        ckpt
    }

    #[test]
    fn test_from_adapters_without_pretrained_backbone_is_rejected() {
        let runs = tempfile::tempdir().unwrap();
        let ckpt = lora_run(runs.path());

        let request = EvaluateRequest {
            run_dir:       ckpt.dir().to_path_buf(),
            backend:       Some(ComputeBackend::Ndarray),
            from_adapters: true,
        };
        let err = EvaluateUseCase::new(request).execute().unwrap_err();
        assert!(err.to_string().contains("--from-adapters"), "{err}");
    }

    #[test]
    fn test_missing_run_directory_is_an_error() {
        let request = EvaluateRequest {
            run_dir:       PathBuf::from("/nonexistent/run"),
            backend:       None,
            from_adapters: false,
        };
        assert!(EvaluateUseCase::new(request).execute().is_err());
    }
}
