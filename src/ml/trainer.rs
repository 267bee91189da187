// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Epoch loop with Burn's DataLoader, Adam and a cosine LR
// schedule:
//
//   for epoch in 1..=epochs
//     lr = scheduler.step()                    once per epoch
//     train_epoch   forward → loss → backward → Adam step
//     eval_epoch    validation split, inner backend, no autodiff
//     if validation improved
//         save best checkpoint (+ LoRA adapters)
//         eval_epoch on the test split
//         log BEST VAL / TEST / EPOCH
//
// Loss is cross-entropy with label smoothing 0.1. Gradients are
// rebuilt from scratch by every backward pass, so there is no
// explicit zero-grad step.
//
// Loss guard: a batch whose loss is NaN or infinite (an f16
// overflow under --amp, typically) is skipped without an
// optimiser step and counted.
//
// Key Burn insight:
//   - training runs on B (Autodiff<...>)
//   - model.valid() returns the model on B::InnerBackend
//   - validation and test batchers therefore use B::InnerBackend
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam,
//            Loshchilov & Hutter (2017) SGDR

use anyhow::{anyhow, Result};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    lr_scheduler::{cosine::CosineAnnealingLrSchedulerConfig, LrScheduler},
    module::AutodiffModule,
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{activation::softmax, backend::AutodiffBackend},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

use crate::application::train_use_case::TrainConfig;
use crate::domain::sample::ImageSample;
use crate::data::{
    batcher::{ImageBatch, ImageBatcher},
    dataset::ImageDataset,
    splitter::FoldSplit,
    transform::ImageTransform,
};
use crate::infra::{
    checkpoint::{BestRecord, CheckpointManager},
    metrics::{EpochMetrics, MetricsLogger},
    result::{EvalSummary, Phase, ResultTracker},
};
use crate::ml::classifier::{ClassifierConfig, ImageClassifier};

pub const LABEL_SMOOTHING: f32 = 0.1;
/// Floor of the cosine schedule
pub const MIN_LR: f64 = 1e-6;

pub type Loader<B> = Arc<dyn DataLoader<ImageBatch<B>>>;

/// Result of one training pass
#[derive(Debug, Clone, Copy)]
pub struct EpochLoss {
    /// Mean loss over the batches that were stepped on
    pub loss:    f64,
    pub skipped: usize,
}

fn progress_bar(len: usize, label: &'static str) -> ProgressBar {
    let bar   = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template(
        "{prefix:>5} {elapsed_precise} │{bar:40.cyan/blue}│ {pos}/{len} • eta {eta} • {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▓░");
    bar.set_style(style);
    bar.set_prefix(label);
    bar
}

pub fn num_batches(samples: usize, batch_size: usize) -> usize {
    samples.div_ceil(batch_size.max(1))
}

/// Pixel pipeline matching the backbone's pretraining.
pub fn image_transform(model_cfg: &ClassifierConfig) -> ImageTransform {
    let size = model_cfg.image_size() as u32;
    if model_cfg.train_type.uses_vit() {
        ImageTransform::for_vit(size)
    } else {
        ImageTransform::for_resnet(size)
    }
}

/// Unshuffled, unaugmented loader for validation or test samples.
pub fn eval_loader<B: Backend>(
    samples:   Vec<ImageSample>,
    transform: &ImageTransform,
    cfg:       &TrainConfig,
    device:    &B::Device,
) -> Loader<B> {
    let mut builder = DataLoaderBuilder::new(ImageBatcher::<B>::new(device.clone(), transform.clone()))
        .batch_size(cfg.batch_size);
    if cfg.num_workers > 0 {
        builder = builder.num_workers(cfg.num_workers);
    }
    builder.build(ImageDataset::new(samples))
}

/// One pass over the training split.
pub fn train_epoch<B, O>(
    epoch:   usize,
    mut model: ImageClassifier<B>,
    optim:   &mut O,
    loader:  &Loader<B>,
    loss_fn: &CrossEntropyLoss<B>,
    lr:      f64,
    batches: usize,
) -> (ImageClassifier<B>, EpochLoss)
where
    B: AutodiffBackend,
    O: Optimizer<ImageClassifier<B>, B>,
{
    let bar = progress_bar(batches, "train");
    let mut loss_sum = 0.0f64;
    let mut stepped  = 0usize;
    let mut skipped  = 0usize;

    for batch in loader.iter() {
        let (loss, _) = model.forward_loss(batch.images, batch.targets, loss_fn);
        let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
        bar.inc(1);

        if !loss_val.is_finite() {
            skipped += 1;
            tracing::warn!("epoch {epoch}: non-finite loss, optimiser step skipped");
            continue;
        }
        loss_sum += loss_val;
        stepped  += 1;

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(lr, model, grads);
        bar.set_message(format!("loss {:.4}", loss_sum / stepped as f64));
    }
    bar.finish_and_clear();

    let loss = if stepped > 0 { loss_sum / stepped as f64 } else { f64::NAN };
    tracing::info!("EPOCH: {epoch}, LOSS: {loss:.3}, LR: {lr:.2e}");
    if skipped > 0 {
        tracing::warn!("epoch {epoch}: {skipped} step(s) skipped");
    }
    (model, EpochLoss { loss, skipped })
}

/// One pass over an evaluation split. Probabilities go into
/// `tracker`, which prints and returns the summary.
pub fn eval_epoch<B: Backend>(
    epoch:   usize,
    model:   &ImageClassifier<B>,
    loader:  &Loader<B>,
    tracker: &mut ResultTracker,
    phase:   Phase,
    batches: usize,
) -> Result<EvalSummary> {
    tracker.init();
    let bar = progress_bar(batches, phase.as_str());

    for batch in loader.iter() {
        let probs  = softmax(model.forward(batch.images), 1);
        let values = probs
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("cannot read probabilities: {e:?}"))?;
        tracker.eval(&batch.labels, &values);
        bar.inc(1);
    }
    bar.finish_and_clear();

    Ok(tracker.print(epoch, phase))
}

/// Full training run. Returns the tracker holding the best epoch
/// and the test summary taken there.
pub fn run_training<B: AutodiffBackend>(
    cfg:       &TrainConfig,
    model_cfg: &ClassifierConfig,
    mut model: ImageClassifier<B>,
    split:     FoldSplit,
    ckpt:      &CheckpointManager,
    metrics:   &MetricsLogger,
    device:    &B::Device,
) -> Result<ResultTracker> {
    let transform = image_transform(model_cfg);
    let n_train   = num_batches(split.train.len(), cfg.batch_size);
    let n_val     = num_batches(split.val.len(), cfg.batch_size);
    let n_test    = num_batches(split.test.len(), cfg.batch_size);

    // ── Data loaders ──────────────────────────────────────────────────────────
    let mut train_builder = DataLoaderBuilder::new(ImageBatcher::<B>::new(
        device.clone(),
        transform.clone().with_augmentation(),
    ))
    .batch_size(cfg.batch_size)
    .shuffle(cfg.seed);
    if cfg.num_workers > 0 {
        train_builder = train_builder.num_workers(cfg.num_workers);
    }
    let train_set = ImageDataset::new(split.train);
    tracing::info!("Train samples per class: {:?}", train_set.class_counts(cfg.num_classes));
    let train_loader: Loader<B> = train_builder.build(train_set);

    // validation / test run on the inner backend, in file order
    let val_loader  = eval_loader::<B::InnerBackend>(split.val, &transform, cfg, device);
    let test_loader = eval_loader::<B::InnerBackend>(split.test, &transform, cfg, device);

    // ── Loss, optimiser, schedule ─────────────────────────────────────────────
    let loss_fn = CrossEntropyLossConfig::new()
        .with_smoothing(Some(LABEL_SMOOTHING))
        .init(device);
    let mut optim     = AdamConfig::new().init();
    let mut scheduler = CosineAnnealingLrSchedulerConfig::new(cfg.lr, cfg.epochs.max(1))
        .with_min_lr(MIN_LR)
        .init()
        .map_err(|e| anyhow!("invalid LR schedule: {e}"))?;

    let mut tracker = ResultTracker::new(cfg.num_classes);

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {
        let lr = scheduler.step();

        let (trained, stats) =
            train_epoch(epoch, model, &mut optim, &train_loader, &loss_fn, lr, n_train);
        model = trained;

        let model_valid = model.valid();
        let val = eval_epoch(epoch, &model_valid, &val_loader, &mut tracker, Phase::Val, n_val)?;

        let mut test_auc = None;
        let best = tracker.is_best_epoch();
        if best {
            ckpt.save_best(&model_valid)?;
            // adapters alone are only usable on top of a known backbone
            if let (Some(export), Some(_)) = (model_valid.lora_export(), &cfg.pretrained) {
                ckpt.save_adapters(export)?;
            }
            let test = eval_epoch(epoch, &model_valid, &test_loader, &mut tracker, Phase::Test, n_test)?;
            test_auc = Some(test.auc);

            tracing::info!(
                "BEST VAL: {:.3}, TEST: {:.3}, EPOCH: {:3}",
                tracker.best_val_score,
                tracker.test_auc(),
                tracker.best_epoch,
            );
            ckpt.save_best_record(&BestRecord {
                epoch,
                val_score: tracker.best_val_score,
                test_auc,
            })?;
        }

        metrics.log(&EpochMetrics {
            epoch,
            train_loss: stats.loss,
            lr,
            skipped_steps: stats.skipped,
            val_acc: val.acc,
            val_f1: val.f1,
            val_auc: val.auc,
            best,
            test_auc,
        })?;
    }

    tracing::info!(
        "Training complete. Best epoch {} (val {:.3}, test AUC {:.3})",
        tracker.best_epoch,
        tracker.best_val_score,
        tracker.test_auc(),
    );
    Ok(tracker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{sample::DatasetKind, strategy::TrainType};
    use crate::ml::{lora::LoraConfig, resnet::ResNetConfig, vit::VisionTransformerConfig};
    use burn::backend::{Autodiff, NdArray};
    use image::{Rgb, RgbImage};

    type TestBackend = Autodiff<NdArray>;

    fn write_images(dir: &std::path::Path, n: usize) -> Vec<ImageSample> {
        (0..n)
            .map(|i| {
                let label = i % 2;
                let shade = if label == 0 { 20 } else { 230 };
                let path  = dir.join(format!("img_{i}.png"));
                RgbImage::from_pixel(16, 16, Rgb([shade, shade, shade])).save(&path).unwrap();
                ImageSample::new(path, label)
            })
            .collect()
    }

    #[test]
    fn test_two_epoch_lora_run_writes_run_artifacts() {
        let data = tempfile::tempdir().unwrap();
        let runs = tempfile::tempdir().unwrap();
        let samples = write_images(data.path(), 8);
        let split = FoldSplit {
            train: samples[..4].to_vec(),
            val:   samples[4..6].to_vec(),
            test:  samples[6..].to_vec(),
        };

        let cfg = TrainConfig {
            batch_size: 2,
            epochs: 2,
            num_classes: 2,
            num_workers: 0,
            train_type: TrainType::Lora,
            ..TrainConfig::default()
        };
        let model_cfg = ClassifierConfig::new(
            TrainType::Lora,
            2,
            VisionTransformerConfig::new(8, 1, 2).with_image_size(16).with_patch_size(8),
            ResNetConfig::new(),
            LoraConfig::new(2, 2.0),
        );

        let device  = Default::default();
        let model   = model_cfg.build::<TestBackend>(None, &device).unwrap();
        let ckpt    = CheckpointManager::init_run(runs.path(), TrainType::Lora, DatasetKind::ChestXray).unwrap();
        let metrics = MetricsLogger::new(ckpt.dir()).unwrap();

        let tracker = run_training(&cfg, &model_cfg, model, split, &ckpt, &metrics, &device).unwrap();

        // the first epoch always beats -inf
        assert!(tracker.best_epoch >= 1);
        assert!(tracker.test.is_some());
        assert!(ckpt.best_model_path().with_extension("mpk.gz").is_file());
        // no pretrained backbone, so no standalone adapter export
        assert!(!ckpt.adapters_path().with_extension("mpk.gz").exists());
        assert_eq!(ckpt.load_best_record().unwrap().epoch, tracker.best_epoch);

        let csv = std::fs::read_to_string(metrics.csv_path()).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_batch_count_rounds_up() {
        assert_eq!(num_batches(10, 4), 3);
        assert_eq!(num_batches(8, 4), 2);
        assert_eq!(num_batches(0, 4), 0);
    }
}
