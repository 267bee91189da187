// ============================================================
// Layer 4 — Image Transform
// ============================================================
// Decode → RGB → resize → (random flip) → normalise → CHW f32.
//
// The normalisation constants follow the pretrained weights:
//   ViT (augreg checkpoints)  mean 0.5,  std 0.5
//   ResNet (torchvision)      ImageNet mean/std
//
// Medical images are often greyscale; `to_rgb8` replicates the
// single channel so every backbone sees 3 channels.

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage};
use rand::Rng;
use std::path::Path;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD:  [f32; 3] = [0.229, 0.224, 0.225];
pub const HALF_MEAN:     [f32; 3] = [0.5, 0.5, 0.5];
pub const HALF_STD:      [f32; 3] = [0.5, 0.5, 0.5];

#[derive(Debug, Clone)]
pub struct ImageTransform {
    /// Output images are `size × size`
    pub size: u32,
    pub mean: [f32; 3],
    pub std:  [f32; 3],
    /// Probability of a horizontal flip; 0 disables augmentation
    pub flip_prob: f64,
}

impl ImageTransform {
    pub fn for_vit(size: u32) -> Self {
        Self { size, mean: HALF_MEAN, std: HALF_STD, flip_prob: 0.0 }
    }

    pub fn for_resnet(size: u32) -> Self {
        Self { size, mean: IMAGENET_MEAN, std: IMAGENET_STD, flip_prob: 0.0 }
    }

    /// Same transform with training-time augmentation switched on
    pub fn with_augmentation(mut self) -> Self {
        self.flip_prob = 0.5;
        self
    }

    /// Number of f32 values produced per image
    pub fn numel(&self) -> usize {
        3 * (self.size as usize) * (self.size as usize)
    }

    pub fn load<R: Rng>(&self, path: &Path, rng: &mut R) -> Result<Vec<f32>> {
        let img = image::open(path)
            .with_context(|| format!("failed to open image '{}'", path.display()))?;
        Ok(self.apply(img, rng))
    }

    pub fn apply<R: Rng>(&self, img: DynamicImage, rng: &mut R) -> Vec<f32> {
        let mut img = img.resize_exact(self.size, self.size, FilterType::Triangle);
        if self.flip_prob > 0.0 && rng.gen_bool(self.flip_prob.min(1.0)) {
            img = img.fliph();
        }
        let rgb = img.to_rgb8();

        // CHW order: all red values, then green, then blue
        let mut out = Vec::with_capacity(self.numel());
        for c in 0..3 {
            for p in rgb.pixels() {
                let v = p[c] as f32 / 255.0;
                out.push((v - self.mean[c]) / self.std[c]);
            }
        }
        out
    }
}
