// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Implements Burn's Batcher trait: turns a Vec<ImageSample>
// into one ImageBatch on the target device.
//
// Decoding happens here rather than in the dataset so the
// DataLoader's worker threads share the JPEG/PNG work.
//
//   Input:  N samples (paths + labels)
//   Output: images  [N, 3, S, S]   normalised f32
//           targets [N]            class indices
//
// A file that fails to decode is logged and replaced by an
// all-zero image; its label is kept so batch shapes stay fixed.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::transform::ImageTransform;
use crate::domain::sample::ImageSample;

// ─── ImageBatch ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Pixel data — shape: [batch_size, 3, size, size]
    pub images: Tensor<B, 4>,

    /// Ground truth class per sample — shape: [batch_size]
    pub targets: Tensor<B, 1, Int>,

    /// Host copy of the targets, used by the metrics code
    /// without a device round-trip
    pub labels: Vec<usize>,
}

// ─── ImageBatcher ─────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    /// The device to create tensors on
    pub device: B::Device,

    /// Resize / normalise / augment settings
    pub transform: ImageTransform,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device, transform: ImageTransform) -> Self {
        Self { device, transform }
    }
}

impl<B: Backend> Batcher<ImageSample, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageSample>) -> ImageBatch<B> {
        let batch_size = items.len();
        let size       = self.transform.size as usize;
        let mut rng    = rand::thread_rng();

        let mut pixels: Vec<f32> = Vec::with_capacity(batch_size * self.transform.numel());
        for sample in &items {
            match self.transform.load(&sample.path, &mut rng) {
                Ok(values) => pixels.extend(values),
                Err(e) => {
                    tracing::warn!("{e:#}; substituting a blank image");
                    pixels.extend(std::iter::repeat(0.0).take(self.transform.numel()));
                }
            }
        }

        let labels: Vec<usize> = items.iter().map(|s| s.label).collect();
        let label_ints: Vec<i32> = labels.iter().map(|&l| l as i32).collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, 3, size, size]),
            &self.device,
        );
        let targets = Tensor::<B, 1, Int>::from_ints(label_ints.as_slice(), &self.device);

        ImageBatch { images, targets, labels }
    }
}
