// ============================================================
// Layer 5 — Image Classifier
// ============================================================
// Backbone + fresh linear head, assembled per strategy:
//
//   strategy  backbone    frozen   adapters   trainable
//   ────────  ─────────   ──────   ────────   ─────────────────
//   lora      ViT         yes      q, v       adapters + head
//   full      ViT         no       -          everything
//   linear    ViT         yes      -          head
//   resnet50  ResNet-50   no       -          everything
//
// Build order matters: pretrained weights are imported into the
// bare backbone first, then the backbone is frozen, then the
// adapters are injected. Adapters created after `no_grad()`
// keep their gradients.

use anyhow::Result;
use burn::{
    nn::{loss::CrossEntropyLoss, Linear, LinearConfig},
    prelude::*,
};
use std::path::Path;

use crate::domain::strategy::{TrainType, VitSize};
use crate::ml::lora::{LoraConfig, LoraQv};
use crate::ml::pretrained;
use crate::ml::resnet::{ResNet, ResNetConfig};
use crate::ml::vit::{VisionTransformer, VisionTransformerConfig};

#[derive(Config, Debug)]
pub struct ClassifierConfig {
    pub train_type:  TrainType,
    pub num_classes: usize,
    pub vit:         VisionTransformerConfig,
    pub resnet:      ResNetConfig,
    pub lora:        LoraConfig,
}

impl ClassifierConfig {
    /// Standard 224×224 backbones for a strategy.
    pub fn for_strategy(
        train_type:  TrainType,
        vit_size:    VitSize,
        num_classes: usize,
        lora:        LoraConfig,
    ) -> Self {
        Self::new(
            train_type,
            num_classes,
            VisionTransformerConfig::from_size(vit_size),
            ResNetConfig::new(),
            lora,
        )
    }

    pub fn feature_dim(&self) -> usize {
        if self.train_type.uses_vit() {
            self.vit.embed_dim
        } else {
            self.resnet.feature_dim()
        }
    }

    /// Input resolution the backbone expects
    pub fn image_size(&self) -> usize {
        if self.train_type.uses_vit() { self.vit.image_size } else { 224 }
    }

    /// Randomly initialised model with the strategy's structure
    /// (adapters included) and nothing frozen. Used as the
    /// skeleton a saved checkpoint is loaded into.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ImageClassifier<B> {
        let (vit, resnet) = if self.train_type.uses_vit() {
            let vit = self.vit.init(device);
            let vit = match self.train_type {
                TrainType::Lora => vit.with_lora(&self.lora, device),
                _ => vit,
            };
            (Some(vit), None)
        } else {
            (None, Some(self.resnet.init(device)))
        };
        ImageClassifier { vit, resnet, head: self.init_head(device) }
    }

    /// Training model: optional pretrained import, then freezing
    /// and adapter injection as the strategy requires.
    pub fn build<B: Backend>(
        &self,
        pretrained: Option<&Path>,
        device:     &B::Device,
    ) -> Result<ImageClassifier<B>> {
        let (vit, resnet) = if self.train_type.uses_vit() {
            let mut vit = self.vit.init(device);
            if let Some(path) = pretrained {
                vit = pretrained::load_vit(vit, path, device)?;
            }
            if self.train_type.freezes_backbone() {
                vit = vit.no_grad();
            }
            if self.train_type == TrainType::Lora {
                vit = vit.with_lora(&self.lora, device);
            }
            (Some(vit), None)
        } else {
            let mut resnet = self.resnet.init(device);
            if let Some(path) = pretrained {
                resnet = pretrained::load_resnet(resnet, path, device)?;
            }
            (None, Some(resnet))
        };

        if pretrained.is_none() {
            tracing::warn!("No pretrained weights given; the backbone starts from random init");
        }
        Ok(ImageClassifier { vit, resnet, head: self.init_head(device) })
    }

    fn init_head<B: Backend>(&self, device: &B::Device) -> Linear<B> {
        LinearConfig::new(self.feature_dim(), self.num_classes).init(device)
    }
}

#[derive(Module, Debug)]
pub struct ImageClassifier<B: Backend> {
    /// Set for lora / full / linear
    pub vit:    Option<VisionTransformer<B>>,
    /// Set for resnet50
    pub resnet: Option<ResNet<B>>,
    pub head:   Linear<B>,
}

/// Everything a LoRA run learns, separate from the frozen backbone.
#[derive(Module, Debug)]
pub struct LoraExport<B: Backend> {
    pub adapters: Vec<Option<LoraQv<B>>>,
    pub head:     Linear<B>,
}

impl<B: Backend> ImageClassifier<B> {
    /// images: [batch, 3, H, W] → logits [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = match (&self.vit, &self.resnet) {
            (Some(vit), _)       => vit.forward_features(images),
            (None, Some(resnet)) => resnet.forward_features(images),
            (None, None)         => unreachable!("ImageClassifier is always built with a backbone"),
        };
        self.head.forward(features)
    }

    /// Forward pass plus loss. Returns (loss, logits).
    pub fn forward_loss(
        &self,
        images:  Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
        loss_fn: &CrossEntropyLoss<B>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(images);
        let loss   = loss_fn.forward(logits.clone(), targets);
        (loss, logits)
    }

    /// Parameters the optimiser updates under `train_type`
    pub fn trainable_params(&self, train_type: TrainType) -> usize {
        let head = self.head.num_params();
        match train_type {
            TrainType::Linear => head,
            TrainType::Lora   => head + self.vit.as_ref().map_or(0, |v| v.lora_param_count()),
            TrainType::Full | TrainType::Resnet50 => self.num_params(),
        }
    }

    /// Adapters and head of a LoRA model; None for other strategies.
    pub fn lora_export(&self) -> Option<LoraExport<B>> {
        let vit = self.vit.as_ref()?;
        let adapters = vit.lora_adapters();
        if adapters.iter().all(Option::is_none) {
            return None;
        }
        Some(LoraExport { adapters, head: self.head.clone() })
    }

    /// Put exported adapters and head back onto a backbone.
    pub fn with_lora_export(mut self, export: LoraExport<B>) -> Self {
        self.vit  = self.vit.map(|v| v.set_lora_adapters(export.adapters));
        self.head = export.head;
        self
    }
}

/// Trainable parameter count the way it is reported: in units of 2^20
pub fn params_in_millions(count: usize) -> f64 {
    count as f64 / (1u64 << 20) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray},
        nn::loss::CrossEntropyLossConfig,
        optim::{AdamConfig, GradientsParams, Optimizer},
        tensor::Distribution,
    };

    type TestBackend = NdArray;
    type TrainBackend = Autodiff<NdArray>;

    fn tiny(train_type: TrainType) -> ClassifierConfig {
        ClassifierConfig::new(
            train_type,
            3,
            VisionTransformerConfig::new(16, 2, 2).with_image_size(16).with_patch_size(8),
            ResNetConfig::new().with_layers([1, 1, 1, 1]).with_base_width(4),
            LoraConfig::new(2, 2.0),
        )
    }

    #[test]
    fn test_logits_shape_per_backbone() {
        let device = Default::default();
        for tt in [TrainType::Full, TrainType::Resnet50] {
            let size   = if tt.uses_vit() { 16 } else { 32 };
            let model  = tiny(tt).build::<TestBackend>(None, &device).unwrap();
            let images = Tensor::<TestBackend, 4>::random([2, 3, size, size], Distribution::Default, &device);
            assert_eq!(model.forward(images).dims(), [2, 3]);
        }
    }

    #[test]
    fn test_trainable_counts_per_strategy() {
        let device = Default::default();
        let head   = 16 * 3 + 3;

        let linear = tiny(TrainType::Linear).build::<TestBackend>(None, &device).unwrap();
        assert_eq!(linear.trainable_params(TrainType::Linear), head);

        let lora = tiny(TrainType::Lora).build::<TestBackend>(None, &device).unwrap();
        let adapters = 2 * 2 * (16 * 2 + 2 * 16);
        assert_eq!(lora.trainable_params(TrainType::Lora), head + adapters);

        let full = tiny(TrainType::Full).build::<TestBackend>(None, &device).unwrap();
        assert_eq!(full.trainable_params(TrainType::Full), full.num_params());
        assert!(full.num_params() > head + adapters);
    }

    #[test]
    fn test_lora_export_round_trip_restores_head() {
        let device = Default::default();
        let cfg    = tiny(TrainType::Lora);
        let src    = cfg.build::<TestBackend>(None, &device).unwrap();
        let export = src.lora_export().expect("lora model exports adapters");
        assert_eq!(export.adapters.len(), 2);

        let restored = cfg.init::<TestBackend>(&device).with_lora_export(export);
        let a: Vec<f32> = src.head.weight.val().into_data().convert::<f32>().to_vec().unwrap();
        let b: Vec<f32> = restored.head.weight.val().into_data().convert::<f32>().to_vec().unwrap();
        assert_eq!(a, b);

        let full = tiny(TrainType::Full).build::<TestBackend>(None, &device).unwrap();
        assert!(full.lora_export().is_none());
    }

    /// One Adam step on a random batch.
    fn adam_step(model: ImageClassifier<TrainBackend>) -> ImageClassifier<TrainBackend> {
        let device  = Default::default();
        let images  = Tensor::<TrainBackend, 4>::random([2, 3, 16, 16], Distribution::Normal(0.0, 1.0), &device);
        let targets = Tensor::<TrainBackend, 1, Int>::from_ints([0, 2], &device);
        let loss_fn = CrossEntropyLossConfig::new().init(&device);

        let (loss, _) = model.forward_loss(images, targets, &loss_fn);
        let grads     = GradientsParams::from_grads(loss.backward(), &model);
        let mut optim = AdamConfig::new().init();
        optim.step(0.1, model, grads)
    }

    fn moved<const D: usize>(before: Tensor<TrainBackend, D>, after: Tensor<TrainBackend, D>) -> f32 {
        (after - before).abs().sum().into_data().convert::<f32>().to_vec::<f32>().unwrap()[0]
    }

    fn qkv(model: &ImageClassifier<TrainBackend>) -> Tensor<TrainBackend, 2> {
        model.vit.as_ref().unwrap().blocks[0].attn.qkv.weight.val()
    }

    fn patch(model: &ImageClassifier<TrainBackend>) -> Tensor<TrainBackend, 4> {
        model.vit.as_ref().unwrap().patch_embed.proj.weight.val()
    }

    #[test]
    fn test_optimiser_step_respects_freezing() {
        let device = Default::default();

        // lora: backbone fixed, adapters and head move
        let lora = tiny(TrainType::Lora).build::<TrainBackend>(None, &device).unwrap();
        let (qkv0, patch0, head0) = (qkv(&lora), patch(&lora), lora.head.weight.val());
        let up0 = lora.vit.as_ref().unwrap().blocks[0].attn.lora.as_ref().unwrap().q.up.weight.val();

        let lora = adam_step(lora);
        let up1  = lora.vit.as_ref().unwrap().blocks[0].attn.lora.as_ref().unwrap().q.up.weight.val();
        assert_eq!(moved(qkv0, qkv(&lora)), 0.0);
        assert_eq!(moved(patch0, patch(&lora)), 0.0);
        assert!(moved(up0, up1) > 0.0);
        assert!(moved(head0, lora.head.weight.val()) > 0.0);

        // linear: only the head moves
        let linear = tiny(TrainType::Linear).build::<TrainBackend>(None, &device).unwrap();
        let (qkv0, patch0, head0) = (qkv(&linear), patch(&linear), linear.head.weight.val());
        let linear = adam_step(linear);
        assert_eq!(moved(qkv0, qkv(&linear)), 0.0);
        assert_eq!(moved(patch0, patch(&linear)), 0.0);
        assert!(moved(head0, linear.head.weight.val()) > 0.0);

        // full: the backbone trains too
        let full  = tiny(TrainType::Full).build::<TrainBackend>(None, &device).unwrap();
        let qkv0  = qkv(&full);
        let full  = adam_step(full);
        assert!(moved(qkv0, qkv(&full)) > 0.0);
    }

    #[test]
    fn test_millions_use_binary_units() {
        assert_eq!(params_in_millions(1 << 20), 1.0);
    }
}
