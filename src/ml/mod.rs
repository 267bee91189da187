// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that builds, trains or scores a network lives here.
//
//   vit.rs         — Vision Transformer backbone (timm layout)
//   resnet.rs      — ResNet-50 backbone (torchvision layout)
//   lora.rs        — low-rank adapters for the q / v projections
//   classifier.rs  — backbone + head, assembled per strategy
//   pretrained.rs  — PyTorch state-dict import
//   trainer.rs     — train / eval passes and the epoch loop
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Dosovitskiy et al. (2021) An Image is Worth 16x16 Words
//            He et al. (2016) Deep Residual Learning
//            Hu et al. (2021) LoRA

pub mod vit;

pub mod resnet;

pub mod lora;

/// Backbone + classification head per adaptation strategy
pub mod classifier;

/// Pretrained weight import via burn-import
pub mod pretrained;

/// Epoch loop, best-checkpoint logic, evaluation passes
pub mod trainer;
