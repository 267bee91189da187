// ============================================================
// Layer 3 — Backbone & Adaptation Strategy
// ============================================================
// Two selectors decide what gets trained:
//
//   --train-type  lora | full | linear | resnet50
//   --vit         small | base | large   (ignored for resnet50)
//
// `resnet50` is both a backbone choice and a strategy: the
// whole ResNet is fine-tuned with a fresh classification head.
//
// The clap ValueEnum derive only teaches the CLI how to spell
// these values; nothing in the domain depends on clap.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How the pretrained backbone is adapted to the new task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TrainType {
    /// Freeze the ViT, train low-rank q/v adapters and the head
    Lora,
    /// Fine-tune every ViT parameter
    Full,
    /// Freeze the ViT, train only the head
    Linear,
    /// Fine-tune a ResNet-50 end to end
    Resnet50,
}

impl TrainType {
    pub fn uses_vit(&self) -> bool {
        !matches!(self, Self::Resnet50)
    }

    /// Whether the backbone weights are frozen
    pub fn freezes_backbone(&self) -> bool {
        matches!(self, Self::Lora | Self::Linear)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lora     => "lora",
            Self::Full     => "full",
            Self::Linear   => "linear",
            Self::Resnet50 => "resnet50",
        }
    }
}

/// ViT variant, all with 16×16 patches on 224×224 inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VitSize {
    Small,
    Base,
    Large,
}

impl VitSize {
    /// (embed_dim, depth, num_heads)
    pub fn dims(&self) -> (usize, usize, usize) {
        match self {
            Self::Small => (384, 12, 6),
            Self::Base  => (768, 12, 12),
            Self::Large => (1024, 24, 16),
        }
    }
}

/// Compute backend the run executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ComputeBackend {
    /// GPU through wgpu (Vulkan / Metal / DX12)
    Wgpu,
    /// Pure-Rust CPU backend
    Ndarray,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_train_type_is_rejected() {
        assert!(TrainType::from_str("lora", true).is_ok());
        assert!(TrainType::from_str("resnet50", true).is_ok());
        assert!(TrainType::from_str("adapter", true).is_err());
    }

    #[test]
    fn test_unknown_vit_size_is_rejected() {
        assert!(VitSize::from_str("large", true).is_ok());
        assert!(VitSize::from_str("huge", true).is_err());
    }

    #[test]
    fn test_freezing_rules() {
        assert!(TrainType::Lora.freezes_backbone());
        assert!(TrainType::Linear.freezes_backbone());
        assert!(!TrainType::Full.freezes_backbone());
        assert!(!TrainType::Resnet50.freezes_backbone());
        assert!(!TrainType::Resnet50.uses_vit());
    }
}
