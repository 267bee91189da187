// ============================================================
// Layer 5 — Vision Transformer backbone
// ============================================================
// ViT as in Dosovitskiy et al. (2021), pre-norm blocks:
//
//   image [B,3,224,224]
//     → patch_embed   conv 16×16 / stride 16 → 196 tokens
//     → prepend cls_token, add pos_embed      → [B,197,D]
//     → blocks × depth
//         x = x + attn(norm1(x))
//         x = x + mlp(norm2(x))
//     → norm
//     → class token                            → [B,D]
//
// Field names mirror timm's state-dict keys (patch_embed.proj,
// blocks.N.attn.qkv, ...) so pretrained weights import with
// only LayerNorm renames. The classification head lives in
// ImageClassifier, not here.

use burn::{
    module::Param,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        LayerNorm, LayerNormConfig, Linear, LinearConfig,
    },
    prelude::*,
    tensor::{activation, Distribution},
};

use crate::domain::strategy::VitSize;
use crate::ml::lora::{LoraConfig, LoraQv};

#[derive(Config, Debug)]
pub struct VisionTransformerConfig {
    pub embed_dim: usize,
    pub depth:     usize,
    pub num_heads: usize,
    #[config(default = 224)]
    pub image_size: usize,
    #[config(default = 16)]
    pub patch_size: usize,
    #[config(default = 3)]
    pub in_channels: usize,
    #[config(default = 4)]
    pub mlp_ratio: usize,
    #[config(default = 1e-6)]
    pub layer_norm_eps: f64,
}

impl VisionTransformerConfig {
    /// The three ViT-*/16 variants at 224×224
    pub fn from_size(size: VitSize) -> Self {
        let (embed_dim, depth, num_heads) = size.dims();
        Self::new(embed_dim, depth, num_heads)
    }

    pub fn num_patches(&self) -> usize {
        let per_side = self.image_size / self.patch_size;
        per_side * per_side
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> VisionTransformer<B> {
        let proj = Conv2dConfig::new(
            [self.in_channels, self.embed_dim],
            [self.patch_size, self.patch_size],
        )
        .with_stride([self.patch_size, self.patch_size])
        .init(device);

        let cls_token = Param::from_tensor(Tensor::random(
            [1, 1, self.embed_dim],
            Distribution::Normal(0.0, 1e-6),
            device,
        ));
        let pos_embed = Param::from_tensor(Tensor::random(
            [1, self.num_patches() + 1, self.embed_dim],
            Distribution::Normal(0.0, 0.02),
            device,
        ));

        let blocks = (0..self.depth).map(|_| self.init_block(device)).collect();
        let norm   = LayerNormConfig::new(self.embed_dim)
            .with_epsilon(self.layer_norm_eps)
            .init(device);

        VisionTransformer {
            patch_embed: PatchEmbed { proj },
            cls_token,
            pos_embed,
            blocks,
            norm,
            embed_dim: self.embed_dim,
        }
    }

    fn init_block<B: Backend>(&self, device: &B::Device) -> Block<B> {
        let dim    = self.embed_dim;
        let hidden = dim * self.mlp_ratio;
        let ln     = || LayerNormConfig::new(dim).with_epsilon(self.layer_norm_eps).init(device);
        Block {
            norm1: ln(),
            attn: Attention {
                qkv:       LinearConfig::new(dim, 3 * dim).init(device),
                proj:      LinearConfig::new(dim, dim).init(device),
                num_heads: self.num_heads,
                lora:      None,
            },
            norm2: ln(),
            mlp: Mlp {
                fc1: LinearConfig::new(dim, hidden).init(device),
                fc2: LinearConfig::new(hidden, dim).init(device),
            },
        }
    }
}

#[derive(Module, Debug)]
pub struct PatchEmbed<B: Backend> {
    pub proj: Conv2d<B>,
}

#[derive(Module, Debug)]
pub struct Attention<B: Backend> {
    /// Fused query/key/value projection, D → 3D
    pub qkv:       Linear<B>,
    pub proj:      Linear<B>,
    pub num_heads: usize,
    /// Low-rank q/v adapters, present only after LoRA injection
    pub lora:      Option<LoraQv<B>>,
}

impl<B: Backend> Attention<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [b, n, c] = x.dims();
        let head_dim  = c / self.num_heads;
        let scale     = (head_dim as f64).powf(-0.5);

        let qkv   = self.qkv.forward(x.clone());
        let mut q = qkv.clone().slice([0..b, 0..n, 0..c]);
        let k     = qkv.clone().slice([0..b, 0..n, c..2 * c]);
        let mut v = qkv.slice([0..b, 0..n, 2 * c..3 * c]);

        if let Some(lora) = &self.lora {
            q = q + lora.q.forward(x.clone());
            v = v + lora.v.forward(x);
        }

        // [B, N, C] → [B, H, N, C/H]
        let split_heads = |t: Tensor<B, 3>| t.reshape([b, n, self.num_heads, head_dim]).swap_dims(1, 2);
        let (q, k, v) = (split_heads(q), split_heads(k), split_heads(v));

        let attn = activation::softmax(q.matmul(k.swap_dims(2, 3)).mul_scalar(scale), 3);
        let out  = attn.matmul(v).swap_dims(1, 2).reshape([b, n, c]);
        self.proj.forward(out)
    }
}

#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
}

impl<B: Backend> Mlp<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        self.fc2.forward(activation::gelu(self.fc1.forward(x)))
    }
}

#[derive(Module, Debug)]
pub struct Block<B: Backend> {
    pub norm1: LayerNorm<B>,
    pub attn:  Attention<B>,
    pub norm2: LayerNorm<B>,
    pub mlp:   Mlp<B>,
}

impl<B: Backend> Block<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = x.clone() + self.attn.forward(self.norm1.forward(x));
        x.clone() + self.mlp.forward(self.norm2.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct VisionTransformer<B: Backend> {
    pub patch_embed: PatchEmbed<B>,
    pub cls_token:   Param<Tensor<B, 3>>,
    pub pos_embed:   Param<Tensor<B, 3>>,
    pub blocks:      Vec<Block<B>>,
    pub norm:        LayerNorm<B>,
    pub embed_dim:   usize,
}

impl<B: Backend> VisionTransformer<B> {
    /// images: [batch, 3, H, W] → class-token features [batch, embed_dim]
    pub fn forward_features(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.patch_embed.proj.forward(images);
        let [b, d, gh, gw] = x.dims();
        let x = x.reshape([b, d, gh * gw]).swap_dims(1, 2);

        let cls   = self.cls_token.val().expand([b, 1, d]);
        let mut x = Tensor::cat(vec![cls, x], 1) + self.pos_embed.val();
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.norm.forward(x);

        x.slice([0..b, 0..1, 0..d]).reshape([b, d])
    }

    /// Attach fresh q/v adapters to every block.
    ///
    /// Call after `no_grad()` on the backbone: the adapters are
    /// created afterwards and are therefore the only trainable
    /// parameters inside the ViT.
    pub fn with_lora(mut self, config: &LoraConfig, device: &B::Device) -> Self {
        let dim = self.embed_dim;
        for block in self.blocks.iter_mut() {
            block.attn.lora = Some(config.init_qv(dim, device));
        }
        self
    }

    /// Clone of every block's adapters, in block order
    pub fn lora_adapters(&self) -> Vec<Option<LoraQv<B>>> {
        self.blocks.iter().map(|b| b.attn.lora.clone()).collect()
    }

    /// Replace the adapters block by block; extra entries are ignored.
    pub fn set_lora_adapters(mut self, adapters: Vec<Option<LoraQv<B>>>) -> Self {
        for (block, lora) in self.blocks.iter_mut().zip(adapters) {
            block.attn.lora = lora;
        }
        self
    }

    pub fn lora_param_count(&self) -> usize {
        self.blocks
            .iter()
            .filter_map(|b| b.attn.lora.as_ref())
            .map(|l| l.num_params())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn tiny() -> VisionTransformerConfig {
        VisionTransformerConfig::new(16, 2, 2)
            .with_image_size(16)
            .with_patch_size(8)
    }

    #[test]
    fn test_forward_features_shape() {
        let device = Default::default();
        let vit    = tiny().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::random([3, 3, 16, 16], Distribution::Default, &device);
        assert_eq!(vit.forward_features(images).dims(), [3, 16]);
    }

    #[test]
    fn test_lora_injection_keeps_output_at_init() {
        let device = Default::default();
        let vit    = tiny().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::random([2, 3, 16, 16], Distribution::Default, &device);

        let before = vit.forward_features(images.clone());
        let vit    = vit.no_grad().with_lora(&LoraConfig::new(2, 2.0), &device);
        let after  = vit.forward_features(images);

        let diff: f32 = (before - after).abs().max().into_scalar().elem();
        assert!(diff < 1e-5, "max diff {diff}");
        // 2 blocks × (q + v) × (16×2 + 2×16)
        assert_eq!(vit.lora_param_count(), 2 * 2 * (16 * 2 + 2 * 16));
    }

    #[test]
    fn test_named_sizes() {
        let base = VisionTransformerConfig::from_size(VitSize::Base);
        assert_eq!((base.embed_dim, base.depth, base.num_heads), (768, 12, 12));
        assert_eq!(base.num_patches(), 196);
        let large = VisionTransformerConfig::from_size(VitSize::Large);
        assert_eq!(large.depth, 24);
    }
}
