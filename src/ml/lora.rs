// ============================================================
// Layer 5 — Low-Rank Adapters
// ============================================================
// LoRA keeps a pretrained weight W frozen and learns a low-rank
// update instead:
//
//   y = W x + (alpha / r) · B (A x)
//
//   A : in  → r    Kaiming-uniform init
//   B : r   → out  zero init, so the adapted layer starts out
//                  computing exactly W x
//
// In a ViT block the fused qkv projection gets two adapters:
// one added to the query slice and one to the value slice.
// Keys are left untouched.
//
// Reference: Hu et al. (2021) LoRA: Low-Rank Adaptation of
//            Large Language Models

use burn::{
    nn::{Initializer, Linear, LinearConfig},
    prelude::*,
};

#[derive(Config, Debug)]
pub struct LoraConfig {
    /// Rank r of the update
    pub rank: usize,
    /// Scaling numerator; the update is multiplied by alpha / rank
    pub alpha: f64,
}

impl LoraConfig {
    pub fn scale(&self) -> f64 {
        self.alpha / self.rank.max(1) as f64
    }

    pub fn init_linear<B: Backend>(
        &self,
        d_in:   usize,
        d_out:  usize,
        device: &B::Device,
    ) -> LoraLinear<B> {
        let down = LinearConfig::new(d_in, self.rank)
            .with_bias(false)
            .init(device);
        let up = LinearConfig::new(self.rank, d_out)
            .with_bias(false)
            .with_initializer(Initializer::Zeros)
            .init(device);
        LoraLinear { down, up, scale: self.scale() }
    }

    pub fn init_qv<B: Backend>(&self, dim: usize, device: &B::Device) -> LoraQv<B> {
        LoraQv {
            q: self.init_linear(dim, dim, device),
            v: self.init_linear(dim, dim, device),
        }
    }
}

/// One A/B pair.
#[derive(Module, Debug)]
pub struct LoraLinear<B: Backend> {
    pub down:  Linear<B>,
    pub up:    Linear<B>,
    pub scale: f64,
}

impl<B: Backend> LoraLinear<B> {
    /// The low-rank delta only; callers add it to the frozen output.
    pub fn forward<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        self.up.forward(self.down.forward(x)).mul_scalar(self.scale)
    }
}

/// Query and value adapters of one attention block.
#[derive(Module, Debug)]
pub struct LoraQv<B: Backend> {
    pub q: LoraLinear<B>,
    pub v: LoraLinear<B>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_fresh_adapter_is_a_no_op() {
        let device = Default::default();
        let lora   = LoraConfig::new(4, 8.0).init_linear::<TestBackend>(16, 16, &device);
        let x      = Tensor::<TestBackend, 3>::ones([2, 5, 16], &device);

        let delta: f32 = lora.forward(x).abs().sum().into_scalar().elem();
        assert_eq!(delta, 0.0);
        assert_eq!(lora.down.weight.val().dims(), [16, 4]);
        assert_eq!(lora.scale, 2.0);
    }

    #[test]
    fn test_parameter_count() {
        let device = Default::default();
        let qv     = LoraConfig::new(4, 4.0).init_qv::<TestBackend>(32, &device);
        // two pairs of (32×4 + 4×32), no biases
        assert_eq!(qv.num_params(), 2 * (32 * 4 + 4 * 32));
    }
}
