// ============================================================
// Layer 5 — ResNet-50 backbone
// ============================================================
// Bottleneck ResNet (He et al. 2016) in the torchvision layout:
// the stride of a downsampling block sits on the 3×3 conv.
//
//   conv1 7×7/2 → bn1 → relu → maxpool 3×3/2
//   layer1..layer4   [3, 4, 6, 3] bottlenecks, widths 64..512
//   global average pool → [B, 2048]
//
// Field names follow torchvision's state dict (layer1.0.conv1,
// layer1.0.downsample.0, ...) except for the downsample pair,
// which is a named struct here; the importer renames
// `downsample.0/1` to `downsample.conv/bn`.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

const EXPANSION: usize = 4;

#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Bottleneck blocks per stage
    #[config(default = "[3, 4, 6, 3]")]
    pub layers: [usize; 4],
    /// Width of the first stage; later stages double it
    #[config(default = 64)]
    pub base_width: usize,
    #[config(default = 3)]
    pub in_channels: usize,
}

impl ResNetConfig {
    /// Size of the pooled feature vector
    pub fn feature_dim(&self) -> usize {
        self.base_width * 8 * EXPANSION
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        let w     = self.base_width;
        let conv1 = Conv2dConfig::new([self.in_channels, w], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);
        let bn1     = BatchNormConfig::new(w).init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let mut in_planes = w;
        let mut stage = |planes: usize, blocks: usize, stride: usize| {
            let layer = make_layer::<B>(in_planes, planes, blocks, stride, device);
            in_planes = planes * EXPANSION;
            layer
        };
        let layer1 = stage(w, self.layers[0], 1);
        let layer2 = stage(w * 2, self.layers[1], 2);
        let layer3 = stage(w * 4, self.layers[2], 2);
        let layer4 = stage(w * 8, self.layers[3], 2);

        ResNet {
            conv1,
            bn1,
            maxpool,
            layer1,
            layer2,
            layer3,
            layer4,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            feature_dim: self.feature_dim(),
        }
    }
}

fn conv<B: Backend>(
    channels: [usize; 2],
    kernel:   usize,
    stride:   usize,
    device:   &B::Device,
) -> Conv2d<B> {
    let pad = kernel / 2;
    Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(pad, pad))
        .with_bias(false)
        .init(device)
}

fn make_layer<B: Backend>(
    in_planes: usize,
    planes:    usize,
    blocks:    usize,
    stride:    usize,
    device:    &B::Device,
) -> Vec<Bottleneck<B>> {
    let out_planes = planes * EXPANSION;
    (0..blocks)
        .map(|i| {
            let (block_in, block_stride) = if i == 0 { (in_planes, stride) } else { (out_planes, 1) };
            let downsample = (i == 0 && (stride != 1 || in_planes != out_planes)).then(|| Downsample {
                conv: conv(
                    [block_in, out_planes],
                    1,
                    block_stride,
                    device,
                ),
                bn: BatchNormConfig::new(out_planes).init(device),
            });
            Bottleneck {
                conv1: conv([block_in, planes], 1, 1, device),
                bn1:   BatchNormConfig::new(planes).init(device),
                conv2: conv([planes, planes], 3, block_stride, device),
                bn2:   BatchNormConfig::new(planes).init(device),
                conv3: conv([planes, out_planes], 1, 1, device),
                bn3:   BatchNormConfig::new(out_planes).init(device),
                downsample,
            }
        })
        .collect()
}

#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn:   BatchNorm<B, 2>,
}

#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    pub conv1:      Conv2d<B>,
    pub bn1:        BatchNorm<B, 2>,
    pub conv2:      Conv2d<B>,
    pub bn2:        BatchNorm<B, 2>,
    pub conv3:      Conv2d<B>,
    pub bn3:        BatchNorm<B, 2>,
    pub downsample: Option<Downsample<B>>,
}

impl<B: Backend> Bottleneck<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(ds) => ds.bn.forward(ds.conv.forward(x.clone())),
            None     => x.clone(),
        };
        let out = relu(self.bn1.forward(self.conv1.forward(x)));
        let out = relu(self.bn2.forward(self.conv2.forward(out)));
        let out = self.bn3.forward(self.conv3.forward(out));
        relu(out + identity)
    }
}

#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    pub conv1:       Conv2d<B>,
    pub bn1:         BatchNorm<B, 2>,
    pub maxpool:     MaxPool2d,
    pub layer1:      Vec<Bottleneck<B>>,
    pub layer2:      Vec<Bottleneck<B>>,
    pub layer3:      Vec<Bottleneck<B>>,
    pub layer4:      Vec<Bottleneck<B>>,
    pub avgpool:     AdaptiveAvgPool2d,
    pub feature_dim: usize,
}

impl<B: Backend> ResNet<B> {
    /// images: [batch, 3, H, W] → pooled features [batch, feature_dim]
    pub fn forward_features(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.bn1.forward(self.conv1.forward(images)));
        let mut x = self.maxpool.forward(x);
        for block in self
            .layer1
            .iter()
            .chain(&self.layer2)
            .chain(&self.layer3)
            .chain(&self.layer4)
        {
            x = block.forward(x);
        }
        let x = self.avgpool.forward(x);
        let [b, c, _, _] = x.dims();
        x.reshape([b, c])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray;

    #[test]
    fn test_tiny_resnet_shapes() {
        let device = Default::default();
        let cfg    = ResNetConfig::new().with_layers([1, 1, 1, 1]).with_base_width(4);
        let model  = cfg.init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::random([2, 3, 32, 32], Distribution::Default, &device);

        assert_eq!(model.forward_features(images).dims(), [2, cfg.feature_dim()]);
        assert!(model.layer1[0].downsample.is_some());
        assert_eq!(model.layer4.len(), 1);
    }

    #[test]
    fn test_resnet50_block_counts() {
        let cfg = ResNetConfig::new();
        assert_eq!(cfg.feature_dim(), 2048);
        assert_eq!(cfg.layers.iter().sum::<usize>(), 16);
    }
}
