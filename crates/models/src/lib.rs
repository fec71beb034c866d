//! Burn U-Net used for binary tile segmentation.
//!
//! The network is the classic encoder/decoder with skip connections:
//! four max-pool downsampling stages, four transposed-convolution upsampling
//! stages, and a 1x1 output head producing one logit map per class.
//!
//! The module is a plain Burn `Module`; loss, optimizer, and activation of the
//! output logits live in the `training` crate.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

#[derive(Debug, Clone)]
pub struct UNetConfig {
    /// Input image channels (3 for RGB tiles).
    pub n_channels: usize,
    /// Output logit maps (1 for a binary mask).
    pub n_classes: usize,
    /// Width of the first encoder stage; doubles at every downsampling step.
    pub base_channels: usize,
}

impl Default for UNetConfig {
    fn default() -> Self {
        Self {
            n_channels: 3,
            n_classes: 1,
            base_channels: 64,
        }
    }
}

impl UNetConfig {
    pub fn new(n_channels: usize, n_classes: usize) -> Self {
        Self {
            n_channels,
            n_classes,
            ..Default::default()
        }
    }

    pub fn with_base_channels(mut self, base_channels: usize) -> Self {
        self.base_channels = base_channels.max(1);
        self
    }
}

/// (conv 3x3 => batch norm => relu) twice.
#[derive(Debug, Module)]
pub struct DoubleConv<B: Backend> {
    conv1: Conv2d<B>,
    norm1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    norm2: BatchNorm<B, 2>,
}

impl<B: Backend> DoubleConv<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = |i: usize, o: usize| {
            Conv2dConfig::new([i, o], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device)
        };
        Self {
            conv1: conv(in_channels, out_channels),
            norm1: BatchNormConfig::new(out_channels).init(device),
            conv2: conv(out_channels, out_channels),
            norm2: BatchNormConfig::new(out_channels).init(device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.norm1.forward(self.conv1.forward(input)));
        relu(self.norm2.forward(self.conv2.forward(x)))
    }
}

/// Max-pool by 2, then a double conv.
#[derive(Debug, Module)]
pub struct Down<B: Backend> {
    pool: MaxPool2d,
    conv: DoubleConv<B>,
}

impl<B: Backend> Down<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            conv: DoubleConv::new(in_channels, out_channels, device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(self.pool.forward(input))
    }
}

/// Transposed-conv upsample, concatenate with the skip tensor, double conv.
#[derive(Debug, Module)]
pub struct Up<B: Backend> {
    up: ConvTranspose2d<B>,
    conv: DoubleConv<B>,
}

impl<B: Backend> Up<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            up: ConvTranspose2dConfig::new([in_channels, in_channels / 2], [2, 2])
                .with_stride([2, 2])
                .init(device),
            conv: DoubleConv::new(in_channels, out_channels, device),
        }
    }

    pub fn forward(&self, below: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, skip_h, skip_w] = skip.dims();
        // Odd spatial sizes lose a row/column when pooling; pad back to the skip shape.
        let x = pad_to(self.up.forward(below), skip_h, skip_w);
        self.conv.forward(Tensor::cat(vec![skip, x], 1))
    }
}

/// Zero-pad the last two dims up to `height` x `width`, splitting the padding
/// evenly (extra row/column goes bottom/right).
fn pad_to<B: Backend>(x: Tensor<B, 4>, height: usize, width: usize) -> Tensor<B, 4> {
    let [n, c, h, w] = x.dims();
    let dy = height.saturating_sub(h);
    let dx = width.saturating_sub(w);
    if dx == 0 && dy == 0 {
        return x;
    }
    let device = x.device();
    let mut x = x;
    if dx > 0 {
        let (left, right) = (dx / 2, dx - dx / 2);
        let mut parts = Vec::with_capacity(3);
        if left > 0 {
            parts.push(Tensor::zeros([n, c, h, left], &device));
        }
        parts.push(x);
        parts.push(Tensor::zeros([n, c, h, right], &device));
        x = Tensor::cat(parts, 3);
    }
    if dy > 0 {
        let (top, bottom) = (dy / 2, dy - dy / 2);
        let mut parts = Vec::with_capacity(3);
        if top > 0 {
            parts.push(Tensor::zeros([n, c, top, width.max(w)], &device));
        }
        parts.push(x);
        parts.push(Tensor::zeros([n, c, bottom, width.max(w)], &device));
        x = Tensor::cat(parts, 2);
    }
    x
}

#[derive(Debug, Module)]
pub struct UNet<B: Backend> {
    inc: DoubleConv<B>,
    down1: Down<B>,
    down2: Down<B>,
    down3: Down<B>,
    down4: Down<B>,
    up1: Up<B>,
    up2: Up<B>,
    up3: Up<B>,
    up4: Up<B>,
    outc: Conv2d<B>,
    n_channels: usize,
    n_classes: usize,
}

impl<B: Backend> UNet<B> {
    pub fn new(cfg: UNetConfig, device: &B::Device) -> Self {
        let c = cfg.base_channels.max(1);
        Self {
            inc: DoubleConv::new(cfg.n_channels, c, device),
            down1: Down::new(c, c * 2, device),
            down2: Down::new(c * 2, c * 4, device),
            down3: Down::new(c * 4, c * 8, device),
            down4: Down::new(c * 8, c * 16, device),
            up1: Up::new(c * 16, c * 8, device),
            up2: Up::new(c * 8, c * 4, device),
            up3: Up::new(c * 4, c * 2, device),
            up4: Up::new(c * 2, c, device),
            outc: Conv2dConfig::new([c, cfg.n_classes], [1, 1]).init(device),
            n_channels: cfg.n_channels,
            n_classes: cfg.n_classes,
        }
    }

    /// Input channels the network was built for.
    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Raw logits with shape [batch, n_classes, height, width].
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x1 = self.inc.forward(input);
        let x2 = self.down1.forward(x1.clone());
        let x3 = self.down2.forward(x2.clone());
        let x4 = self.down3.forward(x3.clone());
        let x5 = self.down4.forward(x4.clone());

        let x = self.up1.forward(x5, x4);
        let x = self.up2.forward(x, x3);
        let x = self.up3.forward(x, x2);
        let x = self.up4.forward(x, x1);
        self.outc.forward(x)
    }
}

pub mod prelude {
    pub use super::{UNet, UNetConfig};
}
