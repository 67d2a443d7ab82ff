/// Convolution block: valid conv, ReLU, max-pool
use candle_core::{Module, Result, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, VarBuilder};

/// Conv2d (stride 1, no padding) followed by ReLU and non-overlapping max-pooling
///
/// Input `[batch, in_channels, h, w]`, output
/// `[batch, out_channels, (h - k + 1) / pool, (w - k + 1) / pool]`.
pub struct ConvBlock {
    conv: Conv2d,
    pool_size: usize,
}

impl ConvBlock {
    /// Create new conv block
    ///
    /// # Arguments
    /// * `in_channels` - Input feature maps
    /// * `out_channels` - Output feature maps
    /// * `kernel_size` - Square kernel side
    /// * `pool_size` - Square pooling window (also the stride)
    /// * `vb` - VarBuilder for parameter initialization
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        pool_size: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let conv = candle_nn::conv2d(
            in_channels,
            out_channels,
            kernel_size,
            Conv2dConfig::default(),
            vb.pp("conv"),
        )?;

        Ok(Self { conv, pool_size })
    }
}

impl Module for ConvBlock {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.conv
            .forward(xs)?
            .relu()?
            .max_pool2d(self.pool_size)
    }
}
