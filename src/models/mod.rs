/// Emotion CNN implementation
use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::VarBuilder;

use crate::config::ModelConfig;
use crate::layers::{ClassifierHead, ConvBlock};

pub mod loader;

pub use loader::load_model;

/// Convolutional emotion classifier
///
/// A stack of conv/ReLU/max-pool blocks, flattened into a dense ReLU layer,
/// dropout, and a softmax over the emotion classes.
pub struct EmotionCnn {
    config: ModelConfig,
    blocks: Vec<ConvBlock>,
    head: ClassifierHead,
}

impl EmotionCnn {
    /// Create new EmotionCnn
    pub fn new(config: ModelConfig, vb: VarBuilder) -> crate::Result<Self> {
        config.validate()?;

        let mut blocks = Vec::with_capacity(config.conv_channels.len());
        let mut in_channels = config.in_channels;
        for (i, &out_channels) in config.conv_channels.iter().enumerate() {
            blocks.push(ConvBlock::new(
                in_channels,
                out_channels,
                config.kernel_size,
                config.pool_size,
                vb.pp(format!("block_{}", i)),
            )?);
            in_channels = out_channels;
        }

        let head = ClassifierHead::new(
            config.flattened_features(),
            config.hidden_size,
            config.num_classes,
            config.dropout,
            vb.pp("head"),
        )?;

        Ok(Self {
            config,
            blocks,
            head,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Feature extractor output, flattened to `[batch, features]`
    fn features(&self, images: &Tensor) -> Result<Tensor> {
        let mut xs = images.clone();
        for block in &self.blocks {
            xs = block.forward(&xs)?;
        }
        xs.flatten_from(1)
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `images` - Input tensor [batch, in_channels, image_size, image_size]
    /// * `train` - Enables dropout
    ///
    /// # Returns
    /// Class probabilities [batch, num_classes]
    pub fn forward_t(&self, images: &Tensor, train: bool) -> Result<Tensor> {
        let features = self.features(images)?;
        self.head.forward_t(&features, train)
    }

    /// Most likely class per image
    pub fn predict(&self, images: &Tensor) -> Result<Vec<u32>> {
        self.forward_t(images, false)?
            .argmax(candle_core::D::Minus1)?
            .to_vec1::<u32>()
    }
}

impl ModuleT for EmotionCnn {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        EmotionCnn::forward_t(self, xs, train)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    /// Small config that keeps tests fast: 12 -> 10 -> 5 -> 3 -> 1
    pub(crate) fn tiny_config() -> ModelConfig {
        ModelConfig {
            image_size: 12,
            in_channels: 1,
            conv_channels: vec![4, 8],
            kernel_size: 3,
            pool_size: 2,
            hidden_size: 16,
            dropout: 0.5,
            num_classes: 3,
        }
    }

    #[test]
    fn test_default_model_output_shape() -> crate::Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let model = EmotionCnn::new(ModelConfig::default(), vb)?;

        let images = Tensor::rand(0f32, 1.0, (2, 1, 48, 48), &device)?;
        let probs = model.forward_t(&images, false)?;

        assert_eq!(probs.dims(), &[2, 7]);
        for total in probs.sum(1)?.to_vec1::<f32>()? {
            assert!((total - 1.0).abs() < 1e-5);
        }

        Ok(())
    }

    #[test]
    fn test_parameter_names() -> crate::Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let _model = EmotionCnn::new(tiny_config(), vb)?;

        let data = varmap.data().lock().unwrap();
        let mut names: Vec<&String> = data.keys().collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "block_0.conv.bias",
                "block_0.conv.weight",
                "block_1.conv.bias",
                "block_1.conv.weight",
                "head.hidden.bias",
                "head.hidden.weight",
                "head.output.bias",
                "head.output.weight",
            ]
        );
        assert_eq!(data["head.hidden.weight"].dims(), &[16, 8]);

        Ok(())
    }

    #[test]
    fn test_predict_in_range() -> crate::Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let model = EmotionCnn::new(tiny_config(), vb)?;
        let images = Tensor::rand(0f32, 1.0, (5, 1, 12, 12), &device)?;

        let predictions = model.predict(&images)?;

        assert_eq!(predictions.len(), 5);
        assert!(predictions.iter().all(|&p| p < 3));

        Ok(())
    }

    #[test]
    fn test_invalid_config_rejected() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let config = ModelConfig {
            image_size: 4,
            ..tiny_config()
        };
        assert!(EmotionCnn::new(config, vb).is_err());
    }
}
