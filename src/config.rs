use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::training::{LossConfig, TrainingConfig};

/// Configuration for the emotion CNN
///
/// Describes a stack of conv/pool blocks followed by a dense layer and a
/// softmax head over `num_classes` emotions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Input image side length (images are square)
    pub image_size: usize,

    /// Input channels (1 for grayscale)
    pub in_channels: usize,

    /// Output channels of each conv block
    pub conv_channels: Vec<usize>,

    /// Conv kernel side length
    pub kernel_size: usize,

    /// Max-pool window and stride
    pub pool_size: usize,

    /// Width of the dense layer before the head
    pub hidden_size: usize,

    /// Dropout probability after the dense layer
    pub dropout: f32,

    /// Number of emotion classes
    pub num_classes: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            image_size: 48,
            in_channels: 1,
            conv_channels: vec![64, 128, 256],
            kernel_size: 3,
            pool_size: 2,
            hidden_size: 128,
            dropout: 0.5,
            num_classes: 7,
        }
    }
}

impl ModelConfig {
    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.image_size == 0 || self.in_channels == 0 {
            return Err(crate::EmotionError::Config(
                "image_size and in_channels must be > 0".to_string(),
            ));
        }

        if self.conv_channels.is_empty() || self.conv_channels.contains(&0) {
            return Err(crate::EmotionError::Config(
                "conv_channels must list at least one non-zero width".to_string(),
            ));
        }

        if self.kernel_size == 0 || self.pool_size == 0 {
            return Err(crate::EmotionError::Config(
                "kernel_size and pool_size must be > 0".to_string(),
            ));
        }

        if self.hidden_size == 0 || self.num_classes < 2 {
            return Err(crate::EmotionError::Config(
                "hidden_size must be > 0 and num_classes must be >= 2".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.dropout) {
            return Err(crate::EmotionError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }

        self.try_feature_map_size().map(|_| ())
    }

    fn try_feature_map_size(&self) -> crate::Result<usize> {
        let mut size = self.image_size;
        for (block, _) in self.conv_channels.iter().enumerate() {
            if size < self.kernel_size {
                return Err(crate::EmotionError::Config(format!(
                    "conv block {} sees {}x{} input, smaller than kernel {}",
                    block, size, size, self.kernel_size
                )));
            }
            size -= self.kernel_size - 1;

            if size < self.pool_size {
                return Err(crate::EmotionError::Config(format!(
                    "pool after conv block {} sees {}x{} input, smaller than window {}",
                    block, size, size, self.pool_size
                )));
            }
            size /= self.pool_size;
        }
        Ok(size)
    }

    /// Side length of the last feature map (valid convs, floor pooling)
    pub fn feature_map_size(&self) -> usize {
        self.try_feature_map_size().unwrap_or(0)
    }

    /// Number of features entering the dense layer
    pub fn flattened_features(&self) -> usize {
        let side = self.feature_map_size();
        let channels = self.conv_channels.last().copied().unwrap_or(0);
        side * side * channels
    }

    /// Number of pixels in one input image
    pub fn input_len(&self) -> usize {
        self.in_channels * self.image_size * self.image_size
    }
}

/// Balanced subset drawn before training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Samples kept for every class
    pub samples_per_class: usize,

    /// Upper bound on batches drawn before giving up
    pub max_batches: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            samples_per_class: 200,
            max_batches: 10_000,
        }
    }
}

/// A complete training run: data locations, model and optimizer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    pub train_dir: String,
    pub test_dir: String,
    pub output_dir: String,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    /// When set, both splits are reduced to a balanced subset
    #[serde(default)]
    pub sampling: Option<SamplingConfig>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self::full()
    }
}

impl ExperimentConfig {
    /// Whole dataset, focal loss, 75 epochs of batch 32
    pub fn full() -> Self {
        Self {
            name: "full".to_string(),
            train_dir: "data/train".to_string(),
            test_dir: "data/test".to_string(),
            output_dir: "runs/full".to_string(),
            model: ModelConfig::default(),
            training: TrainingConfig {
                num_epochs: 75,
                batch_size: 32,
                loss: LossConfig::Focal {
                    gamma: 2.0,
                    alpha: 0.25,
                },
                ..Default::default()
            },
            sampling: None,
        }
    }

    /// 200 images per class, cross-entropy, 50 epochs of batch 16
    pub fn balanced() -> Self {
        Self {
            name: "balanced".to_string(),
            train_dir: "data/train".to_string(),
            test_dir: "data/test".to_string(),
            output_dir: "runs/balanced".to_string(),
            model: ModelConfig::default(),
            training: TrainingConfig {
                num_epochs: 50,
                batch_size: 16,
                loss: LossConfig::CategoricalCrossEntropy,
                ..Default::default()
            },
            sampling: Some(SamplingConfig::default()),
        }
    }

    /// Look up a preset by name
    pub fn preset(name: &str) -> crate::Result<Self> {
        match name {
            "full" => Ok(Self::full()),
            "balanced" => Ok(Self::balanced()),
            other => Err(crate::EmotionError::Config(format!(
                "Unknown preset: {}. Must be 'full' or 'balanced'",
                other
            ))),
        }
    }

    /// Load from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        self.model.validate()?;
        self.training.validate()?;

        if let Some(sampling) = &self.sampling {
            if sampling.max_batches == 0 {
                return Err(crate::EmotionError::Config(
                    "sampling.max_batches must be > 0".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_shapes() {
        let config = ModelConfig::default();
        config.validate().unwrap();

        // 48 -> 46 -> 23 -> 21 -> 10 -> 8 -> 4
        assert_eq!(config.feature_map_size(), 4);
        assert_eq!(config.flattened_features(), 4 * 4 * 256);
        assert_eq!(config.input_len(), 48 * 48);
    }

    #[test]
    fn test_too_small_image_rejected() {
        let config = ModelConfig {
            image_size: 16,
            ..Default::default()
        };
        // 16 -> 14 -> 7 -> 5 -> 2 -> kernel 3 does not fit
        assert!(matches!(
            config.validate(),
            Err(crate::EmotionError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_dropout_rejected() {
        let config = ModelConfig {
            dropout: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_presets() {
        let full = ExperimentConfig::preset("full").unwrap();
        assert_eq!(full.training.num_epochs, 75);
        assert_eq!(full.training.batch_size, 32);
        assert!(full.sampling.is_none());
        assert!(matches!(full.training.loss, LossConfig::Focal { .. }));

        let balanced = ExperimentConfig::preset("balanced").unwrap();
        assert_eq!(balanced.training.num_epochs, 50);
        assert_eq!(balanced.training.batch_size, 16);
        assert_eq!(balanced.sampling.as_ref().unwrap().samples_per_class, 200);
        assert_eq!(balanced.training.loss, LossConfig::CategoricalCrossEntropy);

        assert!(ExperimentConfig::preset("huge").is_err());
    }

    #[test]
    fn test_config_file_round_trip() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("experiment.json");

        let mut config = ExperimentConfig::balanced();
        config.train_dir = "/data/fer/train".to_string();
        config.save(&path)?;

        let loaded = ExperimentConfig::load(&path)?;
        assert_eq!(loaded.train_dir, "/data/fer/train");
        assert_eq!(loaded.model, config.model);
        assert_eq!(loaded.sampling, config.sampling);

        Ok(())
    }
}
