/// Weight loading from safetensors files
use std::path::Path;
use candle_core::{Device, DType};
use candle_nn::VarBuilder;
use crate::ModelConfig;
use super::EmotionCnn;

/// Load model from safetensors file
///
/// # Arguments
/// * `config` - Model configuration the weights were trained with
/// * `weights_path` - Path to safetensors file
/// * `device` - Device to load model on
///
/// # Returns
/// Loaded EmotionCnn
pub fn load_model<P: AsRef<Path>>(
    config: ModelConfig,
    weights_path: P,
    device: &Device,
) -> crate::Result<EmotionCnn> {
    // Load weights using Candle's built-in safetensors support
    let dtype = DType::F32;
    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(
            &[weights_path.as_ref()],
            dtype,
            device,
        )?
    };

    EmotionCnn::new(config, vb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::tiny_config;
    use candle_core::Tensor;
    use candle_nn::VarMap;

    #[test]
    fn test_saved_weights_reload() -> crate::Result<()> {
        let device = Device::Cpu;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("model.safetensors");

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = EmotionCnn::new(tiny_config(), vb)?;
        varmap.save(&path)?;

        let reloaded = load_model(tiny_config(), &path, &device)?;

        let images = Tensor::rand(0f32, 1.0, (3, 1, 12, 12), &device)?;
        let expected = model.forward_t(&images, false)?.to_vec2::<f32>()?;
        let actual = reloaded.forward_t(&images, false)?.to_vec2::<f32>()?;
        assert_eq!(expected, actual);

        Ok(())
    }

    #[test]
    fn test_missing_weights_is_error() {
        let result = load_model(tiny_config(), "/no/such/model.safetensors", &Device::Cpu);
        assert!(result.is_err());
    }
}
