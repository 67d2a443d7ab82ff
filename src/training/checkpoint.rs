/// Model checkpointing with safetensors
///
/// Tensors are stored as a regular safetensors file; the training metadata is
/// kept as JSON under the `checkpoint` key of the safetensors header.
use std::path::Path;
use std::collections::HashMap;
use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use safetensors::tensor::SafeTensors;

const METADATA_KEY: &str = "checkpoint";

/// Checkpoint metadata
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CheckpointMetadata {
    /// Completed epochs
    pub epoch: usize,
    /// Optimizer steps taken
    pub step: usize,
    /// Learning rate at checkpoint
    pub lr: f64,
    /// Training loss of the last epoch
    pub loss: Option<f64>,
    /// Validation accuracy of the last epoch
    pub accuracy: Option<f64>,
    /// Model configuration (as JSON string)
    pub config: Option<String>,
}

/// Model checkpoint
pub struct Checkpoint {
    /// Model parameters
    pub tensors: HashMap<String, Tensor>,
    /// Metadata
    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    /// Create new checkpoint
    pub fn new(tensors: HashMap<String, Tensor>, metadata: CheckpointMetadata) -> Self {
        Self { tensors, metadata }
    }

    /// Snapshot every variable of a VarMap
    pub fn from_varmap(varmap: &VarMap, metadata: CheckpointMetadata) -> crate::Result<Self> {
        let data = varmap
            .data()
            .lock()
            .map_err(|_| crate::EmotionError::Data("variable map lock poisoned".to_string()))?;

        let tensors = data
            .iter()
            .map(|(name, var)| (name.clone(), var.as_tensor().clone()))
            .collect();

        Ok(Self::new(tensors, metadata))
    }

    /// Save checkpoint to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut header = HashMap::new();
        header.insert(
            METADATA_KEY.to_string(),
            serde_json::to_string(&self.metadata)?,
        );

        safetensors::tensor::serialize_to_file(
            self.tensors.iter().map(|(name, tensor)| (name.as_str(), tensor)),
            &Some(header),
            path,
        )?;

        Ok(())
    }

    /// Load checkpoint from file
    ///
    /// # Arguments
    /// * `path` - Path to checkpoint file
    /// * `device` - Device to load tensors on
    pub fn load<P: AsRef<Path>>(path: P, device: &Device) -> crate::Result<Self> {
        let data = std::fs::read(path.as_ref())?;

        let (_, header) = SafeTensors::read_metadata(&data)?;
        let metadata = match header.metadata().as_ref().and_then(|m| m.get(METADATA_KEY)) {
            Some(json) => serde_json::from_str(json)?,
            None => {
                log::warn!("No checkpoint metadata in {:?}", path.as_ref());
                CheckpointMetadata::default()
            }
        };

        let tensors = candle_core::safetensors::load_buffer(&data, device)?;

        Ok(Self { tensors, metadata })
    }
}
