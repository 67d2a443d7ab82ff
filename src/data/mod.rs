/// Data loading modules for emotion training
pub mod image_folder;
pub mod in_memory;
pub mod sampler;

pub use image_folder::{ImageFolderDataset, ImageFolderLoader, ImageItem};
pub use in_memory::{InMemoryDataset, InMemoryLoader};
pub use sampler::sample_per_class;

use candle_core::{Device, Tensor};

/// Generic data loader trait
///
/// Batches are `(images, targets)` with images `[batch, channels, height, width]`
/// and one-hot targets `[batch, num_classes]`, both f32.
pub trait BatchDataLoader {
    /// Get next batch of (images, targets) tensors
    fn next_batch(&mut self, device: &Device) -> crate::Result<Option<(Tensor, Tensor)>>;

    /// Reset loader for new epoch
    fn reset(&mut self);

    /// Get total number of batches
    fn num_batches(&self) -> usize;

    /// Number of classes in the one-hot targets
    fn num_classes(&self) -> usize;

    /// Samples available per class, when the loader knows them up front
    fn class_counts(&self) -> Option<Vec<usize>> {
        None
    }
}

/// One-hot encode class indices into a `[labels.len(), num_classes]` f32 tensor
pub fn one_hot(labels: &[usize], num_classes: usize, device: &Device) -> crate::Result<Tensor> {
    let mut data = vec![0f32; labels.len() * num_classes];
    for (row, &label) in labels.iter().enumerate() {
        if label >= num_classes {
            return Err(crate::EmotionError::Data(format!(
                "label {} out of range for {} classes",
                label, num_classes
            )));
        }
        data[row * num_classes + label] = 1.0;
    }
    Ok(Tensor::from_vec(data, (labels.len(), num_classes), device)?)
}

/// Index of the largest value in a row (first one wins on ties)
pub(crate) fn argmax(row: &[f32]) -> usize {
    let mut best = 0;
    for (i, &value) in row.iter().enumerate() {
        if value > row[best] {
            best = i;
        }
    }
    best
}
