/// Datasets held fully in memory (e.g. a balanced subset)
use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Flattened images with class labels
#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryDataset {
    pixels: Vec<f32>,     // [N * channels * side * side]
    labels: Vec<usize>,   // [N]
    channels: usize,
    image_size: usize,
    num_classes: usize,
}

impl InMemoryDataset {
    /// Create an empty dataset for `channels x image_size x image_size` samples
    pub fn new(channels: usize, image_size: usize, num_classes: usize) -> Self {
        Self {
            pixels: Vec::new(),
            labels: Vec::new(),
            channels,
            image_size,
            num_classes,
        }
    }

    /// Append one sample
    pub fn push(&mut self, pixels: &[f32], label: usize) -> crate::Result<()> {
        if pixels.len() != self.sample_len() {
            return Err(crate::EmotionError::Data(format!(
                "sample has {} values, expected {}",
                pixels.len(),
                self.sample_len()
            )));
        }
        if label >= self.num_classes {
            return Err(crate::EmotionError::Data(format!(
                "label {} out of range for {} classes",
                label, self.num_classes
            )));
        }

        self.pixels.extend_from_slice(pixels);
        self.labels.push(label);
        Ok(())
    }

    /// Values per sample
    pub fn sample_len(&self) -> usize {
        self.channels * self.image_size * self.image_size
    }

    /// Get number of samples
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Labels in insertion order
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Pixels of sample at index
    pub fn pixels(&self, idx: usize) -> &[f32] {
        let len = self.sample_len();
        &self.pixels[idx * len..(idx + 1) * len]
    }

    /// Number of samples per class
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_classes];
        for &label in &self.labels {
            counts[label] += 1;
        }
        counts
    }
}

/// Batched loader over an [`InMemoryDataset`]
pub struct InMemoryLoader {
    dataset: InMemoryDataset,
    batch_size: usize,
    current_idx: usize,
    indices: Vec<usize>,
    shuffle: bool,
    rng: StdRng,
}

impl InMemoryLoader {
    /// Create new data loader
    pub fn new(dataset: InMemoryDataset, batch_size: usize, shuffle: bool, seed: u64) -> Self {
        let mut indices: Vec<usize> = (0..dataset.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);

        if shuffle {
            indices.shuffle(&mut rng);
        }

        Self {
            dataset,
            batch_size: batch_size.max(1),
            current_idx: 0,
            indices,
            shuffle,
            rng,
        }
    }

    /// Get dataset reference
    pub fn dataset(&self) -> &InMemoryDataset {
        &self.dataset
    }
}

impl super::BatchDataLoader for InMemoryLoader {
    fn next_batch(&mut self, device: &Device) -> crate::Result<Option<(Tensor, Tensor)>> {
        if self.current_idx >= self.indices.len() {
            return Ok(None);
        }

        let end_idx = (self.current_idx + self.batch_size).min(self.indices.len());
        let batch_indices = &self.indices[self.current_idx..end_idx];
        let actual_batch_size = batch_indices.len();

        let mut pixels = Vec::with_capacity(actual_batch_size * self.dataset.sample_len());
        let mut labels = Vec::with_capacity(actual_batch_size);
        for &idx in batch_indices {
            pixels.extend_from_slice(self.dataset.pixels(idx));
            labels.push(self.dataset.labels[idx]);
        }

        self.current_idx = end_idx;

        let side = self.dataset.image_size;
        let images = Tensor::from_vec(
            pixels,
            (actual_batch_size, self.dataset.channels, side, side),
            device,
        )?;
        let targets = super::one_hot(&labels, self.dataset.num_classes, device)?;

        Ok(Some((images, targets)))
    }

    fn reset(&mut self) {
        self.current_idx = 0;

        if self.shuffle {
            self.indices.shuffle(&mut self.rng);
        }
    }

    fn num_batches(&self) -> usize {
        (self.dataset.len() + self.batch_size - 1) / self.batch_size
    }

    fn num_classes(&self) -> usize {
        self.dataset.num_classes
    }

    fn class_counts(&self) -> Option<Vec<usize>> {
        Some(self.dataset.class_counts())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::BatchDataLoader;

    fn dataset(labels: &[usize]) -> InMemoryDataset {
        let mut dataset = InMemoryDataset::new(1, 2, 3);
        for &label in labels {
            dataset.push(&[label as f32; 4], label).unwrap();
        }
        dataset
    }

    #[test]
    fn test_push_validates() {
        let mut dataset = InMemoryDataset::new(1, 2, 3);
        assert!(dataset.push(&[0.0; 3], 0).is_err());
        assert!(dataset.push(&[0.0; 4], 3).is_err());
        assert!(dataset.push(&[0.0; 4], 2).is_ok());
        assert_eq!(dataset.class_counts(), vec![0, 0, 1]);
    }

    #[test]
    fn test_loader_yields_pixels_with_matching_targets() -> crate::Result<()> {
        let device = Device::Cpu;
        let mut loader = InMemoryLoader::new(dataset(&[0, 1, 2, 1, 0]), 2, true, 3);

        assert_eq!(loader.num_batches(), 3);

        let mut seen = 0;
        while let Some((images, targets)) = loader.next_batch(&device)? {
            let images = images.flatten_from(1)?.to_vec2::<f32>()?;
            let targets = targets.to_vec2::<f32>()?;
            for (pixels, target) in images.iter().zip(targets.iter()) {
                let label = pixels[0] as usize;
                assert_eq!(target[label], 1.0);
                seen += 1;
            }
        }
        assert_eq!(seen, 5);
        Ok(())
    }
}
