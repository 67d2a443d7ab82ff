/// Balanced subset extraction from a streaming loader
use candle_core::Device;

use super::{argmax, BatchDataLoader, InMemoryDataset};

/// Draw exactly `samples_per_class` samples of every class from `loader`
///
/// Batches are drawn until each class bucket is full; samples of a full class
/// are skipped and drawing stops mid-batch once the last bucket fills. An
/// exhausted loader is reset (reshuffling if it shuffles) and drawing goes on.
///
/// Fails with [`crate::EmotionError::InsufficientSamples`] when the loader
/// knows a class cannot fill its quota, and with
/// [`crate::EmotionError::QuotaUnreachable`] after `max_batches` batches.
pub fn sample_per_class<L: BatchDataLoader>(
    loader: &mut L,
    samples_per_class: usize,
    max_batches: usize,
    device: &Device,
) -> crate::Result<InMemoryDataset> {
    let num_classes = loader.num_classes();
    let mut counts = vec![0usize; num_classes];
    let mut dataset: Option<InMemoryDataset> = None;

    if samples_per_class == 0 {
        return Ok(InMemoryDataset::new(1, 0, num_classes));
    }

    if let Some(available) = loader.class_counts() {
        if let Some((class, &count)) = available
            .iter()
            .enumerate()
            .find(|(_, &count)| count < samples_per_class)
        {
            return Err(crate::EmotionError::InsufficientSamples {
                class,
                available: count,
                requested: samples_per_class,
            });
        }
    }

    let mut batches = 0;
    let mut just_reset = false;

    while counts.iter().any(|&count| count < samples_per_class) {
        if batches >= max_batches {
            return Err(crate::EmotionError::QuotaUnreachable { batches, counts });
        }

        let Some((images, targets)) = loader.next_batch(device)? else {
            if just_reset {
                return Err(crate::EmotionError::Data(
                    "loader yielded no batches after reset".to_string(),
                ));
            }
            loader.reset();
            just_reset = true;
            continue;
        };
        just_reset = false;
        batches += 1;

        let (_, channels, height, _) = images.dims4()?;
        let images = images.flatten_from(1)?.to_vec2::<f32>()?;
        let targets = targets.to_vec2::<f32>()?;

        let dataset =
            dataset.get_or_insert_with(|| InMemoryDataset::new(channels, height, num_classes));

        for (pixels, target) in images.iter().zip(targets.iter()) {
            let label = argmax(target);
            if counts[label] < samples_per_class {
                dataset.push(pixels, label)?;
                counts[label] += 1;
            }

            if counts.iter().all(|&count| count >= samples_per_class) {
                break;
            }
        }

        log::debug!("Sampling batch {}: counts {:?}", batches, counts);
    }

    log::info!(
        "Sampled {} examples per class from {} batches",
        samples_per_class,
        batches
    );

    dataset.ok_or_else(|| crate::EmotionError::Data("loader yielded no samples".to_string()))
}
