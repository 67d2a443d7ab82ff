/// Image dataset loader for class-per-directory trees
///
/// Layout: `root/<class name>/**/<image>`. Classes are indexed by the sorted
/// order of their directory names.
use candle_core::{Device, Tensor};
use globwalk::DirEntry;
use image::imageops::FilterType;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::{Path, PathBuf};

const SUPPORTED_FILES: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// One decoded sample
#[derive(Debug, Clone, PartialEq)]
pub struct ImageItem {
    /// Grayscale pixels rescaled to [0, 1], row-major
    pub pixels: Vec<f32>,
    /// Class index
    pub label: usize,
    /// Source file
    pub path: PathBuf,
}

/// Dataset of image paths grouped by class directory
///
/// Images are decoded lazily by [`ImageFolderDataset::get`].
pub struct ImageFolderDataset {
    root: PathBuf,
    items: Vec<(PathBuf, usize)>,
    classes: Vec<String>,
    image_size: usize,
}

impl ImageFolderDataset {
    /// Scan `root` for class directories and their images
    pub fn from_directory<P: AsRef<Path>>(root: P, image_size: usize) -> crate::Result<Self> {
        let root = root.as_ref();

        log::info!("Scanning image folder: {:?}", root);

        if !root.is_dir() {
            return Err(crate::EmotionError::Data(format!(
                "dataset root {:?} is not a directory",
                root
            )));
        }

        let mut classes = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                classes.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        classes.sort();

        if classes.is_empty() {
            return Err(crate::EmotionError::Data(format!(
                "no class directories found under {:?}",
                root
            )));
        }

        let mut items = Vec::new();
        for (label, class) in classes.iter().enumerate() {
            let class_dir = root.join(class);
            let files = Self::list_images(&class_dir)?;

            if files.is_empty() {
                log::warn!("Class '{}' has no images in {:?}", class, class_dir);
            } else {
                log::debug!("Class '{}': {} images", class, files.len());
            }

            items.extend(files.into_iter().map(|path| (path, label)));
        }

        log::info!(
            "Found {} images belonging to {} classes",
            items.len(),
            classes.len()
        );

        Ok(Self {
            root: root.to_path_buf(),
            items,
            classes,
            image_size,
        })
    }

    fn list_images(dir: &Path) -> crate::Result<Vec<PathBuf>> {
        // "*.{ext1,ext2,...}" matches at any depth below `dir`
        let pattern = format!("*.{{{}}}", SUPPORTED_FILES.join(","));
        let walker = globwalk::GlobWalkerBuilder::from_patterns(dir, &[pattern])
            .case_insensitive(true)
            .follow_links(true)
            .sort_by(|p1: &DirEntry, p2: &DirEntry| p1.path().cmp(p2.path()))
            .build()
            .map_err(|err| crate::EmotionError::Data(format!("{:?}", err)))?;

        Ok(walker
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect())
    }

    /// Get number of images
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Class names, indexed by label
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Number of classes (including empty class directories)
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Number of images per class
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.classes.len()];
        for (_, label) in &self.items {
            counts[*label] += 1;
        }
        counts
    }

    /// Side length images are resized to
    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Dataset root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Label of the image at index
    pub fn label(&self, idx: usize) -> Option<usize> {
        self.items.get(idx).map(|(_, label)| *label)
    }

    /// Decode image at index: grayscale, nearest-neighbour resize, rescale by 1/255
    pub fn get(&self, idx: usize) -> crate::Result<ImageItem> {
        let (path, label) = self.items.get(idx).ok_or_else(|| {
            crate::EmotionError::Data(format!(
                "index {} out of range for {} images",
                idx,
                self.items.len()
            ))
        })?;

        let gray = image::open(path)?.to_luma8();
        let side = self.image_size as u32;
        let gray = if gray.dimensions() == (side, side) {
            gray
        } else {
            image::imageops::resize(&gray, side, side, FilterType::Nearest)
        };

        let pixels = gray
            .into_raw()
            .into_iter()
            .map(|p| p as f32 / 255.0)
            .collect();

        Ok(ImageItem {
            pixels,
            label: *label,
            path: path.clone(),
        })
    }
}

/// Batched loader over an [`ImageFolderDataset`]
pub struct ImageFolderLoader {
    dataset: ImageFolderDataset,
    batch_size: usize,
    current_idx: usize,
    indices: Vec<usize>,
    shuffle: bool,
    rng: StdRng,
}

impl ImageFolderLoader {
    /// Create new data loader; shuffling is seeded for reproducible epochs
    pub fn new(dataset: ImageFolderDataset, batch_size: usize, shuffle: bool, seed: u64) -> Self {
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
    pub fn dataset(&self) -> &ImageFolderDataset {
        &self.dataset
    }

    /// Labels in iteration order for the current epoch
    pub fn labels(&self) -> Vec<usize> {
        self.indices
            .iter()
            .filter_map(|&idx| self.dataset.label(idx))
            .collect()
    }
}

impl super::BatchDataLoader for ImageFolderLoader {
    fn next_batch(&mut self, device: &Device) -> crate::Result<Option<(Tensor, Tensor)>> {
        if self.current_idx >= self.indices.len() {
            return Ok(None);
        }

        let end_idx = (self.current_idx + self.batch_size).min(self.indices.len());
        let batch_indices = &self.indices[self.current_idx..end_idx];
        let actual_batch_size = batch_indices.len();
        let side = self.dataset.image_size();

        let mut pixels = Vec::with_capacity(actual_batch_size * side * side);
        let mut labels = Vec::with_capacity(actual_batch_size);
        for &idx in batch_indices {
            let item = self.dataset.get(idx)?;
            pixels.extend(item.pixels);
            labels.push(item.label);
        }

        self.current_idx = end_idx;

        let images = Tensor::from_vec(pixels, (actual_batch_size, 1, side, side), device)?;
        let targets = super::one_hot(&labels, self.dataset.num_classes(), device)?;

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
        self.dataset.num_classes()
    }

    fn class_counts(&self) -> Option<Vec<usize>> {
        Some(self.dataset.class_counts())
    }
}
