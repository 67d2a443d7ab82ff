//! Emotion CNN - facial emotion classification with candle
//!
//! Trains a small convolutional network that maps 48x48 grayscale face crops
//! to one of seven emotion classes.
//!
//! # Pipeline
//!
//! - **Data**: class-per-directory image trees, decoded and rescaled to `[0, 1]`
//! - **Sampling**: optional balanced subset with a fixed quota per class
//! - **Model**: three conv/pool blocks, a dense layer with dropout, softmax head
//! - **Training**: Adam with focal loss or categorical cross-entropy
//! - **Reporting**: accuracy/loss curves, confusion matrix, per-class accuracy
//!
//! # Example
//!
//! ```ignore
//! use emotion_cnn::{ExperimentConfig, ModelConfig};
//! use emotion_cnn::data::{ImageFolderDataset, ImageFolderLoader};
//! use emotion_cnn::training::Trainer;
//!
//! let config = ExperimentConfig::full();
//! let train = ImageFolderDataset::from_directory(&config.train_dir, 48)?;
//! let mut loader = ImageFolderLoader::new(train, 32, true, 42);
//! let mut trainer = Trainer::new(config.model, config.training, device)?;
//! ```

pub mod config;
pub mod customers;
pub mod data;
pub mod layers;
pub mod metrics;
pub mod models;
pub mod plot;
pub mod training;
pub mod utils;

// Re-export commonly used items
pub use config::{ExperimentConfig, ModelConfig, SamplingConfig};
pub use models::EmotionCnn;

/// Library error types
#[derive(Debug, thiserror::Error)]
pub enum EmotionError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Class {class} has {available} samples, {requested} requested")]
    InsufficientSamples {
        class: usize,
        available: usize,
        requested: usize,
    },

    #[error("Per-class quota not reached after {batches} batches (counts: {counts:?})")]
    QuotaUnreachable { batches: usize, counts: Vec<usize> },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Plot error: {0}")]
    Plot(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Safetensors error: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EmotionError>;
