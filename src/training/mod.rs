/// Training infrastructure for EmotionCnn

// Note: Using candle-nn's built-in AdamW optimizer (weight_decay 0 gives Adam)
pub mod checkpoint;
pub mod history;
pub mod loss;
pub mod trainer;

pub use checkpoint::{Checkpoint, CheckpointMetadata};
pub use history::{EpochMetrics, History};
pub use loss::{categorical_cross_entropy, focal_loss, LossConfig};
pub use trainer::{evaluate, predict, StepOutput, Trainer, TrainingConfig};
