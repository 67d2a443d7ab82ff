/// Per-epoch training record
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Averages over one pass of a loader
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Mean loss per sample
    pub loss: f64,
    /// Fraction of samples whose argmax matched the target
    pub accuracy: f64,
    /// Samples seen
    pub samples: usize,
}

/// Loss and accuracy curves for training and validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub train_loss: Vec<f64>,
    pub train_accuracy: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_accuracy: Vec<f64>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one epoch
    pub fn record(&mut self, train: EpochMetrics, valid: EpochMetrics) {
        self.train_loss.push(train.loss);
        self.train_accuracy.push(train.accuracy);
        self.val_loss.push(valid.loss);
        self.val_accuracy.push(valid.accuracy);
    }

    /// Number of recorded epochs
    pub fn epochs(&self) -> usize {
        self.train_loss.len()
    }

    /// `(epoch index, accuracy)` of the best validation epoch
    pub fn best_val_accuracy(&self) -> Option<(usize, f64)> {
        self.val_accuracy
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (epoch, acc)| match best {
                Some((_, best_acc)) if best_acc >= acc => best,
                _ => Some((epoch, acc)),
            })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&data)?)
    }
}
