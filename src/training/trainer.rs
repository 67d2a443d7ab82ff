/// Training loop for EmotionCnn
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::BatchDataLoader;
use crate::metrics::Predictions;
use crate::{EmotionCnn, ModelConfig};
use super::checkpoint::{Checkpoint, CheckpointMetadata};
use super::history::{EpochMetrics, History};
use super::loss::{categorical_accuracy, LossConfig};

/// Training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of training epochs
    pub num_epochs: usize,
    /// Batch size
    pub batch_size: usize,
    /// Learning rate
    pub learning_rate: f64,
    /// Adam first-moment decay
    pub beta1: f64,
    /// Adam second-moment decay
    pub beta2: f64,
    /// Adam denominator epsilon
    pub eps: f64,
    /// Decoupled weight decay (0 gives plain Adam)
    pub weight_decay: f64,
    /// Loss function
    pub loss: LossConfig,
    /// Seed for data shuffling
    pub seed: u64,
    /// Log every N steps
    pub log_every: usize,
    /// Save a checkpoint after every epoch when set
    #[serde(default)]
    pub checkpoint_dir: Option<String>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            num_epochs: 10,
            batch_size: 32,
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-7,
            weight_decay: 0.0,
            loss: LossConfig::default(),
            seed: 42,
            log_every: 100,
            checkpoint_dir: None,
        }
    }
}

impl TrainingConfig {
    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.num_epochs == 0 || self.batch_size == 0 {
            return Err(crate::EmotionError::Config(
                "num_epochs and batch_size must be > 0".to_string(),
            ));
        }

        if self.learning_rate <= 0.0 {
            return Err(crate::EmotionError::Config(
                "learning_rate must be > 0".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.beta1) || !(0.0..1.0).contains(&self.beta2) {
            return Err(crate::EmotionError::Config(
                "beta1 and beta2 must be in [0, 1)".to_string(),
            ));
        }

        self.loss.validate()
    }
}

/// Outcome of a single optimizer step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutput {
    pub loss: f32,
    pub correct: usize,
    pub batch_size: usize,
}

/// Loss and accuracy of `model` over a full pass of `loader`, without dropout
pub fn evaluate(
    model: &EmotionCnn,
    loss: &LossConfig,
    loader: &mut impl BatchDataLoader,
    device: &Device,
) -> crate::Result<EpochMetrics> {
    let mut total_loss = 0.0f64;
    let mut correct = 0usize;
    let mut samples = 0usize;

    loader.reset();

    while let Some((images, targets)) = loader.next_batch(device)? {
        let batch_size = images.dim(0)?;
        let probs = model.forward_t(&images, false)?;

        let batch_loss = loss.compute(&targets, &probs)?.to_scalar::<f32>()?;
        total_loss += batch_loss as f64 * batch_size as f64;
        correct += categorical_accuracy(&targets, &probs)?;
        samples += batch_size;
    }

    Ok(averaged(total_loss, correct, samples))
}

/// Class indices for every sample of `loader`, in loader order
pub fn predict(
    model: &EmotionCnn,
    loader: &mut impl BatchDataLoader,
    device: &Device,
) -> crate::Result<Predictions> {
    let mut predictions = Predictions::default();

    loader.reset();

    while let Some((images, targets)) = loader.next_batch(device)? {
        let truth = targets.argmax(D::Minus1)?.to_vec1::<u32>()?;
        let predicted = model.predict(&images)?;

        predictions.y_true.extend(truth.into_iter().map(|c| c as usize));
        predictions.y_pred.extend(predicted.into_iter().map(|c| c as usize));
    }

    Ok(predictions)
}

fn averaged(total_loss: f64, correct: usize, samples: usize) -> EpochMetrics {
    if samples == 0 {
        return EpochMetrics::default();
    }

    EpochMetrics {
        loss: total_loss / samples as f64,
        accuracy: correct as f64 / samples as f64,
        samples,
    }
}

/// Trainer for EmotionCnn
pub struct Trainer {
    model: EmotionCnn,
    model_config: ModelConfig,
    varmap: VarMap,
    optimizer: AdamW,
    config: TrainingConfig,
    device: Device,
    step: usize,
    epoch: usize,
}

impl Trainer {
    /// Create new trainer
    pub fn new(
        model_config: ModelConfig,
        training_config: TrainingConfig,
        device: Device,
    ) -> crate::Result<Self> {
        training_config.validate()?;

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = EmotionCnn::new(model_config.clone(), vb)?;

        log::info!(
            "Model initialized: {} parameters",
            crate::utils::count_parameters(&varmap)
        );

        // Adam via candle's AdamW with no weight decay
        let optimizer_params = ParamsAdamW {
            lr: training_config.learning_rate,
            beta1: training_config.beta1,
            beta2: training_config.beta2,
            eps: training_config.eps,
            weight_decay: training_config.weight_decay,
        };
        let optimizer = AdamW::new(varmap.all_vars(), optimizer_params)?;

        Ok(Self {
            model,
            model_config,
            varmap,
            optimizer,
            config: training_config,
            device,
            step: 0,
            epoch: 0,
        })
    }

    pub fn model(&self) -> &EmotionCnn {
        &self.model
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Optimizer steps taken so far
    pub fn step(&self) -> usize {
        self.step
    }

    /// Training step
    pub fn train_step(&mut self, images: &Tensor, targets: &Tensor) -> crate::Result<StepOutput> {
        let batch_size = images.dim(0)?;

        log::debug!("Input shape: {:?}, target shape: {:?}", images.dims(), targets.dims());

        let probs = self.model.forward_t(images, true)?;
        let loss = self.config.loss.compute(targets, &probs)?;
        let loss_val = loss.to_scalar::<f32>()?;

        if !loss_val.is_finite() {
            return Err(crate::EmotionError::Data(format!(
                "non-finite loss {} at step {}",
                loss_val, self.step
            )));
        }

        // Gradients and parameter update in one call
        self.optimizer.backward_step(&loss)?;

        let correct = categorical_accuracy(targets, &probs)?;
        self.step += 1;

        Ok(StepOutput {
            loss: loss_val,
            correct,
            batch_size,
        })
    }

    /// Train for one epoch
    pub fn train_epoch(
        &mut self,
        dataloader: &mut impl BatchDataLoader,
    ) -> crate::Result<EpochMetrics> {
        let mut total_loss = 0.0f64;
        let mut correct = 0usize;
        let mut samples = 0usize;

        dataloader.reset();

        while let Some((images, targets)) = dataloader.next_batch(&self.device)? {
            let output = self.train_step(&images, &targets)?;
            total_loss += output.loss as f64 * output.batch_size as f64;
            correct += output.correct;
            samples += output.batch_size;

            if self.config.log_every > 0 && self.step % self.config.log_every == 0 {
                log::info!(
                    "Step {}: loss={:.4}, running_acc={:.4}",
                    self.step,
                    output.loss,
                    correct as f64 / samples as f64
                );
            }
        }

        Ok(averaged(total_loss, correct, samples))
    }

    /// Loss and accuracy on `dataloader` with the current weights
    pub fn evaluate(&self, dataloader: &mut impl BatchDataLoader) -> crate::Result<EpochMetrics> {
        evaluate(&self.model, &self.config.loss, dataloader, &self.device)
    }

    /// True and predicted classes on `dataloader` with the current weights
    pub fn predict(&self, dataloader: &mut impl BatchDataLoader) -> crate::Result<Predictions> {
        predict(&self.model, dataloader, &self.device)
    }

    /// Save checkpoint
    pub fn save_checkpoint<P: AsRef<Path>>(
        &self,
        path: P,
        epoch: &EpochMetrics,
        valid: &EpochMetrics,
    ) -> crate::Result<()> {
        let metadata = CheckpointMetadata {
            epoch: self.epoch,
            step: self.step,
            lr: self.optimizer.learning_rate(),
            loss: Some(epoch.loss),
            accuracy: Some(valid.accuracy),
            config: Some(serde_json::to_string(&self.model_config)?),
        };

        Checkpoint::from_varmap(&self.varmap, metadata)?.save(path)
    }

    /// Save the current weights as a plain safetensors file
    pub fn save_weights<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.varmap.save(path.as_ref())?;
        Ok(())
    }

    /// Full training loop with validation after every epoch
    pub fn fit(
        &mut self,
        train_loader: &mut impl BatchDataLoader,
        valid_loader: &mut impl BatchDataLoader,
    ) -> crate::Result<History> {
        log::info!("Starting training for {} epochs", self.config.num_epochs);
        log::info!("Total batches per epoch: {}", train_loader.num_batches());

        let mut history = History::new();

        for _ in 0..self.config.num_epochs {
            let train = self.train_epoch(train_loader)?;
            let valid = self.evaluate(valid_loader)?;
            self.epoch += 1;

            log::info!(
                "Epoch {}/{}: loss={:.4} accuracy={:.4} val_loss={:.4} val_accuracy={:.4}",
                self.epoch,
                self.config.num_epochs,
                train.loss,
                train.accuracy,
                valid.loss,
                valid.accuracy
            );

            history.record(train, valid);

            if let Some(dir) = &self.config.checkpoint_dir {
                let checkpoint_path =
                    Path::new(dir).join(format!("epoch_{}.safetensors", self.epoch));
                log::debug!("Saving checkpoint to {:?}", checkpoint_path);
                self.save_checkpoint(&checkpoint_path, &train, &valid)?;
            }
        }

        if let Some((epoch, accuracy)) = history.best_val_accuracy() {
            log::info!(
                "Training complete: best val_accuracy={:.4} at epoch {}",
                accuracy,
                epoch + 1
            );
        }

        Ok(history)
    }
}
