/// Classification losses over softmax probabilities
///
/// Predictions are class probabilities `[batch, num_classes]` and targets are
/// one-hot rows of the same shape. Both losses clip predictions into
/// `[EPSILON, 1 - EPSILON]` before taking logarithms.
use candle_core::{DType, Result, Tensor, D};
use serde::{Deserialize, Serialize};

/// Clipping bound for probabilities
pub const EPSILON: f64 = 1e-7;

fn clip_probabilities(y_pred: &Tensor) -> Result<Tensor> {
    let lo = Tensor::new(EPSILON, y_pred.device())?.to_dtype(y_pred.dtype())?;
    let hi = Tensor::new(1.0 - EPSILON, y_pred.device())?.to_dtype(y_pred.dtype())?;
    y_pred.broadcast_maximum(&lo)?.broadcast_minimum(&hi)
}

/// Focal loss
///
/// `mean_batch(sum_classes(alpha * (1 - p)^gamma * -y * ln(p)))`
///
/// The `(1 - p)^gamma` factor shrinks the contribution of confidently
/// correct predictions. With `gamma = 0` and `alpha = 1` this is plain
/// categorical cross-entropy.
pub fn focal_loss(y_true: &Tensor, y_pred: &Tensor, gamma: f64, alpha: f64) -> Result<Tensor> {
    let y_pred = clip_probabilities(y_pred)?;
    let y_true = y_true.to_dtype(y_pred.dtype())?;

    let cross_entropy = y_true.mul(&y_pred.log()?)?.neg()?;
    let weight = y_pred.affine(-1.0, 1.0)?.powf(gamma)?.affine(alpha, 0.0)?;

    weight.mul(&cross_entropy)?.sum(1)?.mean_all()
}

/// Categorical cross-entropy
///
/// Rows of `y_pred` are renormalized to sum to one before clipping.
pub fn categorical_cross_entropy(y_true: &Tensor, y_pred: &Tensor) -> Result<Tensor> {
    let y_pred = y_pred.broadcast_div(&y_pred.sum_keepdim(1)?)?;
    let y_pred = clip_probabilities(&y_pred)?;
    let y_true = y_true.to_dtype(y_pred.dtype())?;

    y_true.mul(&y_pred.log()?)?.sum(1)?.neg()?.mean_all()
}

/// Number of rows whose predicted class matches the one-hot target
pub fn categorical_accuracy(y_true: &Tensor, y_pred: &Tensor) -> Result<usize> {
    let truth = y_true.argmax(D::Minus1)?;
    let predicted = y_pred.argmax(D::Minus1)?;
    let correct = truth
        .eq(&predicted)?
        .to_dtype(DType::U32)?
        .sum_all()?
        .to_scalar::<u32>()?;
    Ok(correct as usize)
}

/// Loss selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LossConfig {
    Focal { gamma: f64, alpha: f64 },
    CategoricalCrossEntropy,
}

impl Default for LossConfig {
    fn default() -> Self {
        LossConfig::Focal {
            gamma: 2.0,
            alpha: 0.25,
        }
    }
}

impl LossConfig {
    /// Scalar loss for a batch
    pub fn compute(&self, y_true: &Tensor, y_pred: &Tensor) -> Result<Tensor> {
        match self {
            LossConfig::Focal { gamma, alpha } => focal_loss(y_true, y_pred, *gamma, *alpha),
            LossConfig::CategoricalCrossEntropy => categorical_cross_entropy(y_true, y_pred),
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        if let LossConfig::Focal { gamma, alpha } = self {
            if *gamma < 0.0 || *alpha <= 0.0 {
                return Err(crate::EmotionError::Config(format!(
                    "focal loss needs gamma >= 0 and alpha > 0, got gamma={} alpha={}",
                    gamma, alpha
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::Device;

    fn tensor(rows: &[[f32; 3]], device: &Device) -> Result<Tensor> {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Tensor::from_vec(flat, (rows.len(), 3), device)
    }

    #[test]
    fn test_focal_loss_closed_form() -> Result<()> {
        let device = Device::Cpu;
        let y_true = tensor(&[[0.0, 1.0, 0.0], [1.0, 0.0, 0.0]], &device)?;
        let y_pred = tensor(&[[0.2, 0.7, 0.1], [0.4, 0.5, 0.1]], &device)?;

        let loss = focal_loss(&y_true, &y_pred, 2.0, 0.25)?.to_scalar::<f32>()?;

        let row0 = 0.25 * 0.3f64.powi(2) * -(0.7f64.ln());
        let row1 = 0.25 * 0.6f64.powi(2) * -(0.4f64.ln());
        assert_relative_eq!(loss as f64, (row0 + row1) / 2.0, epsilon = 1e-5);

        Ok(())
    }

    #[test]
    fn test_focal_loss_non_negative() -> crate::Result<()> {
        let device = Device::Cpu;
        let logits = Tensor::randn(0f32, 3.0, (16, 7), &device)?;
        let y_pred = candle_nn::ops::softmax(&logits, D::Minus1)?;
        let labels: Vec<usize> = (0..16).map(|i| i % 7).collect();
        let y_true = crate::data::one_hot(&labels, 7, &device)?;

        let loss = focal_loss(&y_true, &y_pred, 2.0, 0.25)?.to_scalar::<f32>()?;

        assert!(loss >= 0.0);
        assert!(loss.is_finite());

        Ok(())
    }

    #[test]
    fn test_focal_loss_clips_zero_probability() -> Result<()> {
        let device = Device::Cpu;
        let y_true = tensor(&[[1.0, 0.0, 0.0]], &device)?;
        let y_pred = tensor(&[[0.0, 1.0, 0.0]], &device)?;

        let loss = focal_loss(&y_true, &y_pred, 2.0, 0.25)?.to_scalar::<f32>()?;

        assert!(loss.is_finite());
        // -ln(1e-7) ~= 16.1, weighted by alpha and (1 - 1e-7)^2
        assert_relative_eq!(loss as f64, 0.25 * -(EPSILON.ln()), epsilon = 1e-3);

        Ok(())
    }

    #[test]
    fn test_focal_loss_downweights_easy_examples() -> Result<()> {
        let device = Device::Cpu;
        let y_true = tensor(&[[0.0, 0.0, 1.0]], &device)?;
        let easy = tensor(&[[0.05, 0.05, 0.9]], &device)?;
        let hard = tensor(&[[0.45, 0.45, 0.1]], &device)?;

        let easy_focal = focal_loss(&y_true, &easy, 2.0, 1.0)?.to_scalar::<f32>()?;
        let easy_ce = categorical_cross_entropy(&y_true, &easy)?.to_scalar::<f32>()?;
        let hard_focal = focal_loss(&y_true, &hard, 2.0, 1.0)?.to_scalar::<f32>()?;
        let hard_ce = categorical_cross_entropy(&y_true, &hard)?.to_scalar::<f32>()?;

        assert!(easy_focal < hard_focal);
        // easy example keeps 1% of its cross-entropy, hard one 81%
        assert_relative_eq!(easy_focal / easy_ce, 0.01, epsilon = 1e-4);
        assert_relative_eq!(hard_focal / hard_ce, 0.81, epsilon = 1e-4);

        Ok(())
    }

    #[test]
    fn test_focal_loss_reduces_to_cross_entropy() -> Result<()> {
        let device = Device::Cpu;
        let y_true = tensor(&[[0.0, 1.0, 0.0], [0.0, 0.0, 1.0]], &device)?;
        let y_pred = tensor(&[[0.1, 0.6, 0.3], [0.3, 0.3, 0.4]], &device)?;

        let focal = focal_loss(&y_true, &y_pred, 0.0, 1.0)?.to_scalar::<f32>()?;
        let ce = categorical_cross_entropy(&y_true, &y_pred)?.to_scalar::<f32>()?;

        assert_relative_eq!(focal, ce, epsilon = 1e-6);
        assert_relative_eq!(
            ce as f64,
            -(0.6f64.ln() + 0.4f64.ln()) / 2.0,
            epsilon = 1e-5
        );

        Ok(())
    }

    #[test]
    fn test_cross_entropy_renormalizes_rows() -> Result<()> {
        let device = Device::Cpu;
        let y_true = tensor(&[[0.0, 1.0, 0.0]], &device)?;
        // rows sum to 2, so the true class holds half the mass
        let y_pred = tensor(&[[0.5, 1.0, 0.5]], &device)?;

        let ce = categorical_cross_entropy(&y_true, &y_pred)?.to_scalar::<f32>()?;

        assert_relative_eq!(ce as f64, -(0.5f64.ln()), epsilon = 1e-5);

        Ok(())
    }

    #[test]
    fn test_focal_loss_has_gradient() -> Result<()> {
        let device = Device::Cpu;
        let logits = candle_core::Var::from_tensor(&tensor(&[[0.5, 0.1, -0.3]], &device)?)?;
        let y_true = tensor(&[[1.0, 0.0, 0.0]], &device)?;

        let y_pred = candle_nn::ops::softmax(logits.as_tensor(), D::Minus1)?;
        let loss = focal_loss(&y_true, &y_pred, 2.0, 0.25)?;
        let grads = loss.backward()?;

        let grad = grads.get(logits.as_tensor()).expect("gradient for logits");
        let grad = grad.flatten_all()?.to_vec1::<f32>()?;
        // pushing the true class logit up lowers the loss
        assert!(grad[0] < 0.0);

        Ok(())
    }

    #[test]
    fn test_categorical_accuracy() -> Result<()> {
        let device = Device::Cpu;
        let y_true = tensor(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]], &device)?;
        let y_pred = tensor(&[[0.8, 0.1, 0.1], [0.6, 0.3, 0.1], [0.1, 0.1, 0.8]], &device)?;

        assert_eq!(categorical_accuracy(&y_true, &y_pred)?, 2);

        Ok(())
    }

    #[test]
    fn test_loss_config_serde() {
        let json = serde_json::to_string(&LossConfig::default()).unwrap();
        assert_eq!(json, r#"{"type":"focal","gamma":2.0,"alpha":0.25}"#);

        let parsed: LossConfig =
            serde_json::from_str(r#"{"type":"categorical_cross_entropy"}"#).unwrap();
        assert_eq!(parsed, LossConfig::CategoricalCrossEntropy);

        assert!(LossConfig::Focal { gamma: -1.0, alpha: 0.25 }.validate().is_err());
    }
}
