/// Dense classification head
use candle_core::{Module, Result, Tensor, D};
use candle_nn::{Dropout, Linear, VarBuilder};

/// Dense + ReLU, dropout, then a softmax output layer
///
/// Maps flattened features `[batch, in_features]` to class probabilities
/// `[batch, num_classes]`.
pub struct ClassifierHead {
    hidden: Linear,
    dropout: Dropout,
    output: Linear,
}

impl ClassifierHead {
    pub fn new(
        in_features: usize,
        hidden_size: usize,
        num_classes: usize,
        dropout: f32,
        vb: VarBuilder,
    ) -> Result<Self> {
        let hidden = candle_nn::linear(in_features, hidden_size, vb.pp("hidden"))?;
        let output = candle_nn::linear(hidden_size, num_classes, vb.pp("output"))?;

        Ok(Self {
            hidden,
            dropout: Dropout::new(dropout),
            output,
        })
    }

    /// Raw scores before softmax
    pub fn logits(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let xs = self.hidden.forward(xs)?.relu()?;
        let xs = self.dropout.forward(&xs, train)?;
        self.output.forward(&xs)
    }

    /// Class probabilities; dropout is only active when `train` is set
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        candle_nn::ops::softmax(&self.logits(xs, train)?, D::Minus1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_head_outputs_distribution() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let head = ClassifierHead::new(32, 16, 7, 0.5, vb)?;

        let x = Tensor::randn(0f32, 1.0, (4, 32), &device)?;
        let probs = head.forward_t(&x, true)?;

        assert_eq!(probs.dims(), &[4, 7]);
        for row in probs.sum(1)?.to_vec1::<f32>()? {
            assert!((row - 1.0).abs() < 1e-5);
        }

        Ok(())
    }

    #[test]
    fn test_eval_mode_is_deterministic() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let head = ClassifierHead::new(8, 8, 3, 0.5, vb)?;

        let x = Tensor::randn(0f32, 1.0, (2, 8), &device)?;
        let a = head.forward_t(&x, false)?.to_vec2::<f32>()?;
        let b = head.forward_t(&x, false)?.to_vec2::<f32>()?;

        assert_eq!(a, b);

        Ok(())
    }
}
