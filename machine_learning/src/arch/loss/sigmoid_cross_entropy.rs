use ndarray::{Array2, ArrayView2, Zip};

use super::LossFn;
use crate::arch::layers::Sigmoid;

/// Binary cross entropy computed straight from logits.
///
/// For a logit `x` and a target `z` in `[0, 1]` the loss is `max(x, 0) - x * z + ln(1 + e^-|x|)`,
/// which never overflows, averaged over the batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SigmoidCrossEntropy;

impl LossFn for SigmoidCrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let n = y_pred.len().max(1) as f32;
        let total = Zip::from(&y_pred).and(&y).fold(0f32, |acc, &x, &z| {
            acc + x.max(0.) - x * z + (-x.abs()).exp().ln_1p()
        });

        total / n
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let n = y_pred.len().max(1) as f32;
        Zip::from(&y_pred)
            .and(&y)
            .map_collect(|&x, &z| (Sigmoid::sigmoid(x) - z) / n)
    }
}
