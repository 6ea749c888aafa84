use ndarray::{Array2, ArrayView2};

pub trait LossFn {
    /// The mean loss of a batch of predictions against their targets.
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32;

    /// The derivative of `loss` with respect to every prediction.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32>;
}
