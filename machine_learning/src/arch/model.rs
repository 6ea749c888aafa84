use ndarray::ArrayD;
use rand::Rng;

use crate::error::Result;

/// A differentiable function of a flat parameter buffer.
pub trait Model {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Computes the output of the model for `x`, caching what `backward` needs.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - The input batch.
    ///
    /// # Returns
    /// The output batch or an error if `params` or `x` don't fit the model.
    fn forward(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<ArrayD<f32>>;

    /// Backpropagates `d` through the last forward pass, **accumulating** the gradient of the
    /// parameters into `grad`.
    ///
    /// # Arguments
    /// * `params` - The model's parameters, the same used in the last forward pass.
    /// * `grad` - The gradient buffer.
    /// * `d` - The delta of the model's output.
    ///
    /// # Returns
    /// The delta of the model's input.
    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: ArrayD<f32>)
    -> Result<ArrayD<f32>>;

    /// Samples a fresh set of parameters for the model.
    fn init_params<R: Rng + 'static>(&self, rng: R) -> Result<Vec<f32>>;
}
