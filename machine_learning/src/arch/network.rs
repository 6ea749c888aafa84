use ndarray::ArrayD;
use rand::Rng;

use super::{Model, Sequential};
use crate::{MlErr, Result, optimization::Optimizer};

/// A model bundled with the parameters and the gradient buffer it exclusively owns.
///
/// Optimizers only ever see the buffers of the network they are handed to, so two networks
/// never share parameters.
#[derive(Debug, Clone)]
pub struct Network<M = Sequential> {
    model: M,
    params: Vec<f32>,
    grad: Vec<f32>,
}

impl<M: Model> Network<M> {
    /// Creates a new `Network` from existing parameters.
    ///
    /// # Arguments
    /// * `model` - The model.
    /// * `params` - Its parameters.
    ///
    /// # Returns
    /// A new `Network` or an error if `params` doesn't have the size of the model.
    pub fn new(model: M, params: Vec<f32>) -> Result<Self> {
        let size = model.size();
        if params.len() != size {
            return Err(MlErr::SizeMismatch {
                what: "network parameters",
                got: params.len(),
                expected: size,
            });
        }

        Ok(Self {
            model,
            params,
            grad: vec![0.; size],
        })
    }

    /// Creates a new `Network` with freshly initialized parameters.
    pub fn init<R: Rng + 'static>(model: M, rng: R) -> Result<Self> {
        let params = model.init_params(rng)?;
        Self::new(model, params)
    }

    pub fn size(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn grad(&self) -> &[f32] {
        &self.grad
    }

    /// Replaces the parameters, e.g. with the ones of a checkpoint.
    pub fn load_params(&mut self, params: Vec<f32>) -> Result<()> {
        if params.len() != self.params.len() {
            return Err(MlErr::SizeMismatch {
                what: "loaded parameters",
                got: params.len(),
                expected: self.params.len(),
            });
        }

        self.params = params;
        Ok(())
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        self.model.forward(&self.params, x)
    }

    /// Backpropagates `d` through the last forward pass, accumulating into the gradient.
    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        self.model.backward(&self.params, &mut self.grad, d)
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.);
    }

    /// Applies one update of `optimizer` with the accumulated gradient.
    pub fn optimize<O: Optimizer + ?Sized>(&mut self, optimizer: &mut O) -> Result<()> {
        optimizer.update_params(&self.grad, &mut self.params)
    }
}
