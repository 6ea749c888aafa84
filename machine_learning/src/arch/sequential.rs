use std::{cell::RefCell, rc::Rc};

use ndarray::ArrayD;
use rand::Rng;

use super::{Model, layers::Layer};
use crate::{
    MlErr, Result,
    initialization::{ChainedParamGen, ParamGen},
};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// The parameters of the layers live one after the other in a single flat buffer, in layer
/// order.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        let expected = self.size();
        if got != expected {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected,
            });
        }

        Ok(())
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.layers.iter().map(Layer::size).sum()
    }

    fn forward(&mut self, params: &[f32], mut x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        self.check_len("sequential parameters", params.len())?;

        let mut rest = params;
        for layer in self.layers.iter_mut() {
            let (layer_params, tail) = rest.split_at(layer.size());
            rest = tail;
            x = layer.forward(layer_params, x)?;
        }

        Ok(x)
    }

    fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        self.check_len("sequential parameters", params.len())?;
        self.check_len("sequential gradient", grad.len())?;

        let mut end = params.len();
        for layer in self.layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&params[start..end], &mut grad[start..end], d)?;
            end = start;
        }

        Ok(d)
    }

    fn init_params<R: Rng + 'static>(&self, rng: R) -> Result<Vec<f32>> {
        let rng = Rc::new(RefCell::new(rng));

        let mut param_gens = Vec::new();
        for layer in &self.layers {
            param_gens.extend(layer.param_gens(&rng)?);
        }

        let size = self.size();
        let params = ChainedParamGen::new(param_gens)
            .sample(size)
            .unwrap_or_default();

        self.check_len("initial parameters", params.len())?;
        Ok(params)
    }
}
