use std::{cell::RefCell, rc::Rc};

use ndarray::{ArrayD, Ix2, linalg, prelude::*};
use rand::Rng;

use super::shape::{expect_len, expect_rank};
use crate::{
    MlErr, Result,
    initialization::{Init, ParamGen},
};

const NAME: &str = "dense";

/// A fully connected layer, `y = xW + b`.
///
/// The parameters are laid out as the row-major `(n, m)` weight matrix followed by the `m` biases.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    size: usize,
    weights: Init,
    biases: Init,

    // Forward metadata
    x: Option<Array2<f32>>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of inputs and outputs of the layer.
    ///
    /// # Returns
    /// A new `Dense` instance with truncated normal weights and zero biases.
    pub fn new(dim: (usize, usize)) -> Self {
        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            weights: Init::truncated(0.02),
            biases: Init::Const(0.),
            x: None,
        }
    }

    /// Replaces the initialization of the weights.
    pub fn weights(mut self, init: Init) -> Self {
        self.weights = init;
        self
    }

    /// Replaces the initialization of the biases.
    pub fn biases(mut self, init: Init) -> Self {
        self.biases = init;
        self
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Computes `xW + b` for a batch of row vectors.
    ///
    /// # Arguments
    /// * `params` - The parameters of this layer.
    /// * `x` - A `(batch, n)` input.
    ///
    /// # Returns
    /// The `(batch, m)` output or an error if the shapes don't line up.
    pub fn forward(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = expect_rank::<Ix2>(x, NAME, "(batch, inputs)")?;
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense inputs",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;

        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut z);
        z += &b;

        self.x = Some(x);
        Ok(z.into_dyn())
    }

    /// Accumulates the gradient of this layer into `grad` and propagates `d` to its input.
    ///
    /// # Arguments
    /// * `params` - The parameters of this layer.
    /// * `grad` - The gradient slice of this layer.
    /// * `d` - The delta of the layer's output.
    ///
    /// # Returns
    /// The delta of the layer's input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        let d = expect_rank::<Ix2>(d, NAME, "(batch, outputs)")?;
        let x = self
            .x
            .as_ref()
            .ok_or(MlErr::BackwardBeforeForward { layer: NAME })?;

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &x.t(), &d, 1.0, &mut dw);
        db += &d.sum_axis(Axis(0));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()).into_dyn())
    }

    /// Creates the generators for the weights and the biases of this layer.
    pub fn param_gens<R: Rng + 'static>(
        &self,
        rng: &Rc<RefCell<R>>,
    ) -> Result<Vec<Box<dyn ParamGen>>> {
        let w_size = self.size - self.dim.1;
        Ok(vec![
            self.weights.param_gen(rng, w_size)?,
            self.biases.param_gen(rng, self.dim.1)?,
        ])
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        expect_len("dense gradient", grad.len(), self.size)?;

        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        expect_len("dense parameters", params.len(), self.size)?;

        let w_size = self.size - self.dim.1;
        let weights = ArrayView2::from_shape(self.dim, &params[..w_size])?;
        let biases = ArrayView1::from_shape(self.dim.1, &params[w_size..])?;
        Ok((weights, biases))
    }
}
