use std::{cell::RefCell, rc::Rc};

use ndarray::ArrayD;
use rand::Rng;

use super::{AvgPool, BatchNorm, Conv2d, Dense, Relu, Reshape, Resize, Sigmoid};
use crate::{Result, initialization::ParamGen};

#[derive(Debug, Clone)]
pub enum Layer {
    Dense(Dense),
    Conv2d(Conv2d),
    AvgPool(AvgPool),
    BatchNorm(BatchNorm),
    Relu(Relu),
    Sigmoid(Sigmoid),
    Reshape(Reshape),
    Resize(Resize),
}
use Layer::*;

impl Layer {
    pub fn dense(dim: (usize, usize)) -> Self {
        Self::Dense(Dense::new(dim))
    }

    pub fn conv2d(in_channels: usize, filters: usize, kernel: usize, stride: usize) -> Self {
        Self::Conv2d(Conv2d::new(in_channels, filters, kernel, stride))
    }

    pub fn avg_pool(kernel: usize, stride: usize) -> Self {
        Self::AvgPool(AvgPool::new(kernel, stride))
    }

    pub fn batch_norm(channels: usize) -> Self {
        Self::BatchNorm(BatchNorm::new(channels))
    }

    pub fn relu() -> Self {
        Self::Relu(Relu::new())
    }

    pub fn sigmoid() -> Self {
        Self::Sigmoid(Sigmoid::new())
    }

    pub fn reshape(sample_shape: &[usize]) -> Self {
        Self::Reshape(Reshape::new(sample_shape))
    }

    pub fn resize(height: usize, width: usize) -> Self {
        Self::Resize(Resize::new(height, width))
    }

    /// Returns the amount of parameters of the layer.
    pub fn size(&self) -> usize {
        match self {
            Dense(l) => l.size(),
            Conv2d(l) => l.size(),
            BatchNorm(l) => l.size(),
            AvgPool(_) | Relu(_) | Sigmoid(_) | Reshape(_) | Resize(_) => 0,
        }
    }

    /// Makes a forward pass through the layer.
    ///
    /// # Arguments
    /// * `params` - The slice of parameters owned by this layer.
    /// * `x` - The input of the layer.
    ///
    /// # Returns
    /// The output of the layer or an error if the input doesn't fit it.
    pub fn forward(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        match self {
            Dense(l) => l.forward(params, x),
            Conv2d(l) => l.forward(params, x),
            BatchNorm(l) => l.forward(params, x),
            AvgPool(l) => l.forward(x),
            Relu(l) => l.forward(x),
            Sigmoid(l) => l.forward(x),
            Reshape(l) => l.forward(x),
            Resize(l) => l.forward(x),
        }
    }

    /// Makes a backward pass through the layer, right after its forward pass.
    ///
    /// # Arguments
    /// * `params` - The slice of parameters owned by this layer.
    /// * `grad` - The slice of the gradient owned by this layer, gets accumulated into.
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
        match self {
            Dense(l) => l.backward(params, grad, d),
            Conv2d(l) => l.backward(params, grad, d),
            BatchNorm(l) => l.backward(params, grad, d),
            AvgPool(l) => l.backward(d),
            Relu(l) => l.backward(d),
            Sigmoid(l) => l.backward(d),
            Reshape(l) => l.backward(d),
            Resize(l) => l.backward(d),
        }
    }

    /// Creates the generators of the initial parameters of this layer, in layout order.
    pub fn param_gens<R: Rng + 'static>(
        &self,
        rng: &Rc<RefCell<R>>,
    ) -> Result<Vec<Box<dyn ParamGen>>> {
        match self {
            Dense(l) => l.param_gens(rng),
            Conv2d(l) => l.param_gens(rng),
            BatchNorm(l) => l.param_gens(rng),
            AvgPool(_) | Relu(_) | Sigmoid(_) | Reshape(_) | Resize(_) => Ok(vec![]),
        }
    }
}

macro_rules! impl_from_layer {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Layer {
                fn from(value: $variant) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_layer!(Dense, Conv2d, AvgPool, BatchNorm, Relu, Sigmoid, Reshape, Resize);
