use std::{cell::RefCell, rc::Rc};

use ndarray::{ArrayD, Ix4, Zip, prelude::*};
use rand::Rng;

use super::shape::{expect_len, expect_rank};
use crate::{
    MlErr, Result,
    initialization::{Init, ParamGen},
};

const NAME: &str = "batch_norm";

#[derive(Debug, Clone)]
struct Cache {
    x_hat: Array4<f32>,
    inv_std: Array1<f32>,
}

/// Per-channel batch normalization over `(batch, channels, height, width)` inputs.
///
/// Statistics always come from the current batch. The parameters are one scale per channel
/// followed by one offset per channel.
#[derive(Debug, Clone)]
pub struct BatchNorm {
    channels: usize,
    epsilon: f32,
    cache: Option<Cache>,
}

impl BatchNorm {
    pub const EPSILON: f32 = 1e-5;

    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            epsilon: Self::EPSILON,
            cache: None,
        }
    }

    pub fn size(&self) -> usize {
        2 * self.channels
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = expect_rank::<Ix4>(x, NAME, "(batch, channels, height, width)")?;
        if x.dim().1 != self.channels {
            return Err(MlErr::SizeMismatch {
                what: "batch norm channels",
                got: x.dim().1,
                expected: self.channels,
            });
        }

        let (gamma, beta) = self.view_params(params)?;
        let m = (x.len() / self.channels).max(1) as f32;

        let mut x_hat = Array4::zeros(x.raw_dim());
        let mut y = Array4::zeros(x.raw_dim());
        let mut inv_std = Array1::zeros(self.channels);

        for c in 0..self.channels {
            let xc = x.index_axis(Axis(1), c);
            let mean = xc.sum() / m;
            let var = xc.fold(0f32, |acc, &v| acc + (v - mean).powi(2)) / m;
            let istd = 1. / (var + self.epsilon).sqrt();
            let (g, b) = (gamma[c], beta[c]);

            Zip::from(x_hat.index_axis_mut(Axis(1), c))
                .and(y.index_axis_mut(Axis(1), c))
                .and(&xc)
                .for_each(|h, out, &v| {
                    *h = (v - mean) * istd;
                    *out = g * *h + b;
                });

            inv_std[c] = istd;
        }

        self.cache = Some(Cache { x_hat, inv_std });
        Ok(y.into_dyn())
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        let d = expect_rank::<Ix4>(d, NAME, "(batch, channels, height, width)")?;
        let Cache { x_hat, inv_std } = self
            .cache
            .as_ref()
            .ok_or(MlErr::BackwardBeforeForward { layer: NAME })?;

        if d.raw_dim() != x_hat.raw_dim() {
            return Err(MlErr::InvalidShape {
                layer: NAME,
                got: d.shape().to_vec(),
                expected: "the shape of the last forward input",
            });
        }

        let (gamma, _) = self.view_params(params)?;
        expect_len("batch norm gradient", grad.len(), self.size())?;
        let (d_gamma, d_beta) = grad.split_at_mut(self.channels);

        let m = (d.len() / self.channels).max(1) as f32;
        let mut dx = Array4::zeros(d.raw_dim());

        for c in 0..self.channels {
            let dc = d.index_axis(Axis(1), c);
            let hc = x_hat.index_axis(Axis(1), c);
            let sum_d = dc.sum();
            let sum_dh = Zip::from(&dc).and(&hc).fold(0f32, |acc, &g, &h| acc + g * h);

            d_gamma[c] += sum_dh;
            d_beta[c] += sum_d;

            let scale = gamma[c] * inv_std[c] / m;
            Zip::from(dx.index_axis_mut(Axis(1), c))
                .and(&dc)
                .and(&hc)
                .for_each(|out, &g, &h| *out = scale * (m * g - sum_d - h * sum_dh));
        }

        Ok(dx.into_dyn())
    }

    pub fn param_gens<R: Rng + 'static>(
        &self,
        rng: &Rc<RefCell<R>>,
    ) -> Result<Vec<Box<dyn ParamGen>>> {
        Ok(vec![
            Init::Const(1.).param_gen(rng, self.channels)?,
            Init::Const(0.).param_gen(rng, self.channels)?,
        ])
    }

    fn view_params<'a>(&self, params: &'a [f32]) -> Result<(&'a [f32], &'a [f32])> {
        expect_len("batch norm parameters", params.len(), self.size())?;
        Ok(params.split_at(self.channels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::check_gradients;

    #[test]
    fn normalizes_each_channel() {
        let mut bn = BatchNorm::new(2);
        let params = [1., 2., 0., 3.];
        let x = Array::from_shape_fn((2, 2, 2, 2), |(b, c, i, j)| {
            (b * 4 + i * 2 + j) as f32 * (c + 1) as f32
        });

        let y = bn
            .forward(&params, x.into_dyn())
            .unwrap()
            .into_dimensionality::<Ix4>()
            .unwrap();

        for (c, (scale, offset)) in [(1., 0.), (2., 3.)].into_iter().enumerate() {
            let yc = y.index_axis(Axis(1), c);
            let mean = yc.mean().unwrap();
            let var = yc.mapv(|v| (v - mean).powi(2)).mean().unwrap();
            assert!((mean - offset).abs() < 1e-4);
            assert!((var - scale * scale).abs() < 1e-2);
        }
    }

    #[test]
    fn gradients_match_finite_differences() {
        check_gradients(BatchNorm::new(3).into(), &[2, 3, 2, 2]);
    }
}
