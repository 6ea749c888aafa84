use std::{cell::RefCell, rc::Rc};

use ndarray::{
    ArrayD, Ix4, linalg,
    parallel::prelude::*,
    prelude::*,
};
use rand::Rng;

use super::shape::{SameAxis, expect_len, expect_rank};
use crate::{
    MlErr, Result,
    initialization::{Init, ParamGen},
};

const NAME: &str = "conv2d";

#[derive(Debug, Clone, Copy)]
struct Geometry {
    channels: usize,
    rows: SameAxis,
    cols: SameAxis,
}

#[derive(Debug, Clone)]
struct Cache {
    geometry: Geometry,
    batch_cols: Vec<Array2<f32>>,
}

/// A 2D convolution over `(batch, channels, height, width)` inputs with SAME padding.
///
/// Implemented as im2col followed by a matrix product. The parameters are the
/// `(filters, channels * kernel * kernel)` filter bank followed by one bias per filter.
#[derive(Debug, Clone)]
pub struct Conv2d {
    in_channels: usize,
    filters: usize,
    kernel: usize,
    stride: usize,
    weights: Init,
    biases: Init,
    cache: Option<Cache>,
}

impl Conv2d {
    /// Creates a new `Conv2d` layer.
    ///
    /// # Arguments
    /// * `in_channels` - The amount of channels of the input.
    /// * `filters` - The amount of output channels.
    /// * `kernel` - The side of the square kernel.
    /// * `stride` - The step between two consecutive windows, on both axes.
    ///
    /// # Returns
    /// A new `Conv2d` instance with truncated normal filters and zero biases.
    pub fn new(in_channels: usize, filters: usize, kernel: usize, stride: usize) -> Self {
        Self {
            in_channels,
            filters,
            kernel,
            stride: stride.max(1),
            weights: Init::truncated(0.02),
            biases: Init::Const(0.),
            cache: None,
        }
    }

    /// Replaces the initialization of the filters.
    pub fn weights(mut self, init: Init) -> Self {
        self.weights = init;
        self
    }

    /// Replaces the initialization of the biases.
    pub fn biases(mut self, init: Init) -> Self {
        self.biases = init;
        self
    }

    fn patch_len(&self) -> usize {
        self.in_channels * self.kernel * self.kernel
    }

    pub fn size(&self) -> usize {
        (self.patch_len() + 1) * self.filters
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = expect_rank::<Ix4>(x, NAME, "(batch, channels, height, width)")?;
        let (batch, channels, h, w) = x.dim();
        if channels != self.in_channels || h == 0 || w == 0 {
            return Err(MlErr::InvalidShape {
                layer: NAME,
                got: x.shape().to_vec(),
                expected: "the configured input channels and a non empty image",
            });
        }

        let geometry = Geometry {
            channels,
            rows: SameAxis::new(h, self.kernel, self.stride),
            cols: SameAxis::new(w, self.kernel, self.stride),
        };
        let (oh, ow) = (geometry.rows.output, geometry.cols.output);
        let (filters, bias) = self.view_params(params)?;

        let batch_cols: Vec<Array2<f32>> = x
            .outer_iter()
            .into_par_iter()
            .map(|sample| im2col(sample, &geometry))
            .collect();

        let mut y = Array4::zeros((batch, self.filters, oh, ow));
        for (cols, mut out) in batch_cols.iter().zip(y.outer_iter_mut()) {
            let z = filters.dot(cols) + &bias.insert_axis(Axis(1));
            out.assign(&z.into_shape_with_order((self.filters, oh, ow))?);
        }

        self.cache = Some(Cache {
            geometry,
            batch_cols,
        });
        Ok(y.into_dyn())
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        let d = expect_rank::<Ix4>(d, NAME, "(batch, filters, height, width)")?;
        let Cache {
            geometry,
            batch_cols,
        } = self
            .cache
            .as_ref()
            .ok_or(MlErr::BackwardBeforeForward { layer: NAME })?;

        let (rows, cols) = (geometry.rows, geometry.cols);
        let positions = rows.output * cols.output;
        if d.dim() != (batch_cols.len(), self.filters, rows.output, cols.output) {
            return Err(MlErr::InvalidShape {
                layer: NAME,
                got: d.shape().to_vec(),
                expected: "the shape of the last forward output",
            });
        }

        let (filters, _) = self.view_params(params)?;
        let (mut d_filters, mut d_bias) = self.view_grad(grad)?;
        let mut dx = Array4::zeros((batch_cols.len(), geometry.channels, rows.input, cols.input));

        for ((sample_d, sample_cols), mut sample_dx) in
            d.outer_iter().zip(batch_cols).zip(dx.outer_iter_mut())
        {
            let sample_d = sample_d.to_shape((self.filters, positions))?;
            linalg::general_mat_mul(1.0, &sample_d, &sample_cols.t(), 1.0, &mut d_filters);
            d_bias += &sample_d.sum_axis(Axis(1));

            let d_cols = filters.t().dot(&sample_d);
            col2im(d_cols.view(), geometry, &mut sample_dx);
        }

        Ok(dx.into_dyn())
    }

    pub fn param_gens<R: Rng + 'static>(
        &self,
        rng: &Rc<RefCell<R>>,
    ) -> Result<Vec<Box<dyn ParamGen>>> {
        Ok(vec![
            self.weights.param_gen(rng, self.patch_len() * self.filters)?,
            self.biases.param_gen(rng, self.filters)?,
        ])
    }

    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        expect_len("conv2d gradient", grad.len(), self.size())?;

        let (dw_raw, db_raw) = grad.split_at_mut(self.patch_len() * self.filters);
        let dw = ArrayViewMut2::from_shape((self.filters, self.patch_len()), dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.filters, db_raw)?;
        Ok((dw, db))
    }

    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        expect_len("conv2d parameters", params.len(), self.size())?;

        let (w_raw, b_raw) = params.split_at(self.patch_len() * self.filters);
        let w = ArrayView2::from_shape((self.filters, self.patch_len()), w_raw)?;
        let b = ArrayView1::from_shape(self.filters, b_raw)?;
        Ok((w, b))
    }
}

/// Unfolds every kernel window of `x` into a column: `(channels * k * k, out_h * out_w)`.
fn im2col(x: ArrayView3<f32>, geometry: &Geometry) -> Array2<f32> {
    let Geometry {
        channels,
        rows,
        cols,
    } = *geometry;
    let k = rows.kernel;
    let mut out = Array2::zeros((channels * k * k, rows.output * cols.output));

    for c in 0..channels {
        for ki in 0..k {
            for kj in 0..k {
                let mut row = out.row_mut((c * k + ki) * k + kj);
                for oy in 0..rows.output {
                    let Some(iy) = rows.source(oy, ki) else {
                        continue;
                    };
                    for ox in 0..cols.output {
                        if let Some(ix) = cols.source(ox, kj) {
                            row[oy * cols.output + ox] = x[[c, iy, ix]];
                        }
                    }
                }
            }
        }
    }

    out
}

/// Folds columns back onto the image, summing the overlapping windows.
fn col2im(d_cols: ArrayView2<f32>, geometry: &Geometry, dx: &mut ArrayViewMut3<f32>) {
    let Geometry {
        channels,
        rows,
        cols,
    } = *geometry;
    let k = rows.kernel;

    for c in 0..channels {
        for ki in 0..k {
            for kj in 0..k {
                let row = d_cols.row((c * k + ki) * k + kj);
                for oy in 0..rows.output {
                    let Some(iy) = rows.source(oy, ki) else {
                        continue;
                    };
                    for ox in 0..cols.output {
                        if let Some(ix) = cols.source(ox, kj) {
                            dx[[c, iy, ix]] += row[oy * cols.output + ox];
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::check_gradients;

    #[test]
    fn identity_kernel_keeps_the_image() {
        let mut conv = Conv2d::new(1, 1, 3, 1);
        let mut params = vec![0.; conv.size()];
        params[4] = 1.;
        params[9] = 0.5;

        let x = Array::from_shape_fn((1, 1, 4, 4), |(_, _, i, j)| (i * 4 + j) as f32);
        let y = conv.forward(&params, x.clone().into_dyn()).unwrap();

        assert_eq!(y, (x + 0.5).into_dyn());
    }

    #[test]
    fn same_padding_sums_the_neighbourhood() {
        let mut conv = Conv2d::new(1, 1, 3, 1);
        let mut params = vec![1.; conv.size()];
        params[9] = 0.;

        let y = conv
            .forward(&params, Array4::ones((1, 1, 3, 3)).into_dyn())
            .unwrap();

        let expected = ndarray::array![[4., 6., 4.], [6., 9., 6.], [4., 6., 4.]];
        assert_eq!(y.into_dimensionality::<Ix4>().unwrap().slice(s![0, 0, .., ..]), expected);
    }

    #[test]
    fn strided_output_shape() {
        let mut conv = Conv2d::new(2, 3, 3, 2);
        let params = vec![0.; conv.size()];

        let y = conv
            .forward(&params, Array4::zeros((2, 2, 56, 56)).into_dyn())
            .unwrap();

        assert_eq!(y.shape(), &[2, 3, 28, 28]);
    }

    #[test]
    fn gradients_match_finite_differences() {
        check_gradients(Conv2d::new(2, 3, 3, 1).into(), &[2, 2, 4, 4]);
        check_gradients(Conv2d::new(1, 2, 3, 2).into(), &[1, 1, 5, 5]);
    }

    #[test]
    fn wrong_channels() {
        let mut conv = Conv2d::new(3, 1, 3, 1);
        let params = vec![0.; conv.size()];
        let err = conv.forward(&params, Array4::zeros((1, 1, 4, 4)).into_dyn());
        assert!(matches!(err, Err(MlErr::InvalidShape { .. })));
    }
}
