use ndarray::{ArrayD, Ix4, prelude::*};

use super::shape::{SameAxis, expect_rank};
use crate::{MlErr, Result};

const NAME: &str = "avg_pool";

/// Average pooling with SAME padding; padded positions don't count towards the average.
#[derive(Debug, Clone)]
pub struct AvgPool {
    kernel: usize,
    stride: usize,
    input: Option<(usize, usize, SameAxis, SameAxis)>,
}

impl AvgPool {
    pub fn new(kernel: usize, stride: usize) -> Self {
        Self {
            kernel,
            stride: stride.max(1),
            input: None,
        }
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = expect_rank::<Ix4>(x, NAME, "(batch, channels, height, width)")?;
        let (batch, channels, h, w) = x.dim();
        let rows = SameAxis::new(h, self.kernel, self.stride);
        let cols = SameAxis::new(w, self.kernel, self.stride);

        let mut y = Array4::zeros((batch, channels, rows.output, cols.output));
        for ((b, c, oy, ox), out) in y.indexed_iter_mut() {
            let window = x.slice(s![b, c, rows.span(oy), cols.span(ox)]);
            *out = window.mean().unwrap_or(0.);
        }

        self.input = Some((batch, channels, rows, cols));
        Ok(y.into_dyn())
    }

    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let d = expect_rank::<Ix4>(d, NAME, "(batch, channels, height, width)")?;
        let (batch, channels, rows, cols) = self
            .input
            .ok_or(MlErr::BackwardBeforeForward { layer: NAME })?;

        let mut dx = Array4::zeros((batch, channels, rows.input, cols.input));
        for ((b, c, oy, ox), &g) in d.indexed_iter() {
            let mut window = dx.slice_mut(s![b, c, rows.span(oy), cols.span(ox)]);
            let share = g / window.len().max(1) as f32;
            window += share;
        }

        Ok(dx.into_dyn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::check_gradients;

    #[test]
    fn halves_the_image() {
        let mut pool = AvgPool::new(2, 2);
        let x = Array::from_shape_fn((1, 1, 4, 4), |(_, _, i, j)| (i * 4 + j) as f32);

        let y = pool.forward(x.into_dyn()).unwrap();

        let expected = array![[[[2.5, 4.5], [10.5, 12.5]]]];
        assert_eq!(y, expected.into_dyn());
    }

    #[test]
    fn odd_sizes_average_only_real_pixels() {
        let mut pool = AvgPool::new(2, 2);
        let y = pool.forward(Array4::ones((1, 1, 3, 3)).into_dyn()).unwrap();
        assert_eq!(y, Array4::<f32>::ones((1, 1, 2, 2)).into_dyn());
    }

    #[test]
    fn gradients_match_finite_differences() {
        check_gradients(AvgPool::new(2, 2).into(), &[2, 2, 5, 4]);
    }
}
