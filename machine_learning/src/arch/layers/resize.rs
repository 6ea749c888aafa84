use ndarray::{ArrayD, Ix4, prelude::*};

use super::shape::expect_rank;
use crate::{MlErr, Result};

const NAME: &str = "resize";

/// Bilinear taps of one output coordinate: the two neighbouring inputs and the weight of the
/// second one.
#[derive(Debug, Clone, Copy)]
struct Tap {
    lo: usize,
    hi: usize,
    frac: f32,
}

fn taps(input: usize, output: usize) -> Vec<Tap> {
    let scale = input as f32 / output as f32;

    (0..output)
        .map(|o| {
            let src = o as f32 * scale;
            let lo = (src.floor() as usize).min(input - 1);
            let hi = (lo + 1).min(input - 1);
            Tap {
                lo,
                hi,
                frac: src - lo as f32,
            }
        })
        .collect()
}

/// Bilinear resize of `(batch, channels, height, width)` images to a fixed spatial size.
///
/// Output pixel `o` samples the input at `o * input / output`, so corners are not aligned.
#[derive(Debug, Clone)]
pub struct Resize {
    height: usize,
    width: usize,
    input: Option<(usize, usize, usize, usize)>,
}

impl Resize {
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            input: None,
        }
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = expect_rank::<Ix4>(x, NAME, "(batch, channels, height, width)")?;
        let (batch, channels, h, w) = x.dim();
        if h == 0 || w == 0 {
            return Err(MlErr::InvalidShape {
                layer: NAME,
                got: x.shape().to_vec(),
                expected: "a non empty image",
            });
        }

        let (ty, tx) = (taps(h, self.height), taps(w, self.width));
        let mut y = Array4::zeros((batch, channels, self.height, self.width));

        for ((b, c, oy, ox), out) in y.indexed_iter_mut() {
            let (Tap { lo: y0, hi: y1, frac: fy }, Tap { lo: x0, hi: x1, frac: fx }) =
                (ty[oy], tx[ox]);
            let top = x[[b, c, y0, x0]] + (x[[b, c, y0, x1]] - x[[b, c, y0, x0]]) * fx;
            let bottom = x[[b, c, y1, x0]] + (x[[b, c, y1, x1]] - x[[b, c, y1, x0]]) * fx;
            *out = top + (bottom - top) * fy;
        }

        self.input = Some(x.dim());
        Ok(y.into_dyn())
    }

    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let d = expect_rank::<Ix4>(d, NAME, "(batch, channels, height, width)")?;
        let (batch, channels, h, w) = self
            .input
            .ok_or(MlErr::BackwardBeforeForward { layer: NAME })?;

        let (ty, tx) = (taps(h, self.height), taps(w, self.width));
        let mut dx = Array4::zeros((batch, channels, h, w));

        for ((b, c, oy, ox), &g) in d.indexed_iter() {
            let (Tap { lo: y0, hi: y1, frac: fy }, Tap { lo: x0, hi: x1, frac: fx }) =
                (ty[oy], tx[ox]);
            dx[[b, c, y0, x0]] += g * (1. - fy) * (1. - fx);
            dx[[b, c, y0, x1]] += g * (1. - fy) * fx;
            dx[[b, c, y1, x0]] += g * fy * (1. - fx);
            dx[[b, c, y1, x1]] += g * fy * fx;
        }

        Ok(dx.into_dyn())
    }
}
