use std::ops::Range;

use ndarray::{Array, ArrayD, Dimension};

use crate::{MlErr, Result};

/// Converts a dynamic array into one of a fixed rank, failing with the offending shape.
pub(super) fn expect_rank<D: Dimension>(
    x: ArrayD<f32>,
    layer: &'static str,
    expected: &'static str,
) -> Result<Array<f32, D>> {
    let got = x.shape().to_vec();
    x.into_dimensionality::<D>()
        .map_err(|_| MlErr::InvalidShape {
            layer,
            got,
            expected,
        })
}

/// Checks that `params` holds exactly the parameters of a layer.
pub(super) fn expect_len(what: &'static str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(MlErr::SizeMismatch {
            what,
            got,
            expected,
        });
    }

    Ok(())
}

/// One spatial axis of a strided window with SAME padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct SameAxis {
    pub input: usize,
    pub output: usize,
    pub pad: usize,
    pub kernel: usize,
    pub stride: usize,
}

impl SameAxis {
    /// Lays out a window of `kernel` elements every `stride` over `input` elements, producing
    /// `ceil(input / stride)` outputs. The odd element of padding goes after the input.
    pub fn new(input: usize, kernel: usize, stride: usize) -> Self {
        let output = input.div_ceil(stride);
        let pad_total = (output.saturating_sub(1) * stride + kernel).saturating_sub(input);

        Self {
            input,
            output,
            pad: pad_total / 2,
            kernel,
            stride,
        }
    }

    /// Input coordinate read by kernel tap `k` of output `o`, if it is not padding.
    #[inline]
    pub fn source(&self, o: usize, k: usize) -> Option<usize> {
        (o * self.stride + k)
            .checked_sub(self.pad)
            .filter(|&i| i < self.input)
    }

    /// The in-bounds input coordinates covered by the window of output `o`.
    pub fn span(&self, o: usize) -> Range<usize> {
        let start = o * self.stride;
        let lo = start.saturating_sub(self.pad);
        let hi = (start + self.kernel).saturating_sub(self.pad).min(self.input);
        lo..hi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_padding_keeps_size_with_unit_stride() {
        let axis = SameAxis::new(28, 5, 1);
        assert_eq!((axis.output, axis.pad), (28, 2));
        assert_eq!(axis.source(0, 0), None);
        assert_eq!(axis.source(0, 2), Some(0));
        assert_eq!(axis.source(27, 4), None);
    }

    #[test]
    fn same_padding_with_stride_two() {
        let axis = SameAxis::new(56, 3, 2);
        assert_eq!((axis.output, axis.pad), (28, 0));
        assert_eq!(axis.source(27, 2), None);

        let axis = SameAxis::new(56, 1, 2);
        assert_eq!((axis.output, axis.pad), (28, 0));
        assert_eq!(axis.source(27, 0), Some(54));
    }

    #[test]
    fn span_clips_padding() {
        let axis = SameAxis::new(7, 2, 2);
        assert_eq!(axis.output, 4);
        assert_eq!(axis.span(0), 0..2);
        assert_eq!(axis.span(3), 6..7);
    }
}
