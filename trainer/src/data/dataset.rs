use machine_learning::MlErr;
use ndarray::Array4;
use rayon::prelude::*;

use crate::error::Result;

/// Single channel images held in memory, pixel values in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct ImageDataset {
    pixels: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl ImageDataset {
    /// Creates a new dataset from row-major images laid one after the other.
    ///
    /// # Arguments
    /// * `pixels` - The pixels of every image.
    /// * `rows` - The height of the images.
    /// * `cols` - The width of the images.
    ///
    /// # Errors
    /// If `pixels` doesn't hold a whole amount of images.
    pub fn new(pixels: Vec<f32>, rows: usize, cols: usize) -> Result<Self> {
        let image_len = rows * cols;
        if image_len == 0 || pixels.len() % image_len != 0 {
            return Err(MlErr::SizeMismatch {
                what: "dataset pixels",
                got: pixels.len(),
                expected: pixels.len().next_multiple_of(image_len.max(1)),
            }
            .into());
        }

        Ok(Self { pixels, rows, cols })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pixels.len() / self.image_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn image_len(&self) -> usize {
        self.rows * self.cols
    }

    /// Returns the pixels of the image at `idx` (panics if out of bounds).
    #[inline]
    pub fn image(&self, idx: usize) -> &[f32] {
        let len = self.image_len();
        &self.pixels[idx * len..(idx + 1) * len]
    }

    /// Splits off the first `n` images.
    ///
    /// # Returns
    /// The remaining images and the first `n`, in that order.
    pub fn split_validation(mut self, n: usize) -> (Self, Self) {
        let at = (n * self.image_len()).min(self.pixels.len());
        let rest = self.pixels.split_off(at);

        let validation = Self {
            pixels: self.pixels,
            rows: self.rows,
            cols: self.cols,
        };
        let train = Self {
            pixels: rest,
            rows: self.rows,
            cols: self.cols,
        };

        (train, validation)
    }

    /// Gathers the images at `indices` into a `(batch, 1, rows, cols)` array.
    pub fn gather(&self, indices: &[usize]) -> Array4<f32> {
        let len = self.image_len();
        let mut batch = Array4::zeros((indices.len(), 1, self.rows, self.cols));

        if let Some(out) = batch.as_slice_mut() {
            out.par_chunks_mut(len)
                .zip(indices.par_iter())
                .for_each(|(dst, &idx)| dst.copy_from_slice(self.image(idx)));
        }

        batch
    }
}
