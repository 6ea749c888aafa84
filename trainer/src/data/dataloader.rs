use std::num::NonZeroUsize;

use log::debug;
use ndarray::Array4;
use rand::{rngs::StdRng, seq::SliceRandom};

use super::ImageDataset;

/// Endless source of shuffled batches.
///
/// Every image shows up exactly once per epoch. A batch crossing the end of an epoch is completed
/// with the start of the next, freshly shuffled one.
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: ImageDataset,
    batch_size: usize,
    order: Vec<usize>,
    cursor: usize,
    epoch: u64,
    rng: StdRng,
}

impl DataLoader {
    /// Creates a new `DataLoader`.
    ///
    /// # Arguments
    /// * `dataset` - A non empty dataset.
    /// * `batch_size` - The amount of images per batch.
    /// * `rng` - The generator used to shuffle every epoch.
    pub fn new(dataset: ImageDataset, batch_size: NonZeroUsize, mut rng: StdRng) -> Self {
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        order.shuffle(&mut rng);

        Self {
            dataset,
            batch_size: batch_size.get(),
            order,
            cursor: 0,
            epoch: 0,
            rng,
        }
    }

    pub fn dataset(&self) -> &ImageDataset {
        &self.dataset
    }

    /// The amount of whole passes over the dataset done so far.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns the next `(batch, 1, rows, cols)` batch.
    pub fn next_batch(&mut self) -> Array4<f32> {
        self.next_batch_of(self.batch_size)
    }

    /// Returns the next `n` images of the shuffled order, regardless of the batch size.
    pub fn next_batch_of(&mut self, n: usize) -> Array4<f32> {
        let indices = self.next_indices(n);
        self.dataset.gather(&indices)
    }

    fn next_indices(&mut self, n: usize) -> Vec<usize> {
        let mut indices = Vec::with_capacity(n);

        while indices.len() < n && !self.order.is_empty() {
            if self.cursor == self.order.len() {
                self.order.shuffle(&mut self.rng);
                self.cursor = 0;
                self.epoch += 1;
                debug!("starting epoch {}", self.epoch);
            }

            let take = (n - indices.len()).min(self.order.len() - self.cursor);
            indices.extend_from_slice(&self.order[self.cursor..self.cursor + take]);
            self.cursor += take;
        }

        indices
    }
}
