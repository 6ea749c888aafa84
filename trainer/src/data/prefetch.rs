use std::num::NonZeroUsize;

use log::debug;
use ndarray::Array4;
use tokio::{sync::mpsc, task};

use super::DataLoader;
use crate::error::{Result, TrainErr};

/// Draws batches from a [`DataLoader`] on the blocking pool ahead of time.
///
/// Batches come out in the exact order the loader produced them. Dropping the `Prefetcher`
/// stops the background producer.
pub struct Prefetcher {
    rx: mpsc::Receiver<Array4<f32>>,
    _producer: task::JoinHandle<()>,
}

impl Prefetcher {
    /// Starts producing batches in the background.
    ///
    /// # Arguments
    /// * `loader` - The source of the batches.
    /// * `capacity` - The maximum amount of batches waiting to be consumed.
    pub fn spawn(mut loader: DataLoader, capacity: NonZeroUsize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.get());

        let producer = task::spawn_blocking(move || {
            while tx.blocking_send(loader.next_batch()).is_ok() {}
            debug!("prefetcher stopped after {} epochs", loader.epoch());
        });

        Self {
            rx,
            _producer: producer,
        }
    }

    /// Waits for the next batch, `None` if the producer died.
    pub async fn next(&mut self) -> Option<Array4<f32>> {
        self.rx.recv().await
    }
}

/// Where the training loop takes its real batches from.
pub enum BatchSource {
    Inline(DataLoader),
    Prefetched(Prefetcher),
}

impl BatchSource {
    /// Prefetches in the background unless `capacity` is 0.
    pub fn new(loader: DataLoader, capacity: usize) -> Self {
        match NonZeroUsize::new(capacity) {
            Some(capacity) => Self::Prefetched(Prefetcher::spawn(loader, capacity)),
            None => Self::Inline(loader),
        }
    }

    pub async fn next_batch(&mut self) -> Result<Array4<f32>> {
        match self {
            BatchSource::Inline(loader) => Ok(loader.next_batch()),
            BatchSource::Prefetched(prefetcher) => {
                prefetcher.next().await.ok_or(TrainErr::DataSourceClosed)
            }
        }
    }
}
