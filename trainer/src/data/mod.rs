mod dataloader;
mod dataset;
pub mod mnist;
mod prefetch;

pub use dataloader::DataLoader;
pub use dataset::ImageDataset;
pub use prefetch::{BatchSource, Prefetcher};
