pub mod arch;
pub mod error;
pub mod initialization;
pub mod optimization;
mod test;

pub use error::{MlErr, Result};
