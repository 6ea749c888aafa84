pub mod balance;
pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod gan;
pub mod metrics;
pub mod session;

pub use balance::{
    AdversarialSteps, BalanceController, BalanceState, Iteration, LossTriple, StepCounters,
    StepKind, Thresholds,
};
pub use config::TrainingConfig;
pub use error::{ConfigErr, Result, TrainErr};
pub use gan::Gan;
pub use metrics::Summary;
pub use session::TrainingSession;
