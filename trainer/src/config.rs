use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use machine_learning::optimization::{
    Adam, GradientDescent, GradientDescentWithMomentum, Optimizer,
};
use serde::{Deserialize, Serialize};

use crate::{
    balance::Thresholds,
    error::{ConfigErr, Result},
};

/// The optimizer each of the three adversarial steps gets its own instance of.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerConfig {
    Adam {
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    },
    GradientDescent {
        learning_rate: f32,
    },
    GradientDescentWithMomentum {
        learning_rate: f32,
        momentum: f32,
    },
}

impl OptimizerConfig {
    /// Builds an optimizer for a parameter buffer of `len` parameters.
    pub fn build(&self, len: usize) -> Box<dyn Optimizer + Send> {
        match *self {
            OptimizerConfig::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Box::new(Adam::new(len, learning_rate, beta1, beta2, epsilon)),
            OptimizerConfig::GradientDescent { learning_rate } => {
                Box::new(GradientDescent::new(learning_rate))
            }
            OptimizerConfig::GradientDescentWithMomentum {
                learning_rate,
                momentum,
            } => Box::new(GradientDescentWithMomentum::new(
                len,
                learning_rate,
                momentum,
            )),
        }
    }

    fn learning_rate(&self) -> f32 {
        match *self {
            OptimizerConfig::Adam { learning_rate, .. }
            | OptimizerConfig::GradientDescent { learning_rate }
            | OptimizerConfig::GradientDescentWithMomentum { learning_rate, .. } => learning_rate,
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Adam {
            learning_rate: 1e-4,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// Sizes of the generator and the discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchitectureConfig {
    /// Dimension of the generator's noise; its hidden convolutions have `z_dim / 2` and
    /// `z_dim / 4` filters.
    pub z_dim: usize,
    pub discriminator_filters: (usize, usize),
    pub discriminator_hidden: usize,
}

impl Default for ArchitectureConfig {
    fn default() -> Self {
        Self {
            z_dim: 100,
            discriminator_filters: (32, 64),
            discriminator_hidden: 1024,
        }
    }
}

const BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(50).unwrap();
const REPORT_EVERY: NonZeroUsize = NonZeroUsize::new(10).unwrap();
const SAMPLE_EVERY: NonZeroUsize = NonZeroUsize::new(1000).unwrap();
const CHECKPOINT_EVERY: NonZeroUsize = NonZeroUsize::new(5000).unwrap();
const KEEP_CHECKPOINTS: NonZeroUsize = NonZeroUsize::new(5).unwrap();

/// Everything a training run needs, loaded from a JSON file. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    /// Directory holding the uncompressed MNIST training images.
    pub data_dir: PathBuf,
    /// Amount of images split off the training set for validation.
    pub validation_size: usize,
    pub batch_size: NonZeroUsize,
    pub iterations: usize,
    pub architecture: ArchitectureConfig,
    pub optimizer: OptimizerConfig,
    pub thresholds: Thresholds,
    /// Target of the discriminator on real images, below 1 for one-sided label smoothing.
    pub real_label: f32,
    pub report_every: NonZeroUsize,
    pub sample_every: NonZeroUsize,
    pub checkpoint_every: NonZeroUsize,
    pub keep_checkpoints: NonZeroUsize,
    pub checkpoint_dir: PathBuf,
    pub metrics_path: PathBuf,
    /// Capacity of the background batch queue, no background loading when 0.
    pub prefetch: usize,
    pub seed: Option<u64>,
    pub resume_from: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("MNIST_data"),
            validation_size: 5000,
            batch_size: BATCH_SIZE,
            iterations: 50_000,
            architecture: ArchitectureConfig::default(),
            optimizer: OptimizerConfig::default(),
            thresholds: Thresholds::default(),
            real_label: 0.9,
            report_every: REPORT_EVERY,
            sample_every: SAMPLE_EVERY,
            checkpoint_every: CHECKPOINT_EVERY,
            keep_checkpoints: KEEP_CHECKPOINTS,
            checkpoint_dir: PathBuf::from("models"),
            metrics_path: PathBuf::from("logs/gan/metrics.jsonl"),
            prefetch: 2,
            seed: None,
            resume_from: None,
        }
    }
}

impl TrainingConfig {
    /// Loads and validates a configuration from a JSON file.
    ///
    /// # Arguments
    /// * `path` - The path of the file.
    ///
    /// # Errors
    /// If the file can't be read or parsed, or the configuration is invalid.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks the values serde can't check on its own.
    pub fn validate(&self) -> std::result::Result<(), ConfigErr> {
        self.thresholds.validate()?;

        let invalid = |field, reason: &str| ConfigErr::Invalid {
            field,
            reason: reason.to_string(),
        };

        if self.architecture.z_dim < 4 {
            return Err(invalid(
                "architecture.z_dim",
                "must be at least 4 so every generator convolution has a filter",
            ));
        }

        let (first, second) = self.architecture.discriminator_filters;
        if first == 0 || second == 0 || self.architecture.discriminator_hidden == 0 {
            return Err(invalid(
                "architecture",
                "the discriminator needs at least one filter and hidden unit",
            ));
        }

        if !(0. ..=1.).contains(&self.real_label) {
            return Err(invalid("real_label", "must be within [0, 1]"));
        }

        let lr = self.optimizer.learning_rate();
        if !lr.is_finite() || lr <= 0. {
            return Err(invalid("optimizer", "the learning rate must be positive"));
        }

        Ok(())
    }
}
