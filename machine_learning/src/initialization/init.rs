use std::{cell::RefCell, rc::Rc};

use rand::Rng;

use super::{ConstParamGen, ParamGen, RandParamGen, Result};

/// How a group of parameters of a layer gets its initial values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Init {
    Const(f32),
    Uniform { low: f32, high: f32 },
    Normal { mean: f32, std_dev: f32 },
    TruncatedNormal { mean: f32, std_dev: f32 },
}

impl Init {
    /// Truncated normal centered at zero, the default for weights.
    pub const fn truncated(std_dev: f32) -> Self {
        Self::TruncatedNormal { mean: 0., std_dev }
    }

    /// Creates the parameter generator for a group of `limit` parameters.
    ///
    /// # Arguments
    /// * `rng` - The random number generator shared by the whole network.
    /// * `limit` - The amount of parameters in the group.
    ///
    /// # Returns
    /// A boxed generator or an error if the distribution is invalid.
    pub fn param_gen<R>(self, rng: &Rc<RefCell<R>>, limit: usize) -> Result<Box<dyn ParamGen>>
    where
        R: Rng + 'static,
    {
        let param_gen: Box<dyn ParamGen> = match self {
            Init::Const(value) => Box::new(ConstParamGen::new(value, limit)),
            Init::Uniform { low, high } => {
                Box::new(RandParamGen::uniform(rng.clone(), limit, low, high)?)
            }
            Init::Normal { mean, std_dev } => {
                Box::new(RandParamGen::normal(rng.clone(), limit, mean, std_dev)?)
            }
            Init::TruncatedNormal { mean, std_dev } => Box::new(RandParamGen::truncated_normal(
                rng.clone(),
                limit,
                mean,
                std_dev,
            )?),
        };

        Ok(param_gen)
    }
}
