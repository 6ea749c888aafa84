use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;

use crate::initialization::RandErr;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    InvalidShape {
        layer: &'static str,
        got: Vec<usize>,
        expected: &'static str,
    },
    BackwardBeforeForward {
        layer: &'static str,
    },
    NonFinite {
        what: &'static str,
        value: f32,
    },
    Reshape(ShapeError),
    Init(RandErr),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::InvalidShape {
                layer,
                got,
                expected,
            } => write!(
                f,
                "The {layer} layer got an input of shape {got:?}, expected {expected}"
            ),
            MlErr::BackwardBeforeForward { layer } => write!(
                f,
                "Tried to backpropagate through the {layer} layer before any forward pass"
            ),
            MlErr::NonFinite { what, value } => {
                write!(f, "The {what} diverged to a non finite value ({value})")
            }
            MlErr::Reshape(e) => write!(f, "Failed to reshape an array: {e}"),
            MlErr::Init(e) => write!(f, "Failed to initialize the parameters: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Reshape(e) => Some(e),
            MlErr::Init(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Reshape(value)
    }
}

impl From<RandErr> for MlErr {
    fn from(value: RandErr) -> Self {
        Self::Init(value)
    }
}
