use std::{error::Error, fmt, io, path::PathBuf};

use machine_learning::MlErr;

/// The trainer module's result type.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// Invalid settings, detected before any training happens.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigErr {
    InvalidWatermark { name: &'static str, value: f32 },
    Invalid { field: &'static str, reason: String },
}

impl fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErr::InvalidWatermark { name, value } => write!(
                f,
                "invalid {name}: {value}, watermarks must be finite and non negative"
            ),
            ConfigErr::Invalid { field, reason } => write!(f, "invalid {field}: {reason}"),
        }
    }
}

impl Error for ConfigErr {}

/// Training runtime failures. All of them are fatal for the run.
#[derive(Debug)]
pub enum TrainErr {
    Io(io::Error),
    Ml(MlErr),
    Config(ConfigErr),
    Json(serde_json::Error),
    MalformedData { path: PathBuf, reason: String },
    Checkpoint { path: PathBuf, reason: String },
    DataSourceClosed,
    Join(String),
}

impl fmt::Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::Io(e) => write!(f, "io error: {e}"),
            TrainErr::Ml(e) => write!(f, "compute error: {e}"),
            TrainErr::Config(e) => write!(f, "configuration error: {e}"),
            TrainErr::Json(e) => write!(f, "json error: {e}"),
            TrainErr::MalformedData { path, reason } => {
                write!(f, "malformed data file {}: {reason}", path.display())
            }
            TrainErr::Checkpoint { path, reason } => {
                write!(f, "unusable checkpoint {}: {reason}", path.display())
            }
            TrainErr::DataSourceClosed => write!(f, "the data source stopped producing batches"),
            TrainErr::Join(e) => write!(f, "compute join error: {e}"),
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainErr::Io(e) => Some(e),
            TrainErr::Ml(e) => Some(e),
            TrainErr::Config(e) => Some(e),
            TrainErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TrainErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlErr> for TrainErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<ConfigErr> for TrainErr {
    fn from(value: ConfigErr) -> Self {
        Self::Config(value)
    }
}

impl From<serde_json::Error> for TrainErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
