use std::{error::Error, fmt, io, path::PathBuf};

use machine_learning::MlErr;

/// The trainer's result type.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// Every way a training or prediction run can fail. None of them is retried.
#[derive(Debug)]
pub enum TrainErr {
    Ml(MlErr),
    Io(io::Error),
    Json(serde_json::Error),
    InvalidConfig(String),
    /// A data file line that is not a valid example.
    Dataset {
        path: PathBuf,
        line: usize,
        msg: String,
    },
    /// Predictions were requested but training never saved a checkpoint.
    MissingCheckpoint {
        path: PathBuf,
    },
    Checkpoint(String),
    NonFiniteLoss {
        task: &'static str,
        step: usize,
    },
    /// A task's loader ran dry before its scheduled occurrences did.
    SourceExhausted {
        task: &'static str,
    },
}

impl fmt::Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::Ml(e) => write!(f, "model error: {e}"),
            TrainErr::Io(e) => write!(f, "io error: {e}"),
            TrainErr::Json(e) => write!(f, "json error: {e}"),
            TrainErr::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            TrainErr::Dataset { path, line, msg } => {
                write!(f, "{}:{line}: {msg}", path.display())
            }
            TrainErr::MissingCheckpoint { path } => write!(
                f,
                "no checkpoint at '{}', training never saved one so there is nothing to load",
                path.display()
            ),
            TrainErr::Checkpoint(msg) => write!(f, "invalid checkpoint: {msg}"),
            TrainErr::NonFiniteLoss { task, step } => {
                write!(f, "{task} loss is not finite at step {step}")
            }
            TrainErr::SourceExhausted { task } => {
                write!(f, "{task} ran out of batches before the end of the epoch")
            }
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainErr::Ml(e) => Some(e),
            TrainErr::Io(e) => Some(e),
            TrainErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for TrainErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<io::Error> for TrainErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for TrainErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<safetensors::SafeTensorError> for TrainErr {
    fn from(value: safetensors::SafeTensorError) -> Self {
        Self::Checkpoint(value.to_string())
    }
}

/// Boundary conversion for the binary.
impl From<TrainErr> for io::Error {
    fn from(value: TrainErr) -> Self {
        match value {
            TrainErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
