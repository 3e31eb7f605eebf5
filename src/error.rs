use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the detection and export code.
///
/// `Decode` is the only kind a batch run recovers from: the offending file
/// is skipped. Everything else aborts the run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to write {}: {message}", path.display())]
    Write { path: PathBuf, message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn write(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Error::Write {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// True for per-image failures a batch run may skip over.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
