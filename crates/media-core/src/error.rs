use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations
pub type Result<T> = std::result::Result<T, TransformError>;

/// Errors produced while running the external converter
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    /// Source file does not exist
    #[error("Input not found: {}", .0.display())]
    InputMissing(PathBuf),

    /// The converter process could not be started
    #[error("Failed to launch converter: {0}")]
    Spawn(String),

    /// The converter ran but reported failure
    #[error("Converter exited with status {exit_code:?}: {stderr}")]
    Failed { exit_code: Option<i32>, stderr: String },

    /// The converter reported success but left no usable output
    #[error("Converter produced no output at {}", path.display())]
    EmptyOutput { path: PathBuf, stderr: String },

    /// No converter binary could be found
    #[error("Converter not found: {0}")]
    ConverterNotFound(String),

    /// The worker pool was shut down
    #[error("Transform cancelled")]
    Cancelled,

    /// Scratch directory I/O failed
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransformError {
    /// Converter stderr, when the converter got far enough to produce any
    pub fn stderr(&self) -> Option<&str> {
        match self {
            TransformError::Failed { stderr, .. } | TransformError::EmptyOutput { stderr, .. } => {
                Some(stderr.as_str())
            }
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransformError {
    fn from(err: std::io::Error) -> Self {
        TransformError::Io(err.to_string())
    }
}
