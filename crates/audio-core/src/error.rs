use thiserror::Error;

/// Result type for audio-core operations
pub type Result<T> = std::result::Result<T, AudioError>;

/// Errors raised while validating or parsing loudness configuration
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AudioError {
    /// Volume range or gain curve is inconsistent
    #[error("Invalid volume configuration: {0}")]
    InvalidVolumeConfig(String),

    /// Chain table violates tier ordering or limiter rules
    #[error("Invalid processing chain: {0}")]
    InvalidChain(String),

    #[error("Unknown voice effect: {0}")]
    UnknownEffect(String),

    #[error("Unknown equalizer preset: {0}")]
    UnknownEqualizer(String),

    #[error("Unknown audio quality: {0}")]
    UnknownQuality(String),
}
