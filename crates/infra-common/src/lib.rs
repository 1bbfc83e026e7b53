//! # callcast infrastructure
//!
//! Shared plumbing used by every callcast crate:
//!
//! - [`logging`]: `tracing` subscriber setup and contextual spans
//! - [`errors`]: the common infrastructure error type and context helpers
//! - [`config`]: layered configuration loading (defaults, TOML file, environment)

pub mod config;
pub mod errors;
pub mod logging;

pub use crate::config::{load_layered, ConfigLayers};
pub use errors::{Error, ErrorContext, ErrorExt, Result};
pub use logging::{setup_logging, LogContext, LoggingConfig};
