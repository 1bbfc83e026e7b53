/*!
Logging

This module provides standardized logging for the callcast stack:

- Subscriber setup and configuration
- Contextual spans carrying component/operation metadata
*/

pub mod setup;
pub mod context;

pub use setup::{log_welcome, parse_log_level, setup_logging, LoggingConfig};
pub use context::{with_context, LogContext};
