/*!
Error Handling

This module provides standardized error types and utilities
for the callcast stack. It includes:

- Common error types
- Error context utilities
*/

pub mod types;
mod context;

pub use types::{Error, Result};
pub use context::{ErrorContext, ErrorExt};
