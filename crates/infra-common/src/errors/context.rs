use crate::errors::types::Error;
use std::fmt;

/// Context information for an error
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Component where the error occurred
    pub component: String,
    /// Operation that was being performed
    pub operation: String,
    /// Additional context information
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new<S: Into<String>, T: Into<String>>(component: S, operation: T) -> Self {
        ErrorContext {
            component: component.into(),
            operation: operation.into(),
            details: None,
        }
    }

    /// Add details to the context
    pub fn with_details<S: Into<String>>(mut self, details: S) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in component '{}' during operation '{}'", self.component, self.operation)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// Extension trait for attaching context to infrastructure errors
pub trait ErrorExt<T> {
    /// Attach a full context
    fn context(self, ctx: ErrorContext) -> std::result::Result<T, Error>;

    /// Attach a component/operation pair
    fn with_context<S: Into<String>, U: Into<String>>(
        self,
        component: S,
        operation: U,
    ) -> std::result::Result<T, Error>;
}

impl<T> ErrorExt<T> for std::result::Result<T, Error> {
    fn context(self, ctx: ErrorContext) -> std::result::Result<T, Error> {
        self.map_err(|e| match e {
            // Keep the variant for config errors so callers can still match on it
            Error::Config(msg) => Error::Config(format!("{} [{}]", msg, ctx)),
            Error::Validation(msg) => Error::Validation(format!("{} [{}]", msg, ctx)),
            other => Error::Custom(format!("{} [{}]", other, ctx)),
        })
    }

    fn with_context<S: Into<String>, U: Into<String>>(
        self,
        component: S,
        operation: U,
    ) -> std::result::Result<T, Error> {
        self.context(ErrorContext::new(component, operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display_includes_details() {
        let ctx = ErrorContext::new("session-core", "join").with_details("chat 42");
        assert_eq!(
            ctx.to_string(),
            "in component 'session-core' during operation 'join' (chat 42)"
        );
    }

    #[test]
    fn test_config_variant_survives_context() {
        let result: std::result::Result<(), Error> = Err(Error::Config("bad ceiling".into()));
        let err = result.with_context("audio-core", "validate").unwrap_err();
        match err {
            Error::Config(msg) => {
                assert!(msg.contains("bad ceiling"));
                assert!(msg.contains("audio-core"));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_other_variants_become_custom() {
        let result: std::result::Result<(), Error> = Err(Error::Internal("boom".into()));
        let err = result.with_context("media-core", "sweep").unwrap_err();
        assert!(matches!(err, Error::Custom(_)));
    }
}
