//! Layered configuration loading.
//!
//! Every callcast config struct is serde-deserializable and has a `Default`.
//! [`load_layered`] merges, lowest precedence first:
//!
//! 1. the struct's `Default` value
//! 2. an optional TOML file
//! 3. environment variables such as `CALLCAST__SESSION__MAX_QUEUE_LEN=50`

use std::path::{Path, PathBuf};

use ::config::{Config, Environment, File, FileFormat};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::errors::types::{Error, Result};
use crate::errors::{ErrorContext, ErrorExt};

/// Default environment prefix
pub const DEFAULT_ENV_PREFIX: &str = "CALLCAST";

/// Sources consulted by [`load_layered`]
#[derive(Debug, Clone)]
pub struct ConfigLayers {
    /// Optional TOML file. A missing file is not an error unless `file_required` is set.
    pub file: Option<PathBuf>,
    pub file_required: bool,
    /// Environment prefix, `None` disables the environment layer
    pub env_prefix: Option<String>,
    /// Separator between nested keys in environment variable names
    pub env_separator: String,
}

impl Default for ConfigLayers {
    fn default() -> Self {
        Self {
            file: None,
            file_required: false,
            env_prefix: Some(DEFAULT_ENV_PREFIX.to_string()),
            env_separator: "__".to_string(),
        }
    }
}

impl ConfigLayers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_required_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self.file_required = true;
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// Human-readable list of the layers, used in error context
    pub fn describe(&self) -> String {
        let file = match &self.file {
            Some(path) if self.file_required => format!("file {}", path.display()),
            Some(path) => format!("optional file {}", path.display()),
            None => "no file".to_string(),
        };
        match &self.env_prefix {
            Some(prefix) => format!("{}, env {}{}*", file, prefix, self.env_separator),
            None => file,
        }
    }
}

/// Load `T` from defaults, an optional TOML file and the environment.
///
/// Errors keep their [`Error::Config`] variant and name the layers consulted.
pub fn load_layered<T>(layers: &ConfigLayers) -> Result<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    build_layered(layers).context(ErrorContext::new("infra-common", "load_layered").with_details(layers.describe()))
}

fn build_layered<T>(layers: &ConfigLayers) -> Result<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    let defaults = Config::try_from(&T::default())?;
    let mut builder = Config::builder().add_source(defaults);

    if let Some(path) = &layers.file {
        if layers.file_required && !path.exists() {
            return Err(Error::Config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        debug!(path = %path.display(), "adding configuration file layer");
        builder = builder.add_source(
            File::from(path.as_path())
                .format(FileFormat::Toml)
                .required(layers.file_required),
        );
    }

    if let Some(prefix) = &layers.env_prefix {
        builder = builder.add_source(
            Environment::with_prefix(prefix)
                .separator(&layers.env_separator)
                .try_parsing(true),
        );
    }

    let value = builder.build()?.try_deserialize::<T>()?;
    Ok(value)
}

/// Parse `T` from a TOML string, filling missing fields from `T::default()`.
pub fn from_toml_str<T>(text: &str) -> Result<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    let defaults = Config::try_from(&T::default())?;
    let value = Config::builder()
        .add_source(defaults)
        .add_source(File::from_str(text, FileFormat::Toml))
        .build()?
        .try_deserialize::<T>()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Sample {
        name: String,
        limit: u32,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self { name: "callcast".into(), limit: 10 }
        }
    }

    #[test]
    fn test_from_toml_str_keeps_defaults() {
        let sample: Sample = from_toml_str("limit = 3").unwrap();
        assert_eq!(sample, Sample { name: "callcast".into(), limit: 3 });
    }

    #[test]
    fn test_missing_required_file() {
        let layers = ConfigLayers::new()
            .with_required_file("/definitely/not/here.toml")
            .without_env();
        let err = load_layered::<Sample>(&layers).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_errors_name_the_layers() {
        let layers = ConfigLayers::new()
            .with_required_file("/definitely/not/here.toml")
            .with_env_prefix("CCMISSING");
        let err = load_layered::<Sample>(&layers).unwrap_err().to_string();
        assert!(err.contains("configuration file not found"));
        assert!(err.contains("during operation 'load_layered'"));
        assert!(err.contains("file /definitely/not/here.toml, env CCMISSING__*"));
    }

    #[test]
    fn test_describe_layers() {
        assert_eq!(ConfigLayers::new().without_env().describe(), "no file");
        assert_eq!(
            ConfigLayers::new().with_file("callcast.toml").describe(),
            "optional file callcast.toml, env CALLCAST__*"
        );
    }
}
