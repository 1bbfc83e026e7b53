//! Converter seam and the ffmpeg implementation

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, TransformError};

/// Directories probed when the converter is neither configured nor on `PATH`
pub const COMMON_CONVERTER_DIRS: &[&str] = &["/usr/bin", "/usr/local/bin", "/app/.apt/usr/bin", "/app/.heroku"];

/// Default binary name
pub const DEFAULT_CONVERTER: &str = "ffmpeg";

/// What a converter run reported
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConverterOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ConverterOutput {
    pub fn success() -> Self {
        Self { exit_code: Some(0), ..Default::default() }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// An opaque external converter
///
/// Implementations must be cancel-safe: dropping the future returned by `run`
/// has to stop the underlying work.
#[async_trait]
pub trait Converter: Send + Sync + fmt::Debug {
    /// Run the converter with `args` and report its exit status and output
    async fn run(&self, args: &[String]) -> io::Result<ConverterOutput>;

    /// Human-readable identifier for logs
    fn describe(&self) -> String {
        "converter".to_string()
    }
}

/// Runs an ffmpeg binary as a child process
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    binary: PathBuf,
}

impl FfmpegConverter {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    /// Discover a working binary, see [`locate_converter`]
    pub async fn discover(configured: Option<&Path>) -> Result<Self> {
        Ok(Self::new(locate_converter(configured).await?))
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    async fn run(&self, args: &[String]) -> io::Result<ConverterOutput> {
        debug!(binary = %self.binary.display(), ?args, "running converter");
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // dropping the future kills the child
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(ConverterOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn describe(&self) -> String {
        self.binary.display().to_string()
    }
}

/// Find a converter binary that answers `-version`.
///
/// Order: the configured path, `ffmpeg` on `PATH`, then [`COMMON_CONVERTER_DIRS`].
pub async fn locate_converter(configured: Option<&Path>) -> Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path) = configured {
        candidates.push(path.to_path_buf());
    }
    if let Some(paths) = std::env::var_os("PATH") {
        candidates.extend(std::env::split_paths(&paths).map(|dir| dir.join(DEFAULT_CONVERTER)));
    }
    candidates.extend(
        COMMON_CONVERTER_DIRS
            .iter()
            .map(|dir| Path::new(dir).join(DEFAULT_CONVERTER)),
    );

    for candidate in candidates {
        if probe(&candidate).await {
            info!(path = %candidate.display(), "using media converter");
            return Ok(candidate);
        }
    }

    let tried = configured
        .map(|p| format!("{} (configured), ", p.display()))
        .unwrap_or_default();
    Err(TransformError::ConverterNotFound(format!(
        "{}PATH and {}",
        tried,
        COMMON_CONVERTER_DIRS.join(", ")
    )))
}

async fn probe(path: &Path) -> bool {
    let result = Command::new(path)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await;

    match result {
        Ok(output) if output.status.success() => {
            let banner = String::from_utf8_lossy(&output.stdout);
            debug!(path = %path.display(), version = banner.lines().next().unwrap_or(""), "converter probe ok");
            true
        }
        Ok(output) => {
            warn!(path = %path.display(), status = ?output.status.code(), "converter probe failed");
            false
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_helpers() {
        assert!(ConverterOutput::success().is_success());
        let failed = ConverterOutput::failure(1, "bad input");
        assert!(!failed.is_success());
        assert_eq!(failed.stderr, "bad input");
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_io_error() {
        let converter = FfmpegConverter::new("/nonexistent/callcast-ffmpeg");
        assert!(converter.run(&["-version".to_string()]).await.is_err());
    }
}
