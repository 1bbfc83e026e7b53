//! Bounded media transformer
//!
//! [`MediaTransformer::transform`] renders one input through a processing chain
//! into a new file. At most `max_concurrent_transforms` conversions run at once;
//! further requests wait for a permit. Dropping the returned future kills the
//! converter and removes the partial output.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use callcast_audio_core::ProcessingChainSpec;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::converter::{Converter, ConverterOutput};
use crate::error::{Result, TransformError};

/// Transformer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformerConfig {
    /// Explicit converter binary; discovered when unset
    pub converter_path: Option<PathBuf>,
    pub max_concurrent_transforms: usize,
    /// Where derived files are written
    pub scratch_dir: PathBuf,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            converter_path: None,
            max_concurrent_transforms: 2,
            scratch_dir: std::env::temp_dir().join("callcast"),
        }
    }
}

impl TransformerConfig {
    pub fn with_converter_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.converter_path = Some(path.into());
        self
    }

    pub fn with_max_concurrent_transforms(mut self, max: usize) -> Self {
        self.max_concurrent_transforms = max;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_concurrent_transforms == 0 {
            return Err("max_concurrent_transforms must be at least 1".to_string());
        }
        Ok(())
    }
}

/// One conversion
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub input: PathBuf,
    pub chain: ProcessingChainSpec,
    /// Start offset into the input, in seconds
    pub seek_secs: Option<f64>,
    pub output: PathBuf,
    /// Output bitrate in bits per second
    pub bitrate: u32,
}

impl TransformRequest {
    pub fn new(input: impl Into<PathBuf>, chain: ProcessingChainSpec, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            chain,
            seek_secs: None,
            output: output.into(),
            bitrate: 256_000,
        }
    }

    /// Start at `secs`; offsets at or below zero are ignored
    pub fn with_seek(mut self, secs: f64) -> Self {
        self.seek_secs = (secs > 0.0).then_some(secs);
        self
    }

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Converter command line
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error"]
            .into_iter()
            .map(String::from)
            .collect();
        if let Some(secs) = self.seek_secs {
            args.push("-ss".into());
            args.push(format!("{:.3}", secs));
        }
        args.push("-i".into());
        args.push(self.input.to_string_lossy().into_owned());
        args.extend(
            [
                "-vn".to_string(),
                "-af".to_string(),
                self.chain.render(),
                "-acodec".to_string(),
                "libmp3lame".to_string(),
                "-b:a".to_string(),
                format!("{}k", self.bitrate / 1000),
                "-ar".to_string(),
                self.chain.resample_hz.to_string(),
                "-f".to_string(),
                "mp3".to_string(),
            ],
        );
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

// Removes the output on drop unless the transform completed
struct PartialOutput<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> PartialOutput<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialOutput<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "failed to remove partial output");
                }
            }
        }
    }
}

/// Runs conversions through a [`Converter`] behind a bounded worker pool
#[derive(Debug, Clone)]
pub struct MediaTransformer {
    converter: Arc<dyn Converter>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl MediaTransformer {
    pub fn new(converter: Arc<dyn Converter>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            converter,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn from_config(converter: Arc<dyn Converter>, config: &TransformerConfig) -> Self {
        Self::new(converter, config.max_concurrent_transforms)
    }

    /// Conversions currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.permits.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Stop handing out permits; queued and future transforms fail with `Cancelled`
    pub fn close(&self) {
        self.permits.close();
    }

    pub async fn transform(&self, request: TransformRequest) -> Result<PathBuf> {
        if !tokio::fs::try_exists(&request.input).await.unwrap_or(false) {
            return Err(TransformError::InputMissing(request.input.clone()));
        }
        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| TransformError::Cancelled)?;

        let started = Instant::now();
        let guard = PartialOutput::new(&request.output);
        let args = request.args();
        debug!(
            converter = %self.converter.describe(),
            input = %request.input.display(),
            output = %request.output.display(),
            tier = %request.chain.tier,
            seek = ?request.seek_secs,
            "starting transform"
        );

        let output: ConverterOutput = self
            .converter
            .run(&args)
            .await
            .map_err(|e| TransformError::Spawn(e.to_string()))?;

        if !output.is_success() {
            warn!(exit_code = ?output.exit_code, stderr = %output.stderr.trim(), "converter failed");
            return Err(TransformError::Failed {
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        let size = tokio::fs::metadata(&request.output)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size == 0 {
            return Err(TransformError::EmptyOutput {
                path: request.output.clone(),
                stderr: output.stderr,
            });
        }

        guard.keep();
        info!(
            output = %request.output.display(),
            bytes = size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "transform complete"
        );
        Ok(request.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callcast_audio_core::ChainTable;

    #[test]
    fn test_args_layout() {
        let chain = ChainTable::default().chain(1.0);
        let request = TransformRequest::new("/music/in.mp3", chain.clone(), "/tmp/out.mp3")
            .with_seek(12.5)
            .with_bitrate(128_000);
        let args = request.args();

        assert_eq!(&args[..6], ["-y", "-hide_banner", "-loglevel", "error", "-ss", "12.500"]);
        assert_eq!(&args[6..8], ["-i", "/music/in.mp3"]);
        let af = args.iter().position(|a| a == "-af").unwrap();
        assert_eq!(args[af + 1], chain.render());
        let br = args.iter().position(|a| a == "-b:a").unwrap();
        assert_eq!(args[br + 1], "128k");
        assert_eq!(args.last().unwrap(), "/tmp/out.mp3");
    }

    #[test]
    fn test_zero_seek_is_omitted() {
        let request = TransformRequest::new("in.mp3", ChainTable::default().chain(1.0), "out.mp3").with_seek(0.0);
        assert!(!request.args().contains(&"-ss".to_string()));
    }
}
