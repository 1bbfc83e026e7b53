//! # callcast media core
//!
//! Wraps the external media converter (ffmpeg) used to render every stream the
//! orchestrator hands to a call:
//!
//! - [`converter`]: the [`Converter`] seam, the ffmpeg implementation and binary discovery
//! - [`transformer`]: [`MediaTransformer`], a bounded pool that runs one conversion per request
//! - [`scratch`]: naming and cleanup of derived files
//!
//! The transformer never touches its input. Outputs are written to unique paths
//! and removed again on failure or cancellation.

pub mod converter;
pub mod error;
pub mod scratch;
pub mod transformer;

pub use converter::{locate_converter, Converter, ConverterOutput, FfmpegConverter};
pub use error::{Result, TransformError};
pub use scratch::{ScratchDir, ScratchPurpose};
pub use transformer::{MediaTransformer, TransformRequest, TransformerConfig};
