//! # callcast
//!
//! Streams loudness-adjusted audio into live voice calls, one session per chat,
//! with pause/resume, playlists and automatic rejoin after a kick.
//!
//! ## Crates
//!
//! - [`infra_common`]: logging setup, the infrastructure error type, layered config
//! - [`audio_core`]: volume-to-gain mapping and the filter chain descriptor
//! - [`media_core`]: the converter seam, ffmpeg discovery and the bounded transformer
//! - [`session_core`]: the call manager and its transport seams
//! - [`web_console`]: HTTP health and status
//!
//! ## Quick Start
//!
//! ```no_run
//! use callcast::prelude::*;
//! # use std::sync::Arc;
//! # async fn run(account: Arc<dyn CallAccount>) -> SessionResult<()> {
//! let manager = CallManager::builder(SessionManagerConfig::new("silence.mp3")).build().await?;
//! manager.join(ChatId::new(-100123), account).await?;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};

pub use callcast_audio_core as audio_core;
pub use callcast_infra_common as infra_common;
pub use callcast_media_core as media_core;
pub use callcast_session_core as session_core;
pub use callcast_web_console as web_console;

use callcast_infra_common::config::{load_layered, ConfigLayers};
use callcast_session_core::{SessionManagerConfig, SessionResult};
use callcast_web_console::ConsoleConfig;

pub mod prelude {
    //! Common imports for callcast applications

    pub use crate::AppConfig;
    pub use callcast_audio_core::{
        AudioQuality, EqualizerPreset, MediaKind, VoiceEffect, VoiceSettings, VolumeConfig,
    };
    pub use callcast_session_core::*;
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything the `callcast` binary reads from its configuration file.
///
/// ```toml
/// [session]
/// placeholder_path = "assets/silence.mp3"
/// max_queue_len = 50
///
/// [console]
/// port = 8080
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionManagerConfig,
    pub console: ConsoleConfig,
}

impl AppConfig {
    /// Load and validate; environment keys look like `CALLCAST__SESSION__MAX_QUEUE_LEN`
    pub fn load(layers: &ConfigLayers) -> SessionResult<Self> {
        let config: Self = load_layered(layers)?;
        config.session.validate()?;
        Ok(config)
    }
}
