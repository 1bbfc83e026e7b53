//! Orchestrator configuration
//!
//! All durations are plain millisecond integers so the struct maps cleanly onto
//! TOML files and `CALLCAST__*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use callcast_audio_core::{ChainTable, VolumeConfig};
use callcast_infra_common::config::{load_layered, ConfigLayers};
use callcast_media_core::TransformerConfig;
use serde::{Deserialize, Serialize};

use crate::errors::{SessionError, SessionResult};

/// Reconnection policy: linear backoff, `base_backoff * attempt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Configuration for [`CallManager`](crate::CallManager)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionManagerConfig {
    /// Ready-to-stream silence clip used while nothing plays
    pub placeholder_path: PathBuf,
    pub join_timeout_ms: u64,
    pub leave_timeout_ms: u64,
    /// Bound on a single `switch_stream` / pause / resume transport call
    pub transport_timeout_ms: u64,
    /// Pause between a stream ending and the next queued item starting
    pub advance_delay_ms: u64,
    pub max_queue_len: usize,
    /// Take a manager-wide lock around every operation
    pub serialize_all_chats: bool,
    pub event_channel_capacity: usize,
    pub volume: VolumeConfig,
    pub chain: ChainTable,
    pub transformer: TransformerConfig,
    pub reconnect: RetryPolicy,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            placeholder_path: PathBuf::from("silence.mp3"),
            join_timeout_ms: 30_000,
            leave_timeout_ms: 10_000,
            transport_timeout_ms: 15_000,
            advance_delay_ms: 1_000,
            max_queue_len: 100,
            serialize_all_chats: false,
            event_channel_capacity: 256,
            volume: VolumeConfig::standard(),
            chain: ChainTable::default(),
            transformer: TransformerConfig::default(),
            reconnect: RetryPolicy::default(),
        }
    }
}

impl SessionManagerConfig {
    pub fn new(placeholder_path: impl Into<PathBuf>) -> Self {
        Self {
            placeholder_path: placeholder_path.into(),
            ..Self::default()
        }
    }

    /// Load from defaults, an optional TOML file and `CALLCAST__*` variables
    pub fn load(layers: &ConfigLayers) -> SessionResult<Self> {
        let config: Self = load_layered(layers)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_leave_timeout(mut self, timeout: Duration) -> Self {
        self.leave_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_transport_timeout(mut self, timeout: Duration) -> Self {
        self.transport_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_advance_delay(mut self, delay: Duration) -> Self {
        self.advance_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_queue_len(mut self, max: usize) -> Self {
        self.max_queue_len = max;
        self
    }

    pub fn with_serialize_all_chats(mut self, enabled: bool) -> Self {
        self.serialize_all_chats = enabled;
        self
    }

    pub fn with_volume(mut self, volume: VolumeConfig) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_chain(mut self, chain: ChainTable) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_transformer(mut self, transformer: TransformerConfig) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.transformer.scratch_dir = dir.into();
        self
    }

    pub fn with_reconnect(mut self, reconnect: RetryPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn leave_timeout(&self) -> Duration {
        Duration::from_millis(self.leave_timeout_ms)
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_millis(self.transport_timeout_ms)
    }

    pub fn advance_delay(&self) -> Duration {
        Duration::from_millis(self.advance_delay_ms)
    }

    pub fn validate(&self) -> SessionResult<()> {
        if self.placeholder_path.as_os_str().is_empty() {
            return Err(SessionError::configuration("placeholder_path is empty"));
        }
        if self.join_timeout_ms == 0 {
            return Err(SessionError::configuration("join_timeout_ms must be positive"));
        }
        if self.leave_timeout_ms == 0 || self.transport_timeout_ms == 0 {
            return Err(SessionError::configuration("transport timeouts must be positive"));
        }
        if self.max_queue_len == 0 {
            return Err(SessionError::configuration("max_queue_len must be at least 1"));
        }
        if self.event_channel_capacity == 0 {
            return Err(SessionError::configuration("event_channel_capacity must be at least 1"));
        }
        self.volume.validate()?;
        self.chain.validate()?;
        self.transformer
            .validate()
            .map_err(SessionError::Configuration)?;
        Ok(())
    }
}
