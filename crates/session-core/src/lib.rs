//! # callcast session core
//!
//! Orchestrates live voice-call sessions, one per chat: joining a call,
//! streaming loudness-adjusted audio into it, pausing and resuming with accurate
//! position tracking, advancing a playlist when a track ends and rejoining after
//! being kicked.
//!
//! ## Layout
//!
//! - [`CallManager`]: the public entry point; every operation returns a
//!   [`SessionResult`]
//! - [`transport`]: the seams a calling backend implements ([`CallAccount`],
//!   [`TransportHandle`], [`Pauseable`])
//! - [`manager::events`]: lifecycle events on a broadcast channel
//! - [`api::VoiceChatControl`]: a `bool`-returning facade for UI layers
//!
//! ## Concurrency
//!
//! Sessions live in a registry whose lock is only held for lookups, inserts and
//! removals. Each session has its own operation lock, held for the whole of an
//! operation, so operations on one chat are totally ordered while different
//! chats proceed in parallel. Set
//! [`SessionManagerConfig::serialize_all_chats`] to put a manager-wide lock in
//! front of that.
//!
//! ## Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use callcast_session_core::*;
//! # async fn demo(account: Arc<dyn CallAccount>) -> SessionResult<()> {
//! let config = SessionManagerConfig::new("assets/silence.mp3");
//! let manager = CallManager::builder(config).build().await?;
//!
//! let chat: ChatId = "-1001234567890".parse()?;
//! manager.join(chat, account).await?;
//! manager.play(chat, "music/track.mp3", VoiceSettings::with_volume(150)).await?;
//! manager.pause(chat).await?;
//! manager.resume(chat).await?;
//! manager.leave(chat).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod manager;
pub mod session;
pub mod transport;
pub mod types;

pub use api::VoiceChatControl;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RetryPolicy, SessionManagerConfig};
pub use coordinator::{CallManager, CallManagerBuilder, ManagerStatus, RegistryStats, StatsSnapshot};
pub use errors::{SessionError, SessionResult};
pub use manager::events::{SessionEvent, SessionEventProcessor};
pub use session::{CallSession, PlaybackPosition, SessionSummary};
pub use transport::{
    CallAccount, Pauseable, TransportBinding, TransportError, TransportEvent, TransportEventSender,
    TransportHandle, TransportResult,
};
pub use types::{ChatId, EnqueueOutcome, JoinOutcome, QueuedMedia, SessionPhase};

pub use callcast_audio_core::{MediaKind, VoiceSettings};
