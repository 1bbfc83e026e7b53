use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use callcast_audio_core::{MediaKind, VoiceSettings};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::position::PlaybackPosition;
use crate::transport::{CallAccount, TransportBinding, TransportHandle};
use crate::types::{ChatId, QueuedMedia, SessionPhase};

/// Live state of one chat's call
#[derive(Debug)]
pub struct CallSession {
    pub chat_id: ChatId,
    pub phase: SessionPhase,
    pub account: Arc<dyn CallAccount>,
    pub binding: Option<TransportBinding>,
    /// Set when the transport was paused natively and not resumed yet
    pub transport_paused: bool,
    /// Original source of the current track
    pub current_media: Option<PathBuf>,
    /// Derived file being streamed; owned by this session
    pub current_output: Option<PathBuf>,
    pub current_volume: u16,
    pub current_kind: MediaKind,
    pub current_settings: VoiceSettings,
    pub position: PlaybackPosition,
    pub queue: VecDeque<QueuedMedia>,
    pub joined_at: DateTime<Utc>,
    pub media_played: u64,
    /// Bumped whenever the streamed track changes
    pub generation: u64,
}

impl CallSession {
    pub fn new(chat_id: ChatId, account: Arc<dyn CallAccount>, default_volume: u16) -> Self {
        Self {
            chat_id,
            phase: SessionPhase::Joining,
            account,
            binding: None,
            transport_paused: false,
            current_media: None,
            current_output: None,
            current_volume: default_volume,
            current_kind: MediaKind::Audio,
            current_settings: VoiceSettings::with_volume(default_volume),
            position: PlaybackPosition::default(),
            queue: VecDeque::new(),
            joined_at: Utc::now(),
            media_played: 0,
            generation: 0,
        }
    }

    pub fn handle(&self) -> Option<Arc<dyn TransportHandle>> {
        self.binding.as_ref().map(|b| b.handle.clone())
    }

    /// Drop the track, queue and position. Returns the derived file to delete.
    pub fn clear_media(&mut self) -> Option<PathBuf> {
        self.current_media = None;
        self.queue.clear();
        self.position.reset();
        self.generation += 1;
        self.current_output.take()
    }

    pub fn summary(&self, now: Instant) -> SessionSummary {
        SessionSummary {
            chat_id: self.chat_id,
            phase: self.phase,
            account_id: self.account.account_id(),
            current_media: self.current_media.clone(),
            volume: self.current_volume,
            position_secs: self.position.elapsed_secs(now),
            is_playing: self.position.is_playing,
            queue_len: self.queue.len(),
            queue: self.queue.iter().map(|q| q.path.clone()).collect(),
            joined_at: self.joined_at,
            media_played: self.media_played,
            supports_pause: self.binding.as_ref().map(|b| b.supports_pause()).unwrap_or(false),
        }
    }
}

/// Serializable view of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub chat_id: ChatId,
    pub phase: SessionPhase,
    pub account_id: String,
    pub current_media: Option<PathBuf>,
    pub volume: u16,
    pub position_secs: f64,
    pub is_playing: bool,
    pub queue_len: usize,
    pub queue: Vec<PathBuf>,
    pub joined_at: DateTime<Utc>,
    pub media_played: u64,
    pub supports_pause: bool,
}
