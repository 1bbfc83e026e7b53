//! Error types for session-core
//!
//! Every public operation returns [`SessionResult`]. Expected failures (not in a
//! call, nothing playing, converter rejected the input, ...) are variants here;
//! nothing in the orchestrator panics on them.

use std::path::PathBuf;

use callcast_audio_core::MediaKind;
use callcast_media_core::TransformError;
use thiserror::Error;

use crate::transport::TransportError;
use crate::types::{ChatId, SessionPhase};

/// Result type for session operations
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Errors returned by [`CallManager`](crate::CallManager) operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    /// No session exists for the chat
    #[error("Not in a call for chat {0}")]
    NotInCall(ChatId),

    #[error("Already in a call for chat {0}")]
    AlreadyInCall(ChatId),

    /// Join did not complete within the configured timeout
    #[error("Join for chat {chat_id} timed out after {timeout_ms} ms")]
    JoinTimeout { chat_id: ChatId, timeout_ms: u64 },

    #[error("Join for chat {chat_id} failed: {reason}")]
    JoinFailed { chat_id: ChatId, reason: String },

    /// The media converter failed; stderr is kept in the inner error
    #[error("Media transform failed: {0}")]
    TransformFailed(TransformError),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Operation needs something playing (or paused) and nothing is
    #[error("No active stream for chat {0}")]
    NoActiveStream(ChatId),

    #[error("Cannot {operation} chat {chat_id} while {phase:?}")]
    InvalidState {
        chat_id: ChatId,
        phase: SessionPhase,
        operation: &'static str,
    },

    #[error("Unsupported media kind: {0:?}")]
    UnsupportedMedia(MediaKind),

    #[error("Queue for chat {chat_id} is full ({limit} items)")]
    QueueFull { chat_id: ChatId, limit: usize },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The session was closed while the operation was in flight
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid chat id: {0:?}")]
    InvalidChatId(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SessionError {
    pub fn invalid_state(chat_id: ChatId, phase: SessionPhase, operation: &'static str) -> Self {
        Self::InvalidState { chat_id, phase, operation }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn join_failed(chat_id: ChatId, reason: impl ToString) -> Self {
        Self::JoinFailed { chat_id, reason: reason.to_string() }
    }

    /// Converter stderr, when this error came from a failed transform
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::TransformFailed(e) => e.stderr(),
            _ => None,
        }
    }

    /// Whether the supervisor may retry after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::JoinTimeout { .. } | Self::JoinFailed { .. } | Self::Transport(_)
        )
    }
}

impl From<TransformError> for SessionError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::InputMissing(path) => SessionError::FileNotFound(path),
            TransformError::Cancelled => SessionError::Cancelled,
            other => SessionError::TransformFailed(other),
        }
    }
}

impl From<callcast_infra_common::Error> for SessionError {
    fn from(err: callcast_infra_common::Error) -> Self {
        SessionError::Configuration(err.to_string())
    }
}

impl From<callcast_audio_core::AudioError> for SessionError {
    fn from(err: callcast_audio_core::AudioError) -> Self {
        SessionError::Configuration(err.to_string())
    }
}
