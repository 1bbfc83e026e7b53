//! Call-transport seams
//!
//! The orchestrator does not speak any calling protocol itself. It is handed a
//! [`CallAccount`] that can produce a [`TransportBinding`] for a chat; the
//! binding's handle joins, leaves and switches the streamed file, and reports
//! asynchronous [`TransportEvent`]s through the sender passed to `connect`.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::ChatId;

/// Result type for transport calls
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Failures reported by a transport implementation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Join failed: {0}")]
    Join(String),

    #[error("Leave failed: {0}")]
    Leave(String),

    #[error("Stream switch failed: {0}")]
    Stream(String),

    #[error("Pause control failed: {0}")]
    Pause(String),

    #[error("Transport call timed out: {0}")]
    Timeout(String),

    #[error("Not connected")]
    NotConnected,
}

/// Asynchronous notifications from the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportEvent {
    /// The current file finished playing
    StreamEnded { chat_id: ChatId },
    /// Presence in the call was terminated by the remote side
    Kicked { chat_id: ChatId },
}

impl TransportEvent {
    pub fn chat_id(&self) -> ChatId {
        match self {
            TransportEvent::StreamEnded { chat_id } | TransportEvent::Kicked { chat_id } => *chat_id,
        }
    }
}

/// Where a binding delivers its events
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// An active connection to one chat's call
#[async_trait]
pub trait TransportHandle: Send + Sync + fmt::Debug {
    async fn join(&self) -> TransportResult<()>;

    async fn leave(&self) -> TransportResult<()>;

    /// Replace whatever is streaming with `path`
    async fn switch_stream(&self, path: &Path) -> TransportResult<()>;
}

/// Native pause support, offered by some transports
#[async_trait]
pub trait Pauseable: Send + Sync + fmt::Debug {
    async fn pause(&self) -> TransportResult<()>;

    async fn resume(&self) -> TransportResult<()>;
}

/// A handle plus its optional pause capability, resolved once at creation
#[derive(Debug, Clone)]
pub struct TransportBinding {
    pub handle: Arc<dyn TransportHandle>,
    pub pause: Option<Arc<dyn Pauseable>>,
}

impl TransportBinding {
    pub fn new(handle: Arc<dyn TransportHandle>) -> Self {
        Self { handle, pause: None }
    }

    pub fn with_pause(handle: Arc<dyn TransportHandle>, pause: Arc<dyn Pauseable>) -> Self {
        Self { handle, pause: Some(pause) }
    }

    /// Binding for a handle that implements both traits
    pub fn pauseable<H>(handle: Arc<H>) -> Self
    where
        H: TransportHandle + Pauseable + 'static,
    {
        Self {
            handle: handle.clone(),
            pause: Some(handle),
        }
    }

    pub fn supports_pause(&self) -> bool {
        self.pause.is_some()
    }
}

/// An authenticated account able to open call transports
#[async_trait]
pub trait CallAccount: Send + Sync + fmt::Debug {
    /// Stable identifier used in logs and status
    fn account_id(&self) -> String;

    /// Open a transport for `chat_id`; events for that chat go to `events`
    async fn connect(&self, chat_id: ChatId, events: TransportEventSender) -> TransportResult<TransportBinding>;
}
