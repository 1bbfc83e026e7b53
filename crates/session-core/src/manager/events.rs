//! Session Event System
//!
//! Lifecycle events are fanned out on a `tokio::sync::broadcast` channel. The bot
//! layer, the web console and tests subscribe; publishing never blocks and never
//! fails when nobody is listening.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::ChatId;

/// Events published by the call manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    Joined { chat_id: ChatId, account_id: String },
    JoinFailed { chat_id: ChatId, reason: String },
    Left { chat_id: ChatId },
    PlaybackStarted { chat_id: ChatId, media: PathBuf, volume: u16 },
    Paused { chat_id: ChatId, position_secs: f64 },
    Resumed { chat_id: ChatId, position_secs: f64 },
    Stopped { chat_id: ChatId },
    VolumeChanged { chat_id: ChatId, volume: u16 },
    Enqueued { chat_id: ChatId, media: PathBuf, position: usize },
    /// The next queued item started after a stream ended
    QueueAdvanced { chat_id: ChatId, media: PathBuf, remaining: usize },
    /// A queued item could not be played and was skipped
    QueueItemFailed { chat_id: ChatId, media: PathBuf, reason: String },
    /// Queue exhausted; the session is back to the placeholder
    PlaylistFinished { chat_id: ChatId },
    Kicked { chat_id: ChatId },
    /// Session torn down after a kick; the supervisor takes over
    Disconnected { chat_id: ChatId },
    ReconnectAttempt { chat_id: ChatId, attempt: u32, max_attempts: u32 },
    Reconnected { chat_id: ChatId, attempts: u32 },
    ReconnectGaveUp { chat_id: ChatId, attempts: u32 },
}

impl SessionEvent {
    pub fn chat_id(&self) -> ChatId {
        match self {
            SessionEvent::Joined { chat_id, .. }
            | SessionEvent::JoinFailed { chat_id, .. }
            | SessionEvent::Left { chat_id }
            | SessionEvent::PlaybackStarted { chat_id, .. }
            | SessionEvent::Paused { chat_id, .. }
            | SessionEvent::Resumed { chat_id, .. }
            | SessionEvent::Stopped { chat_id }
            | SessionEvent::VolumeChanged { chat_id, .. }
            | SessionEvent::Enqueued { chat_id, .. }
            | SessionEvent::QueueAdvanced { chat_id, .. }
            | SessionEvent::QueueItemFailed { chat_id, .. }
            | SessionEvent::PlaylistFinished { chat_id }
            | SessionEvent::Kicked { chat_id }
            | SessionEvent::Disconnected { chat_id }
            | SessionEvent::ReconnectAttempt { chat_id, .. }
            | SessionEvent::Reconnected { chat_id, .. }
            | SessionEvent::ReconnectGaveUp { chat_id, .. } => *chat_id,
        }
    }
}

/// Broadcast publisher for [`SessionEvent`]s
#[derive(Debug, Clone)]
pub struct SessionEventProcessor {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEventProcessor {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: SessionEvent) {
        tracing::trace!(?event, "publishing session event");
        // no receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let processor = SessionEventProcessor::new(4);
        processor.publish(SessionEvent::Left { chat_id: ChatId::new(1) });

        let mut rx = processor.subscribe();
        processor.publish(SessionEvent::Stopped { chat_id: ChatId::new(2) });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.chat_id(), ChatId::new(2));
    }
}
