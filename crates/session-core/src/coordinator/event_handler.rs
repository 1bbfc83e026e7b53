//! Per-chat event lanes
//!
//! Each session gets one task draining its transport events in arrival order.
//! Lanes of different chats run independently. A lane ends when its session
//! closes, when the transport drops its sender, or when the manager is gone.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::coordinator::{CallManager, StatsCounters};
use super::registry::SessionEntry;
use crate::manager::events::SessionEvent;
use crate::transport::TransportEvent;
use crate::types::SessionPhase;

impl CallManager {
    pub(crate) fn spawn_lane(&self, entry: &Arc<SessionEntry>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        let weak = self.downgrade();
        let lane_entry = entry.clone();

        let handle = tokio::spawn(async move {
            let entry = lane_entry;
            tracing::debug!(chat_id = %entry.chat_id, "event lane started");
            loop {
                let event = tokio::select! {
                    biased;
                    _ = entry.closed() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                let Some(manager) = CallManager::from_weak(&weak) else {
                    break;
                };
                manager.handle_transport_event(&entry, event).await;
            }
            tracing::debug!(chat_id = %entry.chat_id, "event lane stopped");
        });

        entry.set_lane(handle);
    }

    async fn handle_transport_event(&self, entry: &Arc<SessionEntry>, event: TransportEvent) {
        if event.chat_id() != entry.chat_id {
            tracing::warn!(
                chat_id = %entry.chat_id,
                event_chat = %event.chat_id(),
                "dropping transport event for another chat"
            );
            return;
        }

        tracing::debug!(chat_id = %entry.chat_id, ?event, "transport event");
        match event {
            TransportEvent::StreamEnded { .. } => self.on_stream_ended(entry).await,
            TransportEvent::Kicked { .. } => self.on_kicked(entry).await,
        }
    }

    /// Local teardown after a kick, then hand over to the supervisor.
    /// The transport is not asked to leave; the binding is just dropped.
    async fn on_kicked(&self, entry: &Arc<SessionEntry>) {
        let chat_id = entry.chat_id;
        StatsCounters::bump(&self.inner.stats.kicks);
        tracing::warn!(%chat_id, "kicked from call");

        entry.close();
        let guard = self.lock(entry).await;
        if !self.inner.registry.remove_entry(entry).await {
            return;
        }

        let (account, derived) = entry.with_state(|s| {
            s.phase = SessionPhase::Disconnected;
            s.binding = None;
            (s.account.clone(), s.clear_media())
        });
        if let Some(path) = derived {
            self.inner.scratch.remove(&path).await;
        }
        drop(guard);

        self.publish(SessionEvent::Kicked { chat_id });
        self.publish(SessionEvent::Disconnected { chat_id });

        if self.is_shutting_down() {
            return;
        }
        self.spawn_supervisor(chat_id, account);
    }
}
