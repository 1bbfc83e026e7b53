//! Playlist advancement on stream end

use std::sync::Arc;

use super::coordinator::{CallManager, OpGuard};
use super::registry::SessionEntry;
use crate::errors::SessionError;
use crate::manager::events::SessionEvent;
use crate::types::SessionPhase;

impl CallManager {
    /// Handle `StreamEnded`: play the next queued item, or settle in `Active`.
    ///
    /// Events arriving while the session is not `Playing` are stale and ignored.
    /// Items that fail to play are skipped; the loop never runs more times than
    /// there were items queued.
    pub(crate) async fn on_stream_ended(&self, entry: &Arc<SessionEntry>) {
        let chat_id = entry.chat_id;

        let generation = {
            let Some(_guard) = self.lock_live(entry).await else {
                return;
            };
            let (phase, generation) = entry.with_state(|s| (s.phase, s.generation));
            if phase != SessionPhase::Playing {
                tracing::debug!(%chat_id, ?phase, "ignoring stale stream end");
                return;
            }
            generation
        };

        let delay = self.inner.config.advance_delay();
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = entry.closed() => return,
            }
        }

        let Some(mut guard) = self.lock_live(entry).await else {
            return;
        };
        let current = entry.with_state(|s| s.phase == SessionPhase::Playing && s.generation == generation);
        if !current {
            tracing::debug!(%chat_id, "track changed during advance delay");
            return;
        }

        let queued = entry.with_state(|s| s.queue.len());
        for _ in 0..queued {
            let Some(item) = entry.with_state(|s| s.queue.pop_front()) else {
                break;
            };
            match self.play_locked(entry, &mut guard, &item.path, item.settings.clone()).await {
                Ok(()) => {
                    let remaining = entry.with_state(|s| s.queue.len());
                    tracing::info!(%chat_id, media = %item.path.display(), remaining, "advanced playlist");
                    self.publish(SessionEvent::QueueAdvanced {
                        chat_id,
                        media: item.path,
                        remaining,
                    });
                    return;
                }
                Err(SessionError::Cancelled) => return,
                Err(e) => {
                    tracing::warn!(%chat_id, media = %item.path.display(), error = %e, "skipping queued item");
                    self.publish(SessionEvent::QueueItemFailed {
                        chat_id,
                        media: item.path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.settle_active(entry, &mut guard).await;
        tracing::info!(%chat_id, "playlist finished");
        self.publish(SessionEvent::PlaylistFinished { chat_id });
    }

    /// Back to the placeholder with nothing loaded. Caller holds the op lock.
    pub(crate) async fn settle_active(&self, entry: &SessionEntry, guard: &mut OpGuard) {
        let (binding, derived) = entry.with_state(|s| {
            s.phase = SessionPhase::Active;
            (s.binding.clone(), s.clear_media())
        });
        if let Some(path) = derived {
            self.inner.scratch.remove(&path).await;
        }
        if let Some(binding) = binding {
            let placeholder = self.inner.config.placeholder_path.clone();
            if let Err(e) = guard.unlocked(self.switch_stream(&binding.handle, &placeholder)).await {
                tracing::warn!(chat_id = %entry.chat_id, error = %e, "could not switch to placeholder");
            }
        }
    }
}
