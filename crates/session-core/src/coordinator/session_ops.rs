//! Join and leave

use std::sync::Arc;

use callcast_infra_common::LogContext;
use tokio::sync::mpsc;
use tracing::{Instrument, Level};

use super::coordinator::{CallManager, OpGuard, StatsCounters};
use super::registry::SessionEntry;
use crate::errors::{SessionError, SessionResult};
use crate::manager::events::SessionEvent;
use crate::session::CallSession;
use crate::transport::{CallAccount, TransportBinding};
use crate::types::{ChatId, JoinOutcome, SessionPhase};

/// Who asked for a join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JoinOrigin {
    User,
    Supervisor,
}

impl CallManager {
    /// Join the call in `chat_id` using `account`.
    ///
    /// On success the session is `Active` and streaming the placeholder. Joining a
    /// chat that already has a session returns [`JoinOutcome::AlreadyJoined`]
    /// without opening a second transport. An explicit join supersedes any
    /// reconnection in progress for the chat.
    pub async fn join(&self, chat_id: ChatId, account: Arc<dyn CallAccount>) -> SessionResult<JoinOutcome> {
        if self.inner.supervisors.cancel(chat_id) {
            self.inner.reconnect_attempts.remove(&chat_id);
            tracing::info!(%chat_id, "explicit join cancels pending reconnection");
        }
        self.join_inner(chat_id, account, JoinOrigin::User).await
    }

    pub(crate) async fn join_inner(
        &self,
        chat_id: ChatId,
        account: Arc<dyn CallAccount>,
        origin: JoinOrigin,
    ) -> SessionResult<JoinOutcome> {
        let span = LogContext::with_operation("session-core", "join")
            .with_field("chat_id", chat_id.to_string())
            .with_field("account", account.account_id())
            .span(Level::INFO);

        async move {
            if self.is_shutting_down() {
                return Err(SessionError::Cancelled);
            }
            loop {
                if let Some(existing) = self.inner.registry.get(chat_id).await {
                    // wait out an in-flight join before answering
                    let mut guard = self.lock(&existing).await;
                    if !existing.is_closed() && self.inner.registry.is_current(&existing).await {
                        if existing.phase() == SessionPhase::Joining {
                            // a join that held the lock would have settled the phase
                            self.discard_abandoned(&existing, &mut guard).await;
                            continue;
                        }
                        tracing::debug!(phase = ?existing.phase(), "already in call");
                        return Ok(JoinOutcome::AlreadyJoined);
                    }
                    continue;
                }

                let session = CallSession::new(chat_id, account.clone(), self.inner.config.volume.default_percent);
                let entry = Arc::new(SessionEntry::new(session));
                let guard = self.lock(&entry).await;
                if !self.inner.registry.insert_if_absent(entry.clone()).await {
                    continue;
                }
                return self.join_registered(entry, guard, account.clone(), origin).await;
            }
        }
        .instrument(span)
        .await
    }

    async fn join_registered(
        &self,
        entry: Arc<SessionEntry>,
        mut guard: OpGuard,
        account: Arc<dyn CallAccount>,
        origin: JoinOrigin,
    ) -> SessionResult<JoinOutcome> {
        let chat_id = entry.chat_id;
        let stats = &self.inner.stats;
        StatsCounters::bump(&stats.joins_attempted);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let timeout = self.inner.config.join_timeout();
        let placeholder = self.inner.config.placeholder_path.clone();

        let attempt = async {
            let binding = account
                .connect(chat_id, events_tx)
                .await
                .map_err(|e| SessionError::join_failed(chat_id, e))?;
            // stash it first so a failed join can still be left
            entry.with_state(|s| s.binding = Some(binding.clone()));
            binding
                .handle
                .join()
                .await
                .map_err(|e| SessionError::join_failed(chat_id, e))?;
            binding
                .handle
                .switch_stream(&placeholder)
                .await
                .map_err(|e| SessionError::join_failed(chat_id, e))?;
            Ok::<TransportBinding, SessionError>(binding)
        };

        let bounded = async {
            tokio::select! {
                result = tokio::time::timeout(timeout, attempt) => match result {
                    Ok(result) => result,
                    Err(_) => Err(SessionError::JoinTimeout {
                        chat_id,
                        timeout_ms: self.inner.config.join_timeout_ms,
                    }),
                },
                _ = entry.closed() => Err(SessionError::Cancelled),
            }
        };
        let result = guard.unlocked(bounded).await;

        match result {
            Ok(binding) => {
                entry.with_state(|s| s.phase = SessionPhase::Active);
                self.inner.reconnect_attempts.remove(&chat_id);
                self.spawn_lane(&entry, events_rx);
                StatsCounters::bump(&stats.joins_succeeded);
                tracing::info!(
                    supports_pause = binding.supports_pause(),
                    ?origin,
                    "joined call"
                );
                self.publish(SessionEvent::Joined {
                    chat_id,
                    account_id: account.account_id(),
                });
                Ok(JoinOutcome::Joined)
            }
            Err(e) => {
                tracing::warn!(error = %e, "join failed, cleaning up");
                entry.close();
                self.inner.registry.remove_entry(&entry).await;
                let binding = entry.with_state(|s| {
                    s.phase = SessionPhase::Leaving;
                    s.binding.take()
                });
                if let Some(binding) = binding {
                    guard.unlocked(self.leave_transport(chat_id, &binding)).await;
                }
                StatsCounters::bump(&stats.joins_failed);
                self.publish(SessionEvent::JoinFailed {
                    chat_id,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Leave the call in `chat_id`.
    ///
    /// Cancels any in-flight transform for the chat, removes the session and
    /// deletes its derived files. Leaving a chat with no session fails with
    /// `NotInCall`, unless a reconnection was pending, in which case the
    /// reconnection is cancelled instead.
    pub async fn leave(&self, chat_id: ChatId) -> SessionResult<()> {
        let span = LogContext::with_operation("session-core", "leave")
            .with_field("chat_id", chat_id.to_string())
            .span(Level::INFO);

        async move {
            let had_reconnect = self.inner.supervisors.cancel(chat_id);
            if had_reconnect {
                self.inner.reconnect_attempts.remove(&chat_id);
                tracing::info!("cancelled pending reconnection");
            }
            let Some(entry) = self.inner.registry.get(chat_id).await else {
                if had_reconnect {
                    return Ok(());
                }
                return Err(SessionError::NotInCall(chat_id));
            };

            // an in-flight join or transform sees this and backs out
            entry.close();
            let mut guard = self.lock(&entry).await;
            if !self.inner.registry.remove_entry(&entry).await {
                // torn down by a concurrent operation while we waited
                return Ok(());
            }

            let (binding, derived) = entry.with_state(|s| {
                s.phase = SessionPhase::Leaving;
                (s.binding.take(), s.clear_media())
            });
            if let Some(binding) = binding {
                guard.unlocked(self.leave_transport(chat_id, &binding)).await;
            }
            if let Some(path) = derived {
                self.inner.scratch.remove(&path).await;
            }
            self.inner.reconnect_attempts.remove(&chat_id);
            entry.abort_lane();

            tracing::info!("left call");
            self.publish(SessionEvent::Left { chat_id });
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Tear down a session left in `Joining` by a join whose future was dropped
    /// before it could settle or clean up. Caller holds the entry's op lock.
    async fn discard_abandoned(&self, entry: &Arc<SessionEntry>, guard: &mut OpGuard) {
        let chat_id = entry.chat_id;
        tracing::warn!(%chat_id, "discarding abandoned join");
        entry.close();
        if !self.inner.registry.remove_entry(entry).await {
            return;
        }
        let binding = entry.with_state(|s| {
            s.phase = SessionPhase::Leaving;
            s.binding.take()
        });
        if let Some(binding) = binding {
            guard.unlocked(self.leave_transport(chat_id, &binding)).await;
        }
        entry.abort_lane();
    }

    /// Best-effort transport leave, bounded by the leave timeout
    pub(crate) async fn leave_transport(&self, chat_id: ChatId, binding: &TransportBinding) {
        let timeout = self.inner.config.leave_timeout();
        match tokio::time::timeout(timeout, binding.handle.leave()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(%chat_id, error = %e, "transport leave failed"),
            Err(_) => tracing::warn!(%chat_id, timeout_ms = timeout.as_millis() as u64, "transport leave timed out"),
        }
    }

    /// Whether the chat currently has a session
    pub async fn is_in_call(&self, chat_id: ChatId) -> bool {
        self.inner.registry.contains(chat_id).await
    }
}
