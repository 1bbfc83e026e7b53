//! Reconnection supervisor
//!
//! After a kick, one task per chat retries the join with linear backoff
//! (`base_backoff * attempt`) until it succeeds or `max_attempts` is reached.
//! Attempt counts live on the manager because the session itself is gone while
//! reconnecting. An explicit leave, an explicit join or shutdown cancels the
//! task; it notices between attempts and never abandons a rejoin halfway.

use std::sync::{Arc, Weak};

use tokio::sync::watch;

use super::coordinator::{CallManager, ManagerInner, StatsCounters};
use super::session_ops::JoinOrigin;
use crate::config::RetryPolicy;
use crate::manager::events::SessionEvent;
use crate::transport::CallAccount;
use crate::types::{ChatId, JoinOutcome};

impl CallManager {
    pub(crate) fn spawn_supervisor(&self, chat_id: ChatId, account: Arc<dyn CallAccount>) {
        let weak = self.downgrade();
        let policy = self.inner.config.reconnect.clone();

        self.inner.supervisors.spawn(chat_id, move |id, cancelled| async move {
            supervise(&weak, chat_id, account, policy, cancelled).await;
            if let Some(manager) = CallManager::from_weak(&weak) {
                manager.inner.supervisors.finished(chat_id, id);
            }
        });
    }

    /// Reconnection attempts made so far for a chat
    pub fn reconnect_attempts(&self, chat_id: ChatId) -> u32 {
        self.inner
            .reconnect_attempts
            .get(&chat_id)
            .map(|n| *n)
            .unwrap_or(0)
    }

    /// Whether a supervisor is still trying to rejoin the chat
    pub fn is_reconnecting(&self, chat_id: ChatId) -> bool {
        self.inner.supervisors.is_pending(chat_id)
    }
}

async fn supervise(
    weak: &Weak<ManagerInner>,
    chat_id: ChatId,
    account: Arc<dyn CallAccount>,
    policy: RetryPolicy,
    mut cancelled: watch::Receiver<bool>,
) {
    loop {
        let is_cancelled = *cancelled.borrow();
        if is_cancelled {
            tracing::debug!(%chat_id, "reconnection cancelled");
            return;
        }
        let attempt = {
            let Some(manager) = CallManager::from_weak(weak) else {
                return;
            };
            let inner = &manager.inner;
            let attempt = {
                let mut attempts = inner.reconnect_attempts.entry(chat_id).or_insert(0);
                if *attempts >= policy.max_attempts {
                    None
                } else {
                    *attempts += 1;
                    Some(*attempts)
                }
            };

            match attempt {
                Some(attempt) => {
                    StatsCounters::bump(&inner.stats.reconnect_attempts);
                    manager.publish(SessionEvent::ReconnectAttempt {
                        chat_id,
                        attempt,
                        max_attempts: policy.max_attempts,
                    });
                    attempt
                }
                None => {
                    let attempts = inner
                        .reconnect_attempts
                        .remove(&chat_id)
                        .map(|(_, n)| n)
                        .unwrap_or(policy.max_attempts);
                    StatsCounters::bump(&inner.stats.reconnects_exhausted);
                    tracing::error!(%chat_id, attempts, "giving up on reconnection");
                    manager.publish(SessionEvent::ReconnectGaveUp { chat_id, attempts });
                    return;
                }
            }
        };

        let backoff = policy.backoff_for(attempt);
        tracing::info!(%chat_id, attempt, backoff_ms = backoff.as_millis() as u64, "reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = cancellation(&mut cancelled) => {
                tracing::debug!(%chat_id, attempt, "reconnection cancelled during backoff");
                return;
            }
        }

        let Some(manager) = CallManager::from_weak(weak) else {
            return;
        };
        if manager.is_shutting_down() {
            return;
        }
        match manager.join_inner(chat_id, account.clone(), JoinOrigin::Supervisor).await {
            Ok(outcome) => {
                if outcome == JoinOutcome::AlreadyJoined {
                    tracing::debug!(%chat_id, "chat rejoined elsewhere");
                }
                manager.inner.reconnect_attempts.remove(&chat_id);
                StatsCounters::bump(&manager.inner.stats.reconnects_succeeded);
                tracing::info!(%chat_id, attempt, "reconnected");
                manager.publish(SessionEvent::Reconnected { chat_id, attempts: attempt });
                return;
            }
            Err(e) => {
                tracing::warn!(%chat_id, attempt, error = %e, "reconnection attempt failed");
            }
        }
    }
}

/// Resolves once the supervisor is cancelled or its set is gone
async fn cancellation(cancelled: &mut watch::Receiver<bool>) {
    let _ = cancelled.wait_for(|c| *c).await;
}
