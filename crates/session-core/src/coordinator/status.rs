//! Read-only views and scratch maintenance

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::coordinator::{CallManager, StatsSnapshot};
use super::registry::RegistryStats;
use crate::errors::{SessionError, SessionResult};
use crate::session::SessionSummary;
use crate::types::ChatId;

/// Snapshot of the whole manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerStatus {
    pub active_count: usize,
    pub sessions: Vec<SessionSummary>,
    /// Queue length per chat, keyed by chat id
    pub queue_depths: BTreeMap<ChatId, usize>,
    pub total_queued: usize,
    /// Chats a supervisor is still trying to rejoin
    pub pending_reconnects: Vec<ChatId>,
    /// Supervisor tasks the manager still tracks, finished or not
    pub tracked_supervisors: usize,
    pub counters: StatsSnapshot,
    pub registry: RegistryStats,
}

impl CallManager {
    /// Summaries of every session. Never waits on an in-flight operation.
    pub async fn status(&self) -> ManagerStatus {
        let now = self.inner.clock.now();
        let mut sessions: Vec<SessionSummary> = self
            .inner
            .registry
            .entries()
            .await
            .iter()
            .map(|entry| entry.with_state(|s| s.summary(now)))
            .collect();
        sessions.sort_by_key(|s| s.chat_id);

        let queue_depths: BTreeMap<ChatId, usize> =
            sessions.iter().map(|s| (s.chat_id, s.queue_len)).collect();
        let total_queued = queue_depths.values().sum();
        let mut pending_reconnects = self.inner.supervisors.pending();
        pending_reconnects.sort();

        ManagerStatus {
            active_count: sessions.len(),
            sessions,
            queue_depths,
            total_queued,
            pending_reconnects,
            tracked_supervisors: self.inner.supervisors.len(),
            counters: self.stats(),
            registry: self.inner.registry.stats(),
        }
    }

    /// Summary of one chat's session
    pub async fn session(&self, chat_id: ChatId) -> SessionResult<SessionSummary> {
        let entry = self
            .inner
            .registry
            .get(chat_id)
            .await
            .ok_or(SessionError::NotInCall(chat_id))?;
        let now = self.inner.clock.now();
        Ok(entry.with_state(|s| s.summary(now)))
    }

    /// Current playback position in seconds, if a track is loaded
    pub async fn position(&self, chat_id: ChatId) -> SessionResult<f64> {
        let summary = self.session(chat_id).await?;
        match summary.current_media {
            Some(_) => Ok(summary.position_secs),
            None => Err(SessionError::NoActiveStream(chat_id)),
        }
    }

    /// Delete derived files that no live session owns. Returns how many were removed.
    ///
    /// Outputs of transforms still in flight are not owned yet; run this while
    /// idle or on a slow timer.
    pub async fn sweep_scratch(&self) -> SessionResult<usize> {
        let keep: HashSet<PathBuf> = self
            .inner
            .registry
            .entries()
            .await
            .iter()
            .filter_map(|entry| entry.with_state(|s| s.current_output.clone()))
            .collect();
        let removed = self
            .inner
            .scratch
            .sweep(&keep)
            .await
            .map_err(|e| SessionError::configuration(format!("scratch sweep failed: {}", e)))?;
        if removed > 0 {
            tracing::info!(removed, "swept orphaned derived files");
        }
        Ok(removed)
    }
}
