//! Session Registry
//!
//! Maps chat ids to live sessions. The registry lock is only held to look up,
//! insert or remove an entry; operations on a session serialize on that
//! session's own operation lock instead.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as StateMutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;

use crate::session::CallSession;
use crate::types::{ChatId, SessionPhase};

/// One registered session
#[derive(Debug)]
pub struct SessionEntry {
    pub chat_id: ChatId,
    /// Held for the whole duration of an operation on this chat
    op: Arc<Mutex<()>>,
    /// Short-lived lock for reading and committing state
    state: StateMutex<CallSession>,
    closing: watch::Sender<bool>,
    lane: StateMutex<Option<JoinHandle<()>>>,
}

impl SessionEntry {
    pub fn new(session: CallSession) -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            chat_id: session.chat_id,
            op: Arc::new(Mutex::new(())),
            state: StateMutex::new(session),
            closing,
            lane: StateMutex::new(None),
        }
    }

    pub async fn lock_op(&self) -> OwnedMutexGuard<()> {
        self.op.clone().lock_owned().await
    }

    /// Run `f` with the state locked. Never call across an `.await`.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut CallSession) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    /// Signal in-flight work on this session to stop
    pub fn close(&self) {
        self.closing.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closing.borrow()
    }

    /// Resolves once [`close`](Self::close) has been called
    pub async fn closed(&self) {
        let mut rx = self.closing.subscribe();
        loop {
            let closed = *rx.borrow_and_update();
            if closed {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn set_lane(&self, handle: JoinHandle<()>) {
        if let Some(old) = self.lane.lock().replace(handle) {
            old.abort();
        }
    }

    pub fn abort_lane(&self) {
        if let Some(handle) = self.lane.lock().take() {
            handle.abort();
        }
    }
}

/// Lifetime registration totals
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_registered: u64,
    pub total_removed: u64,
}

/// Chat id → session map
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ChatId, Arc<SessionEntry>>>,
    stats: StateMutex<RegistryStats>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, chat_id: ChatId) -> Option<Arc<SessionEntry>> {
        self.sessions.read().await.get(&chat_id).cloned()
    }

    pub async fn contains(&self, chat_id: ChatId) -> bool {
        self.sessions.read().await.contains_key(&chat_id)
    }

    /// Whether `entry` is still the registered session for its chat
    pub async fn is_current(&self, entry: &Arc<SessionEntry>) -> bool {
        self.sessions
            .read()
            .await
            .get(&entry.chat_id)
            .map(|current| Arc::ptr_eq(current, entry))
            .unwrap_or(false)
    }

    /// Insert unless the chat already has a session
    pub async fn insert_if_absent(&self, entry: Arc<SessionEntry>) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&entry.chat_id) {
            return false;
        }
        tracing::debug!(chat_id = %entry.chat_id, "registered session");
        sessions.insert(entry.chat_id, entry);
        self.stats.lock().total_registered += 1;
        true
    }

    /// Remove `entry` if it is still the registered session for its chat
    pub async fn remove_entry(&self, entry: &Arc<SessionEntry>) -> bool {
        let mut sessions = self.sessions.write().await;
        let matches = sessions
            .get(&entry.chat_id)
            .map(|current| Arc::ptr_eq(current, entry))
            .unwrap_or(false);
        if matches {
            sessions.remove(&entry.chat_id);
            self.stats.lock().total_removed += 1;
            tracing::debug!(chat_id = %entry.chat_id, "unregistered session");
        }
        matches
    }

    pub async fn entries(&self) -> Vec<Arc<SessionEntry>> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn chat_ids(&self) -> Vec<ChatId> {
        self.sessions.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub fn stats(&self) -> RegistryStats {
        *self.stats.lock()
    }
}
