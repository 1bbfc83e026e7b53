//! Core CallManager structure and initialization

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use callcast_audio_core::{LoudnessPipeline, VoiceSettings};
use callcast_media_core::{
    Converter, FfmpegConverter, MediaTransformer, ScratchDir, ScratchPurpose, TransformRequest,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

use super::registry::{SessionEntry, SessionRegistry};
use crate::clock::{Clock, SystemClock};
use crate::config::SessionManagerConfig;
use crate::errors::{SessionError, SessionResult};
use crate::manager::events::{SessionEvent, SessionEventProcessor};
use crate::transport::{TransportError, TransportHandle};
use crate::types::ChatId;

/// Monotonic counters, for observability only
#[derive(Debug, Default)]
pub struct StatsCounters {
    pub joins_attempted: AtomicU64,
    pub joins_succeeded: AtomicU64,
    pub joins_failed: AtomicU64,
    pub media_played: AtomicU64,
    pub transform_failures: AtomicU64,
    pub reconnect_attempts: AtomicU64,
    pub reconnects_succeeded: AtomicU64,
    pub reconnects_exhausted: AtomicU64,
    pub kicks: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            joins_attempted: load(&self.joins_attempted),
            joins_succeeded: load(&self.joins_succeeded),
            joins_failed: load(&self.joins_failed),
            media_played: load(&self.media_played),
            transform_failures: load(&self.transform_failures),
            reconnect_attempts: load(&self.reconnect_attempts),
            reconnects_succeeded: load(&self.reconnects_succeeded),
            reconnects_exhausted: load(&self.reconnects_exhausted),
            kicks: load(&self.kicks),
        }
    }
}

/// Point-in-time copy of [`StatsCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub joins_attempted: u64,
    pub joins_succeeded: u64,
    pub joins_failed: u64,
    pub media_played: u64,
    pub transform_failures: u64,
    pub reconnect_attempts: u64,
    pub reconnects_succeeded: u64,
    pub reconnects_exhausted: u64,
    pub kicks: u64,
}

/// One running reconnection supervisor
#[derive(Debug)]
struct Supervisor {
    id: u64,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Reconnection supervisor tasks, one per chat.
///
/// Cancellation is cooperative: a supervisor only observes it between
/// attempts, so a rejoin already in flight always finishes or cleans up
/// through the normal join path. Supervisors drop their own entry on exit.
#[derive(Debug, Default)]
pub(crate) struct SupervisorSet {
    tasks: DashMap<ChatId, Supervisor>,
    next_id: AtomicU64,
}

impl SupervisorSet {
    /// Start `task` for `chat_id`, superseding any supervisor already there.
    /// The task receives its id and a cancellation flag.
    pub(crate) fn spawn<F, Fut>(&self, chat_id: ChatId, task: F)
    where
        F: FnOnce(u64, watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (cancel, cancelled) = watch::channel(false);
        // the shard stays locked until the entry is in place, so a task that
        // exits immediately cannot miss its own entry
        match self.tasks.entry(chat_id) {
            Entry::Occupied(mut slot) => {
                let handle = tokio::spawn(task(id, cancelled));
                let old = slot.insert(Supervisor { id, cancel, handle });
                old.cancel.send_replace(true);
            }
            Entry::Vacant(slot) => {
                let handle = tokio::spawn(task(id, cancelled));
                slot.insert(Supervisor { id, cancel, handle });
            }
        }
    }

    /// Called by a supervisor as it exits
    pub(crate) fn finished(&self, chat_id: ChatId, id: u64) {
        self.tasks.remove_if(&chat_id, |_, s| s.id == id);
    }

    /// Ask a pending supervisor to stop. Returns whether one was still running.
    pub(crate) fn cancel(&self, chat_id: ChatId) -> bool {
        match self.tasks.remove(&chat_id) {
            Some((_, supervisor)) => {
                supervisor.cancel.send_replace(true);
                !supervisor.handle.is_finished()
            }
            None => false,
        }
    }

    pub(crate) fn is_pending(&self, chat_id: ChatId) -> bool {
        self.tasks
            .get(&chat_id)
            .map(|s| !s.handle.is_finished())
            .unwrap_or(false)
    }

    pub(crate) fn pending(&self) -> Vec<ChatId> {
        self.tasks
            .iter()
            .filter(|e| !e.value().handle.is_finished())
            .map(|e| *e.key())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel every supervisor and hand back their tasks to await
    pub(crate) fn cancel_all(&self) -> Vec<JoinHandle<()>> {
        let chats: Vec<ChatId> = self.tasks.iter().map(|e| *e.key()).collect();
        chats
            .into_iter()
            .filter_map(|chat_id| self.tasks.remove(&chat_id))
            .map(|(_, supervisor)| {
                supervisor.cancel.send_replace(true);
                supervisor.handle
            })
            .collect()
    }
}

pub(crate) struct ManagerInner {
    pub(crate) config: SessionManagerConfig,
    pub(crate) registry: SessionRegistry,
    pub(crate) transformer: MediaTransformer,
    pub(crate) pipeline: LoudnessPipeline,
    pub(crate) scratch: ScratchDir,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) events: SessionEventProcessor,
    pub(crate) stats: StatsCounters,
    pub(crate) reconnect_attempts: DashMap<ChatId, u32>,
    pub(crate) supervisors: SupervisorSet,
    global_lock: Option<Arc<Mutex<()>>>,
    pub(crate) shutting_down: AtomicBool,
}

/// Manager-wide lock of the `serialize_all_chats` mode
struct GlobalHold {
    lock: Arc<Mutex<()>>,
    held: Option<OwnedMutexGuard<()>>,
}

/// Held for the duration of one operation on one chat.
///
/// In `serialize_all_chats` mode it also holds the manager-wide lock, except
/// inside [`OpGuard::unlocked`] sections where converter and transport work runs.
pub(crate) struct OpGuard {
    global: Option<GlobalHold>,
    _session: OwnedMutexGuard<()>,
}

impl OpGuard {
    /// Run `work` with the manager-wide lock released, re-taking it before
    /// returning so the caller can commit. The chat's own lock stays held.
    pub(crate) async fn unlocked<F: Future>(&mut self, work: F) -> F::Output {
        if let Some(global) = &mut self.global {
            global.held = None;
        }
        let output = work.await;
        if let Some(global) = &mut self.global {
            global.held = Some(global.lock.clone().lock_owned().await);
        }
        output
    }
}

/// The call session orchestrator.
///
/// Cheap to clone; all clones share the same sessions. Background tasks (event
/// lanes, reconnection supervisors) only hold weak references, so dropping the
/// last `CallManager` lets them wind down.
#[derive(Clone)]
pub struct CallManager {
    pub(crate) inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for CallManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallManager")
            .field("scratch", &self.inner.scratch.root())
            .field("serialize_all_chats", &self.inner.global_lock.is_some())
            .finish()
    }
}

/// Builder for [`CallManager`]
pub struct CallManagerBuilder {
    config: SessionManagerConfig,
    converter: Option<Arc<dyn Converter>>,
    clock: Arc<dyn Clock>,
}

impl CallManagerBuilder {
    pub fn new(config: SessionManagerConfig) -> Self {
        Self {
            config,
            converter: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the configuration, prepare the scratch directory and start.
    ///
    /// Without an explicit converter, an ffmpeg binary is discovered from the
    /// configured path, `PATH` and common install locations.
    pub async fn build(self) -> SessionResult<CallManager> {
        self.config.validate()?;

        let converter: Arc<dyn Converter> = match self.converter {
            Some(converter) => converter,
            None => Arc::new(
                FfmpegConverter::discover(self.config.transformer.converter_path.as_deref()).await?,
            ),
        };

        let pipeline = LoudnessPipeline::new(self.config.volume.clone(), self.config.chain.clone())?;
        let scratch = ScratchDir::new(&self.config.transformer.scratch_dir);
        scratch
            .ensure()
            .await
            .map_err(|e| SessionError::configuration(format!("scratch dir {}: {}", scratch.root().display(), e)))?;

        let transformer = MediaTransformer::from_config(converter, &self.config.transformer);
        let events = SessionEventProcessor::new(self.config.event_channel_capacity);
        let global_lock = self
            .config
            .serialize_all_chats
            .then(|| Arc::new(Mutex::new(())));

        tracing::info!(
            scratch = %scratch.root().display(),
            max_transforms = transformer.max_concurrent(),
            serialize_all_chats = self.config.serialize_all_chats,
            "call manager started"
        );

        Ok(CallManager {
            inner: Arc::new(ManagerInner {
                config: self.config,
                registry: SessionRegistry::new(),
                transformer,
                pipeline,
                scratch,
                clock: self.clock,
                events,
                stats: StatsCounters::default(),
                reconnect_attempts: DashMap::new(),
                supervisors: SupervisorSet::default(),
                global_lock,
                shutting_down: AtomicBool::new(false),
            }),
        })
    }
}

impl CallManager {
    pub fn builder(config: SessionManagerConfig) -> CallManagerBuilder {
        CallManagerBuilder::new(config)
    }

    /// Start with an explicit converter and the system clock
    pub async fn new(config: SessionManagerConfig, converter: Arc<dyn Converter>) -> SessionResult<Self> {
        Self::builder(config).with_converter(converter).build().await
    }

    pub(crate) fn from_weak(weak: &Weak<ManagerInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub(crate) fn downgrade(&self) -> Weak<ManagerInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn config(&self) -> &SessionManagerConfig {
        &self.inner.config
    }

    pub fn placeholder(&self) -> &Path {
        &self.inner.config.placeholder_path
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    pub(crate) fn publish(&self, event: SessionEvent) {
        self.inner.events.publish(event);
    }

    /// Take the session's operation lock and then the global lock, if enabled.
    ///
    /// The global lock is never held while waiting for a session lock.
    pub(crate) async fn lock(&self, entry: &SessionEntry) -> OpGuard {
        let session = entry.lock_op().await;
        let global = match &self.inner.global_lock {
            Some(lock) => Some(GlobalHold {
                lock: lock.clone(),
                held: Some(lock.clone().lock_owned().await),
            }),
            None => None,
        };
        OpGuard {
            global,
            _session: session,
        }
    }

    /// Lock a session that is still registered and not closing
    pub(crate) async fn lock_live(&self, entry: &Arc<SessionEntry>) -> Option<OpGuard> {
        let guard = self.lock(entry).await;
        if entry.is_closed() || !self.inner.registry.is_current(entry).await {
            return None;
        }
        Some(guard)
    }

    /// Look up and lock the live session for a chat
    pub(crate) async fn live_session(&self, chat_id: ChatId) -> SessionResult<(Arc<SessionEntry>, OpGuard)> {
        let entry = self
            .inner
            .registry
            .get(chat_id)
            .await
            .ok_or(SessionError::NotInCall(chat_id))?;
        let guard = self
            .lock_live(&entry)
            .await
            .ok_or(SessionError::NotInCall(chat_id))?;
        Ok((entry, guard))
    }

    /// Render `input` through the chain for `settings` into a fresh derived file.
    /// Aborts with `Cancelled` when the session closes mid-transform.
    pub(crate) async fn render(
        &self,
        entry: &SessionEntry,
        input: &Path,
        settings: &VoiceSettings,
        seek_secs: f64,
        purpose: ScratchPurpose,
    ) -> SessionResult<PathBuf> {
        let chain = self.inner.pipeline.chain_for(settings);
        let output = self.inner.scratch.output_path(entry.chat_id, purpose);
        let request = TransformRequest::new(input, chain, output)
            .with_seek(seek_secs)
            .with_bitrate(settings.bitrate());

        let result = tokio::select! {
            result = self.inner.transformer.transform(request) => result.map_err(SessionError::from),
            _ = entry.closed() => Err(SessionError::Cancelled),
        };

        if let Err(e) = &result {
            if matches!(e, SessionError::TransformFailed(_)) {
                StatsCounters::bump(&self.inner.stats.transform_failures);
            }
            tracing::warn!(chat_id = %entry.chat_id, input = %input.display(), error = %e, "render failed");
        }
        result
    }

    /// Switch the streamed file, bounded by the transport timeout
    pub(crate) async fn switch_stream(&self, handle: &Arc<dyn TransportHandle>, path: &Path) -> SessionResult<()> {
        let timeout = self.inner.config.transport_timeout();
        match tokio::time::timeout(timeout, handle.switch_stream(path)).await {
            Ok(result) => result.map_err(SessionError::from),
            Err(_) => Err(TransportError::Timeout(format!("switch_stream to {}", path.display())).into()),
        }
    }

    /// Bound any transport call by the transport timeout
    pub(crate) async fn transport_call<F>(&self, what: &str, call: F) -> SessionResult<()>
    where
        F: std::future::Future<Output = crate::transport::TransportResult<()>>,
    {
        match tokio::time::timeout(self.inner.config.transport_timeout(), call).await {
            Ok(result) => result.map_err(SessionError::from),
            Err(_) => Err(TransportError::Timeout(what.to_string()).into()),
        }
    }

    /// Leave every chat, stop supervisors and refuse new transforms
    pub async fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("call manager shutting down");
        let supervisors = self.inner.supervisors.cancel_all();
        futures::future::join_all(supervisors).await;

        let chats = self.inner.registry.chat_ids().await;
        let leaves = chats.into_iter().map(|chat_id| {
            let manager = self.clone();
            async move {
                if let Err(e) = manager.leave(chat_id).await {
                    tracing::debug!(%chat_id, error = %e, "leave during shutdown");
                }
            }
        });
        futures::future::join_all(leaves).await;

        self.inner.reconnect_attempts.clear();
        self.inner.transformer.close();
        tracing::info!("call manager stopped");
    }
}
