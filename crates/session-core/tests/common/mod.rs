// Shared fixtures for session-core integration tests
//
// A scripted account/transport pair and a converter that writes its output
// file without invoking ffmpeg.

#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callcast_media_core::{Converter, ConverterOutput};
use callcast_session_core::{
    CallAccount, CallManager, ChatId, ManualClock, Pauseable, RetryPolicy, SessionEvent,
    SessionManagerConfig, TransportBinding, TransportError, TransportEvent, TransportEventSender,
    TransportHandle, TransportResult,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};

pub const CHAT: ChatId = ChatId::new(-1001);
pub const OTHER_CHAT: ChatId = ChatId::new(-1002);

/// Transport for one chat; records what it was asked to do
#[derive(Debug)]
pub struct MockHandle {
    pub chat_id: ChatId,
    events: TransportEventSender,
    join_delay: Option<Duration>,
    fail_join: bool,
    fail_switch: AtomicBool,
    pub streams: Mutex<Vec<PathBuf>>,
    pub joins: AtomicUsize,
    pub leaves: AtomicUsize,
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
}

impl MockHandle {
    pub fn end_stream(&self) {
        let _ = self.events.send(TransportEvent::StreamEnded { chat_id: self.chat_id });
    }

    pub fn kick(&self) {
        let _ = self.events.send(TransportEvent::Kicked { chat_id: self.chat_id });
    }

    pub fn last_stream(&self) -> Option<PathBuf> {
        self.streams.lock().last().cloned()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }

    pub fn fail_switches(&self, fail: bool) {
        self.fail_switch.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransportHandle for MockHandle {
    async fn join(&self) -> TransportResult<()> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.join_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_join {
            return Err(TransportError::Join("no active group call".into()));
        }
        Ok(())
    }

    async fn leave(&self) -> TransportResult<()> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn switch_stream(&self, path: &Path) -> TransportResult<()> {
        if self.fail_switch.load(Ordering::SeqCst) {
            return Err(TransportError::Stream("stream rejected".into()));
        }
        self.streams.lock().push(path.to_path_buf());
        Ok(())
    }
}

#[async_trait]
impl Pauseable for MockHandle {
    async fn pause(&self) -> TransportResult<()> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> TransportResult<()> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Account handing out [`MockHandle`]s
#[derive(Debug, Default)]
pub struct MockAccount {
    pub native_pause: bool,
    pub fail_connect: AtomicBool,
    pub fail_join: AtomicBool,
    pub join_delay: Mutex<Option<Duration>>,
    pub connects: AtomicUsize,
    handles: Mutex<Vec<Arc<MockHandle>>>,
}

impl MockAccount {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_native_pause() -> Arc<Self> {
        Arc::new(Self {
            native_pause: true,
            ..Self::default()
        })
    }

    pub fn set_join_delay(&self, delay: Duration) {
        *self.join_delay.lock() = Some(delay);
    }

    /// Most recent handle opened for `chat_id`
    pub fn handle(&self, chat_id: ChatId) -> Arc<MockHandle> {
        self.handles
            .lock()
            .iter()
            .rev()
            .find(|h| h.chat_id == chat_id)
            .cloned()
            .expect("no transport opened for chat")
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallAccount for MockAccount {
    fn account_id(&self) -> String {
        "assistant-1".to_string()
    }

    async fn connect(&self, chat_id: ChatId, events: TransportEventSender) -> TransportResult<TransportBinding> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("account offline".into()));
        }
        let handle = Arc::new(MockHandle {
            chat_id,
            events,
            join_delay: *self.join_delay.lock(),
            fail_join: self.fail_join.load(Ordering::SeqCst),
            fail_switch: AtomicBool::new(false),
            streams: Mutex::new(Vec::new()),
            joins: AtomicUsize::new(0),
            leaves: AtomicUsize::new(0),
            pauses: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
        });
        self.handles.lock().push(handle.clone());
        if self.native_pause {
            Ok(TransportBinding::pauseable(handle))
        } else {
            Ok(TransportBinding::new(handle))
        }
    }
}

/// Writes the output path (last argument) instead of running ffmpeg
#[derive(Debug, Default)]
pub struct MockConverter {
    pub calls: Mutex<Vec<Vec<String>>>,
    fail: AtomicBool,
    hold: AtomicBool,
    pub started: Notify,
    release: Notify,
}

impl MockConverter {
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Block conversions until [`MockConverter::release`]
    pub fn hold(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.release.notify_waiters();
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn last_args(&self) -> Vec<String> {
        self.calls.lock().last().cloned().unwrap_or_default()
    }

    /// Value following `flag` in the last invocation
    pub fn last_arg_after(&self, flag: &str) -> Option<String> {
        let args = self.last_args();
        args.windows(2).find(|w| w[0] == flag).map(|w| w[1].clone())
    }
}

#[async_trait]
impl Converter for MockConverter {
    async fn run(&self, args: &[String]) -> io::Result<ConverterOutput> {
        self.calls.lock().push(args.to_vec());
        let out = PathBuf::from(args.last().cloned().unwrap_or_default());
        tokio::fs::write(&out, b"partial").await?;
        if self.hold.load(Ordering::SeqCst) {
            let released = self.release.notified();
            self.started.notify_one();
            released.await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Ok(ConverterOutput::failure(1, "Invalid data found when processing input"));
        }
        tokio::fs::write(&out, b"ID3 rendered").await?;
        Ok(ConverterOutput::success())
    }
}

pub struct Harness {
    pub manager: CallManager,
    pub converter: Arc<MockConverter>,
    pub clock: Arc<ManualClock>,
    pub dir: tempfile::TempDir,
    pub placeholder: PathBuf,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(|c| c).await
    }

    pub async fn with_config(adjust: impl FnOnce(SessionManagerConfig) -> SessionManagerConfig) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let placeholder = dir.path().join("silence.mp3");
        tokio::fs::write(&placeholder, b"silence").await.expect("placeholder");

        let config = SessionManagerConfig::new(&placeholder)
            .with_scratch_dir(dir.path().join("scratch"))
            .with_advance_delay(Duration::ZERO)
            .with_join_timeout(Duration::from_secs(2))
            .with_reconnect(RetryPolicy {
                max_attempts: 3,
                base_backoff_ms: 10,
            });
        let config = adjust(config);

        let converter = Arc::new(MockConverter::default());
        let clock = Arc::new(ManualClock::new());
        let manager = CallManager::builder(config)
            .with_converter(converter.clone())
            .with_clock(clock.clone())
            .build()
            .await
            .expect("manager");

        Self {
            manager,
            converter,
            clock,
            dir,
            placeholder,
        }
    }

    /// Create a source file under the test directory
    pub async fn media(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        tokio::fs::write(&path, b"source audio").await.expect("media");
        path
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }

    /// Derived mp3 files currently in the scratch directory
    pub fn scratch_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.scratch_dir())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok().map(|e| e.path()))
                    .filter(|p| p.extension().map(|e| e == "mp3").unwrap_or(false))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Wait until an event matching `pred` arrives
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<SessionEvent>, pred: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Wait until every reconnection supervisor has exited and been dropped
pub async fn wait_for_supervisors(manager: &CallManager) {
    for _ in 0..400 {
        if manager.status().await.tracked_supervisors == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("reconnection supervisor still tracked");
}

/// Wait until `account` has opened `count` transports
pub async fn wait_for_connects(account: &MockAccount, count: usize) {
    for _ in 0..400 {
        if account.connect_count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {} connects, saw {}", count, account.connect_count());
}
