// Status views, scratch maintenance, lock modes and the bool control surface

mod common;

use std::sync::Arc;
use std::time::Duration;

use callcast_infra_common::ConfigLayers;
use callcast_session_core::{
    CallAccount, ManagerStatus, SessionError, SessionManagerConfig, SessionPhase,
    VoiceChatControl, VoiceSettings,
};
use common::*;
use serial_test::serial;

#[tokio::test]
async fn test_status_reports_sessions_and_queues() {
    let h = Harness::new().await;
    let account = MockAccount::new();
    let track = h.media("track.mp3").await;
    h.manager.join(CHAT, account.clone()).await.unwrap();
    h.manager.join(OTHER_CHAT, account.clone()).await.unwrap();
    h.manager.enqueue(CHAT, &track, VoiceSettings::default()).await.unwrap();
    h.manager.enqueue(CHAT, &track, VoiceSettings::default()).await.unwrap();

    let status = h.manager.status().await;
    assert_eq!(status.active_count, 2);
    assert_eq!(status.total_queued, 1);
    assert_eq!(status.queue_depths.get(&CHAT), Some(&1));
    assert_eq!(status.queue_depths.get(&OTHER_CHAT), Some(&0));
    // sorted by chat id
    assert_eq!(status.sessions[0].chat_id, CHAT);
    assert_eq!(status.counters.joins_succeeded, 2);
    assert!(status.pending_reconnects.is_empty());
    assert_eq!(status.tracked_supervisors, 0);
    assert_eq!(status.registry.total_registered, 2);
    assert_eq!(status.registry.total_removed, 0);

    let json = serde_json::to_string(&status).unwrap();
    assert!(json.contains("\"-1001\":1"));
    let back: ManagerStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(back, status);
}

#[tokio::test]
async fn test_sweep_keeps_live_outputs() {
    let h = Harness::new().await;
    let account = MockAccount::new();
    let track = h.media("track.mp3").await;
    h.manager.join(CHAT, account.clone()).await.unwrap();
    h.manager.play(CHAT, &track, VoiceSettings::default()).await.unwrap();
    let live = account.handle(CHAT).last_stream().unwrap();

    let orphan = h.scratch_dir().join("-5-play-deadbeef.mp3");
    tokio::fs::write(&orphan, b"left behind").await.unwrap();
    let unrelated = h.scratch_dir().join("notes.txt");
    tokio::fs::write(&unrelated, b"keep me").await.unwrap();

    assert_eq!(h.manager.sweep_scratch().await.unwrap(), 1);
    assert!(!orphan.exists());
    assert!(live.exists());
    assert!(unrelated.exists());
}

#[tokio::test]
async fn test_chats_run_independently_by_default() {
    let h = Harness::new().await;
    let account = MockAccount::new();
    let track = h.media("track.mp3").await;
    h.manager.join(CHAT, account.clone()).await.unwrap();
    h.manager.join(OTHER_CHAT, account.clone()).await.unwrap();

    h.converter.hold(true);
    let manager = h.manager.clone();
    let slow = tokio::spawn(async move { manager.play(CHAT, &track, VoiceSettings::default()).await });
    h.converter.started.notified().await;

    // a different chat is not held up by the transform
    let other = tokio::time::timeout(Duration::from_millis(200), h.manager.stop(OTHER_CHAT))
        .await
        .expect("other chat blocked");
    assert_eq!(other.unwrap_err(), SessionError::NoActiveStream(OTHER_CHAT));
    // and status never waits on operation locks
    let status = tokio::time::timeout(Duration::from_millis(200), h.manager.status())
        .await
        .expect("status blocked");
    assert_eq!(status.active_count, 2);

    h.converter.release();
    slow.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_serialize_all_chats_releases_lock_during_transform() {
    let h = Harness::with_config(|c| c.with_serialize_all_chats(true)).await;
    let account = MockAccount::new();
    let track = h.media("track.mp3").await;
    h.manager.join(CHAT, account.clone()).await.unwrap();

    h.converter.hold(true);
    let manager = h.manager.clone();
    let slow = tokio::spawn(async move { manager.play(CHAT, &track, VoiceSettings::default()).await });
    h.converter.started.notified().await;

    // another chat joins and is controlled while the converter runs
    let joined = tokio::time::timeout(Duration::from_millis(500), h.manager.join(OTHER_CHAT, account.clone()))
        .await
        .expect("join blocked by another chat's transform");
    joined.unwrap();
    let stopped = tokio::time::timeout(Duration::from_millis(500), h.manager.stop(OTHER_CHAT))
        .await
        .expect("stop blocked by another chat's transform");
    assert_eq!(stopped.unwrap_err(), SessionError::NoActiveStream(OTHER_CHAT));

    // the transforming chat itself stays ordered
    let same_chat = tokio::time::timeout(Duration::from_millis(100), h.manager.stop(CHAT)).await;
    assert!(same_chat.is_err(), "operation on the same chat ran concurrently");

    h.converter.release();
    slow.await.unwrap().unwrap();
    assert_eq!(h.manager.session(CHAT).await.unwrap().phase, SessionPhase::Playing);
    h.manager.stop(CHAT).await.unwrap();
}

#[tokio::test]
async fn test_bool_control_surface() {
    let h = Harness::new().await;
    let account: Arc<dyn CallAccount> = MockAccount::new();
    let track = h.media("track.mp3").await;
    let missing = h.dir.path().join("missing.mp3");
    let control: &dyn VoiceChatControl = &h.manager;

    assert!(!control.leave(CHAT).await);
    assert!(control.join(CHAT, account.clone()).await);
    assert!(control.join(CHAT, account.clone()).await);
    assert!(!control.play(CHAT, &missing, VoiceSettings::default()).await);
    assert!(control.play(CHAT, &track, VoiceSettings::default()).await);
    assert!(control.enqueue(CHAT, &track, VoiceSettings::default()).await);
    assert!(control.set_volume(CHAT, 150).await);
    assert!(control.pause(CHAT).await);
    assert!(!control.set_volume(CHAT, 150).await);
    assert!(control.resume(CHAT).await);
    assert!(control.stop(CHAT).await);
    assert!(!control.stop(CHAT).await);
    assert!(control.leave(CHAT).await);
}

#[tokio::test]
#[serial]
async fn test_config_from_toml_and_env() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("callcast.toml");
    std::fs::write(
        &file,
        r#"
placeholder_path = "/srv/callcast/silence.mp3"
advance_delay_ms = 250

[reconnect]
max_attempts = 5
"#,
    )
    .unwrap();

    std::env::set_var("CCSESSION__MAX_QUEUE_LEN", "7");
    let layers = ConfigLayers::default()
        .with_required_file(&file)
        .with_env_prefix("CCSESSION");
    let config = SessionManagerConfig::load(&layers);
    std::env::remove_var("CCSESSION__MAX_QUEUE_LEN");
    let config = config.unwrap();

    assert_eq!(config.placeholder_path.to_str(), Some("/srv/callcast/silence.mp3"));
    assert_eq!(config.advance_delay(), Duration::from_millis(250));
    assert_eq!(config.max_queue_len, 7);
    assert_eq!(config.reconnect.max_attempts, 5);
    assert_eq!(config.reconnect.base_backoff_ms, 10_000);
    assert_eq!(config.join_timeout(), Duration::from_secs(30));
}
