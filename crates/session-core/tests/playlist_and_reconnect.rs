// Playlist advancement on stream end and rejoining after a kick

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use callcast_session_core::{
    EnqueueOutcome, JoinOutcome, RetryPolicy, SessionError, SessionEvent, SessionPhase,
    VoiceSettings,
};
use common::*;

#[tokio::test]
async fn test_playlist_plays_in_order() {
    let h = Harness::new().await;
    let account = MockAccount::new();
    let tracks = [
        h.media("one.mp3").await,
        h.media("two.mp3").await,
        h.media("three.mp3").await,
    ];
    let mut events = h.manager.subscribe();
    h.manager.join(CHAT, account.clone()).await.unwrap();

    assert_eq!(
        h.manager.enqueue(CHAT, &tracks[0], VoiceSettings::default()).await.unwrap(),
        EnqueueOutcome::Started
    );
    assert_eq!(
        h.manager.enqueue(CHAT, &tracks[1], VoiceSettings::default()).await.unwrap(),
        EnqueueOutcome::Queued { position: 1 }
    );
    assert_eq!(
        h.manager.enqueue(CHAT, &tracks[2], VoiceSettings::with_volume(80)).await.unwrap(),
        EnqueueOutcome::Queued { position: 2 }
    );
    assert_eq!(
        h.manager.session(CHAT).await.unwrap().queue,
        vec![tracks[1].clone(), tracks[2].clone()]
    );

    let handle = account.handle(CHAT);
    handle.end_stream();
    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::QueueAdvanced { .. })).await;
    assert_eq!(
        event,
        SessionEvent::QueueAdvanced { chat_id: CHAT, media: tracks[1].clone(), remaining: 1 }
    );

    handle.end_stream();
    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::QueueAdvanced { .. })).await;
    assert_eq!(
        event,
        SessionEvent::QueueAdvanced { chat_id: CHAT, media: tracks[2].clone(), remaining: 0 }
    );
    // queued items keep their own settings
    assert_eq!(h.manager.session(CHAT).await.unwrap().volume, 80);

    handle.end_stream();
    wait_for(&mut events, |e| matches!(e, SessionEvent::PlaylistFinished { .. })).await;

    let summary = h.manager.session(CHAT).await.unwrap();
    assert_eq!(summary.phase, SessionPhase::Active);
    assert_eq!(summary.queue_len, 0);
    assert!(summary.current_media.is_none());
    assert_eq!(summary.media_played, 3);
    assert_eq!(handle.last_stream(), Some(h.placeholder.clone()));
    assert!(h.scratch_files().is_empty());
}

#[tokio::test]
async fn test_failed_queue_item_is_skipped() {
    let h = Harness::new().await;
    let account = MockAccount::new();
    let first = h.media("first.mp3").await;
    let vanished = h.media("vanished.mp3").await;
    let last = h.media("last.mp3").await;
    let mut events = h.manager.subscribe();
    h.manager.join(CHAT, account.clone()).await.unwrap();

    h.manager.enqueue(CHAT, &first, VoiceSettings::default()).await.unwrap();
    h.manager.enqueue(CHAT, &vanished, VoiceSettings::default()).await.unwrap();
    h.manager.enqueue(CHAT, &last, VoiceSettings::default()).await.unwrap();
    tokio::fs::remove_file(&vanished).await.unwrap();

    account.handle(CHAT).end_stream();
    let failed = wait_for(&mut events, |e| matches!(e, SessionEvent::QueueItemFailed { .. })).await;
    match failed {
        SessionEvent::QueueItemFailed { media, .. } => assert_eq!(media, vanished),
        other => panic!("unexpected event {:?}", other),
    }
    let advanced = wait_for(&mut events, |e| matches!(e, SessionEvent::QueueAdvanced { .. })).await;
    assert_eq!(
        advanced,
        SessionEvent::QueueAdvanced { chat_id: CHAT, media: last.clone(), remaining: 0 }
    );
}

#[tokio::test]
async fn test_stream_end_while_paused_is_ignored() {
    let h = Harness::new().await;
    let account = MockAccount::new();
    let first = h.media("first.mp3").await;
    let second = h.media("second.mp3").await;
    h.manager.join(CHAT, account.clone()).await.unwrap();
    h.manager.enqueue(CHAT, &first, VoiceSettings::default()).await.unwrap();
    h.manager.enqueue(CHAT, &second, VoiceSettings::default()).await.unwrap();
    h.manager.pause(CHAT).await.unwrap();

    // the placeholder finishing must not advance the playlist
    account.handle(CHAT).end_stream();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let summary = h.manager.session(CHAT).await.unwrap();
    assert_eq!(summary.phase, SessionPhase::Paused);
    assert_eq!(summary.current_media.as_deref(), Some(first.as_path()));
    assert_eq!(summary.queue_len, 1);
}

#[tokio::test]
async fn test_track_change_during_advance_delay_wins() {
    let h = Harness::with_config(|c| c.with_advance_delay(Duration::from_millis(200))).await;
    let account = MockAccount::new();
    let first = h.media("first.mp3").await;
    let queued = h.media("queued.mp3").await;
    let replacement = h.media("replacement.mp3").await;
    h.manager.join(CHAT, account.clone()).await.unwrap();
    h.manager.enqueue(CHAT, &first, VoiceSettings::default()).await.unwrap();
    h.manager.enqueue(CHAT, &queued, VoiceSettings::default()).await.unwrap();

    account.handle(CHAT).end_stream();
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.manager.play(CHAT, &replacement, VoiceSettings::default()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let summary = h.manager.session(CHAT).await.unwrap();
    assert_eq!(summary.current_media.as_deref(), Some(replacement.as_path()));
    assert_eq!(summary.queue, vec![queued.clone()]);
}

#[tokio::test]
async fn test_queue_limit() {
    let h = Harness::with_config(|c| c.with_max_queue_len(2)).await;
    let account = MockAccount::new();
    let track = h.media("track.mp3").await;
    h.manager.join(CHAT, account.clone()).await.unwrap();

    h.manager.enqueue(CHAT, &track, VoiceSettings::default()).await.unwrap();
    h.manager.enqueue(CHAT, &track, VoiceSettings::default()).await.unwrap();
    h.manager.enqueue(CHAT, &track, VoiceSettings::default()).await.unwrap();
    let err = h
        .manager
        .enqueue(CHAT, &track, VoiceSettings::default())
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::QueueFull { chat_id: CHAT, limit: 2 });
}

#[tokio::test]
async fn test_kick_rejoins() {
    let h = Harness::new().await;
    let account = MockAccount::new();
    let track = h.media("track.mp3").await;
    let mut events = h.manager.subscribe();
    h.manager.join(CHAT, account.clone()).await.unwrap();
    h.manager.play(CHAT, &track, VoiceSettings::default()).await.unwrap();

    account.handle(CHAT).kick();
    wait_for(&mut events, |e| matches!(e, SessionEvent::Disconnected { .. })).await;
    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::Reconnected { .. })).await;
    assert_eq!(event, SessionEvent::Reconnected { chat_id: CHAT, attempts: 1 });

    assert!(h.manager.is_in_call(CHAT).await);
    assert_eq!(account.connect_count(), 2);
    let summary = h.manager.session(CHAT).await.unwrap();
    assert_eq!(summary.phase, SessionPhase::Active);
    assert!(summary.current_media.is_none());
    assert_eq!(account.handle(CHAT).last_stream(), Some(h.placeholder.clone()));
    assert_eq!(h.manager.reconnect_attempts(CHAT), 0);
    assert!(h.scratch_files().is_empty());

    let stats = h.manager.stats();
    assert_eq!(stats.kicks, 1);
    assert_eq!(stats.reconnects_succeeded, 1);
    wait_for_supervisors(&h.manager).await;
}

#[tokio::test]
async fn test_reconnect_gives_up_after_max_attempts() {
    let h = Harness::new().await;
    let account = MockAccount::new();
    let mut events = h.manager.subscribe();
    h.manager.join(CHAT, account.clone()).await.unwrap();

    account.fail_connect.store(true, Ordering::SeqCst);
    account.handle(CHAT).kick();

    for expected in 1..=3 {
        let event = wait_for(&mut events, |e| matches!(e, SessionEvent::ReconnectAttempt { .. })).await;
        assert_eq!(
            event,
            SessionEvent::ReconnectAttempt { chat_id: CHAT, attempt: expected, max_attempts: 3 }
        );
    }
    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::ReconnectGaveUp { .. })).await;
    assert_eq!(event, SessionEvent::ReconnectGaveUp { chat_id: CHAT, attempts: 3 });

    assert!(!h.manager.is_in_call(CHAT).await);
    assert_eq!(account.connect_count(), 4);
    assert_eq!(h.manager.reconnect_attempts(CHAT), 0);
    assert_eq!(h.manager.stats().reconnects_exhausted, 1);
    // the finished supervisor does not linger
    wait_for_supervisors(&h.manager).await;
    assert!(h.manager.status().await.pending_reconnects.is_empty());
}

#[tokio::test]
async fn test_leave_cancels_pending_reconnect() {
    let h = Harness::with_config(|c| {
        c.with_reconnect(RetryPolicy {
            max_attempts: 3,
            base_backoff_ms: 60_000,
        })
    })
    .await;
    let account = MockAccount::new();
    let mut events = h.manager.subscribe();
    h.manager.join(CHAT, account.clone()).await.unwrap();

    account.handle(CHAT).kick();
    wait_for(&mut events, |e| matches!(e, SessionEvent::ReconnectAttempt { .. })).await;
    assert!(h.manager.is_reconnecting(CHAT));
    assert_eq!(h.manager.status().await.pending_reconnects, vec![CHAT]);

    h.manager.leave(CHAT).await.unwrap();
    assert!(!h.manager.is_reconnecting(CHAT));
    assert_eq!(h.manager.reconnect_attempts(CHAT), 0);
    assert_eq!(account.connect_count(), 1);
    assert_eq!(h.manager.leave(CHAT).await.unwrap_err(), SessionError::NotInCall(CHAT));
}

#[tokio::test]
async fn test_explicit_join_supersedes_reconnect() {
    let h = Harness::with_config(|c| {
        c.with_reconnect(RetryPolicy {
            max_attempts: 3,
            base_backoff_ms: 60_000,
        })
    })
    .await;
    let account = MockAccount::new();
    let mut events = h.manager.subscribe();
    h.manager.join(CHAT, account.clone()).await.unwrap();

    account.handle(CHAT).kick();
    wait_for(&mut events, |e| matches!(e, SessionEvent::ReconnectAttempt { .. })).await;

    assert_eq!(h.manager.join(CHAT, account.clone()).await.unwrap(), JoinOutcome::Joined);
    assert!(!h.manager.is_reconnecting(CHAT));
    assert_eq!(h.manager.reconnect_attempts(CHAT), 0);
    assert_eq!(account.connect_count(), 2);
}

#[tokio::test]
async fn test_explicit_join_waits_for_rejoin_in_flight() {
    let h = Harness::new().await;
    let account = MockAccount::new();
    let track = h.media("track.mp3").await;
    let mut events = h.manager.subscribe();
    h.manager.join(CHAT, account.clone()).await.unwrap();

    account.set_join_delay(Duration::from_millis(300));
    account.handle(CHAT).kick();
    wait_for(&mut events, |e| matches!(e, SessionEvent::ReconnectAttempt { .. })).await;
    wait_for_connects(&account, 2).await;

    // the supervisor's transport join is still sleeping
    let outcome = h.manager.join(CHAT, account.clone()).await.unwrap();
    assert_eq!(outcome, JoinOutcome::AlreadyJoined);
    assert_eq!(h.manager.session(CHAT).await.unwrap().phase, SessionPhase::Active);
    assert_eq!(account.connect_count(), 2);

    h.manager.play(CHAT, &track, VoiceSettings::default()).await.unwrap();
    assert_eq!(h.manager.session(CHAT).await.unwrap().phase, SessionPhase::Playing);
    wait_for(&mut events, |e| matches!(e, SessionEvent::Reconnected { .. })).await;
    wait_for_supervisors(&h.manager).await;
    assert_eq!(account.connect_count(), 2);
}

#[tokio::test]
async fn test_leave_during_rejoin_in_flight() {
    let h = Harness::new().await;
    let account = MockAccount::new();
    let mut events = h.manager.subscribe();
    h.manager.join(CHAT, account.clone()).await.unwrap();

    account.set_join_delay(Duration::from_millis(300));
    account.handle(CHAT).kick();
    wait_for(&mut events, |e| matches!(e, SessionEvent::ReconnectAttempt { .. })).await;
    wait_for_connects(&account, 2).await;
    let rejoining = account.handle(CHAT);

    h.manager.leave(CHAT).await.unwrap();
    wait_for(&mut events, |e| matches!(e, SessionEvent::JoinFailed { .. })).await;
    assert!(!h.manager.is_in_call(CHAT).await);
    assert_eq!(rejoining.leaves.load(Ordering::SeqCst), 1);

    // no further attempts after the cancelled one
    wait_for_supervisors(&h.manager).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(account.connect_count(), 2);
    assert_eq!(h.manager.reconnect_attempts(CHAT), 0);
    assert_eq!(h.manager.leave(CHAT).await.unwrap_err(), SessionError::NotInCall(CHAT));
}
