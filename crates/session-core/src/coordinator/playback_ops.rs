//! Playback operations
//!
//! Every operation takes the chat's operation lock for its whole duration, so
//! operations on one chat are totally ordered. Transforms run while that lock is
//! held but never under the state lock, so status reads are never blocked by
//! the converter. Converter and transport calls run inside
//! `OpGuard::unlocked`, so the manager-wide lock of `serialize_all_chats`
//! only covers reading and committing state. State is only committed after the
//! transport accepted the new stream; a failure at any step leaves the
//! previous state untouched.

use std::path::Path;

use callcast_audio_core::{MediaKind, VoiceSettings};
use callcast_infra_common::LogContext;
use callcast_media_core::ScratchPurpose;
use tracing::{Instrument, Level};

use super::coordinator::{CallManager, OpGuard, StatsCounters};
use super::registry::SessionEntry;
use crate::errors::{SessionError, SessionResult};
use crate::manager::events::SessionEvent;
use crate::types::{ChatId, EnqueueOutcome, QueuedMedia, SessionPhase};

fn op_span(operation: &str, chat_id: ChatId) -> tracing::Span {
    LogContext::with_operation("session-core", operation)
        .with_field("chat_id", chat_id.to_string())
        .span(Level::DEBUG)
}

impl CallManager {
    /// Play `path` from the start with `settings`, replacing whatever is playing.
    pub async fn play(&self, chat_id: ChatId, path: impl AsRef<Path>, settings: VoiceSettings) -> SessionResult<()> {
        let path = path.as_ref();
        async move {
            let (entry, mut guard) = self.live_session(chat_id).await?;
            self.play_locked(&entry, &mut guard, path, settings).await
        }
        .instrument(op_span("play", chat_id))
        .await
    }

    /// Shared by `play`, `enqueue` and the playlist advancer. Caller holds the op lock.
    pub(crate) async fn play_locked(
        &self,
        entry: &SessionEntry,
        guard: &mut OpGuard,
        path: &Path,
        settings: VoiceSettings,
    ) -> SessionResult<()> {
        let chat_id = entry.chat_id;
        let settings = settings.normalized(&self.inner.config.volume);
        self.check_media(path, &settings).await?;

        let (phase, binding) = entry.with_state(|s| (s.phase, s.binding.clone()));
        if !phase.accepts_media() {
            return Err(SessionError::invalid_state(chat_id, phase, "play"));
        }
        let binding = binding.ok_or(SessionError::NotInCall(chat_id))?;

        let output = guard
            .unlocked(self.render(entry, path, &settings, 0.0, ScratchPurpose::Play))
            .await?;
        if let Err(e) = guard.unlocked(self.switch_stream(&binding.handle, &output)).await {
            self.inner.scratch.remove(&output).await;
            return Err(e);
        }

        // a natively paused transport would otherwise stay silent
        if let Some(pause) = &binding.pause {
            if entry.with_state(|s| s.transport_paused) {
                if let Err(e) = guard.unlocked(self.transport_call("resume", pause.resume())).await {
                    tracing::warn!(%chat_id, error = %e, "could not resume transport after switch");
                }
            }
        }

        let now = self.inner.clock.now();
        let volume = settings.volume;
        let previous = entry.with_state(|s| {
            let previous = s.current_output.replace(output.clone());
            s.current_media = Some(path.to_path_buf());
            s.current_volume = settings.volume;
            s.current_kind = settings.kind;
            s.current_settings = settings;
            s.phase = SessionPhase::Playing;
            s.transport_paused = false;
            s.position.start(now, 0.0);
            s.media_played += 1;
            s.generation += 1;
            previous
        });
        if let Some(previous) = previous {
            self.inner.scratch.remove(&previous).await;
        }
        StatsCounters::bump(&self.inner.stats.media_played);

        tracing::info!(%chat_id, media = %path.display(), volume, "playback started");
        self.publish(SessionEvent::PlaybackStarted {
            chat_id,
            media: path.to_path_buf(),
            volume,
        });
        Ok(())
    }

    /// Pause the current track, remembering the position.
    ///
    /// Uses native pause when the transport offers it, otherwise streams the
    /// placeholder. Fails with `NoActiveStream` unless the chat is `Playing`.
    pub async fn pause(&self, chat_id: ChatId) -> SessionResult<()> {
        async move {
            let (entry, mut guard) = self.live_session(chat_id).await?;
            let (phase, binding) = entry.with_state(|s| (s.phase, s.binding.clone()));
            if phase != SessionPhase::Playing {
                return Err(SessionError::NoActiveStream(chat_id));
            }
            let binding = binding.ok_or(SessionError::NotInCall(chat_id))?;

            let native = match &binding.pause {
                Some(pause) => {
                    guard.unlocked(self.transport_call("pause", pause.pause())).await?;
                    true
                }
                None => {
                    let placeholder = self.inner.config.placeholder_path.clone();
                    guard.unlocked(self.switch_stream(&binding.handle, &placeholder)).await?;
                    false
                }
            };

            let now = self.inner.clock.now();
            let position_secs = entry.with_state(|s| {
                s.position.pause(now);
                s.phase = SessionPhase::Paused;
                s.transport_paused = native;
                s.position.paused_at_secs
            });

            tracing::info!(%chat_id, position_secs, native, "paused");
            self.publish(SessionEvent::Paused { chat_id, position_secs });
            Ok(())
        }
        .instrument(op_span("pause", chat_id))
        .await
    }

    /// Resume a paused track from where it stopped.
    ///
    /// The original source is re-rendered starting at the paused offset, so
    /// this works the same with or without native pause support.
    pub async fn resume(&self, chat_id: ChatId) -> SessionResult<()> {
        async move {
            let (entry, mut guard) = self.live_session(chat_id).await?;
            let (phase, media, settings, offset, binding) = entry.with_state(|s| {
                (
                    s.phase,
                    s.current_media.clone(),
                    s.current_settings.clone(),
                    s.position.paused_at_secs,
                    s.binding.clone(),
                )
            });
            let media = match (phase, media) {
                (SessionPhase::Paused, Some(media)) => media,
                _ => return Err(SessionError::NoActiveStream(chat_id)),
            };
            let binding = binding.ok_or(SessionError::NotInCall(chat_id))?;

            let output = guard
                .unlocked(self.render(&entry, &media, &settings, offset, ScratchPurpose::Resume))
                .await?;
            if let Err(e) = guard.unlocked(self.switch_stream(&binding.handle, &output)).await {
                self.inner.scratch.remove(&output).await;
                return Err(e);
            }
            if let Some(pause) = &binding.pause {
                if let Err(e) = guard.unlocked(self.transport_call("resume", pause.resume())).await {
                    tracing::warn!(%chat_id, error = %e, "native resume failed after switch");
                }
            }

            let now = self.inner.clock.now();
            let previous = entry.with_state(|s| {
                let previous = s.current_output.replace(output);
                s.position.resume(now);
                s.phase = SessionPhase::Playing;
                s.transport_paused = false;
                s.generation += 1;
                previous
            });
            if let Some(previous) = previous {
                self.inner.scratch.remove(&previous).await;
            }

            tracing::info!(%chat_id, position_secs = offset, "resumed");
            self.publish(SessionEvent::Resumed { chat_id, position_secs: offset });
            Ok(())
        }
        .instrument(op_span("resume", chat_id))
        .await
    }

    /// Stop playback and drop the queue; the session stays in the call.
    pub async fn stop(&self, chat_id: ChatId) -> SessionResult<()> {
        async move {
            let (entry, mut guard) = self.live_session(chat_id).await?;
            let (phase, binding, natively_paused) =
                entry.with_state(|s| (s.phase, s.binding.clone(), s.transport_paused));
            if !phase.has_media() {
                return Err(SessionError::NoActiveStream(chat_id));
            }
            let binding = binding.ok_or(SessionError::NotInCall(chat_id))?;

            let placeholder = self.inner.config.placeholder_path.clone();
            guard.unlocked(self.switch_stream(&binding.handle, &placeholder)).await?;
            if natively_paused {
                if let Some(pause) = &binding.pause {
                    if let Err(e) = guard.unlocked(self.transport_call("resume", pause.resume())).await {
                        tracing::warn!(%chat_id, error = %e, "could not resume transport for placeholder");
                    }
                }
            }

            let derived = entry.with_state(|s| {
                s.phase = SessionPhase::Active;
                s.transport_paused = false;
                s.clear_media()
            });
            if let Some(path) = derived {
                self.inner.scratch.remove(&path).await;
            }

            tracing::info!(%chat_id, "stopped");
            self.publish(SessionEvent::Stopped { chat_id });
            Ok(())
        }
        .instrument(op_span("stop", chat_id))
        .await
    }

    /// Change the volume of the playing track without restarting it.
    ///
    /// The original source is re-rendered from the current position and
    /// hot-swapped in. Only valid while `Playing`.
    pub async fn set_volume(&self, chat_id: ChatId, percent: u16) -> SessionResult<()> {
        async move {
            let (entry, mut guard) = self.live_session(chat_id).await?;
            let now = self.inner.clock.now();
            let (phase, media, settings, offset, binding) = entry.with_state(|s| {
                (
                    s.phase,
                    s.current_media.clone(),
                    s.current_settings.clone(),
                    s.position.elapsed_secs(now),
                    s.binding.clone(),
                )
            });
            let media = match (phase, media) {
                (SessionPhase::Playing, Some(media)) => media,
                _ => return Err(SessionError::NoActiveStream(chat_id)),
            };
            let binding = binding.ok_or(SessionError::NotInCall(chat_id))?;

            let settings = VoiceSettings {
                volume: self.inner.config.volume.clamp(percent),
                ..settings
            };
            let output = guard
                .unlocked(self.render(&entry, &media, &settings, offset, ScratchPurpose::Volume))
                .await?;
            if let Err(e) = guard.unlocked(self.switch_stream(&binding.handle, &output)).await {
                self.inner.scratch.remove(&output).await;
                return Err(e);
            }

            // the new stream starts at `offset`
            let swapped_at = self.inner.clock.now();
            let volume = settings.volume;
            let previous = entry.with_state(|s| {
                let previous = s.current_output.replace(output);
                s.current_volume = volume;
                s.current_settings = settings;
                s.position.start(swapped_at, offset);
                s.generation += 1;
                previous
            });
            if let Some(previous) = previous {
                self.inner.scratch.remove(&previous).await;
            }

            tracing::info!(%chat_id, volume, position_secs = offset, "volume changed");
            self.publish(SessionEvent::VolumeChanged { chat_id, volume });
            Ok(())
        }
        .instrument(op_span("set_volume", chat_id))
        .await
    }

    /// Add `path` to the chat's playlist, or start it right away if nothing is
    /// loaded.
    pub async fn enqueue(
        &self,
        chat_id: ChatId,
        path: impl AsRef<Path>,
        settings: VoiceSettings,
    ) -> SessionResult<EnqueueOutcome> {
        let path = path.as_ref();
        async move {
            self.check_media(path, &settings).await?;
            let (entry, mut guard) = self.live_session(chat_id).await?;
            let phase = entry.phase();
            match phase {
                SessionPhase::Playing | SessionPhase::Paused => {
                    let limit = self.inner.config.max_queue_len;
                    let settings = settings.normalized(&self.inner.config.volume);
                    let position = entry.with_state(|s| {
                        if s.queue.len() >= limit {
                            return None;
                        }
                        s.queue.push_back(QueuedMedia::new(path, settings));
                        Some(s.queue.len())
                    });
                    let position = position.ok_or(SessionError::QueueFull { chat_id, limit })?;
                    tracing::info!(%chat_id, media = %path.display(), position, "queued");
                    self.publish(SessionEvent::Enqueued {
                        chat_id,
                        media: path.to_path_buf(),
                        position,
                    });
                    Ok(EnqueueOutcome::Queued { position })
                }
                SessionPhase::Active => {
                    self.play_locked(&entry, &mut guard, path, settings).await?;
                    Ok(EnqueueOutcome::Started)
                }
                other => Err(SessionError::invalid_state(chat_id, other, "enqueue")),
            }
        }
        .instrument(op_span("enqueue", chat_id))
        .await
    }

    /// Audio only, and the source must exist
    async fn check_media(&self, path: &Path, settings: &VoiceSettings) -> SessionResult<()> {
        if settings.kind != MediaKind::Audio {
            return Err(SessionError::UnsupportedMedia(settings.kind));
        }
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(()),
            _ => Err(SessionError::FileNotFound(path.to_path_buf())),
        }
    }
}
