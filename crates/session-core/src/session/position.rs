use std::time::{Duration, Instant};

/// Playback position of the current track.
///
/// While playing, the position is `now - started_at`; `started_at` is shifted
/// back by the offset a track was resumed or re-rendered from. While paused,
/// `paused_at_secs` is authoritative.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackPosition {
    pub paused_at_secs: f64,
    pub started_at: Option<Instant>,
    pub is_playing: bool,
}

impl PlaybackPosition {
    /// Begin playing at `offset_secs` into the track
    pub fn start(&mut self, now: Instant, offset_secs: f64) {
        let offset = Duration::from_secs_f64(offset_secs.max(0.0));
        self.started_at = Some(now.checked_sub(offset).unwrap_or(now));
        self.paused_at_secs = 0.0;
        self.is_playing = true;
    }

    /// Freeze the position
    pub fn pause(&mut self, now: Instant) {
        if let Some(started_at) = self.started_at.take() {
            self.paused_at_secs += now.saturating_duration_since(started_at).as_secs_f64();
        }
        self.is_playing = false;
    }

    /// Continue from the frozen position
    pub fn resume(&mut self, now: Instant) {
        let offset = self.paused_at_secs;
        self.start(now, offset);
    }

    pub fn elapsed_secs(&self, now: Instant) -> f64 {
        match (self.is_playing, self.started_at) {
            (true, Some(started_at)) => now.saturating_duration_since(started_at).as_secs_f64(),
            _ => self.paused_at_secs,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
