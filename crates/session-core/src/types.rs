//! Core identifiers and small value types

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use callcast_audio_core::VoiceSettings;
use serde::{Deserialize, Serialize};

use crate::errors::SessionError;

/// Chat identifier, the single key for every per-chat map.
///
/// Group chats use negative ids, so the sign is significant. Zero is never a
/// valid chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(i64);

impl ChatId {
    /// Wrap a raw id. Prefer parsing at the boundary; this does not reject zero.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChatId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SessionError::InvalidChatId(s.to_string()));
        }
        match trimmed.parse::<i64>() {
            Ok(0) | Err(_) => Err(SessionError::InvalidChatId(s.to_string())),
            Ok(raw) => Ok(Self(raw)),
        }
    }
}

impl TryFrom<&str> for ChatId {
    type Error = SessionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<i64> for ChatId {
    type Error = SessionError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value == 0 {
            return Err(SessionError::InvalidChatId(value.to_string()));
        }
        Ok(Self(value))
    }
}

/// Lifecycle phase of a call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    Idle,
    /// Registered, transport join in progress
    Joining,
    /// In the call, streaming the placeholder
    Active,
    Playing,
    Paused,
    Leaving,
    /// Kicked; waiting on the reconnection supervisor
    Disconnected,
}

impl SessionPhase {
    /// Phases in which media can be started
    pub fn accepts_media(&self) -> bool {
        matches!(self, Self::Active | Self::Playing | Self::Paused)
    }

    /// Phases with a track loaded
    pub fn has_media(&self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result of a successful join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinOutcome {
    Joined,
    /// A session already existed; nothing was done
    AlreadyJoined,
}

/// Result of a successful enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnqueueOutcome {
    /// Nothing was playing, so the item started immediately
    Started,
    /// Appended; `position` is 1-based
    Queued { position: usize },
}

/// A playlist entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMedia {
    pub path: PathBuf,
    pub settings: VoiceSettings,
}

impl QueuedMedia {
    pub fn new(path: impl Into<PathBuf>, settings: VoiceSettings) -> Self {
        Self { path: path.into(), settings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_id_parsing() {
        assert_eq!(" -1001234567890 ".parse::<ChatId>().unwrap().get(), -1001234567890);
        assert_eq!(ChatId::try_from("42").unwrap(), ChatId::new(42));
        for bad in ["", "-", "0", "-0", "12a", "+5", "1.5", "99999999999999999999"] {
            assert!(
                matches!(bad.parse::<ChatId>(), Err(SessionError::InvalidChatId(_))),
                "accepted {:?}",
                bad
            );
        }
        assert!(ChatId::try_from(0i64).is_err());
    }

    #[test]
    fn test_chat_id_serializes_as_number() {
        assert_eq!(serde_json::to_string(&ChatId::new(-7)).unwrap(), "-7");
    }

    #[test]
    fn test_phase_predicates() {
        assert!(SessionPhase::Active.accepts_media());
        assert!(!SessionPhase::Joining.accepts_media());
        assert!(SessionPhase::Paused.has_media());
        assert!(!SessionPhase::Active.has_media());
    }
}
