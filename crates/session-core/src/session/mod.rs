//! Per-chat session state

pub mod position;
pub mod session;

pub use position::PlaybackPosition;
pub use session::{CallSession, SessionSummary};
