//! Call Manager
//!
//! The orchestrator behind every chat's voice call. Operations are split by
//! concern:
//!
//! - `session_ops`: join and leave
//! - `playback_ops`: play, pause, resume, stop, volume and enqueue
//! - `event_handler`: per-chat event lanes fed by the transport
//! - `playlist`: advancing the queue when a stream ends
//! - `reconnect`: the reconnection supervisor after a kick
//! - `status`: read-only views and scratch maintenance

mod coordinator;
mod event_handler;
mod playback_ops;
mod playlist;
mod reconnect;
pub mod registry;
mod session_ops;
mod status;

pub use coordinator::{CallManager, CallManagerBuilder, StatsCounters, StatsSnapshot};
pub use registry::RegistryStats;
pub use status::ManagerStatus;
