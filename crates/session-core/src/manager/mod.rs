//! Event publication for observers of the orchestrator

pub mod events;

pub use events::{SessionEvent, SessionEventProcessor};
