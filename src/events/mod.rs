// src/events/mod.rs — Session activity log and derived session metrics

pub mod efficiency;
pub mod event_logger;

pub use efficiency::SessionEfficiency;
pub use event_logger::{EventKind, EventLogger, SessionEvent};
