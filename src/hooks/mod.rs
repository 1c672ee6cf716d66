// src/hooks/mod.rs — Host lifecycle hook boundary

pub mod alerts;
pub mod handler;
pub mod types;

pub use alerts::AlertCache;
pub use handler::HookHandler;
pub use types::{Decision, HookEvent, HookInput, HookOutput};
