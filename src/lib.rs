// src/lib.rs — Library root for koi-learn

pub mod cli;
pub mod events;
pub mod hooks;
pub mod infra;
pub mod learner;
pub mod memory;
pub mod patterns;
