// src/infra/logger.rs — Structured logging with tracing
//
// Logs go to stderr: stdout is reserved for the hook protocol.

use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
