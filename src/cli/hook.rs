// src/cli/hook.rs — `koi-learn hook`: one host event in, one decision out

use std::io::Read;
use std::path::Path;

use tracing::warn;

use crate::hooks::{AlertCache, HookHandler, HookInput, HookOutput};
use crate::infra::config::Config;
use crate::infra::paths;

/// Read a payload from stdin, handle it, and print the response.
///
/// Always prints a response and returns `Ok`: the host must never be
/// blocked by a learning failure.
pub fn run_hook(db_path: &Path, config: &Config) -> anyhow::Result<()> {
    let mut raw = String::new();
    let output = match std::io::stdin().read_to_string(&mut raw) {
        Ok(_) => handle_payload(&raw, db_path, config, &paths::alert_cache_path()),
        Err(e) => {
            warn!("could not read hook payload: {e}");
            HookOutput::approve()
        }
    };
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

/// Handle a raw JSON payload against the store at `db_path`, sharing alert
/// state through `cache_path`.
pub fn handle_payload(raw: &str, db_path: &Path, config: &Config, cache_path: &Path) -> HookOutput {
    let input: HookInput = match serde_json::from_str(raw) {
        Ok(i) => i,
        Err(e) => {
            warn!("ignoring malformed hook payload: {e}");
            return HookOutput::approve();
        }
    };

    let memory = match super::open_memory(db_path) {
        Ok(m) => m,
        Err(e) => {
            warn!("learning store unavailable: {e}");
            return HookOutput::approve();
        }
    };

    let mut alerts = AlertCache::load(cache_path, config.alerts.cooldown_secs);
    alerts.prune(chrono::Utc::now());
    let output = HookHandler::new(&memory.store, config).handle(&input, &mut alerts);
    if let Err(e) = alerts.save(cache_path) {
        warn!("could not save alert cache: {e}");
    }
    output
}
