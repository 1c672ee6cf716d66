// src/infra/paths.rs — XDG-compliant path management
//
// All paths respect the KOI_LEARN_HOME environment variable for isolation.
// When KOI_LEARN_HOME is set, config, data and state live under that directory.
// When unset, config uses ~/.koi-learn/ and data uses XDG_DATA_HOME/koi-learn.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Returns the KOI_LEARN_HOME override, if set.
fn koi_home() -> Option<PathBuf> {
    std::env::var_os("KOI_LEARN_HOME").map(PathBuf::from)
}

/// Home directory, or the working directory when none can be determined.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|b| b.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $KOI_LEARN_HOME/ or ~/.koi-learn/
pub fn config_dir() -> PathBuf {
    if let Some(home) = koi_home() {
        return home;
    }
    dirs_home().join(".koi-learn")
}

/// Data directory: $KOI_LEARN_HOME/data/ or ~/.local/share/koi-learn/
pub fn data_dir() -> PathBuf {
    if let Some(home) = koi_home() {
        return home.join("data");
    }
    ProjectDirs::from("", "", "koi-learn")
        .map(|d| d.data_local_dir().to_path_buf())
        .unwrap_or_else(|| config_dir().join("data"))
}

/// Database path
pub fn db_path() -> PathBuf {
    data_dir().join("koi-learn.db")
}

/// State directory: ~/.koi-learn/state/ (alert cooldowns)
pub fn state_dir() -> PathBuf {
    config_dir().join("state")
}

/// Alert cache file shared between hook invocations.
pub fn alert_cache_path() -> PathBuf {
    state_dir().join("alerts.json")
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Ensure all required directories exist
pub fn ensure_dirs() -> anyhow::Result<()> {
    for dir in [config_dir(), data_dir(), state_dir()] {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(())
}
