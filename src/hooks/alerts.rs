// src/hooks/alerts.rs — Caller-owned suggestion de-duplication

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::warn;

/// Remembers when each suggestion was last surfaced so it is not repeated
/// within the cooldown. Keys are free-form, e.g. `"re-read-detector:src/a.rs"`.
#[derive(Debug, Clone)]
pub struct AlertCache {
    entries: BTreeMap<String, DateTime<Utc>>,
    cooldown: TimeDelta,
}

impl AlertCache {
    /// Cooldowns beyond what chrono can represent saturate to the maximum.
    pub fn new(cooldown_secs: u64) -> Self {
        let cooldown = i64::try_from(cooldown_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        Self {
            entries: BTreeMap::new(),
            cooldown,
        }
    }

    pub fn should_alert(&self, key: &str, now: DateTime<Utc>) -> bool {
        match self.entries.get(key) {
            Some(&last) => now - last >= self.cooldown,
            None => true,
        }
    }

    pub fn record(&mut self, key: &str, now: DateTime<Utc>) {
        self.entries.insert(key.to_string(), now);
    }

    /// `should_alert` and `record` in one step, against the current time.
    pub fn check_and_record(&mut self, key: &str) -> bool {
        let now = Utc::now();
        if self.should_alert(key, now) {
            self.record(key, now);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries whose cooldown has passed.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cooldown = self.cooldown;
        self.entries.retain(|_, &mut last| now - last < cooldown);
    }

    /// Load from a JSON file. A missing or unreadable file yields an empty cache.
    pub fn load(path: &Path, cooldown_secs: u64) -> Self {
        let mut cache = Self::new(cooldown_secs);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return cache,
        };
        match serde_json::from_str(&content) {
            Ok(entries) => cache.entries = entries,
            Err(e) => warn!("ignoring unreadable alert cache {}: {e}", path.display()),
        }
        cache
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string(&self.entries)?)?;
        Ok(())
    }
}
