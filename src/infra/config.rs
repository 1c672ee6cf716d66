// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub learning: LearningConfig,

    #[serde(default)]
    pub efficiency: EfficiencyConfig,

    #[serde(default)]
    pub prediction: PredictionConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Helper name → threshold type. Unmapped helpers use their own name.
    #[serde(default)]
    pub agents: HashMap<String, String>,

    /// Per-type overrides of the built-in threshold defaults.
    #[serde(default)]
    pub thresholds: Vec<ThresholdOverride>,
}

/// Effectiveness-driven threshold adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub window_days: u32,
    /// Completed usages required before a threshold may move.
    pub min_adjust_samples: u32,
    /// Completed usages required before a type is reported as (in)effective.
    pub min_report_samples: u32,
    pub effective_avg: f64,
    pub ineffective_avg: f64,
    pub lower_factor: f64,
    pub raise_factor: f64,
    /// Changes smaller than this are dropped.
    pub min_delta: f64,
    pub history_limit: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            min_adjust_samples: 5,
            min_report_samples: 3,
            effective_avg: 0.6,
            ineffective_avg: 0.3,
            lower_factor: 0.9,
            raise_factor: 1.15,
            min_delta: 0.5,
            history_limit: 10,
        }
    }
}

/// Session-efficiency-driven threshold adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EfficiencyConfig {
    pub low_score: f64,
    pub high_score: f64,
    pub low_factor: f64,
    pub high_factor: f64,
    pub reactive_types: Vec<String>,
}

impl Default for EfficiencyConfig {
    fn default() -> Self {
        Self {
            low_score: 40.0,
            high_score: 75.0,
            low_factor: 0.8,
            high_factor: 1.1,
            reactive_types: vec![
                "wide-activity-detector".into(),
                "recurring-failure-detector".into(),
                "re-read-detector".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Snapshots below this effectiveness are never used as exemplars.
    pub min_exemplar_effectiveness: f64,
    pub min_similarity: f64,
    pub max_matches: usize,
    /// Winning vote below this withholds the prediction.
    pub min_vote: f64,
    /// Predictions below this confidence are not surfaced to the host.
    pub min_confidence: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            min_exemplar_effectiveness: 0.4,
            min_similarity: 0.3,
            max_matches: 5,
            min_vote: 0.3,
            min_confidence: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub similarity_threshold: f64,
    pub top_patterns: u32,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.3,
            top_patterns: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub cooldown_secs: u64,
    /// Block reads of a file once it has been read twice the re-read threshold.
    pub block_rereads: bool,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 300,
            block_rereads: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdOverride {
    pub agent_type: String,
    pub default: f64,
    pub min: f64,
    pub max: f64,
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject overrides whose bounds cannot hold their default.
    pub fn validate(&self) -> anyhow::Result<()> {
        for o in &self.thresholds {
            if o.min > o.max || o.default < o.min || o.default > o.max {
                return Err(crate::infra::errors::LearnerError::Config(format!(
                    "threshold override for '{}' must satisfy min <= default <= max",
                    o.agent_type
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Threshold type for a helper name.
    pub fn agent_type_for(&self, agent_name: &str) -> String {
        self.agents
            .get(agent_name)
            .cloned()
            .unwrap_or_else(|| agent_name.to_string())
    }
}
