// src/learner/thresholds.rs — Adaptive per-helper trigger thresholds
//
// Two independent inputs move a threshold: aggregated helper effectiveness
// and the session efficiency score. Both share the same clamp and
// minimum-delta discipline, so repeated calls can only walk a threshold
// inside its [min, max] bounds.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::infra::config::{Config, EfficiencyConfig, LearningConfig, ThresholdOverride};
use crate::infra::errors::LearnerError;
use crate::memory::store::{format_ts, now_ts, window_start, Store, ThresholdRow};

/// Built-in default and bounds for one helper type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdDefault {
    pub agent_type: &'static str,
    pub default: f64,
    pub min: f64,
    pub max: f64,
}

pub const BUILTIN_THRESHOLDS: &[ThresholdDefault] = &[
    // edits inside one folder
    ThresholdDefault {
        agent_type: "wide-activity-detector",
        default: 8.0,
        min: 3.0,
        max: 20.0,
    },
    // repeats of one error pattern
    ThresholdDefault {
        agent_type: "recurring-failure-detector",
        default: 4.0,
        min: 2.0,
        max: 10.0,
    },
    // reads of one file
    ThresholdDefault {
        agent_type: "re-read-detector",
        default: 6.0,
        min: 2.0,
        max: 15.0,
    },
    // edits of one file type
    ThresholdDefault {
        agent_type: "language-specialist",
        default: 10.0,
        min: 3.0,
        max: 25.0,
    },
    // edits without a verification run
    ThresholdDefault {
        agent_type: "quality-guard",
        default: 12.0,
        min: 4.0,
        max: 30.0,
    },
    // regressed checks
    ThresholdDefault {
        agent_type: "regression-fixer",
        default: 3.0,
        min: 1.0,
        max: 8.0,
    },
];

pub const FALLBACK_THRESHOLD: ThresholdDefault = ThresholdDefault {
    agent_type: "*",
    default: 5.0,
    min: 1.0,
    max: 20.0,
};

/// Neutral average written on reset.
const NEUTRAL_EFFECTIVENESS: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdHistoryEntry {
    pub timestamp: String,
    pub old_value: f64,
    pub new_value: f64,
    pub reason: String,
}

/// Current threshold state for one helper type.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdConfig {
    pub agent_type: String,
    pub current_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub avg_effectiveness: f64,
    pub sample_count: u32,
    pub last_adjusted: Option<String>,
    pub history: Vec<ThresholdHistoryEntry>,
}

impl ThresholdConfig {
    fn from_row(row: ThresholdRow) -> Self {
        let history = serde_json::from_str(&row.history).unwrap_or_else(|e| {
            warn!(agent_type = %row.agent_type, "unreadable threshold history: {e}");
            Vec::new()
        });
        Self {
            agent_type: row.agent_type,
            current_value: row.current_value,
            min_value: row.min_value,
            max_value: row.max_value,
            avg_effectiveness: row.avg_effectiveness,
            sample_count: row.sample_count.max(0) as u32,
            last_adjusted: row.last_adjusted,
            history,
        }
    }
}

/// A threshold change that was computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdAdjustment {
    pub agent_type: String,
    pub old_value: f64,
    pub new_value: f64,
    pub reason: String,
}

impl ThresholdAdjustment {
    pub fn lowered(&self) -> bool {
        self.new_value < self.old_value
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoAdjustmentReason {
    InsufficientSamples { have: u32, need: u32 },
    WithinTargetBand { avg_effectiveness: f64 },
    BelowMinimumDelta { proposed: f64 },
    NeutralEfficiency { score: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdjustmentOutcome {
    /// Computed and persisted.
    Adjusted(ThresholdAdjustment),
    /// Computed, but the write failed; the stored value is unchanged.
    NotPersisted {
        adjustment: ThresholdAdjustment,
        error: String,
    },
    NoAdjustment(NoAdjustmentReason),
}

impl AdjustmentOutcome {
    /// The adjustment, whether or not it was persisted.
    pub fn adjustment(&self) -> Option<&ThresholdAdjustment> {
        match self {
            Self::Adjusted(a) | Self::NotPersisted { adjustment: a, .. } => Some(a),
            Self::NoAdjustment(_) => None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Adjusted(_))
    }
}

/// Effectiveness aggregate feeding an adjustment.
struct WindowStats {
    avg: f64,
    samples: u32,
}

pub struct ThresholdManager<'a> {
    store: &'a Store,
    learning: LearningConfig,
    efficiency: EfficiencyConfig,
    overrides: Vec<ThresholdOverride>,
}

impl<'a> ThresholdManager<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            learning: LearningConfig::default(),
            efficiency: EfficiencyConfig::default(),
            overrides: Vec::new(),
        }
    }

    pub fn from_config(store: &'a Store, config: &Config) -> Self {
        Self {
            store,
            learning: config.learning.clone(),
            efficiency: config.efficiency.clone(),
            overrides: config.thresholds.clone(),
        }
    }

    /// Default and bounds for a type: config override, built-in, or fallback.
    pub fn defaults_for(&self, agent_type: &str) -> (f64, f64, f64) {
        if let Some(o) = self.overrides.iter().find(|o| o.agent_type == agent_type) {
            return (o.default, o.min, o.max);
        }
        let d = BUILTIN_THRESHOLDS
            .iter()
            .find(|d| d.agent_type == agent_type)
            .unwrap_or(&FALLBACK_THRESHOLD);
        (d.default, d.min, d.max)
    }

    /// Current threshold state, creating the default row on first query.
    pub fn get_threshold(&self, agent_type: &str) -> Result<ThresholdConfig, LearnerError> {
        if let Some(row) = self.store.get_threshold(agent_type)? {
            return Ok(ThresholdConfig::from_row(row));
        }
        let (value, min, max) = self.defaults_for(agent_type);
        self.store
            .insert_threshold_if_missing(agent_type, value, min, max)?;
        match self.store.get_threshold(agent_type)? {
            Some(row) => Ok(ThresholdConfig::from_row(row)),
            None => Ok(ThresholdConfig {
                agent_type: agent_type.to_string(),
                current_value: value,
                min_value: min,
                max_value: max,
                avg_effectiveness: NEUTRAL_EFFECTIVENESS,
                sample_count: 0,
                last_adjusted: None,
                history: Vec::new(),
            }),
        }
    }

    pub fn current_value(&self, agent_type: &str) -> Result<f64, LearnerError> {
        Ok(self.get_threshold(agent_type)?.current_value)
    }

    /// Every built-in type plus any type with a stored threshold.
    pub fn all_thresholds(&self) -> Result<Vec<ThresholdConfig>, LearnerError> {
        for d in BUILTIN_THRESHOLDS {
            self.get_threshold(d.agent_type)?;
        }
        Ok(self
            .store
            .query_all_thresholds()?
            .into_iter()
            .map(ThresholdConfig::from_row)
            .collect())
    }

    /// Nudge one type's threshold from its effectiveness over the window.
    pub fn adjust_threshold(
        &self,
        agent_type: &str,
        window_days: u32,
    ) -> Result<AdjustmentOutcome, LearnerError> {
        let since = format_ts(window_start(Utc::now(), window_days));
        let stats = self.store.query_usage_stats(&since, Some(agent_type))?;
        let (samples, avg) = stats
            .first()
            .map(|s| (s.sample_count.max(0) as u32, s.avg_effectiveness))
            .unwrap_or((0, 0.0));

        if samples < self.learning.min_adjust_samples {
            debug!(agent_type, samples, "too few samples to adjust threshold");
            return Ok(AdjustmentOutcome::NoAdjustment(
                NoAdjustmentReason::InsufficientSamples {
                    have: samples,
                    need: self.learning.min_adjust_samples,
                },
            ));
        }

        let (factor, reason) = if avg > self.learning.effective_avg {
            (
                self.learning.lower_factor,
                format!("high effectiveness ({avg:.2} avg over {samples} uses)"),
            )
        } else if avg < self.learning.ineffective_avg {
            (
                self.learning.raise_factor,
                format!("low effectiveness ({avg:.2} avg over {samples} uses)"),
            )
        } else {
            return Ok(AdjustmentOutcome::NoAdjustment(
                NoAdjustmentReason::WithinTargetBand {
                    avg_effectiveness: avg,
                },
            ));
        };

        self.apply(agent_type, factor, reason, Some(WindowStats { avg, samples }))
    }

    /// Adjust every type that has any usage history. Types are independent.
    pub fn adjust_all_thresholds(
        &self,
        window_days: u32,
    ) -> Result<Vec<(String, AdjustmentOutcome)>, LearnerError> {
        let mut outcomes = Vec::new();
        for agent_type in self.store.query_agent_types_with_usage()? {
            let outcome = self.adjust_threshold(&agent_type, window_days)?;
            outcomes.push((agent_type, outcome));
        }
        Ok(outcomes)
    }

    /// React to a 0-100 session efficiency score: surface reactive helpers
    /// sooner when the session goes badly, later when it goes well.
    pub fn adjust_for_efficiency(
        &self,
        score: f64,
    ) -> Result<Vec<(String, AdjustmentOutcome)>, LearnerError> {
        let (factor, reason) = if score < self.efficiency.low_score {
            (
                self.efficiency.low_factor,
                format!("low session efficiency ({score:.0}/100)"),
            )
        } else if score > self.efficiency.high_score {
            (
                self.efficiency.high_factor,
                format!("high session efficiency ({score:.0}/100)"),
            )
        } else {
            return Ok(self
                .efficiency
                .reactive_types
                .iter()
                .map(|t| {
                    (
                        t.clone(),
                        AdjustmentOutcome::NoAdjustment(NoAdjustmentReason::NeutralEfficiency {
                            score,
                        }),
                    )
                })
                .collect());
        };

        let mut outcomes = Vec::new();
        for agent_type in &self.efficiency.reactive_types {
            let outcome = self.apply(agent_type, factor, reason.clone(), None)?;
            outcomes.push((agent_type.clone(), outcome));
        }
        Ok(outcomes)
    }

    /// Restore the default value, zero the samples and clear the history.
    pub fn reset_threshold(&self, agent_type: &str) -> Result<ThresholdConfig, LearnerError> {
        let (value, min, max) = self.defaults_for(agent_type);
        self.store.reset_threshold(agent_type, value, min, max)?;
        info!(agent_type, value, "threshold reset");
        self.get_threshold(agent_type)
    }

    pub fn reset_all(&self) -> Result<Vec<ThresholdConfig>, LearnerError> {
        let mut types: Vec<String> = BUILTIN_THRESHOLDS
            .iter()
            .map(|d| d.agent_type.to_string())
            .collect();
        for row in self.store.query_all_thresholds()? {
            if !types.contains(&row.agent_type) {
                types.push(row.agent_type);
            }
        }
        types
            .iter()
            .map(|t| self.reset_threshold(t))
            .collect()
    }

    fn apply(
        &self,
        agent_type: &str,
        factor: f64,
        reason: String,
        stats: Option<WindowStats>,
    ) -> Result<AdjustmentOutcome, LearnerError> {
        let current = self.get_threshold(agent_type)?;
        let proposed = round_tenth(current.current_value * factor)
            .clamp(current.min_value, current.max_value);

        if (proposed - current.current_value).abs() < self.learning.min_delta {
            debug!(agent_type, proposed, "threshold change below minimum delta");
            return Ok(AdjustmentOutcome::NoAdjustment(
                NoAdjustmentReason::BelowMinimumDelta { proposed },
            ));
        }

        let adjustment = ThresholdAdjustment {
            agent_type: agent_type.to_string(),
            old_value: current.current_value,
            new_value: proposed,
            reason,
        };

        let mut history = current.history;
        history.push(ThresholdHistoryEntry {
            timestamp: now_ts(),
            old_value: adjustment.old_value,
            new_value: adjustment.new_value,
            reason: adjustment.reason.clone(),
        });
        let limit = self.learning.history_limit;
        if history.len() > limit {
            history.drain(..history.len() - limit);
        }

        let (avg, samples) = match stats {
            Some(s) => (s.avg, s.samples),
            None => (current.avg_effectiveness, current.sample_count),
        };

        let persisted = serde_json::to_string(&history)
            .map_err(anyhow::Error::from)
            .and_then(|json| {
                self.store
                    .update_threshold(agent_type, proposed, avg, samples as i64, &json)
            });

        match persisted {
            Ok(()) => {
                info!(
                    agent_type,
                    old = adjustment.old_value,
                    new = adjustment.new_value,
                    reason = %adjustment.reason,
                    "threshold adjusted"
                );
                Ok(AdjustmentOutcome::Adjusted(adjustment))
            }
            Err(e) => {
                warn!(agent_type, "threshold adjustment not persisted: {e}");
                Ok(AdjustmentOutcome::NotPersisted {
                    adjustment,
                    error: e.to_string(),
                })
            }
        }
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
