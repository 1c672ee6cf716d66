// src/learner/types.rs — Learner type definitions

use serde::Serialize;

use super::context::AgentPrediction;
use super::thresholds::ThresholdAdjustment;
use crate::patterns::{CategorySummary, ErrorPattern};

/// Aggregated effectiveness of one helper type over a window.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentEffectivenessStat {
    pub agent_type: String,
    pub avg_effectiveness: f64,
    pub sample_count: u32,
}

/// How a helper type is classified in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectivenessClass {
    Effective,
    Ineffective,
    /// Middle band, or too few samples to say.
    Undecided,
}

/// Plain-data result of one learning cycle. Rendering is left to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct LearningReport {
    pub generated_at: String,
    pub window_days: u32,
    pub total_samples: u32,
    pub effective_agents: Vec<AgentEffectivenessStat>,
    pub ineffective_agents: Vec<AgentEffectivenessStat>,
    /// Adjustments that were computed and persisted this cycle.
    pub threshold_adjustments: Vec<ThresholdAdjustment>,
    /// Adjustments computed but not written; the stored values are unchanged.
    pub unpersisted_adjustments: Vec<ThresholdAdjustment>,
    pub error_categories: Vec<CategorySummary>,
    pub top_patterns: Vec<ErrorPattern>,
    pub prediction: Option<AgentPrediction>,
    /// Ordered plain-language observations.
    pub insights: Vec<String>,
}

impl LearningReport {
    pub fn has_data(&self) -> bool {
        self.total_samples > 0 || !self.top_patterns.is_empty()
    }
}
