// src/learner/mod.rs — Helper effectiveness, adaptive thresholds and prediction

pub mod context;
pub mod effectiveness;
pub mod orchestrator;
pub mod thresholds;
pub mod types;
pub mod usage;

pub use context::{AgentPrediction, ContextFeatures, ContextMatcher};
pub use effectiveness::{score_effectiveness, EffectivenessScore, SpawnBaseline, UsageOutcome};
pub use orchestrator::LearningOrchestrator;
pub use thresholds::{AdjustmentOutcome, ThresholdAdjustment, ThresholdConfig, ThresholdManager};
pub use types::LearningReport;
pub use usage::{CompletedUsage, UsageTracker};
