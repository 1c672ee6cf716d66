// src/learner/orchestrator.rs — One read-and-summarize learning pass

use chrono::Utc;
use tracing::info;

use super::context::ContextMatcher;
use super::thresholds::{AdjustmentOutcome, ThresholdManager};
use super::types::{AgentEffectivenessStat, EffectivenessClass, LearningReport};
use crate::infra::config::{Config, LearningConfig};
use crate::infra::errors::LearnerError;
use crate::memory::store::{format_ts, now_ts, window_start, Store};
use crate::patterns::{summarize_by_category, ErrorClusterer};

/// Coordinates the learning components for a single cycle.
///
/// The only writes are the threshold adjustments it triggers; everything
/// else is read back from what the components already persisted.
pub struct LearningOrchestrator<'a> {
    store: &'a Store,
    config: &'a Config,
}

impl<'a> LearningOrchestrator<'a> {
    pub fn new(store: &'a Store, config: &'a Config) -> Self {
        Self { store, config }
    }

    /// Run one cycle over the last `window_days`. A session id enables the
    /// prediction step for that session.
    pub fn run_cycle(
        &self,
        window_days: u32,
        session_id: Option<&str>,
    ) -> Result<LearningReport, LearnerError> {
        let learning = &self.config.learning;

        // 1. Per-type effectiveness
        let since = format_ts(window_start(Utc::now(), window_days));
        let stats: Vec<AgentEffectivenessStat> = self
            .store
            .query_usage_stats(&since, None)?
            .into_iter()
            .map(|row| AgentEffectivenessStat {
                agent_type: row.agent_type,
                avg_effectiveness: row.avg_effectiveness,
                sample_count: row.sample_count.max(0) as u32,
            })
            .collect();
        let total_samples = stats.iter().map(|s| s.sample_count).sum();

        let mut effective_agents = Vec::new();
        let mut ineffective_agents = Vec::new();
        for stat in stats {
            match classify(&stat, learning) {
                EffectivenessClass::Effective => effective_agents.push(stat),
                EffectivenessClass::Ineffective => ineffective_agents.push(stat),
                EffectivenessClass::Undecided => {}
            }
        }

        // 2. Threshold adjustments
        let thresholds = ThresholdManager::from_config(self.store, self.config);
        let mut threshold_adjustments = Vec::new();
        let mut unpersisted_adjustments = Vec::new();
        for (_, outcome) in thresholds.adjust_all_thresholds(window_days)? {
            match outcome {
                AdjustmentOutcome::Adjusted(a) => threshold_adjustments.push(a),
                AdjustmentOutcome::NotPersisted { adjustment, .. } => {
                    unpersisted_adjustments.push(adjustment)
                }
                AdjustmentOutcome::NoAdjustment(_) => {}
            }
        }

        // 3. Error patterns
        let top_patterns =
            ErrorClusterer::new(self.store).top_patterns(self.config.clustering.top_patterns)?;
        let error_categories = summarize_by_category(&top_patterns);

        // 4. Prediction
        let prediction = match session_id {
            Some(session) => ContextMatcher::with_config(self.store, self.config.prediction.clone())
                .predict_agent(session)?,
            None => None,
        };

        let mut report = LearningReport {
            generated_at: now_ts(),
            window_days,
            total_samples,
            effective_agents,
            ineffective_agents,
            threshold_adjustments,
            unpersisted_adjustments,
            error_categories,
            top_patterns,
            prediction,
            insights: Vec::new(),
        };
        report.insights = build_insights(&report, self.config);

        info!(
            samples = report.total_samples,
            adjustments = report.threshold_adjustments.len(),
            patterns = report.top_patterns.len(),
            "learning cycle complete"
        );
        Ok(report)
    }
}

/// Reporting is looser than acting: a smaller sample floor than the one
/// that gates threshold changes.
pub fn classify(stat: &AgentEffectivenessStat, learning: &LearningConfig) -> EffectivenessClass {
    if stat.sample_count < learning.min_report_samples {
        EffectivenessClass::Undecided
    } else if stat.avg_effectiveness >= learning.effective_avg {
        EffectivenessClass::Effective
    } else if stat.avg_effectiveness < learning.ineffective_avg {
        EffectivenessClass::Ineffective
    } else {
        EffectivenessClass::Undecided
    }
}

fn build_insights(report: &LearningReport, config: &Config) -> Vec<String> {
    let mut insights = Vec::new();

    if report.total_samples < config.learning.min_report_samples {
        insights.push(format!(
            "Too little data yet: {} helper use(s) in the last {} day(s)",
            report.total_samples, report.window_days
        ));
    }

    if !report.effective_agents.is_empty() {
        insights.push(format!(
            "Effective helpers: {}",
            describe_stats(&report.effective_agents)
        ));
    }
    if !report.ineffective_agents.is_empty() {
        insights.push(format!(
            "Ineffective helpers: {}",
            describe_stats(&report.ineffective_agents)
        ));
    }

    for adj in &report.threshold_adjustments {
        insights.push(format!(
            "{} threshold {} from {:.1} to {:.1}: {}",
            adj.agent_type,
            if adj.lowered() { "lowered" } else { "raised" },
            adj.old_value,
            adj.new_value,
            adj.reason
        ));
    }
    for adj in &report.unpersisted_adjustments {
        insights.push(format!(
            "{} threshold change to {:.1} could not be saved",
            adj.agent_type, adj.new_value
        ));
    }

    if let Some(top) = report.error_categories.first() {
        insights.push(format!(
            "Most common error category: {} ({} occurrences, {:.0}% fixed)",
            top.category,
            top.occurrences,
            top.fix_rate() * 100.0
        ));
    }

    if let Some(ref p) = report.prediction {
        if p.is_confident(config.prediction.min_confidence) {
            insights.push(format!(
                "Similar sessions were helped by {} (confidence {:.2})",
                p.agent_name, p.confidence
            ));
        }
    }

    insights
}

fn describe_stats(stats: &[AgentEffectivenessStat]) -> String {
    stats
        .iter()
        .map(|s| {
            format!(
                "{} ({:.2} over {} uses)",
                s.agent_type, s.avg_effectiveness, s.sample_count
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}
