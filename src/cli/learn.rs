// src/cli/learn.rs — `koi-learn learn`: run a learning cycle and print the report

use crate::infra::config::Config;
use crate::learner::{LearningOrchestrator, LearningReport};
use crate::memory::MemoryManager;

pub fn run_learn(
    memory: &MemoryManager,
    config: &Config,
    days: Option<u32>,
    session: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let window = days.unwrap_or(config.learning.window_days);
    let report = LearningOrchestrator::new(&memory.store, config).run_cycle(window, session)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(())
}

/// Plain-text rendering of a report.
pub fn render_report(report: &LearningReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Learning report (last {} days, {} helper uses)\n\n",
        report.window_days, report.total_samples
    ));

    if !report.insights.is_empty() {
        out.push_str("Insights:\n");
        for insight in &report.insights {
            out.push_str(&format!("  - {insight}\n"));
        }
        out.push('\n');
    }

    if !report.error_categories.is_empty() {
        out.push_str("Error categories:\n");
        for c in &report.error_categories {
            out.push_str(&format!(
                "  {:<24} {:>3} patterns  {:>4} seen  {:>3.0}% fixed\n",
                c.category,
                c.pattern_count,
                c.occurrences,
                c.fix_rate() * 100.0
            ));
        }
        out.push('\n');
    }

    if let Some(ref p) = report.prediction {
        out.push_str(&format!(
            "Prediction: {} (confidence {:.2}, {} matches)\n",
            p.agent_name, p.confidence, p.matches
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_empty_report() {
        let mm = MemoryManager::in_memory().unwrap();
        let config = Config::default();
        let report = LearningOrchestrator::new(&mm.store, &config)
            .run_cycle(7, None)
            .unwrap();
        let text = render_report(&report);
        assert!(text.starts_with("Learning report (last 7 days, 0 helper uses)"));
        assert!(text.contains("Too little data yet"));
        assert!(!text.contains("Error categories"));
    }
}
