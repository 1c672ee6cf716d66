// src/cli/status.rs — Threshold, pattern, prediction and store status display

use std::path::Path;

use crate::infra::config::Config;
use crate::infra::paths;
use crate::learner::{ContextMatcher, ThresholdConfig, ThresholdManager};
use crate::memory::MemoryManager;
use crate::patterns::ErrorClusterer;

pub fn show_thresholds(
    memory: &MemoryManager,
    config: &Config,
    reset: Option<&str>,
    reset_all: bool,
) -> anyhow::Result<()> {
    let manager = ThresholdManager::from_config(&memory.store, config);
    if reset_all {
        let reset = manager.reset_all()?;
        println!("Reset {} thresholds to defaults.", reset.len());
    } else if let Some(agent_type) = reset {
        let t = manager.reset_threshold(agent_type)?;
        println!("Reset {} to {:.1}.", t.agent_type, t.current_value);
    }

    println!();
    println!(
        "  {:<28} {:>7} {:>11} {:>8} {:>8}",
        "helper type", "value", "range", "avg", "samples"
    );
    for t in manager.all_thresholds()? {
        println!("  {}", threshold_line(&t));
    }
    Ok(())
}

fn threshold_line(t: &ThresholdConfig) -> String {
    format!(
        "{:<28} {:>7.1} {:>11} {:>8.2} {:>8}",
        t.agent_type,
        t.current_value,
        format!("{:.0}-{:.0}", t.min_value, t.max_value),
        t.avg_effectiveness,
        t.sample_count
    )
}

pub fn show_patterns(memory: &MemoryManager, limit: u32) -> anyhow::Result<()> {
    let patterns = ErrorClusterer::new(&memory.store).top_patterns(limit)?;
    if patterns.is_empty() {
        println!("No error patterns recorded yet.");
        return Ok(());
    }
    for p in &patterns {
        let category = p
            .category
            .map(|c| c.as_str())
            .unwrap_or(crate::patterns::normalizer::UNCATEGORIZED);
        println!(
            "  {:>4}x  {:>3.0}% fixed  {:<20} {}",
            p.occurrence_count,
            p.fix_success_rate * 100.0,
            category,
            p.normalized_text
        );
    }
    Ok(())
}

pub fn show_prediction(memory: &MemoryManager, config: &Config, session: &str) -> anyhow::Result<()> {
    let matcher = ContextMatcher::with_config(&memory.store, config.prediction.clone());
    match matcher.predict_agent(session)? {
        Some(p) => {
            let note = if p.is_confident(config.prediction.min_confidence) {
                ""
            } else {
                " (below confidence gate)"
            };
            println!(
                "{} (confidence {:.2}, score {:.2}, {} matches){note}",
                p.agent_name, p.confidence, p.score, p.matches
            );
        }
        None => println!("No prediction: no similar sessions with useful helpers."),
    }
    Ok(())
}

pub fn show_status(db_path: &Path, memory: &MemoryManager) -> anyhow::Result<()> {
    let config_path = paths::config_file_path();

    println!("koi-learn v{}", env!("CARGO_PKG_VERSION"));
    println!();
    if config_path.exists() {
        println!("  Config:     {} (loaded)", config_path.display());
    } else {
        println!("  Config:     (using defaults)");
    }
    println!("  Database:   {}", db_path.display());
    println!("  Alerts:     {}", paths::alert_cache_path().display());

    let conn = memory.store.conn();
    for (label, table) in [
        ("Events", "session_events"),
        ("Patterns", "error_patterns"),
        ("Usages", "agent_usage"),
        ("Snapshots", "context_snapshots"),
    ] {
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
        println!("  {:<11} {n}", format!("{label}:"));
    }
    Ok(())
}
