// src/learner/effectiveness.rs — Did invoking a helper measurably help?

use serde::{Deserialize, Serialize};

const READ_WEIGHT: f64 = 0.4;
const ERROR_WEIGHT: f64 = 0.3;
const SUCCESS_WEIGHT: f64 = 0.3;

/// Read credit when there was nothing to reduce.
const NEUTRAL_READ_CREDIT: f64 = 0.2;

/// Scores at or above this, with a successful task, count as a success.
pub const SUCCESS_SCORE: f64 = 0.5;

/// Session counters captured when the helper was spawned.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SpawnBaseline {
    pub reads_at_spawn: u32,
    pub errors_at_spawn: u32,
}

/// Session counters captured once the helper finished.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageOutcome {
    pub reads_after: u32,
    pub errors_after: u32,
    pub task_success: bool,
}

/// Weighted 0-1 effectiveness score with its components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EffectivenessScore {
    pub score: f64,
    pub read_credit: f64,
    pub error_credit: f64,
    pub success_credit: f64,
    pub success: bool,
}

/// Score a helper run from its spawn baseline and outcome.
pub fn score_effectiveness(baseline: &SpawnBaseline, outcome: &UsageOutcome) -> EffectivenessScore {
    let read_credit = if baseline.reads_at_spawn > 0 {
        READ_WEIGHT * reduction(baseline.reads_at_spawn, outcome.reads_after)
    } else {
        NEUTRAL_READ_CREDIT
    };

    let error_credit = if baseline.errors_at_spawn > 0 {
        ERROR_WEIGHT * reduction(baseline.errors_at_spawn, outcome.errors_after)
    } else if outcome.errors_after == 0 {
        ERROR_WEIGHT
    } else {
        0.0
    };

    let success_credit = if outcome.task_success {
        SUCCESS_WEIGHT
    } else {
        0.0
    };

    let score = (read_credit + error_credit + success_credit).clamp(0.0, 1.0);
    EffectivenessScore {
        score,
        read_credit,
        error_credit,
        success_credit,
        success: outcome.task_success && score >= SUCCESS_SCORE,
    }
}

/// `max(0, 1 - after/before)` for a non-zero `before`.
fn reduction(before: u32, after: u32) -> f64 {
    (1.0 - after as f64 / before as f64).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline(reads: u32, errors: u32) -> SpawnBaseline {
        SpawnBaseline {
            reads_at_spawn: reads,
            errors_at_spawn: errors,
        }
    }

    fn outcome(reads: u32, errors: u32, success: bool) -> UsageOutcome {
        UsageOutcome {
            reads_after: reads,
            errors_after: errors,
            task_success: success,
        }
    }

    #[test]
    fn test_zero_baselines_with_success() {
        let s = score_effectiveness(&baseline(0, 0), &outcome(0, 0, true));
        assert!((s.score - 0.8).abs() < 1e-9);
        assert!(s.score >= 0.5);
        assert!(s.success);
    }

    #[test]
    fn test_perfect_helper_scores_one() {
        let s = score_effectiveness(&baseline(10, 4), &outcome(0, 0, true));
        assert!((s.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_reread_scenario() {
        let s = score_effectiveness(&baseline(10, 2), &outcome(1, 0, true));
        // 0.4*0.9 + 0.3 + 0.3
        assert!((s.score - 0.96).abs() < 1e-9);
    }

    #[test]
    fn test_more_activity_after_spawn_gives_no_credit() {
        let s = score_effectiveness(&baseline(2, 1), &outcome(20, 5, false));
        assert_eq!(s.read_credit, 0.0);
        assert_eq!(s.error_credit, 0.0);
        assert_eq!(s.score, 0.0);
        assert!(!s.success);
    }

    #[test]
    fn test_new_errors_without_baseline_lose_error_credit() {
        let s = score_effectiveness(&baseline(0, 0), &outcome(0, 1, true));
        assert!((s.score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_score_always_in_unit_range() {
        for reads in [0u32, 1, 5, 50] {
            for errors in [0u32, 1, 3] {
                for after in [0u32, 2, 100] {
                    for success in [true, false] {
                        let s = score_effectiveness(
                            &baseline(reads, errors),
                            &outcome(after, after, success),
                        );
                        assert!((0.0..=1.0).contains(&s.score));
                    }
                }
            }
        }
    }
}
