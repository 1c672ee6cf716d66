// src/learner/usage.rs — Helper invocation lifecycle (spawn → complete)

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::effectiveness::{score_effectiveness, EffectivenessScore, SpawnBaseline, UsageOutcome};
use crate::events::EventKind;
use crate::infra::errors::LearnerError;
use crate::memory::store::{AgentUsageRow, Store};

/// A helper invocation whose outcome has been scored.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedUsage {
    pub id: String,
    pub session_id: String,
    pub agent_name: String,
    pub agent_type: String,
    pub baseline: SpawnBaseline,
    pub outcome: UsageOutcome,
    pub effectiveness: EffectivenessScore,
}

/// Opens and closes agent usage records against the event log.
///
/// Baselines are the session's read and failure counts at spawn; outcomes
/// are the counts logged after the spawn.
pub struct UsageTracker<'a> {
    store: &'a Store,
}

impl<'a> UsageTracker<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Open a usage record and return its correlation id.
    ///
    /// At most one record per (session, type) may be open; a second spawn
    /// of the same type fails with `UsageAlreadyOpen`.
    pub fn spawn(
        &self,
        session_id: &str,
        agent_name: &str,
        agent_type: &str,
        trigger_context: Option<&str>,
    ) -> Result<String, LearnerError> {
        if self
            .store
            .latest_open_usage(session_id, Some(agent_type))?
            .is_some()
        {
            return Err(LearnerError::UsageAlreadyOpen {
                session_id: session_id.to_string(),
                agent_type: agent_type.to_string(),
            });
        }

        let reads = self
            .store
            .count_events(session_id, Some(EventKind::Read.as_str()), 0)?;
        let errors = self.store.count_failed_events(session_id, 0)?;
        let watermark = self.store.max_event_id()?;

        let id = Uuid::new_v4().to_string();
        self.store.insert_agent_usage(
            &id,
            session_id,
            agent_name,
            agent_type,
            trigger_context,
            reads,
            errors,
            watermark,
        )?;

        info!(
            usage = %id,
            agent = agent_name,
            agent_type,
            reads_at_spawn = reads,
            errors_at_spawn = errors,
            "agent usage opened"
        );
        Ok(id)
    }

    /// Close a usage by id, scoring it exactly once.
    pub fn complete(&self, usage_id: &str, task_success: bool) -> Result<CompletedUsage, LearnerError> {
        let row = self
            .store
            .get_agent_usage(usage_id)?
            .ok_or_else(|| LearnerError::UsageNotFound {
                id: usage_id.to_string(),
            })?;
        if row.completed_at.is_some() {
            return Err(LearnerError::UsageAlreadyCompleted {
                id: usage_id.to_string(),
            });
        }
        self.finish(row, task_success)
    }

    /// Close the most recent open usage of a session, narrowed to one type
    /// when the caller knows it. Returns `None` when nothing is open.
    pub fn complete_latest(
        &self,
        session_id: &str,
        agent_type: Option<&str>,
        task_success: bool,
    ) -> Result<Option<CompletedUsage>, LearnerError> {
        match self.store.latest_open_usage(session_id, agent_type)? {
            Some(row) => self.finish(row, task_success).map(Some),
            None => {
                debug!(session = session_id, "no open agent usage to complete");
                Ok(None)
            }
        }
    }

    fn finish(&self, row: AgentUsageRow, task_success: bool) -> Result<CompletedUsage, LearnerError> {
        let reads_after = self.store.count_events(
            &row.session_id,
            Some(EventKind::Read.as_str()),
            row.event_watermark,
        )?;
        let errors_after = self
            .store
            .count_failed_events(&row.session_id, row.event_watermark)?;

        let baseline = SpawnBaseline {
            reads_at_spawn: row.reads_at_spawn,
            errors_at_spawn: row.errors_at_spawn,
        };
        let outcome = UsageOutcome {
            reads_after,
            errors_after,
            task_success,
        };
        let effectiveness = score_effectiveness(&baseline, &outcome);

        let written = self.store.complete_agent_usage(
            &row.id,
            task_success,
            reads_after,
            errors_after,
            effectiveness.score,
        )?;
        if !written {
            // Another process closed it between our read and write
            return Err(LearnerError::UsageAlreadyCompleted { id: row.id });
        }

        info!(
            usage = %row.id,
            agent = %row.agent_name,
            effectiveness = effectiveness.score,
            "agent usage completed"
        );
        Ok(CompletedUsage {
            id: row.id,
            session_id: row.session_id,
            agent_name: row.agent_name,
            agent_type: row.agent_type,
            baseline,
            outcome,
            effectiveness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventLogger, SessionEvent};
    use crate::memory::MemoryManager;

    #[test]
    fn test_spawn_complete_measures_delta() {
        let mm = MemoryManager::in_memory().unwrap();
        let logger = EventLogger::new(&mm.store);
        let tracker = UsageTracker::new(&mm.store);

        for _ in 0..4 {
            logger.log(&SessionEvent::new("s1", "Read").with_file("a.rs")).unwrap();
        }
        logger.log(&SessionEvent::new("s1", "Bash").failed("boom")).unwrap();

        let id = tracker
            .spawn("s1", "reader", "re-read-detector", Some("a.rs read 4x"))
            .unwrap();
        logger.log(&SessionEvent::new("s1", "Read").with_file("b.rs")).unwrap();

        let done = tracker.complete(&id, true).unwrap();
        assert_eq!(done.baseline.reads_at_spawn, 4);
        assert_eq!(done.baseline.errors_at_spawn, 1);
        assert_eq!(done.outcome.reads_after, 1);
        assert_eq!(done.outcome.errors_after, 0);
        // 0.4*0.75 + 0.3 + 0.3
        assert!((done.effectiveness.score - 0.9).abs() < 1e-9);

        let err = tracker.complete(&id, true).unwrap_err();
        assert!(matches!(err, LearnerError::UsageAlreadyCompleted { .. }));
    }

    #[test]
    fn test_one_open_record_per_type() {
        let mm = MemoryManager::in_memory().unwrap();
        let tracker = UsageTracker::new(&mm.store);

        tracker.spawn("s1", "a", "quality-guard", None).unwrap();
        let err = tracker.spawn("s1", "b", "quality-guard", None).unwrap_err();
        assert!(matches!(err, LearnerError::UsageAlreadyOpen { .. }));

        // A different type, or another session, may be open concurrently
        tracker.spawn("s1", "c", "regression-fixer", None).unwrap();
        tracker.spawn("s2", "a", "quality-guard", None).unwrap();
    }

    #[test]
    fn test_complete_latest_by_type() {
        let mm = MemoryManager::in_memory().unwrap();
        let tracker = UsageTracker::new(&mm.store);

        let guard = tracker.spawn("s1", "guard", "quality-guard", None).unwrap();
        let fixer = tracker.spawn("s1", "fixer", "regression-fixer", None).unwrap();

        let done = tracker
            .complete_latest("s1", Some("quality-guard"), true)
            .unwrap()
            .unwrap();
        assert_eq!(done.id, guard);

        let done = tracker.complete_latest("s1", None, false).unwrap().unwrap();
        assert_eq!(done.id, fixer);

        assert!(tracker.complete_latest("s1", None, true).unwrap().is_none());
    }

    #[test]
    fn test_complete_unknown_usage() {
        let mm = MemoryManager::in_memory().unwrap();
        let tracker = UsageTracker::new(&mm.store);
        let err = tracker.complete("nope", true).unwrap_err();
        assert!(matches!(err, LearnerError::UsageNotFound { .. }));
    }
}
