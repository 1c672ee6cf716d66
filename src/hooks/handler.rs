// src/hooks/handler.rs — Dispatches host lifecycle events to the learning core
//
// Every entry point degrades to a plain approve: a broken store must never
// stall the host. Failures are logged and the learning step is skipped.

use tracing::{debug, info, warn};

use super::alerts::AlertCache;
use super::types::{HookEvent, HookInput, HookOutput};
use crate::events::event_logger::{extension_of, folder_of};
use crate::events::{EventKind, EventLogger, SessionEfficiency, SessionEvent};
use crate::infra::config::Config;
use crate::infra::errors::LearnerError;
use crate::learner::context::extract_features;
use crate::learner::{AdjustmentOutcome, ContextMatcher, ThresholdManager, UsageTracker};
use crate::memory::store::Store;
use crate::patterns::{ErrorClusterer, ErrorContext};

const REREAD: &str = "re-read-detector";
const RECURRING: &str = "recurring-failure-detector";
const WIDE_ACTIVITY: &str = "wide-activity-detector";
const LANGUAGE: &str = "language-specialist";
const REGRESSION: &str = "regression-fixer";

/// Command fragments that mark a shell run as a verification check.
const CHECK_MARKERS: &[&str] = &["test", "check", "lint", "clippy", "tsc", "build", "pytest"];

pub struct HookHandler<'a> {
    store: &'a Store,
    config: &'a Config,
}

impl<'a> HookHandler<'a> {
    pub fn new(store: &'a Store, config: &'a Config) -> Self {
        Self { store, config }
    }

    /// Handle one host invocation. Never fails.
    pub fn handle(&self, input: &HookInput, alerts: &mut AlertCache) -> HookOutput {
        match self.dispatch(input, alerts) {
            Ok(output) => output,
            Err(e) if e.is_store_failure() => {
                warn!(
                    event = input.hook_event_name.as_str(),
                    session = %input.session_id,
                    "learning store unavailable, skipping: {e}"
                );
                HookOutput::approve()
            }
            Err(e) => {
                warn!(
                    event = input.hook_event_name.as_str(),
                    session = %input.session_id,
                    "learning skipped: {e}"
                );
                HookOutput::approve()
            }
        }
    }

    fn dispatch(&self, input: &HookInput, alerts: &mut AlertCache) -> Result<HookOutput, LearnerError> {
        match input.hook_event_name {
            HookEvent::SessionStart => {
                alerts.clear();
                debug!(session = %input.session_id, "alert cache cleared");
                Ok(HookOutput::approve())
            }
            HookEvent::PreToolUse => self.pre_tool_use(input, alerts),
            HookEvent::PostToolUse => self.post_tool_use(input, alerts),
            HookEvent::UserPromptSubmit => self.prompt_submitted(input, alerts),
            HookEvent::Stop => self.stop(input),
            HookEvent::Other => Ok(HookOutput::approve()),
        }
    }

    fn thresholds(&self) -> ThresholdManager<'a> {
        ThresholdManager::from_config(self.store, self.config)
    }

    fn pre_tool_use(&self, input: &HookInput, alerts: &mut AlertCache) -> Result<HookOutput, LearnerError> {
        let session = input.session_id.as_str();
        match EventKind::from_tool(input.tool()) {
            EventKind::Agent => {
                let name = input.agent_name().unwrap_or(input.tool());
                let agent_type = self.config.agent_type_for(name);
                let trigger = input.input_str("description");
                match UsageTracker::new(self.store).spawn(session, name, &agent_type, trigger) {
                    Ok(_) => {}
                    Err(LearnerError::UsageAlreadyOpen { .. }) => {
                        debug!(session, agent_type = %agent_type, "usage already open");
                    }
                    Err(e) => return Err(e),
                }
                Ok(HookOutput::approve())
            }
            EventKind::Read => {
                let Some(path) = input.project_file_path() else {
                    return Ok(HookOutput::approve());
                };
                let reads = EventLogger::new(self.store).read_count(session, &path)?;
                let threshold = self.thresholds().current_value(REREAD)?;
                if (reads as f64) < threshold {
                    return Ok(HookOutput::approve());
                }

                if self.config.alerts.block_rereads && reads as f64 >= 2.0 * threshold {
                    return Ok(HookOutput::block(format!(
                        "{path} has already been read {reads} times this session; \
                         use the {REREAD} helper to summarize it instead"
                    )));
                }
                if alerts.check_and_record(&format!("{REREAD}:{path}")) {
                    return Ok(HookOutput::approve_with(format!(
                        "{path} has been read {reads} times this session; \
                         consider the {REREAD} helper"
                    )));
                }
                Ok(HookOutput::approve())
            }
            _ => Ok(HookOutput::approve()),
        }
    }

    fn post_tool_use(&self, input: &HookInput, alerts: &mut AlertCache) -> Result<HookOutput, LearnerError> {
        let session = input.session_id.as_str();
        let tool = input.tool();
        let kind = EventKind::from_tool(tool);
        let failure = input.failure();
        let logger = EventLogger::new(self.store);

        let mut event = SessionEvent::new(session, tool);
        let path = input.project_file_path();
        if let Some(ref path) = path {
            event = event.with_file(path.as_str());
        }
        if let Some(ref text) = failure {
            event = event.failed(text.clone());
        }
        logger.log(&event)?;

        let mut messages = Vec::new();

        if let Some(command) = input.command().filter(|_| kind == EventKind::Command) {
            if is_check_command(command) {
                logger.record_check(session, command, failure.is_none())?;
                if logger.check_regressed(session, command)?
                    && alerts.check_and_record(&format!("{REGRESSION}:{command}"))
                {
                    messages.push(format!(
                        "`{command}` passed earlier in this session and fails now; \
                         consider the {REGRESSION} helper"
                    ));
                }
            }
        }

        match failure {
            Some(ref text) => self.on_failure(input, text, alerts, &mut messages)?,
            None => {
                if let Some(command) = input.command().filter(|_| kind == EventKind::Command) {
                    self.on_command_success(session, command)?;
                }
            }
        }

        match kind {
            EventKind::Edit => {
                if let Some(ref path) = path {
                    self.on_edit(session, path, alerts, &mut messages)?;
                }
            }
            EventKind::Agent => self.on_agent_done(input, failure.is_none())?,
            _ => {}
        }

        Ok(HookOutput::from_messages(messages))
    }

    fn on_failure(
        &self,
        input: &HookInput,
        text: &str,
        alerts: &mut AlertCache,
        messages: &mut Vec<String>,
    ) -> Result<(), LearnerError> {
        let clusterer = ErrorClusterer::new(self.store)
            .with_similarity_floor(self.config.clustering.similarity_threshold);
        let ctx = ErrorContext {
            session_id: Some(input.session_id.as_str()),
            source: input.command().or(input.tool_name.as_deref()),
        };
        let processed = clusterer.process_error(text, &ctx)?;

        if let Some(similar) =
            clusterer.suggest_known_fix(&processed.normalized, self.config.clustering.top_patterns)?
        {
            if alerts.check_and_record(&format!("known-fix:{}", similar.pattern.id)) {
                let by = similar
                    .pattern
                    .suggested_agent
                    .as_deref()
                    .map(|a| format!(" with the {a} helper"))
                    .unwrap_or_default();
                messages.push(format!(
                    "A similar error was fixed before{by}: {} ({:.0}% fix rate)",
                    similar.pattern.normalized_text,
                    similar.pattern.fix_success_rate * 100.0
                ));
            }
        }

        let threshold = self.thresholds().current_value(RECURRING)?;
        if processed.occurrence_count as f64 >= threshold
            && alerts.check_and_record(&format!("{RECURRING}:{}", processed.pattern_id))
        {
            let helper = processed
                .normalized
                .category
                .map(|c| c.suggested_agent())
                .unwrap_or(RECURRING);
            messages.push(format!(
                "This {} error has occurred {} times; consider the {helper} helper",
                processed.normalized.category_label(),
                processed.occurrence_count
            ));
        }
        Ok(())
    }

    /// A command that failed earlier now succeeds: its open instances are fixed.
    fn on_command_success(&self, session: &str, command: &str) -> Result<(), LearnerError> {
        let open = self.store.query_unfixed_instances(session, Some(command))?;
        if open.is_empty() {
            return Ok(());
        }
        let fixer = self
            .store
            .latest_completed_usage(session)?
            .map(|u| u.agent_name);
        let clusterer = ErrorClusterer::new(self.store);
        for instance in &open {
            clusterer.record_fix(&instance.id, fixer.as_deref())?;
        }
        info!(session, command, fixed = open.len(), "errors resolved");
        Ok(())
    }

    fn on_edit(
        &self,
        session: &str,
        path: &str,
        alerts: &mut AlertCache,
        messages: &mut Vec<String>,
    ) -> Result<(), LearnerError> {
        let thresholds = self.thresholds();

        let folder = folder_of(path);
        let edits = EventLogger::new(self.store)
            .folder_edit_counts(session)?
            .get(&folder)
            .copied()
            .unwrap_or(0);
        if edits as f64 >= thresholds.current_value(WIDE_ACTIVITY)?
            && alerts.check_and_record(&format!("{WIDE_ACTIVITY}:{folder}"))
        {
            messages.push(format!(
                "{edits} edits in {folder}/ this session; consider the {WIDE_ACTIVITY} helper"
            ));
        }

        if let Some(ext) = extension_of(path) {
            let features = extract_features(&self.store.query_session_events(session)?);
            let edits = features.file_types.get(&ext).copied().unwrap_or(0);
            if edits as f64 >= thresholds.current_value(LANGUAGE)?
                && alerts.check_and_record(&format!("{LANGUAGE}:{ext}"))
            {
                messages.push(format!(
                    "{edits} .{ext} edits this session; consider the {LANGUAGE} helper"
                ));
            }
        }
        Ok(())
    }

    fn on_agent_done(&self, input: &HookInput, task_success: bool) -> Result<(), LearnerError> {
        let session = input.session_id.as_str();
        let name = input.agent_name().unwrap_or(input.tool());
        let agent_type = self.config.agent_type_for(name);

        let Some(done) =
            UsageTracker::new(self.store).complete_latest(session, Some(&agent_type), task_success)?
        else {
            return Ok(());
        };

        ContextMatcher::with_config(self.store, self.config.prediction.clone()).record_useful_agent(
            session,
            &done.agent_name,
            done.effectiveness.score,
        )?;

        let outcome = self
            .thresholds()
            .adjust_threshold(&agent_type, self.config.learning.window_days)?;
        if let AdjustmentOutcome::NotPersisted { error, .. } = outcome {
            warn!(agent_type = %agent_type, "threshold not saved: {error}");
        }
        Ok(())
    }

    fn prompt_submitted(&self, input: &HookInput, alerts: &mut AlertCache) -> Result<HookOutput, LearnerError> {
        let matcher = ContextMatcher::with_config(self.store, self.config.prediction.clone());
        let Some(prediction) = matcher.predict_agent(&input.session_id)? else {
            return Ok(HookOutput::approve());
        };
        if !prediction.is_confident(self.config.prediction.min_confidence)
            || !alerts.check_and_record(&format!("prediction:{}", prediction.agent_name))
        {
            return Ok(HookOutput::approve());
        }
        Ok(HookOutput::from_messages(vec![format!(
            "Sessions like this one were helped by the {} helper (confidence {:.2})",
            prediction.agent_name, prediction.confidence
        )]))
    }

    fn stop(&self, input: &HookInput) -> Result<HookOutput, LearnerError> {
        let efficiency = SessionEfficiency::compute(self.store, &input.session_id)?;
        let outcomes = self.thresholds().adjust_for_efficiency(efficiency.score)?;
        let changed = outcomes
            .iter()
            .filter(|(_, o)| o.is_persisted())
            .count();
        info!(
            session = %input.session_id,
            score = efficiency.score,
            changed,
            "session efficiency applied"
        );
        Ok(HookOutput::approve())
    }
}

fn is_check_command(command: &str) -> bool {
    let lower = command.to_lowercase();
    CHECK_MARKERS.iter().any(|m| lower.contains(m))
}
