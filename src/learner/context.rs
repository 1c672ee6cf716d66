// src/learner/context.rs — Session shape features and nearest-neighbour helper prediction

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::events::event_logger::{extension_of, folder_of, EventKind};
use crate::infra::config::PredictionConfig;
use crate::infra::errors::LearnerError;
use crate::memory::store::{SessionEventRow, Store};

const FOLDER_WEIGHT: f64 = 0.4;
const EXTENSION_WEIGHT: f64 = 0.2;
const ERROR_RATE_WEIGHT: f64 = 0.2;
const LOOP_RATE_WEIGHT: f64 = 0.2;

/// Summary of what a session has been doing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextFeatures {
    /// Edits per folder (first path segment).
    pub folder_activity: BTreeMap<String, u32>,
    /// Edits per lower-cased file extension.
    pub file_types: BTreeMap<String, u32>,
    /// Failed events over all events.
    pub error_rate: f64,
    /// Files read more than once over distinct files read.
    pub loop_rate: f64,
    pub tool_counts: BTreeMap<String, u32>,
}

/// Build features from a session's events, oldest first.
pub fn extract_features(events: &[SessionEventRow]) -> ContextFeatures {
    let mut features = ContextFeatures::default();
    let mut reads: HashMap<&str, u32> = HashMap::new();
    let mut failures = 0u32;

    for event in events {
        *features
            .tool_counts
            .entry(event.tool_name.clone())
            .or_default() += 1;
        if !event.success {
            failures += 1;
        }

        let Some(path) = event.file_path.as_deref() else {
            continue;
        };
        match EventKind::parse(&event.kind) {
            EventKind::Edit => {
                *features.folder_activity.entry(folder_of(path)).or_default() += 1;
                if let Some(ext) = extension_of(path) {
                    *features.file_types.entry(ext).or_default() += 1;
                }
            }
            EventKind::Read => *reads.entry(path).or_default() += 1,
            _ => {}
        }
    }

    if !events.is_empty() {
        features.error_rate = failures as f64 / events.len() as f64;
    }
    if !reads.is_empty() {
        let looped = reads.values().filter(|&&n| n > 1).count();
        features.loop_rate = looped as f64 / reads.len() as f64;
    }
    features
}

/// Weighted blend of folder overlap, extension overlap and rate proximity.
/// Symmetric, in [0, 1].
pub fn compute_similarity(a: &ContextFeatures, b: &ContextFeatures) -> f64 {
    FOLDER_WEIGHT * key_jaccard(&a.folder_activity, &b.folder_activity)
        + EXTENSION_WEIGHT * key_jaccard(&a.file_types, &b.file_types)
        + ERROR_RATE_WEIGHT * rate_proximity(a.error_rate, b.error_rate)
        + LOOP_RATE_WEIGHT * rate_proximity(a.loop_rate, b.loop_rate)
}

fn key_jaccard(a: &BTreeMap<String, u32>, b: &BTreeMap<String, u32>) -> f64 {
    let a: BTreeSet<&String> = a.keys().collect();
    let b: BTreeSet<&String> = b.keys().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

fn rate_proximity(a: f64, b: f64) -> f64 {
    1.0 - (a - b).abs().min(1.0)
}

/// A stored snapshot that resembles the current session.
#[derive(Debug, Clone, Serialize)]
pub struct ContextMatch {
    pub snapshot_id: i64,
    pub agent_name: String,
    pub effectiveness: f64,
    pub similarity: f64,
}

/// A helper suggestion voted for by similar past sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentPrediction {
    pub agent_name: String,
    /// Winning vote normalized by the number of contributing matches.
    pub confidence: f64,
    /// Raw summed vote of the winner.
    pub score: f64,
    pub matches: usize,
}

impl AgentPrediction {
    pub fn is_confident(&self, min_confidence: f64) -> bool {
        self.confidence >= min_confidence
    }
}

pub struct ContextMatcher<'a> {
    store: &'a Store,
    config: PredictionConfig,
}

impl<'a> ContextMatcher<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self::with_config(store, PredictionConfig::default())
    }

    pub fn with_config(store: &'a Store, config: PredictionConfig) -> Self {
        Self { store, config }
    }

    pub fn extract_current_features(&self, session_id: &str) -> Result<ContextFeatures, LearnerError> {
        let events = self.store.query_session_events(session_id)?;
        Ok(extract_features(&events))
    }

    /// Useful snapshots resembling `features`, most similar first.
    pub fn find_similar_contexts(
        &self,
        features: &ContextFeatures,
        limit: usize,
    ) -> Result<Vec<ContextMatch>, LearnerError> {
        let floor = self.config.min_exemplar_effectiveness;
        let mut matches = Vec::new();

        for snapshot in self.store.query_context_snapshots(floor)? {
            if snapshot.effectiveness < floor {
                continue;
            }
            let stored: ContextFeatures = match serde_json::from_str(&snapshot.features) {
                Ok(f) => f,
                Err(e) => {
                    warn!(snapshot = snapshot.id, "skipping unreadable context snapshot: {e}");
                    continue;
                }
            };
            let similarity = compute_similarity(features, &stored);
            if similarity >= self.config.min_similarity {
                matches.push(ContextMatch {
                    snapshot_id: snapshot.id,
                    agent_name: snapshot.agent_name,
                    effectiveness: snapshot.effectiveness,
                    similarity,
                });
            }
        }

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit);
        Ok(matches)
    }

    /// Vote among similar past sessions for the helper to suggest now.
    ///
    /// Returns `None` when nothing matches or the winning vote is too weak.
    /// The confidence gate is left to the caller.
    pub fn predict_agent(&self, session_id: &str) -> Result<Option<AgentPrediction>, LearnerError> {
        let features = self.extract_current_features(session_id)?;
        let matches = self.find_similar_contexts(&features, self.config.max_matches)?;
        if matches.is_empty() {
            return Ok(None);
        }

        let mut votes: BTreeMap<&str, f64> = BTreeMap::new();
        for m in &matches {
            *votes.entry(m.agent_name.as_str()).or_default() += m.similarity * m.effectiveness;
        }

        let mut winner: Option<(&str, f64)> = None;
        for (name, score) in votes {
            if winner.map_or(true, |(_, best)| score > best) {
                winner = Some((name, score));
            }
        }
        let Some((agent_name, score)) = winner else {
            return Ok(None);
        };

        if score < self.config.min_vote {
            debug!(agent = agent_name, score, "prediction vote too weak");
            return Ok(None);
        }

        Ok(Some(AgentPrediction {
            agent_name: agent_name.to_string(),
            confidence: score / matches.len() as f64,
            score,
            matches: matches.len(),
        }))
    }

    /// Label the session's current shape with a helper that proved useful.
    pub fn record_useful_agent(
        &self,
        session_id: &str,
        agent_name: &str,
        effectiveness: f64,
    ) -> Result<i64, LearnerError> {
        let features = self.extract_current_features(session_id)?;
        let json = serde_json::to_string(&features)?;
        let id = self
            .store
            .insert_context_snapshot(Some(session_id), &json, agent_name, effectiveness)?;
        debug!(session = session_id, agent = agent_name, effectiveness, "context snapshot recorded");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventLogger, SessionEvent};
    use crate::memory::MemoryManager;

    fn features(folders: &[&str], exts: &[&str], error_rate: f64, loop_rate: f64) -> ContextFeatures {
        ContextFeatures {
            folder_activity: folders.iter().map(|f| (f.to_string(), 1)).collect(),
            file_types: exts.iter().map(|e| (e.to_string(), 1)).collect(),
            error_rate,
            loop_rate,
            tool_counts: BTreeMap::new(),
        }
    }

    #[test]
    fn test_distinct_reads_have_zero_loop_rate() {
        let mm = MemoryManager::in_memory().unwrap();
        let logger = EventLogger::new(&mm.store);
        for f in ["src/a.rs", "src/b.rs", "tests/c.rs", "README.md"] {
            logger.log(&SessionEvent::new("s1", "Read").with_file(f)).unwrap();
        }
        logger.log(&SessionEvent::new("s1", "Edit").with_file("src/a.rs")).unwrap();
        logger.log(&SessionEvent::new("s1", "Edit").with_file("src/b.rs")).unwrap();

        let f = ContextMatcher::new(&mm.store).extract_current_features("s1").unwrap();
        assert_eq!(f.loop_rate, 0.0);
        assert_eq!(f.error_rate, 0.0);
        assert_eq!(f.folder_activity.get("src"), Some(&2));
        assert_eq!(f.file_types.get("rs"), Some(&2));
        assert_eq!(f.tool_counts.get("Read"), Some(&4));
    }

    #[test]
    fn test_loop_and_error_rates() {
        let mm = MemoryManager::in_memory().unwrap();
        let logger = EventLogger::new(&mm.store);
        logger.log(&SessionEvent::new("s1", "Read").with_file("a.rs")).unwrap();
        logger.log(&SessionEvent::new("s1", "Read").with_file("a.rs")).unwrap();
        logger.log(&SessionEvent::new("s1", "Read").with_file("b.rs")).unwrap();
        logger.log(&SessionEvent::new("s1", "Bash").failed("exit 2")).unwrap();

        let f = ContextMatcher::new(&mm.store).extract_current_features("s1").unwrap();
        assert!((f.loop_rate - 0.5).abs() < 1e-9);
        assert!((f.error_rate - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_empty_session_features() {
        let f = extract_features(&[]);
        assert_eq!(f, ContextFeatures::default());
    }

    #[test]
    fn test_similarity_weights() {
        let a = features(&["src"], &["rs"], 0.0, 0.0);
        assert!((compute_similarity(&a, &a) - 1.0).abs() < 1e-9);

        let b = features(&["docs"], &["md"], 1.0, 1.0);
        assert_eq!(compute_similarity(&a, &b), 0.0);

        let c = features(&["src", "tests"], &["rs"], 0.5, 0.0);
        // 0.4*0.5 + 0.2*1 + 0.2*0.5 + 0.2*1
        assert!((compute_similarity(&a, &c) - 0.7).abs() < 1e-9);
        assert!((compute_similarity(&c, &a) - compute_similarity(&a, &c)).abs() < 1e-12);
    }

    #[test]
    fn test_low_effectiveness_snapshots_never_match() {
        let mm = MemoryManager::in_memory().unwrap();
        let json = serde_json::to_string(&features(&["src"], &["rs"], 0.0, 0.0)).unwrap();
        mm.store.insert_context_snapshot(None, &json, "weak", 0.39).unwrap();
        mm.store.insert_context_snapshot(None, &json, "strong", 0.8).unwrap();

        let matcher = ContextMatcher::new(&mm.store);
        let found = matcher
            .find_similar_contexts(&features(&["src"], &["rs"], 0.0, 0.0), 10)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].agent_name, "strong");
        assert!(found.iter().all(|m| m.effectiveness >= 0.4));
    }

    #[test]
    fn test_predict_agent_votes() {
        let mm = MemoryManager::in_memory().unwrap();
        let logger = EventLogger::new(&mm.store);
        logger.log(&SessionEvent::new("past", "Edit").with_file("src/a.rs")).unwrap();
        logger.log(&SessionEvent::new("now", "Edit").with_file("src/b.rs")).unwrap();

        let matcher = ContextMatcher::new(&mm.store);
        matcher.record_useful_agent("past", "quality-guard", 0.9).unwrap();
        matcher.record_useful_agent("past", "quality-guard", 0.9).unwrap();
        matcher.record_useful_agent("past", "regression-fixer", 0.5).unwrap();

        let p = matcher.predict_agent("now").unwrap().unwrap();
        assert_eq!(p.agent_name, "quality-guard");
        assert_eq!(p.matches, 3);
        assert!((p.score - 1.8).abs() < 1e-9);
        assert!((p.confidence - 0.6).abs() < 1e-9);
        assert!(p.is_confident(0.4));
    }

    #[test]
    fn test_predict_without_snapshots() {
        let mm = MemoryManager::in_memory().unwrap();
        let matcher = ContextMatcher::new(&mm.store);
        assert!(matcher.predict_agent("s1").unwrap().is_none());
    }
}
