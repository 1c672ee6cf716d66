// src/patterns/clusterer.rs — Groups repeated failures into patterns

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::normalizer::{extract_keywords, jaccard, normalize_error, ErrorCategory, NormalizedError};
use crate::infra::errors::LearnerError;
use crate::memory::store::{ErrorPatternRow, Store};

/// Default Jaccard score at or below which candidates are not similar.
pub const SIMILARITY_FLOOR: f64 = 0.3;

/// A recurring class of failures.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPattern {
    /// Keyword-set fingerprint.
    pub id: String,
    pub normalized_text: String,
    pub keywords: Vec<String>,
    pub category: Option<ErrorCategory>,
    pub occurrence_count: u32,
    pub fix_count: u32,
    pub fix_success_rate: f64,
    pub suggested_agent: Option<String>,
    pub last_seen: String,
}

impl From<ErrorPatternRow> for ErrorPattern {
    fn from(row: ErrorPatternRow) -> Self {
        Self {
            keywords: row
                .keywords
                .split('|')
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect(),
            category: row.category.as_deref().and_then(ErrorCategory::parse),
            id: row.id,
            normalized_text: row.normalized_text,
            occurrence_count: row.occurrence_count.max(0) as u32,
            fix_count: row.fix_count.max(0) as u32,
            fix_success_rate: row.fix_success_rate,
            suggested_agent: row.suggested_agent,
            last_seen: row.last_seen,
        }
    }
}

/// Where a failure was observed.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext<'a> {
    pub session_id: Option<&'a str>,
    /// Tool or command that produced the failure.
    pub source: Option<&'a str>,
}

/// Outcome of observing one failure.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedError {
    pub pattern_id: String,
    pub instance_id: String,
    pub normalized: NormalizedError,
    pub occurrence_count: u32,
    pub is_new_pattern: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FixOutcome {
    Recorded {
        pattern_id: String,
        fix_success_rate: f64,
    },
    /// The instance had already been marked fixed; nothing changed.
    AlreadyFixed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarError {
    pub pattern: ErrorPattern,
    pub similarity: f64,
}

/// Per-category roll-up of error patterns.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategorySummary {
    pub category: String,
    pub pattern_count: u32,
    pub occurrences: u32,
    pub fixes: u32,
}

impl CategorySummary {
    pub fn fix_rate(&self) -> f64 {
        if self.occurrences == 0 {
            0.0
        } else {
            self.fixes as f64 / self.occurrences as f64
        }
    }
}

pub struct ErrorClusterer<'a> {
    store: &'a Store,
    similarity_floor: f64,
}

impl<'a> ErrorClusterer<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            similarity_floor: SIMILARITY_FLOOR,
        }
    }

    pub fn with_similarity_floor(mut self, floor: f64) -> Self {
        self.similarity_floor = floor;
        self
    }

    /// Find-or-create the pattern for a failure and log an instance of it.
    pub fn process_error(
        &self,
        raw: &str,
        ctx: &ErrorContext<'_>,
    ) -> Result<ProcessedError, LearnerError> {
        let normalized = normalize_error(raw);
        let suggested = normalized.category.map(|c| c.suggested_agent());

        self.store.upsert_error_pattern(
            &normalized.hash,
            &normalized.normalized,
            &normalized.keywords.join("|"),
            normalized.category.map(|c| c.as_str()),
            suggested,
        )?;

        let occurrence_count = self
            .store
            .get_error_pattern(&normalized.hash)?
            .map(|p| p.occurrence_count.max(0) as u32)
            .unwrap_or(1);
        let is_new_pattern = occurrence_count <= 1;

        let instance_id = Uuid::new_v4().to_string();
        self.store.insert_error_instance(
            &instance_id,
            &normalized.hash,
            ctx.session_id,
            ctx.source,
            raw,
            normalized.file_path.as_deref(),
        )?;

        if is_new_pattern {
            info!(
                pattern = %normalized.hash,
                category = normalized.category_label(),
                "new error pattern"
            );
        } else {
            debug!(pattern = %normalized.hash, occurrence_count, "error pattern repeated");
        }

        Ok(ProcessedError {
            pattern_id: normalized.hash.clone(),
            instance_id,
            normalized,
            occurrence_count,
            is_new_pattern,
        })
    }

    /// Mark an instance fixed and credit the fix to its pattern.
    pub fn record_fix(
        &self,
        instance_id: &str,
        agent_name: Option<&str>,
    ) -> Result<FixOutcome, LearnerError> {
        let instance = self
            .store
            .get_error_instance(instance_id)?
            .ok_or_else(|| LearnerError::InstanceNotFound {
                id: instance_id.to_string(),
            })?;

        if !self.store.mark_instance_fixed(instance_id, agent_name)? {
            return Ok(FixOutcome::AlreadyFixed);
        }
        self.store.record_pattern_fix(&instance.pattern_id, agent_name)?;

        let fix_success_rate = self
            .store
            .get_error_pattern(&instance.pattern_id)?
            .map(|p| p.fix_success_rate)
            .unwrap_or(0.0);

        info!(
            pattern = %instance.pattern_id,
            agent = agent_name.unwrap_or("-"),
            fix_success_rate,
            "error fixed"
        );
        Ok(FixOutcome::Recorded {
            pattern_id: instance.pattern_id,
            fix_success_rate,
        })
    }

    pub fn top_patterns(&self, limit: u32) -> Result<Vec<ErrorPattern>, LearnerError> {
        Ok(self
            .store
            .query_top_error_patterns(limit)?
            .into_iter()
            .map(ErrorPattern::from)
            .collect())
    }

    /// Best previously-fixed pattern resembling `target`, searched among the
    /// `limit` most frequent patterns.
    pub fn suggest_known_fix(
        &self,
        target: &NormalizedError,
        limit: u32,
    ) -> Result<Option<SimilarError>, LearnerError> {
        let fixed: Vec<ErrorPattern> = self
            .top_patterns(limit)?
            .into_iter()
            .filter(|p| p.fix_count > 0)
            .collect();
        Ok(find_similar_errors(target, &fixed, self.similarity_floor)
            .into_iter()
            .next())
    }
}

/// Candidates whose recomputed keywords overlap the target's by more than
/// `floor`, most similar first.
pub fn find_similar_errors(
    target: &NormalizedError,
    candidates: &[ErrorPattern],
    floor: f64,
) -> Vec<SimilarError> {
    let mut similar: Vec<SimilarError> = candidates
        .iter()
        .filter_map(|candidate| {
            let keywords = extract_keywords(&candidate.normalized_text);
            let similarity = jaccard(&target.keywords, &keywords);
            (similarity > floor).then(|| SimilarError {
                pattern: candidate.clone(),
                similarity,
            })
        })
        .collect();

    similar.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    similar
}

/// Roll patterns up by category, busiest first.
pub fn summarize_by_category(patterns: &[ErrorPattern]) -> Vec<CategorySummary> {
    let mut groups: BTreeMap<String, CategorySummary> = BTreeMap::new();
    for p in patterns {
        let label = p
            .category
            .map(|c| c.as_str().to_string())
            .unwrap_or_else(|| super::normalizer::UNCATEGORIZED.to_string());
        let entry = groups.entry(label.clone()).or_insert_with(|| CategorySummary {
            category: label,
            pattern_count: 0,
            occurrences: 0,
            fixes: 0,
        });
        entry.pattern_count += 1;
        entry.occurrences += p.occurrence_count;
        entry.fixes += p.fix_count;
    }

    let mut summaries: Vec<CategorySummary> = groups.into_values().collect();
    summaries.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryManager;

    fn pattern(text: &str, occurrences: u32, fixes: u32) -> ErrorPattern {
        let n = normalize_error(text);
        ErrorPattern {
            id: n.hash,
            normalized_text: n.normalized,
            keywords: n.keywords,
            category: n.category,
            occurrence_count: occurrences,
            fix_count: fixes,
            fix_success_rate: fixes as f64 / occurrences as f64,
            suggested_agent: None,
            last_seen: String::new(),
        }
    }

    #[test]
    fn test_process_same_error_twice() {
        let mm = MemoryManager::in_memory().unwrap();
        let clusterer = ErrorClusterer::new(&mm.store);
        let ctx = ErrorContext::default();

        let first = clusterer.process_error("Cannot find module 'lodash'", &ctx).unwrap();
        assert!(first.is_new_pattern);
        assert_eq!(first.occurrence_count, 1);

        let second = clusterer.process_error("Cannot find module 'react'", &ctx).unwrap();
        assert!(!second.is_new_pattern);
        assert_eq!(second.pattern_id, first.pattern_id);
        assert_eq!(second.occurrence_count, 2);
        assert_ne!(second.instance_id, first.instance_id);
        assert_eq!(mm.store.count_error_patterns().unwrap(), 1);
    }

    #[test]
    fn test_record_fix_updates_rate_once() {
        let mm = MemoryManager::in_memory().unwrap();
        let clusterer = ErrorClusterer::new(&mm.store);
        let ctx = ErrorContext::default();

        let a = clusterer.process_error("Unexpected token ';'", &ctx).unwrap();
        clusterer.process_error("Unexpected token '}'", &ctx).unwrap();

        let outcome = clusterer.record_fix(&a.instance_id, Some("language-specialist")).unwrap();
        assert_eq!(
            outcome,
            FixOutcome::Recorded {
                pattern_id: a.pattern_id.clone(),
                fix_success_rate: 0.5,
            }
        );
        assert_eq!(
            clusterer.record_fix(&a.instance_id, None).unwrap(),
            FixOutcome::AlreadyFixed
        );

        let stored = clusterer.top_patterns(10).unwrap();
        assert_eq!(stored[0].fix_count, 1);
        assert_eq!(stored[0].suggested_agent.as_deref(), Some("language-specialist"));
    }

    #[test]
    fn test_record_fix_unknown_instance() {
        let mm = MemoryManager::in_memory().unwrap();
        let clusterer = ErrorClusterer::new(&mm.store);
        let err = clusterer.record_fix("missing", None).unwrap_err();
        assert!(matches!(err, LearnerError::InstanceNotFound { .. }));
    }

    #[test]
    fn test_find_similar_errors_filters_and_sorts() {
        let target = normalize_error("Cannot find module 'x'");
        let candidates = vec![
            pattern("Cannot find name 'y'", 3, 1),
            pattern("Cannot find module 'z'", 5, 2),
            pattern("Unexpected token", 2, 0),
        ];
        let similar = find_similar_errors(&target, &candidates, SIMILARITY_FLOOR);
        assert_eq!(similar.len(), 2);
        assert!((similar[0].similarity - 1.0).abs() < 1e-9);
        assert!((similar[1].similarity - 2.0 / 3.0).abs() < 1e-9);

        let strict = find_similar_errors(&target, &candidates, 0.9);
        assert_eq!(strict.len(), 1);
    }

    #[test]
    fn test_summarize_by_category() {
        let patterns = vec![
            pattern("Cannot find module 'a'", 4, 1),
            pattern("Module not found: cannot resolve 'b'", 2, 1),
            pattern("something odd happened", 1, 0),
        ];
        let summary = summarize_by_category(&patterns);
        assert_eq!(summary[0].category, "import-resolution");
        assert_eq!(summary[0].pattern_count, 2);
        assert_eq!(summary[0].occurrences, 6);
        assert!((summary[0].fix_rate() - 2.0 / 6.0).abs() < 1e-9);
        assert_eq!(summary[1].category, "uncategorized");
    }
}
