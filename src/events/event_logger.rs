// src/events/event_logger.rs — Session activity recording

use std::collections::BTreeMap;

use crate::memory::store::{SessionEventRow, Store};

/// Records tool activity for a session and answers the count queries the
/// learning components need.
pub struct EventLogger<'a> {
    store: &'a Store,
}

/// Coarse classification of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Read,
    Edit,
    Search,
    Command,
    Agent,
    Other,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Edit => "edit",
            Self::Search => "search",
            Self::Command => "command",
            Self::Agent => "agent",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "read" => Self::Read,
            "edit" => Self::Edit,
            "search" => Self::Search,
            "command" => Self::Command,
            "agent" => Self::Agent,
            _ => Self::Other,
        }
    }

    /// Classify a host tool name.
    pub fn from_tool(tool_name: &str) -> Self {
        match tool_name {
            "Read" | "NotebookRead" => Self::Read,
            "Edit" | "Write" | "MultiEdit" | "NotebookEdit" => Self::Edit,
            "Grep" | "Glob" | "LS" | "WebSearch" => Self::Search,
            "Bash" => Self::Command,
            "Task" | "Agent" => Self::Agent,
            _ => Self::Other,
        }
    }
}

/// One tool invocation to be logged.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub session_id: String,
    pub tool_name: String,
    pub kind: EventKind,
    pub file_path: Option<String>,
    pub success: bool,
    pub detail: Option<String>,
}

impl SessionEvent {
    pub fn new(session_id: &str, tool_name: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            tool_name: tool_name.to_string(),
            kind: EventKind::from_tool(tool_name),
            file_path: None,
            success: true,
            detail: None,
        }
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn failed(mut self, detail: impl Into<String>) -> Self {
        self.success = false;
        self.detail = Some(detail.into());
        self
    }
}

impl<'a> EventLogger<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Append an event; returns its id.
    pub fn log(&self, event: &SessionEvent) -> anyhow::Result<i64> {
        let id = self.store.insert_event(
            &event.session_id,
            &event.tool_name,
            event.kind.as_str(),
            event.file_path.as_deref(),
            event.success,
            event.detail.as_deref(),
        )?;
        tracing::debug!(
            session = %event.session_id,
            tool = %event.tool_name,
            kind = event.kind.as_str(),
            success = event.success,
            "event logged"
        );
        Ok(id)
    }

    pub fn count(&self, session_id: &str, kind: EventKind) -> anyhow::Result<u32> {
        self.store.count_events(session_id, Some(kind.as_str()), 0)
    }

    pub fn count_failures(&self, session_id: &str) -> anyhow::Result<u32> {
        self.store.count_failed_events(session_id, 0)
    }

    /// Number of times `file_path` has been read in the session so far.
    pub fn read_count(&self, session_id: &str, file_path: &str) -> anyhow::Result<u32> {
        self.store.count_file_reads(session_id, file_path)
    }

    pub fn session_events(&self, session_id: &str) -> anyhow::Result<Vec<SessionEventRow>> {
        self.store.query_session_events(session_id)
    }

    /// Edits in the session grouped by `folder_of` the edited path.
    pub fn folder_edit_counts(&self, session_id: &str) -> anyhow::Result<BTreeMap<String, u32>> {
        let mut counts = BTreeMap::new();
        for event in self.store.query_session_events(session_id)? {
            if EventKind::parse(&event.kind) != EventKind::Edit {
                continue;
            }
            if let Some(path) = event.file_path {
                *counts.entry(folder_of(&path)).or_default() += 1;
            }
        }
        Ok(counts)
    }

    /// Record a verification run (test suite, type check, linter).
    pub fn record_check(&self, session_id: &str, check_name: &str, passed: bool) -> anyhow::Result<()> {
        self.store.insert_check_run(session_id, check_name, passed)
    }

    /// True when a check passed at its first run in this session and fails now.
    pub fn check_regressed(&self, session_id: &str, check_name: &str) -> anyhow::Result<bool> {
        let history = self.store.query_check_history(session_id, check_name)?;
        Ok(matches!((history.first(), history.last()), (Some(true), Some(false))))
    }
}

/// Folder an edit belongs to: the first path segment, ignoring leading
/// `./` and `/`. Files at the root map to `"."`.
pub fn folder_of(path: &str) -> String {
    let trimmed = path.trim_start_matches("./").trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((first, _)) if !first.is_empty() => first.to_string(),
        _ => ".".to_string(),
    }
}

/// Lower-cased file extension, if any.
pub fn extension_of(path: &str) -> Option<String> {
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}
