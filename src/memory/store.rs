// src/memory/store.rs — SQLite operations

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use rusqlite::{params, Connection, OptionalExtension};

/// Fixed-width RFC 3339 timestamp; string order equals time order.
pub fn format_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now_ts() -> String {
    format_ts(Utc::now())
}

/// Start of a `window_days` look-back from `now`. Windows reaching past the
/// representable range start at the earliest representable instant.
pub fn window_start(now: DateTime<Utc>, window_days: u32) -> DateTime<Utc> {
    TimeDelta::try_days(i64::from(window_days))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Low-level SQLite operations for all learning data.
///
/// Every write is a single auto-committing statement; other processes may
/// read the database concurrently.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    // -- Session events --

    pub fn insert_event(
        &self,
        session_id: &str,
        tool_name: &str,
        kind: &str,
        file_path: Option<&str>,
        success: bool,
        detail: Option<&str>,
    ) -> anyhow::Result<i64> {
        self.conn.execute(
            "INSERT INTO session_events (session_id, tool_name, kind, file_path, success, detail, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![session_id, tool_name, kind, file_path, success, detail, now_ts()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Highest event id logged so far (0 when empty). Used as a watermark
    /// to count events logged after a point in time.
    pub fn max_event_id(&self) -> anyhow::Result<i64> {
        let id: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(id), 0) FROM session_events",
            [],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    /// Count a session's events, optionally of one kind, after an event id.
    pub fn count_events(
        &self,
        session_id: &str,
        kind: Option<&str>,
        after_id: i64,
    ) -> anyhow::Result<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM session_events
             WHERE session_id = ?1 AND (?2 IS NULL OR kind = ?2) AND id > ?3",
            params![session_id, kind, after_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    pub fn count_failed_events(&self, session_id: &str, after_id: i64) -> anyhow::Result<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM session_events
             WHERE session_id = ?1 AND success = 0 AND id > ?2",
            params![session_id, after_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// How many times a file has been read in a session.
    pub fn count_file_reads(&self, session_id: &str, file_path: &str) -> anyhow::Result<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM session_events
             WHERE session_id = ?1 AND kind = 'read' AND file_path = ?2",
            params![session_id, file_path],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    pub fn query_session_events(&self, session_id: &str) -> anyhow::Result<Vec<SessionEventRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, tool_name, kind, file_path, success, detail, timestamp
             FROM session_events WHERE session_id = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![session_id], |row| {
            Ok(SessionEventRow {
                id: row.get(0)?,
                session_id: row.get(1)?,
                tool_name: row.get(2)?,
                kind: row.get(3)?,
                file_path: row.get(4)?,
                success: row.get(5)?,
                detail: row.get(6)?,
                timestamp: row.get(7)?,
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -- Verification runs --

    pub fn insert_check_run(
        &self,
        session_id: &str,
        check_name: &str,
        passed: bool,
    ) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO check_runs (session_id, check_name, passed, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![session_id, check_name, passed, now_ts()],
        )?;
        Ok(())
    }

    /// Pass/fail history of one check in a session, oldest first.
    pub fn query_check_history(
        &self,
        session_id: &str,
        check_name: &str,
    ) -> anyhow::Result<Vec<bool>> {
        let mut stmt = self.conn.prepare(
            "SELECT passed FROM check_runs
             WHERE session_id = ?1 AND check_name = ?2
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![session_id, check_name], |row| row.get(0))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -- Error patterns --

    /// Insert a pattern or bump its occurrence count when the id exists.
    pub fn upsert_error_pattern(
        &self,
        id: &str,
        normalized_text: &str,
        keywords: &str,
        category: Option<&str>,
        suggested_agent: Option<&str>,
    ) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO error_patterns (id, normalized_text, keywords, category,
             suggested_agent, first_seen, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(id) DO UPDATE SET
                occurrence_count = occurrence_count + 1,
                fix_success_rate = CAST(fix_count AS REAL) / (occurrence_count + 1),
                last_seen = ?6",
            params![
                id,
                normalized_text,
                keywords,
                category,
                suggested_agent,
                now_ts()
            ],
        )?;
        Ok(())
    }

    pub fn get_error_pattern(&self, id: &str) -> anyhow::Result<Option<ErrorPatternRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, normalized_text, keywords, category, occurrence_count, fix_count,
                 fix_success_rate, suggested_agent, first_seen, last_seen
                 FROM error_patterns WHERE id = ?1",
                params![id],
                map_pattern_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn query_top_error_patterns(&self, limit: u32) -> anyhow::Result<Vec<ErrorPatternRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, normalized_text, keywords, category, occurrence_count, fix_count,
             fix_success_rate, suggested_agent, first_seen, last_seen
             FROM error_patterns
             ORDER BY occurrence_count DESC, last_seen DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], map_pattern_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn count_error_patterns(&self) -> anyhow::Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM error_patterns", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Count one more fix against a pattern and recompute its fix rate.
    pub fn record_pattern_fix(&self, id: &str, agent_name: Option<&str>) -> anyhow::Result<()> {
        self.conn.execute(
            "UPDATE error_patterns SET
                fix_count = fix_count + 1,
                fix_success_rate = MIN(1.0, CAST(fix_count + 1 AS REAL) / occurrence_count),
                suggested_agent = COALESCE(?2, suggested_agent)
             WHERE id = ?1",
            params![id, agent_name],
        )?;
        Ok(())
    }

    // -- Error instances --

    pub fn insert_error_instance(
        &self,
        id: &str,
        pattern_id: &str,
        session_id: Option<&str>,
        source: Option<&str>,
        raw_text: &str,
        file_path: Option<&str>,
    ) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO error_instances (id, pattern_id, session_id, source, raw_text,
             file_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                pattern_id,
                session_id,
                source,
                raw_text,
                file_path,
                now_ts()
            ],
        )?;
        Ok(())
    }

    pub fn get_error_instance(&self, id: &str) -> anyhow::Result<Option<ErrorInstanceRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, pattern_id, session_id, source, raw_text, file_path, fixed,
                 fixed_by_agent, created_at, fixed_at
                 FROM error_instances WHERE id = ?1",
                params![id],
                map_instance_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Mark an instance fixed. Returns false when it was already fixed or missing.
    pub fn mark_instance_fixed(&self, id: &str, agent_name: Option<&str>) -> anyhow::Result<bool> {
        let changed = self.conn.execute(
            "UPDATE error_instances SET fixed = 1, fixed_by_agent = ?2, fixed_at = ?3
             WHERE id = ?1 AND fixed = 0",
            params![id, agent_name, now_ts()],
        )?;
        Ok(changed > 0)
    }

    pub fn query_unfixed_instances(
        &self,
        session_id: &str,
        source: Option<&str>,
    ) -> anyhow::Result<Vec<ErrorInstanceRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, pattern_id, session_id, source, raw_text, file_path, fixed,
             fixed_by_agent, created_at, fixed_at
             FROM error_instances
             WHERE session_id = ?1 AND fixed = 0 AND (?2 IS NULL OR source = ?2)
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![session_id, source], map_instance_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -- Agent usage --

    #[allow(clippy::too_many_arguments)]
    pub fn insert_agent_usage(
        &self,
        id: &str,
        session_id: &str,
        agent_name: &str,
        agent_type: &str,
        trigger_context: Option<&str>,
        reads_at_spawn: u32,
        errors_at_spawn: u32,
        event_watermark: i64,
    ) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO agent_usage (id, session_id, agent_name, agent_type, trigger_context,
             reads_at_spawn, errors_at_spawn, event_watermark, spawned_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                session_id,
                agent_name,
                agent_type,
                trigger_context,
                reads_at_spawn,
                errors_at_spawn,
                event_watermark,
                now_ts()
            ],
        )?;
        Ok(())
    }

    pub fn get_agent_usage(&self, id: &str) -> anyhow::Result<Option<AgentUsageRow>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {USAGE_COLUMNS} FROM agent_usage WHERE id = ?1"),
                params![id],
                map_usage_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Most recent open usage in a session, optionally narrowed to one type.
    pub fn latest_open_usage(
        &self,
        session_id: &str,
        agent_type: Option<&str>,
    ) -> anyhow::Result<Option<AgentUsageRow>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {USAGE_COLUMNS} FROM agent_usage
                     WHERE session_id = ?1 AND completed_at IS NULL
                       AND (?2 IS NULL OR agent_type = ?2)
                     ORDER BY spawned_at DESC, rowid DESC LIMIT 1"
                ),
                params![session_id, agent_type],
                map_usage_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn latest_completed_usage(&self, session_id: &str) -> anyhow::Result<Option<AgentUsageRow>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {USAGE_COLUMNS} FROM agent_usage
                     WHERE session_id = ?1 AND completed_at IS NOT NULL
                     ORDER BY completed_at DESC, rowid DESC LIMIT 1"
                ),
                params![session_id],
                map_usage_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Write the outcome of an open usage. Returns false when the record is
    /// missing or was already completed.
    pub fn complete_agent_usage(
        &self,
        id: &str,
        task_success: bool,
        reads_after: u32,
        errors_after: u32,
        effectiveness: f64,
    ) -> anyhow::Result<bool> {
        let changed = self.conn.execute(
            "UPDATE agent_usage SET task_success = ?2, reads_after = ?3, errors_after = ?4,
             effectiveness = ?5, completed_at = ?6
             WHERE id = ?1 AND completed_at IS NULL",
            params![
                id,
                task_success,
                reads_after,
                errors_after,
                effectiveness,
                now_ts()
            ],
        )?;
        Ok(changed > 0)
    }

    /// Per-type effectiveness over completed usages since a timestamp.
    pub fn query_usage_stats(
        &self,
        since: &str,
        agent_type: Option<&str>,
    ) -> anyhow::Result<Vec<UsageStatRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT agent_type, COUNT(*), AVG(effectiveness)
             FROM agent_usage
             WHERE completed_at IS NOT NULL AND effectiveness IS NOT NULL
               AND completed_at >= ?1 AND (?2 IS NULL OR agent_type = ?2)
             GROUP BY agent_type
             ORDER BY agent_type",
        )?;
        let rows = stmt.query_map(params![since, agent_type], |row| {
            Ok(UsageStatRow {
                agent_type: row.get(0)?,
                sample_count: row.get(1)?,
                avg_effectiveness: row.get(2)?,
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Every helper type that has ever been spawned.
    pub fn query_agent_types_with_usage(&self) -> anyhow::Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT agent_type FROM agent_usage ORDER BY agent_type")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -- Thresholds --

    pub fn get_threshold(&self, agent_type: &str) -> anyhow::Result<Option<ThresholdRow>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {THRESHOLD_COLUMNS} FROM agent_thresholds WHERE agent_type = ?1"),
                params![agent_type],
                map_threshold_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn query_all_thresholds(&self) -> anyhow::Result<Vec<ThresholdRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {THRESHOLD_COLUMNS} FROM agent_thresholds ORDER BY agent_type"
        ))?;
        let rows = stmt.query_map([], map_threshold_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Create a threshold row with default values unless one exists.
    pub fn insert_threshold_if_missing(
        &self,
        agent_type: &str,
        value: f64,
        min_value: f64,
        max_value: f64,
    ) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO agent_thresholds (agent_type, current_value, min_value, max_value)
             VALUES (?1, ?2, ?3, ?4)",
            params![agent_type, value, min_value, max_value],
        )?;
        Ok(())
    }

    pub fn update_threshold(
        &self,
        agent_type: &str,
        current_value: f64,
        avg_effectiveness: f64,
        sample_count: i64,
        history_json: &str,
    ) -> anyhow::Result<()> {
        let changed = self.conn.execute(
            "UPDATE agent_thresholds SET current_value = ?2, avg_effectiveness = ?3,
             sample_count = ?4, history = ?5, last_adjusted = ?6
             WHERE agent_type = ?1",
            params![
                agent_type,
                current_value,
                avg_effectiveness,
                sample_count,
                history_json,
                now_ts()
            ],
        )?;
        if changed == 0 {
            anyhow::bail!("no threshold row for '{agent_type}'");
        }
        Ok(())
    }

    /// Overwrite a threshold with its defaults, zero samples and a neutral average.
    pub fn reset_threshold(
        &self,
        agent_type: &str,
        value: f64,
        min_value: f64,
        max_value: f64,
    ) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO agent_thresholds (agent_type, current_value, min_value, max_value,
             avg_effectiveness, sample_count, last_adjusted, history)
             VALUES (?1, ?2, ?3, ?4, 0.5, 0, ?5, '[]')
             ON CONFLICT(agent_type) DO UPDATE SET
                current_value = excluded.current_value,
                min_value = excluded.min_value,
                max_value = excluded.max_value,
                avg_effectiveness = 0.5,
                sample_count = 0,
                last_adjusted = excluded.last_adjusted,
                history = '[]'",
            params![agent_type, value, min_value, max_value, now_ts()],
        )?;
        Ok(())
    }

    // -- Context snapshots --

    pub fn insert_context_snapshot(
        &self,
        session_id: Option<&str>,
        features_json: &str,
        agent_name: &str,
        effectiveness: f64,
    ) -> anyhow::Result<i64> {
        self.conn.execute(
            "INSERT INTO context_snapshots (session_id, features, agent_name, effectiveness, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, features_json, agent_name, effectiveness, now_ts()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn query_context_snapshots(
        &self,
        min_effectiveness: f64,
    ) -> anyhow::Result<Vec<ContextSnapshotRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, features, agent_name, effectiveness, created_at
             FROM context_snapshots WHERE effectiveness >= ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![min_effectiveness], |row| {
            Ok(ContextSnapshotRow {
                id: row.get(0)?,
                session_id: row.get(1)?,
                features: row.get(2)?,
                agent_name: row.get(3)?,
                effectiveness: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Get a reference to the underlying connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

const USAGE_COLUMNS: &str = "id, session_id, agent_name, agent_type, trigger_context, \
     reads_at_spawn, errors_at_spawn, event_watermark, spawned_at, task_success, \
     reads_after, errors_after, effectiveness, completed_at";

const THRESHOLD_COLUMNS: &str = "agent_type, current_value, min_value, max_value, \
     avg_effectiveness, sample_count, last_adjusted, history";

fn map_pattern_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ErrorPatternRow> {
    Ok(ErrorPatternRow {
        id: row.get(0)?,
        normalized_text: row.get(1)?,
        keywords: row.get(2)?,
        category: row.get(3)?,
        occurrence_count: row.get(4)?,
        fix_count: row.get(5)?,
        fix_success_rate: row.get(6)?,
        suggested_agent: row.get(7)?,
        first_seen: row.get(8)?,
        last_seen: row.get(9)?,
    })
}

fn map_instance_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ErrorInstanceRow> {
    Ok(ErrorInstanceRow {
        id: row.get(0)?,
        pattern_id: row.get(1)?,
        session_id: row.get(2)?,
        source: row.get(3)?,
        raw_text: row.get(4)?,
        file_path: row.get(5)?,
        fixed: row.get(6)?,
        fixed_by_agent: row.get(7)?,
        created_at: row.get(8)?,
        fixed_at: row.get(9)?,
    })
}

fn map_usage_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentUsageRow> {
    Ok(AgentUsageRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        agent_name: row.get(2)?,
        agent_type: row.get(3)?,
        trigger_context: row.get(4)?,
        reads_at_spawn: row.get(5)?,
        errors_at_spawn: row.get(6)?,
        event_watermark: row.get(7)?,
        spawned_at: row.get(8)?,
        task_success: row.get(9)?,
        reads_after: row.get(10)?,
        errors_after: row.get(11)?,
        effectiveness: row.get(12)?,
        completed_at: row.get(13)?,
    })
}

fn map_threshold_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ThresholdRow> {
    Ok(ThresholdRow {
        agent_type: row.get(0)?,
        current_value: row.get(1)?,
        min_value: row.get(2)?,
        max_value: row.get(3)?,
        avg_effectiveness: row.get(4)?,
        sample_count: row.get(5)?,
        last_adjusted: row.get(6)?,
        history: row.get(7)?,
    })
}

// -- Row types --

#[derive(Debug, Clone)]
pub struct SessionEventRow {
    pub id: i64,
    pub session_id: String,
    pub tool_name: String,
    pub kind: String,
    pub file_path: Option<String>,
    pub success: bool,
    pub detail: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct ErrorPatternRow {
    pub id: String,
    pub normalized_text: String,
    /// Pipe-joined sorted keyword set.
    pub keywords: String,
    pub category: Option<String>,
    pub occurrence_count: i64,
    pub fix_count: i64,
    pub fix_success_rate: f64,
    pub suggested_agent: Option<String>,
    pub first_seen: String,
    pub last_seen: String,
}

#[derive(Debug, Clone)]
pub struct ErrorInstanceRow {
    pub id: String,
    pub pattern_id: String,
    pub session_id: Option<String>,
    pub source: Option<String>,
    pub raw_text: String,
    pub file_path: Option<String>,
    pub fixed: bool,
    pub fixed_by_agent: Option<String>,
    pub created_at: String,
    pub fixed_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AgentUsageRow {
    pub id: String,
    pub session_id: String,
    pub agent_name: String,
    pub agent_type: String,
    pub trigger_context: Option<String>,
    pub reads_at_spawn: u32,
    pub errors_at_spawn: u32,
    pub event_watermark: i64,
    pub spawned_at: String,
    pub task_success: Option<bool>,
    pub reads_after: Option<u32>,
    pub errors_after: Option<u32>,
    pub effectiveness: Option<f64>,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UsageStatRow {
    pub agent_type: String,
    pub sample_count: i64,
    pub avg_effectiveness: f64,
}

#[derive(Debug, Clone)]
pub struct ThresholdRow {
    pub agent_type: String,
    pub current_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub avg_effectiveness: f64,
    pub sample_count: i64,
    pub last_adjusted: Option<String>,
    /// JSON array of adjustment history entries.
    pub history: String,
}

#[derive(Debug, Clone)]
pub struct ContextSnapshotRow {
    pub id: i64,
    pub session_id: Option<String>,
    /// JSON-encoded feature vector.
    pub features: String,
    pub agent_name: String,
    pub effectiveness: f64,
    pub created_at: String,
}
