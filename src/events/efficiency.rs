// src/events/efficiency.rs — Session efficiency score (0-100)

use std::collections::HashMap;

use serde::Serialize;

use super::event_logger::{folder_of, EventKind};
use crate::memory::store::{SessionEventRow, Store};

/// Reads of one file at which it counts as a loop.
const LOOP_READS: usize = 3;

/// Loop count at which the loop component bottoms out.
const LOOP_CAP: f64 = 5.0;

/// How well a session is going, derived from its event log.
#[derive(Debug, Clone, Serialize)]
pub struct SessionEfficiency {
    /// Share of edits that landed in the busiest folder.
    pub focus_ratio: f64,
    /// Files read `LOOP_READS` times or more.
    pub loop_count: u32,
    /// Edits per search, capped at 1.
    pub search_to_edit: f64,
    pub score: f64,
}

impl SessionEfficiency {
    pub fn compute(store: &Store, session_id: &str) -> anyhow::Result<Self> {
        let events = store.query_session_events(session_id)?;
        Ok(Self::from_events(&events))
    }

    pub fn from_events(events: &[SessionEventRow]) -> Self {
        let mut folder_edits: HashMap<String, u32> = HashMap::new();
        let mut reads: HashMap<&str, usize> = HashMap::new();
        let mut edits = 0u32;
        let mut searches = 0u32;

        for event in events {
            match EventKind::parse(&event.kind) {
                EventKind::Edit => {
                    edits += 1;
                    if let Some(ref path) = event.file_path {
                        *folder_edits.entry(folder_of(path)).or_default() += 1;
                    }
                }
                EventKind::Read => {
                    if let Some(ref path) = event.file_path {
                        *reads.entry(path.as_str()).or_default() += 1;
                    }
                }
                EventKind::Search => searches += 1,
                _ => {}
            }
        }

        let focus_ratio = if edits == 0 {
            1.0
        } else {
            let busiest = folder_edits.values().copied().max().unwrap_or(0);
            busiest as f64 / edits as f64
        };
        let loop_count = reads.values().filter(|&&n| n >= LOOP_READS).count() as u32;
        let search_to_edit = if searches == 0 {
            1.0
        } else {
            (edits as f64 / searches as f64).min(1.0)
        };

        let loop_component = 1.0 - (loop_count as f64).min(LOOP_CAP) / LOOP_CAP;
        let score =
            (100.0 * (0.4 * focus_ratio + 0.3 * search_to_edit + 0.3 * loop_component)).round();

        Self {
            focus_ratio,
            loop_count,
            search_to_edit,
            score,
        }
    }
}
