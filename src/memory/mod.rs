// src/memory/mod.rs — Persistent store manager

pub mod schema;
pub mod store;

use rusqlite::Connection;
use std::path::Path;

/// Owns the SQLite connection behind the learning store.
pub struct MemoryManager {
    pub store: store::Store,
}

impl MemoryManager {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        // WAL lets a status display read while a hook writes
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        schema::run_migrations(&conn)?;

        Ok(Self {
            store: store::Store::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::run_migrations(&conn)?;
        Ok(Self {
            store: store::Store::new(conn),
        })
    }
}
