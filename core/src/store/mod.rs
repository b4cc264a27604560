//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Engines call store methods and never execute SQL directly.

use crate::{
    error::DeskResult,
    event::{DeskEvent, EventLogEntry},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

mod level;
mod service;
mod technician;

pub struct DeskStore {
    conn: Connection,
}

impl DeskStore {
    pub fn open(path: &str) -> DeskResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only for real files; :memory: ignores it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        log::debug!("opened store at {path}");
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> DeskResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> DeskResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_technicians.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_services.sql"))?;
        Ok(())
    }

    /// Run `f` inside one immediate transaction. Re-entrant: when a
    /// transaction is already open, `f` joins it instead of nesting.
    /// Any error rolls back everything `f` wrote.
    pub fn atomically<T>(&self, f: impl FnOnce(&Self) -> DeskResult<T>) -> DeskResult<T> {
        if !self.conn.is_autocommit() {
            return f(self);
        }
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(
        &self,
        event: &DeskEvent,
        actor: &str,
        at:    DateTime<Utc>,
    ) -> DeskResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (event_type, actor, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![event.type_name(), actor, serde_json::to_string(event)?, at],
        )?;
        Ok(())
    }

    pub fn events_of_type(&self, event_type: &str) -> DeskResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, event_type, actor, payload, created_at
             FROM event_log WHERE event_type = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![event_type], event_row_mapper)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn recent_events(&self, limit: usize) -> DeskResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, event_type, actor, payload, created_at
             FROM event_log ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit as i64], event_row_mapper)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self) -> DeskResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM event_log", [], |row| row.get(0))?;
        Ok(count)
    }

    // ── Document sequences ─────────────────────────────────────

    /// Allocate the next value of the `(prefix, period)` sequence, starting at 1.
    pub fn next_document_sequence(&self, prefix: &str, period: &str) -> DeskResult<u64> {
        let last: Option<i64> = self
            .conn
            .query_row(
                "SELECT last_value FROM document_sequence WHERE prefix = ?1 AND period = ?2",
                params![prefix, period],
                |row| row.get(0),
            )
            .optional()?;
        let next = last.unwrap_or(0) + 1;
        self.conn.execute(
            "INSERT INTO document_sequence (prefix, period, last_value) VALUES (?1, ?2, ?3)
             ON CONFLICT (prefix, period) DO UPDATE SET last_value = excluded.last_value",
            params![prefix, period, next],
        )?;
        Ok(next as u64)
    }
}

fn event_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventLogEntry> {
    Ok(EventLogEntry {
        id:         Some(row.get(0)?),
        event_type: row.get(1)?,
        actor:      row.get(2)?,
        payload:    row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn bool_to_int(value: bool) -> i32 {
    if value { 1 } else { 0 }
}
