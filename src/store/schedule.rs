//! ScheduleEntryStore — the durable rows the executor runs against.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::db::Database;
use crate::error::DatabaseError;

/// Failures tolerated before an entry is parked in `error`.
pub const MAX_ASSIGN_RETRIES: i64 = 3;

/// Entry lifecycle. `error` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Active,
    Paused,
    Completed,
    Error,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Active => "active",
            EntryStatus::Paused => "paused",
            EntryStatus::Completed => "completed",
            EntryStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(EntryStatus::Active),
            "paused" => Some(EntryStatus::Paused),
            "completed" => Some(EntryStatus::Completed),
            "error" => Some(EntryStatus::Error),
            _ => None,
        }
    }
}

/// One durable scheduling instruction: this playlist, on this zone, at this
/// local wall-clock time, on these days.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub id: i64,
    pub brief_id: i64,
    pub zone_id: String,
    pub zone_name: String,
    pub playlist_syb_id: String,
    pub playlist_name: String,
    /// `HH:MM` local wall clock.
    pub start_time: String,
    /// Informational.
    pub end_time: String,
    /// `daily`, `weekday`, or `weekend`.
    pub days: String,
    /// IANA zone, denormalized from the venue.
    pub timezone: String,
    pub status: EntryStatus,
    pub last_assigned_at: Option<DateTime<Utc>>,
    pub retry_count: i64,
}

/// Fields for materializing a new entry.
#[derive(Debug, Clone)]
pub struct NewScheduleEntry {
    pub brief_id: i64,
    pub zone_id: String,
    pub zone_name: String,
    pub playlist_syb_id: String,
    pub playlist_name: String,
    pub start_time: String,
    pub end_time: String,
    pub days: String,
    pub timezone: String,
}

/// Persistent schedule-entry storage backed by SQLite.
pub struct ScheduleEntryStore {
    db: Arc<Database>,
}

impl ScheduleEntryStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn insert(&self, entry: &NewScheduleEntry) -> Result<i64, DatabaseError> {
        let conn = self.db.conn();
        insert_on(&conn, entry)
    }

    /// All entries the executor should consider this tick.
    pub fn active(&self) -> Result<Vec<ScheduleEntry>, DatabaseError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, brief_id, zone_id, zone_name, playlist_syb_id, playlist_name,
                    start_time, end_time, days, timezone, status, last_assigned_at,
                    retry_count
             FROM schedule_entries WHERE status = 'active' ORDER BY start_time",
        )?;
        let rows = stmt.query_map([], row_to_entry)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn count_active(&self) -> Result<i64, DatabaseError> {
        let conn = self.db.conn();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM schedule_entries WHERE status = 'active'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn for_brief(&self, brief_id: i64) -> Result<Vec<ScheduleEntry>, DatabaseError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, brief_id, zone_id, zone_name, playlist_syb_id, playlist_name,
                    start_time, end_time, days, timezone, status, last_assigned_at,
                    retry_count
             FROM schedule_entries WHERE brief_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(rusqlite::params![brief_id], row_to_entry)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Record a successful assignment: stamp `last_assigned_at`, reset retries.
    pub fn mark_assigned(&self, id: i64, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let conn = self.db.conn();
        conn.execute(
            "UPDATE schedule_entries
             SET last_assigned_at = ?2, retry_count = 0
             WHERE id = ?1",
            rusqlite::params![id, at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Record a failed assignment. The third consecutive failure parks the
    /// entry in `error`.
    pub fn record_failure(&self, id: i64) -> Result<EntryStatus, DatabaseError> {
        let conn = self.db.conn();
        conn.execute(
            "UPDATE schedule_entries SET retry_count = retry_count + 1 WHERE id = ?1",
            rusqlite::params![id],
        )?;
        let retries: i64 = conn.query_row(
            "SELECT retry_count FROM schedule_entries WHERE id = ?1",
            rusqlite::params![id],
            |row| row.get(0),
        )?;
        if retries >= MAX_ASSIGN_RETRIES {
            conn.execute(
                "UPDATE schedule_entries SET status = 'error' WHERE id = ?1",
                rusqlite::params![id],
            )?;
            debug!(entry_id = id, retries, "Schedule entry parked in error");
            return Ok(EntryStatus::Error);
        }
        Ok(EntryStatus::Active)
    }

    /// Pause every active entry of the briefs superseded by a newer one.
    pub fn pause_for_brief(&self, brief_id: i64) -> Result<usize, DatabaseError> {
        let conn = self.db.conn();
        let changed = conn.execute(
            "UPDATE schedule_entries SET status = 'paused'
             WHERE brief_id = ?1 AND status = 'active'",
            rusqlite::params![brief_id],
        )?;
        Ok(changed)
    }
}

/// Connection-level insert, shared with the approval transaction.
pub(crate) fn insert_on(
    conn: &rusqlite::Connection,
    entry: &NewScheduleEntry,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO schedule_entries (brief_id, zone_id, zone_name, playlist_syb_id,
            playlist_name, start_time, end_time, days, timezone, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'active', ?10)",
        rusqlite::params![
            entry.brief_id,
            entry.zone_id,
            entry.zone_name,
            entry.playlist_syb_id,
            entry.playlist_name,
            entry.start_time,
            entry.end_time,
            entry.days,
            entry.timezone,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleEntry> {
    let status: String = row.get(10)?;
    let last_assigned: Option<String> = row.get(11)?;
    Ok(ScheduleEntry {
        id: row.get(0)?,
        brief_id: row.get(1)?,
        zone_id: row.get(2)?,
        zone_name: row.get(3)?,
        playlist_syb_id: row.get(4)?,
        playlist_name: row.get(5)?,
        start_time: row.get(6)?,
        end_time: row.get(7)?,
        days: row.get(8)?,
        timezone: row.get(9)?,
        status: EntryStatus::parse(&status).unwrap_or(EntryStatus::Active),
        last_assigned_at: last_assigned.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .ok()
        }),
        retry_count: row.get(12)?,
    })
}
