//! FollowUpStore — scheduled 7-day and 30-day check-in emails.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::db::Database;
use crate::error::DatabaseError;

/// How many due follow-ups one executor tick will dispatch.
pub const DISPATCH_BATCH: usize = 5;

/// One scheduled follow-up.
#[derive(Debug, Clone)]
pub struct FollowUp {
    pub id: i64,
    pub brief_id: i64,
    /// `7day` or `30day`.
    pub kind: String,
    pub scheduled_for: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub tracking_id: String,
}

/// Persistent follow-up storage backed by SQLite.
pub struct FollowUpStore {
    db: Arc<Database>,
}

impl FollowUpStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Schedule the 7-day and 30-day follow-ups for a freshly submitted brief.
    pub fn schedule_for_brief(&self, brief_id: i64) -> Result<(), DatabaseError> {
        let now = Utc::now();
        let conn = self.db.conn();
        for (kind, days) in [("7day", 7i64), ("30day", 30i64)] {
            conn.execute(
                "INSERT INTO follow_ups (brief_id, type, scheduled_for, tracking_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    brief_id,
                    kind,
                    (now + Duration::days(days)).to_rfc3339(),
                    Uuid::new_v4().to_string(),
                    now.to_rfc3339(),
                ],
            )?;
        }
        Ok(())
    }

    /// Unsent follow-ups due at or before `now`, oldest first, capped at the
    /// per-tick batch size.
    pub fn due(&self, now: DateTime<Utc>) -> Result<Vec<FollowUp>, DatabaseError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, brief_id, type, scheduled_for, sent_at, opened_at, tracking_id
             FROM follow_ups
             WHERE sent_at IS NULL AND scheduled_for <= ?1
             ORDER BY scheduled_for
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![now.to_rfc3339(), DISPATCH_BATCH as i64],
            row_to_followup,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Stamp `sent_at`, once. Never overwrites an existing stamp.
    pub fn mark_sent(&self, id: i64, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let conn = self.db.conn();
        conn.execute(
            "UPDATE follow_ups SET sent_at = ?2 WHERE id = ?1 AND sent_at IS NULL",
            rusqlite::params![id, at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Record the first pixel hit for a tracking id; later hits are no-ops.
    pub fn mark_opened(&self, tracking_id: &str, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let conn = self.db.conn();
        conn.execute(
            "UPDATE follow_ups SET opened_at = ?2
             WHERE tracking_id = ?1 AND opened_at IS NULL",
            rusqlite::params![tracking_id, at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get(&self, id: i64) -> Result<Option<FollowUp>, DatabaseError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, brief_id, type, scheduled_for, sent_at, opened_at, tracking_id
             FROM follow_ups WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(rusqlite::params![id], row_to_followup)?;
        match rows.next() {
            Some(Ok(f)) => Ok(Some(f)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

fn row_to_followup(row: &rusqlite::Row<'_>) -> rusqlite::Result<FollowUp> {
    let scheduled: String = row.get(3)?;
    let sent: Option<String> = row.get(4)?;
    let opened: Option<String> = row.get(5)?;
    let parse = |s: &str| {
        DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    };
    Ok(FollowUp {
        id: row.get(0)?,
        brief_id: row.get(1)?,
        kind: row.get(2)?,
        scheduled_for: parse(&scheduled),
        sent_at: sent.map(|s| parse(&s)),
        opened_at: opened.map(|s| parse(&s)),
        tracking_id: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> FollowUpStore {
        FollowUpStore::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    #[test]
    fn schedule_creates_both_kinds() {
        let store = store();
        store.schedule_for_brief(1).unwrap();

        // Nothing due yet.
        assert!(store.due(Utc::now()).unwrap().is_empty());

        let week_later = Utc::now() + Duration::days(7) + Duration::minutes(1);
        let due = store.due(week_later).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].kind, "7day");

        let month_later = Utc::now() + Duration::days(30) + Duration::minutes(1);
        let due = store.due(month_later).unwrap();
        assert_eq!(due.len(), 2);
    }

    #[test]
    fn sent_stamp_is_write_once() {
        let store = store();
        store.schedule_for_brief(1).unwrap();
        let later = Utc::now() + Duration::days(8);
        let id = store.due(later).unwrap()[0].id;

        let first = Utc::now();
        store.mark_sent(id, first).unwrap();
        store.mark_sent(id, first + Duration::hours(1)).unwrap();

        let row = store.get(id).unwrap().unwrap();
        let stamped = row.sent_at.unwrap();
        assert!((stamped - first).num_seconds().abs() < 2);
        // Sent rows drop out of the due set.
        assert_eq!(store.due(later).unwrap().len(), 1);
    }

    #[test]
    fn opened_stamp_is_write_once() {
        let store = store();
        store.schedule_for_brief(1).unwrap();
        let later = Utc::now() + Duration::days(8);
        let row = store.due(later).unwrap().remove(0);

        let first = Utc::now();
        store.mark_opened(&row.tracking_id, first).unwrap();
        store
            .mark_opened(&row.tracking_id, first + Duration::hours(2))
            .unwrap();
        let opened = store.get(row.id).unwrap().unwrap().opened_at.unwrap();
        assert!((opened - first).num_seconds().abs() < 2);
    }

    #[test]
    fn due_batch_is_capped() {
        let store = store();
        for brief in 1..=4 {
            store.schedule_for_brief(brief).unwrap();
        }
        let far_future = Utc::now() + Duration::days(31);
        assert_eq!(store.due(far_future).unwrap().len(), DISPATCH_BATCH);
    }
}
