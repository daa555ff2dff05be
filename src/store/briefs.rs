//! BriefStore — CRUD for persisted music briefs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::db::Database;
use crate::error::DatabaseError;

/// Brief lifecycle. Transitions only move forward:
/// submitted → approved → scheduled → completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BriefStatus {
    Submitted,
    Approved,
    Scheduled,
    Completed,
}

impl BriefStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BriefStatus::Submitted => "submitted",
            BriefStatus::Approved => "approved",
            BriefStatus::Scheduled => "scheduled",
            BriefStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(BriefStatus::Submitted),
            "approved" => Some(BriefStatus::Approved),
            "scheduled" => Some(BriefStatus::Scheduled),
            "completed" => Some(BriefStatus::Completed),
            _ => None,
        }
    }
}

/// A persisted brief.
#[derive(Debug, Clone)]
pub struct Brief {
    pub id: i64,
    pub venue_name: String,
    pub venue_type: String,
    pub location: String,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub product: String,
    pub liked_playlist_ids: Vec<String>,
    pub conversation_summary: String,
    pub raw_data: serde_json::Value,
    pub schedule_data: Option<serde_json::Value>,
    pub status: BriefStatus,
    pub syb_account_id: Option<String>,
    pub syb_schedule_id: Option<String>,
    pub automation_tier: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for inserting a new brief.
#[derive(Debug, Clone, Default)]
pub struct NewBrief {
    pub venue_name: String,
    pub venue_type: String,
    pub location: String,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub product: String,
    pub liked_playlist_ids: Vec<String>,
    pub conversation_summary: String,
    pub raw_data: serde_json::Value,
    pub schedule_data: Option<serde_json::Value>,
    pub syb_account_id: Option<String>,
    pub automation_tier: Option<String>,
}

/// Persistent brief storage backed by SQLite.
pub struct BriefStore {
    db: Arc<Database>,
}

impl BriefStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new brief with status `submitted`. Returns the row id.
    pub fn insert(&self, brief: &NewBrief) -> Result<i64, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO briefs (venue_name, venue_type, location, contact_name,
                contact_email, contact_phone, product, liked_playlist_ids,
                conversation_summary, raw_data, schedule_data, status,
                syb_account_id, automation_tier, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'submitted', ?12, ?13, ?14)",
            rusqlite::params![
                brief.venue_name,
                brief.venue_type,
                brief.location,
                brief.contact_name,
                brief.contact_email,
                brief.contact_phone,
                brief.product,
                serde_json::to_string(&brief.liked_playlist_ids)?,
                brief.conversation_summary,
                serde_json::to_string(&brief.raw_data)?,
                brief
                    .schedule_data
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                brief.syb_account_id,
                brief.automation_tier,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(brief_id = id, venue = %brief.venue_name, "Brief inserted");
        Ok(id)
    }

    pub fn get(&self, id: i64) -> Result<Option<Brief>, DatabaseError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, venue_name, venue_type, location, contact_name, contact_email,
                    contact_phone, product, liked_playlist_ids, conversation_summary,
                    raw_data, schedule_data, status, syb_account_id, syb_schedule_id,
                    automation_tier, created_at
             FROM briefs WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(rusqlite::params![id], row_to_brief)?;
        match rows.next() {
            Some(Ok(brief)) => Ok(Some(brief)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Advance a brief's status. Backward transitions are rejected.
    pub fn set_status(&self, id: i64, status: BriefStatus) -> Result<(), DatabaseError> {
        let current = self
            .get(id)?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "brief".into(),
                id: id.to_string(),
            })?
            .status;
        if status < current {
            return Err(DatabaseError::Query(format!(
                "illegal brief status transition {} -> {}",
                current.as_str(),
                status.as_str()
            )));
        }
        let conn = self.db.conn();
        conn.execute(
            "UPDATE briefs SET status = ?1 WHERE id = ?2",
            rusqlite::params![status.as_str(), id],
        )?;
        Ok(())
    }

    /// Record the remote schedule bound to this brief.
    pub fn set_syb_schedule(&self, id: i64, schedule_id: &str) -> Result<(), DatabaseError> {
        let conn = self.db.conn();
        conn.execute(
            "UPDATE briefs SET syb_schedule_id = ?1 WHERE id = ?2",
            rusqlite::params![schedule_id, id],
        )?;
        Ok(())
    }

    pub fn set_syb_account(&self, id: i64, account_id: &str) -> Result<(), DatabaseError> {
        let conn = self.db.conn();
        conn.execute(
            "UPDATE briefs SET syb_account_id = ?1 WHERE id = ?2",
            rusqlite::params![account_id, id],
        )?;
        Ok(())
    }

    /// Latest briefs for a venue, newest first.
    pub fn for_venue(&self, venue_name: &str) -> Result<Vec<Brief>, DatabaseError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, venue_name, venue_type, location, contact_name, contact_email,
                    contact_phone, product, liked_playlist_ids, conversation_summary,
                    raw_data, schedule_data, status, syb_account_id, syb_schedule_id,
                    automation_tier, created_at
             FROM briefs WHERE venue_name = ?1 ORDER BY id DESC",
        )?;
        let rows = stmt.query_map(rusqlite::params![venue_name], row_to_brief)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn row_to_brief(row: &rusqlite::Row<'_>) -> rusqlite::Result<Brief> {
    let liked: String = row.get(8)?;
    let raw: String = row.get(10)?;
    let schedule: Option<String> = row.get(11)?;
    let status: String = row.get(12)?;
    let created: String = row.get(16)?;
    Ok(Brief {
        id: row.get(0)?,
        venue_name: row.get(1)?,
        venue_type: row.get(2)?,
        location: row.get(3)?,
        contact_name: row.get(4)?,
        contact_email: row.get(5)?,
        contact_phone: row.get(6)?,
        product: row.get(7)?,
        liked_playlist_ids: serde_json::from_str(&liked).unwrap_or_default(),
        conversation_summary: row.get(9)?,
        raw_data: serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null),
        schedule_data: schedule.and_then(|s| serde_json::from_str(&s).ok()),
        status: BriefStatus::parse(&status).unwrap_or(BriefStatus::Submitted),
        syb_account_id: row.get(13)?,
        syb_schedule_id: row.get(14)?,
        automation_tier: row.get(15)?,
        created_at: DateTime::parse_from_rfc3339(&created)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> BriefStore {
        BriefStore::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    fn new_brief(venue: &str) -> NewBrief {
        NewBrief {
            venue_name: venue.into(),
            venue_type: "bar-lounge".into(),
            product: "syb".into(),
            liked_playlist_ids: vec!["deep-house-sunset".into()],
            raw_data: serde_json::json!({"energy": 7}),
            schedule_data: Some(serde_json::json!({"zoneNames": ["Main"]})),
            ..Default::default()
        }
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let store = store();
        let id = store.insert(&new_brief("Sky Bar")).unwrap();
        let brief = store.get(id).unwrap().unwrap();
        assert_eq!(brief.venue_name, "Sky Bar");
        assert_eq!(brief.status, BriefStatus::Submitted);
        assert_eq!(brief.liked_playlist_ids, vec!["deep-house-sunset"]);
        assert_eq!(brief.schedule_data.unwrap()["zoneNames"][0], "Main");
    }

    #[test]
    fn status_transitions_only_move_forward() {
        let store = store();
        let id = store.insert(&new_brief("Sky Bar")).unwrap();
        store.set_status(id, BriefStatus::Approved).unwrap();
        store.set_status(id, BriefStatus::Scheduled).unwrap();

        let err = store.set_status(id, BriefStatus::Submitted);
        assert!(err.is_err());
        assert_eq!(store.get(id).unwrap().unwrap().status, BriefStatus::Scheduled);
    }

    #[test]
    fn for_venue_returns_newest_first() {
        let store = store();
        let first = store.insert(&new_brief("Sky Bar")).unwrap();
        let second = store.insert(&new_brief("Sky Bar")).unwrap();
        store.insert(&new_brief("Other")).unwrap();

        let briefs = store.for_venue("Sky Bar").unwrap();
        assert_eq!(briefs.len(), 2);
        assert_eq!(briefs[0].id, second);
        assert_eq!(briefs[1].id, first);
    }
}
