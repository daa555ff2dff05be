//! VenueStore — one row per unique venue name, carrying the auto-schedule
//! flag and the timezone every schedule entry denormalizes.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::db::Database;
use crate::config::DEFAULT_TIMEZONE;
use crate::error::DatabaseError;

/// A persisted venue.
#[derive(Debug, Clone)]
pub struct Venue {
    pub id: i64,
    pub venue_name: String,
    pub location: String,
    pub venue_type: String,
    pub syb_account_id: Option<String>,
    pub latest_brief_id: Option<i64>,
    pub auto_schedule: bool,
    pub approved_brief_count: i64,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Venue {
    /// Eligible for scheduling without human approval.
    pub fn auto_schedule_eligible(&self) -> bool {
        self.auto_schedule && self.approved_brief_count >= 2
    }
}

/// Persistent venue storage backed by SQLite.
pub struct VenueStore {
    db: Arc<Database>,
}

impl VenueStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or refresh the venue for a new brief. Existing rows keep their
    /// auto_schedule flag, approval count, and timezone.
    #[allow(clippy::too_many_arguments)]
    pub fn upsert(
        &self,
        venue_name: &str,
        location: &str,
        venue_type: &str,
        syb_account_id: Option<&str>,
        latest_brief_id: i64,
        timezone: Option<&str>,
    ) -> Result<Venue, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO venues (venue_name, location, venue_type, syb_account_id,
                latest_brief_id, timezone, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT (venue_name) DO UPDATE SET
                location = excluded.location,
                venue_type = excluded.venue_type,
                syb_account_id = COALESCE(excluded.syb_account_id, venues.syb_account_id),
                latest_brief_id = excluded.latest_brief_id,
                updated_at = excluded.updated_at",
            rusqlite::params![
                venue_name,
                location,
                venue_type,
                syb_account_id,
                latest_brief_id,
                timezone.unwrap_or(DEFAULT_TIMEZONE),
                now,
            ],
        )?;
        drop(conn);

        self.get(venue_name)?.ok_or_else(|| DatabaseError::NotFound {
            entity: "venue".into(),
            id: venue_name.into(),
        })
    }

    pub fn get(&self, venue_name: &str) -> Result<Option<Venue>, DatabaseError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, venue_name, location, venue_type, syb_account_id,
                    latest_brief_id, auto_schedule, approved_brief_count, timezone,
                    created_at, updated_at
             FROM venues WHERE venue_name = ?1",
        )?;
        let mut rows = stmt.query_map(rusqlite::params![venue_name], row_to_venue)?;
        match rows.next() {
            Some(Ok(venue)) => Ok(Some(venue)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    pub fn increment_approved_count(&self, venue_name: &str) -> Result<(), DatabaseError> {
        let conn = self.db.conn();
        conn.execute(
            "UPDATE venues SET approved_brief_count = approved_brief_count + 1,
                    updated_at = ?2
             WHERE venue_name = ?1",
            rusqlite::params![venue_name, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Operator switch for skipping human approval on future briefs.
    pub fn set_auto_schedule(&self, venue_name: &str, enabled: bool) -> Result<(), DatabaseError> {
        let conn = self.db.conn();
        conn.execute(
            "UPDATE venues SET auto_schedule = ?2, updated_at = ?3 WHERE venue_name = ?1",
            rusqlite::params![venue_name, enabled as i64, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

fn row_to_venue(row: &rusqlite::Row<'_>) -> rusqlite::Result<Venue> {
    let created: String = row.get(9)?;
    let updated: String = row.get(10)?;
    Ok(Venue {
        id: row.get(0)?,
        venue_name: row.get(1)?,
        location: row.get(2)?,
        venue_type: row.get(3)?,
        syb_account_id: row.get(4)?,
        latest_brief_id: row.get(5)?,
        auto_schedule: row.get::<_, i64>(6)? != 0,
        approved_brief_count: row.get(7)?,
        timezone: row.get(8)?,
        created_at: DateTime::parse_from_rfc3339(&created)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&updated)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VenueStore {
        VenueStore::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    #[test]
    fn upsert_creates_then_updates() {
        let store = store();
        let v1 = store
            .upsert("Sky Bar", "Bangkok", "bar-lounge", None, 1, None)
            .unwrap();
        assert_eq!(v1.timezone, "Asia/Bangkok");
        assert_eq!(v1.approved_brief_count, 0);

        let v2 = store
            .upsert("Sky Bar", "Bangkok, TH", "rooftop-bar", Some("acc-1"), 2, None)
            .unwrap();
        assert_eq!(v2.id, v1.id);
        assert_eq!(v2.location, "Bangkok, TH");
        assert_eq!(v2.latest_brief_id, Some(2));
        assert_eq!(v2.syb_account_id.as_deref(), Some("acc-1"));
    }

    #[test]
    fn upsert_preserves_existing_account_when_none_given() {
        let store = store();
        store
            .upsert("Sky Bar", "", "", Some("acc-1"), 1, None)
            .unwrap();
        let v = store.upsert("Sky Bar", "", "", None, 2, None).unwrap();
        assert_eq!(v.syb_account_id.as_deref(), Some("acc-1"));
    }

    #[test]
    fn auto_schedule_needs_flag_and_two_approvals() {
        let store = store();
        store
            .upsert("Sky Bar", "", "bar-lounge", None, 1, None)
            .unwrap();
        store.set_auto_schedule("Sky Bar", true).unwrap();
        assert!(!store.get("Sky Bar").unwrap().unwrap().auto_schedule_eligible());

        store.increment_approved_count("Sky Bar").unwrap();
        store.increment_approved_count("Sky Bar").unwrap();
        assert!(store.get("Sky Bar").unwrap().unwrap().auto_schedule_eligible());
    }

    #[test]
    fn custom_timezone_is_kept() {
        let store = store();
        let v = store
            .upsert("Alpine Lodge", "", "hotel", None, 1, Some("Europe/Zurich"))
            .unwrap();
        assert_eq!(v.timezone, "Europe/Zurich");
    }
}
