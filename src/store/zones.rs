//! ZoneMappingStore — learned associations between the zone names used in
//! conversation and platform sound-zone ids. Written at first approval,
//! reused on every later brief for the venue.

use std::sync::Arc;

use chrono::Utc;

use super::db::Database;
use crate::error::DatabaseError;

/// One learned zone mapping.
#[derive(Debug, Clone)]
pub struct ZoneMapping {
    pub id: i64,
    pub venue_name: String,
    pub brief_zone_name: String,
    pub syb_zone_id: String,
    pub syb_zone_name: String,
    pub syb_account_id: Option<String>,
}

/// Persistent zone-mapping storage backed by SQLite.
pub struct ZoneMappingStore {
    db: Arc<Database>,
}

impl ZoneMappingStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Upsert by `(venue_name, brief_zone_name)`.
    pub fn upsert(
        &self,
        venue_name: &str,
        brief_zone_name: &str,
        syb_zone_id: &str,
        syb_zone_name: &str,
        syb_account_id: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let conn = self.db.conn();
        upsert_on(
            &conn,
            venue_name,
            brief_zone_name,
            syb_zone_id,
            syb_zone_name,
            syb_account_id,
        )
    }

    pub fn for_venue(&self, venue_name: &str) -> Result<Vec<ZoneMapping>, DatabaseError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, venue_name, brief_zone_name, syb_zone_id, syb_zone_name, syb_account_id
             FROM zone_mappings WHERE venue_name = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(rusqlite::params![venue_name], row_to_mapping)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

/// Connection-level upsert, shared with the approval transaction.
pub(crate) fn upsert_on(
    conn: &rusqlite::Connection,
    venue_name: &str,
    brief_zone_name: &str,
    syb_zone_id: &str,
    syb_zone_name: &str,
    syb_account_id: Option<&str>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO zone_mappings (venue_name, brief_zone_name, syb_zone_id,
            syb_zone_name, syb_account_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (venue_name, brief_zone_name) DO UPDATE SET
            syb_zone_id = excluded.syb_zone_id,
            syb_zone_name = excluded.syb_zone_name,
            syb_account_id = COALESCE(excluded.syb_account_id, zone_mappings.syb_account_id)",
        rusqlite::params![
            venue_name,
            brief_zone_name,
            syb_zone_id,
            syb_zone_name,
            syb_account_id,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn row_to_mapping(row: &rusqlite::Row<'_>) -> rusqlite::Result<ZoneMapping> {
    Ok(ZoneMapping {
        id: row.get(0)?,
        venue_name: row.get(1)?,
        brief_zone_name: row.get(2)?,
        syb_zone_id: row.get(3)?,
        syb_zone_name: row.get(4)?,
        syb_account_id: row.get(5)?,
    })
}
