//! ApprovalTokenStore — single-use capability tokens for the approval URL.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::db::Database;
use crate::error::DatabaseError;

/// Token validity window.
pub const TOKEN_TTL_DAYS: i64 = 7;

/// A persisted approval token.
#[derive(Debug, Clone)]
pub struct ApprovalToken {
    pub token: String,
    pub brief_id: i64,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && now < self.expires_at
    }
}

/// 256-bit hex capability token.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Persistent token storage backed by SQLite.
pub struct ApprovalTokenStore {
    db: Arc<Database>,
}

impl ApprovalTokenStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Issue a fresh token for a brief, valid for seven days.
    pub fn issue(&self, brief_id: i64) -> Result<String, DatabaseError> {
        let token = generate_token();
        let now = Utc::now();
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO approval_tokens (token, brief_id, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                token,
                brief_id,
                (now + Duration::days(TOKEN_TTL_DAYS)).to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;
        Ok(token)
    }

    pub fn get(&self, token: &str) -> Result<Option<ApprovalToken>, DatabaseError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT token, brief_id, expires_at, used_at, created_at
             FROM approval_tokens WHERE token = ?1",
        )?;
        let mut rows = stmt.query_map(rusqlite::params![token], row_to_token)?;
        match rows.next() {
            Some(Ok(t)) => Ok(Some(t)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

/// Connection-level consume: the single point of serialization for approval.
/// Returns false when the token was already used (double submit).
pub(crate) fn consume_on(
    conn: &rusqlite::Connection,
    token: &str,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE approval_tokens SET used_at = ?2
         WHERE token = ?1 AND used_at IS NULL",
        rusqlite::params![token, now.to_rfc3339()],
    )?;
    Ok(changed == 1)
}

fn row_to_token(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApprovalToken> {
    let expires: String = row.get(2)?;
    let used: Option<String> = row.get(3)?;
    let created: String = row.get(4)?;
    let parse = |s: &str| {
        DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    };
    Ok(ApprovalToken {
        token: row.get(0)?,
        brief_id: row.get(1)?,
        expires_at: parse(&expires),
        used_at: used.map(|s| parse(&s)),
        created_at: parse(&created),
    })
}
