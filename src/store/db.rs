//! SQLite database handle — connection wrapper and migrations.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

/// Shared database handle wrapping a SQLite connection behind a Mutex.
///
/// Using `Mutex` (not `RwLock`) because rusqlite `Connection` is `!Sync`.
/// All DB access is serialized — fine for our write-light workload.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, rusqlite::Error> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("Failed to create directory {}: {}", parent.display(), e)),
                )
            })?;
        }

        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        info!(path = %path.display(), "Database opened");
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Get a lock on the underlying connection.
    ///
    /// Callers hold the lock for the duration of their DB operation.
    pub fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("Database mutex poisoned")
    }

    /// Run all schema migrations. Idempotent at startup.
    fn run_migrations(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS briefs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                venue_name TEXT NOT NULL,
                venue_type TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                contact_name TEXT NOT NULL DEFAULT '',
                contact_email TEXT NOT NULL DEFAULT '',
                contact_phone TEXT NOT NULL DEFAULT '',
                product TEXT NOT NULL DEFAULT 'syb',
                liked_playlist_ids TEXT NOT NULL DEFAULT '[]',
                conversation_summary TEXT NOT NULL DEFAULT '',
                raw_data TEXT NOT NULL DEFAULT '{}',
                schedule_data TEXT,
                status TEXT NOT NULL DEFAULT 'submitted',
                syb_account_id TEXT,
                syb_schedule_id TEXT,
                automation_tier TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_briefs_venue ON briefs(venue_name);
            CREATE INDEX IF NOT EXISTS idx_briefs_contact_email ON briefs(contact_email);

            CREATE TABLE IF NOT EXISTS venues (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                venue_name TEXT NOT NULL UNIQUE,
                location TEXT NOT NULL DEFAULT '',
                venue_type TEXT NOT NULL DEFAULT '',
                syb_account_id TEXT,
                latest_brief_id INTEGER REFERENCES briefs(id),
                auto_schedule INTEGER NOT NULL DEFAULT 0,
                approved_brief_count INTEGER NOT NULL DEFAULT 0,
                timezone TEXT NOT NULL DEFAULT 'Asia/Bangkok',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_venues_name ON venues(venue_name);

            CREATE TABLE IF NOT EXISTS zone_mappings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                venue_name TEXT NOT NULL,
                brief_zone_name TEXT NOT NULL,
                syb_zone_id TEXT NOT NULL,
                syb_zone_name TEXT NOT NULL DEFAULT '',
                syb_account_id TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (venue_name, brief_zone_name)
            );

            CREATE TABLE IF NOT EXISTS schedule_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                brief_id INTEGER NOT NULL REFERENCES briefs(id),
                zone_id TEXT NOT NULL,
                zone_name TEXT NOT NULL DEFAULT '',
                playlist_syb_id TEXT NOT NULL,
                playlist_name TEXT NOT NULL DEFAULT '',
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL DEFAULT '',
                days TEXT NOT NULL DEFAULT 'daily',
                timezone TEXT NOT NULL DEFAULT 'Asia/Bangkok',
                status TEXT NOT NULL DEFAULT 'active',
                last_assigned_at TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_entries_active
                ON schedule_entries(status, start_time) WHERE status = 'active';

            CREATE TABLE IF NOT EXISTS approval_tokens (
                token TEXT PRIMARY KEY,
                brief_id INTEGER NOT NULL REFERENCES briefs(id),
                expires_at TEXT NOT NULL,
                used_at TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tokens_token ON approval_tokens(token);

            CREATE TABLE IF NOT EXISTS follow_ups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                brief_id INTEGER NOT NULL REFERENCES briefs(id),
                type TEXT NOT NULL,
                scheduled_for TEXT NOT NULL,
                sent_at TEXT,
                opened_at TEXT,
                tracking_id TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_follow_ups_due
                ON follow_ups(scheduled_for) WHERE sent_at IS NULL;",
        )?;

        info!("Database migrations complete");
        Ok(())
    }
}
