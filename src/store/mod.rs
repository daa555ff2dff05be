//! Persistence layer: one store per aggregate over a shared SQLite handle.

pub mod briefs;
pub mod db;
pub mod followups;
pub mod schedule;
pub mod tokens;
pub mod venues;
pub mod zones;

use std::sync::Arc;

pub use briefs::{Brief, BriefStatus, BriefStore, NewBrief};
pub use db::Database;
pub use followups::{FollowUp, FollowUpStore};
pub use schedule::{EntryStatus, NewScheduleEntry, ScheduleEntry, ScheduleEntryStore};
pub use tokens::{ApprovalToken, ApprovalTokenStore};
pub use venues::{Venue, VenueStore};
pub use zones::{ZoneMapping, ZoneMappingStore};

/// Facade bundling every aggregate store over one database handle.
pub struct Store {
    db: Arc<Database>,
    pub briefs: BriefStore,
    pub venues: VenueStore,
    pub zones: ZoneMappingStore,
    pub schedule: ScheduleEntryStore,
    pub tokens: ApprovalTokenStore,
    pub follow_ups: FollowUpStore,
}

impl Store {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            briefs: BriefStore::new(Arc::clone(&db)),
            venues: VenueStore::new(Arc::clone(&db)),
            zones: ZoneMappingStore::new(Arc::clone(&db)),
            schedule: ScheduleEntryStore::new(Arc::clone(&db)),
            tokens: ApprovalTokenStore::new(Arc::clone(&db)),
            follow_ups: FollowUpStore::new(Arc::clone(&db)),
            db,
        }
    }

    /// The shared handle, for multi-aggregate transactions.
    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }
}
