//! Schedule executor: a singleton one-minute tick that assigns due playlists
//! to zones in each venue's local timezone, catches up after cold starts,
//! dispatches follow-up emails, and keeps the process warm while entries are
//! active.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, DEFAULT_TIMEZONE};
use crate::email::{followup_email, EmailSender, FollowUpKind};
use crate::platform::PlatformClient;
use crate::store::{ScheduleEntry, Store};

/// Tick period.
const TICK_SECS: u64 = 60;
/// Due-now tolerance around the tick, in minutes either side.
const DUE_WINDOW_MIN: u32 = 1;
/// Keepalive arbiter cadence, in ticks.
const KEEPALIVE_EVERY_TICKS: u64 = 5;
/// Self-ping period once keepalive is on.
const KEEPALIVE_PING_SECS: u64 = 600;

/// Resolve an entry's zone, falling back to the service default.
fn zone_of(name: &str) -> Tz {
    Tz::from_str(name).unwrap_or_else(|_| {
        Tz::from_str(DEFAULT_TIMEZONE).expect("default timezone is valid")
    })
}

fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// Does the entry's day filter admit this local weekday?
pub fn day_filter_admits(days: &str, weekday: Weekday) -> bool {
    match days {
        "weekday" => weekday.number_from_monday() <= 5,
        "weekend" => weekday.number_from_monday() >= 6,
        _ => true,
    }
}

/// Has the entry not yet been assigned today, in its own timezone?
fn needs_assignment_today(entry: &ScheduleEntry, now_utc: DateTime<Utc>) -> bool {
    match entry.last_assigned_at {
        None => true,
        Some(at) => {
            let tz = zone_of(&entry.timezone);
            at.with_timezone(&tz).date_naive() < now_utc.with_timezone(&tz).date_naive()
        }
    }
}

/// Minute distance on the 24 h clock face.
fn clock_distance(a: u32, b: u32) -> u32 {
    let d = (a as i32 - b as i32).rem_euclid(1440) as u32;
    d.min(1440 - d)
}

/// Is the entry inside the ±1 minute due-now window at this instant?
pub fn is_due_now(entry: &ScheduleEntry, now_utc: DateTime<Utc>) -> bool {
    let tz = zone_of(&entry.timezone);
    let local = now_utc.with_timezone(&tz);
    if !day_filter_admits(&entry.days, local.weekday()) {
        return false;
    }
    let Some(start) = parse_hhmm(&entry.start_time) else {
        return false;
    };
    let now_min = local.hour() * 60 + local.minute();
    clock_distance(start, now_min) <= DUE_WINDOW_MIN && needs_assignment_today(entry, now_utc)
}

/// Is the entry overdue today (its start already passed in local time) and
/// still unassigned? Feeds the cold-start catch-up pass.
pub fn is_overdue(entry: &ScheduleEntry, now_utc: DateTime<Utc>) -> bool {
    let tz = zone_of(&entry.timezone);
    let local = now_utc.with_timezone(&tz);
    if !day_filter_admits(&entry.days, local.weekday()) {
        return false;
    }
    let Some(start) = parse_hhmm(&entry.start_time) else {
        return false;
    };
    let now_min = local.hour() * 60 + local.minute();
    start < now_min && needs_assignment_today(entry, now_utc)
}

/// Collapse overdue entries to one per zone: the latest start is the one
/// that should currently be playing.
pub fn collapse_catchup(mut entries: Vec<ScheduleEntry>) -> Vec<ScheduleEntry> {
    entries.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    let mut latest: std::collections::HashMap<String, ScheduleEntry> =
        std::collections::HashMap::new();
    for entry in entries {
        latest.insert(entry.zone_id.clone(), entry);
    }
    let mut result: Vec<ScheduleEntry> = latest.into_values().collect();
    result.sort_by_key(|e| e.id);
    result
}

/// The singleton background executor.
pub struct Executor {
    store: Arc<Store>,
    platform: Option<Arc<PlatformClient>>,
    mailer: Option<EmailSender>,
    config: AppConfig,
    tick_count: AtomicU64,
    ping_task: Mutex<Option<JoinHandle<()>>>,
}

impl Executor {
    pub fn new(
        store: Arc<Store>,
        platform: Option<Arc<PlatformClient>>,
        mailer: Option<EmailSender>,
        config: AppConfig,
    ) -> Self {
        Self {
            store,
            platform,
            mailer,
            config,
            tick_count: AtomicU64::new(0),
            ping_task: Mutex::new(None),
        }
    }

    /// Spawn the one-minute loop. Ticks never overlap and never raise.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(TICK_SECS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                self.tick(Utc::now()).await;
            }
        })
    }

    /// One tick: due-now assignments, catch-up, follow-ups, keepalive.
    pub async fn tick(&self, now: DateTime<Utc>) {
        let tick = self.tick_count.fetch_add(1, Ordering::Relaxed) + 1;

        let entries = match self.store.schedule.active() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "executor could not load entries");
                return;
            }
        };

        let due: Vec<&ScheduleEntry> = entries.iter().filter(|e| is_due_now(e, now)).collect();
        debug!(tick, active = entries.len(), due = due.len(), "executor tick");
        for entry in due {
            self.assign(entry, now).await;
        }

        // Catch-up runs over fresh rows so anything just assigned drops out.
        match self.store.schedule.active() {
            Ok(entries) => {
                let overdue: Vec<ScheduleEntry> = entries
                    .into_iter()
                    .filter(|e| is_overdue(e, now))
                    .collect();
                let chosen = collapse_catchup(overdue);
                if !chosen.is_empty() {
                    info!(count = chosen.len(), "catch-up assigning latest overdue entries");
                }
                for entry in &chosen {
                    self.assign(entry, now).await;
                }
            }
            Err(e) => warn!(error = %e, "executor could not load entries for catch-up"),
        }

        self.dispatch_followups(now).await;

        if tick % KEEPALIVE_EVERY_TICKS == 0 {
            self.arbitrate_keepalive().await;
        }
    }

    /// Assign one entry's playlist to its zone, with per-entry retry
    /// bookkeeping. Failures never escape the tick.
    async fn assign(&self, entry: &ScheduleEntry, now: DateTime<Utc>) {
        let Some(platform) = &self.platform else {
            debug!(entry_id = entry.id, "platform not configured; assignment skipped");
            return;
        };
        match platform
            .assign_source(std::slice::from_ref(&entry.zone_id), &entry.playlist_syb_id)
            .await
        {
            Ok(()) => {
                info!(
                    entry_id = entry.id,
                    zone = %entry.zone_name,
                    playlist = %entry.playlist_name,
                    "assigned playlist to zone"
                );
                if let Err(e) = self.store.schedule.mark_assigned(entry.id, now) {
                    warn!(entry_id = entry.id, error = %e, "failed to stamp assignment");
                }
            }
            Err(e) => {
                warn!(entry_id = entry.id, error = %e, "assignment failed");
                if let Err(e) = self.store.schedule.record_failure(entry.id) {
                    warn!(entry_id = entry.id, error = %e, "failed to record failure");
                }
            }
        }
    }

    /// Send due follow-up emails. Each row gets exactly one attempt ever:
    /// `sent_at` is stamped whether or not SMTP cooperated.
    async fn dispatch_followups(&self, now: DateTime<Utc>) {
        let due = match self.store.follow_ups.due(now) {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "could not load due follow-ups");
                return;
            }
        };

        for row in due {
            let brief = match self.store.briefs.get(row.brief_id) {
                Ok(Some(brief)) => brief,
                Ok(None) => {
                    warn!(follow_up = row.id, brief_id = row.brief_id, "brief missing");
                    let _ = self.store.follow_ups.mark_sent(row.id, now);
                    continue;
                }
                Err(e) => {
                    warn!(follow_up = row.id, error = %e, "brief lookup failed");
                    continue;
                }
            };

            if brief.contact_email.is_empty() {
                let _ = self.store.follow_ups.mark_sent(row.id, now);
                continue;
            }

            if let (Some(mailer), Some(kind)) = (&self.mailer, FollowUpKind::parse(&row.kind)) {
                let (subject, body) = followup_email(
                    kind,
                    &brief.venue_name,
                    &brief.contact_name,
                    &self.config.base_url,
                    &row.tracking_id,
                );
                if let Err(e) = mailer.send(&brief.contact_email, &subject, &body).await {
                    warn!(follow_up = row.id, error = %e, "follow-up send failed");
                }
            }
            let _ = self.store.follow_ups.mark_sent(row.id, now);
        }
    }

    /// Start or stop the self-ping loop depending on whether any entry is
    /// active. Free-tier hosts sleep idle processes; the executor must not
    /// sleep through a start time.
    async fn arbitrate_keepalive(&self) {
        let active = self.store.schedule.count_active().unwrap_or(0);
        let mut task = self.ping_task.lock().await;
        match (&*task, active > 0) {
            (None, true) => {
                let url = format!("{}/health", self.config.base_url.trim_end_matches('/'));
                info!("keepalive started");
                *task = Some(tokio::spawn(async move {
                    let client = reqwest::Client::new();
                    let mut interval =
                        tokio::time::interval(Duration::from_secs(KEEPALIVE_PING_SECS));
                    loop {
                        interval.tick().await;
                        if let Err(e) = client.get(&url).send().await {
                            debug!(error = %e, "keepalive ping failed");
                        }
                    }
                }));
            }
            (Some(_), false) => {
                if let Some(handle) = task.take() {
                    handle.abort();
                    info!("keepalive stopped");
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Bangkok;
    use crate::store::EntryStatus;

    fn entry(id: i64, zone: &str, start: &str, days: &str) -> ScheduleEntry {
        ScheduleEntry {
            id,
            brief_id: 1,
            zone_id: zone.into(),
            zone_name: zone.into(),
            playlist_syb_id: "syb-1".into(),
            playlist_name: "Test".into(),
            start_time: start.into(),
            end_time: String::new(),
            days: days.into(),
            timezone: "Asia/Bangkok".into(),
            status: EntryStatus::Active,
            last_assigned_at: None,
            retry_count: 0,
        }
    }

    /// A Wednesday evening in Bangkok, as UTC.
    fn wednesday_1930() -> DateTime<Utc> {
        Bangkok
            .with_ymd_and_hms(2025, 1, 8, 19, 30, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn due_window_is_one_minute_either_side() {
        let e = entry(1, "z", "19:30", "daily");
        assert!(is_due_now(&e, wednesday_1930()));

        let e = entry(1, "z", "19:31", "daily");
        assert!(is_due_now(&e, wednesday_1930()));
        let e = entry(1, "z", "19:29", "daily");
        assert!(is_due_now(&e, wednesday_1930()));

        let e = entry(1, "z", "19:32", "daily");
        assert!(!is_due_now(&e, wednesday_1930()));
    }

    #[test]
    fn due_window_wraps_midnight() {
        let just_past_midnight = Bangkok
            .with_ymd_and_hms(2025, 1, 8, 0, 0, 30)
            .unwrap()
            .with_timezone(&Utc);
        let e = entry(1, "z", "23:59", "daily");
        assert!(is_due_now(&e, just_past_midnight));
    }

    #[test]
    fn already_assigned_today_is_not_due_again() {
        let mut e = entry(1, "z", "19:30", "daily");
        e.last_assigned_at = Some(
            Bangkok
                .with_ymd_and_hms(2025, 1, 8, 19, 30, 10)
                .unwrap()
                .with_timezone(&Utc),
        );
        assert!(!is_due_now(&e, wednesday_1930()));

        // Yesterday's assignment does not block today.
        e.last_assigned_at = Some(
            Bangkok
                .with_ymd_and_hms(2025, 1, 7, 19, 30, 0)
                .unwrap()
                .with_timezone(&Utc),
        );
        assert!(is_due_now(&e, wednesday_1930()));
    }

    #[test]
    fn catchup_picks_the_latest_overdue_entry_per_zone() {
        // Cold start at 19:30: three entries for one zone earlier today.
        let now = wednesday_1930();
        let entries = vec![
            entry(1, "z-1", "08:00", "daily"),
            entry(2, "z-1", "12:00", "daily"),
            entry(3, "z-1", "18:00", "daily"),
        ];
        let overdue: Vec<ScheduleEntry> = entries
            .into_iter()
            .filter(|e| is_overdue(e, now))
            .collect();
        assert_eq!(overdue.len(), 3);

        let chosen = collapse_catchup(overdue);
        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].start_time, "18:00");
    }

    #[test]
    fn catchup_keeps_one_entry_per_zone() {
        let now = wednesday_1930();
        let entries = vec![
            entry(1, "z-1", "08:00", "daily"),
            entry(2, "z-1", "18:00", "daily"),
            entry(3, "z-2", "09:00", "daily"),
        ];
        let chosen = collapse_catchup(
            entries
                .into_iter()
                .filter(|e| is_overdue(e, now))
                .collect(),
        );
        assert_eq!(chosen.len(), 2);
        let starts: std::collections::HashMap<&str, &str> = chosen
            .iter()
            .map(|e| (e.zone_id.as_str(), e.start_time.as_str()))
            .collect();
        assert_eq!(starts["z-1"], "18:00");
        assert_eq!(starts["z-2"], "09:00");
    }

    #[test]
    fn weekday_entry_is_not_due_on_saturday() {
        // 2025-01-04 was a Saturday.
        let saturday = Bangkok
            .with_ymd_and_hms(2025, 1, 4, 10, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        let e = entry(1, "z", "10:00", "weekday");
        assert!(!is_due_now(&e, saturday));
        assert!(!is_overdue(&entry(1, "z", "08:00", "weekday"), saturday));

        let weekend = entry(2, "z", "10:00", "weekend");
        assert!(is_due_now(&weekend, saturday));
    }

    #[test]
    fn day_filter_table() {
        assert!(day_filter_admits("daily", Weekday::Sun));
        assert!(day_filter_admits("weekday", Weekday::Fri));
        assert!(!day_filter_admits("weekday", Weekday::Sat));
        assert!(day_filter_admits("weekend", Weekday::Sun));
        assert!(!day_filter_admits("weekend", Weekday::Tue));
    }

    #[test]
    fn future_entry_today_is_not_overdue() {
        let now = wednesday_1930();
        assert!(!is_overdue(&entry(1, "z", "22:00", "daily"), now));
    }

    #[test]
    fn timezone_changes_the_local_answer() {
        // 19:30 Bangkok is 13:30 in Paris; a Paris 18:00 entry is not yet due.
        let now = wednesday_1930();
        let mut e = entry(1, "z", "18:00", "daily");
        e.timezone = "Europe/Paris".into();
        assert!(!is_overdue(&e, now));
        // The same wall-clock entry in Bangkok already passed.
        let e = entry(1, "z", "18:00", "daily");
        assert!(is_overdue(&e, now));
    }

    #[test]
    fn unknown_timezone_falls_back_to_default() {
        let mut e = entry(1, "z", "18:00", "daily");
        e.timezone = "Not/AZone".into();
        // Falls back to Asia/Bangkok, where 18:00 already passed at 19:30.
        assert!(is_overdue(&e, wednesday_1930()));
    }
}
