//! Music-platform adapter: a thin GraphQL client for account discovery,
//! zone listing, schedule creation, and playlist assignment, plus the
//! weekly-RRULE slot builder used when pre-building remote schedules.

pub mod accounts;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::PlatformError;

const API_URL: &str = "https://api.soundtrackyourbrand.com/v2";
/// Accounts page size.
const PAGE_SIZE: u32 = 200;
/// Zone listing cap per account.
const ZONE_LIMIT: u32 = 100;

/// One platform account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub business_name: String,
}

/// One page of the paginated accounts listing.
#[derive(Debug, Clone)]
pub struct AccountsPage {
    pub nodes: Vec<Account>,
    pub has_next: bool,
    pub end_cursor: Option<String>,
}

/// A sound zone within an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundZone {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: Option<ZoneLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneLocation {
    pub id: String,
    pub name: String,
}

/// One weekly slot in a created schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSlot {
    /// `FREQ=WEEKLY;BYDAY=<MO|TU|WE|TH|FR|SA|SU>`.
    pub rrule: String,
    /// `HHMMSS` local wall clock.
    pub start: String,
    /// Milliseconds; midnight wrap counts as +24 h.
    pub duration: u64,
    pub playlist_ids: Vec<String>,
}

/// Input for `createSchedule`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleInput {
    pub owner_id: String,
    pub name: String,
    pub present_as: String,
    pub description: String,
    pub slots: Vec<ScheduleSlot>,
}

/// Day-of-week codes for a schedule-entry days filter.
pub fn byday_codes(days: &str) -> &'static [&'static str] {
    match days {
        "weekday" => &["MO", "TU", "WE", "TH", "FR"],
        "weekend" => &["SA", "SU"],
        _ => &["MO", "TU", "WE", "TH", "FR", "SA", "SU"],
    }
}

/// Build the weekly slots for one playlist occupying one daypart.
/// `time_range` is the daypart's `HH:MM-HH:MM` in the venue's local clock.
pub fn weekly_slots(time_range: &str, days: &str, playlist_syb_id: &str) -> Vec<ScheduleSlot> {
    let Some((start, end)) = time_range.split_once('-') else {
        return Vec::new();
    };
    let parse = |s: &str| -> Option<u64> {
        let (h, m) = s.split_once(':')?;
        Some(h.parse::<u64>().ok()? * 60 + m.parse::<u64>().ok()?)
    };
    let (Some(start_min), Some(end_min)) = (parse(start), parse(end)) else {
        return Vec::new();
    };

    let duration_min = if end_min > start_min {
        end_min - start_min
    } else {
        1440 - start_min + end_min
    };
    let start_hhmmss = format!("{:02}{:02}00", start_min / 60, start_min % 60);

    byday_codes(days)
        .iter()
        .map(|day| ScheduleSlot {
            rrule: format!("FREQ=WEEKLY;BYDAY={day}"),
            start: start_hhmmss.clone(),
            duration: duration_min * 60_000,
            playlist_ids: vec![playlist_syb_id.to_string()],
        })
        .collect()
}

/// GraphQL client for the music platform.
pub struct PlatformClient {
    http: reqwest::Client,
    api_token: String,
}

impl PlatformClient {
    pub fn new(api_token: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http, api_token }
    }

    async fn graphql(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value, PlatformError> {
        let response = self
            .http
            .post(API_URL)
            .header("Authorization", format!("Basic {}", self.api_token))
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PlatformError::Transport(format!(
                "status {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;

        if let Some(errors) = body.get("errors").and_then(|e| e.as_array()) {
            if !errors.is_empty() {
                return Err(PlatformError::Graphql(
                    errors
                        .iter()
                        .filter_map(|e| e["message"].as_str())
                        .collect::<Vec<_>>()
                        .join("; "),
                ));
            }
        }

        Ok(body["data"].clone())
    }

    /// One page of accounts, 200 per page.
    pub async fn accounts_page(
        &self,
        cursor: Option<&str>,
    ) -> Result<AccountsPage, PlatformError> {
        let query = r#"
            query Accounts($first: Int!, $after: String) {
              me { ... on PublicAPIClient {
                accounts(first: $first, after: $after) {
                  pageInfo { hasNextPage endCursor }
                  edges { node { id businessName } }
                }
              } }
            }"#;
        let data = self
            .graphql(query, json!({ "first": PAGE_SIZE, "after": cursor }))
            .await?;

        let accounts = &data["me"]["accounts"];
        let nodes = accounts["edges"]
            .as_array()
            .map(|edges| {
                edges
                    .iter()
                    .filter_map(|e| {
                        Some(Account {
                            id: e["node"]["id"].as_str()?.to_string(),
                            business_name: e["node"]["businessName"]
                                .as_str()
                                .unwrap_or_default()
                                .to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(AccountsPage {
            nodes,
            has_next: accounts["pageInfo"]["hasNextPage"].as_bool().unwrap_or(false),
            end_cursor: accounts["pageInfo"]["endCursor"].as_str().map(String::from),
        })
    }

    /// Sound zones for an account, up to 100.
    pub async fn zones(&self, account_id: &str) -> Result<Vec<SoundZone>, PlatformError> {
        let query = r#"
            query Zones($id: ID!, $first: Int!) {
              account(id: $id) {
                soundZones(first: $first) {
                  edges { node { id name location { id name } } }
                }
              }
            }"#;
        let data = self
            .graphql(query, json!({ "id": account_id, "first": ZONE_LIMIT }))
            .await?;

        let zones = data["account"]["soundZones"]["edges"]
            .as_array()
            .map(|edges| {
                edges
                    .iter()
                    .filter_map(|e| serde_json::from_value(e["node"].clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        Ok(zones)
    }

    /// Create a weekly schedule; returns the new schedule id.
    pub async fn create_schedule(
        &self,
        input: &CreateScheduleInput,
    ) -> Result<String, PlatformError> {
        let query = r#"
            mutation CreateSchedule($input: CreateScheduleInput!) {
              createSchedule(input: $input) { schedule { id } }
            }"#;
        let data = self
            .graphql(query, json!({ "input": input }))
            .await?;

        data["createSchedule"]["schedule"]["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| PlatformError::InvalidResponse("createSchedule returned no id".into()))
    }

    /// Add a source to the account's music library. Non-fatal by contract;
    /// callers log failures and move on.
    pub async fn add_to_music_library(
        &self,
        parent: &str,
        source: &str,
    ) -> Result<(), PlatformError> {
        let query = r#"
            mutation AddToLibrary($input: AddToMusicLibraryInput!) {
              addToMusicLibrary(input: $input) { addedSource { id } }
            }"#;
        self.graphql(query, json!({ "input": { "parent": parent, "source": source } }))
            .await?;
        Ok(())
    }

    /// Assign a source (playlist or schedule) to one or more sound zones.
    pub async fn assign_source(
        &self,
        sound_zones: &[String],
        source: &str,
    ) -> Result<(), PlatformError> {
        let query = r#"
            mutation Assign($input: SoundZoneAssignSourceInput!) {
              soundZoneAssignSource(input: $input) { soundZones { id } }
            }"#;
        self.graphql(
            query,
            json!({ "input": { "soundZones": sound_zones, "source": source } }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byday_expansion() {
        assert_eq!(byday_codes("daily").len(), 7);
        assert_eq!(byday_codes("weekday"), &["MO", "TU", "WE", "TH", "FR"]);
        assert_eq!(byday_codes("weekend"), &["SA", "SU"]);
        assert_eq!(byday_codes("anything-else").len(), 7);
    }

    #[test]
    fn weekly_slots_for_a_weekend_daypart() {
        let slots = weekly_slots("20:00-23:30", "weekend", "syb-123");
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].rrule, "FREQ=WEEKLY;BYDAY=SA");
        assert_eq!(slots[0].start, "200000");
        assert_eq!(slots[0].duration, 210 * 60_000);
        assert_eq!(slots[0].playlist_ids, vec!["syb-123".to_string()]);
    }

    #[test]
    fn midnight_wrap_adds_a_day() {
        let slots = weekly_slots("23:00-02:00", "daily", "syb-9");
        assert_eq!(slots.len(), 7);
        // 3 hours through midnight.
        assert_eq!(slots[0].duration, 180 * 60_000);
        assert_eq!(slots[0].start, "230000");
    }

    #[test]
    fn malformed_range_yields_no_slots() {
        assert!(weekly_slots("late", "daily", "syb-1").is_empty());
        assert!(weekly_slots("10:00", "daily", "syb-1").is_empty());
    }

    #[test]
    fn schedule_slot_serializes_camel_case() {
        let slot = ScheduleSlot {
            rrule: "FREQ=WEEKLY;BYDAY=MO".into(),
            start: "090000".into(),
            duration: 60_000,
            playlist_ids: vec!["p".into()],
        };
        let v = serde_json::to_value(&slot).unwrap();
        assert!(v.get("playlistIds").is_some());
    }
}
