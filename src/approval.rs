//! Approval flow: brief submission processing, capability-token issuance,
//! and the transactional approval finalize that turns a brief into durable
//! schedule entries (or binds a pre-built remote schedule).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::brief::{
    generate_dayparts, synthesize_designer_brief, BriefInput, Daypart, Dayparts, Recommendation,
};
use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::email::{submission_email, EmailSender};
use crate::error::{DatabaseError, Error, Result};
use crate::platform::{weekly_slots, CreateScheduleInput, PlatformClient};
use crate::store::{schedule, tokens, zones, NewBrief, NewScheduleEntry, Store, ZoneMapping};

/// Zone name used when a single-zone brief never named its room.
pub const DEFAULT_ZONE_NAME: &str = "Main";

/// The full submit payload, §6.2 of the wire contract.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitPayload {
    pub venue_name: String,
    pub venue_type: String,
    pub location: String,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub product: String,
    pub vibes: Vec<String>,
    pub energy: u8,
    pub hours: String,
    pub vocals: String,
    pub avoid_list: String,
    pub guest_profile: String,
    pub age_range: String,
    pub nationality: String,
    pub mood_changes: String,
    pub timezone: Option<String>,
    pub liked_playlists: Vec<String>,
    pub all_recommendations: Vec<Recommendation>,
    pub dayparts_metadata: Option<Dayparts>,
    pub extracted_brief: Option<BriefInput>,
    pub conversation_summary: String,
    pub multi_zone: bool,
    pub zone_names: Vec<String>,
    pub weekend_dayparts: Option<Dayparts>,
    pub weekend_recommendations: Vec<Recommendation>,
    pub weekend_liked_playlists: Vec<String>,
    pub syb_account_id: Option<String>,
    /// Honeypot; any non-empty value means a bot.
    pub website: String,
}

/// One liked playlist resolved to its daypart slot, as persisted in
/// `schedule_data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikedSlot {
    pub playlist_name: String,
    pub playlist_syb_id: Option<String>,
    pub daypart: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

/// The persisted schedule snapshot a brief carries until approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleData {
    pub dayparts: Dayparts,
    pub daypart_order: Vec<String>,
    pub zone_names: Vec<String>,
    pub liked: Vec<LikedSlot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekend_dayparts: Option<Dayparts>,
    #[serde(default)]
    pub weekend_liked: Vec<LikedSlot>,
}

/// Resolve liked playlist names/ids against the recommendations that
/// produced them, carrying daypart and zone through.
fn resolve_liked(
    liked: &[String],
    recommendations: &[Recommendation],
    catalog: &Catalog,
) -> Vec<LikedSlot> {
    liked
        .iter()
        .filter_map(|wanted| {
            let rec = recommendations.iter().find(|r| {
                r.playlist_name.eq_ignore_ascii_case(wanted) || r.playlist_id == *wanted
            })?;
            let syb_id = catalog
                .find(&rec.playlist_id)
                .and_then(|p| p.syb_id.clone());
            Some(LikedSlot {
                playlist_name: rec.playlist_name.clone(),
                playlist_syb_id: syb_id,
                daypart: rec.daypart.clone(),
                zone: rec.zone.clone(),
            })
        })
        .collect()
}

/// Build the schedule snapshot from a submit payload. Dayparts passed back by
/// the client win over regenerated ones.
pub fn build_schedule_data(payload: &SubmitPayload, catalog: &Catalog) -> ScheduleData {
    let brief = payload
        .extracted_brief
        .clone()
        .unwrap_or_else(|| BriefInput {
            venue_type: payload.venue_type.clone(),
            vibes: payload.vibes.clone(),
            energy: payload.energy,
            hours: payload.hours.clone(),
            vocals: payload.vocals.clone(),
            avoid_list: payload.avoid_list.clone(),
            genre_hints: Vec::new(),
        });

    let dayparts = payload
        .dayparts_metadata
        .clone()
        .unwrap_or_else(|| Dayparts::Single(generate_dayparts(&brief.hours, brief.energy)));

    let daypart_order = match &dayparts {
        Dayparts::Single(list) => list.iter().map(|d| d.key.clone()).collect(),
        Dayparts::Multi(map) => map
            .values()
            .next()
            .map(|list| list.iter().map(|d| d.key.clone()).collect())
            .unwrap_or_default(),
    };

    ScheduleData {
        dayparts,
        daypart_order,
        zone_names: payload.zone_names.clone(),
        liked: resolve_liked(&payload.liked_playlists, &payload.all_recommendations, catalog),
        weekend_dayparts: payload.weekend_dayparts.clone(),
        weekend_liked: resolve_liked(
            &payload.weekend_liked_playlists,
            &payload.weekend_recommendations,
            catalog,
        ),
    }
}

fn daypart_bounds<'a>(
    dayparts: &'a Dayparts,
    zone: Option<&str>,
    key: &str,
) -> Option<&'a Daypart> {
    dayparts
        .for_zone(zone)
        .and_then(|parts| parts.iter().find(|p| p.key == key))
}

fn mapping_for_zone<'a>(
    mappings: &'a [ZoneMapping],
    zone: Option<&str>,
) -> Option<&'a ZoneMapping> {
    match zone {
        Some(name) => mappings.iter().find(|m| m.brief_zone_name == name),
        None => mappings
            .iter()
            .find(|m| m.brief_zone_name == DEFAULT_ZONE_NAME)
            .or_else(|| (mappings.len() == 1).then(|| &mappings[0])),
    }
}

/// Materialize schedule entries for one liked-slot set on an open connection
/// (callers wrap this in a transaction). Returns created row ids.
fn materialize_set_on(
    conn: &rusqlite::Connection,
    brief_id: i64,
    slots: &[LikedSlot],
    dayparts: &Dayparts,
    mappings: &[ZoneMapping],
    timezone: &str,
    days: &str,
) -> std::result::Result<Vec<i64>, DatabaseError> {
    let mut ids = Vec::new();
    for slot in slots {
        let Some(syb_id) = slot.playlist_syb_id.as_deref() else {
            warn!(playlist = %slot.playlist_name, "liked playlist has no platform id, skipping");
            continue;
        };
        let Some(part) = daypart_bounds(dayparts, slot.zone.as_deref(), &slot.daypart) else {
            warn!(daypart = %slot.daypart, "liked playlist references unknown daypart, skipping");
            continue;
        };
        let Some(mapping) = mapping_for_zone(mappings, slot.zone.as_deref()) else {
            warn!(zone = ?slot.zone, "no zone mapping for liked playlist, skipping");
            continue;
        };
        let (start, end) = part
            .time_range
            .split_once('-')
            .map(|(s, e)| (s.to_string(), e.to_string()))
            .unwrap_or_default();

        let id = schedule::insert_on(
            conn,
            &NewScheduleEntry {
                brief_id,
                zone_id: mapping.syb_zone_id.clone(),
                zone_name: mapping.brief_zone_name.clone(),
                playlist_syb_id: syb_id.to_string(),
                playlist_name: slot.playlist_name.clone(),
                start_time: start,
                end_time: end,
                days: days.to_string(),
                timezone: timezone.to_string(),
            },
        )?;
        ids.push(id);
    }
    Ok(ids)
}

/// Outcome of a submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub brief_id: Option<i64>,
    pub approval_url: Option<String>,
    pub schedule_prebuilt: bool,
    pub auto_scheduled: bool,
}

/// Process a brief submission end to end: persist, auto-schedule or issue an
/// approval token, pre-build the remote schedule when an account is
/// confirmed, and send the notification email.
pub async fn process_submission(
    payload: &SubmitPayload,
    catalog: &Catalog,
    store: Option<&Store>,
    platform: Option<&Arc<PlatformClient>>,
    mailer: Option<&EmailSender>,
    config: &AppConfig,
) -> Result<SubmitOutcome> {
    if payload.venue_name.trim().is_empty() {
        return Err(Error::BadInput("venueName is required".into()));
    }

    let brief_input = payload.extracted_brief.clone().unwrap_or_default();
    let schedule_data = build_schedule_data(payload, catalog);
    let base_parts: Vec<Daypart> = schedule_data
        .dayparts
        .for_zone(schedule_data.zone_names.first().map(String::as_str))
        .map(|p| p.to_vec())
        .unwrap_or_default();
    let designer = synthesize_designer_brief(
        &BriefInput {
            venue_type: payload.venue_type.clone(),
            vibes: payload.vibes.clone(),
            energy: payload.energy,
            hours: payload.hours.clone(),
            vocals: payload.vocals.clone(),
            avoid_list: payload.avoid_list.clone(),
            genre_hints: brief_input.genre_hints.clone(),
        },
        &base_parts,
    );

    let raw_data = serde_json::json!({
        "payload": {
            "venueName": payload.venue_name,
            "venueType": payload.venue_type,
            "location": payload.location,
            "vibes": payload.vibes,
            "energy": payload.energy,
            "hours": payload.hours,
            "vocals": payload.vocals,
            "avoidList": payload.avoid_list,
            "guestProfile": payload.guest_profile,
            "ageRange": payload.age_range,
            "nationality": payload.nationality,
            "moodChanges": payload.mood_changes,
        },
        "extractedBrief": payload.extracted_brief,
        "designerBrief": designer,
    });

    let mut outcome = SubmitOutcome {
        brief_id: None,
        approval_url: None,
        schedule_prebuilt: false,
        auto_scheduled: false,
    };

    let mut summary_html = format!(
        "<p><strong>Type:</strong> {} · <strong>Energy:</strong> {}/10 · \
         <strong>Hours:</strong> {}</p>\
         <p><strong>Top genres:</strong> {}</p>\
         <p><strong>Liked playlists:</strong> {}</p>",
        payload.venue_type,
        payload.energy,
        payload.hours,
        designer.top_genres.join(", "),
        payload.liked_playlists.join(", "),
    );
    if !payload.conversation_summary.is_empty() {
        summary_html.push_str(&format!("<p>{}</p>", payload.conversation_summary));
    }

    if let Some(store) = store {
        let brief_id = store.briefs.insert(&NewBrief {
            venue_name: payload.venue_name.clone(),
            venue_type: payload.venue_type.clone(),
            location: payload.location.clone(),
            contact_name: payload.contact_name.clone(),
            contact_email: payload.contact_email.clone(),
            contact_phone: payload.contact_phone.clone(),
            product: if payload.product.is_empty() {
                "syb".to_string()
            } else {
                payload.product.clone()
            },
            liked_playlist_ids: payload.liked_playlists.clone(),
            conversation_summary: payload.conversation_summary.clone(),
            raw_data,
            schedule_data: Some(serde_json::to_value(&schedule_data).map_err(DatabaseError::from)?),
            syb_account_id: payload.syb_account_id.clone(),
            automation_tier: None,
        })?;
        outcome.brief_id = Some(brief_id);

        // An unparseable timezone falls back to the venue default rather
        // than poisoning every schedule entry downstream.
        let timezone = payload.timezone.as_deref().filter(|tz| {
            let valid = tz.parse::<chrono_tz::Tz>().is_ok();
            if !valid {
                warn!(timezone = %tz, "ignoring invalid timezone on submission");
            }
            valid
        });
        let venue = store.venues.upsert(
            &payload.venue_name,
            &payload.location,
            &payload.venue_type,
            payload.syb_account_id.as_deref(),
            brief_id,
            timezone,
        )?;

        let mappings = store.zones.for_venue(&payload.venue_name)?;
        if venue.auto_schedule_eligible() && !mappings.is_empty() {
            let mut conn = store.db().conn();
            let tx = conn
                .transaction()
                .map_err(DatabaseError::from)?;
            let mut ids = materialize_set_on(
                &tx,
                brief_id,
                &schedule_data.liked,
                &schedule_data.dayparts,
                &mappings,
                &venue.timezone,
                "daily",
            )?;
            if let Some(ref wk_parts) = schedule_data.weekend_dayparts {
                ids.extend(materialize_set_on(
                    &tx,
                    brief_id,
                    &schedule_data.weekend_liked,
                    wk_parts,
                    &mappings,
                    &venue.timezone,
                    "weekend",
                )?);
            }
            tx.execute(
                "UPDATE briefs SET status = 'approved', automation_tier = 'auto' WHERE id = ?1",
                rusqlite::params![brief_id],
            )
            .map_err(DatabaseError::from)?;
            tx.execute(
                "UPDATE venues SET approved_brief_count = approved_brief_count + 1 WHERE venue_name = ?1",
                rusqlite::params![payload.venue_name],
            )
            .map_err(DatabaseError::from)?;
            tx.commit().map_err(DatabaseError::from)?;
            outcome.auto_scheduled = true;
            info!(brief_id, entries = ids.len(), "auto-scheduled without approval");
        } else {
            let token = store.tokens.issue(brief_id)?;
            outcome.approval_url = Some(format!(
                "{}/approve/{}",
                config.base_url.trim_end_matches('/'),
                token
            ));
            store.follow_ups.schedule_for_brief(brief_id)?;
        }

        // Pre-build the remote schedule when an account is confirmed.
        if let (Some(account_id), Some(platform)) = (&payload.syb_account_id, platform) {
            match prebuild_remote_schedule(
                platform,
                account_id,
                brief_id,
                &payload.venue_name,
                &schedule_data,
            )
            .await
            {
                Ok(schedule_id) => {
                    store.briefs.set_syb_schedule(brief_id, &schedule_id)?;
                    outcome.schedule_prebuilt = true;
                }
                Err(e) => {
                    warn!(brief_id, error = %e, "remote schedule pre-build failed; manual path");
                }
            }
        }
    }

    if let Some(mailer) = mailer {
        let (subject, body) = submission_email(
            &payload.venue_name,
            &payload.contact_name,
            &payload.contact_email,
            &summary_html,
            outcome.approval_url.as_deref(),
            outcome.schedule_prebuilt,
        );
        mailer.send(&config.notify_email, &subject, &body).await?;
    } else {
        warn!("SMTP not configured; submission email skipped");
    }

    Ok(outcome)
}

/// Create a weekly schedule on the platform from the liked slots, then make a
/// best-effort attempt to add it to the account's library.
async fn prebuild_remote_schedule(
    platform: &Arc<PlatformClient>,
    account_id: &str,
    brief_id: i64,
    venue_name: &str,
    data: &ScheduleData,
) -> Result<String> {
    let mut slots = Vec::new();
    for (set, days) in [(&data.liked, "daily"), (&data.weekend_liked, "weekend")] {
        for slot in set.iter() {
            let Some(syb_id) = slot.playlist_syb_id.as_deref() else {
                continue;
            };
            let parts = if days == "weekend" {
                data.weekend_dayparts.as_ref().unwrap_or(&data.dayparts)
            } else {
                &data.dayparts
            };
            if let Some(part) = daypart_bounds(parts, slot.zone.as_deref(), &slot.daypart) {
                slots.extend(weekly_slots(&part.time_range, days, syb_id));
            }
        }
    }
    if slots.is_empty() {
        return Err(Error::BadInput("no schedulable playlists".into()));
    }

    let zone_label = data
        .zone_names
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_ZONE_NAME.to_string());
    let schedule_id = platform
        .create_schedule(&CreateScheduleInput {
            owner_id: account_id.to_string(),
            name: format!("{venue_name} {zone_label} — by BMAsia"),
            present_as: "daily".to_string(),
            description: format!("Generated music schedule. Brief #{brief_id}"),
            slots,
        })
        .await?;

    if let Err(e) = platform
        .add_to_music_library(account_id, &schedule_id)
        .await
    {
        warn!(error = %e, "addToMusicLibrary failed (non-fatal)");
    }
    Ok(schedule_id)
}

/// Token validation outcome for the approval page.
#[derive(Debug)]
pub enum TokenState {
    Valid(crate::store::ApprovalToken),
    Used,
    Expired,
    NotFound,
}

pub fn validate_token(store: &Store, token: &str) -> Result<TokenState> {
    let Some(row) = store.tokens.get(token)? else {
        return Ok(TokenState::NotFound);
    };
    if row.used_at.is_some() {
        return Ok(TokenState::Used);
    }
    if Utc::now() >= row.expires_at {
        return Ok(TokenState::Expired);
    }
    Ok(TokenState::Valid(row))
}

/// Outcome of an approval POST.
#[derive(Debug)]
pub enum ApprovalOutcome {
    /// Entries materialized locally; brief approved.
    Approved { entry_count: usize },
    /// Pre-built remote schedule bound to the mapped zones; brief scheduled.
    ScheduledRemotely,
    /// The token was already redeemed; nothing changed.
    AlreadyUsed,
    /// Token invalid or expired.
    Invalid,
}

/// Finalize an approval in one transaction: upsert zone mappings, bind the
/// remote schedule or materialize entries, consume the token, advance the
/// brief, bump the venue counter. `zone_choices` maps brief zone name to
/// `(syb_zone_id, syb_zone_name)`.
pub async fn finalize_approval(
    store: &Store,
    platform: Option<&Arc<PlatformClient>>,
    token: &str,
    zone_choices: &HashMap<String, (String, String)>,
) -> Result<ApprovalOutcome> {
    let token_row = match validate_token(store, token)? {
        TokenState::Valid(row) => row,
        TokenState::Used => return Ok(ApprovalOutcome::AlreadyUsed),
        TokenState::Expired | TokenState::NotFound => return Ok(ApprovalOutcome::Invalid),
    };

    let brief = store
        .briefs
        .get(token_row.brief_id)?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "brief".into(),
            id: token_row.brief_id.to_string(),
        })?;
    let schedule_data: ScheduleData = brief
        .schedule_data
        .clone()
        .and_then(|v| serde_json::from_value(v).ok())
        .ok_or_else(|| Error::BadInput("brief has no schedule data".into()))?;
    let venue = store.venues.get(&brief.venue_name)?;
    let timezone = venue
        .as_ref()
        .map(|v| v.timezone.clone())
        .unwrap_or_else(|| crate::config::DEFAULT_TIMEZONE.to_string());
    let account_id = brief
        .syb_account_id
        .clone()
        .or_else(|| venue.as_ref().and_then(|v| v.syb_account_id.clone()));

    // A pre-built remote schedule is bound before the transaction: if the
    // platform call fails the token stays redeemable.
    let remote_bound = if let (Some(schedule_id), Some(platform)) =
        (brief.syb_schedule_id.as_deref(), platform)
    {
        let zone_ids: Vec<String> = zone_choices
            .values()
            .map(|(id, _)| id.clone())
            .collect();
        if zone_ids.is_empty() {
            return Err(Error::BadInput("no zones selected".into()));
        }
        platform.assign_source(&zone_ids, schedule_id).await?;
        true
    } else {
        false
    };

    let mut conn = store.db().conn();
    let tx = conn.transaction().map_err(DatabaseError::from)?;

    if !tokens::consume_on(&tx, token, Utc::now())? {
        return Ok(ApprovalOutcome::AlreadyUsed);
    }

    for (zone_name, (syb_zone_id, syb_zone_name)) in zone_choices {
        zones::upsert_on(
            &tx,
            &brief.venue_name,
            zone_name,
            syb_zone_id,
            syb_zone_name,
            account_id.as_deref(),
        )?;
    }

    let outcome = if remote_bound {
        tx.execute(
            "UPDATE briefs SET status = 'scheduled' WHERE id = ?1",
            rusqlite::params![brief.id],
        )
        .map_err(DatabaseError::from)?;
        ApprovalOutcome::ScheduledRemotely
    } else {
        let mappings: Vec<ZoneMapping> = zone_choices
            .iter()
            .map(|(zone_name, (id, name))| ZoneMapping {
                id: 0,
                venue_name: brief.venue_name.clone(),
                brief_zone_name: zone_name.clone(),
                syb_zone_id: id.clone(),
                syb_zone_name: name.clone(),
                syb_account_id: account_id.clone(),
            })
            .collect();

        let mut ids = materialize_set_on(
            &tx,
            brief.id,
            &schedule_data.liked,
            &schedule_data.dayparts,
            &mappings,
            &timezone,
            "daily",
        )?;
        if let Some(ref wk_parts) = schedule_data.weekend_dayparts {
            ids.extend(materialize_set_on(
                &tx,
                brief.id,
                &schedule_data.weekend_liked,
                wk_parts,
                &mappings,
                &timezone,
                "weekend",
            )?);
        }
        tx.execute(
            "UPDATE briefs SET status = 'approved' WHERE id = ?1",
            rusqlite::params![brief.id],
        )
        .map_err(DatabaseError::from)?;
        ApprovalOutcome::Approved {
            entry_count: ids.len(),
        }
    };

    tx.execute(
        "UPDATE venues SET approved_brief_count = approved_brief_count + 1 WHERE venue_name = ?1",
        rusqlite::params![brief.venue_name],
    )
    .map_err(DatabaseError::from)?;
    tx.commit().map_err(DatabaseError::from)?;

    info!(brief_id = brief.id, status = %if remote_bound { "scheduled" } else { "approved" },
        "approval finalized");
    Ok(outcome)
}
