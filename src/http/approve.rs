//! `GET/POST /approve/{token}` — the human approval page: map logical zones
//! to platform sound zones and activate the schedule.

use std::collections::HashMap;

use axum::extract::{Form, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use tracing::warn;

use crate::approval::{finalize_approval, validate_token, ApprovalOutcome, TokenState};
use crate::approval::{ScheduleData, DEFAULT_ZONE_NAME};
use crate::error::Error;
use crate::http::AppState;
use crate::platform::SoundZone;

fn page(title: &str, body: &str) -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\">\
         <title>{title}</title></head>\
         <body style=\"font-family:sans-serif;max-width:640px;margin:40px auto\">\
         <h1>{title}</h1>{body}</body></html>"
    )
}

fn error_page(status: StatusCode, title: &str, body: &str) -> Response {
    (status, Html(page(title, body))).into_response()
}

/// Discover selectable platform zones for the venue: the confirmed account
/// first, then a cache search by venue name.
async fn discover_zones(state: &AppState, venue_name: &str, account_id: Option<&str>) -> Vec<SoundZone> {
    let Some(platform) = &state.platform else {
        return Vec::new();
    };

    if let Some(account_id) = account_id {
        match platform.zones(account_id).await {
            Ok(zones) => return zones,
            Err(e) => warn!(error = %e, "zone discovery on confirmed account failed"),
        }
    }

    if let Some(accounts) = &state.accounts {
        if let Ok(matches) = accounts.search(venue_name).await {
            if matches.len() == 1 {
                return platform.zones(&matches[0].id).await.unwrap_or_default();
            }
        }
    }
    Vec::new()
}

pub async fn approve_page(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Response {
    let Some(store) = &state.store else {
        return error_page(
            StatusCode::SERVICE_UNAVAILABLE,
            "Not available",
            "<p>Approval is not available in this deployment.</p>",
        );
    };

    let token_row = match validate_token(store, &token) {
        Ok(TokenState::Valid(row)) => row,
        Ok(TokenState::Used) => {
            return error_page(
                StatusCode::GONE,
                "Already activated",
                "<p>This schedule has already been activated. Nothing more to do.</p>",
            )
        }
        Ok(TokenState::Expired) => {
            return error_page(
                StatusCode::GONE,
                "Link expired",
                "<p>This approval link has expired. Ask us to send a fresh one.</p>",
            )
        }
        Ok(TokenState::NotFound) => {
            return error_page(
                StatusCode::NOT_FOUND,
                "Not found",
                "<p>We could not find this approval link.</p>",
            )
        }
        Err(e) => {
            warn!(error = %e, "token validation failed");
            return error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something went wrong",
                "<p>Please try reopening the link.</p>",
            );
        }
    };

    let brief = match store.briefs.get(token_row.brief_id) {
        Ok(Some(brief)) => brief,
        _ => {
            return error_page(
                StatusCode::NOT_FOUND,
                "Not found",
                "<p>The brief behind this link no longer exists.</p>",
            )
        }
    };

    let schedule_data: Option<ScheduleData> = brief
        .schedule_data
        .clone()
        .and_then(|v| serde_json::from_value(v).ok());
    let mut zone_names: Vec<String> = schedule_data
        .map(|d| d.zone_names)
        .unwrap_or_default();
    if zone_names.is_empty() {
        zone_names.push(DEFAULT_ZONE_NAME.to_string());
    }

    let venue = store.venues.get(&brief.venue_name).ok().flatten();
    let account_id = brief
        .syb_account_id
        .clone()
        .or_else(|| venue.as_ref().and_then(|v| v.syb_account_id.clone()));
    let platform_zones = discover_zones(&state, &brief.venue_name, account_id.as_deref()).await;
    let mappings = store.zones.for_venue(&brief.venue_name).unwrap_or_default();

    let mut rows = String::new();
    for zone_name in &zone_names {
        let saved = mappings
            .iter()
            .find(|m| &m.brief_zone_name == zone_name)
            .map(|m| m.syb_zone_id.clone());
        if platform_zones.is_empty() {
            rows.push_str(&format!(
                "<p><label>{zone_name}<br>\
                 <input name=\"zone_{zone_name}\" placeholder=\"Sound zone id\" \
                 value=\"{}\"></label></p>",
                saved.unwrap_or_default()
            ));
        } else {
            let options: String = platform_zones
                .iter()
                .map(|z| {
                    let label = match &z.location {
                        Some(loc) => format!("{} — {}", loc.name, z.name),
                        None => z.name.clone(),
                    };
                    let selected = if saved.as_deref() == Some(z.id.as_str()) {
                        " selected"
                    } else {
                        ""
                    };
                    format!(
                        "<option value=\"{}|{}\"{selected}>{label}</option>",
                        z.id, z.name
                    )
                })
                .collect();
            rows.push_str(&format!(
                "<p><label>{zone_name}<br>\
                 <select name=\"zone_{zone_name}\">{options}</select></label></p>"
            ));
        }
    }

    let badge = if brief.syb_schedule_id.is_some() {
        "<p>✅ A schedule is already built on the platform; approving binds it \
         to your zones.</p>"
    } else {
        ""
    };

    let body = format!(
        "<p>Venue: <strong>{}</strong></p>{badge}\
         <form method=\"post\">{rows}\
         <button type=\"submit\" style=\"background:#1a73e8;color:#fff;\
         padding:10px 24px;border:0;cursor:pointer\">Activate schedule</button>\
         </form>",
        brief.venue_name
    );
    Html(page("Approve your music schedule", &body)).into_response()
}

pub async fn approve_submit(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let Some(store) = &state.store else {
        return error_page(
            StatusCode::SERVICE_UNAVAILABLE,
            "Not available",
            "<p>Approval is not available in this deployment.</p>",
        );
    };

    // zone_<briefZoneName> = "<zoneId>|<zoneName>" (or a bare id).
    let mut choices = HashMap::new();
    for (key, value) in &form {
        let Some(zone_name) = key.strip_prefix("zone_") else {
            continue;
        };
        if value.trim().is_empty() {
            continue;
        }
        let (id, name) = match value.split_once('|') {
            Some((id, name)) => (id.to_string(), name.to_string()),
            None => (value.trim().to_string(), String::new()),
        };
        choices.insert(zone_name.to_string(), (id, name));
    }
    if choices.is_empty() {
        return error_page(
            StatusCode::BAD_REQUEST,
            "No zones selected",
            "<p>Pick a sound zone for each area, then activate.</p>",
        );
    }

    match finalize_approval(store, state.platform.as_ref(), &token, &choices).await {
        Ok(ApprovalOutcome::Approved { entry_count }) => Html(page(
            "Schedule activated",
            &format!(
                "<p>All set — {entry_count} schedule slots are now live. The music \
                 will switch automatically through the day.</p>"
            ),
        ))
        .into_response(),
        Ok(ApprovalOutcome::ScheduledRemotely) => Html(page(
            "Schedule activated",
            "<p>All set — your pre-built schedule is now running on your zones.</p>",
        ))
        .into_response(),
        Ok(ApprovalOutcome::AlreadyUsed) => Html(page(
            "Already activated",
            "<p>This schedule was already activated earlier. Nothing changed.</p>",
        ))
        .into_response(),
        Ok(ApprovalOutcome::Invalid) => error_page(
            StatusCode::GONE,
            "Link invalid",
            "<p>This approval link is no longer valid.</p>",
        ),
        Err(Error::Platform(e)) => {
            warn!(error = %e, "zone assignment failed during approval");
            error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Activation failed",
                "<p>We could not reach the music platform. Reopen the link and \
                 try again — nothing was lost.</p>",
            )
        }
        Err(e) => {
            warn!(error = %e, "approval finalize failed");
            error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something went wrong",
                "<p>Please reopen the link and try again.</p>",
            )
        }
    }
}
