//! `POST /api/recommend` — the non-chat recommendation path. Tries an
//! LLM-curated pick first when a model is configured; any parse or
//! validation failure falls back to the deterministic matcher.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::brief::{generate_dayparts, matcher, BriefInput, Dayparts, Recommendation, ZoneSpec};
use crate::catalog::Catalog;
use crate::http::rate_limit::{client_ip, RECOMMEND_LIMIT};
use crate::http::AppState;
use crate::llm::{AnthropicClient, Message, MessagesRequest};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecommendRequest {
    #[serde(flatten)]
    pub brief: BriefInput,
    pub multi_zone: bool,
    pub zones: Vec<ZoneSpec>,
    pub weekend_mode: Option<ZoneSpec>,
}

/// The strict JSON envelope the model is asked to produce.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmEnvelope {
    recommendations: Vec<LlmPick>,
    #[serde(default)]
    designer_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmPick {
    playlist_id: String,
    daypart: String,
    reason: String,
    match_score: f64,
}

/// Pull the first JSON object out of a model reply, tolerating markdown
/// fences and trailing prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let stripped = text.trim();
    let stripped = stripped
        .strip_prefix("```json")
        .or_else(|| stripped.strip_prefix("```"))
        .unwrap_or(stripped);
    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&stripped[start..=end])
}

/// Validate an envelope against the catalog and the generated dayparts.
/// Returns `None` when nothing usable survives, which triggers the fallback.
fn validate_envelope(
    envelope: LlmEnvelope,
    catalog: &Catalog,
    daypart_keys: &[String],
) -> Option<(Vec<Recommendation>, Option<String>)> {
    let mut picks = Vec::new();
    for pick in envelope.recommendations {
        let Some(playlist) = catalog.find(&pick.playlist_id) else {
            continue;
        };
        if !daypart_keys.iter().any(|k| *k == pick.daypart) {
            continue;
        }
        picks.push(Recommendation {
            playlist_id: playlist.id.clone(),
            playlist_name: playlist.name.clone(),
            daypart: pick.daypart,
            reason: pick.reason,
            match_score: pick.match_score.clamp(55.0, 95.0).round() as u8,
            zone: None,
            schedule_type: None,
        });
    }
    if picks.is_empty() {
        None
    } else {
        Some((picks, envelope.designer_notes))
    }
}

async fn llm_first(
    llm: &AnthropicClient,
    catalog: &Catalog,
    brief: &BriefInput,
    daypart_keys: &[String],
) -> Option<(Vec<Recommendation>, Option<String>)> {
    let menu: Vec<String> = catalog
        .playlists()
        .iter()
        .take(60)
        .map(|p| format!("- {}: {} — {}", p.id, p.name, p.description))
        .collect();
    let prompt = format!(
        "Pick the best playlists for this venue brief.\n\nBrief:\n{}\n\n\
         Daypart keys: {}\n\nCatalog:\n{}\n\n\
         Reply with ONLY a JSON object, no prose:\n\
         {{\"recommendations\":[{{\"playlistId\":\"...\",\"daypart\":\"...\",\
         \"reason\":\"...\",\"matchScore\":80}}],\"designerNotes\":\"...\"}}",
        serde_json::to_string(brief).ok()?,
        daypart_keys.join(", "),
        menu.join("\n"),
    );

    let response = llm
        .messages(MessagesRequest {
            model: String::new(),
            max_tokens: 1500,
            system: None,
            messages: vec![Message::user_text(prompt)],
            tools: Vec::new(),
        })
        .await
        .ok()?;

    let envelope: LlmEnvelope =
        serde_json::from_str(extract_json_object(&response.text())?).ok()?;
    validate_envelope(envelope, catalog, daypart_keys)
}

pub async fn recommend(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<RecommendRequest>,
) -> Response {
    let ip = client_ip(&headers, Some(peer));
    if let Err(retry_after) = state.limiter.check(&ip, "recommend", RECOMMEND_LIMIT) {
        return super::submit::rate_limited_response(retry_after);
    }

    if request.brief.venue_type.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "venueType is required" })),
        )
            .into_response();
    }
    if request.brief.vibes.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "at least one vibe is required" })),
        )
            .into_response();
    }

    let zones = if request.multi_zone {
        request.zones.clone()
    } else {
        Vec::new()
    };
    let mut bundle = matcher::build_bundle(
        &state.catalog,
        &request.brief,
        &zones,
        request.weekend_mode.as_ref(),
    );

    // LLM-first attempt only on the single-zone path; any failure keeps the
    // deterministic result.
    if zones.is_empty() {
        if let Some(llm) = &state.llm {
            let parts = generate_dayparts(&request.brief.hours, request.brief.energy);
            let keys: Vec<String> = parts.iter().map(|p| p.key.clone()).collect();
            if let Some((picks, notes)) =
                llm_first(llm, &state.catalog, &request.brief, &keys).await
            {
                debug!(count = picks.len(), "LLM-first recommendations accepted");
                bundle.recommendations = picks;
                bundle.dayparts = Dayparts::Single(parts);
                if let Some(notes) = notes {
                    bundle.designer_notes = notes;
                }
            }
        }
    }

    (StatusCode::OK, Json(bundle)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn catalog() -> Catalog {
        Catalog::from_playlists(vec![crate::catalog::Playlist {
            id: "p1".into(),
            name: "Playlist One".into(),
            description: "desc".into(),
            categories: HashSet::new(),
            syb_id: None,
        }])
        .unwrap()
    }

    #[test]
    fn json_extraction_tolerates_fences_and_prose() {
        assert_eq!(
            extract_json_object("```json\n{\"a\":1}\n```"),
            Some("{\"a\":1}")
        );
        assert_eq!(
            extract_json_object("Here you go: {\"a\":1} hope that helps"),
            Some("{\"a\":1}")
        );
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn envelope_validation_drops_unknown_ids_and_dayparts() {
        let envelope: LlmEnvelope = serde_json::from_str(
            r#"{"recommendations":[
                {"playlistId":"p1","daypart":"opening","reason":"fits","matchScore":120},
                {"playlistId":"ghost","daypart":"opening","reason":"x","matchScore":80},
                {"playlistId":"p1","daypart":"after-hours","reason":"x","matchScore":80}
            ],"designerNotes":"notes"}"#,
        )
        .unwrap();
        let keys = vec!["opening".to_string(), "peak-hours".to_string()];
        let (picks, notes) = validate_envelope(envelope, &catalog(), &keys).unwrap();
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].playlist_name, "Playlist One");
        // Out-of-band score clamps into the match band.
        assert_eq!(picks[0].match_score, 95);
        assert_eq!(notes.as_deref(), Some("notes"));
    }

    #[test]
    fn empty_envelope_triggers_fallback() {
        let envelope: LlmEnvelope =
            serde_json::from_str(r#"{"recommendations":[]}"#).unwrap();
        assert!(validate_envelope(envelope, &catalog(), &["opening".into()]).is_none());
    }
}
