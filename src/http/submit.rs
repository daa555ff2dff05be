//! `POST /submit` — persist the brief and kick off the approval flow.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::info;

use crate::approval::{process_submission, SubmitPayload};
use crate::error::Error;
use crate::http::rate_limit::{client_ip, SUBMIT_LIMIT};
use crate::http::AppState;

/// Shared 429 body with the standard header advertising the window.
pub fn rate_limited_response(retry_after: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("Retry-After", retry_after.to_string())],
        Json(json!({
            "error": "Rate limit exceeded",
            "retryAfterSeconds": retry_after,
        })),
    )
        .into_response()
}

pub async fn submit(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<SubmitPayload>,
) -> Response {
    let ip = client_ip(&headers, Some(peer));
    if let Err(retry_after) = state.limiter.check(&ip, "submit", SUBMIT_LIMIT) {
        return rate_limited_response(retry_after);
    }

    // Honeypot: bots fill the hidden website field. Pretend success.
    if !payload.website.is_empty() {
        return (StatusCode::OK, Json(json!({ "success": true }))).into_response();
    }

    match process_submission(
        &payload,
        &state.catalog,
        state.store.as_deref(),
        state.platform.as_ref(),
        state.mailer.as_ref(),
        &state.config,
    )
    .await
    {
        Ok(outcome) => {
            info!(
                venue = %payload.venue_name,
                brief_id = ?outcome.brief_id,
                auto = outcome.auto_scheduled,
                "brief submitted"
            );
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "briefId": outcome.brief_id,
                    "approvalUrl": outcome.approval_url,
                    "schedulePrebuilt": outcome.schedule_prebuilt,
                    "autoScheduled": outcome.auto_scheduled,
                })),
            )
                .into_response()
        }
        Err(Error::BadInput(message)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": message })),
        )
            .into_response(),
        Err(Error::Email(e)) => (
            // The brief is already persisted; the caller may retry.
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("Email delivery failed: {e}") })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
