//! Tracking pixel and health endpoints.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::http::AppState;

/// A 1×1 transparent GIF.
const PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

/// `GET /follow-up/track/{id}` always answers the GIF; the open stamp is
/// recorded off the request path and every error is swallowed.
pub async fn pixel(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if let Some(store) = state.store.clone() {
        tokio::spawn(async move {
            if let Err(e) = store.follow_ups.mark_opened(&id, Utc::now()) {
                tracing::debug!(tracking_id = %id, error = %e, "open tracking failed");
            }
        });
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        PIXEL_GIF,
    )
        .into_response()
}

/// `GET /health`.
pub async fn health() -> Response {
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_is_a_valid_gif_header() {
        assert_eq!(&PIXEL_GIF[..6], b"GIF89a");
        assert_eq!(*PIXEL_GIF.last().unwrap(), 0x3b);
    }
}
