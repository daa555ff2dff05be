//! HTTP surface: chat (SSE), recommendations, submission, approval, the
//! tracking pixel, and health.

pub mod approve;
pub mod chat;
pub mod rate_limit;
pub mod recommend;
pub mod submit;
pub mod track;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::email::EmailSender;
use crate::llm::AnthropicClient;
use crate::platform::accounts::AccountCache;
use crate::platform::PlatformClient;
use crate::search::SearchClient;
use crate::store::Store;
use rate_limit::RateLimiter;

/// Shared handler state. Optional adapters stay `None` in degraded modes.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub catalog: Arc<Catalog>,
    pub store: Option<Arc<Store>>,
    pub llm: Option<Arc<AnthropicClient>>,
    pub search: Option<Arc<SearchClient>>,
    pub platform: Option<Arc<PlatformClient>>,
    pub accounts: Option<Arc<AccountCache>>,
    pub mailer: Option<EmailSender>,
    pub limiter: Arc<RateLimiter>,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat::chat))
        .route("/api/recommend", post(recommend::recommend))
        .route("/submit", post(submit::submit))
        .route(
            "/approve/{token}",
            get(approve::approve_page).post(approve::approve_submit),
        )
        .route("/follow-up/track/{id}", get(track::pixel))
        .route("/health", get(track::health))
        .with_state(state)
}

/// Serve until the listener dies.
pub async fn serve(state: AppState, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "HTTP server listening");
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}
