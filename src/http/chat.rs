//! `POST /api/chat` — the consultation stream over Server-Sent Events.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::agent::{ChatEvent, ChatRequest, ConsultationEngine};
use crate::http::rate_limit::{client_ip, CHAT_LIMIT};
use crate::http::AppState;

fn to_sse_event(event: &ChatEvent) -> Event {
    Event::default()
        .json_data(event)
        .unwrap_or_else(|_| Event::default().data("{\"type\":\"error\"}"))
}

/// The stream always terminates with a single `done` frame, success or not.
pub async fn chat(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    let ip = client_ip(&headers, Some(peer));
    if let Err(retry_after) = state.limiter.check(&ip, "chat", CHAT_LIMIT) {
        return super::submit::rate_limited_response(retry_after);
    }

    let (tx, rx) = mpsc::channel::<ChatEvent>(64);

    match &state.llm {
        Some(llm) => {
            let engine = ConsultationEngine {
                llm: Arc::clone(llm),
                catalog: Arc::clone(&state.catalog),
                search: state.search.clone(),
                accounts: state.accounts.clone(),
                platform: state.platform.clone(),
                store: state.store.clone(),
            };
            tokio::spawn(async move {
                engine.run_chat(request, tx).await;
            });
        }
        None => {
            tokio::spawn(async move {
                let _ = tx
                    .send(ChatEvent::Error {
                        content: "The consultation assistant is not available right now."
                            .to_string(),
                    })
                    .await;
                let _ = tx.send(ChatEvent::Done).await;
            });
        }
    }

    let stream = ReceiverStream::new(rx).map(|event| Ok::<Event, Infallible>(to_sse_event(&event)));
    Sse::new(stream).into_response()
}
