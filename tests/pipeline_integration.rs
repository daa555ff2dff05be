//! Integration tests for the submit → approve → schedule pipeline.
//!
//! Each test spins up an Axum server on a random port with an in-memory
//! database and exercises the real HTTP contract. External adapters (LLM,
//! search, platform, SMTP) stay unconfigured; the paths under test degrade
//! exactly as the service does in production without them.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use music_assist::catalog::{Catalog, Playlist};
use music_assist::config::AppConfig;
use music_assist::http::{rate_limit::RateLimiter, router, AppState};
use music_assist::store::{BriefStatus, Database, Store};

fn test_catalog() -> Catalog {
    let playlist = |id: &str, name: &str, desc: &str, cats: &[&str], syb: &str| Playlist {
        id: id.into(),
        name: name.into(),
        description: desc.into(),
        categories: cats.iter().map(|c| c.to_string()).collect(),
        syb_id: Some(syb.into()),
    };
    Catalog::from_playlists(vec![
        playlist(
            "deep-house-sunset",
            "Deep House Sunset",
            "Sophisticated deep house for golden hour",
            &["bar", "lounge"],
            "syb-dhs",
        ),
        playlist(
            "dinner-jazz",
            "Dinner Jazz",
            "Refined jazz standards for dinner",
            &["restaurant", "lounge"],
            "syb-dj",
        ),
        playlist(
            "tropical-pool",
            "Tropical Poolside",
            "Tropical house for the pool deck",
            &["bar", "lounge"],
            "syb-tp",
        ),
    ])
    .unwrap()
}

fn test_config(port: u16) -> AppConfig {
    AppConfig {
        anthropic_api_key: None,
        anthropic_model: "claude-sonnet-4-6".into(),
        search_api_key: None,
        database_url: None,
        smtp_user: None,
        smtp_pass: None,
        notify_email: "design@example.com".into(),
        syb_api_token: None,
        base_url: format!("http://127.0.0.1:{port}"),
        port,
        playlist_catalog: "syb_playlists.json".into(),
        default_timezone: "Asia/Bangkok".into(),
    }
}

/// Start a server on a random port; returns `(base_url, store)`.
async fn start_server() -> (String, Arc<Store>) {
    let store = Arc::new(Store::new(Arc::new(Database::open_in_memory().unwrap())));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let state = AppState {
        config: test_config(port),
        catalog: Arc::new(test_catalog()),
        store: Some(Arc::clone(&store)),
        llm: None,
        search: None,
        platform: None,
        accounts: None,
        mailer: None,
        limiter: Arc::new(RateLimiter::new()),
    };

    tokio::spawn(async move {
        axum::serve(
            listener,
            router(state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}"), store)
}

fn submit_payload() -> Value {
    json!({
        "venueName": "Sky Bar",
        "venueType": "bar-lounge",
        "location": "Bangkok",
        "contactName": "Nok",
        "contactEmail": "nok@example.com",
        "product": "syb",
        "vibes": ["sophisticated", "trendy"],
        "energy": 7,
        "hours": "17:00-02:00",
        "vocals": "mix",
        "likedPlaylists": ["Deep House Sunset", "Dinner Jazz"],
        "allRecommendations": [
            {"playlistId": "deep-house-sunset", "playlistName": "Deep House Sunset",
             "daypart": "opening", "reason": "fits", "matchScore": 95},
            {"playlistId": "dinner-jazz", "playlistName": "Dinner Jazz",
             "daypart": "peak-hours", "reason": "fits", "matchScore": 88}
        ],
        "weekendLikedPlaylists": ["Tropical Poolside"],
        "weekendRecommendations": [
            {"playlistId": "tropical-pool", "playlistName": "Tropical Poolside",
             "daypart": "opening", "reason": "fits", "matchScore": 90,
             "scheduleType": "weekend"}
        ],
        "weekendDayparts": [
            {"key": "opening", "label": "Opening (17:00-20:00)",
             "timeRange": "17:00-20:00", "icon": "sunset", "energy": 6},
            {"key": "peak-hours", "label": "Peak Hours (20:00-23:00)",
             "timeRange": "20:00-23:00", "icon": "moon", "energy": 8}
        ],
        "website": ""
    })
}

#[tokio::test]
async fn health_endpoint_answers() {
    let (base, _store) = start_server().await;
    let response = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn submit_then_approve_materializes_entries() {
    let (base, store) = start_server().await;
    let client = reqwest::Client::new();

    // Submit the brief.
    let response = client
        .post(format!("{base}/submit"))
        .json(&submit_payload())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    let brief_id = body["briefId"].as_i64().unwrap();
    let approval_url = body["approvalUrl"].as_str().unwrap().to_string();
    assert!(approval_url.contains("/approve/"));

    // The approval page renders a zone picker for the brief.
    let page = client.get(&approval_url).send().await.unwrap();
    assert_eq!(page.status(), 200);
    let html = page.text().await.unwrap();
    assert!(html.contains("Sky Bar"));
    assert!(html.contains("zone_Main"));

    // Approve with a manually entered zone id.
    let response = client
        .post(&approval_url)
        .form(&[("zone_Main", "zone-42|Main Floor")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Two weekday (daily) entries + one weekend entry.
    let entries = store.schedule.for_brief(brief_id).unwrap();
    assert_eq!(entries.len(), 3);
    let days: HashSet<&str> = entries.iter().map(|e| e.days.as_str()).collect();
    assert_eq!(days, HashSet::from(["daily", "weekend"]));
    assert!(entries.iter().all(|e| e.zone_id == "zone-42"));
    assert!(entries.iter().all(|e| e.timezone == "Asia/Bangkok"));

    let brief = store.briefs.get(brief_id).unwrap().unwrap();
    assert_eq!(brief.status, BriefStatus::Approved);

    // Zone mapping learned for next time.
    let mappings = store.zones.for_venue("Sky Bar").unwrap();
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].syb_zone_id, "zone-42");

    // A second POST on the same token is a no-op.
    let response = client
        .post(&approval_url)
        .form(&[("zone_Main", "zone-42|Main Floor")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let html = response.text().await.unwrap();
    assert!(html.contains("Already activated"));
    assert_eq!(store.schedule.for_brief(brief_id).unwrap().len(), 3);
}

#[tokio::test]
async fn tracking_pixel_stamps_open_once() {
    let (base, store) = start_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/submit"))
        .json(&submit_payload())
        .send()
        .await
        .unwrap();

    let due = store
        .follow_ups
        .due(chrono::Utc::now() + chrono::Duration::days(31))
        .unwrap();
    assert_eq!(due.len(), 2);
    let tracking_id = due[0].tracking_id.clone();

    let response = client
        .get(format!("{base}/follow-up/track/{tracking_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "image/gif"
    );
    assert_eq!(
        response.headers()["cache-control"].to_str().unwrap(),
        "no-store"
    );
    let body = response.bytes().await.unwrap();
    assert_eq!(&body[..6], b"GIF89a");

    // The open stamp is written off the request path.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let row = store.follow_ups.get(due[0].id).unwrap().unwrap();
    assert!(row.opened_at.is_some());

    // An unknown tracking id still answers the GIF.
    let response = client
        .get(format!("{base}/follow-up/track/no-such-id"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn honeypot_submissions_are_silently_dropped() {
    let (base, store) = start_server().await;
    let mut payload = submit_payload();
    payload["website"] = json!("https://spam.example.com");

    let response = reqwest::Client::new()
        .post(format!("{base}/submit"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert!(body.get("briefId").map(|v| v.is_null()).unwrap_or(true));

    // Nothing persisted.
    assert!(store.briefs.for_venue("Sky Bar").unwrap().is_empty());
}

#[tokio::test]
async fn missing_venue_name_is_rejected() {
    let (base, _store) = start_server().await;
    let mut payload = submit_payload();
    payload["venueName"] = json!("");

    let response = reqwest::Client::new()
        .post(format!("{base}/submit"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn recommend_endpoint_runs_the_deterministic_matcher() {
    let (base, _store) = start_server().await;
    let response = reqwest::Client::new()
        .post(format!("{base}/api/recommend"))
        .json(&json!({
            "venueType": "bar-lounge",
            "vibes": ["sophisticated"],
            "energy": 7,
            "hours": "17:00-02:00",
            "genreHints": ["deep house"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let recs = body["recommendations"].as_array().unwrap();
    assert!(!recs.is_empty());
    assert_eq!(body["dayparts"].as_array().unwrap().len(), 3);
    for rec in recs {
        let score = rec["matchScore"].as_u64().unwrap();
        assert!((55..=95).contains(&score));
    }
}

#[tokio::test]
async fn recommend_requires_vibes() {
    let (base, _store) = start_server().await;
    let response = reqwest::Client::new()
        .post(format!("{base}/api/recommend"))
        .json(&json!({ "venueType": "cafe", "vibes": [], "energy": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn submit_rate_limit_is_five_per_hour() {
    let (base, _store) = start_server().await;
    let client = reqwest::Client::new();

    for _ in 0..5 {
        let response = client
            .post(format!("{base}/submit"))
            .json(&submit_payload())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    let response = client
        .post(format!("{base}/submit"))
        .json(&submit_payload())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);
    assert!(response.headers().contains_key("retry-after"));
}

#[tokio::test]
async fn chat_without_llm_streams_error_then_done() {
    let (base, _store) = start_server().await;
    let response = reqwest::Client::new()
        .post(format!("{base}/api/chat"))
        .json(&json!({ "messages": [{"role": "user", "content": "hello"}] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    let frames: Vec<Value> = body
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect();
    assert!(frames.iter().any(|f| f["type"] == "error"));
    assert_eq!(frames.last().unwrap()["type"], "done");
}

#[tokio::test]
async fn unknown_approval_token_renders_not_found() {
    let (base, _store) = start_server().await;
    let response = reqwest::get(format!("{base}/approve/deadbeef")).await.unwrap();
    assert_eq!(response.status(), 404);
}
