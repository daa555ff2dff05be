//! Per-IP rolling-hour rate limiting for the public endpoints.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;

/// Rolling window length.
const WINDOW: Duration = Duration::from_secs(3600);

/// Per-endpoint limits, requests per IP per rolling hour.
pub const SUBMIT_LIMIT: usize = 5;
pub const RECOMMEND_LIMIT: usize = 10;
pub const CHAT_LIMIT: usize = 30;

/// In-memory sliding-window limiter keyed by `(ip, scope)`.
pub struct RateLimiter {
    hits: Mutex<HashMap<(String, &'static str), Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Record a hit. `Ok(())` admits the request; `Err(secs)` is the
    /// suggested Retry-After.
    pub fn check(&self, ip: &str, scope: &'static str, limit: usize) -> Result<(), u64> {
        self.check_at(ip, scope, limit, Instant::now())
    }

    fn check_at(
        &self,
        ip: &str,
        scope: &'static str,
        limit: usize,
        now: Instant,
    ) -> Result<(), u64> {
        let mut hits = self.hits.lock().expect("rate limiter mutex poisoned");
        let entry = hits.entry((ip.to_string(), scope)).or_default();
        entry.retain(|t| now.duration_since(*t) < WINDOW);

        if entry.len() >= limit {
            let oldest = entry.first().copied().unwrap_or(now);
            let retry_after = WINDOW
                .checked_sub(now.duration_since(oldest))
                .unwrap_or_default()
                .as_secs()
                .max(1);
            return Err(retry_after);
        }
        entry.push(now);
        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Client IP for limiting: the first `x-forwarded-for` hop (we sit behind a
/// reverse proxy), falling back to the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| {
            peer.map(|p| p.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_enforced_per_ip_and_scope() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check("1.2.3.4", "submit", 5).is_ok());
        }
        assert!(limiter.check("1.2.3.4", "submit", 5).is_err());
        // Different IP and different scope are unaffected.
        assert!(limiter.check("5.6.7.8", "submit", 5).is_ok());
        assert!(limiter.check("1.2.3.4", "chat", 30).is_ok());
    }

    #[test]
    fn window_slides() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.check_at("ip", "submit", 3, start).unwrap();
        }
        assert!(limiter.check_at("ip", "submit", 3, start).is_err());
        // An hour later the window has rolled off.
        let later = start + WINDOW + Duration::from_secs(1);
        assert!(limiter.check_at("ip", "submit", 3, later).is_ok());
    }

    #[test]
    fn retry_after_is_positive() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        limiter.check_at("ip", "submit", 1, start).unwrap();
        let retry = limiter
            .check_at("ip", "submit", 1, start + Duration::from_secs(10))
            .unwrap_err();
        assert!(retry >= 1 && retry <= 3600);
    }

    #[test]
    fn forwarded_for_takes_the_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, None), "203.0.113.9");

        let headers = HeaderMap::new();
        let peer: SocketAddr = "192.168.1.5:9999".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), "192.168.1.5");
        assert_eq!(client_ip(&headers, None), "unknown");
    }
}
