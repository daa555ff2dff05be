//! Web-search adapter. Failures are never fatal to a consultation; callers
//! turn them into a "continue without research" directive.

use std::time::Duration;

use serde::Deserialize;

use crate::error::SearchError;

const SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";
/// Snippets taken from the top of each result page.
const TOP_RESULTS: usize = 5;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    web: WebResults,
}

#[derive(Debug, Default, Deserialize)]
struct WebResults {
    #[serde(default)]
    results: Vec<WebResult>,
}

#[derive(Debug, Deserialize)]
struct WebResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

/// Thin client over the search endpoint.
pub struct SearchClient {
    http: reqwest::Client,
    api_key: String,
}

impl SearchClient {
    pub fn new(api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http, api_key }
    }

    /// Run one query; returns up to five `title: description` snippets.
    pub async fn search(&self, query: &str) -> Result<Vec<String>, SearchError> {
        let response = self
            .http
            .get(SEARCH_URL)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::RequestFailed(format!(
                "status {}",
                response.status()
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        Ok(parsed
            .web
            .results
            .into_iter()
            .take(TOP_RESULTS)
            .map(|r| format!("{}: {}", r.title, r.description))
            .collect())
    }

    /// Run up to four queries sequentially and concatenate their snippets
    /// into one research summary. Individual query failures are logged and
    /// skipped; an empty summary means nothing usable came back.
    pub async fn research(&self, queries: &[String]) -> String {
        let mut sections = Vec::new();
        for query in queries.iter().take(4) {
            match self.search(query).await {
                Ok(snippets) if !snippets.is_empty() => {
                    sections.push(format!("## {}\n{}", query, snippets.join("\n")));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(query = %query, error = %e, "search query failed");
                }
            }
        }
        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_shape_parses() {
        let raw = r#"{"web":{"results":[
            {"title":"Sky Bar Bangkok","description":"Rooftop cocktails at sunset"},
            {"title":"Guide","description":"Best rooftop bars"}
        ]}}"#;
        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.web.results.len(), 2);
        assert_eq!(parsed.web.results[0].title, "Sky Bar Bangkok");
    }

    #[test]
    fn missing_web_key_is_tolerated() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.web.results.is_empty());
    }
}
