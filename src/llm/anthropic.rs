//! Anthropic Messages API client over reqwest, with overload retry and
//! token-delta streaming.

use std::time::Duration;

use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;

use crate::error::LlmError;
use crate::llm::{MessagesRequest, MessagesResponse};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Max retries on an overloaded provider.
const MAX_OVERLOAD_RETRIES: u32 = 3;
/// Backoff cap in seconds.
const BACKOFF_CAP_SECS: u64 = 8;

/// Backoff before retry `attempt` (0-based): 1 s, 2 s, 4 s, capped at 8 s.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs((1u64 << attempt.min(6)).min(BACKOFF_CAP_SECS))
}

/// Anthropic messages client.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: SecretString,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Fill in the configured model on a request.
    pub fn request(&self, mut req: MessagesRequest) -> MessagesRequest {
        if req.model.is_empty() {
            req.model = self.model.clone();
        }
        req
    }

    async fn post_once(&self, req: &MessagesRequest) -> Result<reqwest::Response, LlmError> {
        self.http
            .post(API_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(req)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))
    }

    /// Non-streaming call with exponential backoff on overload (HTTP 529).
    pub async fn messages(&self, req: MessagesRequest) -> Result<MessagesResponse, LlmError> {
        let req = self.request(req);
        let mut attempt = 0u32;

        loop {
            let response = self.post_once(&req).await?;
            let status = response.status();

            if status.as_u16() == 529 {
                if attempt >= MAX_OVERLOAD_RETRIES {
                    return Err(LlmError::Overloaded {
                        status: 529,
                        retry_after: None,
                    });
                }
                let delay = backoff_delay(attempt);
                tracing::warn!(attempt, delay_secs = delay.as_secs(), "LLM overloaded, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if status.as_u16() == 401 {
                return Err(LlmError::AuthFailed);
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::RequestFailed(format!("status {status}: {body}")));
            }

            return response
                .json::<MessagesResponse>()
                .await
                .map_err(|e| LlmError::InvalidResponse(e.to_string()));
        }
    }

    /// Streaming call. Returns a receiver of text deltas; the HTTP read runs
    /// in a spawned task so the caller can forward deltas as they arrive.
    /// Connection-level overload is retried like the non-streaming path.
    pub async fn stream_text(
        &self,
        req: MessagesRequest,
    ) -> Result<mpsc::Receiver<Result<String, LlmError>>, LlmError> {
        #[derive(serde::Serialize)]
        struct StreamRequest<'a> {
            #[serde(flatten)]
            inner: &'a MessagesRequest,
            stream: bool,
        }

        let req = self.request(req);
        let mut attempt = 0u32;

        let response = loop {
            let response = self
                .http
                .post(API_URL)
                .header("x-api-key", self.api_key.expose_secret())
                .header("anthropic-version", API_VERSION)
                .json(&StreamRequest {
                    inner: &req,
                    stream: true,
                })
                .send()
                .await
                .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

            let status = response.status();
            if status.as_u16() == 529 && attempt < MAX_OVERLOAD_RETRIES {
                tokio::time::sleep(backoff_delay(attempt)).await;
                attempt += 1;
                continue;
            }
            if status.as_u16() == 401 {
                return Err(LlmError::AuthFailed);
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::RequestFailed(format!("status {status}: {body}")));
            }
            break response;
        };

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(LlmError::RequestFailed(e.to_string()))).await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // SSE frames are newline-delimited; keep any partial tail.
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let Ok(event) = serde_json::from_str::<serde_json::Value>(data) else {
                        continue;
                    };
                    if event["type"] == "content_block_delta" {
                        if let Some(text) = event["delta"]["text"].as_str() {
                            if tx.send(Ok(text.to_string())).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
        assert_eq!(backoff_delay(10), Duration::from_secs(8));
    }
}
