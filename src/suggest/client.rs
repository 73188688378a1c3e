//! OpenAI-compatible chat completion client with rate-limit backoff.

use crate::error::SuggestError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// "system", "user" or "assistant"
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponseRaw {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

/// Pure exponential backoff applied to HTTP 429 only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total requests, the first one included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the rate-limited attempt `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .checked_mul(2u32.saturating_pow(attempt))
            .unwrap_or(Duration::MAX)
    }
}

#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
    timeout: Option<Duration>,
}

impl ChatClient {
    pub fn new(
        http: reqwest::Client,
        url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            url: url.into(),
            api_key: api_key.into(),
            model: model.into(),
            retry: RetryPolicy::default(),
            timeout: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends `prompt` as a single user message and returns the first choice's
    /// content.
    ///
    /// 429 responses are retried with [`RetryPolicy`]; any other non-200
    /// status or transport failure ends the call immediately.
    pub async fn complete(&self, prompt: &str) -> Result<String, SuggestError> {
        let request = ChatRequest {
            messages: vec![Message::user(prompt)],
            model: self.model.clone(),
        };
        let attempts = self.retry.max_attempts.max(1);
        let start = Instant::now();

        for attempt in 0..attempts {
            let mut builder = self
                .http
                .post(&self.url)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&request);
            if let Some(timeout) = self.timeout {
                builder = builder.timeout(timeout);
            }

            let response = builder.send().await.map_err(|e| self.transport_error(e))?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt + 1 == attempts {
                    break;
                }
                let delay = self.retry.delay(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "LLM rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if status != StatusCode::OK {
                let body = response.text().await.unwrap_or_default();
                warn!(status = %status, body = %body, "LLM API error");
                return Err(SuggestError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            let parsed: ChatResponseRaw = response.json().await.map_err(|e| {
                if e.is_timeout() {
                    self.timed_out()
                } else {
                    SuggestError::InvalidResponse(e.to_string())
                }
            })?;
            let content = parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| SuggestError::InvalidResponse("response has no choices".into()))?;

            debug!(
                model = %self.model,
                attempts = attempt + 1,
                duration_ms = start.elapsed().as_millis() as u64,
                "LLM chat completion"
            );
            return Ok(content);
        }

        Err(SuggestError::RateLimited { attempts })
    }

    fn transport_error(&self, e: reqwest::Error) -> SuggestError {
        if e.is_timeout() {
            return self.timed_out();
        }
        warn!(error = %e, "LLM request failed");
        SuggestError::Network(e.to_string())
    }

    fn timed_out(&self) -> SuggestError {
        SuggestError::TimedOut(self.timeout.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_one_second() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..5).map(|a| policy.delay(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn backoff_saturates() {
        let policy = RetryPolicy {
            max_attempts: 100,
            initial_backoff: Duration::from_secs(1),
        };
        assert_eq!(policy.delay(80), Duration::MAX);
    }

    #[test]
    fn request_body_shape() {
        let req = ChatRequest {
            messages: vec![Message::user("hi")],
            model: "llama".into(),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["messages"][0]["content"], "hi");
        assert_eq!(v["model"], "llama");
    }
}
