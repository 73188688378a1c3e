//! LLM-backed remediation suggestions for completed analyses.

pub mod client;
pub mod prompt;
pub mod repair;
pub mod sanitize;

pub use client::{ChatClient, RetryPolicy};
pub use prompt::build_prompt;
pub use sanitize::{parse_suggestions, sanitize};

use crate::config;
use crate::error::SuggestError;
use crate::report::SuggestionItem;
use crate::util::preview;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Produces suggestions for one analysis result document.
#[async_trait]
pub trait Suggester: Send + Sync {
    async fn suggest(&self, results: &Value) -> Result<Vec<SuggestionItem>, SuggestError>;
}

/// Endpoint, credentials and call limits, resolved from config and the
/// environment.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub retry: RetryPolicy,
    pub max_violations: usize,
    pub timeout: Option<Duration>,
}

impl LlmSettings {
    pub fn from_config(cfg: &config::Llm) -> Self {
        Self::resolve(cfg, |name| std::env::var(name).ok())
    }

    /// Environment values win over the config file; empty variables count as
    /// unset.
    pub fn resolve(cfg: &config::Llm, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = |name: &str| {
            if name.is_empty() {
                return None;
            }
            lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        };
        Self {
            api_url: env(&cfg.api_url_env).unwrap_or_else(|| cfg.api_url.clone()),
            api_key: env(&cfg.api_key_env).unwrap_or_default(),
            model: env(&cfg.model_env).unwrap_or_else(|| cfg.model.clone()),
            retry: RetryPolicy {
                max_attempts: cfg.max_attempts.max(1),
                initial_backoff: Duration::from_millis(cfg.initial_backoff_ms),
            },
            max_violations: cfg.max_violations,
            timeout: (cfg.timeout_seconds > 0).then(|| Duration::from_secs(cfg.timeout_seconds)),
        }
    }

    pub fn check(&self) -> Result<(), SuggestError> {
        if self.api_url.trim().is_empty() {
            return Err(SuggestError::Config("LLM API URL is not set".into()));
        }
        if self.api_key.trim().is_empty() {
            return Err(SuggestError::Config("LLM API key is not set".into()));
        }
        Ok(())
    }
}

pub struct SuggestionGenerator {
    settings: LlmSettings,
    client: ChatClient,
}

impl SuggestionGenerator {
    pub fn new(settings: LlmSettings) -> Self {
        Self::with_http(settings, reqwest::Client::new())
    }

    pub fn with_http(settings: LlmSettings, http: reqwest::Client) -> Self {
        let client = ChatClient::new(
            http,
            settings.api_url.clone(),
            settings.api_key.clone(),
            settings.model.clone(),
        )
        .with_retry(settings.retry)
        .with_timeout(settings.timeout);
        Self { settings, client }
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    /// Prompt, call, sanitize, repair, parse.
    ///
    /// Missing configuration fails before any request is sent, and an empty
    /// list is reported as [`SuggestError::Empty`].
    pub async fn generate(&self, results: &Value) -> Result<Vec<SuggestionItem>, SuggestError> {
        self.settings.check()?;
        let prompt = build_prompt(results, self.settings.max_violations);
        debug!(prompt_bytes = prompt.len(), model = %self.settings.model, "requesting suggestions");

        let raw = self.client.complete(&prompt).await?;
        debug!(response = %preview(&raw, 500), "raw LLM response");

        let items = parse_suggestions(&raw)?;
        if items.is_empty() {
            return Err(SuggestError::Empty);
        }
        info!(count = items.len(), "suggestions generated");
        Ok(items)
    }
}

#[async_trait]
impl Suggester for SuggestionGenerator {
    async fn suggest(&self, results: &Value) -> Result<Vec<SuggestionItem>, SuggestError> {
        self.generate(results).await
    }
}
