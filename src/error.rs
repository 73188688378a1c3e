//! Error types for the analysis pipeline.

use crate::report::{AnalyzeJob, ReportId};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of the sandboxed analyzer process.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// The process could not be started at all
    #[error("failed to spawn analyzer `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Piping input or collecting output failed
    #[error("analyzer i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// Non-zero exit; `stderr` holds whatever diagnostics the process wrote
    #[error("{}", exit_message(.code, .stderr))]
    Exit { code: Option<i32>, stderr: String },

    #[error("analyzer timed out after {0:?}")]
    TimedOut(Duration),
}

impl AnalyzerError {
    /// Captured diagnostic stream, when the process produced one.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            AnalyzerError::Exit { stderr, .. } if !stderr.is_empty() => Some(stderr),
            _ => None,
        }
    }
}

fn exit_message(code: &Option<i32>, stderr: &str) -> String {
    let status = match code {
        Some(c) => format!("exit status {c}"),
        None => "signal".to_string(),
    };
    if stderr.is_empty() {
        format!("axe-runner failed: {status}")
    } else {
        format!("axe-runner failed: {status}: {stderr}")
    }
}

/// Failures of the suggestion stage. None of these touch report status.
#[derive(Debug, Error)]
pub enum SuggestError {
    /// Endpoint or credential missing
    #[error("LLM configuration error: {0}")]
    Config(String),

    /// Transport failure (connect, reset, TLS)
    #[error("LLM request failed: {0}")]
    Network(String),

    #[error("LLM request timed out after {0:?}")]
    TimedOut(Duration),

    /// Still receiving 429 after the last attempt
    #[error("LLM API error: 429 Too Many Requests (rate limited after retries, {attempts} attempts)")]
    RateLimited { attempts: u32 },

    /// Any other non-200 status
    #[error("LLM API error: {status}")]
    Api { status: u16, body: String },

    /// Body was not a chat completion or carried no choices
    #[error("invalid LLM response: {0}")]
    InvalidResponse(String),

    /// Content could not be decoded into suggestions even after repair
    #[error("LLM did not return valid JSON array of suggestions. Raw response: {raw}")]
    Unparseable { raw: String },

    #[error("no suggestions returned from LLM")]
    Empty,
}

impl SuggestError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SuggestError::RateLimited { .. })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("report not found: {0}")]
    NotFound(ReportId),

    #[error("no suggestions stored for report {0}")]
    SuggestionsNotFound(ReportId),

    /// Write rejected because it would break a report invariant
    #[error("invalid store write for report {id}: {reason}")]
    Invalid { id: ReportId, reason: String },

    #[error("store i/o failed at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum QueueError {
    /// Every receiver is gone; the job is handed back
    #[error("job queue is closed")]
    Closed(AnalyzeJob),

    /// Only returned by the non-blocking `try_enqueue`
    #[error("job queue is full")]
    Full(AnalyzeJob),
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("must provide url or html")]
    MissingTarget,

    #[error("failed to create report: {0}")]
    Store(#[from] StoreError),

    #[error("failed to enqueue analysis job: {0}")]
    Queue(#[from] QueueError),

    #[error("analysis service is shutting down")]
    ShuttingDown,
}
