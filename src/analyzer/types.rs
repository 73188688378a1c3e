use crate::report::AnalyzeJob;
use serde::{Deserialize, Serialize};

/// Stdin document for the analyzer. Empty fields are left out entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl AnalyzerInput {
    pub fn from_job(job: &AnalyzeJob) -> Self {
        Self {
            url: non_empty(&job.url),
            html: non_empty(&job.html),
        }
    }

    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

#[derive(Debug, Clone)]
pub struct AnalyzerOutput {
    pub stdout: Vec<u8>,
    /// Advisory only; a clean exit may still write here.
    pub stderr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorReport {
    pub program: String,
    pub version: Option<String>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}
