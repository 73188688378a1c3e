use crate::util::domain_of;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

pub type ReportId = Uuid;

/// One page/markup analysis request handed to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeJob {
    pub report_id: ReportId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub html: String,
}

impl AnalyzeJob {
    pub fn new(report_id: ReportId, url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            report_id,
            url: url.into(),
            html: html.into(),
        }
    }

    pub fn for_report(report: &Report) -> Self {
        Self::new(report.id, report.url.clone(), report.html_snapshot.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Complete,
    Failed,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Complete => "complete",
            ReportStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, ReportStatus::Pending)
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one analysis request.
///
/// `analysis_results` stays `None` while the report is pending; a failed
/// report carries `{"error": ..}` there instead of the analyzer output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: ReportId,
    pub user_id: String,
    pub url: String,
    pub domain: String,
    pub html_snapshot: String,
    pub analysis_results: Option<Value>,
    pub status: ReportStatus,
    /// Last suggestion-stage failure, kept apart from `status`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion_error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Report {
    pub fn pending(user_id: impl Into<String>, url: &str, html: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            url: url.to_string(),
            domain: domain_of(url),
            html_snapshot: html.to_string(),
            analysis_results: None,
            status: ReportStatus::Pending,
            suggestion_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The stored failure message of a failed report.
    pub fn error_message(&self) -> Option<&str> {
        if self.status != ReportStatus::Failed {
            return None;
        }
        self.analysis_results
            .as_ref()
            .and_then(|v| v.get("error"))
            .and_then(Value::as_str)
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            id: self.id,
            url: self.url.clone(),
            created_at: self.created_at,
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub id: ReportId,
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub status: ReportStatus,
}

fn null_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Option::unwrap_or_default)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionSummary {
    #[serde(default, deserialize_with = "null_default")]
    pub problem: String,
    /// "critical" | "serious" | "moderate" | "minor"
    #[serde(default, deserialize_with = "null_default")]
    pub impact: String,
    #[serde(default, deserialize_with = "null_default")]
    pub affected_users: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionWhyMatters {
    #[serde(default, deserialize_with = "null_default")]
    pub user_impact: String,
    #[serde(default, deserialize_with = "null_default")]
    pub assistive_tech_affected: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionHowToFix {
    #[serde(default, deserialize_with = "null_default")]
    pub step1: String,
    #[serde(default, deserialize_with = "null_default")]
    pub code_example: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionTestingInstructions {
    #[serde(default, deserialize_with = "null_default")]
    pub verify: String,
    #[serde(default, deserialize_with = "null_default")]
    pub tools: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionPriorityLevel {
    /// "high" | "medium" | "low"
    #[serde(default, deserialize_with = "null_default")]
    pub urgency: String,
    /// "A" | "AA" | "AAA"
    #[serde(default, deserialize_with = "null_default")]
    pub wcag_level: String,
}

/// Remediation advice for a single violation.
///
/// Model replies are loose: missing keys and `null` values both decode to the
/// empty default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionItem {
    #[serde(default, deserialize_with = "null_default")]
    pub issue: String,
    #[serde(default, deserialize_with = "null_default")]
    pub summary: SuggestionSummary,
    #[serde(default, deserialize_with = "null_default")]
    pub why_matters: SuggestionWhyMatters,
    #[serde(default, deserialize_with = "null_default")]
    pub how_to_fix: SuggestionHowToFix,
    #[serde(default, deserialize_with = "null_default")]
    pub testing_instructions: SuggestionTestingInstructions,
    #[serde(default, deserialize_with = "null_default")]
    pub priority_level: SuggestionPriorityLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionSet {
    pub report_id: ReportId,
    pub suggestions: Vec<SuggestionItem>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl SuggestionSet {
    pub fn new(report_id: ReportId, suggestions: Vec<SuggestionItem>) -> Self {
        Self {
            report_id,
            suggestions,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}
