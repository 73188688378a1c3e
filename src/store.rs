//! Report and suggestion persistence.
//!
//! The pipeline only needs a handful of load/save calls, expressed by
//! [`ReportStore`]. Two implementations ship with the crate: an in-memory one
//! for embedding and tests, and a directory of JSON documents used by the CLI.

use crate::error::StoreError;
use crate::report::{Report, ReportId, ReportStatus, ReportSummary, SuggestionSet};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn create_report(&self, report: Report) -> Result<Report, StoreError>;

    async fn load_report(&self, id: ReportId) -> Result<Report, StoreError>;

    /// Sets `analysis_results` and `status` together and bumps `updated_at`.
    async fn save_report_result(
        &self,
        id: ReportId,
        results: Value,
        status: ReportStatus,
    ) -> Result<(), StoreError>;

    /// Records the last suggestion-stage failure without touching `status`.
    async fn record_suggestion_error(&self, id: ReportId, message: String)
    -> Result<(), StoreError>;

    /// Newest first.
    async fn list_reports_by_user(&self, user_id: &str) -> Result<Vec<ReportSummary>, StoreError>;

    /// Removes the report and its suggestion set.
    async fn delete_report(&self, id: ReportId) -> Result<(), StoreError>;

    async fn save_suggestion_set(&self, set: SuggestionSet) -> Result<(), StoreError>;

    async fn load_suggestion_set(&self, id: ReportId) -> Result<SuggestionSet, StoreError>;
}

fn apply_result(report: &mut Report, results: Value, status: ReportStatus) {
    report.analysis_results = Some(results);
    report.status = status;
    report.updated_at = OffsetDateTime::now_utc();
}

fn check_result_write(id: ReportId, status: ReportStatus) -> Result<(), StoreError> {
    if status == ReportStatus::Pending {
        return Err(StoreError::Invalid {
            id,
            reason: "results cannot be saved with status pending".into(),
        });
    }
    Ok(())
}

fn check_suggestion_write(report: &Report) -> Result<(), StoreError> {
    if report.status != ReportStatus::Complete {
        return Err(StoreError::Invalid {
            id: report.id,
            reason: format!("suggestions require a complete report, found {}", report.status),
        });
    }
    Ok(())
}

fn summaries_for(user_id: &str, reports: impl Iterator<Item = Report>) -> Vec<ReportSummary> {
    let mut out: Vec<ReportSummary> = reports
        .filter(|r| r.user_id == user_id)
        .map(|r| r.summary())
        .collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    out
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    reports: RwLock<HashMap<ReportId, Report>>,
    suggestions: RwLock<HashMap<ReportId, SuggestionSet>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn create_report(&self, report: Report) -> Result<Report, StoreError> {
        self.reports.write().await.insert(report.id, report.clone());
        Ok(report)
    }

    async fn load_report(&self, id: ReportId) -> Result<Report, StoreError> {
        self.reports
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn save_report_result(
        &self,
        id: ReportId,
        results: Value,
        status: ReportStatus,
    ) -> Result<(), StoreError> {
        check_result_write(id, status)?;
        let mut reports = self.reports.write().await;
        let report = reports.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        apply_result(report, results, status);
        Ok(())
    }

    async fn record_suggestion_error(
        &self,
        id: ReportId,
        message: String,
    ) -> Result<(), StoreError> {
        let mut reports = self.reports.write().await;
        let report = reports.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        report.suggestion_error = Some(message);
        Ok(())
    }

    async fn list_reports_by_user(&self, user_id: &str) -> Result<Vec<ReportSummary>, StoreError> {
        let reports = self.reports.read().await;
        Ok(summaries_for(user_id, reports.values().cloned()))
    }

    async fn delete_report(&self, id: ReportId) -> Result<(), StoreError> {
        self.reports
            .write()
            .await
            .remove(&id)
            .ok_or(StoreError::NotFound(id))?;
        self.suggestions.write().await.remove(&id);
        Ok(())
    }

    async fn save_suggestion_set(&self, set: SuggestionSet) -> Result<(), StoreError> {
        let report = self.load_report(set.report_id).await?;
        check_suggestion_write(&report)?;
        self.suggestions.write().await.insert(set.report_id, set);
        Ok(())
    }

    async fn load_suggestion_set(&self, id: ReportId) -> Result<SuggestionSet, StoreError> {
        self.suggestions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::SuggestionsNotFound(id))
    }
}

/// One pretty-printed JSON document per report under `<root>/reports/`, one
/// per suggestion set under `<root>/suggestions/`.
///
/// Writes go through a temp file and a rename. A single in-process lock
/// serializes read-modify-write cycles.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for sub in ["reports", "suggestions"] {
            let dir = root.join(sub);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|source| StoreError::Io { path: dir, source })?;
        }
        debug!(root = %root.display(), "file store opened");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn report_path(&self, id: ReportId) -> PathBuf {
        self.root.join("reports").join(format!("{id}.json"))
    }

    fn suggestion_path(&self, id: ReportId) -> PathBuf {
        self.root.join("suggestions").join(format!("{id}.json"))
    }

    async fn read_doc<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    async fn write_doc<T: Serialize>(path: &Path, doc: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn remove_doc(path: &Path) -> Result<bool, StoreError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    async fn update_report(
        &self,
        id: ReportId,
        apply: impl FnOnce(&mut Report) + Send,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.report_path(id);
        let mut report: Report = Self::read_doc(&path)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        apply(&mut report);
        Self::write_doc(&path, &report).await
    }
}

#[async_trait]
impl ReportStore for FileStore {
    async fn create_report(&self, report: Report) -> Result<Report, StoreError> {
        let _guard = self.write_lock.lock().await;
        Self::write_doc(&self.report_path(report.id), &report).await?;
        Ok(report)
    }

    async fn load_report(&self, id: ReportId) -> Result<Report, StoreError> {
        Self::read_doc(&self.report_path(id))
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    async fn save_report_result(
        &self,
        id: ReportId,
        results: Value,
        status: ReportStatus,
    ) -> Result<(), StoreError> {
        check_result_write(id, status)?;
        self.update_report(id, move |r| apply_result(r, results, status))
            .await
    }

    async fn record_suggestion_error(
        &self,
        id: ReportId,
        message: String,
    ) -> Result<(), StoreError> {
        self.update_report(id, move |r| r.suggestion_error = Some(message))
            .await
    }

    async fn list_reports_by_user(&self, user_id: &str) -> Result<Vec<ReportSummary>, StoreError> {
        let dir = self.root.join("reports");
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
        let mut reports = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_doc::<Report>(&path).await {
                Ok(Some(report)) => reports.push(report),
                Ok(None) => {}
                Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable report"),
            }
        }
        Ok(summaries_for(user_id, reports.into_iter()))
    }

    async fn delete_report(&self, id: ReportId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if !Self::remove_doc(&self.report_path(id)).await? {
            return Err(StoreError::NotFound(id));
        }
        Self::remove_doc(&self.suggestion_path(id)).await?;
        Ok(())
    }

    async fn save_suggestion_set(&self, set: SuggestionSet) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let report: Report = Self::read_doc(&self.report_path(set.report_id))
            .await?
            .ok_or(StoreError::NotFound(set.report_id))?;
        check_suggestion_write(&report)?;
        Self::write_doc(&self.suggestion_path(set.report_id), &set).await
    }

    async fn load_suggestion_set(&self, id: ReportId) -> Result<SuggestionSet, StoreError> {
        Self::read_doc(&self.suggestion_path(id))
            .await?
            .ok_or(StoreError::SuggestionsNotFound(id))
    }
}
