use crate::{
    activity::{self, UNKNOWN_USER},
    analyzer::{Analyzer, AnalyzerInput},
    error::SuggestError,
    queue::JobReceiver,
    report::{AnalyzeJob, ReportId, ReportStatus, SuggestionSet},
    store::ReportStore,
    suggest::Suggester,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a single job ended, as seen by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Complete { suggestions: SuggestionOutcome },
    Failed { reason: String },
    /// The analyzer succeeded but the result could not be stored.
    Unsaved { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionOutcome {
    Disabled,
    Saved(usize),
    Failed(String),
}

/// Consumer of the job queue. Drives the analyzer, persists the result, then
/// generates suggestions best-effort.
pub struct Worker {
    id: usize,
    store: Arc<dyn ReportStore>,
    analyzer: Arc<dyn Analyzer>,
    suggester: Option<Arc<dyn Suggester>>,
}

impl Worker {
    pub fn new(store: Arc<dyn ReportStore>, analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            id: 0,
            store,
            analyzer,
            suggester: None,
        }
    }

    pub fn with_suggester(mut self, suggester: Option<Arc<dyn Suggester>>) -> Self {
        self.suggester = suggester;
        self
    }

    pub fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    /// Pulls jobs until the queue is closed and drained or `shutdown` fires.
    /// Returns the number of jobs processed.
    pub async fn run(self, rx: JobReceiver, shutdown: CancellationToken) -> usize {
        info!(worker = self.id, "worker started");
        let mut processed = 0;
        loop {
            let job = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(worker = self.id, "worker cancelled");
                    break;
                }
                job = rx.dequeue() => job,
            };
            let Some(job) = job else {
                info!(worker = self.id, processed, "queue closed; worker exiting");
                break;
            };
            self.process_job(job).await;
            processed += 1;
        }
        processed
    }

    pub async fn process_job(&self, job: AnalyzeJob) -> JobOutcome {
        let started = Instant::now();
        let report_id = job.report_id;

        let user_id = match self.store.load_report(report_id).await {
            Ok(report) => report.user_id,
            Err(e) => {
                warn!(worker = self.id, %report_id, error = %e, "owning report not found");
                UNKNOWN_USER.to_string()
            }
        };
        info!(worker = self.id, %report_id, url = %job.url, "processing job");

        let payload = match AnalyzerInput::from_job(&job).to_payload() {
            Ok(p) => p,
            Err(e) => {
                let reason = format!("failed to marshal input: {e}");
                return self.fail(report_id, &user_id, reason, None).await;
            }
        };

        let output = match self.analyzer.run(&payload).await {
            Ok(out) => out,
            Err(e) => {
                if let Some(diag) = e.diagnostics() {
                    warn!(worker = self.id, %report_id, stderr = %diag, "analyzer diagnostics");
                }
                let diagnostics = e.diagnostics().map(str::to_string);
                return self
                    .fail(report_id, &user_id, e.to_string(), diagnostics)
                    .await;
            }
        };
        if !output.stderr.is_empty() {
            debug!(worker = self.id, %report_id, stderr = %output.stderr, "analyzer stderr");
        }

        let results = match serde_json::from_slice::<Value>(&output.stdout) {
            Ok(v @ Value::Object(_)) => v,
            Ok(_) | Err(_) => {
                let diagnostics = (!output.stderr.is_empty()).then(|| output.stderr.clone());
                return self
                    .fail(report_id, &user_id, "invalid analyzer output".into(), diagnostics)
                    .await;
            }
        };

        if let Err(e) = self
            .store
            .save_report_result(report_id, results.clone(), ReportStatus::Complete)
            .await
        {
            error!(worker = self.id, %report_id, error = %e, "failed to save analysis result");
            activity::failure(&user_id, activity::ANALYZE, &e.to_string());
            return JobOutcome::Unsaved {
                reason: e.to_string(),
            };
        }
        info!(
            worker = self.id,
            %report_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis complete"
        );
        activity::success(&user_id, activity::ANALYZE, &format!("report {report_id} complete"));

        let suggestions = self.suggest(report_id, &user_id, &results).await;
        JobOutcome::Complete { suggestions }
    }

    async fn suggest(
        &self,
        report_id: ReportId,
        user_id: &str,
        results: &Value,
    ) -> SuggestionOutcome {
        let Some(suggester) = &self.suggester else {
            return SuggestionOutcome::Disabled;
        };

        let reply = match suggester.suggest(results).await {
            Ok(items) if items.is_empty() => Err(SuggestError::Empty),
            other => other,
        };
        let items = match reply {
            Ok(items) => items,
            Err(e) => {
                warn!(worker = self.id, %report_id, error = %e, "suggestion generation failed");
                activity::failure(user_id, activity::LLM_SUGGESTION, &e.to_string());
                if let Err(se) = self
                    .store
                    .record_suggestion_error(report_id, e.to_string())
                    .await
                {
                    warn!(%report_id, error = %se, "failed to record suggestion error");
                }
                return SuggestionOutcome::Failed(e.to_string());
            }
        };

        let count = items.len();
        match self
            .store
            .save_suggestion_set(SuggestionSet::new(report_id, items))
            .await
        {
            Ok(()) => {
                activity::success(
                    user_id,
                    activity::LLM_SUGGESTION,
                    &format!("{count} suggestions for report {report_id}"),
                );
                SuggestionOutcome::Saved(count)
            }
            Err(e) => {
                warn!(worker = self.id, %report_id, error = %e, "failed to save suggestions");
                activity::failure(user_id, activity::LLM_SUGGESTION, &e.to_string());
                SuggestionOutcome::Failed(e.to_string())
            }
        }
    }

    async fn fail(
        &self,
        report_id: ReportId,
        user_id: &str,
        reason: String,
        diagnostics: Option<String>,
    ) -> JobOutcome {
        warn!(worker = self.id, %report_id, reason = %reason, "analysis failed");
        let mut payload = json!({ "error": &reason });
        if let Some(diag) = diagnostics {
            payload["diagnostics"] = Value::String(diag);
        }
        if let Err(e) = self
            .store
            .save_report_result(report_id, payload, ReportStatus::Failed)
            .await
        {
            error!(worker = self.id, %report_id, error = %e, "failed to save failure status");
        }
        activity::failure(user_id, activity::ANALYZE, &reason);
        JobOutcome::Failed { reason }
    }
}
