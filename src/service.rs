//! Wiring of store, queue and workers behind one handle.

use crate::{
    analyzer::Analyzer,
    config,
    error::{QueueError, SubmitError},
    queue::{self, JobSender},
    report::{AnalyzeJob, Report, ReportStatus},
    store::ReportStore,
    suggest::Suggester,
    worker::Worker,
};
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Owns the producer side of the queue and the worker tasks.
///
/// `shutdown` closes the queue and waits for buffered jobs to drain; `abort`
/// stops the workers after their current job.
pub struct AnalysisService {
    store: Arc<dyn ReportStore>,
    sender: JobSender,
    workers: Vec<JoinHandle<usize>>,
    cancel: CancellationToken,
}

impl AnalysisService {
    pub fn start(
        cfg: &config::Queue,
        store: Arc<dyn ReportStore>,
        analyzer: Arc<dyn Analyzer>,
        suggester: Option<Arc<dyn Suggester>>,
    ) -> Self {
        let (sender, receiver) = queue::bounded(cfg.capacity);
        let cancel = CancellationToken::new();
        let count = cfg.workers.max(1);

        let workers = (0..count)
            .map(|id| {
                let worker = Worker::new(store.clone(), analyzer.clone())
                    .with_suggester(suggester.clone())
                    .with_id(id);
                tokio::spawn(worker.run(receiver.clone(), cancel.clone()))
            })
            .collect();

        info!(
            workers = count,
            capacity = sender.capacity(),
            "analysis service started"
        );
        Self {
            store,
            sender,
            workers,
            cancel,
        }
    }

    pub fn store(&self) -> Arc<dyn ReportStore> {
        self.store.clone()
    }

    /// False once every worker is gone or the service was cancelled.
    pub fn is_accepting(&self) -> bool {
        !self.sender.is_closed() && !self.cancel.is_cancelled()
    }

    /// Jobs waiting in the queue.
    pub fn pending(&self) -> usize {
        self.sender.pending()
    }

    /// Creates a pending report and queues it for analysis.
    ///
    /// Waits for a free slot when the queue is full. The returned report is
    /// the pending snapshot; poll the store for its terminal state.
    pub async fn submit(&self, user_id: &str, url: &str, html: &str) -> Result<Report, SubmitError> {
        if url.trim().is_empty() && html.trim().is_empty() {
            return Err(SubmitError::MissingTarget);
        }
        if self.cancel.is_cancelled() {
            return Err(SubmitError::ShuttingDown);
        }

        let report = self
            .store
            .create_report(Report::pending(user_id, url.trim(), html))
            .await?;
        let job = AnalyzeJob::for_report(&report);

        if let Err(e) = self.sender.enqueue(job).await {
            warn!(report_id = %report.id, error = %e, "could not queue report");
            if let Err(se) = self
                .store
                .save_report_result(
                    report.id,
                    json!({ "error": "analysis queue closed" }),
                    ReportStatus::Failed,
                )
                .await
            {
                error!(report_id = %report.id, error = %se, "failed to mark unqueued report failed");
            }
            return Err(match e {
                QueueError::Closed(_) => SubmitError::ShuttingDown,
                other => SubmitError::Queue(other),
            });
        }
        info!(report_id = %report.id, user_id, url = %report.url, "analysis queued");
        Ok(report)
    }

    /// Closes the queue, lets the workers drain it, and returns the number of
    /// jobs they processed.
    pub async fn shutdown(self) -> usize {
        let Self {
            sender, workers, ..
        } = self;
        drop(sender);
        let processed = join_all(workers).await;
        info!(processed, "analysis service stopped");
        processed
    }

    /// Stops the workers without draining the queue.
    pub async fn abort(self) -> usize {
        self.cancel.cancel();
        self.shutdown().await
    }
}

async fn join_all(workers: Vec<JoinHandle<usize>>) -> usize {
    let mut total = 0;
    for handle in workers {
        match handle.await {
            Ok(n) => total += n,
            Err(e) => warn!(error = %e, "worker task failed"),
        }
    }
    total
}
