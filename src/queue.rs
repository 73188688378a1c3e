//! Bounded FIFO hand-off between the submitting side and analysis workers.
//!
//! `enqueue` waits for a free slot once `capacity` jobs are buffered, so a
//! burst of submissions slows the producer down instead of piling work onto
//! the analyzer. `dequeue` waits until a job arrives and returns `None` once
//! every [`JobSender`] is dropped and the buffer is drained.
//!
//! Receivers may be cloned to run several workers off one queue; each job is
//! handed to exactly one of them.

use crate::{error::QueueError, report::AnalyzeJob};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

pub const DEFAULT_CAPACITY: usize = 100;

pub fn bounded(capacity: usize) -> (JobSender, JobReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        JobSender { tx },
        JobReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

#[derive(Debug, Clone)]
pub struct JobSender {
    tx: mpsc::Sender<AnalyzeJob>,
}

impl JobSender {
    pub async fn enqueue(&self, job: AnalyzeJob) -> Result<(), QueueError> {
        self.tx.send(job).await.map_err(|e| QueueError::Closed(e.0))
    }

    pub fn try_enqueue(&self, job: AnalyzeJob) -> Result<(), QueueError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => QueueError::Full(job),
            mpsc::error::TrySendError::Closed(job) => QueueError::Closed(job),
        })
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Jobs currently buffered.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug, Clone)]
pub struct JobReceiver {
    rx: Arc<Mutex<mpsc::Receiver<AnalyzeJob>>>,
}

impl JobReceiver {
    pub async fn dequeue(&self) -> Option<AnalyzeJob> {
        self.rx.lock().await.recv().await
    }
}
