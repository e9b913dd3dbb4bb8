//! Ingestion job queue.
//!
//! Bounded: a full queue sheds load with `Overloaded` instead of growing.
//! Workers drain it until cancelled or the sending side closes.

use quarry_core::error::{QuarryError, Result};
use quarry_core::ids::{CorrelationId, DocumentId};
use tokio::sync::mpsc;

/// One unit of background ingestion work.
#[derive(Debug, Clone)]
pub struct IngestJob {
    /// Document to process.
    pub document_id: DocumentId,
    /// Correlation id of the originating upload.
    pub correlation: CorrelationId,
}

/// Producer handle onto the bounded queue.
#[derive(Debug, Clone)]
pub struct IngestQueue {
    sender: mpsc::Sender<IngestJob>,
}

impl IngestQueue {
    /// Build a queue with the given capacity, returning the worker's
    /// receiving end alongside the producer handle.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<IngestJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Enqueue without blocking.
    ///
    /// # Errors
    ///
    /// `Overloaded` when the queue is full or the worker side is gone.
    pub fn enqueue(&self, job: IngestJob) -> Result<()> {
        self.sender.try_send(job).map_err(|_| QuarryError::Overloaded {
            queue: "ingest".to_string(),
        })
    }
}
