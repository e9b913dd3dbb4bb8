//! Sync-job execution.
//!
//! The runner owns the job lifecycle: it writes `Pending`, flips to
//! `Running`, executes the connector's sync on a spawned task, and
//! guarantees a terminal state. A panic inside a connector maps to
//! `Failed` with a reason, never a job stuck in `Running`.

use crate::Connector;
use chrono::Utc;
use quarry_core::error::Result;
use quarry_core::traits::ConnectorRepository;
use quarry_core::types::{ConnectorRecord, SyncJob, SyncJobStatus};
use std::sync::Arc;
use tracing::{info, warn};

/// Item counts reported by a finished sync.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOutcome {
    /// Items examined.
    pub processed: usize,
    /// Items ingested.
    pub succeeded: usize,
    /// Items that errored.
    pub failed: usize,
}

/// Drives connector syncs through their job lifecycle.
pub struct SyncRunner {
    repo: Arc<dyn ConnectorRepository>,
}

impl std::fmt::Debug for SyncRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRunner").finish_non_exhaustive()
    }
}

impl SyncRunner {
    /// Runner persisting jobs through the given repository.
    #[must_use]
    pub fn new(repo: Arc<dyn ConnectorRepository>) -> Self {
        Self { repo }
    }

    /// Run one sync for a connector, returning the finished job record.
    ///
    /// # Errors
    ///
    /// Repository failures propagate; connector failures land in the job
    /// record instead.
    pub async fn run(
        &self,
        connector: Arc<dyn Connector>,
        record: &ConnectorRecord,
    ) -> Result<SyncJob> {
        let mut job = SyncJob::pending(record.id, record.org_id);
        self.repo.insert_sync_job(job.clone()).await?;

        job.status = SyncJobStatus::Running;
        job.started_at = Some(Utc::now());
        self.repo.update_sync_job(job.clone()).await?;

        // The connector runs on its own task so a panic is contained and
        // still reaches a terminal state.
        let record_for_task = record.clone();
        let handle =
            tokio::spawn(async move { connector.sync(&record_for_task).await });

        match handle.await {
            Ok(Ok(outcome)) => {
                job.status = SyncJobStatus::Success;
                job.items_processed = outcome.processed;
                job.items_succeeded = outcome.succeeded;
                job.items_failed = outcome.failed;
                info!(
                    connector_id = %record.id,
                    processed = outcome.processed,
                    "sync succeeded"
                );
            }
            Ok(Err(e)) => {
                job.status = SyncJobStatus::Failed;
                job.error = Some(e.to_string());
                warn!(connector_id = %record.id, "sync failed: {e}");
            }
            Err(join_error) => {
                job.status = SyncJobStatus::Failed;
                job.error = Some(if join_error.is_panic() {
                    "connector panicked during sync".to_string()
                } else {
                    "connector task was cancelled".to_string()
                });
                warn!(connector_id = %record.id, "sync did not finish: {join_error}");
            }
        }

        job.completed_at = Some(Utc::now());
        self.repo.update_sync_job(job.clone()).await?;
        Ok(job)
    }
}
