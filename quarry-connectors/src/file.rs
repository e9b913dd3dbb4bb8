//! File connector.
//!
//! Uploads are push-based; the connector's sync is a reconciliation pass
//! that re-enqueues documents stuck outside a terminal state.

use crate::config;
use crate::sync::SyncOutcome;
use crate::{Connector, PreviewItem, PreviewReport, TestReport};
use async_trait::async_trait;
use quarry_core::error::Result;
use quarry_core::ids::CorrelationId;
use quarry_core::scope::TenantScope;
use quarry_core::traits::DocumentRepository;
use quarry_core::types::{ConnectorKind, ConnectorRecord, ProcessingStatus};
use quarry_ingest::{IngestJob, IngestQueue};
use std::sync::Arc;
use tracing::info;

/// Connector for direct uploads.
pub struct FileConnector {
    documents: Arc<dyn DocumentRepository>,
    queue: IngestQueue,
}

impl std::fmt::Debug for FileConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConnector").finish_non_exhaustive()
    }
}

impl FileConnector {
    /// Connector over the document store and the ingest queue.
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentRepository>, queue: IngestQueue) -> Self {
        Self { documents, queue }
    }

}

#[async_trait]
impl Connector for FileConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::File
    }

    async fn test(&self, record: &ConnectorRecord) -> Result<TestReport> {
        config::validate_for_write(&record.kind, &record.config)?;
        Ok(TestReport::ok("file connector configuration is valid"))
    }

    async fn preview(&self, record: &ConnectorRecord) -> Result<PreviewReport> {
        let scope = TenantScope::domain(record.org_id, record.domain_id);
        let documents = self.documents.list_documents(&scope).await?;
        Ok(PreviewReport {
            items: documents
                .into_iter()
                .take(20)
                .map(|d| PreviewItem {
                    name: d.filename,
                    detail: format!("{} ({} bytes)", d.status, d.size_bytes),
                })
                .collect(),
        })
    }

    async fn sync(&self, record: &ConnectorRecord) -> Result<SyncOutcome> {
        config::read(&record.kind, &record.config)?;

        let scope = TenantScope::domain(record.org_id, record.domain_id);
        let documents = self.documents.list_documents(&scope).await?;

        let mut outcome = SyncOutcome::default();
        for document in documents {
            outcome.processed += 1;
            match document.status {
                ProcessingStatus::Ready => outcome.succeeded += 1,
                ProcessingStatus::Failed => outcome.failed += 1,
                ProcessingStatus::Pending | ProcessingStatus::Processing => {
                    // Re-enqueue anything that lost its worker, e.g. after
                    // a restart with a drained queue.
                    self.queue.enqueue(IngestJob {
                        document_id: document.id,
                        correlation: CorrelationId::new(),
                    })?;
                }
            }
        }

        info!(
            connector_id = %record.id,
            processed = outcome.processed,
            "file reconciliation finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quarry_core::ids::{ConnectorId, DocumentId, DomainId, OrgId};
    use quarry_core::types::SourceDocument;
    use quarry_storage::MemoryBackend;
    use std::collections::HashMap;

    fn record(org_id: OrgId, domain_id: DomainId) -> ConnectorRecord {
        ConnectorRecord {
            id: ConnectorId::new(),
            org_id,
            domain_id,
            kind: ConnectorKind::File,
            name: "uploads".to_string(),
            config: serde_json::json!({}),
            enabled: true,
            schedule: None,
            created_at: Utc::now(),
        }
    }

    fn document(org_id: OrgId, domain_id: DomainId, status: ProcessingStatus, hash: &str) -> SourceDocument {
        SourceDocument {
            id: DocumentId::new(),
            org_id,
            domain_id,
            filename: format!("{hash}.txt"),
            content_type: "text/plain".to_string(),
            size_bytes: 1,
            content_hash: hash.to_string(),
            status,
            chunk_count: None,
            error: None,
            uploaded_by: None,
            uploaded_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_sync_reenqueues_stuck_documents() {
        let backend = Arc::new(MemoryBackend::new());
        let org = OrgId::new();
        let domain = DomainId::new();

        backend
            .insert_document(document(org, domain, ProcessingStatus::Ready, "a"))
            .await
            .unwrap();
        backend
            .insert_document(document(org, domain, ProcessingStatus::Pending, "b"))
            .await
            .unwrap();
        backend
            .insert_document(document(org, domain, ProcessingStatus::Failed, "c"))
            .await
            .unwrap();

        let (queue, mut receiver) = IngestQueue::new(8);
        let connector = FileConnector::new(backend, queue);
        let outcome = connector.sync(&record(org, domain)).await.unwrap();

        assert_eq!(outcome.processed, 3);
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failed, 1);

        // The pending document landed back on the queue.
        let job = receiver.try_recv().unwrap();
        assert!(receiver.try_recv().is_err());
        let _ = job;
    }
}
