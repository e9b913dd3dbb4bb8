//! The ingestion pipeline.
//!
//! The synchronous half ([`IngestionService::ingest`]) validates, stores
//! the blob, creates the `Pending` document row, and enqueues a job. The
//! background half ([`IngestionService::run_worker`]) extracts, chunks,
//! embeds, and persists with at-least-once semantics: every step is
//! idempotent per document, so a worker killed mid-flight resumes cleanly
//! on the next attempt.

use crate::chunking::TextChunker;
use crate::detect::{self, ContentKind};
use crate::embedding::{embed_cached, EmbeddingCache};
use crate::extract;
use crate::queue::{IngestJob, IngestQueue};
use crate::usage::UsageMeter;
use chrono::Utc;
use quarry_core::audit::{AuditEvent, AuditLogger};
use quarry_core::config::IngestConfig;
use quarry_core::error::{QuarryError, Result};
use quarry_core::hash::content_hash;
use quarry_core::ids::{ChunkId, CorrelationId, DocumentId, UserId};
use quarry_core::scope::TenantScope;
use quarry_core::traits::{BlobStore, DocumentRepository, EmbeddingModel, VectorStore};
use quarry_core::types::{
    ChunkRecord, Domain, Organization, ProcessingStatus, SourceDocument, VectorEntry,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EMBED_BATCH_SIZE: usize = 64;

/// Hook the query layer registers so a fresh ingest drops stale answers.
pub trait CacheInvalidation: Send + Sync {
    /// Drop cached responses for a scope.
    fn invalidate_scope(&self, scope: &TenantScope);
}

/// No-op invalidation for wiring without a query layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInvalidation;

impl CacheInvalidation for NoopInvalidation {
    fn invalidate_scope(&self, _scope: &TenantScope) {}
}

fn safe_filename(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Orchestrates upload intake and background processing.
pub struct IngestionService {
    documents: Arc<dyn DocumentRepository>,
    blobs: Arc<dyn BlobStore>,
    vectors: Arc<dyn VectorStore>,
    model: Arc<dyn EmbeddingModel>,
    cache: Arc<EmbeddingCache>,
    chunker: TextChunker,
    audit: AuditLogger,
    usage: Arc<UsageMeter>,
    invalidation: Arc<dyn CacheInvalidation>,
    queue: IngestQueue,
    config: IngestConfig,
}

impl std::fmt::Debug for IngestionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl IngestionService {
    /// Wire the service, returning it with the worker's queue receiver.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        blobs: Arc<dyn BlobStore>,
        vectors: Arc<dyn VectorStore>,
        model: Arc<dyn EmbeddingModel>,
        cache: Arc<EmbeddingCache>,
        audit: AuditLogger,
        usage: Arc<UsageMeter>,
        invalidation: Arc<dyn CacheInvalidation>,
        config: IngestConfig,
    ) -> (Self, mpsc::Receiver<IngestJob>) {
        let (queue, receiver) = IngestQueue::new(config.queue_capacity);
        let chunker = TextChunker::for_model(
            crate::chunking::ChunkingConfig {
                target_tokens: config.chunk_target_tokens,
                overlap_tokens: config.chunk_overlap_tokens,
                ..crate::chunking::ChunkingConfig::default()
            },
            model.model_id(),
        );
        (
            Self {
                documents,
                blobs,
                vectors,
                model,
                cache,
                chunker,
                audit,
                usage,
                invalidation,
                queue,
                config,
            },
            receiver,
        )
    }

    /// Accept an upload: validate, store the blob, create the `Pending`
    /// row, enqueue background processing, and return the new document id.
    ///
    /// # Errors
    ///
    /// `TooLarge`, `UnsupportedType`, `DuplicateHash` (carrying the
    /// existing id), or `Overloaded` when the ingest queue is full.
    pub async fn ingest(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        org: &Organization,
        domain: &Domain,
        uploaded_by: Option<UserId>,
        correlation: CorrelationId,
    ) -> Result<DocumentId> {
        self.ingest_inner(bytes, filename, org, domain, uploaded_by, "upload", HashMap::new(), correlation)
            .await
    }

    /// Accept a crawled page as a virtual `web` document. The URL stands
    /// in for the filename and the crawl metadata lands on the document
    /// row.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`IngestionService::ingest`].
    pub async fn ingest_page(
        &self,
        bytes: Vec<u8>,
        url: &str,
        org: &Organization,
        domain: &Domain,
        crawl_metadata: HashMap<String, serde_json::Value>,
        correlation: CorrelationId,
    ) -> Result<DocumentId> {
        self.ingest_inner(bytes, url, org, domain, None, "web", crawl_metadata, correlation)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn ingest_inner(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        org: &Organization,
        domain: &Domain,
        uploaded_by: Option<UserId>,
        source: &str,
        extra_metadata: HashMap<String, serde_json::Value>,
        correlation: CorrelationId,
    ) -> Result<DocumentId> {
        let size = bytes.len() as u64;
        if size > self.config.upload_max_bytes {
            return Err(QuarryError::TooLarge {
                size,
                limit: self.config.upload_max_bytes,
            });
        }

        let Some(kind) = detect::detect(&bytes, filename) else {
            return Err(QuarryError::UnsupportedType {
                detected: "application/octet-stream".to_string(),
            });
        };

        let scope = TenantScope::domain(org.id, domain.id);
        let hash = content_hash(&bytes);
        if let Some(existing) = self.documents.get_by_hash(&scope, &hash).await? {
            return Err(QuarryError::DuplicateHash {
                hash,
                existing_id: existing.id.to_string(),
            });
        }

        let document_id = DocumentId::new();
        let blob_key = format!(
            "{}/{}/{document_id}/{}",
            org.slug,
            domain.name,
            safe_filename(filename)
        );
        self.blobs.put(&blob_key, bytes).await?;

        let mut metadata = extra_metadata;
        metadata.insert("blob_key".to_string(), serde_json::json!(blob_key));
        metadata.insert("source".to_string(), serde_json::json!(source));

        let document = SourceDocument {
            id: document_id,
            org_id: org.id,
            domain_id: domain.id,
            filename: filename.to_string(),
            content_type: kind.mime().to_string(),
            size_bytes: size,
            content_hash: hash,
            status: ProcessingStatus::Pending,
            chunk_count: None,
            error: None,
            uploaded_by,
            uploaded_at: Utc::now(),
            metadata,
        };

        if let Err(e) = self.documents.insert_document(document).await {
            // A racing identical upload won the insert; drop our blob.
            let _ = self.blobs.delete(&blob_key).await;
            return Err(e);
        }

        if let Some(user_id) = uploaded_by {
            self.audit.log(
                AuditEvent::FileUploaded {
                    user_id,
                    org_id: org.id,
                    domain_id: domain.id,
                    document_id,
                    filename: filename.to_string(),
                },
                correlation,
            )?;
        }

        if let Err(e) = self.queue.enqueue(IngestJob {
            document_id,
            correlation,
        }) {
            // Shed the whole upload rather than leave an orphan row that
            // no worker will ever pick up.
            let _ = self.documents.delete_document(document_id).await;
            let _ = self.blobs.delete(&blob_key).await;
            return Err(e);
        }

        self.usage.add_document(org.id, size);
        info!(document_id = %document_id, "upload accepted");
        Ok(document_id)
    }

    /// Drain the queue until cancellation. Each job gets the configured
    /// retry budget with exponential back-off before the document is
    /// marked `Failed`.
    pub async fn run_worker(
        self: Arc<Self>,
        mut receiver: mpsc::Receiver<IngestJob>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("ingest worker stopping");
                    break;
                }
                job = receiver.recv() => {
                    let Some(job) = job else { break };
                    self.process_with_retries(&job, &cancel).await;
                }
            }
        }
    }

    async fn process_with_retries(&self, job: &IngestJob, cancel: &CancellationToken) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.process_document(job.document_id, cancel).await {
                Ok(()) => return,
                Err(e) if matches!(e, QuarryError::Cancelled { .. }) => {
                    // Leave the document as-is; a restart resumes it.
                    warn!(document_id = %job.document_id, "processing cancelled");
                    return;
                }
                Err(e) if attempt < self.config.max_attempts => {
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt));
                    warn!(
                        document_id = %job.document_id,
                        attempt,
                        "ingestion attempt failed, backing off: {e}"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    warn!(document_id = %job.document_id, "ingestion giving up: {e}");
                    if let Ok(Some(document)) =
                        self.documents.get_document(job.document_id).await
                    {
                        let _ = self
                            .documents
                            .fail_document(job.document_id, &e.to_string())
                            .await;
                        let _ = self.audit.log(
                            AuditEvent::IngestionFailed {
                                org_id: document.org_id,
                                document_id: job.document_id,
                                reason: e.to_string(),
                            },
                            job.correlation,
                        );
                    }
                    return;
                }
            }
        }
    }

    /// One processing pass over a document. Idempotent: already-persisted
    /// chunks are kept, already-cached embeddings are reused, and a
    /// document that reached `Ready` is left alone.
    ///
    /// # Errors
    ///
    /// Extraction, embedding, and storage failures propagate to the retry
    /// loop.
    pub async fn process_document(
        &self,
        document_id: DocumentId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let cancelled = || QuarryError::Cancelled {
            operation: "ingestion".to_string(),
        };

        let Some(document) = self.documents.get_document(document_id).await? else {
            // Deleted while queued, e.g. a domain cascade. Nothing to do.
            debug!(document_id = %document_id, "document vanished before processing");
            return Ok(());
        };
        if document.status == ProcessingStatus::Ready {
            return Ok(());
        }

        self.documents.mark_processing(document_id).await?;

        let blob_key = document
            .metadata
            .get("blob_key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| QuarryError::IntegrityViolation {
                detail: format!("document {document_id} has no blob key"),
            })?;
        let bytes = self.blobs.get(blob_key).await?;
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let kind = detect::detect(&bytes, &document.filename).unwrap_or(ContentKind::PlainText);
        let extracted = extract::extract(&kind, &bytes, self.config.max_images_per_document)?;

        let mut doc_metadata = HashMap::new();
        if let Some(title) = &extracted.title {
            doc_metadata.insert("title".to_string(), serde_json::json!(title));
        }
        if !extracted.images.is_empty() {
            doc_metadata.insert("images".to_string(), serde_json::json!(extracted.images));
        }
        if !extracted.step_lists.is_empty() {
            doc_metadata.insert(
                "step_lists".to_string(),
                serde_json::json!(extracted.step_lists),
            );
        }
        for (key, value) in extracted.extra {
            doc_metadata.insert(key, value);
        }
        if !doc_metadata.is_empty() {
            self.documents
                .merge_metadata(document_id, doc_metadata)
                .await?;
        }

        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let chunks = self.chunker.chunk(&extracted.text);
        let scope = TenantScope::domain(document.org_id, document.domain_id);

        // Restart safety: (document_id, chunk_index) already persisted is
        // skipped wholesale.
        let existing: HashSet<usize> = self
            .documents
            .list_chunks(document_id)
            .await?
            .into_iter()
            .map(|c| c.chunk_index)
            .collect();

        let fresh: Vec<_> = chunks
            .iter()
            .filter(|c| !existing.contains(&c.chunk_index))
            .collect();

        if !fresh.is_empty() {
            let texts: Vec<String> = fresh.iter().map(|c| c.text.clone()).collect();
            let before_misses = self.cache.stats().misses;
            let embeddings =
                embed_cached(&self.model, &self.cache, &texts, EMBED_BATCH_SIZE).await?;
            let generated = self.cache.stats().misses - before_misses;
            self.usage
                .add_embeddings(document.org_id, generated as u64);

            let records: Vec<ChunkRecord> = fresh
                .iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| ChunkRecord {
                    id: ChunkId::new(),
                    document_id,
                    org_id: document.org_id,
                    domain_id: document.domain_id,
                    chunk_index: chunk.chunk_index,
                    text: chunk.text.clone(),
                    embedding,
                    model_id: self.model.model_id().to_string(),
                    content_hash: chunk.content_hash.clone(),
                    metadata: HashMap::new(),
                })
                .collect();
            self.documents.insert_chunks(records).await?;
        }

        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        // The relational store is the source of truth; the index mirrors
        // whatever is persisted there.
        let stored = self.documents.list_chunks(document_id).await?;
        let total = stored.len();
        let entries: Vec<VectorEntry> = stored
            .into_iter()
            .map(|c| VectorEntry {
                chunk_id: c.id,
                document_id: c.document_id,
                chunk_index: c.chunk_index,
                embedding: c.embedding,
                text: c.text,
                metadata: c.metadata,
            })
            .collect();
        self.vectors.upsert(&scope, entries).await?;

        self.documents.finalize_document(document_id, total).await?;
        self.invalidation.invalidate_scope(&scope);

        info!(
            document_id = %document_id,
            chunks = total,
            "document ready"
        );
        Ok(())
    }

    /// The chunker in use, shared with callers that need token counts.
    #[must_use]
    pub const fn chunker(&self) -> &TextChunker {
        &self.chunker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_filename_strips_paths_and_oddities() {
        assert_eq!(safe_filename("report.pdf"), "report.pdf");
        assert_eq!(safe_filename("../../etc/passwd"), "passwd");
        assert_eq!(safe_filename("we ird £name.txt"), "we_ird__name.txt");
        assert_eq!(safe_filename(""), "upload");
    }
}
