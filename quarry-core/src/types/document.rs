//! Source documents and their chunks.

use crate::ids::{ChunkId, DocumentId, DomainId, OrgId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Processing state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Accepted and queued.
    Pending,
    /// A worker is extracting, chunking, or embedding it.
    Processing,
    /// Fully chunked, embedded, and searchable.
    Ready,
    /// Gave up after exhausting retries.
    Failed,
}

impl ProcessingStatus {
    /// Whether the document has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// An uploaded or crawled document scoped to one (org, domain).
///
/// The content hash is unique per (org, domain): a second upload of the
/// same bytes is rejected with `DuplicateHash` and the existing id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Unique id.
    pub id: DocumentId,
    /// Owning org, denormalised onto every row for isolation filters.
    pub org_id: OrgId,
    /// Owning domain.
    pub domain_id: DomainId,
    /// Original filename, or the URL for crawled pages.
    pub filename: String,
    /// Content type detected from magic bytes.
    pub content_type: String,
    /// Payload size.
    pub size_bytes: u64,
    /// sha256 of the payload, hex encoded.
    pub content_hash: String,
    /// Processing state.
    pub status: ProcessingStatus,
    /// Set once the pipeline reaches `Ready`; equals the embedding count.
    pub chunk_count: Option<usize>,
    /// Failure reason when status is `Failed`.
    pub error: Option<String>,
    /// Uploading user; `None` for connector-fed documents.
    pub uploaded_by: Option<UserId>,
    /// Upload timestamp.
    pub uploaded_at: DateTime<Utc>,
    /// Free-form metadata: page counts, crawl info, extracted images,
    /// step lists.
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A bounded text span cut from a document, with its embedding identity.
///
/// `(document_id, chunk_index)` is the composite key the ingestion worker
/// uses to skip already-persisted chunks after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Unique id.
    pub id: ChunkId,
    /// Owning document.
    pub document_id: DocumentId,
    /// Denormalised tenant columns.
    pub org_id: OrgId,
    /// Denormalised tenant columns.
    pub domain_id: DomainId,
    /// Zero-based position within the document.
    pub chunk_index: usize,
    /// Raw chunk text.
    pub text: String,
    /// Embedding vector; dimension is fixed by the configured model.
    pub embedding: Vec<f32>,
    /// Model that produced the embedding.
    pub model_id: String,
    /// sha256 of the chunk text, hex encoded.
    pub content_hash: String,
    /// Page numbers, URL anchors, and similar positional hints.
    pub metadata: HashMap<String, serde_json::Value>,
}
