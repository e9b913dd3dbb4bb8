//! Vector store seam.

use crate::error::Result;
use crate::ids::{ChunkId, DocumentId};
use crate::scope::TenantScope;
use crate::types::{ScopedStats, VectorEntry, VectorQuery, VectorRecord, VectorStoreStats};
use async_trait::async_trait;

/// Which vectors a delete targets within a scope.
#[derive(Debug, Clone, Default)]
pub struct VectorDeleteFilter {
    /// Delete every vector of this document.
    pub document_id: Option<DocumentId>,
    /// Delete these specific chunks.
    pub chunk_ids: Option<Vec<ChunkId>>,
}

impl VectorDeleteFilter {
    /// Filter matching all vectors of one document.
    #[must_use]
    pub const fn document(document_id: DocumentId) -> Self {
        Self {
            document_id: Some(document_id),
            chunk_ids: None,
        }
    }
}

/// One logical index per (org, domain), identical contract regardless of
/// backend.
///
/// Isolation is enforced inside the store: a search can only ever return
/// entries whose scope equals the query's scope, independent of what the
/// caller does with the results.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace a batch of vectors. Atomic within the batch: the
    /// namespace's readers see either none or all of it.
    async fn upsert(&self, scope: &TenantScope, entries: Vec<VectorEntry>) -> Result<()>;

    /// Delete matching vectors, returning how many were removed.
    async fn delete(&self, scope: &TenantScope, filter: &VectorDeleteFilter) -> Result<usize>;

    /// Drop a whole namespace, returning how many vectors it held.
    async fn delete_scope(&self, scope: &TenantScope) -> Result<usize>;

    /// Top-k cosine search, descending score, ties broken by insertion
    /// order.
    async fn search(&self, scope: &TenantScope, query: &VectorQuery)
        -> Result<Vec<VectorRecord>>;

    /// Replace a namespace's contents in one atomic swap. Used for
    /// re-index and for rebuilds from the relational store.
    async fn rebuild(&self, scope: &TenantScope, entries: Vec<VectorEntry>) -> Result<()>;

    /// Per-scope statistics.
    async fn stats(&self, scope: &TenantScope) -> Result<ScopedStats>;

    /// Store-wide statistics.
    async fn stats_all(&self) -> Result<VectorStoreStats>;
}
