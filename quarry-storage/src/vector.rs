//! In-process vector index.
//!
//! One namespace per (org, domain). Vectors are normalised on insert, so
//! cosine similarity is a dot product at query time. Search is exact top-k
//! over the namespace; results are ordered by descending score with ties
//! broken by insertion order. Isolation is enforced here: a query's scope
//! picks exactly one namespace and nothing else is touched.
//!
//! The relational store is the source of truth. Namespaces can be saved to
//! and loaded from MessagePack snapshots; on a snapshot/store mismatch the
//! owner rebuilds the namespace from the chunk table with [`rebuild`],
//! which swaps the whole namespace atomically under its write lock.
//!
//! [`rebuild`]: MemoryVectorStore::rebuild

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use quarry_core::error::{QuarryError, Result};
use quarry_core::scope::TenantScope;
use quarry_core::traits::{VectorDeleteFilter, VectorStore};
use quarry_core::types::{ScopedStats, VectorEntry, VectorQuery, VectorRecord, VectorStoreStats};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Score blending for hybrid search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HybridWeights {
    /// Cosine similarity weight.
    pub vector: f32,
    /// Keyword overlap weight.
    pub keyword: f32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            vector: 0.7,
            keyword: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredVector {
    /// Monotonic insertion sequence within the namespace, the tie-breaker.
    seq: u64,
    entry: VectorEntry,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Namespace {
    vectors: Vec<StoredVector>,
    next_seq: u64,
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    dimension: usize,
    namespaces: HashMap<String, Namespace>,
}

/// Exact-search in-process vector store with namespace isolation.
pub struct MemoryVectorStore {
    dimension: usize,
    weights: HybridWeights,
    namespaces: RwLock<HashMap<String, Arc<RwLock<Namespace>>>>,
}

impl std::fmt::Debug for MemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryVectorStore")
            .field("dimension", &self.dimension)
            .field("weights", &self.weights)
            .finish_non_exhaustive()
    }
}

fn normalise(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn keyword_score(text: &str, keywords: &[String]) -> f32 {
    if keywords.is_empty() {
        return 0.0;
    }
    let haystack = text.to_lowercase();
    let matched = keywords
        .iter()
        .filter(|k| haystack.contains(&k.to_lowercase()))
        .count();
    #[allow(clippy::cast_precision_loss)]
    {
        matched as f32 / keywords.len() as f32
    }
}

fn matches_filter(
    entry: &VectorEntry,
    filter: Option<&HashMap<String, serde_json::Value>>,
) -> bool {
    filter.is_none_or(|filter| {
        filter
            .iter()
            .all(|(key, expected)| entry.metadata.get(key) == Some(expected))
    })
}

impl MemoryVectorStore {
    /// Empty store enforcing `dimension` with default hybrid weights.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            weights: HybridWeights::default(),
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    /// Override the hybrid blending weights.
    #[must_use]
    pub const fn with_weights(mut self, weights: HybridWeights) -> Self {
        self.weights = weights;
        self
    }

    fn namespace(&self, scope: &TenantScope) -> Arc<RwLock<Namespace>> {
        let key = scope.namespace();
        if let Some(ns) = self.namespaces.read().get(&key) {
            return ns.clone();
        }
        // Double-checked: a racing writer may have created it.
        let mut namespaces = self.namespaces.write();
        namespaces
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(Namespace::default())))
            .clone()
    }

    fn check_dimension(&self, entries: &[VectorEntry]) -> Result<()> {
        for entry in entries {
            if entry.embedding.len() != self.dimension {
                return Err(QuarryError::IntegrityViolation {
                    detail: format!(
                        "vector for chunk {} has dimension {}, index is pinned to {}",
                        entry.chunk_id,
                        entry.embedding.len(),
                        self.dimension
                    ),
                });
            }
        }
        Ok(())
    }

    fn require_domain(scope: &TenantScope) -> Result<()> {
        if scope.domain_id.is_none() {
            return Err(QuarryError::BadRequest {
                message: "vector operations require a domain-scoped tenant scope".to_string(),
            });
        }
        Ok(())
    }

    /// Write every namespace to a MessagePack snapshot.
    ///
    /// # Errors
    ///
    /// Fails on serialisation or filesystem errors.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let namespaces = self.namespaces.read();
        let mut owned = HashMap::with_capacity(namespaces.len());
        for (key, ns) in namespaces.iter() {
            let guard = ns.read();
            owned.insert(
                key.clone(),
                Namespace {
                    vectors: guard.vectors.clone(),
                    next_seq: guard.next_seq,
                    last_updated: guard.last_updated,
                },
            );
        }
        drop(namespaces);

        let snapshot = Snapshot {
            dimension: self.dimension,
            namespaces: owned,
        };
        let bytes = rmp_serde::to_vec(&snapshot).map_err(|e| {
            QuarryError::external(
                quarry_core::error::ExternalService::Storage,
                format!("snapshot encode failed: {e}"),
                false,
            )
        })?;
        std::fs::write(path, bytes).map_err(|e| {
            QuarryError::external(
                quarry_core::error::ExternalService::Storage,
                format!("snapshot write failed: {e}"),
                true,
            )
        })?;
        info!(path = %path.display(), "vector snapshot written");
        Ok(())
    }

    /// Load a snapshot, replacing the store's contents.
    ///
    /// A snapshot whose dimension disagrees with the configured one is
    /// refused; the caller falls back to a rebuild from the relational
    /// store.
    ///
    /// # Errors
    ///
    /// Fails on read, decode, or dimension mismatch.
    pub fn load_snapshot(&self, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path).map_err(|e| {
            QuarryError::external(
                quarry_core::error::ExternalService::Storage,
                format!("snapshot read failed: {e}"),
                false,
            )
        })?;
        let snapshot: Snapshot = rmp_serde::from_slice(&bytes).map_err(|e| {
            QuarryError::external(
                quarry_core::error::ExternalService::Storage,
                format!("snapshot decode failed: {e}"),
                false,
            )
        })?;
        if snapshot.dimension != self.dimension {
            warn!(
                snapshot = snapshot.dimension,
                configured = self.dimension,
                "snapshot dimension mismatch, refusing to load"
            );
            return Err(QuarryError::IntegrityViolation {
                detail: format!(
                    "snapshot dimension {} does not match configured {}",
                    snapshot.dimension, self.dimension
                ),
            });
        }

        let mut namespaces = self.namespaces.write();
        namespaces.clear();
        for (key, ns) in snapshot.namespaces {
            namespaces.insert(key, Arc::new(RwLock::new(ns)));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, scope: &TenantScope, mut entries: Vec<VectorEntry>) -> Result<()> {
        Self::require_domain(scope)?;
        self.check_dimension(&entries)?;
        for entry in &mut entries {
            normalise(&mut entry.embedding);
        }

        let ns = self.namespace(scope);
        // Writers hold the namespace lock for the whole batch; readers see
        // none or all of it.
        let mut guard = ns.write();
        for entry in entries {
            let existing = guard
                .vectors
                .iter()
                .position(|v| v.entry.chunk_id == entry.chunk_id);
            match existing {
                Some(index) => guard.vectors[index].entry = entry,
                None => {
                    let seq = guard.next_seq;
                    guard.next_seq += 1;
                    guard.vectors.push(StoredVector { seq, entry });
                }
            }
        }
        guard.last_updated = Some(Utc::now());
        Ok(())
    }

    async fn delete(&self, scope: &TenantScope, filter: &VectorDeleteFilter) -> Result<usize> {
        Self::require_domain(scope)?;
        let ns = self.namespace(scope);
        let mut guard = ns.write();
        let before = guard.vectors.len();
        guard.vectors.retain(|v| {
            let doc_match = filter
                .document_id
                .is_some_and(|d| v.entry.document_id == d);
            let chunk_match = filter
                .chunk_ids
                .as_ref()
                .is_some_and(|ids| ids.contains(&v.entry.chunk_id));
            !(doc_match || chunk_match)
        });
        if guard.vectors.len() != before {
            guard.last_updated = Some(Utc::now());
        }
        Ok(before - guard.vectors.len())
    }

    async fn delete_scope(&self, scope: &TenantScope) -> Result<usize> {
        let key = scope.namespace();
        let mut namespaces = self.namespaces.write();
        let mut removed = 0;
        namespaces.retain(|ns_key, ns| {
            // An org scope drops every domain namespace under it.
            let matches = ns_key == &key || ns_key.starts_with(&format!("{key}:domain:"));
            if matches {
                removed += ns.read().vectors.len();
            }
            !matches
        });
        Ok(removed)
    }

    async fn search(
        &self,
        scope: &TenantScope,
        query: &VectorQuery,
    ) -> Result<Vec<VectorRecord>> {
        Self::require_domain(scope)?;
        if query.vector.len() != self.dimension {
            return Err(QuarryError::IntegrityViolation {
                detail: format!(
                    "query vector has dimension {}, index is pinned to {}",
                    query.vector.len(),
                    self.dimension
                ),
            });
        }

        let mut query_vector = query.vector.clone();
        normalise(&mut query_vector);

        let ns = self.namespace(scope);
        let guard = ns.read();

        let mut scored: Vec<(f32, u64, VectorEntry)> = guard
            .vectors
            .iter()
            .filter(|v| matches_filter(&v.entry, query.filter.as_ref()))
            .map(|v| {
                let cosine = dot(&query_vector, &v.entry.embedding);
                let score = match &query.keywords {
                    Some(keywords) => self.weights.vector.mul_add(
                        cosine,
                        self.weights.keyword * keyword_score(&v.entry.text, keywords),
                    ),
                    None => cosine,
                };
                (score, v.seq, v.entry.clone())
            })
            .collect();
        drop(guard);

        if let Some(min_score) = query.min_score {
            scored.retain(|(score, _, _)| *score >= min_score);
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        scored.truncate(query.k);

        debug!(
            scope = %scope,
            hits = scored.len(),
            "vector search"
        );

        Ok(scored
            .into_iter()
            .map(|(score, _, entry)| VectorRecord {
                scope: *scope,
                entry,
                score,
            })
            .collect())
    }

    async fn rebuild(&self, scope: &TenantScope, mut entries: Vec<VectorEntry>) -> Result<()> {
        Self::require_domain(scope)?;
        self.check_dimension(&entries)?;
        for entry in &mut entries {
            normalise(&mut entry.embedding);
        }

        let mut fresh = Namespace::default();
        for entry in entries {
            let seq = fresh.next_seq;
            fresh.next_seq += 1;
            fresh.vectors.push(StoredVector { seq, entry });
        }
        fresh.last_updated = Some(Utc::now());

        // Atomic swap: readers hold either the old namespace or the new
        // one, never a mix.
        let ns = self.namespace(scope);
        *ns.write() = fresh;
        info!(scope = %scope, "namespace rebuilt");
        Ok(())
    }

    async fn stats(&self, scope: &TenantScope) -> Result<ScopedStats> {
        let ns = self.namespace(scope);
        let guard = ns.read();
        Ok(ScopedStats {
            scope: *scope,
            vector_count: guard.vectors.len(),
            dimension: self.dimension,
            last_updated: guard.last_updated,
        })
    }

    async fn stats_all(&self) -> Result<VectorStoreStats> {
        let namespaces = self.namespaces.read();
        let total_vectors = namespaces.values().map(|ns| ns.read().vectors.len()).sum();
        Ok(VectorStoreStats {
            total_vectors,
            namespace_count: namespaces.len(),
            dimension: self.dimension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::ids::{ChunkId, DocumentId, DomainId, OrgId};

    fn entry(text: &str, embedding: Vec<f32>) -> VectorEntry {
        VectorEntry {
            chunk_id: ChunkId::new(),
            document_id: DocumentId::new(),
            chunk_index: 0,
            embedding,
            text: text.to_string(),
            metadata: HashMap::new(),
        }
    }

    fn scope() -> TenantScope {
        TenantScope::domain(OrgId::new(), DomainId::new())
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let store = MemoryVectorStore::new(3);
        let s = scope();
        store
            .upsert(
                &s,
                vec![
                    entry("exact", vec![1.0, 0.0, 0.0]),
                    entry("orthogonal", vec![0.0, 1.0, 0.0]),
                    entry("close", vec![0.9, 0.1, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .search(&s, &VectorQuery::new(vec![1.0, 0.0, 0.0], 3))
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].entry.text, "exact");
        assert_eq!(hits[1].entry.text, "close");
        assert!(hits[0].score >= hits[1].score);
        assert!(hits[1].score >= hits[2].score);
    }

    #[tokio::test]
    async fn test_ties_break_by_insertion_order() {
        let store = MemoryVectorStore::new(2);
        let s = scope();
        store
            .upsert(
                &s,
                vec![
                    entry("first", vec![1.0, 0.0]),
                    entry("second", vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .search(&s, &VectorQuery::new(vec![1.0, 0.0], 2))
            .await
            .unwrap();
        assert_eq!(hits[0].entry.text, "first");
        assert_eq!(hits[1].entry.text, "second");
    }

    #[tokio::test]
    async fn test_isolation_between_namespaces() {
        let store = MemoryVectorStore::new(2);
        let org = OrgId::new();
        let a = TenantScope::domain(org, DomainId::new());
        let b = TenantScope::domain(org, DomainId::new());

        store
            .upsert(&a, vec![entry("domain-a", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert(&b, vec![entry("domain-b", vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = store
            .search(&a, &VectorQuery::new(vec![1.0, 0.0], 10))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.text, "domain-a");
        assert!(hits.iter().all(|h| h.scope == a));
    }

    #[tokio::test]
    async fn test_dimension_is_enforced() {
        let store = MemoryVectorStore::new(3);
        let s = scope();
        let err = store
            .upsert(&s, vec![entry("bad", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::IntegrityViolation { .. }));

        let err = store
            .search(&s, &VectorQuery::new(vec![1.0, 0.0], 5))
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::IntegrityViolation { .. }));
    }

    #[tokio::test]
    async fn test_min_score_floor() {
        let store = MemoryVectorStore::new(2);
        let s = scope();
        store
            .upsert(
                &s,
                vec![
                    entry("match", vec![1.0, 0.0]),
                    entry("far", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .search(
                &s,
                &VectorQuery::new(vec![1.0, 0.0], 10).with_min_score(0.5),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.text, "match");
    }

    #[tokio::test]
    async fn test_hybrid_blend_prefers_keyword_matches() {
        let store = MemoryVectorStore::new(2);
        let s = scope();
        store
            .upsert(
                &s,
                vec![
                    entry("plain text about nothing", vec![0.8, 0.6]),
                    entry("upload timeout guidance", vec![0.8, 0.6]),
                ],
            )
            .await
            .unwrap();

        let query = VectorQuery::new(vec![1.0, 0.0], 2)
            .with_keywords(vec!["upload".to_string(), "timeout".to_string()]);
        let hits = store.search(&s, &query).await.unwrap();
        assert_eq!(hits[0].entry.text, "upload timeout guidance");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_rebuild_swaps_contents() {
        let store = MemoryVectorStore::new(2);
        let s = scope();
        store
            .upsert(&s, vec![entry("old", vec![1.0, 0.0])])
            .await
            .unwrap();

        store
            .rebuild(&s, vec![entry("new", vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = store
            .search(&s, &VectorQuery::new(vec![1.0, 0.0], 10))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.text, "new");
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.snapshot");

        let store = MemoryVectorStore::new(2);
        let s = scope();
        store
            .upsert(&s, vec![entry("persisted", vec![1.0, 0.0])])
            .await
            .unwrap();
        store.save_snapshot(&path).unwrap();

        let restored = MemoryVectorStore::new(2);
        restored.load_snapshot(&path).unwrap();
        let hits = restored
            .search(&s, &VectorQuery::new(vec![1.0, 0.0], 10))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.text, "persisted");
    }

    #[tokio::test]
    async fn test_snapshot_dimension_mismatch_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.snapshot");

        let store = MemoryVectorStore::new(2);
        store.save_snapshot(&path).unwrap();

        let other = MemoryVectorStore::new(3);
        let err = other.load_snapshot(&path).unwrap_err();
        assert!(matches!(err, QuarryError::IntegrityViolation { .. }));
    }

    #[tokio::test]
    async fn test_delete_by_document() {
        let store = MemoryVectorStore::new(2);
        let s = scope();
        let keep = entry("keep", vec![1.0, 0.0]);
        let drop_a = entry("drop-a", vec![1.0, 0.0]);
        let mut drop_b = entry("drop-b", vec![0.0, 1.0]);
        drop_b.document_id = drop_a.document_id;
        let target = drop_a.document_id;

        store
            .upsert(&s, vec![keep, drop_a, drop_b])
            .await
            .unwrap();

        let removed = store
            .delete(&s, &VectorDeleteFilter::document(target))
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let stats = store.stats(&s).await.unwrap();
        assert_eq!(stats.vector_count, 1);
    }
}
