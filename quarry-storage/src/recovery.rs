//! Startup recovery for the vector index.
//!
//! The relational chunk table is the source of truth; the index is a
//! query structure derived from it. On startup the last snapshot is
//! loaded when it agrees with the configured dimension, and any namespace
//! whose vector count disagrees with the chunk table is rebuilt from the
//! table. The table is never healed from the index.

use crate::vector::MemoryVectorStore;
use quarry_core::error::Result;
use quarry_core::scope::TenantScope;
use quarry_core::traits::{DocumentRepository, TenantRepository, VectorStore};
use quarry_core::types::VectorEntry;
use std::path::Path;
use tracing::{info, warn};

/// Rebuild one namespace from the chunk table, returning the vector count.
///
/// # Errors
///
/// Repository and store failures propagate.
pub async fn rebuild_namespace(
    store: &dyn VectorStore,
    documents: &dyn DocumentRepository,
    scope: &TenantScope,
) -> Result<usize> {
    let chunks = documents.list_chunks_in_scope(scope).await?;
    let entries: Vec<VectorEntry> = chunks
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
    let count = entries.len();
    store.rebuild(scope, entries).await?;
    Ok(count)
}

/// Load the snapshot if one is present and consistent, then verify every
/// (org, domain) namespace against the chunk table and rebuild the ones
/// that disagree. Returns how many namespaces were rebuilt.
///
/// # Errors
///
/// Repository failures propagate; a bad or missing snapshot is recovered
/// from, not an error.
pub async fn restore_vector_store(
    store: &MemoryVectorStore,
    snapshot_path: &Path,
    tenants: &dyn TenantRepository,
    documents: &dyn DocumentRepository,
) -> Result<usize> {
    if snapshot_path.exists() {
        match store.load_snapshot(snapshot_path) {
            Ok(()) => info!(path = %snapshot_path.display(), "vector snapshot loaded"),
            Err(e) => warn!("snapshot unusable, rebuilding everything: {e}"),
        }
    }

    let mut rebuilt = 0;
    for org in tenants.list_orgs().await? {
        for domain in tenants.list_domains(org.id).await? {
            let scope = TenantScope::domain(org.id, domain.id);
            let expected = documents.list_chunks_in_scope(&scope).await?.len();
            let actual = store.stats(&scope).await?.vector_count;
            if expected != actual {
                warn!(
                    scope = %scope,
                    expected,
                    actual,
                    "namespace disagrees with chunk table, rebuilding"
                );
                rebuild_namespace(store, documents, &scope).await?;
                rebuilt += 1;
            }
        }
    }
    Ok(rebuilt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use chrono::Utc;
    use quarry_core::ids::{ChunkId, DocumentId, DomainId, OrgId};
    use quarry_core::types::{
        AccessMode, AiConfig, ChunkRecord, Domain, Organization, ProcessingStatus,
        SourceDocument, VectorQuery,
    };
    use std::collections::HashMap;

    const DIMENSION: usize = 4;

    async fn seed(backend: &MemoryBackend) -> TenantScope {
        let org = Organization {
            id: OrgId::new(),
            slug: "acme".to_string(),
            name: "Acme".to_string(),
            created_at: Utc::now(),
        };
        let domain = Domain {
            id: DomainId::new(),
            org_id: org.id,
            name: "docs".to_string(),
            display_name: "Docs".to_string(),
            template: "docs".to_string(),
            ai_config: AiConfig::default(),
            access_mode: AccessMode::Public,
            settings: HashMap::new(),
            created_at: Utc::now(),
        };
        backend.create_org(org.clone()).await.unwrap();
        backend.create_domain(domain.clone()).await.unwrap();

        let document = SourceDocument {
            id: DocumentId::new(),
            org_id: org.id,
            domain_id: domain.id,
            filename: "a.txt".to_string(),
            content_type: "text/plain".to_string(),
            size_bytes: 1,
            content_hash: "a".to_string(),
            status: ProcessingStatus::Ready,
            chunk_count: Some(2),
            error: None,
            uploaded_by: None,
            uploaded_at: Utc::now(),
            metadata: HashMap::new(),
        };
        let document_id = document.id;
        backend.insert_document(document).await.unwrap();
        backend
            .insert_chunks(
                (0..2)
                    .map(|i| ChunkRecord {
                        id: ChunkId::new(),
                        document_id,
                        org_id: org.id,
                        domain_id: domain.id,
                        chunk_index: i,
                        text: format!("chunk {i}"),
                        embedding: vec![1.0, 0.0, 0.0, 0.0],
                        model_id: "m".to_string(),
                        content_hash: format!("c{i}"),
                        metadata: HashMap::new(),
                    })
                    .collect(),
            )
            .await
            .unwrap();

        TenantScope::domain(org.id, domain.id)
    }

    #[tokio::test]
    async fn test_empty_store_is_rebuilt_from_chunk_table() {
        let backend = MemoryBackend::new();
        let scope = seed(&backend).await;
        let store = MemoryVectorStore::new(DIMENSION);

        let dir = tempfile::tempdir().unwrap();
        let rebuilt = restore_vector_store(
            &store,
            &dir.path().join("missing.snapshot"),
            &backend,
            &backend,
        )
        .await
        .unwrap();

        assert_eq!(rebuilt, 1);
        assert_eq!(store.stats(&scope).await.unwrap().vector_count, 2);

        let hits = store
            .search(&scope, &VectorQuery::new(vec![1.0, 0.0, 0.0, 0.0], 10))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_consistent_snapshot_skips_rebuild() {
        let backend = MemoryBackend::new();
        let scope = seed(&backend).await;

        // A store already in agreement, snapshotted and restored.
        let store = MemoryVectorStore::new(DIMENSION);
        rebuild_namespace(&store, &backend, &scope).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.snapshot");
        store.save_snapshot(&path).unwrap();

        let restored = MemoryVectorStore::new(DIMENSION);
        let rebuilt = restore_vector_store(&restored, &path, &backend, &backend)
            .await
            .unwrap();
        assert_eq!(rebuilt, 0);
        assert_eq!(restored.stats(&scope).await.unwrap().vector_count, 2);
    }

    #[tokio::test]
    async fn test_wrong_dimension_snapshot_triggers_rebuild() {
        let backend = MemoryBackend::new();
        let scope = seed(&backend).await;

        // Snapshot written by a process pinned to another dimension.
        let other = MemoryVectorStore::new(8);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.snapshot");
        other.save_snapshot(&path).unwrap();

        let store = MemoryVectorStore::new(DIMENSION);
        let rebuilt = restore_vector_store(&store, &path, &backend, &backend)
            .await
            .unwrap();
        assert_eq!(rebuilt, 1);
        assert_eq!(store.stats(&scope).await.unwrap().vector_count, 2);
    }
}
