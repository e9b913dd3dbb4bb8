//! Tenant-isolation property tests.
//!
//! Adversarial reads across randomly generated (org, domain) populations:
//! no repository listing or vector search may ever return a row whose
//! tenant columns disagree with the scope it was asked for.

use proptest::prelude::*;
use quarry_core::ids::{ChunkId, DocumentId, DomainId, OrgId};
use quarry_core::scope::TenantScope;
use quarry_core::traits::{DocumentRepository, VectorStore};
use quarry_core::types::{ProcessingStatus, SourceDocument, VectorEntry, VectorQuery};
use quarry_storage::{MemoryBackend, MemoryVectorStore};
use std::collections::HashMap;

const DIMENSION: usize = 8;

#[derive(Debug, Clone)]
struct Seeded {
    org: usize,
    domain: usize,
    text: String,
    vector: [f32; DIMENSION],
}

fn seeded_strategy(orgs: usize, domains: usize) -> impl Strategy<Value = Vec<Seeded>> {
    let one = (
        0..orgs,
        0..domains,
        "[a-z]{4,16}",
        prop::array::uniform8(-1.0f32..1.0),
    )
        .prop_map(|(org, domain, text, vector)| Seeded {
            org,
            domain,
            text,
            vector,
        });
    prop::collection::vec(one, 1..32)
}

fn document(org_id: OrgId, domain_id: DomainId, text: &str, index: usize) -> SourceDocument {
    SourceDocument {
        id: DocumentId::new(),
        org_id,
        domain_id,
        filename: format!("{text}.txt"),
        content_type: "text/plain".to_string(),
        size_bytes: text.len() as u64,
        content_hash: format!("{text}-{index}"),
        status: ProcessingStatus::Ready,
        chunk_count: Some(1),
        error: None,
        uploaded_by: None,
        uploaded_at: chrono::Utc::now(),
        metadata: HashMap::new(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Documents listed for any (org, domain) scope all carry exactly
    /// those tenant columns, under every adversarial scope combination.
    #[test]
    fn prop_document_listings_never_cross_scopes(seeded in seeded_strategy(3, 3)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(async {
            let backend = MemoryBackend::new();
            let org_ids: Vec<OrgId> = (0..3).map(|_| OrgId::new()).collect();
            let domain_ids: Vec<DomainId> = (0..3).map(|_| DomainId::new()).collect();

            for (i, seed) in seeded.iter().enumerate() {
                // Duplicate hashes within one scope are legal rejections.
                let _ = backend
                    .insert_document(document(
                        org_ids[seed.org],
                        domain_ids[seed.domain],
                        &seed.text,
                        i,
                    ))
                    .await;
            }

            for org in &org_ids {
                for domain in &domain_ids {
                    let scope = TenantScope::domain(*org, *domain);
                    for doc in backend.list_documents(&scope).await.unwrap() {
                        prop_assert_eq!(doc.org_id, *org);
                        prop_assert_eq!(doc.domain_id, *domain);
                    }
                }
                // Org-wide listing stays inside the org.
                let scope = TenantScope::org(*org);
                for doc in backend.list_documents(&scope).await.unwrap() {
                    prop_assert_eq!(doc.org_id, *org);
                }
            }
            Ok(())
        })?;
    }

    /// Vector search never returns an entry from another namespace, no
    /// matter which query vector is used.
    #[test]
    fn prop_vector_search_never_crosses_scopes(
        seeded in seeded_strategy(3, 3),
        probe in prop::array::uniform8(-1.0f32..1.0),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(async {
            let store = MemoryVectorStore::new(DIMENSION);
            let org_ids: Vec<OrgId> = (0..3).map(|_| OrgId::new()).collect();
            let domain_ids: Vec<DomainId> = (0..3).map(|_| DomainId::new()).collect();

            // Remember which chunk went where.
            let mut placements: HashMap<ChunkId, (OrgId, DomainId)> = HashMap::new();
            for seed in &seeded {
                let scope = TenantScope::domain(org_ids[seed.org], domain_ids[seed.domain]);
                let entry = VectorEntry {
                    chunk_id: ChunkId::new(),
                    document_id: DocumentId::new(),
                    chunk_index: 0,
                    embedding: seed.vector.to_vec(),
                    text: seed.text.clone(),
                    metadata: HashMap::new(),
                };
                placements.insert(entry.chunk_id, (org_ids[seed.org], domain_ids[seed.domain]));
                store.upsert(&scope, vec![entry]).await.unwrap();
            }

            for org in &org_ids {
                for domain in &domain_ids {
                    let scope = TenantScope::domain(*org, *domain);
                    let hits = store
                        .search(&scope, &VectorQuery::new(probe.to_vec(), 100))
                        .await
                        .unwrap();
                    for hit in hits {
                        prop_assert_eq!(hit.scope, scope);
                        let placed = placements.get(&hit.entry.chunk_id).copied();
                        prop_assert_eq!(placed, Some((*org, *domain)));
                    }
                }
            }
            Ok(())
        })?;
    }
}
