//! Document and chunk tables.

use super::MemoryBackend;
use async_trait::async_trait;
use quarry_core::error::{QuarryError, Result};
use quarry_core::ids::DocumentId;
use quarry_core::scope::TenantScope;
use quarry_core::traits::DocumentRepository;
use quarry_core::types::{ChunkRecord, ProcessingStatus, SourceDocument};

fn in_scope(document: &SourceDocument, scope: &TenantScope) -> bool {
    document.org_id == scope.org_id
        && scope
            .domain_id
            .is_none_or(|domain| document.domain_id == domain)
}

#[async_trait]
impl DocumentRepository for MemoryBackend {
    async fn insert_document(&self, document: SourceDocument) -> Result<()> {
        let scope = TenantScope::domain(document.org_id, document.domain_id);
        if let Some(existing) = self
            .tables
            .documents
            .iter()
            .find(|d| in_scope(d, &scope) && d.content_hash == document.content_hash)
        {
            return Err(QuarryError::DuplicateHash {
                hash: document.content_hash,
                existing_id: existing.id.to_string(),
            });
        }
        self.tables.documents.insert(document.id, document);
        Ok(())
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<SourceDocument>> {
        Ok(self.tables.documents.get(&id).map(|d| d.clone()))
    }

    async fn get_by_hash(
        &self,
        scope: &TenantScope,
        content_hash: &str,
    ) -> Result<Option<SourceDocument>> {
        Ok(self
            .tables
            .documents
            .iter()
            .find(|d| in_scope(d, scope) && d.content_hash == content_hash)
            .map(|d| d.clone()))
    }

    async fn list_documents(&self, scope: &TenantScope) -> Result<Vec<SourceDocument>> {
        let mut documents: Vec<SourceDocument> = self
            .tables
            .documents
            .iter()
            .filter(|d| in_scope(d, scope))
            .map(|d| d.clone())
            .collect();
        documents.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(documents)
    }

    async fn mark_processing(&self, id: DocumentId) -> Result<()> {
        let mut document = self
            .tables
            .documents
            .get_mut(&id)
            .ok_or_else(|| QuarryError::not_found("document"))?;
        document.status = ProcessingStatus::Processing;
        Ok(())
    }

    async fn finalize_document(&self, id: DocumentId, chunk_count: usize) -> Result<()> {
        let mut document = self
            .tables
            .documents
            .get_mut(&id)
            .ok_or_else(|| QuarryError::not_found("document"))?;
        document.status = ProcessingStatus::Ready;
        document.chunk_count = Some(chunk_count);
        document.error = None;
        Ok(())
    }

    async fn fail_document(&self, id: DocumentId, error: &str) -> Result<()> {
        let mut document = self
            .tables
            .documents
            .get_mut(&id)
            .ok_or_else(|| QuarryError::not_found("document"))?;
        document.status = ProcessingStatus::Failed;
        document.error = Some(error.to_string());
        Ok(())
    }

    async fn merge_metadata(
        &self,
        id: DocumentId,
        metadata: std::collections::HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let mut document = self
            .tables
            .documents
            .get_mut(&id)
            .ok_or_else(|| QuarryError::not_found("document"))?;
        document.metadata.extend(metadata);
        Ok(())
    }

    async fn delete_document(&self, id: DocumentId) -> Result<()> {
        self.tables.documents.remove(&id);
        self.tables.chunks.remove(&id);
        Ok(())
    }

    async fn insert_chunks(&self, chunks: Vec<ChunkRecord>) -> Result<usize> {
        let mut inserted = 0;
        for chunk in chunks {
            let mut slot = self.tables.chunks.entry(chunk.document_id).or_default();
            // Restart safety: (document_id, chunk_index) is the composite
            // key; an existing chunk is left untouched.
            if slot.iter().any(|c| c.chunk_index == chunk.chunk_index) {
                continue;
            }
            slot.push(chunk);
            slot.sort_by_key(|c| c.chunk_index);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn list_chunks(&self, document_id: DocumentId) -> Result<Vec<ChunkRecord>> {
        Ok(self
            .tables
            .chunks
            .get(&document_id)
            .map(|slot| slot.clone())
            .unwrap_or_default())
    }

    async fn list_chunks_in_scope(&self, scope: &TenantScope) -> Result<Vec<ChunkRecord>> {
        let mut out = Vec::new();
        for slot in &self.tables.chunks {
            for chunk in slot.value() {
                let chunk_scope = TenantScope::domain(chunk.org_id, chunk.domain_id);
                if scope.contains(&chunk_scope) {
                    out.push(chunk.clone());
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quarry_core::ids::{ChunkId, DomainId, OrgId};
    use std::collections::HashMap;

    fn document(org_id: OrgId, domain_id: DomainId, hash: &str) -> SourceDocument {
        SourceDocument {
            id: DocumentId::new(),
            org_id,
            domain_id,
            filename: "notes.txt".to_string(),
            content_type: "text/plain".to_string(),
            size_bytes: 10,
            content_hash: hash.to_string(),
            status: ProcessingStatus::Pending,
            chunk_count: None,
            error: None,
            uploaded_by: None,
            uploaded_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    fn chunk(document_id: DocumentId, org_id: OrgId, domain_id: DomainId, index: usize) -> ChunkRecord {
        ChunkRecord {
            id: ChunkId::new(),
            document_id,
            org_id,
            domain_id,
            chunk_index: index,
            text: format!("chunk {index}"),
            embedding: vec![0.0; 3],
            model_id: "test".to_string(),
            content_hash: format!("hash-{index}"),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_hash_rejected_within_scope() {
        let backend = MemoryBackend::new();
        let org = OrgId::new();
        let domain = DomainId::new();

        let first = document(org, domain, "abc");
        backend.insert_document(first.clone()).await.unwrap();

        let err = backend
            .insert_document(document(org, domain, "abc"))
            .await
            .unwrap_err();
        match err {
            QuarryError::DuplicateHash { existing_id, .. } => {
                assert_eq!(existing_id, first.id.to_string());
            }
            other => panic!("expected DuplicateHash, got {other:?}"),
        }

        // Same hash in another domain is a different scope.
        backend
            .insert_document(document(org, DomainId::new(), "abc"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_chunk_insert_is_idempotent() {
        let backend = MemoryBackend::new();
        let org = OrgId::new();
        let domain = DomainId::new();
        let doc = document(org, domain, "abc");
        let doc_id = doc.id;
        backend.insert_document(doc).await.unwrap();

        let inserted = backend
            .insert_chunks(vec![
                chunk(doc_id, org, domain, 0),
                chunk(doc_id, org, domain, 1),
            ])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        // A restarted worker re-sends chunk 1 plus a new chunk 2.
        let inserted = backend
            .insert_chunks(vec![
                chunk(doc_id, org, domain, 1),
                chunk(doc_id, org, domain, 2),
            ])
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let chunks = backend.list_chunks(doc_id).await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.windows(2).all(|w| w[0].chunk_index < w[1].chunk_index));
    }
}
