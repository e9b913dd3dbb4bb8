//! End-to-end query-pipeline tests over the in-memory stack.

use quarry_core::audit::AuditLogger;
use quarry_core::config::{AuthConfig, QueryConfig};
use quarry_core::error::QuarryError;
use quarry_core::ids::{ChunkId, CorrelationId, DocumentId, DomainId, OrgId};
use quarry_core::scope::TenantScope;
use quarry_core::traits::{ChatRepository, DocumentRepository, TenantRepository, VectorStore};
use quarry_core::types::{
    AccessMode, AiConfig, ChunkRecord, Domain, Intent, MessageRole, ProcessingStatus,
    SourceDocument, User, VectorEntry,
};
use quarry_ingest::{
    DeterministicEmbeddingModel, EmbeddingCache, EmbeddingCacheConfig, UsageMeter,
};
use quarry_query::{
    QueryService, ResponseCache, RetrievalEngine, ScriptedChatModel, WorkflowRouter,
};
use quarry_storage::{MemoryBackend, MemoryVectorStore};
use quarry_tenancy::TenantService;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const DIMENSION: usize = 64;

struct World {
    backend: MemoryBackend,
    tenancy: Arc<TenantService>,
    org_id: OrgId,
    domain: Domain,
    user: User,
}

impl World {
    async fn new() -> Self {
        let backend = MemoryBackend::new();
        let audit = AuditLogger::new(Arc::new(backend.clone()));
        let tenancy = Arc::new(TenantService::new(
            Arc::new(backend.clone()),
            audit,
            AuthConfig {
                bcrypt_cost: 4,
                ..AuthConfig::default()
            },
        ));

        let user = tenancy
            .register("user@example.com", "a strong password")
            .await
            .unwrap();
        let org_id = backend.list_memberships(user.id).await.unwrap()[0].org_id;

        let domain = Domain {
            id: DomainId::new(),
            org_id,
            name: "support".to_string(),
            display_name: "Support".to_string(),
            template: "support".to_string(),
            ai_config: AiConfig {
                confidence_threshold: 0.4,
                ..AiConfig::default()
            },
            access_mode: AccessMode::Public,
            settings: HashMap::new(),
            created_at: chrono::Utc::now(),
        };
        backend.create_domain(domain.clone()).await.unwrap();

        Self {
            backend,
            tenancy,
            org_id,
            domain,
            user,
        }
    }

    /// Index a document's text directly into the chunk table and vector
    /// store, bypassing the upload path the ingest crate already tests.
    async fn index_text(&self, vectors: &Arc<MemoryVectorStore>, texts: &[&str]) {
        use quarry_core::traits::EmbeddingModel;
        let model = DeterministicEmbeddingModel::new("local-test", DIMENSION);
        let scope = TenantScope::domain(self.org_id, self.domain.id);

        let document = SourceDocument {
            id: DocumentId::new(),
            org_id: self.org_id,
            domain_id: self.domain.id,
            filename: "kb.txt".to_string(),
            content_type: "text/plain".to_string(),
            size_bytes: 1,
            content_hash: format!("hash-{}", texts.len()),
            status: ProcessingStatus::Ready,
            chunk_count: Some(texts.len()),
            error: None,
            uploaded_by: None,
            uploaded_at: chrono::Utc::now(),
            metadata: HashMap::new(),
        };
        let document_id = document.id;
        self.backend.insert_document(document).await.unwrap();

        let embeddings = model
            .embed(&texts.iter().map(|t| (*t).to_string()).collect::<Vec<_>>())
            .await
            .unwrap();

        let mut chunks = Vec::new();
        let mut entries = Vec::new();
        for (i, (text, embedding)) in texts.iter().zip(embeddings).enumerate() {
            let chunk = ChunkRecord {
                id: ChunkId::new(),
                document_id,
                org_id: self.org_id,
                domain_id: self.domain.id,
                chunk_index: i,
                text: (*text).to_string(),
                embedding: embedding.clone(),
                model_id: "local-test".to_string(),
                content_hash: quarry_core::hash::text_hash(text),
                metadata: HashMap::new(),
            };
            entries.push(VectorEntry {
                chunk_id: chunk.id,
                document_id,
                chunk_index: i,
                embedding,
                text: (*text).to_string(),
                metadata: HashMap::new(),
            });
            chunks.push(chunk);
        }
        self.backend.insert_chunks(chunks).await.unwrap();
        vectors.upsert(&scope, entries).await.unwrap();
    }

    fn service(
        &self,
        vectors: Arc<MemoryVectorStore>,
        llm: Arc<dyn quarry_core::traits::ChatModel>,
        router: WorkflowRouter,
    ) -> QueryService {
        let retrieval = RetrievalEngine::new(
            vectors,
            Arc::new(DeterministicEmbeddingModel::new("local-test", DIMENSION)),
            Arc::new(EmbeddingCache::new(EmbeddingCacheConfig::default())),
            Arc::new(UsageMeter::new()),
            QueryConfig::default(),
        );
        QueryService::new(
            self.tenancy.clone(),
            Arc::new(self.backend.clone()),
            Arc::new(self.backend.clone()),
            retrieval,
            llm,
            Arc::new(ResponseCache::new(Duration::from_secs(60))),
            router,
            QueryConfig::default(),
        )
    }
}

const KB: &[&str] = &[
    "Large file uploads can time out when the upload timeout is set too low. \
     Increase the timeout in the workspace settings to resolve upload failures.",
    "Chunking splits every document into bounded spans that are embedded and indexed \
     for retrieval.",
    "Citations reference the numbered sources that were retrieved for a query.",
];

#[tokio::test]
async fn test_query_answers_with_citations() {
    let world = World::new().await;
    let vectors = Arc::new(MemoryVectorStore::new(DIMENSION));
    world.index_text(&vectors, KB).await;

    let llm = Arc::new(ScriptedChatModel::new(vec![
        "Increase the upload timeout in workspace settings [1].".to_string(),
    ]));
    let service = world.service(vectors, llm, WorkflowRouter::new());

    let answer = service
        .query(
            world.user.id,
            world.org_id,
            world.domain.id,
            "why do my uploads time out",
            None,
            CorrelationId::new(),
        )
        .await
        .unwrap();

    assert!(answer.content.contains("[1]"));
    assert_eq!(answer.citations.len(), 1);
    assert_eq!(answer.citations[0].marker, 1);
    assert!(!answer.llm_failed);
    assert!(answer.confidence > 0.0);

    // The conversation was persisted in order.
    let session_id = answer.session_id.unwrap();
    let messages = world.backend.list_messages(session_id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert!(matches!(messages[0].role, MessageRole::User));
    assert!(matches!(messages[1].role, MessageRole::Assistant));

    // An execution record was written.
    let scope = TenantScope::domain(world.org_id, world.domain.id);
    let executions = world.backend.list_executions(&scope).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert!(!executions[0].llm_failed);
    assert!(!executions[0].retrieved_documents.is_empty());
}

#[tokio::test]
async fn test_hallucinated_citation_is_stripped() {
    let world = World::new().await;
    let vectors = Arc::new(MemoryVectorStore::new(DIMENSION));
    world.index_text(&vectors, KB).await;

    let llm = Arc::new(ScriptedChatModel::new(vec![
        "Uploads time out because of cosmic rays [9].".to_string(),
    ]));
    let service = world.service(vectors, llm, WorkflowRouter::new());

    let answer = service
        .query(
            world.user.id,
            world.org_id,
            world.domain.id,
            "why do my uploads time out",
            None,
            CorrelationId::new(),
        )
        .await
        .unwrap();

    assert!(!answer.content.contains("[9]"));
    assert!(answer.citations.is_empty());
    // Uncited prose caps the confidence and trips the hand-off flag.
    assert!(answer.confidence <= 0.3);
    assert!(answer.handoff);
}

#[tokio::test]
async fn test_llm_failure_degrades_gracefully() {
    let world = World::new().await;
    let vectors = Arc::new(MemoryVectorStore::new(DIMENSION));
    world.index_text(&vectors, KB).await;

    let service = world.service(
        vectors,
        Arc::new(ScriptedChatModel::failing()),
        WorkflowRouter::new(),
    );

    let answer = service
        .query(
            world.user.id,
            world.org_id,
            world.domain.id,
            "why do my uploads time out",
            None,
            CorrelationId::new(),
        )
        .await
        .unwrap();

    assert!(answer.llm_failed);
    assert!(answer.confidence.abs() < f32::EPSILON);
    // The degraded answer lists the retrieved sources.
    assert!(answer.content.contains("upload"));

    let scope = TenantScope::domain(world.org_id, world.domain.id);
    let executions = world.backend.list_executions(&scope).await.unwrap();
    assert!(executions[0].llm_failed);
}

#[tokio::test]
async fn test_empty_retrieval_returns_no_context_answer() {
    let world = World::new().await;
    let vectors = Arc::new(MemoryVectorStore::new(DIMENSION));
    // Nothing indexed.

    let service = world.service(
        vectors,
        Arc::new(ScriptedChatModel::new(Vec::new())),
        WorkflowRouter::new(),
    );

    let answer = service
        .query(
            world.user.id,
            world.org_id,
            world.domain.id,
            "anything at all",
            None,
            CorrelationId::new(),
        )
        .await
        .unwrap();

    assert!(answer.content.contains("could not find"));
    assert!(answer.confidence.abs() < f32::EPSILON);
    assert!(answer.citations.is_empty());
}

#[tokio::test]
async fn test_cache_hit_skips_retrieval_but_updates_session() {
    let world = World::new().await;
    let vectors = Arc::new(MemoryVectorStore::new(DIMENSION));
    world.index_text(&vectors, KB).await;

    let llm = Arc::new(ScriptedChatModel::new(vec![
        "Spans are the unit of retrieval [2].".to_string(),
    ]));
    let service = world.service(vectors, llm, WorkflowRouter::new());

    let first = service
        .query(
            world.user.id,
            world.org_id,
            world.domain.id,
            "what is chunking",
            None,
            CorrelationId::new(),
        )
        .await
        .unwrap();
    assert!(!first.cached);

    // Re-phrased only by case and whitespace: the cache key normalises.
    let second = service
        .query(
            world.user.id,
            world.org_id,
            world.domain.id,
            "  What IS chunking ",
            first.session_id,
            CorrelationId::new(),
        )
        .await
        .unwrap();
    assert!(second.cached);
    assert_eq!(second.content, first.content);

    // Both turns landed in the session.
    let messages = world
        .backend
        .list_messages(first.session_id.unwrap())
        .await
        .unwrap();
    assert_eq!(messages.len(), 4);
}

#[tokio::test]
async fn test_concurrent_chats_never_interleave_their_pairs() {
    let world = World::new().await;
    let vectors = Arc::new(MemoryVectorStore::new(DIMENSION));
    world.index_text(&vectors, KB).await;

    let llm = Arc::new(ScriptedChatModel::new(Vec::new()));
    let service = Arc::new(world.service(vectors, llm, WorkflowRouter::new()));

    let first = service
        .query(
            world.user.id,
            world.org_id,
            world.domain.id,
            "seed the session with chunking facts",
            None,
            CorrelationId::new(),
        )
        .await
        .unwrap();
    let session_id = first.session_id.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = service.clone();
        let (user, org, domain) = (world.user.id, world.org_id, world.domain.id);
        handles.push(tokio::spawn(async move {
            service
                .query(
                    user,
                    org,
                    domain,
                    &format!("concurrent question number {i} about chunking"),
                    Some(session_id),
                    CorrelationId::new(),
                )
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let messages = world.backend.list_messages(session_id).await.unwrap();
    assert_eq!(messages.len(), 18);
    // Pairs must alternate: user, assistant, user, assistant, ...
    for pair in messages.chunks(2) {
        assert!(matches!(pair[0].role, MessageRole::User));
        assert!(matches!(pair[1].role, MessageRole::Assistant));
    }
    let session = world.backend.get_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.message_count, 18);
}

#[tokio::test]
async fn test_foreign_session_reads_as_not_found() {
    let world = World::new().await;
    let vectors = Arc::new(MemoryVectorStore::new(DIMENSION));
    world.index_text(&vectors, KB).await;

    let llm = Arc::new(ScriptedChatModel::new(Vec::new()));
    let service = Arc::new(world.service(vectors.clone(), llm, WorkflowRouter::new()));

    let answer = service
        .query(
            world.user.id,
            world.org_id,
            world.domain.id,
            "open a session",
            None,
            CorrelationId::new(),
        )
        .await
        .unwrap();
    let session_id = answer.session_id.unwrap();

    // A second user in their own org probes the first user's session id.
    let intruder = world
        .tenancy
        .register("intruder@example.com", "a strong password")
        .await
        .unwrap();
    let intruder_org = world.backend.list_memberships(intruder.id).await.unwrap()[0].org_id;
    let intruder_domain = Domain {
        id: DomainId::new(),
        org_id: intruder_org,
        name: "own".to_string(),
        display_name: "Own".to_string(),
        template: "docs".to_string(),
        ai_config: AiConfig::default(),
        access_mode: AccessMode::Public,
        settings: HashMap::new(),
        created_at: chrono::Utc::now(),
    };
    world
        .backend
        .create_domain(intruder_domain.clone())
        .await
        .unwrap();

    let err = service
        .query(
            intruder.id,
            intruder_org,
            intruder_domain.id,
            "continue someone else's chat",
            Some(session_id),
            CorrelationId::new(),
        )
        .await
        .unwrap_err();
    // Existence does not leak: not-found rather than forbidden.
    assert!(matches!(err, QuarryError::NotFound { .. }));
}

#[tokio::test]
async fn test_bug_workflow_end_to_end() {
    use quarry_workflows::{default_router, KnownIssue, KnownIssueStore};

    let world = World::new().await;
    let vectors = Arc::new(MemoryVectorStore::new(DIMENSION));
    world.index_text(&vectors, KB).await;

    let issues = Arc::new(KnownIssueStore::new());
    issues.add(
        world.domain.id,
        KnownIssue {
            title: "file upload timeout".to_string(),
            description: "large file uploads time out after thirty seconds".to_string(),
            resolution: "Increase timeout".to_string(),
        },
    );
    let router = default_router(issues, Arc::new(world.backend.clone()));

    let llm = Arc::new(ScriptedChatModel::new(vec![
        "This matches the known upload timeout issue. Increase the timeout [1].".to_string(),
    ]));
    let service = world.service(vectors, llm, router);

    let answer = service
        .query(
            world.user.id,
            world.org_id,
            world.domain.id,
            "My large uploads time out after 30 seconds",
            None,
            CorrelationId::new(),
        )
        .await
        .unwrap();

    assert_eq!(answer.intent, Intent::BugReport);
    assert!(!answer.citations.is_empty());
    assert_eq!(
        answer.sections.get("matched_known_issue").unwrap(),
        "file upload timeout"
    );
    assert!(answer.sections.get("suggested_steps").unwrap().contains("Increase timeout"));
    assert!(answer.confidence >= 0.5);

    // The classification itself was recorded with a bug_report intent.
    let scope = TenantScope::domain(world.org_id, world.domain.id);
    let executions = world.backend.list_executions(&scope).await.unwrap();
    assert_eq!(executions[0].intent, Intent::BugReport);
}
