//! Repository traits over the relational store.
//!
//! Every method that reads or writes tenant data takes either a
//! [`TenantScope`] or an id whose row carries the tenant columns; backends
//! must filter on them. Methods documented as atomic must apply their whole
//! mutation under one lock or transaction.

use crate::audit::AuditRecord;
use crate::error::Result;
use crate::ids::{
    ChatSessionId, ConnectorId, DocumentId, DomainId, OrgId, SyncJobId, UserId,
};
use crate::scope::TenantScope;
use crate::types::{
    ChatMessage, ChatSession, ChunkRecord, ClassificationRecord, ConnectorRecord, CrawledPage,
    Domain, OrgMember, Organization, RagExecution, Role, SourceDocument, SyncJob, User,
};
use async_trait::async_trait;

/// Organisations, users, memberships, roles, and domains.
#[async_trait]
pub trait TenantRepository: Send + Sync {
    /// Insert a new organisation. Fails with `Conflict` on a slug collision.
    async fn create_org(&self, org: Organization) -> Result<()>;

    /// Fetch an organisation by id.
    async fn get_org(&self, id: OrgId) -> Result<Option<Organization>>;

    /// Fetch an organisation by slug.
    async fn get_org_by_slug(&self, slug: &str) -> Result<Option<Organization>>;

    /// Every organisation. Admin and startup-recovery use only.
    async fn list_orgs(&self) -> Result<Vec<Organization>>;

    /// Delete an organisation. Backends cascade to domains and all their
    /// data.
    async fn delete_org(&self, id: OrgId) -> Result<()>;

    /// Insert a new user. Fails with `Conflict` on an email collision.
    async fn create_user(&self, user: User) -> Result<()>;

    /// Fetch a user by id.
    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// Fetch a user by login email.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Insert or replace a membership.
    async fn upsert_member(&self, member: OrgMember) -> Result<()>;

    /// Fetch one membership.
    async fn get_member(&self, org_id: OrgId, user_id: UserId) -> Result<Option<OrgMember>>;

    /// All memberships of a user.
    async fn list_memberships(&self, user_id: UserId) -> Result<Vec<OrgMember>>;

    /// Insert or replace a role definition within an org.
    async fn upsert_role(&self, org_id: OrgId, role: Role) -> Result<()>;

    /// Fetch a role definition.
    async fn get_role(&self, org_id: OrgId, name: &str) -> Result<Option<Role>>;

    /// Insert a new domain. Fails with `Conflict` when the (org, name) pair
    /// already exists.
    async fn create_domain(&self, domain: Domain) -> Result<()>;

    /// Fetch a domain by id.
    async fn get_domain(&self, id: DomainId) -> Result<Option<Domain>>;

    /// Fetch a domain by (org, name).
    async fn get_domain_by_name(&self, org_id: OrgId, name: &str) -> Result<Option<Domain>>;

    /// All domains of an org.
    async fn list_domains(&self, org_id: OrgId) -> Result<Vec<Domain>>;

    /// Replace a domain's mutable fields.
    async fn update_domain(&self, domain: Domain) -> Result<()>;

    /// Delete a domain. Backends cascade to its documents, chunks, pages,
    /// and sessions.
    async fn delete_domain(&self, id: DomainId) -> Result<()>;
}

/// Source documents and their chunks.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a document row. Fails with `DuplicateHash` when the scope
    /// already holds the content hash.
    async fn insert_document(&self, document: SourceDocument) -> Result<()>;

    /// Fetch a document by id.
    async fn get_document(&self, id: DocumentId) -> Result<Option<SourceDocument>>;

    /// Find a document by content hash within a scope.
    async fn get_by_hash(
        &self,
        scope: &TenantScope,
        content_hash: &str,
    ) -> Result<Option<SourceDocument>>;

    /// Documents in a scope, newest first.
    async fn list_documents(&self, scope: &TenantScope) -> Result<Vec<SourceDocument>>;

    /// Move a document to `Processing`.
    async fn mark_processing(&self, id: DocumentId) -> Result<()>;

    /// Atomically set status `Ready` and the final chunk count.
    async fn finalize_document(&self, id: DocumentId, chunk_count: usize) -> Result<()>;

    /// Atomically set status `Failed` with a reason.
    async fn fail_document(&self, id: DocumentId, error: &str) -> Result<()>;

    /// Merge keys into a document's metadata map.
    async fn merge_metadata(
        &self,
        id: DocumentId,
        metadata: std::collections::HashMap<String, serde_json::Value>,
    ) -> Result<()>;

    /// Delete a document and its chunks.
    async fn delete_document(&self, id: DocumentId) -> Result<()>;

    /// Insert chunks, skipping any whose `(document_id, chunk_index)`
    /// already exists. Returns the number actually inserted.
    async fn insert_chunks(&self, chunks: Vec<ChunkRecord>) -> Result<usize>;

    /// Chunks of a document ordered by `chunk_index`.
    async fn list_chunks(&self, document_id: DocumentId) -> Result<Vec<ChunkRecord>>;

    /// All chunks in a scope. Used for index rebuilds.
    async fn list_chunks_in_scope(&self, scope: &TenantScope) -> Result<Vec<ChunkRecord>>;
}

/// Chat sessions, messages, and query-pipeline audit records.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Insert a session.
    async fn create_session(&self, session: ChatSession) -> Result<()>;

    /// Fetch a session by id.
    async fn get_session(&self, id: ChatSessionId) -> Result<Option<ChatSession>>;

    /// Sessions of a user in a scope, most recently active first.
    async fn list_sessions(
        &self,
        scope: &TenantScope,
        user_id: UserId,
    ) -> Result<Vec<ChatSession>>;

    /// Append a message. Atomic with the session's `message_count` and
    /// `last_activity` update; the backend serialises concurrent appends to
    /// one session and assigns the sequence number. Fails with `Conflict`
    /// when the session is closed.
    async fn append_message(
        &self,
        session_id: ChatSessionId,
        message: ChatMessage,
    ) -> Result<ChatMessage>;

    /// Messages of a session in append order.
    async fn list_messages(&self, session_id: ChatSessionId) -> Result<Vec<ChatMessage>>;

    /// Mark a session inactive.
    async fn close_session(&self, id: ChatSessionId) -> Result<()>;

    /// Persist a classification record.
    async fn record_classification(&self, record: ClassificationRecord) -> Result<()>;

    /// Persist an execution record.
    async fn record_execution(&self, record: RagExecution) -> Result<()>;

    /// Execution records for a scope, newest first.
    async fn list_executions(&self, scope: &TenantScope) -> Result<Vec<RagExecution>>;
}

/// Connectors, sync jobs, and crawled pages.
#[async_trait]
pub trait ConnectorRepository: Send + Sync {
    /// Insert a connector.
    async fn create_connector(&self, connector: ConnectorRecord) -> Result<()>;

    /// Fetch a connector by id.
    async fn get_connector(&self, id: ConnectorId) -> Result<Option<ConnectorRecord>>;

    /// Connectors of a domain.
    async fn list_connectors(&self, domain_id: DomainId) -> Result<Vec<ConnectorRecord>>;

    /// Replace a connector's mutable fields.
    async fn update_connector(&self, connector: ConnectorRecord) -> Result<()>;

    /// Delete a connector and its jobs and pages.
    async fn delete_connector(&self, id: ConnectorId) -> Result<()>;

    /// Insert a sync job.
    async fn insert_sync_job(&self, job: SyncJob) -> Result<()>;

    /// Replace a sync job.
    async fn update_sync_job(&self, job: SyncJob) -> Result<()>;

    /// Fetch a sync job.
    async fn get_sync_job(&self, id: SyncJobId) -> Result<Option<SyncJob>>;

    /// Jobs of a connector, newest first.
    async fn list_sync_jobs(&self, connector_id: ConnectorId) -> Result<Vec<SyncJob>>;

    /// Insert or replace a crawled-page record keyed by (connector, url).
    async fn upsert_crawled_page(&self, page: CrawledPage) -> Result<()>;

    /// Pages of a connector.
    async fn list_crawled_pages(&self, connector_id: ConnectorId) -> Result<Vec<CrawledPage>>;

    /// Find a page by main-content hash under a connector.
    async fn get_page_by_hash(
        &self,
        connector_id: ConnectorId,
        content_hash: &str,
    ) -> Result<Option<CrawledPage>>;
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Append one record.
    async fn append(&self, record: AuditRecord) -> Result<()>;

    /// Recent records for an org, newest first, bounded by `limit`.
    async fn list_recent(&self, org_id: Option<OrgId>, limit: usize) -> Result<Vec<AuditRecord>>;
}
