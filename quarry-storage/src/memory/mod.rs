//! In-memory repository backend.
//!
//! One [`MemoryBackend`] implements every repository trait over a shared
//! set of tables, so cascades (org -> domain -> document -> chunk) stay in
//! one place. Mutations that must be atomic hold the owning entry's lock
//! for the whole update; chat appends serialise on a per-session mutex.

mod audit;
mod chat;
mod connector;
mod document;
mod tenant;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use quarry_core::audit::AuditRecord;
use quarry_core::ids::{
    ChatSessionId, ConnectorId, DocumentId, DomainId, OrgId, SyncJobId, UserId,
};
use quarry_core::types::{
    ChatMessage, ChatSession, ChunkRecord, ClassificationRecord, ConnectorRecord, CrawledPage,
    Domain, OrgMember, Organization, RagExecution, Role, SourceDocument, SyncJob, User,
};
use std::sync::Arc;

/// A chat session together with its messages, guarded as one unit so the
/// append order, `message_count`, and `last_activity` can never drift.
#[derive(Debug)]
pub(crate) struct SessionSlot {
    pub(crate) session: ChatSession,
    pub(crate) messages: Vec<ChatMessage>,
}

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub(crate) orgs: DashMap<OrgId, Organization>,
    pub(crate) users: DashMap<UserId, User>,
    pub(crate) members: DashMap<(OrgId, UserId), OrgMember>,
    pub(crate) roles: DashMap<(OrgId, String), Role>,
    pub(crate) domains: DashMap<DomainId, Domain>,
    pub(crate) documents: DashMap<DocumentId, SourceDocument>,
    pub(crate) chunks: DashMap<DocumentId, Vec<ChunkRecord>>,
    pub(crate) sessions: DashMap<ChatSessionId, Mutex<SessionSlot>>,
    pub(crate) classifications: RwLock<Vec<ClassificationRecord>>,
    pub(crate) executions: RwLock<Vec<RagExecution>>,
    pub(crate) connectors: DashMap<ConnectorId, ConnectorRecord>,
    pub(crate) sync_jobs: DashMap<SyncJobId, SyncJob>,
    pub(crate) crawled_pages: DashMap<(ConnectorId, String), CrawledPage>,
    pub(crate) audit: RwLock<Vec<AuditRecord>>,
}

/// In-memory backend implementing every repository trait.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    pub(crate) tables: Arc<Tables>,
}

impl MemoryBackend {
    /// Empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
