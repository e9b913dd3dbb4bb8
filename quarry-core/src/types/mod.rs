//! Shared data model.
//!
//! These are the records the repositories persist and the pipelines pass
//! around. Trait seams for storing them live in [`crate::traits`].

pub mod chat;
pub mod connector;
pub mod crawl;
pub mod document;
pub mod tenant;
pub mod vector;

pub use chat::{
    ChatMessage, ChatSession, ClassificationRecord, Intent, MessageRole, RagExecution,
    SourceCitation,
};
pub use connector::{ConnectorKind, ConnectorRecord, SyncJob, SyncJobStatus};
pub use crawl::{CrawledPage, PageStatus, QualityMetrics};
pub use document::{ChunkRecord, ProcessingStatus, SourceDocument};
pub use tenant::{
    AccessMode, AiConfig, Domain, OrgMember, Organization, Permission, Role, User,
};
pub use vector::{ScopedStats, VectorEntry, VectorQuery, VectorRecord, VectorStoreStats};
