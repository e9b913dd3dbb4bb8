//! # quarry-core
//!
//! Shared foundation for the quarry workspace: typed identifiers, the
//! tenant scope every operation is filtered by, the workspace-wide error
//! taxonomy, service configuration, audit logging, and the trait seams the
//! pipelines are wired through.
//!
//! Components never reach for module-level state; configuration and
//! collaborators are created once at process init and passed down by
//! explicit reference.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

/// Audit events and the fan-in logger.
pub mod audit;

/// Environment-driven service configuration.
pub mod config;

/// Workspace-wide error taxonomy.
pub mod error;

/// Content hashing helpers.
pub mod hash;

/// Strongly-typed identifiers.
pub mod ids;

/// Per-principal request rate limiting.
pub mod ratelimit;

/// Tenant scoping.
pub mod scope;

/// Trait seams for storage, vectors, blobs, and model providers.
pub mod traits;

/// Shared data model.
pub mod types;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::audit::{AuditEvent, AuditLogger, AuditRecord};
    pub use crate::config::ServiceConfig;
    pub use crate::error::{ExternalService, QuarryError, Result};
    pub use crate::hash::{content_hash, text_hash};
    pub use crate::ids::{
        AuthSessionId, ChatSessionId, ChunkId, ConnectorId, CorrelationId, DocumentId, DomainId,
        OrgId, SyncJobId, UserId,
    };
    pub use crate::ratelimit::{RateLimitConfig, RateLimiter};
    pub use crate::scope::TenantScope;
    pub use crate::traits::{
        AuditRepository, BlobStore, ChatModel, ChatRepository, ChatRequest, ChatTurn,
        ConnectorRepository, DocumentRepository, EmbeddingModel, PresignedUrl, TenantRepository,
        VectorDeleteFilter, VectorStore,
    };
    pub use crate::types::*;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
