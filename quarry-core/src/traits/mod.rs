//! Trait seams between the core pipelines and their collaborators.
//!
//! Repositories abstract the relational store, [`VectorStore`] the search
//! index, [`BlobStore`] the object store, and the model traits the remote
//! embedding and chat providers. Backends live in `quarry-storage`;
//! provider clients live beside the pipelines that use them.

pub mod blob;
pub mod embedding;
pub mod llm;
pub mod repository;
pub mod vector;

pub use blob::{BlobStore, PresignedUrl};
pub use embedding::EmbeddingModel;
pub use llm::{ChatModel, ChatRequest, ChatTurn};
pub use repository::{
    AuditRepository, ChatRepository, ConnectorRepository, DocumentRepository, TenantRepository,
};
pub use vector::{VectorDeleteFilter, VectorStore};
