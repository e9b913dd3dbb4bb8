//! # quarry-storage
//!
//! Backends for the trait seams declared in `quarry-core`: an in-memory
//! relational backend implementing every repository trait on one shared
//! table set, the per-(org, domain) vector index with snapshot persistence,
//! and blob stores for original uploads.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

/// Blob-store backends.
pub mod blob;

/// In-memory repository backend.
pub mod memory;

/// Startup recovery for the vector index.
pub mod recovery;

/// In-process vector index.
pub mod vector;

pub use blob::{FsBlobStore, MemoryBlobStore};
pub use memory::MemoryBackend;
pub use recovery::{rebuild_namespace, restore_vector_store};
pub use vector::{HybridWeights, MemoryVectorStore};
