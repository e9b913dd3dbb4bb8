//! # quarry-ingest
//!
//! Turns opaque uploads into searchable chunks: magic-byte content
//! detection, per-format extractors, token-aware chunking, cached
//! embedding generation, and the at-least-once background pipeline that
//! writes chunks to the relational store and vectors to the index.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

/// Token-aware document chunking.
pub mod chunking;

/// Magic-byte content-type detection.
pub mod detect;

/// Embedding providers and the content-addressed cache.
pub mod embedding;

/// Per-format text extraction.
pub mod extract;

/// The ingestion pipeline.
pub mod pipeline;

/// Bounded ingestion job queue.
pub mod queue;

/// Per-org usage metering.
pub mod usage;

pub use chunking::{Chunk, ChunkingConfig, TextChunker};
pub use detect::ContentKind;
pub use embedding::{
    build_model, embed_cached, DeterministicEmbeddingModel, EmbeddingCache,
    EmbeddingCacheConfig, EmbeddingProviderConfig, EmbeddingProviderKind, HttpEmbeddingModel,
};
pub use extract::Extracted;
pub use pipeline::{CacheInvalidation, IngestionService, NoopInvalidation};
pub use queue::{IngestJob, IngestQueue};
pub use usage::{OrgUsage, UsageMeter};
