//! Vector-store value types.
//!
//! The store itself lives behind [`crate::traits::VectorStore`]; these are
//! the entries, queries, and statistics that cross that seam.

use crate::ids::{ChunkId, DocumentId};
use crate::scope::TenantScope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A vector plus the payload returned with search hits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorEntry {
    /// Chunk this vector embeds.
    pub chunk_id: ChunkId,
    /// Owning document.
    pub document_id: DocumentId,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
    /// Embedding, normalised on insert.
    pub embedding: Vec<f32>,
    /// Chunk text carried for snippet rendering and keyword scoring.
    pub text: String,
    /// Free-form payload metadata.
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Parameters for a similarity search.
#[derive(Debug, Clone)]
pub struct VectorQuery {
    /// Query embedding.
    pub vector: Vec<f32>,
    /// Number of hits to return.
    pub k: usize,
    /// Minimum cosine similarity; hits below are dropped.
    pub min_score: Option<f32>,
    /// Optional metadata equality filters.
    pub filter: Option<HashMap<String, serde_json::Value>>,
    /// Optional keyword predicate for hybrid scoring.
    pub keywords: Option<Vec<String>>,
}

impl VectorQuery {
    /// A plain top-k query.
    #[must_use]
    pub const fn new(vector: Vec<f32>, k: usize) -> Self {
        Self {
            vector,
            k,
            min_score: None,
            filter: None,
            keywords: None,
        }
    }

    /// Set the similarity floor.
    #[must_use]
    pub const fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Add metadata equality filters.
    #[must_use]
    pub fn with_filter(mut self, filter: HashMap<String, serde_json::Value>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Enable hybrid keyword blending.
    #[must_use]
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = Some(keywords);
        self
    }
}

/// One search hit: the payload and its similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Scope the hit came from; always equals the query scope.
    pub scope: TenantScope,
    /// The stored entry.
    pub entry: VectorEntry,
    /// Blended score when hybrid mode is on, cosine similarity otherwise.
    pub score: f32,
}

/// Per-scope statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopedStats {
    /// Scope described.
    pub scope: TenantScope,
    /// Vectors stored under the scope.
    pub vector_count: usize,
    /// Embedding dimension.
    pub dimension: usize,
    /// Last write timestamp, if any write happened.
    pub last_updated: Option<DateTime<Utc>>,
}

/// Store-wide statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorStoreStats {
    /// Total vectors across all namespaces.
    pub total_vectors: usize,
    /// Number of (org, domain) namespaces.
    pub namespace_count: usize,
    /// Embedding dimension the store enforces.
    pub dimension: usize,
}
