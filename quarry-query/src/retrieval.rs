//! Query-time retrieval and context selection.

use quarry_core::config::QueryConfig;
use quarry_core::error::Result;
use quarry_core::ids::{ChunkId, DocumentId};
use quarry_core::scope::TenantScope;
use quarry_core::traits::{EmbeddingModel, VectorStore};
use quarry_core::types::VectorQuery;
use quarry_ingest::{embed_cached, EmbeddingCache, UsageMeter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One retrieved chunk, possibly a merged run of adjacent chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Source document.
    pub document_id: DocumentId,
    /// Representative chunk id (the first of a merged run).
    pub chunk_id: ChunkId,
    /// Chunk index of the run's start.
    pub chunk_index: usize,
    /// Chunk text; merged runs are joined in document order.
    pub text: String,
    /// Best similarity score in the run.
    pub score: f32,
}

/// Embeds queries and searches the tenant's namespace.
pub struct RetrievalEngine {
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingModel>,
    embedding_cache: Arc<EmbeddingCache>,
    usage: Arc<UsageMeter>,
    config: QueryConfig,
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetrievalEngine {
    /// Wire the engine.
    #[must_use]
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingModel>,
        embedding_cache: Arc<EmbeddingCache>,
        usage: Arc<UsageMeter>,
        config: QueryConfig,
    ) -> Self {
        Self {
            vectors,
            embedder,
            embedding_cache,
            usage,
            config,
        }
    }

    /// Retrieve the best chunks for a query: embed, search `k_retrieve`,
    /// apply the confidence floor, and widen k once if too few survive.
    ///
    /// # Errors
    ///
    /// Embedding and store failures propagate.
    pub async fn retrieve(&self, scope: &TenantScope, query: &str) -> Result<Vec<RetrievedChunk>> {
        let embeddings = embed_cached(
            &self.embedder,
            &self.embedding_cache,
            &[query.to_string()],
            1,
        )
        .await?;
        let Some(query_vector) = embeddings.into_iter().next() else {
            return Ok(Vec::new());
        };

        let mut hits = self
            .vectors
            .search(
                scope,
                &VectorQuery::new(query_vector.clone(), self.config.k_retrieve)
                    .with_min_score(self.config.min_confidence),
            )
            .await?;

        if hits.len() < self.config.widen_below {
            // One widening pass; the floor still applies.
            let widened = self
                .vectors
                .search(
                    scope,
                    &VectorQuery::new(query_vector, self.config.k_retrieve * 2)
                        .with_min_score(self.config.min_confidence),
                )
                .await?;
            if widened.len() > hits.len() {
                debug!(
                    narrow = hits.len(),
                    widened = widened.len(),
                    "widened retrieval"
                );
                hits = widened;
            }
        }

        self.usage.add_search(scope.org_id);

        Ok(hits
            .into_iter()
            .map(|hit| RetrievedChunk {
                document_id: hit.entry.document_id,
                chunk_id: hit.entry.chunk_id,
                chunk_index: hit.entry.chunk_index,
                text: hit.entry.text,
                score: hit.score,
            })
            .collect())
    }

    /// Retrieval configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &QueryConfig {
        &self.config
    }
}

/// Group adjacent chunks of the same document into merged runs, keeping
/// the run's best score, then order runs by score.
#[must_use]
pub fn group_adjacent(mut chunks: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
    chunks.sort_by(|a, b| {
        a.document_id
            .cmp(&b.document_id)
            .then(a.chunk_index.cmp(&b.chunk_index))
    });

    struct Run {
        chunk: RetrievedChunk,
        next_index: usize,
    }

    let mut runs: Vec<Run> = Vec::new();
    for chunk in chunks {
        match runs.last_mut() {
            Some(run)
                if run.chunk.document_id == chunk.document_id
                    && chunk.chunk_index == run.next_index =>
            {
                run.chunk.text.push('\n');
                run.chunk.text.push_str(&chunk.text);
                run.chunk.score = run.chunk.score.max(chunk.score);
                run.next_index += 1;
            }
            _ => {
                let next_index = chunk.chunk_index + 1;
                runs.push(Run { chunk, next_index });
            }
        }
    }

    let mut runs: Vec<RetrievedChunk> = runs.into_iter().map(|r| r.chunk).collect();
    runs.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    runs
}

/// Take the highest-scoring runs that fit a token budget, estimating four
/// characters per token.
#[must_use]
pub fn fit_to_budget(runs: Vec<RetrievedChunk>, budget_tokens: usize) -> Vec<RetrievedChunk> {
    let budget_chars = budget_tokens.saturating_mul(4);
    let mut used = 0;
    let mut selected = Vec::new();
    for run in runs {
        let cost = run.text.len();
        if used + cost > budget_chars && !selected.is_empty() {
            continue;
        }
        used += cost;
        selected.push(run);
    }
    selected
}
