//! The answer shape returned by the query pipeline.

use quarry_core::ids::{ChatSessionId, CorrelationId};
use quarry_core::types::{Intent, SourceCitation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A fully assembled answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnswer {
    /// Answer text with citation markers.
    pub content: String,
    /// Classified intent of the originating query.
    pub intent: Intent,
    /// Answer confidence in [0, 1].
    pub confidence: f32,
    /// Citations backing the answer, one per marker.
    pub citations: Vec<SourceCitation>,
    /// Structured sections added by a workflow, e.g. probable cause and
    /// suggested steps for a bug report.
    pub sections: BTreeMap<String, String>,
    /// Set when confidence fell below the domain's threshold; the caller
    /// surfaces this, it is never a silent fallback.
    pub handoff: bool,
    /// Synthesis failed and this is a degraded answer listing sources.
    pub llm_failed: bool,
    /// Served from the response cache.
    pub cached: bool,
    /// Session the answer was appended to.
    pub session_id: Option<ChatSessionId>,
    /// Correlation id for support and audit lookups.
    pub correlation_id: CorrelationId,
}

impl Default for QueryAnswer {
    fn default() -> Self {
        Self {
            content: String::new(),
            intent: Intent::GeneralQuery,
            confidence: 0.0,
            citations: Vec::new(),
            sections: BTreeMap::new(),
            handoff: false,
            llm_failed: false,
            cached: false,
            session_id: None,
            correlation_id: CorrelationId::new(),
        }
    }
}
