//! Chat sessions, messages, and the immutable query-pipeline audit records.

use crate::ids::{ChatSessionId, ChunkId, DocumentId, DomainId, OrgId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Intent category assigned to a user query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Something is broken.
    BugReport,
    /// A request for new capability.
    FeatureRequest,
    /// A how-to or procedural question.
    Training,
    /// Everything else.
    GeneralQuery,
    /// Domain-specific extension category.
    Custom(String),
}

impl Intent {
    /// Stable string form used in cache keys and persisted records.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::BugReport => "bug_report",
            Self::FeatureRequest => "feature_request",
            Self::Training => "training",
            Self::GeneralQuery => "general_query",
            Self::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// End user.
    User,
    /// Synthesised answer.
    Assistant,
    /// Injected system notice.
    System,
}

/// A back-reference from an answer to the retrieval source justifying it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    /// 1-based marker number as it appears in the answer text.
    pub marker: usize,
    /// Cited document.
    pub document_id: DocumentId,
    /// Cited chunk.
    pub chunk_id: ChunkId,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
    /// Similarity score the chunk was retrieved with.
    pub score: f32,
    /// Short excerpt for display.
    pub snippet: String,
}

/// One conversation between a user and a domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    /// Unique id.
    pub id: ChatSessionId,
    /// Owning org.
    pub org_id: OrgId,
    /// Domain the conversation draws from.
    pub domain_id: DomainId,
    /// Owning user.
    pub user_id: UserId,
    /// Display title.
    pub title: String,
    /// Closed sessions refuse appends.
    pub active: bool,
    /// Count of persisted messages, updated with every append.
    pub message_count: usize,
    /// Timestamp of the latest append.
    pub last_activity: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Append-only message inside a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Session this belongs to.
    pub session_id: ChatSessionId,
    /// Zero-based append position; the persisted order is the total order.
    pub sequence: usize,
    /// Author.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// Classified intent, for user messages.
    pub intent: Option<Intent>,
    /// Classifier or answer confidence.
    pub confidence: Option<f32>,
    /// Citations, for assistant messages.
    pub citations: Vec<SourceCitation>,
    /// Append timestamp.
    pub created_at: DateTime<Utc>,
}

/// Immutable record of one intent classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRecord {
    /// Scope the query ran under.
    pub org_id: OrgId,
    /// Scope the query ran under.
    pub domain_id: DomainId,
    /// Raw query text.
    pub query: String,
    /// Assigned intent.
    pub intent: Intent,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Why the classifier chose this intent.
    pub reasoning: String,
    /// When the classification ran.
    pub created_at: DateTime<Utc>,
}

/// Immutable record of one full query-pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagExecution {
    /// Scope the query ran under.
    pub org_id: OrgId,
    /// Scope the query ran under.
    pub domain_id: DomainId,
    /// Session the answer was appended to, if any.
    pub session_id: Option<ChatSessionId>,
    /// Raw query text.
    pub query: String,
    /// Assigned intent.
    pub intent: Intent,
    /// Documents whose chunks were retrieved.
    pub retrieved_documents: Vec<DocumentId>,
    /// Final answer text.
    pub response: String,
    /// Answer confidence.
    pub confidence: f32,
    /// Whether the answer came from the response cache.
    pub cache_hit: bool,
    /// Whether synthesis failed and the answer was degraded.
    pub llm_failed: bool,
    /// Retrieval wall time.
    pub retrieval_ms: u64,
    /// Synthesis wall time.
    pub synthesis_ms: u64,
    /// End-to-end wall time.
    pub total_ms: u64,
    /// When the execution finished.
    pub created_at: DateTime<Utc>,
}
