//! # quarry-query
//!
//! The query side of quarry: intent classification, a tenant-keyed
//! response cache, vector retrieval with context selection, LLM synthesis
//! with validated citations, and the per-session conversation persistence
//! behind it all. Intent-specific behaviour plugs in through the
//! [`workflow::Workflow`] seam.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

/// Answer shape.
pub mod answer;

/// Tenant-keyed response cache.
pub mod cache;

/// Citation rendering and validation.
pub mod citations;

/// Intent classification.
pub mod intent;

/// Chat-completion clients.
pub mod llm;

/// The query pipeline.
pub mod pipeline;

/// Retrieval and context selection.
pub mod retrieval;

/// Workflow seam.
pub mod workflow;

pub use answer::QueryAnswer;
pub use cache::{normalise_query, ResponseCache};
pub use citations::{source_block, validate, CitedAnswer};
pub use intent::{Classification, IntentClassifier};
pub use llm::{HttpChatModel, ScriptedChatModel};
pub use pipeline::QueryService;
pub use retrieval::{fit_to_budget, group_adjacent, RetrievalEngine, RetrievedChunk};
pub use workflow::{PromptShape, Workflow, WorkflowInput, WorkflowRouter};
