//! Workflow seam.
//!
//! A workflow overlays intent-specific prompt shaping and post-processing
//! on the shared retrieve-and-synthesise flow. Implementations live in
//! `quarry-workflows`; the pipeline falls back to pass-through when no
//! workflow is registered for an intent.

use crate::answer::QueryAnswer;
use crate::retrieval::RetrievedChunk;
use async_trait::async_trait;
use quarry_core::types::{Domain, Intent};
use std::collections::HashMap;
use std::sync::Arc;

/// What a workflow sees about the request.
#[derive(Debug)]
pub struct WorkflowInput<'a> {
    /// Raw user query.
    pub query: &'a str,
    /// Classified intent.
    pub intent: &'a Intent,
    /// Domain configuration.
    pub domain: &'a Domain,
    /// Selected retrieval context.
    pub chunks: &'a [RetrievedChunk],
}

/// Prompt adjustments contributed by a workflow.
#[derive(Debug, Clone, Default)]
pub struct PromptShape {
    /// Extra system-prompt paragraph prepended before the sources.
    pub preamble: Option<String>,
}

/// Intent-specialised response shaping.
#[async_trait]
pub trait Workflow: Send + Sync {
    /// Intent this workflow handles.
    fn intent(&self) -> Intent;

    /// Shape the synthesis prompt. Default: no adjustment.
    async fn shape_prompt(&self, _input: &WorkflowInput<'_>) -> PromptShape {
        PromptShape::default()
    }

    /// Post-process the synthesised answer: add sections, mark hand-off,
    /// record side effects. Default: untouched.
    async fn post_process(&self, _input: &WorkflowInput<'_>, _answer: &mut QueryAnswer) {}
}

/// Registry routing intents to workflows.
#[derive(Default)]
pub struct WorkflowRouter {
    workflows: HashMap<String, Arc<dyn Workflow>>,
}

impl std::fmt::Debug for WorkflowRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRouter")
            .field("registered", &self.workflows.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl WorkflowRouter {
    /// Empty router; every intent passes through.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow for its intent, replacing any previous one.
    #[must_use]
    pub fn with(mut self, workflow: Arc<dyn Workflow>) -> Self {
        self.workflows
            .insert(workflow.intent().as_str().to_string(), workflow);
        self
    }

    /// Workflow for an intent, if one is registered.
    #[must_use]
    pub fn route(&self, intent: &Intent) -> Option<&Arc<dyn Workflow>> {
        self.workflows.get(intent.as_str())
    }
}
