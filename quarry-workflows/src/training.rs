//! Training workflow.
//!
//! Procedural queries get their answer rendered around an explicit step
//! list pulled from the retrieved chunks, with visual references attached
//! when the cited documents carry extracted images.

use async_trait::async_trait;
use quarry_core::traits::DocumentRepository;
use quarry_core::types::Intent;
use quarry_ingest::extract::extract_step_lists;
use quarry_query::answer::QueryAnswer;
use quarry_query::workflow::{PromptShape, Workflow, WorkflowInput};
use std::collections::HashSet;
use std::sync::Arc;

/// Workflow for `training` queries.
pub struct TrainingWorkflow {
    documents: Arc<dyn DocumentRepository>,
}

impl std::fmt::Debug for TrainingWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingWorkflow").finish_non_exhaustive()
    }
}

impl TrainingWorkflow {
    /// Workflow with document access for visual references.
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentRepository>) -> Self {
        Self { documents }
    }

    fn steps_from_context(input: &WorkflowInput<'_>) -> Vec<String> {
        let mut steps = Vec::new();
        for chunk in input.chunks {
            for list in extract_step_lists(&chunk.text) {
                if list.len() > steps.len() {
                    steps = list;
                }
            }
        }
        steps
    }
}

#[async_trait]
impl Workflow for TrainingWorkflow {
    fn intent(&self) -> Intent {
        Intent::Training
    }

    async fn shape_prompt(&self, input: &WorkflowInput<'_>) -> PromptShape {
        let steps = Self::steps_from_context(input);
        let preamble = if steps.is_empty() {
            "This is a how-to question. Answer as a numbered list of steps in the order \
             the user should perform them."
                .to_string()
        } else {
            format!(
                "This is a how-to question and the sources contain an explicit procedure. \
                 Present it as a numbered step list, preserving the source order:\n{}",
                steps
                    .iter()
                    .enumerate()
                    .map(|(i, s)| format!("{}. {s}", i + 1))
                    .collect::<Vec<_>>()
                    .join("\n")
            )
        };
        PromptShape {
            preamble: Some(preamble),
        }
    }

    async fn post_process(&self, input: &WorkflowInput<'_>, answer: &mut QueryAnswer) {
        let steps = Self::steps_from_context(input);
        if !steps.is_empty() {
            answer.sections.insert(
                "steps".to_string(),
                steps
                    .iter()
                    .enumerate()
                    .map(|(i, s)| format!("{}. {s}", i + 1))
                    .collect::<Vec<_>>()
                    .join("\n"),
            );
        }

        // Visual references: documents behind the context that carry
        // extracted images.
        let document_ids: HashSet<_> = input.chunks.iter().map(|c| c.document_id).collect();
        let mut visuals = Vec::new();
        for document_id in document_ids {
            if let Ok(Some(document)) = self.documents.get_document(document_id).await {
                let image_count = document
                    .metadata
                    .get("images")
                    .and_then(|v| v.as_array())
                    .map_or(0, Vec::len);
                if image_count > 0 {
                    visuals.push(format!("{} ({image_count} images)", document.filename));
                }
            }
        }
        if !visuals.is_empty() {
            visuals.sort();
            answer
                .sections
                .insert("visual_references".to_string(), visuals.join("; "));
        }
    }
}
