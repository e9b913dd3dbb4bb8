//! Bug-report workflow.
//!
//! Cross-references the report against the domain's known issues. A match
//! above the threshold is surfaced to the model with its stored
//! resolution, and the answer gains a structured probable-cause /
//! suggested-steps section.

use crate::known_issues::KnownIssueStore;
use async_trait::async_trait;
use quarry_core::types::Intent;
use quarry_query::answer::QueryAnswer;
use quarry_query::workflow::{PromptShape, Workflow, WorkflowInput};
use std::sync::Arc;
use tracing::debug;

const MATCH_THRESHOLD: f32 = 0.3;

/// Workflow for `bug_report` queries.
#[derive(Debug)]
pub struct BugWorkflow {
    issues: Arc<KnownIssueStore>,
}

impl BugWorkflow {
    /// Workflow backed by a known-issue store.
    #[must_use]
    pub fn new(issues: Arc<KnownIssueStore>) -> Self {
        Self { issues }
    }
}

#[async_trait]
impl Workflow for BugWorkflow {
    fn intent(&self) -> Intent {
        Intent::BugReport
    }

    async fn shape_prompt(&self, input: &WorkflowInput<'_>) -> PromptShape {
        let matched = self
            .issues
            .best_match(input.domain.id, input.query)
            .filter(|(_, score)| *score >= MATCH_THRESHOLD);

        let preamble = matched.map(|(issue, score)| {
            debug!(issue = %issue.title, score, "matched known issue");
            format!(
                "Matched known issue: {}. Known resolution: {} Treat the user's report \
                 as an instance of this issue unless the sources contradict it. \
                 Structure the answer as a probable cause followed by suggested steps.",
                issue.title, issue.resolution
            )
        });

        PromptShape { preamble }
    }

    async fn post_process(&self, input: &WorkflowInput<'_>, answer: &mut QueryAnswer) {
        if answer.llm_failed {
            return;
        }

        if let Some((issue, score)) = self
            .issues
            .best_match(input.domain.id, input.query)
            .filter(|(_, score)| *score >= MATCH_THRESHOLD)
        {
            answer
                .sections
                .insert("matched_known_issue".to_string(), issue.title.clone());
            answer
                .sections
                .insert("probable_cause".to_string(), issue.description.clone());
            answer
                .sections
                .insert("suggested_steps".to_string(), issue.resolution.clone());
            // A confirmed known issue is a strong signal.
            answer.confidence = answer.confidence.max(score.min(0.9));
        } else {
            answer.sections.insert(
                "probable_cause".to_string(),
                "No known issue matched this report.".to_string(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::known_issues::KnownIssue;
    use chrono::Utc;
    use quarry_core::ids::{DomainId, OrgId};
    use quarry_core::types::{AccessMode, AiConfig, Domain};
    use std::collections::HashMap;

    fn domain() -> Domain {
        Domain {
            id: DomainId::new(),
            org_id: OrgId::new(),
            name: "support".to_string(),
            display_name: "Support".to_string(),
            template: "support".to_string(),
            ai_config: AiConfig::default(),
            access_mode: AccessMode::Public,
            settings: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_known_issue_shapes_prompt_and_sections() {
        let store = Arc::new(KnownIssueStore::new());
        let domain = domain();
        store.add(
            domain.id,
            KnownIssue {
                title: "file upload timeout".to_string(),
                description: "large uploads time out after thirty seconds".to_string(),
                resolution: "Increase the upload timeout in settings.".to_string(),
            },
        );
        let workflow = BugWorkflow::new(store);

        let query = "My large uploads time out after 30 seconds";
        let intent = Intent::BugReport;
        let input = WorkflowInput {
            query,
            intent: &intent,
            domain: &domain,
            chunks: &[],
        };

        let shape = workflow.shape_prompt(&input).await;
        let preamble = shape.preamble.expect("known issue should match");
        assert!(preamble.contains("file upload timeout"));
        assert!(preamble.contains("Increase the upload timeout"));

        let mut answer = QueryAnswer {
            confidence: 0.2,
            ..QueryAnswer::default()
        };
        workflow.post_process(&input, &mut answer).await;
        assert_eq!(
            answer.sections.get("matched_known_issue").unwrap(),
            "file upload timeout"
        );
        assert!(answer.sections.contains_key("suggested_steps"));
        assert!(answer.confidence > 0.2);
    }

    #[tokio::test]
    async fn test_unmatched_report_passes_through() {
        let workflow = BugWorkflow::new(Arc::new(KnownIssueStore::new()));
        let domain = domain();
        let intent = Intent::BugReport;
        let input = WorkflowInput {
            query: "the dashboard renders blank",
            intent: &intent,
            domain: &domain,
            chunks: &[],
        };

        assert!(workflow.shape_prompt(&input).await.preamble.is_none());

        let mut answer = QueryAnswer::default();
        workflow.post_process(&input, &mut answer).await;
        assert!(answer.sections.contains_key("probable_cause"));
        assert!(!answer.sections.contains_key("matched_known_issue"));
    }
}
