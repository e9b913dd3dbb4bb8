//! Feature-request workflow.
//!
//! Looks for an existing equivalent in the retrieved context and
//! categorises the request as `existing`, `workaround`, or `new
//! candidate`. New candidates are logged as feature-candidate records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use quarry_core::ids::{DomainId, OrgId};
use quarry_core::types::Intent;
use quarry_query::answer::QueryAnswer;
use quarry_query::workflow::{PromptShape, Workflow, WorkflowInput};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const EXISTING_SCORE: f32 = 0.75;
const WORKAROUND_SCORE: f32 = 0.45;

/// How a request relates to current capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    /// The capability already exists.
    Existing,
    /// Close capability exists; a workaround applies.
    Workaround,
    /// Nothing comparable exists.
    NewCandidate,
}

impl FeatureStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Existing => "existing",
            Self::Workaround => "workaround",
            Self::NewCandidate => "new_candidate",
        }
    }
}

/// A logged candidate for product follow-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCandidate {
    /// Requesting tenant.
    pub org_id: OrgId,
    /// Domain the request landed in.
    pub domain_id: DomainId,
    /// The request text.
    pub request: String,
    /// When it was logged.
    pub created_at: DateTime<Utc>,
}

/// Workflow for `feature_request` queries.
#[derive(Debug, Default)]
pub struct FeatureWorkflow {
    candidates: Arc<RwLock<Vec<FeatureCandidate>>>,
}

impl FeatureWorkflow {
    /// Fresh workflow with an empty candidate log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Logged candidates, newest last.
    #[must_use]
    pub fn candidates(&self) -> Vec<FeatureCandidate> {
        self.candidates.read().clone()
    }

    fn categorise(input: &WorkflowInput<'_>) -> FeatureStatus {
        let best = input
            .chunks
            .iter()
            .map(|c| c.score)
            .fold(0.0f32, f32::max);
        if best >= EXISTING_SCORE {
            FeatureStatus::Existing
        } else if best >= WORKAROUND_SCORE {
            FeatureStatus::Workaround
        } else {
            FeatureStatus::NewCandidate
        }
    }
}

#[async_trait]
impl Workflow for FeatureWorkflow {
    fn intent(&self) -> Intent {
        Intent::FeatureRequest
    }

    async fn shape_prompt(&self, input: &WorkflowInput<'_>) -> PromptShape {
        let directive = match Self::categorise(input) {
            FeatureStatus::Existing => {
                "The sources suggest this capability already exists. Point the user at it."
            }
            FeatureStatus::Workaround => {
                "The sources describe something close. Offer it as a workaround and be \
                 explicit that the exact request is not supported."
            }
            FeatureStatus::NewCandidate => {
                "Nothing comparable appears in the sources. Say the capability does not \
                 exist today and that the request has been recorded."
            }
        };
        PromptShape {
            preamble: Some(directive.to_string()),
        }
    }

    async fn post_process(&self, input: &WorkflowInput<'_>, answer: &mut QueryAnswer) {
        let status = Self::categorise(input);
        answer
            .sections
            .insert("feature_status".to_string(), status.as_str().to_string());

        if status == FeatureStatus::NewCandidate {
            let candidate = FeatureCandidate {
                org_id: input.domain.org_id,
                domain_id: input.domain.id,
                request: input.query.to_string(),
                created_at: Utc::now(),
            };
            info!(
                org_id = %candidate.org_id,
                domain_id = %candidate.domain_id,
                "feature candidate recorded"
            );
            self.candidates.write().push(candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quarry_core::ids::{ChunkId, DocumentId};
    use quarry_core::types::{AccessMode, AiConfig, Domain};
    use quarry_query::retrieval::RetrievedChunk;
    use std::collections::HashMap;

    fn domain() -> Domain {
        Domain {
            id: DomainId::new(),
            org_id: OrgId::new(),
            name: "product".to_string(),
            display_name: "Product".to_string(),
            template: "docs".to_string(),
            ai_config: AiConfig::default(),
            access_mode: AccessMode::Public,
            settings: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    fn chunk(score: f32) -> RetrievedChunk {
        RetrievedChunk {
            document_id: DocumentId::new(),
            chunk_id: ChunkId::new(),
            chunk_index: 0,
            text: "export endpoint documentation".to_string(),
            score,
        }
    }

    #[tokio::test]
    async fn test_high_similarity_is_existing() {
        let workflow = FeatureWorkflow::new();
        let domain = domain();
        let intent = Intent::FeatureRequest;
        let chunks = vec![chunk(0.85)];
        let input = WorkflowInput {
            query: "can you add an export endpoint",
            intent: &intent,
            domain: &domain,
            chunks: &chunks,
        };

        let mut answer = QueryAnswer::default();
        workflow.post_process(&input, &mut answer).await;
        assert_eq!(answer.sections.get("feature_status").unwrap(), "existing");
        assert!(workflow.candidates().is_empty());
    }

    #[tokio::test]
    async fn test_no_equivalent_logs_candidate() {
        let workflow = FeatureWorkflow::new();
        let domain = domain();
        let intent = Intent::FeatureRequest;
        let chunks = vec![chunk(0.1)];
        let input = WorkflowInput {
            query: "please add holographic export",
            intent: &intent,
            domain: &domain,
            chunks: &chunks,
        };

        let mut answer = QueryAnswer::default();
        workflow.post_process(&input, &mut answer).await;
        assert_eq!(
            answer.sections.get("feature_status").unwrap(),
            "new_candidate"
        );

        let candidates = workflow.candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].request, "please add holographic export");
    }
}
