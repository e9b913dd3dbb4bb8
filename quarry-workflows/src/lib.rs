//! # quarry-workflows
//!
//! Intent-specialised workflows plugged into the query pipeline's
//! [`quarry_query::workflow::Workflow`] seam: bug reports cross-reference
//! known issues, feature requests get categorised and logged, training
//! questions render structured step lists, and general queries pass
//! through. Every workflow can mark an answer for human hand-off; the
//! pipeline surfaces the flag rather than silently falling back.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

/// Bug-report workflow.
pub mod bug;

/// Feature-request workflow.
pub mod feature;

/// General pass-through workflow.
pub mod general;

/// Known-issue registry.
pub mod known_issues;

/// Training workflow.
pub mod training;

pub use bug::BugWorkflow;
pub use feature::{FeatureCandidate, FeatureStatus, FeatureWorkflow};
pub use general::GeneralWorkflow;
pub use known_issues::{KnownIssue, KnownIssueStore};
pub use training::TrainingWorkflow;

use quarry_core::traits::DocumentRepository;
use quarry_query::workflow::WorkflowRouter;
use std::sync::Arc;

/// Router with every built-in workflow registered.
#[must_use]
pub fn default_router(
    issues: Arc<KnownIssueStore>,
    documents: Arc<dyn DocumentRepository>,
) -> WorkflowRouter {
    WorkflowRouter::new()
        .with(Arc::new(BugWorkflow::new(issues)))
        .with(Arc::new(FeatureWorkflow::new()))
        .with(Arc::new(TrainingWorkflow::new(documents)))
        .with(Arc::new(GeneralWorkflow))
}
