//! General-query workflow: pass-through synthesis.

use async_trait::async_trait;
use quarry_core::types::Intent;
use quarry_query::workflow::Workflow;

/// Workflow for `general_query`; adds nothing to the shared flow.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeneralWorkflow;

#[async_trait]
impl Workflow for GeneralWorkflow {
    fn intent(&self) -> Intent {
        Intent::GeneralQuery
    }
}
