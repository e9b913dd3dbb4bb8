//! Known-issue registry for the bug workflow.

use dashmap::DashMap;
use quarry_core::ids::DomainId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A tracked issue with its resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownIssue {
    /// Short issue title.
    pub title: String,
    /// Symptom description matched against reports.
    pub description: String,
    /// Stored resolution surfaced in answers.
    pub resolution: String,
}

fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(ToString::to_string)
        .collect()
}

/// Per-domain known-issue store.
#[derive(Debug, Default)]
pub struct KnownIssueStore {
    issues: DashMap<DomainId, Vec<KnownIssue>>,
}

impl KnownIssueStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an issue for a domain.
    pub fn add(&self, domain_id: DomainId, issue: KnownIssue) {
        self.issues.entry(domain_id).or_default().push(issue);
    }

    /// Best-matching issue for a report, with its overlap score in [0, 1].
    /// Title and description tokens are matched against the report.
    #[must_use]
    pub fn best_match(&self, domain_id: DomainId, report: &str) -> Option<(KnownIssue, f32)> {
        let report_tokens = tokens(report);
        if report_tokens.is_empty() {
            return None;
        }

        let issues = self.issues.get(&domain_id)?;
        let mut best: Option<(KnownIssue, f32)> = None;
        for issue in issues.iter() {
            let issue_tokens = tokens(&format!("{} {}", issue.title, issue.description));
            if issue_tokens.is_empty() {
                continue;
            }
            let overlap = issue_tokens.intersection(&report_tokens).count();
            #[allow(clippy::cast_precision_loss)]
            let score = overlap as f32 / issue_tokens.len().min(report_tokens.len()) as f32;
            if best.as_ref().is_none_or(|(_, s)| score > *s) {
                best = Some((issue.clone(), score));
            }
        }
        best.filter(|(_, score)| *score > 0.0)
    }
}
