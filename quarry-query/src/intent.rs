//! Intent classification.
//!
//! A rule classifier over keywords and phrase patterns. Every rule hit
//! adds weight; the winning category's weight maps to a confidence in
//! [0, 1] and the hits become the recorded reasoning. No hits, an empty
//! query, or an internal failure all fall back to `general_query`.

use quarry_core::types::Intent;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A classified query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// Winning category.
    pub intent: Intent,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Which rules fired.
    pub reasoning: String,
}

struct Rule {
    intent: Intent,
    keywords: &'static [&'static str],
    patterns: Vec<Regex>,
}

/// Keyword and pattern classifier.
pub struct IntentClassifier {
    rules: Vec<Rule>,
}

impl std::fmt::Debug for IntentClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentClassifier")
            .field("rules", &self.rules.len())
            .finish()
    }
}

const BUG_KEYWORDS: &[&str] = &[
    "error", "bug", "broken", "crash", "fail", "fails", "failing", "failed", "timeout",
    "time out", "times out", "exception", "stuck", "hangs", "wrong", "doesn't work",
    "not working", "cannot", "can't",
];

const FEATURE_KEYWORDS: &[&str] = &[
    "feature", "request", "add support", "would be nice", "wish", "could you add",
    "enhancement", "improve", "missing", "support for",
];

const TRAINING_KEYWORDS: &[&str] = &[
    "how to", "how do i", "how can i", "guide", "tutorial", "walk me through", "steps",
    "set up", "setup", "configure", "getting started", "instructions", "explain how",
];

fn patterns(raw: &[&str]) -> Vec<Regex> {
    raw.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier {
    /// Classifier with the built-in category rules.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: vec![
                Rule {
                    intent: Intent::BugReport,
                    keywords: BUG_KEYWORDS,
                    patterns: patterns(&[
                        r"(?i)\bafter \d+ (seconds|minutes|retries)\b",
                        r"(?i)\b(500|502|503|404) error\b",
                        r"(?i)\bstopped working\b",
                        r"(?i)\bused to work\b",
                    ]),
                },
                Rule {
                    intent: Intent::FeatureRequest,
                    keywords: FEATURE_KEYWORDS,
                    patterns: patterns(&[
                        r"(?i)\bcan (you|we|it) (add|support)\b",
                        r"(?i)\bis there a way to\b",
                        r"(?i)\bplease (add|support)\b",
                    ]),
                },
                Rule {
                    intent: Intent::Training,
                    keywords: TRAINING_KEYWORDS,
                    patterns: patterns(&[
                        r"(?i)^how (do|can|should|would) ",
                        r"(?i)\bstep[- ]by[- ]step\b",
                        r"(?i)\bwhat('s| is) the (best|right) way to\b",
                    ]),
                },
            ],
        }
    }

    /// Classify a query. Never fails; the fallback is `general_query`
    /// with zero confidence.
    #[must_use]
    pub fn classify(&self, query: &str) -> Classification {
        let lower = query.to_lowercase();
        if lower.trim().is_empty() {
            return Classification {
                intent: Intent::GeneralQuery,
                confidence: 0.0,
                reasoning: "empty query".to_string(),
            };
        }

        let mut best: Option<(f32, &Rule, Vec<String>)> = None;
        for rule in &self.rules {
            let mut weight = 0.0;
            let mut hits = Vec::new();

            for keyword in rule.keywords {
                if lower.contains(keyword) {
                    weight += 0.25;
                    hits.push(format!("keyword '{keyword}'"));
                }
            }
            for pattern in &rule.patterns {
                if pattern.is_match(query) {
                    weight += 0.4;
                    hits.push(format!("pattern /{}/", pattern.as_str()));
                }
            }

            if weight > 0.0 && best.as_ref().is_none_or(|(w, _, _)| weight > *w) {
                best = Some((weight, rule, hits));
            }
        }

        match best {
            Some((weight, rule, hits)) => Classification {
                intent: rule.intent.clone(),
                confidence: weight.min(1.0),
                reasoning: hits.join(", "),
            },
            None => Classification {
                intent: Intent::GeneralQuery,
                confidence: 0.5,
                reasoning: "no category rules matched".to_string(),
            },
        }
    }
}
