//! URL frontier.
//!
//! Candidate URLs are classified, scored, and drained in priority order:
//! higher priority first, shallower depth breaking ties, then lexicographic
//! URL order so a crawl is reproducible.

use quarry_core::error::{QuarryError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use url::Url;

/// How a discovered URL relates to the crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlClass {
    /// In scope and fetchable.
    Crawlable,
    /// In scope, already fetched or queued.
    Allowed,
    /// Matches an exclude pattern.
    BlockedByPattern,
    /// robots.txt disallows it.
    BlockedByRobots,
    /// Different host than the seeds.
    External,
}

/// A scored frontier entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Normalised URL.
    pub url: String,
    /// Link depth from the seed set.
    pub depth: usize,
    /// Priority score; higher drains first.
    pub priority: f32,
    /// Anchor text of the link that discovered this URL.
    pub anchor: Option<String>,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: priority desc, then depth asc, then
        // URL lexicographic asc.
        self.priority
            .partial_cmp(&other.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.depth.cmp(&self.depth))
            .then_with(|| other.url.cmp(&self.url))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

const BOOST_KEYWORDS: &[&str] = &["docs", "guide", "api", "help", "tutorial", "reference", "faq"];
const PENALTY_KEYWORDS: &[&str] = &["blog", "news", "press"];
const ANCHOR_HINTS: &[&str] = &["getting started", "how to", "quickstart", "setup", "install"];

fn looks_dated(path: &str) -> bool {
    // Archive-style paths: /2023/06/..., /2022-11-post
    let mut digits = 0;
    for segment in path.split('/') {
        let numeric = segment.chars().take(4).filter(char::is_ascii_digit).count();
        if numeric == 4 && segment.len() >= 4 {
            digits += 1;
        }
    }
    digits > 0
}

/// Score a URL for crawl ordering.
#[must_use]
pub fn score_url(url: &str, anchor: Option<&str>, excluded: bool) -> f32 {
    let mut score = 1.0;
    let lower = url.to_lowercase();

    for keyword in BOOST_KEYWORDS {
        if lower.contains(keyword) {
            score += 2.0;
        }
    }
    for keyword in PENALTY_KEYWORDS {
        if lower.contains(keyword) {
            score -= 1.5;
        }
    }
    if Url::parse(url).is_ok_and(|u| looks_dated(u.path())) {
        score -= 1.0;
    }

    if let Some(anchor) = anchor {
        let anchor = anchor.to_lowercase();
        if ANCHOR_HINTS.iter().any(|hint| anchor.contains(hint)) {
            score += 1.5;
        }
    }

    if excluded {
        score -= 10.0;
    }

    score
}

/// Normalise a URL for dedup: drop fragments, default ports, and trailing
/// slashes.
#[must_use]
pub fn normalise_url(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    parsed.set_fragment(None);
    let mut out = parsed.to_string();
    if out.ends_with('/') && parsed.path() == "/" {
        out.pop();
    }
    Some(out)
}

/// Compiled exclude patterns.
#[derive(Debug, Default)]
pub struct ExcludePatterns {
    patterns: Vec<Regex>,
}

impl ExcludePatterns {
    /// Compile user-supplied patterns.
    ///
    /// # Errors
    ///
    /// `RegexInvalid` naming the offending pattern.
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            compiled.push(Regex::new(pattern).map_err(|e| QuarryError::RegexInvalid {
                message: format!("'{pattern}': {e}"),
            })?);
        }
        Ok(Self { patterns: compiled })
    }

    /// Whether any pattern matches.
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(url))
    }
}

/// Priority-ordered, capacity-bounded URL frontier.
#[derive(Debug)]
pub struct Frontier {
    heap: BinaryHeap<Candidate>,
    seen: HashSet<String>,
    max_pages: usize,
}

impl Frontier {
    /// Frontier capped at `max_pages` queued URLs over its lifetime.
    #[must_use]
    pub fn new(max_pages: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            seen: HashSet::new(),
            max_pages,
        }
    }

    /// Queue a candidate. Duplicates and overflow are dropped silently;
    /// returns whether the URL was accepted.
    pub fn push(&mut self, candidate: Candidate) -> bool {
        if self.seen.len() >= self.max_pages {
            return false;
        }
        if !self.seen.insert(candidate.url.clone()) {
            return false;
        }
        self.heap.push(candidate);
        true
    }

    /// Take the highest-priority candidate.
    pub fn pop(&mut self) -> Option<Candidate> {
        self.heap.pop()
    }

    /// Whether a URL was ever queued.
    #[must_use]
    pub fn has_seen(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    /// Queued-URL count over the frontier's lifetime.
    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Remaining queued candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the frontier is drained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
