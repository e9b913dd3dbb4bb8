//! Crawled-page records written by the web scraper.

use crate::ids::{ConnectorId, DomainId, OrgId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of fetching and filtering one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    /// Fetched, passed filters, handed to ingestion.
    Ingested,
    /// Fetched but below the quality threshold.
    SkippedLowQuality,
    /// Fetched but identical or near-identical to an earlier page.
    SkippedDuplicate,
    /// Fetch failed after retries.
    Failed,
    /// robots.txt disallowed the URL; it was never fetched.
    BlockedByRobots,
}

/// Component scores behind a page's quality gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Sentence-length readability heuristic in [0, 1].
    pub readability: f32,
    /// Text-to-markup ratio in [0, 1].
    pub content_density: f32,
    /// Heading-structure richness in [0, 1].
    pub semantic_richness: f32,
    /// Unique-term ratio in [0, 1].
    pub information_density: f32,
    /// Date and freshness indicators in [0, 1].
    pub freshness: f32,
    /// Weighted combination in [0, 1].
    pub overall: f32,
}

/// One URL's crawl history under a web connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawledPage {
    /// Owning connector.
    pub connector_id: ConnectorId,
    /// Denormalised tenant columns.
    pub org_id: OrgId,
    /// Denormalised tenant columns.
    pub domain_id: DomainId,
    /// Fetched URL.
    pub url: String,
    /// Page title, when the HTML carried one.
    pub title: Option<String>,
    /// Outcome.
    pub status: PageStatus,
    /// Main-content word count.
    pub word_count: usize,
    /// sha256 of the extracted main content, hex encoded.
    pub content_hash: String,
    /// Link depth from the seed set.
    pub depth: usize,
    /// Quality breakdown.
    pub quality: QualityMetrics,
    /// First few hundred characters of the extracted content.
    pub content_preview: String,
    /// Fetch timestamp.
    pub last_crawled: DateTime<Utc>,
}
