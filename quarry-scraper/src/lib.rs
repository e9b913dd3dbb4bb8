//! # quarry-scraper
//!
//! Two-phase web crawler: discovery walks links from the seed set,
//! classifying and scoring every URL into a bounded priority frontier;
//! the fetch phase drains it politely (per-host concurrency, adaptive
//! delay, robots.txt compliance), filters by content quality, drops exact
//! and near duplicates, and hands accepted pages to the ingestion
//! pipeline as `web` documents.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

/// Aggregate analytics over crawled-page records.
pub mod analytics;

/// Quality scoring and duplicate detection.
pub mod content;

/// The crawl engine.
pub mod engine;

/// Transport seam and politeness wrapper.
pub mod fetch;

/// URL classification and the priority frontier.
pub mod frontier;

/// robots.txt cache.
pub mod robots;

/// Crawl-session lifecycle and statistics.
pub mod session;

pub use analytics::{analyse_pages, CrawlAnalytics};
pub use content::{analyse, jaccard, PageAnalysis, RecentPages};
pub use engine::{CrawlConfig, CrawlReport, ScraperEngine};
pub use fetch::{Fetch, FetchedPage, HttpFetcher, PoliteFetcher};
pub use frontier::{Candidate, ExcludePatterns, Frontier, UrlClass};
pub use robots::{RobotsCache, RobotsRules};
pub use session::{CrawlCounters, CrawlSession, CrawlState, CrawlStatus};
