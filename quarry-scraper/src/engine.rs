//! The crawl engine: discovery, fetch, filter, ingest.

use crate::content::{self, RecentPages};
use crate::fetch::PoliteFetcher;
use crate::frontier::{normalise_url, score_url, Candidate, ExcludePatterns, Frontier, UrlClass};
use crate::robots::RobotsCache;
use crate::session::{CrawlCounters, CrawlSession, CrawlState};
use chrono::{Datelike, Utc};
use quarry_core::error::{QuarryError, Result};
use quarry_core::ids::CorrelationId;
use quarry_core::traits::ConnectorRepository;
use quarry_core::types::{ConnectorRecord, CrawledPage, Domain, Organization, PageStatus};
use quarry_ingest::{extract, ContentKind, IngestionService};
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Per-crawl configuration, typically normalised from a web connector's
/// stored config blob.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Starting URLs.
    pub seeds: Vec<String>,
    /// Link-walk depth limit.
    pub max_depth: usize,
    /// Frontier cap.
    pub max_pages: usize,
    /// URLs matching any of these regexes are excluded.
    pub exclude_patterns: Vec<String>,
    /// Quality floor for ingestion.
    pub quality_threshold: f32,
    /// Jaccard similarity above which a page is a near-duplicate.
    pub near_duplicate_threshold: f32,
    /// Stop after discovery: classify URLs, ingest nothing.
    pub discover_only: bool,
}

impl CrawlConfig {
    /// Config from the service-wide scraper settings plus seeds.
    #[must_use]
    pub fn from_service(config: &quarry_core::config::ScraperConfig, seeds: Vec<String>) -> Self {
        Self {
            seeds,
            max_depth: config.max_depth,
            max_pages: config.max_pages,
            exclude_patterns: Vec::new(),
            quality_threshold: config.quality_threshold,
            near_duplicate_threshold: config.near_duplicate_threshold,
            discover_only: false,
        }
    }
}

/// Outcome of a finished crawl.
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// Final lifecycle state.
    pub state: CrawlState,
    /// Final counters.
    pub counters: CrawlCounters,
    /// Every URL discovery saw, with its classification.
    pub classified: Vec<(String, UrlClass)>,
}

/// Two-phase crawl engine feeding the ingestion pipeline.
pub struct ScraperEngine {
    fetcher: Arc<PoliteFetcher>,
    robots: Arc<RobotsCache>,
    connectors: Arc<dyn ConnectorRepository>,
    ingest: Arc<IngestionService>,
}

impl std::fmt::Debug for ScraperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScraperEngine").finish_non_exhaustive()
    }
}

struct Discovery {
    frontier: Frontier,
    classified: Vec<(String, UrlClass)>,
    bodies: HashMap<String, Vec<u8>>,
}

fn extract_links(base: &Url, body: &[u8]) -> Vec<(String, Option<String>)> {
    let html = String::from_utf8_lossy(body);
    let document = Html::parse_document(&html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut links = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') || href.starts_with("mailto:") || href.starts_with("javascript:") {
            continue;
        }
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        let anchor = {
            let text = element.text().collect::<String>();
            let text = text.trim();
            if text.is_empty() {
                None
            } else {
                Some(text.to_string())
            }
        };
        links.push((resolved.to_string(), anchor));
    }
    links
}

impl ScraperEngine {
    /// Wire the engine.
    #[must_use]
    pub fn new(
        fetcher: Arc<PoliteFetcher>,
        robots: Arc<RobotsCache>,
        connectors: Arc<dyn ConnectorRepository>,
        ingest: Arc<IngestionService>,
    ) -> Self {
        Self {
            fetcher,
            robots,
            connectors,
            ingest,
        }
    }

    /// Run a full crawl for a web connector.
    ///
    /// # Errors
    ///
    /// `RegexInvalid` for bad exclude patterns and `BadRequest` for an
    /// empty or unparsable seed set; individual page failures never fail
    /// the crawl.
    pub async fn crawl(
        &self,
        connector: &ConnectorRecord,
        org: &Organization,
        domain: &Domain,
        config: &CrawlConfig,
        session: &CrawlSession,
        correlation: CorrelationId,
    ) -> Result<CrawlReport> {
        let excludes = ExcludePatterns::compile(&config.exclude_patterns)?;
        let seed_hosts: HashSet<String> = config
            .seeds
            .iter()
            .filter_map(|s| Url::parse(s).ok())
            .filter_map(|u| u.host_str().map(ToString::to_string))
            .collect();
        if seed_hosts.is_empty() {
            return Err(QuarryError::BadRequest {
                message: "web connector has no valid seed URLs".to_string(),
            });
        }

        session.set_state(CrawlState::Discovering);
        let mut discovery = self
            .discover(config, &excludes, &seed_hosts, session, connector)
            .await;

        if session.is_cancelled() {
            session.set_state(CrawlState::Cancelled);
            return Ok(CrawlReport {
                state: CrawlState::Cancelled,
                counters: session.status().counters,
                classified: discovery.classified,
            });
        }
        if discovery.frontier.is_empty() {
            session.set_state(CrawlState::Failed);
            return Ok(CrawlReport {
                state: CrawlState::Failed,
                counters: session.status().counters,
                classified: discovery.classified,
            });
        }
        if config.discover_only {
            session.set_state(CrawlState::Completed);
            return Ok(CrawlReport {
                state: CrawlState::Completed,
                counters: session.status().counters,
                classified: discovery.classified,
            });
        }

        session.set_state(CrawlState::Fetching);
        self.fetch_phase(
            &mut discovery,
            connector,
            org,
            domain,
            config,
            session,
            correlation,
        )
        .await;

        let final_state = if session.is_cancelled() {
            CrawlState::Cancelled
        } else {
            CrawlState::Completed
        };
        session.set_state(final_state);

        let counters = session.status().counters;
        info!(
            connector_id = %connector.id,
            processed = counters.processed,
            successful = counters.successful,
            "crawl finished"
        );
        Ok(CrawlReport {
            state: final_state,
            counters,
            classified: discovery.classified,
        })
    }

    async fn discover(
        &self,
        config: &CrawlConfig,
        excludes: &ExcludePatterns,
        seed_hosts: &HashSet<String>,
        session: &CrawlSession,
        connector: &ConnectorRecord,
    ) -> Discovery {
        let mut frontier = Frontier::new(config.max_pages);
        let mut classified = Vec::new();
        let mut bodies = HashMap::new();
        let mut walked: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, usize, Option<String>)> = config
            .seeds
            .iter()
            .filter_map(|s| normalise_url(s))
            .map(|url| (url, 0, None))
            .collect();

        while let Some((url, depth, anchor)) = queue.pop_front() {
            if session.is_cancelled() {
                break;
            }
            if !walked.insert(url.clone()) {
                continue;
            }

            let class = self
                .classify(&url, excludes, seed_hosts)
                .await;
            session.update(|c| c.discovered += 1);
            classified.push((url.clone(), class));

            match class {
                UrlClass::Crawlable => {}
                UrlClass::BlockedByRobots => {
                    session.update(|c| c.blocked_by_robots += 1);
                    self.record_robots_block(connector, &url, depth).await;
                    continue;
                }
                _ => continue,
            }

            let accepted = frontier.push(Candidate {
                url: url.clone(),
                depth,
                priority: score_url(&url, anchor.as_deref(), excludes.matches(&url)),
                anchor,
            });
            if !accepted {
                // In scope but not queued: the frontier is at max_pages.
                if let Some(entry) = classified.last_mut() {
                    entry.1 = UrlClass::Allowed;
                }
                continue;
            }

            // Walk links below the depth limit, caching bodies so the
            // fetch phase does not pay twice.
            if depth >= config.max_depth {
                continue;
            }
            let Ok(base) = Url::parse(&url) else { continue };
            match self.fetcher.fetch(&url).await {
                Ok(page) => {
                    for (link, link_anchor) in extract_links(&base, &page.body) {
                        if let Some(normalised) = normalise_url(&link) {
                            if !walked.contains(&normalised) {
                                queue.push_back((normalised, depth + 1, link_anchor));
                            }
                        }
                    }
                    bodies.insert(url.clone(), page.body);
                }
                Err(e) => {
                    debug!(url, "discovery fetch failed: {e}");
                }
            }
        }

        session.set_pending(frontier.len());
        Discovery {
            frontier,
            classified,
            bodies,
        }
    }

    async fn classify(
        &self,
        url: &str,
        excludes: &ExcludePatterns,
        seed_hosts: &HashSet<String>,
    ) -> UrlClass {
        let Some(host) = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(ToString::to_string))
        else {
            return UrlClass::External;
        };
        if !seed_hosts.contains(&host) {
            return UrlClass::External;
        }
        if excludes.matches(url) {
            return UrlClass::BlockedByPattern;
        }
        if !self.robots.allows(url).await {
            return UrlClass::BlockedByRobots;
        }
        UrlClass::Crawlable
    }

    async fn record_robots_block(&self, connector: &ConnectorRecord, url: &str, depth: usize) {
        let page = CrawledPage {
            connector_id: connector.id,
            org_id: connector.org_id,
            domain_id: connector.domain_id,
            url: url.to_string(),
            title: None,
            status: PageStatus::BlockedByRobots,
            word_count: 0,
            content_hash: String::new(),
            depth,
            quality: quarry_core::types::QualityMetrics::default(),
            content_preview: String::new(),
            last_crawled: Utc::now(),
        };
        if let Err(e) = self.connectors.upsert_crawled_page(page).await {
            warn!(url, "failed to record robots block: {e}");
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch_phase(
        &self,
        discovery: &mut Discovery,
        connector: &ConnectorRecord,
        org: &Organization,
        domain: &Domain,
        config: &CrawlConfig,
        session: &CrawlSession,
        correlation: CorrelationId,
    ) {
        let mut recent = RecentPages::new(64);
        let current_year = Utc::now().year();

        while let Some(candidate) = discovery.frontier.pop() {
            // Cancellation is observed once per loop iteration.
            if session.is_cancelled() {
                break;
            }
            session.set_pending(discovery.frontier.len());

            let body = match discovery.bodies.remove(&candidate.url) {
                Some(body) => body,
                None => match self.fetcher.fetch(&candidate.url).await {
                    Ok(page) => page.body,
                    Err(e) => {
                        warn!(url = %candidate.url, "fetch failed: {e}");
                        session.update(|c| {
                            c.processed += 1;
                            c.failed += 1;
                        });
                        self.record_page(
                            connector,
                            &candidate.url,
                            candidate.depth,
                            None,
                            PageStatus::Failed,
                            String::new(),
                            0,
                            quarry_core::types::QualityMetrics::default(),
                            String::new(),
                        )
                        .await;
                        continue;
                    }
                },
            };

            session.update(|c| {
                c.processed += 1;
                c.bytes_fetched += body.len() as u64;
            });

            let extracted =
                match extract::extract(&ContentKind::Html, &body, 4) {
                    Ok(extracted) => extracted,
                    Err(e) => {
                        warn!(url = %candidate.url, "extraction failed: {e}");
                        session.update(|c| c.failed += 1);
                        continue;
                    }
                };
            let heading_count = extracted
                .extra
                .get("heading_count")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0);
            let analysis = content::analyse(
                &extracted.text,
                extracted.title.clone(),
                body.len(),
                usize::try_from(heading_count).unwrap_or(0),
                current_year,
            );
            let preview: String = analysis.text.chars().take(400).collect();

            // Exact duplicate: a page under this connector already carries
            // the same main-content hash.
            if let Ok(Some(existing)) = self
                .connectors
                .get_page_by_hash(connector.id, &analysis.content_hash)
                .await
            {
                if existing.url != candidate.url || existing.status != PageStatus::Ingested {
                    session.update(|c| c.skipped_duplicate += 1);
                    self.record_page(
                        connector,
                        &candidate.url,
                        candidate.depth,
                        analysis.title.clone(),
                        PageStatus::SkippedDuplicate,
                        analysis.content_hash.clone(),
                        analysis.word_count,
                        analysis.quality.clone(),
                        preview,
                    )
                    .await;
                    continue;
                }
                // Unchanged re-crawl of the same URL: refresh the stamp.
                self.record_page(
                    connector,
                    &candidate.url,
                    candidate.depth,
                    analysis.title.clone(),
                    PageStatus::Ingested,
                    analysis.content_hash.clone(),
                    analysis.word_count,
                    analysis.quality.clone(),
                    preview,
                )
                .await;
                continue;
            }

            // Near duplicate against the recent window.
            if recent.max_similarity(&analysis.token_set) >= config.near_duplicate_threshold {
                session.update(|c| c.skipped_duplicate += 1);
                self.record_page(
                    connector,
                    &candidate.url,
                    candidate.depth,
                    analysis.title.clone(),
                    PageStatus::SkippedDuplicate,
                    analysis.content_hash.clone(),
                    analysis.word_count,
                    analysis.quality.clone(),
                    preview,
                )
                .await;
                continue;
            }

            if analysis.quality.overall < config.quality_threshold {
                session.update(|c| c.skipped_low_quality += 1);
                self.record_page(
                    connector,
                    &candidate.url,
                    candidate.depth,
                    analysis.title.clone(),
                    PageStatus::SkippedLowQuality,
                    analysis.content_hash.clone(),
                    analysis.word_count,
                    analysis.quality.clone(),
                    preview,
                )
                .await;
                continue;
            }

            let mut crawl_metadata = HashMap::new();
            crawl_metadata.insert("url".to_string(), serde_json::json!(candidate.url));
            crawl_metadata.insert("crawl_depth".to_string(), serde_json::json!(candidate.depth));
            crawl_metadata.insert(
                "quality_score".to_string(),
                serde_json::json!(analysis.quality.overall),
            );
            if let Some(title) = &analysis.title {
                crawl_metadata.insert("page_title".to_string(), serde_json::json!(title));
            }

            let status = match self
                .ingest
                .ingest_page(body, &candidate.url, org, domain, crawl_metadata, correlation)
                .await
            {
                Ok(_) => {
                    session.update(|c| c.successful += 1);
                    recent.push(analysis.token_set.clone());
                    PageStatus::Ingested
                }
                Err(QuarryError::DuplicateHash { .. }) => {
                    session.update(|c| c.skipped_duplicate += 1);
                    PageStatus::SkippedDuplicate
                }
                Err(e) => {
                    warn!(url = %candidate.url, "ingestion handoff failed: {e}");
                    session.update(|c| c.failed += 1);
                    PageStatus::Failed
                }
            };

            self.record_page(
                connector,
                &candidate.url,
                candidate.depth,
                analysis.title.clone(),
                status,
                analysis.content_hash.clone(),
                analysis.word_count,
                analysis.quality.clone(),
                preview,
            )
            .await;
        }
        session.set_pending(discovery.frontier.len());
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_page(
        &self,
        connector: &ConnectorRecord,
        url: &str,
        depth: usize,
        title: Option<String>,
        status: PageStatus,
        content_hash: String,
        word_count: usize,
        quality: quarry_core::types::QualityMetrics,
        content_preview: String,
    ) {
        let page = CrawledPage {
            connector_id: connector.id,
            org_id: connector.org_id,
            domain_id: connector.domain_id,
            url: url.to_string(),
            title,
            status,
            word_count,
            content_hash,
            depth,
            quality,
            content_preview,
            last_crawled: Utc::now(),
        };
        if let Err(e) = self.connectors.upsert_crawled_page(page).await {
            warn!(url, "failed to record crawled page: {e}");
        }
    }
}
