//! Web connector.
//!
//! Wraps the crawl engine: `discover` classifies URLs without ingesting,
//! `scrape` crawls a caller-provided URL list, and `sync` runs the full
//! two-phase crawl from the configured seeds.

use crate::config::{self, TypedConnectorConfig, WebConnectorConfig};
use crate::sync::SyncOutcome;
use crate::{Connector, PreviewItem, PreviewReport, TestReport};
use async_trait::async_trait;
use quarry_core::config::ScraperConfig;
use quarry_core::error::{QuarryError, Result};
use quarry_core::ids::CorrelationId;
use quarry_core::traits::TenantRepository;
use quarry_core::types::{ConnectorKind, ConnectorRecord, Domain, Organization};
use quarry_scraper::{CrawlConfig, CrawlReport, CrawlSession, ScraperEngine, UrlClass};
use std::sync::Arc;
use url::Url;

/// Connector for crawled web sources.
pub struct WebConnector {
    engine: Arc<ScraperEngine>,
    tenants: Arc<dyn TenantRepository>,
    defaults: ScraperConfig,
}

impl std::fmt::Debug for WebConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebConnector")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl WebConnector {
    /// Connector over the crawl engine.
    #[must_use]
    pub fn new(
        engine: Arc<ScraperEngine>,
        tenants: Arc<dyn TenantRepository>,
        defaults: ScraperConfig,
    ) -> Self {
        Self {
            engine,
            tenants,
            defaults,
        }
    }

    fn crawl_config(&self, web: &WebConnectorConfig, seeds: Vec<String>) -> CrawlConfig {
        CrawlConfig {
            seeds,
            max_depth: web.max_depth.unwrap_or(self.defaults.max_depth),
            max_pages: web.max_pages.unwrap_or(self.defaults.max_pages),
            exclude_patterns: web.exclude_patterns.clone(),
            quality_threshold: self.defaults.quality_threshold,
            near_duplicate_threshold: self.defaults.near_duplicate_threshold,
            discover_only: false,
        }
    }

    async fn owners(&self, record: &ConnectorRecord) -> Result<(Organization, Domain)> {
        let org = self
            .tenants
            .get_org(record.org_id)
            .await?
            .ok_or_else(|| QuarryError::not_found("organisation"))?;
        let domain = self
            .tenants
            .get_domain(record.domain_id)
            .await?
            .ok_or_else(|| QuarryError::not_found("domain"))?;
        Ok((org, domain))
    }

    fn web_config(record: &ConnectorRecord) -> Result<WebConnectorConfig> {
        match config::read(&record.kind, &record.config)? {
            TypedConnectorConfig::Web(web) => Ok(web),
            _ => Err(QuarryError::BadRequest {
                message: "connector is not a web connector".to_string(),
            }),
        }
    }

    /// Run a crawl over an explicit URL list instead of the configured
    /// seeds. The session handle lets the caller watch and cancel.
    ///
    /// # Errors
    ///
    /// Same failure modes as a sync crawl.
    pub async fn scrape_urls(
        &self,
        record: &ConnectorRecord,
        urls: Vec<String>,
        session: &CrawlSession,
    ) -> Result<CrawlReport> {
        let web = Self::web_config(record)?;
        let (org, domain) = self.owners(record).await?;
        let mut crawl = self.crawl_config(&web, urls);
        // An explicit list is fetched as given, not walked.
        crawl.max_depth = 0;
        self.engine
            .crawl(record, &org, &domain, &crawl, session, CorrelationId::new())
            .await
    }

    /// Discovery only: classify every URL reachable from the seeds
    /// without ingesting anything.
    ///
    /// # Errors
    ///
    /// Same failure modes as a sync crawl.
    pub async fn discover_urls(
        &self,
        record: &ConnectorRecord,
    ) -> Result<Vec<(String, UrlClass)>> {
        let web = Self::web_config(record)?;
        let (org, domain) = self.owners(record).await?;
        let mut crawl = self.crawl_config(&web, web.seed_urls.clone());
        crawl.discover_only = true;

        let session = CrawlSession::new(record.id);
        let report = self
            .engine
            .crawl(record, &org, &domain, &crawl, &session, CorrelationId::new())
            .await?;
        Ok(report.classified)
    }
}

#[async_trait]
impl Connector for WebConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Web
    }

    async fn test(&self, record: &ConnectorRecord) -> Result<TestReport> {
        let web = match config::validate_for_write(&record.kind, &record.config)? {
            TypedConnectorConfig::Web(web) => web,
            _ => {
                return Err(QuarryError::BadRequest {
                    message: "connector is not a web connector".to_string(),
                })
            }
        };
        // Patterns must compile and at least one seed must parse.
        quarry_scraper::ExcludePatterns::compile(&web.exclude_patterns)?;
        let parsed = web
            .seed_urls
            .iter()
            .filter(|s| Url::parse(s).is_ok())
            .count();
        if parsed == 0 {
            return Err(QuarryError::BadRequest {
                message: "no seed URL parses".to_string(),
            });
        }
        Ok(TestReport::ok(format!("{parsed} seed URLs accepted")))
    }

    async fn preview(&self, record: &ConnectorRecord) -> Result<PreviewReport> {
        let classified = self.discover_urls(record).await?;
        Ok(PreviewReport {
            items: classified
                .into_iter()
                .take(50)
                .map(|(url, class)| PreviewItem {
                    name: url,
                    detail: format!("{class:?}"),
                })
                .collect(),
        })
    }

    async fn sync(&self, record: &ConnectorRecord) -> Result<SyncOutcome> {
        let web = Self::web_config(record)?;
        let (org, domain) = self.owners(record).await?;
        let crawl = self.crawl_config(&web, web.seed_urls.clone());

        let session = CrawlSession::new(record.id);
        let report = self
            .engine
            .crawl(record, &org, &domain, &crawl, &session, CorrelationId::new())
            .await?;

        Ok(SyncOutcome {
            processed: report.counters.processed,
            succeeded: report.counters.successful,
            failed: report.counters.failed,
        })
    }
}
