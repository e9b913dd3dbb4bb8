//! Connector, sync-job, and crawled-page tables.

use super::MemoryBackend;
use async_trait::async_trait;
use quarry_core::error::{QuarryError, Result};
use quarry_core::ids::{ConnectorId, DomainId, SyncJobId};
use quarry_core::traits::ConnectorRepository;
use quarry_core::types::{ConnectorRecord, CrawledPage, SyncJob};

#[async_trait]
impl ConnectorRepository for MemoryBackend {
    async fn create_connector(&self, connector: ConnectorRecord) -> Result<()> {
        self.tables.connectors.insert(connector.id, connector);
        Ok(())
    }

    async fn get_connector(&self, id: ConnectorId) -> Result<Option<ConnectorRecord>> {
        Ok(self.tables.connectors.get(&id).map(|c| c.clone()))
    }

    async fn list_connectors(&self, domain_id: DomainId) -> Result<Vec<ConnectorRecord>> {
        let mut connectors: Vec<ConnectorRecord> = self
            .tables
            .connectors
            .iter()
            .filter(|c| c.domain_id == domain_id)
            .map(|c| c.clone())
            .collect();
        connectors.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(connectors)
    }

    async fn update_connector(&self, connector: ConnectorRecord) -> Result<()> {
        if !self.tables.connectors.contains_key(&connector.id) {
            return Err(QuarryError::not_found("connector"));
        }
        self.tables.connectors.insert(connector.id, connector);
        Ok(())
    }

    async fn delete_connector(&self, id: ConnectorId) -> Result<()> {
        self.tables.connectors.remove(&id);
        self.tables.sync_jobs.retain(|_, job| job.connector_id != id);
        self.tables
            .crawled_pages
            .retain(|(owner, _), _| *owner != id);
        Ok(())
    }

    async fn insert_sync_job(&self, job: SyncJob) -> Result<()> {
        self.tables.sync_jobs.insert(job.id, job);
        Ok(())
    }

    async fn update_sync_job(&self, job: SyncJob) -> Result<()> {
        if !self.tables.sync_jobs.contains_key(&job.id) {
            return Err(QuarryError::not_found("sync job"));
        }
        self.tables.sync_jobs.insert(job.id, job);
        Ok(())
    }

    async fn get_sync_job(&self, id: SyncJobId) -> Result<Option<SyncJob>> {
        Ok(self.tables.sync_jobs.get(&id).map(|j| j.clone()))
    }

    async fn list_sync_jobs(&self, connector_id: ConnectorId) -> Result<Vec<SyncJob>> {
        let mut jobs: Vec<SyncJob> = self
            .tables
            .sync_jobs
            .iter()
            .filter(|j| j.connector_id == connector_id)
            .map(|j| j.clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn upsert_crawled_page(&self, page: CrawledPage) -> Result<()> {
        self.tables
            .crawled_pages
            .insert((page.connector_id, page.url.clone()), page);
        Ok(())
    }

    async fn list_crawled_pages(&self, connector_id: ConnectorId) -> Result<Vec<CrawledPage>> {
        let mut pages: Vec<CrawledPage> = self
            .tables
            .crawled_pages
            .iter()
            .filter(|entry| entry.key().0 == connector_id)
            .map(|entry| entry.value().clone())
            .collect();
        pages.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(pages)
    }

    async fn get_page_by_hash(
        &self,
        connector_id: ConnectorId,
        content_hash: &str,
    ) -> Result<Option<CrawledPage>> {
        Ok(self
            .tables
            .crawled_pages
            .iter()
            .find(|entry| entry.key().0 == connector_id && entry.content_hash == content_hash)
            .map(|entry| entry.value().clone()))
    }
}
