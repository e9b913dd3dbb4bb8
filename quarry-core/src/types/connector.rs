//! Connector records and sync-job lifecycle.

use crate::ids::{ConnectorId, DomainId, OrgId, SyncJobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source type a connector feeds documents from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorKind {
    /// Direct file uploads.
    File,
    /// Web crawl.
    Web,
    /// External API source.
    Api {
        /// Provider tag, e.g. `jira` or `confluence`.
        provider: String,
    },
}

/// A configured source adapter owned by one (org, domain).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorRecord {
    /// Unique id.
    pub id: ConnectorId,
    /// Owning org.
    pub org_id: OrgId,
    /// Owning domain.
    pub domain_id: DomainId,
    /// Source type.
    pub kind: ConnectorKind,
    /// Display name.
    pub name: String,
    /// Raw configuration blob, persisted as received. Typed validation
    /// happens at the connector boundary.
    pub config: serde_json::Value,
    /// Disabled connectors are skipped by the scheduler.
    pub enabled: bool,
    /// Optional cron-like schedule expression.
    pub schedule: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of one sync invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncJobStatus {
    /// Queued.
    Pending,
    /// A worker is on it.
    Running,
    /// Finished without error.
    Success,
    /// Terminated with an error.
    Failed,
}

impl SyncJobStatus {
    /// Whether the job has finished.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// One invocation of a connector's ingest cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    /// Unique id.
    pub id: SyncJobId,
    /// Owning connector.
    pub connector_id: ConnectorId,
    /// Denormalised tenant column.
    pub org_id: OrgId,
    /// Lifecycle state. Every job reaches `Success` or `Failed`; the
    /// runner maps panics and cancellation to `Failed`.
    pub status: SyncJobStatus,
    /// Items examined.
    pub items_processed: usize,
    /// Items successfully ingested.
    pub items_succeeded: usize,
    /// Items that errored.
    pub items_failed: usize,
    /// Failure reason when status is `Failed`.
    pub error: Option<String>,
    /// When the worker picked the job up.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Enqueue timestamp.
    pub created_at: DateTime<Utc>,
}

impl SyncJob {
    /// A freshly enqueued job for a connector.
    #[must_use]
    pub fn pending(connector_id: ConnectorId, org_id: OrgId) -> Self {
        Self {
            id: SyncJobId::new(),
            connector_id,
            org_id,
            status: SyncJobStatus::Pending,
            items_processed: 0,
            items_succeeded: 0,
            items_failed: 0,
            error: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }
}
