//! # quarry-connectors
//!
//! Pluggable source adapters feeding domains with documents. A connector
//! is a small capability set (`test`, `preview`, `sync`; web connectors
//! add `discover` and `scrape`) over a tagged kind, not a class
//! hierarchy. Cross-connector state (sync jobs, crawled pages) lives on
//! the framework repositories, never on a variant.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

/// Typed configuration normalisation.
pub mod config;

/// File connector.
pub mod file;

/// Sync-job execution.
pub mod sync;

/// Web connector.
pub mod web;

pub use config::{
    read as read_config, validate_for_write, ApiConnectorConfig, FileConnectorConfig,
    TypedConnectorConfig, WebConnectorConfig,
};
pub use file::FileConnector;
pub use sync::{SyncOutcome, SyncRunner};
pub use web::WebConnector;

use async_trait::async_trait;
use quarry_core::error::Result;
use quarry_core::types::{ConnectorKind, ConnectorRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Result of a connectivity test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    /// Whether the connector is usable as configured.
    pub ok: bool,
    /// Human-readable detail.
    pub detail: String,
}

impl TestReport {
    /// A passing report.
    #[must_use]
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            detail: detail.into(),
        }
    }
}

/// One item in a preview listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewItem {
    /// Item name: a filename, URL, or external key.
    pub name: String,
    /// Status or classification detail.
    pub detail: String,
}

/// What a sync would touch, without running it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewReport {
    /// Sampled items.
    pub items: Vec<PreviewItem>,
}

/// The connector capability set.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Kind tag this connector serves.
    fn kind(&self) -> ConnectorKind;

    /// Validate configuration and connectivity without side effects.
    async fn test(&self, record: &ConnectorRecord) -> Result<TestReport>;

    /// Sample what a sync would ingest.
    async fn preview(&self, record: &ConnectorRecord) -> Result<PreviewReport>;

    /// Run one ingest cycle. Invoked through [`SyncRunner`], which owns
    /// the job lifecycle.
    async fn sync(&self, record: &ConnectorRecord) -> Result<sync::SyncOutcome>;
}

/// Kind-keyed connector registry.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("kinds", &self.connectors.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn kind_key(kind: &ConnectorKind) -> String {
    match kind {
        ConnectorKind::File => "file".to_string(),
        ConnectorKind::Web => "web".to_string(),
        ConnectorKind::Api { provider } => format!("api:{provider}"),
    }
}

impl ConnectorRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector for its kind.
    #[must_use]
    pub fn with(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connectors
            .insert(kind_key(&connector.kind()), connector);
        self
    }

    /// Connector serving a kind, if registered.
    #[must_use]
    pub fn get(&self, kind: &ConnectorKind) -> Option<&Arc<dyn Connector>> {
        self.connectors.get(&kind_key(kind))
    }
}
