//! Per-org usage metering.

use parking_lot::RwLock;
use quarry_core::ids::OrgId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Counters accumulated for one org.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OrgUsage {
    /// Documents accepted for ingestion.
    pub documents_indexed: u64,
    /// Bytes written to the blob store.
    pub bytes_stored: u64,
    /// Embedding vectors generated (cache hits excluded).
    pub embeddings_generated: u64,
    /// Vector searches run.
    pub searches_performed: u64,
}

/// Thread-safe per-org usage accumulator.
#[derive(Debug, Default)]
pub struct UsageMeter {
    usage: RwLock<HashMap<OrgId, OrgUsage>>,
}

impl UsageMeter {
    /// Empty meter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted upload.
    pub fn add_document(&self, org_id: OrgId, bytes: u64) {
        let mut usage = self.usage.write();
        let entry = usage.entry(org_id).or_default();
        entry.documents_indexed += 1;
        entry.bytes_stored += bytes;
    }

    /// Record freshly generated embeddings.
    pub fn add_embeddings(&self, org_id: OrgId, count: u64) {
        self.usage.write().entry(org_id).or_default().embeddings_generated += count;
    }

    /// Record one search.
    pub fn add_search(&self, org_id: OrgId) {
        self.usage.write().entry(org_id).or_default().searches_performed += 1;
    }

    /// Current counters for an org.
    #[must_use]
    pub fn snapshot(&self, org_id: OrgId) -> OrgUsage {
        self.usage.read().get(&org_id).copied().unwrap_or_default()
    }

    /// Drop an org's counters, for tenant deletion.
    pub fn clear(&self, org_id: OrgId) {
        self.usage.write().remove(&org_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate_per_org() {
        let meter = UsageMeter::new();
        let a = OrgId::new();
        let b = OrgId::new();

        meter.add_document(a, 100);
        meter.add_document(a, 50);
        meter.add_embeddings(a, 7);
        meter.add_search(b);

        let usage_a = meter.snapshot(a);
        assert_eq!(usage_a.documents_indexed, 2);
        assert_eq!(usage_a.bytes_stored, 150);
        assert_eq!(usage_a.embeddings_generated, 7);
        assert_eq!(usage_a.searches_performed, 0);

        assert_eq!(meter.snapshot(b).searches_performed, 1);

        meter.clear(a);
        assert_eq!(meter.snapshot(a).documents_indexed, 0);
    }
}
