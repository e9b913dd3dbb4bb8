//! Response cache.
//!
//! Keyed by `(org, domain, intent, normalised query)`, so the cache is
//! tenant-keyed by construction: a stale entry can serve an outdated
//! answer, never another tenant's. Ingestion invalidates a whole
//! (org, domain) slice through [`quarry_ingest::CacheInvalidation`].

use crate::answer::QueryAnswer;
use dashmap::DashMap;
use quarry_core::scope::TenantScope;
use quarry_core::types::Intent;
use quarry_ingest::CacheInvalidation;
use std::time::{Duration, Instant};
use tracing::debug;

/// Collapse case and whitespace so trivially re-phrased queries hit.
#[must_use]
pub fn normalise_query(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
struct CachedAnswer {
    answer: QueryAnswer,
    cached_at: Instant,
}

/// TTL response cache for answered queries.
#[derive(Debug)]
pub struct ResponseCache {
    entries: DashMap<(String, String), CachedAnswer>,
    ttl: Duration,
}

impl ResponseCache {
    /// Cache with the configured answer lifetime.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn key(scope: &TenantScope, intent: &Intent, query: &str) -> (String, String) {
        (
            scope.namespace(),
            format!("{}:{}", intent.as_str(), normalise_query(query)),
        )
    }

    /// Look up a cached answer.
    #[must_use]
    pub fn get(&self, scope: &TenantScope, intent: &Intent, query: &str) -> Option<QueryAnswer> {
        let key = Self::key(scope, intent, query);
        let entry = self.entries.get(&key)?;
        if entry.cached_at.elapsed() > self.ttl {
            drop(entry);
            self.entries.remove(&key);
            return None;
        }
        Some(entry.answer.clone())
    }

    /// Store an answer.
    pub fn put(&self, scope: &TenantScope, intent: &Intent, query: &str, answer: QueryAnswer) {
        self.entries.insert(
            Self::key(scope, intent, query),
            CachedAnswer {
                answer,
                cached_at: Instant::now(),
            },
        );
    }

    /// Entry count, for tests and stats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheInvalidation for ResponseCache {
    fn invalidate_scope(&self, scope: &TenantScope) {
        let namespace = scope.namespace();
        let before = self.entries.len();
        self.entries
            .retain(|(ns, _), _| *ns != namespace && !ns.starts_with(&format!("{namespace}:")));
        debug!(
            scope = %scope,
            dropped = before - self.entries.len(),
            "response cache invalidated"
        );
    }
}
