//! robots.txt handling.
//!
//! One fetch per host, cached with a TTL. Parsing covers user-agent
//! groups with `Allow`/`Disallow` rules resolved by longest matching
//! prefix, the way the major crawlers do. A missing robots.txt allows
//! everything; repeated server errors deny until the cache entry expires,
//! which errs on the polite side.

use crate::fetch::Fetch;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Parsed rules for one host.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    /// (allow, path prefix) rules from the matched user-agent group.
    rules: Vec<(bool, String)>,
    /// Deny everything, used after repeated robots fetch failures.
    deny_all: bool,
}

impl RobotsRules {
    /// Rules that allow everything.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Rules that deny everything.
    #[must_use]
    pub fn deny_all() -> Self {
        Self {
            rules: Vec::new(),
            deny_all: true,
        }
    }

    /// Whether a path may be fetched.
    #[must_use]
    pub fn allows(&self, path: &str) -> bool {
        if self.deny_all {
            return false;
        }

        // Longest matching prefix wins; Allow beats Disallow on equal
        // length.
        let mut verdict = true;
        let mut longest = 0;
        for (allow, prefix) in &self.rules {
            if prefix.is_empty() {
                continue;
            }
            if path.starts_with(prefix.as_str()) {
                let length = prefix.len();
                if length > longest || (length == longest && *allow) {
                    longest = length;
                    verdict = *allow;
                }
            }
        }
        verdict
    }

    /// Parse a robots.txt body for a crawler user agent.
    #[must_use]
    pub fn parse(body: &str, user_agent: &str) -> Self {
        let user_agent = user_agent.to_lowercase();
        let mut generic: Vec<(bool, String)> = Vec::new();
        let mut specific: Vec<(bool, String)> = Vec::new();

        let mut current_agents: Vec<String> = Vec::new();
        let mut current_rules: Vec<(bool, String)> = Vec::new();
        let mut in_group = false;

        let mut flush =
            |agents: &[String], rules: &[(bool, String)], generic: &mut Vec<(bool, String)>, specific: &mut Vec<(bool, String)>| {
                for agent in agents {
                    if agent == "*" {
                        generic.extend(rules.iter().cloned());
                    } else if user_agent.contains(agent.as_str()) {
                        specific.extend(rules.iter().cloned());
                    }
                }
            };

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_lowercase();
            let value = value.trim();

            match field.as_str() {
                "user-agent" => {
                    if in_group {
                        // A user-agent line after rules opens a new group.
                        flush(&current_agents, &current_rules, &mut generic, &mut specific);
                        current_agents.clear();
                        current_rules.clear();
                        in_group = false;
                    }
                    current_agents.push(value.to_lowercase());
                }
                "disallow" => {
                    in_group = true;
                    if !value.is_empty() {
                        current_rules.push((false, value.to_string()));
                    }
                }
                "allow" => {
                    in_group = true;
                    if !value.is_empty() {
                        current_rules.push((true, value.to_string()));
                    }
                }
                _ => {}
            }
        }
        flush(&current_agents, &current_rules, &mut generic, &mut specific);

        // A specific group overrides the generic one entirely.
        let rules = if specific.is_empty() { generic } else { specific };
        Self {
            rules,
            deny_all: false,
        }
    }
}

#[derive(Debug)]
struct CacheSlot {
    rules: Arc<RobotsRules>,
    fetched_at: Instant,
}

/// Per-host robots cache with TTL and single-writer-per-host insertion.
pub struct RobotsCache {
    fetcher: Arc<dyn Fetch>,
    ttl: Duration,
    user_agent: String,
    hosts: DashMap<String, Arc<Mutex<Option<CacheSlot>>>>,
}

impl std::fmt::Debug for RobotsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotsCache")
            .field("ttl", &self.ttl)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl RobotsCache {
    /// Cache fetching through `fetcher` with the given entry lifetime.
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetch>, ttl: Duration, user_agent: &str) -> Self {
        Self {
            fetcher,
            ttl,
            user_agent: user_agent.to_string(),
            hosts: DashMap::new(),
        }
    }

    /// Whether `url` may be fetched according to its host's robots.txt.
    pub async fn allows(&self, url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str().map(ToString::to_string) else {
            return false;
        };
        let scheme = parsed.scheme();
        let path = parsed.path();

        let rules = self.rules_for(&host, scheme).await;
        rules.allows(path)
    }

    async fn rules_for(&self, host: &str, scheme: &str) -> Arc<RobotsRules> {
        let slot = self
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        // Fast path under the per-host lock.
        {
            let guard = slot.lock();
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    return cached.rules.clone();
                }
            }
        }

        // Fetch outside the lock, then double-check before writing: a
        // racing refresher may have beaten us.
        let fetched = self.fetch_rules(host, scheme).await;
        let mut guard = slot.lock();
        if let Some(cached) = guard.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return cached.rules.clone();
            }
        }
        let rules = Arc::new(fetched);
        *guard = Some(CacheSlot {
            rules: rules.clone(),
            fetched_at: Instant::now(),
        });
        rules
    }

    async fn fetch_rules(&self, host: &str, scheme: &str) -> RobotsRules {
        let robots_url = format!("{scheme}://{host}/robots.txt");
        match self.fetcher.fetch(&robots_url).await {
            Ok(page) if page.status == 200 => {
                let body = String::from_utf8_lossy(&page.body);
                debug!(host, "robots.txt parsed");
                RobotsRules::parse(&body, &self.user_agent)
            }
            Ok(page) if (400..500).contains(&page.status) => {
                // No robots.txt means no restrictions.
                RobotsRules::allow_all()
            }
            Ok(page) => {
                warn!(host, status = page.status, "robots.txt server error, denying host");
                RobotsRules::deny_all()
            }
            Err(e) => {
                warn!(host, "robots.txt fetch failed, denying host: {e}");
                RobotsRules::deny_all()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StubFetcher;

    #[test]
    fn test_parse_disallow_and_allow() {
        let body = "User-agent: *\nDisallow: /admin\nAllow: /admin/public\nDisallow: /tmp\n";
        let rules = RobotsRules::parse(body, "quarry-crawler");

        assert!(rules.allows("/docs/intro"));
        assert!(!rules.allows("/admin/settings"));
        assert!(rules.allows("/admin/public/page"));
        assert!(!rules.allows("/tmp/file"));
    }

    #[test]
    fn test_specific_agent_group_overrides_generic() {
        let body = "User-agent: *\nDisallow: /\n\nUser-agent: quarry-crawler\nDisallow: /private\n";
        let rules = RobotsRules::parse(body, "quarry-crawler/0.4");

        assert!(rules.allows("/docs"));
        assert!(!rules.allows("/private/x"));
    }

    #[test]
    fn test_empty_disallow_allows_everything() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow:\n", "quarry-crawler");
        assert!(rules.allows("/anything"));
    }

    #[tokio::test]
    async fn test_cache_fetches_once_per_host() {
        let stub = Arc::new(
            StubFetcher::new()
                .with_page("https://site.test/robots.txt", 200, "User-agent: *\nDisallow: /secret\n"),
        );
        let cache = RobotsCache::new(stub.clone(), Duration::from_secs(60), "quarry-crawler");

        assert!(cache.allows("https://site.test/docs").await);
        assert!(!cache.allows("https://site.test/secret/page").await);
        assert!(cache.allows("https://site.test/other").await);

        assert_eq!(stub.fetched().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_robots_allows_all() {
        let stub = Arc::new(StubFetcher::new().with_page("https://open.test/robots.txt", 404, ""));
        let cache = RobotsCache::new(stub, Duration::from_secs(60), "quarry-crawler");
        assert!(cache.allows("https://open.test/anything").await);
    }

    #[tokio::test]
    async fn test_server_error_denies_until_expiry() {
        let stub = Arc::new(StubFetcher::new().with_page("https://down.test/robots.txt", 503, ""));
        let cache = RobotsCache::new(stub, Duration::from_secs(60), "quarry-crawler");
        assert!(!cache.allows("https://down.test/docs").await);
    }
}
