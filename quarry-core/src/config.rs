//! Service configuration.
//!
//! Every knob is an environment variable with a default; components receive
//! the sections they need by explicit reference, never through module
//! state. The embedding dimension is pinned here and enforced by the
//! vector store for the life of the process.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// External service endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Relational store DSN.
    pub database_url: String,
    /// Cache store DSN.
    pub redis_url: String,
    /// Object store endpoint.
    pub object_store_endpoint: String,
    /// Object store access key.
    pub object_store_access_key: String,
    /// Object store secret.
    pub object_store_secret: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/quarry".to_string(),
            redis_url: "redis://localhost".to_string(),
            object_store_endpoint: "http://localhost:9000".to_string(),
            object_store_access_key: String::new(),
            object_store_secret: String::new(),
        }
    }
}

/// Token issuance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret.
    pub jwt_secret: String,
    /// Access-token lifetime.
    pub access_token_ttl: Duration,
    /// Refresh-token lifetime.
    pub refresh_token_ttl: Duration,
    /// bcrypt cost factor.
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "development-secret-do-not-deploy".to_string(),
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: Duration::from_secs(14 * 24 * 60 * 60),
            bcrypt_cost: 10,
        }
    }
}

/// Model selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Embedding dimension, pinned for the process lifetime.
    pub embedding_dimension: usize,
    /// Chat provider.
    pub llm_provider: String,
    /// Default chat model when a domain does not override it.
    pub llm_model_default: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 1536,
            llm_provider: "openai".to_string(),
            llm_model_default: "gpt-4o-mini".to_string(),
        }
    }
}

/// Ingestion limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Upload byte ceiling.
    pub upload_max_bytes: u64,
    /// Target chunk size in tokens.
    pub chunk_target_tokens: usize,
    /// Chunk overlap in tokens.
    pub chunk_overlap_tokens: usize,
    /// Worker retry budget per document.
    pub max_attempts: u32,
    /// Queue capacity before producers see `Overloaded`.
    pub queue_capacity: usize,
    /// Cap on extracted images per document.
    pub max_images_per_document: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            upload_max_bytes: 50 * 1024 * 1024,
            chunk_target_tokens: 512,
            chunk_overlap_tokens: 64,
            max_attempts: 3,
            queue_capacity: 256,
            max_images_per_document: 10,
        }
    }
}

/// Scraper politeness and bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Link-walk depth limit.
    pub max_depth: usize,
    /// Frontier size cap.
    pub max_pages: usize,
    /// Starting inter-request delay per host.
    pub base_delay: Duration,
    /// Concurrent fetches per host.
    pub host_concurrency: usize,
    /// Fetch retry budget.
    pub max_retries: u32,
    /// robots.txt cache lifetime.
    pub robots_ttl: Duration,
    /// Quality floor for ingestion.
    pub quality_threshold: f32,
    /// Token-set Jaccard above which a page counts as a near-duplicate.
    pub near_duplicate_threshold: f32,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 500,
            base_delay: Duration::from_millis(500),
            host_concurrency: 2,
            max_retries: 3,
            robots_ttl: Duration::from_secs(3600),
            quality_threshold: 0.35,
            near_duplicate_threshold: 0.9,
        }
    }
}

/// Query-pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Response-cache lifetime.
    pub cache_ttl: Duration,
    /// Retrieval fan-out.
    pub k_retrieve: usize,
    /// Similarity floor.
    pub min_confidence: f32,
    /// If fewer than this many hits survive the floor, k is widened once.
    pub widen_below: usize,
    /// Conversation turns carried into synthesis.
    pub history_window: usize,
    /// Synthesis retry budget.
    pub llm_max_retries: u32,
    /// Overall request deadline.
    pub request_timeout: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            k_retrieve: 20,
            min_confidence: 0.25,
            widen_below: 3,
            history_window: 6,
            llm_max_retries: 2,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Top-level configuration, built once during process init and passed by
/// explicit context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// External endpoints.
    pub endpoints: EndpointConfig,
    /// Auth settings.
    pub auth: AuthConfig,
    /// Model selection.
    pub models: ModelConfig,
    /// Ingestion limits.
    pub ingest: IngestConfig,
    /// Scraper bounds.
    pub scraper: ScraperConfig,
    /// Query tuning.
    pub query: QueryConfig,
    /// Verbose error surfaces.
    pub debug: bool,
}

impl ServiceConfig {
    /// Read every setting from the environment, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoints: EndpointConfig {
                database_url: var_or("DATABASE_URL", &defaults.endpoints.database_url),
                redis_url: var_or("REDIS_URL", &defaults.endpoints.redis_url),
                object_store_endpoint: var_or(
                    "OBJECT_STORE_ENDPOINT",
                    &defaults.endpoints.object_store_endpoint,
                ),
                object_store_access_key: var_or("OBJECT_STORE_ACCESS_KEY", ""),
                object_store_secret: var_or("OBJECT_STORE_SECRET", ""),
            },
            auth: AuthConfig {
                jwt_secret: var_or("JWT_SECRET", &defaults.auth.jwt_secret),
                access_token_ttl: Duration::from_secs(parse_or(
                    "ACCESS_TOKEN_TTL",
                    defaults.auth.access_token_ttl.as_secs(),
                )),
                refresh_token_ttl: Duration::from_secs(parse_or(
                    "REFRESH_TOKEN_TTL",
                    defaults.auth.refresh_token_ttl.as_secs(),
                )),
                bcrypt_cost: parse_or("BCRYPT_COST", defaults.auth.bcrypt_cost),
            },
            models: ModelConfig {
                embedding_model: var_or("EMBEDDING_MODEL", &defaults.models.embedding_model),
                embedding_dimension: parse_or(
                    "EMBEDDING_DIMENSION",
                    defaults.models.embedding_dimension,
                ),
                llm_provider: var_or("LLM_PROVIDER", &defaults.models.llm_provider),
                llm_model_default: var_or("LLM_MODEL_DEFAULT", &defaults.models.llm_model_default),
            },
            ingest: IngestConfig {
                upload_max_bytes: parse_or("UPLOAD_MAX_BYTES", defaults.ingest.upload_max_bytes),
                chunk_target_tokens: parse_or(
                    "CHUNK_TARGET_TOKENS",
                    defaults.ingest.chunk_target_tokens,
                ),
                chunk_overlap_tokens: parse_or(
                    "CHUNK_OVERLAP_TOKENS",
                    defaults.ingest.chunk_overlap_tokens,
                ),
                ..defaults.ingest
            },
            scraper: ScraperConfig {
                max_depth: parse_or("SCRAPER_MAX_DEPTH", defaults.scraper.max_depth),
                max_pages: parse_or("SCRAPER_MAX_PAGES", defaults.scraper.max_pages),
                base_delay: Duration::from_millis(parse_or(
                    "SCRAPER_BASE_DELAY_MS",
                    u64::try_from(defaults.scraper.base_delay.as_millis()).unwrap_or(500),
                )),
                host_concurrency: parse_or(
                    "SCRAPER_HOST_CONCURRENCY",
                    defaults.scraper.host_concurrency,
                ),
                ..defaults.scraper
            },
            query: QueryConfig {
                cache_ttl: Duration::from_secs(parse_or(
                    "QUERY_CACHE_TTL_S",
                    defaults.query.cache_ttl.as_secs(),
                )),
                k_retrieve: parse_or("QUERY_K_RETRIEVE", defaults.query.k_retrieve),
                min_confidence: parse_or("QUERY_MIN_CONFIDENCE", defaults.query.min_confidence),
                ..defaults.query
            },
            debug: parse_or("DEBUG", false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = ServiceConfig::default();
        assert_eq!(config.models.embedding_dimension, 1536);
        assert_eq!(config.query.k_retrieve, 20);
        assert_eq!(config.auth.access_token_ttl, Duration::from_secs(900));
        assert!(config.ingest.chunk_overlap_tokens < config.ingest.chunk_target_tokens);
        assert!(!config.debug);
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("QUERY_K_RETRIEVE", "7");
        env::set_var("EMBEDDING_DIMENSION", "384");
        let config = ServiceConfig::from_env();
        assert_eq!(config.query.k_retrieve, 7);
        assert_eq!(config.models.embedding_dimension, 384);
        env::remove_var("QUERY_K_RETRIEVE");
        env::remove_var("EMBEDDING_DIMENSION");
    }
}
