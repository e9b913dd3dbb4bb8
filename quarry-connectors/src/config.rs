//! Connector configuration normalisation.
//!
//! Configuration arrives as free-form JSON and is persisted as received.
//! At the component boundary it is normalised to these typed structs:
//! unknown keys are rejected for writes (so typos surface immediately)
//! and tolerated for reads (so older service versions can read configs
//! written by newer ones).

use quarry_core::error::{QuarryError, Result};
use quarry_core::types::ConnectorKind;
use serde::{Deserialize, Serialize};

/// File connector settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConnectorConfig {
    /// Extensions accepted by this connector; empty accepts everything
    /// the extractors support.
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
}

/// Web connector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebConnectorConfig {
    /// Crawl starting points.
    pub seed_urls: Vec<String>,
    /// Depth override; service default when absent.
    #[serde(default)]
    pub max_depth: Option<usize>,
    /// Page-cap override.
    #[serde(default)]
    pub max_pages: Option<usize>,
    /// URLs matching any of these regexes are excluded.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Per-host delay override in milliseconds.
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

/// External-API connector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConnectorConfig {
    /// API base URL.
    pub base_url: String,
    /// Environment variable holding the API token.
    pub token_env: String,
    /// Project or space filter, provider-specific.
    #[serde(default)]
    pub project: Option<String>,
}

/// A connector config normalised to its typed form.
#[derive(Debug, Clone)]
pub enum TypedConnectorConfig {
    /// File connector.
    File(FileConnectorConfig),
    /// Web connector.
    Web(WebConnectorConfig),
    /// External-API connector.
    Api(ApiConnectorConfig),
}

fn bad(kind: &str, e: &serde_json::Error) -> QuarryError {
    QuarryError::BadRequest {
        message: format!("invalid {kind} connector configuration: {e}"),
    }
}

/// Strict parse for writes: unknown keys are rejected.
///
/// # Errors
///
/// `BadRequest` naming the first offending key or missing field.
pub fn validate_for_write(
    kind: &ConnectorKind,
    config: &serde_json::Value,
) -> Result<TypedConnectorConfig> {
    match kind {
        ConnectorKind::File => serde_json::from_value::<FileConnectorConfig>(config.clone())
            .map(TypedConnectorConfig::File)
            .map_err(|e| bad("file", &e)),
        ConnectorKind::Web => {
            let parsed = serde_json::from_value::<WebConnectorConfig>(config.clone())
                .map_err(|e| bad("web", &e))?;
            if parsed.seed_urls.is_empty() {
                return Err(QuarryError::BadRequest {
                    message: "web connector needs at least one seed URL".to_string(),
                });
            }
            Ok(TypedConnectorConfig::Web(parsed))
        }
        ConnectorKind::Api { provider } => {
            serde_json::from_value::<ApiConnectorConfig>(config.clone())
                .map(TypedConnectorConfig::Api)
                .map_err(|e| bad(provider, &e))
        }
    }
}

// Tolerant mirrors: same fields, unknown keys ignored.

#[derive(Debug, Deserialize)]
struct WebConnectorConfigRead {
    #[serde(default)]
    seed_urls: Vec<String>,
    #[serde(default)]
    max_depth: Option<usize>,
    #[serde(default)]
    max_pages: Option<usize>,
    #[serde(default)]
    exclude_patterns: Vec<String>,
    #[serde(default)]
    delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileConnectorConfigRead {
    #[serde(default)]
    allowed_extensions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiConnectorConfigRead {
    #[serde(default)]
    base_url: String,
    #[serde(default)]
    token_env: String,
    #[serde(default)]
    project: Option<String>,
}

/// Tolerant parse for reads: unknown keys from newer writers are ignored.
///
/// # Errors
///
/// `BadRequest` only when required values are missing or mistyped.
pub fn read(kind: &ConnectorKind, config: &serde_json::Value) -> Result<TypedConnectorConfig> {
    match kind {
        ConnectorKind::File => serde_json::from_value::<FileConnectorConfigRead>(config.clone())
            .map(|c| {
                TypedConnectorConfig::File(FileConnectorConfig {
                    allowed_extensions: c.allowed_extensions,
                })
            })
            .map_err(|e| bad("file", &e)),
        ConnectorKind::Web => serde_json::from_value::<WebConnectorConfigRead>(config.clone())
            .map(|c| {
                TypedConnectorConfig::Web(WebConnectorConfig {
                    seed_urls: c.seed_urls,
                    max_depth: c.max_depth,
                    max_pages: c.max_pages,
                    exclude_patterns: c.exclude_patterns,
                    delay_ms: c.delay_ms,
                })
            })
            .map_err(|e| bad("web", &e)),
        ConnectorKind::Api { provider } => {
            serde_json::from_value::<ApiConnectorConfigRead>(config.clone())
                .map(|c| {
                    TypedConnectorConfig::Api(ApiConnectorConfig {
                        base_url: c.base_url,
                        token_env: c.token_env,
                        project: c.project,
                    })
                })
                .map_err(|e| bad(provider, &e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_key_rejected_on_write() {
        let config = serde_json::json!({
            "seed_urls": ["https://site.test"],
            "max_depht": 3
        });
        let err = validate_for_write(&ConnectorKind::Web, &config).unwrap_err();
        assert!(matches!(err, QuarryError::BadRequest { .. }));
        assert!(err.user_message().contains("max_depht"));
    }

    #[test]
    fn test_unknown_key_tolerated_on_read() {
        let config = serde_json::json!({
            "seed_urls": ["https://site.test"],
            "added_by_newer_version": true
        });
        let parsed = read(&ConnectorKind::Web, &config).unwrap();
        match parsed {
            TypedConnectorConfig::Web(web) => {
                assert_eq!(web.seed_urls, vec!["https://site.test".to_string()]);
            }
            other => panic!("expected web config, got {other:?}"),
        }
    }

    #[test]
    fn test_web_config_requires_seeds() {
        let config = serde_json::json!({ "seed_urls": [] });
        let err = validate_for_write(&ConnectorKind::Web, &config).unwrap_err();
        assert!(err.user_message().contains("seed"));
    }

    #[test]
    fn test_api_config_round_trip() {
        let config = serde_json::json!({
            "base_url": "https://jira.example.com",
            "token_env": "JIRA_TOKEN",
            "project": "OPS"
        });
        let kind = ConnectorKind::Api {
            provider: "jira".to_string(),
        };
        assert!(validate_for_write(&kind, &config).is_ok());
        assert!(read(&kind, &config).is_ok());
    }
}
