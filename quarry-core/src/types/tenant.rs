//! Organisations, users, roles, and domains.

use crate::ids::{DomainId, OrgId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Top-level tenant. Owns everything transitively; deletion cascades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    /// Unique id.
    pub id: OrgId,
    /// URL-safe human-readable slug, unique across the service.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A user account. Membership in organisations is carried by [`OrgMember`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique id.
    pub id: UserId,
    /// Login email, unique across the service.
    pub email: String,
    /// bcrypt credential hash.
    pub password_hash: String,
    /// Inactive users cannot authenticate.
    pub active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Membership of a user in an organisation with a role.
///
/// At most one membership per user is `active`, used to resolve the default
/// org context when a request does not name one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgMember {
    /// Organisation.
    pub org_id: OrgId,
    /// Member.
    pub user_id: UserId,
    /// Role name, resolved against the org's role set.
    pub role: String,
    /// Whether this is the user's default context.
    pub active: bool,
}

/// A permission string of the form `resource:action`, e.g. `files:write`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission(pub String);

impl Permission {
    /// Build from resource and action parts.
    #[must_use]
    pub fn new(resource: &str, action: &str) -> Self {
        Self(format!("{resource}:{action}"))
    }

    /// The `resource` half.
    #[must_use]
    pub fn resource(&self) -> &str {
        self.0.split(':').next().unwrap_or("")
    }
}

impl From<&str> for Permission {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named permission set assigned per (user, org).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Role name, unique within the org.
    pub name: String,
    /// Granted permissions. The `admin` role additionally holds the
    /// implicit wildcard.
    pub permissions: HashSet<Permission>,
}

impl Role {
    /// Built-in admin role.
    #[must_use]
    pub fn admin() -> Self {
        Self {
            name: "admin".to_string(),
            permissions: HashSet::new(),
        }
    }

    /// Whether this role grants `permission`. Admin grants everything.
    #[must_use]
    pub fn grants(&self, permission: &Permission) -> bool {
        self.name == "admin" || self.permissions.contains(permission)
    }
}

/// Who may read a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Every member of the org.
    Public,
    /// Only org admins.
    Private,
    /// Only users on the explicit allow list.
    Restricted {
        /// Users allowed in.
        allowed_users: HashSet<UserId>,
    },
}

/// Provider and prompt configuration used when answering from a domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Chat provider, e.g. `openai`.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Response token ceiling.
    pub max_tokens: usize,
    /// Answers below this confidence are marked for hand-off.
    pub confidence_threshold: f32,
    /// System prompt prepended to every synthesis call.
    pub system_prompt: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 1024,
            confidence_threshold: 0.5,
            system_prompt: "You are a helpful assistant. Answer strictly from the \
                            provided sources and cite them."
                .to_string(),
        }
    }
}

/// A knowledge partition inside one org. Cascade-deletes all its data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    /// Unique id.
    pub id: DomainId,
    /// Owning org.
    pub org_id: OrgId,
    /// Name, unique within the org.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Template tag, e.g. `support` or `docs`.
    pub template: String,
    /// Answering configuration.
    pub ai_config: AiConfig,
    /// Read access control.
    pub access_mode: AccessMode,
    /// Free-form settings, persisted as-is.
    pub settings: HashMap<String, serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
