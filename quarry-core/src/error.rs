//! Error taxonomy shared by every quarry crate.
//!
//! Errors are grouped by kind: input, authority, state, external, and
//! invariant. Authority and invariant errors short-circuit at the boundary
//! and are never retried; external errors carry a `retryable` flag so the
//! owning component can apply its own back-off policy before the error
//! bubbles.

use thiserror::Error;

/// Convenience result alias used across the workspace.
pub type Result<T> = std::result::Result<T, QuarryError>;

/// Which remote collaborator an external failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalService {
    /// Embedding provider.
    Embedding,
    /// Chat completion provider.
    Llm,
    /// Object or relational storage.
    Storage,
    /// Web page fetch during a crawl.
    Scrape,
}

impl std::fmt::Display for ExternalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embedding => write!(f, "embedding"),
            Self::Llm => write!(f, "llm"),
            Self::Storage => write!(f, "storage"),
            Self::Scrape => write!(f, "scrape"),
        }
    }
}

/// Workspace-wide error type.
#[derive(Debug, Error)]
pub enum QuarryError {
    /// Malformed or otherwise unusable request input.
    #[error("bad request: {message}")]
    BadRequest {
        /// What was wrong with the input.
        message: String,
    },

    /// Upload content type is not one of the supported extractors.
    #[error("unsupported content type: {detected}")]
    UnsupportedType {
        /// Type detected from magic bytes.
        detected: String,
    },

    /// Upload exceeds the configured byte ceiling.
    #[error("upload of {size} bytes exceeds limit of {limit}")]
    TooLarge {
        /// Size of the rejected payload.
        size: u64,
        /// Configured ceiling.
        limit: u64,
    },

    /// Identical content already exists in this (org, domain).
    #[error("duplicate content hash {hash}")]
    DuplicateHash {
        /// Hash of the duplicate payload.
        hash: String,
        /// Document that already holds this content.
        existing_id: String,
    },

    /// A user-supplied pattern failed to compile.
    #[error("invalid pattern: {message}")]
    RegexInvalid {
        /// Compiler diagnostic.
        message: String,
    },

    /// Missing, expired, or unverifiable credentials.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Authenticated principal lacks the required permission.
    #[error("permission denied: {detail}")]
    PermissionDenied {
        /// Internal detail, audit-only; never shown to the caller.
        detail: String,
    },

    /// A row's tenant columns disagree with the request scope.
    #[error("tenant mismatch: {detail}")]
    TenantMismatch {
        /// Internal detail, audit-only.
        detail: String,
    },

    /// Requested entity does not exist in the caller's scope.
    #[error("{entity} not found")]
    NotFound {
        /// Entity kind, e.g. "document" or "domain".
        entity: String,
    },

    /// Concurrent modification or state-machine violation.
    #[error("conflict: {message}")]
    Conflict {
        /// What conflicted.
        message: String,
    },

    /// A bounded queue refused new work.
    #[error("overloaded: {queue} queue is full")]
    Overloaded {
        /// Which queue shed the load.
        queue: String,
    },

    /// Caller disconnected or the deadline elapsed.
    #[error("cancelled: {operation}")]
    Cancelled {
        /// Operation that observed the cancellation.
        operation: String,
    },

    /// A remote collaborator failed.
    #[error("{service} call failed: {message}")]
    External {
        /// Which collaborator.
        service: ExternalService,
        /// Diagnostic message.
        message: String,
        /// Whether the caller may retry.
        retryable: bool,
    },

    /// Tenant leakage, orphan chunk, or similar corruption. Fatal for the
    /// request; raises a critical audit event at the boundary.
    #[error("integrity violation: {detail}")]
    IntegrityViolation {
        /// Internal detail, audit-only.
        detail: String,
    },
}

impl QuarryError {
    /// Build an external error for the given service.
    pub fn external(
        service: ExternalService,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self::External {
            service,
            message: message.into(),
            retryable,
        }
    }

    /// Shorthand for a not-found error.
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    /// Shorthand for a permission denial. The detail is audit-only.
    pub fn denied(detail: impl Into<String>) -> Self {
        Self::PermissionDenied {
            detail: detail.into(),
        }
    }

    /// Whether the component that produced this error may retry it.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::External {
                retryable: true,
                ..
            } | Self::Overloaded { .. }
        )
    }

    /// HTTP status the transport shell maps this error to.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest { .. } | Self::RegexInvalid { .. } => 400,
            Self::Unauthenticated => 401,
            Self::PermissionDenied { .. } | Self::TenantMismatch { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } | Self::DuplicateHash { .. } => 409,
            Self::TooLarge { .. } => 413,
            Self::UnsupportedType { .. } => 415,
            Self::Overloaded { .. } => 429,
            Self::Cancelled { .. } => 499,
            Self::External { .. } => 502,
            Self::IntegrityViolation { .. } => 500,
        }
    }

    /// Message safe to show the caller.
    ///
    /// Authority errors are opaque, input errors are specific enough to fix
    /// the input, external errors collapse to a generic unavailability
    /// notice. Detail lives in the audit trail.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest { message } => message.clone(),
            Self::UnsupportedType { detected } => {
                format!("unsupported file type: {detected}")
            }
            Self::TooLarge { limit, .. } => {
                format!("file exceeds the {limit} byte upload limit")
            }
            Self::DuplicateHash { .. } => "identical content already exists".to_string(),
            Self::RegexInvalid { message } => format!("invalid pattern: {message}"),
            Self::Unauthenticated => "authentication required".to_string(),
            Self::PermissionDenied { .. } | Self::TenantMismatch { .. } => {
                "access denied".to_string()
            }
            Self::NotFound { entity } => format!("{entity} not found"),
            Self::Conflict { message } => message.clone(),
            Self::Overloaded { .. } => "service is busy, try again shortly".to_string(),
            Self::Cancelled { .. } => "request cancelled".to_string(),
            Self::External { .. } | Self::IntegrityViolation { .. } => {
                "service temporarily unavailable".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let transient = QuarryError::external(ExternalService::Embedding, "503", true);
        assert!(transient.is_retryable());

        let terminal = QuarryError::external(ExternalService::Llm, "401", false);
        assert!(!terminal.is_retryable());

        assert!(!QuarryError::Unauthenticated.is_retryable());
        assert!(QuarryError::Overloaded {
            queue: "ingest".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            QuarryError::DuplicateHash {
                hash: "abc".to_string(),
                existing_id: "doc-1".to_string()
            }
            .http_status(),
            409
        );
        assert_eq!(QuarryError::Unauthenticated.http_status(), 401);
        assert_eq!(QuarryError::denied("role lacks files:write").http_status(), 403);
        assert_eq!(QuarryError::not_found("document").http_status(), 404);
        assert_eq!(
            QuarryError::UnsupportedType {
                detected: "application/x-tar".to_string()
            }
            .http_status(),
            415
        );
    }

    #[test]
    fn test_authority_messages_are_opaque() {
        let err = QuarryError::denied("user u1 lacks chat:write on org o1");
        assert_eq!(err.user_message(), "access denied");
        assert!(!err.user_message().contains("chat:write"));

        let err = QuarryError::TenantMismatch {
            detail: "row belongs to org o2".to_string(),
        };
        assert_eq!(err.user_message(), "access denied");
    }

    #[test]
    fn test_external_messages_are_generic() {
        let err = QuarryError::external(ExternalService::Llm, "socket reset by peer", true);
        assert_eq!(err.user_message(), "service temporarily unavailable");
    }
}
