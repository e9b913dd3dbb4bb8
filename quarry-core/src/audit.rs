//! Audit logging for authority-relevant actions.
//!
//! Events fan in over an unbounded channel; a background task writes
//! structured tracing records tagged `audit = true` and appends to the
//! audit repository when one is attached. Emission never blocks the
//! request path.

use crate::error::Result;
use crate::ids::{CorrelationId, DocumentId, DomainId, OrgId, UserId};
use crate::traits::repository::AuditRepository;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Authority-relevant actions worth a durable trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Successful login.
    Login {
        /// Who logged in.
        user_id: UserId,
    },

    /// Failed login attempt. The email is recorded, not echoed to the
    /// caller.
    LoginFailed {
        /// Attempted login email.
        email: String,
    },

    /// Document accepted for ingestion.
    FileUploaded {
        /// Uploader.
        user_id: UserId,
        /// Tenant columns.
        org_id: OrgId,
        /// Tenant columns.
        domain_id: DomainId,
        /// New document.
        document_id: DocumentId,
        /// Original filename.
        filename: String,
    },

    /// Ingestion gave up on a document.
    IngestionFailed {
        /// Tenant column.
        org_id: OrgId,
        /// Failed document.
        document_id: DocumentId,
        /// Final error.
        reason: String,
    },

    /// An authorisation check failed.
    PermissionDenied {
        /// Principal that was denied.
        user_id: UserId,
        /// Org the check ran against.
        org_id: Option<OrgId>,
        /// Permission that was required.
        permission: String,
        /// Internal detail.
        detail: String,
    },

    /// Domain or connector configuration changed.
    ConfigChanged {
        /// Who changed it.
        user_id: UserId,
        /// Tenant column.
        org_id: OrgId,
        /// What changed, field by field.
        changes: HashMap<String, String>,
    },

    /// Replayed refresh token, revoked-chain use, or similar.
    SecurityAlert {
        /// Principal involved, when known.
        user_id: Option<UserId>,
        /// What happened.
        detail: String,
    },

    /// Tenant leakage or data corruption. Critical.
    IntegrityViolation {
        /// Internal detail.
        detail: String,
    },
}

/// One durable audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique row id.
    pub id: Uuid,
    /// Request correlation id.
    pub correlation_id: CorrelationId,
    /// The event.
    pub event: AuditEvent,
    /// Org the event belongs to, when tenant-scoped.
    pub org_id: Option<OrgId>,
    /// Emission timestamp.
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Wrap an event with a fresh row id.
    #[must_use]
    pub fn new(event: AuditEvent, correlation_id: CorrelationId) -> Self {
        let org_id = match &event {
            AuditEvent::FileUploaded { org_id, .. }
            | AuditEvent::IngestionFailed { org_id, .. }
            | AuditEvent::ConfigChanged { org_id, .. } => Some(*org_id),
            AuditEvent::PermissionDenied { org_id, .. } => *org_id,
            _ => None,
        };
        Self {
            id: Uuid::new_v4(),
            correlation_id,
            event,
            org_id,
            timestamp: Utc::now(),
        }
    }
}

/// Fan-in point for audit events.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    sender: mpsc::UnboundedSender<AuditRecord>,
}

impl AuditLogger {
    /// Start the logger with a repository sink.
    #[must_use]
    pub fn new(repository: Arc<dyn AuditRepository>) -> Self {
        Self::spawn(Some(repository))
    }

    /// Start a logger that only writes tracing records. Test use.
    #[must_use]
    pub fn tracing_only() -> Self {
        Self::spawn(None)
    }

    fn spawn(repository: Option<Arc<dyn AuditRepository>>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<AuditRecord>();

        tokio::spawn(async move {
            while let Some(record) = receiver.recv().await {
                Self::trace(&record);
                if let Some(repo) = &repository {
                    if let Err(e) = repo.append(record).await {
                        error!("failed to persist audit record: {e}");
                    }
                }
            }
        });

        Self { sender }
    }

    fn trace(record: &AuditRecord) {
        let correlation = record.correlation_id.to_string();
        match &record.event {
            AuditEvent::Login { user_id } => {
                info!(audit = true, correlation = %correlation, user_id = %user_id, "login");
            }
            AuditEvent::LoginFailed { email } => {
                warn!(audit = true, correlation = %correlation, email = %email, "login failed");
            }
            AuditEvent::FileUploaded {
                user_id,
                org_id,
                domain_id,
                document_id,
                filename,
            } => {
                info!(
                    audit = true,
                    correlation = %correlation,
                    user_id = %user_id,
                    org_id = %org_id,
                    domain_id = %domain_id,
                    document_id = %document_id,
                    filename = %filename,
                    "file uploaded"
                );
            }
            AuditEvent::IngestionFailed {
                org_id,
                document_id,
                reason,
            } => {
                warn!(
                    audit = true,
                    correlation = %correlation,
                    org_id = %org_id,
                    document_id = %document_id,
                    reason = %reason,
                    "ingestion failed"
                );
            }
            AuditEvent::PermissionDenied {
                user_id,
                permission,
                detail,
                ..
            } => {
                warn!(
                    audit = true,
                    correlation = %correlation,
                    user_id = %user_id,
                    permission = %permission,
                    detail = %detail,
                    "permission denied"
                );
            }
            AuditEvent::ConfigChanged {
                user_id, org_id, ..
            } => {
                info!(
                    audit = true,
                    correlation = %correlation,
                    user_id = %user_id,
                    org_id = %org_id,
                    "configuration changed"
                );
            }
            AuditEvent::SecurityAlert { user_id, detail } => {
                warn!(
                    audit = true,
                    correlation = %correlation,
                    user_id = ?user_id,
                    detail = %detail,
                    "security alert"
                );
            }
            AuditEvent::IntegrityViolation { detail } => {
                error!(audit = true, correlation = %correlation, detail = %detail, "integrity violation");
            }
        }
    }

    /// Emit an event.
    ///
    /// # Errors
    ///
    /// Fails only if the background task has gone away.
    pub fn log(&self, event: AuditEvent, correlation_id: CorrelationId) -> Result<()> {
        self.sender
            .send(AuditRecord::new(event, correlation_id))
            .map_err(|_| crate::error::QuarryError::External {
                service: crate::error::ExternalService::Storage,
                message: "audit channel closed".to_string(),
                retryable: false,
            })
    }
}
