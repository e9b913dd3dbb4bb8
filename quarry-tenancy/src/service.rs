//! Tenant service: authentication, token verification, and permission
//! checks.
//!
//! This is the authority boundary. Credential and permission failures
//! return opaque user-facing errors; the specific reason is written only to
//! the audit trail.

use crate::password::{hash_password, verify_password};
use crate::session::{RefreshOutcome, SessionManager};
use crate::token::{Claims, TokenIssuer};
use chrono::Utc;
use quarry_core::audit::{AuditEvent, AuditLogger};
use quarry_core::config::AuthConfig;
use quarry_core::error::{QuarryError, Result};
use quarry_core::ids::{CorrelationId, DomainId, OrgId, UserId};
use quarry_core::scope::TenantScope;
use quarry_core::traits::TenantRepository;
use quarry_core::types::{
    AccessMode, Domain, OrgMember, Organization, Permission, Role, User,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Tokens handed back on login or refresh.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    /// Short-lived JWT.
    pub access_token: String,
    /// Single-use rotation token.
    pub refresh_token: String,
    /// Authenticated user.
    pub user: User,
}

/// The tenant scope a verified request operates under.
#[derive(Debug, Clone)]
pub struct UserScope {
    /// Org context.
    pub org_id: OrgId,
    /// Domains the user may read.
    pub domain_ids: HashSet<DomainId>,
}

/// Identity, sessions, and RBAC in one place.
pub struct TenantService {
    repo: Arc<dyn TenantRepository>,
    sessions: SessionManager,
    tokens: TokenIssuer,
    audit: AuditLogger,
    config: AuthConfig,
}

impl std::fmt::Debug for TenantService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantService").finish_non_exhaustive()
    }
}

impl TenantService {
    /// Wire the service.
    #[must_use]
    pub fn new(repo: Arc<dyn TenantRepository>, audit: AuditLogger, config: AuthConfig) -> Self {
        let tokens = TokenIssuer::new(&config.jwt_secret, config.access_token_ttl);
        Self {
            repo,
            sessions: SessionManager::new(),
            tokens,
            audit,
            config,
        }
    }

    /// Register a user and their personal organisation.
    ///
    /// The new user becomes the admin of a personal org so a first login
    /// has an org context to land in.
    ///
    /// # Errors
    ///
    /// `Conflict` when the email is already taken.
    pub async fn register(&self, email: &str, password: &str) -> Result<User> {
        if password.len() < 8 {
            return Err(QuarryError::BadRequest {
                message: "password must be at least 8 characters".to_string(),
            });
        }
        if self.repo.get_user_by_email(email).await?.is_some() {
            return Err(QuarryError::Conflict {
                message: "email already registered".to_string(),
            });
        }

        let user = User {
            id: UserId::new(),
            email: email.to_string(),
            password_hash: hash_password(password, self.config.bcrypt_cost)?,
            active: true,
            created_at: Utc::now(),
        };
        self.repo.create_user(user.clone()).await?;

        let org = Organization {
            id: OrgId::new(),
            slug: format!("user-{}", &user.id.to_string()[..8]),
            name: format!("{email}'s workspace"),
            created_at: Utc::now(),
        };
        self.repo.create_org(org.clone()).await?;
        self.repo.upsert_role(org.id, Role::admin()).await?;
        self.repo
            .upsert_member(OrgMember {
                org_id: org.id,
                user_id: user.id,
                role: "admin".to_string(),
                active: true,
            })
            .await?;

        debug!(user_id = %user.id, "registered user");
        Ok(user)
    }

    /// Verify credentials and open a session.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` for any credential failure; the distinction
    /// between unknown email, wrong password, and inactive account lives
    /// only in audit.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        correlation: CorrelationId,
    ) -> Result<IssuedTokens> {
        let failed = || {
            let _ = self.audit.log(
                AuditEvent::LoginFailed {
                    email: email.to_string(),
                },
                correlation,
            );
            QuarryError::Unauthenticated
        };

        let Some(user) = self.repo.get_user_by_email(email).await? else {
            return Err(failed());
        };
        if !user.active || !verify_password(password, &user.password_hash) {
            return Err(failed());
        }

        let org_id = self.default_org(user.id).await?.ok_or_else(failed)?;
        let session = self
            .sessions
            .create(user.id, org_id, self.config.refresh_token_ttl);
        let access_token = self.tokens.issue(user.id, org_id, session.id)?;

        self.audit
            .log(AuditEvent::Login { user_id: user.id }, correlation)?;

        Ok(IssuedTokens {
            access_token,
            refresh_token: session.refresh_token,
            user,
        })
    }

    /// Rotate a refresh token.
    ///
    /// Replaying an already-rotated token revokes the whole chain and
    /// raises a security event.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` for every failure mode.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        correlation: CorrelationId,
    ) -> Result<IssuedTokens> {
        match self
            .sessions
            .refresh(refresh_token, self.config.refresh_token_ttl)
        {
            RefreshOutcome::Rotated(session) => {
                let user = self
                    .repo
                    .get_user(session.user_id)
                    .await?
                    .ok_or(QuarryError::Unauthenticated)?;
                let access_token =
                    self.tokens
                        .issue(session.user_id, session.org_id, session.id)?;
                Ok(IssuedTokens {
                    access_token,
                    refresh_token: session.refresh_token,
                    user,
                })
            }
            RefreshOutcome::Reused { user_id, revoked } => {
                self.audit.log(
                    AuditEvent::SecurityAlert {
                        user_id: Some(user_id),
                        detail: format!(
                            "refresh token replayed; revoked {revoked} sessions on the chain"
                        ),
                    },
                    correlation,
                )?;
                Err(QuarryError::Unauthenticated)
            }
            RefreshOutcome::Expired | RefreshOutcome::Unknown => {
                Err(QuarryError::Unauthenticated)
            }
        }
    }

    /// Validate an access token and its backing session.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` when the signature, expiry, or session check
    /// fails.
    pub fn verify(&self, access_token: &str) -> Result<Claims> {
        let claims = self.tokens.verify(access_token)?;
        if !self.sessions.is_active(claims.sid) {
            return Err(QuarryError::Unauthenticated);
        }
        Ok(claims)
    }

    /// Log a session out.
    pub fn revoke_session(&self, claims: &Claims) {
        self.sessions.revoke(claims.sid);
    }

    /// Fail unless `user` holds `permission` on `org` and, when given, may
    /// read `domain`.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` with an opaque user message; detail goes to
    /// audit.
    pub async fn require(
        &self,
        user_id: UserId,
        permission: &Permission,
        org_id: OrgId,
        domain_id: Option<DomainId>,
        correlation: CorrelationId,
    ) -> Result<()> {
        let denied = |detail: String| {
            let _ = self.audit.log(
                AuditEvent::PermissionDenied {
                    user_id,
                    org_id: Some(org_id),
                    permission: permission.to_string(),
                    detail: detail.clone(),
                },
                correlation,
            );
            QuarryError::PermissionDenied { detail }
        };

        let Some(member) = self.repo.get_member(org_id, user_id).await? else {
            return Err(denied(format!("user {user_id} is not a member of {org_id}")));
        };

        let Some(role) = self.repo.get_role(org_id, &member.role).await? else {
            return Err(denied(format!("role {} is not defined", member.role)));
        };

        if !role.grants(permission) {
            return Err(denied(format!(
                "role {} lacks {permission}",
                member.role
            )));
        }

        if let Some(domain_id) = domain_id {
            let Some(domain) = self.repo.get_domain(domain_id).await? else {
                return Err(QuarryError::not_found("domain"));
            };
            if domain.org_id != org_id {
                // Cross-tenant probe: do not reveal the domain exists.
                return Err(QuarryError::not_found("domain"));
            }
            if !Self::domain_visible(&domain, &member, user_id) {
                return Err(denied(format!(
                    "domain {domain_id} is not visible to user {user_id}"
                )));
            }
        }

        Ok(())
    }

    /// The org and readable domain set used to filter every subsequent
    /// query for this user.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` when the user is not a member of the org.
    pub async fn scope(&self, user_id: UserId, org_id: OrgId) -> Result<UserScope> {
        let Some(member) = self.repo.get_member(org_id, user_id).await? else {
            return Err(QuarryError::denied(format!(
                "user {user_id} is not a member of {org_id}"
            )));
        };

        let mut domain_ids = HashSet::new();
        for domain in self.repo.list_domains(org_id).await? {
            if Self::domain_visible(&domain, &member, user_id) {
                domain_ids.insert(domain.id);
            }
        }

        Ok(UserScope { org_id, domain_ids })
    }

    /// Resolve a verified request to a concrete tenant scope, checking the
    /// domain is readable.
    ///
    /// # Errors
    ///
    /// `NotFound` when the domain is missing or belongs to another org;
    /// `PermissionDenied` when it exists but is not visible.
    pub async fn resolve_scope(
        &self,
        user_id: UserId,
        org_id: OrgId,
        domain_id: DomainId,
    ) -> Result<TenantScope> {
        let user_scope = self.scope(user_id, org_id).await?;
        let Some(domain) = self.repo.get_domain(domain_id).await? else {
            return Err(QuarryError::not_found("domain"));
        };
        if domain.org_id != org_id {
            return Err(QuarryError::not_found("domain"));
        }
        if !user_scope.domain_ids.contains(&domain_id) {
            return Err(QuarryError::denied(format!(
                "domain {domain_id} is not visible to user {user_id}"
            )));
        }
        Ok(TenantScope::domain(org_id, domain_id))
    }

    fn domain_visible(domain: &Domain, member: &OrgMember, user_id: UserId) -> bool {
        match &domain.access_mode {
            AccessMode::Public => true,
            AccessMode::Private => member.role == "admin",
            AccessMode::Restricted { allowed_users } => {
                member.role == "admin" || allowed_users.contains(&user_id)
            }
        }
    }

    async fn default_org(&self, user_id: UserId) -> Result<Option<OrgId>> {
        let memberships = self.repo.list_memberships(user_id).await?;
        Ok(memberships
            .iter()
            .find(|m| m.active)
            .or_else(|| memberships.first())
            .map(|m| m.org_id))
    }
}
