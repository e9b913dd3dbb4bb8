//! Server-side auth sessions.
//!
//! A session moves `Created -> Active -> (Expired | Refreshed | Revoked)`.
//! Refresh rotates: the old session becomes `Refreshed` and a new active
//! one takes over, linked by chain id. Presenting a refresh token that was
//! already rotated or revoked is treated as theft: the whole chain is
//! revoked and a security event is raised by the caller.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use quarry_core::ids::{AuthSessionId, OrgId, UserId};
use rand::RngCore;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle state of one auth session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Issued but not yet used.
    Created,
    /// Valid for access-token verification.
    Active,
    /// Lifetime elapsed.
    Expired,
    /// Superseded by a rotation.
    Refreshed,
    /// Explicitly invalidated.
    Revoked,
}

impl SessionState {
    /// Whether access tokens backed by this session still verify.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self, Self::Created | Self::Active)
    }
}

/// One server-side auth session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    /// Unique id, also carried in the JWT `sid` claim.
    pub id: AuthSessionId,
    /// Owning user.
    pub user_id: UserId,
    /// Org context.
    pub org_id: OrgId,
    /// Single-use refresh token bound to this session.
    pub refresh_token: String,
    /// Rotation chain; every session created by refreshing this one shares
    /// it.
    pub chain_id: Uuid,
    /// Lifecycle state.
    pub state: SessionState,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Refresh-token expiry.
    pub expires_at: DateTime<Utc>,
}

/// Outcome of presenting a refresh token.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// Rotation succeeded; a new active session was issued.
    Rotated(AuthSession),
    /// The token was expired.
    Expired,
    /// The token was already rotated or revoked; the whole chain has now
    /// been revoked.
    Reused {
        /// User whose chain was revoked.
        user_id: UserId,
        /// Sessions invalidated.
        revoked: usize,
    },
    /// No session matches the token.
    Unknown,
}

fn new_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// In-process session registry.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: DashMap<AuthSessionId, AuthSession>,
    by_refresh: DashMap<String, AuthSessionId>,
}

impl SessionManager {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh active session for a login.
    pub fn create(&self, user_id: UserId, org_id: OrgId, refresh_ttl: Duration) -> AuthSession {
        let session = AuthSession {
            id: AuthSessionId::new(),
            user_id,
            org_id,
            refresh_token: new_refresh_token(),
            chain_id: Uuid::new_v4(),
            state: SessionState::Active,
            created_at: Utc::now(),
            expires_at: Utc::now()
                + chrono::Duration::from_std(refresh_ttl)
                    .unwrap_or_else(|_| chrono::Duration::days(14)),
        };
        self.by_refresh
            .insert(session.refresh_token.clone(), session.id);
        self.sessions.insert(session.id, session.clone());
        session
    }

    /// Whether a session still backs valid access tokens.
    #[must_use]
    pub fn is_active(&self, id: AuthSessionId) -> bool {
        self.sessions.get(&id).is_some_and(|s| {
            s.state.is_usable() && s.expires_at > Utc::now()
        })
    }

    /// Present a refresh token.
    pub fn refresh(&self, refresh_token: &str, refresh_ttl: Duration) -> RefreshOutcome {
        let Some(id) = self.by_refresh.get(refresh_token).map(|r| *r) else {
            return RefreshOutcome::Unknown;
        };

        let (user_id, org_id, chain_id, state, expired) = {
            let Some(session) = self.sessions.get(&id) else {
                return RefreshOutcome::Unknown;
            };
            (
                session.user_id,
                session.org_id,
                session.chain_id,
                session.state,
                session.expires_at <= Utc::now(),
            )
        };

        match state {
            SessionState::Created | SessionState::Active => {
                if expired {
                    if let Some(mut session) = self.sessions.get_mut(&id) {
                        session.state = SessionState::Expired;
                    }
                    return RefreshOutcome::Expired;
                }

                // Rotate: retire the old session, issue a new one on the
                // same chain.
                if let Some(mut session) = self.sessions.get_mut(&id) {
                    session.state = SessionState::Refreshed;
                }
                let next = AuthSession {
                    id: AuthSessionId::new(),
                    user_id,
                    org_id,
                    refresh_token: new_refresh_token(),
                    chain_id,
                    state: SessionState::Active,
                    created_at: Utc::now(),
                    expires_at: Utc::now()
                        + chrono::Duration::from_std(refresh_ttl)
                            .unwrap_or_else(|_| chrono::Duration::days(14)),
                };
                self.by_refresh
                    .insert(next.refresh_token.clone(), next.id);
                self.sessions.insert(next.id, next.clone());
                RefreshOutcome::Rotated(next)
            }
            SessionState::Refreshed | SessionState::Revoked => {
                // Single-use violation: kill the chain.
                let revoked = self.revoke_chain(chain_id);
                RefreshOutcome::Reused { user_id, revoked }
            }
            SessionState::Expired => RefreshOutcome::Expired,
        }
    }

    /// Revoke one session.
    pub fn revoke(&self, id: AuthSessionId) {
        if let Some(mut session) = self.sessions.get_mut(&id) {
            session.state = SessionState::Revoked;
        }
    }

    /// Revoke every session on a chain, returning how many changed state.
    pub fn revoke_chain(&self, chain_id: Uuid) -> usize {
        let mut revoked = 0;
        for mut entry in self.sessions.iter_mut() {
            if entry.chain_id == chain_id && entry.state != SessionState::Revoked {
                entry.state = SessionState::Revoked;
                revoked += 1;
            }
        }
        revoked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(3600);

    #[test]
    fn test_login_session_is_active() {
        let manager = SessionManager::new();
        let session = manager.create(UserId::new(), OrgId::new(), TTL);
        assert!(manager.is_active(session.id));
    }

    #[test]
    fn test_refresh_rotates() {
        let manager = SessionManager::new();
        let first = manager.create(UserId::new(), OrgId::new(), TTL);

        let RefreshOutcome::Rotated(second) = manager.refresh(&first.refresh_token, TTL) else {
            panic!("expected rotation");
        };

        assert_ne!(first.id, second.id);
        assert_eq!(first.chain_id, second.chain_id);
        assert!(!manager.is_active(first.id));
        assert!(manager.is_active(second.id));
    }

    #[test]
    fn test_reusing_rotated_token_revokes_chain() {
        let manager = SessionManager::new();
        let first = manager.create(UserId::new(), OrgId::new(), TTL);

        let RefreshOutcome::Rotated(second) = manager.refresh(&first.refresh_token, TTL) else {
            panic!("expected rotation");
        };

        // Replay the already-rotated token.
        let outcome = manager.refresh(&first.refresh_token, TTL);
        assert!(matches!(outcome, RefreshOutcome::Reused { .. }));

        // The fresh session went down with the chain.
        assert!(!manager.is_active(second.id));
        assert!(matches!(
            manager.refresh(&second.refresh_token, TTL),
            RefreshOutcome::Reused { .. }
        ));
    }

    #[test]
    fn test_unknown_token() {
        let manager = SessionManager::new();
        assert!(matches!(
            manager.refresh("deadbeef", TTL),
            RefreshOutcome::Unknown
        ));
    }

    #[test]
    fn test_expired_session_refuses_refresh() {
        let manager = SessionManager::new();
        let session = manager.create(UserId::new(), OrgId::new(), Duration::from_secs(0));
        assert!(matches!(
            manager.refresh(&session.refresh_token, TTL),
            RefreshOutcome::Expired
        ));
        assert!(!manager.is_active(session.id));
    }
}
