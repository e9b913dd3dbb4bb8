//! Access-token issuance and verification.
//!
//! Access tokens are short-lived HS256 JWTs whose claims name the user, the
//! org context, and the backing auth session. Verification checks the
//! signature and expiry here; the caller additionally checks that the
//! backing session is still active.

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use quarry_core::error::{QuarryError, Result};
use quarry_core::ids::{AuthSessionId, OrgId, UserId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// JWT claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: UserId,
    /// Org context the token was issued for.
    pub org: OrgId,
    /// Backing auth session.
    pub sid: AuthSessionId,
    /// Expiry, seconds since epoch.
    pub exp: i64,
    /// Issued at, seconds since epoch.
    pub iat: i64,
}

/// Signs and verifies access tokens.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Build an issuer from the shared secret.
    #[must_use]
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// Issue a token for a session.
    ///
    /// # Errors
    ///
    /// Fails if signing fails, which indicates a malformed key.
    pub fn issue(&self, user_id: UserId, org_id: OrgId, session_id: AuthSessionId) -> Result<String> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(900);
        let claims = Claims {
            sub: user_id,
            org: org_id,
            sid: session_id,
            exp: now.saturating_add(ttl),
            iat: now,
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(|e| QuarryError::External {
            service: quarry_core::error::ExternalService::Storage,
            message: format!("token signing failed: {e}"),
            retryable: false,
        })
    }

    /// Verify signature and expiry, returning the claims.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` for any invalid, expired, or tampered
    /// token. No detail leaks to the caller.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| QuarryError::Unauthenticated)
    }
}
