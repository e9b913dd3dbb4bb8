//! # quarry-tenancy
//!
//! Identity and authority for the quarry workspace: user registration and
//! credential verification, short-lived access tokens over server-side
//! sessions with single-use refresh rotation, and the `require`/`scope`
//! checks every other crate calls before touching tenant data.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

/// Credential hashing.
pub mod password;

/// Server-side auth sessions and refresh rotation.
pub mod session;

/// Tenant service and RBAC checks.
pub mod service;

/// Access-token issuance and verification.
pub mod token;

pub use service::{IssuedTokens, TenantService, UserScope};
pub use session::{AuthSession, RefreshOutcome, SessionManager, SessionState};
pub use token::{Claims, TokenIssuer};
