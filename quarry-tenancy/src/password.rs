//! Credential hashing.

use quarry_core::error::{QuarryError, Result};

/// Hash a password with bcrypt at the configured cost.
///
/// # Errors
///
/// Fails if the cost is outside bcrypt's accepted range.
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).map_err(|e| QuarryError::BadRequest {
        message: format!("could not hash credential: {e}"),
    })
}

/// Verify a password against a stored hash.
///
/// A malformed stored hash verifies as false rather than erroring; the
/// caller treats it like any other credential mismatch.
#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}
