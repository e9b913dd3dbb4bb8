//! Object-store seam.
//!
//! Keys follow `{org_slug}/{domain_name}/{document_id}/{safe_filename}`.
//! The driver proper is an external collaborator; backends in
//! `quarry-storage` cover in-memory and filesystem use.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A time-limited download grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignedUrl {
    /// Opaque download URL.
    pub url: String,
    /// Seconds until the grant expires. Never more than one hour.
    pub expires_in: u64,
    /// Absolute expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// Blob storage for original uploads.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write a blob.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Read a blob. `NotFound` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete a blob. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every blob under a prefix, returning how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;

    /// Issue a presigned download grant. Implementations clamp `ttl` to
    /// one hour.
    async fn presign(&self, key: &str, ttl: Duration) -> Result<PresignedUrl>;
}
