//! Blob-store backends.
//!
//! Keys follow `{org_slug}/{domain_name}/{document_id}/{safe_filename}`.
//! Presigned grants carry an opaque token and expire within an hour
//! regardless of what the caller asks for.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use quarry_core::error::{QuarryError, Result};
use quarry_core::traits::{BlobStore, PresignedUrl};
use rand::RngCore;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const MAX_PRESIGN_TTL: Duration = Duration::from_secs(3600);

fn presign_grant(base: &str, key: &str, ttl: Duration) -> PresignedUrl {
    let ttl = ttl.min(MAX_PRESIGN_TTL);
    let mut token = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut token);
    let expires_at = Utc::now()
        + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
    PresignedUrl {
        url: format!(
            "{base}/{key}?token={}&expires={}",
            hex::encode(token),
            expires_at.timestamp()
        ),
        expires_in: ttl.as_secs(),
        expires_at,
    }
}

/// Keys may not traverse out of their prefix.
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|part| part == "..") {
        return Err(QuarryError::BadRequest {
            message: format!("invalid blob key '{key}'"),
        });
    }
    Ok(())
}

/// In-memory blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        validate_key(key)?;
        self.blobs.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .get(key)
            .map(|b| b.clone())
            .ok_or_else(|| QuarryError::not_found("blob"))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.blobs.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let before = self.blobs.len();
        self.blobs.retain(|key, _| !key.starts_with(prefix));
        Ok(before - self.blobs.len())
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<PresignedUrl> {
        if !self.blobs.contains_key(key) {
            return Err(QuarryError::not_found("blob"));
        }
        Ok(presign_grant("memory://blobs", key, ttl))
    }
}

/// Filesystem blob store rooted at one directory.
#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Store rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

fn io_error(action: &str, path: &Path, e: &std::io::Error) -> QuarryError {
    QuarryError::external(
        quarry_core::error::ExternalService::Storage,
        format!("{action} {} failed: {e}", path.display()),
        true,
    )
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create", parent, &e))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| io_error("write", &path, &e))?;
        debug!(key, "blob written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(QuarryError::not_found("blob"))
            }
            Err(e) => Err(io_error("read", &path, &e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("delete", &path, &e)),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let path = self.path_for(prefix)?;
        if !path.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        let mut stack = vec![path.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| io_error("list", &dir, &e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| io_error("list", &dir, &e))?
            {
                let entry_path = entry.path();
                if entry_path.is_dir() {
                    stack.push(entry_path);
                } else {
                    removed += 1;
                }
            }
        }
        tokio::fs::remove_dir_all(&path)
            .await
            .map_err(|e| io_error("delete", &path, &e))?;
        Ok(removed)
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<PresignedUrl> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Err(QuarryError::not_found("blob"));
        }
        Ok(presign_grant("file://blobs", key, ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_round_trip() {
        let store = MemoryBlobStore::new();
        store
            .put("acme/support/doc-1/notes.txt", b"hello".to_vec())
            .await
            .unwrap();
        assert_eq!(
            store.get("acme/support/doc-1/notes.txt").await.unwrap(),
            b"hello"
        );
        assert!(matches!(
            store.get("acme/support/doc-2/notes.txt").await,
            Err(QuarryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_presign_clamps_ttl() {
        let store = MemoryBlobStore::new();
        store.put("a/b/c/d.txt", b"x".to_vec()).await.unwrap();
        let grant = store
            .presign("a/b/c/d.txt", Duration::from_secs(86_400))
            .await
            .unwrap();
        assert!(grant.expires_in <= 3600);
    }

    #[tokio::test]
    async fn test_traversal_keys_rejected() {
        let store = MemoryBlobStore::new();
        let err = store
            .put("acme/../other/secret.txt", b"x".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::BadRequest { .. }));
    }

    #[tokio::test]
    async fn test_delete_prefix_drops_document_blobs() {
        let store = MemoryBlobStore::new();
        store.put("acme/d/doc-1/a.txt", b"a".to_vec()).await.unwrap();
        store.put("acme/d/doc-1/b.txt", b"b".to_vec()).await.unwrap();
        store.put("acme/d/doc-2/c.txt", b"c".to_vec()).await.unwrap();

        let removed = store.delete_prefix("acme/d/doc-1/").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get("acme/d/doc-2/c.txt").await.is_ok());
    }

    #[tokio::test]
    async fn test_fs_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store
            .put("acme/support/doc-1/notes.txt", b"hello".to_vec())
            .await
            .unwrap();
        assert_eq!(
            store.get("acme/support/doc-1/notes.txt").await.unwrap(),
            b"hello"
        );
        store.delete("acme/support/doc-1/notes.txt").await.unwrap();
        assert!(matches!(
            store.get("acme/support/doc-1/notes.txt").await,
            Err(QuarryError::NotFound { .. })
        ));
    }
}
