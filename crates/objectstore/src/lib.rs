//! # Object Store Adapter
//!
//! The single I/O boundary between EchoDB's core and the outside world: every
//! other component (WAL, SST, sequence allocator, checkpointer, leader lease)
//! reaches the durable world only through this trait. Flat key space, opaque
//! byte values, no retries — retrying a failed call is the caller's decision,
//! since only the caller knows whether the operation is idempotent in its
//! context.
//!
//! Two implementations are provided: [`S3Store`] for production (any
//! S3-compatible endpoint, via the `object_store` crate's `aws` feature) and
//! [`MemoryStore`] for tests, so the whole workspace's test suite runs
//! without network access.
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::path::Path as ObjPath;
use object_store::{ObjectStore as ObjectStoreImpl, PutMode, PutOptions};
use std::sync::Arc;
use thiserror::Error;

/// Errors normalized out of the underlying object-store client.
///
/// `get` on a missing key is *not* an error (see [`ObjectStore::get`]); this
/// enum covers every other failure mode.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    #[error("precondition failed for {0}")]
    PreconditionFailed(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

impl From<object_store::Error> for StoreError {
    fn from(e: object_store::Error) -> Self {
        match &e {
            object_store::Error::Precondition { .. } | object_store::Error::AlreadyExists { .. } => {
                StoreError::PreconditionFailed(e.to_string())
            }
            _ => StoreError::Unavailable(e.to_string()),
        }
    }
}

/// The adapter's public contract, implemented against an arbitrary
/// S3-compatible backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes `bytes` under `key`, replacing any prior value.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    /// Writes `bytes` under `key` only if it does not already exist.
    ///
    /// Used by the leader lease to opportunistically race-free its
    /// acquisition (§4.9 / §9). Returns `StoreError::PreconditionFailed` if
    /// the key already exists, or falls through to a plain `put` if the
    /// backend does not support conditional writes — callers that need the
    /// race-free guarantee should inspect the error, not assume one
    /// semantics or the other.
    async fn put_if_absent(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    /// Returns `None` if `key` does not exist. Absence is not an error.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Lists every key under `prefix`, order unspecified (best-effort per §1).
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    async fn head(&self, key: &str) -> Result<bool, StoreError>;
}

/// The concrete handle every constructor in this crate returns; callers
/// outside this crate name it instead of spelling out the trait object.
pub type StoreHandle = Arc<dyn ObjectStoreImpl>;

fn obj_path(key: &str) -> Result<ObjPath, StoreError> {
    ObjPath::parse(key).map_err(|e| StoreError::InvalidKey(e.to_string()))
}

#[async_trait]
impl ObjectStore for Arc<dyn ObjectStoreImpl> {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let path = obj_path(key)?;
        self.as_ref().put(&path, Bytes::from(bytes).into()).await?;
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let path = obj_path(key)?;
        let opts = PutOptions::from(PutMode::Create);
        match self
            .as_ref()
            .put_opts(&path, Bytes::from(bytes.clone()).into(), opts)
            .await
        {
            Ok(_) => Ok(()),
            Err(object_store::Error::NotSupported { .. }) => {
                // Backend can't do conditional writes; the caller falls back
                // to the read-verify-write protocol, so a plain put here
                // still moves the lease forward.
                self.as_ref()
                    .put(&path, Bytes::from(bytes).into())
                    .await
                    .map_err(StoreError::from)?;
                Err(StoreError::Unavailable(
                    "conditional put unsupported by backend".into(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = obj_path(key)?;
        match self.as_ref().get(&path).await {
            Ok(result) => {
                let bytes = result.bytes().await.map_err(StoreError::from)?;
                Ok(Some(bytes.to_vec()))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = obj_path(key)?;
        match self.as_ref().delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let path = obj_path(prefix)?;
        let metas: Vec<_> = self
            .as_ref()
            .list(Some(&path))
            .try_collect()
            .await
            .map_err(StoreError::from)?;
        Ok(metas.into_iter().map(|m| m.location.to_string()).collect())
    }

    async fn head(&self, key: &str) -> Result<bool, StoreError> {
        let path = obj_path(key)?;
        match self.as_ref().head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Builds an [`ObjectStore`] against a real S3-compatible endpoint.
pub fn s3_store(
    bucket: &str,
    region: &str,
    endpoint: Option<&str>,
) -> Result<StoreHandle, StoreError> {
    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(bucket)
        .with_region(region);
    if let Some(endpoint) = endpoint {
        builder = builder.with_endpoint(endpoint).with_allow_http(true);
    }
    let store = builder
        .build()
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    Ok(Arc::new(store))
}

/// An in-memory object store for tests — no network, full read-your-writes
/// and last-writer-wins semantics, matching the correctness assumptions in §1.
pub fn memory_store() -> StoreHandle {
    Arc::new(InMemory::new())
}

#[cfg(test)]
mod tests;
