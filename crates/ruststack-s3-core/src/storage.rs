//! Object body storage.
//!
//! The orchestrator talks to object data through the [`DataStore`] trait:
//! data goes in as [`Bytes`] and comes back as a list of [`DataLocation`]
//! descriptors that the metadata record owns from then on.
//!
//! [`InMemoryDataStore`] is the bundled implementation. Blocks below a
//! configurable threshold are kept in memory as [`Bytes`]; larger blocks are
//! spilled to temporary files on disk.
//!
//! # Spillover to Disk
//!
//! When block data exceeds the memory threshold, the bytes are written to a
//! temporary file via the [`tempfile`] crate. On-disk data is automatically
//! cleaned up when the entry is removed from the map (via the [`Drop`]
//! implementation on `StoredData`).

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use tokio::io::AsyncReadExt;
use tracing::{debug, trace, warn};

use crate::checksums;
use crate::error::{S3ServiceError, S3ServiceResult};
use crate::state::DataLocation;

/// Default maximum block size (in bytes) kept in memory before spilling to
/// disk. The default is 512 KiB.
const DEFAULT_MAX_MEMORY_SIZE: usize = 524_288;

/// Name reported in [`DataLocation::data_store_name`] by [`InMemoryDataStore`].
pub const IN_MEMORY_DATA_STORE_NAME: &str = "mem";

// ---------------------------------------------------------------------------
// DataStore
// ---------------------------------------------------------------------------

/// Request context attached to data operations, for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataContext {
    /// Bucket of the object the data belongs to.
    pub bucket: String,
    /// Key of the object the data belongs to.
    pub key: String,
    /// Operation that triggered the data access.
    pub operation: &'static str,
}

impl DataContext {
    /// Create a context for `operation` on `bucket/key`.
    #[must_use]
    pub fn new(bucket: &str, key: &str, operation: &'static str) -> Self {
        Self {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            operation,
        }
    }
}

/// Storage of object bodies.
#[async_trait]
pub trait DataStore: Send + Sync + fmt::Debug {
    /// Store `data` and describe where it went. Empty input yields no
    /// locations.
    async fn put(&self, data: Bytes, ctx: &DataContext) -> S3ServiceResult<Vec<DataLocation>>;

    /// Read back the concatenation of `locations`.
    async fn get(&self, locations: &[DataLocation]) -> S3ServiceResult<Bytes>;

    /// Delete the given blocks. Unknown blocks are ignored.
    async fn batch_delete(
        &self,
        locations: &[DataLocation],
        ctx: &DataContext,
    ) -> S3ServiceResult<()>;
}

// ---------------------------------------------------------------------------
// StoredData
// ---------------------------------------------------------------------------

/// Small blocks are kept in memory, large blocks in a temporary file that is
/// removed when the value is dropped.
enum StoredData {
    /// Small blocks kept entirely in memory.
    InMemory {
        /// The raw bytes.
        data: Bytes,
    },
    /// Large blocks spilled to a temp file.
    OnDisk {
        /// Path to the temporary file.
        path: PathBuf,
        /// Size of the stored data in bytes.
        size: u64,
    },
}

impl fmt::Debug for StoredData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InMemory { data } => f
                .debug_struct("InMemory")
                .field("size", &data.len())
                .finish(),
            Self::OnDisk { path, size } => f
                .debug_struct("OnDisk")
                .field("path", path)
                .field("size", size)
                .finish(),
        }
    }
}

impl Drop for StoredData {
    fn drop(&mut self) {
        if let Self::OnDisk { path, .. } = self {
            if let Err(e) = std::fs::remove_file(path.as_path()) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove temp file");
                }
            } else {
                trace!(path = %path.display(), "removed temp file");
            }
        }
    }
}

/// Read a spilled block back into memory.
async fn read_file(path: &Path, size: u64) -> S3ServiceResult<Bytes> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| {
        S3ServiceError::Internal(anyhow::anyhow!(
            "failed to open temp file {}: {e}",
            path.display()
        ))
    })?;
    let capacity = usize::try_from(size).unwrap_or(usize::MAX);
    let mut buf = BytesMut::with_capacity(capacity);
    while buf.len() < capacity {
        let read = file.read_buf(&mut buf).await.map_err(|e| {
            S3ServiceError::Internal(anyhow::anyhow!(
                "failed to read temp file {}: {e}",
                path.display()
            ))
        })?;
        if read == 0 {
            break;
        }
    }
    Ok(buf.freeze())
}

// ---------------------------------------------------------------------------
// InMemoryDataStore
// ---------------------------------------------------------------------------

/// In-memory block storage with automatic spillover to tempfiles.
///
/// Every [`put`](DataStore::put) creates exactly one block under a fresh
/// UUID key.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use ruststack_s3_core::storage::{DataContext, DataStore, InMemoryDataStore};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryDataStore::new(1024);
/// let ctx = DataContext::new("my-bucket", "hello.txt", "PutObject");
/// let locations = store.put(Bytes::from("hello"), &ctx).await.unwrap();
/// assert_eq!(locations.len(), 1);
/// assert_eq!(locations[0].size, 5);
///
/// let data = store.get(&locations).await.unwrap();
/// assert_eq!(data.as_ref(), b"hello");
/// # });
/// ```
pub struct InMemoryDataStore {
    blocks: DashMap<String, StoredData>,
    max_memory_size: usize,
}

impl fmt::Debug for InMemoryDataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryDataStore")
            .field("block_count", &self.blocks.len())
            .field("max_memory_size", &self.max_memory_size)
            .finish()
    }
}

impl Default for InMemoryDataStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MEMORY_SIZE)
    }
}

impl InMemoryDataStore {
    /// Create a new store with the given memory threshold.
    #[must_use]
    pub fn new(max_memory_size: usize) -> Self {
        debug!(max_memory_size, "creating InMemoryDataStore");
        Self {
            blocks: DashMap::new(),
            max_memory_size,
        }
    }

    /// Whether the block behind `location` is still stored.
    #[must_use]
    pub fn contains(&self, location: &DataLocation) -> bool {
        self.blocks.contains_key(&location.key)
    }

    /// Number of stored blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether no block is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    async fn store_data(&self, data: Bytes) -> S3ServiceResult<StoredData> {
        if data.len() > self.max_memory_size {
            Self::spill_to_disk(&data).await
        } else {
            Ok(StoredData::InMemory { data })
        }
    }

    async fn spill_to_disk(data: &[u8]) -> S3ServiceResult<StoredData> {
        let size = data.len() as u64;

        // The file is persisted so that cleanup stays with `StoredData::drop`.
        let temp = tempfile::NamedTempFile::new().map_err(|e| {
            S3ServiceError::Internal(anyhow::anyhow!("failed to create temp file: {e}"))
        })?;
        let path = temp.path().to_path_buf();
        temp.persist(&path).map_err(|e| {
            S3ServiceError::Internal(anyhow::anyhow!(
                "failed to persist temp file {}: {e}",
                path.display()
            ))
        })?;

        tokio::fs::write(&path, data).await.map_err(|e| {
            S3ServiceError::Internal(anyhow::anyhow!(
                "failed to write temp file {}: {e}",
                path.display()
            ))
        })?;

        trace!(path = %path.display(), size, "spilled data to disk");
        Ok(StoredData::OnDisk { path, size })
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn put(&self, data: Bytes, ctx: &DataContext) -> S3ServiceResult<Vec<DataLocation>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let md5_hex = checksums::compute_md5(&data);
        let size = data.len() as u64;
        let block_key = uuid::Uuid::new_v4().simple().to_string();
        let stored = self.store_data(data).await?;
        self.blocks.insert(block_key.clone(), stored);

        trace!(
            bucket = %ctx.bucket,
            key = %ctx.key,
            operation = ctx.operation,
            block = %block_key,
            size,
            "stored block"
        );
        Ok(vec![DataLocation {
            key: block_key,
            start: 0,
            size,
            data_store_name: IN_MEMORY_DATA_STORE_NAME.to_owned(),
            data_store_etag: md5_hex,
        }])
    }

    async fn get(&self, locations: &[DataLocation]) -> S3ServiceResult<Bytes> {
        if let [single] = locations {
            return self.read_block(single).await;
        }
        let total = locations.iter().map(|l| l.size).sum::<u64>();
        let mut combined = BytesMut::with_capacity(usize::try_from(total).unwrap_or(0));
        for location in locations {
            combined.extend_from_slice(&self.read_block(location).await?);
        }
        Ok(combined.freeze())
    }

    async fn batch_delete(
        &self,
        locations: &[DataLocation],
        ctx: &DataContext,
    ) -> S3ServiceResult<()> {
        let removed = locations
            .iter()
            .filter(|location| self.blocks.remove(&location.key).is_some())
            .count();
        debug!(
            bucket = %ctx.bucket,
            key = %ctx.key,
            operation = ctx.operation,
            requested = locations.len(),
            removed,
            "deleted blocks"
        );
        Ok(())
    }
}

impl InMemoryDataStore {
    async fn read_block(&self, location: &DataLocation) -> S3ServiceResult<Bytes> {
        // Copy out of the map so no shard lock is held across the await.
        let spilled = match self.blocks.get(&location.key).as_deref() {
            Some(StoredData::InMemory { data }) => return Ok(data.clone()),
            Some(StoredData::OnDisk { path, size }) => (path.clone(), *size),
            None => {
                return Err(S3ServiceError::Internal(anyhow::anyhow!(
                    "data block {} is missing",
                    location.key
                )));
            }
        };
        read_file(&spilled.0, spilled.1).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
