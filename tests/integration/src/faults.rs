//! Fault-injecting wrappers around the in-memory stores.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use ruststack_s3_core::state::{
    DataLocation, InMemoryMetadataStore, MetadataStore, ObjectRecord, Precondition, PutOutcome,
    RecordAddress, RecordRead, VersioningStatus, WriteTarget,
};
use ruststack_s3_core::storage::{DataContext, DataStore, InMemoryDataStore};
use ruststack_s3_core::versioning::DeleteOptions;
use ruststack_s3_core::{S3ServiceError, S3ServiceResult};
use tracing::debug;

fn unavailable(backend: &'static str) -> S3ServiceError {
    S3ServiceError::BackendUnavailable {
        backend,
        message: "injected failure".to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Metadata store that rejects, fails or stalls writes on demand.
///
/// Unconditional writes always pass through.
#[derive(Debug)]
pub struct FlakyMetadataStore {
    inner: Arc<InMemoryMetadataStore>,
    conflicts: AtomicU32,
    fail_conditional_puts: AtomicBool,
    stall_conditional_puts: AtomicBool,
    stall_deletes: AtomicBool,
    master_conflicts: AtomicU32,
    conditional_puts: AtomicU32,
}

impl FlakyMetadataStore {
    /// Wrap `inner`; no faults are armed.
    #[must_use]
    pub fn new(inner: Arc<InMemoryMetadataStore>) -> Self {
        Self {
            inner,
            conflicts: AtomicU32::new(0),
            fail_conditional_puts: AtomicBool::new(false),
            stall_conditional_puts: AtomicBool::new(false),
            stall_deletes: AtomicBool::new(false),
            master_conflicts: AtomicU32::new(0),
            conditional_puts: AtomicU32::new(0),
        }
    }

    /// Reject the next `n` conditional writes with `ConditionFailed`.
    pub fn inject_conflicts(&self, n: u32) {
        self.conflicts.store(n, Ordering::SeqCst);
    }

    /// Reject the next `n` conditional writes that replace the master,
    /// letting other conditional writes through.
    pub fn inject_master_conflicts(&self, n: u32) {
        self.master_conflicts.store(n, Ordering::SeqCst);
    }

    /// Never complete record deletes.
    pub fn stall_deletes(&self, stall: bool) {
        self.stall_deletes.store(stall, Ordering::SeqCst);
    }

    /// Fail every conditional write with `BackendUnavailable`.
    pub fn fail_conditional_puts(&self, fail: bool) {
        self.fail_conditional_puts.store(fail, Ordering::SeqCst);
    }

    /// Never complete conditional writes, so callers can be cancelled
    /// mid-commit.
    pub fn stall_conditional_puts(&self, stall: bool) {
        self.stall_conditional_puts.store(stall, Ordering::SeqCst);
    }

    /// How many conditional writes reached this store.
    #[must_use]
    pub fn conditional_puts(&self) -> u32 {
        self.conditional_puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataStore for FlakyMetadataStore {
    async fn get_bucket_versioning(&self, bucket: &str) -> S3ServiceResult<VersioningStatus> {
        self.inner.get_bucket_versioning(bucket).await
    }

    async fn get_record(
        &self,
        bucket: &str,
        key: &str,
        address: &RecordAddress,
    ) -> S3ServiceResult<Option<RecordRead>> {
        self.inner.get_record(bucket, key, address).await
    }

    async fn put_record(
        &self,
        bucket: &str,
        record: ObjectRecord,
        target: WriteTarget,
        condition: Option<Precondition>,
    ) -> S3ServiceResult<PutOutcome> {
        if condition.is_some() {
            self.conditional_puts.fetch_add(1, Ordering::SeqCst);
            if self.fail_conditional_puts.load(Ordering::SeqCst) {
                return Err(unavailable("metadata"));
            }
            if self.stall_conditional_puts.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            let take = |counter: &AtomicU32| {
                counter
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            };
            let injected = take(&self.conflicts)
                || (target.commits_master() && take(&self.master_conflicts));
            if injected {
                debug!(bucket, key = %record.key, "injecting conflict");
                return Err(S3ServiceError::ConditionFailed);
            }
        }
        self.inner.put_record(bucket, record, target, condition).await
    }

    async fn delete_record(
        &self,
        bucket: &str,
        key: &str,
        options: &DeleteOptions,
    ) -> S3ServiceResult<ObjectRecord> {
        if self.stall_deletes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.delete_record(bucket, key, options).await
    }

    async fn discard_copy(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
        on_null_key: bool,
        condition: Precondition,
    ) -> S3ServiceResult<Option<ObjectRecord>> {
        self.inner
            .discard_copy(bucket, key, version_id, on_null_key, condition)
            .await
    }
}

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

/// Data store whose writes or deletes can be switched off.
#[derive(Debug)]
pub struct FailingDataStore {
    inner: Arc<InMemoryDataStore>,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FailingDataStore {
    /// Wrap `inner`; no faults are armed.
    #[must_use]
    pub fn new(inner: Arc<InMemoryDataStore>) -> Self {
        Self {
            inner,
            fail_puts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Fail every `put`.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Fail every `batch_delete`.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataStore for FailingDataStore {
    async fn put(&self, data: Bytes, ctx: &DataContext) -> S3ServiceResult<Vec<DataLocation>> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(unavailable("data"));
        }
        self.inner.put(data, ctx).await
    }

    async fn get(&self, locations: &[DataLocation]) -> S3ServiceResult<Bytes> {
        self.inner.get(locations).await
    }

    async fn batch_delete(&self, locations: &[DataLocation], ctx: &DataContext) -> S3ServiceResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(unavailable("data"));
        }
        self.inner.batch_delete(locations, ctx).await
    }
}
