//! End-to-end tests for the RustStack S3 versioning core.
//!
//! The tests drive [`RustStackS3`] over the in-memory reference stores, with
//! optional fault-injecting wrappers around them, and check the resulting
//! version history and data store contents.
//!
//! Run them with:
//! ```text
//! cargo test -p ruststack-integration
//! ```

use std::sync::{Arc, Once};

use ruststack_s3_core::config::S3Config;
use ruststack_s3_core::ops::object::{
    DeleteObjectInput, DeleteObjectOutput, GetObjectInput, GetObjectOutput, PutObjectInput,
    PutObjectOutput,
};
use ruststack_s3_core::state::{
    InMemoryMetadataStore, MetadataStore, ObjectRecord, Owner, VersioningStatus,
};
use ruststack_s3_core::storage::{DataStore, InMemoryDataStore};
use ruststack_s3_core::versioning::VersionCodec;
use ruststack_s3_core::{RustStackS3, S3ServiceResult};

use crate::faults::{FailingDataStore, FlakyMetadataStore};

pub mod faults;

#[cfg(test)]
mod test_concurrency;
#[cfg(test)]
mod test_failures;
#[cfg(test)]
mod test_multipart;
#[cfg(test)]
mod test_restore;
#[cfg(test)]
mod test_versioning;

/// Bucket every harness creates.
pub const BUCKET: &str = "test-bucket";

/// Key most tests write to.
pub const KEY: &str = "k";

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        let level = S3Config::from_env().log_level;
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
            )
            .with_test_writer()
            .init();
    });
}

/// A provider together with the in-memory stores behind it.
#[derive(Debug)]
pub struct Harness {
    /// The provider under test.
    pub provider: RustStackS3,
    /// The metadata store, for direct inspection.
    pub metadata: Arc<InMemoryMetadataStore>,
    /// The data store, for direct inspection.
    pub data: Arc<InMemoryDataStore>,
    /// The codec shared by provider and metadata store.
    pub codec: Arc<VersionCodec>,
}

impl Harness {
    /// A harness over fresh stores with a single bucket in `status`.
    #[must_use]
    pub fn new(config: S3Config, status: VersioningStatus) -> Self {
        Self::wrapped(
            config,
            status,
            |m| m as Arc<dyn MetadataStore>,
            |d| d as Arc<dyn DataStore>,
        )
    }

    /// A harness whose provider talks to `metadata` and `data` through the
    /// given wrappers.
    #[must_use]
    pub fn wrapped(
        config: S3Config,
        status: VersioningStatus,
        wrap_metadata: impl FnOnce(Arc<InMemoryMetadataStore>) -> Arc<dyn MetadataStore>,
        wrap_data: impl FnOnce(Arc<InMemoryDataStore>) -> Arc<dyn DataStore>,
    ) -> Self {
        init_tracing();
        let codec = Arc::new(VersionCodec::new(config.replication_group_id.clone()));
        let metadata = Arc::new(InMemoryMetadataStore::new(Arc::clone(&codec)));
        let data = Arc::new(InMemoryDataStore::new(config.s3_max_memory_object_size));
        create_bucket(&metadata, status);
        let provider = RustStackS3::new(
            config,
            Arc::clone(&codec),
            wrap_metadata(Arc::clone(&metadata)),
            wrap_data(Arc::clone(&data)),
        );
        Self {
            provider,
            metadata,
            data,
            codec,
        }
    }

    /// A harness whose metadata writes can be made to conflict or fail.
    #[must_use]
    pub fn with_flaky_metadata(
        config: S3Config,
        status: VersioningStatus,
    ) -> (Self, Arc<FlakyMetadataStore>) {
        let mut flaky = None;
        let harness = Self::wrapped(
            config,
            status,
            |m| {
                let store = Arc::new(FlakyMetadataStore::new(m));
                flaky = Some(Arc::clone(&store));
                store as Arc<dyn MetadataStore>
            },
            |d| d as Arc<dyn DataStore>,
        );
        (harness, flaky.expect("wrapper installed"))
    }

    /// A harness whose data writes or deletes can be made to fail.
    #[must_use]
    pub fn with_failing_data(
        config: S3Config,
        status: VersioningStatus,
    ) -> (Self, Arc<FailingDataStore>) {
        let mut failing = None;
        let harness = Self::wrapped(
            config,
            status,
            |m| m as Arc<dyn MetadataStore>,
            |d| {
                let store = Arc::new(FailingDataStore::new(d));
                failing = Some(Arc::clone(&store));
                store as Arc<dyn DataStore>
            },
        );
        (harness, failing.expect("wrapper installed"))
    }

    /// A second provider over the same stores, e.g. with another compat mode.
    #[must_use]
    pub fn reopen(&self, config: S3Config) -> RustStackS3 {
        RustStackS3::new(
            config,
            Arc::clone(&self.codec),
            self.metadata.clone(),
            self.data.clone(),
        )
    }

    /// Change the bucket's versioning status.
    pub fn set_versioning(&self, status: VersioningStatus) {
        self.metadata
            .set_bucket_versioning(BUCKET, status)
            .expect("set versioning");
    }

    /// Put `body` at [`KEY`].
    pub async fn put(&self, body: &'static str) -> PutObjectOutput {
        put_with(&self.provider, body).await
    }

    /// Read [`KEY`], optionally at a version token.
    pub async fn get(&self, version_id: Option<&str>) -> S3ServiceResult<GetObjectOutput> {
        let input = match version_id {
            Some(v) => GetObjectInput::builder()
                .bucket(BUCKET)
                .key(KEY)
                .version_id(v)
                .build(),
            None => GetObjectInput::builder().bucket(BUCKET).key(KEY).build(),
        };
        self.provider.handle_get_object(input).await
    }

    /// Body of [`KEY`] at `version_id`, panicking on errors.
    pub async fn body(&self, version_id: Option<&str>) -> String {
        let out = self.get(version_id).await.expect("get object");
        String::from_utf8(out.body.to_vec()).expect("utf-8 body")
    }

    /// Delete [`KEY`], optionally at a version token.
    pub async fn delete(&self, version_id: Option<&str>) -> S3ServiceResult<DeleteObjectOutput> {
        let input = match version_id {
            Some(v) => DeleteObjectInput::builder()
                .bucket(BUCKET)
                .key(KEY)
                .version_id(v)
                .build(),
            None => DeleteObjectInput::builder().bucket(BUCKET).key(KEY).build(),
        };
        self.provider.handle_delete_object(input).await
    }

    /// Every record stored for [`KEY`], newest first.
    #[must_use]
    pub fn versions(&self) -> Vec<ObjectRecord> {
        self.metadata.list_versions(BUCKET, KEY).expect("list versions")
    }

    /// The logical history of [`KEY`]: one entry per version, newest first,
    /// as (answers to "null", body checksum, delete marker).
    #[must_use]
    pub fn history(&self) -> Vec<(bool, String, bool)> {
        self.versions()
            .into_iter()
            .map(|r| (r.answers_to_null(), r.content_md5, r.is_delete_marker))
            .collect()
    }

    /// Wait for background reclaims to finish.
    pub async fn settle(&self) {
        self.provider.reclaimer().flush().await;
    }
}

/// Put `body` at [`KEY`] through `provider`.
pub async fn put_with(provider: &RustStackS3, body: &'static str) -> PutObjectOutput {
    provider
        .handle_put_object(
            PutObjectInput::builder()
                .bucket(BUCKET)
                .key(KEY)
                .body(body)
                .build(),
        )
        .await
        .expect("put object")
}

fn create_bucket(metadata: &InMemoryMetadataStore, status: VersioningStatus) {
    metadata
        .create_bucket(BUCKET, Owner::default())
        .expect("create bucket");
    if status.is_configured() {
        metadata
            .set_bucket_versioning(BUCKET, status)
            .expect("set versioning");
    }
}
