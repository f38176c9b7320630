//! The S3 object write provider.
//!
//! [`RustStackS3`] owns the collaborators of the write path: the metadata
//! store, the data store, the version codec and the background reclaimer.
//! Individual S3 operations are implemented in the [`crate::ops`] submodules
//! as `handle_*` methods on this type.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::S3Config;
use crate::reclaim::DataReclaimer;
use crate::state::{InMemoryMetadataStore, MetadataStore, MultipartUpload};
use crate::storage::{DataStore, InMemoryDataStore};
use crate::versioning::{DecisionContext, VersionCodec};

/// The main S3 provider.
///
/// All fields are `Arc`-wrapped for cheap sharing across handler tasks.
///
/// # Examples
///
/// ```
/// use ruststack_s3_core::RustStackS3;
/// use ruststack_s3_core::config::S3Config;
///
/// # tokio_test::block_on(async {
/// let provider = RustStackS3::in_memory(S3Config::default());
/// assert!(!provider.config().null_version_compat_mode);
/// # });
/// ```
#[derive(Debug)]
pub struct RustStackS3 {
    /// Object metadata records.
    pub(crate) metadata: Arc<dyn MetadataStore>,
    /// Object body storage.
    pub(crate) data: Arc<dyn DataStore>,
    /// Version id generation and wire encoding.
    pub(crate) codec: Arc<VersionCodec>,
    /// Background deletion of superseded data.
    pub(crate) reclaimer: DataReclaimer,
    /// In-progress multipart uploads, keyed by upload id.
    pub(crate) uploads: Arc<DashMap<String, MultipartUpload>>,
    /// Settings of the versioning decision, derived from `config`.
    pub(crate) decision_ctx: DecisionContext,
    /// Provider configuration.
    pub(crate) config: Arc<S3Config>,
}

impl RustStackS3 {
    /// Create a provider over the given stores.
    ///
    /// `codec` must be the codec the metadata store assigns version ids
    /// with. Spawns the reclaimer, so this must run inside a Tokio runtime.
    #[must_use]
    pub fn new(
        config: S3Config,
        codec: Arc<VersionCodec>,
        metadata: Arc<dyn MetadataStore>,
        data: Arc<dyn DataStore>,
    ) -> Self {
        let reclaimer = DataReclaimer::spawn(Arc::clone(&data), config.reclaim_queue_capacity);
        let decision_ctx = DecisionContext {
            compat_mode: config.null_version_compat_mode,
            infinite_version_id: codec.infinite_version_id(),
        };
        Self {
            metadata,
            data,
            codec,
            reclaimer,
            uploads: Arc::new(DashMap::new()),
            decision_ctx,
            config: Arc::new(config),
        }
    }

    /// Create a provider over fresh in-memory stores.
    #[must_use]
    pub fn in_memory(config: S3Config) -> Self {
        let codec = Arc::new(VersionCodec::new(config.replication_group_id.clone()));
        let metadata = Arc::new(InMemoryMetadataStore::new(Arc::clone(&codec)));
        let data = Arc::new(InMemoryDataStore::new(config.s3_max_memory_object_size));
        Self::new(config, codec, metadata, data)
    }

    /// Returns a reference to the provider configuration.
    #[must_use]
    pub fn config(&self) -> &S3Config {
        &self.config
    }

    /// Returns the version codec.
    #[must_use]
    pub fn codec(&self) -> &VersionCodec {
        &self.codec
    }

    /// Returns the background reclaimer.
    #[must_use]
    pub fn reclaimer(&self) -> &DataReclaimer {
        &self.reclaimer
    }

    /// Returns the metadata store.
    #[must_use]
    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }
}
