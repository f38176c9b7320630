//! The metadata store seam.
//!
//! The orchestrator only talks to metadata through [`MetadataStore`]. The
//! crate ships [`InMemoryMetadataStore`](super::InMemoryMetadataStore); a
//! production deployment plugs in its own key-value backend.

use std::fmt;

use async_trait::async_trait;

use crate::error::S3ServiceResult;
use crate::versioning::DeleteOptions;

use super::bucket::VersioningStatus;
use super::object::ObjectRecord;

/// Where to read a record from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordAddress {
    /// The current record of the key.
    Master,
    /// A specific version, wherever it is stored.
    Version(String),
    /// The dedicated null key.
    NullKey,
}

/// A record together with the master revision observed when it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRead {
    /// The record.
    pub record: ObjectRecord,
    /// Revision of the key's master at read time; feed it back as a
    /// [`Precondition::Revision`].
    pub revision: u64,
}

/// Expected master state for a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precondition {
    /// The key has no master record.
    Absent,
    /// The master is still at this revision.
    Revision(u64),
}

/// Where to write a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WriteTarget {
    /// Replace the master in place, without a version id.
    Master,
    /// Assign a fresh version id; store on the versioned key and the master.
    NewVersion,
    /// Assign a fresh internal id and store on the master only.
    NullVersion {
        /// Remove the dedicated null key in the same commit.
        replace_null_key: bool,
    },
    /// Store on the dedicated null key. The master is not touched.
    NullKey {
        /// Version id of the preserved null version.
        version_id: String,
    },
    /// Store on the versioned key. The master is not touched.
    Version {
        /// Version id of the preserved null version.
        version_id: String,
    },
    /// Rewrite an existing version wherever it lives, including the master
    /// when it holds that version.
    Existing {
        /// Version id; `None` addresses a pre-versioning master.
        version_id: Option<String>,
        /// Prefer the dedicated null key.
        is_null: bool,
    },
}

impl WriteTarget {
    /// Whether a write to this target replaces the master record.
    #[must_use]
    pub fn commits_master(&self) -> bool {
        matches!(self, Self::Master | Self::NewVersion | Self::NullVersion { .. })
    }
}

/// Result of a successful [`MetadataStore::put_record`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOutcome {
    /// Version id of the written record.
    pub version_id: Option<String>,
    /// Master revision after the write.
    pub revision: u64,
    /// Record previously held by the written address.
    pub replaced: Option<ObjectRecord>,
    /// Record dropped from the dedicated null key.
    pub removed_null_key: Option<ObjectRecord>,
}

/// Per-bucket store of object metadata records.
#[async_trait]
pub trait MetadataStore: Send + Sync + fmt::Debug {
    /// Versioning status of `bucket`.
    ///
    /// # Errors
    ///
    /// [`NoSuchBucket`](crate::error::S3ServiceError::NoSuchBucket) for
    /// unknown buckets.
    async fn get_bucket_versioning(&self, bucket: &str) -> S3ServiceResult<VersioningStatus>;

    /// Read a record. A miss is `Ok(None)`.
    async fn get_record(
        &self,
        bucket: &str,
        key: &str,
        address: &RecordAddress,
    ) -> S3ServiceResult<Option<RecordRead>>;

    /// Write `record` at `target`.
    ///
    /// # Errors
    ///
    /// [`ConditionFailed`](crate::error::S3ServiceError::ConditionFailed)
    /// when `condition` no longer holds; nothing is written in that case.
    async fn put_record(
        &self,
        bucket: &str,
        record: ObjectRecord,
        target: WriteTarget,
        condition: Option<Precondition>,
    ) -> S3ServiceResult<PutOutcome>;

    /// Remove the copy of `version_id` held on the dedicated null key
    /// (`on_null_key`) or on its versioned key, leaving the master alone.
    /// Bumps the master revision. Returns `None` when no such copy exists.
    ///
    /// # Errors
    ///
    /// [`ConditionFailed`](crate::error::S3ServiceError::ConditionFailed)
    /// when `condition` no longer holds; nothing is removed in that case.
    async fn discard_copy(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
        on_null_key: bool,
        condition: Precondition,
    ) -> S3ServiceResult<Option<ObjectRecord>>;

    /// Remove the record addressed by `options` and return it.
    ///
    /// # Errors
    ///
    /// `NoSuchKey` / `NoSuchVersion` when nothing is stored there.
    async fn delete_record(
        &self,
        bucket: &str,
        key: &str,
        options: &DeleteOptions,
    ) -> S3ServiceResult<ObjectRecord>;
}
