//! Object metadata records.
//!
//! An [`ObjectRecord`] is the stored metadata of one object key at one
//! version. Records exclusively own the data blocks listed in
//! [`ObjectRecord::location`] until they are superseded or deleted.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checksums::EMPTY_MD5;

/// Origin operation recorded on records written by a plain `PUT`.
pub const ORIGIN_OP_PUT: &str = "s3:ObjectCreated:Put";
/// Origin operation recorded on records written by a copy.
pub const ORIGIN_OP_COPY: &str = "s3:ObjectCreated:Copy";
/// Origin operation recorded on records written by a multipart completion.
pub const ORIGIN_OP_COMPLETE_MPU: &str = "s3:ObjectCreated:CompleteMultipartUpload";
/// Origin operation recorded on delete markers.
pub const ORIGIN_OP_DELETE_MARKER: &str = "s3:ObjectRemoved:DeleteMarkerCreated";
/// Origin operation recorded on versions whose tag set was replaced.
pub const ORIGIN_OP_TAGGING_PUT: &str = "s3:ObjectTagging:Put";
/// Origin operation recorded on versions whose tag set was removed.
pub const ORIGIN_OP_TAGGING_DELETE: &str = "s3:ObjectTagging:Delete";

// ---------------------------------------------------------------------------
// Owner
// ---------------------------------------------------------------------------

/// The owner of an S3 object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    /// The canonical user ID of the owner.
    pub id: String,
    /// The display name of the owner.
    pub display_name: String,
}

impl Default for Owner {
    fn default() -> Self {
        Self {
            id: "75aa57f09aa0c8caeab4f8c24e99d10f8e7faeebf76c078efc7c6caea54ba06a".to_owned(),
            display_name: "webfile".to_owned(),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.display_name, self.id)
    }
}

// ---------------------------------------------------------------------------
// CannedAcl
// ---------------------------------------------------------------------------

/// Predefined (canned) ACL attached to an object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CannedAcl {
    /// Owner gets `FULL_CONTROL` (default).
    #[default]
    Private,
    /// The `AllUsers` group gets `READ`.
    PublicRead,
    /// The `AllUsers` group gets `READ` and `WRITE`.
    PublicReadWrite,
    /// The `AuthenticatedUsers` group gets `READ`.
    AuthenticatedRead,
    /// Bucket owner gets `READ`.
    BucketOwnerRead,
    /// Bucket owner gets `FULL_CONTROL`.
    BucketOwnerFullControl,
}

impl CannedAcl {
    /// Return the string representation of the canned ACL.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::PublicRead => "public-read",
            Self::PublicReadWrite => "public-read-write",
            Self::AuthenticatedRead => "authenticated-read",
            Self::BucketOwnerRead => "bucket-owner-read",
            Self::BucketOwnerFullControl => "bucket-owner-full-control",
        }
    }
}

impl fmt::Display for CannedAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// DataLocation
// ---------------------------------------------------------------------------

/// Opaque descriptor of one data block held by a [`DataStore`](crate::storage::DataStore).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataLocation {
    /// Block key inside the data store.
    pub key: String,
    /// Offset of this block within the object.
    pub start: u64,
    /// Block size in bytes.
    pub size: u64,
    /// Name of the data store holding the block.
    pub data_store_name: String,
    /// Content MD5 of the block as computed by the data store.
    pub data_store_etag: String,
}

// ---------------------------------------------------------------------------
// ArchiveInfo / ReplicationInfo
// ---------------------------------------------------------------------------

/// Cold-storage bookkeeping for archived objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveInfo {
    /// Opaque description of where the archive lives.
    pub archive_info: Option<serde_json::Value>,
    /// When the restore was requested.
    pub restore_requested_at: Option<DateTime<Utc>>,
    /// For how many days the restored copy stays readable.
    pub restore_requested_days: Option<u32>,
    /// When the restored bytes were written back.
    pub restore_completed_at: Option<DateTime<Utc>>,
    /// When the restored copy expires again.
    pub restore_will_expire_at: Option<DateTime<Utc>>,
}

impl ArchiveInfo {
    /// Whether a completed restore is currently readable.
    #[must_use]
    pub fn is_restored_at(&self, now: DateTime<Utc>) -> bool {
        match (self.restore_completed_at, self.restore_will_expire_at) {
            (Some(_), Some(expiry)) => expiry > now,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// Replication state of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationInfo {
    /// Overall status (`PENDING`, `COMPLETED`, `FAILED`, `REPLICA`).
    pub status: String,
    /// Replication destination bucket ARN.
    pub destination: String,
    /// Storage class(es) at the destination.
    pub storage_class: String,
    /// IAM role used for replication.
    pub role: String,
}

// ---------------------------------------------------------------------------
// ObjectRecord
// ---------------------------------------------------------------------------

/// Metadata of one object key at one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    /// The object key.
    pub key: String,
    /// Raw version id, absent for objects written before versioning was
    /// ever configured on the bucket.
    pub version_id: Option<String>,
    /// This record is the null version.
    pub is_null: bool,
    /// The null version lives on the dedicated null key.
    pub is_null2: bool,
    /// Version id of the null version shadowed by this record.
    pub null_version_id: Option<String>,
    /// Upload id of the null version shadowed by this record.
    pub null_upload_id: Option<String>,
    /// Set when this record was produced by a completed multipart upload.
    pub upload_id: Option<String>,
    /// This record is a delete marker.
    pub is_delete_marker: bool,
    /// Data blocks owned by this record, in object order.
    pub location: Vec<DataLocation>,
    /// Object size in bytes.
    pub content_length: u64,
    /// Unquoted content MD5 (`<hex>` or `<hex>-<parts>`).
    pub content_md5: String,
    /// Content type.
    pub content_type: Option<String>,
    /// Storage class label.
    pub storage_class: String,
    /// User metadata headers, keyed by full header name.
    pub user_metadata: BTreeMap<String, String>,
    /// Object tags.
    pub tags: Vec<(String, String)>,
    /// Canned ACL.
    pub acl: CannedAcl,
    /// Object owner.
    pub owner: Owner,
    /// Legal hold flag, if one was ever set.
    pub legal_hold: Option<bool>,
    /// Object lock retention mode.
    pub retention_mode: Option<String>,
    /// Object lock retain-until date.
    pub retention_date: Option<DateTime<Utc>>,
    /// Archive bookkeeping for cold objects.
    pub archive: Option<ArchiveInfo>,
    /// Replication state.
    pub replication_info: Option<ReplicationInfo>,
    /// Checksum of restored bytes when it differs from `content_md5`.
    pub restored_etag: Option<String>,
    /// Creation time of this version.
    pub creation_time: DateTime<Utc>,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
    /// Internal revision marker, refreshed by in-place rewrites.
    pub micro_version_id: Option<String>,
    /// Operation that produced this record.
    pub origin_op: String,
}

impl ObjectRecord {
    /// Create an empty record for `key`, stamped with the current time.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            version_id: None,
            is_null: false,
            is_null2: false,
            null_version_id: None,
            null_upload_id: None,
            upload_id: None,
            is_delete_marker: false,
            location: Vec::new(),
            content_length: 0,
            content_md5: EMPTY_MD5.to_owned(),
            content_type: None,
            storage_class: "STANDARD".to_owned(),
            user_metadata: BTreeMap::new(),
            tags: Vec::new(),
            acl: CannedAcl::default(),
            owner: Owner::default(),
            legal_hold: None,
            retention_mode: None,
            retention_date: None,
            archive: None,
            replication_info: None,
            restored_etag: None,
            creation_time: now,
            last_modified: now,
            micro_version_id: None,
            origin_op: ORIGIN_OP_PUT.to_owned(),
        }
    }

    /// Create a delete marker record for `key`.
    #[must_use]
    pub fn delete_marker(key: impl Into<String>, owner: Owner) -> Self {
        let mut record = Self::new(key);
        record.is_delete_marker = true;
        record.owner = owner;
        record.origin_op = ORIGIN_OP_DELETE_MARKER.to_owned();
        record
    }

    /// Whether this record occupies the dedicated null key.
    #[must_use]
    pub fn is_non_legacy_null(&self) -> bool {
        self.is_null && self.is_null2
    }

    /// Whether this record answers to the `"null"` version token.
    #[must_use]
    pub fn answers_to_null(&self) -> bool {
        self.is_null || self.version_id.is_none()
    }

    /// Whether the bytes of this record are sitting in cold storage and have
    /// not been restored.
    #[must_use]
    pub fn is_archived_at(&self, now: DateTime<Utc>) -> bool {
        self.archive
            .as_ref()
            .is_some_and(|archive| !archive.is_restored_at(now))
    }

    /// The S3 ETag of this record.
    #[must_use]
    pub fn e_tag(&self) -> String {
        crate::checksums::quote_etag(&self.content_md5)
    }
}
