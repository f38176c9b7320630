//! Multipart upload state management.
//!
//! Tracks in-progress multipart uploads and their constituent parts.
//! Each [`MultipartUpload`] captures the metadata provided at initiation
//! time and accumulates [`UploadPart`] entries as they are uploaded. Part
//! data stays in the data store until the upload completes; the final record
//! then takes over the part locations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::object::{CannedAcl, DataLocation, Owner};

/// An in-progress multipart upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartUpload {
    /// Unique identifier for this upload.
    pub upload_id: String,
    /// Bucket the upload belongs to.
    pub bucket: String,
    /// The object key that this upload will create.
    pub key: String,
    /// When the upload was initiated.
    pub initiated: DateTime<Utc>,
    /// The owner who initiated the upload.
    pub owner: Owner,
    /// Content type of the final object.
    pub content_type: Option<String>,
    /// User metadata of the final object.
    pub user_metadata: BTreeMap<String, String>,
    /// Tags of the final object.
    pub tags: Vec<(String, String)>,
    /// Canned ACL of the final object.
    pub acl: CannedAcl,
    /// The storage class for the final object.
    pub storage_class: String,
    /// Parts uploaded so far, keyed by part number (1-based).
    pub parts: BTreeMap<u32, UploadPart>,
}

impl MultipartUpload {
    /// Create a new multipart upload.
    #[must_use]
    pub fn new(upload_id: String, bucket: String, key: String, owner: Owner) -> Self {
        Self {
            upload_id,
            bucket,
            key,
            initiated: Utc::now(),
            owner,
            content_type: None,
            user_metadata: BTreeMap::new(),
            tags: Vec::new(),
            acl: CannedAcl::default(),
            storage_class: "STANDARD".to_owned(),
            parts: BTreeMap::new(),
        }
    }

    /// Insert or replace a part, returning the part it replaced.
    pub fn put_part(&mut self, part: UploadPart) -> Option<UploadPart> {
        self.parts.insert(part.part_number, part)
    }

    /// Get a part by its number.
    #[must_use]
    pub fn get_part(&self, part_number: u32) -> Option<&UploadPart> {
        self.parts.get(&part_number)
    }

    /// Consume the upload, yielding the data of every part it still holds.
    #[must_use]
    pub fn into_part_locations(self) -> Vec<DataLocation> {
        self.parts.into_values().flat_map(|p| p.location).collect()
    }
}

/// A single part within a multipart upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPart {
    /// The part number (1-based, up to 10 000).
    pub part_number: u32,
    /// Hex MD5 of the part body.
    pub content_md5: String,
    /// Size of this part in bytes.
    pub size: u64,
    /// When this part was uploaded.
    pub last_modified: DateTime<Utc>,
    /// Where the part data lives.
    pub location: Vec<DataLocation>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
