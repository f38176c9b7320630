//! Multipart upload operation handlers.
//!
//! Implements `create_multipart_upload`, `upload_part`,
//! `complete_multipart_upload` and `abort_multipart_upload`. Part data is
//! written as it arrives; completion commits one record that takes over the
//! locations of the listed parts through the same versioned pipeline as a
//! plain put.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info};
use typed_builder::TypedBuilder;

use crate::checksums::{compute_md5, compute_multipart_md5, quote_etag};
use crate::error::{S3ServiceError, S3ServiceResult};
use crate::ops::commit::Prefetched;
use crate::provider::RustStackS3;
use crate::state::{
    CannedAcl, DataLocation, MultipartUpload, ORIGIN_OP_COMPLETE_MPU, ObjectRecord, Owner,
    UploadPart,
};
use crate::storage::DataContext;
use crate::utils::{generate_upload_id, unquote_etag};
use crate::validation::{validate_content_md5, validate_metadata, validate_object_key, validate_tags};

/// Highest part number S3 accepts.
pub const MAX_PART_NUMBER: u32 = 10_000;

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// Input of [`RustStackS3::handle_create_multipart_upload`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct CreateMultipartUploadInput {
    /// Target bucket.
    #[builder(setter(into))]
    pub bucket: String,
    /// Target key.
    #[builder(setter(into))]
    pub key: String,
    /// Content type of the final object.
    #[builder(default, setter(strip_option, into))]
    pub content_type: Option<String>,
    /// User metadata of the final object.
    #[builder(default)]
    pub user_metadata: BTreeMap<String, String>,
    /// Tags of the final object.
    #[builder(default)]
    pub tags: Vec<(String, String)>,
    /// Canned ACL of the final object.
    #[builder(default)]
    pub acl: CannedAcl,
    /// Storage class of the final object.
    #[builder(default, setter(strip_option, into))]
    pub storage_class: Option<String>,
    /// Upload owner.
    #[builder(default)]
    pub owner: Owner,
}

/// Input of [`RustStackS3::handle_upload_part`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct UploadPartInput {
    /// Bucket of the upload.
    #[builder(setter(into))]
    pub bucket: String,
    /// Key of the upload.
    #[builder(setter(into))]
    pub key: String,
    /// Upload id.
    #[builder(setter(into))]
    pub upload_id: String,
    /// Part number, 1 to [`MAX_PART_NUMBER`].
    pub part_number: u32,
    /// Part body.
    #[builder(default, setter(into))]
    pub body: Bytes,
    /// Base64 `Content-MD5` header.
    #[builder(default, setter(strip_option, into))]
    pub content_md5: Option<String>,
}

/// A part listed in a completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// Part number.
    pub part_number: u32,
    /// ETag returned by the upload, quoted or not.
    pub e_tag: String,
}

/// Input of [`RustStackS3::handle_complete_multipart_upload`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct CompleteMultipartUploadInput {
    /// Bucket of the upload.
    #[builder(setter(into))]
    pub bucket: String,
    /// Key of the upload.
    #[builder(setter(into))]
    pub key: String,
    /// Upload id.
    #[builder(setter(into))]
    pub upload_id: String,
    /// Parts to assemble, in ascending part number order.
    pub parts: Vec<CompletedPart>,
}

/// Output of [`RustStackS3::handle_complete_multipart_upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteMultipartUploadOutput {
    /// Version id of the assembled object.
    pub version_id: Option<String>,
    /// Quoted composite ETag.
    pub e_tag: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

impl RustStackS3 {
    /// Start a multipart upload and return its id.
    pub async fn handle_create_multipart_upload(
        &self,
        input: CreateMultipartUploadInput,
    ) -> S3ServiceResult<String> {
        validate_object_key(&input.key)?;
        validate_metadata(&input.user_metadata)?;
        validate_tags(&input.tags)?;
        self.metadata.get_bucket_versioning(&input.bucket).await?;

        let upload_id = generate_upload_id();
        let mut upload = MultipartUpload::new(
            upload_id.clone(),
            input.bucket.clone(),
            input.key.clone(),
            input.owner,
        );
        upload.content_type = input.content_type;
        upload.user_metadata = input.user_metadata;
        upload.tags = input.tags;
        upload.acl = input.acl;
        upload.storage_class = input
            .storage_class
            .unwrap_or_else(|| self.config.default_storage_class.clone());
        self.uploads.insert(upload_id.clone(), upload);

        debug!(bucket = %input.bucket, key = %input.key, upload_id = %upload_id, "create_multipart_upload");
        Ok(upload_id)
    }

    /// Upload one part; returns its quoted ETag. Re-uploading a part number
    /// replaces the earlier part and reclaims its data.
    pub async fn handle_upload_part(&self, input: UploadPartInput) -> S3ServiceResult<String> {
        if !(1..=MAX_PART_NUMBER).contains(&input.part_number) {
            return Err(S3ServiceError::InvalidArgument {
                message: format!(
                    "Part number must be an integer between 1 and {MAX_PART_NUMBER}, inclusive"
                ),
            });
        }
        validate_content_md5(input.content_md5.as_deref(), &input.body)?;
        self.ensure_upload(&input.bucket, &input.key, &input.upload_id)?;

        let ctx = DataContext::new(&input.bucket, &input.key, "UploadPart");
        let content_md5 = compute_md5(&input.body);
        let size = input.body.len() as u64;
        let location = self.data.put(input.body, &ctx).await?;

        let part = UploadPart {
            part_number: input.part_number,
            content_md5: content_md5.clone(),
            size,
            last_modified: Utc::now(),
            location: location.clone(),
        };

        // The upload may have been completed or aborted while data was written.
        let replaced = match self.uploads.get_mut(&input.upload_id) {
            Some(mut upload) => upload.put_part(part),
            None => {
                self.reclaimer.schedule(location, ctx);
                return Err(S3ServiceError::NoSuchUpload {
                    upload_id: input.upload_id,
                });
            }
        };
        if let Some(old) = replaced {
            self.reclaim_superseded(&input.bucket, &input.key, old.location, &[], "UploadPart");
        }

        debug!(
            bucket = %input.bucket,
            key = %input.key,
            upload_id = %input.upload_id,
            part_number = input.part_number,
            size,
            "upload_part"
        );
        Ok(quote_etag(&content_md5))
    }

    /// Assemble the listed parts into the new current version of the key.
    ///
    /// # Errors
    ///
    /// `NoSuchUpload` for unknown uploads, `InvalidPart` when the parts are
    /// not ascending, missing, or carry a different ETag.
    pub async fn handle_complete_multipart_upload(
        &self,
        input: CompleteMultipartUploadInput,
    ) -> S3ServiceResult<CompleteMultipartUploadOutput> {
        let upload = self.ensure_upload(&input.bucket, &input.key, &input.upload_id)?;
        if input.parts.is_empty() {
            return Err(S3ServiceError::InvalidPart);
        }

        let mut location: Vec<DataLocation> = Vec::new();
        let mut part_md5s = Vec::with_capacity(input.parts.len());
        let mut offset = 0u64;
        let mut previous = 0u32;
        for requested in &input.parts {
            if requested.part_number <= previous {
                return Err(S3ServiceError::InvalidPart);
            }
            previous = requested.part_number;
            let part = upload
                .get_part(requested.part_number)
                .filter(|p| p.content_md5 == unquote_etag(&requested.e_tag))
                .ok_or(S3ServiceError::InvalidPart)?;
            for block in &part.location {
                let mut block = block.clone();
                block.start = offset;
                offset += block.size;
                location.push(block);
            }
            part_md5s.push(part.content_md5.clone());
        }

        let mut record = ObjectRecord::new(input.key.as_str());
        record.content_length = offset;
        record.content_md5 = compute_multipart_md5(&part_md5s);
        record.location = location;
        record.content_type.clone_from(&upload.content_type);
        record.user_metadata.clone_from(&upload.user_metadata);
        record.tags.clone_from(&upload.tags);
        record.acl = upload.acl;
        record.owner = upload.owner.clone();
        record.storage_class.clone_from(&upload.storage_class);
        record.upload_id = Some(upload.upload_id.clone());
        record.origin_op = ORIGIN_OP_COMPLETE_MPU.to_owned();

        // Parts stay with the upload on failure so the client can retry.
        let committed = self
            .commit_new_record(
                &input.bucket,
                record,
                Prefetched::default(),
                "CompleteMultipartUpload",
                None,
            )
            .await?;

        self.uploads.remove(&input.upload_id);
        self.reclaim_superseded(
            &input.bucket,
            &input.key,
            upload.into_part_locations(),
            &committed.record.location,
            "CompleteMultipartUpload",
        );

        let version_id = self.response_version_id(&committed.record, committed.status);
        info!(
            bucket = %input.bucket,
            key = %input.key,
            upload_id = %input.upload_id,
            parts = part_md5s.len(),
            version_id = ?version_id,
            "complete_multipart_upload"
        );
        Ok(CompleteMultipartUploadOutput {
            version_id,
            e_tag: committed.record.e_tag(),
        })
    }

    /// Abort an upload and reclaim the data of its parts.
    pub async fn handle_abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> S3ServiceResult<()> {
        self.ensure_upload(bucket, key, upload_id)?;
        if let Some((_, upload)) = self.uploads.remove(upload_id) {
            self.reclaim_superseded(
                bucket,
                key,
                upload.into_part_locations(),
                &[],
                "AbortMultipartUpload",
            );
        }
        debug!(bucket, key, upload_id, "abort_multipart_upload");
        Ok(())
    }

    /// Snapshot of the upload, checked against the request's bucket and key.
    fn ensure_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> S3ServiceResult<MultipartUpload> {
        self.uploads
            .get(upload_id)
            .filter(|u| u.bucket == bucket && u.key == key)
            .map(|u| u.value().clone())
            .ok_or_else(|| S3ServiceError::NoSuchUpload {
                upload_id: upload_id.to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
