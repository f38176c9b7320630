//! Object operation handlers.
//!
//! Implements `put_object`, `copy_object`, `get_object` and `delete_object`
//! on top of the shared versioned write pipeline.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use typed_builder::TypedBuilder;

use crate::checksums::compute_md5;
use crate::error::{S3ServiceError, S3ServiceResult};
use crate::ops::commit::{Committed, Prefetched};
use crate::provider::RustStackS3;
use crate::reclaim::OrphanGuard;
use crate::state::{
    CannedAcl, ORIGIN_OP_COPY, ORIGIN_OP_PUT, ObjectRecord, Owner, RecordRead,
};
use crate::storage::DataContext;
use crate::validation::{validate_content_md5, validate_metadata, validate_object_key, validate_tags};
use crate::versioning::{VersionToken, preprocessing_versioning_delete};

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// Input of [`RustStackS3::handle_put_object`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct PutObjectInput {
    /// Target bucket.
    #[builder(setter(into))]
    pub bucket: String,
    /// Target key.
    #[builder(setter(into))]
    pub key: String,
    /// Object body.
    #[builder(default, setter(into))]
    pub body: Bytes,
    /// Base64 `Content-MD5` header.
    #[builder(default, setter(strip_option, into))]
    pub content_md5: Option<String>,
    /// Content type.
    #[builder(default, setter(strip_option, into))]
    pub content_type: Option<String>,
    /// `x-amz-meta-*` headers.
    #[builder(default)]
    pub user_metadata: BTreeMap<String, String>,
    /// Object tags.
    #[builder(default)]
    pub tags: Vec<(String, String)>,
    /// Canned ACL.
    #[builder(default)]
    pub acl: CannedAcl,
    /// Storage class; the configured default when absent.
    #[builder(default, setter(strip_option, into))]
    pub storage_class: Option<String>,
    /// Object owner.
    #[builder(default)]
    pub owner: Owner,
    /// Master record the caller already read, saving the first resolve.
    #[builder(default, setter(strip_option))]
    pub prior_record: Option<RecordRead>,
}

/// Output of [`RustStackS3::handle_put_object`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectOutput {
    /// Version id of the new object, absent on never-versioned buckets.
    pub version_id: Option<String>,
    /// Quoted ETag.
    pub e_tag: String,
}

/// How a copy picks the metadata of the new object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetadataDirective {
    /// Keep the source's metadata.
    #[default]
    Copy,
    /// Use the metadata given in the request.
    Replace,
}

/// Input of [`RustStackS3::handle_copy_object`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct CopyObjectInput {
    /// Destination bucket.
    #[builder(setter(into))]
    pub bucket: String,
    /// Destination key.
    #[builder(setter(into))]
    pub key: String,
    /// Source bucket.
    #[builder(setter(into))]
    pub source_bucket: String,
    /// Source key.
    #[builder(setter(into))]
    pub source_key: String,
    /// Source version token.
    #[builder(default, setter(strip_option, into))]
    pub source_version_id: Option<String>,
    /// Metadata directive.
    #[builder(default)]
    pub metadata_directive: MetadataDirective,
    /// Content type, with [`MetadataDirective::Replace`].
    #[builder(default, setter(strip_option, into))]
    pub content_type: Option<String>,
    /// User metadata, with [`MetadataDirective::Replace`].
    #[builder(default)]
    pub user_metadata: BTreeMap<String, String>,
    /// Tags, with [`MetadataDirective::Replace`].
    #[builder(default)]
    pub tags: Vec<(String, String)>,
    /// Storage class of the copy.
    #[builder(default, setter(strip_option, into))]
    pub storage_class: Option<String>,
    /// Owner of the copy.
    #[builder(default)]
    pub owner: Owner,
}

/// Output of [`RustStackS3::handle_copy_object`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyObjectOutput {
    /// Version id of the new object.
    pub version_id: Option<String>,
    /// Version id of the source object.
    pub copy_source_version_id: Option<String>,
    /// Quoted ETag.
    pub e_tag: String,
    /// Last-modified time of the new object.
    pub last_modified: DateTime<Utc>,
}

/// Input of [`RustStackS3::handle_get_object`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct GetObjectInput {
    /// Bucket.
    #[builder(setter(into))]
    pub bucket: String,
    /// Key.
    #[builder(setter(into))]
    pub key: String,
    /// Version token; the current version when absent.
    #[builder(default, setter(strip_option, into))]
    pub version_id: Option<String>,
}

/// Output of [`RustStackS3::handle_get_object`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetObjectOutput {
    /// Object body.
    pub body: Bytes,
    /// Version id of the returned object.
    pub version_id: Option<String>,
    /// Quoted ETag.
    pub e_tag: String,
    /// Size in bytes.
    pub content_length: u64,
    /// Content type.
    pub content_type: Option<String>,
    /// User metadata.
    pub user_metadata: BTreeMap<String, String>,
    /// Storage class.
    pub storage_class: String,
    /// Last-modified time.
    pub last_modified: DateTime<Utc>,
}

/// Input of [`RustStackS3::handle_delete_object`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct DeleteObjectInput {
    /// Bucket.
    #[builder(setter(into))]
    pub bucket: String,
    /// Key.
    #[builder(setter(into))]
    pub key: String,
    /// Version token; a delete marker is created when absent on a
    /// versioned bucket.
    #[builder(default, setter(strip_option, into))]
    pub version_id: Option<String>,
    /// Owner recorded on a created delete marker.
    #[builder(default)]
    pub owner: Owner,
}

/// Output of [`RustStackS3::handle_delete_object`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteObjectOutput {
    /// A delete marker was created, or the removed version was one.
    pub delete_marker: bool,
    /// Version id of the created marker or of the removed version.
    pub version_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

impl RustStackS3 {
    /// Put (upload) a new object.
    ///
    /// # Errors
    ///
    /// Validation errors before anything is written; data store errors with
    /// nothing written; metadata errors after the new data was cleaned up.
    pub async fn handle_put_object(&self, input: PutObjectInput) -> S3ServiceResult<PutObjectOutput> {
        let PutObjectInput {
            bucket,
            key,
            body,
            content_md5,
            content_type,
            user_metadata,
            tags,
            acl,
            storage_class,
            owner,
            prior_record,
        } = input;

        validate_object_key(&key)?;
        validate_content_md5(content_md5.as_deref(), &body)?;
        validate_metadata(&user_metadata)?;
        validate_tags(&tags)?;

        let mut record = ObjectRecord::new(key.as_str());
        record.content_length = body.len() as u64;
        record.content_md5 = compute_md5(&body);
        record.content_type = content_type;
        record.user_metadata = user_metadata;
        record.tags = tags;
        record.acl = acl;
        record.owner = owner;
        record.storage_class =
            storage_class.unwrap_or_else(|| self.config.default_storage_class.clone());
        record.origin_op = ORIGIN_OP_PUT.to_owned();

        let ctx = DataContext::new(&bucket, &key, "PutObject");
        let committed = self.write_and_commit(&bucket, record, body, prior_record, &ctx).await?;

        let version_id = self.response_version_id(&committed.record, committed.status);
        info!(bucket = %bucket, key = %key, version_id = ?version_id, "put_object completed");
        Ok(PutObjectOutput {
            version_id,
            e_tag: committed.record.e_tag(),
        })
    }

    /// Copy an object. The copy owns fresh data blocks.
    ///
    /// # Errors
    ///
    /// `InvalidVersionId` for a malformed source token, `NoSuchKey` /
    /// `NoSuchVersion` for a missing source, `MethodNotAllowed` when the
    /// source version is a delete marker, `InvalidObjectState` for archived
    /// sources.
    pub async fn handle_copy_object(
        &self,
        input: CopyObjectInput,
    ) -> S3ServiceResult<CopyObjectOutput> {
        validate_object_key(&input.key)?;
        let token = input
            .source_version_id
            .as_deref()
            .map(|t| VersionToken::parse(t, &self.codec))
            .transpose()?;

        let source_status = self.metadata.get_bucket_versioning(&input.source_bucket).await?;
        let source = self
            .read_live_record(&input.source_bucket, &input.source_key, token.as_ref())
            .await?;
        let body = self.data.get(&source.location).await?;

        let mut record = ObjectRecord::new(input.key.as_str());
        record.content_length = source.content_length;
        record.content_md5.clone_from(&source.content_md5);
        match input.metadata_directive {
            MetadataDirective::Copy => {
                record.content_type.clone_from(&source.content_type);
                record.user_metadata.clone_from(&source.user_metadata);
                record.tags.clone_from(&source.tags);
            }
            MetadataDirective::Replace => {
                validate_metadata(&input.user_metadata)?;
                validate_tags(&input.tags)?;
                record.content_type = input.content_type;
                record.user_metadata = input.user_metadata;
                record.tags = input.tags;
            }
        }
        record.owner = input.owner;
        record.storage_class = input
            .storage_class
            .unwrap_or_else(|| self.config.default_storage_class.clone());
        record.origin_op = ORIGIN_OP_COPY.to_owned();

        let ctx = DataContext::new(&input.bucket, &input.key, "CopyObject");
        let committed = self
            .write_and_commit(&input.bucket, record, body, None, &ctx)
            .await?;

        debug!(
            src_bucket = %input.source_bucket,
            src_key = %input.source_key,
            bucket = %input.bucket,
            key = %input.key,
            "copy_object completed"
        );
        Ok(CopyObjectOutput {
            version_id: self.response_version_id(&committed.record, committed.status),
            copy_source_version_id: self.response_version_id(&source, source_status),
            e_tag: committed.record.e_tag(),
            last_modified: committed.record.last_modified,
        })
    }

    /// Read an object.
    ///
    /// # Errors
    ///
    /// `NoSuchKey` when the current version is missing or a delete marker,
    /// `NoSuchVersion` / `MethodNotAllowed` for a requested version that is
    /// missing or a delete marker, `InvalidObjectState` for archived data.
    pub async fn handle_get_object(&self, input: GetObjectInput) -> S3ServiceResult<GetObjectOutput> {
        let token = input
            .version_id
            .as_deref()
            .map(|t| VersionToken::parse(t, &self.codec))
            .transpose()?;
        let status = self.metadata.get_bucket_versioning(&input.bucket).await?;
        let record = self
            .read_live_record(&input.bucket, &input.key, token.as_ref())
            .await?;
        let body = self.data.get(&record.location).await?;

        Ok(GetObjectOutput {
            body,
            version_id: self.response_version_id(&record, status),
            e_tag: record.e_tag(),
            content_length: record.content_length,
            content_type: record.content_type,
            user_metadata: record.user_metadata,
            storage_class: record.storage_class,
            last_modified: record.last_modified,
        })
    }

    /// Delete an object or one of its versions.
    ///
    /// # Errors
    ///
    /// `InvalidVersionId` for malformed tokens (before any read);
    /// `NoSuchVersion` when the requested version does not exist.
    pub async fn handle_delete_object(
        &self,
        input: DeleteObjectInput,
    ) -> S3ServiceResult<DeleteObjectOutput> {
        let token = input
            .version_id
            .as_deref()
            .map(|t| VersionToken::parse(t, &self.codec))
            .transpose()?;
        let status = self.metadata.get_bucket_versioning(&input.bucket).await?;

        if status.is_configured() && token.is_none() {
            return self
                .create_delete_marker(&input.bucket, &input.key, input.owner)
                .await;
        }

        let Some(resolved) = self
            .resolve_version(&input.bucket, &input.key, token.as_ref())
            .await?
        else {
            if token.is_some() {
                return Err(self.missing_version_error(&input.key, token.as_ref()));
            }
            debug!(bucket = %input.bucket, key = %input.key, "delete of missing key");
            return Ok(DeleteObjectOutput::default());
        };

        let options = preprocessing_versioning_delete(
            &input.bucket,
            status,
            &resolved.record,
            token.as_ref(),
            self.decision_ctx.compat_mode,
        );
        let removed = self
            .metadata
            .delete_record(&input.bucket, &input.key, &options)
            .await?;
        if options.delete_data {
            self.reclaim_superseded(
                &input.bucket,
                &input.key,
                removed.location.clone(),
                &[],
                "DeleteObject",
            );
        }

        info!(
            bucket = %input.bucket,
            key = %input.key,
            version_id = ?removed.version_id,
            "delete_object completed"
        );
        Ok(DeleteObjectOutput {
            delete_marker: removed.is_delete_marker,
            version_id: if status.is_configured() {
                self.response_version_id(&removed, status)
            } else {
                None
            },
        })
    }

    async fn create_delete_marker(
        &self,
        bucket: &str,
        key: &str,
        owner: Owner,
    ) -> S3ServiceResult<DeleteObjectOutput> {
        let marker = ObjectRecord::delete_marker(key, owner);
        let committed = self
            .commit_new_record(bucket, marker, Prefetched::default(), "DeleteObject", None)
            .await?;
        let version_id = self.response_version_id(&committed.record, committed.status);
        info!(bucket, key, version_id = ?version_id, "delete marker created");
        Ok(DeleteObjectOutput {
            delete_marker: true,
            version_id,
        })
    }

    /// Write `body`, then commit `record` over it with orphan cleanup.
    pub(crate) async fn write_and_commit(
        &self,
        bucket: &str,
        mut record: ObjectRecord,
        body: Bytes,
        hint: Option<RecordRead>,
        ctx: &DataContext,
    ) -> S3ServiceResult<Committed> {
        // Fail before writing any data; the first attempt reuses this read.
        let status = self.metadata.get_bucket_versioning(bucket).await?;

        let locations = self.data.put(body, ctx).await?;
        record.location.clone_from(&locations);
        let guard = OrphanGuard::new(self.reclaimer.clone(), locations, ctx.clone());
        let prefetched = Prefetched {
            status: Some(status),
            master: hint,
        };
        self.commit_with_cleanup(bucket, record, prefetched, guard, ctx).await
    }

    /// Read the record addressed by `token`, refusing delete markers and
    /// archived data.
    async fn read_live_record(
        &self,
        bucket: &str,
        key: &str,
        token: Option<&VersionToken>,
    ) -> S3ServiceResult<ObjectRecord> {
        let record = self
            .resolve_version(bucket, key, token)
            .await?
            .map(|read| read.record);
        let record = match (record, token) {
            (Some(record), _) if !record.is_delete_marker => record,
            (Some(_), Some(_)) => return Err(S3ServiceError::MethodNotAllowed),
            (_, token) => return Err(self.missing_version_error(key, token)),
        };
        if record.is_archived_at(Utc::now()) {
            return Err(S3ServiceError::InvalidObjectState);
        }
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
