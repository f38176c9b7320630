//! Object configuration operation handlers.
//!
//! Implements `get_object_tagging`, `put_object_tagging`,
//! `delete_object_tagging` and `put_object_acl`. Each rewrites one specific
//! version in place: the version keeps its id, data and place in the
//! history, and no other copy of it is touched.

use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::error::{S3ServiceError, S3ServiceResult};
use crate::provider::RustStackS3;
use crate::state::{
    CannedAcl, ORIGIN_OP_TAGGING_DELETE, ORIGIN_OP_TAGGING_PUT, ObjectRecord, Precondition,
    WriteTarget,
};
use crate::validation::validate_tags;
use crate::versioning::{VersionToken, get_version_specific_options};

/// Origin operation recorded on versions whose ACL was replaced.
const ORIGIN_OP_ACL_PUT: &str = "s3:ObjectAcl:Put";

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// Input of [`RustStackS3::handle_get_object_tagging`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct GetObjectTaggingInput {
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

/// Output of [`RustStackS3::handle_get_object_tagging`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetObjectTaggingOutput {
    /// The version's tag set.
    pub tags: Vec<(String, String)>,
    /// Version id of the tagged version.
    pub version_id: Option<String>,
}

/// Input of [`RustStackS3::handle_put_object_tagging`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct PutObjectTaggingInput {
    /// Bucket.
    #[builder(setter(into))]
    pub bucket: String,
    /// Key.
    #[builder(setter(into))]
    pub key: String,
    /// Version token; the current version when absent.
    #[builder(default, setter(strip_option, into))]
    pub version_id: Option<String>,
    /// The new tag set, replacing the old one.
    #[builder(default)]
    pub tags: Vec<(String, String)>,
}

/// Input of [`RustStackS3::handle_delete_object_tagging`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct DeleteObjectTaggingInput {
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

/// Input of [`RustStackS3::handle_put_object_acl`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct PutObjectAclInput {
    /// Bucket.
    #[builder(setter(into))]
    pub bucket: String,
    /// Key.
    #[builder(setter(into))]
    pub key: String,
    /// Version token; the current version when absent.
    #[builder(default, setter(strip_option, into))]
    pub version_id: Option<String>,
    /// The new canned ACL.
    pub acl: CannedAcl,
}

/// Output of the handlers that rewrite a version's configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectConfigOutput {
    /// Version id of the rewritten version.
    pub version_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

impl RustStackS3 {
    /// Read the tag set of an object or one of its versions.
    ///
    /// # Errors
    ///
    /// `NoSuchKey` / `NoSuchVersion` when nothing is stored there,
    /// `MethodNotAllowed` for delete markers.
    pub async fn handle_get_object_tagging(
        &self,
        input: GetObjectTaggingInput,
    ) -> S3ServiceResult<GetObjectTaggingOutput> {
        let token = self.parse_token(input.version_id.as_deref())?;
        let status = self.metadata.get_bucket_versioning(&input.bucket).await?;
        let record = self
            .resolve_version(&input.bucket, &input.key, token.as_ref())
            .await?
            .ok_or_else(|| self.missing_version_error(&input.key, token.as_ref()))?
            .record;
        if record.is_delete_marker {
            return Err(S3ServiceError::MethodNotAllowed);
        }
        Ok(GetObjectTaggingOutput {
            version_id: self.response_version_id(&record, status),
            tags: record.tags,
        })
    }

    /// Replace the tag set of an object or one of its versions.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for bad tags, plus the errors of
    /// [`handle_get_object_tagging`](Self::handle_get_object_tagging) and
    /// `ConcurrencyConflict` when the key keeps changing.
    pub async fn handle_put_object_tagging(
        &self,
        input: PutObjectTaggingInput,
    ) -> S3ServiceResult<ObjectConfigOutput> {
        validate_tags(&input.tags)?;
        let tags = input.tags;
        self.rewrite_version(
            &input.bucket,
            &input.key,
            input.version_id.as_deref(),
            ORIGIN_OP_TAGGING_PUT,
            |record| record.tags.clone_from(&tags),
        )
        .await
    }

    /// Remove the tag set of an object or one of its versions.
    pub async fn handle_delete_object_tagging(
        &self,
        input: DeleteObjectTaggingInput,
    ) -> S3ServiceResult<ObjectConfigOutput> {
        self.rewrite_version(
            &input.bucket,
            &input.key,
            input.version_id.as_deref(),
            ORIGIN_OP_TAGGING_DELETE,
            |record| record.tags.clear(),
        )
        .await
    }

    /// Replace the canned ACL of an object or one of its versions.
    pub async fn handle_put_object_acl(
        &self,
        input: PutObjectAclInput,
    ) -> S3ServiceResult<ObjectConfigOutput> {
        let acl = input.acl;
        self.rewrite_version(
            &input.bucket,
            &input.key,
            input.version_id.as_deref(),
            ORIGIN_OP_ACL_PUT,
            |record| record.acl = acl,
        )
        .await
    }

    fn parse_token(&self, version_id: Option<&str>) -> S3ServiceResult<Option<VersionToken>> {
        version_id
            .map(|t| VersionToken::parse(t, &self.codec))
            .transpose()
    }

    /// Apply `update` to the version `version_id` addresses and write it back
    /// to that version only, conditional on the master revision it was read
    /// under.
    async fn rewrite_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        origin_op: &'static str,
        update: impl Fn(&mut ObjectRecord),
    ) -> S3ServiceResult<ObjectConfigOutput> {
        let token = self.parse_token(version_id)?;
        let status = self.metadata.get_bucket_versioning(bucket).await?;
        let max_attempts = self.config.max_conflict_retries.saturating_add(1);

        for attempt in 1..=max_attempts {
            let read = self
                .resolve_version(bucket, key, token.as_ref())
                .await?
                .ok_or_else(|| self.missing_version_error(key, token.as_ref()))?;
            if read.record.is_delete_marker {
                return Err(S3ServiceError::MethodNotAllowed);
            }

            let address =
                get_version_specific_options(&read.record, self.decision_ctx.compat_mode);
            let mut record = read.record;
            update(&mut record);
            record.origin_op = origin_op.to_owned();
            let target = WriteTarget::Existing {
                version_id: address.version_id,
                is_null: address.is_null.unwrap_or(false),
            };

            match self
                .metadata
                .put_record(
                    bucket,
                    record.clone(),
                    target,
                    Some(Precondition::Revision(read.revision)),
                )
                .await
            {
                Ok(_) => {
                    let version_id = self.response_version_id(&record, status);
                    info!(bucket, key, version_id = ?version_id, origin_op, "version rewritten");
                    return Ok(ObjectConfigOutput { version_id });
                }
                Err(S3ServiceError::ConditionFailed) => {
                    debug!(bucket, key, attempt, "master changed during rewrite, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(bucket, key, attempts = max_attempts, "giving up rewrite after repeated conflicts");
        Err(S3ServiceError::ConcurrencyConflict {
            key: key.to_owned(),
            attempts: max_attempts,
        })
    }
}
