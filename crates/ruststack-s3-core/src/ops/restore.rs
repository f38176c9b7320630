//! Restore-completed handler.
//!
//! Puts restored bytes back under an archived version. The version keeps its
//! id and its place in the history; only its data, timestamps and archive
//! info change.

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::checksums::compute_md5;
use crate::error::{S3ServiceError, S3ServiceResult};
use crate::provider::RustStackS3;
use crate::reclaim::OrphanGuard;
use crate::state::{
    DataLocation, ObjectRecord, Precondition, RecordAddress, RecordRead, VersioningStatus,
    WriteTarget,
};
use crate::storage::DataContext;
use crate::utils::generate_micro_version_id;
use crate::versioning::{RestoreContext, VersionToken, overwriting_versioning};

/// Input of [`RustStackS3::handle_restore_completed`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct RestoreObjectInput {
    /// Bucket.
    #[builder(setter(into))]
    pub bucket: String,
    /// Key.
    #[builder(setter(into))]
    pub key: String,
    /// Version token; the current version when absent.
    #[builder(default, setter(strip_option, into))]
    pub version_id: Option<String>,
    /// Restored bytes.
    #[builder(default, setter(into))]
    pub body: Bytes,
    /// Storage class of the restored copy; the configured default when
    /// absent.
    #[builder(default, setter(strip_option, into))]
    pub storage_class: Option<String>,
}

/// Output of [`RustStackS3::handle_restore_completed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreObjectOutput {
    /// Version id of the restored version, unchanged by the restore.
    pub version_id: Option<String>,
    /// When the restored copy expires.
    pub restore_will_expire_at: Option<chrono::DateTime<Utc>>,
}

impl RustStackS3 {
    /// Put restored data in place of an archived version.
    ///
    /// # Errors
    ///
    /// `NoSuchKey` / `NoSuchVersion` for missing targets, `MethodNotAllowed`
    /// for delete markers, `InvalidObjectState` when the version was never
    /// archived, `ConcurrencyConflict` when the key keeps changing.
    pub async fn handle_restore_completed(
        &self,
        input: RestoreObjectInput,
    ) -> S3ServiceResult<RestoreObjectOutput> {
        let token = input
            .version_id
            .as_deref()
            .map(|t| VersionToken::parse(t, &self.codec))
            .transpose()?;

        // Check the target before writing any data.
        self.read_archived(&input.bucket, &input.key, token.as_ref()).await?;

        let ctx = DataContext::new(&input.bucket, &input.key, "RestoreCompleted");
        let computed_md5 = compute_md5(&input.body);
        let size = input.body.len() as u64;
        let location = self.data.put(input.body, &ctx).await?;
        let mut guard = OrphanGuard::new(self.reclaimer.clone(), location.clone(), ctx.clone());

        let restore_ctx = RestoreContext {
            now: Utc::now(),
            scaled_ms_per_day: self.config.scaled_ms_per_day(),
            storage_class: input
                .storage_class
                .unwrap_or_else(|| self.config.default_storage_class.clone()),
            computed_md5: Some(computed_md5),
        };

        let result = self
            .commit_restore(&input.bucket, &input.key, token.as_ref(), &restore_ctx, location, size)
            .await;
        if result.is_err() {
            if let Err(e) = self.reclaimer.delete_now(guard.locations(), &ctx).await {
                warn!(
                    bucket = %input.bucket,
                    key = %input.key,
                    error = %e,
                    "failed to clean up data of a failed restore"
                );
            }
        }
        guard.disarm();
        let (restored, status) = result?;

        let version_id = self.response_version_id(&restored, status);
        info!(
            bucket = %input.bucket,
            key = %input.key,
            version_id = ?version_id,
            "restore completed"
        );
        Ok(RestoreObjectOutput {
            version_id,
            restore_will_expire_at: restored
                .archive
                .as_ref()
                .and_then(|a| a.restore_will_expire_at),
        })
    }

    async fn commit_restore(
        &self,
        bucket: &str,
        key: &str,
        token: Option<&VersionToken>,
        restore_ctx: &RestoreContext,
        location: Vec<DataLocation>,
        size: u64,
    ) -> S3ServiceResult<(ObjectRecord, VersioningStatus)> {
        let max_attempts = self.config.max_conflict_retries.saturating_add(1);
        for attempt in 1..=max_attempts {
            let status = self.metadata.get_bucket_versioning(bucket).await?;
            let master = self
                .metadata
                .get_record(bucket, key, &RecordAddress::Master)
                .await?;
            let prior = self.read_archived(bucket, key, token).await?;

            let overwrite = overwriting_versioning(&prior.record, restore_ctx);
            let mut restored = prior.record.clone();
            overwrite
                .params
                .apply_to(&mut restored, Some(generate_micro_version_id()));
            restored.location.clone_from(&location);
            restored.content_length = size;

            let target = WriteTarget::Existing {
                version_id: overwrite.address.version_id.clone(),
                is_null: overwrite.address.is_null.unwrap_or(false),
            };
            let condition = master
                .as_ref()
                .map_or(Precondition::Absent, |m| Precondition::Revision(m.revision));

            match self
                .metadata
                .put_record(bucket, restored.clone(), target, Some(condition))
                .await
            {
                Ok(outcome) => {
                    if let Some(stub) = outcome.replaced {
                        self.reclaim_superseded(
                            bucket,
                            key,
                            stub.location,
                            &restored.location,
                            "RestoreCompleted",
                        );
                    }
                    return Ok((restored, status));
                }
                Err(S3ServiceError::ConditionFailed) => {
                    debug!(bucket, key, attempt, "master changed during restore, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(bucket, key, attempts = max_attempts, "giving up restore after repeated conflicts");
        Err(S3ServiceError::ConcurrencyConflict {
            key: key.to_owned(),
            attempts: max_attempts,
        })
    }

    async fn read_archived(
        &self,
        bucket: &str,
        key: &str,
        token: Option<&VersionToken>,
    ) -> S3ServiceResult<RecordRead> {
        let read = self
            .resolve_version(bucket, key, token)
            .await?
            .ok_or_else(|| self.missing_version_error(key, token))?;
        if read.record.is_delete_marker {
            return Err(S3ServiceError::MethodNotAllowed);
        }
        if read.record.archive.is_none() {
            return Err(S3ServiceError::InvalidObjectState);
        }
        Ok(read)
    }
}
