//! The versioned write pipeline shared by every handler that creates a new
//! record (put, copy, complete-multipart, delete marker).
//!
//! One attempt runs: resolve the master, decide, preserve the shadowed null
//! version, commit the master conditionally, apply the decision's delete
//! options, and queue the superseded data for reclamation. The null copy is
//! written under the same master revision as the commit and is discarded
//! again when that commit fails. A rejected
//! conditional write restarts the attempt, up to
//! [`S3Config::max_conflict_retries`](crate::config::S3Config::max_conflict_retries)
//! times. Data is written by the caller before the first attempt and reused
//! across retries.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::{S3ServiceError, S3ServiceResult};
use crate::provider::RustStackS3;
use crate::reclaim::OrphanGuard;
use crate::state::{
    DataLocation, ObjectRecord, Precondition, RecordAddress, RecordRead, VersioningStatus,
    WriteTarget,
};
use crate::storage::DataContext;
use crate::versioning::{
    NULL_VERSION_TOKEN, VersionToken, VersioningDecision, WriteMode, decide, derive_master_state,
};

/// A committed record and the versioning status it was written under.
#[derive(Debug, Clone)]
pub(crate) struct Committed {
    pub(crate) record: ObjectRecord,
    pub(crate) status: VersioningStatus,
}

/// Reads a caller already holds; each stands in for the first attempt's
/// own read only.
#[derive(Debug, Default)]
pub(crate) struct Prefetched {
    pub(crate) status: Option<VersioningStatus>,
    pub(crate) master: Option<RecordRead>,
}

/// A null version copy written by this request before its master commit.
#[derive(Debug)]
struct PreservedCopy {
    version_id: String,
    on_null_key: bool,
    revision: u64,
}

impl RustStackS3 {
    /// Commit `record` (whose data is already written) as the new current
    /// version of its key.
    ///
    /// `guard`, when given, is disarmed as soon as the master commit lands:
    /// from then on the blocks belong to the committed record.
    pub(crate) async fn commit_new_record(
        &self,
        bucket: &str,
        record: ObjectRecord,
        mut prefetched: Prefetched,
        operation: &'static str,
        mut guard: Option<&mut OrphanGuard>,
    ) -> S3ServiceResult<Committed> {
        let key = record.key.clone();
        let max_attempts = self.config.max_conflict_retries.saturating_add(1);

        for attempt in 1..=max_attempts {
            let status = match prefetched.status.take() {
                Some(status) => status,
                None => self.metadata.get_bucket_versioning(bucket).await?,
            };
            let master = match prefetched.master.take() {
                Some(read) => Some(read),
                None => {
                    self.metadata
                        .get_record(bucket, &key, &RecordAddress::Master)
                        .await?
                }
            };

            let state = derive_master_state(master.as_ref().map(|m| &m.record));
            let decision = decide(&state, status, &self.decision_ctx);
            debug!(
                bucket,
                key = %key,
                attempt,
                %status,
                kind = ?state.kind,
                mode = ?decision.write.mode,
                null_version_id = ?decision.null_version_id,
                delete = ?decision.delete,
                "versioning decision"
            );

            let mut preserved = None;
            if let (Some(null_version_id), Some(prior)) = (&decision.null_version_id, &master) {
                match self.preserve_null_version(bucket, prior, null_version_id).await {
                    Ok(copy) => preserved = copy,
                    Err(S3ServiceError::ConditionFailed) => {
                        debug!(
                            bucket,
                            key = %key,
                            attempt,
                            "master changed before preserving null, retrying"
                        );
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            let (new_record, target) = self.apply_write_options(record.clone(), &decision);
            let condition = master
                .as_ref()
                .map_or(Precondition::Absent, |m| Precondition::Revision(m.revision));

            let outcome = match self
                .metadata
                .put_record(bucket, new_record.clone(), target, Some(condition))
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    if let Some(copy) = preserved {
                        self.discard_preserved(bucket, &key, copy).await;
                    }
                    if matches!(e, S3ServiceError::ConditionFailed) {
                        debug!(bucket, key = %key, attempt, "master changed underneath, retrying");
                        continue;
                    }
                    return Err(e);
                }
            };
            if let Some(guard) = guard.take() {
                guard.disarm();
            }

            let mut committed = new_record;
            committed.version_id = outcome.version_id;

            let mut superseded = decision.data_to_delete.clone();
            if let Some(removed) = outcome.removed_null_key {
                superseded.extend(removed.location);
            }
            superseded.extend(self.apply_delete_options(bucket, &key, &decision).await);
            self.reclaim_superseded(bucket, &key, superseded, &committed.location, operation);

            return Ok(Committed {
                record: committed,
                status,
            });
        }

        warn!(bucket, key = %key, attempts = max_attempts, "giving up after repeated conflicts");
        Err(S3ServiceError::ConcurrencyConflict {
            key,
            attempts: max_attempts,
        })
    }

    /// Commit `record`, deleting the freshly written data synchronously when
    /// the commit fails.
    pub(crate) async fn commit_with_cleanup(
        &self,
        bucket: &str,
        record: ObjectRecord,
        prefetched: Prefetched,
        mut guard: OrphanGuard,
        ctx: &DataContext,
    ) -> S3ServiceResult<Committed> {
        let result = self
            .commit_new_record(bucket, record, prefetched, ctx.operation, Some(&mut guard))
            .await;
        if result.is_err() {
            let locations = guard.locations().to_vec();
            if let Err(e) = self.reclaimer.delete_now(&locations, ctx).await {
                warn!(
                    bucket,
                    key = %ctx.key,
                    blocks = locations.len(),
                    error = %e,
                    "failed to clean up data of a failed write"
                );
            }
            guard.disarm();
        }
        result
    }

    /// Queue blocks that no surviving record references.
    pub(crate) fn reclaim_superseded(
        &self,
        bucket: &str,
        key: &str,
        superseded: Vec<DataLocation>,
        keep: &[DataLocation],
        operation: &'static str,
    ) {
        let keep: HashSet<&str> = keep.iter().map(|l| l.key.as_str()).collect();
        let mut seen = HashSet::new();
        let doomed: Vec<DataLocation> = superseded
            .into_iter()
            .filter(|l| !keep.contains(l.key.as_str()) && seen.insert(l.key.clone()))
            .collect();
        if !doomed.is_empty() {
            debug!(bucket, key, blocks = doomed.len(), "reclaiming superseded data");
            self.reclaimer
                .schedule(doomed, DataContext::new(bucket, key, operation));
        }
    }

    /// The version id reported to the client for `record`.
    pub(crate) fn response_version_id(
        &self,
        record: &ObjectRecord,
        status: VersioningStatus,
    ) -> Option<String> {
        match &record.version_id {
            None if !status.is_configured() => None,
            _ if record.answers_to_null() => Some(NULL_VERSION_TOKEN.to_owned()),
            Some(version_id) => Some(self.codec.encode(version_id)),
            None => None,
        }
    }

    /// Read the record a client token addresses. `None` reads the master.
    pub(crate) async fn resolve_version(
        &self,
        bucket: &str,
        key: &str,
        token: Option<&VersionToken>,
    ) -> S3ServiceResult<Option<RecordRead>> {
        let address = match token {
            None => RecordAddress::Master,
            Some(VersionToken::Id(version_id)) => RecordAddress::Version(version_id.clone()),
            Some(VersionToken::Null) => {
                let master = self
                    .metadata
                    .get_record(bucket, key, &RecordAddress::Master)
                    .await?;
                match master {
                    Some(read) if read.record.answers_to_null() => return Ok(Some(read)),
                    Some(read) => match read.record.null_version_id {
                        Some(null_version_id) => RecordAddress::Version(null_version_id),
                        None => RecordAddress::NullKey,
                    },
                    None => RecordAddress::NullKey,
                }
            }
        };
        self.metadata.get_record(bucket, key, &address).await
    }

    /// The error for a read of `token` that found nothing.
    pub(crate) fn missing_version_error(
        &self,
        key: &str,
        token: Option<&VersionToken>,
    ) -> S3ServiceError {
        match token {
            None => S3ServiceError::NoSuchKey {
                key: key.to_owned(),
            },
            Some(token) => S3ServiceError::NoSuchVersion {
                key: key.to_owned(),
                version_id: match token {
                    VersionToken::Null => NULL_VERSION_TOKEN.to_owned(),
                    VersionToken::Id(id) => self.codec.encode(id),
                },
            },
        }
    }

    /// Copy the null version on the master to its own address, provided
    /// the master is still `prior`. Returns the copy when this call created
    /// it.
    async fn preserve_null_version(
        &self,
        bucket: &str,
        prior: &RecordRead,
        null_version_id: &str,
    ) -> S3ServiceResult<Option<PreservedCopy>> {
        let compat = self.decision_ctx.compat_mode;
        let mut preserved = prior.record.clone();
        preserved.is_null = true;
        preserved.is_null2 = !compat;
        preserved.version_id = Some(null_version_id.to_owned());
        let target = if compat {
            WriteTarget::Version {
                version_id: null_version_id.to_owned(),
            }
        } else {
            WriteTarget::NullKey {
                version_id: null_version_id.to_owned(),
            }
        };
        debug!(
            bucket,
            key = %prior.record.key,
            null_version_id,
            compat,
            "preserving null version"
        );
        let outcome = self
            .metadata
            .put_record(
                bucket,
                preserved,
                target,
                Some(Precondition::Revision(prior.revision)),
            )
            .await?;
        Ok(outcome.replaced.is_none().then(|| PreservedCopy {
            version_id: null_version_id.to_owned(),
            on_null_key: !compat,
            revision: prior.revision,
        }))
    }

    /// Drop a null copy whose master commit failed, unless the master has
    /// moved on in the meantime.
    async fn discard_preserved(&self, bucket: &str, key: &str, copy: PreservedCopy) {
        let result = self
            .metadata
            .discard_copy(
                bucket,
                key,
                &copy.version_id,
                copy.on_null_key,
                Precondition::Revision(copy.revision),
            )
            .await;
        match result {
            Ok(_) => {
                debug!(bucket, key, version_id = %copy.version_id, "discarded preserved null copy");
            }
            Err(S3ServiceError::ConditionFailed) => {
                debug!(
                    bucket,
                    key,
                    version_id = %copy.version_id,
                    "master moved on, keeping null copy"
                );
            }
            Err(e) => warn!(
                bucket,
                key,
                version_id = %copy.version_id,
                error = %e,
                "failed to discard preserved null copy"
            ),
        }
    }

    fn apply_write_options(
        &self,
        mut record: ObjectRecord,
        decision: &VersioningDecision,
    ) -> (ObjectRecord, WriteTarget) {
        let write = &decision.write;
        record.is_null = write.is_null();
        record.is_null2 = write.is_null() && write.is_null2;
        record.null_version_id = write.extra.as_ref().map(|e| e.null_version_id.clone());
        record.null_upload_id = write.extra.as_ref().and_then(|e| e.null_upload_id.clone());
        let target = match write.mode {
            WriteMode::Overwrite => WriteTarget::Master,
            WriteMode::NewVersion => WriteTarget::NewVersion,
            WriteMode::NullVersion => WriteTarget::NullVersion {
                replace_null_key: write.replace_null_key,
            },
        };
        (record, target)
    }

    /// Run the decision's delete options; returns the data they released.
    async fn apply_delete_options(
        &self,
        bucket: &str,
        key: &str,
        decision: &VersioningDecision,
    ) -> Vec<DataLocation> {
        let Some(options) = &decision.delete else {
            return Vec::new();
        };
        match self.metadata.delete_record(bucket, key, options).await {
            Ok(removed) if options.delete_data => removed.location,
            Ok(_) => Vec::new(),
            Err(e) if e.is_not_found() => {
                debug!(bucket, key, version_id = ?options.version_id, "nothing left to delete");
                Vec::new()
            }
            Err(e) => {
                warn!(
                    bucket,
                    key,
                    version_id = ?options.version_id,
                    error = %e,
                    "failed to remove superseded version"
                );
                Vec::new()
            }
        }
    }
}
