//! In-memory metadata store.
//!
//! [`InMemoryMetadataStore`] owns the collection of buckets and implements
//! [`MetadataStore`]. Every call takes the bucket's object lock once, so a
//! conditional write is checked and applied atomically.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::one::Ref;
use tracing::{debug, info};

use crate::error::{S3ServiceError, S3ServiceResult};
use crate::versioning::{DeleteOptions, VersionCodec};

use super::bucket::{S3Bucket, VersioningStatus};
use super::keystore::KeyEntry;
use super::object::{ObjectRecord, Owner};
use super::store::{MetadataStore, Precondition, PutOutcome, RecordAddress, RecordRead, WriteTarget};

/// Metadata store keeping all buckets in memory.
pub struct InMemoryMetadataStore {
    buckets: DashMap<String, S3Bucket>,
    codec: Arc<VersionCodec>,
}

impl std::fmt::Debug for InMemoryMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryMetadataStore")
            .field("bucket_count", &self.buckets.len())
            .finish_non_exhaustive()
    }
}

impl InMemoryMetadataStore {
    /// Create an empty store. Fresh version ids come from `codec`.
    #[must_use]
    pub fn new(codec: Arc<VersionCodec>) -> Self {
        Self {
            buckets: DashMap::new(),
            codec,
        }
    }

    /// Create a new bucket.
    ///
    /// # Errors
    ///
    /// Returns [`S3ServiceError::BucketAlreadyOwnedByYou`] if the bucket
    /// exists.
    pub fn create_bucket(&self, name: &str, owner: Owner) -> S3ServiceResult<()> {
        if self.buckets.contains_key(name) {
            return Err(S3ServiceError::BucketAlreadyOwnedByYou {
                bucket: name.to_owned(),
            });
        }
        self.buckets
            .insert(name.to_owned(), S3Bucket::new(name.to_owned(), owner));
        info!(bucket = %name, "bucket created");
        Ok(())
    }

    /// Enable or suspend versioning on a bucket.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket`, or `IllegalVersioningConfiguration` for
    /// [`VersioningStatus::Disabled`].
    pub fn set_bucket_versioning(&self, name: &str, status: VersioningStatus) -> S3ServiceResult<()> {
        self.bucket(name)?.set_versioning(status)
    }

    /// Every version stored under `key`, newest first, with a pre-versioning
    /// object last.
    ///
    /// # Errors
    ///
    /// Returns [`S3ServiceError::NoSuchBucket`] if the bucket does not exist.
    pub fn list_versions(&self, bucket: &str, key: &str) -> S3ServiceResult<Vec<ObjectRecord>> {
        let bucket = self.bucket(bucket)?;
        let objects = bucket.objects.read();
        Ok(objects
            .get(key)
            .map(KeyEntry::list_versions)
            .unwrap_or_default())
    }

    /// Whether a completed multipart upload is still registered for replay.
    #[must_use]
    pub fn has_replay_entry(&self, bucket: &str, upload_id: &str) -> bool {
        self.buckets
            .get(bucket)
            .is_some_and(|b| b.replays.contains_key(upload_id))
    }

    /// Number of keys with at least one record in `bucket`.
    #[must_use]
    pub fn key_count(&self, bucket: &str) -> usize {
        self.buckets
            .get(bucket)
            .map_or(0, |b| b.objects.read().len())
    }

    fn bucket(&self, name: &str) -> S3ServiceResult<Ref<'_, String, S3Bucket>> {
        self.buckets
            .get(name)
            .ok_or_else(|| S3ServiceError::NoSuchBucket {
                bucket: name.to_owned(),
            })
    }
}

/// Drop replay entries of `candidates` that no record of `key` references.
fn prune_replays<'a>(
    bucket: &S3Bucket,
    key: &str,
    entry: Option<&KeyEntry>,
    candidates: impl IntoIterator<Item = &'a str>,
) {
    for upload_id in candidates {
        if entry.is_some_and(|e| e.references_upload(upload_id)) {
            continue;
        }
        if bucket
            .replays
            .remove_if(upload_id, |_, owner| owner == key)
            .is_some()
        {
            debug!(bucket = %bucket.name, key, upload_id, "dropped replay entry");
        }
    }
}

/// Remove the entry of `key` once it holds nothing, remembering its
/// revision so that a later entry for the same key never reuses it.
fn drop_if_empty(bucket: &S3Bucket, objects: &mut HashMap<String, KeyEntry>, key: &str) {
    if !objects.get(key).is_some_and(KeyEntry::is_empty) {
        return;
    }
    if let Some(entry) = objects.remove(key) {
        bucket
            .retired_revision
            .fetch_max(entry.revision(), Ordering::SeqCst);
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get_bucket_versioning(&self, bucket: &str) -> S3ServiceResult<VersioningStatus> {
        Ok(*self.bucket(bucket)?.versioning.read())
    }

    async fn get_record(
        &self,
        bucket: &str,
        key: &str,
        address: &RecordAddress,
    ) -> S3ServiceResult<Option<RecordRead>> {
        let bucket = self.bucket(bucket)?;
        let objects = bucket.objects.read();
        Ok(objects.get(key).and_then(|entry| {
            entry.get(address).map(|record| RecordRead {
                record: record.clone(),
                revision: entry.revision(),
            })
        }))
    }

    async fn put_record(
        &self,
        bucket: &str,
        record: ObjectRecord,
        target: WriteTarget,
        condition: Option<Precondition>,
    ) -> S3ServiceResult<PutOutcome> {
        let bucket = self.bucket(bucket)?;
        let key = record.key.clone();
        let upload_id = record.upload_id.clone();
        let mut objects = bucket.objects.write();

        let floor = bucket.retired_revision.load(Ordering::SeqCst);
        let entry = objects
            .entry(key.clone())
            .or_insert_with(|| KeyEntry::starting_at(floor));
        if let Some(condition) = condition {
            if !entry.satisfies(condition) {
                debug!(bucket = %bucket.name, key = %key, ?condition, "precondition failed");
                drop_if_empty(&bucket, &mut objects, &key);
                return Err(S3ServiceError::ConditionFailed);
            }
        }

        let result = entry.put(record, target.clone(), || self.codec.generate());
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                drop_if_empty(&bucket, &mut objects, &key);
                return Err(e);
            }
        };

        if let Some(upload_id) = &upload_id {
            bucket.replays.insert(upload_id.clone(), key.clone());
        }
        let stale = [&outcome.replaced, &outcome.removed_null_key]
            .into_iter()
            .flatten()
            .filter_map(|r| r.upload_id.as_deref())
            .filter(|id| Some(*id) != upload_id.as_deref());
        prune_replays(&bucket, &key, objects.get(&key), stale);

        debug!(
            bucket = %bucket.name,
            key = %key,
            ?target,
            version_id = ?outcome.version_id,
            revision = outcome.revision,
            "record written"
        );
        Ok(outcome)
    }

    async fn delete_record(
        &self,
        bucket: &str,
        key: &str,
        options: &DeleteOptions,
    ) -> S3ServiceResult<ObjectRecord> {
        let bucket = self.bucket(bucket)?;
        let mut objects = bucket.objects.write();

        let entry = objects
            .get_mut(key)
            .ok_or_else(|| match &options.version_id {
                Some(version_id) => S3ServiceError::NoSuchVersion {
                    key: key.to_owned(),
                    version_id: version_id.clone(),
                },
                None => S3ServiceError::NoSuchKey {
                    key: key.to_owned(),
                },
            })?;
        let removed = entry.delete(key, options)?;
        drop_if_empty(&bucket, &mut objects, key);

        let candidates = [
            options.replay_id.as_deref(),
            removed.upload_id.as_deref(),
        ];
        prune_replays(&bucket, key, objects.get(key), candidates.into_iter().flatten());

        debug!(
            bucket = %bucket.name,
            key,
            version_id = ?removed.version_id,
            delete_data = options.delete_data,
            "record removed"
        );
        Ok(removed)
    }

    async fn discard_copy(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
        on_null_key: bool,
        condition: Precondition,
    ) -> S3ServiceResult<Option<ObjectRecord>> {
        let bucket = self.bucket(bucket)?;
        let mut objects = bucket.objects.write();

        let Some(entry) = objects.get_mut(key).filter(|e| e.satisfies(condition)) else {
            debug!(bucket = %bucket.name, key, ?condition, "precondition failed");
            return Err(S3ServiceError::ConditionFailed);
        };
        let removed = entry.discard_copy(version_id, on_null_key);
        if let Some(upload_id) = removed.as_ref().and_then(|r| r.upload_id.as_deref()) {
            prune_replays(&bucket, key, objects.get(key), [upload_id]);
        }

        debug!(
            bucket = %bucket.name,
            key,
            version_id,
            on_null_key,
            found = removed.is_some(),
            "copy discarded"
        );
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
