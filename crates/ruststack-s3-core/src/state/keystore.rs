//! Record layout of a single object key.
//!
//! A [`KeyEntry`] holds the three kinds of addresses a key can have:
//!
//! - the **master**, the record returned when no version is requested
//! - **versioned keys**, one per numbered version, in a `BTreeMap` so that
//!   iteration runs newest first (version ids sort newest first)
//! - the **dedicated null key**, holding at most one null version
//!
//! The master is a copy of one of the other addresses, except for
//! pre-versioning objects and suspended-mode null versions, which only live
//! on the master. Removing the record the master mirrors promotes the newest
//! remaining record.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::S3ServiceError;
use crate::versioning::DeleteOptions;

use super::object::ObjectRecord;
use super::store::{Precondition, PutOutcome, RecordAddress, WriteTarget};

/// All records stored under one object key.
#[derive(Debug, Clone, Default)]
pub struct KeyEntry {
    master: Option<ObjectRecord>,
    revision: u64,
    versions: BTreeMap<String, ObjectRecord>,
    null_key: Option<ObjectRecord>,
}

impl KeyEntry {
    /// An empty entry whose first master change moves past `revision`.
    ///
    /// A key that is removed and written again must not hand out a revision
    /// a stale reader may still hold.
    #[must_use]
    pub fn starting_at(revision: u64) -> Self {
        Self {
            revision,
            ..Self::default()
        }
    }

    /// The current record.
    #[must_use]
    pub fn master(&self) -> Option<&ObjectRecord> {
        self.master.as_ref()
    }

    /// Revision counter of the master, bumped on every master change.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether nothing is stored under this key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.master.is_none() && self.versions.is_empty() && self.null_key.is_none()
    }

    /// Read the record at `address`.
    #[must_use]
    pub fn get(&self, address: &RecordAddress) -> Option<&ObjectRecord> {
        match address {
            RecordAddress::Master => self.master.as_ref(),
            RecordAddress::NullKey => self.null_key.as_ref(),
            RecordAddress::Version(version_id) => self
                .versions
                .get(version_id)
                .or_else(|| self.null_key.as_ref().filter(|r| holds(r, version_id)))
                .or_else(|| self.master.as_ref().filter(|r| holds(r, version_id))),
        }
    }

    /// Whether `condition` holds for the current master.
    #[must_use]
    pub fn satisfies(&self, condition: Precondition) -> bool {
        match condition {
            Precondition::Absent => self.master.is_none(),
            Precondition::Revision(revision) => {
                self.master.is_some() && self.revision == revision
            }
        }
    }

    /// Whether any stored record was completed from `upload_id`.
    ///
    /// Back-references (`null_upload_id`) do not count: they describe a
    /// null version that may already be gone.
    #[must_use]
    pub fn references_upload(&self, upload_id: &str) -> bool {
        let refers = |r: &ObjectRecord| r.upload_id.as_deref() == Some(upload_id);
        self.master.iter().any(refers)
            || self.null_key.iter().any(refers)
            || self.versions.values().any(refers)
    }

    /// Write `record` at `target`. `next_version_id` is called at most once.
    ///
    /// # Errors
    ///
    /// `NoSuchKey` / `NoSuchVersion` when an [`WriteTarget::Existing`]
    /// version is not stored.
    pub fn put(
        &mut self,
        mut record: ObjectRecord,
        target: WriteTarget,
        next_version_id: impl FnOnce() -> String,
    ) -> Result<PutOutcome, S3ServiceError> {
        let mut outcome = PutOutcome::default();

        match target {
            WriteTarget::Master => {
                record.version_id = None;
                outcome.replaced = self.replace_master(Some(record));
            }
            WriteTarget::NewVersion => {
                let version_id = next_version_id();
                record.version_id = Some(version_id.clone());
                self.versions.insert(version_id.clone(), record.clone());
                outcome.replaced = self.replace_master(Some(record));
                outcome.version_id = Some(version_id);
            }
            WriteTarget::NullVersion { replace_null_key } => {
                let version_id = next_version_id();
                record.version_id = Some(version_id.clone());
                if replace_null_key {
                    outcome.removed_null_key = self.null_key.take();
                }
                outcome.replaced = self.replace_master(Some(record));
                outcome.version_id = Some(version_id);
            }
            WriteTarget::NullKey { version_id } => {
                record.version_id = Some(version_id.clone());
                outcome.replaced = self.null_key.replace(record);
                outcome.version_id = Some(version_id);
            }
            WriteTarget::Version { version_id } => {
                record.version_id = Some(version_id.clone());
                outcome.replaced = self.versions.insert(version_id.clone(), record);
                outcome.version_id = Some(version_id);
            }
            WriteTarget::Existing {
                version_id: None, ..
            } => {
                if self.master.as_ref().is_none_or(|m| m.version_id.is_some()) {
                    return Err(S3ServiceError::NoSuchKey {
                        key: record.key.clone(),
                    });
                }
                outcome.replaced = self.replace_master(Some(record));
            }
            WriteTarget::Existing {
                version_id: Some(version_id),
                is_null,
            } => {
                record.version_id = Some(version_id.clone());
                outcome.replaced = self.rewrite_existing(&version_id, is_null, &record);
                if outcome.replaced.is_none() {
                    return Err(S3ServiceError::NoSuchVersion {
                        key: record.key.clone(),
                        version_id,
                    });
                }
                outcome.version_id = Some(version_id);
            }
        }

        outcome.revision = self.revision;
        Ok(outcome)
    }

    /// Remove the record addressed by `options`.
    ///
    /// # Errors
    ///
    /// `NoSuchKey` / `NoSuchVersion` when nothing is stored there.
    pub fn delete(
        &mut self,
        key: &str,
        options: &DeleteOptions,
    ) -> Result<ObjectRecord, S3ServiceError> {
        let not_found = |version_id: &str| S3ServiceError::NoSuchVersion {
            key: key.to_owned(),
            version_id: version_id.to_owned(),
        };

        let Some(version_id) = options.version_id.as_deref() else {
            let removed = self.master.take().ok_or_else(|| S3ServiceError::NoSuchKey {
                key: key.to_owned(),
            })?;
            self.promote_newest();
            return Ok(removed);
        };

        // A null version that was never shadowed lives on the master only.
        let on_null_key = options.is_null == Some(true);
        let removed = if let Some(removed) = on_null_key
            .then(|| self.null_key.take_if(|r| holds(r, version_id)))
            .flatten()
        {
            removed
        } else if let Some(removed) = (!on_null_key)
            .then(|| self.versions.remove(version_id))
            .flatten()
        {
            removed
        } else if self.master.as_ref().is_some_and(|m| holds(m, version_id)) {
            let removed = self.master.take().ok_or_else(|| not_found(version_id))?;
            self.promote_newest();
            return Ok(removed);
        } else {
            return Err(not_found(version_id));
        };

        let still_stored = self.versions.contains_key(version_id)
            || self.null_key.as_ref().is_some_and(|r| holds(r, version_id));
        if !still_stored && self.master.as_ref().is_some_and(|m| holds(m, version_id)) {
            self.promote_newest();
        }
        Ok(removed)
    }

    /// Remove a copy stored on the null key or a versioned key without
    /// touching the master, and bump the revision so that writers holding
    /// the old one re-read.
    pub fn discard_copy(&mut self, version_id: &str, on_null_key: bool) -> Option<ObjectRecord> {
        let removed = if on_null_key {
            self.null_key.take_if(|r| holds(r, version_id))
        } else {
            self.versions.remove(version_id)
        };
        if removed.is_some() {
            self.revision += 1;
        }
        removed
    }

    /// Every version of this key, newest first, pre-versioning object last.
    #[must_use]
    pub fn list_versions(&self) -> Vec<ObjectRecord> {
        let mut all: Vec<ObjectRecord> = self.versions.values().cloned().collect();
        if let Some(null) = &self.null_key {
            if !all.iter().any(|r| r.version_id == null.version_id) {
                all.push(null.clone());
            }
        }
        if let Some(master) = &self.master {
            let duplicate = master.version_id.is_some()
                && all.iter().any(|r| r.version_id == master.version_id);
            if !duplicate {
                all.push(master.clone());
            }
        }
        all.sort_by(|a, b| match (&a.version_id, &b.version_id) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        all
    }

    fn replace_master(&mut self, record: Option<ObjectRecord>) -> Option<ObjectRecord> {
        self.revision += 1;
        std::mem::replace(&mut self.master, record)
    }

    fn rewrite_existing(
        &mut self,
        version_id: &str,
        is_null: bool,
        record: &ObjectRecord,
    ) -> Option<ObjectRecord> {
        let mut replaced = None;
        if is_null && self.null_key.as_ref().is_some_and(|r| holds(r, version_id)) {
            replaced = self.null_key.replace(record.clone());
        }
        if let Some(slot) = self.versions.get_mut(version_id) {
            let previous = std::mem::replace(slot, record.clone());
            replaced.get_or_insert(previous);
        }
        if self.master.as_ref().is_some_and(|m| holds(m, version_id)) {
            if let Some(previous) = self.replace_master(Some(record.clone())) {
                replaced.get_or_insert(previous);
            }
        }
        replaced
    }

    fn promote_newest(&mut self) {
        let newest_version = self.versions.values().next();
        let newest = match (newest_version, &self.null_key) {
            (Some(v), Some(n)) if n.version_id < v.version_id => Some(n),
            (Some(v), _) => Some(v),
            (None, n) => n.as_ref(),
        }
        .cloned();
        debug!(
            promoted = ?newest.as_ref().and_then(|r| r.version_id.as_deref()),
            "repairing master"
        );
        self.replace_master(newest);
    }
}

fn holds(record: &ObjectRecord, version_id: &str) -> bool {
    record.version_id.as_deref() == Some(version_id)
}
