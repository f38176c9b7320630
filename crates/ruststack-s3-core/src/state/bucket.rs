//! Per-bucket state of the in-memory metadata store.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::AtomicU64;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::S3ServiceError;

use super::keystore::KeyEntry;
use super::object::Owner;

// ---------------------------------------------------------------------------
// VersioningStatus
// ---------------------------------------------------------------------------

/// Bucket versioning status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersioningStatus {
    /// Versioning has never been configured on this bucket.
    #[default]
    Disabled,
    /// Versioning is currently enabled.
    Enabled,
    /// Versioning was configured but is now suspended.
    Suspended,
}

impl VersioningStatus {
    /// Whether a versioning configuration exists at all.
    #[must_use]
    pub fn is_configured(self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// The `Status` value of a `VersioningConfiguration`, if any.
    #[must_use]
    pub fn as_status(self) -> Option<&'static str> {
        match self {
            Self::Disabled => None,
            Self::Enabled => Some("Enabled"),
            Self::Suspended => Some("Suspended"),
        }
    }
}

impl fmt::Display for VersioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_status().unwrap_or("Unversioned"))
    }
}

impl FromStr for VersioningStatus {
    type Err = S3ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Enabled" => Ok(Self::Enabled),
            "Suspended" => Ok(Self::Suspended),
            other => Err(S3ServiceError::IllegalVersioningConfiguration {
                message: format!("unknown versioning status {other:?}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// S3Bucket
// ---------------------------------------------------------------------------

/// A bucket of the in-memory metadata store.
pub struct S3Bucket {
    /// Bucket name.
    pub name: String,
    /// When the bucket was created.
    pub creation_date: DateTime<Utc>,
    /// The bucket owner.
    pub owner: Owner,
    /// Object records, keyed by object key.
    pub objects: RwLock<HashMap<String, KeyEntry>>,
    /// Bucket versioning status.
    pub versioning: RwLock<VersioningStatus>,
    /// Completed multipart uploads still referenced by a record, keyed by
    /// upload id. Used to replay or reclaim upload bookkeeping.
    pub replays: DashMap<String, String>,
    /// Highest master revision of any key entry dropped from `objects`.
    /// Entries created later start above it.
    pub retired_revision: AtomicU64,
}

impl fmt::Debug for S3Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Bucket")
            .field("name", &self.name)
            .field("creation_date", &self.creation_date)
            .field("versioning", &*self.versioning.read())
            .field("key_count", &self.objects.read().len())
            .finish_non_exhaustive()
    }
}

impl S3Bucket {
    /// Create a new, never-versioned bucket.
    #[must_use]
    pub fn new(name: String, owner: Owner) -> Self {
        Self {
            name,
            creation_date: Utc::now(),
            owner,
            objects: RwLock::new(HashMap::new()),
            versioning: RwLock::new(VersioningStatus::default()),
            replays: DashMap::new(),
            retired_revision: AtomicU64::new(0),
        }
    }

    /// Apply a versioning configuration.
    ///
    /// # Errors
    ///
    /// Returns [`S3ServiceError::IllegalVersioningConfiguration`] when asked
    /// to go back to the never-configured state.
    pub fn set_versioning(&self, status: VersioningStatus) -> Result<(), S3ServiceError> {
        if status == VersioningStatus::Disabled {
            return Err(S3ServiceError::IllegalVersioningConfiguration {
                message: "versioning can only be enabled or suspended".to_owned(),
            });
        }
        let mut current = self.versioning.write();
        if *current != status {
            debug!(bucket = %self.name, from = %*current, to = %status, "changing versioning");
            *current = status;
        }
        Ok(())
    }
}
