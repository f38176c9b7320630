//! Classification of the record currently held by the master key.

use crate::state::{DataLocation, ObjectRecord};

/// Physical shape of a null version sitting on the master key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullShape {
    /// Overlaps the master key, possibly duplicated on a versioned key of
    /// the same id.
    Legacy,
    /// Backed by the dedicated null key.
    NonLegacy,
}

/// What the master key currently holds, reduced to what the versioning
/// decision depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterStateKind {
    /// Nothing is stored under the key.
    NoPriorVersion,
    /// A regular numbered version.
    PriorVersionExists {
        /// Its version id.
        version_id: String,
    },
    /// A numbered version that shadows an earlier null version.
    PriorVersionWithNullRef {
        /// Its version id.
        version_id: String,
        /// Version id of the shadowed null version.
        null_version_id: String,
        /// Upload id of the shadowed null version.
        null_upload_id: Option<String>,
    },
    /// The null version itself.
    PriorNullVersion {
        /// Internal version id of the null version.
        version_id: String,
        /// Where the null version physically lives.
        shape: NullShape,
    },
    /// An object written before versioning was ever configured.
    PriorPreVersioningObject,
}

/// Derived, ephemeral summary of the master record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterState {
    /// The classification.
    pub kind: MasterStateKind,
    /// The master's own upload id. Decides whether the object being
    /// overwritten came from a multipart upload.
    pub upload_id: Option<String>,
    /// Data blocks owned by the master record.
    pub locations: Vec<DataLocation>,
}

impl MasterState {
    /// State of a key with no record at all.
    #[must_use]
    pub fn absent() -> Self {
        Self {
            kind: MasterStateKind::NoPriorVersion,
            upload_id: None,
            locations: Vec::new(),
        }
    }

    /// Whether the master record is a null version or a pre-versioning
    /// object, i.e. whether it answers to the `"null"` token.
    #[must_use]
    pub fn is_null_like(&self) -> bool {
        matches!(
            self.kind,
            MasterStateKind::PriorNullVersion { .. } | MasterStateKind::PriorPreVersioningObject
        )
    }
}

/// Classify the record read from the master key.
///
/// # Examples
///
/// ```
/// use ruststack_s3_core::state::ObjectRecord;
/// use ruststack_s3_core::versioning::{MasterStateKind, derive_master_state};
///
/// assert_eq!(derive_master_state(None).kind, MasterStateKind::NoPriorVersion);
///
/// let legacy = ObjectRecord::new("k");
/// assert_eq!(
///     derive_master_state(Some(&legacy)).kind,
///     MasterStateKind::PriorPreVersioningObject
/// );
/// ```
#[must_use]
pub fn derive_master_state(prior: Option<&ObjectRecord>) -> MasterState {
    let Some(record) = prior else {
        return MasterState::absent();
    };

    let kind = match (&record.version_id, &record.null_version_id) {
        (None, _) => MasterStateKind::PriorPreVersioningObject,
        (Some(version_id), _) if record.is_null => MasterStateKind::PriorNullVersion {
            version_id: version_id.clone(),
            shape: if record.is_null2 {
                NullShape::NonLegacy
            } else {
                NullShape::Legacy
            },
        },
        (Some(version_id), Some(null_version_id)) => MasterStateKind::PriorVersionWithNullRef {
            version_id: version_id.clone(),
            null_version_id: null_version_id.clone(),
            null_upload_id: record.null_upload_id.clone(),
        },
        (Some(version_id), None) => MasterStateKind::PriorVersionExists {
            version_id: version_id.clone(),
        },
    };

    MasterState {
        kind,
        upload_id: record.upload_id.clone(),
        locations: record.location.clone(),
    }
}
