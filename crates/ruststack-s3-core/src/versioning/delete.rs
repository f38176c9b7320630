//! Addressing of specific versions, and delete preprocessing.

use tracing::debug;

use crate::state::{ObjectRecord, VersioningStatus};

use super::codec::VersionToken;
use super::decision::DeleteOptions;

/// Minimal address of a record at its specific version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionSpecificOptions {
    /// The record's version id; `None` for pre-versioning objects.
    pub version_id: Option<String>,
    /// `Some(true)` for records on the dedicated null key, `Some(false)` for
    /// numbered versions outside compat mode.
    pub is_null: Option<bool>,
}

/// Address `record` at its specific version, for rewrites and deletes that
/// must not touch any other copy.
///
/// - pre-versioning objects: no version id, no flag;
/// - non-legacy null versions: `is_null = Some(true)`;
/// - legacy null versions: version id alone;
/// - numbered versions: `is_null = Some(false)`, or no flag in compat mode,
///   where a numbered id may also name a legacy null copy.
#[must_use]
pub fn get_version_specific_options(
    record: &ObjectRecord,
    compat_mode: bool,
) -> VersionSpecificOptions {
    let is_null = match (&record.version_id, record.is_null) {
        (None, _) => None,
        (Some(_), true) => record.is_non_legacy_null().then_some(true),
        (Some(_), false) => (!compat_mode).then_some(false),
    };
    VersionSpecificOptions {
        version_id: record.version_id.clone(),
        is_null,
    }
}

/// Turn a delete request against an already-resolved `record` into delete
/// options.
///
/// - never-versioned bucket: remove the master and its data;
/// - versioned bucket, no version requested: empty options, the caller
///   writes a delete marker;
/// - versioned bucket, version requested (including `"null"`): remove that
///   record and its data.
///
/// # Examples
///
/// ```
/// use ruststack_s3_core::state::{ObjectRecord, VersioningStatus};
/// use ruststack_s3_core::versioning::{VersionToken, preprocessing_versioning_delete};
///
/// let mut record = ObjectRecord::new("k");
/// record.version_id = Some("v1".to_owned());
///
/// let marker =
///     preprocessing_versioning_delete("b", VersioningStatus::Enabled, &record, None, false);
/// assert!(marker.is_empty());
///
/// let token = VersionToken::Id("v1".to_owned());
/// let options = preprocessing_versioning_delete(
///     "b",
///     VersioningStatus::Enabled,
///     &record,
///     Some(&token),
///     false,
/// );
/// assert!(options.delete_data);
/// assert_eq!(options.version_id.as_deref(), Some("v1"));
/// assert_eq!(options.is_null, Some(false));
/// ```
#[must_use]
pub fn preprocessing_versioning_delete(
    bucket: &str,
    status: VersioningStatus,
    record: &ObjectRecord,
    requested: Option<&VersionToken>,
    compat_mode: bool,
) -> DeleteOptions {
    if !status.is_configured() {
        return DeleteOptions {
            delete_data: true,
            ..DeleteOptions::default()
        };
    }

    let Some(requested) = requested else {
        return DeleteOptions::default();
    };

    let address = get_version_specific_options(record, compat_mode);
    let version_id = match requested {
        VersionToken::Null => address.version_id,
        VersionToken::Id(id) => Some(id.clone()),
    };
    let replay_id = if record.answers_to_null() {
        record.upload_id.clone()
    } else {
        None
    };

    debug!(
        bucket,
        key = %record.key,
        version_id = ?version_id,
        is_null = ?address.is_null,
        replay_id = ?replay_id,
        "resolved version delete"
    );

    DeleteOptions {
        version_id,
        is_null: address.is_null,
        delete_data: true,
        replay_id,
    }
}
