//! Rewriting an archived version once its restore has completed.
//!
//! [`overwriting_versioning`] computes, from the archived record, where the
//! restored record goes and which fields it carries. It never mutates its
//! input; the caller merges [`RestoreParams`] into the record it writes.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::state::{ArchiveInfo, CannedAcl, ObjectRecord, ReplicationInfo};

/// Origin operation recorded on restored versions.
pub const ORIGIN_OP_RESTORE_COMPLETED: &str = "s3:ObjectRestore:Completed";

/// User metadata header counting restore attempts; never carried over.
pub const RESTORE_ATTEMPT_HEADER: &str = "x-amz-meta-scal-s3-restore-attempt";

/// Inputs of a restore rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreContext {
    /// Current time.
    pub now: DateTime<Utc>,
    /// Length of one day in milliseconds, after time scaling.
    pub scaled_ms_per_day: u64,
    /// Storage class of the restored copy.
    pub storage_class: String,
    /// Content MD5 the caller computed over the restored bytes.
    pub computed_md5: Option<String>,
}

/// Address of the version being rewritten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionAddress {
    /// Version id; `None` for pre-versioning objects.
    pub version_id: Option<String>,
    /// `Some(true)` when the record is the null version.
    pub is_null: Option<bool>,
    /// Back-reference to keep on the rewritten record.
    pub null_version_id: Option<String>,
}

/// Field values of the restored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreParams {
    /// New creation time.
    pub creation_time: DateTime<Utc>,
    /// New last-modified time.
    pub last_modified: DateTime<Utc>,
    /// Always [`ORIGIN_OP_RESTORE_COMPLETED`].
    pub origin_op: String,
    /// Always `true`: readers must observe the rewrite.
    pub update_micro_version_id: bool,
    /// Storage class of the restored copy.
    pub storage_class: String,
    /// Recomputed archive bookkeeping.
    pub archive: ArchiveInfo,
    /// User metadata to keep.
    pub user_metadata: BTreeMap<String, String>,
    /// Tags for the caller to re-apply.
    pub tagging_copy: Option<Vec<(String, String)>>,
    /// ACL to keep.
    pub acl: Option<CannedAcl>,
    /// Legal hold to keep.
    pub legal_hold: Option<bool>,
    /// Replication info to keep.
    pub replication_info: Option<ReplicationInfo>,
    /// Content MD5 to keep.
    pub content_md5: Option<String>,
    /// Checksum of the restored bytes, when it differs from `content_md5`.
    pub restored_etag: Option<String>,
}

impl RestoreParams {
    /// Merge these values into `record`.
    pub fn apply_to(self, record: &mut ObjectRecord, micro_version_id: Option<String>) {
        record.creation_time = self.creation_time;
        record.last_modified = self.last_modified;
        record.origin_op = self.origin_op;
        if self.update_micro_version_id {
            record.micro_version_id = micro_version_id;
        }
        record.storage_class = self.storage_class;
        record.archive = Some(self.archive);
        record.user_metadata = self.user_metadata;
        if let Some(tags) = self.tagging_copy {
            record.tags = tags;
        }
        if let Some(acl) = self.acl {
            record.acl = acl;
        }
        record.legal_hold = self.legal_hold;
        record.replication_info = self.replication_info;
        if let Some(md5) = self.content_md5 {
            record.content_md5 = md5;
        }
        record.restored_etag = self.restored_etag;
    }
}

/// Result of [`overwriting_versioning`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOverwrite {
    /// Where the rewritten record goes.
    pub address: VersionAddress,
    /// What it carries.
    pub params: RestoreParams,
}

/// Compute the restore-completed rewrite of `prior`.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use ruststack_s3_core::state::{ArchiveInfo, ObjectRecord};
/// use ruststack_s3_core::versioning::{RestoreContext, overwriting_versioning};
///
/// let mut prior = ObjectRecord::new("k");
/// prior.version_id = Some("v1".to_owned());
/// prior.archive = Some(ArchiveInfo {
///     restore_requested_days: Some(2),
///     ..ArchiveInfo::default()
/// });
///
/// let now = Utc::now();
/// let ctx = RestoreContext {
///     now,
///     scaled_ms_per_day: 1000,
///     storage_class: "STANDARD".to_owned(),
///     computed_md5: None,
/// };
/// let restore = overwriting_versioning(&prior, &ctx);
/// assert_eq!(restore.address.version_id.as_deref(), Some("v1"));
/// assert_eq!(
///     restore.params.archive.restore_will_expire_at,
///     Some(now + chrono::Duration::milliseconds(2000))
/// );
/// ```
#[must_use]
pub fn overwriting_versioning(prior: &ObjectRecord, ctx: &RestoreContext) -> RestoreOverwrite {
    let previous = prior.archive.clone().unwrap_or_default();
    // Lifetimes past the representable range expire at the end of time.
    let expires_at = previous.restore_requested_days.map(|days| {
        let ms = u64::from(days).saturating_mul(ctx.scaled_ms_per_day);
        i64::try_from(ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .and_then(|lifetime| ctx.now.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    });
    let archive = ArchiveInfo {
        archive_info: previous.archive_info,
        restore_requested_at: previous.restore_requested_at,
        restore_requested_days: previous.restore_requested_days,
        restore_completed_at: Some(ctx.now),
        restore_will_expire_at: expires_at,
    };

    let mut user_metadata = prior.user_metadata.clone();
    user_metadata.remove(RESTORE_ATTEMPT_HEADER);

    let content_md5 = (!prior.content_md5.is_empty()).then(|| prior.content_md5.clone());
    let restored_etag = match (&ctx.computed_md5, &content_md5) {
        (Some(computed), Some(original)) if computed != original => Some(computed.clone()),
        _ => None,
    };

    let params = RestoreParams {
        creation_time: ctx.now,
        last_modified: ctx.now,
        origin_op: ORIGIN_OP_RESTORE_COMPLETED.to_owned(),
        update_micro_version_id: true,
        storage_class: ctx.storage_class.clone(),
        archive,
        user_metadata,
        tagging_copy: (!prior.tags.is_empty()).then(|| prior.tags.clone()),
        acl: Some(prior.acl),
        legal_hold: prior.legal_hold,
        replication_info: prior.replication_info.clone(),
        content_md5,
        restored_etag,
    };

    let address = VersionAddress {
        version_id: prior.version_id.clone(),
        is_null: prior.is_null.then_some(true),
        null_version_id: prior.null_version_id.clone(),
    };

    RestoreOverwrite { address, params }
}
