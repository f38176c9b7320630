//! The versioning decision table.
//!
//! [`decide`] maps `(master state, bucket versioning status, compat mode)` to
//! a [`VersioningDecision`]. Every combination is an explicit match arm; the
//! function is pure and total.
//!
//! Null version layouts:
//!
//! | mode | preserved null lives on | next version carries |
//! |------|-------------------------|----------------------|
//! | non-compat | dedicated null key (`is_null2`) | nothing |
//! | compat | versioned key at the null's id | `null_version_id` / `null_upload_id` |

use crate::state::{DataLocation, VersioningStatus};

use super::master::{MasterState, MasterStateKind, NullShape};

/// Settings the decision depends on, passed explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionContext {
    /// Keep null versions in the legacy layout.
    pub compat_mode: bool,
    /// Synthetic id given to objects written before versioning.
    pub infinite_version_id: String,
}

/// How the new record is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteMode {
    /// Replace the master record in place; no version id.
    Overwrite,
    /// Assign a fresh version id and make it the master.
    NewVersion,
    /// Write the null version: a fresh internal id on the master key only.
    NullVersion,
}

/// Back-reference attached to the new version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraMetadata {
    /// Version id of the shadowed null version.
    pub null_version_id: String,
    /// Upload id of the shadowed null version.
    pub null_upload_id: Option<String>,
}

/// How to write the new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Addressing mode.
    pub mode: WriteMode,
    /// Value of `is_null2` on a null version write.
    pub is_null2: bool,
    /// Back-reference to store on the new record.
    pub extra: Option<ExtraMetadata>,
    /// Drop whatever sits on the dedicated null key in the same commit.
    pub replace_null_key: bool,
}

impl WriteOptions {
    fn with_mode(mode: WriteMode) -> Self {
        Self {
            mode,
            is_null2: false,
            extra: None,
            replace_null_key: false,
        }
    }

    /// Whether a new numbered version is created.
    #[must_use]
    pub fn versioning(&self) -> bool {
        self.mode == WriteMode::NewVersion
    }

    /// Whether the new record is the null version.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.mode == WriteMode::NullVersion
    }
}

/// Which record to remove, and whether its data goes with it.
///
/// An options value with neither `version_id` nor `delete_data` is "empty":
/// the caller creates a delete marker instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Version id to remove; `None` addresses the master key.
    pub version_id: Option<String>,
    /// Set to `Some(true)` to address the dedicated null key.
    pub is_null: Option<bool>,
    /// Reclaim the removed record's data blocks.
    pub delete_data: bool,
    /// Upload id whose bookkeeping goes with the removed record.
    pub replay_id: Option<String>,
}

impl DeleteOptions {
    /// Whether these options request nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.version_id.is_none() && self.is_null.is_none() && !self.delete_data
    }
}

/// Output of [`decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersioningDecision {
    /// How to write the new record.
    pub write: WriteOptions,
    /// Superseded record to remove once the new record is committed.
    pub delete: Option<DeleteOptions>,
    /// Null version to preserve on its own address before the master is
    /// overwritten.
    pub null_version_id: Option<String>,
    /// Blocks released by an in-place overwrite of the master.
    pub data_to_delete: Vec<DataLocation>,
}

impl VersioningDecision {
    fn new(write: WriteOptions) -> Self {
        Self {
            write,
            delete: None,
            null_version_id: None,
            data_to_delete: Vec::new(),
        }
    }
}

/// Decide how to write a new record over `master`.
///
/// # Examples
///
/// ```
/// use ruststack_s3_core::state::VersioningStatus;
/// use ruststack_s3_core::versioning::{DecisionContext, MasterState, decide};
///
/// let ctx = DecisionContext {
///     compat_mode: false,
///     infinite_version_id: "9999999999999999999999RG001".to_owned(),
/// };
/// let decision = decide(&MasterState::absent(), VersioningStatus::Enabled, &ctx);
/// assert!(decision.write.versioning());
/// assert!(decision.delete.is_none());
/// assert!(decision.null_version_id.is_none());
/// ```
#[must_use]
pub fn decide(
    master: &MasterState,
    status: VersioningStatus,
    ctx: &DecisionContext,
) -> VersioningDecision {
    match status {
        VersioningStatus::Disabled => decide_unversioned(master),
        VersioningStatus::Enabled => decide_enabled(master, ctx),
        VersioningStatus::Suspended => decide_suspended(master, ctx.compat_mode),
    }
}

fn decide_unversioned(master: &MasterState) -> VersioningDecision {
    let mut decision = VersioningDecision::new(WriteOptions::with_mode(WriteMode::Overwrite));
    decision.data_to_delete.clone_from(&master.locations);
    decision
}

fn decide_enabled(master: &MasterState, ctx: &DecisionContext) -> VersioningDecision {
    let mut decision = VersioningDecision::new(WriteOptions::with_mode(WriteMode::NewVersion));

    match (&master.kind, ctx.compat_mode) {
        (MasterStateKind::NoPriorVersion | MasterStateKind::PriorVersionExists { .. }, _) => {}
        (
            MasterStateKind::PriorVersionWithNullRef {
                null_version_id,
                null_upload_id,
                ..
            },
            _,
        ) => {
            decision.write.extra = Some(ExtraMetadata {
                null_version_id: null_version_id.clone(),
                null_upload_id: null_upload_id.clone(),
            });
        }
        (MasterStateKind::PriorNullVersion { version_id, .. }, true) => {
            preserve_with_reference(&mut decision, version_id, master);
        }
        (
            MasterStateKind::PriorNullVersion {
                version_id,
                shape: NullShape::Legacy,
            },
            false,
        ) => {
            decision.null_version_id = Some(version_id.clone());
            // The null may also sit on a versioned key of the same id; it
            // moves to the null key, so that copy goes without its data.
            decision.delete = Some(DeleteOptions {
                version_id: Some(version_id.clone()),
                ..DeleteOptions::default()
            });
        }
        (
            MasterStateKind::PriorNullVersion {
                version_id,
                shape: NullShape::NonLegacy,
            },
            false,
        ) => {
            decision.null_version_id = Some(version_id.clone());
        }
        (MasterStateKind::PriorPreVersioningObject, true) => {
            preserve_with_reference(&mut decision, &ctx.infinite_version_id, master);
        }
        (MasterStateKind::PriorPreVersioningObject, false) => {
            decision.null_version_id = Some(ctx.infinite_version_id.clone());
        }
    }

    decision
}

fn preserve_with_reference(
    decision: &mut VersioningDecision,
    null_version_id: &str,
    master: &MasterState,
) {
    decision.null_version_id = Some(null_version_id.to_owned());
    decision.write.extra = Some(ExtraMetadata {
        null_version_id: null_version_id.to_owned(),
        null_upload_id: master.upload_id.clone(),
    });
}

fn decide_suspended(master: &MasterState, compat_mode: bool) -> VersioningDecision {
    let mut write = WriteOptions::with_mode(WriteMode::NullVersion);
    write.is_null2 = !compat_mode;
    // A dedicated null key can outlive a switch into compat mode; the new
    // null version supersedes it either way.
    write.replace_null_key = true;
    let mut decision = VersioningDecision::new(write);

    match &master.kind {
        MasterStateKind::NoPriorVersion | MasterStateKind::PriorVersionExists { .. } => {}
        MasterStateKind::PriorNullVersion { version_id, shape } => {
            decision.data_to_delete.clone_from(&master.locations);
            if *shape == NullShape::Legacy {
                decision.delete = Some(DeleteOptions {
                    version_id: Some(version_id.clone()),
                    is_null: None,
                    delete_data: true,
                    replay_id: master.upload_id.clone(),
                });
            }
        }
        MasterStateKind::PriorPreVersioningObject => {
            decision.data_to_delete.clone_from(&master.locations);
        }
        MasterStateKind::PriorVersionWithNullRef {
            null_version_id,
            null_upload_id,
            ..
        } => {
            decision.delete = Some(DeleteOptions {
                version_id: Some(null_version_id.clone()),
                is_null: None,
                delete_data: true,
                replay_id: null_upload_id.clone(),
            });
        }
    }

    decision
}
