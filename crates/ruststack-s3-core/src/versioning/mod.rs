//! The object versioning state machine.
//!
//! Everything in this module is synchronous and side-effect free:
//!
//! - [`derive_master_state`] classifies the record on the master key
//! - [`decide`] turns that classification, the bucket's versioning status and
//!   the compat mode into a [`VersioningDecision`]
//! - [`preprocessing_versioning_delete`] resolves version deletes
//! - [`overwriting_versioning`] computes restore-completed rewrites
//! - [`VersionCodec`] generates and encodes version ids
//!
//! The [`ops`](crate::ops) handlers execute the decisions against the
//! metadata and data stores.

mod codec;
mod decision;
mod delete;
mod master;
mod restore;

pub use codec::{NULL_VERSION_TOKEN, VersionCodec, VersionToken};
pub use decision::{
    DecisionContext, DeleteOptions, ExtraMetadata, VersioningDecision, WriteMode, WriteOptions,
    decide,
};
pub use delete::{
    VersionSpecificOptions, get_version_specific_options, preprocessing_versioning_delete,
};
pub use master::{MasterState, MasterStateKind, NullShape, derive_master_state};
pub use restore::{
    ORIGIN_OP_RESTORE_COMPLETED, RESTORE_ATTEMPT_HEADER, RestoreContext, RestoreOverwrite,
    RestoreParams, VersionAddress, overwriting_versioning,
};
