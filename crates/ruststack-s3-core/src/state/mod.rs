//! Object metadata state.
//!
//! - [`ObjectRecord`] -- the stored metadata of one object version
//! - [`MetadataStore`] -- the seam the request handlers write through
//! - [`InMemoryMetadataStore`] -- the bundled implementation, owning
//!   [`S3Bucket`]s whose keys are laid out as [`KeyEntry`]s
//! - [`MultipartUpload`] / [`UploadPart`] -- multipart upload tracking
//!
//! # Thread Safety
//!
//! All types are `Send + Sync`. Concurrent access is handled via:
//!
//! - `DashMap` for the bucket table and the replay registry
//! - `parking_lot::RwLock` for the per-bucket versioning status and the
//!   object table

pub(crate) mod bucket;
pub(crate) mod keystore;
pub(crate) mod multipart;
pub(crate) mod object;
pub(crate) mod service;
pub(crate) mod store;

pub use bucket::{S3Bucket, VersioningStatus};
pub use keystore::KeyEntry;
pub use multipart::{MultipartUpload, UploadPart};
pub use object::{
    ArchiveInfo, CannedAcl, DataLocation, ORIGIN_OP_COMPLETE_MPU, ORIGIN_OP_COPY,
    ORIGIN_OP_DELETE_MARKER, ORIGIN_OP_PUT, ORIGIN_OP_TAGGING_DELETE, ORIGIN_OP_TAGGING_PUT,
    ObjectRecord, Owner, ReplicationInfo,
};
pub use service::InMemoryMetadataStore;
pub use store::{MetadataStore, Precondition, PutOutcome, RecordAddress, RecordRead, WriteTarget};
