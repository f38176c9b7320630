//! S3 object versioning for RustStack.
//!
//! This crate implements the write side of S3 object versioning: deciding,
//! for every put, copy, multipart completion and delete, which metadata
//! records to write and which to remove so that the version history of a key
//! stays consistent across the `Disabled`, `Enabled` and `Suspended` bucket
//! states, including the "null" version semantics of S3.
//!
//! # Architecture
//!
//! ```text
//! RustStackS3 (handle_* operations)
//!        |
//!        v
//!   versioning (pure decisions: master state, write/delete options)
//!        |
//!        v
//!   MetadataStore (conditional record writes)  +  DataStore (object bytes)
//!        |
//!        v
//!   DataReclaimer (background deletion of superseded data)
//! ```

pub mod checksums;
pub mod config;
pub mod error;
pub mod ops;
pub mod provider;
pub mod reclaim;
pub mod state;
pub mod storage;
pub mod utils;
pub mod validation;
pub mod versioning;

pub use config::S3Config;
pub use error::{S3ServiceError, S3ServiceResult};
pub use provider::RustStackS3;
