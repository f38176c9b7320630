//! S3 operation handlers.
//!
//! Each submodule exposes `handle_*` methods on
//! [`crate::provider::RustStackS3`]. Every handler that creates a new current
//! version goes through the shared pipeline in `commit`.

mod commit;
pub mod multipart;
pub mod object;
pub mod restore;
pub mod object_config;
