//! Shared utilities for the S3 service.
//!
//! Provides ID generation and ETag comparison helpers.

use rand::RngExt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ID generation
// ---------------------------------------------------------------------------

/// Generate a random upload ID for multipart uploads.
///
/// Produces a hex string of approximately 64 characters.
///
/// # Examples
///
/// ```
/// use ruststack_s3_core::utils::generate_upload_id;
///
/// let id = generate_upload_id();
/// assert!(id.len() >= 32);
/// assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
#[must_use]
pub fn generate_upload_id() -> String {
    let mut rng = rand::rng();
    let mut buf = [0u8; 32];
    rng.fill(&mut buf);
    hex::encode(buf)
}

/// Generate a micro version id, refreshed whenever a record is rewritten in
/// place.
#[must_use]
pub fn generate_micro_version_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// ---------------------------------------------------------------------------
// ETags
// ---------------------------------------------------------------------------

/// Strip the surrounding quotes of an ETag, if any.
///
/// # Examples
///
/// ```
/// use ruststack_s3_core::utils::unquote_etag;
///
/// assert_eq!(unquote_etag("\"abc\""), "abc");
/// assert_eq!(unquote_etag("abc"), "abc");
/// ```
#[must_use]
pub fn unquote_etag(etag: &str) -> &str {
    etag.trim_matches('"')
}
