//! Checksum computation for S3 objects.
//!
//! Records store the *unquoted* content MD5 (`content_md5`); the quoted
//! ETag form is only produced at the API boundary via [`quote_etag`].

use digest::Digest;

/// MD5 of the empty byte string, recorded for zero-length bodies without
/// touching the data store.
pub const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

// ---------------------------------------------------------------------------
// Standalone checksum functions
// ---------------------------------------------------------------------------

/// Compute the hex-encoded MD5 digest of `data`.
///
/// # Examples
///
/// ```
/// use ruststack_s3_core::checksums::compute_md5;
///
/// let digest = compute_md5(b"hello");
/// assert_eq!(digest, "5d41402abc4b2a76b9719d911017c592");
/// ```
#[must_use]
pub fn compute_md5(data: &[u8]) -> String {
    let hash = md5::Md5::digest(data);
    hex::encode(hash)
}

/// Wrap a stored content MD5 in double quotes, as S3 returns ETags.
///
/// # Examples
///
/// ```
/// use ruststack_s3_core::checksums::{EMPTY_MD5, quote_etag};
///
/// assert_eq!(quote_etag(EMPTY_MD5), "\"d41d8cd98f00b204e9800998ecf8427e\"");
/// ```
#[must_use]
pub fn quote_etag(content_md5: &str) -> String {
    format!("\"{}\"", content_md5.trim_matches('"'))
}

/// Compute the content MD5 of a completed multipart upload.
///
/// The composite value is the MD5 of the concatenated binary MD5 digests of
/// each part, formatted as `<hex>-<part_count>`. Quoted inputs are accepted.
///
/// # Examples
///
/// ```
/// use ruststack_s3_core::checksums::compute_multipart_md5;
///
/// let part_hexes = ["5d41402abc4b2a76b9719d911017c592"];
/// let md5 = compute_multipart_md5(&part_hexes);
/// assert!(md5.ends_with("-1"));
/// ```
#[must_use]
pub fn compute_multipart_md5(part_md5_hexes: &[impl AsRef<str>]) -> String {
    let mut combined = Vec::with_capacity(part_md5_hexes.len() * 16);
    for hex_str in part_md5_hexes {
        let hex_str = hex_str.as_ref().trim_matches('"');
        if let Ok(bytes) = hex::decode(hex_str) {
            combined.extend_from_slice(&bytes);
        }
    }
    let final_md5 = hex::encode(md5::Md5::digest(&combined));
    format!("{final_md5}-{}", part_md5_hexes.len())
}
