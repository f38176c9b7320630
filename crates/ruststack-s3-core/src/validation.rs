//! Request validation run before any state is read.
//!
//! Covers object keys, tags, user-defined metadata and the `Content-MD5`
//! header, following the limits documented for Amazon S3.

use std::collections::BTreeMap;

use base64::Engine;
use md5::{Digest, Md5};

use crate::error::S3ServiceError;

/// Maximum number of tags allowed on a single S3 object.
const MAX_TAGS: usize = 10;

/// Maximum length of a tag key in characters.
const MAX_TAG_KEY_LEN: usize = 128;

/// Maximum length of a tag value in characters.
const MAX_TAG_VALUE_LEN: usize = 256;

/// Maximum total size (in bytes) of all user-defined metadata keys and values.
const MAX_METADATA_SIZE: usize = 2048;

/// Maximum object key length in bytes.
const MAX_KEY_BYTES: usize = 1024;

/// Validate an S3 object key.
///
/// # Errors
///
/// Returns [`S3ServiceError::InvalidArgument`] if the key is empty, or
/// [`S3ServiceError::KeyTooLong`] if it exceeds 1024 bytes.
///
/// # Examples
///
/// ```
/// use ruststack_s3_core::validation::validate_object_key;
///
/// assert!(validate_object_key("photos/2024/image.jpg").is_ok());
/// assert!(validate_object_key("").is_err());
/// ```
pub fn validate_object_key(key: &str) -> Result<(), S3ServiceError> {
    if key.is_empty() {
        return Err(S3ServiceError::InvalidArgument {
            message: "Object key must not be empty".to_owned(),
        });
    }

    if key.len() > MAX_KEY_BYTES {
        return Err(S3ServiceError::KeyTooLong);
    }

    Ok(())
}

/// Validate an object tag set.
pub fn validate_tags(tags: &[(String, String)]) -> Result<(), S3ServiceError> {
    if tags.len() > MAX_TAGS {
        return Err(S3ServiceError::InvalidArgument {
            message: format!("Object tags cannot be greater than {MAX_TAGS}"),
        });
    }
    for (key, value) in tags {
        let key_len = key.chars().count();
        if key_len == 0 || key_len > MAX_TAG_KEY_LEN {
            return Err(S3ServiceError::InvalidArgument {
                message: format!("Tag key length must be 1-{MAX_TAG_KEY_LEN}, got {key_len}"),
            });
        }
        if value.chars().count() > MAX_TAG_VALUE_LEN {
            return Err(S3ServiceError::InvalidArgument {
                message: format!("Tag value must not exceed {MAX_TAG_VALUE_LEN} characters"),
            });
        }
    }
    Ok(())
}

/// Validate user-defined metadata.
///
/// The total size of all keys and values must not exceed 2 KB.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use ruststack_s3_core::validation::validate_metadata;
///
/// let mut meta = BTreeMap::new();
/// meta.insert("color".to_owned(), "blue".to_owned());
/// assert!(validate_metadata(&meta).is_ok());
/// ```
pub fn validate_metadata(metadata: &BTreeMap<String, String>) -> Result<(), S3ServiceError> {
    let total_size: usize = metadata.iter().map(|(k, v)| k.len() + v.len()).sum();

    if total_size > MAX_METADATA_SIZE {
        return Err(S3ServiceError::InvalidArgument {
            message: format!(
                "User-defined metadata must not exceed {MAX_METADATA_SIZE} bytes, got {total_size}"
            ),
        });
    }

    Ok(())
}

/// Validate the `Content-MD5` header against the request body.
///
/// # Errors
///
/// Returns [`S3ServiceError::InvalidDigest`] if the header value is not
/// valid Base64, or [`S3ServiceError::BadDigest`] if the decoded digest
/// does not match the body.
///
/// # Examples
///
/// ```
/// use ruststack_s3_core::validation::validate_content_md5;
///
/// assert!(validate_content_md5(None, b"hello").is_ok());
/// assert!(validate_content_md5(Some("XUFAKrxLKna5cZ2REBfFkg=="), b"hello").is_ok());
/// ```
pub fn validate_content_md5(content_md5: Option<&str>, body: &[u8]) -> Result<(), S3ServiceError> {
    let Some(expected_b64) = content_md5 else {
        return Ok(());
    };

    let expected_bytes = base64::engine::general_purpose::STANDARD
        .decode(expected_b64)
        .map_err(|_| S3ServiceError::InvalidDigest)?;

    let actual = Md5::digest(body);
    if actual.as_slice() != expected_bytes {
        return Err(S3ServiceError::BadDigest);
    }

    Ok(())
}
