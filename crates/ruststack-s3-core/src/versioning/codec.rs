//! Version id generation and wire encoding.
//!
//! Raw version ids sort lexicographically **newest first**: a reversed
//! microsecond timestamp, a reversed per-microsecond sequence number and the
//! replication group id. The reserved infinite id sorts after every generated
//! id and stands for "written before versioning was ever configured".
//!
//! Clients never see raw ids; they see the URL-safe base64 token produced by
//! [`VersionCodec::encode`].

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use parking_lot::Mutex;

use crate::error::S3ServiceError;

/// Width of the reversed timestamp component.
const TIMESTAMP_DIGITS: usize = 16;
/// Width of the reversed sequence component.
const SEQUENCE_DIGITS: usize = 6;
/// Largest value of the timestamp component.
const MAX_TIMESTAMP: u64 = 9_999_999_999_999_999;
/// Largest value of the sequence component.
const MAX_SEQUENCE: u32 = 999_999;

/// The client-facing token that always denotes the null version.
pub const NULL_VERSION_TOKEN: &str = "null";

/// Encodes, decodes and generates version ids for one replication group.
///
/// # Examples
///
/// ```
/// use ruststack_s3_core::versioning::VersionCodec;
///
/// let codec = VersionCodec::new("RG001");
/// let older = codec.generate();
/// let newer = codec.generate();
/// assert!(newer < older);
/// assert!(older < codec.infinite_version_id());
///
/// let token = codec.encode(&newer);
/// assert_eq!(codec.decode(&token).unwrap(), newer);
/// ```
pub struct VersionCodec {
    replication_group_id: String,
    clock: Mutex<(u64, u32)>,
}

impl fmt::Debug for VersionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionCodec")
            .field("replication_group_id", &self.replication_group_id)
            .finish_non_exhaustive()
    }
}

impl VersionCodec {
    /// Create a codec for the given replication group.
    #[must_use]
    pub fn new(replication_group_id: impl Into<String>) -> Self {
        Self {
            replication_group_id: replication_group_id.into(),
            clock: Mutex::new((0, 0)),
        }
    }

    /// The replication group id appended to every generated id.
    #[must_use]
    pub fn replication_group_id(&self) -> &str {
        &self.replication_group_id
    }

    /// Generate a fresh raw version id, strictly smaller (newer) than every
    /// id this codec generated before.
    #[must_use]
    pub fn generate(&self) -> String {
        let now = u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0);
        let (micros, seq) = {
            let mut clock = self.clock.lock();
            let (last, seq) = *clock;
            let next = if now > last {
                (now, 0)
            } else if seq < MAX_SEQUENCE {
                (last, seq + 1)
            } else {
                (last + 1, 0)
            };
            *clock = next;
            next
        };
        format!(
            "{:0ts$}{:0sq$}{}",
            MAX_TIMESTAMP.saturating_sub(micros),
            MAX_SEQUENCE - seq,
            self.replication_group_id,
            ts = TIMESTAMP_DIGITS,
            sq = SEQUENCE_DIGITS,
        )
    }

    /// The reserved "oldest possible" version id of this replication group.
    #[must_use]
    pub fn infinite_version_id(&self) -> String {
        format!(
            "{}{}",
            "9".repeat(TIMESTAMP_DIGITS + SEQUENCE_DIGITS),
            self.replication_group_id
        )
    }

    /// Encode a raw version id into its opaque wire token.
    #[must_use]
    pub fn encode(&self, version_id: &str) -> String {
        URL_SAFE_NO_PAD.encode(version_id.as_bytes())
    }

    /// Decode a wire token back into the raw version id.
    ///
    /// # Errors
    ///
    /// Returns [`S3ServiceError::InvalidVersionId`] if the token is not
    /// valid base64 or does not decode to a well-formed version id.
    pub fn decode(&self, token: &str) -> Result<String, S3ServiceError> {
        let invalid = || S3ServiceError::InvalidVersionId {
            version_id: token.to_owned(),
        };
        let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
        let raw = String::from_utf8(bytes).map_err(|_| invalid())?;
        if is_well_formed(&raw) {
            Ok(raw)
        } else {
            Err(invalid())
        }
    }
}

fn is_well_formed(raw: &str) -> bool {
    let digits = TIMESTAMP_DIGITS + SEQUENCE_DIGITS;
    raw.len() > digits
        && raw.as_bytes()[..digits].iter().all(u8::is_ascii_digit)
        && raw[digits..].chars().all(|c| c.is_ascii_alphanumeric())
}

// ---------------------------------------------------------------------------
// VersionToken
// ---------------------------------------------------------------------------

/// A client-supplied version id, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionToken {
    /// The literal `"null"` token.
    Null,
    /// A specific raw version id.
    Id(String),
}

impl VersionToken {
    /// Parse a client token, rejecting malformed values before any state is
    /// read.
    ///
    /// # Errors
    ///
    /// Returns [`S3ServiceError::InvalidVersionId`] for undecodable tokens.
    pub fn parse(token: &str, codec: &VersionCodec) -> Result<Self, S3ServiceError> {
        if token == NULL_VERSION_TOKEN {
            return Ok(Self::Null);
        }
        codec.decode(token).map(Self::Id)
    }
}
