//! S3-specific error types.
//!
//! Defines [`S3ServiceError`], the error enum shared by the versioning state
//! machine, the write orchestrator and the storage collaborators. Each
//! variant maps to a well-known S3 error code string through
//! [`S3ServiceError::code`] so the API layer can render it without knowing
//! the internals.
//!
//! # Usage
//!
//! ```
//! use ruststack_s3_core::error::S3ServiceError;
//!
//! let err = S3ServiceError::NoSuchKey {
//!     key: "photos/cat.jpg".to_owned(),
//! };
//! assert_eq!(err.code(), "NoSuchKey");
//! assert_eq!(err.status_code(), 404);
//! ```

/// S3 service error type.
#[derive(Debug, thiserror::Error)]
pub enum S3ServiceError {
    // -----------------------------------------------------------------------
    // Bucket errors
    // -----------------------------------------------------------------------
    /// The specified bucket does not exist.
    #[error("The specified bucket does not exist: {bucket}")]
    NoSuchBucket {
        /// The bucket name that was not found.
        bucket: String,
    },

    /// The bucket already exists and is owned by you.
    #[error(
        "Your previous request to create the named bucket succeeded and you already own it: {bucket}"
    )]
    BucketAlreadyOwnedByYou {
        /// The bucket name that already exists.
        bucket: String,
    },

    /// The versioning configuration transition is not allowed.
    #[error("The versioning configuration specified in the request is invalid: {message}")]
    IllegalVersioningConfiguration {
        /// Why the transition was rejected.
        message: String,
    },

    // -----------------------------------------------------------------------
    // Object / key errors
    // -----------------------------------------------------------------------
    /// The specified key does not exist.
    #[error("The specified key does not exist: {key}")]
    NoSuchKey {
        /// The key that was not found.
        key: String,
    },

    /// The specified version does not exist.
    #[error("The specified version does not exist: key={key}, version_id={version_id}")]
    NoSuchVersion {
        /// The key for the version.
        key: String,
        /// The version ID that was not found.
        version_id: String,
    },

    /// The client-supplied version id is malformed or cannot be decoded.
    #[error("Invalid version id specified: {version_id}")]
    InvalidVersionId {
        /// The raw token received from the client.
        version_id: String,
    },

    // -----------------------------------------------------------------------
    // Multipart errors
    // -----------------------------------------------------------------------
    /// The specified multipart upload does not exist.
    #[error("The specified upload does not exist: {upload_id}")]
    NoSuchUpload {
        /// The upload ID that was not found.
        upload_id: String,
    },

    /// One or more of the specified parts could not be found.
    #[error("One or more of the specified parts could not be found")]
    InvalidPart,

    // -----------------------------------------------------------------------
    // Concurrency errors
    // -----------------------------------------------------------------------
    /// A conditional metadata write was rejected because the stored state
    /// no longer matches the expected prior state.
    #[error("The conditional metadata write was rejected")]
    ConditionFailed,

    /// Conditional writes kept failing until the retry budget was spent.
    #[error("Too many concurrent modifications of {key} (gave up after {attempts} attempts)")]
    ConcurrencyConflict {
        /// The contended object key.
        key: String,
        /// How many attempts were made.
        attempts: u32,
    },

    // -----------------------------------------------------------------------
    // Validation errors
    // -----------------------------------------------------------------------
    /// An argument provided is invalid.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// The HTTP method is not allowed against this resource.
    #[error("The specified method is not allowed against this resource")]
    MethodNotAllowed,

    /// The operation is not valid for the object's storage class.
    #[error("The operation is not valid for the object's storage class")]
    InvalidObjectState,

    /// The Content-MD5 you specified is invalid.
    #[error("The Content-MD5 you specified is not valid")]
    InvalidDigest,

    /// The Content-MD5 you specified did not match what we received.
    #[error("The Content-MD5 you specified did not match what we received")]
    BadDigest,

    /// The key is too long.
    #[error("Your key is too long")]
    KeyTooLong,

    // -----------------------------------------------------------------------
    // Backend errors
    // -----------------------------------------------------------------------
    /// A storage collaborator could not serve the request. Never retried by
    /// the orchestrator.
    #[error("Backend {backend} unavailable: {message}")]
    BackendUnavailable {
        /// Which collaborator failed (`"metadata"` or `"data"`).
        backend: &'static str,
        /// Backend-provided description.
        message: String,
    },

    // -----------------------------------------------------------------------
    // Internal / catch-all
    // -----------------------------------------------------------------------
    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl S3ServiceError {
    /// The S3 error code string for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoSuchBucket { .. } => "NoSuchBucket",
            Self::BucketAlreadyOwnedByYou { .. } => "BucketAlreadyOwnedByYou",
            Self::IllegalVersioningConfiguration { .. } => {
                "IllegalVersioningConfigurationException"
            }
            Self::NoSuchKey { .. } => "NoSuchKey",
            Self::NoSuchVersion { .. } => "NoSuchVersion",
            Self::NoSuchUpload { .. } => "NoSuchUpload",
            Self::InvalidPart => "InvalidPart",
            Self::InvalidVersionId { .. } | Self::InvalidArgument { .. } => "InvalidArgument",
            Self::ConditionFailed | Self::ConcurrencyConflict { .. } => {
                "ConditionalRequestConflict"
            }
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::InvalidObjectState => "InvalidObjectState",
            Self::InvalidDigest => "InvalidDigest",
            Self::BadDigest => "BadDigest",
            Self::KeyTooLong => "KeyTooLongError",
            Self::BackendUnavailable { .. } => "ServiceUnavailable",
            Self::Internal(_) => "InternalError",
        }
    }

    /// The HTTP status code the API layer should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoSuchBucket { .. }
            | Self::NoSuchKey { .. }
            | Self::NoSuchVersion { .. }
            | Self::NoSuchUpload { .. } => 404,
            Self::BucketAlreadyOwnedByYou { .. }
            | Self::ConditionFailed
            | Self::ConcurrencyConflict { .. } => 409,
            Self::MethodNotAllowed => 405,
            Self::InvalidObjectState => 403,
            Self::BackendUnavailable { .. } => 503,
            Self::Internal(_) => 500,
            Self::IllegalVersioningConfiguration { .. }
            | Self::InvalidVersionId { .. }
            | Self::InvalidArgument { .. }
            | Self::InvalidPart
            | Self::InvalidDigest
            | Self::BadDigest
            | Self::KeyTooLong => 400,
        }
    }

    /// Whether this is a "not found" outcome for a key or a version.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoSuchKey { .. } | Self::NoSuchVersion { .. })
    }
}

/// Convenience result type for S3 service operations.
pub type S3ServiceResult<T> = Result<T, S3ServiceError>;
