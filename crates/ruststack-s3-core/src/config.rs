//! S3 versioning configuration.
//!
//! Provides [`S3Config`] for configuring the object write path. Values are
//! loaded from environment variables and then handed explicitly to the
//! versioning functions, which never read ambient state themselves.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Real milliseconds in one day.
pub const MS_PER_DAY: u64 = 86_400_000;

/// S3 service configuration.
///
/// # Examples
///
/// ```
/// use ruststack_s3_core::config::S3Config;
///
/// let config = S3Config::default();
/// assert!(!config.null_version_compat_mode);
/// assert_eq!(config.scaled_ms_per_day(), 86_400_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct S3Config {
    /// Keep null versions in the legacy layout (versioned key plus a
    /// back-reference on the next version) instead of the dedicated null key.
    #[builder(default = false)]
    pub null_version_compat_mode: bool,

    /// Replication group id appended to every generated version id.
    #[builder(default = String::from("RG001"))]
    pub replication_group_id: String,

    /// How many times a write is re-resolved after a conditional-write
    /// rejection before giving up.
    #[builder(default = 5)]
    pub max_conflict_retries: u32,

    /// Divides the length of a day, so restore expiry can be exercised in
    /// tests without waiting real days. `1` means real time.
    #[builder(default = 1)]
    pub time_progression_factor: u64,

    /// Maximum block size (in bytes) kept entirely in memory before spilling to disk.
    #[builder(default = 524_288)]
    pub s3_max_memory_object_size: usize,

    /// Capacity of the background data reclaim queue.
    #[builder(default = 1024)]
    pub reclaim_queue_capacity: usize,

    /// Storage class recorded on new objects and restored versions.
    #[builder(default = String::from("STANDARD"))]
    pub default_storage_class: String,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            null_version_compat_mode: false,
            replication_group_id: String::from("RG001"),
            max_conflict_retries: 5,
            time_progression_factor: 1,
            s3_max_memory_object_size: 524_288,
            reclaim_queue_capacity: 1024,
            default_storage_class: String::from("STANDARD"),
            log_level: String::from("info"),
        }
    }
}

impl S3Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `NULL_VERSION_COMPAT_MODE` | `false` |
    /// | `REPLICATION_GROUP_ID` | `RG001` |
    /// | `S3_MAX_CONFLICT_RETRIES` | `5` |
    /// | `TIME_PROGRESSION_FACTOR` | `1` |
    /// | `S3_MAX_MEMORY_OBJECT_SIZE` | `524288` |
    /// | `S3_RECLAIM_QUEUE_CAPACITY` | `1024` |
    /// | `S3_DEFAULT_STORAGE_CLASS` | `STANDARD` |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// # Examples
    ///
    /// ```
    /// use ruststack_s3_core::config::S3Config;
    ///
    /// let config = S3Config::from_env();
    /// assert!(!config.replication_group_id.is_empty());
    /// ```
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("NULL_VERSION_COMPAT_MODE") {
            config.null_version_compat_mode = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("REPLICATION_GROUP_ID") {
            if !v.is_empty() {
                config.replication_group_id = v;
            }
        }
        if let Ok(v) = std::env::var("S3_MAX_CONFLICT_RETRIES") {
            if let Ok(n) = v.parse::<u32>() {
                config.max_conflict_retries = n;
            }
        }
        if let Ok(v) = std::env::var("TIME_PROGRESSION_FACTOR") {
            if let Ok(n) = v.parse::<u64>() {
                config.time_progression_factor = n;
            }
        }
        if let Ok(v) = std::env::var("S3_MAX_MEMORY_OBJECT_SIZE") {
            if let Ok(n) = v.parse::<usize>() {
                config.s3_max_memory_object_size = n;
            }
        }
        if let Ok(v) = std::env::var("S3_RECLAIM_QUEUE_CAPACITY") {
            if let Ok(n) = v.parse::<usize>() {
                config.reclaim_queue_capacity = n;
            }
        }
        if let Ok(v) = std::env::var("S3_DEFAULT_STORAGE_CLASS") {
            config.default_storage_class = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// Length of one day in milliseconds after applying
    /// [`time_progression_factor`](Self::time_progression_factor).
    #[must_use]
    pub fn scaled_ms_per_day(&self) -> u64 {
        MS_PER_DAY / self.time_progression_factor.max(1)
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
