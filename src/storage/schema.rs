//! Uptime sample rows and the bucket arithmetic shared by all backends
//!
//! ## Buckets
//!
//! Samples are quantized to fixed-width buckets (one hour by default). A
//! bucket is identified by its start, in Unix seconds, obtained by truncating
//! the probe time. A probe that fires slightly early or late therefore still
//! lands in the right bucket; there is no exact-timestamp matching.
//!
//! ## Window read-back
//!
//! Reads always return a fixed number of buckets. A bucket without a sample is
//! reported as [`BucketStatus::Unknown`], never as up or down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of buckets shown in a status message.
pub const DISPLAY_BUCKETS: usize = 48;

/// One up/down record for one host in one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub hostname: String,

    /// Bucket start (Unix seconds, truncated to the granularity)
    pub bucket: i64,

    pub up: bool,
}

/// Width of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketGranularity(i64);

impl BucketGranularity {
    pub const HOURLY: BucketGranularity = BucketGranularity(3600);

    /// Granularity in whole seconds. Values below one second are clamped.
    pub fn from_secs(secs: i64) -> Self {
        Self(secs.max(1))
    }

    pub fn as_secs(&self) -> i64 {
        self.0
    }

    /// Start of the bucket containing `timestamp`.
    pub fn truncate(&self, timestamp: DateTime<Utc>) -> i64 {
        timestamp.timestamp().div_euclid(self.0) * self.0
    }

    /// The `count` most recent bucket starts ending with the bucket that
    /// contains `now`, oldest first.
    pub fn window_buckets(&self, count: usize, now: DateTime<Utc>) -> Vec<i64> {
        let newest = self.truncate(now);
        (0..count as i64)
            .rev()
            .map(|offset| newest - offset * self.0)
            .collect()
    }
}

impl Default for BucketGranularity {
    fn default() -> Self {
        Self::HOURLY
    }
}

/// State of one bucket as read back from the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketStatus {
    Up,
    Down,

    /// No sample was recorded for this bucket
    Unknown,
}

impl From<bool> for BucketStatus {
    fn from(up: bool) -> Self {
        if up { BucketStatus::Up } else { BucketStatus::Down }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowEntry {
    pub bucket: i64,
    pub status: BucketStatus,
}

/// Lays recorded samples over the expected buckets. `recorded` may be in any
/// order and may contain buckets outside the window.
pub fn fill_window(buckets: &[i64], recorded: &[(i64, bool)]) -> Vec<WindowEntry> {
    buckets
        .iter()
        .map(|&bucket| WindowEntry {
            bucket,
            status: recorded
                .iter()
                .rev()
                .find(|(recorded_bucket, _)| *recorded_bucket == bucket)
                .map(|(_, up)| BucketStatus::from(*up))
                .unwrap_or(BucketStatus::Unknown),
        })
        .collect()
}

impl std::fmt::Display for BucketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BucketStatus::Up => write!(f, "up"),
            BucketStatus::Down => write!(f, "down"),
            BucketStatus::Unknown => write!(f, "unknown"),
        }
    }
}
