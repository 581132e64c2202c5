//! Sample store trait definition
//!
//! This module defines the `SampleStore` trait that every uptime storage
//! implementation provides.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{Sample, WindowEntry};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Keyed time series of (hostname, bucket) -> up/down
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; one store is shared by both
/// scheduler cycles, the reconciler and the API.
///
/// ## Consistency
///
/// There is at most one sample per (hostname, bucket). Writing a bucket that
/// already has a sample replaces it.
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Upsert a single sample
    ///
    /// `bucket` may be any timestamp inside the bucket; implementations
    /// truncate it to their granularity.
    async fn record(&self, hostname: &str, bucket: DateTime<Utc>, up: bool) -> StorageResult<()>;

    /// Upsert every sample of one uptime cycle atomically
    ///
    /// Either all samples are written or none are. `Sample::bucket` must
    /// already be truncated.
    async fn record_batch(&self, samples: Vec<Sample>) -> StorageResult<()>;

    /// Exactly `count` buckets ending with the bucket containing `now`,
    /// oldest first, with gaps reported as unknown
    async fn window(
        &self,
        hostname: &str,
        count: usize,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<WindowEntry>>;

    /// Delete samples whose bucket is strictly older than `cutoff`
    ///
    /// Returns the number of samples removed.
    async fn evict_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<usize>;

    /// Check backend health
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
