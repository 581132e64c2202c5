//! In-memory sample store (no persistence)
//!
//! Used when `STORAGE_BACKEND=none` and throughout the tests. History is lost
//! on restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, SampleStore};
use super::error::{StorageError, StorageResult};
use super::schema::{BucketGranularity, BucketStatus, Sample, WindowEntry};

/// Samples grouped by hostname, ordered by bucket.
pub struct MemorySampleStore {
    samples: RwLock<HashMap<String, BTreeMap<i64, bool>>>,
    granularity: BucketGranularity,
    closed: AtomicBool,
}

impl MemorySampleStore {
    pub fn new(granularity: BucketGranularity) -> Self {
        Self {
            samples: RwLock::new(HashMap::new()),
            granularity,
            closed: AtomicBool::new(false),
        }
    }

    pub async fn sample_count(&self) -> usize {
        self.samples.read().await.values().map(BTreeMap::len).sum()
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store closed".into()));
        }
        Ok(())
    }
}

impl Default for MemorySampleStore {
    fn default() -> Self {
        Self::new(BucketGranularity::default())
    }
}

#[async_trait]
impl SampleStore for MemorySampleStore {
    async fn record(&self, hostname: &str, bucket: DateTime<Utc>, up: bool) -> StorageResult<()> {
        self.ensure_open()?;
        let bucket = self.granularity.truncate(bucket);
        self.samples
            .write()
            .await
            .entry(hostname.to_string())
            .or_default()
            .insert(bucket, up);
        Ok(())
    }

    async fn record_batch(&self, samples: Vec<Sample>) -> StorageResult<()> {
        self.ensure_open()?;
        let mut guard = self.samples.write().await;
        for sample in samples {
            guard
                .entry(sample.hostname)
                .or_default()
                .insert(sample.bucket, sample.up);
        }
        Ok(())
    }

    async fn window(
        &self,
        hostname: &str,
        count: usize,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<WindowEntry>> {
        self.ensure_open()?;
        let guard = self.samples.read().await;
        let host = guard.get(hostname);

        Ok(self
            .granularity
            .window_buckets(count, now)
            .into_iter()
            .map(|bucket| WindowEntry {
                bucket,
                status: host
                    .and_then(|samples| samples.get(&bucket))
                    .map(|up| BucketStatus::from(*up))
                    .unwrap_or(BucketStatus::Unknown),
            })
            .collect())
    }

    async fn evict_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        self.ensure_open()?;
        let cutoff = cutoff.timestamp();
        let mut deleted = 0;

        let mut guard = self.samples.write().await;
        for samples in guard.values_mut() {
            let kept = samples.split_off(&cutoff);
            deleted += samples.len();
            *samples = kept;
        }
        guard.retain(|_, samples| !samples.is_empty());

        if deleted > 0 {
            debug!("evicted {deleted} samples from memory");
        }
        Ok(deleted)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let healthy = !self.closed.load(Ordering::SeqCst);
        let mut metadata = HashMap::new();
        metadata.insert("backend".to_string(), "memory".to_string());

        Ok(HealthStatus {
            healthy,
            message: if healthy {
                "memory sample store operational".to_string()
            } else {
                "memory sample store closed".to_string()
            },
            metadata,
        })
    }

    async fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
