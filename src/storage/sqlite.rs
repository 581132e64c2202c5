//! SQLite sample store
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers (status renders, API) never block the uptime cycle
//! - **Migrations**: Schema versioning with sqlx
//!
//! ## Layout
//!
//! `uptime_history(hostname, bucket, up)` with `UNIQUE(hostname, bucket)`, so
//! writes are upserts, and an index on `(hostname, bucket)` for window reads.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, SampleStore};
use super::error::{StorageError, StorageResult};
use super::schema::{BucketGranularity, Sample, WindowEntry, fill_window};

const UPSERT_SAMPLE: &str = r#"
    INSERT INTO uptime_history (hostname, bucket, up)
    VALUES (?, ?, ?)
    ON CONFLICT (hostname, bucket) DO UPDATE SET up = excluded.up
"#;

/// SQLite-backed sample store
pub struct SqliteSampleStore {
    pool: Pool<Sqlite>,
    db_path: String,
    granularity: BucketGranularity,
}

impl SqliteSampleStore {
    /// Open (or create) the database and run migrations
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use hostwatch::storage::{sqlite::SqliteSampleStore, schema::BucketGranularity};
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteSampleStore::new("./uptime_history.db", BucketGranularity::HOURLY).await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(
        db_path: impl AsRef<Path>,
        granularity: BucketGranularity,
    ) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite sample store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connect(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("sample store ready");

        Ok(Self {
            pool,
            db_path: db_path_str,
            granularity,
        })
    }

    pub async fn sample_count(&self) -> StorageResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM uptime_history")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

#[async_trait]
impl SampleStore for SqliteSampleStore {
    #[instrument(skip(self))]
    async fn record(&self, hostname: &str, bucket: DateTime<Utc>, up: bool) -> StorageResult<()> {
        let bucket = self.granularity.truncate(bucket);

        sqlx::query(UPSERT_SAMPLE)
            .bind(hostname)
            .bind(bucket)
            .bind(up)
            .execute(&self.pool)
            .await?;

        debug!("recorded {hostname} @ {bucket}: {}", if up { "up" } else { "down" });
        Ok(())
    }

    #[instrument(skip(self, samples), fields(count = samples.len()))]
    async fn record_batch(&self, samples: Vec<Sample>) -> StorageResult<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for sample in &samples {
            sqlx::query(UPSERT_SAMPLE)
                .bind(&sample.hostname)
                .bind(sample.bucket)
                .bind(sample.up)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        debug!("recorded {} samples", samples.len());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn window(
        &self,
        hostname: &str,
        count: usize,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<WindowEntry>> {
        let buckets = self.granularity.window_buckets(count, now);
        let (Some(&first), Some(&last)) = (buckets.first(), buckets.last()) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT bucket, up
            FROM uptime_history
            WHERE hostname = ? AND bucket >= ? AND bucket <= ?
            ORDER BY bucket ASC
            "#,
        )
        .bind(hostname)
        .bind(first)
        .bind(last)
        .fetch_all(&self.pool)
        .await?;

        let recorded: Vec<(i64, bool)> = rows
            .into_iter()
            .map(|row| (row.get("bucket"), row.get("up")))
            .collect();

        Ok(fill_window(&buckets, &recorded))
    }

    #[instrument(skip(self), fields(cutoff = %cutoff))]
    async fn evict_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM uptime_history WHERE bucket < ?")
            .bind(cutoff.timestamp())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        if deleted > 0 {
            info!("evicted {} old uptime samples", deleted);
        }

        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite sample store operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite sample store");
        self.pool.close().await;
        Ok(())
    }
}
