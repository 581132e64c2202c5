//! Uptime sample storage
//!
//! A trait-based abstraction over where up/down samples live.
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database, survives restarts
//! - **In-Memory**: No persistence, for tests or `STORAGE_BACKEND=none`
//!
//! ## Usage
//!
//! ```no_run
//! use hostwatch::storage::{SampleStore, schema::BucketGranularity, sqlite::SqliteSampleStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteSampleStore::new("./uptime_history.db", BucketGranularity::HOURLY).await?;
//!     store.record("web1", chrono::Utc::now(), true).await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use crate::config::StorageConfig;

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::SampleStore;
pub use error::{StorageError, StorageResult};
pub use schema::{BucketGranularity, BucketStatus, DISPLAY_BUCKETS, Sample, WindowEntry, fill_window};

/// Build the configured store.
pub async fn open_store(
    config: &StorageConfig,
    granularity: BucketGranularity,
) -> StorageResult<Arc<dyn SampleStore>> {
    match config {
        StorageConfig::None => Ok(Arc::new(memory::MemorySampleStore::new(granularity))),
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            Ok(Arc::new(sqlite::SqliteSampleStore::new(path, granularity).await?))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::Connect(
            "built without the storage-sqlite feature".to_string(),
        )),
    }
}
