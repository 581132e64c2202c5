//! Errors of the sample store

pub type StorageResult<T> = Result<T, StorageError>;

/// Every variant means the sample store could not serve the operation at
/// hand. The cycles log these and carry on; readers fall back to an all
/// unknown window.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("cannot open sample store: {0}")]
    Connect(String),

    #[error("sample store query failed: {0}")]
    Query(String),

    #[error("uptime_history migration failed: {0}")]
    Migration(String),

    #[error("sample store I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Closed, or the pool is gone
    #[error("sample store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io) => StorageError::Io(io),
            sqlx::Error::PoolClosed => StorageError::Unavailable("connection pool closed".into()),
            sqlx::Error::PoolTimedOut => StorageError::Unavailable("connection pool timed out".into()),
            other => StorageError::Query(other.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::Migration(err.to_string())
    }
}
