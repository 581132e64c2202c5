//! Integration tests for the polling engine

#[path = "integration/helpers.rs"]
mod helpers;

#[path = "integration/scheduler.rs"]
mod scheduler;

#[path = "integration/reconciler.rs"]
mod reconciler;

#[cfg(feature = "storage-sqlite")]
#[path = "integration/storage_persistence.rs"]
mod storage_persistence;

#[cfg(feature = "api")]
#[path = "integration/api_endpoints.rs"]
mod api_endpoints;
