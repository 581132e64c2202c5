//! Integration tests for SQLite persistence
//!
//! These tests verify that:
//! - Samples survive closing and reopening the database
//! - The uptime cycle writes through to SQLite and evicts expired samples

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use hostwatch::{
    actors::{CycleSchedule, UptimeCycleActor},
    config::Host,
    storage::{BucketGranularity, BucketStatus, SampleStore, sqlite::SqliteSampleStore},
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use super::helpers::{ScriptedProber, fixed_time, remote_host};

#[tokio::test]
async fn test_samples_survive_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("uptime_history.db");
    let now = fixed_time();

    {
        let store = SqliteSampleStore::new(&db_path, BucketGranularity::HOURLY)
            .await
            .unwrap();
        store.record("web1", now - TimeDelta::hours(2), true).await.unwrap();
        store.record("web1", now, false).await.unwrap();
        store.close().await.unwrap();
    }

    let store = SqliteSampleStore::new(&db_path, BucketGranularity::HOURLY)
        .await
        .unwrap();
    let statuses: Vec<_> = store
        .window("web1", 3, now)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.status)
        .collect();

    assert_eq!(
        statuses,
        vec![BucketStatus::Up, BucketStatus::Unknown, BucketStatus::Down]
    );
}

#[tokio::test]
async fn test_uptime_cycle_writes_and_evicts() {
    let dir = tempdir().unwrap();
    let store = Arc::new(
        SqliteSampleStore::new(dir.path().join("uptime_history.db"), BucketGranularity::HOURLY)
            .await
            .unwrap(),
    );

    // far older than the retention below
    store
        .record("web1", Utc::now() - TimeDelta::days(30), true)
        .await
        .unwrap();

    let hosts: Arc<[Host]> = vec![remote_host("web1", "10.0.0.5")].into();
    let actor = UptimeCycleActor::new(
        hosts,
        Arc::new(ScriptedProber::default().online("web1")),
        store.clone(),
        CycleSchedule::new(Duration::from_secs(60)),
    )
    .retention(TimeDelta::days(7));

    let report = actor.run_cycle().await;
    assert_eq!(report.up(), 1);
    assert_eq!(store.sample_count().await.unwrap(), 1);

    let window = store.window("web1", 1, report.started_at).await.unwrap();
    assert_eq!(window[0].status, BucketStatus::Up);
}
