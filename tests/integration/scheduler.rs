//! Integration tests for the metrics and uptime cycles
//!
//! These tests verify that:
//! - A metrics cycle publishes every host to the board and the surface
//! - A host coming back edits its existing unit instead of creating one
//! - Uptime cycles write one sample per host
//! - A host that does not answer in time is recorded as down
//! - A wide spread or slow failing hosts never leave a host out
//! - A slow create is not repeated by later cycles
//! - Local read failures are escalated

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use hostwatch::{
    actors::{CycleSchedule, MetricsCycleActor, UptimeCycleActor},
    config::Host,
    presentation::Reconciler,
    probe::FailureKind,
    status::StatusBoard,
    storage::{BucketGranularity, BucketStatus, SampleStore, memory::MemorySampleStore},
};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

use super::helpers::{RecordingSink, ScriptedProber, remote_host};

fn hosts() -> Arc<[Host]> {
    vec![remote_host("web1", "10.0.0.5"), remote_host("db1", "10.0.0.6")].into()
}

fn store() -> Arc<MemorySampleStore> {
    Arc::new(MemorySampleStore::new(BucketGranularity::HOURLY))
}

#[tokio::test]
async fn test_metrics_cycle_publishes_every_host() {
    let prober = Arc::new(
        ScriptedProber::default()
            .online("web1")
            .offline("db1", FailureKind::Auth),
    );
    let sink = Arc::new(RecordingSink::default());
    let board = StatusBoard::new();
    let reconciler = Arc::new(Reconciler::new(
        sink.clone(),
        store(),
        BucketGranularity::HOURLY,
    ));

    let actor = MetricsCycleActor::new(
        hosts(),
        prober.clone(),
        board.clone(),
        reconciler,
        CycleSchedule::new(Duration::from_secs(60)),
    );

    let report = actor.run_cycle().await;
    assert_eq!(report.hosts, 2);
    assert_eq!(report.up(), 1);
    assert_eq!(report.failures[0].hostname, "db1");
    assert_eq!(report.timed_out().count(), 0);

    assert!(board.get("web1").await.unwrap().is_online());
    assert!(!board.get("db1").await.unwrap().is_online());
    assert_eq!(sink.creates.load(Ordering::SeqCst), 2);
    assert!(sink.content_of("🟢 web1").is_some());
    assert!(sink.content_of("🔴 db1").is_some());

    // db1 recovers: its unit is edited in place
    prober.set_online("db1");
    actor.run_cycle().await;

    assert_eq!(sink.creates.load(Ordering::SeqCst), 2);
    assert!(sink.edits.load(Ordering::SeqCst) >= 1);
    assert!(sink.content_of("🟢 db1").is_some());
    assert!(sink.content_of("🔴 db1").is_none());
}

#[tokio::test]
async fn test_uptime_cycle_records_samples() {
    let prober = Arc::new(
        ScriptedProber::default()
            .online("web1")
            .offline("db1", FailureKind::Timeout),
    );
    let store = store();

    let actor = UptimeCycleActor::new(
        hosts(),
        prober.clone(),
        store.clone(),
        CycleSchedule::new(Duration::from_secs(60)),
    );

    let report = actor.run_cycle().await;
    assert_eq!(report.up(), 1);
    assert_eq!(prober.checks.load(Ordering::SeqCst), 2);
    assert_eq!(prober.probes.load(Ordering::SeqCst), 0);

    let web1 = store.window("web1", 2, report.started_at).await.unwrap();
    let db1 = store.window("db1", 2, report.started_at).await.unwrap();
    assert_eq!(web1[0].status, BucketStatus::Unknown);
    assert_eq!(web1[1].status, BucketStatus::Up);
    assert_eq!(db1[1].status, BucketStatus::Down);

    // a second check inside the same bucket replaces the first
    prober.set_online("db1");
    actor.run_cycle().await;
    let db1 = store.window("db1", 1, report.started_at).await.unwrap();
    assert_eq!(db1[0].status, BucketStatus::Up);
    assert_eq!(store.sample_count().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_host_is_recorded_down() {
    let prober = Arc::new(
        ScriptedProber::default()
            .online("web1")
            .online("db1")
            .slow("db1", Duration::from_secs(30)),
    );
    let store = store();

    let actor = UptimeCycleActor::new(
        hosts(),
        prober,
        store.clone(),
        CycleSchedule::new(Duration::from_secs(10)),
    );

    let report = actor.run_cycle().await;
    assert_eq!(report.up(), 1);
    let timed_out: Vec<_> = report.timed_out().map(|f| f.hostname.as_str()).collect();
    assert_eq!(timed_out, vec!["db1"]);
    assert!(report.elapsed <= Duration::from_secs(10));

    let db1 = store.window("db1", 1, report.started_at).await.unwrap();
    assert_eq!(db1[0].status, BucketStatus::Down);
    assert_eq!(store.sample_count().await, 2);
}

fn metrics_actor(
    hosts: Arc<[Host]>,
    prober: Arc<ScriptedProber>,
    board: StatusBoard,
    sink: Arc<RecordingSink>,
    schedule: CycleSchedule,
) -> MetricsCycleActor {
    let reconciler = Arc::new(Reconciler::new(sink, store(), BucketGranularity::HOURLY));
    MetricsCycleActor::new(hosts, prober, board, reconciler, schedule)
}

#[tokio::test(start_paused = true)]
async fn test_wide_spread_reaches_every_host() {
    let hosts: Arc<[Host]> = vec![
        remote_host("web1", "10.0.0.5"),
        remote_host("web2", "10.0.0.7"),
        remote_host("db1", "10.0.0.6"),
    ]
    .into();
    let prober = Arc::new(ScriptedProber::default().online("web1").online("web2").online("db1"));
    let sink = Arc::new(RecordingSink::default());
    let board = StatusBoard::new();

    let actor = metrics_actor(
        hosts,
        prober,
        board.clone(),
        sink.clone(),
        CycleSchedule::new(Duration::from_secs(60)).spread(Duration::from_secs(40)),
    );

    let report = actor.run_cycle().await;
    assert_eq!(report.up(), 3);
    assert!(report.elapsed <= Duration::from_secs(60));
    for name in ["web1", "web2", "db1"] {
        assert!(board.get(name).await.unwrap().is_online(), "{name} missing");
    }
    assert_eq!(sink.creates.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_slow_failing_hosts_do_not_starve_healthy_host() {
    let hosts: Arc<[Host]> = vec![
        remote_host("dead1", "10.0.0.8"),
        remote_host("dead2", "10.0.0.9"),
        remote_host("web1", "10.0.0.5"),
    ]
    .into();
    let prober = Arc::new(
        ScriptedProber::default()
            .offline("dead1", FailureKind::Connect)
            .slow("dead1", Duration::from_secs(30))
            .offline("dead2", FailureKind::Connect)
            .slow("dead2", Duration::from_secs(30))
            .online("web1"),
    );
    let sink = Arc::new(RecordingSink::default());
    let board = StatusBoard::new();

    let actor = metrics_actor(
        hosts,
        prober,
        board.clone(),
        sink.clone(),
        CycleSchedule::new(Duration::from_secs(60)).max_concurrency(1),
    );

    let report = actor.run_cycle().await;
    assert_eq!(report.hosts, 3);
    assert_eq!(report.up(), 1);
    assert!(board.get("web1").await.unwrap().is_online());
    assert!(!board.get("dead1").await.unwrap().is_online());
    assert!(!board.get("dead2").await.unwrap().is_online());
    assert!(sink.content_of("🟢 web1").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_slow_create_is_not_repeated() {
    let hosts: Arc<[Host]> = vec![remote_host("web1", "10.0.0.5")].into();
    let prober = Arc::new(
        ScriptedProber::default()
            .online("web1")
            .slow("web1", Duration::from_secs(50)),
    );
    let sink = Arc::new(RecordingSink::default().slow_creates(Duration::from_secs(20)));

    let actor = metrics_actor(
        hosts,
        prober,
        StatusBoard::new(),
        sink.clone(),
        CycleSchedule::new(Duration::from_secs(60)).host_timeout(Duration::from_secs(55)),
    );

    // each cycle is given up on at the interval, the first while its create
    // is still waiting for an answer
    for _ in 0..3 {
        let _ = tokio::time::timeout(Duration::from_secs(60), actor.run_cycle()).await;
    }
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(sink.creates.load(Ordering::SeqCst), 1);
    assert_eq!(sink.units.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_local_failure_is_escalated() {
    let prober = Arc::new(ScriptedProber::default().offline("hub", FailureKind::Local));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let actor = MetricsCycleActor::new(
        vec![Host::local("hub")].into(),
        prober,
        StatusBoard::new(),
        Arc::new(Reconciler::new(
            Arc::new(RecordingSink::default()),
            store(),
            BucketGranularity::HOURLY,
        )),
        CycleSchedule::new(Duration::from_secs(60)),
    )
    .escalate_local_failures(tx);

    actor.run_cycle().await;

    let failure = rx.try_recv().unwrap();
    assert_eq!(failure.hostname, "hub");
    assert_eq!(failure.kind, FailureKind::Local);
}

#[tokio::test]
async fn test_handle_run_now_and_shutdown() {
    let prober = Arc::new(ScriptedProber::default().online("web1").online("db1"));

    let handle = UptimeCycleActor::new(
        hosts(),
        prober.clone(),
        store(),
        CycleSchedule::new(Duration::from_secs(3600)),
    )
    .spawn();

    let report = handle.run_now().await.unwrap();
    assert_eq!(report.up(), 2);
    assert!(prober.checks.load(Ordering::SeqCst) >= 2);

    handle.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_metrics_handle_runs_on_demand() {
    let prober = Arc::new(ScriptedProber::default().online("web1").online("db1"));
    let sink = Arc::new(RecordingSink::default());
    let board = StatusBoard::new();

    let handle = metrics_actor(
        hosts(),
        prober,
        board.clone(),
        sink.clone(),
        CycleSchedule::new(Duration::from_secs(3600)),
    )
    .spawn();

    let report = handle.run_now().await.unwrap();
    assert_eq!(report.up(), 2);
    assert!(board.get("db1").await.unwrap().is_online());
    assert_eq!(sink.creates.load(Ordering::SeqCst), 2);

    handle.shutdown(Duration::from_secs(5)).await;
}
