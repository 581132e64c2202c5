//! UptimeCycleActor - records one up/down sample per host per bucket
//!
//! Samples are only written after every check of the cycle has come back, in a
//! single batch, so a cycle that is aborted midway leaves nothing behind. A
//! check that outlives the host timeout is recorded as down. Eviction of
//! expired samples follows each write.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};

use super::messages::{CycleCommand, CycleReport};
use super::{CycleHandle, CycleSchedule, bounded, fan_out};
use crate::config::Host;
use crate::probe::{ProbeFailure, Prober};
use crate::storage::{BucketGranularity, Sample, SampleStore};

pub struct UptimeCycleActor {
    hosts: Arc<[Host]>,
    prober: Arc<dyn Prober>,
    store: Arc<dyn SampleStore>,
    granularity: BucketGranularity,
    retention: TimeDelta,
    schedule: CycleSchedule,
}

impl UptimeCycleActor {
    pub fn new(
        hosts: Arc<[Host]>,
        prober: Arc<dyn Prober>,
        store: Arc<dyn SampleStore>,
        schedule: CycleSchedule,
    ) -> Self {
        Self {
            hosts,
            prober,
            store,
            granularity: BucketGranularity::HOURLY,
            retention: TimeDelta::days(7),
            schedule,
        }
    }

    pub fn granularity(mut self, granularity: BucketGranularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn retention(mut self, retention: TimeDelta) -> Self {
        self.retention = retention;
        self
    }

    pub fn spawn(self) -> CycleHandle {
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(self.run(rx));
        CycleHandle::new("uptime cycle", tx, task)
    }

    #[instrument(skip_all, name = "uptime_cycle")]
    async fn run(self, mut command_rx: mpsc::Receiver<CycleCommand>) {
        info!(
            "starting uptime cycle for {} hosts every {}s",
            self.hosts.len(),
            self.schedule.interval.as_secs()
        );

        let mut ticker = interval(self.schedule.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }

                Some(cmd) = command_rx.recv() => {
                    match cmd {
                        CycleCommand::RunNow { respond_to } => {
                            debug!("received RunNow command");
                            let report = self.run_cycle().await;
                            let _ = respond_to.send(report);
                        }
                        CycleCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("uptime cycle stopped");
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        let bucket = self.granularity.truncate(started_at);

        let prober = self.prober.clone();
        let timeout = self.schedule.host_timeout;
        let results = fan_out(&self.hosts, self.schedule, move |host| {
            let prober = prober.clone();
            async move {
                let result = bounded(timeout, &host.name, prober.check_online(&host)).await;
                debug!(
                    "uptime check: {} - {}",
                    host.name,
                    if result.is_ok() { "online" } else { "offline" }
                );
                (host.name, result)
            }
            .boxed()
        })
        .await;

        let mut samples = Vec::with_capacity(results.len());
        let mut failures: Vec<ProbeFailure> = Vec::new();
        for (hostname, result) in results {
            samples.push(Sample {
                hostname,
                bucket,
                up: result.is_ok(),
            });
            if let Err(failure) = result {
                failures.push(failure);
            }
        }

        if let Err(e) = self.store.record_batch(samples).await {
            error!("failed to record uptime samples: {e}");
        }

        match self
            .store
            .evict_older_than(started_at - self.retention)
            .await
        {
            Ok(0) => {}
            Ok(deleted) => info!("cleaned up {deleted} old uptime records"),
            Err(e) => error!("failed to evict old uptime records: {e}"),
        }

        let report = CycleReport {
            started_at,
            hosts: self.hosts.len(),
            failures,
            elapsed: clock.elapsed(),
        };

        info!(
            "uptime cycle done: {} up, {} down",
            report.up(),
            report.failures.len()
        );
        report
    }
}
