//! MetricsCycleActor - probes every host and refreshes its status message
//!
//! ```text
//! Timer tick → probe all hosts (bounded) → StatusBoard → Reconciler → Discord
//!     ↑
//!     └─── Commands (RunNow, Shutdown)
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{Instrument, debug, error, info, instrument, warn};

use super::messages::{CycleCommand, CycleReport};
use super::{CycleHandle, CycleSchedule, bounded, fan_out};
use crate::config::Host;
use crate::presentation::Reconciler;
use crate::probe::{ProbeFailure, Prober};
use crate::status::StatusBoard;

pub struct MetricsCycleActor {
    hosts: Arc<[Host]>,
    schedule: CycleSchedule,
    refresher: Refresher,
}

/// Everything one host refresh needs, cloned into each host's future
#[derive(Clone)]
struct Refresher {
    prober: Arc<dyn Prober>,
    board: StatusBoard,
    reconciler: Arc<Reconciler>,
    timeout: Duration,
    local_failures: Option<mpsc::UnboundedSender<ProbeFailure>>,
}

impl MetricsCycleActor {
    pub fn new(
        hosts: Arc<[Host]>,
        prober: Arc<dyn Prober>,
        board: StatusBoard,
        reconciler: Arc<Reconciler>,
        schedule: CycleSchedule,
    ) -> Self {
        Self {
            hosts,
            schedule,
            refresher: Refresher {
                prober,
                board,
                reconciler,
                timeout: schedule.host_timeout,
                local_failures: None,
            },
        }
    }

    /// Forward failures to read the local machine to `tx`
    pub fn escalate_local_failures(mut self, tx: mpsc::UnboundedSender<ProbeFailure>) -> Self {
        self.refresher.local_failures = Some(tx);
        self
    }

    pub fn spawn(self) -> CycleHandle {
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(self.run(rx));
        CycleHandle::new("metrics cycle", tx, task)
    }

    #[instrument(skip_all, name = "metrics_cycle")]
    async fn run(self, mut command_rx: mpsc::Receiver<CycleCommand>) {
        info!(
            "starting metrics cycle for {} hosts every {}s",
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

        debug!("metrics cycle stopped");
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let started_at = Utc::now();
        let clock = Instant::now();

        let refresher = self.refresher.clone();
        let results = fan_out(&self.hosts, self.schedule, move |host| {
            refresher.clone().refresh(host).boxed()
        })
        .await;

        let report = CycleReport {
            started_at,
            hosts: self.hosts.len(),
            failures: results.into_iter().flatten().collect(),
            elapsed: clock.elapsed(),
        };

        info!(
            "metrics cycle done: {} up, {} down ({} timed out)",
            report.up(),
            report.failures.len(),
            report.timed_out().count()
        );
        report
    }
}

impl Refresher {
    /// Probe one host, publish the outcome, and return the failure if any
    async fn refresh(self, host: Host) -> Option<ProbeFailure> {
        let result = bounded(self.timeout, &host.name, self.prober.probe(&host)).await;
        let (status, failure) = match result {
            Ok(snapshot) => (self.board.record_success(&host.name, snapshot).await, None),
            Err(failure) => {
                warn!("{failure}");
                if failure.is_local() {
                    self.escalate(&failure);
                }
                let status = self
                    .board
                    .record_failure(&host.name, &failure, Utc::now())
                    .await;
                (status, Some(failure))
            }
        };

        // a dropped cycle must not cancel a create in flight
        let reconciler = self.reconciler;
        let update = tokio::spawn(
            async move {
                if let Err(e) = reconciler.update(&host, &status, Utc::now()).await {
                    warn!("status message for {} not updated: {e}", host.name);
                }
            }
            .in_current_span(),
        );
        if let Err(e) = update.await {
            error!("status message update task failed: {e}");
        }

        failure
    }

    fn escalate(&self, failure: &ProbeFailure) {
        match &self.local_failures {
            Some(tx) => {
                let _ = tx.send(failure.clone());
            }
            None => error!("local metrics unavailable: {failure}"),
        }
    }
}
