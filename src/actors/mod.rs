//! Poll scheduling
//!
//! Two independent actors, each an async task owning its own ticker:
//!
//! ```text
//!  ┌──────────────────┐  probe()          ┌─────────────┐   update()   ┌────────────┐
//!  │ MetricsCycleActor│ ───────────────▶  │ StatusBoard │ ───────────▶ │ Reconciler │
//!  └──────────────────┘                   └─────────────┘              └────────────┘
//!  ┌──────────────────┐  check_online()   ┌─────────────┐
//!  │ UptimeCycleActor │ ───────────────▶  │ SampleStore │  record_batch + evict
//!  └──────────────────┘                   └─────────────┘
//! ```
//!
//! A cycle fans out over all hosts with bounded parallelism, optionally
//! staggering host `i` by `i * spread`. Each host's check is bounded by the
//! schedule's host timeout, so every host yields a result: a check that does
//! not answer in time counts as a timeout failure. Each actor accepts
//! [`CycleCommand`]s through a [`CycleHandle`].

use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use crate::config::Host;
use crate::probe::{FailureKind, ProbeFailure};

pub mod messages;
pub mod metrics;
pub mod uptime;

pub use messages::{CycleCommand, CycleReport};
pub use metrics::MetricsCycleActor;
pub use uptime::UptimeCycleActor;

/// How a cycle is paced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSchedule {
    pub interval: Duration,
    /// Delay between the start of consecutive host checks
    pub spread: Duration,
    pub max_concurrency: usize,
    /// Upper bound for a single host's check
    pub host_timeout: Duration,
}

impl CycleSchedule {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            spread: Duration::ZERO,
            max_concurrency: 8,
            host_timeout: (interval / 2).max(Duration::from_secs(1)),
        }
    }

    pub fn spread(mut self, spread: Duration) -> Self {
        self.spread = spread;
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn host_timeout(mut self, host_timeout: Duration) -> Self {
        self.host_timeout = host_timeout.max(Duration::from_millis(1));
        self
    }

    /// Spread for `hosts` hosts, shrunk so the last host still starts early
    /// enough to finish its check inside the interval
    pub fn effective_spread(&self, hosts: usize) -> Duration {
        if hosts < 2 {
            return self.spread;
        }
        let budget = self.interval.saturating_sub(self.host_timeout);
        self.spread.min(budget / (hosts as u32 - 1))
    }
}

/// Await `work`, turning an overrun of `limit` into a timeout failure
pub(crate) async fn bounded<T, F>(limit: Duration, hostname: &str, work: F) -> Result<T, ProbeFailure>
where
    F: Future<Output = Result<T, ProbeFailure>>,
{
    match tokio::time::timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => Err(ProbeFailure::new(
            hostname,
            FailureKind::Timeout,
            format!("no answer within {}s", limit.as_secs_f32()),
        )),
    }
}

/// Run `per_host` for every host under `schedule`, in completion order
///
/// Nothing here cancels a host's work: `per_host` is expected to bound itself
/// (see [`bounded`]), so the result always has one entry per host.
pub(crate) async fn fan_out<R, F>(hosts: &[Host], schedule: CycleSchedule, per_host: F) -> Vec<R>
where
    F: Fn(Host) -> BoxFuture<'static, R>,
    R: Send + 'static,
{
    let spread = schedule.effective_spread(hosts.len());
    if spread < schedule.spread {
        debug!(
            "spread of {}s shrunk to {}s to fit {} hosts into the interval",
            schedule.spread.as_secs_f32(),
            spread.as_secs_f32(),
            hosts.len()
        );
    }

    let start = Instant::now();
    let hosts: Vec<Host> = hosts.to_vec();
    let count = hosts.len();

    let results: Vec<R> = stream::iter(hosts.into_iter().enumerate())
        .map(|(index, host)| {
            let work = per_host(host);
            let offset = spread * index as u32;
            async move {
                // relative to the cycle start, so queueing does not add up
                sleep_until(start + offset).await;
                work.await
            }
        })
        .buffer_unordered(schedule.max_concurrency.max(1))
        .collect()
        .await;

    let elapsed = start.elapsed();
    if elapsed > schedule.interval {
        warn!(
            "cycle over {count} hosts took {}s, longer than its {}s interval",
            elapsed.as_secs(),
            schedule.interval.as_secs()
        );
    }
    results
}

/// Control handle for a running cycle actor
pub struct CycleHandle {
    name: &'static str,
    sender: mpsc::Sender<CycleCommand>,
    task: JoinHandle<()>,
}

impl CycleHandle {
    pub(crate) fn new(
        name: &'static str,
        sender: mpsc::Sender<CycleCommand>,
        task: JoinHandle<()>,
    ) -> Self {
        Self { name, sender, task }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run a cycle now and wait for its report
    pub async fn run_now(&self) -> Result<CycleReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CycleCommand::RunNow { respond_to: tx })
            .await
            .context("failed to send RunNow command")?;

        rx.await.context("actor dropped the RunNow response")
    }

    /// Ask the actor to stop; abort it if the in-flight cycle outlives `grace`
    pub async fn shutdown(mut self, grace: Duration) {
        // A full channel means the actor is busy; the abort below covers it.
        let _ = self.sender.try_send(CycleCommand::Shutdown);

        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(_) => debug!("{} stopped", self.name),
            Err(_) => {
                warn!("{} did not stop within {}s, aborting", self.name, grace.as_secs());
                self.task.abort();
            }
        }
    }
}
