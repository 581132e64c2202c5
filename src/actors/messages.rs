//! Message types for the cycle actors

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::probe::{FailureKind, ProbeFailure};

/// Commands accepted by both cycle actors
#[derive(Debug)]
pub enum CycleCommand {
    /// Run one cycle immediately, outside the ticker
    RunNow {
        respond_to: oneshot::Sender<CycleReport>,
    },

    /// Stop after the in-flight cycle, if any
    Shutdown,
}

/// Summary of one cycle; every host has either succeeded or failed
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub hosts: usize,
    pub failures: Vec<ProbeFailure>,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn up(&self) -> usize {
        self.hosts.saturating_sub(self.failures.len())
    }

    pub fn timed_out(&self) -> impl Iterator<Item = &ProbeFailure> {
        self.failures
            .iter()
            .filter(|failure| failure.kind == FailureKind::Timeout)
    }
}
