//! Host probing
//!
//! A [`Prober`] turns a [`Host`] into either a fresh [`Snapshot`] or a
//! [`ProbeFailure`]. The concrete [`ProbeExecutor`] dispatches on the host's
//! access mode:
//!
//! ```text
//! Host ─▶ Probe::Local  ─▶ LocalReader (sysinfo)             ─┐
//!     └─▶ Probe::Remote ─▶ SessionPool ─▶ RemoteTransport     ├─▶ Snapshot | ProbeFailure
//!                                     └─▶ parse::parse_snapshot ─┘
//! ```
//!
//! Every probe runs under a mandatory timeout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, instrument, trace};

use crate::Snapshot;
use crate::config::{Host, HostAccess, RemoteAccess};

pub mod local;
pub mod parse;
pub mod remote;
pub mod ssh;

pub use local::{LocalReader, SysinfoReader};
pub use remote::{MetricCommand, RemoteTransport, SessionPool, TransportError};
pub use ssh::SshTransport;

/// Why a probe did not produce a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Connect,
    Auth,
    Timeout,
    Command,
    Parse,
    /// Reading the monitoring machine itself failed
    Local,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            FailureKind::Connect => "connect",
            FailureKind::Auth => "auth",
            FailureKind::Timeout => "timeout",
            FailureKind::Command => "command",
            FailureKind::Parse => "parse",
            FailureKind::Local => "local",
        };
        f.write_str(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("probe of {hostname} failed ({kind}): {reason}")]
pub struct ProbeFailure {
    pub hostname: String,
    pub kind: FailureKind,
    pub reason: String,
}

impl ProbeFailure {
    pub fn new(hostname: impl Into<String>, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            kind,
            reason: reason.into(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.kind == FailureKind::Local
    }
}

/// What a single probe has to do for one host
#[derive(Debug, Clone, Copy)]
pub enum Probe<'a> {
    Local,
    Remote(&'a RemoteAccess),
}

impl<'a> From<&'a Host> for Probe<'a> {
    fn from(host: &'a Host) -> Self {
        match &host.access {
            HostAccess::Local => Probe::Local,
            HostAccess::Remote(access) => Probe::Remote(access),
        }
    }
}

#[async_trait]
pub trait Prober: Send + Sync {
    /// Collect a full snapshot of `host`
    async fn probe(&self, host: &Host) -> Result<Snapshot, ProbeFailure>;

    /// Lighter reachability check used for uptime samples
    async fn check_online(&self, host: &Host) -> Result<(), ProbeFailure> {
        self.probe(host).await.map(|_| ())
    }

    /// Release pooled connections
    async fn shutdown(&self) {}
}

/// Dispatches probes to the local reader or the remote session pool
pub struct ProbeExecutor<T: RemoteTransport> {
    local: Arc<dyn LocalReader>,
    sessions: SessionPool<T>,
    timeout: Duration,
}

impl<T: RemoteTransport> ProbeExecutor<T> {
    pub fn new(local: Arc<dyn LocalReader>, transport: T, timeout: Duration) -> Self {
        Self {
            local,
            sessions: SessionPool::new(transport),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<F, R>(&self, hostname: &str, work: F) -> Result<R, ProbeFailure>
    where
        F: Future<Output = Result<R, ProbeFailure>>,
    {
        match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(ProbeFailure::new(
                hostname,
                FailureKind::Timeout,
                format!("no answer within {}s", self.timeout.as_secs_f32()),
            )),
        }
    }

    async fn read_local(&self, hostname: &str) -> Result<Snapshot, ProbeFailure> {
        self.local
            .read_local_snapshot()
            .await
            .map_err(|e| ProbeFailure::new(hostname, FailureKind::Local, format!("{e:#}")))
    }

    async fn read_remote(
        &self,
        hostname: &str,
        access: &RemoteAccess,
    ) -> Result<Snapshot, ProbeFailure> {
        let outputs = self
            .sessions
            .run(hostname, access, &MetricCommand::ALL)
            .await
            .map_err(|e| e.into_failure(hostname))?;

        trace!("received {} command outputs", outputs.len());

        parse::parse_snapshot(&outputs, Utc::now())
            .map_err(|e| ProbeFailure::new(hostname, FailureKind::Parse, e.to_string()))
    }
}

#[async_trait]
impl<T: RemoteTransport> Prober for ProbeExecutor<T> {
    #[instrument(skip_all, fields(host = %host.name))]
    async fn probe(&self, host: &Host) -> Result<Snapshot, ProbeFailure> {
        let result = match Probe::from(host) {
            Probe::Local => self.bounded(&host.name, self.read_local(&host.name)).await,
            Probe::Remote(access) => {
                self.bounded(&host.name, self.read_remote(&host.name, access))
                    .await
            }
        };

        if let Err(failure) = &result {
            debug!("{failure}");
        }
        result
    }

    #[instrument(skip_all, fields(host = %host.name))]
    async fn check_online(&self, host: &Host) -> Result<(), ProbeFailure> {
        match Probe::from(host) {
            Probe::Local => Ok(()),
            Probe::Remote(access) => {
                let check = async {
                    self.sessions
                        .run(&host.name, access, &[MetricCommand::Ping])
                        .await
                        .map(|_| ())
                        .map_err(|e| e.into_failure(&host.name))
                };
                self.bounded(&host.name, check).await
            }
        }
    }

    async fn shutdown(&self) {
        self.sessions.close_all().await;
    }
}
