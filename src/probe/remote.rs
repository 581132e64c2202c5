//! Remote command execution
//!
//! The [`RemoteTransport`] trait is the seam to whatever actually reaches a
//! remote host; [`SessionPool`] keeps at most one open session per host and
//! serializes commands on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use super::{FailureKind, ProbeFailure};
use crate::config::RemoteAccess;

/// The fixed set of information commands run on a remote host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricCommand {
    CpuModel,
    /// Two `/proc/stat` samples one second apart
    CpuStat,
    Memory,
    Disk,
    ProcessCount,
    LoadAverage,
    /// No-op used as a reachability check
    Ping,
}

impl MetricCommand {
    /// Everything needed for a snapshot, in the order `parse_snapshot` expects
    pub const ALL: [MetricCommand; 6] = [
        MetricCommand::CpuModel,
        MetricCommand::CpuStat,
        MetricCommand::Memory,
        MetricCommand::Disk,
        MetricCommand::ProcessCount,
        MetricCommand::LoadAverage,
    ];

    /// Shell command line executed on the remote host
    pub fn command_line(&self) -> &'static str {
        match self {
            MetricCommand::CpuModel => {
                "grep -i -E '^(model name|hardware|processor|cpu model)' /proc/cpuinfo | head -n 8"
            }
            MetricCommand::CpuStat => "head -n1 /proc/stat; sleep 1; head -n1 /proc/stat",
            MetricCommand::Memory => "LC_ALL=C free -b",
            MetricCommand::Disk => "LC_ALL=C df -P -B1 /",
            MetricCommand::ProcessCount => "ps -e -o pid= | wc -l",
            MetricCommand::LoadAverage => "cat /proc/loadavg",
            MetricCommand::Ping => "true",
        }
    }

    pub fn metric(&self) -> &'static str {
        match self {
            MetricCommand::CpuModel => "cpu model",
            MetricCommand::CpuStat => "cpu usage",
            MetricCommand::Memory => "memory",
            MetricCommand::Disk => "disk",
            MetricCommand::ProcessCount => "process count",
            MetricCommand::LoadAverage => "load average",
            MetricCommand::Ping => "reachability",
        }
    }
}

/// Failure reported by a transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: FailureKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn into_failure(self, hostname: &str) -> ProbeFailure {
        ProbeFailure::new(hostname, self.kind, self.message)
    }
}

#[async_trait]
pub trait RemoteTransport: Send + Sync + 'static {
    type Session: Send + Sync + 'static;

    /// Establish an authenticated session
    async fn open(&self, access: &RemoteAccess) -> Result<Self::Session, TransportError>;

    /// Run every command on `session` and return their stdout, in order
    async fn execute(
        &self,
        session: &Self::Session,
        commands: &[MetricCommand],
    ) -> Result<Vec<String>, TransportError>;

    /// Tear the session down; errors are not interesting at this point
    async fn close(&self, session: Self::Session);
}

type Slot<S> = Arc<Mutex<Option<S>>>;

/// One reusable session per host
pub struct SessionPool<T: RemoteTransport> {
    transport: T,
    slots: StdMutex<HashMap<String, Slot<T::Session>>>,
}

impl<T: RemoteTransport> SessionPool<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            slots: StdMutex::new(HashMap::new()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn slot(&self, hostname: &str) -> Slot<T::Session> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(hostname.to_string()).or_default().clone()
    }

    /// Run `commands` on the session of `hostname`, opening it if needed
    ///
    /// A failing session is closed and forgotten, so the next call reconnects.
    pub async fn run(
        &self,
        hostname: &str,
        access: &RemoteAccess,
        commands: &[MetricCommand],
    ) -> Result<Vec<String>, TransportError> {
        let slot = self.slot(hostname);
        let mut session = slot.lock().await;

        let current = match session.take() {
            Some(current) => current,
            None => {
                debug!("opening session to {hostname}");
                self.transport.open(access).await?
            }
        };

        match self.transport.execute(&current, commands).await {
            Ok(outputs) => {
                trace!("{} commands completed on {hostname}", commands.len());
                *session = Some(current);
                Ok(outputs)
            }
            Err(e) => {
                warn!("dropping session to {hostname}: {e}");
                self.transport.close(current).await;
                Err(e)
            }
        }
    }

    pub async fn close_all(&self) {
        let slots: Vec<(String, Slot<T::Session>)> = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.drain().collect()
        };

        for (hostname, slot) in slots {
            if let Some(session) = slot.lock().await.take() {
                debug!("closing session to {hostname}");
                self.transport.close(session).await;
            }
        }
    }
}
