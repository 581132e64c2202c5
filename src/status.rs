//! Current status of every host
//!
//! The board holds the latest outcome per host. It is written by the metrics
//! cycle and read by the reconciler, the bot commands and the API.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Snapshot;
use crate::probe::{FailureKind, ProbeFailure};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum HostStatus {
    Online(Snapshot),
    Unreachable {
        kind: FailureKind,
        reason: String,
        /// Last snapshot taken while the host was still reachable
        last_known: Option<Snapshot>,
        /// Start of the current outage
        since: DateTime<Utc>,
    },
}

impl HostStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, HostStatus::Online(_))
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            HostStatus::Online(snapshot) => Some(snapshot),
            HostStatus::Unreachable { last_known, .. } => last_known.as_ref(),
        }
    }
}

/// Shared map of hostname to latest status
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    statuses: Arc<RwLock<HashMap<String, HostStatus>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_success(&self, hostname: &str, snapshot: Snapshot) -> HostStatus {
        let status = HostStatus::Online(snapshot);
        self.statuses
            .write()
            .await
            .insert(hostname.to_string(), status.clone());
        status
    }

    /// Mark `hostname` unreachable, keeping the last snapshot and the start of
    /// an ongoing outage
    pub async fn record_failure(
        &self,
        hostname: &str,
        failure: &ProbeFailure,
        now: DateTime<Utc>,
    ) -> HostStatus {
        let mut statuses = self.statuses.write().await;

        let (last_known, since) = match statuses.remove(hostname) {
            Some(HostStatus::Online(snapshot)) => (Some(snapshot), now),
            Some(HostStatus::Unreachable {
                last_known, since, ..
            }) => (last_known, since),
            None => (None, now),
        };

        let status = HostStatus::Unreachable {
            kind: failure.kind,
            reason: failure.reason.clone(),
            last_known,
            since,
        };
        statuses.insert(hostname.to_string(), status.clone());
        status
    }

    pub async fn get(&self, hostname: &str) -> Option<HostStatus> {
        self.statuses.read().await.get(hostname).cloned()
    }

    pub async fn all(&self) -> HashMap<String, HostStatus> {
        self.statuses.read().await.clone()
    }
}
