//! Helper functions for integration tests

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hostwatch::{
    Snapshot,
    config::{Host, HostAccess, RemoteAccess, RemoteAuth},
    discord::Embed,
    presentation::{SinkError, SurfaceSink, UnitId},
    probe::{FailureKind, ProbeFailure, Prober},
};

pub fn remote_host(name: &str, ip: &str) -> Host {
    Host {
        name: name.to_string(),
        address: Some(ip.to_string()),
        access: HostAccess::Remote(RemoteAccess {
            address: ip.to_string(),
            port: 22,
            user: "monitor".to_string(),
            auth: RemoteAuth::KeyPath(PathBuf::from("/home/monitor/.ssh/id_ed25519")),
        }),
    }
}

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap()
}

pub fn snapshot(captured_at: DateTime<Utc>) -> Snapshot {
    Snapshot {
        cpu_model: "AMD EPYC 7763 64-Core Processor".to_string(),
        cpu_usage: 0.25,
        memory_total: 16 * 1024 * 1024 * 1024,
        memory_used: 4 * 1024 * 1024 * 1024,
        disk_total: 100_000_000_000,
        disk_used: 40_000_000_000,
        process_count: 187,
        load_average: 0.42,
        captured_at,
    }
}

/// Prober answering from a per-host script; unknown hosts fail to connect
#[derive(Default)]
pub struct ScriptedProber {
    outcomes: Mutex<HashMap<String, Result<Snapshot, FailureKind>>>,
    delays: Mutex<HashMap<String, Duration>>,
    pub probes: AtomicUsize,
    pub checks: AtomicUsize,
}

impl ScriptedProber {
    pub fn online(self, hostname: &str) -> Self {
        self.set_online(hostname);
        self
    }

    pub fn offline(self, hostname: &str, kind: FailureKind) -> Self {
        self.set_offline(hostname, kind);
        self
    }

    pub fn slow(self, hostname: &str, delay: Duration) -> Self {
        self.delays
            .lock()
            .unwrap()
            .insert(hostname.to_string(), delay);
        self
    }

    pub fn set_online(&self, hostname: &str) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(hostname.to_string(), Ok(snapshot(Utc::now())));
    }

    pub fn set_offline(&self, hostname: &str, kind: FailureKind) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(hostname.to_string(), Err(kind));
    }

    async fn outcome(&self, host: &Host) -> Result<Snapshot, ProbeFailure> {
        let delay = self.delays.lock().unwrap().get(&host.name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self.outcomes.lock().unwrap().get(&host.name).cloned();
        match outcome {
            Some(Ok(snapshot)) => Ok(snapshot),
            Some(Err(kind)) => Err(ProbeFailure::new(&host.name, kind, "scripted failure")),
            None => Err(ProbeFailure::new(
                &host.name,
                FailureKind::Connect,
                "connection refused",
            )),
        }
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, host: &Host) -> Result<Snapshot, ProbeFailure> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.outcome(host).await
    }

    async fn check_online(&self, host: &Host) -> Result<(), ProbeFailure> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.outcome(host).await.map(|_| ())
    }
}

/// Sink remembering the last content of every unit
#[derive(Default)]
pub struct RecordingSink {
    next_id: AtomicUsize,
    pub units: Mutex<HashMap<UnitId, Embed>>,
    pub creates: AtomicUsize,
    pub edits: AtomicUsize,
    create_delay: Option<Duration>,
}

impl RecordingSink {
    /// Creates land at once but only answer after `delay`
    pub fn slow_creates(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub fn content_of(&self, title: &str) -> Option<Embed> {
        self.units
            .lock()
            .unwrap()
            .values()
            .find(|embed| embed.title.as_deref() == Some(title))
            .cloned()
    }
}

#[async_trait]
impl SurfaceSink for RecordingSink {
    async fn create_unit(&self, _hostname: &str, content: &Embed) -> Result<UnitId, SinkError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let id = UnitId(self.next_id.fetch_add(1, Ordering::SeqCst) as u64 + 1);
        self.units.lock().unwrap().insert(id, content.clone());
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(id)
    }

    async fn edit_unit(
        &self,
        _hostname: &str,
        unit: UnitId,
        content: &Embed,
    ) -> Result<(), SinkError> {
        self.edits.fetch_add(1, Ordering::SeqCst);
        match self.units.lock().unwrap().get_mut(&unit) {
            Some(existing) => {
                *existing = content.clone();
                Ok(())
            }
            None => Err(SinkError::HandleInvalid(unit)),
        }
    }

    async fn lookup_existing_unit(&self, _hostname: &str) -> Result<Option<UnitId>, SinkError> {
        Ok(None)
    }
}
