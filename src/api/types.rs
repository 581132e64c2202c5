//! API request and response types

use serde::{Deserialize, Serialize};

use crate::discord::Message;
use crate::status::HostStatus;
use crate::storage::WindowEntry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`
    pub status: String,
    pub timestamp: String,
    pub storage_healthy: bool,
    pub storage_message: String,
    pub hosts: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostInfo {
    pub name: String,
    pub address: Option<String>,
    pub local: bool,
    /// `None` until the first metrics cycle reached the host
    pub status: Option<HostStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostsResponse {
    pub hosts: Vec<HostInfo>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UptimeResponse {
    pub hostname: String,
    /// Oldest first
    pub buckets: Vec<WindowEntry>,
    pub up: usize,
    pub down: usize,
    pub unknown: usize,
    /// Share of known buckets that were up, `None` without data
    pub uptime_percentage: Option<f64>,
}

impl UptimeResponse {
    pub fn from_window(hostname: impl Into<String>, buckets: Vec<WindowEntry>) -> Self {
        use crate::storage::BucketStatus;

        let count = |status| buckets.iter().filter(|e| e.status == status).count();
        let up = count(BucketStatus::Up);
        let down = count(BucketStatus::Down);
        let unknown = count(BucketStatus::Unknown);
        let known = up + down;

        Self {
            hostname: hostname.into(),
            up,
            down,
            unknown,
            uptime_percentage: (known > 0).then(|| up as f64 / known as f64 * 100.0),
            buckets,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Raw chat message, e.g. `!status web1`
    pub content: String,
    /// Channel to post the replies to; replies are only returned when unset
    #[serde(default)]
    pub channel_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub replies: Vec<Message>,
    pub delivered: usize,
}
