pub mod actors;
#[cfg(feature = "api")]
pub mod api;
pub mod commands;
pub mod config;
pub mod discord;
pub mod presentation;
pub mod probe;
pub mod status;
pub mod storage;
pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One metrics reading of a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub cpu_model: String,
    /// Fraction in `[0, 1]`.
    pub cpu_usage: f32,
    pub memory_total: u64,
    pub memory_used: u64,
    pub disk_total: u64,
    pub disk_used: u64,
    pub process_count: u64,
    /// 1-minute load average.
    pub load_average: f64,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn disk_usage(&self) -> f64 {
        if self.disk_total == 0 {
            return 0.0;
        }
        self.disk_used as f64 / self.disk_total as f64
    }
}
