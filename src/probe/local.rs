//! Metrics of the machine the monitor runs on

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sysinfo::{Disks, System};
use tracing::{debug, instrument};

use crate::Snapshot;

#[async_trait]
pub trait LocalReader: Send + Sync {
    async fn read_local_snapshot(&self) -> Result<Snapshot>;
}

/// Reads local counters through `sysinfo`
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoReader;

impl SysinfoReader {
    fn read_blocking() -> Snapshot {
        let mut sys = System::new_all();
        sys.refresh_all();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_cpu_usage();

        let cpu_model = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(System::cpu_arch);

        let disks = Disks::new_with_refreshed_list();
        let root = disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == Path::new("/"))
            .or_else(|| disks.list().first());

        let (disk_total, disk_used) = match root {
            Some(disk) => (
                disk.total_space(),
                disk.total_space().saturating_sub(disk.available_space()),
            ),
            None => {
                debug!("no mounted disks visible");
                (0, 0)
            }
        };

        Snapshot {
            cpu_model,
            cpu_usage: (sys.global_cpu_usage() / 100.0).clamp(0.0, 1.0),
            memory_total: sys.total_memory(),
            memory_used: sys.used_memory(),
            disk_total,
            disk_used,
            process_count: sys.processes().len() as u64,
            load_average: System::load_average().one,
            captured_at: Utc::now(),
        }
    }
}

#[async_trait]
impl LocalReader for SysinfoReader {
    #[instrument(skip(self))]
    async fn read_local_snapshot(&self) -> Result<Snapshot> {
        tokio::task::spawn_blocking(Self::read_blocking)
            .await
            .context("local metrics reader panicked")
    }
}
