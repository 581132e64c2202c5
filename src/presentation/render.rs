//! Pure rendering of host status into Discord embeds

use crate::config::Host;
use crate::discord::{BLUE, Embed, GREEN, RED};
use crate::status::HostStatus;
use crate::storage::{BucketStatus, WindowEntry};
use crate::util::bytes_to_human;

pub const UPTIME_FIELD: &str = "Uptime (48h)";
pub const NO_DATA: &str = "No data yet";

const SPACER: &str = "\u{200b}";

pub fn bucket_symbol(status: BucketStatus) -> char {
    match status {
        BucketStatus::Up => '🟩',
        BucketStatus::Down => '🟥',
        BucketStatus::Unknown => '⬜',
    }
}

/// Oldest to newest, left to right; `None` if the window holds no data at all
pub fn uptime_bar(window: &[WindowEntry]) -> Option<String> {
    if window.iter().all(|entry| entry.status == BucketStatus::Unknown) {
        return None;
    }
    Some(window.iter().map(|entry| bucket_symbol(entry.status)).collect())
}

fn code(value: impl std::fmt::Display) -> String {
    format!("`{value}`")
}

fn pair(embed: Embed, left: (&str, String), right: (&str, String)) -> Embed {
    embed
        .field(left.0, left.1, true)
        .field(SPACER, SPACER, true)
        .field(right.0, right.1, true)
}

pub fn render(host: &Host, status: &HostStatus, window: &[WindowEntry]) -> Embed {
    let bar = uptime_bar(window);

    match status {
        HostStatus::Online(snapshot) => {
            let mut embed = Embed::new(format!("🟢 {}", host.name)).color(GREEN);
            embed = pair(
                embed,
                ("Host", code(&host.name)),
                ("IP", code(host.address_display())),
            );
            embed = pair(
                embed,
                ("📊 CPU", code(&snapshot.cpu_model)),
                ("Usage", code(format!("{:.1}%", snapshot.cpu_usage * 100.0))),
            );
            embed = pair(
                embed,
                ("💾 RAM", code(bytes_to_human(snapshot.memory_total))),
                ("Used", code(bytes_to_human(snapshot.memory_used))),
            );
            embed = pair(
                embed,
                ("💿 Disk", code(bytes_to_human(snapshot.disk_total))),
                ("Usage", code(format!("{:.1}%", snapshot.disk_usage() * 100.0))),
            );
            embed = pair(
                embed,
                ("🔄 Processes", code(snapshot.process_count)),
                ("Load Avg", code(format!("{:.2}", snapshot.load_average))),
            );

            if let Some(bar) = bar {
                embed = embed.field(UPTIME_FIELD, bar, false);
            }

            embed.footer("Last updated").timestamp(snapshot.captured_at)
        }
        HostStatus::Unreachable { reason, since, .. } => {
            let mut embed = Embed::new(format!("🔴 {}", host.name))
                .description("**Host is OFFLINE**")
                .color(RED)
                .field("IP", code(host.address_display()), false);

            if !reason.is_empty() {
                embed = embed.field("Error", code(reason), false);
            }

            embed
                .field(UPTIME_FIELD, bar.unwrap_or_else(|| NO_DATA.to_string()), false)
                .footer("Offline since")
                .timestamp(*since)
        }
    }
}

/// Reply to `!uptime <host>`
pub fn render_uptime(hostname: &str, window: &[WindowEntry]) -> Embed {
    let bar = uptime_bar(window).unwrap_or_else(|| NO_DATA.to_string());
    Embed::new(format!("Uptime History: {hostname}"))
        .description(format!("Past 48 hours:\n{bar}"))
        .color(BLUE)
}
