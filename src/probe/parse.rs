//! Pure parsers for the text printed by the remote information commands
//!
//! Every parser takes the raw output of exactly one command and either yields
//! a typed value or a [`ParseError`]. Parsers accept extra whitespace and a
//! `,` decimal separator, and never guess: anything unexpected is an error so
//! that a half-filled snapshot can never be produced.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::remote::MetricCommand;
use crate::Snapshot;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot parse {metric}: {message}")]
pub struct ParseError {
    pub metric: &'static str,
    pub message: String,
}

impl ParseError {
    fn new(metric: &'static str, message: impl Into<String>) -> Self {
        Self {
            metric,
            message: message.into(),
        }
    }
}

static CPU_MODEL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*(model name|hardware|cpu model|processor)\s*:\s*(\S.*?)\s*$")
        .expect("static regex")
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Parses a decimal that may use `,` as separator (`0,52` or `0.52`).
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let value = raw.trim().replace(',', ".");
    if value.is_empty() {
        return None;
    }
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_count(metric: &'static str, raw: &str) -> Result<u64, ParseError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ParseError::new(metric, format!("expected an integer, got {:?}", raw.trim())))
}

/// Model lines of `/proc/cpuinfo` -> `Intel(R) Xeon(R) CPU E5-2680 v4 @ 2.40GHz`
pub fn parse_cpu_model(raw: &str) -> Result<String, ParseError> {
    // x86 lists `processor : 0` before `model name`; ARM only has `Hardware`
    // or a textual `Processor`.
    let rank = |key: &str| match key.to_ascii_lowercase().as_str() {
        "model name" => 0,
        "hardware" | "cpu model" => 1,
        _ => 2,
    };

    let model = CPU_MODEL_LINE
        .captures_iter(raw)
        .filter_map(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
        .filter(|(_, value)| !value.chars().all(|c| c.is_ascii_digit()))
        .min_by_key(|(key, _)| rank(key))
        .map(|(_, value)| WHITESPACE.replace_all(value, " ").into_owned())
        .ok_or_else(|| ParseError::new("cpu model", "no model line found"))?;

    if model.is_empty() {
        return Err(ParseError::new("cpu model", "empty model name"));
    }
    Ok(model)
}

/// Two `cpu` lines of `/proc/stat` taken some time apart -> busy fraction.
pub fn parse_cpu_usage(raw: &str) -> Result<f32, ParseError> {
    const METRIC: &str = "cpu usage";

    let samples = raw
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("cpu "))
        .map(|line| {
            line.split_whitespace()
                .skip(1)
                .take(8)
                .map(|field| field.parse::<u64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ParseError::new(METRIC, format!("invalid counter in {line:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let [first, second] = samples.as_slice() else {
        return Err(ParseError::new(
            METRIC,
            format!("expected two cpu lines, found {}", samples.len()),
        ));
    };
    if first.len() < 4 || second.len() != first.len() {
        return Err(ParseError::new(METRIC, "too few counters"));
    }

    // user nice system idle iowait irq softirq steal
    let idle = |fields: &[u64]| fields[3] + fields.get(4).copied().unwrap_or(0);
    let total = |fields: &[u64]| fields.iter().sum::<u64>();

    let total_delta = total(second).saturating_sub(total(first));
    let idle_delta = idle(second).saturating_sub(idle(first));
    if total_delta == 0 {
        return Err(ParseError::new(METRIC, "counters did not advance"));
    }

    let busy = 1.0 - idle_delta as f64 / total_delta as f64;
    Ok(busy.clamp(0.0, 1.0) as f32)
}

/// `free -b` -> (total, used) bytes from the `Mem:` row.
pub fn parse_memory(raw: &str) -> Result<(u64, u64), ParseError> {
    const METRIC: &str = "memory";

    let line = raw
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("Mem:"))
        .ok_or_else(|| ParseError::new(METRIC, "no Mem: row"))?;

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 {
        return Err(ParseError::new(METRIC, format!("short Mem: row {line:?}")));
    }

    let total = parse_count(METRIC, fields[1])?;
    let used = parse_count(METRIC, fields[2])?;
    if used > total {
        return Err(ParseError::new(METRIC, "used exceeds total"));
    }
    Ok((total, used))
}

/// `df -P -B1 /` -> (total, used) bytes from the last row.
pub fn parse_disk(raw: &str) -> Result<(u64, u64), ParseError> {
    const METRIC: &str = "disk";

    let line = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .skip(1)
        .last()
        .ok_or_else(|| ParseError::new(METRIC, "no filesystem row"))?;

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        return Err(ParseError::new(METRIC, format!("short row {line:?}")));
    }

    let total = parse_count(METRIC, fields[1])?;
    let used = parse_count(METRIC, fields[2])?;
    Ok((total, used))
}

/// `ps -e -o pid= | wc -l` -> number of processes.
pub fn parse_process_count(raw: &str) -> Result<u64, ParseError> {
    parse_count("process count", raw)
}

/// `cat /proc/loadavg` -> 1-minute load average.
pub fn parse_load_average(raw: &str) -> Result<f64, ParseError> {
    const METRIC: &str = "load average";

    let first = raw
        .split_whitespace()
        .next()
        .ok_or_else(|| ParseError::new(METRIC, "empty output"))?;

    parse_decimal(first)
        .filter(|load| *load >= 0.0)
        .ok_or_else(|| ParseError::new(METRIC, format!("not a number: {first:?}")))
}

/// Builds a snapshot from the outputs of [`MetricCommand::ALL`], in order.
pub fn parse_snapshot(outputs: &[String], captured_at: DateTime<Utc>) -> Result<Snapshot, ParseError> {
    let output = |command: MetricCommand| -> Result<&str, ParseError> {
        MetricCommand::ALL
            .iter()
            .position(|c| *c == command)
            .and_then(|index| outputs.get(index))
            .map(String::as_str)
            .ok_or_else(|| ParseError::new(command.metric(), "missing output"))
    };

    let (memory_total, memory_used) = parse_memory(output(MetricCommand::Memory)?)?;
    let (disk_total, disk_used) = parse_disk(output(MetricCommand::Disk)?)?;

    Ok(Snapshot {
        cpu_model: parse_cpu_model(output(MetricCommand::CpuModel)?)?,
        cpu_usage: parse_cpu_usage(output(MetricCommand::CpuStat)?)?,
        memory_total,
        memory_used,
        disk_total,
        disk_used,
        process_count: parse_process_count(output(MetricCommand::ProcessCount)?)?,
        load_average: parse_load_average(output(MetricCommand::LoadAverage)?)?,
        captured_at,
    })
}
