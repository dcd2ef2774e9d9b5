//! CPU tick counters from `/proc/stat`

use std::time::Duration;

use super::rate::MonotonicCounter;
use crate::error::{Result, TelemetryError};
use crate::paths::{read_file, SystemPaths};

/// Cumulative jiffies for one `cpu` line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuTicks {
    /// Ticks spent doing anything but idle/iowait
    pub busy: u64,
    /// All ticks (user..steal)
    pub total: u64,
}

impl MonotonicCounter for CpuTicks {
    fn went_backwards(&self, prev: &Self) -> bool {
        self.busy < prev.busy || self.total < prev.total
    }
}

/// Parse one `/proc/stat` cpu line into its label and ticks.
///
/// Format: `cpu[N] user nice system idle iowait irq softirq steal [guest guest_nice]`.
/// Guest time is already folded into user/nice, so only the first eight
/// columns are summed.
pub fn parse_stat_line(line: &str) -> Option<(&str, CpuTicks)> {
    let mut fields = line.split_whitespace();
    let label = fields.next()?;
    if !label.starts_with("cpu") {
        return None;
    }

    let values: Vec<u64> = fields.take(8).map(|f| f.parse().ok()).collect::<Option<_>>()?;
    if values.len() < 4 {
        return None;
    }

    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    let total: u64 = values.iter().sum();
    Some((
        label,
        CpuTicks {
            busy: total.saturating_sub(idle),
            total,
        },
    ))
}

/// Aggregate ticks across all CPUs (the first `cpu` line)
pub fn read_cpu_ticks(paths: &SystemPaths) -> Result<CpuTicks> {
    let path = paths.proc("stat");
    let content = read_file(&path)?;

    content
        .lines()
        .filter_map(parse_stat_line)
        .find(|(label, _)| *label == "cpu")
        .map(|(_, ticks)| ticks)
        .filter(|ticks| ticks.total > 0)
        .ok_or_else(|| TelemetryError::parse(&path, "no aggregate cpu line"))
}

/// Ticks per logical core, keyed by the kernel's core number (`cpu7` -> 7)
/// so offline cores do not shift the others.
pub fn read_per_core_ticks(paths: &SystemPaths) -> Result<Vec<(usize, CpuTicks)>> {
    let path = paths.proc("stat");
    let content = read_file(&path)?;

    let cores: Vec<(usize, CpuTicks)> = content
        .lines()
        .filter_map(parse_stat_line)
        .filter_map(|(label, ticks)| {
            let index = label.strip_prefix("cpu")?.parse::<usize>().ok()?;
            (ticks.total > 0).then_some((index, ticks))
        })
        .collect();

    if cores.is_empty() {
        return Err(TelemetryError::parse(&path, "no per-core cpu lines"));
    }
    Ok(cores)
}

/// Busy share of the elapsed ticks, clamped to 0..=100.
/// `None` when no tick elapsed (the kernel updates at HZ granularity).
pub fn busy_percent(prev: &CpuTicks, current: &CpuTicks, _elapsed: Duration) -> Option<f64> {
    let total = current.total.saturating_sub(prev.total);
    if total == 0 {
        return None;
    }
    let busy = current.busy.saturating_sub(prev.busy);
    Some((100.0 * busy as f64 / total as f64).clamp(0.0, 100.0))
}
