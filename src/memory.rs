//! RAM reader
//!
//! Stateless: every call re-reads `/proc/meminfo`.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TelemetryError};
use crate::paths::{read_file, SystemPaths};

const KIB_PER_GIB: f64 = 1024.0 * 1024.0;

/// Memory in use, in GiB
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RamUsage {
    pub used_gib: f64,
    pub total_gib: f64,
    pub used_pct: f64,
}

impl RamUsage {
    /// Build from `/proc/meminfo` style kB values. `None` when total is zero.
    pub fn from_kib(total_kib: u64, available_kib: u64) -> Option<Self> {
        if total_kib == 0 {
            return None;
        }
        let used_kib = total_kib.saturating_sub(available_kib);
        let total_gib = total_kib as f64 / KIB_PER_GIB;
        let used_gib = used_kib as f64 / KIB_PER_GIB;
        Some(RamUsage {
            used_gib,
            total_gib,
            used_pct: 100.0 * used_kib as f64 / total_kib as f64,
        })
    }
}

/// Value of a `Key:   1234 kB` line
pub fn meminfo_kib(content: &str, key: &str) -> Option<u64> {
    content.lines().find_map(|line| {
        let rest = line.strip_prefix(key)?.strip_prefix(':')?;
        rest.split_whitespace().next()?.parse().ok()
    })
}

pub fn read_ram_usage(paths: &SystemPaths) -> Result<RamUsage> {
    let path = paths.proc("meminfo");
    let content = read_file(&path)?;

    let total = meminfo_kib(&content, "MemTotal")
        .ok_or_else(|| TelemetryError::parse(&path, "MemTotal missing"))?;
    let available = meminfo_kib(&content, "MemAvailable")
        .ok_or_else(|| TelemetryError::parse(&path, "MemAvailable missing"))?;

    RamUsage::from_kib(total, available).ok_or_else(|| TelemetryError::parse(&path, "MemTotal is zero"))
}
