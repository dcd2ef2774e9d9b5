//! RAM summary for the hardware probe
//!
//! Total size comes from /proc/meminfo (sysinfo as fallback). Module type
//! and speed come from `dmidecode`, which usually needs root; without it
//! the summary is just the size.

use std::process::Command;

use anyhow::{Context, Result};
use sysinfo::System;
use tracing::debug;

use crate::memory::meminfo_kib;
use crate::paths::SystemPaths;

/// What `dmidecode -t 17` reports about the memory devices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimmInfo {
    /// DDR4, LPDDR5, ...
    pub ram_type: Option<String>,
    /// Highest speed seen in MT/s
    pub speed_mts: Option<u64>,
    /// Slots with a module installed
    pub populated: u32,
}

pub fn parse_dmidecode(output: &str) -> DimmInfo {
    let mut info = DimmInfo::default();

    for line in output.lines() {
        let line = line.trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key {
            "Type" if info.ram_type.is_none() => {
                if value.starts_with("DDR") || value.starts_with("LPDDR") {
                    info.ram_type = Some(value.to_string());
                }
            }
            "Size" => {
                if !value.contains("No Module Installed") && value != "Unknown" {
                    info.populated += 1;
                }
            }
            "Speed" | "Configured Memory Speed" => {
                // "3200 MT/s", older tools print "3200 MHz"
                let speed = value
                    .split_whitespace()
                    .next()
                    .and_then(|n| n.parse::<u64>().ok())
                    .filter(|n| *n > 0);
                if let Some(speed) = speed {
                    info.speed_mts = Some(info.speed_mts.map_or(speed, |s| s.max(speed)));
                }
            }
            _ => {}
        }
    }

    info
}

fn run_dmidecode() -> Result<DimmInfo> {
    let output = Command::new("dmidecode")
        .args(["-t", "17"]) // Type 17 = Memory Device
        .output()
        .context("dmidecode not found")?;

    if !output.status.success() {
        anyhow::bail!("dmidecode failed (usually needs root)");
    }

    Ok(parse_dmidecode(&String::from_utf8_lossy(&output.stdout)))
}

pub fn total_gib(paths: &SystemPaths) -> Option<f64> {
    let from_meminfo = std::fs::read_to_string(paths.proc("meminfo"))
        .ok()
        .and_then(|content| meminfo_kib(&content, "MemTotal"))
        .map(|kib| kib as f64 / (1024.0 * 1024.0));

    from_meminfo.filter(|gib| *gib > 0.0).or_else(|| {
        let mut sys = System::new();
        sys.refresh_memory();
        let bytes = sys.total_memory();
        (bytes > 0).then(|| bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    })
}

/// e.g. `31.2 GiB DDR5 (speed: 5600 MT/s, channels: likely >=2)`
pub fn format_summary(total_gib: f64, dimms: Option<&DimmInfo>) -> String {
    let mut summary = format!("{:.1} GiB", total_gib);

    if let Some(dimms) = dimms {
        if let Some(ref ram_type) = dimms.ram_type {
            summary.push_str(&format!(" {}", ram_type));
        }
        let speed = dimms
            .speed_mts
            .map(|s| format!("{} MT/s", s))
            .unwrap_or_else(|| super::UNKNOWN.to_string());
        // Populated slots hint at the channel count; it is not a measurement.
        let channels = match dimms.populated {
            0 => super::UNKNOWN,
            1 => "likely 1",
            _ => "likely >=2",
        };
        summary.push_str(&format!(" (speed: {}, channels: {})", speed, channels));
    }

    summary
}

pub fn summary(paths: &SystemPaths) -> Option<String> {
    let total = total_gib(paths)?;
    let dimms = match run_dmidecode() {
        Ok(dimms) => Some(dimms),
        Err(e) => {
            debug!("no DIMM details: {:#}", e);
            None
        }
    };
    Some(format_summary(total, dimms.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const DMIDECODE: &str = "\
Handle 0x0040, DMI type 17, 92 bytes
Memory Device
\tSize: 16 GB
\tForm Factor: SODIMM
\tType: DDR5
\tSpeed: 5600 MT/s
\tConfigured Memory Speed: 5200 MT/s

Handle 0x0041, DMI type 17, 92 bytes
Memory Device
\tSize: No Module Installed
\tType: Unknown
\tSpeed: Unknown

Handle 0x0042, DMI type 17, 92 bytes
Memory Device
\tSize: 16 GB
\tType: DDR5
\tSpeed: 5600 MT/s
";

    #[test]
    fn test_parse_dmidecode() {
        let info = parse_dmidecode(DMIDECODE);
        assert_eq!(info.ram_type.as_deref(), Some("DDR5"));
        assert_eq!(info.speed_mts, Some(5600));
        assert_eq!(info.populated, 2);
    }

    #[test]
    fn test_format_summary() {
        assert_eq!(format_summary(31.24, None), "31.2 GiB");

        let info = parse_dmidecode(DMIDECODE);
        assert_eq!(
            format_summary(32.0, Some(&info)),
            "32.0 GiB DDR5 (speed: 5600 MT/s, channels: likely >=2)"
        );
        assert_eq!(
            format_summary(8.0, Some(&DimmInfo::default())),
            "8.0 GiB (speed: --, channels: --)"
        );
    }

    #[test]
    fn test_total_from_meminfo() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("proc")).unwrap();
        fs::write(dir.path().join("proc/meminfo"), "MemTotal: 8388608 kB\n").unwrap();
        assert_eq!(total_gib(&SystemPaths::under(dir.path())), Some(8.0));
    }
}
