//! GPU identity and driver/runtime versions for the hardware probe

use std::process::Command;

use anyhow::{Context, Result};
use tracing::debug;

use crate::gpu::{GpuTelemetry, LinuxGpuDevice};
use crate::paths::{read_trimmed, SystemPaths};

/// Where ROCm installs record their version
pub const ROCM_VERSION_FILE: &str = "/opt/rocm/.info/version";

/// Name part of an lspci line.
///
/// `01:00.0 VGA compatible controller: NVIDIA Corporation GA104 [GeForce RTX 3070] (rev a1)`
/// becomes `NVIDIA Corporation GA104 [GeForce RTX 3070]`.
pub fn parse_lspci_line(line: &str) -> Option<String> {
    let (_, after) = line.split_once(": ")?;
    let name = match after.rfind(" (rev") {
        Some(idx) => &after[..idx],
        None => after,
    };
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// First display controller listed by `lspci`
pub fn lspci_gpu_name() -> Result<String> {
    let output = Command::new("lspci").output().context("lspci not found")?;
    if !output.status.success() {
        anyhow::bail!("lspci failed");
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .filter(|l| l.contains("VGA") || l.contains("3D controller") || l.contains("Display controller"))
        .find_map(parse_lspci_line)
        .context("No GPU found in lspci output")
}

/// First line of `rocm-smi --version` that mentions a version
pub fn parse_rocm_smi_version(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && l.to_ascii_lowercase().contains("version"))
        .map(str::to_string)
}

pub fn rocm_version() -> Option<String> {
    if let Some(version) = read_trimmed(std::path::Path::new(ROCM_VERSION_FILE)) {
        return Some(version);
    }

    let output = match Command::new("rocm-smi").arg("--version").output() {
        Ok(output) if output.status.success() => output,
        Ok(_) => return None,
        Err(e) => {
            debug!("rocm-smi not available: {}", e);
            return None;
        }
    };
    parse_rocm_smi_version(&String::from_utf8_lossy(&output.stdout))
}

/// `"<driver> <module version>"` for the first enumerated GPU with a driver,
/// or just the driver name when the module has no version file (in-tree
/// modules).
pub fn sysfs_driver(paths: &SystemPaths, devices: &[LinuxGpuDevice]) -> Option<String> {
    let driver = devices.iter().find_map(|d| d.driver.clone())?;
    let version = read_trimmed(&paths.sys(&format!("module/{}/version", driver)));
    Some(match version {
        Some(version) => format!("{} {}", driver, version),
        None => driver,
    })
}

/// `10G` for whole sizes, `7.5G` otherwise
pub fn format_gib_short(gib: f64) -> String {
    let rounded = gib.round();
    if (gib - rounded).abs() < 0.05 {
        format!("{}G", rounded as u64)
    } else {
        format!("{:.1}G", gib)
    }
}

/// Total VRAM of the first GPU that reports it, with a GPU count when
/// there are several. e.g. `24.0 GiB (2 GPUs)`
pub fn vram_summary(records: &[GpuTelemetry]) -> Option<String> {
    let total = records.iter().find_map(|r| r.vram_total_gib.filter(|t| *t > 0.0))?;
    let mut summary = format!("{:.1} GiB", total);
    if records.len() > 1 {
        summary.push_str(&format!(" ({} GPUs)", records.len()));
    }
    Some(summary)
}

/// Display lines per GPU:
///
/// ```text
/// GPU0: NVIDIA GeForce RTX 4090
///  Memory: 24G
///  Graphics Clock: 2520 MHz
///  Memory Clock: 10501 MHz
///  Telemetry: nvml
/// ```
pub fn per_gpu_lines(records: &[GpuTelemetry]) -> Vec<String> {
    let mut lines = Vec::with_capacity(records.len() * 3);
    for record in records {
        lines.push(format!("GPU{}: {}", record.index, record.name));
        if let Some(total) = record.vram_total_gib.filter(|t| *t > 0.0) {
            lines.push(format!(" Memory: {}", format_gib_short(total)));
        }
        if let Some(mhz) = record.gpu_clock_mhz {
            lines.push(format!(" Graphics Clock: {} MHz", mhz));
        }
        if let Some(mhz) = record.mem_clock_mhz {
            lines.push(format!(" Memory Clock: {} MHz", mhz));
        }
        lines.push(format!(" Telemetry: {}", record.source));
    }
    lines
}
