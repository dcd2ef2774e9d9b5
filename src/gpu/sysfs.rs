//! DRM/sysfs enumeration and the sysfs telemetry fallback readers

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{GpuVendor, LinuxGpuDevice, LinuxGpuTelemetry};
use crate::paths::{read_f64, read_trimmed, read_u64, read_uevent_value, SystemPaths};

/// Source label when only the enumeration (or generic hwmon) is known
pub const SOURCE: &str = "sysfs";

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// List GPUs under `/sys/class/drm`.
///
/// Only `cardN` entries (connectors like `card0-DP-1` are skipped) with a
/// `device/` link and a display PCI class are reported, ordered by N.
pub fn enumerate_gpus(paths: &SystemPaths) -> Vec<LinuxGpuDevice> {
    let drm_path = paths.sys("class/drm");
    let entries = match fs::read_dir(&drm_path) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("no DRM devices at {}: {}", drm_path.display(), e);
            return Vec::new();
        }
    };

    let mut cards: Vec<(u32, String, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            let number = name.strip_prefix("card")?;
            if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            Some((number.parse().ok()?, name, entry.path()))
        })
        .collect();
    cards.sort_by_key(|(number, _, _)| *number);

    cards
        .into_iter()
        .map(|(_, card, card_path)| (card, card_path.join("device")))
        .filter(|(_, device_path)| device_path.exists() && is_display_class(device_path))
        .enumerate()
        .map(|(index, (drm_card, device_path))| describe_device(index, drm_card, device_path))
        .collect()
}

fn describe_device(index: usize, drm_card: String, device_path: PathBuf) -> LinuxGpuDevice {
    let uevent = device_path.join("uevent");
    let driver = read_uevent_value(&uevent, "DRIVER").or_else(|| {
        fs::read_link(device_path.join("driver"))
            .ok()
            .and_then(|target| target.file_name().map(|n| n.to_string_lossy().to_string()))
    });

    let vendor = match read_u64(&device_path.join("vendor")).map(GpuVendor::from_pci_id) {
        Some(vendor) if vendor != GpuVendor::Unknown => vendor,
        _ => driver
            .as_deref()
            .map(GpuVendor::from_driver)
            .unwrap_or_default(),
    };

    LinuxGpuDevice {
        index,
        drm_card,
        pci_slot_name: read_uevent_value(&uevent, "PCI_SLOT_NAME"),
        sysfs_device_path: device_path,
        vendor,
        driver,
    }
}

/// PCI class `0x03xxxx` is a display controller. A missing class file is
/// accepted (platform devices, some virtual GPUs).
fn is_display_class(device_path: &Path) -> bool {
    match read_trimmed(&device_path.join("class")) {
        Some(class) => class.to_ascii_lowercase().starts_with("0x03"),
        None => true,
    }
}

/// Telemetry straight from the driver's sysfs attributes. `None` when the
/// driver exposes nothing useful.
pub fn read_sysfs_telemetry(device: &LinuxGpuDevice) -> Option<LinuxGpuTelemetry> {
    let path = device.sysfs_device_path.as_path();
    let driver = device.driver.as_deref().unwrap_or("");

    let telemetry = if device.vendor == GpuVendor::Amd || driver == "amdgpu" {
        read_amdgpu(path)
    } else if device.vendor == GpuVendor::Intel || driver == "i915" || driver == "xe" {
        read_intel(path, driver)
    } else {
        let mut t = LinuxGpuTelemetry {
            source: SOURCE.to_string(),
            ..Default::default()
        };
        fill_from_hwmon(path, &mut t);
        t
    };

    telemetry.has_data().then_some(telemetry)
}

fn read_amdgpu(path: &Path) -> LinuxGpuTelemetry {
    let mut t = LinuxGpuTelemetry {
        source: "amdgpu-sysfs".to_string(),
        util_pct: read_f64(&path.join("gpu_busy_percent")),
        pstate: read_trimmed(&path.join("power_dpm_force_performance_level")),
        ..Default::default()
    };
    fill_vram(path, &mut t);
    fill_from_hwmon(path, &mut t);
    t
}

fn read_intel(path: &Path, driver: &str) -> LinuxGpuTelemetry {
    let source = if driver.is_empty() {
        "intel-sysfs".to_string()
    } else {
        format!("{}-sysfs", driver)
    };

    // Busy counters moved around between kernel versions.
    let util_pct = ["gt_busy_percent", "gt/gt0/rps_busy_percent", "gt/gt0/busy_percent"]
        .iter()
        .map(|rel| path.join(rel))
        .find(|p| p.exists())
        .and_then(|p| read_f64(&p));

    let mut t = LinuxGpuTelemetry {
        source,
        util_pct,
        ..Default::default()
    };
    // Discrete parts on xe expose VRAM like amdgpu does.
    fill_vram(path, &mut t);
    fill_from_hwmon(path, &mut t);
    t
}

fn fill_vram(path: &Path, t: &mut LinuxGpuTelemetry) {
    t.vram_used_gib = read_u64(&path.join("mem_info_vram_used")).map(|b| b as f64 / BYTES_PER_GIB);
    t.vram_total_gib =
        read_u64(&path.join("mem_info_vram_total")).map(|b| b as f64 / BYTES_PER_GIB);
}

/// Temperature (millidegrees) and power (microwatts) from the first hwmon
/// directory of the device, without overwriting values already set.
fn fill_from_hwmon(path: &Path, t: &mut LinuxGpuTelemetry) {
    let Some(hwmon) = first_hwmon_dir(path) else {
        return;
    };

    if t.temp_c.is_none() {
        t.temp_c = read_u64(&hwmon.join("temp1_input")).map(|m| m as f64 / 1000.0);
    }
    if t.watts.is_none() {
        t.watts = read_u64(&hwmon.join("power1_average"))
            .or_else(|| read_u64(&hwmon.join("power1_input")))
            .map(|uw| uw as f64 / 1_000_000.0);
    }
}

fn first_hwmon_dir(path: &Path) -> Option<PathBuf> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(path.join("hwmon"))
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs.into_iter().next()
}
