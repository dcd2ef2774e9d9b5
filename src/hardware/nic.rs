//! Network adapters under `/sys/class/net`

use std::fs;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use super::gpu::parse_lspci_line;
use crate::paths::{read_trimmed, read_uevent_value, SystemPaths};

/// Interface names in sorted order, loopback excluded
pub fn interface_names(paths: &SystemPaths) -> Vec<String> {
    let Ok(entries) = fs::read_dir(paths.sys("class/net")) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| !name.is_empty() && name != "lo")
        .collect();
    names.sort();
    names
}

/// Negotiated link speed, `None` while the link is down (`-1` or unreadable)
pub fn link_speed(paths: &SystemPaths, name: &str) -> Option<String> {
    let raw = read_trimmed(&paths.sys(&format!("class/net/{}/speed", name)))?;
    match raw.parse::<i64>() {
        Ok(mbps) if mbps > 0 => Some(format!("{} Mb/s", mbps)),
        _ => None,
    }
}

fn link_basename(path: &Path) -> Option<String> {
    let target = fs::read_link(path).ok()?;
    target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}

/// Kernel driver bound to the interface's device
pub fn driver_name(paths: &SystemPaths, name: &str) -> Option<String> {
    let device = paths.sys(&format!("class/net/{}/device", name));
    link_basename(&device.join("driver/module"))
        .or_else(|| link_basename(&device.join("driver")))
        .or_else(|| read_uevent_value(&device.join("uevent"), "DRIVER"))
}

/// PCI slot of the interface's device, e.g. `0000:03:00.0`
pub fn pci_slot(paths: &SystemPaths, name: &str) -> Option<String> {
    read_uevent_value(
        &paths.sys(&format!("class/net/{}/device/uevent", name)),
        "PCI_SLOT_NAME",
    )
    .filter(|s| !s.is_empty())
}

/// `lspci -s <slot>` name of one PCI device
pub fn lspci_device_name(slot: &str) -> Option<String> {
    let output = match Command::new("lspci").arg("-s").arg(slot).output() {
        Ok(output) if output.status.success() => output,
        Ok(_) => return None,
        Err(e) => {
            debug!("lspci not available: {}", e);
            return None;
        }
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .find_map(parse_lspci_line)
}

/// One `NIC<i>: <description> (<speed>)` line per interface.
///
/// The description is the PCI device name from `lookup`, then the driver,
/// then the interface name itself.
pub fn nic_lines_with<F>(paths: &SystemPaths, lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    interface_names(paths)
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let description = pci_slot(paths, name)
                .and_then(|slot| lookup(&slot))
                .or_else(|| driver_name(paths, name))
                .unwrap_or_else(|| name.clone());
            match link_speed(paths, name) {
                Some(speed) => format!("NIC{}: {} ({})", index, description, speed),
                None => format!("NIC{}: {}", index, description),
            }
        })
        .collect()
}

pub fn nic_lines(paths: &SystemPaths) -> Vec<String> {
    nic_lines_with(paths, lspci_device_name)
}
