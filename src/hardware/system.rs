//! OS release and kernel identification

use sysinfo::System;

use crate::paths::{read_trimmed, SystemPaths};

/// Display name from the contents of an `os-release` file:
/// `PRETTY_NAME`, else `NAME VERSION`, else `NAME`.
pub fn parse_os_release(content: &str) -> Option<String> {
    let mut pretty = None;
    let mut name = None;
    let mut version = None;

    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'').to_string();
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "PRETTY_NAME" => pretty = Some(value),
            "NAME" => name = Some(value),
            "VERSION" => version = Some(value),
            _ => {}
        }
    }

    pretty.or(match (name, version) {
        (Some(name), Some(version)) => Some(format!("{} {}", name, version)),
        (name, _) => name,
    })
}

/// Never empty: falls back to sysinfo, then to plain "Linux"
pub fn os_pretty(paths: &SystemPaths) -> String {
    std::fs::read_to_string(paths.etc("os-release"))
        .ok()
        .and_then(|content| parse_os_release(&content))
        .or_else(System::long_os_version)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "Linux".to_string())
}

pub fn kernel_version(paths: &SystemPaths) -> Option<String> {
    System::kernel_version()
        .filter(|v| !v.is_empty())
        .or_else(|| read_trimmed(&paths.proc("sys/kernel/osrelease")))
}
