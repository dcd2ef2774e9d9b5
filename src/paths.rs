//! Filesystem roots the engine reads from
//!
//! Everything goes through [`SystemPaths`] so tests can point the readers at a
//! fixture tree instead of the live `/proc` and `/sys`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, TelemetryError};

/// Roots of the pseudo filesystems and config files the engine reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPaths {
    /// procfs mount (normally `/proc`)
    pub proc_root: PathBuf,
    /// sysfs mount (normally `/sys`)
    pub sys_root: PathBuf,
    /// Directory holding `os-release` (normally `/etc`)
    pub etc_root: PathBuf,
}

impl Default for SystemPaths {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            sys_root: PathBuf::from("/sys"),
            etc_root: PathBuf::from("/etc"),
        }
    }
}

impl SystemPaths {
    /// Paths rooted under a single directory, e.g. a test fixture with
    /// `proc/`, `sys/` and `etc/` subdirectories.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            proc_root: root.join("proc"),
            sys_root: root.join("sys"),
            etc_root: root.join("etc"),
        }
    }

    pub fn proc(&self, rel: &str) -> PathBuf {
        self.proc_root.join(rel)
    }

    pub fn sys(&self, rel: &str) -> PathBuf {
        self.sys_root.join(rel)
    }

    pub fn etc(&self, rel: &str) -> PathBuf {
        self.etc_root.join(rel)
    }
}

pub(crate) fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| TelemetryError::io(path, e))
}

/// First line of a sysfs-style attribute, trimmed. `None` when missing or blank.
pub(crate) fn read_trimmed(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let line = content.lines().next()?.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// Integer attribute; accepts decimal and `0x` hex.
pub(crate) fn read_u64(path: &Path) -> Option<u64> {
    let s = read_trimmed(path)?;
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

pub(crate) fn read_f64(path: &Path) -> Option<f64> {
    read_trimmed(path)?.parse().ok()
}

/// `KEY=value` lookup in a uevent-style file
pub(crate) fn read_uevent_value(path: &Path, key: &str) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    content.lines().find_map(|line| {
        line.strip_prefix(key)
            .and_then(|rest| rest.strip_prefix('='))
            .map(|v| v.trim().to_string())
    })
}
