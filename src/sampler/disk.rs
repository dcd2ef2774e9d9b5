//! Block device byte counters from `/proc/diskstats`

use crate::error::Result;
use crate::paths::{read_file, SystemPaths};
use crate::sampler::rate::NamedCounters;

/// The kernel reports sectors in fixed 512-byte units regardless of the
/// device's physical sector size.
const SECTOR_BYTES: u64 = 512;

/// Cumulative bytes per selected block device
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiskCounters {
    pub read_bytes: NamedCounters,
    pub write_bytes: NamedCounters,
}

/// Whether a diskstats name is a whole physical disk (not a partition or a
/// virtual device that would double count its backing disk).
pub fn is_whole_disk(name: &str) -> bool {
    const VIRTUAL: [&str; 5] = ["loop", "ram", "zram", "dm-", "sr"];
    if VIRTUAL.iter().any(|p| name.starts_with(p)) {
        return false;
    }

    // eMMC boot and replay-protected areas are hardware partitions.
    if name.starts_with("mmcblk") && (name.contains("boot") || name.ends_with("rpmb")) {
        return false;
    }

    // nvme0n1 / mmcblk0 are whole devices, nvme0n1p2 / mmcblk0p1 are partitions.
    if name.starts_with("nvme") || name.starts_with("mmcblk") {
        return match name.rfind('p') {
            Some(idx) => {
                let tail = &name[idx + 1..];
                tail.is_empty() || !tail.chars().all(|c| c.is_ascii_digit())
            }
            None => true,
        };
    }

    !name.ends_with(|c: char| c.is_ascii_digit())
}

/// Read/written bytes per device.
///
/// With `device_prefix` set only devices whose name starts with it are
/// counted; otherwise all whole disks are.
pub fn read_disk_counters(paths: &SystemPaths, device_prefix: Option<&str>) -> Result<DiskCounters> {
    let content = read_file(&paths.proc("diskstats"))?;
    Ok(parse_diskstats(&content, device_prefix))
}

pub fn parse_diskstats(content: &str, device_prefix: Option<&str>) -> DiskCounters {
    let mut counters = DiskCounters::default();

    for line in content.lines() {
        // major minor name reads merged sectors_read ms writes merged sectors_written ...
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }

        let name = fields[2];
        let selected = match device_prefix {
            Some(prefix) => name.starts_with(prefix),
            None => is_whole_disk(name),
        };
        if !selected {
            continue;
        }

        let sectors_read = fields[5].parse::<u64>().unwrap_or(0);
        let sectors_written = fields[9].parse::<u64>().unwrap_or(0);
        counters
            .read_bytes
            .add(name, sectors_read.saturating_mul(SECTOR_BYTES));
        counters
            .write_bytes
            .add(name, sectors_written.saturating_mul(SECTOR_BYTES));
    }

    counters
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISKSTATS: &str = "\
   7       0 loop0 120 0 2400 10 0 0 0 0 0 20 10 0 0 0 0
 259       0 nvme0n1 1000 10 20000 300 500 20 8000 400 0 700 700 0 0 0 0
 259       1 nvme0n1p1 900 10 18000 280 480 20 7800 390 0 650 670 0 0 0 0
   8       0 sda 200 0 4000 50 100 0 1000 20 0 70 70 0 0 0 0
   8       1 sda1 190 0 3900 49 99 0 990 20 0 69 69 0 0 0 0
 253       0 dm-0 800 0 17000 270 470 0 7700 380 0 640 650 0 0 0 0
";

    #[test]
    fn test_whole_disk_detection() {
        assert!(is_whole_disk("sda"));
        assert!(is_whole_disk("vdb"));
        assert!(is_whole_disk("nvme0n1"));
        assert!(is_whole_disk("mmcblk0"));
        assert!(!is_whole_disk("sda1"));
        assert!(!is_whole_disk("nvme0n1p1"));
        assert!(!is_whole_disk("mmcblk0p2"));
        assert!(!is_whole_disk("loop3"));
        assert!(!is_whole_disk("dm-0"));
        assert!(!is_whole_disk("zram0"));
    }

    #[test]
    fn test_emmc_hardware_partitions_are_skipped() {
        assert!(!is_whole_disk("mmcblk0boot0"));
        assert!(!is_whole_disk("mmcblk0boot1"));
        assert!(!is_whole_disk("mmcblk0rpmb"));
        assert!(is_whole_disk("mmcblk1"));

        let stats = "\
 179       0 mmcblk0 100 0 2000 10 50 0 1000 5 0 15 15 0 0 0 0
 179       8 mmcblk0boot0 10 0 160 1 0 0 0 0 0 1 1 0 0 0 0
 179      16 mmcblk0boot1 10 0 160 1 0 0 0 0 0 1 1 0 0 0 0
 179      24 mmcblk0rpmb 2 0 16 1 0 0 0 0 0 1 1 0 0 0 0
";
        let counters = parse_diskstats(stats, None);
        assert_eq!(counters.read_bytes.total(), 2000 * 512);
        assert_eq!(counters.read_bytes.names().collect::<Vec<_>>(), vec!["mmcblk0"]);
    }

    #[test]
    fn test_sums_whole_disks_only() {
        let counters = parse_diskstats(DISKSTATS, None);
        assert_eq!(counters.read_bytes.total(), (20000 + 4000) * 512);
        assert_eq!(counters.write_bytes.total(), (8000 + 1000) * 512);
        assert_eq!(counters.read_bytes.get("sda"), Some(4000 * 512));
        assert_eq!(counters.read_bytes.get("sda1"), None);
    }

    #[test]
    fn test_prefix_filter() {
        let counters = parse_diskstats(DISKSTATS, Some("sda"));
        // Prefix mode counts partitions too, like the raw device list.
        assert_eq!(counters.read_bytes.total(), (4000 + 3900) * 512);
    }

    #[test]
    fn test_short_lines_are_ignored() {
        let counters = parse_diskstats("garbage\n8 0 sda 1\n", None);
        assert_eq!(counters, DiskCounters::default());
    }
}
