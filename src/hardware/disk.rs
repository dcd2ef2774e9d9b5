//! Block devices under `/sys/block`

use std::fs;

use super::gpu::format_gib_short;
use crate::paths::{read_trimmed, read_u64, SystemPaths};

/// `/sys/block/<dev>/size` is always in 512-byte units
const SYSFS_SECTOR_BYTES: u64 = 512;
const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Device names in sorted order, loop and ram disks excluded
pub fn block_device_names(paths: &SystemPaths) -> Vec<String> {
    let Ok(entries) = fs::read_dir(paths.sys("block")) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| !name.is_empty() && !name.starts_with("loop") && !name.starts_with("ram"))
        .collect();
    names.sort();
    names
}

/// `device/model`, then `device/name` (eMMC/SD), then the device name
pub fn model(paths: &SystemPaths, name: &str) -> String {
    let device = paths.sys(&format!("block/{}/device", name));
    read_trimmed(&device.join("model"))
        .or_else(|| read_trimmed(&device.join("name")))
        .unwrap_or_else(|| name.to_string())
}

/// Capacity as a short GiB string; `None` for empty media
pub fn size_summary(paths: &SystemPaths, name: &str) -> Option<String> {
    let sectors = read_u64(&paths.sys(&format!("block/{}/size", name)))?;
    if sectors == 0 {
        return None;
    }
    let bytes = sectors.saturating_mul(SYSFS_SECTOR_BYTES);
    Some(format_gib_short(bytes as f64 / BYTES_PER_GIB))
}

/// One `Disk<i>: [NVMe ]<model> <size>` line per block device
pub fn disk_lines(paths: &SystemPaths) -> Vec<String> {
    block_device_names(paths)
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let mut line = format!("Disk{}: ", index);
            if name.starts_with("nvme") {
                line.push_str("NVMe ");
            }
            line.push_str(&model(paths, name));
            if let Some(size) = size_summary(paths, name) {
                line.push(' ');
                line.push_str(&size);
            }
            line
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_disk_lines() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        // 1 TiB NVMe with a 4K logical block size: size stays in 512-byte units.
        write(root, "sys/block/nvme0n1/size", "2147483648\n");
        write(root, "sys/block/nvme0n1/queue/logical_block_size", "4096\n");
        write(root, "sys/block/nvme0n1/device/model", "Samsung SSD 980 PRO 1TB  \n");
        // 7.5 GiB eMMC reporting its name instead of a model.
        write(root, "sys/block/mmcblk0/size", "15728640\n");
        write(root, "sys/block/mmcblk0/device/name", "DG4008\n");
        write(root, "sys/block/sda/size", "0\n");
        write(root, "sys/block/loop0/size", "2048\n");
        write(root, "sys/block/ram0/size", "8192\n");

        assert_eq!(
            disk_lines(&SystemPaths::under(root)),
            vec![
                "Disk0: DG4008 7.5G".to_string(),
                "Disk1: NVMe Samsung SSD 980 PRO 1TB 1024G".to_string(),
                "Disk2: sda".to_string(),
            ]
        );
    }

    #[test]
    fn test_no_sys_block() {
        let dir = TempDir::new().unwrap();
        assert!(disk_lines(&SystemPaths::under(dir.path())).is_empty());
    }
}
