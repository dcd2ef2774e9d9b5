//! One-shot hardware probe
//!
//! Collects OS, CPU, RAM, GPU, network adapter and disk identity plus
//! driver/runtime versions.
//! Every field degrades on its own; nothing here is cached.

pub mod cpu;
pub mod disk;
pub mod gpu;
pub mod nic;
pub mod ram;
pub mod system;

use serde::Serialize;

use crate::gpu::aggregate::GpuAggregator;
use crate::gpu::nvml;
use crate::paths::SystemPaths;

/// Placeholder for anything the probe could not determine
pub const UNKNOWN: &str = "--";

/// Static description of the host
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HardwareInfo {
    pub os_pretty: String,
    pub kernel_version: Option<String>,
    pub cpu_name: String,
    pub cpu_physical_cores: Option<usize>,
    pub cpu_logical_cores: Option<usize>,
    pub cpu_cache_l1: Option<String>,
    pub cpu_cache_l2: Option<String>,
    pub cpu_cache_l3: Option<String>,
    /// Notable ISA extensions
    pub cpu_instructions: Option<String>,
    pub ram_summary: Option<String>,
    pub gpu_name: Option<String>,
    pub gpu_driver: Option<String>,
    pub vram_summary: Option<String>,
    /// Per-GPU block; replaces the GPU/Memory lines when non-empty
    pub per_gpu_lines: Vec<String>,
    pub cuda_version: Option<String>,
    pub nvml_version: Option<String>,
    pub rocm_version: Option<String>,
    /// `NIC<i>: ...` per network interface, loopback excluded
    pub per_nic_lines: Vec<String>,
    /// `Disk<i>: ...` per block device
    pub per_disk_lines: Vec<String>,
}

fn or_unknown(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(UNKNOWN)
}

fn count_or_unknown(value: Option<usize>) -> String {
    value.map_or_else(|| UNKNOWN.to_string(), |n| n.to_string())
}

impl HardwareInfo {
    /// Probe the host.
    ///
    /// `nvml_enabled` gates every NVML query (name, driver and versions).
    /// The aggregator is expected to carry only the enabled adapters.
    pub fn probe(paths: &SystemPaths, gpus: &GpuAggregator, nvml_enabled: bool) -> Self {
        let cpu = cpu::detect(paths);
        let (cpu_cache_l1, cpu_cache_l2, cpu_cache_l3) = cpu::cache_summary(paths);

        let devices = gpus.enumerate();
        let records = gpus.sample_all();
        let nvml_versions = if nvml_enabled {
            nvml::versions()
        } else {
            nvml::NvmlVersions::default()
        };

        let gpu_name = nvml_enabled
            .then(|| nvml::read_gpu_name(0))
            .flatten()
            .or_else(|| gpu::lspci_gpu_name().ok())
            .or_else(|| records.first().map(|r| r.name.clone()));

        let gpu_driver = nvml_versions
            .driver
            .as_ref()
            .map(|v| format!("nvidia {}", v))
            .or_else(|| gpu::sysfs_driver(paths, &devices));

        Self {
            os_pretty: system::os_pretty(paths),
            kernel_version: system::kernel_version(paths),
            cpu_name: cpu.model.unwrap_or_else(|| "Unknown CPU".to_string()),
            cpu_physical_cores: cpu.physical_cores,
            cpu_logical_cores: cpu.logical_cores,
            cpu_cache_l1,
            cpu_cache_l2,
            cpu_cache_l3,
            cpu_instructions: cpu::instruction_summary(&cpu.flags),
            ram_summary: ram::summary(paths),
            gpu_name,
            gpu_driver,
            vram_summary: gpu::vram_summary(&records),
            per_gpu_lines: gpu::per_gpu_lines(&records),
            cuda_version: nvml_versions.cuda,
            nvml_version: nvml_versions.nvml,
            rocm_version: gpu::rocm_version(),
            per_nic_lines: nic::nic_lines(paths),
            per_disk_lines: disk::disk_lines(paths),
        }
    }

    /// Human-readable report, one entry per line
    pub fn to_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("OS: {}", self.os_pretty),
            format!("Kernel: {}", or_unknown(&self.kernel_version)),
            format!("GPU Driver: {}", or_unknown(&self.gpu_driver)),
            format!("CUDA: {}", or_unknown(&self.cuda_version)),
            format!("NVML: {}", or_unknown(&self.nvml_version)),
            format!("ROCm: {}", or_unknown(&self.rocm_version)),
            String::new(),
            format!("CPU: {}", self.cpu_name),
            format!(" Physical cores: {}", count_or_unknown(self.cpu_physical_cores)),
            format!(" Logical cores: {}", count_or_unknown(self.cpu_logical_cores)),
            format!(" Cache L1: {}", or_unknown(&self.cpu_cache_l1)),
            format!(" Cache L2: {}", or_unknown(&self.cpu_cache_l2)),
            format!(" Cache L3: {}", or_unknown(&self.cpu_cache_l3)),
            format!(" Instructions: {}", or_unknown(&self.cpu_instructions)),
            format!(" RAM: {}", or_unknown(&self.ram_summary)),
            String::new(),
        ];

        if self.per_gpu_lines.is_empty() {
            lines.push(format!("GPU: {}", or_unknown(&self.gpu_name)));
            lines.push(format!("Memory: {}", or_unknown(&self.vram_summary)));
        } else {
            lines.extend(self.per_gpu_lines.iter().cloned());
        }

        if !self.per_nic_lines.is_empty() || !self.per_disk_lines.is_empty() {
            lines.push(String::new());
            lines.extend(self.per_nic_lines.iter().cloned());
            lines.extend(self.per_disk_lines.iter().cloned());
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unknowns_render_as_placeholder() {
        let info = HardwareInfo {
            os_pretty: "Linux".to_string(),
            cpu_name: "Unknown CPU".to_string(),
            ..Default::default()
        };
        let lines = info.to_lines();

        assert!(lines.len() >= 7);
        assert_eq!(lines[0], "OS: Linux");
        assert_eq!(lines[1], "Kernel: --");
        assert!(lines.contains(&" Physical cores: --".to_string()));
        assert!(lines.contains(&" RAM: --".to_string()));
        assert_eq!(lines[lines.len() - 2], "GPU: --");
        assert_eq!(lines[lines.len() - 1], "Memory: --");
    }

    #[test]
    fn test_per_gpu_lines_replace_summary() {
        let info = HardwareInfo {
            os_pretty: "Arch Linux".to_string(),
            cpu_name: "AMD Ryzen 9 7950X 16-Core Processor".to_string(),
            cpu_physical_cores: Some(16),
            gpu_name: Some("ignored".to_string()),
            per_gpu_lines: vec!["GPU0: Radeon".to_string(), " Memory: 24G".to_string()],
            ..Default::default()
        };
        let lines = info.to_lines();

        assert!(lines.contains(&" Physical cores: 16".to_string()));
        assert!(!lines.iter().any(|l| l.starts_with("GPU: ")));
        assert_eq!(lines.last().map(String::as_str), Some(" Memory: 24G"));
    }

    #[test]
    fn test_nic_and_disk_lines_follow_gpu_section() {
        let info = HardwareInfo {
            os_pretty: "Debian GNU/Linux 12 (bookworm)".to_string(),
            cpu_name: "Intel(R) Core(TM) i5-8500".to_string(),
            per_nic_lines: vec!["NIC0: r8169 (1000 Mb/s)".to_string()],
            per_disk_lines: vec!["Disk0: NVMe WD Blue SN570 1TB 932G".to_string()],
            ..Default::default()
        };
        let lines = info.to_lines();
        let n = lines.len();

        assert_eq!(lines[n - 5], "GPU: --");
        assert_eq!(lines[n - 4], "Memory: --");
        assert_eq!(lines[n - 3], "");
        assert_eq!(lines[n - 2], "NIC0: r8169 (1000 Mb/s)");
        assert_eq!(lines[n - 1], "Disk0: NVMe WD Blue SN570 1TB 932G");
    }

    #[test]
    fn test_collects_nics_and_disks() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for (rel, content) in [
            ("sys/class/net/lo/speed", "-1\n"),
            ("sys/class/net/eth0/speed", "100\n"),
            ("sys/class/net/eth0/device/uevent", "DRIVER=e1000e\n"),
            ("sys/block/sda/size", "1953525168\n"),
            ("sys/block/sda/device/model", "ST1000DM010-2EP1\n"),
        ] {
            let path = root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        let paths = SystemPaths::under(root);
        let gpus = GpuAggregator::new(paths.clone(), Vec::new());

        let info = HardwareInfo::probe(&paths, &gpus, false);
        assert_eq!(info.per_nic_lines, vec!["NIC0: e1000e (100 Mb/s)".to_string()]);
        assert_eq!(info.per_disk_lines, vec!["Disk0: ST1000DM010-2EP1 931.5G".to_string()]);
        assert_eq!(info.to_lines().last().map(String::as_str), Some("Disk0: ST1000DM010-2EP1 931.5G"));
    }

    #[test]
    fn test_probe_on_empty_tree() {
        let dir = TempDir::new().unwrap();
        let paths = SystemPaths::under(dir.path());
        let gpus = GpuAggregator::new(paths.clone(), Vec::new());

        let info = HardwareInfo::probe(&paths, &gpus, false);
        assert!(!info.os_pretty.is_empty());
        assert!(!info.cpu_name.is_empty());
        assert!(info.per_gpu_lines.is_empty());
        assert!(info.per_nic_lines.is_empty());
        assert!(info.per_disk_lines.is_empty());
        assert_eq!(info.nvml_version, None);
        assert!(info.to_lines().len() >= 7);
    }
}
