//! The telemetry engine
//!
//! [`Telemetry`] owns one counter store, so rate metrics are measured
//! between calls on the same engine. Independent engines never share
//! baselines.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::debug;

use crate::config::Config;
use crate::gpu::aggregate::GpuAggregator;
use crate::gpu::nvml::{self, NvmlAdapter};
use crate::gpu::rocm::{self, RocmAdapter};
use crate::gpu::{GpuTelemetry, LinuxGpuDevice, LinuxGpuTelemetry, NvmlTelemetry, VendorAdapter};
use crate::hardware::HardwareInfo;
use crate::memory::{read_ram_usage, RamUsage};
use crate::paths::SystemPaths;
use crate::sampler::rate::Reading;
use crate::sampler::store::ByteStream;
use crate::sampler::{RateSampler, SamplerOptions};
use crate::snapshot::Snapshot;

/// Which vendor libraries the engine may load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorToggles {
    pub nvml: bool,
    pub rocm: bool,
}

impl Default for VendorToggles {
    fn default() -> Self {
        Self {
            nvml: true,
            rocm: true,
        }
    }
}

#[derive(Debug)]
pub struct Telemetry {
    paths: SystemPaths,
    sampler: RateSampler,
    gpus: GpuAggregator,
    vendors: VendorToggles,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    /// Engine over the live `/proc` and `/sys` with default settings
    pub fn new() -> Self {
        Self::with_paths(
            SystemPaths::default(),
            SamplerOptions::default(),
            VendorToggles::default(),
        )
    }

    pub fn with_config(config: &Config) -> Self {
        Self::with_paths(
            SystemPaths::default(),
            config.sampler_options(),
            VendorToggles {
                nvml: config.gpu.enable_nvml,
                rocm: config.gpu.enable_rocm,
            },
        )
    }

    pub fn with_paths(paths: SystemPaths, options: SamplerOptions, vendors: VendorToggles) -> Self {
        let mut adapters: Vec<Arc<dyn VendorAdapter>> = Vec::new();
        if vendors.nvml {
            adapters.push(Arc::new(NvmlAdapter));
        }
        if vendors.rocm {
            adapters.push(Arc::new(RocmAdapter));
        }

        Self {
            sampler: RateSampler::new(paths.clone(), options),
            gpus: GpuAggregator::new(paths.clone(), adapters),
            paths,
            vendors,
        }
    }

    pub fn sampler(&self) -> &RateSampler {
        &self.sampler
    }

    pub fn vendors(&self) -> VendorToggles {
        self.vendors
    }

    // Rate metrics

    pub fn sample_cpu_reading(&self) -> Reading {
        self.sampler.cpu()
    }

    /// Overall CPU utilization in percent; `None` while priming
    pub fn sample_cpu(&self) -> Option<f64> {
        self.sample_cpu_reading().value()
    }

    pub fn sample_cpu_max_core_reading(&self) -> Reading {
        self.sampler.cpu_max_core()
    }

    /// Utilization of the busiest logical core in percent
    pub fn sample_cpu_max_core(&self) -> Option<f64> {
        self.sample_cpu_max_core_reading().value()
    }

    pub fn sample_disk_read_reading(&self) -> Reading {
        self.sampler.bytes(ByteStream::DiskRead)
    }

    /// MB/s read across whole disks
    pub fn sample_disk_read(&self) -> Option<f64> {
        self.sample_disk_read_reading().value()
    }

    pub fn sample_disk_write_reading(&self) -> Reading {
        self.sampler.bytes(ByteStream::DiskWrite)
    }

    pub fn sample_disk_write(&self) -> Option<f64> {
        self.sample_disk_write_reading().value()
    }

    pub fn sample_network_rx_reading(&self) -> Reading {
        self.sampler.bytes(ByteStream::NetworkRx)
    }

    /// MB/s received on all interfaces except loopback
    pub fn sample_network_rx(&self) -> Option<f64> {
        self.sample_network_rx_reading().value()
    }

    pub fn sample_network_tx_reading(&self) -> Reading {
        self.sampler.bytes(ByteStream::NetworkTx)
    }

    pub fn sample_network_tx(&self) -> Option<f64> {
        self.sample_network_tx_reading().value()
    }

    /// Establish baselines for all six rate streams
    pub fn prime(&self) {
        self.sampler.prime_at(Instant::now());
    }

    pub fn sample_ram(&self) -> Option<RamUsage> {
        match read_ram_usage(&self.paths) {
            Ok(usage) => Some(usage),
            Err(e) => {
                debug!("ram sample unavailable: {}", e);
                None
            }
        }
    }

    // GPUs

    pub fn gpu_count(&self) -> usize {
        self.gpus.count()
    }

    pub fn enumerate_gpus(&self) -> Vec<LinuxGpuDevice> {
        self.gpus.enumerate()
    }

    pub fn sample_gpu(&self, index: usize) -> Option<GpuTelemetry> {
        self.gpus.sample(index)
    }

    pub fn sample_all_gpus(&self) -> Vec<GpuTelemetry> {
        self.gpus.sample_all()
    }

    pub fn nvml_gpu_count(&self) -> Option<u32> {
        self.vendors.nvml.then(nvml::gpu_count).flatten()
    }

    pub fn rocm_gpu_count(&self) -> Option<u32> {
        self.vendors.rocm.then(rocm::gpu_count).flatten()
    }

    pub fn nvml_read_telemetry(&self, index: u32) -> Option<NvmlTelemetry> {
        self.vendors.nvml.then(|| nvml::read_telemetry(index)).flatten()
    }

    pub fn nvml_read_gpu_name(&self, index: u32) -> Option<String> {
        self.vendors.nvml.then(|| nvml::read_gpu_name(index)).flatten()
    }

    pub fn rocm_read_telemetry(&self, index: u32) -> Option<LinuxGpuTelemetry> {
        self.vendors.rocm.then(|| rocm::read_telemetry(index)).flatten()
    }

    // Probe and snapshot

    pub fn probe_hardware(&self) -> HardwareInfo {
        HardwareInfo::probe(&self.paths, &self.gpus, self.vendors.nvml)
    }

    /// Poll every metric once. Rate readings are `Priming` unless the
    /// engine was primed or sampled earlier.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            timestamp: Utc::now(),
            cpu_pct: self.sample_cpu_reading(),
            cpu_max_core_pct: self.sample_cpu_max_core_reading(),
            disk_read_mbps: self.sample_disk_read_reading(),
            disk_write_mbps: self.sample_disk_write_reading(),
            network_rx_mbps: self.sample_network_rx_reading(),
            network_tx_mbps: self.sample_network_tx_reading(),
            ram: self.sample_ram(),
            gpus: self.sample_all_gpus(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn offline() -> VendorToggles {
        VendorToggles {
            nvml: false,
            rocm: false,
        }
    }

    fn engine(dir: &TempDir) -> Telemetry {
        Telemetry::with_paths(SystemPaths::under(dir.path()), SamplerOptions::default(), offline())
    }

    #[test]
    fn test_first_sample_primes() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "proc/stat", "cpu  100 0 100 800 0 0 0 0 0 0\ncpu0 100 0 100 800 0 0 0 0 0 0\n");
        let telemetry = engine(&dir);

        assert_eq!(telemetry.sample_cpu_reading(), Reading::Priming);
        assert_eq!(telemetry.sample_cpu(), None);
        // Missing diskstats is unavailable rather than priming
        assert_eq!(telemetry.sample_disk_read_reading(), Reading::Unavailable);
    }

    #[test]
    fn test_engines_do_not_share_baselines() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "proc/stat", "cpu  100 0 100 800 0 0 0 0 0 0\n");
        let a = engine(&dir);
        let b = engine(&dir);

        a.prime();
        assert!(a.sampler().store().cpu_baseline().is_some());
        assert!(b.sampler().store().cpu_baseline().is_none());
    }

    #[test]
    fn test_ram() {
        let dir = TempDir::new().unwrap();
        let telemetry = engine(&dir);
        assert_eq!(telemetry.sample_ram(), None);

        write(dir.path(), "proc/meminfo", "MemTotal: 4194304 kB\nMemFree: 1 kB\nMemAvailable: 1048576 kB\n");
        let ram = telemetry.sample_ram().unwrap();
        assert_eq!(ram.total_gib, 4.0);
        assert_eq!(ram.used_gib, 3.0);
        assert_eq!(ram.used_pct, 75.0);
    }

    #[test]
    fn test_disabled_vendors_report_nothing() {
        let dir = TempDir::new().unwrap();
        let telemetry = engine(&dir);

        assert_eq!(telemetry.nvml_gpu_count(), None);
        assert_eq!(telemetry.rocm_gpu_count(), None);
        assert_eq!(telemetry.nvml_read_telemetry(0), None);
        assert_eq!(telemetry.nvml_read_gpu_name(0), None);
        assert_eq!(telemetry.rocm_read_telemetry(0), None);
    }

    #[test]
    fn test_gpu_surface_on_fixture() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "sys/class/drm/card0/device/vendor", "0x1002\n");
        write(dir.path(), "sys/class/drm/card0/device/class", "0x030000\n");
        write(dir.path(), "sys/class/drm/card0/device/uevent", "DRIVER=amdgpu\n");
        write(dir.path(), "sys/class/drm/card0/device/gpu_busy_percent", "42\n");
        let telemetry = engine(&dir);

        assert_eq!(telemetry.gpu_count(), 1);
        assert_eq!(telemetry.enumerate_gpus().len(), telemetry.gpu_count());

        let gpu = telemetry.sample_gpu(0).unwrap();
        assert_eq!(gpu.util_pct, Some(42.0));
        assert_eq!(gpu.source, "amdgpu-sysfs");
        assert!(telemetry.sample_gpu(1).is_none());
        assert_eq!(telemetry.sample_all_gpus(), vec![gpu]);
    }

    #[test]
    fn test_snapshot_after_prime() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "proc/net/dev", "h1\nh2\n  eth0: 1048576 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0\n");
        let telemetry = Telemetry::with_paths(
            SystemPaths::under(dir.path()),
            SamplerOptions {
                min_interval: std::time::Duration::ZERO,
                ..Default::default()
            },
            offline(),
        );

        telemetry.prime();
        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.disk_read_mbps, Reading::Unavailable);
        // Counters did not move since prime: either still inside the same
        // instant or a zero rate.
        assert!(
            snapshot.network_rx_mbps == Reading::Priming
                || snapshot.network_rx_mbps == Reading::Value(0.0),
            "unexpected rx reading {:?}",
            snapshot.network_rx_mbps
        );
        assert!(snapshot.gpus.is_empty());
        assert_eq!(snapshot.ram, None);
    }
}
