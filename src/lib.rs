//! aiz - Linux hardware telemetry
//!
//! Samples CPU, per-core CPU, RAM, disk and network throughput and GPU
//! state, and describes the host through a one-shot hardware probe.
//!
//! Rate metrics need two calls: the first one primes the counters and
//! returns `None`. The free functions below share one lazily created
//! default [`Telemetry`]; create your own engine for independent baselines.

pub mod config;
pub mod error;
pub mod gpu;
pub mod hardware;
pub mod logging;
pub mod memory;
pub mod paths;
pub mod sampler;
pub mod snapshot;
pub mod telemetry;

use std::sync::OnceLock;

pub use config::Config;
pub use error::{Result, TelemetryError};
pub use gpu::{GpuTelemetry, GpuVendor, LinuxGpuDevice, LinuxGpuTelemetry, NvmlTelemetry};
pub use hardware::HardwareInfo;
pub use memory::RamUsage;
pub use paths::SystemPaths;
pub use sampler::rate::Reading;
pub use sampler::SamplerOptions;
pub use snapshot::Snapshot;
pub use telemetry::{Telemetry, VendorToggles};

static DEFAULT: OnceLock<Telemetry> = OnceLock::new();

/// The process-wide engine behind the free functions
pub fn default_engine() -> &'static Telemetry {
    DEFAULT.get_or_init(Telemetry::new)
}

pub fn sample_cpu() -> Option<f64> {
    default_engine().sample_cpu()
}

pub fn sample_cpu_max_core() -> Option<f64> {
    default_engine().sample_cpu_max_core()
}

pub fn sample_ram() -> Option<RamUsage> {
    default_engine().sample_ram()
}

pub fn sample_disk_read() -> Option<f64> {
    default_engine().sample_disk_read()
}

pub fn sample_disk_write() -> Option<f64> {
    default_engine().sample_disk_write()
}

pub fn sample_network_rx() -> Option<f64> {
    default_engine().sample_network_rx()
}

pub fn sample_network_tx() -> Option<f64> {
    default_engine().sample_network_tx()
}

pub fn sample_cpu_reading() -> Reading {
    default_engine().sample_cpu_reading()
}

pub fn sample_cpu_max_core_reading() -> Reading {
    default_engine().sample_cpu_max_core_reading()
}

pub fn sample_disk_read_reading() -> Reading {
    default_engine().sample_disk_read_reading()
}

pub fn sample_disk_write_reading() -> Reading {
    default_engine().sample_disk_write_reading()
}

pub fn sample_network_rx_reading() -> Reading {
    default_engine().sample_network_rx_reading()
}

pub fn sample_network_tx_reading() -> Reading {
    default_engine().sample_network_tx_reading()
}

pub fn prime() {
    default_engine().prime()
}

pub fn gpu_count() -> usize {
    default_engine().gpu_count()
}

pub fn enumerate_gpus() -> Vec<LinuxGpuDevice> {
    default_engine().enumerate_gpus()
}

pub fn sample_gpu(index: usize) -> Option<GpuTelemetry> {
    default_engine().sample_gpu(index)
}

pub fn sample_all_gpus() -> Vec<GpuTelemetry> {
    default_engine().sample_all_gpus()
}

pub fn nvml_gpu_count() -> Option<u32> {
    default_engine().nvml_gpu_count()
}

pub fn rocm_gpu_count() -> Option<u32> {
    default_engine().rocm_gpu_count()
}

pub fn nvml_read_telemetry(index: u32) -> Option<NvmlTelemetry> {
    default_engine().nvml_read_telemetry(index)
}

pub fn nvml_read_gpu_name(index: u32) -> Option<String> {
    default_engine().nvml_read_gpu_name(index)
}

pub fn rocm_read_telemetry(index: u32) -> Option<LinuxGpuTelemetry> {
    default_engine().rocm_read_telemetry(index)
}

pub fn probe_hardware() -> HardwareInfo {
    default_engine().probe_hardware()
}

pub fn snapshot() -> Snapshot {
    default_engine().snapshot()
}
