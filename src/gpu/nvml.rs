//! NVIDIA adapter over NVML
//!
//! The library is loaded on first use and kept for the life of the process.
//! Device counts and readings are queried fresh on every call.

use std::sync::OnceLock;

use nvml_wrapper::enum_wrappers::device::{Clock, PerformanceState, TemperatureSensor};
use nvml_wrapper::{cuda_driver_version_major, cuda_driver_version_minor, Device, Nvml};
use tracing::debug;

use super::{GpuVendor, NvmlTelemetry, VendorAdapter, VendorTelemetry};

pub const SOURCE: &str = "nvml";

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

static NVML: OnceLock<Option<Nvml>> = OnceLock::new();

/// Process-wide NVML handle, `None` when the library is missing
pub fn nvml() -> Option<&'static Nvml> {
    NVML.get_or_init(|| match Nvml::init() {
        Ok(nvml) => Some(nvml),
        Err(e) => {
            debug!("NVML unavailable: {}", e);
            None
        }
    })
    .as_ref()
}

pub fn gpu_count() -> Option<u32> {
    let nvml = nvml()?;
    match nvml.device_count() {
        Ok(count) => Some(count),
        Err(e) => {
            debug!("NVML device count failed: {}", e);
            None
        }
    }
}

fn device(index: u32) -> Option<Device<'static>> {
    nvml()?.device_by_index(index).ok()
}

/// Everything NVML will tell about one device. `None` when the index is
/// out of range or no query succeeded.
pub fn read_telemetry(index: u32) -> Option<NvmlTelemetry> {
    let device = device(index)?;

    let utilization = device.utilization_rates().ok();
    let memory = device.memory_info().ok();

    let telemetry = NvmlTelemetry {
        gpu_util_pct: utilization.as_ref().map(|u| u.gpu as f64),
        mem_util_pct: utilization.as_ref().map(|u| u.memory as f64),
        mem_used_gib: memory.as_ref().map(|m| m.used as f64 / BYTES_PER_GIB),
        mem_total_gib: memory.as_ref().map(|m| m.total as f64 / BYTES_PER_GIB),
        power_watts: device.power_usage().ok().map(|mw| mw as f64 / 1000.0),
        temp_c: device
            .temperature(TemperatureSensor::Gpu)
            .ok()
            .map(|c| c as f64),
        pstate: device.performance_state().ok().and_then(pstate_label),
        gpu_clock_mhz: clock_mhz(&device, Clock::Graphics),
        mem_clock_mhz: clock_mhz(&device, Clock::Memory),
        encoder_util_pct: device
            .encoder_utilization()
            .ok()
            .map(|u| u.utilization as f64),
        decoder_util_pct: device
            .decoder_utilization()
            .ok()
            .map(|u| u.utilization as f64),
        max_power_limit_watts: device
            .power_management_limit_constraints()
            .ok()
            .map(|c| c.max_limit as f64 / 1000.0),
    };

    telemetry.has_data().then_some(telemetry)
}

pub fn read_gpu_name(index: u32) -> Option<String> {
    device(index)?.name().ok()
}

pub fn read_bus_id(index: u32) -> Option<String> {
    device(index)?.pci_info().ok().map(|pci| pci.bus_id)
}

/// Current clock, falling back to the max clock when the current one reads 0
/// or is not supported (some datacenter parts while idle).
fn clock_mhz(device: &Device<'_>, clock: Clock) -> Option<u32> {
    device
        .clock_info(clock.clone())
        .ok()
        .filter(|mhz| *mhz > 0)
        .or_else(|| device.max_clock_info(clock).ok().filter(|mhz| *mhz > 0))
}

fn pstate_label(state: PerformanceState) -> Option<String> {
    let level = match state {
        PerformanceState::Zero => 0,
        PerformanceState::One => 1,
        PerformanceState::Two => 2,
        PerformanceState::Three => 3,
        PerformanceState::Four => 4,
        PerformanceState::Five => 5,
        PerformanceState::Six => 6,
        PerformanceState::Seven => 7,
        PerformanceState::Eight => 8,
        PerformanceState::Nine => 9,
        PerformanceState::Ten => 10,
        PerformanceState::Eleven => 11,
        PerformanceState::Twelve => 12,
        PerformanceState::Thirteen => 13,
        PerformanceState::Fourteen => 14,
        PerformanceState::Fifteen => 15,
        PerformanceState::Unknown => return None,
    };
    Some(format!("P{}", level))
}

/// Version strings reported through NVML
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NvmlVersions {
    pub driver: Option<String>,
    pub nvml: Option<String>,
    /// `major.minor` of the CUDA version the driver supports
    pub cuda: Option<String>,
}

pub fn versions() -> NvmlVersions {
    let Some(nvml) = nvml() else {
        return NvmlVersions::default();
    };

    NvmlVersions {
        driver: nvml.sys_driver_version().ok(),
        nvml: nvml.sys_nvml_version().ok(),
        cuda: nvml.sys_cuda_driver_version().ok().map(|v| {
            format!(
                "{}.{}",
                cuda_driver_version_major(v),
                cuda_driver_version_minor(v)
            )
        }),
    }
}

/// [`VendorAdapter`] for NVIDIA devices
#[derive(Debug, Default, Clone, Copy)]
pub struct NvmlAdapter;

impl VendorAdapter for NvmlAdapter {
    fn vendor(&self) -> GpuVendor {
        GpuVendor::Nvidia
    }

    fn source(&self) -> &'static str {
        SOURCE
    }

    fn device_count(&self) -> Option<u32> {
        gpu_count()
    }

    fn telemetry(&self, index: u32) -> Option<VendorTelemetry> {
        read_telemetry(index).map(VendorTelemetry::Nvml)
    }

    fn device_name(&self, index: u32) -> Option<String> {
        read_gpu_name(index)
    }

    fn bus_id(&self, index: u32) -> Option<String> {
        read_bus_id(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pstate_labels() {
        assert_eq!(pstate_label(PerformanceState::Zero).as_deref(), Some("P0"));
        assert_eq!(pstate_label(PerformanceState::Eight).as_deref(), Some("P8"));
        assert_eq!(pstate_label(PerformanceState::Unknown), None);
    }

    #[test]
    fn test_queries_never_panic_without_driver() {
        // Works with or without an NVIDIA driver on the test host.
        let count = gpu_count();
        if count.is_none() {
            assert_eq!(read_telemetry(0), None);
            assert_eq!(read_gpu_name(0), None);
            assert_eq!(versions(), NvmlVersions::default());
        }
        if let Some(count) = count {
            assert!(read_telemetry(count).is_none());
        }
    }
}
