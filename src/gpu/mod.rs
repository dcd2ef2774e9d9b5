//! GPU telemetry
//!
//! Devices are enumerated from DRM/sysfs; vendor libraries (NVML for NVIDIA,
//! ROCm SMI for AMD) add detail when they can be loaded, with sysfs readers
//! as the fallback. See [`aggregate::GpuAggregator`] for the merge rules.

pub mod aggregate;
pub mod nvml;
pub mod rocm;
pub mod sysfs;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// GPU vendor
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    #[default]
    Unknown,
}

impl std::fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuVendor::Nvidia => write!(f, "NVIDIA"),
            GpuVendor::Amd => write!(f, "AMD"),
            GpuVendor::Intel => write!(f, "Intel"),
            GpuVendor::Unknown => write!(f, "Unknown"),
        }
    }
}

impl GpuVendor {
    /// From the PCI vendor id in `device/vendor`
    pub fn from_pci_id(id: u64) -> Self {
        match id {
            0x10de => GpuVendor::Nvidia,
            // 0x1022 is the AMD CPU/chipset id, seen on some APU functions
            0x1002 | 0x1022 => GpuVendor::Amd,
            0x8086 => GpuVendor::Intel,
            _ => GpuVendor::Unknown,
        }
    }

    /// Best guess from the kernel driver bound to the device
    pub fn from_driver(driver: &str) -> Self {
        match driver {
            "nvidia" | "nouveau" => GpuVendor::Nvidia,
            "amdgpu" | "radeon" => GpuVendor::Amd,
            "i915" | "xe" => GpuVendor::Intel,
            _ => GpuVendor::Unknown,
        }
    }
}

/// One DRM card backed by a display-class PCI function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinuxGpuDevice {
    /// Position in the enumeration, stable for the life of the system
    pub index: usize,
    /// e.g. `card0`
    pub drm_card: String,
    /// e.g. `/sys/class/drm/card0/device`
    pub sysfs_device_path: PathBuf,
    /// e.g. `0000:03:00.0`
    pub pci_slot_name: Option<String>,
    pub vendor: GpuVendor,
    /// e.g. `amdgpu`, `i915`, `xe`, `nvidia`
    pub driver: Option<String>,
}

/// Readings from ROCm SMI or the sysfs fallback readers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinuxGpuTelemetry {
    pub util_pct: Option<f64>,
    pub vram_used_gib: Option<f64>,
    pub vram_total_gib: Option<f64>,
    pub watts: Option<f64>,
    pub temp_c: Option<f64>,
    pub pstate: Option<String>,
    /// e.g. `rocm-smi`, `amdgpu-sysfs`, `i915-sysfs`
    pub source: String,
}

impl LinuxGpuTelemetry {
    pub fn has_data(&self) -> bool {
        self.util_pct.is_some()
            || self.vram_used_gib.is_some()
            || self.vram_total_gib.is_some()
            || self.watts.is_some()
            || self.temp_c.is_some()
            || self.pstate.is_some()
    }
}

/// Readings from one NVML device. Each field is set only when its query succeeded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NvmlTelemetry {
    pub gpu_util_pct: Option<f64>,
    pub mem_util_pct: Option<f64>,
    pub mem_used_gib: Option<f64>,
    pub mem_total_gib: Option<f64>,
    pub power_watts: Option<f64>,
    pub temp_c: Option<f64>,
    /// `P0` (max performance) .. `P15`
    pub pstate: Option<String>,
    pub gpu_clock_mhz: Option<u32>,
    pub mem_clock_mhz: Option<u32>,
    pub encoder_util_pct: Option<f64>,
    pub decoder_util_pct: Option<f64>,
    pub max_power_limit_watts: Option<f64>,
}

impl NvmlTelemetry {
    pub fn has_data(&self) -> bool {
        self.gpu_util_pct.is_some()
            || self.mem_used_gib.is_some()
            || self.mem_total_gib.is_some()
            || self.power_watts.is_some()
            || self.temp_c.is_some()
    }
}

/// Merged record for one enumerated GPU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuTelemetry {
    /// Same as [`LinuxGpuDevice::index`]
    pub index: usize,
    pub name: String,
    pub vendor: GpuVendor,
    pub util_pct: Option<f64>,
    pub vram_used_gib: Option<f64>,
    pub vram_total_gib: Option<f64>,
    pub temp_c: Option<f64>,
    pub power_watts: Option<f64>,
    pub pstate: Option<String>,
    pub gpu_clock_mhz: Option<u32>,
    pub mem_clock_mhz: Option<u32>,
    /// Where the detail came from: `nvml`, `rocm-smi`, `amdgpu-sysfs`, ... or
    /// plain `sysfs` when only the enumeration is known
    pub source: String,
}

impl GpuTelemetry {
    /// Record carrying only what the enumeration knows
    pub fn from_device(device: &LinuxGpuDevice) -> Self {
        GpuTelemetry {
            index: device.index,
            name: fallback_name(device),
            vendor: device.vendor,
            util_pct: None,
            vram_used_gib: None,
            vram_total_gib: None,
            temp_c: None,
            power_watts: None,
            pstate: None,
            gpu_clock_mhz: None,
            mem_clock_mhz: None,
            source: sysfs::SOURCE.to_string(),
        }
    }

    pub fn apply(&mut self, detail: &VendorTelemetry) {
        match detail {
            VendorTelemetry::Nvml(t) => {
                self.util_pct = t.gpu_util_pct;
                self.vram_used_gib = t.mem_used_gib;
                self.vram_total_gib = t.mem_total_gib;
                self.temp_c = t.temp_c;
                self.power_watts = t.power_watts;
                self.pstate = t.pstate.clone();
                self.gpu_clock_mhz = t.gpu_clock_mhz;
                self.mem_clock_mhz = t.mem_clock_mhz;
            }
            VendorTelemetry::Linux(t) => {
                self.util_pct = t.util_pct;
                self.vram_used_gib = t.vram_used_gib;
                self.vram_total_gib = t.vram_total_gib;
                self.temp_c = t.temp_c;
                self.power_watts = t.watts;
                self.pstate = t.pstate.clone();
                self.source = t.source.clone();
            }
        }
    }
}

/// `"<driver> (<card>)"`, or `"<Vendor> GPU (<card>)"` without a driver
pub fn fallback_name(device: &LinuxGpuDevice) -> String {
    match device.driver.as_deref() {
        Some(driver) if !driver.is_empty() => format!("{} ({})", driver, device.drm_card),
        _ => format!("{} GPU ({})", device.vendor, device.drm_card),
    }
}

/// Detail produced by a vendor adapter
#[derive(Debug, Clone, PartialEq)]
pub enum VendorTelemetry {
    Nvml(NvmlTelemetry),
    Linux(LinuxGpuTelemetry),
}

impl VendorTelemetry {
    pub fn has_data(&self) -> bool {
        match self {
            VendorTelemetry::Nvml(t) => t.has_data(),
            VendorTelemetry::Linux(t) => t.has_data(),
        }
    }
}

/// A vendor library that can describe some of the enumerated GPUs.
///
/// Implementations load their library at most once per process and return
/// `None` from everything when it is missing.
pub trait VendorAdapter: Send + Sync {
    fn vendor(&self) -> GpuVendor;

    /// Value written to [`GpuTelemetry::source`] on a match
    fn source(&self) -> &'static str;

    /// `None` when the library cannot be loaded or initialized
    fn device_count(&self) -> Option<u32>;

    fn telemetry(&self, index: u32) -> Option<VendorTelemetry>;

    fn device_name(&self, index: u32) -> Option<String>;

    /// PCI address as reported by the library, any domain width
    fn bus_id(&self, index: u32) -> Option<String>;
}

/// Parsed `domain:bus:device.function`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciAddress {
    pub domain: u32,
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl PciAddress {
    /// Accepts `0000:03:00.0`, NVML's `00000000:03:00.0` and `03:00.0`
    /// (domain 0), any hex case.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (rest, function) = s.rsplit_once('.')?;
        let mut parts = rest.rsplitn(3, ':');
        let device = parts.next()?;
        let bus = parts.next()?;
        let domain = parts.next().unwrap_or("0");

        Some(PciAddress {
            domain: u32::from_str_radix(domain, 16).ok()?,
            bus: u8::from_str_radix(bus, 16).ok()?,
            device: u8::from_str_radix(device, 16).ok()?,
            function: function.parse().ok()?,
        })
    }
}

impl std::fmt::Display for PciAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{}",
            self.domain, self.bus, self.device, self.function
        )
    }
}
