//! AMD adapter over ROCm SMI (`librocm_smi64`)
//!
//! There is no maintained binding crate, so the handful of entry points
//! used here are resolved with `libloading`. The library is opened and
//! `rsmi_init` called once per process.

use std::os::raw::c_int;
use std::sync::OnceLock;

use libloading::Library;
use tracing::debug;

use super::{GpuVendor, LinuxGpuTelemetry, PciAddress, VendorAdapter, VendorTelemetry};
use crate::error::{Result, TelemetryError};

pub const SOURCE: &str = "rocm-smi";

const LIBRARY_CANDIDATES: [&str; 3] = [
    "librocm_smi64.so.1",
    "librocm_smi64.so",
    "librocm_smi64.so.6",
];

const RSMI_STATUS_SUCCESS: c_int = 0;
const RSMI_MEM_TYPE_VRAM: c_int = 0;
const RSMI_TEMP_TYPE_EDGE: u32 = 0;
const RSMI_TEMP_CURRENT: c_int = 0;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

type InitFn = unsafe extern "C" fn(u64) -> c_int;
type NumDevicesFn = unsafe extern "C" fn(*mut u32) -> c_int;
type BusyPercentFn = unsafe extern "C" fn(u32, *mut u32) -> c_int;
type MemoryFn = unsafe extern "C" fn(u32, c_int, *mut u64) -> c_int;
type PowerAveFn = unsafe extern "C" fn(u32, u32, *mut u64) -> c_int;
type TempMetricFn = unsafe extern "C" fn(u32, u32, c_int, *mut i64) -> c_int;
type PerfLevelFn = unsafe extern "C" fn(u32, *mut c_int) -> c_int;
type PciIdFn = unsafe extern "C" fn(u32, *mut u64) -> c_int;

/// Resolved entry points. The `Library` is kept alive alongside them.
struct RocmSmi {
    _lib: Library,
    num_monitor_devices: NumDevicesFn,
    dev_busy_percent_get: BusyPercentFn,
    dev_memory_usage_get: MemoryFn,
    dev_memory_total_get: MemoryFn,
    dev_power_ave_get: Option<PowerAveFn>,
    dev_temp_metric_get: Option<TempMetricFn>,
    dev_perf_level_get: Option<PerfLevelFn>,
    dev_pci_id_get: Option<PciIdFn>,
}

static ROCM_SMI: OnceLock<Option<RocmSmi>> = OnceLock::new();

fn rocm_smi() -> Option<&'static RocmSmi> {
    ROCM_SMI
        .get_or_init(|| match RocmSmi::load() {
            Ok(api) => Some(api),
            Err(e) => {
                debug!("{}", e);
                None
            }
        })
        .as_ref()
}

fn unavailable(detail: impl Into<String>) -> TelemetryError {
    TelemetryError::Library {
        name: "rocm_smi64",
        detail: detail.into(),
    }
}

impl RocmSmi {
    fn load() -> Result<Self> {
        let lib = open_library()?;

        // SAFETY: the symbol types match the ROCm SMI C declarations, and
        // the pointers are only used while `lib` (stored with them) is alive.
        let api = unsafe {
            let init: InitFn = required(&lib, b"rsmi_init\0")?;
            if init(0) != RSMI_STATUS_SUCCESS {
                return Err(unavailable("rsmi_init failed"));
            }

            RocmSmi {
                num_monitor_devices: required(&lib, b"rsmi_num_monitor_devices\0")?,
                dev_busy_percent_get: required(&lib, b"rsmi_dev_busy_percent_get\0")?,
                dev_memory_usage_get: required(&lib, b"rsmi_dev_memory_usage_get\0")?,
                dev_memory_total_get: required(&lib, b"rsmi_dev_memory_total_get\0")?,
                dev_power_ave_get: optional(&lib, b"rsmi_dev_power_ave_get\0"),
                dev_temp_metric_get: optional(&lib, b"rsmi_dev_temp_metric_get\0"),
                dev_perf_level_get: optional(&lib, b"rsmi_dev_perf_level_get\0"),
                dev_pci_id_get: optional(&lib, b"rsmi_dev_pci_id_get\0"),
                _lib: lib,
            }
        };
        Ok(api)
    }

    fn device_count(&self) -> Option<u32> {
        let mut count = 0u32;
        // SAFETY: out-pointer to a live local.
        let status = unsafe { (self.num_monitor_devices)(&mut count) };
        (status == RSMI_STATUS_SUCCESS).then_some(count)
    }

    fn telemetry(&self, index: u32) -> Option<LinuxGpuTelemetry> {
        if index >= self.device_count()? {
            return None;
        }

        let mut t = LinuxGpuTelemetry {
            source: SOURCE.to_string(),
            ..Default::default()
        };

        // SAFETY: every call passes an in-range index and out-pointers to
        // live locals.
        unsafe {
            let mut busy = 0u32;
            if (self.dev_busy_percent_get)(index, &mut busy) == RSMI_STATUS_SUCCESS {
                t.util_pct = Some(busy as f64);
            }

            let mut used = 0u64;
            if (self.dev_memory_usage_get)(index, RSMI_MEM_TYPE_VRAM, &mut used) == RSMI_STATUS_SUCCESS {
                t.vram_used_gib = Some(used as f64 / BYTES_PER_GIB);
            }

            let mut total = 0u64;
            if (self.dev_memory_total_get)(index, RSMI_MEM_TYPE_VRAM, &mut total) == RSMI_STATUS_SUCCESS {
                t.vram_total_gib = Some(total as f64 / BYTES_PER_GIB);
            }

            if let Some(power_ave) = self.dev_power_ave_get {
                let mut microwatts = 0u64;
                if power_ave(index, 0, &mut microwatts) == RSMI_STATUS_SUCCESS {
                    t.watts = Some(microwatts as f64 / 1_000_000.0);
                }
            }

            if let Some(temp_metric) = self.dev_temp_metric_get {
                let mut millidegrees = 0i64;
                if temp_metric(index, RSMI_TEMP_TYPE_EDGE, RSMI_TEMP_CURRENT, &mut millidegrees)
                    == RSMI_STATUS_SUCCESS
                {
                    t.temp_c = Some(millidegrees as f64 / 1000.0);
                }
            }

            if let Some(perf_level) = self.dev_perf_level_get {
                let mut level: c_int = 0;
                if perf_level(index, &mut level) == RSMI_STATUS_SUCCESS {
                    t.pstate = perf_level_label(level).map(str::to_string);
                }
            }
        }

        t.has_data().then_some(t)
    }

    fn bus_id(&self, index: u32) -> Option<String> {
        let pci_id_get = self.dev_pci_id_get?;
        if index >= self.device_count()? {
            return None;
        }
        let mut id = 0u64;
        // SAFETY: in-range index, out-pointer to a live local.
        let status = unsafe { pci_id_get(index, &mut id) };
        if status != RSMI_STATUS_SUCCESS {
            return None;
        }
        pci_address_from_id(id).map(|addr| addr.to_string())
    }
}

fn open_library() -> Result<Library> {
    let mut last_error = String::from("no candidates");
    for name in LIBRARY_CANDIDATES {
        // SAFETY: loading runs the library's initializers; ROCm SMI has no
        // initializer side effects beyond its own state.
        match unsafe { Library::new(name) } {
            Ok(lib) => {
                debug!("loaded {}", name);
                return Ok(lib);
            }
            Err(e) => last_error = format!("{}: {}", name, e),
        }
    }
    Err(unavailable(last_error))
}

unsafe fn required<T: Copy>(lib: &Library, symbol: &[u8]) -> Result<T> {
    lib.get::<T>(symbol).map(|s| *s).map_err(|e| {
        unavailable(format!(
            "missing {}: {}",
            String::from_utf8_lossy(symbol.strip_suffix(b"\0").unwrap_or(symbol)),
            e
        ))
    })
}

unsafe fn optional<T: Copy>(lib: &Library, symbol: &[u8]) -> Option<T> {
    lib.get::<T>(symbol).ok().map(|s| *s)
}

/// `rsmi_dev_perf_level_t` names
fn perf_level_label(level: c_int) -> Option<&'static str> {
    match level {
        0 => Some("auto"),
        1 => Some("low"),
        2 => Some("high"),
        3 => Some("manual"),
        4 => Some("stable"),
        _ => None,
    }
}

/// Decode the packed BDF from `rsmi_dev_pci_id_get`. All-zero ids are
/// treated as unknown.
pub fn pci_address_from_id(id: u64) -> Option<PciAddress> {
    let address = PciAddress {
        domain: ((id >> 32) & 0xffff) as u32,
        bus: ((id >> 8) & 0xff) as u8,
        device: ((id >> 3) & 0x1f) as u8,
        function: (id & 0x7) as u8,
    };
    (address != PciAddress { domain: 0, bus: 0, device: 0, function: 0 }).then_some(address)
}

pub fn gpu_count() -> Option<u32> {
    rocm_smi()?.device_count()
}

pub fn read_telemetry(index: u32) -> Option<LinuxGpuTelemetry> {
    rocm_smi()?.telemetry(index)
}

/// [`VendorAdapter`] for AMD devices
#[derive(Debug, Default, Clone, Copy)]
pub struct RocmAdapter;

impl VendorAdapter for RocmAdapter {
    fn vendor(&self) -> GpuVendor {
        GpuVendor::Amd
    }

    fn source(&self) -> &'static str {
        SOURCE
    }

    fn device_count(&self) -> Option<u32> {
        gpu_count()
    }

    fn telemetry(&self, index: u32) -> Option<VendorTelemetry> {
        read_telemetry(index).map(VendorTelemetry::Linux)
    }

    /// ROCm SMI names are marketing strings from a separate table that is
    /// often missing; the enumeration name is used instead.
    fn device_name(&self, _index: u32) -> Option<String> {
        None
    }

    fn bus_id(&self, index: u32) -> Option<String> {
        rocm_smi()?.bus_id(index)
    }
}
