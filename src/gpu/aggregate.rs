//! Merge the DRM enumeration with vendor-library detail

use std::sync::Arc;

use tracing::debug;

use super::sysfs::{enumerate_gpus, read_sysfs_telemetry};
use super::{GpuTelemetry, LinuxGpuDevice, PciAddress, VendorAdapter, VendorTelemetry};
use crate::paths::SystemPaths;

/// Produces one [`GpuTelemetry`] per enumerated device.
///
/// The enumeration decides how many GPUs there are and their indices. For
/// each device the adapter of the same vendor is asked for detail, matched
/// by PCI bus id when the adapter reports bus ids and by vendor-local
/// position otherwise. Without a vendor match the sysfs readers are used.
#[derive(Clone)]
pub struct GpuAggregator {
    paths: SystemPaths,
    adapters: Vec<Arc<dyn VendorAdapter>>,
}

impl std::fmt::Debug for GpuAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sources: Vec<&str> = self.adapters.iter().map(|a| a.source()).collect();
        f.debug_struct("GpuAggregator")
            .field("paths", &self.paths)
            .field("adapters", &sources)
            .finish()
    }
}

impl GpuAggregator {
    pub fn new(paths: SystemPaths, adapters: Vec<Arc<dyn VendorAdapter>>) -> Self {
        Self { paths, adapters }
    }

    pub fn enumerate(&self) -> Vec<LinuxGpuDevice> {
        enumerate_gpus(&self.paths)
    }

    pub fn count(&self) -> usize {
        self.enumerate().len()
    }

    pub fn sample_all(&self) -> Vec<GpuTelemetry> {
        let devices = self.enumerate();
        devices
            .iter()
            .map(|device| self.merge(device, &devices))
            .collect()
    }

    pub fn sample(&self, index: usize) -> Option<GpuTelemetry> {
        let devices = self.enumerate();
        let device = devices.get(index)?;
        Some(self.merge(device, &devices))
    }

    fn merge(&self, device: &LinuxGpuDevice, all: &[LinuxGpuDevice]) -> GpuTelemetry {
        let mut record = GpuTelemetry::from_device(device);

        if let Some(adapter) = self.adapter_for(device) {
            if let Some(vendor_index) = match_vendor_index(adapter.as_ref(), device, all) {
                if let Some(detail) = adapter.telemetry(vendor_index).filter(VendorTelemetry::has_data) {
                    record.apply(&detail);
                    record.source = adapter.source().to_string();
                    if let Some(name) = adapter.device_name(vendor_index) {
                        record.name = name;
                    }
                    return record;
                }
                debug!(
                    "{} matched {} but returned no data",
                    adapter.source(),
                    device.drm_card
                );
            }
        }

        if let Some(sysfs) = read_sysfs_telemetry(device) {
            record.apply(&VendorTelemetry::Linux(sysfs));
        }
        record
    }

    fn adapter_for(&self, device: &LinuxGpuDevice) -> Option<&Arc<dyn VendorAdapter>> {
        self.adapters.iter().find(|a| a.vendor() == device.vendor)
    }
}

/// The adapter-side index of `device`, if any.
fn match_vendor_index(
    adapter: &dyn VendorAdapter,
    device: &LinuxGpuDevice,
    all: &[LinuxGpuDevice],
) -> Option<u32> {
    let count = adapter.device_count()?;
    if count == 0 {
        return None;
    }

    let bus_ids: Vec<(u32, PciAddress)> = (0..count)
        .filter_map(|i| {
            let addr = PciAddress::parse(&adapter.bus_id(i)?)?;
            Some((i, addr))
        })
        .collect();

    if !bus_ids.is_empty() {
        let wanted = device.pci_slot_name.as_deref().and_then(PciAddress::parse)?;
        return bus_ids
            .into_iter()
            .find(|(_, addr)| *addr == wanted)
            .map(|(i, _)| i);
    }

    let ordinal = all
        .iter()
        .filter(|d| d.vendor == device.vendor)
        .position(|d| d.index == device.index)?;
    let ordinal = u32::try_from(ordinal).ok()?;
    (ordinal < count).then_some(ordinal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuVendor, LinuxGpuTelemetry, NvmlTelemetry};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Adapter answering from a fixed table
    struct FakeAdapter {
        vendor: GpuVendor,
        devices: Option<Vec<(Option<&'static str>, &'static str, f64)>>,
    }

    impl VendorAdapter for FakeAdapter {
        fn vendor(&self) -> GpuVendor {
            self.vendor
        }

        fn source(&self) -> &'static str {
            "fake"
        }

        fn device_count(&self) -> Option<u32> {
            self.devices.as_ref().map(|d| d.len() as u32)
        }

        fn telemetry(&self, index: u32) -> Option<VendorTelemetry> {
            let (_, _, util) = self.devices.as_ref()?.get(index as usize)?;
            Some(VendorTelemetry::Nvml(NvmlTelemetry {
                gpu_util_pct: Some(*util),
                gpu_clock_mhz: Some(1800),
                ..Default::default()
            }))
        }

        fn device_name(&self, index: u32) -> Option<String> {
            let (_, name, _) = self.devices.as_ref()?.get(index as usize)?;
            Some(name.to_string())
        }

        fn bus_id(&self, index: u32) -> Option<String> {
            let (bus, _, _) = self.devices.as_ref()?.get(index as usize)?;
            bus.map(str::to_string)
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn add_card(root: &Path, card: &str, vendor: &str, driver: &str, slot: &str) {
        let device = format!("sys/class/drm/{}/device", card);
        write(root, &format!("{}/vendor", device), vendor);
        write(root, &format!("{}/class", device), "0x030000");
        write(
            root,
            &format!("{}/uevent", device),
            &format!("DRIVER={}\nPCI_SLOT_NAME={}\n", driver, slot),
        );
    }

    /// card0 Intel iGPU, card1 and card2 NVIDIA
    fn mixed_host() -> TempDir {
        let dir = TempDir::new().unwrap();
        add_card(dir.path(), "card0", "0x8086", "i915", "0000:00:02.0");
        add_card(dir.path(), "card1", "0x10de", "nvidia", "0000:01:00.0");
        add_card(dir.path(), "card2", "0x10de", "nvidia", "0000:02:00.0");
        write(
            dir.path(),
            "sys/class/drm/card0/device/gt_busy_percent",
            "7\n",
        );
        dir
    }

    fn aggregator(dir: &TempDir, adapters: Vec<Arc<dyn VendorAdapter>>) -> GpuAggregator {
        GpuAggregator::new(SystemPaths::under(dir.path()), adapters)
    }

    #[test]
    fn test_matches_by_bus_id() {
        let dir = mixed_host();
        // NVML lists the devices in a different order than DRM.
        let nvidia = FakeAdapter {
            vendor: GpuVendor::Nvidia,
            devices: Some(vec![
                (Some("00000000:02:00.0"), "RTX B", 20.0),
                (Some("00000000:01:00.0"), "RTX A", 10.0),
            ]),
        };
        let gpus = aggregator(&dir, vec![Arc::new(nvidia)]).sample_all();

        assert_eq!(gpus.len(), 3);
        let indices: Vec<usize> = gpus.iter().map(|g| g.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);

        assert_eq!(gpus[0].source, "i915-sysfs");
        assert_eq!(gpus[0].util_pct, Some(7.0));
        assert_eq!(gpus[0].name, "i915 (card0)");

        assert_eq!(gpus[1].name, "RTX A");
        assert_eq!(gpus[1].util_pct, Some(10.0));
        assert_eq!(gpus[1].gpu_clock_mhz, Some(1800));
        assert_eq!(gpus[1].source, "fake");
        assert_eq!(gpus[2].name, "RTX B");
    }

    #[test]
    fn test_matches_by_vendor_ordinal_without_bus_ids() {
        let dir = mixed_host();
        let nvidia = FakeAdapter {
            vendor: GpuVendor::Nvidia,
            devices: Some(vec![(None, "first", 1.0), (None, "second", 2.0)]),
        };
        let agg = aggregator(&dir, vec![Arc::new(nvidia)]);

        // card2 is the second NVIDIA device even though it is DRM index 2.
        let gpu = agg.sample(2).unwrap();
        assert_eq!(gpu.name, "second");
        assert_eq!(gpu.util_pct, Some(2.0));
    }

    #[test]
    fn test_unavailable_adapter_falls_back() {
        let dir = mixed_host();
        let nvidia = FakeAdapter {
            vendor: GpuVendor::Nvidia,
            devices: None,
        };
        let agg = aggregator(&dir, vec![Arc::new(nvidia)]);

        let gpu = agg.sample(1).unwrap();
        assert_eq!(gpu.source, "sysfs");
        assert_eq!(gpu.name, "nvidia (card1)");
        assert_eq!(gpu.util_pct, None);
        assert_eq!(gpu.vendor, GpuVendor::Nvidia);
    }

    #[test]
    fn test_unmatched_bus_id_is_not_guessed() {
        let dir = mixed_host();
        let nvidia = FakeAdapter {
            vendor: GpuVendor::Nvidia,
            devices: Some(vec![(Some("0000:41:00.0"), "elsewhere", 99.0)]),
        };
        let gpus = aggregator(&dir, vec![Arc::new(nvidia)]).sample_all();
        assert!(gpus.iter().all(|g| g.util_pct != Some(99.0)));
    }

    #[test]
    fn test_count_matches_enumeration() {
        let dir = mixed_host();
        let agg = aggregator(&dir, Vec::new());
        assert_eq!(agg.count(), agg.enumerate().len());
        assert_eq!(agg.sample_all().len(), 3);
        assert!(agg.sample(3).is_none());
    }

    #[test]
    fn test_linux_detail_keeps_adapter_source() {
        struct AmdFake;
        impl VendorAdapter for AmdFake {
            fn vendor(&self) -> GpuVendor {
                GpuVendor::Amd
            }
            fn source(&self) -> &'static str {
                "rocm-smi"
            }
            fn device_count(&self) -> Option<u32> {
                Some(1)
            }
            fn telemetry(&self, _index: u32) -> Option<VendorTelemetry> {
                Some(VendorTelemetry::Linux(LinuxGpuTelemetry {
                    util_pct: Some(55.0),
                    source: "rocm-smi".to_string(),
                    ..Default::default()
                }))
            }
            fn device_name(&self, _index: u32) -> Option<String> {
                None
            }
            fn bus_id(&self, _index: u32) -> Option<String> {
                Some("0000:03:00.0".to_string())
            }
        }

        let dir = TempDir::new().unwrap();
        add_card(dir.path(), "card0", "0x1002", "amdgpu", "0000:03:00.0");
        let gpu = aggregator(&dir, vec![Arc::new(AmdFake)]).sample(0).unwrap();
        assert_eq!(gpu.source, "rocm-smi");
        assert_eq!(gpu.util_pct, Some(55.0));
        assert_eq!(gpu.name, "amdgpu (card0)");
    }
}
