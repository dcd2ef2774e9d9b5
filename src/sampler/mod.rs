//! Rate sampler
//!
//! Turns cumulative OS counters into CPU percentages and MB/s throughput.
//! Every stream needs one priming call before it reports a value.

pub mod cpu;
pub mod disk;
pub mod network;
pub mod rate;
pub mod store;

use std::time::{Duration, Instant};

use tracing::debug;

use crate::paths::SystemPaths;
use cpu::{busy_percent, read_cpu_ticks, read_per_core_ticks};
use disk::read_disk_counters;
use network::read_network_counters;
use rate::{bytes_per_second_mb, NamedCounters, Reading};
use store::{ByteStream, CounterStore};

/// Shortest window a rate is computed over
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerOptions {
    pub min_interval: Duration,
    /// Only count block devices whose name starts with this
    pub disk_device_prefix: Option<String>,
    /// Only count interfaces whose name starts with this
    pub network_interface_prefix: Option<String>,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            disk_device_prefix: None,
            network_interface_prefix: None,
        }
    }
}

/// Reads counters and feeds them through the [`CounterStore`]
#[derive(Debug)]
pub struct RateSampler {
    paths: SystemPaths,
    options: SamplerOptions,
    store: CounterStore,
}

impl RateSampler {
    pub fn new(paths: SystemPaths, options: SamplerOptions) -> Self {
        Self {
            paths,
            options,
            store: CounterStore::new(),
        }
    }

    pub fn store(&self) -> &CounterStore {
        &self.store
    }

    pub fn options(&self) -> &SamplerOptions {
        &self.options
    }

    pub fn cpu(&self) -> Reading {
        self.cpu_at(Instant::now())
    }

    pub fn cpu_at(&self, now: Instant) -> Reading {
        let ticks = match read_cpu_ticks(&self.paths) {
            Ok(ticks) => ticks,
            Err(e) => {
                debug!("cpu sample unavailable: {}", e);
                return Reading::Unavailable;
            }
        };
        self.store
            .cpu()
            .observe(ticks, now, self.options.min_interval, busy_percent)
    }

    pub fn cpu_max_core(&self) -> Reading {
        self.cpu_max_core_at(Instant::now())
    }

    /// Busiest logical core over the window.
    ///
    /// Cores that went offline lose their baseline; cores that appear or
    /// reset prime on their own and are left out of this window's maximum.
    pub fn cpu_max_core_at(&self, now: Instant) -> Reading {
        let cores = match read_per_core_ticks(&self.paths) {
            Ok(cores) => cores,
            Err(e) => {
                debug!("per-core cpu sample unavailable: {}", e);
                return Reading::Unavailable;
            }
        };

        let mut windows = self.store.cpu_cores();
        windows.retain(|index, _| cores.iter().any(|(i, _)| i == index));

        let mut busiest: Option<f64> = None;
        for (index, ticks) in cores {
            let reading = windows.entry(index).or_default().observe(
                ticks,
                now,
                self.options.min_interval,
                busy_percent,
            );
            if let Reading::Value(pct) = reading {
                busiest = Some(busiest.map_or(pct, |max| max.max(pct)));
            }
        }

        busiest.map_or(Reading::Priming, Reading::Value)
    }

    pub fn bytes(&self, stream: ByteStream) -> Reading {
        self.bytes_at(stream, Instant::now())
    }

    /// MB/s on one byte stream over the window.
    ///
    /// Deltas are taken per device or interface: one that vanished
    /// contributes nothing, a new one is only baselined, and one whose
    /// counter dropped restarts from its new value.
    pub fn bytes_at(&self, stream: ByteStream, now: Instant) -> Reading {
        let raw = match self.read_bytes(stream) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("{} sample unavailable: {}", stream.name(), e);
                return Reading::Unavailable;
            }
        };
        self.store
            .bytes(stream)
            .observe(raw, now, self.options.min_interval, bytes_per_second_mb)
    }

    /// Establish baselines for all six streams at once
    pub fn prime_at(&self, now: Instant) {
        self.cpu_at(now);
        self.cpu_max_core_at(now);
        for stream in ByteStream::ALL {
            self.bytes_at(stream, now);
        }
    }

    fn read_bytes(&self, stream: ByteStream) -> crate::error::Result<NamedCounters> {
        match stream {
            ByteStream::DiskRead | ByteStream::DiskWrite => {
                let counters =
                    read_disk_counters(&self.paths, self.options.disk_device_prefix.as_deref())?;
                Ok(if stream == ByteStream::DiskRead {
                    counters.read_bytes
                } else {
                    counters.write_bytes
                })
            }
            ByteStream::NetworkRx | ByteStream::NetworkTx => {
                let counters = read_network_counters(
                    &self.paths,
                    self.options.network_interface_prefix.as_deref(),
                )?;
                Ok(if stream == ByteStream::NetworkRx {
                    counters.rx_bytes
                } else {
                    counters.tx_bytes
                })
            }
        }
    }
}
