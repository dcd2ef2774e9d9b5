//! Per-stream baselines kept between sampler calls

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::cpu::CpuTicks;
use super::rate::{NamedCounters, RateWindow};

/// The four byte-counter streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteStream {
    DiskRead,
    DiskWrite,
    NetworkRx,
    NetworkTx,
}

impl ByteStream {
    pub const ALL: [ByteStream; 4] = [
        ByteStream::DiskRead,
        ByteStream::DiskWrite,
        ByteStream::NetworkRx,
        ByteStream::NetworkTx,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ByteStream::DiskRead => "disk_read",
            ByteStream::DiskWrite => "disk_write",
            ByteStream::NetworkRx => "network_rx",
            ByteStream::NetworkTx => "network_tx",
        }
    }
}

/// Counter store owned by one engine.
///
/// Every slot sits behind its own lock, so concurrent calls on different
/// streams never wait on each other and the compare-and-replace of one
/// baseline is atomic.
#[derive(Debug, Default)]
pub struct CounterStore {
    cpu: Mutex<RateWindow<CpuTicks>>,
    cpu_cores: Mutex<BTreeMap<usize, RateWindow<CpuTicks>>>,
    disk_read: Mutex<RateWindow<NamedCounters>>,
    disk_write: Mutex<RateWindow<NamedCounters>>,
    network_rx: Mutex<RateWindow<NamedCounters>>,
    network_tx: Mutex<RateWindow<NamedCounters>>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cpu(&self) -> MutexGuard<'_, RateWindow<CpuTicks>> {
        lock(&self.cpu)
    }

    pub(crate) fn cpu_cores(&self) -> MutexGuard<'_, BTreeMap<usize, RateWindow<CpuTicks>>> {
        lock(&self.cpu_cores)
    }

    pub(crate) fn bytes(&self, stream: ByteStream) -> MutexGuard<'_, RateWindow<NamedCounters>> {
        lock(match stream {
            ByteStream::DiskRead => &self.disk_read,
            ByteStream::DiskWrite => &self.disk_write,
            ByteStream::NetworkRx => &self.network_rx,
            ByteStream::NetworkTx => &self.network_tx,
        })
    }

    /// Stored byte total and timestamp of a stream, if primed
    pub fn byte_baseline(&self, stream: ByteStream) -> Option<(u64, Instant)> {
        self.bytes(stream)
            .baseline()
            .map(|(counters, at)| (counters.total(), at))
    }

    /// Stored per-device or per-interface counters of a stream, if primed
    pub fn byte_counters(&self, stream: ByteStream) -> Option<(NamedCounters, Instant)> {
        self.bytes(stream).baseline()
    }

    /// Stored aggregate CPU ticks and timestamp, if primed
    pub fn cpu_baseline(&self) -> Option<(CpuTicks, Instant)> {
        self.cpu().baseline()
    }

    /// Core indices that currently hold a baseline
    pub fn primed_cores(&self) -> Vec<usize> {
        self.cpu_cores()
            .iter()
            .filter(|(_, window)| window.baseline().is_some())
            .map(|(index, _)| *index)
            .collect()
    }
}

/// A panic while holding a slot leaves a plain value behind; keep using it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use crate::sampler::rate::bytes_per_second_mb;

    #[test]
    fn test_new_store_is_unprimed() {
        let store = CounterStore::new();
        assert!(store.cpu_baseline().is_none());
        assert!(store.primed_cores().is_empty());
        for stream in ByteStream::ALL {
            assert!(store.byte_baseline(stream).is_none(), "{}", stream.name());
        }
    }

    fn counters(name: &str, bytes: u64) -> NamedCounters {
        [(name, bytes)].into_iter().collect()
    }

    #[test]
    fn test_streams_are_independent() {
        let store = CounterStore::new();
        let now = Instant::now();
        store
            .bytes(ByteStream::DiskRead)
            .observe(counters("sda", 10), now, Duration::ZERO, bytes_per_second_mb);

        assert_eq!(store.byte_baseline(ByteStream::DiskRead), Some((10, now)));
        assert_eq!(
            store.byte_counters(ByteStream::DiskRead),
            Some((counters("sda", 10), now))
        );
        assert!(store.byte_baseline(ByteStream::DiskWrite).is_none());
    }

    #[test]
    fn test_poisoned_slot_is_recovered() {
        let store = Arc::new(CounterStore::new());
        let now = Instant::now();
        store
            .bytes(ByteStream::NetworkRx)
            .observe(counters("eth0", 5), now, Duration::ZERO, bytes_per_second_mb);

        let clone = Arc::clone(&store);
        let _ = thread::spawn(move || {
            let _guard = clone.bytes(ByteStream::NetworkRx);
            panic!("poison the slot");
        })
        .join();

        assert_eq!(store.byte_baseline(ByteStream::NetworkRx), Some((5, now)));
    }
}
