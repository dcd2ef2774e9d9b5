//! Priming / delta contract shared by every rate-based metric

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Outcome of one rate-sampler call.
///
/// [`Reading::value`] collapses it to the plain `Option<f64>` the public
/// samplers return, where "priming" and "unavailable" are both `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Reading {
    /// No baseline yet (first call, or the counter was reset). Poll again.
    Priming,
    /// The OS counter could not be read on this call.
    Unavailable,
    /// Measured percentage or throughput.
    Value(f64),
}

impl Reading {
    pub fn value(self) -> Option<f64> {
        match self {
            Reading::Value(v) => Some(v),
            Reading::Priming | Reading::Unavailable => None,
        }
    }

    pub fn is_priming(&self) -> bool {
        matches!(self, Reading::Priming)
    }
}

/// A raw OS counter that only ever grows while its source is alive
pub trait MonotonicCounter: Clone {
    /// True when `self` is lower than `prev` in any component, meaning the
    /// source restarted or wrapped.
    fn went_backwards(&self, prev: &Self) -> bool;
}

impl MonotonicCounter for u64 {
    fn went_backwards(&self, prev: &Self) -> bool {
        self < prev
    }
}

/// Cumulative byte counters keyed by device or interface name.
///
/// Rates are taken per name, so devices that come and go between two
/// readings do not disturb the others: a vanished name contributes nothing,
/// a new name is only baselined, and a name whose counter dropped restarts
/// from its new value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedCounters(BTreeMap<String, u64>);

impl NamedCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, bytes: u64) {
        let slot = self.0.entry(name.to_string()).or_insert(0);
        *slot = slot.saturating_add(bytes);
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.0.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.0.values().fold(0u64, |sum, v| sum.saturating_add(*v))
    }

    /// Bytes moved since `prev` over the names present in both readings
    /// whose counters did not go backwards
    pub fn delta_since(&self, prev: &Self) -> u64 {
        self.0
            .iter()
            .filter_map(|(name, cur)| {
                let old = prev.0.get(name)?;
                cur.checked_sub(*old)
            })
            .fold(0u64, |sum, d| sum.saturating_add(d))
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for NamedCounters {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        let mut counters = NamedCounters::new();
        for (name, bytes) in iter {
            counters.add(&name.into(), bytes);
        }
        counters
    }
}

impl MonotonicCounter for NamedCounters {
    /// The whole stream restarts only when nothing carries over: the
    /// previous reading had names and none of them is still present with
    /// a counter at or above its old value.
    fn went_backwards(&self, prev: &Self) -> bool {
        !prev.0.is_empty()
            && !prev
                .0
                .iter()
                .any(|(name, old)| self.0.get(name).is_some_and(|cur| cur >= old))
    }
}

/// One slot of the counter store: the last raw value, when it was taken, and
/// the last value computed from it.
#[derive(Debug, Clone)]
pub struct RateWindow<T> {
    baseline: Option<(T, Instant)>,
    last_value: Option<f64>,
}

impl<T> Default for RateWindow<T> {
    fn default() -> Self {
        Self {
            baseline: None,
            last_value: None,
        }
    }
}

impl<T: MonotonicCounter> RateWindow<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw reading taken at `now`.
    ///
    /// `rate` gets `(previous, current, elapsed)` and returns `None` when the
    /// delta is not measurable yet (e.g. zero CPU ticks elapsed); the baseline
    /// is then kept so the next call measures a longer window.
    pub fn observe<F>(&mut self, raw: T, now: Instant, min_interval: Duration, rate: F) -> Reading
    where
        F: FnOnce(&T, &T, Duration) -> Option<f64>,
    {
        let Some((prev_raw, prev_at)) = &self.baseline else {
            return self.rebaseline(raw, now);
        };

        let elapsed = now.saturating_duration_since(*prev_at);
        if elapsed.is_zero() || elapsed < min_interval {
            return self.previous();
        }

        if raw.went_backwards(prev_raw) {
            return self.rebaseline(raw, now);
        }

        match rate(prev_raw, &raw, elapsed) {
            Some(value) => {
                self.baseline = Some((raw, now));
                self.last_value = Some(value);
                Reading::Value(value)
            }
            None => self.previous(),
        }
    }

    pub fn baseline(&self) -> Option<(T, Instant)> {
        self.baseline.clone()
    }

    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    fn rebaseline(&mut self, raw: T, now: Instant) -> Reading {
        self.baseline = Some((raw, now));
        self.last_value = None;
        Reading::Priming
    }

    fn previous(&self) -> Reading {
        match self.last_value {
            Some(v) => Reading::Value(v),
            None => Reading::Priming,
        }
    }
}

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Byte-counter delta as MB/s (MiB based, like `iostat -m`)
pub fn bytes_per_second_mb(
    prev: &NamedCounters,
    current: &NamedCounters,
    elapsed: Duration,
) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return None;
    }
    Some(current.delta_since(prev) as f64 / BYTES_PER_MIB / secs)
}
