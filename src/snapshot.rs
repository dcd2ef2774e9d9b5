//! Point-in-time bundle of every live metric

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::gpu::GpuTelemetry;
use crate::memory::RamUsage;
use crate::sampler::rate::Reading;

/// One poll of all samplers, serializable as JSON
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// RFC 3339, UTC
    #[serde(serialize_with = "serialize_rfc3339")]
    pub timestamp: DateTime<Utc>,
    pub cpu_pct: Reading,
    pub cpu_max_core_pct: Reading,
    pub disk_read_mbps: Reading,
    pub disk_write_mbps: Reading,
    pub network_rx_mbps: Reading,
    pub network_tx_mbps: Reading,
    pub ram: Option<RamUsage>,
    pub gpus: Vec<GpuTelemetry>,
}

fn serialize_rfc3339<S: serde::Serializer>(
    timestamp: &DateTime<Utc>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&timestamp.to_rfc3339())
}
