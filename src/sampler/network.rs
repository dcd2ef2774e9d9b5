//! Interface byte counters from `/proc/net/dev`

use crate::error::Result;
use crate::paths::{read_file, SystemPaths};
use crate::sampler::rate::NamedCounters;

/// Cumulative bytes per selected interface
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkCounters {
    pub rx_bytes: NamedCounters,
    pub tx_bytes: NamedCounters,
}

pub fn read_network_counters(
    paths: &SystemPaths,
    interface_prefix: Option<&str>,
) -> Result<NetworkCounters> {
    let content = read_file(&paths.proc("net/dev"))?;
    Ok(parse_net_dev(&content, interface_prefix))
}

/// Receive/transmit bytes for every interface except loopback, or only
/// those starting with `interface_prefix` when given.
pub fn parse_net_dev(content: &str, interface_prefix: Option<&str>) -> NetworkCounters {
    let mut counters = NetworkCounters::default();

    // Two header lines, then `  iface: rx_bytes rx_packets ... tx_bytes ...`
    for line in content.lines().skip(2) {
        let Some((name, stats)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name == "lo" {
            continue;
        }
        if let Some(prefix) = interface_prefix {
            if !name.starts_with(prefix) {
                continue;
            }
        }

        let fields: Vec<&str> = stats.split_whitespace().collect();
        if fields.len() < 9 {
            continue;
        }
        let rx = fields[0].parse::<u64>().unwrap_or(0);
        let tx = fields[8].parse::<u64>().unwrap_or(0);
        counters.rx_bytes.add(name, rx);
        counters.tx_bytes.add(name, tx);
    }

    counters
}
