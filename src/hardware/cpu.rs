//! CPU identification
//!
//! Uses:
//! - /proc/cpuinfo for the model, topology and ISA flags
//! - sysfs cache descriptors of cpu0
//! - sysinfo as a fallback when /proc/cpuinfo is unreadable

use std::collections::HashSet;
use std::fs;

use sysinfo::System;

use crate::paths::{read_trimmed, SystemPaths};

/// What /proc/cpuinfo says about the processor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuInfo {
    pub model: Option<String>,
    pub physical_cores: Option<usize>,
    pub logical_cores: Option<usize>,
    /// Raw `flags` (x86) or `Features` (ARM) tokens of the first processor
    pub flags: Vec<String>,
}

/// Parse /proc/cpuinfo.
///
/// Physical cores are the distinct `(physical id, core id)` pairs. Kernels
/// that omit `core id` fall back to `sockets × cpu cores`.
pub fn parse_cpuinfo(content: &str) -> CpuInfo {
    let mut model = None;
    let mut hardware = None;
    let mut flags: Option<Vec<String>> = None;
    let mut processors = 0usize;
    let mut cores: HashSet<(String, String)> = HashSet::new();
    let mut sockets: HashSet<String> = HashSet::new();
    let mut cores_per_socket: Option<usize> = None;

    // Per-processor fields, flushed on each blank line.
    let mut physical_id: Option<String> = None;
    let mut core_id: Option<String> = None;

    let mut flush = |physical_id: &mut Option<String>, core_id: &mut Option<String>| {
        if let Some(pid) = physical_id.take() {
            if let Some(cid) = core_id.take() {
                cores.insert((pid.clone(), cid));
            }
            sockets.insert(pid);
        }
        *core_id = None;
    };

    for line in content.lines() {
        if line.trim().is_empty() {
            flush(&mut physical_id, &mut core_id);
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "processor" => processors += 1,
            "model name" if model.is_none() && !value.is_empty() => model = Some(value.to_string()),
            "Hardware" if hardware.is_none() && !value.is_empty() => {
                hardware = Some(value.to_string())
            }
            "physical id" => physical_id = Some(value.to_string()),
            "core id" => core_id = Some(value.to_string()),
            "cpu cores" if cores_per_socket.is_none() => cores_per_socket = value.parse().ok(),
            "flags" | "Features" if flags.is_none() => {
                flags = Some(value.split_whitespace().map(str::to_string).collect())
            }
            _ => {}
        }
    }
    flush(&mut physical_id, &mut core_id);

    let physical_cores = if !cores.is_empty() {
        Some(cores.len())
    } else {
        cores_per_socket
            .filter(|n| *n > 0 && !sockets.is_empty())
            .map(|n| n * sockets.len())
    };

    CpuInfo {
        model: model.or(hardware),
        physical_cores,
        logical_cores: (processors > 0).then_some(processors),
        flags: flags.unwrap_or_default(),
    }
}

/// Model and core counts, with sysinfo filling anything /proc/cpuinfo lacks.
/// The model is never empty.
pub fn detect(paths: &SystemPaths) -> CpuInfo {
    let mut info = fs::read_to_string(paths.proc("cpuinfo"))
        .map(|content| parse_cpuinfo(&content))
        .unwrap_or_default();

    if info.model.is_none() || info.physical_cores.is_none() || info.logical_cores.is_none() {
        let mut sys = System::new();
        sys.refresh_cpu_all();

        let cpus = sys.cpus();
        if info.model.is_none() {
            info.model = cpus
                .first()
                .map(|cpu| cpu.brand().trim().to_string())
                .filter(|brand| !brand.is_empty());
        }
        if info.logical_cores.is_none() && !cpus.is_empty() {
            info.logical_cores = Some(cpus.len());
        }
        if info.physical_cores.is_none() {
            info.physical_cores = sys.physical_core_count();
        }
    }

    if info.model.is_none() {
        info.model = Some("Unknown CPU".to_string());
    }
    info
}

/// Cache sizes of cpu0 as `(L1, L2, L3)`.
///
/// L1 is `"<d> (d) + <i> (i)"` when split; L2 and L3 report the largest
/// cache of that level.
pub fn cache_summary(paths: &SystemPaths) -> (Option<String>, Option<String>, Option<String>) {
    let base = paths.sys("devices/system/cpu/cpu0/cache");
    let Ok(entries) = fs::read_dir(&base) else {
        return (None, None, None);
    };

    let mut l1d = None;
    let mut l1i = None;
    let mut unified_l1 = None;
    let mut best: [Option<(u64, String)>; 2] = [None, None];

    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let (Some(level), Some(size)) = (read_trimmed(&dir.join("level")), read_trimmed(&dir.join("size"))) else {
            continue;
        };
        let kind = read_trimmed(&dir.join("type")).unwrap_or_default();

        match level.as_str() {
            "1" => match kind.as_str() {
                "Data" => l1d = Some(size),
                "Instruction" => l1i = Some(size),
                _ => unified_l1 = Some(size),
            },
            "2" | "3" => {
                let slot = &mut best[if level == "2" { 0 } else { 1 }];
                let bytes = cache_size_bytes(&size);
                if slot.as_ref().map_or(true, |(b, _)| bytes > *b) {
                    *slot = Some((bytes, size));
                }
            }
            _ => {}
        }
    }

    let l1 = match (l1d, l1i) {
        (Some(d), Some(i)) => Some(format!("{} (d) + {} (i)", d, i)),
        (d, i) => d.or(i).or(unified_l1),
    };
    let [l2, l3] = best;
    (l1, l2.map(|(_, s)| s), l3.map(|(_, s)| s))
}

/// `32K`, `4M`, `1G` or plain bytes
pub fn cache_size_bytes(size: &str) -> u64 {
    let size = size.trim();
    let (digits, multiplier) = match size.chars().last() {
        Some('K') => (&size[..size.len() - 1], 1024),
        Some('M') => (&size[..size.len() - 1], 1024 * 1024),
        Some('G') => (&size[..size.len() - 1], 1024 * 1024 * 1024),
        _ => (size, 1),
    };
    digits.trim().parse::<u64>().unwrap_or(0) * multiplier
}

/// Short list of notable ISA extensions, e.g. `SSE4.2 AVX2 AVX-512F`
pub fn instruction_summary(flags: &[String]) -> Option<String> {
    const NOTABLE: [(&str, &str); 24] = [
        ("sse4_1", "SSE4.1"),
        ("sse4_2", "SSE4.2"),
        ("popcnt", "POPCNT"),
        ("aes", "AES"),
        ("fma", "FMA"),
        ("f16c", "F16C"),
        ("avx", "AVX"),
        ("avx2", "AVX2"),
        ("bmi2", "BMI2"),
        ("avx512f", "AVX-512F"),
        ("avx512bw", "AVX-512BW"),
        ("avx512vl", "AVX-512VL"),
        ("avx512_vnni", "AVX-512VNNI"),
        ("avx512_bf16", "AVX-512BF16"),
        ("amx_tile", "AMX"),
        ("neon", "NEON"),
        ("asimd", "NEON"),
        ("asimdhp", "FP16"),
        ("asimddp", "DOTPROD"),
        ("crc32", "CRC32"),
        ("sha2", "SHA2"),
        ("i8mm", "I8MM"),
        ("sve", "SVE"),
        ("sve2", "SVE2"),
    ];

    let present: HashSet<&str> = flags.iter().map(String::as_str).collect();
    let mut labels: Vec<&str> = Vec::new();
    for (flag, label) in NOTABLE {
        if present.contains(flag) && !labels.contains(&label) {
            labels.push(label);
        }
    }

    (!labels.is_empty()).then(|| labels.join(" "))
}
