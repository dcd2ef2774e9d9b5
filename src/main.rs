//! aiz - Linux hardware telemetry from the command line
//!
//! Reads /proc, /sys and the GPU vendor libraries; never writes anything
//! except the config file on `aiz config --init`.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use aiz::gpu::GpuTelemetry;
use aiz::logging::init_logging;
use aiz::{Config, Reading, Snapshot, Telemetry};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;

/// aiz - Linux hardware telemetry
#[derive(Parser)]
#[command(name = "aiz")]
#[command(version)]
#[command(about = "Sample CPU, RAM, disk, network and GPU telemetry on Linux")]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe the host hardware (default)
    Probe {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List GPUs with merged vendor telemetry
    Gpus {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Prime the samplers, wait, and print one snapshot
    Sample {
        /// Wait between priming and sampling (defaults to sampling.refresh_ms)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print a JSON snapshot every interval
    Watch {
        /// Poll period (defaults to sampling.refresh_ms)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Stop after this many snapshots
        #[arg(long)]
        count: Option<u64>,
    },

    /// Show the config path and effective configuration
    Config {
        /// Write the default config file if it does not exist
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::config_path()?,
    };

    let command = cli.command.unwrap_or(Commands::Probe { json: false });
    if let Commands::Config { init } = command {
        return show_config(&config_path, init);
    }

    let config = Config::load_from(&config_path)?;
    let telemetry = Telemetry::with_config(&config);
    let refresh = |interval_ms: Option<u64>| {
        Duration::from_millis(interval_ms.unwrap_or(config.sampling.refresh_ms))
    };

    match command {
        Commands::Probe { json } => {
            let info = telemetry.probe_hardware();
            if json {
                print_json(&info)?;
            } else {
                for line in info.to_lines() {
                    println!("{}", line);
                }
            }
        }
        Commands::Gpus { json } => {
            let gpus = telemetry.sample_all_gpus();
            if json {
                print_json(&gpus)?;
            } else {
                print_gpus(&telemetry, &gpus);
            }
        }
        Commands::Sample { interval_ms, json } => {
            telemetry.prime();
            thread::sleep(refresh(interval_ms));
            let snapshot = telemetry.snapshot();
            if json {
                print_json(&snapshot)?;
            } else {
                print_snapshot(&snapshot);
            }
        }
        Commands::Watch { interval_ms, count } => {
            let period = refresh(interval_ms);
            telemetry.prime();
            let mut printed = 0u64;
            while count.map_or(true, |limit| printed < limit) {
                thread::sleep(period);
                let snapshot = telemetry.snapshot();
                println!(
                    "{}",
                    serde_json::to_string(&snapshot).context("Failed to serialize snapshot")?
                );
                printed += 1;
            }
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

fn fmt_opt(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.1}{}", v, unit),
        None => "--".to_string(),
    }
}

fn fmt_reading(reading: Reading, unit: &str) -> String {
    match reading {
        Reading::Value(v) => format!("{:.1}{}", v, unit),
        Reading::Priming => "priming".dimmed().to_string(),
        Reading::Unavailable => "n/a".dimmed().to_string(),
    }
}

fn print_gpus(telemetry: &Telemetry, gpus: &[GpuTelemetry]) {
    if gpus.is_empty() {
        println!("{}", "No GPUs found under /sys/class/drm".bright_yellow());
        return;
    }

    let devices = telemetry.enumerate_gpus();
    for gpu in gpus {
        println!(
            "{} {} {}",
            format!("GPU{}:", gpu.index).bright_cyan().bold(),
            gpu.name,
            format!("[{}]", gpu.source).dimmed()
        );
        if let Some(device) = devices.get(gpu.index) {
            println!(
                "  {} {} {}",
                "Device:".bright_yellow(),
                device.drm_card,
                device.pci_slot_name.as_deref().unwrap_or("--")
            );
        }
        println!("  {} {}", "Vendor:".bright_yellow(), gpu.vendor);
        println!("  {} {}", "Utilization:".bright_yellow(), fmt_opt(gpu.util_pct, "%"));
        println!(
            "  {} {} / {}",
            "VRAM:".bright_yellow(),
            fmt_opt(gpu.vram_used_gib, " GiB"),
            fmt_opt(gpu.vram_total_gib, " GiB")
        );
        println!("  {} {}", "Temperature:".bright_yellow(), fmt_opt(gpu.temp_c, " C"));
        println!("  {} {}", "Power:".bright_yellow(), fmt_opt(gpu.power_watts, " W"));
        if let Some(ref pstate) = gpu.pstate {
            println!("  {} {}", "Perf state:".bright_yellow(), pstate);
        }
    }

    let vendor = |count: Option<u32>| count.map_or_else(|| "unavailable".to_string(), |n| n.to_string());
    println!();
    println!("{} {}", "NVML devices:".bright_yellow(), vendor(telemetry.nvml_gpu_count()));
    println!("{} {}", "ROCm devices:".bright_yellow(), vendor(telemetry.rocm_gpu_count()));
}

fn print_snapshot(snapshot: &Snapshot) {
    println!("{}", snapshot.timestamp.to_rfc3339().bright_cyan().bold());
    println!("  {} {}", "CPU:".bright_yellow(), fmt_reading(snapshot.cpu_pct, "%"));
    println!(
        "  {} {}",
        "CPU (busiest core):".bright_yellow(),
        fmt_reading(snapshot.cpu_max_core_pct, "%")
    );
    match snapshot.ram {
        Some(ram) => println!(
            "  {} {:.1} / {:.1} GiB ({:.0}%)",
            "RAM:".bright_yellow(),
            ram.used_gib,
            ram.total_gib,
            ram.used_pct
        ),
        None => println!("  {} --", "RAM:".bright_yellow()),
    }
    println!(
        "  {} {} read, {} write",
        "Disk:".bright_yellow(),
        fmt_reading(snapshot.disk_read_mbps, " MB/s"),
        fmt_reading(snapshot.disk_write_mbps, " MB/s")
    );
    println!(
        "  {} {} rx, {} tx",
        "Network:".bright_yellow(),
        fmt_reading(snapshot.network_rx_mbps, " MB/s"),
        fmt_reading(snapshot.network_tx_mbps, " MB/s")
    );
    for gpu in &snapshot.gpus {
        println!(
            "  {} {} {} util, {} VRAM",
            format!("GPU{}:", gpu.index).bright_yellow(),
            gpu.name,
            fmt_opt(gpu.util_pct, "%"),
            fmt_opt(gpu.vram_used_gib, " GiB")
        );
    }
}

fn show_config(path: &Path, init: bool) -> Result<()> {
    println!("{}", "aiz Configuration\n".bright_cyan().bold());
    println!("{} {}", "Config file:".bright_yellow(), path.display().to_string().bright_white());

    let existed = path.exists();
    let config = if init {
        Config::init_at(path)?
    } else {
        Config::load_from(path)?
    };

    let status = match (existed, init) {
        (true, _) => "Exists".bright_green(),
        (false, true) => "Created with defaults".bright_green(),
        (false, false) => "Not created yet (using defaults)".bright_yellow(),
    };
    println!("  {} {}\n", "Status:".bright_cyan(), status);

    let toml = toml::to_string_pretty(&config).context("Failed to serialize config to TOML")?;
    println!("{}", toml);
    Ok(())
}
