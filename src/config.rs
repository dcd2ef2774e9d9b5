//! Configuration management for aiz
//!
//! Config file location:
//! - Linux: ~/.config/aiz/config.toml
//!
//! You can override the config location by setting `AIZ_CONFIG_PATH`, and
//! the minimum sampling interval with `AIZ_MIN_INTERVAL_MS`.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::sampler::SamplerOptions;

/// Overrides the config file location
pub const CONFIG_PATH_ENV: &str = "AIZ_CONFIG_PATH";
/// Overrides `sampling.min_interval_ms`
pub const MIN_INTERVAL_ENV: &str = "AIZ_MIN_INTERVAL_MS";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Rate sampler settings
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Vendor library toggles
    #[serde(default)]
    pub gpu: GpuConfig,
}

impl Config {
    /// Load configuration from the default location or create default
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist. Environment overrides are applied last.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;

            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse config from {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        let Ok(value) = std::env::var(MIN_INTERVAL_ENV) else {
            return;
        };
        match value.trim().parse::<u64>() {
            Ok(ms) => self.sampling.min_interval_ms = ms,
            Err(_) => warn!("Ignoring {}={:?}: not a number of milliseconds", MIN_INTERVAL_ENV, value),
        }
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Ok(PathBuf::from(trimmed));
            }
        }

        let proj_dirs =
            ProjectDirs::from("", "", "aiz").context("Could not determine project directories")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Create default config file at `path` if it doesn't exist, then load
    /// it. Environment overrides apply to the returned value only.
    pub fn init_at(path: &Path) -> Result<Self> {
        if !path.exists() {
            Self::default().save_to(path)?;
        }

        Self::load_from(path)
    }

    pub fn sampler_options(&self) -> SamplerOptions {
        SamplerOptions {
            min_interval: Duration::from_millis(self.sampling.min_interval_ms),
            disk_device_prefix: non_empty(&self.sampling.disk_device_prefix),
            network_interface_prefix: non_empty(&self.sampling.network_interface_prefix),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Rate sampler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Calls closer together than this return the previous value
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Poll period of `aiz sample` and `aiz watch`
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,

    /// Only count block devices starting with this (e.g. "nvme")
    pub disk_device_prefix: Option<String>,

    /// Only count network interfaces starting with this (e.g. "eth")
    pub network_interface_prefix: Option<String>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            refresh_ms: default_refresh_ms(),
            disk_device_prefix: None,
            network_interface_prefix: None,
        }
    }
}

fn default_min_interval_ms() -> u64 {
    crate::sampler::DEFAULT_MIN_INTERVAL.as_millis() as u64
}

fn default_refresh_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

/// Vendor library toggles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuConfig {
    /// Query NVIDIA devices through NVML
    #[serde(default = "default_true")]
    pub enable_nvml: bool,

    /// Query AMD devices through ROCm SMI
    #[serde(default = "default_true")]
    pub enable_rocm: bool,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            enable_nvml: true,
            enable_rocm: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, OnceLock};
    use tempfile::TempDir;

    fn env_lock() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    struct EnvVarGuard {
        key: &'static str,
        prev: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self { key, prev }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            if let Some(prev) = &self.prev {
                std::env::set_var(self.key, prev);
            } else {
                std::env::remove_var(self.key);
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sampling.min_interval_ms, 20);
        assert_eq!(config.sampling.refresh_ms, 1000);
        assert!(config.gpu.enable_nvml);
        assert!(config.gpu.enable_rocm);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[sampling]
disk_device_prefix = "nvme"

[gpu]
enable_rocm = false
"#,
        )
        .unwrap();

        assert_eq!(config.sampling.min_interval_ms, 20);
        assert_eq!(config.sampling.disk_device_prefix.as_deref(), Some("nvme"));
        assert!(config.gpu.enable_nvml);
        assert!(!config.gpu.enable_rocm);
    }

    #[test]
    fn test_sampler_options() {
        let mut config = Config::default();
        config.sampling.min_interval_ms = 250;
        config.sampling.network_interface_prefix = Some("  ".to_string());
        config.sampling.disk_device_prefix = Some("sd".to_string());

        let options = config.sampler_options();
        assert_eq!(options.min_interval, Duration::from_millis(250));
        assert_eq!(options.disk_device_prefix.as_deref(), Some("sd"));
        assert_eq!(options.network_interface_prefix, None);
    }

    #[test]
    fn test_init_writes_then_loads() {
        let _lock = env_lock();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");

        let config = Config::init_at(&path).unwrap();
        assert!(path.exists());

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.gpu, config.gpu);
        assert_eq!(reloaded.sampling.refresh_ms, config.sampling.refresh_ms);
    }

    #[test]
    fn test_init_does_not_persist_env_override() {
        let _lock = env_lock();
        let _interval = EnvVarGuard::set(MIN_INTERVAL_ENV, "250");
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::init_at(&path).unwrap();
        assert_eq!(config.sampling.min_interval_ms, 250);

        let on_disk: Config = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.sampling.min_interval_ms, 20);
        assert_eq!(on_disk, Config::default());
    }

    #[test]
    fn test_env_overrides_file() {
        let _lock = env_lock();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[sampling]\nmin_interval_ms = 40\n").unwrap();

        {
            let _interval = EnvVarGuard::set(MIN_INTERVAL_ENV, "not-a-number");
            assert_eq!(Config::load_from(&path).unwrap().sampling.min_interval_ms, 40);
        }
        let _interval = EnvVarGuard::set(MIN_INTERVAL_ENV, "75");
        assert_eq!(Config::load_from(&path).unwrap().sampling.min_interval_ms, 75);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[sampling\nmin_interval_ms = ").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config"));
    }
}
