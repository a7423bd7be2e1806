use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::tools::checksum::HashAlgorithm;
use crate::tools::dedup::KeepStrategy;
use crate::tools::rename::CaseMode;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub rename: RenameConfig,
    pub search: SearchConfig,
    pub checksum: ChecksumConfig,
    pub dedup: DedupConfig,
    pub backup: BackupConfig,
    pub ports: PortsConfig,
    pub http: HttpConfig,
    pub monitor: MonitorConfig,
    pub csv: CsvConfig,
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level when RUST_LOG is unset: trace, debug, info, warn, error
    pub log_level: String,
    /// Colored terminal output
    pub color: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenameConfig {
    pub case: CaseMode,
    /// First value of `{n}` in name templates
    pub start_number: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Files larger than this are skipped by content search (bytes)
    pub max_file_size: u64,
    /// Skip dot-files and dot-directories
    pub skip_hidden: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksumConfig {
    pub algorithm: HashAlgorithm,
    /// Read buffer size (bytes)
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub algorithm: HashAlgorithm,
    pub keep: KeepStrategy,
    /// Ignore files smaller than this (bytes)
    pub min_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// chrono format string appended to backup names
    pub timestamp_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    /// Connect timeout per port (ms)
    pub timeout_ms: u64,
    /// Maximum connections in flight
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// CPU usage threshold for alerts (%)
    pub cpu_threshold: f32,
    /// Memory usage threshold for alerts (%)
    pub memory_threshold: f32,
    /// Disk usage threshold for alerts (%)
    pub disk_threshold: f32,
    /// Dashboard refresh interval (ms)
    pub refresh_interval: u64,
    /// Processes listed in snapshots
    pub top_processes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    /// Seed for `csv sample` when --seed is not given
    pub sample_seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Glob patterns never reported (`*.swp`, `target/*`)
    pub ignore: Vec<String>,
    pub recursive: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".into(),
            color: true,
        }
    }
}

impl Default for RenameConfig {
    fn default() -> Self {
        Self {
            case: CaseMode::None,
            start_number: 1,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            skip_hidden: true,
        }
    }
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::Md5,
            chunk_size: 8192,
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::Md5,
            keep: KeepStrategy::Oldest,
            min_size: 0,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            timestamp_format: "%Y%m%d_%H%M%S".into(),
        }
    }
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            concurrency: 50,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cpu_threshold: 90.0,
            memory_threshold: 85.0,
            disk_threshold: 90.0,
            refresh_interval: 1000,
            top_processes: 10,
        }
    }
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self { sample_seed: 42 }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            ignore: Vec::new(),
            recursive: true,
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("toolkeep")
            .join("config.toml")
    }

    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Write this config as pretty TOML, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [ports]
            concurrency = 8

            [dedup]
            keep = "newest"

            [watch]
            ignore = ["*.swp"]
            "#,
        )
        .unwrap();

        assert_eq!(config.watch.ignore, vec!["*.swp"]);
        assert!(config.watch.recursive);
        assert_eq!(config.csv.sample_seed, 42);

        assert_eq!(config.ports.concurrency, 8);
        assert_eq!(config.ports.timeout_ms, 1000);
        assert_eq!(config.dedup.keep, KeepStrategy::Newest);
        assert_eq!(config.checksum.algorithm, HashAlgorithm::Md5);
        assert_eq!(config.general.log_level, "warn");
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.monitor.cpu_threshold = 50.0;
        config.rename.case = CaseMode::Upper;

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();

        assert_eq!(loaded.monitor.cpu_threshold, 50.0);
        assert_eq!(loaded.rename.case, CaseMode::Upper);
    }

    #[test]
    fn bad_toml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[ports\nconcurrency = ").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken.toml"));
    }
}
