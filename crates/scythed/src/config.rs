//! TOML configuration for the Scythe daemon.
//!
//! Every section is optional; missing values fall back to defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use scythe_types::StorageBackend;
use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// HTTP API settings.
    pub server: ServerSection,
    /// Repair bookkeeping storage.
    pub storage: StorageSection,
    /// Repair scheduling tuning.
    pub repair: RepairSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[server]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address for the HTTP API.
    pub listen_addr: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Backend type: `"memory"` (default) or `"database"`, any case.
    pub backend: String,
    /// Directory for the database backend.
    pub data_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".scythe"))
            .unwrap_or_else(|| PathBuf::from(".scythe"));
        Self {
            backend: "memory".to_string(),
            data_dir,
        }
    }
}

/// `[repair]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RepairSection {
    /// Maximum number of segments repaired at once.
    pub run_threads: usize,
    /// Default number of segments per run.
    pub segment_count: u64,
    /// Largest segment count a request may ask for.
    pub max_segment_count: u64,
    /// Failed attempts after which a segment aborts its run.
    pub max_segment_failures: u32,
    /// Default fraction of time spent repairing, in `(0, 1]`.
    pub intensity: f64,
    /// How long the dry-run repairer pretends each segment takes.
    pub dry_run_delay_ms: u64,
    /// Default snapshot setting for newly registered tables.
    pub snapshot_repair: bool,
}

impl Default for RepairSection {
    fn default() -> Self {
        Self {
            run_threads: 15,
            segment_count: 100,
            max_segment_count: 100_000,
            max_segment_failures: 3,
            intensity: 0.9,
            dry_run_delay_ms: 1000,
            snapshot_repair: false,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("cannot read {}", p.display()))?;
                let config: CliConfig = toml::from_str(&content)
                    .with_context(|| format!("cannot parse {}", p.display()))?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// The selected storage backend.
    pub fn storage_backend(&self) -> anyhow::Result<StorageBackend> {
        Ok(self.storage.backend.parse()?)
    }

    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.storage_backend()?;
        if self.repair.run_threads == 0 {
            bail!("repair.run_threads must be positive");
        }
        if self.repair.segment_count == 0 {
            bail!("repair.segment_count must be positive");
        }
        if self.repair.segment_count > self.repair.max_segment_count {
            bail!(
                "repair.segment_count {} exceeds repair.max_segment_count {}",
                self.repair.segment_count,
                self.repair.max_segment_count
            );
        }
        if self.repair.max_segment_failures == 0 {
            bail!("repair.max_segment_failures must be positive");
        }
        let intensity = self.repair.intensity;
        if !(intensity > 0.0 && intensity <= 1.0) {
            bail!("repair.intensity must be in (0, 1], got {intensity}");
        }
        Ok(())
    }
}
