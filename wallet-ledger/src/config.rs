//! Configuration for the ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment used when a caller does not name one
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base directory; each environment gets a RocksDB directory below it
    pub data_dir: PathBuf,

    /// Environment resolved when none is given
    pub default_environment: String,

    /// Run a compaction pass over every open environment this often
    pub gc_interval_secs: Option<u64>,

    /// RocksDB configuration shared by every environment
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            default_environment: DEFAULT_ENVIRONMENT.to_string(),
            gc_interval_secs: None,
            storage: StorageConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Bloom filter bits per key (0 disables the filter)
    pub bloom_filter_bits: f64,

    /// fsync the WAL on every commit
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 3,
            max_background_jobs: 2,
            bloom_filter_bits: 10.0,
            sync_writes: true,
            enable_statistics: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `LEDGER_*` environment variables on top of this configuration
    pub fn with_env_overrides(mut self) -> crate::Result<Self> {
        if let Ok(data_dir) = std::env::var("LEDGER_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(environment) = std::env::var("LEDGER_DEFAULT_ENV") {
            if !environment.is_empty() {
                self.default_environment = environment;
            }
        }

        if let Ok(interval) = std::env::var("LEDGER_GC_INTERVAL_SECS") {
            let secs: u64 = interval.parse().map_err(|_| {
                crate::Error::Config(format!("LEDGER_GC_INTERVAL_SECS is not a number: {}", interval))
            })?;
            self.gc_interval_secs = (secs > 0).then_some(secs);
        }

        Ok(self)
    }
}
