//! One ledger per environment
//!
//! [`LedgerManager`] maps environment names to ledgers, each backed by its
//! own RocksDB directory under the manager's base directory. Stores are
//! opened lazily on first use and stay open until [`LedgerManager::close_all`].
//!
//! RocksDB holds an exclusive lock on its directory, so two stores for the
//! same environment would fail (or fight) on open. Lookups take a shared
//! lock; only a miss takes the exclusive lock and re-checks before opening,
//! so concurrent first requests for an environment share one instance.

use crate::{
    config::{Config, StorageConfig, DEFAULT_ENVIRONMENT},
    ledger::Ledger,
    metrics::Metrics,
    Error, Result,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Longest accepted environment name
const MAX_ENVIRONMENT_LEN: usize = 64;

/// Environment name to ledger registry
pub struct LedgerManager {
    base_dir: PathBuf,
    default_environment: String,
    storage: StorageConfig,
    ledgers: RwLock<HashMap<String, Arc<Ledger>>>,
    metrics: Metrics,
}

impl LedgerManager {
    /// Manager rooted at `base_dir` using the default environment name
    pub fn new(base_dir: impl Into<PathBuf>, storage: StorageConfig) -> Result<Self> {
        Ok(Self {
            base_dir: base_dir.into(),
            default_environment: DEFAULT_ENVIRONMENT.to_string(),
            storage,
            ledgers: RwLock::new(HashMap::new()),
            metrics: Metrics::new()?,
        })
    }

    /// Manager built from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        validate_environment(&config.default_environment)?;
        let mut manager = Self::new(config.data_dir.clone(), config.storage.clone())?;
        manager.default_environment = config.default_environment.clone();
        Ok(manager)
    }

    /// Base directory holding one subdirectory per environment
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Environment used by [`LedgerManager::resolve`] when none is given
    pub fn default_environment(&self) -> &str {
        &self.default_environment
    }

    /// Metrics shared by all ledgers of this manager
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Get the ledger for `environment`, opening its store on first use
    pub fn ledger(&self, environment: &str) -> Result<Arc<Ledger>> {
        if let Some(ledger) = self.ledgers.read().get(environment) {
            return Ok(Arc::clone(ledger));
        }

        validate_environment(environment)?;

        let mut ledgers = self.ledgers.write();

        // Another caller may have opened it while we waited for the lock
        if let Some(ledger) = ledgers.get(environment) {
            return Ok(Arc::clone(ledger));
        }

        let path = self.base_dir.join(environment);
        let ledger = Arc::new(Ledger::open_with_metrics(
            environment,
            &path,
            &self.storage,
            self.metrics.clone(),
        )?);

        ledgers.insert(environment.to_string(), Arc::clone(&ledger));
        self.metrics.environments_open.set(ledgers.len() as i64);

        tracing::info!(
            environment = %environment,
            path = %path.display(),
            open_environments = ledgers.len(),
            "Environment ledger opened"
        );

        Ok(ledger)
    }

    /// Get the ledger for `environment`, or for the default environment if
    /// none (or an empty name) is given
    pub fn resolve(&self, environment: Option<&str>) -> Result<Arc<Ledger>> {
        match environment {
            Some(name) if !name.is_empty() => self.ledger(name),
            _ => self.ledger(&self.default_environment),
        }
    }

    /// Names of the environments currently open, sorted
    pub fn environments(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ledgers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Compact every open environment's store
    pub fn collect_garbage_all(&self) -> Result<()> {
        let ledgers: Vec<Arc<Ledger>> = self.ledgers.read().values().cloned().collect();
        for ledger in ledgers {
            ledger.collect_garbage()?;
        }
        Ok(())
    }

    /// Close every open ledger.
    ///
    /// A failure on one environment does not stop the others from closing;
    /// the last error seen is returned. The registry is emptied either way,
    /// so a later [`LedgerManager::ledger`] call reopens from disk.
    pub fn close_all(&self) -> Result<()> {
        let mut ledgers = self.ledgers.write();
        let mut last_error = None;

        for (environment, ledger) in ledgers.drain() {
            match ledger.close() {
                Ok(()) => tracing::info!(environment = %environment, "Environment ledger closed"),
                Err(err) => {
                    tracing::warn!(environment = %environment, error = %err, "Failed to close environment ledger");
                    last_error = Some(err);
                }
            }
        }
        self.metrics.environments_open.set(0);

        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for LedgerManager {
    fn drop(&mut self) {
        if let Err(err) = self.close_all() {
            tracing::warn!(error = %err, "Error while closing ledgers on drop");
        }
    }
}

impl std::fmt::Debug for LedgerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerManager")
            .field("base_dir", &self.base_dir)
            .field("default_environment", &self.default_environment)
            .field("environments", &self.environments())
            .finish()
    }
}

/// Check that `environment` is usable as a single directory name
pub fn validate_environment(environment: &str) -> Result<()> {
    let valid = !environment.is_empty()
        && environment.len() <= MAX_ENVIRONMENT_LEN
        && environment != "."
        && environment != ".."
        && environment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidEnvironment(format!(
            "{:?} (expected 1-{} characters of [A-Za-z0-9._-])",
            environment, MAX_ENVIRONMENT_LEN
        )))
    }
}
