//! Registrar configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rollcall_catalog::{RosterDefaults, DEFAULT_CHECK_INTERVAL, DEFAULT_SERVICE_NAME};
use tracing::warn;

use crate::kv::{FileKvStore, KvStore, MemoryKvStore};
use crate::persistence::{CachePersistence, DEFAULT_CACHE_KEY};

/// Registrar configuration (env-driven).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Key the registration cache is stored under.
    pub cache_key: String,

    /// Directory for the file-backed cache store. In-memory if unset.
    pub state_dir: Option<PathBuf>,

    /// Health-check probe interval for built descriptors.
    pub check_interval: Duration,

    /// Service name for built descriptors.
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            state_dir: None,
            check_interval: DEFAULT_CHECK_INTERVAL,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let cache_key = lookup("ROLLCALL_CACHE_KEY")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.cache_key);

        let state_dir = lookup("ROLLCALL_STATE_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let check_interval_secs: u64 = lookup("ROLLCALL_CHECK_INTERVAL_SECS")
            .map(|v| v.trim().parse())
            .transpose()
            .context("ROLLCALL_CHECK_INTERVAL_SECS must be an integer (seconds).")?
            .unwrap_or(defaults.check_interval.as_secs());
        if check_interval_secs == 0 {
            anyhow::bail!("ROLLCALL_CHECK_INTERVAL_SECS must be at least 1.");
        }

        let service_name = lookup("ROLLCALL_SERVICE_NAME")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.service_name);

        let log_level = lookup("ROLLCALL_LOG_LEVEL").unwrap_or(defaults.log_level);

        Ok(Self {
            cache_key,
            state_dir,
            check_interval: Duration::from_secs(check_interval_secs),
            service_name,
            log_level,
        })
    }

    /// Defaults for building roster descriptors.
    pub fn roster_defaults(&self) -> RosterDefaults {
        RosterDefaults {
            service_name: self.service_name.clone(),
            check_interval: self.check_interval,
        }
    }

    /// Build the configured cache persistence.
    ///
    /// Without a state directory the cache lives in memory and is lost on
    /// restart.
    pub fn persistence(&self) -> CachePersistence {
        let store: Arc<dyn KvStore> = match &self.state_dir {
            Some(dir) => Arc::new(FileKvStore::new(dir)),
            None => {
                warn!("No state directory configured, registration cache will not survive restarts");
                Arc::new(MemoryKvStore::new())
            }
        };

        CachePersistence::new(store, self.cache_key.clone())
    }
}
