//! Key-value store interface and implementations.
//!
//! The registrar keeps its whole cache under a single key. Two stores are
//! provided:
//! - [`MemoryKvStore`] for tests and ephemeral runs
//! - [`FileKvStore`] for a single node keeping state on local disk
//!
//! Registry-backed stores live with the registry client, outside this crate.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

/// Key-value store interface.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a key. `Ok(None)` means the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a key, replacing any existing value.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;
}

/// In-memory store with switchable failures.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    values: RwLock<BTreeMap<String, Vec<u8>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryKvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle read failures.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Toggle write failures.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Store raw bytes, bypassing failure injection.
    pub async fn seed(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.into());
    }

    /// Read raw bytes, bypassing failure injection.
    pub async fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.values.read().await.get(key).cloned()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("Memory store configured to fail reads");
        }
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("Memory store configured to fail writes");
        }
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// File-backed store: each key is a file below `root`.
///
/// Keys are `/`-separated relative paths. Writes go to a temp file that is
/// renamed into place; keys ending in the temp suffix are rejected so a
/// temp file never shadows a stored value.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    root: PathBuf,
}

const TMP_SUFFIX: &str = ".tmp~";

impl FileKvStore {
    /// Create a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && !key.ends_with(TMP_SUFFIX)
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            anyhow::bail!("Invalid key for file store: {key:?}");
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No value on disk");
                Ok(None)
            }
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut tmp_path = path.clone().into_os_string();
        tmp_path.push(TMP_SUFFIX);
        let tmp_path = PathBuf::from(tmp_path);
        tokio::fs::write(&tmp_path, &value)
            .await
            .with_context(|| format!("Failed to write temp file: {}", tmp_path.display()))?;

        tokio::fs::rename(&tmp_path, &path).await.with_context(|| {
            format!(
                "Failed to rename {} -> {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        debug!(path = %path.display(), bytes = value.len(), "Wrote value to disk");
        Ok(())
    }
}
