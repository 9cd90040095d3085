//! Registration cache persistence.
//!
//! The whole cache is stored as one JSON document under a single key:
//! a map from service id to the registration fields plus `liveness`.
//!
//! Persistence is best effort. A missing or unreadable document means
//! starting from an empty cache; a failed write leaves the in-memory cache
//! authoritative until the next successful write.

use std::sync::Arc;

use rollcall_reconcile::RegistrationCache;
use tracing::{debug, info, warn};

use crate::error::RegistrarError;
use crate::kv::KvStore;

/// Default key the cache is stored under.
pub const DEFAULT_CACHE_KEY: &str = "rollcall/cache";

/// Cache persistence manager.
#[derive(Clone)]
pub struct CachePersistence {
    store: Arc<dyn KvStore>,
    key: String,
}

impl CachePersistence {
    /// Create a persistence manager for `key` in `store`.
    pub fn new(store: Arc<dyn KvStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Key the cache is stored under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the persisted cache.
    ///
    /// Returns `Ok(None)` if nothing has been persisted yet.
    pub async fn load(&self) -> Result<Option<RegistrationCache>, RegistrarError> {
        debug!(key = %self.key, "Getting cache from store");

        let raw = self
            .store
            .get(&self.key)
            .await
            .map_err(|e| RegistrarError::PersistenceRead {
                key: self.key.clone(),
                message: format!("{e:#}"),
            })?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let cache: RegistrationCache =
            serde_json::from_slice(&raw).map_err(|e| RegistrarError::Deserialization {
                key: self.key.clone(),
                message: e.to_string(),
            })?;

        info!(
            key = %self.key,
            entry_count = cache.len(),
            "Loaded cache from store"
        );

        Ok(Some(cache))
    }

    /// Serialize and write the full cache.
    pub async fn save(&self, cache: &RegistrationCache) -> Result<(), RegistrarError> {
        let serialized =
            serde_json::to_vec(cache).map_err(|e| RegistrarError::Serialization(e.to_string()))?;

        self.store
            .put(&self.key, serialized)
            .await
            .map_err(|e| RegistrarError::PersistenceWrite {
                key: self.key.clone(),
                message: format!("{e:#}"),
            })?;

        debug!(key = %self.key, entry_count = cache.len(), "Saved cache to store");
        Ok(())
    }

    /// Load the persisted cache, logging any failure.
    ///
    /// A missing document yields an empty cache. On error the caller is
    /// expected to start from an empty cache.
    pub async fn hydrate(&self) -> Result<RegistrationCache, RegistrarError> {
        match self.load().await {
            Ok(Some(cache)) => Ok(cache),
            Ok(None) => {
                debug!(key = %self.key, "No cache in store, using empty cache");
                Ok(RegistrationCache::new())
            }
            Err(e) => {
                warn!(error = %e, "Could not load cache, using empty cache");
                Err(e)
            }
        }
    }

    /// Write the cache, logging any failure.
    pub async fn flush(&self, cache: &RegistrationCache) -> Result<(), RegistrarError> {
        self.save(cache).await.inspect_err(|e| {
            warn!(error = %e, "Could not save cache");
        })
    }
}

impl std::fmt::Debug for CachePersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePersistence")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
