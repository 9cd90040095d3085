//! Reconciliation pass for converging the registry to the roster.
//!
//! One pass:
//! - Hydrates the cache from the store on first use
//! - Upserts every roster entry, registering created and replaced ones
//! - Sweeps the cache, deregistering entries missing for two passes
//! - Flushes the cache back to the store
//!
//! Every failure is logged and collected in the [`PassReport`]; a pass
//! always runs to completion. Passes must not overlap; the caller owns
//! scheduling.

use std::sync::Arc;

use rollcall_catalog::{ServiceId, ServiceRegistration};
use rollcall_reconcile::{RegistrationCache, UpsertOutcome};
use tracing::{debug, info, warn};

use crate::error::RegistrarError;
use crate::persistence::CachePersistence;
use crate::registry::ServiceRegistry;

/// Summary of one reconciliation pass.
///
/// Counters reflect calls that succeeded; failed calls appear in `errors`
/// instead.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// New identifiers registered.
    pub created: usize,

    /// Identifiers re-registered after a tag change.
    pub replaced: usize,

    /// Identifiers re-seen without a registry call.
    pub unchanged: usize,

    /// Identifiers deregistered by the sweep.
    pub deregistered: usize,

    /// Failures absorbed during the pass.
    pub errors: Vec<RegistrarError>,
}

impl PassReport {
    /// Returns true if no step failed.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Replaced => self.replaced += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

/// Result of a sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Identifiers dropped from the cache, in identifier order.
    pub removed: Vec<ServiceId>,

    /// Deregistrations that failed. Their entries are dropped regardless.
    pub errors: Vec<RegistrarError>,
}

/// Reconciler for converging registry state.
pub struct Reconciler {
    /// Registry client.
    registry: Arc<dyn ServiceRegistry>,

    /// Cache persistence.
    persistence: CachePersistence,

    /// Registration cache; `None` until hydrated.
    cache: Option<RegistrationCache>,

    /// Completed passes since construction.
    passes: u64,
}

impl Reconciler {
    /// Create a reconciler that hydrates its cache from the store on first use.
    pub fn new(registry: Arc<dyn ServiceRegistry>, persistence: CachePersistence) -> Self {
        Self {
            registry,
            persistence,
            cache: None,
            passes: 0,
        }
    }

    /// Create a reconciler starting from an explicit cache. The store is
    /// only written to, never read.
    pub fn with_cache(
        registry: Arc<dyn ServiceRegistry>,
        persistence: CachePersistence,
        cache: RegistrationCache,
    ) -> Self {
        Self {
            registry,
            persistence,
            cache: Some(cache),
            passes: 0,
        }
    }

    /// The cache, if hydrated.
    pub fn cache(&self) -> Option<&RegistrationCache> {
        self.cache.as_ref()
    }

    /// Completed passes since construction.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Run one reconciliation pass against `roster`.
    pub async fn run(&mut self, roster: &[ServiceRegistration]) -> PassReport {
        let pass = self.passes + 1;
        let mut report = PassReport::default();

        info!(pass, roster_size = roster.len(), "Running reconciliation pass");

        if let Err(e) = self.hydrate().await {
            report.errors.push(e);
        }

        for service in roster {
            match self.upsert(service.clone()).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    warn!(error = %e, "Registration failed, keeping cache entry");
                    report.errors.push(e);
                }
            }
        }

        let sweep = self.sweep().await;
        report.deregistered = sweep.removed.len() - sweep.errors.len();
        report.errors.extend(sweep.errors);

        let cache = self.cache.get_or_insert_with(RegistrationCache::new);
        if let Err(e) = self.persistence.flush(cache).await {
            report.errors.push(e);
        }

        self.passes = pass;
        info!(
            pass,
            created = report.created,
            replaced = report.replaced,
            unchanged = report.unchanged,
            deregistered = report.deregistered,
            errors = report.errors.len(),
            "Reconciliation pass complete"
        );

        report
    }

    /// Load the cache from the store unless it is already in memory.
    ///
    /// On failure the cache starts empty and the error is returned for the
    /// pass report; the load is not retried later in the process lifetime.
    pub async fn hydrate(&mut self) -> Result<(), RegistrarError> {
        if self.cache.is_some() {
            return Ok(());
        }

        match self.persistence.hydrate().await {
            Ok(cache) => {
                self.cache = Some(cache);
                Ok(())
            }
            Err(e) => {
                self.cache = Some(RegistrationCache::new());
                Err(e)
            }
        }
    }

    /// Upsert one descriptor and register it if it is new or its tags changed.
    ///
    /// The cache entry is kept even if registration fails.
    pub async fn upsert(
        &mut self,
        service: ServiceRegistration,
    ) -> Result<UpsertOutcome, RegistrarError> {
        let cache = self.cache_mut().await;
        let previous_tags = cache.lookup(service.id.as_str()).map(|e| e.service.tags.clone());
        let outcome = cache.upsert(service.clone());

        match outcome {
            UpsertOutcome::Unchanged => {
                debug!(service_id = %service.id, "Service unchanged, not registering");
                return Ok(outcome);
            }
            UpsertOutcome::Replaced => info!(
                service_id = %service.id,
                old_tags = ?previous_tags.unwrap_or_default(),
                new_tags = ?service.tags,
                "Tags changed, re-registering"
            ),
            UpsertOutcome::Created => info!(
                service_id = %service.id,
                endpoint = %service.endpoint(),
                tags = ?service.tags,
                "Registering service"
            ),
        }

        self.register(&service).await?;
        Ok(outcome)
    }

    /// Register a descriptor unless its identifier is already cached.
    ///
    /// Cached identifiers are only marked seen; their descriptors are not
    /// compared. Returns whether a registration was issued.
    pub async fn ensure_registered(
        &mut self,
        service: ServiceRegistration,
    ) -> Result<bool, RegistrarError> {
        let cache = self.cache_mut().await;
        if cache.mark_seen(service.id.as_str()) {
            debug!(service_id = %service.id, "Service found, not registering");
            return Ok(false);
        }

        info!(service_id = %service.id, endpoint = %service.endpoint(), "Registering service");
        cache.upsert(service.clone());

        self.register(&service).await?;
        Ok(true)
    }

    /// Deregister and drop entries missing for two consecutive passes.
    pub async fn sweep(&mut self) -> SweepReport {
        let stale = self.cache_mut().await.sweep();
        let mut report = SweepReport::default();

        for service in stale {
            info!(service_id = %service.id, "Deregistering service");

            if let Err(e) = self.registry.deregister(&service).await {
                let e = RegistrarError::Deregister {
                    service_id: service.id.to_string(),
                    message: format!("{e:#}"),
                };
                warn!(error = %e, "Deregistration failed, dropping entry anyway");
                report.errors.push(e);
            }

            report.removed.push(service.id);
        }

        report
    }

    async fn cache_mut(&mut self) -> &mut RegistrationCache {
        // Failures are logged by the persistence layer.
        let _ = self.hydrate().await;
        self.cache.get_or_insert_with(RegistrationCache::new)
    }

    async fn register(&self, service: &ServiceRegistration) -> Result<(), RegistrarError> {
        self.registry
            .register(service)
            .await
            .map_err(|e| RegistrarError::Register {
                service_id: service.id.to_string(),
                message: format!("{e:#}"),
            })
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("persistence", &self.persistence)
            .field("cache_entries", &self.cache.as_ref().map(RegistrationCache::len))
            .field("passes", &self.passes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{KvStore, MemoryKvStore};
    use crate::persistence::DEFAULT_CACHE_KEY;
    use crate::registry::MockRegistry;
    use rollcall_catalog::ServiceRole;

    fn service(id: &str, tags: &[&str]) -> ServiceRegistration {
        ServiceRegistration {
            id: ServiceId::parse(id).unwrap(),
            name: "mesos".to_string(),
            address: "10.0.0.1".to_string(),
            port: 5050,
            role: ServiceRole::Master,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            check: None,
        }
    }

    fn reconciler() -> (Reconciler, Arc<MockRegistry>) {
        let registry = Arc::new(MockRegistry::new());
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let reconciler = Reconciler::new(
            Arc::clone(&registry) as Arc<dyn ServiceRegistry>,
            CachePersistence::new(store, DEFAULT_CACHE_KEY),
        );
        (reconciler, registry)
    }

    #[tokio::test]
    async fn test_upsert_hydrates_lazily() {
        let (mut reconciler, registry) = reconciler();
        assert!(reconciler.cache().is_none());

        let outcome = reconciler.upsert(service("m1", &["master"])).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        assert!(reconciler.cache().unwrap().contains("m1"));
        assert_eq!(registry.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_keeps_entry_when_registration_fails() {
        let (mut reconciler, registry) = reconciler();
        registry.set_fail_registers(true);

        let err = reconciler
            .upsert(service("m1", &["master"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrarError::Register { .. }));
        assert!(reconciler.cache().unwrap().contains("m1"));

        // Cached as submitted, so the next identical upsert does not retry.
        registry.set_fail_registers(false);
        let outcome = reconciler.upsert(service("m1", &["master"])).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);
        assert_eq!(registry.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_registered_skips_cached_ids_without_comparing() {
        let (mut reconciler, registry) = reconciler();

        assert!(reconciler
            .ensure_registered(service("t1", &["v1"]))
            .await
            .unwrap());
        assert!(!reconciler
            .ensure_registered(service("t1", &["v2"]))
            .await
            .unwrap());

        assert_eq!(registry.calls().await.len(), 1);
        assert_eq!(
            reconciler.cache().unwrap().lookup("t1").unwrap().service.tags,
            vec!["v1"]
        );
    }

    #[tokio::test]
    async fn test_sweep_drops_entry_when_deregistration_fails() {
        let (mut reconciler, registry) = reconciler();
        reconciler.run(&[service("m1", &["master"])]).await;
        reconciler.run(&[]).await;

        registry.set_fail_deregisters(true);
        let report = reconciler.run(&[]).await;

        assert_eq!(report.deregistered, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(report.errors[0], RegistrarError::Deregister { .. }));
        assert!(!reconciler.cache().unwrap().contains("m1"));

        // Not retried on later passes.
        registry.take_calls().await;
        reconciler.run(&[]).await;
        assert!(registry.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_pass_counter() {
        let (mut reconciler, _registry) = reconciler();
        reconciler.run(&[]).await;
        reconciler.run(&[]).await;
        assert_eq!(reconciler.passes(), 2);
    }
}
