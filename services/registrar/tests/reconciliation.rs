//! Integration tests for reconciliation passes.
//!
//! These tests drive full passes against a mock registry and an in-memory
//! store and check:
//! 1. Unchanged rosters issue no registry calls
//! 2. Tag changes (including reordering) re-register
//! 3. Missing entries get one pass of grace before deregistration
//! 4. Failures are absorbed and reported, never propagated

use std::sync::Arc;

use rollcall_catalog::{
    build_roster, FollowerRecord, MasterRecord, RosterDefaults, ServiceId, ServiceRegistration,
    ServiceRole,
};
use rollcall_reconcile::Liveness;
use rollcall_registrar::{
    CachePersistence, KvStore, MemoryKvStore, MockRegistry, Reconciler, RegistrarError,
    RegistryCall, ServiceRegistry, DEFAULT_CACHE_KEY,
};

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

struct Harness {
    reconciler: Reconciler,
    registry: Arc<MockRegistry>,
    store: Arc<MemoryKvStore>,
}

impl Harness {
    fn new() -> Self {
        let registry = Arc::new(MockRegistry::new());
        let store = Arc::new(MemoryKvStore::new());
        let reconciler = Reconciler::new(
            Arc::clone(&registry) as Arc<dyn ServiceRegistry>,
            CachePersistence::new(Arc::clone(&store) as Arc<dyn KvStore>, DEFAULT_CACHE_KEY),
        );

        Self {
            reconciler,
            registry,
            store,
        }
    }

    fn liveness(&self, id: &str) -> Option<Liveness> {
        self.reconciler
            .cache()
            .and_then(|c| c.lookup(id))
            .map(|e| e.liveness)
    }
}

fn ids(calls: &[RegistryCall]) -> Vec<String> {
    calls.iter().map(|c| c.service_id().to_string()).collect()
}

#[tokio::test]
async fn test_identical_roster_is_idempotent() {
    let mut h = Harness::new();
    let roster = vec![service("m1", &["leader", "master"]), service("m2", &["master"])];

    let first = h.reconciler.run(&roster).await;
    assert_eq!(first.created, 2);
    assert!(first.is_clean());

    let calls = h.registry.take_calls().await;
    assert!(calls.iter().all(RegistryCall::is_register));
    assert_eq!(ids(&calls), vec!["m1", "m2"]);

    let second = h.reconciler.run(&roster).await;
    assert_eq!(second.created, 0);
    assert_eq!(second.unchanged, 2);
    assert!(h.registry.calls().await.is_empty());
}

#[tokio::test]
async fn test_tag_reorder_triggers_replacement() {
    let mut h = Harness::new();
    h.reconciler.run(&[service("m1", &["a", "b"])]).await;
    h.registry.take_calls().await;

    let report = h.reconciler.run(&[service("m1", &["b", "a"])]).await;
    assert_eq!(report.replaced, 1);

    let calls = h.registry.take_calls().await;
    assert_eq!(calls, vec![RegistryCall::Register(service("m1", &["b", "a"]))]);

    let stored = h.reconciler.cache().unwrap().lookup("m1").unwrap();
    assert_eq!(stored.service.tags, vec!["b", "a"]);
}

#[tokio::test]
async fn test_address_only_change_is_not_reregistered() {
    let mut h = Harness::new();
    h.reconciler.run(&[service("m1", &["master"])]).await;
    h.registry.take_calls().await;

    let mut moved = service("m1", &["master"]);
    moved.address = "10.0.0.42".to_string();

    let report = h.reconciler.run(&[moved]).await;
    assert_eq!(report.unchanged, 1);
    assert!(h.registry.calls().await.is_empty());
}

#[tokio::test]
async fn test_grace_window_scenario() {
    let mut h = Harness::new();

    // Pass 1: created and registered.
    let report = h.reconciler.run(&[service("m1", &["master"])]).await;
    assert_eq!(report.created, 1);
    assert_eq!(h.liveness("m1"), Some(Liveness::Seen));
    h.registry.take_calls().await;

    // Pass 2: missing, flipped but not deregistered.
    let report = h.reconciler.run(&[]).await;
    assert_eq!(report.deregistered, 0);
    assert_eq!(h.liveness("m1"), Some(Liveness::PendingRemoval));
    assert!(h.registry.calls().await.is_empty());

    // Pass 3: still missing, deregistered with the stored descriptor.
    let report = h.reconciler.run(&[]).await;
    assert_eq!(report.deregistered, 1);
    assert_eq!(h.liveness("m1"), None);
    assert_eq!(
        h.registry.take_calls().await,
        vec![RegistryCall::Deregister(service("m1", &["master"]))]
    );
}

#[tokio::test]
async fn test_reappearance_resets_grace() {
    let mut h = Harness::new();
    let roster = vec![service("m1", &["master"])];

    h.reconciler.run(&roster).await;
    h.reconciler.run(&[]).await;
    assert_eq!(h.liveness("m1"), Some(Liveness::PendingRemoval));

    let report = h.reconciler.run(&roster).await;
    assert_eq!(report.unchanged, 1);
    assert_eq!(h.liveness("m1"), Some(Liveness::Seen));

    h.reconciler.run(&roster).await;
    h.reconciler.run(&roster).await;

    let calls = h.registry.calls().await;
    assert_eq!(calls.len(), 1);
    assert!(calls[0].is_register());
}

#[tokio::test]
async fn test_registrations_complete_before_sweep() {
    let mut h = Harness::new();
    h.reconciler
        .run(&[service("old", &["master"]), service("m1", &["master"])])
        .await;
    h.reconciler.run(&[service("m1", &["master"])]).await;
    h.registry.take_calls().await;

    h.reconciler
        .run(&[service("new", &["master"]), service("m1", &["master"])])
        .await;

    let calls = h.registry.calls().await;
    assert_eq!(ids(&calls), vec!["new", "old"]);
    assert!(calls[0].is_register());
    assert!(!calls[1].is_register());
    assert!(h.reconciler.cache().unwrap().contains("m1"));
}

#[tokio::test]
async fn test_registration_failure_is_absorbed() {
    let mut h = Harness::new();
    h.registry.set_fail_registers(true);

    let report = h.reconciler.run(&[service("m1", &["master"])]).await;

    assert_eq!(report.created, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].is_registry_failure());
    assert!(h.reconciler.cache().unwrap().contains("m1"));
    assert!(h.store.raw(DEFAULT_CACHE_KEY).await.is_some());
}

#[tokio::test]
async fn test_persistence_failures_are_absorbed() {
    let mut h = Harness::new();
    h.store.set_fail_reads(true);
    h.store.set_fail_writes(true);

    let report = h.reconciler.run(&[service("m1", &["master"])]).await;

    assert_eq!(report.created, 1);
    assert_eq!(report.errors.len(), 2);
    assert!(matches!(
        report.errors[0],
        RegistrarError::PersistenceRead { .. }
    ));
    assert!(matches!(
        report.errors[1],
        RegistrarError::PersistenceWrite { .. }
    ));

    // The in-memory cache stays authoritative.
    h.store.set_fail_writes(false);
    let report = h.reconciler.run(&[service("m1", &["master"])]).await;
    assert_eq!(report.unchanged, 1);
    assert!(report.is_clean());
    assert!(h.store.raw(DEFAULT_CACHE_KEY).await.is_some());
}

#[tokio::test]
async fn test_leader_change_from_roster_records() {
    let mut h = Harness::new();
    let defaults = RosterDefaults::default();
    let followers = vec![FollowerRecord {
        id: "S1".to_string(),
        hostname: "agent1".to_string(),
        address: "10.0.0.11".to_string(),
        port: 5051,
    }];
    let master = |host: &str, is_leader: bool| MasterRecord {
        host: host.to_string(),
        address: "10.0.0.1".to_string(),
        port: 5050,
        is_leader,
    };

    let roster = build_roster(
        &followers,
        &[master("m1", true), master("m2", false)],
        &defaults,
    )
    .unwrap();
    let report = h.reconciler.run(&roster).await;
    assert_eq!(report.created, 3);
    h.registry.take_calls().await;

    // Leadership moves from m1 to m2.
    let roster = build_roster(
        &followers,
        &[master("m1", false), master("m2", true)],
        &defaults,
    )
    .unwrap();
    let report = h.reconciler.run(&roster).await;

    assert_eq!(report.unchanged, 1);
    assert_eq!(report.replaced, 2);
    assert_eq!(
        ids(&h.registry.calls().await),
        vec!["mesos:m1:5050", "mesos:m2:5050"]
    );
}

#[tokio::test]
async fn test_explicit_cache_skips_hydrate() {
    let registry = Arc::new(MockRegistry::new());
    let store = Arc::new(MemoryKvStore::new());
    store.set_fail_reads(true);

    let mut cache = rollcall_reconcile::RegistrationCache::new();
    cache.upsert(service("m1", &["master"]));
    cache.sweep();

    let mut reconciler = Reconciler::with_cache(
        Arc::clone(&registry) as Arc<dyn ServiceRegistry>,
        CachePersistence::new(Arc::clone(&store) as Arc<dyn KvStore>, DEFAULT_CACHE_KEY),
        cache,
    );

    let report = reconciler.run(&[service("m1", &["master"])]).await;
    assert!(report.is_clean());
    assert_eq!(report.unchanged, 1);
    assert!(registry.calls().await.is_empty());
}
