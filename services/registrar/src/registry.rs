//! Service registry interface and mock implementation.
//!
//! The registry interface abstracts the service catalog the roster is
//! published to. Implementations must tolerate repeated registration of
//! the same identifier.
//!
//! A mock implementation is provided for testing and development.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use rollcall_catalog::ServiceRegistration;
use tokio::sync::Mutex;
use tracing::info;

/// Service registry interface.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Register (or re-register) a service.
    async fn register(&self, service: &ServiceRegistration) -> Result<()>;

    /// Remove a service.
    async fn deregister(&self, service: &ServiceRegistration) -> Result<()>;
}

/// A call observed by [`MockRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    Register(ServiceRegistration),
    Deregister(ServiceRegistration),
}

impl RegistryCall {
    /// The identifier the call was made for.
    pub fn service_id(&self) -> &str {
        match self {
            Self::Register(s) | Self::Deregister(s) => s.id.as_str(),
        }
    }

    /// Returns true for registrations.
    pub fn is_register(&self) -> bool {
        matches!(self, Self::Register(_))
    }
}

/// Mock registry for testing and development.
///
/// Records every call, including failed ones, in call order.
#[derive(Debug, Default)]
pub struct MockRegistry {
    calls: Mutex<Vec<RegistryCall>>,

    /// Whether registrations should "fail".
    fail_registers: AtomicBool,

    /// Whether deregistrations should "fail".
    fail_deregisters: AtomicBool,
}

impl MockRegistry {
    /// Create a new mock registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle registration failures.
    pub fn set_fail_registers(&self, fail: bool) {
        self.fail_registers.store(fail, Ordering::SeqCst);
    }

    /// Toggle deregistration failures.
    pub fn set_fail_deregisters(&self, fail: bool) {
        self.fail_deregisters.store(fail, Ordering::SeqCst);
    }

    /// All recorded calls.
    pub async fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().await.clone()
    }

    /// Drain recorded calls.
    pub async fn take_calls(&self) -> Vec<RegistryCall> {
        std::mem::take(&mut *self.calls.lock().await)
    }
}

#[async_trait]
impl ServiceRegistry for MockRegistry {
    async fn register(&self, service: &ServiceRegistration) -> Result<()> {
        self.calls
            .lock()
            .await
            .push(RegistryCall::Register(service.clone()));

        if self.fail_registers.load(Ordering::SeqCst) {
            anyhow::bail!("Mock registry configured to fail registrations");
        }

        info!(
            service_id = %service.id,
            endpoint = %service.endpoint(),
            tags = ?service.tags,
            "[MOCK] Registered service"
        );
        Ok(())
    }

    async fn deregister(&self, service: &ServiceRegistration) -> Result<()> {
        self.calls
            .lock()
            .await
            .push(RegistryCall::Deregister(service.clone()));

        if self.fail_deregisters.load(Ordering::SeqCst) {
            anyhow::bail!("Mock registry configured to fail deregistrations");
        }

        info!(service_id = %service.id, "[MOCK] Deregistered service");
        Ok(())
    }
}
