//! Registrar error types.

use thiserror::Error;

/// Errors raised by individual reconciliation steps.
///
/// None of these escape [`Reconciler::run`](crate::Reconciler::run); they
/// are logged and collected in the pass report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrarError {
    /// The registry rejected or failed a registration.
    #[error("failed to register {service_id}: {message}")]
    Register { service_id: String, message: String },

    /// The registry rejected or failed a deregistration.
    #[error("failed to deregister {service_id}: {message}")]
    Deregister { service_id: String, message: String },

    /// Reading the persisted cache failed.
    #[error("failed to read cache from {key}: {message}")]
    PersistenceRead { key: String, message: String },

    /// Writing the persisted cache failed.
    #[error("failed to write cache to {key}: {message}")]
    PersistenceWrite { key: String, message: String },

    /// The persisted cache could not be decoded.
    #[error("failed to deserialize cache from {key}: {message}")]
    Deserialization { key: String, message: String },

    /// The cache could not be encoded.
    #[error("failed to serialize cache: {0}")]
    Serialization(String),
}

impl RegistrarError {
    /// Returns true for registry call failures.
    pub fn is_registry_failure(&self) -> bool {
        matches!(self, Self::Register { .. } | Self::Deregister { .. })
    }

    /// Returns true for cache persistence failures.
    pub fn is_persistence_failure(&self) -> bool {
        !self.is_registry_failure()
    }
}
