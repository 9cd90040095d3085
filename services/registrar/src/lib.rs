//! rollcall registrar
//!
//! Keeps a service registry in step with a cluster roster using a
//! mark-and-sweep registration cache.
//!
//! ## Architecture
//!
//! - **Reconciler**: runs one pass per roster snapshot (upsert, sweep, flush)
//! - **Registration cache**: what has been submitted, with per-entry liveness
//! - **Cache persistence**: the cache as one JSON document in a key-value store
//! - **Registry**: abstracts the service catalog (mock provided)
//!
//! Deciding when to run a pass and discovering the roster are left to the
//! caller.

pub mod config;
pub mod error;
pub mod kv;
pub mod logging;
pub mod persistence;
pub mod reconciler;
pub mod registry;

// Re-export commonly used types
pub use config::Config;
pub use error::RegistrarError;
pub use kv::{FileKvStore, KvStore, MemoryKvStore};
pub use persistence::{CachePersistence, DEFAULT_CACHE_KEY};
pub use reconciler::{PassReport, Reconciler, SweepReport};
pub use registry::{MockRegistry, RegistryCall, ServiceRegistry};
