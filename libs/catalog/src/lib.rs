//! # rollcall-catalog
//!
//! Service registration descriptors for the rollcall registrar.
//!
//! ## Design Principles
//!
//! - A descriptor is immutable once registered; a change produces a new one
//! - Entry identifiers are derived only from stable attributes of a roster
//!   record (role + network identity), never from leadership or timestamps
//! - Field names are part of the persisted cache layout and must stay stable
//!
//! ## Identifier Format
//!
//! - Followers: `{agent_id}:{hostname}`
//! - Masters: `mesos:{host}:{port}`

mod error;
mod roster;
mod types;

pub use error::CatalogError;
pub use roster::*;
pub use types::*;
