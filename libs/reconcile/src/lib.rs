//! Registration cache primitives.
//!
//! This library provides the bookkeeping for a mark-and-sweep registrar
//! that converges a service registry to a cluster roster. Key concepts:
//!
//! - **Roster**: the live registrable units reported for one pass.
//! - **Cache**: what this registrar believes it has submitted to the registry.
//! - **Sweep**: end-of-pass removal of entries that stopped appearing.
//!
//! # Invariants
//!
//! - One entry per [`ServiceId`]; the map key always equals the entry's id
//! - Re-seeing an entry with the same tag sequence never asks for registration
//! - An entry survives exactly one missed pass; it is collected on the
//!   second consecutive pass it is missing from

use std::collections::{BTreeMap, BTreeSet};

use rollcall_catalog::{ServiceId, ServiceRegistration};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Reconciliation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// A persisted entry is stored under a key other than its own id.
    #[error("cache key {key} does not match entry id {id}")]
    KeyMismatch { key: String, id: String },
}

/// Per-entry liveness marker.
///
/// Persisted as a boolean (`true` for [`Liveness::Seen`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Present in the most recent pass.
    Seen,

    /// Missing from the most recent pass. Collected by the next sweep
    /// unless re-seen first.
    PendingRemoval,
}

impl Liveness {
    /// Returns true if the entry was present in the most recent pass.
    pub fn is_seen(&self) -> bool {
        matches!(self, Self::Seen)
    }

    fn from_flag(flag: bool) -> Self {
        if flag {
            Self::Seen
        } else {
            Self::PendingRemoval
        }
    }
}

impl Serialize for Liveness {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(self.is_seen())
    }
}

impl<'de> Deserialize<'de> for Liveness {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        bool::deserialize(deserializer).map(Self::from_flag)
    }
}

/// A cached registration and its liveness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Descriptor as last submitted to the registry.
    #[serde(flatten)]
    pub service: ServiceRegistration,

    /// Mark-and-sweep state.
    pub liveness: Liveness,
}

/// Result of [`RegistrationCache::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New identifier; inserted.
    Created,

    /// Known identifier with an equivalent descriptor; only re-marked.
    Unchanged,

    /// Known identifier whose tags changed; old entry dropped, new inserted.
    Replaced,
}

impl UpsertOutcome {
    /// Returns true if the registry must be told about this descriptor.
    pub fn needs_registration(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    /// Returns a short label for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Unchanged => "unchanged",
            Self::Replaced => "replaced",
        }
    }
}

/// Descriptors collected by [`RegistrationCache::sweep`], in identifier order.
pub type StaleEntries = Vec<ServiceRegistration>;

/// Whether two descriptors are equivalent for re-registration purposes.
///
/// Only the tag sequences are compared, element-wise and order-sensitive.
/// Address, port, name and check changes are not detected.
pub fn tags_equivalent(a: &ServiceRegistration, b: &ServiceRegistration) -> bool {
    a.tags == b.tags
}

/// Mapping from entry identifier to its last-known registration.
///
/// Identifiers upserted or marked since the last [`sweep`](Self::sweep) are
/// tracked for the current pass only; that set is never persisted and does
/// not take part in equality.
#[derive(Debug, Clone, Default)]
pub struct RegistrationCache {
    entries: BTreeMap<ServiceId, CacheEntry>,
    touched: BTreeSet<ServiceId>,
}

impl RegistrationCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from persisted entries, checking that every key matches
    /// its entry id.
    pub fn from_entries(
        entries: BTreeMap<ServiceId, CacheEntry>,
    ) -> Result<Self, ReconcileError> {
        if let Some((key, entry)) = entries.iter().find(|(k, e)| **k != e.service.id) {
            return Err(ReconcileError::KeyMismatch {
                key: key.to_string(),
                id: entry.service.id.to_string(),
            });
        }

        Ok(Self {
            entries,
            touched: BTreeSet::new(),
        })
    }

    /// Look up an entry. No side effects.
    pub fn lookup(&self, id: &str) -> Option<&CacheEntry> {
        self.entries.get(id)
    }

    /// Returns true if the identifier is cached.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert or refresh a descriptor.
    ///
    /// - absent: inserted as seen, [`UpsertOutcome::Created`]
    /// - present with equal tags: re-marked seen, [`UpsertOutcome::Unchanged`]
    ///   (the stored descriptor is kept)
    /// - present with different tags: replaced, [`UpsertOutcome::Replaced`]
    pub fn upsert(&mut self, service: ServiceRegistration) -> UpsertOutcome {
        let id = service.id.clone();

        let outcome = match self.entries.get(&id) {
            None => UpsertOutcome::Created,
            Some(existing) if tags_equivalent(&existing.service, &service) => {
                UpsertOutcome::Unchanged
            }
            Some(_) => UpsertOutcome::Replaced,
        };

        match outcome {
            UpsertOutcome::Unchanged => {
                self.mark_seen(id.as_str());
            }
            UpsertOutcome::Replaced => {
                self.entries.remove(&id);
                self.insert_seen(service);
            }
            UpsertOutcome::Created => self.insert_seen(service),
        }

        self.touched.insert(id);
        outcome
    }

    /// Mark a cached identifier as seen without comparing descriptors.
    ///
    /// Returns false (and does nothing) if the identifier is not cached.
    pub fn mark_seen(&mut self, id: &str) -> bool {
        let Some(entry) = self.entries.get_mut(id) else {
            return false;
        };

        entry.liveness = Liveness::Seen;
        self.touched.insert(entry.service.id.clone());
        true
    }

    /// End a pass: collect stale entries and arm the rest.
    ///
    /// For every entry not upserted or marked since the previous sweep:
    /// - [`Liveness::PendingRemoval`] entries are removed and returned
    /// - [`Liveness::Seen`] entries flip to [`Liveness::PendingRemoval`]
    ///
    /// Returned descriptors are the ones stored at detection time, in
    /// identifier order.
    pub fn sweep(&mut self) -> StaleEntries {
        let touched = std::mem::take(&mut self.touched);
        let mut stale = Vec::new();

        self.entries = std::mem::take(&mut self.entries)
            .into_iter()
            .filter_map(|(id, mut entry)| {
                if touched.contains(&id) {
                    return Some((id, entry));
                }

                match entry.liveness {
                    Liveness::Seen => {
                        entry.liveness = Liveness::PendingRemoval;
                        Some((id, entry))
                    }
                    Liveness::PendingRemoval => {
                        stale.push(entry.service);
                        None
                    }
                }
            })
            .collect();

        stale
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&ServiceId, &CacheEntry)> {
        self.entries.iter()
    }

    fn insert_seen(&mut self, service: ServiceRegistration) {
        self.entries.insert(
            service.id.clone(),
            CacheEntry {
                service,
                liveness: Liveness::Seen,
            },
        );
    }
}

impl PartialEq for RegistrationCache {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for RegistrationCache {}

impl Serialize for RegistrationCache {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RegistrationCache {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = BTreeMap::<ServiceId, CacheEntry>::deserialize(deserializer)?;
        Self::from_entries(entries).map_err(serde::de::Error::custom)
    }
}
