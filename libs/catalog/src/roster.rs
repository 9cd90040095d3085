//! Roster record builders.
//!
//! Turns already-discovered cluster members into registration descriptors.
//! Discovering the members (parsing cluster state) happens elsewhere.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::format_endpoint;
use crate::{CatalogError, HealthCheck, ServiceId, ServiceRegistration, ServiceRole};

/// Default health-check probe interval.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Default registry service name.
pub const DEFAULT_SERVICE_NAME: &str = "mesos";

/// Prefix for master identifiers.
const MASTER_ID_PREFIX: &str = "mesos";

/// Values shared by every descriptor built from one roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterDefaults {
    /// Service name registered for every member.
    pub service_name: String,

    /// Health-check probe interval.
    pub check_interval: Duration,
}

impl Default for RosterDefaults {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

/// A follower (agent) node from the cluster roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowerRecord {
    /// Agent ID assigned by the cluster.
    pub id: String,

    /// Reported hostname.
    pub hostname: String,

    /// Resolved address.
    pub address: String,

    /// Agent port.
    pub port: u16,
}

impl FollowerRecord {
    /// Build the registration descriptor for this follower.
    pub fn to_registration(
        &self,
        defaults: &RosterDefaults,
    ) -> Result<ServiceRegistration, CatalogError> {
        Ok(ServiceRegistration {
            id: ServiceId::parse(&format!("{}:{}", self.id, self.hostname))?,
            name: defaults.service_name.clone(),
            address: self.address.clone(),
            port: self.port,
            role: ServiceRole::Follower,
            tags: vec!["follower".to_string()],
            check: Some(HealthCheck::http(
                format!("http://{}/slave(1)/health", format_endpoint(&self.address, self.port)),
                defaults.check_interval,
            )),
        })
    }
}

/// A master node from the cluster roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterRecord {
    /// Host as reported by the cluster (used in the identifier).
    pub host: String,

    /// Resolved address.
    pub address: String,

    /// Master port.
    pub port: u16,

    /// Whether this master currently leads.
    pub is_leader: bool,
}

impl MasterRecord {
    /// Build the registration descriptor for this master.
    ///
    /// Leadership only affects the tags, so a leader change on the same
    /// master is a tag change on a stable identifier.
    pub fn to_registration(
        &self,
        defaults: &RosterDefaults,
    ) -> Result<ServiceRegistration, CatalogError> {
        let tags = if self.is_leader {
            vec!["leader".to_string(), "master".to_string()]
        } else {
            vec!["master".to_string()]
        };

        Ok(ServiceRegistration {
            id: ServiceId::parse(&format!(
                "{MASTER_ID_PREFIX}:{}:{}",
                self.host, self.port
            ))?,
            name: defaults.service_name.clone(),
            address: self.address.clone(),
            port: self.port,
            role: ServiceRole::Master,
            tags,
            check: Some(HealthCheck::http(
                format!("http://{}/master/health", format_endpoint(&self.address, self.port)),
                defaults.check_interval,
            )),
        })
    }
}

/// Build an ordered roster: followers first, then masters.
pub fn build_roster(
    followers: &[FollowerRecord],
    masters: &[MasterRecord],
    defaults: &RosterDefaults,
) -> Result<Vec<ServiceRegistration>, CatalogError> {
    let followers = followers.iter().map(|f| f.to_registration(defaults));
    let masters = masters.iter().map(|m| m.to_registration(defaults));
    followers.chain(masters).collect()
}
