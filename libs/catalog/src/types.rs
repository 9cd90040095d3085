//! Registration descriptor types.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::CatalogError;

/// Stable identifier of one registrable unit.
///
/// The identifier is the cache key and the registry-side service ID, so it
/// must be identical across reconciliation passes for the same unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(String);

impl ServiceId {
    /// Parses an identifier, rejecting empty or whitespace-bearing strings.
    pub fn parse(s: &str) -> Result<Self, CatalogError> {
        if s.is_empty() {
            return Err(CatalogError::Empty);
        }
        if s.chars().any(char::is_whitespace) {
            return Err(CatalogError::Whitespace(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ServiceId {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ServiceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ServiceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Role classification of a registered process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRole {
    /// Agent node running workloads.
    Follower,
    /// Master node (leading or standby).
    Master,
}

impl ServiceRole {
    /// Returns the role as its wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follower => "follower",
            Self::Master => "master",
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP health-check definition attached to a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Probe URL.
    pub http: String,

    /// Probe interval in seconds.
    pub interval_secs: u64,
}

impl HealthCheck {
    /// Create an HTTP check with the given probe interval.
    pub fn http(url: impl Into<String>, interval: Duration) -> Self {
        Self {
            http: url.into(),
            interval_secs: interval.as_secs().max(1),
        }
    }

    /// Returns the probe interval.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// A single service registration as submitted to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRegistration {
    /// Entry identifier.
    pub id: ServiceId,

    /// Service name in the registry catalog.
    pub name: String,

    /// Network address the service is reachable on.
    pub address: String,

    /// Service port.
    pub port: u16,

    /// Role classification.
    pub role: ServiceRole,

    /// Ordered tag sequence. Order is significant for change detection.
    pub tags: Vec<String>,

    /// Optional health check.
    #[serde(default)]
    pub check: Option<HealthCheck>,
}

impl ServiceRegistration {
    /// Returns `host:port` for logging.
    pub fn endpoint(&self) -> String {
        format_endpoint(&self.address, self.port)
    }
}

/// Formats `address:port`, bracketing IPv6 literals.
pub(crate) fn format_endpoint(address: &str, port: u16) -> String {
    if address.contains(':') {
        format!("[{address}]:{port}")
    } else {
        format!("{address}:{port}")
    }
}
