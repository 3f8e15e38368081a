//! Interface identity and capacity configuration.

use crate::error::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a host network interface (e.g. "eth0").
///
/// Identity of everything in the system: samples, store entries, and
/// wire messages all key on the interface id. The string is taken as-is
/// from configuration; existence on the host is checked at daemon
/// startup, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterfaceId(String);

impl InterfaceId {
    /// Creates a new InterfaceId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for InterfaceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InterfaceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for InterfaceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One monitored interface as configured: id plus the capacity used by
/// clients as a display threshold. Immutable after load; the capacity
/// never clamps measured data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Host interface name.
    pub id: InterfaceId,

    /// Link capacity in bits per second (display threshold only).
    pub capacity_bps: f64,
}

impl InterfaceConfig {
    /// Creates a validated interface config.
    ///
    /// # Errors
    ///
    /// `DomainError::InvalidCapacity` if `capacity_bps` is not a
    /// positive finite number.
    pub fn new(id: InterfaceId, capacity_bps: f64) -> DomainResult<Self> {
        if !capacity_bps.is_finite() || capacity_bps <= 0.0 {
            return Err(DomainError::InvalidCapacity {
                interface: id,
                value: capacity_bps,
            });
        }
        Ok(Self { id, capacity_bps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_id_display() {
        let id = InterfaceId::new("eth0");
        assert_eq!(id.to_string(), "eth0");
        assert_eq!(id.as_str(), "eth0");
    }

    #[test]
    fn test_interface_config_valid() {
        let cfg = InterfaceConfig::new(InterfaceId::new("eth0"), 500_000_000.0).unwrap();
        assert_eq!(cfg.id.as_str(), "eth0");
        assert_eq!(cfg.capacity_bps, 500_000_000.0);
    }

    #[test]
    fn test_interface_config_rejects_nonpositive() {
        assert!(InterfaceConfig::new(InterfaceId::new("eth0"), 0.0).is_err());
        assert!(InterfaceConfig::new(InterfaceId::new("eth0"), -1.0).is_err());
        assert!(InterfaceConfig::new(InterfaceId::new("eth0"), f64::NAN).is_err());
        assert!(InterfaceConfig::new(InterfaceId::new("eth0"), f64::INFINITY).is_err());
    }

    #[test]
    fn test_interface_id_serde_transparent() {
        let id = InterfaceId::new("wlan0");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"wlan0\"");
    }
}
