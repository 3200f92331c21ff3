//! Service identity shared by both roles

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::error::ConfigError;

/// The data service a session advertises or looks for, and the
/// characteristic carrying its payload.
///
/// A nil UUID in either field marks the identity as incomplete; sessions
/// refuse to start with one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl ServiceIdentity {
    /// Create a validated identity
    pub fn new(service: Uuid, characteristic: Uuid) -> Result<Self, ConfigError> {
        let identity = Self {
            service,
            characteristic,
        };
        identity.validate()?;
        Ok(identity)
    }

    /// Parse both UUIDs from their textual form
    pub fn parse(service: &str, characteristic: &str) -> Result<Self, ConfigError> {
        let service = Uuid::parse_str(service)
            .map_err(|e| ConfigError::InvalidUuid(format!("service: {}", e)))?;
        let characteristic = Uuid::parse_str(characteristic)
            .map_err(|e| ConfigError::InvalidUuid(format!("characteristic: {}", e)))?;
        Self::new(service, characteristic)
    }

    /// Check both fields are set
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.is_nil() {
            return Err(ConfigError::IncompleteIdentity("service UUID not set"));
        }
        if self.characteristic.is_nil() {
            return Err(ConfigError::IncompleteIdentity(
                "characteristic UUID not set",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.characteristic)
    }
}
