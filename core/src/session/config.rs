//! Session configuration
//!
//! Scanning is duty cycled: scan for `scan_duration_ms`, stay quiet for
//! `wait_delay_ms`, repeat. Both windows default to three seconds.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::ConfigError;

/// Scan/wait windows for the central role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DutyCycle {
    /// How long each scan window lasts, in milliseconds
    pub scan_duration_ms: u64,
    /// Pause between scan windows, in milliseconds
    pub wait_delay_ms: u64,
}

impl Default for DutyCycle {
    fn default() -> Self {
        Self {
            scan_duration_ms: 3_000,
            wait_delay_ms: 3_000,
        }
    }
}

impl DutyCycle {
    pub fn new(scan_duration_ms: u64, wait_delay_ms: u64) -> Result<Self, ConfigError> {
        let cycle = Self {
            scan_duration_ms,
            wait_delay_ms,
        };
        cycle.validate()?;
        Ok(cycle)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_duration_ms == 0 {
            return Err(ConfigError::InvalidDutyCycle(
                "scan duration must be > 0".to_string(),
            ));
        }
        if self.wait_delay_ms == 0 {
            return Err(ConfigError::InvalidDutyCycle(
                "wait delay must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_millis(self.scan_duration_ms)
    }

    pub fn wait_delay(&self) -> Duration {
        Duration::from_millis(self.wait_delay_ms)
    }

    /// Share of each cycle spent scanning, 0-100
    pub fn duty_percent(&self) -> u8 {
        let total = self.scan_duration_ms.saturating_add(self.wait_delay_ms);
        if total == 0 {
            return 0;
        }
        ((self.scan_duration_ms * 100) / total) as u8
    }
}

/// Central session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentralConfig {
    pub duty_cycle: DutyCycle,
    /// Go back to scanning when the connected peripheral drops the link
    pub auto_resume_scan: bool,
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            duty_cycle: DutyCycle::default(),
            auto_resume_scan: true,
        }
    }
}

impl CentralConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.duty_cycle.validate()
    }
}

/// Peripheral session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeripheralConfig {
    /// Name put in the advertisement
    pub local_name: Option<String>,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            local_name: Some("blelink peripheral".to_string()),
        }
    }
}
