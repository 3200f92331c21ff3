// Configuration management for the blelink CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/blelink/config.json
// - Linux: ~/.config/blelink/config.json
// - Windows: %APPDATA%\blelink\config.json

use anyhow::{Context, Result};
use blelink_core::{CentralConfig, DutyCycle, PeripheralConfig, ServiceIdentity};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Data service advertised by the demo peripheral
pub const DEFAULT_SERVICE_UUID: &str = "6E6B5C64-FAF7-40AE-9C21-D4933AF45B23";
/// Characteristic carrying the data
pub const DEFAULT_CHARACTERISTIC_UUID: &str = "477A2967-1FAB-4DC5-920A-DEE5DE685A3D";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service the peripheral advertises and the central filters on
    pub service_uuid: Uuid,

    pub characteristic_uuid: Uuid,

    /// Local name put in the peripheral's advertisement
    pub local_name: Option<String>,

    /// Scan/wait windows of the central
    pub duty_cycle: DutyCycle,

    /// Resume scanning when the peripheral drops the link
    pub auto_resume_scan: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_uuid: Uuid::parse_str(DEFAULT_SERVICE_UUID).unwrap_or_default(),
            characteristic_uuid: Uuid::parse_str(DEFAULT_CHARACTERISTIC_UUID).unwrap_or_default(),
            local_name: PeripheralConfig::default().local_name,
            duty_cycle: DutyCycle::default(),
            auto_resume_scan: true,
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("blelink");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the platform location, creating a default one if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.identity()?;
        self.duty_cycle
            .validate()
            .context("Invalid duty cycle in config")?;
        Ok(())
    }

    /// Service identity shared by both roles
    pub fn identity(&self) -> Result<ServiceIdentity> {
        ServiceIdentity::new(self.service_uuid, self.characteristic_uuid)
            .context("Service identity in config is incomplete")
    }

    pub fn central_config(&self) -> CentralConfig {
        CentralConfig {
            duty_cycle: self.duty_cycle,
            auto_resume_scan: self.auto_resume_scan,
        }
    }

    pub fn peripheral_config(&self) -> PeripheralConfig {
        PeripheralConfig {
            local_name: self.local_name.clone(),
        }
    }

    /// Set a config value. The result is validated before it is applied.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.clone();
        match key {
            "service_uuid" => {
                updated.service_uuid = Uuid::parse_str(value).context("Invalid UUID")?;
            }
            "characteristic_uuid" => {
                updated.characteristic_uuid = Uuid::parse_str(value).context("Invalid UUID")?;
            }
            "local_name" => {
                updated.local_name = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "scan_duration_ms" => {
                updated.duty_cycle.scan_duration_ms = value.parse().context("Invalid number")?;
            }
            "wait_delay_ms" => {
                updated.duty_cycle.wait_delay_ms = value.parse().context("Invalid number")?;
            }
            "auto_resume_scan" => {
                updated.auto_resume_scan = value.parse().context("Invalid boolean value")?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "service_uuid" => Some(self.service_uuid.to_string()),
            "characteristic_uuid" => Some(self.characteristic_uuid.to_string()),
            "local_name" => Some(
                self.local_name
                    .clone()
                    .unwrap_or_else(|| "(none)".to_string()),
            ),
            "scan_duration_ms" => Some(self.duty_cycle.scan_duration_ms.to_string()),
            "wait_delay_ms" => Some(self.duty_cycle.wait_delay_ms.to_string()),
            "auto_resume_scan" => Some(self.auto_resume_scan.to_string()),
            _ => None,
        }
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            ("service_uuid".to_string(), self.service_uuid.to_string()),
            (
                "characteristic_uuid".to_string(),
                self.characteristic_uuid.to_string(),
            ),
            (
                "local_name".to_string(),
                self.local_name
                    .clone()
                    .unwrap_or_else(|| "(none)".to_string()),
            ),
            (
                "scan_duration_ms".to_string(),
                format!("{}ms", self.duty_cycle.scan_duration_ms),
            ),
            (
                "wait_delay_ms".to_string(),
                format!("{}ms", self.duty_cycle.wait_delay_ms),
            ),
            (
                "auto_resume_scan".to_string(),
                self.auto_resume_scan.to_string(),
            ),
        ]
    }
}
