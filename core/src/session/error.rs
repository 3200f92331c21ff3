use thiserror::Error;

/// Errors returned synchronously by session entry points. Nothing changed
/// when one of these is returned, and no status is emitted for it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Incomplete service identity: {0}")]
    IncompleteIdentity(&'static str),
    #[error("Invalid UUID: {0}")]
    InvalidUuid(String),
    #[error("Session not configured")]
    NotConfigured,
    #[error("Operation not permitted while {0}")]
    InvalidState(&'static str),
    #[error("Invalid duty cycle: {0}")]
    InvalidDutyCycle(String),
    #[error("Bluetooth radio unavailable")]
    RadioUnavailable,
    #[error("Advertising could not start: {0}")]
    AdvertiseFailed(String),
}

/// Errors from a session handle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Session task not running")]
    Closed,
}
