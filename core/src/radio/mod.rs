//! Radio capability boundary
//!
//! The platform BLE stack (radio power, advertisement encoding, GATT) is an
//! external collaborator. Sessions only talk to it through the
//! [`CentralRadio`] and [`PeripheralRadio`] traits defined here.
//!
//! Notifications the platform raises from its own threads are pushed into an
//! [`EventSink`] handed over by [`CentralRadio::attach`] /
//! [`PeripheralRadio::attach`]; the owning session drains that channel on its
//! own task, which serializes them with caller commands.

pub mod loopback;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::session::{DiscoveredPeer, ServiceIdentity};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadioError {
    #[error("Bluetooth radio unavailable")]
    Unavailable,
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),
    #[error("Not connected to peer")]
    NotConnected,
    #[error("Platform error: {0}")]
    Platform(String),
}

// ============================================================================
// DATA TYPES
// ============================================================================

/// Opaque handle to a remote device, minted by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerHandle(Uuid);

impl PeerHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PeerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First group is plenty to tell peers apart in logs
        let id = self.0.hyphenated().to_string();
        write!(f, "{}", &id[..8])
    }
}

/// Why the radio cannot be used right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnavailabilityCause {
    PoweredOff,
    Resetting,
    Unauthorized,
    Unsupported,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Available,
    Unavailable(UnavailabilityCause),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Available => write!(f, "available"),
            Availability::Unavailable(cause) => write!(f, "unavailable ({:?})", cause),
        }
    }
}

// ============================================================================
// EVENTS
// ============================================================================

/// Notifications raised by the platform while acting as central
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralRadioEvent {
    /// One scan batch, in the order the platform reported the devices
    Discovered(Vec<DiscoveredPeer>),
    /// The connected peripheral went away
    PeerDisconnected(PeerHandle),
    /// Bytes pushed by the connected peripheral
    DataReceived { peer: PeerHandle, data: Vec<u8> },
    AvailabilityChanged(Availability),
}

/// Notifications raised by the platform while acting as peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralRadioEvent {
    CentralConnected(PeerHandle),
    CentralDisconnected(PeerHandle),
    /// Bytes written by the connected central
    DataReceived { peer: PeerHandle, data: Vec<u8> },
    AvailabilityChanged(Availability),
}

/// Sending half the platform uses to deliver notifications to a session
pub type EventSink<E> = mpsc::UnboundedSender<E>;

// ============================================================================
// PLATFORM TRAITS
// ============================================================================

/// Central-role BLE capability
///
/// Implemented by platform bindings. Calls return once the platform has
/// accepted (or rejected) the request; they must not wait for remote peers
/// beyond what the operation itself requires.
#[async_trait]
pub trait CentralRadio: Send + Sync {
    /// Current radio availability
    fn availability(&self) -> Availability;

    /// Register the channel notifications are delivered on. Replaces any
    /// previously attached sink.
    fn attach(&self, events: EventSink<CentralRadioEvent>);

    /// Start a scan window. Discovery batches arrive as
    /// [`CentralRadioEvent::Discovered`].
    async fn start_scan(&self) -> Result<(), RadioError>;

    /// End the current scan window. Stopping an idle scanner is not an error.
    async fn stop_scan(&self) -> Result<(), RadioError>;

    /// Establish a link to a discovered peripheral
    async fn connect(&self, peer: PeerHandle) -> Result<(), RadioError>;

    /// Tear down the link to a peripheral
    async fn disconnect(&self, peer: PeerHandle) -> Result<(), RadioError>;
}

/// Peripheral-role BLE capability
#[async_trait]
pub trait PeripheralRadio: Send + Sync {
    fn availability(&self) -> Availability;

    fn attach(&self, events: EventSink<PeripheralRadioEvent>);

    /// Advertise the data service described by `identity`
    async fn start_advertising(
        &self,
        identity: &ServiceIdentity,
        local_name: Option<&str>,
    ) -> Result<(), RadioError>;

    async fn stop_advertising(&self) -> Result<(), RadioError>;

    /// Push bytes to a connected central. Resolves when the transfer
    /// completed or failed.
    async fn send(&self, peer: PeerHandle, data: &[u8]) -> Result<(), RadioError>;

    async fn disconnect(&self, peer: PeerHandle) -> Result<(), RadioError>;
}

pub(crate) fn hex_preview(data: &[u8]) -> String {
    const MAX_PREVIEW: usize = 16;
    if data.len() > MAX_PREVIEW {
        format!("{}..", hex::encode(&data[..MAX_PREVIEW]))
    } else {
        hex::encode(data)
    }
}
