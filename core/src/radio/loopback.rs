//! In-process radio
//!
//! [`LoopbackAir`] is a shared medium that any number of loopback centrals
//! and peripherals join. Advertisements are seen by scanning centrals,
//! connects create links and peripheral sends are delivered to the linked
//! central. Used by the CLI demo and the integration tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

use super::{
    Availability, CentralRadio, CentralRadioEvent, EventSink, PeerHandle, PeripheralRadio,
    PeripheralRadioEvent, RadioError,
};
use crate::session::{DiscoveredPeer, ServiceIdentity};

struct CentralSlot {
    handle: PeerHandle,
    sink: Option<EventSink<CentralRadioEvent>>,
    scanning: bool,
}

struct Advertisement {
    identity: ServiceIdentity,
    local_name: Option<String>,
}

struct PeripheralSlot {
    handle: PeerHandle,
    sink: Option<EventSink<PeripheralRadioEvent>>,
    advertisement: Option<Advertisement>,
}

impl PeripheralSlot {
    fn discovered(&self) -> Option<DiscoveredPeer> {
        self.advertisement.as_ref().map(|ad| {
            let peer = DiscoveredPeer::new(self.handle, [ad.identity.service]);
            match &ad.local_name {
                Some(name) => peer.with_local_name(name.clone()),
                None => peer,
            }
        })
    }
}

struct AirState {
    availability: Availability,
    centrals: Vec<CentralSlot>,
    peripherals: Vec<PeripheralSlot>,
    /// (central, peripheral) pairs
    links: Vec<(PeerHandle, PeerHandle)>,
}

impl AirState {
    fn central(&mut self, handle: PeerHandle) -> Option<&mut CentralSlot> {
        self.centrals.iter_mut().find(|c| c.handle == handle)
    }

    fn peripheral(&mut self, handle: PeerHandle) -> Option<&mut PeripheralSlot> {
        self.peripherals.iter_mut().find(|p| p.handle == handle)
    }

    fn notify_central(&self, handle: PeerHandle, event: CentralRadioEvent) {
        if let Some(sink) = self
            .centrals
            .iter()
            .find(|c| c.handle == handle)
            .and_then(|c| c.sink.as_ref())
        {
            let _ = sink.send(event);
        }
    }

    fn notify_peripheral(&self, handle: PeerHandle, event: PeripheralRadioEvent) {
        if let Some(sink) = self
            .peripherals
            .iter()
            .find(|p| p.handle == handle)
            .and_then(|p| p.sink.as_ref())
        {
            let _ = sink.send(event);
        }
    }

    fn unlink(&mut self, central: PeerHandle, peripheral: PeerHandle) -> bool {
        let before = self.links.len();
        self.links.retain(|link| *link != (central, peripheral));
        self.links.len() != before
    }

    fn ensure_available(&self) -> Result<(), RadioError> {
        if self.availability.is_available() {
            Ok(())
        } else {
            Err(RadioError::Unavailable)
        }
    }
}

/// Shared in-process medium
#[derive(Clone)]
pub struct LoopbackAir {
    state: Arc<Mutex<AirState>>,
}

impl LoopbackAir {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(AirState {
                availability: Availability::Available,
                centrals: Vec::new(),
                peripherals: Vec::new(),
                links: Vec::new(),
            })),
        }
    }

    /// Join the medium as a central
    pub fn central_radio(&self) -> Arc<LoopbackCentral> {
        let handle = PeerHandle::new();
        self.state.lock().centrals.push(CentralSlot {
            handle,
            sink: None,
            scanning: false,
        });
        Arc::new(LoopbackCentral {
            air: self.clone(),
            handle,
        })
    }

    /// Join the medium as a peripheral
    pub fn peripheral_radio(&self) -> Arc<LoopbackPeripheral> {
        let handle = PeerHandle::new();
        self.state.lock().peripherals.push(PeripheralSlot {
            handle,
            sink: None,
            advertisement: None,
        });
        Arc::new(LoopbackPeripheral {
            air: self.clone(),
            handle,
        })
    }

    pub fn availability(&self) -> Availability {
        self.state.lock().availability
    }

    /// Change availability for every radio on the medium. Going unavailable
    /// drops all links, advertisements and scans.
    pub fn set_availability(&self, availability: Availability) {
        let mut state = self.state.lock();
        state.availability = availability;
        if !availability.is_available() {
            state.links.clear();
            for central in state.centrals.iter_mut() {
                central.scanning = false;
            }
            for peripheral in state.peripherals.iter_mut() {
                peripheral.advertisement = None;
            }
        }

        debug!("Loopback air {}", availability);
        for sink in state.centrals.iter().filter_map(|c| c.sink.as_ref()) {
            let _ = sink.send(CentralRadioEvent::AvailabilityChanged(availability));
        }
        for sink in state.peripherals.iter().filter_map(|p| p.sink.as_ref()) {
            let _ = sink.send(PeripheralRadioEvent::AvailabilityChanged(availability));
        }
    }

    /// Number of live central/peripheral links
    pub fn link_count(&self) -> usize {
        self.state.lock().links.len()
    }
}

impl Default for LoopbackAir {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// CENTRAL
// ============================================================================

pub struct LoopbackCentral {
    air: LoopbackAir,
    handle: PeerHandle,
}

impl LoopbackCentral {
    /// How peripherals on the medium see this central
    pub fn handle(&self) -> PeerHandle {
        self.handle
    }
}

#[async_trait]
impl CentralRadio for LoopbackCentral {
    fn availability(&self) -> Availability {
        self.air.availability()
    }

    fn attach(&self, events: EventSink<CentralRadioEvent>) {
        if let Some(slot) = self.air.state.lock().central(self.handle) {
            slot.sink = Some(events);
        }
    }

    async fn start_scan(&self) -> Result<(), RadioError> {
        let mut state = self.air.state.lock();
        state.ensure_available()?;
        if let Some(slot) = state.central(self.handle) {
            slot.scanning = true;
        }

        let batch: Vec<DiscoveredPeer> = state
            .peripherals
            .iter()
            .filter_map(PeripheralSlot::discovered)
            .collect();
        trace!("Central {} scan sees {} advertisers", self.handle, batch.len());
        if !batch.is_empty() {
            state.notify_central(self.handle, CentralRadioEvent::Discovered(batch));
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        if let Some(slot) = self.air.state.lock().central(self.handle) {
            slot.scanning = false;
        }
        Ok(())
    }

    async fn connect(&self, peer: PeerHandle) -> Result<(), RadioError> {
        let mut state = self.air.state.lock();
        state.ensure_available()?;
        let advertising = state
            .peripheral(peer)
            .map(|p| p.advertisement.is_some())
            .unwrap_or(false);
        if !advertising {
            return Err(RadioError::PeerUnreachable(peer.to_string()));
        }

        if !state.links.contains(&(self.handle, peer)) {
            state.links.push((self.handle, peer));
        }
        debug!("Central {} linked to {}", self.handle, peer);
        state.notify_peripheral(peer, PeripheralRadioEvent::CentralConnected(self.handle));
        Ok(())
    }

    async fn disconnect(&self, peer: PeerHandle) -> Result<(), RadioError> {
        let mut state = self.air.state.lock();
        if state.unlink(self.handle, peer) {
            debug!("Central {} unlinked from {}", self.handle, peer);
            state.notify_peripheral(peer, PeripheralRadioEvent::CentralDisconnected(self.handle));
        }
        Ok(())
    }
}

// ============================================================================
// PERIPHERAL
// ============================================================================

pub struct LoopbackPeripheral {
    air: LoopbackAir,
    handle: PeerHandle,
}

impl LoopbackPeripheral {
    /// How centrals on the medium see this peripheral
    pub fn handle(&self) -> PeerHandle {
        self.handle
    }
}

#[async_trait]
impl PeripheralRadio for LoopbackPeripheral {
    fn availability(&self) -> Availability {
        self.air.availability()
    }

    fn attach(&self, events: EventSink<PeripheralRadioEvent>) {
        if let Some(slot) = self.air.state.lock().peripheral(self.handle) {
            slot.sink = Some(events);
        }
    }

    async fn start_advertising(
        &self,
        identity: &ServiceIdentity,
        local_name: Option<&str>,
    ) -> Result<(), RadioError> {
        let mut state = self.air.state.lock();
        state.ensure_available()?;
        let discovered = match state.peripheral(self.handle) {
            Some(slot) => {
                slot.advertisement = Some(Advertisement {
                    identity: *identity,
                    local_name: local_name.map(str::to_string),
                });
                slot.discovered()
            }
            None => None,
        };

        // Centrals already scanning pick up the new advertiser
        if let Some(peer) = discovered {
            for central in state.centrals.iter().filter(|c| c.scanning) {
                if let Some(sink) = &central.sink {
                    let _ = sink.send(CentralRadioEvent::Discovered(vec![peer.clone()]));
                }
            }
        }
        Ok(())
    }

    async fn stop_advertising(&self) -> Result<(), RadioError> {
        if let Some(slot) = self.air.state.lock().peripheral(self.handle) {
            slot.advertisement = None;
        }
        Ok(())
    }

    async fn send(&self, peer: PeerHandle, data: &[u8]) -> Result<(), RadioError> {
        let state = self.air.state.lock();
        state.ensure_available()?;
        if !state.links.contains(&(peer, self.handle)) {
            return Err(RadioError::NotConnected);
        }
        state.notify_central(
            peer,
            CentralRadioEvent::DataReceived {
                peer: self.handle,
                data: data.to_vec(),
            },
        );
        Ok(())
    }

    async fn disconnect(&self, peer: PeerHandle) -> Result<(), RadioError> {
        let mut state = self.air.state.lock();
        if state.unlink(peer, self.handle) {
            debug!("Peripheral {} unlinked from {}", self.handle, peer);
            state.notify_central(peer, CentralRadioEvent::PeerDisconnected(self.handle));
        }
        Ok(())
    }
}
