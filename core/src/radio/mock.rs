//! Scriptable radios for session unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

use super::{
    Availability, CentralRadio, CentralRadioEvent, EventSink, PeerHandle, PeripheralRadio,
    PeripheralRadioEvent, RadioError,
};
use crate::session::ServiceIdentity;

/// Every platform call a mock saw, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RadioCall {
    StartScan,
    StopScan,
    Connect(PeerHandle),
    Disconnect(PeerHandle),
    StartAdvertising(ServiceIdentity, Option<String>),
    StopAdvertising,
    Send(PeerHandle, Vec<u8>),
}

struct MockState<E> {
    availability: Availability,
    sink: Option<EventSink<E>>,
    calls: Vec<RadioCall>,
}

impl<E> MockState<E> {
    fn new() -> Self {
        Self {
            availability: Availability::Available,
            sink: None,
            calls: Vec::new(),
        }
    }
}

// ============================================================================
// CENTRAL
// ============================================================================

pub(crate) struct MockCentralRadio {
    state: Mutex<MockState<CentralRadioEvent>>,
    scan_failure: Mutex<Option<RadioError>>,
    connect_failure: Mutex<Option<RadioError>>,
    connect_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockCentralRadio {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState::new()),
            scan_failure: Mutex::new(None),
            connect_failure: Mutex::new(None),
            connect_gate: Mutex::new(None),
        })
    }

    /// Deliver a notification as the platform would
    pub(crate) fn emit(&self, event: CentralRadioEvent) {
        if let Some(sink) = &self.state.lock().sink {
            let _ = sink.send(event);
        }
    }

    /// Change availability and notify the session
    pub(crate) fn power(&self, availability: Availability) {
        self.state.lock().availability = availability;
        self.emit(CentralRadioEvent::AvailabilityChanged(availability));
    }

    /// Change availability without notifying the session yet
    pub(crate) fn set_availability(&self, availability: Availability) {
        self.state.lock().availability = availability;
    }

    pub(crate) fn fail_scan(&self, err: RadioError) {
        *self.scan_failure.lock() = Some(err);
    }

    pub(crate) fn fail_connect(&self, err: RadioError) {
        *self.connect_failure.lock() = Some(err);
    }

    pub(crate) fn clear_connect_failure(&self) {
        *self.connect_failure.lock() = None;
    }

    /// Hold connect attempts until the returned gate is notified
    pub(crate) fn gate_connect(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.connect_gate.lock() = Some(gate.clone());
        gate
    }

    pub(crate) fn calls(&self) -> Vec<RadioCall> {
        self.state.lock().calls.clone()
    }

    fn record(&self, call: RadioCall) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl CentralRadio for MockCentralRadio {
    fn availability(&self) -> Availability {
        self.state.lock().availability
    }

    fn attach(&self, events: EventSink<CentralRadioEvent>) {
        self.state.lock().sink = Some(events);
    }

    async fn start_scan(&self) -> Result<(), RadioError> {
        self.record(RadioCall::StartScan);
        match self.scan_failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        self.record(RadioCall::StopScan);
        Ok(())
    }

    async fn connect(&self, peer: PeerHandle) -> Result<(), RadioError> {
        self.record(RadioCall::Connect(peer));
        let gate = self.connect_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.connect_failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn disconnect(&self, peer: PeerHandle) -> Result<(), RadioError> {
        self.record(RadioCall::Disconnect(peer));
        Ok(())
    }
}

// ============================================================================
// PERIPHERAL
// ============================================================================

pub(crate) struct MockPeripheralRadio {
    state: Mutex<MockState<PeripheralRadioEvent>>,
    advertise_failure: Mutex<Option<RadioError>>,
    send_failure: Mutex<Option<RadioError>>,
    send_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockPeripheralRadio {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState::new()),
            advertise_failure: Mutex::new(None),
            send_failure: Mutex::new(None),
            send_gate: Mutex::new(None),
        })
    }

    pub(crate) fn emit(&self, event: PeripheralRadioEvent) {
        if let Some(sink) = &self.state.lock().sink {
            let _ = sink.send(event);
        }
    }

    pub(crate) fn power(&self, availability: Availability) {
        self.state.lock().availability = availability;
        self.emit(PeripheralRadioEvent::AvailabilityChanged(availability));
    }

    /// Set availability without notifying, as if it changed before attach
    pub(crate) fn set_availability(&self, availability: Availability) {
        self.state.lock().availability = availability;
    }

    pub(crate) fn fail_advertising(&self, err: RadioError) {
        *self.advertise_failure.lock() = Some(err);
    }

    pub(crate) fn fail_send(&self, err: RadioError) {
        *self.send_failure.lock() = Some(err);
    }

    pub(crate) fn gate_send(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.send_gate.lock() = Some(gate.clone());
        gate
    }

    pub(crate) fn calls(&self) -> Vec<RadioCall> {
        self.state.lock().calls.clone()
    }

    fn record(&self, call: RadioCall) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl PeripheralRadio for MockPeripheralRadio {
    fn availability(&self) -> Availability {
        self.state.lock().availability
    }

    fn attach(&self, events: EventSink<PeripheralRadioEvent>) {
        self.state.lock().sink = Some(events);
    }

    async fn start_advertising(
        &self,
        identity: &ServiceIdentity,
        local_name: Option<&str>,
    ) -> Result<(), RadioError> {
        self.record(RadioCall::StartAdvertising(
            *identity,
            local_name.map(str::to_string),
        ));
        match self.advertise_failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn stop_advertising(&self) -> Result<(), RadioError> {
        self.record(RadioCall::StopAdvertising);
        Ok(())
    }

    async fn send(&self, peer: PeerHandle, data: &[u8]) -> Result<(), RadioError> {
        self.record(RadioCall::Send(peer, data.to_vec()));
        let gate = self.send_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.send_failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn disconnect(&self, peer: PeerHandle) -> Result<(), RadioError> {
        self.record(RadioCall::Disconnect(peer));
        Ok(())
    }
}
