//! Peripheral role session
//!
//! Advertises one data service, accepts a single central and pushes data to
//! it. Losing the central puts the session back to advertising.

use std::mem;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::config::PeripheralConfig;
use super::connection::{Connection, Role};
use super::error::{ConfigError, SessionError};
use super::identity::ServiceIdentity;
use super::status::{FailureKind, SessionStatus, StatusEmitter, StatusStream};
use super::{request, COMMAND_BUFFER};
use crate::radio::{
    hex_preview, Availability, PeerHandle, PeripheralRadio, PeripheralRadioEvent, RadioError,
};

/// Coarse state of a peripheral session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralPhase {
    Unconfigured,
    Advertising,
    Connected,
    Stopped,
}

impl PeripheralPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeripheralPhase::Unconfigured => "unconfigured",
            PeripheralPhase::Advertising => "advertising",
            PeripheralPhase::Connected => "connected",
            PeripheralPhase::Stopped => "stopped",
        }
    }
}

/// Point-in-time view of a peripheral session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralSnapshot {
    pub phase: PeripheralPhase,
    pub identity: Option<ServiceIdentity>,
    pub connection: Option<Connection>,
    pub availability: Availability,
    /// Sends handed to the radio that have not settled yet
    pub sends_in_flight: usize,
}

enum PeripheralCommand {
    StartAdvertising {
        identity: ServiceIdentity,
        reply: oneshot::Sender<Result<(), ConfigError>>,
    },
    Send {
        data: Vec<u8>,
        reply: oneshot::Sender<()>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<PeripheralSnapshot>,
    },
}

/// Handle to a running peripheral session
#[derive(Clone)]
pub struct PeripheralSession {
    command_tx: mpsc::Sender<PeripheralCommand>,
}

impl PeripheralSession {
    /// Start a peripheral session on the current tokio runtime
    pub fn spawn(radio: Arc<dyn PeripheralRadio>, config: PeripheralConfig) -> (Self, StatusStream) {
        let (status, stream) = StatusEmitter::channel("peripheral");
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (radio_tx, radio_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        radio.attach(radio_tx);
        let availability = radio.availability();

        let actor = PeripheralActor {
            radio,
            config,
            status,
            identity: None,
            state: State::Unconfigured,
            availability,
            sends_in_flight: 0,
            completion_tx,
        };
        tokio::spawn(actor.run(command_rx, radio_rx, completion_rx));

        (Self { command_tx }, stream)
    }

    /// Advertise `identity`. Emits `Ready` then `Advertising` once the radio accepted it.
    pub async fn start_advertising(&self, identity: ServiceIdentity) -> Result<(), SessionError> {
        request(&self.command_tx, |reply| PeripheralCommand::StartAdvertising {
            identity,
            reply,
        })
        .await?
        .map_err(SessionError::from)
    }

    /// Push `data` to the connected central.
    ///
    /// Without a connected central this does nothing and emits nothing.
    /// Otherwise the transfer settles later as `DataSent` or `Failed(Send)`.
    pub async fn send(&self, data: impl Into<Vec<u8>>) -> Result<(), SessionError> {
        let data = data.into();
        request(&self.command_tx, |reply| PeripheralCommand::Send { data, reply }).await
    }

    /// Drop the central, if any, and stop advertising. Safe to call repeatedly.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        request(&self.command_tx, |reply| PeripheralCommand::Disconnect { reply }).await
    }

    pub async fn stop(&self) -> Result<(), SessionError> {
        self.disconnect().await
    }

    pub async fn snapshot(&self) -> Result<PeripheralSnapshot, SessionError> {
        request(&self.command_tx, |reply| PeripheralCommand::Snapshot { reply }).await
    }
}

enum State {
    Unconfigured,
    Advertising,
    Connected(PeerHandle),
    Stopped,
}

impl State {
    fn phase(&self) -> PeripheralPhase {
        match self {
            State::Unconfigured => PeripheralPhase::Unconfigured,
            State::Advertising => PeripheralPhase::Advertising,
            State::Connected(_) => PeripheralPhase::Connected,
            State::Stopped => PeripheralPhase::Stopped,
        }
    }
}

enum Completion {
    Send {
        peer: PeerHandle,
        len: usize,
        result: Result<(), RadioError>,
    },
}

struct PeripheralActor {
    radio: Arc<dyn PeripheralRadio>,
    config: PeripheralConfig,
    status: StatusEmitter,
    identity: Option<ServiceIdentity>,
    state: State,
    availability: Availability,
    sends_in_flight: usize,
    completion_tx: mpsc::UnboundedSender<Completion>,
}

impl PeripheralActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<PeripheralCommand>,
        mut radio_events: mpsc::UnboundedReceiver<PeripheralRadioEvent>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        loop {
            tokio::select! {
                biased;
                Some(event) = radio_events.recv() => self.handle_radio_event(event).await,
                Some(completion) = completions.recv() => self.handle_completion(completion),
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
            }
        }

        self.disconnect().await;
        debug!("Peripheral session task ended");
    }

    async fn handle_command(&mut self, command: PeripheralCommand) {
        match command {
            PeripheralCommand::StartAdvertising { identity, reply } => {
                let result = self.start_advertising(identity).await;
                let _ = reply.send(result);
            }
            PeripheralCommand::Send { data, reply } => {
                self.send(data);
                let _ = reply.send(());
            }
            PeripheralCommand::Disconnect { reply } => {
                self.disconnect().await;
                let _ = reply.send(());
            }
            PeripheralCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn start_advertising(&mut self, identity: ServiceIdentity) -> Result<(), ConfigError> {
        if matches!(self.state, State::Advertising | State::Connected(_)) {
            return Err(ConfigError::InvalidState(self.state.phase().as_str()));
        }
        identity.validate()?;
        if !self.availability.is_available() {
            warn!("Cannot advertise, radio {}", self.availability);
            return Err(ConfigError::RadioUnavailable);
        }

        self.radio
            .start_advertising(&identity, self.config.local_name.as_deref())
            .await
            .map_err(|e| match e {
                RadioError::Unavailable => ConfigError::RadioUnavailable,
                other => ConfigError::AdvertiseFailed(other.to_string()),
            })?;

        info!("Advertising service {}", identity.service);
        self.identity = Some(identity);
        self.state = State::Advertising;
        self.status.emit(SessionStatus::Ready);
        self.status.emit(SessionStatus::Advertising);
        Ok(())
    }

    fn send(&mut self, data: Vec<u8>) {
        let State::Connected(peer) = self.state else {
            debug!(
                "Send of {} bytes ignored, no central connected",
                data.len()
            );
            return;
        };

        debug!("Sending {} to {}", hex_preview(&data), peer);
        self.sends_in_flight += 1;
        let radio = self.radio.clone();
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = radio.send(peer, &data).await;
            let _ = completion_tx.send(Completion::Send {
                peer,
                len: data.len(),
                result,
            });
        });
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Send { peer, len, result } => {
                self.sends_in_flight = self.sends_in_flight.saturating_sub(1);
                // Settles even if the link is gone by now; it changes no state
                match result {
                    Ok(()) => {
                        debug!("Sent {} bytes to {}", len, peer);
                        self.status.emit(SessionStatus::DataSent);
                    }
                    Err(e) => {
                        warn!("Send of {} bytes to {} failed: {}", len, peer, e);
                        self.status.emit(SessionStatus::Failed(FailureKind::send(e)));
                    }
                }
            }
        }
    }

    async fn handle_radio_event(&mut self, event: PeripheralRadioEvent) {
        match event {
            PeripheralRadioEvent::CentralConnected(peer) => self.on_central_connected(peer).await,
            PeripheralRadioEvent::CentralDisconnected(peer) => self.on_central_disconnected(peer),
            PeripheralRadioEvent::DataReceived { peer, data } => match self.state {
                State::Connected(connected) if connected == peer => {
                    self.status.emit(SessionStatus::DataReceived(data));
                }
                _ => debug!("Ignoring {} bytes from {}", data.len(), peer),
            },
            PeripheralRadioEvent::AvailabilityChanged(availability) => {
                self.on_availability_changed(availability)
            }
        }
    }

    async fn on_central_connected(&mut self, peer: PeerHandle) {
        match self.state {
            State::Advertising => {
                info!("Central {} connected", peer);
                self.state = State::Connected(peer);
                self.status.emit(SessionStatus::Connected);
            }
            State::Connected(connected) if connected == peer => {}
            State::Connected(_) => {
                debug!("Refusing second central {}", peer);
                self.drop_link(peer).await;
            }
            State::Unconfigured | State::Stopped => {
                debug!("Central {} connected after advertising ended", peer);
                self.drop_link(peer).await;
            }
        }
    }

    fn on_central_disconnected(&mut self, peer: PeerHandle) {
        match self.state {
            State::Connected(connected) if connected == peer => {
                info!("Central {} disconnected, advertising again", peer);
                self.state = State::Advertising;
                self.status.emit(SessionStatus::Disconnected);
                self.status.emit(SessionStatus::Advertising);
            }
            _ => debug!("Ignoring disconnect of {} we are not linked to", peer),
        }
    }

    fn on_availability_changed(&mut self, availability: Availability) {
        self.availability = availability;
        if availability.is_available() {
            info!("Radio available");
            return;
        }

        warn!("Radio {}", availability);
        match mem::replace(&mut self.state, State::Stopped) {
            State::Advertising => {
                self.status
                    .emit(SessionStatus::Failed(FailureKind::RadioUnavailable));
                self.status.emit(SessionStatus::Stopped);
            }
            State::Connected(_) => {
                self.status.emit(SessionStatus::Disconnected);
                self.status
                    .emit(SessionStatus::Failed(FailureKind::RadioUnavailable));
                self.status.emit(SessionStatus::Stopped);
            }
            idle => self.state = idle,
        }
    }

    async fn drop_link(&self, peer: PeerHandle) {
        if let Err(e) = self.radio.disconnect(peer).await {
            warn!("Failed to disconnect central {}: {}", peer, e);
        }
    }

    async fn stop_advertising(&self) {
        if let Err(e) = self.radio.stop_advertising().await {
            warn!("Failed to stop advertising: {}", e);
        }
    }

    async fn disconnect(&mut self) {
        match mem::replace(&mut self.state, State::Stopped) {
            State::Connected(peer) => {
                self.drop_link(peer).await;
                self.stop_advertising().await;
                info!("Disconnected from central {}", peer);
                self.status.emit(SessionStatus::Disconnected);
                self.status.emit(SessionStatus::Stopped);
            }
            State::Advertising => {
                self.stop_advertising().await;
                info!("Advertising stopped");
                self.status.emit(SessionStatus::Stopped);
            }
            idle => {
                debug!("Disconnect while {}, nothing to do", idle.phase().as_str());
                self.state = idle;
            }
        }
    }

    fn snapshot(&self) -> PeripheralSnapshot {
        let connection = match self.state {
            State::Connected(peer) => Some(Connection::established(peer, Role::AsPeripheral)),
            _ => None,
        };
        PeripheralSnapshot {
            phase: self.state.phase(),
            identity: self.identity,
            connection,
            availability: self.availability,
            sends_in_flight: self.sends_in_flight,
        }
    }
}
