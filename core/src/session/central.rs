//! Central role session
//!
//! Scans in a duty cycle until a peripheral advertising the configured
//! service shows up, reports it, and connects on request. When the
//! peripheral drops the link the session goes back to scanning on its own.

use std::mem;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::CentralConfig;
use super::connection::{Connection, Role};
use super::discovery::{select_candidate, DiscoveredPeer};
use super::error::{ConfigError, SessionError};
use super::identity::ServiceIdentity;
use super::status::{FailureKind, SessionStatus, StatusEmitter, StatusStream};
use super::{request, sleep_until_opt, COMMAND_BUFFER};
use crate::radio::{Availability, CentralRadio, CentralRadioEvent, PeerHandle, RadioError};

// ============================================================================
// PUBLIC STATE VIEW
// ============================================================================

/// Coarse state of a central session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CentralPhase {
    Unconfigured,
    Ready,
    Scanning,
    Waiting,
    /// Scan halted on a qualifying peer, waiting for `connect`
    PeerFound,
    Connecting,
    Connected,
    Stopped,
}

impl CentralPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CentralPhase::Unconfigured => "unconfigured",
            CentralPhase::Ready => "ready",
            CentralPhase::Scanning => "scanning",
            CentralPhase::Waiting => "waiting",
            CentralPhase::PeerFound => "peer found",
            CentralPhase::Connecting => "connecting",
            CentralPhase::Connected => "connected",
            CentralPhase::Stopped => "stopped",
        }
    }
}

/// Point-in-time view of a central session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralSnapshot {
    pub phase: CentralPhase,
    pub identity: Option<ServiceIdentity>,
    pub candidate: Option<DiscoveredPeer>,
    pub connection: Option<Connection>,
    pub availability: Availability,
}

// ============================================================================
// HANDLE
// ============================================================================

enum CentralCommand {
    Configure {
        identity: ServiceIdentity,
        reply: oneshot::Sender<Result<(), ConfigError>>,
    },
    BeginScanning {
        reply: oneshot::Sender<Result<(), ConfigError>>,
    },
    Connect {
        peer: PeerHandle,
        reply: oneshot::Sender<Result<(), ConfigError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<CentralSnapshot>,
    },
}

/// Handle to a running central session
///
/// Cloneable; the session task ends once every handle is dropped, tearing
/// down any scan or link it still holds.
#[derive(Clone)]
pub struct CentralSession {
    command_tx: mpsc::Sender<CentralCommand>,
}

impl CentralSession {
    /// Start a central session on the current tokio runtime.
    ///
    /// Returns the handle and the session's only status stream.
    pub fn spawn(
        radio: Arc<dyn CentralRadio>,
        config: CentralConfig,
    ) -> Result<(Self, StatusStream), ConfigError> {
        config.validate()?;

        let (status, stream) = StatusEmitter::channel("central");
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (radio_tx, radio_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        radio.attach(radio_tx);
        let availability = radio.availability();

        let actor = CentralActor {
            radio,
            config,
            status,
            identity: None,
            state: State::Unconfigured,
            availability,
            attempt: 0,
            deadline: None,
            completion_tx,
        };
        tokio::spawn(actor.run(command_rx, radio_rx, completion_rx));

        Ok((Self { command_tx }, stream))
    }

    /// Set the service to look for. Emits `Ready`.
    pub async fn configure(&self, identity: ServiceIdentity) -> Result<(), SessionError> {
        request(&self.command_tx, |reply| CentralCommand::Configure { identity, reply })
            .await?
            .map_err(SessionError::from)
    }

    /// Start the scan duty cycle. Outcomes arrive on the status stream.
    pub async fn begin_scanning(&self) -> Result<(), SessionError> {
        request(&self.command_tx, |reply| CentralCommand::BeginScanning { reply })
            .await?
            .map_err(SessionError::from)
    }

    /// Connect to a discovered peripheral. Emits `Connected` or
    /// `Failed(Connection)` once the handshake settles.
    pub async fn connect(&self, peer: PeerHandle) -> Result<(), SessionError> {
        request(&self.command_tx, |reply| CentralCommand::Connect { peer, reply })
            .await?
            .map_err(SessionError::from)
    }

    /// Halt scanning and drop any link. Safe to call repeatedly.
    pub async fn stop(&self) -> Result<(), SessionError> {
        request(&self.command_tx, |reply| CentralCommand::Stop { reply }).await
    }

    /// Same as [`CentralSession::stop`]
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.stop().await
    }

    pub async fn snapshot(&self) -> Result<CentralSnapshot, SessionError> {
        request(&self.command_tx, |reply| CentralCommand::Snapshot { reply }).await
    }
}

// ============================================================================
// SESSION TASK
// ============================================================================

enum State {
    Unconfigured,
    Ready,
    Scanning,
    Waiting,
    PeerFound(DiscoveredPeer),
    Connecting {
        candidate: DiscoveredPeer,
        attempt: u64,
        /// Data the peer sent before the connect result came back
        early_data: Vec<Vec<u8>>,
    },
    Connected(PeerHandle),
    Stopped,
}

impl State {
    fn phase(&self) -> CentralPhase {
        match self {
            State::Unconfigured => CentralPhase::Unconfigured,
            State::Ready => CentralPhase::Ready,
            State::Scanning => CentralPhase::Scanning,
            State::Waiting => CentralPhase::Waiting,
            State::PeerFound(_) => CentralPhase::PeerFound,
            State::Connecting { .. } => CentralPhase::Connecting,
            State::Connected(_) => CentralPhase::Connected,
            State::Stopped => CentralPhase::Stopped,
        }
    }
}

enum Completion {
    Connect {
        attempt: u64,
        peer: PeerHandle,
        result: Result<(), RadioError>,
    },
}

struct CentralActor {
    radio: Arc<dyn CentralRadio>,
    config: CentralConfig,
    status: StatusEmitter,
    identity: Option<ServiceIdentity>,
    state: State,
    availability: Availability,
    /// Generation of the latest connect attempt
    attempt: u64,
    /// When the current scan or wait window ends
    deadline: Option<Instant>,
    completion_tx: mpsc::UnboundedSender<Completion>,
}

impl CentralActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<CentralCommand>,
        mut radio_events: mpsc::UnboundedReceiver<CentralRadioEvent>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                biased;
                Some(event) = radio_events.recv() => self.handle_radio_event(event).await,
                Some(completion) = completions.recv() => self.handle_completion(completion).await,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                _ = sleep_until_opt(deadline) => self.on_window_elapsed().await,
            }
        }

        self.stop().await;
        debug!("Central session task ended");
    }

    async fn handle_command(&mut self, command: CentralCommand) {
        match command {
            CentralCommand::Configure { identity, reply } => {
                let _ = reply.send(self.configure(identity));
            }
            CentralCommand::BeginScanning { reply } => {
                let result = self.begin_scanning().await;
                let _ = reply.send(result);
            }
            CentralCommand::Connect { peer, reply } => {
                let result = self.connect(peer).await;
                let _ = reply.send(result);
            }
            CentralCommand::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(());
            }
            CentralCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn configure(&mut self, identity: ServiceIdentity) -> Result<(), ConfigError> {
        match self.state {
            State::Scanning | State::Waiting | State::Connecting { .. } | State::Connected(_) => {
                return Err(ConfigError::InvalidState(self.state.phase().as_str()));
            }
            _ => {}
        }
        identity.validate()?;

        info!("Central configured for service {}", identity.service);
        self.identity = Some(identity);
        self.state = State::Ready;
        self.status.emit(SessionStatus::Ready);
        Ok(())
    }

    async fn begin_scanning(&mut self) -> Result<(), ConfigError> {
        if self.identity.is_none() {
            return Err(ConfigError::NotConfigured);
        }
        match self.state {
            State::Scanning | State::Waiting => Ok(()),
            State::Connecting { .. } | State::Connected(_) => {
                Err(ConfigError::InvalidState(self.state.phase().as_str()))
            }
            _ => {
                self.start_duty_cycle().await;
                Ok(())
            }
        }
    }

    async fn start_duty_cycle(&mut self) {
        if !self.availability.is_available() {
            warn!("Cannot scan, radio {}", self.availability);
            self.status
                .emit(SessionStatus::Failed(FailureKind::RadioUnavailable));
            return;
        }
        info!(
            "Starting scan duty cycle ({}ms scan / {}ms wait)",
            self.config.duty_cycle.scan_duration_ms, self.config.duty_cycle.wait_delay_ms
        );
        self.open_scan_window().await;
    }

    async fn open_scan_window(&mut self) {
        match self.radio.start_scan().await {
            Ok(()) => {
                self.state = State::Scanning;
                self.deadline = Some(Instant::now() + self.config.duty_cycle.scan_duration());
                self.status.emit(SessionStatus::Scanning);
            }
            Err(e) => {
                warn!("Scan failed to start: {}", e);
                self.deadline = None;
                self.state = State::Stopped;
                self.status.emit(SessionStatus::Failed(FailureKind::scan(e)));
                self.status.emit(SessionStatus::Stopped);
            }
        }
    }

    async fn on_window_elapsed(&mut self) {
        match self.state {
            State::Scanning => {
                self.stop_radio_scan().await;
                self.state = State::Waiting;
                self.deadline = Some(Instant::now() + self.config.duty_cycle.wait_delay());
                self.status.emit(SessionStatus::Waiting);
            }
            State::Waiting => self.open_scan_window().await,
            _ => self.deadline = None,
        }
    }

    /// Stop the duty cycle without emitting anything
    async fn halt_scan(&mut self) {
        self.deadline = None;
        if matches!(self.state, State::Scanning) {
            self.stop_radio_scan().await;
        }
    }

    async fn stop_radio_scan(&self) {
        if let Err(e) = self.radio.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
    }

    async fn connect(&mut self, peer: PeerHandle) -> Result<(), ConfigError> {
        let candidate = match &self.state {
            State::PeerFound(found) if found.handle == peer => found.clone(),
            State::PeerFound(_) | State::Scanning | State::Waiting => {
                DiscoveredPeer::new(peer, std::iter::empty())
            }
            other => return Err(ConfigError::InvalidState(other.phase().as_str())),
        };

        self.halt_scan().await;
        self.attempt += 1;
        let attempt = self.attempt;
        self.state = State::Connecting {
            candidate,
            attempt,
            early_data: Vec::new(),
        };
        info!("Connecting to peripheral {}", peer);

        let radio = self.radio.clone();
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = radio.connect(peer).await;
            let _ = completion_tx.send(Completion::Connect {
                attempt,
                peer,
                result,
            });
        });
        Ok(())
    }

    async fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Connect {
                attempt,
                peer,
                result,
            } => {
                let current = matches!(
                    self.state,
                    State::Connecting { attempt: pending, .. } if pending == attempt
                );
                if !current {
                    if result.is_ok() {
                        // Caller already moved on; undo the link instead of reviving it
                        debug!("Dropping abandoned connection to {}", peer);
                        if let Err(e) = self.radio.disconnect(peer).await {
                            warn!("Failed to drop abandoned connection to {}: {}", peer, e);
                        }
                    }
                    return;
                }

                match result {
                    Ok(()) => {
                        info!("Connected to peripheral {}", peer);
                        let early_data = match mem::replace(&mut self.state, State::Connected(peer))
                        {
                            State::Connecting { early_data, .. } => early_data,
                            _ => Vec::new(),
                        };
                        self.status.emit(SessionStatus::Connected);
                        for data in early_data {
                            self.status.emit(SessionStatus::DataReceived(data));
                        }
                    }
                    Err(e) => {
                        warn!("Connection to {} failed: {}", peer, e);
                        if let State::Connecting { candidate, .. } =
                            mem::replace(&mut self.state, State::Stopped)
                        {
                            self.state = State::PeerFound(candidate);
                        }
                        self.status
                            .emit(SessionStatus::Failed(FailureKind::connection(e)));
                    }
                }
            }
        }
    }

    async fn handle_radio_event(&mut self, event: CentralRadioEvent) {
        match event {
            CentralRadioEvent::Discovered(batch) => self.on_discovered(batch).await,
            CentralRadioEvent::PeerDisconnected(peer) => self.on_peer_disconnected(peer).await,
            CentralRadioEvent::DataReceived { peer, data } => match &mut self.state {
                State::Connected(connected) if *connected == peer => {
                    self.status.emit(SessionStatus::DataReceived(data));
                }
                // The link can be up before our connect completion is seen
                State::Connecting {
                    candidate,
                    early_data,
                    ..
                } if candidate.handle == peer => {
                    debug!("Holding {} bytes from {} until connected", data.len(), peer);
                    early_data.push(data);
                }
                _ => debug!("Ignoring {} bytes from {}", data.len(), peer),
            },
            CentralRadioEvent::AvailabilityChanged(availability) => {
                self.on_availability_changed(availability)
            }
        }
    }

    async fn on_discovered(&mut self, batch: Vec<DiscoveredPeer>) {
        if !matches!(self.state, State::Scanning) {
            debug!("Ignoring discovery batch of {} outside scan window", batch.len());
            return;
        }
        let Some(identity) = self.identity else {
            return;
        };

        let Some(peer) = select_candidate(&batch, &identity.service).cloned() else {
            debug!("No peer in batch of {} advertises {}", batch.len(), identity.service);
            return;
        };

        info!("Found peripheral {} advertising {}", peer.handle, identity.service);
        self.halt_scan().await;
        self.state = State::PeerFound(peer.clone());
        self.status.emit(SessionStatus::PeersFound(vec![peer]));
    }

    async fn on_peer_disconnected(&mut self, peer: PeerHandle) {
        match self.state {
            State::Connected(connected) if connected == peer => {}
            _ => {
                debug!("Ignoring disconnect of {} we are not linked to", peer);
                return;
            }
        }

        info!("Peripheral {} disconnected", peer);
        self.state = State::Stopped;
        self.status.emit(SessionStatus::Disconnected);

        if !self.config.auto_resume_scan {
            self.status.emit(SessionStatus::Stopped);
            return;
        }

        // The link can drop before the power-off notification reaches us
        self.availability = self.radio.availability();
        if self.availability.is_available() {
            self.start_duty_cycle().await;
        } else {
            warn!("Cannot resume scanning, radio {}", self.availability);
            self.status
                .emit(SessionStatus::Failed(FailureKind::RadioUnavailable));
            self.status.emit(SessionStatus::Stopped);
        }
    }

    fn on_availability_changed(&mut self, availability: Availability) {
        self.availability = availability;
        if availability.is_available() {
            info!("Radio available");
            return;
        }

        warn!("Radio {}", availability);
        let previous = mem::replace(&mut self.state, State::Stopped);
        self.deadline = None;
        match previous {
            State::Scanning | State::Waiting | State::PeerFound(_) | State::Connecting { .. } => {
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

    async fn stop(&mut self) {
        let previous = mem::replace(&mut self.state, State::Stopped);
        match previous {
            State::Scanning => {
                self.deadline = None;
                self.stop_radio_scan().await;
                info!("Scanning stopped");
                self.status.emit(SessionStatus::Stopped);
            }
            State::Waiting | State::PeerFound(_) | State::Connecting { .. } => {
                self.deadline = None;
                info!("Scanning stopped");
                self.status.emit(SessionStatus::Stopped);
            }
            State::Connected(peer) => {
                if let Err(e) = self.radio.disconnect(peer).await {
                    warn!("Failed to disconnect from {}: {}", peer, e);
                }
                info!("Disconnected from peripheral {}", peer);
                self.status.emit(SessionStatus::Disconnected);
                self.status.emit(SessionStatus::Stopped);
            }
            idle => {
                debug!("Stop while {}, nothing to do", idle.phase().as_str());
                self.state = idle;
            }
        }
    }

    fn snapshot(&self) -> CentralSnapshot {
        let (candidate, connection) = match &self.state {
            State::PeerFound(peer) => (Some(peer.clone()), None),
            State::Connecting { candidate, .. } => (
                Some(candidate.clone()),
                Some(Connection::connecting(candidate.handle, Role::AsCentral)),
            ),
            State::Connected(peer) => (None, Some(Connection::established(*peer, Role::AsCentral))),
            _ => (None, None),
        };
        CentralSnapshot {
            phase: self.state.phase(),
            identity: self.identity,
            candidate,
            connection,
            availability: self.availability,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
