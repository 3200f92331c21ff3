//! Status events emitted by sessions
//!
//! Every session owns exactly one [`StatusStream`]. Events are delivered in
//! the order the session's transitions happened.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;

use super::discovery::DiscoveredPeer;
use crate::radio::{hex_preview, RadioError};

/// Why an asynchronous operation failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Connect attempt failed
    Connection(String),
    /// Transfer failed mid-flight
    Send(String),
    /// Radio powered off, unauthorized or otherwise unusable
    RadioUnavailable,
    /// Platform refused to scan for a reason other than availability
    Scan(String),
}

impl FailureKind {
    pub(crate) fn connection(err: RadioError) -> Self {
        match err {
            RadioError::Unavailable => FailureKind::RadioUnavailable,
            other => FailureKind::Connection(other.to_string()),
        }
    }

    pub(crate) fn send(err: RadioError) -> Self {
        match err {
            RadioError::Unavailable => FailureKind::RadioUnavailable,
            other => FailureKind::Send(other.to_string()),
        }
    }

    pub(crate) fn scan(err: RadioError) -> Self {
        match err {
            RadioError::Unavailable => FailureKind::RadioUnavailable,
            other => FailureKind::Scan(other.to_string()),
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Connection(reason) => write!(f, "connection failed: {}", reason),
            FailureKind::Send(reason) => write!(f, "send failed: {}", reason),
            FailureKind::RadioUnavailable => write!(f, "radio unavailable"),
            FailureKind::Scan(reason) => write!(f, "scan failed: {}", reason),
        }
    }
}

/// Status event from a central or peripheral session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Ready,
    Advertising,
    Scanning,
    Waiting,
    Stopped,
    PeersFound(Vec<DiscoveredPeer>),
    Connected,
    Disconnected,
    DataSent,
    DataReceived(Vec<u8>),
    Failed(FailureKind),
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Ready => write!(f, "Ready"),
            SessionStatus::Advertising => write!(f, "Advertising"),
            SessionStatus::Scanning => write!(f, "Scanning"),
            SessionStatus::Waiting => write!(f, "Waiting"),
            SessionStatus::Stopped => write!(f, "Stopped"),
            SessionStatus::PeersFound(peers) => {
                let handles: Vec<String> = peers.iter().map(|p| p.handle.to_string()).collect();
                write!(f, "PeersFound [{}]", handles.join(", "))
            }
            SessionStatus::Connected => write!(f, "Connected"),
            SessionStatus::Disconnected => write!(f, "Disconnected"),
            SessionStatus::DataSent => write!(f, "DataSent"),
            SessionStatus::DataReceived(data) => write!(
                f,
                "DataReceived {{ len: {}, data: {} }}",
                data.len(),
                hex_preview(data)
            ),
            SessionStatus::Failed(kind) => write!(f, "Failed ({})", kind),
        }
    }
}

/// Sending half kept by the session task
#[derive(Debug, Clone)]
pub(crate) struct StatusEmitter {
    role: &'static str,
    tx: mpsc::UnboundedSender<SessionStatus>,
}

impl StatusEmitter {
    pub(crate) fn channel(role: &'static str) -> (Self, StatusStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { role, tx }, StatusStream { rx })
    }

    pub(crate) fn emit(&self, status: SessionStatus) {
        debug!("{} status: {}", self.role, status);
        // Subscriber gone: the session keeps running until its handles drop
        let _ = self.tx.send(status);
    }
}

/// The single ordered status stream of one session
#[derive(Debug)]
pub struct StatusStream {
    rx: mpsc::UnboundedReceiver<SessionStatus>,
}

impl StatusStream {
    /// Wait for the next status. `None` once the session task has ended and
    /// every buffered status was consumed.
    pub async fn recv(&mut self) -> Option<SessionStatus> {
        self.rx.recv().await
    }

    /// Next buffered status, if any, without waiting
    pub fn try_recv(&mut self) -> Option<SessionStatus> {
        self.rx.try_recv().ok()
    }
}

impl Stream for StatusStream {
    type Item = SessionStatus;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
