//! BLE session controllers
//!
//! Each role runs as its own tokio task that exclusively owns its state
//! machine. Callers talk to it through a cloneable handle and observe it
//! through a single ordered [`StatusStream`]:
//!
//! - **central**: duty-cycled scanning, discovery filtering, connect, inbound data
//! - **peripheral**: advertising, accepting one central, outbound data
//! - **status**: the event model shared by both roles
//! - **discovery**: the scan-batch filter
//!
//! Platform notifications, completions of in-flight radio operations, the
//! scan timer and caller commands are all serialized on the session task.

pub mod central;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod peripheral;
pub mod status;

pub use central::{CentralPhase, CentralSession, CentralSnapshot};
pub use config::{CentralConfig, DutyCycle, PeripheralConfig};
pub use connection::{Connection, LinkState, Role};
pub use discovery::{select_candidate, DiscoveredPeer};
pub use error::{ConfigError, SessionError};
pub use identity::ServiceIdentity;
pub use peripheral::{PeripheralPhase, PeripheralSession, PeripheralSnapshot};
pub use status::{FailureKind, SessionStatus, StatusStream};

use tokio::sync::{mpsc, oneshot};

/// Capacity of a session's command queue
pub(crate) const COMMAND_BUFFER: usize = 32;

/// Post a command carrying a reply channel and wait for the answer
pub(crate) async fn request<C, T>(
    commands: &mpsc::Sender<C>,
    build: impl FnOnce(oneshot::Sender<T>) -> C,
) -> Result<T, SessionError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    commands
        .send(build(reply_tx))
        .await
        .map_err(|_| SessionError::Closed)?;
    reply_rx.await.map_err(|_| SessionError::Closed)
}

/// Resolve at `deadline`, or never when there is none
pub(crate) async fn sleep_until_opt(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures::future::pending::<()>().await,
    }
}
