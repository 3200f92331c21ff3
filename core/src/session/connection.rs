use serde::{Deserialize, Serialize};
use std::fmt;

use crate::radio::PeerHandle;

/// Which side of the link this session plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    AsCentral,
    AsPeripheral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    Connecting,
    Connected,
}

/// The single link a session may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub peer: PeerHandle,
    pub role: Role,
    pub state: LinkState,
}

impl Connection {
    pub fn connecting(peer: PeerHandle, role: Role) -> Self {
        Self {
            peer,
            role,
            state: LinkState::Connecting,
        }
    }

    pub fn established(peer: PeerHandle, role: Role) -> Self {
        Self {
            peer,
            role,
            state: LinkState::Connected,
        }
    }

    pub fn is_established(&self) -> bool {
        self.state == LinkState::Connected
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:?} {}", self.role, self.state, self.peer)
    }
}
