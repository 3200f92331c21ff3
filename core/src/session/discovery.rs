//! Discovery filtering for the central role

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::radio::PeerHandle;

/// A device seen during one scan cycle. Only meaningful until the cycle ends
/// or a connection to it is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredPeer {
    pub handle: PeerHandle,
    /// Service UUIDs listed in the advertisement
    pub services: BTreeSet<Uuid>,
    /// Advertised local name, if the peripheral sent one
    pub local_name: Option<String>,
}

impl DiscoveredPeer {
    pub fn new(handle: PeerHandle, services: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            handle,
            services: services.into_iter().collect(),
            local_name: None,
        }
    }

    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    pub fn advertises(&self, service: &Uuid) -> bool {
        self.services.contains(service)
    }
}

/// Pick the peer to report from one scan batch: the first one, in batch
/// order, advertising `service`. No ranking beyond that.
pub fn select_candidate<'a>(
    batch: &'a [DiscoveredPeer],
    service: &Uuid,
) -> Option<&'a DiscoveredPeer> {
    batch.iter().find(|peer| peer.advertises(service))
}
