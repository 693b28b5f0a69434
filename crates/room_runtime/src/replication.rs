//! Replication helpers.
//!
//! Every mutating capability a plugin exposes takes an [`Origin`]. A local
//! mutation is applied and then broadcast to every connected peer; a mutation
//! received from a peer is applied only. Since every peer is directly
//! connected to every other, re-broadcasting a received mutation would only
//! echo it back, so remote origins never produce outbound traffic.
//!
//! Bootstrap happens in `peer_setup`: each plugin owning replicated state
//! replays it to the new peer with [`replay_to`]. Conflicts resolve as
//! last-write-wins per field.

use crate::error::MessageError;
use crate::message::WireMessage;
use crate::room::RoomState;
use crate::types::PeerId;
use serde::Serialize;
use tracing::{trace, warn};

/// Where a mutation comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Made by the local participant; must be broadcast
    Local,
    /// Received from the given peer; must not be re-broadcast
    Remote(PeerId),
}

impl Origin {
    pub fn is_local(&self) -> bool {
        matches!(self, Origin::Local)
    }

    /// The peer a remote mutation came from.
    pub fn peer(&self) -> Option<&PeerId> {
        match self {
            Origin::Local => None,
            Origin::Remote(peer) => Some(peer),
        }
    }
}

impl From<&PeerId> for Origin {
    fn from(peer: &PeerId) -> Self {
        Origin::Remote(peer.clone())
    }
}

/// Broadcasts `payload` when the mutation is local.
///
/// Call after applying the mutation to `room`. Returns the number of peers the
/// message was handed to (always 0 for remote origins).
pub fn replicate<T: Serialize>(
    room: &RoomState,
    origin: &Origin,
    payload: &T,
) -> Result<usize, MessageError> {
    if !origin.is_local() {
        return Ok(0);
    }
    let message = WireMessage::from_payload(payload)?;
    trace!("Replicating {} to {} peers", message.kind(), room.peer_count());
    Ok(room.broadcast(&message))
}

/// Sends a snapshot to a single peer, one message per payload, in order.
///
/// Delivery failures are logged and the remaining payloads are still sent.
/// Returns the number of messages handed to the transport.
pub fn replay_to<T, I>(room: &RoomState, peer: &PeerId, payloads: I) -> Result<usize, MessageError>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let mut sent = 0;
    for payload in payloads {
        let message = WireMessage::from_payload(&payload)?;
        match room.send_to(peer, &message) {
            Ok(()) => sent += 1,
            Err(e) => warn!("Failed to replay {} to {}: {}", message.kind(), peer, e),
        }
    }
    Ok(sent)
}
