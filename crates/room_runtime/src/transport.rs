//! Transport capabilities consumed by the runtime.
//!
//! The runtime never moves bytes itself. A host hands it one
//! [`PeerConnection`] per connected peer and one [`PeerConnector`] for the
//! local participant. How those reach the other side (WebRTC, WebSocket,
//! in-process channels) is the host's business.
//!
//! [`ChannelHub`] is an in-process implementation backed by tokio channels,
//! used by the host harness and by tests to wire several rooms into a mesh.

use crate::error::TransportError;
use crate::message::WireMessage;
use crate::types::PeerId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

/// Send/close capability for one connected peer.
pub trait PeerConnection: Send + Sync {
    /// Queues a message for delivery to the peer.
    fn send(&self, message: &WireMessage) -> Result<(), TransportError>;

    /// Closes the connection. Closing twice is a no-op.
    fn close(&self);
}

/// Capability of the local participant to open a connection to a peer.
pub trait PeerConnector: Send + Sync {
    /// Requests a connection. Completion is reported back to the host by the
    /// transport, which then calls [`PluginRuntime::connect_peer`](crate::PluginRuntime::connect_peer).
    fn connect(&self, peer_id: &PeerId) -> Result<(), TransportError>;
}

/// A connector for rooms that never initiate connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConnector;

impl PeerConnector for NoopConnector {
    fn connect(&self, peer_id: &PeerId) -> Result<(), TransportError> {
        debug!("Ignoring connection request to {}", peer_id);
        Ok(())
    }
}

// ============================================================================
// In-process transport
// ============================================================================

/// Event delivered to a participant's inbox by the [`ChannelHub`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A connection with `peer` is established
    Connected { peer: PeerId },
    /// `from` sent a raw JSON message
    Message { from: PeerId, payload: String },
    /// The connection with `peer` is gone
    Disconnected { peer: PeerId },
}

/// In-process message switch connecting any number of participants.
///
/// Each participant registers an inbox and drains it with the receiver it
/// gets back. Messages are encoded to JSON on send so that the receiving
/// side exercises the same parsing path as a real network transport.
#[derive(Clone, Default)]
pub struct ChannelHub {
    inboxes: Arc<DashMap<PeerId, UnboundedSender<TransportEvent>>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a participant and returns its inbox.
    ///
    /// Registering an id twice replaces the previous inbox.
    pub fn register(&self, peer_id: PeerId) -> UnboundedReceiver<TransportEvent> {
        let (sender, receiver) = unbounded_channel();
        self.inboxes.insert(peer_id, sender);
        receiver
    }

    /// Removes a participant; further deliveries to it fail with [`TransportError::Closed`].
    pub fn unregister(&self, peer_id: &PeerId) {
        self.inboxes.remove(peer_id);
    }

    /// Returns whether `peer_id` has a registered inbox.
    pub fn is_registered(&self, peer_id: &PeerId) -> bool {
        self.inboxes.contains_key(peer_id)
    }

    /// Creates the connection `from` uses to talk to `to`.
    pub fn connection(&self, from: PeerId, to: PeerId) -> Arc<ChannelConnection> {
        Arc::new(ChannelConnection {
            from,
            to,
            hub: self.clone(),
        })
    }

    /// Creates the connector for the participant `local`.
    pub fn connector(&self, local: PeerId) -> Arc<ChannelConnector> {
        Arc::new(ChannelConnector {
            local,
            hub: self.clone(),
        })
    }

    fn deliver(&self, to: &PeerId, event: TransportEvent) -> Result<(), TransportError> {
        let inbox = self
            .inboxes
            .get(to)
            .ok_or_else(|| TransportError::Closed(to.clone()))?;
        inbox
            .send(event)
            .map_err(|_| TransportError::Closed(to.clone()))
    }
}

/// One direction of an in-process connection.
pub struct ChannelConnection {
    from: PeerId,
    to: PeerId,
    hub: ChannelHub,
}

impl PeerConnection for ChannelConnection {
    fn send(&self, message: &WireMessage) -> Result<(), TransportError> {
        let payload = message
            .encode()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        trace!("{} -> {}: {}", self.from, self.to, payload);
        self.hub.deliver(
            &self.to,
            TransportEvent::Message {
                from: self.from.clone(),
                payload,
            },
        )
    }

    fn close(&self) {
        let _ = self.hub.deliver(
            &self.to,
            TransportEvent::Disconnected {
                peer: self.from.clone(),
            },
        );
    }
}

/// Connector that announces a new connection to both participants.
pub struct ChannelConnector {
    local: PeerId,
    hub: ChannelHub,
}

impl PeerConnector for ChannelConnector {
    fn connect(&self, peer_id: &PeerId) -> Result<(), TransportError> {
        self.hub.deliver(
            peer_id,
            TransportEvent::Connected {
                peer: self.local.clone(),
            },
        )?;
        self.hub.deliver(
            &self.local,
            TransportEvent::Connected {
                peer: peer_id.clone(),
            },
        )
    }
}
