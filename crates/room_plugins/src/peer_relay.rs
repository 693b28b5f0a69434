//! Mesh formation without a server.
//!
//! When a peer connects, it is told about every other connected peer; on
//! receipt it connects to each one it does not know yet. Every participant
//! ends up directly connected to every other.

use room_runtime::{
    replay_to, MessageSet, PeerId, PluginError, RoomPlugin, RoomState, WireMessage,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const PLUGIN_NAME: &str = "peer_relaying";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    PeerRelayMessage {
        #[serde(rename = "peerId")]
        peer_id: PeerId,
    },
}

impl MessageSet for RelayMessage {
    const KINDS: &'static [&'static str] = &["peer_relay_message"];
}

#[derive(Debug, Default)]
pub struct PeerRelayPlugin;

impl PeerRelayPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl RoomPlugin for PeerRelayPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn peer_setup(&mut self, room: &mut RoomState, peer: &PeerId) -> Result<(), PluginError> {
        let others: Vec<RelayMessage> = room
            .peer_ids()
            .into_iter()
            .filter(|other| other != peer)
            .map(|peer_id| RelayMessage::PeerRelayMessage { peer_id })
            .collect();
        let sent = replay_to(room, peer, others)?;
        debug!("Relayed {} peers to {}", sent, peer);
        Ok(())
    }

    fn process_message(
        &mut self,
        room: &mut RoomState,
        message: &WireMessage,
        _from: &PeerId,
    ) -> Result<(), PluginError> {
        let Some(decoded) = message.interpret::<RelayMessage>() else {
            return Ok(());
        };
        let RelayMessage::PeerRelayMessage { peer_id } = decoded?;

        if &peer_id == room.local_id() || room.has_peer(&peer_id) {
            return Ok(());
        }
        info!("Connecting to relayed peer {}", peer_id);
        room.local().connect(&peer_id)?;
        Ok(())
    }
}
