//! Display names for the local participant and every peer.
//!
//! The local name is announced to all peers when it changes and sent to each
//! new peer on connect.

use room_runtime::{
    replay_to, replicate, MessageError, MessageSet, Origin, PeerId, PluginError, RoomPlugin,
    RoomState, SlotNamespace, WireMessage,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const PLUGIN_NAME: &str = "names";

/// Name used when none (or an empty one) is provided.
pub const DEFAULT_NAME: &str = "unnamed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NameMessage {
    Identification { name: String },
}

impl MessageSet for NameMessage {
    const KINDS: &'static [&'static str] = &["identification"];
}

/// Per-participant name slot.
struct DisplayName(String);

/// Changes the local name and announces it to every peer.
///
/// `None` or an empty string falls back to [`DEFAULT_NAME`].
pub fn set_local_name(room: &mut RoomState, name: Option<&str>) -> Result<usize, MessageError> {
    let name = match name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => DEFAULT_NAME.to_string(),
    };
    room.local_mut().extensions.insert(DisplayName(name.clone()));
    replicate(room, &Origin::Local, &NameMessage::Identification { name })
}

/// The local participant's name.
pub fn local_name(room: &RoomState) -> &str {
    room.local()
        .extensions
        .get::<DisplayName>()
        .map(|name| name.0.as_str())
        .unwrap_or(DEFAULT_NAME)
}

/// The name a peer identified itself with, if it has done so.
pub fn name_of<'a>(room: &'a RoomState, peer: &PeerId) -> Option<&'a str> {
    room.peer(peer)?
        .extensions
        .get::<DisplayName>()
        .map(|name| name.0.as_str())
}

/// Keeps display names in sync across the room.
#[derive(Debug, Default)]
pub struct NamesPlugin {
    initial_name: Option<String>,
}

impl NamesPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `name` as the local display name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            initial_name: Some(name.into()),
        }
    }
}

impl RoomPlugin for NamesPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn initialize(&mut self, room: &mut RoomState) -> Result<(), PluginError> {
        room.claim_slot::<DisplayName>(SlotNamespace::Peer)?;
        set_local_name(room, self.initial_name.as_deref())?;
        Ok(())
    }

    fn peer_setup(&mut self, room: &mut RoomState, peer: &PeerId) -> Result<(), PluginError> {
        let announcement = NameMessage::Identification {
            name: local_name(room).to_string(),
        };
        replay_to(room, peer, [announcement])?;
        Ok(())
    }

    fn process_message(
        &mut self,
        room: &mut RoomState,
        message: &WireMessage,
        from: &PeerId,
    ) -> Result<(), PluginError> {
        let Some(decoded) = message.interpret::<NameMessage>() else {
            return Ok(());
        };
        let NameMessage::Identification { name } = decoded?;

        if let Some(peer) = room.peer_mut(from) {
            debug!("Peer {} is now known as {}", from, name);
            peer.extensions.insert(DisplayName(name));
        }
        Ok(())
    }
}
