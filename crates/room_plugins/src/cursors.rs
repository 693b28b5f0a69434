//! Peer cursors: where every participant's pointer is and whether it is pressed.

use crate::names;
use room_runtime::{
    replay_to, replicate, MessageError, MessageSet, Origin, PeerId, PluginError, RoomPlugin,
    RoomState, SlotNamespace, Vector2D, WireMessage,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const PLUGIN_NAME: &str = "peer_cursors";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MouseMessage {
    MousePosition { position: Vector2D },
    MousePress { pressed: bool },
}

impl MessageSet for MouseMessage {
    const KINDS: &'static [&'static str] = &["mouse_position", "mouse_press"];
}

/// Cursor of one participant in board coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CursorState {
    pub world: Vector2D,
    pub pressed: bool,
}

struct Cursor(CursorState);

/// Cursor slot for the origin: the local cursor, or the sending peer's.
///
/// Returns `None` for peers without a cursor slot (never set up, or gone).
fn cursor_mut<'a>(room: &'a mut RoomState, origin: &Origin) -> Option<&'a mut CursorState> {
    let extensions = match origin {
        Origin::Local => &mut room.local_mut().extensions,
        Origin::Remote(peer) => &mut room.peer_mut(peer)?.extensions,
    };
    extensions.get_mut::<Cursor>().map(|cursor| &mut cursor.0)
}

/// Moves a cursor. Local moves are broadcast.
pub fn move_cursor(room: &mut RoomState, position: Vector2D, origin: &Origin) -> Result<usize, MessageError> {
    match cursor_mut(room, origin) {
        Some(cursor) => cursor.world = position,
        None => {
            debug!("Ignoring cursor move without a cursor slot ({:?})", origin);
            return Ok(0);
        }
    }
    replicate(room, origin, &MouseMessage::MousePosition { position })
}

/// Presses or releases a cursor. Local changes are broadcast.
pub fn set_pressed(room: &mut RoomState, pressed: bool, origin: &Origin) -> Result<usize, MessageError> {
    match cursor_mut(room, origin) {
        Some(cursor) => cursor.pressed = pressed,
        None => {
            debug!("Ignoring cursor press without a cursor slot ({:?})", origin);
            return Ok(0);
        }
    }
    replicate(room, origin, &MouseMessage::MousePress { pressed })
}

pub fn local_cursor(room: &RoomState) -> CursorState {
    room.local()
        .extensions
        .get::<Cursor>()
        .map(|cursor| cursor.0)
        .unwrap_or_default()
}

pub fn cursor_of(room: &RoomState, peer: &PeerId) -> Option<CursorState> {
    room.peer(peer)?.extensions.get::<Cursor>().map(|cursor| cursor.0)
}

/// Label shown next to a peer's cursor.
pub fn cursor_label(room: &RoomState, peer: &PeerId) -> String {
    names::name_of(room, peer)
        .unwrap_or(names::DEFAULT_NAME)
        .to_string()
}

#[derive(Debug, Default)]
pub struct PeerCursorsPlugin;

impl PeerCursorsPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl RoomPlugin for PeerCursorsPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn dependencies(&self) -> Vec<String> {
        vec![names::PLUGIN_NAME.to_string()]
    }

    fn initialize(&mut self, room: &mut RoomState) -> Result<(), PluginError> {
        room.claim_slot::<Cursor>(SlotNamespace::Peer)?;
        room.local_mut().extensions.insert(Cursor(CursorState::default()));
        Ok(())
    }

    fn peer_setup(&mut self, room: &mut RoomState, peer: &PeerId) -> Result<(), PluginError> {
        if let Some(remote) = room.peer_mut(peer) {
            remote.extensions.insert(Cursor(CursorState::default()));
        }
        let position = local_cursor(room).world;
        replay_to(room, peer, [MouseMessage::MousePosition { position }])?;
        Ok(())
    }

    fn process_message(
        &mut self,
        room: &mut RoomState,
        message: &WireMessage,
        from: &PeerId,
    ) -> Result<(), PluginError> {
        let Some(decoded) = message.interpret::<MouseMessage>() else {
            return Ok(());
        };
        let origin = Origin::from(from);
        match decoded? {
            MouseMessage::MousePosition { position } => move_cursor(room, position, &origin)?,
            MouseMessage::MousePress { pressed } => set_pressed(room, pressed, &origin)?,
        };
        Ok(())
    }

    fn handle_peer_disconnect(&mut self, room: &mut RoomState, peer: &PeerId) -> Result<(), PluginError> {
        if let Some(remote) = room.peer_mut(peer) {
            remote.extensions.remove::<Cursor>();
        }
        Ok(())
    }
}
