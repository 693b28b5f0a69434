//! # Object Properties
//!
//! Replicated shared objects: position, rotation, visible side, presentation
//! order, creation and deletion.
//!
//! Every capability takes an [`Origin`]. Local mutations are applied and then
//! broadcast as one message; mutations received from a peer are applied only.
//! Messages naming an object that does not exist (typically one deleted
//! concurrently) are logged and ignored, and so are spawns from a peer that
//! carry no id.
//!
//! ## Wire messages
//!
//! | type | fields |
//! |---|---|
//! | `object_spawn` | every [`ObjectDescriptors`] field, flattened |
//! | `object_position` | `id`, `position` |
//! | `object_rotation` | `id`, `rotation` |
//! | `object_move_front` | `id` |
//! | `place_relative` | `id`, `targetId`, `way` (`before`/`after`) |
//! | `object_flip` | `id`, `side` (`front`/`back`) |
//! | `delete_object` | `id` |

use crate::error::ObjectError;
use room_runtime::{
    replay_to, replicate, MessageSet, ObjectId, Origin, PeerId, Placement, PluginError,
    RoomPlugin, RoomState, SlotNamespace, Vector2D, WireMessage,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const PLUGIN_NAME: &str = "object_properties";

/// Spawn position when none is given.
pub const DEFAULT_POSITION: Vector2D = Vector2D { x: 300.0, y: 300.0 };
/// Spawn width when none is given.
pub const DEFAULT_WIDTH: f64 = 120.0;
/// Height used for placeholder images when none is given.
pub const DEFAULT_PLACEHOLDER_HEIGHT: f64 = 200.0;

// ============================================================================
// Data
// ============================================================================

/// Which image of an object is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Front,
    Back,
}

/// Complete, serializable description of a spawned object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescriptors {
    pub id: ObjectId,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    pub current_img: String,
    pub front_img: String,
    pub back_img: String,
    pub rotation_deg: f64,
    pub draggable: bool,
}

impl ObjectDescriptors {
    pub fn position(&self) -> Vector2D {
        Vector2D::new(self.x, self.y)
    }

    /// The side currently showing.
    pub fn side(&self) -> Side {
        if self.current_img != self.front_img && self.current_img == self.back_img {
            Side::Back
        } else {
            Side::Front
        }
    }
}

/// Partial descriptors used to spawn an object; missing fields get defaults.
///
/// This is also the shape of an `object_spawn` message, so a peer may send
/// as little as `{ "type": "object_spawn", "id": 7, "x": 10, "y": 20 }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSpawn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_img: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub front_img: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_img: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draggable: Option<bool>,
}

impl ObjectSpawn {
    /// A spawn at a given position, everything else defaulted.
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: ObjectId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_images(mut self, front: impl Into<String>, back: impl Into<String>) -> Self {
        self.front_img = Some(front.into());
        self.back_img = Some(back.into());
        self
    }

    /// Fills every missing field with its default.
    pub fn resolve(self, id: ObjectId) -> ObjectDescriptors {
        let placeholder = format!(
            "https://placekitten.com/{}/{}",
            self.width.unwrap_or(DEFAULT_WIDTH),
            self.height.unwrap_or(DEFAULT_PLACEHOLDER_HEIGHT)
        );
        let front_img = self.front_img.unwrap_or_else(|| placeholder.clone());
        ObjectDescriptors {
            id,
            x: self.x.unwrap_or(DEFAULT_POSITION.x),
            y: self.y.unwrap_or(DEFAULT_POSITION.y),
            width: Some(self.width.unwrap_or(DEFAULT_WIDTH)),
            height: self.height,
            current_img: self.current_img.unwrap_or_else(|| front_img.clone()),
            back_img: self.back_img.unwrap_or(placeholder),
            front_img,
            rotation_deg: self.rotation_deg.unwrap_or(0.0),
            draggable: self.draggable.unwrap_or(true),
        }
    }
}

impl From<&ObjectDescriptors> for ObjectSpawn {
    fn from(descriptors: &ObjectDescriptors) -> Self {
        Self {
            id: Some(descriptors.id),
            x: Some(descriptors.x),
            y: Some(descriptors.y),
            width: descriptors.width,
            height: descriptors.height,
            current_img: Some(descriptors.current_img.clone()),
            front_img: Some(descriptors.front_img.clone()),
            back_img: Some(descriptors.back_img.clone()),
            rotation_deg: Some(descriptors.rotation_deg),
            draggable: Some(descriptors.draggable),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectMessage {
    ObjectSpawn(ObjectSpawn),
    ObjectPosition {
        id: ObjectId,
        position: Vector2D,
    },
    ObjectRotation {
        id: ObjectId,
        rotation: f64,
    },
    ObjectMoveFront {
        id: ObjectId,
    },
    PlaceRelative {
        id: ObjectId,
        #[serde(rename = "targetId")]
        target_id: ObjectId,
        way: Placement,
    },
    ObjectFlip {
        id: ObjectId,
        side: Side,
    },
    DeleteObject {
        id: ObjectId,
    },
}

impl ObjectMessage {
    /// Object ids the message refers to.
    pub fn ids(&self) -> Vec<ObjectId> {
        match self {
            ObjectMessage::ObjectSpawn(spawn) => spawn.id.into_iter().collect(),
            ObjectMessage::PlaceRelative { id, target_id, .. } => vec![*id, *target_id],
            ObjectMessage::ObjectPosition { id, .. }
            | ObjectMessage::ObjectRotation { id, .. }
            | ObjectMessage::ObjectMoveFront { id }
            | ObjectMessage::ObjectFlip { id, .. }
            | ObjectMessage::DeleteObject { id } => vec![*id],
        }
    }
}

impl MessageSet for ObjectMessage {
    const KINDS: &'static [&'static str] = &[
        "object_spawn",
        "object_position",
        "object_rotation",
        "object_move_front",
        "place_relative",
        "object_flip",
        "delete_object",
    ];
}

/// Per-object slot holding the descriptors.
struct Properties(ObjectDescriptors);

// ============================================================================
// Capabilities
// ============================================================================

/// Read access to an object's descriptors.
pub fn descriptors(room: &RoomState, id: ObjectId) -> Option<&ObjectDescriptors> {
    room.objects()
        .get(id)?
        .extensions
        .get::<Properties>()
        .map(|properties| &properties.0)
}

/// Descriptors of every object, in presentation order (back-most first).
pub fn snapshot(room: &RoomState) -> Vec<ObjectDescriptors> {
    room.objects()
        .iter()
        .filter_map(|object| object.extensions.get::<Properties>())
        .map(|properties| properties.0.clone())
        .collect()
}

fn properties_mut(room: &mut RoomState, id: ObjectId) -> Result<&mut ObjectDescriptors, ObjectError> {
    room.objects_mut()
        .get_mut(id)
        .and_then(|object| object.extensions.get_mut::<Properties>())
        .map(|properties| &mut properties.0)
        .ok_or(ObjectError::UnknownObject(id))
}

/// Creates an object, or replaces the one with the same id.
///
/// A local spawn without an id gets a fresh one. A spawn from a peer must
/// name its id, since the object has to exist under the same id everywhere.
/// Ids received from peers advance the local counter so they are never
/// issued again. The object ends up front-most either way.
pub fn spawn(room: &mut RoomState, spawn: ObjectSpawn, origin: &Origin) -> Result<ObjectId, ObjectError> {
    let id = match (spawn.id, origin) {
        (Some(id), _) => id,
        (None, Origin::Local) => room.objects_mut().allocate_id(),
        (None, Origin::Remote(peer)) => return Err(ObjectError::MissingSpawnId(peer.clone())),
    };
    let descriptors = spawn.resolve(id);
    let message = ObjectMessage::ObjectSpawn(ObjectSpawn::from(&descriptors));

    room.objects_mut()
        .upsert(id)
        .extensions
        .insert(Properties(descriptors));
    debug!("Spawned object {} ({:?})", id, origin);

    replicate(room, origin, &message)?;
    Ok(id)
}

pub(crate) fn apply_position(room: &mut RoomState, id: ObjectId, position: Vector2D) -> Result<(), ObjectError> {
    let descriptors = properties_mut(room, id)?;
    descriptors.x = position.x;
    descriptors.y = position.y;
    Ok(())
}

pub(crate) fn apply_rotation(room: &mut RoomState, id: ObjectId, rotation: f64) -> Result<(), ObjectError> {
    properties_mut(room, id)?.rotation_deg = rotation;
    Ok(())
}

pub(crate) fn apply_move_to_front(room: &mut RoomState, id: ObjectId) -> Result<(), ObjectError> {
    if room.objects_mut().move_to_front(id) {
        Ok(())
    } else {
        Err(ObjectError::UnknownObject(id))
    }
}

pub(crate) fn apply_flip(room: &mut RoomState, id: ObjectId, side: Side) -> Result<(), ObjectError> {
    let descriptors = properties_mut(room, id)?;
    descriptors.current_img = match side {
        Side::Front => descriptors.front_img.clone(),
        Side::Back => descriptors.back_img.clone(),
    };
    Ok(())
}

pub fn set_position(room: &mut RoomState, id: ObjectId, position: Vector2D, origin: &Origin) -> Result<(), ObjectError> {
    apply_position(room, id, position)?;
    replicate(room, origin, &ObjectMessage::ObjectPosition { id, position })?;
    Ok(())
}

pub fn set_rotation(room: &mut RoomState, id: ObjectId, rotation: f64, origin: &Origin) -> Result<(), ObjectError> {
    apply_rotation(room, id, rotation)?;
    replicate(room, origin, &ObjectMessage::ObjectRotation { id, rotation })?;
    Ok(())
}

pub fn move_to_front(room: &mut RoomState, id: ObjectId, origin: &Origin) -> Result<(), ObjectError> {
    apply_move_to_front(room, id)?;
    replicate(room, origin, &ObjectMessage::ObjectMoveFront { id })?;
    Ok(())
}

pub fn flip(room: &mut RoomState, id: ObjectId, side: Side, origin: &Origin) -> Result<(), ObjectError> {
    apply_flip(room, id, side)?;
    replicate(room, origin, &ObjectMessage::ObjectFlip { id, side })?;
    Ok(())
}

/// Puts `id` directly before or after `target` in presentation order and
/// moves it onto the target's position.
pub fn place_relative(
    room: &mut RoomState,
    id: ObjectId,
    target: ObjectId,
    way: Placement,
    origin: &Origin,
) -> Result<(), ObjectError> {
    if id == target {
        return Err(ObjectError::SelfPlacement(id));
    }
    let target_position = descriptors(room, target)
        .map(ObjectDescriptors::position)
        .ok_or(ObjectError::UnknownObject(target))?;
    if !room.objects_mut().place_relative(id, target, way) {
        return Err(ObjectError::UnknownObject(id));
    }
    apply_position(room, id, target_position)?;
    replicate(
        room,
        origin,
        &ObjectMessage::PlaceRelative {
            id,
            target_id: target,
            way,
        },
    )?;
    Ok(())
}

/// Removes an object. Later messages naming it are ignored.
pub fn delete(room: &mut RoomState, id: ObjectId, origin: &Origin) -> Result<(), ObjectError> {
    if room.objects_mut().remove(id).is_none() {
        return Err(ObjectError::UnknownObject(id));
    }
    debug!("Deleted object {} ({:?})", id, origin);
    replicate(room, origin, &ObjectMessage::DeleteObject { id })?;
    Ok(())
}

/// Applies a decoded message.
///
/// Every id named by a message from a peer advances the local counter first,
/// even when the object itself is not known yet.
pub fn apply(room: &mut RoomState, message: ObjectMessage, origin: &Origin) -> Result<(), ObjectError> {
    if !origin.is_local() {
        for id in message.ids() {
            room.objects_mut().observe_id(id);
        }
    }
    match message {
        ObjectMessage::ObjectSpawn(request) => spawn(room, request, origin).map(|_| ()),
        ObjectMessage::ObjectPosition { id, position } => set_position(room, id, position, origin),
        ObjectMessage::ObjectRotation { id, rotation } => set_rotation(room, id, rotation, origin),
        ObjectMessage::ObjectMoveFront { id } => move_to_front(room, id, origin),
        ObjectMessage::PlaceRelative { id, target_id, way } => {
            place_relative(room, id, target_id, way, origin)
        }
        ObjectMessage::ObjectFlip { id, side } => flip(room, id, side, origin),
        ObjectMessage::DeleteObject { id } => delete(room, id, origin),
    }
}

// ============================================================================
// Plugin
// ============================================================================

#[derive(Debug, Default)]
pub struct ObjectPropertiesPlugin;

impl ObjectPropertiesPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl RoomPlugin for ObjectPropertiesPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn initialize(&mut self, room: &mut RoomState) -> Result<(), PluginError> {
        room.claim_slot::<Properties>(SlotNamespace::Object)?;
        Ok(())
    }

    fn cleanup(&mut self, room: &mut RoomState) -> Result<(), PluginError> {
        info!("Discarding {} objects", room.objects().len());
        Ok(())
    }

    fn peer_setup(&mut self, room: &mut RoomState, peer: &PeerId) -> Result<(), PluginError> {
        let spawns: Vec<ObjectMessage> = snapshot(room)
            .iter()
            .map(|descriptors| ObjectMessage::ObjectSpawn(descriptors.into()))
            .collect();
        let sent = replay_to(room, peer, spawns)?;
        debug!("Replayed {} objects to {}", sent, peer);
        Ok(())
    }

    fn process_message(
        &mut self,
        room: &mut RoomState,
        message: &WireMessage,
        from: &PeerId,
    ) -> Result<(), PluginError> {
        let Some(decoded) = message.interpret::<ObjectMessage>() else {
            return Ok(());
        };
        match apply(room, decoded?, &Origin::from(from)) {
            Err(ObjectError::UnknownObject(id)) => {
                debug!("Ignoring {} for unknown object {} from {}", message.kind(), id, from);
                Ok(())
            }
            Err(e @ (ObjectError::MissingSpawnId(_) | ObjectError::SelfPlacement(_))) => {
                warn!("Rejecting {} from {}: {}", message.kind(), from, e);
                Ok(())
            }
            other => other.map_err(PluginError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_spawn_defaults() {
        let descriptors = ObjectSpawn::default().resolve(ObjectId(1));
        assert_eq!(descriptors.position(), DEFAULT_POSITION);
        assert_eq!(descriptors.width, Some(DEFAULT_WIDTH));
        assert_eq!(descriptors.rotation_deg, 0.0);
        assert!(descriptors.draggable);
        assert_eq!(descriptors.current_img, descriptors.front_img);
        assert_eq!(descriptors.side(), Side::Front);
    }

    #[test]
    fn test_minimal_spawn_message_decodes() {
        let message = WireMessage::parse(r#"{"type":"object_spawn","id":7,"x":10,"y":20}"#).unwrap();
        let decoded = message.interpret::<ObjectMessage>().unwrap().unwrap();
        assert_eq!(
            decoded,
            ObjectMessage::ObjectSpawn(ObjectSpawn::at(10.0, 20.0).with_id(ObjectId(7)))
        );
    }

    #[test]
    fn test_spawn_message_is_flat_and_camel_case() {
        let descriptors = ObjectSpawn::at(1.0, 2.0)
            .with_images("front.png", "back.png")
            .resolve(ObjectId(3));
        let message = WireMessage::from_payload(&ObjectMessage::ObjectSpawn((&descriptors).into())).unwrap();

        assert_eq!(
            message.to_value(),
            json!({
                "type": "object_spawn",
                "id": 3,
                "x": 1.0,
                "y": 2.0,
                "width": 120.0,
                "currentImg": "front.png",
                "frontImg": "front.png",
                "backImg": "back.png",
                "rotationDeg": 0.0,
                "draggable": true
            })
        );
    }

    #[test]
    fn test_place_relative_wire_names() {
        let message = WireMessage::from_payload(&ObjectMessage::PlaceRelative {
            id: ObjectId(1),
            target_id: ObjectId(2),
            way: Placement::After,
        })
        .unwrap();
        assert_eq!(
            message.to_value(),
            json!({ "type": "place_relative", "id": 1, "targetId": 2, "way": "after" })
        );
    }
}
