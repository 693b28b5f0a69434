//! Object stacking.
//!
//! A stackable object dropped on another records it as its parent. Moving,
//! rotating, raising or flipping an object then applies to its whole stack
//! chain: the object itself, its parent, the parent's parent and so on.
//!
//! Chains are followed with a visited set and stop at deleted parents, so a
//! corrupted link can never loop.

use crate::error::ObjectError;
use crate::objects::{self, ObjectMessage, Side};
use room_runtime::{
    replay_to, replicate, MessageSet, ObjectId, Origin, PeerId, PluginError, RoomPlugin,
    RoomState, SlotNamespace, Vector2D, WireMessage,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

pub const PLUGIN_NAME: &str = "object_stacking";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StackMessage {
    ObjectStack {
        id: ObjectId,
        #[serde(rename = "parentId", default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<ObjectId>,
        stackable: bool,
    },
}

impl MessageSet for StackMessage {
    const KINDS: &'static [&'static str] = &["object_stack"];
}

/// A mutation applied to a whole stack chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StackOp {
    Position(Vector2D),
    Rotation(f64),
    MoveFront,
    Flip(Side),
}

impl StackOp {
    fn from_message(message: &ObjectMessage) -> Option<(ObjectId, StackOp)> {
        match *message {
            ObjectMessage::ObjectPosition { id, position } => Some((id, StackOp::Position(position))),
            ObjectMessage::ObjectRotation { id, rotation } => Some((id, StackOp::Rotation(rotation))),
            ObjectMessage::ObjectMoveFront { id } => Some((id, StackOp::MoveFront)),
            ObjectMessage::ObjectFlip { id, side } => Some((id, StackOp::Flip(side))),
            _ => None,
        }
    }
}

/// Per-object stack link.
#[derive(Debug, Clone, Copy, Default)]
struct StackLink {
    parent: Option<ObjectId>,
    stackable: bool,
}

fn link(room: &RoomState, id: ObjectId) -> Option<StackLink> {
    room.objects().get(id)?.extensions.get::<StackLink>().copied()
}

fn link_mut(room: &mut RoomState, id: ObjectId) -> Result<&mut StackLink, ObjectError> {
    room.objects_mut()
        .get_mut(id)
        .map(|object| object.extensions.get_or_insert_with(StackLink::default))
        .ok_or(ObjectError::UnknownObject(id))
}

fn announce(room: &RoomState, id: ObjectId, origin: &Origin) -> Result<(), ObjectError> {
    let link = link(room, id).unwrap_or_default();
    replicate(
        room,
        origin,
        &StackMessage::ObjectStack {
            id,
            parent_id: link.parent,
            stackable: link.stackable,
        },
    )?;
    Ok(())
}

pub fn is_stackable(room: &RoomState, id: ObjectId) -> bool {
    link(room, id).map(|link| link.stackable).unwrap_or(false)
}

pub fn parent_of(room: &RoomState, id: ObjectId) -> Option<ObjectId> {
    link(room, id)?.parent
}

/// `id` followed by its parents, up to the first missing or repeated object.
pub fn stack_chain(room: &RoomState, id: ObjectId) -> Vec<ObjectId> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut next = Some(id);

    while let Some(current) = next {
        if !room.objects().contains(current) || !seen.insert(current) {
            break;
        }
        chain.push(current);
        next = parent_of(room, current);
    }
    chain
}

/// Marks an object as stackable or not.
pub fn set_stackable(room: &mut RoomState, id: ObjectId, stackable: bool, origin: &Origin) -> Result<(), ObjectError> {
    link_mut(room, id)?.stackable = stackable;
    announce(room, id, origin)
}

/// Stacks `top` onto `base` and moves it onto the base's position.
///
/// Returns `false` without changing anything when `top` is not stackable or
/// the link would create a loop.
pub fn stack_onto(room: &mut RoomState, top: ObjectId, base: ObjectId) -> Result<bool, ObjectError> {
    let base_position = objects::descriptors(room, base)
        .map(objects::ObjectDescriptors::position)
        .ok_or(ObjectError::UnknownObject(base))?;
    if !room.objects().contains(top) {
        return Err(ObjectError::UnknownObject(top));
    }
    if !is_stackable(room, top) || stack_chain(room, base).contains(&top) {
        return Ok(false);
    }

    link_mut(room, top)?.parent = Some(base);
    announce(room, top, &Origin::Local)?;
    apply(room, top, StackOp::Position(base_position))?;
    Ok(true)
}

/// Detaches an object from its parent.
pub fn unstack(room: &mut RoomState, id: ObjectId, origin: &Origin) -> Result<(), ObjectError> {
    link_mut(room, id)?.parent = None;
    announce(room, id, origin)
}

fn apply_one(room: &mut RoomState, id: ObjectId, op: StackOp) -> Result<(), ObjectError> {
    match op {
        StackOp::Position(position) => objects::apply_position(room, id, position),
        StackOp::Rotation(rotation) => objects::apply_rotation(room, id, rotation),
        StackOp::MoveFront => objects::apply_move_to_front(room, id),
        StackOp::Flip(side) => objects::apply_flip(room, id, side),
    }
}

/// Applies `op` to the parents of `id`, without broadcasting.
///
/// Raising goes from the deepest parent up so that `id` stays front-most.
fn apply_to_parents(room: &mut RoomState, id: ObjectId, op: StackOp) {
    let chain = stack_chain(room, id);
    if chain.len() < 2 {
        return;
    }

    let targets: Vec<ObjectId> = match op {
        StackOp::MoveFront => chain.iter().rev().copied().collect(),
        _ => chain[1..].to_vec(),
    };
    for target in targets {
        if let Err(e) = apply_one(room, target, op) {
            debug!("Stack chain of {} stopped at {}: {}", id, target, e);
            break;
        }
    }
}

/// Applies a local mutation to `id` and its whole chain.
///
/// Only the mutation of `id` goes on the wire; every peer re-applies it to
/// the chain when it arrives.
pub fn apply(room: &mut RoomState, id: ObjectId, op: StackOp) -> Result<(), ObjectError> {
    let origin = Origin::Local;
    match op {
        StackOp::Position(position) => objects::set_position(room, id, position, &origin)?,
        StackOp::Rotation(rotation) => objects::set_rotation(room, id, rotation, &origin)?,
        StackOp::MoveFront => objects::move_to_front(room, id, &origin)?,
        StackOp::Flip(side) => objects::flip(room, id, side, &origin)?,
    }
    apply_to_parents(room, id, op);
    Ok(())
}

#[derive(Debug, Default)]
pub struct ObjectStackingPlugin;

impl ObjectStackingPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl RoomPlugin for ObjectStackingPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn dependencies(&self) -> Vec<String> {
        vec![objects::PLUGIN_NAME.to_string()]
    }

    fn initialize(&mut self, room: &mut RoomState) -> Result<(), PluginError> {
        room.claim_slot::<StackLink>(SlotNamespace::Object)?;
        Ok(())
    }

    fn peer_setup(&mut self, room: &mut RoomState, peer: &PeerId) -> Result<(), PluginError> {
        let links: Vec<StackMessage> = room
            .objects()
            .iter()
            .filter_map(|object| {
                let link = object.extensions.get::<StackLink>()?;
                (link.parent.is_some() || link.stackable).then(|| StackMessage::ObjectStack {
                    id: object.id(),
                    parent_id: link.parent,
                    stackable: link.stackable,
                })
            })
            .collect();
        replay_to(room, peer, links)?;
        Ok(())
    }

    fn process_message(
        &mut self,
        room: &mut RoomState,
        message: &WireMessage,
        from: &PeerId,
    ) -> Result<(), PluginError> {
        if let Some(decoded) = message.interpret::<StackMessage>() {
            let StackMessage::ObjectStack {
                id,
                parent_id,
                stackable,
            } = decoded?;
            match link_mut(room, id) {
                Ok(link) => {
                    link.parent = parent_id;
                    link.stackable = stackable;
                }
                Err(e) => debug!("Ignoring object_stack from {}: {}", from, e),
            }
            return Ok(());
        }

        // The object itself was already updated by object_properties.
        if let Some(decoded) = message.interpret::<ObjectMessage>() {
            if let Some((id, op)) = StackOp::from_message(&decoded?) {
                apply_to_parents(room, id, op);
            }
        }
        Ok(())
    }
}
