//! # Room State
//!
//! The shared, progressively-extended state of one room. It has three
//! namespaces:
//!
//! - **local** - the local participant: its id, its connect capability and
//!   the extension slots plugins attach to it
//! - **peers** - every connected remote participant, keyed by [`PeerId`]
//! - **objects** - shared objects keyed by [`ObjectId`], kept in presentation
//!   order
//!
//! plus room-level slots where plugins keep their own state and expose
//! capability functions to other plugins.
//!
//! ## Slot ownership
//!
//! Plugins extend records through typed [`Extensions`] slots. A plugin claims
//! the slot types it owns during `initialize` ([`RoomState::claim_slot`] or
//! [`RoomState::install`]); a conflicting claim by another plugin is an error.
//! Slot types keep their fields private, so other plugins can only use the
//! functions the owner exposes.
//!
//! Peer entries are created and removed by the runtime only.

use crate::error::{SlotError, TransportError};
use crate::extensions::Extensions;
use crate::message::WireMessage;
use crate::transport::{PeerConnection, PeerConnector};
use crate::types::{ObjectId, PeerId};
use serde::{Deserialize, Serialize};
use std::any::{type_name, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

// ============================================================================
// Participants
// ============================================================================

/// The local participant (`self` in the room model).
pub struct LocalPeer {
    id: PeerId,
    connector: Arc<dyn PeerConnector>,
    /// Slots contributed by plugins
    pub extensions: Extensions,
}

impl LocalPeer {
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Asks the transport to connect to `peer_id`.
    pub fn connect(&self, peer_id: &PeerId) -> Result<(), TransportError> {
        debug!("{} requesting connection to {}", self.id, peer_id);
        self.connector.connect(peer_id)
    }
}

/// A connected remote participant.
pub struct RemotePeer {
    id: PeerId,
    connection: Arc<dyn PeerConnection>,
    /// Slots contributed by plugins
    pub extensions: Extensions,
}

impl RemotePeer {
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Sends a message to this peer only.
    pub fn send(&self, message: &WireMessage) -> Result<(), TransportError> {
        self.connection.send(message)
    }

    /// Closes the underlying connection.
    pub fn close(&self) {
        self.connection.close();
    }
}

// ============================================================================
// Objects
// ============================================================================

/// Where to put an object relative to another in presentation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Before,
    After,
}

/// A shared object: an identifier plus the slots plugins attach to it.
#[derive(Debug)]
pub struct RoomObject {
    id: ObjectId,
    pub extensions: Extensions,
}

impl RoomObject {
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

/// The `objects` namespace.
///
/// Besides the entries themselves, the table keeps the presentation order
/// (last = front-most) and the id counter. Identifiers are issued as
/// `last + 1`; ids observed from peers advance the counter so a locally
/// issued id never collides with, or reuses, one already seen this session.
#[derive(Debug, Default)]
pub struct ObjectTable {
    entries: HashMap<ObjectId, RoomObject>,
    order: Vec<ObjectId>,
    last_issued: u64,
}

impl ObjectTable {
    /// Issues a fresh identifier.
    pub fn allocate_id(&mut self) -> ObjectId {
        self.last_issued += 1;
        ObjectId(self.last_issued)
    }

    /// Advances the counter past `id` if needed.
    pub fn observe_id(&mut self, id: ObjectId) {
        self.last_issued = self.last_issued.max(id.0);
    }

    /// The highest identifier issued or observed so far.
    pub fn last_issued(&self) -> ObjectId {
        ObjectId(self.last_issued)
    }

    /// Creates the entry for `id`, or returns the existing one.
    ///
    /// Either way the object moves to the front of the presentation order, so
    /// spawning an existing id replaces it instead of duplicating it.
    pub fn upsert(&mut self, id: ObjectId) -> &mut RoomObject {
        self.observe_id(id);
        self.order.retain(|existing| *existing != id);
        self.order.push(id);
        self.entries.entry(id).or_insert_with(|| RoomObject {
            id,
            extensions: Extensions::new(),
        })
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<RoomObject> {
        self.order.retain(|existing| *existing != id);
        self.entries.remove(&id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&RoomObject> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut RoomObject> {
        self.entries.get_mut(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identifiers in presentation order, back-most first.
    pub fn ids(&self) -> &[ObjectId] {
        &self.order
    }

    /// Objects in presentation order, back-most first.
    pub fn iter(&self) -> impl Iterator<Item = &RoomObject> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// Moves `id` to the front. Returns `false` if the object is unknown.
    pub fn move_to_front(&mut self, id: ObjectId) -> bool {
        if !self.entries.contains_key(&id) {
            return false;
        }
        self.order.retain(|existing| *existing != id);
        self.order.push(id);
        true
    }

    /// Moves `id` directly before or after `target`. Returns `false` if either
    /// object is unknown or they are the same object.
    pub fn place_relative(&mut self, id: ObjectId, target: ObjectId, placement: Placement) -> bool {
        if id == target || !self.entries.contains_key(&id) || !self.entries.contains_key(&target) {
            return false;
        }
        self.order.retain(|existing| *existing != id);
        let Some(position) = self.order.iter().position(|existing| *existing == target) else {
            return false;
        };
        let index = match placement {
            Placement::Before => position,
            Placement::After => position + 1,
        };
        self.order.insert(index, id);
        true
    }
}

// ============================================================================
// Slot registry
// ============================================================================

/// The record kind a slot type is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotNamespace {
    Room,
    Peer,
    Object,
}

#[derive(Debug, Clone)]
struct SlotClaim {
    owner: String,
    slot: &'static str,
}

/// Owner used for claims made outside of any plugin hook.
pub const HOST_OWNER: &str = "host";

// ============================================================================
// Room state
// ============================================================================

/// State of one room, owned by a [`PluginRuntime`](crate::PluginRuntime).
pub struct RoomState {
    local: LocalPeer,
    peers: BTreeMap<PeerId, RemotePeer>,
    objects: ObjectTable,
    extensions: Extensions,
    slots: HashMap<(SlotNamespace, TypeId), SlotClaim>,
    active_plugin: Option<String>,
}

impl RoomState {
    /// Creates an empty room for the local participant.
    pub fn new(local_id: PeerId, connector: Arc<dyn PeerConnector>) -> Self {
        Self {
            local: LocalPeer {
                id: local_id,
                connector,
                extensions: Extensions::new(),
            },
            peers: BTreeMap::new(),
            objects: ObjectTable::default(),
            extensions: Extensions::new(),
            slots: HashMap::new(),
            active_plugin: None,
        }
    }

    // ------------------------------------------------------------------
    // Local participant
    // ------------------------------------------------------------------

    pub fn local(&self) -> &LocalPeer {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut LocalPeer {
        &mut self.local
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local.id
    }

    // ------------------------------------------------------------------
    // Peers
    // ------------------------------------------------------------------

    pub fn peer(&self, peer_id: &PeerId) -> Option<&RemotePeer> {
        self.peers.get(peer_id)
    }

    pub fn peer_mut(&mut self, peer_id: &PeerId) -> Option<&mut RemotePeer> {
        self.peers.get_mut(peer_id)
    }

    pub fn has_peer(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    /// Connected peers in identifier order.
    pub fn peers(&self) -> impl Iterator<Item = &RemotePeer> {
        self.peers.values()
    }

    pub fn peers_mut(&mut self) -> impl Iterator<Item = &mut RemotePeer> {
        self.peers.values_mut()
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.keys().cloned().collect()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub(crate) fn insert_peer(&mut self, peer_id: PeerId, connection: Arc<dyn PeerConnection>) {
        self.peers.insert(
            peer_id.clone(),
            RemotePeer {
                id: peer_id,
                connection,
                extensions: Extensions::new(),
            },
        );
    }

    pub(crate) fn remove_peer(&mut self, peer_id: &PeerId) -> Option<RemotePeer> {
        self.peers.remove(peer_id)
    }

    /// Sends `message` to every connected peer.
    ///
    /// A failed send is logged and does not stop delivery to the others.
    /// Returns the number of peers the message was handed to.
    pub fn broadcast(&self, message: &WireMessage) -> usize {
        let mut delivered = 0;
        for peer in self.peers.values() {
            match peer.send(message) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to send {} to {}: {}", message.kind(), peer.id, e),
            }
        }
        delivered
    }

    /// Sends `message` to one peer.
    pub fn send_to(&self, peer_id: &PeerId, message: &WireMessage) -> Result<(), TransportError> {
        self.peers
            .get(peer_id)
            .ok_or_else(|| TransportError::Closed(peer_id.clone()))?
            .send(message)
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    pub fn objects(&self) -> &ObjectTable {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut ObjectTable {
        &mut self.objects
    }

    // ------------------------------------------------------------------
    // Room-level slots
    // ------------------------------------------------------------------

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Claims slot type `T` in `namespace` for the active plugin.
    ///
    /// Claiming a slot the same owner already holds succeeds.
    pub fn claim_slot<T: 'static>(&mut self, namespace: SlotNamespace) -> Result<(), SlotError> {
        let claimant = self
            .active_plugin
            .clone()
            .unwrap_or_else(|| HOST_OWNER.to_string());
        let key = (namespace, TypeId::of::<T>());

        if let Some(existing) = self.slots.get(&key) {
            if existing.owner == claimant {
                return Ok(());
            }
            return Err(SlotError::AlreadyClaimed {
                namespace,
                slot: existing.slot,
                owner: existing.owner.clone(),
                claimant,
            });
        }

        debug!("[{}] claimed {:?} slot {}", claimant, namespace, type_name::<T>());
        self.slots.insert(
            key,
            SlotClaim {
                owner: claimant,
                slot: type_name::<T>(),
            },
        );
        Ok(())
    }

    /// Returns the owner of slot type `T` in `namespace`, if claimed.
    pub fn slot_owner<T: 'static>(&self, namespace: SlotNamespace) -> Option<&str> {
        self.slots
            .get(&(namespace, TypeId::of::<T>()))
            .map(|claim| claim.owner.as_str())
    }

    /// Claims room slot `T` and stores `value` in it.
    pub fn install<T: Send + 'static>(&mut self, value: T) -> Result<(), SlotError> {
        self.claim_slot::<T>(SlotNamespace::Room)?;
        self.extensions.insert(value);
        Ok(())
    }

    /// Returns room slot `T`.
    pub fn slot<T: 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    /// Returns room slot `T` mutably.
    pub fn slot_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.extensions.get_mut::<T>()
    }

    /// Name of the plugin whose hook is currently running.
    pub fn active_plugin(&self) -> Option<&str> {
        self.active_plugin.as_deref()
    }

    pub(crate) fn set_active_plugin(&mut self, plugin: Option<String>) {
        self.active_plugin = plugin;
    }
}
