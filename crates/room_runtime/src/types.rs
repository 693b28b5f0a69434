//! # Core Type Definitions
//!
//! Identifier and value types shared by the runtime and every plugin.
//!
//! - [`PeerId`] - Identifier of a session participant (local or remote)
//! - [`ObjectId`] - Identifier of a shared object, issued monotonically
//! - [`Vector2D`] - 2D position used by object and cursor plugins
//!
//! All types serialize transparently so they appear on the wire as plain
//! strings and numbers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a participant in a room.
///
/// Peer identifiers are opaque strings handed out by the transport layer.
/// The runtime never interprets them beyond equality and ordering.
///
/// # Examples
///
/// ```rust
/// use room_runtime::PeerId;
///
/// let peer = PeerId::from("alice");
/// assert_eq!(peer.as_str(), "alice");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    /// Creates a new random peer ID using UUID v4.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PeerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of a shared object.
///
/// Object identifiers are issued in increasing order and are never reused
/// within a session, see [`ObjectTable::allocate_id`](crate::room::ObjectTable::allocate_id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ObjectId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ============================================================================
// Values
// ============================================================================

/// A 2D position or offset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2D {
    pub x: f64,
    pub y: f64,
}

impl Vector2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_transparently() {
        let peer = PeerId::from("peer-1");
        assert_eq!(serde_json::to_string(&peer).unwrap(), "\"peer-1\"");

        let object = ObjectId(7);
        assert_eq!(serde_json::to_string(&object).unwrap(), "7");
        let parsed: ObjectId = serde_json::from_str("12").unwrap();
        assert_eq!(parsed, ObjectId(12));
    }

    #[test]
    fn test_random_peer_ids_are_distinct() {
        assert_ne!(PeerId::random(), PeerId::random());
    }
}
