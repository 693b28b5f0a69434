//! Error types for the room runtime.
//!
//! One enum per concern, following the layering of the runtime:
//!
//! - [`ResolveError`] - load order could not be computed (fatal at load)
//! - [`SourceError`] - an external plugin source failed (recoverable, skipped)
//! - [`PluginError`] - a lifecycle hook failed
//! - [`RuntimeError`] - an operation on [`PluginRuntime`](crate::PluginRuntime) failed
//! - [`MessageError`] - a wire message could not be encoded or decoded
//! - [`TransportError`] - a peer capability failed to deliver
//! - [`SlotError`] - an extension slot was claimed twice

use crate::room::SlotNamespace;
use crate::types::PeerId;

/// Errors raised while computing a plugin load order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// A declared dependency names no known plugin
    #[error("missing dependency [{dependency}] required by [{requested_by}]")]
    MissingDependency {
        dependency: String,
        requested_by: String,
    },
    /// The dependency graph contains a cycle; `cycle` starts and ends with the same plugin
    #[error("circular dependency: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
}

/// Errors raised while fetching or instantiating an external plugin.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The plugin code could not be retrieved
    #[error("failed to fetch plugin from {location}: {reason}")]
    Fetch { location: String, reason: String },
    /// The plugin code was retrieved but could not be turned into a plugin
    #[error("failed to instantiate plugin from {location}: {reason}")]
    Instantiate { location: String, reason: String },
    /// The library was built against a different plugin interface
    #[error("plugin at {location} was built for ABI {found}, runtime expects {expected}")]
    AbiMismatch {
        location: String,
        expected: u32,
        found: u32,
    },
}

/// Errors that can occur inside plugin lifecycle hooks.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Plugin initialization failed during load
    #[error("Plugin initialization failed: {0}")]
    InitializationFailed(String),
    /// Error occurred while handling a peer event or message
    #[error("Plugin execution error: {0}")]
    ExecutionError(String),
    /// Panic or other unexpected runtime condition
    #[error("Plugin runtime error: {0}")]
    Runtime(String),
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error(transparent)]
    Slot(#[from] SlotError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors returned by [`PluginRuntime`](crate::PluginRuntime) operations.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// A plugin's `initialize` hook failed; the whole load was rolled back
    #[error("plugin [{plugin}] failed to initialize: {source}")]
    Initialization {
        plugin: String,
        #[source]
        source: PluginError,
    },
    #[error("runtime is already loaded; unload it before loading again")]
    AlreadyLoaded,
    #[error("runtime is not loaded")]
    NotLoaded,
    #[error("unknown peer: {0}")]
    UnknownPeer(PeerId),
    #[error("peer already connected: {0}")]
    PeerAlreadyConnected(PeerId),
    #[error("cannot connect the local participant {0} to itself")]
    SelfConnection(PeerId),
    #[error(transparent)]
    Message(#[from] MessageError),
}

/// Errors raised while converting between typed payloads and wire messages.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The payload did not serialize to a JSON object
    #[error("wire payload must be a JSON object")]
    NotAnObject,
    /// The payload has no string `type` tag
    #[error("wire payload is missing a string `type` tag")]
    MissingType,
}

/// Errors raised by peer transport capabilities.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Network-related error (connection issues, send failures, etc.)
    #[error("Network error: {0}")]
    Network(String),
    /// The connection to the peer has been closed
    #[error("connection to {0} is closed")]
    Closed(PeerId),
}

/// Errors raised by the extension slot registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("{namespace:?} slot `{slot}` is owned by [{owner}], [{claimant}] cannot claim it")]
    AlreadyClaimed {
        namespace: SlotNamespace,
        slot: &'static str,
        owner: String,
        claimant: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dependency_names_both_plugins() {
        let error = ResolveError::MissingDependency {
            dependency: "missing".to_string(),
            requested_by: "C".to_string(),
        };
        let text = error.to_string();
        assert!(text.contains("missing"));
        assert!(text.contains("C"));
    }

    #[test]
    fn test_cycle_is_rendered_as_path() {
        let error = ResolveError::CircularDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(error.to_string(), "circular dependency: a -> b -> a");
    }
}
