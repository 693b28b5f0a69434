//! # Room Plugins
//!
//! The built-in plugins of a room. Each one owns a piece of replicated state
//! and exposes it to the host and to other plugins through plain functions
//! that take the [`RoomState`](room_runtime::RoomState) and an
//! [`Origin`](room_runtime::Origin).
//!
//! | plugin | depends on | state |
//! |---|---|---|
//! | [`names`] | | display name per participant |
//! | [`cursors`] | `names` | pointer position and press per participant |
//! | [`peer_relay`] | | none; connects every participant to every other |
//! | [`objects`] | | shared objects: position, rotation, side, order |
//! | [`stacking`] | `object_properties` | stack links between objects |
//! | [`loader`] | `object_properties` | bulk loading from JSON |

pub mod cursors;
pub mod error;
pub mod loader;
pub mod names;
pub mod objects;
pub mod peer_relay;
pub mod stacking;

pub use cursors::{CursorState, PeerCursorsPlugin};
pub use error::ObjectError;
pub use loader::{ObjectLoadDescriptor, ObjectLoaderPlugin};
pub use names::NamesPlugin;
pub use objects::{ObjectDescriptors, ObjectPropertiesPlugin, ObjectSpawn, Side};
pub use peer_relay::PeerRelayPlugin;
pub use stacking::{ObjectStackingPlugin, StackOp};

use room_runtime::PluginDescriptor;

/// Every built-in plugin with default settings.
///
/// The order is irrelevant; the runtime resolves the load order from the
/// declared dependencies.
pub fn builtin_plugins() -> Vec<PluginDescriptor> {
    vec![
        PluginDescriptor::new(NamesPlugin::new()),
        PluginDescriptor::new(PeerCursorsPlugin::new()),
        PluginDescriptor::new(PeerRelayPlugin::new()),
        PluginDescriptor::new(ObjectPropertiesPlugin::new()),
        PluginDescriptor::new(ObjectStackingPlugin::new()),
        PluginDescriptor::new(ObjectLoaderPlugin::new()),
    ]
}

/// Names of every built-in plugin.
pub const BUILTIN_PLUGIN_NAMES: &[&str] = &[
    names::PLUGIN_NAME,
    cursors::PLUGIN_NAME,
    peer_relay::PLUGIN_NAME,
    objects::PLUGIN_NAME,
    stacking::PLUGIN_NAME,
    loader::PLUGIN_NAME,
];
