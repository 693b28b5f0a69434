//! Plugin trait and descriptors.
//!
//! A plugin is a named unit of behavior with declared dependencies and up to
//! five lifecycle hooks. Every hook has a default no-op implementation, so a
//! plugin only overrides the ones it needs.

use crate::error::PluginError;
use crate::message::WireMessage;
use crate::room::RoomState;
use crate::types::PeerId;
use libloading::Library;
use std::fmt;

/// Behavior contributed to a room by one plugin.
///
/// Hooks run synchronously and to completion against the shared
/// [`RoomState`]. The runtime calls them in dependency order (reverse order
/// for [`cleanup`](RoomPlugin::cleanup)), and a failure in one plugin never
/// prevents the others from running, except during
/// [`initialize`](RoomPlugin::initialize) where it aborts the whole load.
///
/// # Example
///
/// ```rust
/// use room_runtime::{PeerId, PluginError, RoomPlugin, RoomState, WireMessage};
///
/// struct PingCounter;
///
/// #[derive(Default)]
/// struct Pings(u32);
///
/// impl RoomPlugin for PingCounter {
///     fn name(&self) -> &str {
///         "ping_counter"
///     }
///
///     fn initialize(&mut self, room: &mut RoomState) -> Result<(), PluginError> {
///         room.install(Pings::default())?;
///         Ok(())
///     }
///
///     fn process_message(
///         &mut self,
///         room: &mut RoomState,
///         message: &WireMessage,
///         _from: &PeerId,
///     ) -> Result<(), PluginError> {
///         if message.kind() == "ping" {
///             if let Some(pings) = room.slot_mut::<Pings>() {
///                 pings.0 += 1;
///             }
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait RoomPlugin: Send {
    /// Unique, stable plugin name used as the dependency-graph key.
    fn name(&self) -> &str;

    /// Names of plugins that must be initialized before this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Called once at load, after every dependency has been initialized.
    ///
    /// This is where a plugin claims and installs its extension slots.
    fn initialize(&mut self, _room: &mut RoomState) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called once at unload, in reverse load order.
    fn cleanup(&mut self, _room: &mut RoomState) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called when a peer connects; the bare peer entry already exists.
    ///
    /// Plugins owning replicated state send a snapshot to the new peer here.
    fn peer_setup(&mut self, _room: &mut RoomState, _peer: &PeerId) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called for every inbound message, whatever its type.
    fn process_message(
        &mut self,
        _room: &mut RoomState,
        _message: &WireMessage,
        _from: &PeerId,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called when a peer disconnects, before its entry is removed.
    ///
    /// Must tolerate per-peer slots the plugin never created.
    fn handle_peer_disconnect(
        &mut self,
        _room: &mut RoomState,
        _peer: &PeerId,
    ) -> Result<(), PluginError> {
        Ok(())
    }
}

/// A plugin instance together with its identity.
///
/// When the plugin comes from a shared library the library handle is kept
/// here too; field order guarantees the plugin is dropped before the library
/// that contains its code.
pub struct PluginDescriptor {
    name: String,
    dependencies: Vec<String>,
    plugin: Box<dyn RoomPlugin>,
    _library: Option<Library>,
}

impl PluginDescriptor {
    /// Wraps a statically linked plugin.
    pub fn new(plugin: impl RoomPlugin + 'static) -> Self {
        Self::from_boxed(Box::new(plugin))
    }

    /// Wraps an already boxed plugin.
    pub fn from_boxed(plugin: Box<dyn RoomPlugin>) -> Self {
        Self {
            name: plugin.name().to_string(),
            dependencies: plugin.dependencies(),
            plugin,
            _library: None,
        }
    }

    /// Wraps a plugin created by a shared library, keeping the library loaded.
    pub(crate) fn from_library(plugin: Box<dyn RoomPlugin>, library: Library) -> Self {
        let mut descriptor = Self::from_boxed(plugin);
        descriptor._library = Some(library);
        descriptor
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Whether the plugin was loaded from a shared library.
    pub fn is_external(&self) -> bool {
        self._library.is_some()
    }

    pub(crate) fn plugin_mut(&mut self) -> &mut dyn RoomPlugin {
        self.plugin.as_mut()
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("external", &self.is_external())
            .finish()
    }
}
