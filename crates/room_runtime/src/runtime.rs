//! # Plugin Runtime
//!
//! Owns the resolved plugin list and the [`RoomState`] of one room, and drives
//! the plugin lifecycle:
//!
//! ```text
//! Unloaded --load--> Loaded --unload--> Unloaded
//!                      |
//!                      +-- connect_peer    -> peer_setup (load order)
//!                      +-- receive_message -> process_message (load order, unfiltered)
//!                      +-- disconnect_peer -> handle_peer_disconnect (load order)
//! ```
//!
//! Every operation takes `&mut self`, so hooks never overlap. Each hook call
//! is isolated with `catch_unwind`: a panic becomes a [`PluginError::Runtime`].
//! A failing `initialize` aborts the load and rolls it back; failures in every
//! other hook are logged and counted, and the remaining plugins still run.

use crate::config::RuntimeConfig;
use crate::error::{PluginError, RuntimeError};
use crate::message::WireMessage;
use crate::plugin::{PluginDescriptor, RoomPlugin};
use crate::resolver::DependencyResolver;
use crate::room::RoomState;
use crate::source::PluginSource;
use crate::transport::{PeerConnection, PeerConnector};
use crate::types::PeerId;
use futures::future::join_all;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Lifecycle state of a [`PluginRuntime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// No plugins are loaded and there is no room state
    Unloaded,
    /// Plugins are initialized and the room is live
    Loaded,
}

/// Counters describing the activity of a loaded runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Messages handed to the plugins
    pub messages_dispatched: u64,
    /// Messages dropped before dispatch (malformed or from unknown peers)
    pub messages_rejected: u64,
    /// Hook calls that returned an error or panicked
    pub hook_failures: u64,
    /// Peers connected since load
    pub peers_connected: u64,
}

/// Runs the plugins of one room.
///
/// Several runtimes can coexist in one process; all plugin state lives in the
/// runtime's own [`RoomState`].
pub struct PluginRuntime {
    local_id: PeerId,
    connector: Arc<dyn PeerConnector>,
    config: RuntimeConfig,
    resolver: DependencyResolver,
    /// Loaded plugins in load order
    plugins: Vec<PluginDescriptor>,
    room: Option<RoomState>,
    stats: RuntimeStats,
}

impl PluginRuntime {
    /// Creates an unloaded runtime for the local participant `local_id`.
    pub fn new(local_id: PeerId, connector: Arc<dyn PeerConnector>, config: RuntimeConfig) -> Self {
        Self {
            local_id,
            connector,
            config,
            resolver: DependencyResolver::new(),
            plugins: Vec::new(),
            room: None,
            stats: RuntimeStats::default(),
        }
    }

    // ========================================================================
    // Load / unload
    // ========================================================================

    /// Fetches external sources, resolves the load order and initializes every plugin.
    ///
    /// Sources are fetched concurrently; a source that fails is logged and
    /// skipped. Returns the plugin names in load order.
    pub async fn load(
        &mut self,
        builtins: Vec<PluginDescriptor>,
        sources: Vec<Box<dyn PluginSource>>,
    ) -> Result<Vec<String>, RuntimeError> {
        if self.room.is_some() {
            return Err(RuntimeError::AlreadyLoaded);
        }

        let mut descriptors = builtins;
        if !sources.is_empty() {
            info!("Downloading {} external plugins", sources.len());
            let fetched = join_all(sources.iter().map(|source| source.fetch())).await;
            for (source, result) in sources.iter().zip(fetched) {
                match result {
                    Ok(descriptor) => {
                        info!(
                            "Fetched plugin {} from {}",
                            descriptor.name(),
                            source.location()
                        );
                        descriptors.push(descriptor);
                    }
                    Err(e) => warn!("Skipping plugin source {}: {}", source.location(), e),
                }
            }
        }

        self.load_builtin(descriptors)
    }

    /// Resolves the load order of `descriptors` and initializes them.
    ///
    /// If any `initialize` fails, the plugins initialized so far are cleaned
    /// up in reverse order, the room is discarded and the runtime stays
    /// unloaded.
    pub fn load_builtin(
        &mut self,
        descriptors: Vec<PluginDescriptor>,
    ) -> Result<Vec<String>, RuntimeError> {
        if self.room.is_some() {
            return Err(RuntimeError::AlreadyLoaded);
        }

        info!("Validating dependencies for {} plugins", descriptors.len());
        let order = self.resolver.resolve(&descriptors).map_err(|e| {
            error!("Plugin load aborted: {}", e);
            e
        })?;

        let mut pending: Vec<Option<PluginDescriptor>> = descriptors.into_iter().map(Some).collect();
        let mut ordered: Vec<PluginDescriptor> = order
            .into_iter()
            .filter_map(|index| pending[index].take())
            .collect();
        for duplicate in pending.into_iter().flatten() {
            debug!("Dropping duplicate plugin {}", duplicate.name());
        }

        info!("Plugin load order:");
        for (position, descriptor) in ordered.iter().enumerate() {
            info!("  {}. {}", position + 1, descriptor.name());
        }

        info!("Bootstrapping room for {}", self.local_id);
        let mut room = RoomState::new(self.local_id.clone(), self.connector.clone());

        for index in 0..ordered.len() {
            let started = Instant::now();
            let result = run_hook(&mut ordered[index], &mut room, |plugin, room| {
                plugin.initialize(room)
            });
            warn_if_slow(&self.config, ordered[index].name(), "initialize", started.elapsed());

            if let Err(source) = result {
                let plugin = ordered[index].name().to_string();
                error!("Plugin {} initialization failed: {}", plugin, source);

                for descriptor in ordered[..index].iter_mut().rev() {
                    if let Err(e) = run_hook(descriptor, &mut room, |plugin, room| plugin.cleanup(room)) {
                        error!("Error cleaning up plugin {}: {}", descriptor.name(), e);
                    }
                }
                warn!("Load rolled back; runtime for {} stays unloaded", self.local_id);
                return Err(RuntimeError::Initialization { plugin, source });
            }

            info!("Plugin {} initialized", ordered[index].name());
        }

        let names: Vec<String> = ordered.iter().map(|d| d.name().to_string()).collect();
        self.plugins = ordered;
        self.room = Some(room);
        self.stats = RuntimeStats::default();

        info!("Finished loading {} plugins for {}", names.len(), self.local_id);
        Ok(names)
    }

    /// Runs `cleanup` on every plugin in reverse load order and discards the room.
    pub fn unload(&mut self) -> Result<(), RuntimeError> {
        let mut room = self.room.take().ok_or(RuntimeError::NotLoaded)?;

        info!("Unloading {} plugins for {}", self.plugins.len(), self.local_id);
        for descriptor in self.plugins.iter_mut().rev() {
            match run_hook(descriptor, &mut room, |plugin, room| plugin.cleanup(room)) {
                Ok(()) => debug!("Plugin {} cleaned up", descriptor.name()),
                Err(e) => {
                    self.stats.hook_failures += 1;
                    error!("Error cleaning up plugin {}: {}", descriptor.name(), e);
                }
            }
        }

        // Plugins go first so no plugin outlives the room it was bound to.
        self.plugins.clear();
        drop(room);
        info!("All plugins unloaded for {}", self.local_id);
        Ok(())
    }

    // ========================================================================
    // Peers and messages
    // ========================================================================

    /// Registers a newly connected peer and runs every `peer_setup` in load order.
    pub fn connect_peer(
        &mut self,
        peer_id: PeerId,
        connection: Arc<dyn PeerConnection>,
    ) -> Result<(), RuntimeError> {
        let room = self.room.as_mut().ok_or(RuntimeError::NotLoaded)?;
        if &peer_id == room.local_id() {
            return Err(RuntimeError::SelfConnection(peer_id));
        }
        if room.has_peer(&peer_id) {
            return Err(RuntimeError::PeerAlreadyConnected(peer_id));
        }

        room.insert_peer(peer_id.clone(), connection);
        self.stats.peers_connected += 1;
        info!("Peer {} connected to {}", peer_id, self.local_id);

        for descriptor in self.plugins.iter_mut() {
            let started = Instant::now();
            let result = run_hook(descriptor, room, |plugin, room| plugin.peer_setup(room, &peer_id));
            warn_if_slow(&self.config, descriptor.name(), "peer_setup", started.elapsed());
            if let Err(e) = result {
                self.stats.hook_failures += 1;
                error!("Plugin {} failed to set up peer {}: {}", descriptor.name(), peer_id, e);
            }
        }
        Ok(())
    }

    /// Runs every `handle_peer_disconnect` in load order, then removes the peer.
    pub fn disconnect_peer(&mut self, peer_id: &PeerId) -> Result<(), RuntimeError> {
        let room = self.room.as_mut().ok_or(RuntimeError::NotLoaded)?;
        if !room.has_peer(peer_id) {
            return Err(RuntimeError::UnknownPeer(peer_id.clone()));
        }

        for descriptor in self.plugins.iter_mut() {
            let result = run_hook(descriptor, room, |plugin, room| {
                plugin.handle_peer_disconnect(room, peer_id)
            });
            if let Err(e) = result {
                self.stats.hook_failures += 1;
                error!(
                    "Plugin {} failed to handle disconnect of {}: {}",
                    descriptor.name(),
                    peer_id,
                    e
                );
            }
        }

        room.remove_peer(peer_id);
        info!("Peer {} disconnected from {}", peer_id, self.local_id);
        Ok(())
    }

    /// Parses a raw JSON message from `peer_id` and dispatches it.
    pub fn receive_message(&mut self, peer_id: &PeerId, raw: &str) -> Result<(), RuntimeError> {
        if self.room.is_none() {
            return Err(RuntimeError::NotLoaded);
        }
        let message = WireMessage::parse(raw).map_err(|e| {
            self.stats.messages_rejected += 1;
            warn!("Dropping malformed message from {}: {}", peer_id, e);
            e
        })?;
        self.dispatch(peer_id, &message)
    }

    /// Hands `message` from `peer_id` to every plugin's `process_message`, in load order.
    ///
    /// Messages from peers that are not connected are dropped.
    pub fn dispatch(&mut self, peer_id: &PeerId, message: &WireMessage) -> Result<(), RuntimeError> {
        let room = self.room.as_mut().ok_or(RuntimeError::NotLoaded)?;
        if !room.has_peer(peer_id) {
            self.stats.messages_rejected += 1;
            debug!("Dropping {} from unknown peer {}", message.kind(), peer_id);
            return Err(RuntimeError::UnknownPeer(peer_id.clone()));
        }

        self.stats.messages_dispatched += 1;
        for descriptor in self.plugins.iter_mut() {
            let result = run_hook(descriptor, room, |plugin, room| {
                plugin.process_message(room, message, peer_id)
            });
            if let Err(e) = result {
                self.stats.hook_failures += 1;
                error!(
                    "Plugin {} failed to process {} from {}: {}",
                    descriptor.name(),
                    message.kind(),
                    peer_id,
                    e
                );
            }
        }
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> RuntimeState {
        if self.room.is_some() {
            RuntimeState::Loaded
        } else {
            RuntimeState::Unloaded
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.room.is_some()
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The live room, if loaded.
    pub fn room(&self) -> Option<&RoomState> {
        self.room.as_ref()
    }

    /// The live room, if loaded, for calling plugin capabilities on it.
    pub fn room_mut(&mut self) -> Option<&mut RoomState> {
        self.room.as_mut()
    }

    /// Names of the loaded plugins in load order.
    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.iter().map(|d| d.name().to_string()).collect()
    }

    pub fn stats(&self) -> RuntimeStats {
        self.stats
    }
}

/// Runs one hook with the plugin marked active and panics caught.
fn run_hook<F>(
    descriptor: &mut PluginDescriptor,
    room: &mut RoomState,
    hook: F,
) -> Result<(), PluginError>
where
    F: FnOnce(&mut dyn RoomPlugin, &mut RoomState) -> Result<(), PluginError>,
{
    room.set_active_plugin(Some(descriptor.name().to_string()));
    let result = catch_unwind(AssertUnwindSafe(|| hook(descriptor.plugin_mut(), &mut *room)))
        .map_err(panic_to_error)
        .and_then(|result| result);
    room.set_active_plugin(None);
    result
}

/// Converts a panic payload to a [`PluginError`].
fn panic_to_error(panic_info: Box<dyn std::any::Any + Send>) -> PluginError {
    let message = if let Some(s) = panic_info.downcast_ref::<&str>() {
        format!("Plugin panicked: {}", s)
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        format!("Plugin panicked: {}", s)
    } else {
        "Plugin panicked with unknown error".to_string()
    };

    PluginError::Runtime(message)
}

fn warn_if_slow(config: &RuntimeConfig, plugin: &str, hook: &str, elapsed: Duration) {
    if config.slow_hook_warning_ms > 0 && elapsed > Duration::from_millis(config.slow_hook_warning_ms) {
        warn!(
            "Plugin {} took {}ms in {} (threshold {}ms)",
            plugin,
            elapsed.as_millis(),
            hook,
            config.slow_hook_warning_ms
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_payloads_become_runtime_errors() {
        let error = panic_to_error(Box::new("boom"));
        assert!(matches!(error, PluginError::Runtime(ref m) if m == "Plugin panicked: boom"));

        let error = panic_to_error(Box::new(String::from("bang")));
        assert!(matches!(error, PluginError::Runtime(ref m) if m == "Plugin panicked: bang"));

        let error = panic_to_error(Box::new(42u8));
        assert!(matches!(error, PluginError::Runtime(ref m) if m.contains("unknown")));
    }
}
