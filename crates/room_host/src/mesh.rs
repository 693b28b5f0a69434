//! In-process demo mesh.
//!
//! Builds several rooms on one [`ChannelHub`], lets them find each other
//! through peer relaying, drives a few shared-object operations and checks
//! that every room ends up with the same objects.

use crate::config::AppConfig;
use anyhow::{anyhow, Context, Result};
use room_plugins::objects::{self, ObjectDescriptors, Side};
use room_plugins::{builtin_plugins, cursors, loader, names, stacking, ObjectLoadDescriptor, StackOp};
use room_runtime::{
    discover_library_sources, ChannelHub, Origin, PeerConnector, PeerId, PluginDescriptor, PluginRuntime,
    PluginSource, RoomState, RuntimeConfig, TransportEvent, Vector2D,
};
use std::path::Path;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// Outcome of a demo run.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshReport {
    pub rooms: usize,
    pub objects: usize,
    pub events_delivered: usize,
    pub messages_dispatched: u64,
    pub hook_failures: u64,
    pub converged: bool,
}

struct MeshNode {
    id: PeerId,
    runtime: PluginRuntime,
    inbox: UnboundedReceiver<TransportEvent>,
}

impl MeshNode {
    fn handle(&mut self, hub: &ChannelHub, event: TransportEvent) {
        let result = match event {
            TransportEvent::Connected { peer } => {
                let connection = hub.connection(self.id.clone(), peer.clone());
                self.runtime.connect_peer(peer, connection)
            }
            TransportEvent::Message { from, payload } => self.runtime.receive_message(&from, &payload),
            TransportEvent::Disconnected { peer } => self.runtime.disconnect_peer(&peer),
        };
        if let Err(e) = result {
            debug!("{} ignored transport event: {}", self.id, e);
        }
    }
}

/// Rooms wired together through an in-process hub.
#[derive(Default)]
pub struct DemoMesh {
    hub: ChannelHub,
    nodes: Vec<MeshNode>,
    events_delivered: usize,
}

impl DemoMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a room on the hub and loads its plugins.
    pub async fn add_room(
        &mut self,
        id: PeerId,
        config: RuntimeConfig,
        builtins: Vec<PluginDescriptor>,
        sources: Vec<Box<dyn PluginSource>>,
    ) -> Result<Vec<String>> {
        let inbox = self.hub.register(id.clone());
        let mut runtime = PluginRuntime::new(id.clone(), self.hub.connector(id.clone()), config);
        let order = match runtime.load(builtins, sources).await {
            Ok(order) => order,
            Err(e) => {
                self.hub.unregister(&id);
                return Err(e).with_context(|| format!("Failed to load room {}", id));
            }
        };
        self.nodes.push(MeshNode { id, runtime, inbox });
        Ok(order)
    }

    /// Opens a connection from `from` to `to` and delivers everything that follows.
    pub fn connect(&mut self, from: &PeerId, to: &PeerId) -> Result<()> {
        self.hub.connector(from.clone()).connect(to)?;
        self.pump();
        Ok(())
    }

    /// Delivers queued events until every inbox is empty.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let mut progressed = false;
            for node in self.nodes.iter_mut() {
                while let Ok(event) = node.inbox.try_recv() {
                    node.handle(&self.hub, event);
                    progressed = true;
                    handled += 1;
                }
            }
            if !progressed {
                self.events_delivered += handled;
                return handled;
            }
        }
    }

    pub fn room_mut(&mut self, id: &PeerId) -> Result<&mut RoomState> {
        self.nodes
            .iter_mut()
            .find(|node| &node.id == id)
            .and_then(|node| node.runtime.room_mut())
            .ok_or_else(|| anyhow!("room {} is not running", id))
    }

    /// Whether every room sees every other one and holds the same objects.
    pub fn converged(&self) -> bool {
        let expected_peers = self.nodes.len().saturating_sub(1);
        let mut reference: Option<Vec<ObjectDescriptors>> = None;

        for node in &self.nodes {
            let Some(room) = node.runtime.room() else {
                return false;
            };
            if room.peer_count() != expected_peers {
                warn!("{} sees {} of {} peers", node.id, room.peer_count(), expected_peers);
                return false;
            }
            let snapshot = objects::snapshot(room);
            match &reference {
                None => reference = Some(snapshot),
                Some(expected) if *expected != snapshot => {
                    warn!("{} diverged from {}", node.id, self.nodes[0].id);
                    return false;
                }
                Some(_) => {}
            }
        }
        true
    }

    /// Unloads every room, continuing past failures.
    pub fn unload_all(&mut self) -> Result<()> {
        let mut failures = 0;
        for node in self.nodes.iter_mut() {
            if let Err(e) = node.runtime.unload() {
                warn!("Failed to unload {}: {}", node.id, e);
                failures += 1;
            }
            self.hub.unregister(&node.id);
        }
        if failures > 0 {
            return Err(anyhow!("{} rooms failed to unload", failures));
        }
        Ok(())
    }

    fn report(&self) -> MeshReport {
        let first_objects = self
            .nodes
            .first()
            .and_then(|node| node.runtime.room())
            .map(|room| room.objects().len())
            .unwrap_or(0);
        MeshReport {
            rooms: self.nodes.len(),
            objects: first_objects,
            events_delivered: self.events_delivered,
            messages_dispatched: self.nodes.iter().map(|n| n.runtime.stats().messages_dispatched).sum(),
            hook_failures: self.nodes.iter().map(|n| n.runtime.stats().hook_failures).sum(),
            converged: self.converged(),
        }
    }
}

/// Built-in plugins minus the disabled ones.
pub fn enabled_builtins(disabled: &[String]) -> Vec<PluginDescriptor> {
    builtin_plugins()
        .into_iter()
        .filter(|descriptor| {
            let enabled = !disabled.iter().any(|name| name == descriptor.name());
            if !enabled {
                info!("Built-in plugin {} is disabled", descriptor.name());
            }
            enabled
        })
        .collect()
}

async fn external_sources(config: &AppConfig) -> Result<Vec<Box<dyn PluginSource>>> {
    if !config.plugins.auto_load {
        return Ok(Vec::new());
    }
    let sources = discover_library_sources(Path::new(&config.plugins.directory), &config.plugins.whitelist).await?;
    Ok(sources
        .into_iter()
        .map(|source| Box::new(source) as Box<dyn PluginSource>)
        .collect())
}

/// Base id for the rooms of one run: the configured id, or a random one
/// when none is configured.
pub fn base_id(local_id: &str) -> String {
    if local_id.is_empty() {
        PeerId::random().to_string()
    } else {
        local_id.to_string()
    }
}

/// Peer id of the `index`-th room.
pub fn room_id(local_id: &str, index: usize) -> PeerId {
    if index == 0 {
        PeerId::from(local_id)
    } else {
        PeerId::from(format!("{}-{}", local_id, index))
    }
}

fn demo_objects() -> Vec<ObjectLoadDescriptor> {
    let card = |label: &str, count: u32| ObjectLoadDescriptor {
        count: Some(count),
        group_label: Some(label.to_string()),
        spawn: objects::ObjectSpawn {
            y: Some(200.0),
            width: Some(90.0),
            ..Default::default()
        }
        .with_images(format!("cards/{}-front.png", label), "cards/back.png"),
    };
    vec![
        card("hearts", 3),
        card("spades", 3),
        ObjectLoadDescriptor {
            spawn: objects::ObjectSpawn::at(100.0, 500.0).with_images("board.png", "board.png"),
            ..Default::default()
        },
    ]
}

async fn join(mesh: &mut DemoMesh, config: &AppConfig, id: &PeerId) -> Result<()> {
    let order = mesh
        .add_room(
            id.clone(),
            config.runtime.clone(),
            enabled_builtins(&config.plugins.disabled),
            external_sources(config).await?,
        )
        .await?;
    info!("🏠 Room {} running {} plugins", id, order.len());
    names::set_local_name(mesh.room_mut(id)?, Some(id.as_str()))?;
    Ok(())
}

/// Runs the whole demo and unloads every room at the end.
pub async fn run_demo(config: &AppConfig) -> Result<MeshReport> {
    let total = config.room.peer_count.max(1);
    let initial = if total > 1 { total - 1 } else { 1 };
    let prefix = base_id(&config.room.local_id);
    let host = room_id(&prefix, 0);

    let mut mesh = DemoMesh::new();
    for index in 0..initial {
        join(&mut mesh, config, &room_id(&prefix, index)).await?;
    }
    for index in 1..initial {
        mesh.connect(&room_id(&prefix, index), &host)?;
    }
    info!("🔗 {} rooms connected through {}", initial, host);

    // Shared objects are created and manipulated in the host room only; the
    // other rooms follow through replication.
    {
        let room = mesh.room_mut(&host)?;
        let ids = loader::load_objects(room, demo_objects())?;
        info!("📦 Loaded {} objects in {}", ids.len(), host);

        if let [top, base, .., board] = ids.as_slice() {
            stacking::set_stackable(room, *top, true, &Origin::Local)?;
            if stacking::stack_onto(room, *top, *base)? {
                stacking::apply(room, *top, StackOp::Position(Vector2D::new(400.0, 120.0)))?;
                stacking::apply(room, *top, StackOp::Flip(Side::Back))?;
                stacking::apply(room, *top, StackOp::MoveFront)?;
            }
            objects::set_rotation(room, *board, 90.0, &Origin::Local)?;
        }
        cursors::move_cursor(room, Vector2D::new(400.0, 120.0), &Origin::Local)?;
    }
    mesh.pump();

    if total > 1 {
        let late = room_id(&prefix, initial);
        join(&mut mesh, config, &late).await?;
        mesh.connect(&late, &host)?;
        info!("🚪 Late peer {} joined", late);
    }

    let report = mesh.report();
    info!("📊 Mesh summary:");
    info!("  - Rooms: {}", report.rooms);
    info!("  - Objects: {}", report.objects);
    info!("  - Transport events delivered: {}", report.events_delivered);
    info!("  - Messages dispatched: {}", report.messages_dispatched);
    info!("  - Hook failures: {}", report.hook_failures);
    if report.converged {
        info!("✅ All rooms converged");
    } else {
        warn!("❌ Rooms diverged");
    }

    mesh.unload_all()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(peer_count: usize) -> AppConfig {
        let mut config = AppConfig::default();
        config.room.peer_count = peer_count;
        config
    }

    #[tokio::test]
    async fn test_demo_converges() {
        let report = run_demo(&config(4)).await.unwrap();
        assert_eq!(report.rooms, 4);
        assert_eq!(report.objects, 7);
        assert_eq!(report.hook_failures, 0);
        assert!(report.converged);
    }

    #[tokio::test]
    async fn test_single_room_demo() {
        let report = run_demo(&config(1)).await.unwrap();
        assert_eq!(report.rooms, 1);
        assert!(report.converged);
        assert_eq!(report.messages_dispatched, 0);
    }

    #[tokio::test]
    async fn test_disabling_a_dependency_fails_the_load() {
        let mut config = config(2);
        config.plugins.disabled = vec!["object_properties".to_string()];
        let error = run_demo(&config).await.unwrap_err();
        assert!(format!("{:#}", error).contains("object_properties"));
    }

    #[tokio::test]
    async fn test_demo_with_generated_ids_converges() {
        let mut config = config(3);
        config.room.local_id = String::new();
        let report = run_demo(&config).await.unwrap();
        assert_eq!(report.rooms, 3);
        assert!(report.converged);
    }

    #[test]
    fn test_base_id() {
        assert_eq!(base_id("alice"), "alice");
        let generated = base_id("");
        assert!(!generated.is_empty());
        assert_ne!(generated, base_id(""));
    }

    #[test]
    fn test_room_ids() {
        assert_eq!(room_id("host", 0), PeerId::from("host"));
        assert_eq!(room_id("host", 2), PeerId::from("host-2"));
    }

    #[test]
    fn test_enabled_builtins_skips_disabled() {
        let enabled = enabled_builtins(&["peer_cursors".to_string()]);
        assert_eq!(enabled.len(), 5);
        assert!(enabled.iter().all(|d| d.name() != "peer_cursors"));
    }
}
