//! In-memory mesh of rooms wired through a `ChannelHub`.

#![allow(dead_code)]

use room_plugins::builtin_plugins;
use room_runtime::{
    ChannelHub, PeerConnection, PeerConnector, PeerId, PluginDescriptor, PluginRuntime,
    RoomState, RuntimeConfig, TransportError, TransportEvent, WireMessage,
};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

pub struct Node {
    pub id: PeerId,
    pub runtime: PluginRuntime,
    inbox: UnboundedReceiver<TransportEvent>,
}

impl Node {
    fn handle(&mut self, hub: &ChannelHub, event: TransportEvent) {
        // Errors here are expected races (duplicate connects, late messages)
        // and are already logged by the runtime.
        match event {
            TransportEvent::Connected { peer } => {
                let connection = hub.connection(self.id.clone(), peer.clone());
                let _ = self.runtime.connect_peer(peer, connection);
            }
            TransportEvent::Message { from, payload } => {
                let _ = self.runtime.receive_message(&from, &payload);
            }
            TransportEvent::Disconnected { peer } => {
                let _ = self.runtime.disconnect_peer(&peer);
            }
        }
    }
}

#[derive(Default)]
pub struct Mesh {
    hub: ChannelHub,
    nodes: Vec<Node>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a room running the built-in plugins.
    pub fn join(&mut self, id: &str) -> PeerId {
        self.join_with(id, builtin_plugins())
    }

    pub fn join_with(&mut self, id: &str, plugins: Vec<PluginDescriptor>) -> PeerId {
        let id = PeerId::from(id);
        let inbox = self.hub.register(id.clone());
        let mut runtime = PluginRuntime::new(
            id.clone(),
            self.hub.connector(id.clone()),
            RuntimeConfig::default(),
        );
        runtime.load_builtin(plugins).unwrap();
        self.nodes.push(Node {
            id: id.clone(),
            runtime,
            inbox,
        });
        id
    }

    /// Opens a connection from `from` to `to` and delivers everything that follows.
    pub fn connect(&mut self, from: &PeerId, to: &PeerId) {
        self.hub.connector(from.clone()).connect(to).unwrap();
        self.pump();
    }

    /// Closes the connection between `a` and `b` on both sides.
    pub fn disconnect(&mut self, a: &PeerId, b: &PeerId) {
        if let Some(peer) = self.room(a).peer(b) {
            peer.close();
        }
        let _ = self.node_mut(a).runtime.disconnect_peer(b);
        self.pump();
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
                return handled;
            }
        }
    }

    pub fn node_mut(&mut self, id: &PeerId) -> &mut Node {
        self.nodes
            .iter_mut()
            .find(|node| &node.id == id)
            .expect("node is part of the mesh")
    }

    pub fn room(&self, id: &PeerId) -> &RoomState {
        self.nodes
            .iter()
            .find(|node| &node.id == id)
            .and_then(|node| node.runtime.room())
            .expect("node is part of the mesh and loaded")
    }

    pub fn room_mut(&mut self, id: &PeerId) -> &mut RoomState {
        self.node_mut(id)
            .runtime
            .room_mut()
            .expect("node is loaded")
    }

    pub fn ids(&self) -> Vec<PeerId> {
        self.nodes.iter().map(|node| node.id.clone()).collect()
    }
}

/// Connection that records what is sent through it.
#[derive(Default)]
pub struct RecordingConnection {
    sent: Mutex<Vec<WireMessage>>,
}

impl RecordingConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<WireMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.sent().iter().map(|m| m.kind().to_string()).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl PeerConnection for RecordingConnection {
    fn send(&self, message: &WireMessage) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn close(&self) {}
}
