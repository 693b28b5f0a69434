use room_plugins::names;
use room_runtime::{
    export_room_plugin, replay_to, replicate, MessageError, MessageSet, Origin, PeerId,
    PluginError, RoomPlugin, RoomState, WireMessage,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};

// ============================================================================
// Chat Plugin
// ============================================================================

pub const PLUGIN_NAME: &str = "chat";

/// Lines kept in the room history.
pub const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLine {
    pub author: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatWire {
    ChatMessage { text: String },
    ChatHistory { lines: Vec<ChatLine> },
}

impl MessageSet for ChatWire {
    const KINDS: &'static [&'static str] = &["chat_message", "chat_history"];
}

#[derive(Default)]
struct ChatLog(VecDeque<ChatLine>);

impl ChatLog {
    fn push(&mut self, line: ChatLine) {
        self.0.push_back(line);
        while self.0.len() > HISTORY_LIMIT {
            self.0.pop_front();
        }
    }
}

/// Appends a line to the history. Local lines are broadcast.
///
/// The author is the sender's display name.
pub fn post(room: &mut RoomState, text: &str, origin: &Origin) -> Result<usize, MessageError> {
    let author = match origin {
        Origin::Local => names::local_name(room).to_string(),
        Origin::Remote(peer) => names::name_of(room, peer)
            .unwrap_or(names::DEFAULT_NAME)
            .to_string(),
    };

    let Some(log) = room.slot_mut::<ChatLog>() else {
        debug!("Chat is not loaded, dropping line from {}", author);
        return Ok(0);
    };
    log.push(ChatLine {
        author,
        text: text.to_string(),
    });

    replicate(
        room,
        origin,
        &ChatWire::ChatMessage {
            text: text.to_string(),
        },
    )
}

/// The room history, oldest line first.
pub fn history(room: &RoomState) -> Vec<ChatLine> {
    room.slot::<ChatLog>()
        .map(|log| log.0.iter().cloned().collect())
        .unwrap_or_default()
}

pub struct ChatPlugin;

impl ChatPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ChatPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomPlugin for ChatPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn dependencies(&self) -> Vec<String> {
        vec![names::PLUGIN_NAME.to_string()]
    }

    fn initialize(&mut self, room: &mut RoomState) -> Result<(), PluginError> {
        room.install(ChatLog::default())?;
        info!("💬 Chat ready for {}", names::local_name(room));
        Ok(())
    }

    fn cleanup(&mut self, room: &mut RoomState) -> Result<(), PluginError> {
        info!("💬 Chat closing with {} lines of history", history(room).len());
        Ok(())
    }

    fn peer_setup(&mut self, room: &mut RoomState, peer: &PeerId) -> Result<(), PluginError> {
        let lines = history(room);
        if !lines.is_empty() {
            replay_to(room, peer, [ChatWire::ChatHistory { lines }])?;
        }
        Ok(())
    }

    fn process_message(
        &mut self,
        room: &mut RoomState,
        message: &WireMessage,
        from: &PeerId,
    ) -> Result<(), PluginError> {
        let Some(decoded) = message.interpret::<ChatWire>() else {
            return Ok(());
        };
        match decoded? {
            ChatWire::ChatMessage { text } => {
                post(room, &text, &Origin::from(from))?;
            }
            ChatWire::ChatHistory { lines } => {
                // Every peer sends its history on connect; the first one wins.
                if let Some(log) = room.slot_mut::<ChatLog>() {
                    if log.0.is_empty() {
                        debug!("Accepting {} lines of history from {}", lines.len(), from);
                        lines.into_iter().for_each(|line| log.push(line));
                    }
                }
            }
        }
        Ok(())
    }
}

export_room_plugin!(ChatPlugin);

#[cfg(test)]
mod tests {
    use super::*;
    use room_plugins::NamesPlugin;
    use room_runtime::{
        NoopConnector, PeerConnection, PluginDescriptor, PluginRuntime, RuntimeConfig,
        TransportError, ROOM_PLUGIN_ABI_VERSION,
    };
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Outbox(Mutex<Vec<WireMessage>>);

    impl PeerConnection for Outbox {
        fn send(&self, message: &WireMessage) -> Result<(), TransportError> {
            self.0.lock().unwrap().push(message.clone());
            Ok(())
        }

        fn close(&self) {}
    }

    impl Outbox {
        fn kinds(&self) -> Vec<String> {
            self.0.lock().unwrap().iter().map(|m| m.kind().to_string()).collect()
        }
    }

    fn runtime(name: &str) -> PluginRuntime {
        let mut runtime = PluginRuntime::new(
            PeerId::from(name),
            Arc::new(NoopConnector),
            RuntimeConfig::default(),
        );
        runtime
            .load_builtin(vec![
                PluginDescriptor::new(ChatPlugin::new()),
                PluginDescriptor::new(NamesPlugin::with_name(name)),
            ])
            .unwrap();
        runtime
    }

    #[test]
    fn test_local_lines_are_broadcast_and_attributed() {
        let mut runtime = runtime("alice");
        let outbox = Arc::new(Outbox::default());
        runtime.connect_peer(PeerId::from("bob"), outbox.clone()).unwrap();

        let room = runtime.room_mut().unwrap();
        assert_eq!(post(room, "hello", &Origin::Local).unwrap(), 1);
        assert_eq!(
            history(room),
            vec![ChatLine {
                author: "alice".to_string(),
                text: "hello".to_string()
            }]
        );
        assert_eq!(outbox.kinds().last().map(String::as_str), Some("chat_message"));
    }

    #[test]
    fn test_remote_lines_use_the_sender_name() {
        let mut runtime = runtime("alice");
        let bob = PeerId::from("bob");
        runtime.connect_peer(bob.clone(), Arc::new(Outbox::default())).unwrap();

        runtime
            .receive_message(&bob, r#"{"type":"identification","name":"Bob"}"#)
            .unwrap();
        runtime
            .receive_message(&bob, r#"{"type":"chat_message","text":"hi"}"#)
            .unwrap();

        let lines = history(runtime.room().unwrap());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].author, "Bob");
    }

    #[test]
    fn test_history_is_bounded() {
        let mut runtime = runtime("alice");
        let room = runtime.room_mut().unwrap();
        for n in 0..HISTORY_LIMIT + 5 {
            post(room, &n.to_string(), &Origin::Local).unwrap();
        }
        let lines = history(room);
        assert_eq!(lines.len(), HISTORY_LIMIT);
        assert_eq!(lines[0].text, "5");
    }

    #[test]
    fn test_history_is_replayed_and_only_accepted_when_empty() {
        let mut alice = runtime("alice");
        post(alice.room_mut().unwrap(), "first", &Origin::Local).unwrap();

        let outbox = Arc::new(Outbox::default());
        alice.connect_peer(PeerId::from("bob"), outbox.clone()).unwrap();
        assert!(outbox.kinds().contains(&"chat_history".to_string()));

        let history_message = r#"{"type":"chat_history","lines":[{"author":"x","text":"old"}]}"#;
        let mut bob = runtime("bob");
        let alice_id = PeerId::from("alice");
        bob.connect_peer(alice_id.clone(), Arc::new(Outbox::default())).unwrap();
        bob.receive_message(&alice_id, history_message).unwrap();
        bob.receive_message(&alice_id, history_message).unwrap();
        assert_eq!(history(bob.room().unwrap()).len(), 1);

        alice.receive_message(&PeerId::from("bob"), history_message).unwrap();
        assert_eq!(history(alice.room().unwrap())[0].text, "first");
    }

    #[test]
    fn test_exported_symbols() {
        assert_eq!(room_plugin_abi_version(), ROOM_PLUGIN_ABI_VERSION);

        let raw = unsafe { create_room_plugin() };
        assert!(!raw.is_null());
        let plugin = unsafe { Box::from_raw(raw) };
        assert_eq!(plugin.name(), PLUGIN_NAME);
        assert_eq!(plugin.dependencies(), vec![names::PLUGIN_NAME.to_string()]);
    }
}
