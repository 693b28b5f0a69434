//! Replication across rooms: origin handling, bootstrap, mesh formation and
//! the object plugins working together.

mod common;

use common::{Mesh, RecordingConnection};
use room_plugins::objects::{self, ObjectMessage, ObjectSpawn, Side};
use room_plugins::{builtin_plugins, cursors, loader, names, stacking, StackOp, BUILTIN_PLUGIN_NAMES};
use room_plugins::{ObjectError, ObjectStackingPlugin, PeerRelayPlugin};
use room_runtime::{
    NoopConnector, ObjectId, Origin, PeerId, Placement, PluginDescriptor, PluginRuntime,
    ResolveError, RuntimeConfig, RuntimeError, Vector2D, WireMessage,
};
use serde_json::json;
use std::sync::Arc;

const SPAWN_7: &str = r#"{"type":"object_spawn","id":7,"x":10,"y":20}"#;

fn loaded_runtime(local: &str) -> PluginRuntime {
    let mut runtime = PluginRuntime::new(
        PeerId::from(local),
        Arc::new(NoopConnector),
        RuntimeConfig::default(),
    );
    runtime.load_builtin(builtin_plugins()).unwrap();
    runtime
}

#[test]
fn test_local_spawn_sends_one_message_per_peer() {
    let mut host = loaded_runtime("host");
    let b = RecordingConnection::new();
    let c = RecordingConnection::new();
    host.connect_peer(PeerId::from("b"), b.clone()).unwrap();
    host.connect_peer(PeerId::from("c"), c.clone()).unwrap();
    b.clear();
    c.clear();

    let message = WireMessage::parse(SPAWN_7).unwrap();
    let spawn = message.interpret::<ObjectMessage>().unwrap().unwrap();
    objects::apply(host.room_mut().unwrap(), spawn, &Origin::Local).unwrap();

    assert_eq!(b.kinds(), vec!["object_spawn"]);
    assert_eq!(c.kinds(), vec!["object_spawn"]);

    // The full descriptors go out, defaults included
    let placeholder = "https://placekitten.com/120/200";
    assert_eq!(
        b.sent()[0].to_value(),
        json!({
            "type": "object_spawn",
            "id": 7,
            "x": 10.0,
            "y": 20.0,
            "width": 120.0,
            "currentImg": placeholder,
            "frontImg": placeholder,
            "backImg": placeholder,
            "rotationDeg": 0.0,
            "draggable": true
        })
    );
    assert_eq!(c.sent()[0].to_value(), b.sent()[0].to_value());
}

#[test]
fn test_remote_mutations_are_applied_without_rebroadcast() {
    let mut guest = loaded_runtime("guest");
    let host = PeerId::from("host");
    let host_link = RecordingConnection::new();
    let other_link = RecordingConnection::new();
    guest.connect_peer(host.clone(), host_link.clone()).unwrap();
    guest.connect_peer(PeerId::from("other"), other_link.clone()).unwrap();
    host_link.clear();
    other_link.clear();

    guest.receive_message(&host, SPAWN_7).unwrap();
    let room = guest.room().unwrap();
    assert_eq!(
        objects::descriptors(room, ObjectId(7)).unwrap().position(),
        Vector2D::new(10.0, 20.0)
    );

    for raw in [
        r#"{"type":"object_position","id":7,"position":{"x":1,"y":2}}"#,
        r#"{"type":"object_rotation","id":7,"rotation":90}"#,
        r#"{"type":"object_flip","id":7,"side":"back"}"#,
        r#"{"type":"mouse_position","position":{"x":3,"y":4}}"#,
        r#"{"type":"identification","name":"host"}"#,
    ] {
        guest.receive_message(&host, raw).unwrap();
    }

    assert!(host_link.sent().is_empty());
    assert!(other_link.sent().is_empty());

    let room = guest.room().unwrap();
    let descriptors = objects::descriptors(room, ObjectId(7)).unwrap();
    assert_eq!(descriptors.position(), Vector2D::new(1.0, 2.0));
    assert_eq!(descriptors.rotation_deg, 90.0);
    assert_eq!(descriptors.side(), Side::Back);
    assert_eq!(names::name_of(room, &host), Some("host"));
    assert_eq!(cursors::cursor_of(room, &host).unwrap().world, Vector2D::new(3.0, 4.0));
    assert_eq!(guest.stats().hook_failures, 0);
}

#[test]
fn test_messages_for_deleted_objects_are_ignored() {
    let mut guest = loaded_runtime("guest");
    let host = PeerId::from("host");
    guest.connect_peer(host.clone(), RecordingConnection::new()).unwrap();

    guest.receive_message(&host, SPAWN_7).unwrap();
    guest.receive_message(&host, r#"{"type":"delete_object","id":7}"#).unwrap();
    guest
        .receive_message(&host, r#"{"type":"object_move_front","id":7}"#)
        .unwrap();

    assert!(guest.room().unwrap().objects().is_empty());
    assert_eq!(guest.stats().hook_failures, 0);
}

#[test]
fn test_ids_named_by_peers_advance_the_counter() {
    let mut guest = loaded_runtime("guest");
    let host = PeerId::from("host");
    guest.connect_peer(host.clone(), RecordingConnection::new()).unwrap();

    // Neither object has been spawned here yet
    guest
        .receive_message(&host, r#"{"type":"object_position","id":50,"position":{"x":1,"y":2}}"#)
        .unwrap();
    assert_eq!(guest.room().unwrap().objects().last_issued(), ObjectId(50));
    guest
        .receive_message(&host, r#"{"type":"place_relative","id":3,"targetId":60,"way":"before"}"#)
        .unwrap();

    let room = guest.room_mut().unwrap();
    assert!(room.objects().is_empty());
    let fresh = objects::spawn(room, ObjectSpawn::default(), &Origin::Local).unwrap();
    assert_eq!(fresh, ObjectId(61));
    assert_eq!(guest.stats().hook_failures, 0);
}

#[test]
fn test_remote_spawn_without_id_is_rejected() {
    let mut guest = loaded_runtime("guest");
    let host = PeerId::from("host");
    let host_link = RecordingConnection::new();
    guest.connect_peer(host.clone(), host_link.clone()).unwrap();
    host_link.clear();

    guest
        .receive_message(&host, r#"{"type":"object_spawn","x":1,"y":2}"#)
        .unwrap();

    assert!(host_link.sent().is_empty());
    assert_eq!(guest.stats().hook_failures, 0);

    let room = guest.room_mut().unwrap();
    assert!(room.objects().is_empty());
    assert_eq!(room.objects().last_issued(), ObjectId(0));
    let error = objects::spawn(room, ObjectSpawn::at(1.0, 2.0), &Origin::from(&host)).unwrap_err();
    assert!(matches!(error, ObjectError::MissingSpawnId(peer) if peer == host));
}

#[test]
fn test_placing_an_object_relative_to_itself_is_rejected() {
    let mut guest = loaded_runtime("guest");
    let host = PeerId::from("host");
    guest.connect_peer(host.clone(), RecordingConnection::new()).unwrap();
    guest.receive_message(&host, SPAWN_7).unwrap();

    let room = guest.room_mut().unwrap();
    let error = objects::place_relative(room, ObjectId(7), ObjectId(7), Placement::After, &Origin::Local)
        .unwrap_err();
    assert!(matches!(error, ObjectError::SelfPlacement(ObjectId(7))));

    guest
        .receive_message(&host, r#"{"type":"place_relative","id":7,"targetId":7,"way":"after"}"#)
        .unwrap();
    assert_eq!(guest.room().unwrap().objects().ids(), &[ObjectId(7)]);
    assert_eq!(guest.stats().hook_failures, 0);
}

#[test]
fn test_duplicate_spawn_replaces_instead_of_duplicating() {
    let mut mesh = Mesh::new();
    let a = mesh.join("a");
    let b = mesh.join("b");
    mesh.connect(&b, &a);

    for x in [1.0, 2.0] {
        objects::spawn(mesh.room_mut(&a), ObjectSpawn::at(x, 0.0).with_id(ObjectId(7)), &Origin::Local).unwrap();
    }
    mesh.pump();

    let room = mesh.room(&b);
    assert_eq!(room.objects().len(), 1);
    assert_eq!(objects::descriptors(room, ObjectId(7)).unwrap().x, 2.0);

    // ids seen from peers are never issued locally
    let fresh = objects::spawn(mesh.room_mut(&b), ObjectSpawn::default(), &Origin::Local).unwrap();
    assert_eq!(fresh, ObjectId(8));
}

#[test]
fn test_new_peer_converges_through_bootstrap() {
    let mut mesh = Mesh::new();
    let a = mesh.join("a");
    {
        let room = mesh.room_mut(&a);
        names::set_local_name(room, Some("alice")).unwrap();
        for x in [10.0, 20.0, 30.0] {
            objects::spawn(room, ObjectSpawn::at(x, 5.0).with_images("f.png", "b.png"), &Origin::Local).unwrap();
        }
        objects::move_to_front(room, ObjectId(1), &Origin::Local).unwrap();
        objects::flip(room, ObjectId(2), Side::Back, &Origin::Local).unwrap();
        objects::set_rotation(room, ObjectId(3), 45.0, &Origin::Local).unwrap();
        stacking::set_stackable(room, ObjectId(3), true, &Origin::Local).unwrap();
        stacking::stack_onto(room, ObjectId(3), ObjectId(2)).unwrap();
    }

    let late = mesh.join("late");
    mesh.connect(&late, &a);

    assert_eq!(objects::snapshot(mesh.room(&late)), objects::snapshot(mesh.room(&a)));
    assert_eq!(
        mesh.room(&late).objects().ids(),
        &[ObjectId(2), ObjectId(3), ObjectId(1)]
    );
    assert_eq!(stacking::parent_of(mesh.room(&late), ObjectId(3)), Some(ObjectId(2)));
    assert_eq!(names::name_of(mesh.room(&late), &a), Some("alice"));
}

#[test]
fn test_relaying_forms_a_full_mesh() {
    let mut mesh = Mesh::new();
    let a = mesh.join("a");
    let b = mesh.join("b");
    let c = mesh.join("c");
    for (id, name) in [(&a, "alice"), (&b, "bob"), (&c, "carol")] {
        names::set_local_name(mesh.room_mut(id), Some(name)).unwrap();
    }

    mesh.connect(&b, &a);
    mesh.connect(&c, &a);

    for id in mesh.ids() {
        assert_eq!(mesh.room(&id).peer_count(), 2, "{} should see both others", id);
    }
    assert_eq!(names::name_of(mesh.room(&b), &c), Some("carol"));
    assert_eq!(names::name_of(mesh.room(&c), &b), Some("bob"));
}

#[test]
fn test_relay_never_reports_a_peer_to_itself() {
    let mut runtime = PluginRuntime::new(
        PeerId::from("hub"),
        Arc::new(NoopConnector),
        RuntimeConfig::default(),
    );
    runtime
        .load_builtin(vec![PluginDescriptor::new(PeerRelayPlugin::new())])
        .unwrap();

    let first = RecordingConnection::new();
    let second = RecordingConnection::new();
    runtime.connect_peer(PeerId::from("first"), first.clone()).unwrap();
    assert!(first.sent().is_empty());

    runtime.connect_peer(PeerId::from("second"), second.clone()).unwrap();
    assert!(first.sent().is_empty());
    let relayed = second.sent();
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0].field("peerId"), Some(&serde_json::json!("first")));
}

#[test]
fn test_disconnect_drops_peer_state_and_later_messages() {
    let mut mesh = Mesh::new();
    let a = mesh.join("a");
    let b = mesh.join("b");
    mesh.connect(&b, &a);
    cursors::move_cursor(mesh.room_mut(&b), Vector2D::new(7.0, 7.0), &Origin::Local).unwrap();
    mesh.pump();
    assert_eq!(cursors::cursor_of(mesh.room(&a), &b).unwrap().world, Vector2D::new(7.0, 7.0));

    mesh.disconnect(&a, &b);
    assert!(!mesh.room(&a).has_peer(&b));
    assert!(!mesh.room(&b).has_peer(&a));
    assert!(cursors::cursor_of(mesh.room(&a), &b).is_none());

    let node = mesh.node_mut(&a);
    let rejected = node.runtime.stats().messages_rejected;
    let result = node.runtime.receive_message(&b, SPAWN_7);
    assert!(matches!(result, Err(RuntimeError::UnknownPeer(_))));
    assert_eq!(node.runtime.stats().messages_rejected, rejected + 1);
    assert!(mesh.room(&a).objects().is_empty());
}

#[test]
fn test_cursor_labels_follow_names() {
    let mut mesh = Mesh::new();
    let a = mesh.join("a");
    let b = mesh.join("b");
    mesh.connect(&a, &b);
    assert_eq!(cursors::cursor_label(mesh.room(&b), &a), names::DEFAULT_NAME);

    names::set_local_name(mesh.room_mut(&a), Some("alice")).unwrap();
    cursors::set_pressed(mesh.room_mut(&a), true, &Origin::Local).unwrap();
    mesh.pump();

    assert_eq!(cursors::cursor_label(mesh.room(&b), &a), "alice");
    assert!(cursors::cursor_of(mesh.room(&b), &a).unwrap().pressed);
}

#[test]
fn test_stacks_move_together_on_every_peer() {
    let mut mesh = Mesh::new();
    let a = mesh.join("a");
    let b = mesh.join("b");
    mesh.connect(&b, &a);

    {
        let room = mesh.room_mut(&a);
        objects::spawn(room, ObjectSpawn::at(0.0, 0.0), &Origin::Local).unwrap();
        objects::spawn(room, ObjectSpawn::at(100.0, 100.0), &Origin::Local).unwrap();
        objects::spawn(room, ObjectSpawn::at(200.0, 200.0), &Origin::Local).unwrap();
        stacking::set_stackable(room, ObjectId(1), true, &Origin::Local).unwrap();
        assert!(stacking::stack_onto(room, ObjectId(1), ObjectId(2)).unwrap());
        stacking::apply(room, ObjectId(1), StackOp::Position(Vector2D::new(50.0, 60.0))).unwrap();
        stacking::apply(room, ObjectId(1), StackOp::MoveFront).unwrap();
    }
    mesh.pump();

    for id in [&a, &b] {
        let room = mesh.room(id);
        assert_eq!(objects::descriptors(room, ObjectId(1)).unwrap().position(), Vector2D::new(50.0, 60.0));
        assert_eq!(objects::descriptors(room, ObjectId(2)).unwrap().position(), Vector2D::new(50.0, 60.0));
        assert_eq!(objects::descriptors(room, ObjectId(3)).unwrap().position(), Vector2D::new(200.0, 200.0));
        assert_eq!(room.objects().ids(), &[ObjectId(3), ObjectId(2), ObjectId(1)]);
    }
    assert_eq!(stacking::parent_of(mesh.room(&b), ObjectId(1)), Some(ObjectId(2)));
}

#[test]
fn test_bulk_load_and_clear_replicate() {
    let mut mesh = Mesh::new();
    let a = mesh.join("a");
    let b = mesh.join("b");
    mesh.connect(&a, &b);

    let ids = loader::load_json(
        mesh.room_mut(&a),
        r#"[{ "count": 3, "groupLabel": "cards" }, { "x": 1, "y": 1 }]"#,
    )
    .unwrap();
    mesh.pump();
    assert_eq!(ids.len(), 4);
    assert_eq!(objects::snapshot(mesh.room(&b)), objects::snapshot(mesh.room(&a)));

    assert_eq!(loader::clear(mesh.room_mut(&a)).unwrap(), 4);
    mesh.pump();
    assert!(mesh.room(&b).objects().is_empty());
}

#[test]
fn test_stacking_without_objects_is_a_missing_dependency() {
    let mut runtime = PluginRuntime::new(
        PeerId::from("me"),
        Arc::new(NoopConnector),
        RuntimeConfig::default(),
    );
    let result = runtime.load_builtin(vec![PluginDescriptor::new(ObjectStackingPlugin::new())]);

    assert!(matches!(
        result,
        Err(RuntimeError::Resolve(ResolveError::MissingDependency { ref dependency, ref requested_by }))
            if dependency == objects::PLUGIN_NAME && requested_by == stacking::PLUGIN_NAME
    ));
    assert!(runtime.room().is_none());
}

#[tokio::test]
async fn test_builtins_load_in_dependency_order() {
    let mut runtime = PluginRuntime::new(
        PeerId::from("me"),
        Arc::new(NoopConnector),
        RuntimeConfig::default(),
    );
    let mut reversed = builtin_plugins();
    reversed.reverse();

    let order = runtime.load(reversed, Vec::new()).await.unwrap();
    let position = |name: &str| order.iter().position(|loaded| loaded == name).unwrap();

    assert_eq!(order.len(), BUILTIN_PLUGIN_NAMES.len());
    assert!(position(names::PLUGIN_NAME) < position(cursors::PLUGIN_NAME));
    assert!(position(objects::PLUGIN_NAME) < position(stacking::PLUGIN_NAME));
    assert!(position(objects::PLUGIN_NAME) < position(loader::PLUGIN_NAME));

    runtime.unload().unwrap();
    assert!(!runtime.is_loaded());
}
