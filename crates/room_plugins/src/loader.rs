//! Bulk object loading.
//!
//! Load descriptors are spawn requests with two extra fields: `count`
//! (instances to spawn, default 1) and `groupLabel`. Grouped objects are laid
//! out in columns, one column per distinct label in order of first
//! appearance, each as wide as the widest grouped object.
//!
//! ```json
//! [
//!     { "frontImg": "blue.png", "width": 80, "count": 2, "groupLabel": "blue" },
//!     { "frontImg": "red.png", "groupLabel": "red" }
//! ]
//! ```

use crate::error::ObjectError;
use crate::objects::{self, ObjectSpawn};
use room_runtime::{ObjectId, Origin, PluginError, RoomPlugin, RoomState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

pub const PLUGIN_NAME: &str = "object_loader";

/// Column width used for grouped objects without a width.
pub const DEFAULT_COLUMN_WIDTH: f64 = 200.0;
/// Horizontal position of the first column when the host does not set one.
pub const DEFAULT_CENTER_X: f64 = 640.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectLoadDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_label: Option<String>,
    #[serde(flatten)]
    pub spawn: ObjectSpawn,
}

/// Room slot with the layout origin.
struct Layout {
    center_x: f64,
}

/// Spawns every descriptor locally, broadcasting each instance.
///
/// Ids in the descriptors are ignored: every instance gets a fresh one.
/// Returns the spawned ids in spawn order.
pub fn load_objects(room: &mut RoomState, descriptors: Vec<ObjectLoadDescriptor>) -> Result<Vec<ObjectId>, ObjectError> {
    let center_x = room
        .slot::<Layout>()
        .map(|layout| layout.center_x)
        .unwrap_or(DEFAULT_CENTER_X);

    let mut columns: HashMap<String, usize> = HashMap::new();
    let mut column_width: f64 = 0.0;
    for descriptor in &descriptors {
        if let Some(label) = &descriptor.group_label {
            let next = columns.len();
            columns.entry(label.clone()).or_insert(next);
            column_width = column_width.max(descriptor.spawn.width.unwrap_or(DEFAULT_COLUMN_WIDTH));
        }
    }

    let mut spawned = Vec::new();
    for descriptor in descriptors {
        let mut spawn = descriptor.spawn;
        spawn.id = None;

        let mut x = spawn.x.unwrap_or(center_x);
        if let Some(column) = descriptor.group_label.as_ref().and_then(|label| columns.get(label)) {
            x += *column as f64 * column_width;
        }
        spawn.x = Some(x);

        for _ in 0..descriptor.count.unwrap_or(1) {
            spawned.push(objects::spawn(room, spawn.clone(), &Origin::Local)?);
        }
    }

    info!("Loaded {} objects in {} groups", spawned.len(), columns.len());
    Ok(spawned)
}

/// Parses a JSON array of load descriptors and loads it.
pub fn load_json(room: &mut RoomState, json: &str) -> Result<Vec<ObjectId>, ObjectError> {
    let descriptors: Vec<ObjectLoadDescriptor> = serde_json::from_str(json)?;
    load_objects(room, descriptors)
}

/// Deletes every object locally. Returns how many were removed.
pub fn clear(room: &mut RoomState) -> Result<usize, ObjectError> {
    let ids = room.objects().ids().to_vec();
    for id in &ids {
        objects::delete(room, *id, &Origin::Local)?;
    }
    Ok(ids.len())
}

#[derive(Debug)]
pub struct ObjectLoaderPlugin {
    center_x: f64,
}

impl ObjectLoaderPlugin {
    pub fn new() -> Self {
        Self::with_center_x(DEFAULT_CENTER_X)
    }

    pub fn with_center_x(center_x: f64) -> Self {
        Self { center_x }
    }
}

impl Default for ObjectLoaderPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomPlugin for ObjectLoaderPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn dependencies(&self) -> Vec<String> {
        vec![objects::PLUGIN_NAME.to_string()]
    }

    fn initialize(&mut self, room: &mut RoomState) -> Result<(), PluginError> {
        room.install(Layout {
            center_x: self.center_x,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use room_runtime::{NoopConnector, PeerId};
    use std::sync::Arc;

    fn room() -> RoomState {
        let mut room = RoomState::new(PeerId::from("me"), Arc::new(NoopConnector));
        room.install(Layout { center_x: 100.0 }).unwrap();
        room
    }

    fn x_of(room: &RoomState, id: ObjectId) -> f64 {
        objects::descriptors(room, id).unwrap().x
    }

    #[test]
    fn test_groups_become_columns() {
        let mut room = room();
        let ids = load_json(
            &mut room,
            r#"[
                { "groupLabel": "blue", "width": 80, "count": 2 },
                { "groupLabel": "red" },
                { "groupLabel": "blue" },
                { "x": 5 }
            ]"#,
        )
        .unwrap();

        assert_eq!(ids.len(), 5);
        // widest grouped object: the unsized "red" one at 200
        assert_eq!(x_of(&room, ids[0]), 100.0);
        assert_eq!(x_of(&room, ids[1]), 100.0);
        assert_eq!(x_of(&room, ids[2]), 300.0);
        assert_eq!(x_of(&room, ids[3]), 100.0);
        assert_eq!(x_of(&room, ids[4]), 5.0);
    }

    #[test]
    fn test_ids_are_always_fresh() {
        let mut room = room();
        let ids = load_json(&mut room, r#"[{ "id": 9, "count": 3 }]"#).unwrap();
        assert_eq!(ids, vec![ObjectId(1), ObjectId(2), ObjectId(3)]);
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let mut room = room();
        assert!(matches!(
            load_json(&mut room, "{ not json"),
            Err(ObjectError::InvalidLoadRequest(_))
        ));
        assert!(room.objects().is_empty());
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut room = room();
        load_json(&mut room, r#"[{ "count": 4 }]"#).unwrap();
        assert_eq!(clear(&mut room).unwrap(), 4);
        assert!(room.objects().is_empty());
    }
}
