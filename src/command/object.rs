use uuid::Uuid;

use crate::command::{downcast, Command};
use crate::error::MapError;
use crate::geom::Vec2;
use crate::map::Map;
use crate::object::{Object, ObjectType};

fn object_mut(map: &mut Map, layer: Uuid, object: Uuid) -> Result<&mut Object, MapError> {
    map.get_object_layer_mut(layer)?.get_object_mut(object)
}

/// Places a new object in an object layer.
#[derive(Debug)]
pub struct AddObject {
    layer: Uuid,
    object_id: Uuid,
    index: usize,
    pending: Option<Object>,
}

impl AddObject {
    /// Mints the object right away so that its persistent id is stable across redo.
    pub fn new(
        map: &mut Map,
        layer: Uuid,
        object_type: ObjectType,
        position: Vec2,
        size: Vec2,
    ) -> Result<Self, MapError> {
        let index = map.get_object_layer(layer)?.len();
        let mut object = map.new_object(object_type)?;
        object.position = position;
        object.size = size;
        Ok(AddObject {
            layer,
            object_id: object.id,
            index,
            pending: Some(object),
        })
    }

    /// The object this command places.
    pub fn object_id(&self) -> Uuid {
        self.object_id
    }
}

impl Command for AddObject {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        let object = self
            .pending
            .take()
            .ok_or(MapError::ObjectNotFound(self.object_id))?;
        map.get_object_layer_mut(self.layer)?
            .insert_object(self.index, object);
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        let (index, object) = map
            .get_object_layer_mut(self.layer)?
            .remove_object(self.object_id)
            .ok_or(MapError::ObjectNotFound(self.object_id))?;
        self.index = index;
        self.pending = Some(object);
        Ok(())
    }

    fn name(&self) -> &str {
        "Add Object"
    }

    fn dispose(&mut self) {
        self.pending = None;
    }

    command_kind!(AddObject);
}

/// Removes an object. Undo puts it back at its old index.
#[derive(Debug)]
pub struct RemoveObject {
    layer: Uuid,
    object_id: Uuid,
    removed: Option<(usize, Object)>,
    was_active: bool,
}

impl RemoveObject {
    /// Fails if the object is not in that layer.
    pub fn new(map: &Map, layer: Uuid, object: Uuid) -> Result<Self, MapError> {
        map.get_object_layer(layer)?.get_object(object)?;
        Ok(RemoveObject {
            layer,
            object_id: object,
            removed: None,
            was_active: false,
        })
    }
}

impl Command for RemoveObject {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        let objects = map.get_object_layer_mut(self.layer)?;
        self.was_active = objects.active_object() == Some(self.object_id);
        self.removed = Some(
            objects
                .remove_object(self.object_id)
                .ok_or(MapError::ObjectNotFound(self.object_id))?,
        );
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        let objects = map.get_object_layer_mut(self.layer)?;
        if let Some((index, object)) = self.removed.take() {
            objects.insert_object(index, object);
        }
        if self.was_active {
            objects.select_object(Some(self.object_id))?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Remove Object"
    }

    fn dispose(&mut self) {
        self.removed = None;
    }

    command_kind!(RemoveObject);
}

/// Moves an object. Consecutive moves of the same object merge, so a drag is one entry.
#[derive(Debug)]
pub struct MoveObject {
    layer: Uuid,
    object: Uuid,
    old_position: Vec2,
    new_position: Vec2,
}

impl MoveObject {
    /// Fails if the object is not in that layer.
    pub fn new(map: &Map, layer: Uuid, object: Uuid, position: Vec2) -> Result<Self, MapError> {
        let old_position = map.get_object_layer(layer)?.get_object(object)?.position;
        Ok(MoveObject {
            layer,
            object,
            old_position,
            new_position: position,
        })
    }
}

impl Command for MoveObject {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        object_mut(map, self.layer, self.object)?.position = self.new_position;
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        object_mut(map, self.layer, self.object)?.position = self.old_position;
        Ok(())
    }

    fn name(&self) -> &str {
        "Move Object"
    }

    fn merge_with(&mut self, map: &mut Map, other: &dyn Command) -> Result<bool, MapError> {
        match downcast::<MoveObject>(other) {
            Some(other) if other.object == self.object && other.layer == self.layer => {
                self.new_position = other.new_position;
                self.redo(map)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    command_kind!(MoveObject);
}

/// Renames an object.
#[derive(Debug)]
pub struct RenameObject {
    layer: Uuid,
    object: Uuid,
    name: String,
}

impl RenameObject {
    /// Fails if the object is not in that layer.
    pub fn new(map: &Map, layer: Uuid, object: Uuid, name: impl Into<String>) -> Result<Self, MapError> {
        map.get_object_layer(layer)?.get_object(object)?;
        Ok(RenameObject {
            layer,
            object,
            name: name.into(),
        })
    }
}

impl Command for RenameObject {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        let object = object_mut(map, self.layer, self.object)?;
        std::mem::swap(&mut object.name, &mut self.name);
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.redo(map)
    }

    fn name(&self) -> &str {
        "Rename Object"
    }

    command_kind!(RenameObject);
}

/// Sets the free-form tag of an object.
#[derive(Debug)]
pub struct SetObjectTag {
    layer: Uuid,
    object: Uuid,
    tag: String,
}

impl SetObjectTag {
    /// Fails if the object is not in that layer.
    pub fn new(map: &Map, layer: Uuid, object: Uuid, tag: impl Into<String>) -> Result<Self, MapError> {
        map.get_object_layer(layer)?.get_object(object)?;
        Ok(SetObjectTag {
            layer,
            object,
            tag: tag.into(),
        })
    }
}

impl Command for SetObjectTag {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        let object = object_mut(map, self.layer, self.object)?;
        std::mem::swap(&mut object.tag, &mut self.tag);
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.redo(map)
    }

    fn name(&self) -> &str {
        "Set Object Tag"
    }

    command_kind!(SetObjectTag);
}

/// Shows or hides an object.
#[derive(Debug)]
pub struct SetObjectVisible {
    layer: Uuid,
    object: Uuid,
    visible: bool,
    previous: bool,
}

impl SetObjectVisible {
    /// Fails if the object is not in that layer.
    pub fn new(map: &Map, layer: Uuid, object: Uuid, visible: bool) -> Result<Self, MapError> {
        let previous = map.get_object_layer(layer)?.get_object(object)?.visible;
        Ok(SetObjectVisible {
            layer,
            object,
            visible,
            previous,
        })
    }
}

impl Command for SetObjectVisible {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        object_mut(map, self.layer, self.object)?.visible = self.visible;
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        object_mut(map, self.layer, self.object)?.visible = self.previous;
        Ok(())
    }

    fn name(&self) -> &str {
        if self.visible { "Show Object" } else { "Hide Object" }
    }

    command_kind!(SetObjectVisible);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandStack;
    use crate::geom::{vec2, Size};
    use crate::tile_matrix::TileExtent;
    use pretty_assertions::assert_eq;

    fn map_with_layer() -> (Map, Uuid) {
        let mut map = Map::new(TileExtent::new(4, 4), Size::new(32, 32)).unwrap();
        let layer = map.add_object_layer(None).unwrap();
        (map, layer)
    }

    #[test]
    fn add_object_keeps_its_identity_across_redo() {
        let (mut map, layer) = map_with_layer();
        let mut cmd = AddObject::new(&mut map, layer, ObjectType::Point, vec2(10.0, 10.0), vec2(0.0, 0.0))
            .unwrap();
        cmd.redo(&mut map).unwrap();
        let id = cmd.object_id();
        assert_eq!(
            map.get_object_layer(layer).unwrap().object_at(vec2(10.0, 10.0), vec2(32.0, 32.0)),
            Some(id)
        );

        cmd.undo(&mut map).unwrap();
        assert!(map.get_object_layer(layer).unwrap().is_empty());
        cmd.redo(&mut map).unwrap();
        assert_eq!(map.get_object_layer(layer).unwrap().objects()[0].persistent_id, 1);
        assert_eq!(map.next_object_id(), 2);
    }

    #[test]
    fn remove_object_restores_position_and_selection() {
        let (mut map, layer) = map_with_layer();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let object = map.new_object(ObjectType::Rect).unwrap();
            ids.push(object.id);
            map.get_object_layer_mut(layer).unwrap().add_object(object);
        }
        map.get_object_layer_mut(layer)
            .unwrap()
            .select_object(Some(ids[1]))
            .unwrap();
        let before = map.to_ir();

        let mut cmd = RemoveObject::new(&map, layer, ids[1]).unwrap();
        cmd.redo(&mut map).unwrap();
        assert_eq!(map.get_object_layer(layer).unwrap().active_object(), None);

        cmd.undo(&mut map).unwrap();
        assert_eq!(map.to_ir(), before);
        assert_eq!(map.get_object_layer(layer).unwrap().active_object(), Some(ids[1]));
    }

    #[test]
    fn drag_merges_into_one_move() {
        let (mut map, layer) = map_with_layer();
        let object = map.new_object(ObjectType::Ellipse).unwrap();
        let id = object.id;
        map.get_object_layer_mut(layer).unwrap().add_object(object);

        let mut stack = CommandStack::default();
        for x in [5.0, 10.0, 15.0] {
            let cmd = MoveObject::new(&map, layer, id, vec2(x, x)).unwrap();
            stack
                .push(&mut map, cmd)
                .unwrap();
        }
        assert_eq!(stack.len(), 1);
        assert_eq!(map.get_object_layer(layer).unwrap().objects()[0].position, vec2(15.0, 15.0));
        stack.undo(&mut map).unwrap();
        assert_eq!(map.get_object_layer(layer).unwrap().objects()[0].position, vec2(0.0, 0.0));
    }

    #[test]
    fn metadata_edits_round_trip() {
        let (mut map, layer) = map_with_layer();
        let object = map.new_object(ObjectType::Point).unwrap();
        let id = object.id;
        map.get_object_layer_mut(layer).unwrap().add_object(object);
        let before = map.to_ir();

        let mut rename = RenameObject::new(&map, layer, id, "spawn").unwrap();
        let mut tag = SetObjectTag::new(&map, layer, id, "player").unwrap();
        let mut hide = SetObjectVisible::new(&map, layer, id, false).unwrap();
        rename.redo(&mut map).unwrap();
        tag.redo(&mut map).unwrap();
        hide.redo(&mut map).unwrap();

        let object = &map.get_object_layer(layer).unwrap().objects()[0];
        assert_eq!((object.name.as_str(), object.tag.as_str(), object.visible), ("spawn", "player", false));

        hide.undo(&mut map).unwrap();
        tag.undo(&mut map).unwrap();
        rename.undo(&mut map).unwrap();
        assert_eq!(map.to_ir(), before);
    }

    #[test]
    fn unknown_object_is_rejected() {
        let (map, layer) = map_with_layer();
        let missing = Uuid::new_v4();
        assert_eq!(
            RemoveObject::new(&map, layer, missing).err(),
            Some(MapError::ObjectNotFound(missing))
        );
    }
}
