use uuid::Uuid;

use crate::command::Command;
use crate::error::MapError;
use crate::map::Map;
use crate::tileset::{AttachedTileset, Tileset};

fn reselect(map: &mut Map, active: Option<Uuid>) {
    if let Some(id) = active {
        let _ = map.tilesets_mut().select(id);
    }
}

/// Attaches a tileset. The first attach picks the next free tile range, redo after an
/// undo puts it back at the same range.
#[derive(Debug)]
pub struct AddTileset {
    id: Uuid,
    pending: Option<Tileset>,
    detached: Option<(usize, AttachedTileset)>,
    previous_active: Option<Uuid>,
}

impl AddTileset {
    /// Fails if this tileset is already attached.
    pub fn new(map: &Map, tileset: Tileset) -> Result<Self, MapError> {
        if map.tilesets().get(tileset.id()).is_some() {
            return Err(MapError::InvalidArgument(format!(
                "tileset '{}' is already attached",
                tileset.name
            )));
        }
        Ok(AddTileset {
            id: tileset.id(),
            pending: Some(tileset),
            detached: None,
            previous_active: map.tilesets().active_tileset(),
        })
    }

    /// Id of the attached tileset.
    pub fn tileset_id(&self) -> Uuid {
        self.id
    }
}

impl Command for AddTileset {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.previous_active = map.tilesets().active_tileset();
        if let Some(tileset) = self.pending.take() {
            map.attach_tileset(tileset)?;
        } else if let Some((index, attached)) = self.detached.take() {
            map.restore_tileset(index, attached)?;
        }
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.detached = Some(map.detach_tileset(self.id)?);
        reselect(map, self.previous_active);
        Ok(())
    }

    fn name(&self) -> &str {
        "Add Tileset"
    }

    fn dispose(&mut self) {
        self.pending = None;
        self.detached = None;
    }

    command_kind!(AddTileset);
}

/// Detaches a tileset. Undo reattaches it at its old range and position.
#[derive(Debug)]
pub struct RemoveTileset {
    id: Uuid,
    detached: Option<(usize, AttachedTileset)>,
    previous_active: Option<Uuid>,
}

impl RemoveTileset {
    /// Fails if no attached tileset has that id.
    pub fn new(map: &Map, id: Uuid) -> Result<Self, MapError> {
        if map.tilesets().get(id).is_none() {
            return Err(MapError::TilesetNotFound(id));
        }
        Ok(RemoveTileset {
            id,
            detached: None,
            previous_active: None,
        })
    }
}

impl Command for RemoveTileset {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.previous_active = map.tilesets().active_tileset();
        self.detached = Some(map.detach_tileset(self.id)?);
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        if let Some((index, attached)) = self.detached.take() {
            map.restore_tileset(index, attached)?;
        }
        reselect(map, self.previous_active);
        Ok(())
    }

    fn name(&self) -> &str {
        "Remove Tileset"
    }

    fn dispose(&mut self) {
        self.detached = None;
    }

    command_kind!(RemoveTileset);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Size;
    use crate::tile_matrix::TileExtent;
    use crate::tileset::TextureInfo;
    use pretty_assertions::assert_eq;

    fn tileset(name: &str) -> Tileset {
        Tileset::new(name, TextureInfo::new(format!("{name}.png"), Size::new(64, 32)), Size::new(16, 16))
            .unwrap()
    }

    fn ranges(map: &Map) -> Vec<(String, i32, i32)> {
        map.tilesets()
            .iter()
            .map(|t| (t.tileset.name.clone(), t.first_tile(), t.last_tile()))
            .collect()
    }

    #[test]
    fn redo_reuses_the_original_range() {
        let mut map = Map::new(TileExtent::new(2, 2), Size::new(16, 16)).unwrap();
        let mut add = AddTileset::new(&map, tileset("grass")).unwrap();
        add.redo(&mut map).unwrap();
        assert_eq!(ranges(&map), [("grass".to_owned(), 1, 8)]);
        assert_eq!(map.tilesets().active_tileset(), Some(add.tileset_id()));

        add.undo(&mut map).unwrap();
        assert!(map.tilesets().is_empty());
        add.redo(&mut map).unwrap();
        assert_eq!(ranges(&map), [("grass".to_owned(), 1, 8)]);
    }

    #[test]
    fn remove_puts_the_tileset_back_in_place() {
        let mut map = Map::new(TileExtent::new(2, 2), Size::new(16, 16)).unwrap();
        let a = map.attach_tileset(tileset("a")).unwrap();
        map.attach_tileset(tileset("b")).unwrap();
        map.tilesets_mut().select(a).unwrap();
        let before = ranges(&map);

        let mut cmd = RemoveTileset::new(&map, a).unwrap();
        cmd.redo(&mut map).unwrap();
        assert_eq!(ranges(&map), [("b".to_owned(), 9, 16)]);

        cmd.undo(&mut map).unwrap();
        assert_eq!(ranges(&map), before);
        assert_eq!(map.tilesets().active_tileset(), Some(a));
    }

    #[test]
    fn unknown_tileset_is_rejected() {
        let map = Map::new(TileExtent::new(2, 2), Size::new(16, 16)).unwrap();
        let id = Uuid::new_v4();
        assert_eq!(RemoveTileset::new(&map, id).err(), Some(MapError::TilesetNotFound(id)));
    }
}
