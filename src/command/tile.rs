use std::collections::BTreeMap;

use uuid::Uuid;

use crate::command::{downcast, Command};
use crate::error::MapError;
use crate::map::Map;
use crate::tile_matrix::{TileId, TilePos, EMPTY_TILE};

/// Cell edits on one tile layer, with the value each cell had before the first edit.
#[derive(Debug, Default)]
struct TileEdit {
    layer: Uuid,
    old: BTreeMap<TilePos, TileId>,
    new: BTreeMap<TilePos, TileId>,
}

impl TileEdit {
    fn new(
        map: &Map,
        layer: Uuid,
        cells: impl IntoIterator<Item = (TilePos, TileId)>,
    ) -> Result<Self, MapError> {
        let tiles = map.get_tile_layer(layer)?;
        let mut edit = TileEdit {
            layer,
            ..Default::default()
        };
        for (pos, tile) in cells {
            let previous = tiles.tile_at(pos)?;
            edit.old.entry(pos).or_insert(previous);
            edit.new.insert(pos, tile);
        }
        Ok(edit)
    }

    fn apply(&self, map: &mut Map, cells: &BTreeMap<TilePos, TileId>) -> Result<(), MapError> {
        let tiles = map.get_tile_layer_mut(self.layer)?;
        for (pos, tile) in cells {
            tiles.set_tile(*pos, *tile)?;
        }
        Ok(())
    }

    fn redo(&self, map: &mut Map) -> Result<(), MapError> {
        self.apply(map, &self.new)
    }

    fn undo(&self, map: &mut Map) -> Result<(), MapError> {
        self.apply(map, &self.old)
    }

    /// Folds a later edit of the same layer into this one and applies it.
    fn absorb(&mut self, map: &mut Map, other: &TileEdit) -> Result<bool, MapError> {
        if other.layer != self.layer {
            return Ok(false);
        }
        other.redo(map)?;
        for (pos, tile) in &other.old {
            self.old.entry(*pos).or_insert(*tile);
        }
        self.new.extend(other.new.iter().map(|(p, t)| (*p, *t)));
        Ok(true)
    }
}

/// Paints tiles along a stroke. Strokes on the same layer merge.
#[derive(Debug)]
pub struct StampSequence {
    edit: TileEdit,
}

impl StampSequence {
    /// Cells are `(position, tile)` pairs, all on `layer`.
    pub fn new(
        map: &Map,
        layer: Uuid,
        cells: impl IntoIterator<Item = (TilePos, TileId)>,
    ) -> Result<Self, MapError> {
        Ok(StampSequence {
            edit: TileEdit::new(map, layer, cells)?,
        })
    }
}

impl Command for StampSequence {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.edit.redo(map)
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.edit.undo(map)
    }

    fn name(&self) -> &str {
        "Stamp Tiles"
    }

    fn merge_with(&mut self, map: &mut Map, other: &dyn Command) -> Result<bool, MapError> {
        match downcast::<StampSequence>(other) {
            Some(other) => self.edit.absorb(map, &other.edit),
            None => Ok(false),
        }
    }

    command_kind!(StampSequence);
}

/// Clears tiles along a stroke.
#[derive(Debug)]
pub struct EraseSequence {
    edit: TileEdit,
}

impl EraseSequence {
    /// Every position must lie inside the layer.
    pub fn new(
        map: &Map,
        layer: Uuid,
        positions: impl IntoIterator<Item = TilePos>,
    ) -> Result<Self, MapError> {
        let cells = positions.into_iter().map(|pos| (pos, EMPTY_TILE));
        Ok(EraseSequence {
            edit: TileEdit::new(map, layer, cells)?,
        })
    }
}

impl Command for EraseSequence {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.edit.redo(map)
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.edit.undo(map)
    }

    fn name(&self) -> &str {
        "Erase Tiles"
    }

    fn merge_with(&mut self, map: &mut Map, other: &dyn Command) -> Result<bool, MapError> {
        match downcast::<EraseSequence>(other) {
            Some(other) => self.edit.absorb(map, &other.edit),
            None => Ok(false),
        }
    }

    command_kind!(EraseSequence);
}

/// Flood fill from a single cell.
#[derive(Debug)]
pub struct BucketFill {
    layer: Uuid,
    origin: TilePos,
    replacement: TileId,
    target: TileId,
    filled: Vec<TilePos>,
}

impl BucketFill {
    /// Fails if `origin` is outside the layer.
    pub fn new(map: &Map, layer: Uuid, origin: TilePos, replacement: TileId) -> Result<Self, MapError> {
        let target = map.get_tile_layer(layer)?.tile_at(origin)?;
        Ok(BucketFill {
            layer,
            origin,
            replacement,
            target,
            filled: Vec::new(),
        })
    }

    /// Cells changed by the last application.
    pub fn filled(&self) -> &[TilePos] {
        &self.filled
    }
}

impl Command for BucketFill {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        let tiles = map.get_tile_layer_mut(self.layer)?;
        self.target = tiles.tile_at(self.origin)?;
        self.filled = tiles.flood(self.origin, self.replacement);
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        let tiles = map.get_tile_layer_mut(self.layer)?;
        for pos in &self.filled {
            tiles.set_tile(*pos, self.target)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Bucket Fill"
    }

    fn dispose(&mut self) {
        self.filled = Vec::new();
    }

    command_kind!(BucketFill);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandStack;
    use crate::geom::Size;
    use crate::tile_matrix::{tile_pos, TileExtent};
    use pretty_assertions::assert_eq;

    fn map_with_layer(rows: usize, cols: usize) -> (Map, Uuid) {
        let mut map = Map::new(TileExtent::new(rows, cols), Size::new(16, 16)).unwrap();
        let layer = map.add_tile_layer(None).unwrap();
        (map, layer)
    }

    fn tile(map: &Map, layer: Uuid, row: i32, col: i32) -> TileId {
        map.get_tile_layer(layer).unwrap().tile_at(tile_pos(row, col)).unwrap()
    }

    #[test]
    fn strokes_merge_and_undo_together() {
        let (mut map, layer) = map_with_layer(3, 3);
        map.get_tile_layer_mut(layer)
            .unwrap()
            .set_tile(tile_pos(0, 0), 4)
            .unwrap();
        let before = map.to_ir();

        let mut stack = CommandStack::default();
        let cmd = StampSequence::new(&map, layer, [(tile_pos(0, 0), 1), (tile_pos(0, 1), 1)]).unwrap();
        stack
            .push(&mut map, cmd)
            .unwrap();
        let cmd = StampSequence::new(&map, layer, [(tile_pos(0, 0), 2), (tile_pos(2, 2), 2)]).unwrap();
        stack
            .push(&mut map, cmd)
            .unwrap();
        assert_eq!(stack.len(), 1);
        assert_eq!(tile(&map, layer, 0, 0), 2);
        assert_eq!(tile(&map, layer, 0, 1), 1);

        stack.undo(&mut map).unwrap();
        assert_eq!(map.to_ir(), before);
        assert_eq!(tile(&map, layer, 0, 0), 4);

        stack.redo(&mut map).unwrap();
        assert_eq!(tile(&map, layer, 0, 0), 2);
        assert_eq!(tile(&map, layer, 2, 2), 2);
    }

    #[test]
    fn strokes_on_different_layers_stay_separate() {
        let (mut map, a) = map_with_layer(2, 2);
        let b = map.add_tile_layer(None).unwrap();
        let mut stack = CommandStack::default();
        let cmd = StampSequence::new(&map, a, [(tile_pos(0, 0), 1)]).unwrap();
        stack
            .push(&mut map, cmd)
            .unwrap();
        let cmd = StampSequence::new(&map, b, [(tile_pos(0, 0), 1)]).unwrap();
        stack
            .push(&mut map, cmd)
            .unwrap();
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn out_of_range_stamp_fails_before_touching_the_map() {
        let (map, layer) = map_with_layer(2, 2);
        let err = StampSequence::new(&map, layer, [(tile_pos(0, 0), 1), (tile_pos(5, 0), 1)]);
        assert_eq!(err.err().map(|e| e.to_string()), Some(MapError::OutOfRange(tile_pos(5, 0)).to_string()));
        assert_eq!(tile(&map, layer, 0, 0), 0);
    }

    #[test]
    fn erase_restores_previous_tiles() {
        let (mut map, layer) = map_with_layer(2, 2);
        map.get_tile_layer_mut(layer)
            .unwrap()
            .set_tile(tile_pos(1, 1), 7)
            .unwrap();
        let mut cmd = EraseSequence::new(&map, layer, [tile_pos(1, 1), tile_pos(0, 0)]).unwrap();
        cmd.redo(&mut map).unwrap();
        assert_eq!(tile(&map, layer, 1, 1), 0);
        cmd.undo(&mut map).unwrap();
        assert_eq!(tile(&map, layer, 1, 1), 7);
    }

    #[test]
    fn bucket_fill_covers_connected_region() {
        let (mut map, layer) = map_with_layer(5, 5);
        let before = map.to_ir();
        let mut cmd = BucketFill::new(&map, layer, tile_pos(2, 2), 9).unwrap();
        cmd.redo(&mut map).unwrap();
        assert_eq!(cmd.filled().len(), 25);
        assert!(map.get_tile_layer(layer).unwrap().tiles().iter().all(|t| t == 9));

        cmd.undo(&mut map).unwrap();
        assert_eq!(map.to_ir(), before);
    }

    #[test]
    fn bucket_fill_with_same_value_is_a_no_op() {
        let (mut map, layer) = map_with_layer(2, 2);
        let mut cmd = BucketFill::new(&map, layer, tile_pos(0, 0), 0).unwrap();
        cmd.redo(&mut map).unwrap();
        assert!(cmd.filled().is_empty());
    }
}
