use crate::command::{downcast, Command};
use crate::error::MapError;
use crate::map::{FixedTiles, Map, TileSnapshot};
use crate::tile_matrix::TileExtent;

/// Appends rows. Consecutive pushes collapse into one entry with a repeat count.
#[derive(Debug)]
pub struct AddRow {
    count: usize,
}

impl AddRow {
    /// One row.
    pub fn new(_map: &Map) -> Self {
        AddRow { count: 1 }
    }

    /// Rows added so far, after merging.
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Command for AddRow {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        for _ in 0..self.count {
            map.add_row();
        }
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        for _ in 0..self.count {
            map.remove_row()?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        if self.count > 1 { "Add Rows" } else { "Add Row" }
    }

    fn merge_with(&mut self, map: &mut Map, other: &dyn Command) -> Result<bool, MapError> {
        let Some(other) = downcast::<AddRow>(other) else {
            return Ok(false);
        };
        for _ in 0..other.count {
            map.add_row();
        }
        self.count += other.count;
        Ok(true)
    }

    command_kind!(AddRow);
}

/// Appends columns. Consecutive pushes collapse into one entry with a repeat count.
#[derive(Debug)]
pub struct AddColumn {
    count: usize,
}

impl AddColumn {
    /// One column.
    pub fn new(_map: &Map) -> Self {
        AddColumn { count: 1 }
    }

    /// Columns added so far, after merging.
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Command for AddColumn {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        for _ in 0..self.count {
            map.add_column();
        }
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        for _ in 0..self.count {
            map.remove_column()?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        if self.count > 1 { "Add Columns" } else { "Add Column" }
    }

    fn merge_with(&mut self, map: &mut Map, other: &dyn Command) -> Result<bool, MapError> {
        let Some(other) = downcast::<AddColumn>(other) else {
            return Ok(false);
        };
        for _ in 0..other.count {
            map.add_column();
        }
        self.count += other.count;
        Ok(true)
    }

    command_kind!(AddColumn);
}

/// Removes the last row. The grids of all tile layers are kept so undo restores the
/// removed cells.
#[derive(Debug)]
pub struct RemoveRow {
    count: usize,
    original: Option<(TileExtent, TileSnapshot)>,
}

impl RemoveRow {
    /// Fails on a single-row map.
    pub fn new(map: &Map) -> Result<Self, MapError> {
        if map.row_count() <= 1 {
            return Err(MapError::InvalidArgument("cannot remove the last row".to_owned()));
        }
        Ok(RemoveRow {
            count: 1,
            original: None,
        })
    }
}

impl Command for RemoveRow {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.original = Some((map.extent(), map.tile_snapshot()));
        for _ in 0..self.count {
            map.remove_row()?;
        }
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        if let Some((extent, snapshot)) = self.original.take() {
            map.resize(extent)?;
            map.restore_tile_snapshot(&snapshot);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        if self.count > 1 { "Remove Rows" } else { "Remove Row" }
    }

    fn merge_with(&mut self, map: &mut Map, other: &dyn Command) -> Result<bool, MapError> {
        let Some(other) = downcast::<RemoveRow>(other) else {
            return Ok(false);
        };
        if map.row_count() <= other.count {
            return Ok(false);
        }
        for _ in 0..other.count {
            map.remove_row()?;
        }
        self.count += other.count;
        Ok(true)
    }

    fn dispose(&mut self) {
        self.original = None;
    }

    command_kind!(RemoveRow);
}

/// Removes the last column. Undo restores the removed cells.
#[derive(Debug)]
pub struct RemoveColumn {
    count: usize,
    original: Option<(TileExtent, TileSnapshot)>,
}

impl RemoveColumn {
    /// Fails on a single-column map.
    pub fn new(map: &Map) -> Result<Self, MapError> {
        if map.col_count() <= 1 {
            return Err(MapError::InvalidArgument(
                "cannot remove the last column".to_owned(),
            ));
        }
        Ok(RemoveColumn {
            count: 1,
            original: None,
        })
    }
}

impl Command for RemoveColumn {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.original = Some((map.extent(), map.tile_snapshot()));
        for _ in 0..self.count {
            map.remove_column()?;
        }
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        if let Some((extent, snapshot)) = self.original.take() {
            map.resize(extent)?;
            map.restore_tile_snapshot(&snapshot);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        if self.count > 1 { "Remove Columns" } else { "Remove Column" }
    }

    fn merge_with(&mut self, map: &mut Map, other: &dyn Command) -> Result<bool, MapError> {
        let Some(other) = downcast::<RemoveColumn>(other) else {
            return Ok(false);
        };
        if map.col_count() <= other.count {
            return Ok(false);
        }
        for _ in 0..other.count {
            map.remove_column()?;
        }
        self.count += other.count;
        Ok(true)
    }

    fn dispose(&mut self) {
        self.original = None;
    }

    command_kind!(RemoveColumn);
}

/// Resizes the map. When the map shrinks, the lost cells are kept for undo.
#[derive(Debug)]
pub struct ResizeMap {
    old_extent: TileExtent,
    new_extent: TileExtent,
    snapshot: Option<TileSnapshot>,
}

impl ResizeMap {
    /// Fails if `extent` is not a valid map size.
    pub fn new(map: &Map, extent: TileExtent) -> Result<Self, MapError> {
        Ok(ResizeMap {
            old_extent: map.extent(),
            new_extent: extent.validate()?,
            snapshot: None,
        })
    }

    fn is_lossy(&self) -> bool {
        self.new_extent.rows < self.old_extent.rows || self.new_extent.cols < self.old_extent.cols
    }
}

impl Command for ResizeMap {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        if self.is_lossy() {
            self.snapshot = Some(map.tile_snapshot());
        }
        map.resize(self.new_extent)
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.resize(self.old_extent)?;
        if let Some(snapshot) = self.snapshot.take() {
            map.restore_tile_snapshot(&snapshot);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Resize Map"
    }

    fn dispose(&mut self) {
        self.snapshot = None;
    }

    command_kind!(ResizeMap);
}

/// Clears tiles that no attached tileset claims.
#[derive(Debug, Default)]
pub struct FixTiles {
    fixed: FixedTiles,
}

impl FixTiles {
    /// Tiles are scanned when the command is applied.
    pub fn new(_map: &Map) -> Self {
        FixTiles::default()
    }

    /// Tiles reset by the last application, by layer and position.
    pub fn fixed(&self) -> &FixedTiles {
        &self.fixed
    }
}

impl Command for FixTiles {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.fixed = map.fix_tiles();
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.restore_tiles(&self.fixed)
    }

    fn name(&self) -> &str {
        "Fix Invalid Tiles"
    }

    fn dispose(&mut self) {
        self.fixed.clear();
    }

    command_kind!(FixTiles);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandStack;
    use crate::geom::Size;
    use crate::tile_matrix::tile_pos;
    use pretty_assertions::assert_eq;

    fn map_with_layer(rows: usize, cols: usize) -> (Map, uuid::Uuid) {
        let mut map = Map::new(TileExtent::new(rows, cols), Size::new(16, 16)).unwrap();
        let layer = map.add_tile_layer(None).unwrap();
        for r in 0..rows as i32 {
            for c in 0..cols as i32 {
                map.get_tile_layer_mut(layer)
                    .unwrap()
                    .set_tile(tile_pos(r, c), r * 10 + c + 1)
                    .unwrap();
            }
        }
        (map, layer)
    }

    #[test]
    fn removed_rows_come_back_on_undo() {
        let (mut map, _) = map_with_layer(4, 3);
        let before = map.to_ir();
        let mut stack = CommandStack::default();
        let cmd = AddRow::new(&map);
        stack.push(&mut map, cmd).unwrap();
        let cmd = RemoveRow::new(&map).unwrap();
        stack.push(&mut map, cmd).unwrap();
        let cmd = RemoveRow::new(&map).unwrap();
        stack.push(&mut map, cmd).unwrap();
        let cmd = RemoveRow::new(&map).unwrap();
        stack.push(&mut map, cmd).unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(map.extent(), TileExtent::new(2, 3));

        stack.undo(&mut map).unwrap();
        stack.undo(&mut map).unwrap();
        assert_eq!(map.to_ir(), before);
    }

    #[test]
    fn removing_the_last_column_is_rejected_up_front() {
        let (map, _) = map_with_layer(2, 1);
        assert!(matches!(RemoveColumn::new(&map), Err(MapError::InvalidArgument(_))));
    }

    #[test]
    fn resize_round_trip_restores_overlap() {
        let (mut map, layer) = map_with_layer(3, 3);
        let before = map.to_ir();

        let mut cmd = ResizeMap::new(&map, TileExtent::new(2, 5)).unwrap();
        cmd.redo(&mut map).unwrap();
        let tiles = map.get_tile_layer(layer).unwrap();
        assert_eq!(tiles.tile_at(tile_pos(1, 1)), Ok(12));
        assert_eq!(tiles.tile_at(tile_pos(1, 4)), Ok(0));

        cmd.undo(&mut map).unwrap();
        assert_eq!(map.to_ir(), before);
    }

    #[test]
    fn shrinking_without_the_command_loses_cells() {
        let (mut map, layer) = map_with_layer(3, 3);
        map.resize(TileExtent::new(1, 1)).unwrap();
        map.resize(TileExtent::new(3, 3)).unwrap();
        let tiles = map.get_tile_layer(layer).unwrap();
        assert_eq!(tiles.tile_at(tile_pos(0, 0)), Ok(1));
        assert_eq!(tiles.tile_at(tile_pos(2, 2)), Ok(0));
    }

    #[test]
    fn fix_tiles_is_undoable() {
        let (mut map, layer) = map_with_layer(2, 2);
        let before = map.to_ir();
        let mut cmd = FixTiles::new(&map);
        cmd.redo(&mut map).unwrap();
        assert_eq!(cmd.fixed()[&layer].len(), 4);
        assert_eq!(map.get_tile_layer(layer).unwrap().tile_at(tile_pos(1, 1)), Ok(0));
        cmd.undo(&mut map).unwrap();
        assert_eq!(map.to_ir(), before);
    }
}
