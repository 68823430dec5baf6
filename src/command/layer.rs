use uuid::Uuid;

use crate::command::{downcast, Command};
use crate::error::MapError;
use crate::layer::LayerType;
use crate::layer_tree::LayerSubtree;
use crate::map::Map;

/// Creates a new, empty layer and selects it.
#[derive(Debug)]
pub struct AddLayer {
    layer_type: LayerType,
    parent: Option<Uuid>,
    layer: Option<Uuid>,
    removed: Option<LayerSubtree>,
    previous_active: Option<Uuid>,
}

impl AddLayer {
    /// `parent` must be a group layer, or `None` for the top level.
    pub fn new(map: &Map, layer_type: LayerType, parent: Option<Uuid>) -> Result<Self, MapError> {
        map.layers().children(parent)?;
        Ok(AddLayer {
            layer_type,
            parent,
            layer: None,
            removed: None,
            previous_active: None,
        })
    }

    /// The created layer, once the command has been applied.
    pub fn layer_id(&self) -> Option<Uuid> {
        self.layer
    }
}

impl Command for AddLayer {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.previous_active = map.active_layer();
        let id = match self.removed.take() {
            Some(subtree) => {
                let id = subtree.root_id();
                map.restore_layer(subtree)?;
                id
            }
            None => {
                let layer = map.new_layer(self.layer_type)?;
                map.add_layer(layer, self.parent)?
            }
        };
        self.layer = Some(id);
        map.select_layer(id)
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        let id = self.layer.ok_or_else(|| {
            MapError::InvalidArgument("layer was never added".to_owned())
        })?;
        self.removed = Some(map.remove_layer(id).ok_or(MapError::LayerNotFound(id))?);
        map.set_active_layer(self.previous_active);
        Ok(())
    }

    fn name(&self) -> &str {
        "Add Layer"
    }

    fn dispose(&mut self) {
        self.removed = None;
    }

    command_kind!(AddLayer);
}

/// Removes a layer together with everything below it.
#[derive(Debug)]
pub struct RemoveLayer {
    layer: Uuid,
    removed: Option<LayerSubtree>,
    previous_active: Option<Uuid>,
}

impl RemoveLayer {
    /// Fails if the layer does not exist.
    pub fn new(map: &Map, layer: Uuid) -> Result<Self, MapError> {
        map.layer(layer)?;
        Ok(RemoveLayer {
            layer,
            removed: None,
            previous_active: None,
        })
    }
}

impl Command for RemoveLayer {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.previous_active = map.active_layer();
        let removed = map
            .remove_layer(self.layer)
            .ok_or(MapError::LayerNotFound(self.layer))?;
        self.removed = Some(removed);
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        if let Some(subtree) = self.removed.take() {
            map.restore_layer(subtree)?;
        }
        map.set_active_layer(self.previous_active);
        Ok(())
    }

    fn name(&self) -> &str {
        "Remove Layer"
    }

    fn dispose(&mut self) {
        self.removed = None;
    }

    command_kind!(RemoveLayer);
}

/// Deep copy of a layer, inserted right after the source.
#[derive(Debug)]
pub struct DuplicateLayer {
    source: Uuid,
    copy: Option<Uuid>,
    removed: Option<LayerSubtree>,
}

impl DuplicateLayer {
    /// Fails if the layer does not exist.
    pub fn new(map: &Map, source: Uuid) -> Result<Self, MapError> {
        map.layer(source)?;
        Ok(DuplicateLayer {
            source,
            copy: None,
            removed: None,
        })
    }

    /// The copy, once the command has been applied.
    pub fn copy_id(&self) -> Option<Uuid> {
        self.copy
    }
}

impl Command for DuplicateLayer {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        match self.removed.take() {
            Some(subtree) => map.restore_layer(subtree),
            None => {
                self.copy = Some(map.duplicate_layer(self.source)?);
                Ok(())
            }
        }
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        if let Some(copy) = self.copy {
            self.removed = Some(map.remove_layer(copy).ok_or(MapError::LayerNotFound(copy))?);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Duplicate Layer"
    }

    fn dispose(&mut self) {
        self.removed = None;
    }

    command_kind!(DuplicateLayer);
}

/// Renames a layer.
#[derive(Debug)]
pub struct RenameLayer {
    layer: Uuid,
    name: String,
}

impl RenameLayer {
    /// Fails if the layer does not exist.
    pub fn new(map: &Map, layer: Uuid, name: impl Into<String>) -> Result<Self, MapError> {
        map.layer(layer)?;
        Ok(RenameLayer {
            layer,
            name: name.into(),
        })
    }
}

impl Command for RenameLayer {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        let layer = map.layer_mut(self.layer)?;
        std::mem::swap(&mut layer.name, &mut self.name);
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        // The old name was swapped in on redo, so swapping again restores it.
        self.redo(map)
    }

    fn name(&self) -> &str {
        "Rename Layer"
    }

    command_kind!(RenameLayer);
}

/// Changes a layer's opacity. Dragging a slider produces a stream of these which merge
/// into a single entry per layer.
#[derive(Debug)]
pub struct SetLayerOpacity {
    layer: Uuid,
    old_opacity: f32,
    new_opacity: f32,
}

impl SetLayerOpacity {
    /// The opacity is clamped to `[0, 1]` when applied.
    pub fn new(map: &Map, layer: Uuid, opacity: f32) -> Result<Self, MapError> {
        let old_opacity = map.layer(layer)?.opacity();
        Ok(SetLayerOpacity {
            layer,
            old_opacity,
            new_opacity: opacity,
        })
    }
}

impl Command for SetLayerOpacity {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.layer_mut(self.layer)?.set_opacity(self.new_opacity);
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.layer_mut(self.layer)?.set_opacity(self.old_opacity);
        Ok(())
    }

    fn name(&self) -> &str {
        "Set Layer Opacity"
    }

    fn merge_with(&mut self, map: &mut Map, other: &dyn Command) -> Result<bool, MapError> {
        match downcast::<SetLayerOpacity>(other) {
            Some(other) if other.layer == self.layer => {
                self.new_opacity = other.new_opacity;
                self.redo(map)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    command_kind!(SetLayerOpacity);
}

/// Shows or hides a layer.
#[derive(Debug)]
pub struct SetLayerVisible {
    layer: Uuid,
    visible: bool,
    previous: bool,
}

impl SetLayerVisible {
    /// Fails if the layer does not exist.
    pub fn new(map: &Map, layer: Uuid, visible: bool) -> Result<Self, MapError> {
        let previous = map.layer(layer)?.visible;
        Ok(SetLayerVisible {
            layer,
            visible,
            previous,
        })
    }
}

impl Command for SetLayerVisible {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.layer_mut(self.layer)?.visible = self.visible;
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.layer_mut(self.layer)?.visible = self.previous;
        Ok(())
    }

    fn name(&self) -> &str {
        if self.visible { "Show Layer" } else { "Hide Layer" }
    }

    command_kind!(SetLayerVisible);
}

/// Swaps a layer with its previous sibling.
#[derive(Debug)]
pub struct MoveLayerUp {
    layer: Uuid,
}

impl MoveLayerUp {
    /// Fails if the layer is already first.
    pub fn new(map: &Map, layer: Uuid) -> Result<Self, MapError> {
        map.layer(layer)?;
        if !map.can_move_layer_up(layer) {
            return Err(MapError::InvalidArgument(format!(
                "layer {layer} is already first among its siblings"
            )));
        }
        Ok(MoveLayerUp { layer })
    }
}

impl Command for MoveLayerUp {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.move_layer_up(self.layer)
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.move_layer_down(self.layer)
    }

    fn name(&self) -> &str {
        "Move Layer Up"
    }

    command_kind!(MoveLayerUp);
}

/// Swaps a layer with its next sibling.
#[derive(Debug)]
pub struct MoveLayerDown {
    layer: Uuid,
}

impl MoveLayerDown {
    /// Fails if the layer is already last.
    pub fn new(map: &Map, layer: Uuid) -> Result<Self, MapError> {
        map.layer(layer)?;
        if !map.can_move_layer_down(layer) {
            return Err(MapError::InvalidArgument(format!(
                "layer {layer} is already last among its siblings"
            )));
        }
        Ok(MoveLayerDown { layer })
    }
}

impl Command for MoveLayerDown {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.move_layer_down(self.layer)
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.move_layer_up(self.layer)
    }

    fn name(&self) -> &str {
        "Move Layer Down"
    }

    command_kind!(MoveLayerDown);
}

/// Moves a layer under another group, or to the top level.
#[derive(Debug)]
pub struct ReparentLayer {
    layer: Uuid,
    parent: Option<Uuid>,
    index: usize,
    previous: Option<(Option<Uuid>, usize)>,
}

impl ReparentLayer {
    /// Rejects moving a group into its own subtree.
    pub fn new(map: &Map, layer: Uuid, parent: Option<Uuid>, index: usize) -> Result<Self, MapError> {
        map.layer(layer)?;
        map.layers().children(parent)?;
        if let Some(p) = parent {
            if map.layers().is_ancestor(layer, p) {
                return Err(MapError::CyclicLayerTree(layer));
            }
        }
        Ok(ReparentLayer {
            layer,
            parent,
            index,
            previous: None,
        })
    }
}

impl Command for ReparentLayer {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.previous = Some(map.reparent_layer(self.layer, self.parent, self.index)?);
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        if let Some((parent, index)) = self.previous.take() {
            map.reparent_layer(self.layer, parent, index)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Move Layer"
    }

    command_kind!(ReparentLayer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandStack;
    use crate::geom::Size;
    use crate::ir_map::IrMap;
    use crate::tile_matrix::TileExtent;
    use pretty_assertions::assert_eq;

    fn map() -> Map {
        Map::new(TileExtent::new(2, 2), Size::new(16, 16)).unwrap()
    }

    /// Persistent id counters only ever grow, so they are left out of comparisons.
    fn snapshot(map: &Map) -> IrMap {
        let mut ir = map.to_ir();
        ir.next_layer_id = 0;
        ir.next_object_id = 0;
        ir
    }

    #[test]
    fn add_layer_round_trip_keeps_identity() {
        let mut map = map();
        let mut cmd = AddLayer::new(&map, LayerType::Tile, None).unwrap();
        cmd.redo(&mut map).unwrap();
        let id = cmd.layer_id().unwrap();
        assert_eq!(map.active_layer(), Some(id));

        cmd.undo(&mut map).unwrap();
        assert_eq!(map.layer_count(None), 0);
        assert_eq!(map.active_layer(), None);

        cmd.redo(&mut map).unwrap();
        assert_eq!(cmd.layer_id(), Some(id));
        assert_eq!(map.layer(id).unwrap().name, "Tile Layer 1");
    }

    #[test]
    fn add_layer_requires_a_group_parent() {
        let mut map = map();
        let tile = map.add_tile_layer(None).unwrap();
        assert_eq!(
            AddLayer::new(&map, LayerType::Tile, Some(tile)).err(),
            Some(MapError::InvalidParent(tile))
        );
    }

    #[test]
    fn remove_layer_restores_subtree_and_selection() {
        let mut map = map();
        let group = map.add_group_layer(None).unwrap();
        let child = map.add_tile_layer(Some(group)).unwrap();
        map.add_object_layer(None).unwrap();
        map.select_layer(child).unwrap();
        let before = snapshot(&map);

        let mut cmd = RemoveLayer::new(&map, group).unwrap();
        cmd.redo(&mut map).unwrap();
        assert_eq!(map.layer_count(None), 1);
        assert_eq!(map.active_layer(), None);

        cmd.undo(&mut map).unwrap();
        assert_eq!(snapshot(&map), before);
        assert_eq!(map.active_layer(), Some(child));
        assert_eq!(map.layer_local_index(group), Some(0));
    }

    #[test]
    fn duplicate_undo_removes_the_copy() {
        let mut map = map();
        let group = map.add_group_layer(None).unwrap();
        map.add_tile_layer(Some(group)).unwrap();
        let before = snapshot(&map);

        let mut cmd = DuplicateLayer::new(&map, group).unwrap();
        cmd.redo(&mut map).unwrap();
        assert_eq!(map.layer_count(None), 2);
        assert_eq!(map.layers().len(), 4);

        cmd.undo(&mut map).unwrap();
        assert_eq!(snapshot(&map), before);

        cmd.redo(&mut map).unwrap();
        assert_eq!(map.layer_local_index(cmd.copy_id().unwrap()), Some(1));
    }

    #[test]
    fn opacity_edits_on_one_layer_merge() {
        let mut map = map();
        let a = map.add_tile_layer(None).unwrap();
        let b = map.add_tile_layer(None).unwrap();
        let mut stack = CommandStack::default();

        for opacity in [0.9, 0.7, 0.4] {
            let cmd = SetLayerOpacity::new(&map, a, opacity).unwrap();
            stack
                .push(&mut map, cmd)
                .unwrap();
        }
        let cmd = SetLayerOpacity::new(&map, b, 0.1).unwrap();
        stack.push(&mut map, cmd).unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(map.layer(a).unwrap().opacity(), 0.4);

        stack.undo(&mut map).unwrap();
        stack.undo(&mut map).unwrap();
        assert_eq!(map.layer(a).unwrap().opacity(), 1.0);
        assert_eq!(map.layer(b).unwrap().opacity(), 1.0);
    }

    #[test]
    fn rename_and_visibility_round_trip() {
        let mut map = map();
        let a = map.add_tile_layer(None).unwrap();
        let before = snapshot(&map);

        let mut rename = RenameLayer::new(&map, a, "Ground").unwrap();
        rename.redo(&mut map).unwrap();
        assert_eq!(map.layer(a).unwrap().name, "Ground");
        let mut hide = SetLayerVisible::new(&map, a, false).unwrap();
        hide.redo(&mut map).unwrap();
        assert!(!map.layer(a).unwrap().visible);

        hide.undo(&mut map).unwrap();
        rename.undo(&mut map).unwrap();
        assert_eq!(snapshot(&map), before);
    }

    #[test]
    fn moves_are_validated_and_reversible() {
        let mut map = map();
        let a = map.add_tile_layer(None).unwrap();
        let b = map.add_tile_layer(None).unwrap();
        assert!(MoveLayerUp::new(&map, a).is_err());
        assert!(MoveLayerDown::new(&map, b).is_err());

        let mut cmd = MoveLayerDown::new(&map, a).unwrap();
        cmd.redo(&mut map).unwrap();
        assert_eq!(map.layer_local_index(a), Some(1));
        cmd.undo(&mut map).unwrap();
        assert_eq!(map.layer_local_index(a), Some(0));
    }

    #[test]
    fn reparent_rejects_cycles_and_undoes() {
        let mut map = map();
        let outer = map.add_group_layer(None).unwrap();
        let inner = map.add_group_layer(Some(outer)).unwrap();
        let leaf = map.add_tile_layer(None).unwrap();
        assert_eq!(
            ReparentLayer::new(&map, outer, Some(inner), 0).err(),
            Some(MapError::CyclicLayerTree(outer))
        );

        let before = snapshot(&map);
        let mut cmd = ReparentLayer::new(&map, leaf, Some(inner), 0).unwrap();
        cmd.redo(&mut map).unwrap();
        assert_eq!(map.layers().parent_of(leaf), Some(inner));
        cmd.undo(&mut map).unwrap();
        assert_eq!(snapshot(&map), before);
    }
}
