//! The live map document: grid size, layers, tilesets and contexts.

use std::collections::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::attribute::{Attribute, AttributeType};
use crate::codec::TileFormat;
use crate::context::{AttributeContext, Component, ComponentDefinition, ComponentIndex};
use crate::error::MapError;
use crate::geom::Size;
use crate::layer::{GroupLayer, Layer, LayerType, LayerVisitor, ObjectLayer, TileLayer};
use crate::layer_tree::{LayerSubtree, LayerTree};
use crate::object::{Object, ObjectType};
use crate::tile_matrix::{TileExtent, TileId, TileMatrix, TilePos, EMPTY_TILE};
use crate::tileset::{AttachedTileset, Tileset, TilesetBundle};

/// Original values of the tiles reset by [`Map::fix_tiles`], per layer and position.
pub type FixedTiles = HashMap<Uuid, HashMap<TilePos, TileId>>;

/// Full copies of every tile layer's grid, keyed by layer.
pub type TileSnapshot = HashMap<Uuid, TileMatrix>;

/// A component definition that was removed from the map, along with every instance that
/// had to be detached because of it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedComponent {
    /// Former position in the definition list.
    pub index: usize,
    /// The removed definition.
    pub definition: ComponentDefinition,
    /// `(context, position in that context, instance)`
    pub instances: Vec<(Uuid, usize, Component)>,
}

/// The live document: tile grid extent, layer tree, tilesets and component schemas.
///
/// Every tile layer in the tree always has exactly the map's extent.
#[derive(Debug, Clone)]
pub struct Map {
    extent: TileExtent,
    tile_size: Size,
    next_layer_id: i32,
    next_object_id: i32,
    layers: LayerTree,
    active_layer: Option<Uuid>,
    tilesets: TilesetBundle,
    components: ComponentIndex,
    /// Map-level properties and components.
    pub context: AttributeContext,
    /// Tile data encoding used when saving.
    pub tile_format: TileFormat,
}

impl Map {
    /// An empty map. Both the extent and the tile size must be positive.
    pub fn new(extent: TileExtent, tile_size: Size) -> Result<Self, MapError> {
        let extent = extent.validate()?;
        if !tile_size.is_positive() {
            return Err(MapError::InvalidArgument(format!(
                "tile size must be positive, got {}x{}",
                tile_size.width, tile_size.height
            )));
        }
        Ok(Map {
            extent,
            tile_size,
            next_layer_id: 1,
            next_object_id: 1,
            layers: LayerTree::new(),
            active_layer: None,
            tilesets: TilesetBundle::default(),
            components: ComponentIndex::new(),
            context: AttributeContext::new(),
            tile_format: TileFormat::default(),
        })
    }

    /// Rows and columns.
    pub fn extent(&self) -> TileExtent {
        self.extent
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.extent.rows
    }

    /// Number of columns.
    pub fn col_count(&self) -> usize {
        self.extent.cols
    }

    /// Pixel size of one cell.
    pub fn tile_size(&self) -> Size {
        self.tile_size
    }

    /// Changes the cell size. Both dimensions must be positive.
    pub fn set_tile_size(&mut self, tile_size: Size) -> Result<(), MapError> {
        if !tile_size.is_positive() {
            return Err(MapError::InvalidArgument(format!(
                "tile size must be positive, got {}x{}",
                tile_size.width, tile_size.height
            )));
        }
        self.tile_size = tile_size;
        Ok(())
    }

    /// `pos` lies inside the grid.
    pub fn is_valid_position(&self, pos: TilePos) -> bool {
        pos.row >= 0
            && pos.col >= 0
            && (pos.row as usize) < self.extent.rows
            && (pos.col as usize) < self.extent.cols
    }

    /// Persistent id the next new layer gets.
    pub fn next_layer_id(&self) -> i32 {
        self.next_layer_id
    }

    /// Persistent id the next new object gets.
    pub fn next_object_id(&self) -> i32 {
        self.next_object_id
    }

    /// Counters only ever grow. Values below the current ones are ignored.
    pub fn advance_ids(&mut self, next_layer_id: i32, next_object_id: i32) {
        self.next_layer_id = self.next_layer_id.max(next_layer_id);
        self.next_object_id = self.next_object_id.max(next_object_id);
    }

    /// The layer tree, read only.
    pub fn layers(&self) -> &LayerTree {
        &self.layers
    }

    /// Attached tilesets.
    pub fn tilesets(&self) -> &TilesetBundle {
        &self.tilesets
    }

    /// Mutable access to the attached tilesets.
    pub fn tilesets_mut(&mut self) -> &mut TilesetBundle {
        &mut self.tilesets
    }

    /// Component definitions.
    pub fn components(&self) -> &ComponentIndex {
        &self.components
    }

    /// Mutable access to the definitions. Instances are not updated.
    pub fn components_mut(&mut self) -> &mut ComponentIndex {
        &mut self.components
    }

    // Layers

    fn mint_layer_id(&mut self) -> Result<i32, MapError> {
        mint(&mut self.next_layer_id, "layer")
    }

    fn mint_object_id(&mut self) -> Result<i32, MapError> {
        mint(&mut self.next_object_id, "object")
    }

    /// Builds a detached layer of the given type with a fresh persistent id and the
    /// default name for its kind. Tile layers get the map's extent.
    pub fn new_layer(&mut self, layer_type: LayerType) -> Result<Layer, MapError> {
        let id = self.mint_layer_id()?;
        Ok(match layer_type {
            LayerType::Tile => Layer::new_tile_layer(self.extent, id, format!("Tile Layer {id}")),
            LayerType::Object => Layer::new_object_layer(id, format!("Object Layer {id}")),
            LayerType::Group => Layer::new_group_layer(id, format!("Group Layer {id}")),
        })
    }

    /// Adds a new tile layer under `parent`.
    pub fn add_tile_layer(&mut self, parent: Option<Uuid>) -> Result<Uuid, MapError> {
        let layer = self.new_layer(LayerType::Tile)?;
        self.add_layer(layer, parent)
    }

    /// Adds a new object layer under `parent`.
    pub fn add_object_layer(&mut self, parent: Option<Uuid>) -> Result<Uuid, MapError> {
        let layer = self.new_layer(LayerType::Object)?;
        self.add_layer(layer, parent)
    }

    /// Adds a new group under `parent`.
    pub fn add_group_layer(&mut self, parent: Option<Uuid>) -> Result<Uuid, MapError> {
        let layer = self.new_layer(LayerType::Group)?;
        self.add_layer(layer, parent)
    }

    /// Appends `layer` as the last child of `parent`, or of the root.
    pub fn add_layer(&mut self, layer: Layer, parent: Option<Uuid>) -> Result<Uuid, MapError> {
        self.insert_layer(layer, parent, usize::MAX)
    }

    /// Inserts `layer` at `index` among the children of `parent`. Tile layers must match the map extent.
    pub fn insert_layer(
        &mut self,
        layer: Layer,
        parent: Option<Uuid>,
        index: usize,
    ) -> Result<Uuid, MapError> {
        if let Some(tiles) = layer.as_tile_layer() {
            self.check_extent(tiles)?;
        }
        let id = self.layers.insert(layer, parent, index)?;
        debug!(layer = %id, "added layer");
        Ok(id)
    }

    /// Detaches a layer and its subtree. Unknown ids are a no-op.
    pub fn remove_layer(&mut self, id: Uuid) -> Option<LayerSubtree> {
        let subtree = self.layers.remove(id)?;
        if self.active_layer.is_some_and(|active| subtree.contains(active)) {
            self.active_layer = None;
        }
        debug!(layer = %id, removed = subtree.layers().len(), "removed layer");
        Some(subtree)
    }

    /// Puts back a subtree taken with [`Map::remove_layer`].
    pub fn restore_layer(&mut self, subtree: LayerSubtree) -> Result<(), MapError> {
        for layer in subtree.layers() {
            if let Some(tiles) = layer.as_tile_layer() {
                self.check_extent(tiles)?;
            }
        }
        self.layers.restore(subtree)
    }

    /// Deep copy of a layer placed right after it. Returns the id of the copy.
    pub fn duplicate_layer(&mut self, id: Uuid) -> Result<Uuid, MapError> {
        let mut next_layer_id = self.next_layer_id;
        let mut next_object_id = self.next_object_id;
        let copy = self
            .layers
            .duplicate(id, &mut next_layer_id, &mut next_object_id)?;
        self.next_layer_id = next_layer_id;
        self.next_object_id = next_object_id;
        Ok(copy)
    }

    /// Swaps a layer with its previous sibling.
    pub fn move_layer_up(&mut self, id: Uuid) -> Result<(), MapError> {
        self.layers.move_up(id)
    }

    /// Swaps a layer with its next sibling.
    pub fn move_layer_down(&mut self, id: Uuid) -> Result<(), MapError> {
        self.layers.move_down(id)
    }

    /// The layer has a previous sibling.
    pub fn can_move_layer_up(&self, id: Uuid) -> bool {
        self.layers.can_move_up(id)
    }

    /// The layer has a next sibling.
    pub fn can_move_layer_down(&self, id: Uuid) -> bool {
        self.layers.can_move_down(id)
    }

    /// Moves a layer under a new parent, returning its old parent and index.
    pub fn reparent_layer(
        &mut self,
        id: Uuid,
        parent: Option<Uuid>,
        index: usize,
    ) -> Result<(Option<Uuid>, usize), MapError> {
        self.layers.reparent(id, parent, index)
    }

    /// The selected layer, if any.
    pub fn active_layer(&self) -> Option<Uuid> {
        self.active_layer
    }

    /// Makes `id` the active layer.
    pub fn select_layer(&mut self, id: Uuid) -> Result<(), MapError> {
        self.layers.layer(id)?;
        self.active_layer = Some(id);
        Ok(())
    }

    pub(crate) fn set_active_layer(&mut self, id: Option<Uuid>) {
        self.active_layer = id.filter(|id| self.layers.contains(*id));
    }

    /// Looks up a layer at any depth.
    pub fn layer(&self, id: Uuid) -> Result<&Layer, MapError> {
        self.layers.layer(id)
    }

    pub(crate) fn layer_mut(&mut self, id: Uuid) -> Result<&mut Layer, MapError> {
        self.layers.layer_mut(id)
    }

    /// Tile payload of `id`, if it is a tile layer.
    pub fn find_tile_layer(&self, id: Uuid) -> Option<&TileLayer> {
        self.layers.find_tile_layer(id)
    }

    /// Object payload of `id`, if it is an object layer.
    pub fn find_object_layer(&self, id: Uuid) -> Option<&ObjectLayer> {
        self.layers.find_object_layer(id)
    }

    /// Group payload of `id`, if it is a group.
    pub fn find_group_layer(&self, id: Uuid) -> Option<&GroupLayer> {
        self.layers.find_group_layer(id)
    }

    /// Tile payload, erroring on a missing or non-tile layer.
    pub fn get_tile_layer(&self, id: Uuid) -> Result<&TileLayer, MapError> {
        self.layers.get_tile_layer(id)
    }

    pub(crate) fn get_tile_layer_mut(&mut self, id: Uuid) -> Result<&mut TileLayer, MapError> {
        self.layers.get_tile_layer_mut(id)
    }

    /// Writes one cell of a tile layer, returning the tile it replaced.
    pub fn set_tile(&mut self, layer: Uuid, pos: TilePos, tile: TileId) -> Result<TileId, MapError> {
        let tiles = self.layers.get_tile_layer_mut(layer)?;
        let previous = tiles.tile_at(pos)?;
        tiles.set_tile(pos, tile)?;
        Ok(previous)
    }

    /// Object payload, erroring on a missing or non-object layer.
    pub fn get_object_layer(&self, id: Uuid) -> Result<&ObjectLayer, MapError> {
        self.layers.get_object_layer(id)
    }

    /// Mutable object payload.
    pub fn get_object_layer_mut(&mut self, id: Uuid) -> Result<&mut ObjectLayer, MapError> {
        self.layers.get_object_layer_mut(id)
    }

    /// Group payload, erroring on a missing or non-group layer.
    pub fn get_group_layer(&self, id: Uuid) -> Result<&GroupLayer, MapError> {
        self.layers.get_group_layer(id)
    }

    /// Direct children of `parent` (top-level layers for `None`).
    pub fn layer_count(&self, parent: Option<Uuid>) -> usize {
        self.layers.layer_count(parent)
    }

    /// Position of a layer among its siblings.
    pub fn layer_local_index(&self, id: Uuid) -> Option<usize> {
        self.layers.local_index(id)
    }

    /// Walks every layer depth first in draw order.
    pub fn visit_layers(&self, visitor: &mut dyn LayerVisitor) {
        self.layers.visit(visitor);
    }

    fn check_extent(&self, tiles: &TileLayer) -> Result<(), MapError> {
        if tiles.extent() != self.extent {
            let found = tiles.extent();
            return Err(MapError::InvalidArgument(format!(
                "tile layer is {}x{} but the map is {}x{}",
                found.rows, found.cols, self.extent.rows, self.extent.cols
            )));
        }
        Ok(())
    }

    // Objects

    /// A detached object with a fresh persistent id.
    pub fn new_object(&mut self, object_type: ObjectType) -> Result<Object, MapError> {
        let id = self.mint_object_id()?;
        Ok(Object::new(object_type, id))
    }

    /// Finds an object in any object layer, returning the layer that owns it.
    pub fn find_object(&self, id: Uuid) -> Option<(Uuid, &Object)> {
        self.layers.iter().find_map(|layer| {
            layer
                .as_object_layer()
                .and_then(|objects| objects.object(id))
                .map(|object| (layer.id(), object))
        })
    }

    // Grid

    /// Appends an empty row to every tile layer.
    pub fn add_row(&mut self) {
        self.extent.rows += 1;
        for (_, tiles) in self.layers.tile_layers_mut() {
            tiles.add_row();
        }
    }

    /// Appends an empty column to every tile layer.
    pub fn add_column(&mut self) {
        self.extent.cols += 1;
        for (_, tiles) in self.layers.tile_layers_mut() {
            tiles.add_column();
        }
    }

    /// Drops the last row. The map keeps at least one.
    pub fn remove_row(&mut self) -> Result<(), MapError> {
        if self.extent.rows <= 1 {
            return Err(MapError::InvalidArgument("cannot remove the last row".to_owned()));
        }
        self.extent.rows -= 1;
        for (_, tiles) in self.layers.tile_layers_mut() {
            tiles.remove_row()?;
        }
        Ok(())
    }

    /// Drops the last column. The map keeps at least one.
    pub fn remove_column(&mut self) -> Result<(), MapError> {
        if self.extent.cols <= 1 {
            return Err(MapError::InvalidArgument("cannot remove the last column".to_owned()));
        }
        self.extent.cols -= 1;
        for (_, tiles) in self.layers.tile_layers_mut() {
            tiles.remove_column()?;
        }
        Ok(())
    }

    /// Resizes every tile layer. Cells outside the new extent are dropped.
    pub fn resize(&mut self, extent: TileExtent) -> Result<(), MapError> {
        let extent = extent.validate()?;
        self.extent = extent;
        for (_, tiles) in self.layers.tile_layers_mut() {
            tiles.resize(extent);
        }
        Ok(())
    }

    /// Copies the grid of every tile layer.
    pub fn tile_snapshot(&self) -> TileSnapshot {
        self.layers
            .iter()
            .filter_map(|layer| layer.as_tile_layer().map(|t| (layer.id(), t.tiles().clone())))
            .collect()
    }

    /// Puts back grids taken with [`Map::tile_snapshot`]. Snapshots for layers that no longer
    /// exist, or whose extent differs from the map's, are skipped.
    pub fn restore_tile_snapshot(&mut self, snapshot: &TileSnapshot) {
        let extent = self.extent;
        for (id, tiles) in self.layers.tile_layers_mut() {
            match snapshot.get(&id) {
                Some(saved) if saved.extent() == extent => tiles.tiles = saved.clone(),
                Some(_) => warn!(layer = %id, "tile snapshot does not match the map extent"),
                None => {}
            }
        }
    }

    /// Resets every tile id that no attached tileset claims to the empty tile.
    pub fn fix_tiles(&mut self) -> FixedTiles {
        let mut fixed = FixedTiles::new();
        let tilesets = &self.tilesets;
        for (id, tiles) in self.layers.tile_layers_mut() {
            let invalid: Vec<(TilePos, TileId)> = tiles
                .tiles()
                .cells()
                .filter(|(_, tile)| *tile != EMPTY_TILE && !tilesets.is_valid_tile(*tile))
                .collect();
            if invalid.is_empty() {
                continue;
            }
            let mut originals = HashMap::with_capacity(invalid.len());
            for (pos, tile) in invalid {
                if tiles.set_tile(pos, EMPTY_TILE).is_ok() {
                    originals.insert(pos, tile);
                }
            }
            fixed.insert(id, originals);
        }
        if !fixed.is_empty() {
            debug!(layers = fixed.len(), "reset invalid tiles");
        }
        fixed
    }

    /// Writes back tiles recorded by [`Map::fix_tiles`].
    pub fn restore_tiles(&mut self, tiles: &FixedTiles) -> Result<(), MapError> {
        for (id, cells) in tiles {
            let layer = self.layers.get_tile_layer_mut(*id)?;
            for (pos, tile) in cells {
                layer.set_tile(*pos, *tile)?;
            }
        }
        Ok(())
    }

    // Tilesets

    /// Attaches a tileset after the highest tile id in use.
    pub fn attach_tileset(&mut self, tileset: Tileset) -> Result<Uuid, MapError> {
        self.tilesets.attach(tileset)
    }

    /// Removes a tileset, returning it with its former index.
    pub fn detach_tileset(&mut self, id: Uuid) -> Result<(usize, AttachedTileset), MapError> {
        self.tilesets.detach(id).ok_or(MapError::TilesetNotFound(id))
    }

    /// Puts back a tileset taken with [`Map::detach_tileset`].
    pub fn restore_tileset(&mut self, index: usize, attached: AttachedTileset) -> Result<(), MapError> {
        self.tilesets.restore(index, attached)
    }

    // Contexts

    /// The context with this id, owned by the map or any layer, object, tileset or tile.
    pub fn find_context(&self, id: Uuid) -> Option<&AttributeContext> {
        if self.context.id() == id {
            return Some(&self.context);
        }
        let in_layers = self.layers.iter().find_map(|layer| {
            if layer.context.id() == id {
                return Some(&layer.context);
            }
            layer.as_object_layer().and_then(|objects| {
                objects
                    .objects()
                    .iter()
                    .map(|o| &o.context)
                    .find(|c| c.id() == id)
            })
        });
        in_layers.or_else(|| {
            self.tilesets
                .iter()
                .find_map(|t| t.tileset.contexts().find(|c| c.id() == id))
        })
    }

    /// Mutable lookup by context id.
    pub fn find_context_mut(&mut self, id: Uuid) -> Option<&mut AttributeContext> {
        if self.context.id() == id {
            return Some(&mut self.context);
        }
        for layer in self.layers.iter_mut() {
            if layer.context.id() == id {
                return Some(&mut layer.context);
            }
            if let Some(objects) = layer.as_object_layer_mut() {
                if let Some(object) = objects.objects_mut().find(|o| o.context.id() == id) {
                    return Some(&mut object.context);
                }
            }
        }
        self.tilesets
            .iter_mut()
            .find_map(|t| t.tileset.context_mut(id))
    }

    /// Like `find_context`, but a missing id is an error.
    pub fn get_context(&self, id: Uuid) -> Result<&AttributeContext, MapError> {
        self.find_context(id).ok_or(MapError::ContextNotFound(id))
    }

    /// Like `find_context_mut`, but a missing id is an error.
    pub fn get_context_mut(&mut self, id: Uuid) -> Result<&mut AttributeContext, MapError> {
        self.find_context_mut(id).ok_or(MapError::ContextNotFound(id))
    }

    fn for_each_context_mut(&mut self, f: &mut dyn FnMut(&mut AttributeContext)) {
        f(&mut self.context);
        for layer in self.layers.iter_mut() {
            f(&mut layer.context);
            if let Some(objects) = layer.as_object_layer_mut() {
                for object in objects.objects_mut() {
                    f(&mut object.context);
                }
            }
        }
        for attached in self.tilesets.iter_mut() {
            attached.tileset.for_each_context_mut(f);
        }
    }

    // Components

    /// Adds an empty component definition.
    pub fn define_component(&mut self, name: impl Into<String>) -> Result<(), MapError> {
        self.components.define(name).map(|_| ())
    }

    /// Removes a definition and detaches every instance of it.
    pub fn undefine_component(&mut self, name: &str) -> Result<RemovedComponent, MapError> {
        let (index, definition) = self.components.undefine(name)?;
        let mut instances = Vec::new();
        self.for_each_context_mut(&mut |ctx| {
            if let Ok((at, component)) = ctx.detach_component(name) {
                instances.push((ctx.id(), at, component));
            }
        });
        Ok(RemovedComponent {
            index,
            definition,
            instances,
        })
    }

    /// Undoes [`Map::undefine_component`].
    pub fn restore_component(&mut self, removed: RemovedComponent) -> Result<(), MapError> {
        self.components.insert(removed.definition, removed.index)?;
        for (ctx, at, component) in removed.instances {
            self.get_context_mut(ctx)?.attach_component_at(component, at)?;
        }
        Ok(())
    }

    /// Renames a definition and every instance of it.
    pub fn rename_component(&mut self, old: &str, new: &str) -> Result<(), MapError> {
        self.components.rename(old, new)?;
        self.for_each_context_mut(&mut |ctx| ctx.rename_component_instances(old, new));
        Ok(())
    }

    /// Adds an attribute to a definition and to every existing instance of it.
    pub fn add_component_attribute(
        &mut self,
        definition: &str,
        name: &str,
        ty: AttributeType,
    ) -> Result<(), MapError> {
        self.components.add_attribute(definition, name, ty)?;
        self.for_each_context_mut(&mut |ctx| {
            if let Some(component) = ctx.component_mut(definition) {
                if !component.values.contains(name) {
                    let _ = component.values.add(name, Attribute::with_type(ty));
                }
            }
        });
        Ok(())
    }

    /// Removes an attribute from a definition and from every instance of it.
    pub fn remove_component_attribute(&mut self, definition: &str, name: &str) -> Result<(), MapError> {
        self.components.remove_attribute(definition, name)?;
        self.for_each_context_mut(&mut |ctx| {
            if let Some(component) = ctx.component_mut(definition) {
                let _ = component.values.remove(name);
            }
        });
        Ok(())
    }

    /// Attaches a fresh instance of `definition` to a context.
    pub fn attach_component(&mut self, context: Uuid, definition: &str) -> Result<(), MapError> {
        let component = self.components.require(definition)?.instantiate();
        self.get_context_mut(context)?.attach_component(component)
    }
}

/// Hands out the counter's value and advances it.
pub(crate) fn mint(counter: &mut i32, kind: &'static str) -> Result<i32, MapError> {
    let id = *counter;
    *counter = id.checked_add(1).ok_or(MapError::IdsExhausted(kind))?;
    Ok(id)
}
