//! Layers and their tile, object and group payloads.

use std::fmt;

use uuid::Uuid;

use crate::context::AttributeContext;
use crate::error::MapError;
use crate::geom::Vec2;
use crate::object::Object;
use crate::tile_matrix::{TileExtent, TileId, TileMatrix, TilePos};

/// The three layer variants, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerType {
    /// A grid of tile ids.
    Tile,
    /// Free-standing objects.
    Object,
    /// A container for other layers.
    Group,
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LayerType::Tile => "tile",
            LayerType::Object => "object",
            LayerType::Group => "group",
        })
    }
}

/// A node of the layer tree.
///
/// Parent and child links are UUIDs resolved through [`crate::layer_tree::LayerTree`];
/// a layer never owns another layer directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub(crate) id: Uuid,
    pub(crate) parent: Option<Uuid>,
    /// Id written to files, unique among layers.
    pub persistent_id: i32,
    /// Display name.
    pub name: String,
    opacity: f32,
    /// Drawn or hidden.
    pub visible: bool,
    /// Layer properties and components.
    pub context: AttributeContext,
    pub(crate) kind: LayerKind,
}

/// Payload of a layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    /// Tile grid.
    Tile(TileLayer),
    /// Objects.
    Object(ObjectLayer),
    /// Child links.
    Group(GroupLayer),
}

impl Layer {
    /// A detached, visible, fully opaque layer with a fresh UUID.
    pub fn new(kind: LayerKind, persistent_id: i32, name: impl Into<String>) -> Self {
        Layer {
            id: Uuid::new_v4(),
            parent: None,
            persistent_id,
            name: name.into(),
            opacity: 1.0,
            visible: true,
            context: AttributeContext::new(),
            kind,
        }
    }

    /// An empty tile layer.
    pub fn new_tile_layer(extent: TileExtent, persistent_id: i32, name: impl Into<String>) -> Self {
        Self::new(LayerKind::Tile(TileLayer::new(extent)), persistent_id, name)
    }

    /// A layer without objects.
    pub fn new_object_layer(persistent_id: i32, name: impl Into<String>) -> Self {
        Self::new(LayerKind::Object(ObjectLayer::default()), persistent_id, name)
    }

    /// A group without children.
    pub fn new_group_layer(persistent_id: i32, name: impl Into<String>) -> Self {
        Self::new(LayerKind::Group(GroupLayer::default()), persistent_id, name)
    }

    /// Runtime id, used by the tree and commands.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// `None` for top-level layers.
    pub fn parent(&self) -> Option<Uuid> {
        self.parent
    }

    /// Read access to the payload.
    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    /// The variant of the payload.
    pub fn layer_type(&self) -> LayerType {
        match self.kind {
            LayerKind::Tile(_) => LayerType::Tile,
            LayerKind::Object(_) => LayerType::Object,
            LayerKind::Group(_) => LayerType::Group,
        }
    }

    /// In `0.0..=1.0`.
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Values outside `[0, 1]` are clamped.
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = if opacity.is_nan() {
            1.0
        } else {
            opacity.clamp(0.0, 1.0)
        };
    }

    /// The tile payload, if this is a tile layer.
    pub fn as_tile_layer(&self) -> Option<&TileLayer> {
        match &self.kind {
            LayerKind::Tile(t) => Some(t),
            _ => None,
        }
    }

    pub(crate) fn as_tile_layer_mut(&mut self) -> Option<&mut TileLayer> {
        match &mut self.kind {
            LayerKind::Tile(t) => Some(t),
            _ => None,
        }
    }

    /// The object payload, if this is an object layer.
    pub fn as_object_layer(&self) -> Option<&ObjectLayer> {
        match &self.kind {
            LayerKind::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Mutable object payload.
    pub fn as_object_layer_mut(&mut self) -> Option<&mut ObjectLayer> {
        match &mut self.kind {
            LayerKind::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The group payload, if this is a group.
    pub fn as_group_layer(&self) -> Option<&GroupLayer> {
        match &self.kind {
            LayerKind::Group(g) => Some(g),
            _ => None,
        }
    }

    pub(crate) fn as_group_layer_mut(&mut self) -> Option<&mut GroupLayer> {
        match &mut self.kind {
            LayerKind::Group(g) => Some(g),
            _ => None,
        }
    }

    pub(crate) fn dispatch(&self, visitor: &mut dyn LayerVisitor) {
        match &self.kind {
            LayerKind::Tile(t) => visitor.visit_tile_layer(self, t),
            LayerKind::Object(o) => visitor.visit_object_layer(self, o),
            LayerKind::Group(g) => visitor.visit_group_layer(self, g),
        }
    }
}

/// Depth-first walk over the tree, one callback per layer variant.
pub trait LayerVisitor {
    /// Called for each tile layer.
    fn visit_tile_layer(&mut self, _layer: &Layer, _tiles: &TileLayer) {}

    /// Called for each object layer.
    fn visit_object_layer(&mut self, _layer: &Layer, _objects: &ObjectLayer) {}

    /// Called for each group, before its children.
    fn visit_group_layer(&mut self, _layer: &Layer, _group: &GroupLayer) {}
}

/// Tile payload. The grid always has the extent of the map it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct TileLayer {
    pub(crate) tiles: TileMatrix,
}

impl TileLayer {
    /// A grid of empty cells.
    pub fn new(extent: TileExtent) -> Self {
        TileLayer {
            tiles: TileMatrix::new(extent),
        }
    }

    /// Wraps existing tiles.
    pub fn from_matrix(tiles: TileMatrix) -> Self {
        TileLayer { tiles }
    }

    /// The whole grid.
    pub fn tiles(&self) -> &TileMatrix {
        &self.tiles
    }

    /// Rows and columns.
    pub fn extent(&self) -> TileExtent {
        self.tiles.extent()
    }

    /// Tile at `pos`, 0 when empty.
    pub fn tile_at(&self, pos: TilePos) -> Result<TileId, MapError> {
        self.tiles.at(pos)
    }

    /// Writes one cell.
    pub fn set_tile(&mut self, pos: TilePos, id: TileId) -> Result<(), MapError> {
        self.tiles.set(pos, id)
    }

    /// Replaces the 4-connected region around `origin`, returning the cells it changed.
    pub fn flood(&mut self, origin: TilePos, replacement: TileId) -> Vec<TilePos> {
        self.tiles.flood(origin, replacement)
    }

    pub(crate) fn add_row(&mut self) {
        self.tiles.add_row();
    }

    pub(crate) fn add_column(&mut self) {
        self.tiles.add_column();
    }

    pub(crate) fn remove_row(&mut self) -> Result<(), MapError> {
        self.tiles.remove_row()
    }

    pub(crate) fn remove_column(&mut self) -> Result<(), MapError> {
        self.tiles.remove_column()
    }

    pub(crate) fn resize(&mut self, extent: TileExtent) {
        self.tiles.resize(extent);
    }
}

/// Objects in insertion order plus an optional active object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectLayer {
    objects: Vec<Object>,
    active_object: Option<Uuid>,
}

impl ObjectLayer {
    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// No objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects in insertion order.
    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    /// Looks up an object by id.
    pub fn object(&self, id: Uuid) -> Option<&Object> {
        self.objects.iter().find(|o| o.id == id)
    }

    /// Mutable lookup by id.
    pub fn object_mut(&mut self, id: Uuid) -> Option<&mut Object> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    /// Like `object`, but a missing id is an error.
    pub fn get_object(&self, id: Uuid) -> Result<&Object, MapError> {
        self.object(id).ok_or(MapError::ObjectNotFound(id))
    }

    /// Like `object_mut`, but a missing id is an error.
    pub fn get_object_mut(&mut self, id: Uuid) -> Result<&mut Object, MapError> {
        self.object_mut(id).ok_or(MapError::ObjectNotFound(id))
    }

    /// The object lives in this layer.
    pub fn contains(&self, id: Uuid) -> bool {
        self.object(id).is_some()
    }

    /// Appends an object.
    pub fn add_object(&mut self, object: Object) {
        self.objects.push(object);
    }

    /// Inserts at `index`, clamped to the end.
    pub fn insert_object(&mut self, index: usize, object: Object) {
        let index = index.min(self.objects.len());
        self.objects.insert(index, object);
    }

    /// Removes an object and returns it with its former index. Clears the active object
    /// if it was the one removed.
    pub fn remove_object(&mut self, id: Uuid) -> Option<(usize, Object)> {
        let index = self.objects.iter().position(|o| o.id == id)?;
        if self.active_object == Some(id) {
            self.active_object = None;
        }
        Some((index, self.objects.remove(index)))
    }

    /// The selected object, if any.
    pub fn active_object(&self) -> Option<Uuid> {
        self.active_object
    }

    /// Selects an object of this layer, or clears the selection with `None`.
    pub fn select_object(&mut self, id: Option<Uuid>) -> Result<(), MapError> {
        if let Some(id) = id {
            if !self.contains(id) {
                return Err(MapError::InvalidArgument(format!(
                    "object {id} is not part of this layer"
                )));
            }
        }
        self.active_object = id;
        Ok(())
    }

    /// First object, in insertion order, whose bounds contain `point`.
    pub fn object_at(&self, point: Vec2, tile_size: Vec2) -> Option<Uuid> {
        self.objects
            .iter()
            .find(|o| o.bounds(tile_size).contains(point))
            .map(|o| o.id)
    }

    pub(crate) fn objects_mut(&mut self) -> impl Iterator<Item = &mut Object> {
        self.objects.iter_mut()
    }
}

/// Group payload, the ids of the children in draw order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupLayer {
    pub(crate) children: Vec<Uuid>,
}

impl GroupLayer {
    /// Child ids in draw order.
    pub fn children(&self) -> &[Uuid] {
        &self.children
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// No children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
