//! Canonical, format-agnostic map.
//!
//! Parsers produce an [`IrMap`], exporters consume one, and the live [`crate::map::Map`]
//! converts to and from it. Nothing here refers to UUIDs: those only exist in the live
//! document, files carry the persistent integer ids.

use std::path::PathBuf;

use crate::codec::TileFormat;
use crate::context::PropertyMap;
use crate::geom::{Size, Vec2};
use crate::layer::LayerType;
use crate::object::ObjectType;
use crate::tile_matrix::{TileExtent, TileId, TileIndex, TileMatrix};

/// A whole map as every format reads and writes it.
#[derive(Debug, Clone, PartialEq)]
pub struct IrMap {
    /// Rows and columns of every tile layer.
    pub extent: TileExtent,
    /// Pixel size of one cell.
    pub tile_size: Size,
    /// Persistent id the next new layer gets.
    pub next_layer_id: i32,
    /// Persistent id the next new object gets.
    pub next_object_id: i32,
    /// How tile layer data is encoded on disk.
    pub tile_format: TileFormat,
    /// Component schema of the map.
    pub component_definitions: Vec<IrComponentDefinition>,
    /// Sorted by first tile.
    pub tilesets: Vec<IrTileset>,
    /// Top-level layers in draw order.
    pub layers: Vec<IrLayer>,
    /// Map-level properties and components.
    pub context: IrContext,
}

impl IrMap {
    /// An empty map with default counters and tile format.
    pub fn new(extent: TileExtent, tile_size: Size) -> Self {
        IrMap {
            extent,
            tile_size,
            next_layer_id: 1,
            next_object_id: 1,
            tile_format: TileFormat::default(),
            component_definitions: Vec::new(),
            tilesets: Vec::new(),
            layers: Vec::new(),
            context: IrContext::default(),
        }
    }

    /// Every layer, parents before children.
    pub fn all_layers(&self) -> Vec<&IrLayer> {
        fn walk<'a>(layers: &'a [IrLayer], out: &mut Vec<&'a IrLayer>) {
            for layer in layers {
                out.push(layer);
                if let IrLayerKind::Group(children) = &layer.kind {
                    walk(children, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.layers, &mut out);
        out
    }

    /// First layer with this name, searching depth first.
    pub fn find_layer(&self, name: &str) -> Option<&IrLayer> {
        self.all_layers().into_iter().find(|l| l.name == name)
    }
}

/// Properties and components owned by one element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IrContext {
    /// Named values in insertion order.
    pub properties: PropertyMap,
    /// Attached component instances.
    pub components: Vec<IrComponent>,
}

impl IrContext {
    /// Nothing to write for this element.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.components.is_empty()
    }
}

/// A component attached to a context.
#[derive(Debug, Clone, PartialEq)]
pub struct IrComponent {
    /// Name of the component definition.
    pub definition: String,
    /// Attribute values, one per definition attribute.
    pub values: PropertyMap,
}

/// A named set of attributes with default values.
#[derive(Debug, Clone, PartialEq)]
pub struct IrComponentDefinition {
    /// Unique definition name.
    pub name: String,
    /// Attribute defaults.
    pub attributes: PropertyMap,
}

/// A tileset with its global tile range.
#[derive(Debug, Clone, PartialEq)]
pub struct IrTileset {
    /// Display name, also the stem of external tileset files.
    pub name: String,
    /// Global id of local tile 0.
    pub first_tile: TileId,
    /// Pixel size of one tile.
    pub tile_size: Size,
    /// Tiles per texture row.
    pub column_count: i32,
    /// Tiles in the texture.
    pub tile_count: i32,
    /// Already resolved against the directory of the file that referenced it.
    pub image_path: PathBuf,
    /// Pixel size of the texture.
    pub image_size: Size,
    /// Only tiles with metadata, sorted by index.
    pub tiles: Vec<IrTile>,
    /// Tileset properties and components.
    pub context: IrContext,
}

impl IrTileset {
    /// Texture rows, counting a partial last row.
    pub fn row_count(&self) -> i32 {
        if self.column_count > 0 && self.tile_count > 0 {
            (self.tile_count - 1) / self.column_count + 1
        } else {
            0
        }
    }

    /// Global id of the last tile.
    pub fn last_tile(&self) -> TileId {
        self.first_tile.saturating_add(self.tile_count.saturating_sub(1))
    }
}

/// Metadata for one tile of a tileset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IrTile {
    /// Local index in the tileset.
    pub index: TileIndex,
    /// Animation frames, empty for a static tile.
    pub frames: Vec<IrAnimationFrame>,
    /// Collision and marker shapes.
    pub objects: Vec<IrObject>,
    /// Tile properties and components.
    pub context: IrContext,
}

/// One step of a tile animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrAnimationFrame {
    /// Local index shown during this frame.
    pub tile: TileIndex,
    /// How long the frame lasts.
    pub duration_ms: u64,
}

/// A layer with its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct IrLayer {
    /// Persistent id, unique among layers.
    pub id: i32,
    /// Display name.
    pub name: String,
    /// In `0.0..=1.0`.
    pub opacity: f32,
    /// Drawn or hidden.
    pub visible: bool,
    /// Layer properties and components.
    pub context: IrContext,
    /// Tiles, objects or children.
    pub kind: IrLayerKind,
}

impl IrLayer {
    /// The kind without its payload.
    pub fn layer_type(&self) -> LayerType {
        match self.kind {
            IrLayerKind::Tile(_) => LayerType::Tile,
            IrLayerKind::Object(_) => LayerType::Object,
            IrLayerKind::Group(_) => LayerType::Group,
        }
    }
}

/// Payload of an `IrLayer`.
#[derive(Debug, Clone, PartialEq)]
pub enum IrLayerKind {
    /// A grid with the map extent.
    Tile(TileMatrix),
    /// Free-standing objects.
    Object(Vec<IrObject>),
    /// Child layers in draw order.
    Group(Vec<IrLayer>),
}

/// A point, rectangle or ellipse.
#[derive(Debug, Clone, PartialEq)]
pub struct IrObject {
    /// Persistent id, unique among objects.
    pub id: i32,
    /// Shape.
    pub object_type: ObjectType,
    /// Top-left corner in pixels.
    pub position: Vec2,
    /// Zero for points.
    pub size: Vec2,
    /// Display name.
    pub name: String,
    /// Free-form type string.
    pub tag: String,
    /// Drawn or hidden.
    pub visible: bool,
    /// Object properties and components.
    pub context: IrContext,
}

impl IrObject {
    /// A visible, unnamed object at the origin.
    pub fn new(id: i32, object_type: ObjectType) -> Self {
        IrObject {
            id,
            object_type,
            position: Vec2::ZERO,
            size: Vec2::ZERO,
            name: String::new(),
            tag: String::new(),
            visible: true,
            context: IrContext::default(),
        }
    }
}
