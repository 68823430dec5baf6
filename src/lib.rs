//! Document model and map interchange for a tile-map editor.
//!
//! A [`Map`] holds a tree of tile, object and group layers plus the tilesets and component
//! schemas they refer to. Edits go through [`command`] objects kept on a [`CommandStack`],
//! and maps are read and written through the [`format`] module via the format-neutral
//! [`IrMap`].

#![warn(missing_docs)]

pub mod attribute;
pub mod codec;
pub mod command;
pub mod context;
mod convert;
pub mod document;
mod error;
pub mod format;
pub mod geom;
pub mod ir_map;
pub mod layer;
pub mod layer_tree;
pub mod map;
pub mod object;
pub mod settings;
pub mod tile_matrix;
pub mod tileset;

pub use attribute::{Attribute, AttributeType, Color, ObjectRef};
pub use codec::{CodecError, TileCompression, TileEncoding, TileFormat};
pub use command::{Command, CommandKind, CommandStack};
pub use context::{AttributeContext, Component, ComponentDefinition, ComponentIndex, PropertyMap};
pub use document::MapDocument;
pub use error::{MapError, ParseError, WriteError};
pub use format::{load_map, save_map, MapFormat, SaveOptions};
pub use geom::{Rect, Size, Vec2};
pub use ir_map::IrMap;
pub use layer::{Layer, LayerKind, LayerType};
pub use map::Map;
pub use object::{Object, ObjectType};
pub use settings::{ConfigError, Settings};
pub use tile_matrix::{TileExtent, TileId, TileMatrix, TilePos, EMPTY_TILE};
pub use tileset::{Tileset, TilesetBundle};
