use std::{io, path::PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::attribute::AttributeType;
use crate::codec::CodecError;
use crate::layer::LayerType;
use crate::tile_matrix::TilePos;

/// Contract violations on the live document: bad ids, wrong layer kinds, out of range positions.
///
/// Commands validate their targets when they are constructed, so once a command is on the
/// stack these should not surface from `redo`/`undo`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MapError {
    /// A position outside the tile grid.
    #[error("tile position {0} is out of range")]
    OutOfRange(TilePos),
    /// A grid with an empty or overflowing dimension.
    #[error(
        "invalid extent {rows}x{cols}, both dimensions must be at least 1 and the grid at most {} cells",
        crate::tile_matrix::MAX_CELL_COUNT
    )]
    InvalidExtent {
        /// Requested rows.
        rows: usize,
        /// Requested columns.
        cols: usize,
    },
    /// No layer has this id.
    #[error("no layer with id {0}")]
    LayerNotFound(Uuid),
    /// The layer exists but has another type.
    #[error("layer {id} is not a {expected} layer")]
    WrongLayerType {
        /// The layer asked for.
        id: Uuid,
        /// The type the caller needed.
        expected: LayerType,
    },
    /// Only group layers can have children.
    #[error("layer {0} is not a group layer and cannot have children")]
    InvalidParent(Uuid),
    /// The layer is already in the tree.
    #[error("layer {0} is already part of the layer tree")]
    DuplicateLayer(Uuid),
    /// A group would end up inside its own subtree.
    #[error("moving layer {0} there would make it its own ancestor")]
    CyclicLayerTree(Uuid),
    /// No object has this id.
    #[error("no object with id {0}")]
    ObjectNotFound(Uuid),
    /// No map, layer, object, tileset or tile owns this context.
    #[error("no attribute context with id {0}")]
    ContextNotFound(Uuid),
    /// Unknown property name.
    #[error("no property named '{0}'")]
    PropertyNotFound(String),
    /// Property names are unique within a context.
    #[error("a property named '{0}' already exists")]
    DuplicateProperty(String),
    /// Unknown component definition.
    #[error("no component named '{0}'")]
    ComponentNotFound(String),
    /// Definition names are unique, and a context holds one instance of each.
    #[error("a component named '{0}' already exists")]
    DuplicateComponent(String),
    /// No attached tileset has this id.
    #[error("no tileset with id {0}")]
    TilesetNotFound(Uuid),
    /// An attribute of another type was expected.
    #[error("expected a {expected} attribute, found {actual}")]
    TypeMismatch {
        /// Type required by the operation.
        expected: AttributeType,
        /// Type that was found.
        actual: AttributeType,
    },
    /// Any other rejected input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The layer or object id counter reached `i32::MAX`.
    #[error("no {0} ids are left")]
    IdsExhausted(&'static str),
}

/// Reasons a map or tileset file could not be read.
///
/// These are expected at the "open file" boundary, every message names the file or
/// field at fault.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The file could not be read.
    #[error("could not read '{}': {source}", path.display())]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The file is not valid JSON for its schema.
    #[error("malformed JSON in '{}': {source}", path.display())]
    Json {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// The file is not valid YAML for its schema.
    #[error("malformed YAML in '{}': {source}", path.display())]
    Yaml {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_yaml::Error,
    },
    /// The file is not well-formed XML.
    #[error("malformed XML in '{}': {message}", path.display())]
    Xml {
        /// File being read.
        path: PathBuf,
        /// Reader diagnostic.
        message: String,
    },
    /// A required field or attribute is absent.
    #[error("'{}' is missing the required field '{field}'", path.display())]
    MissingField {
        /// File being read.
        path: PathBuf,
        /// Name of the field as written in the file.
        field: &'static str,
    },
    /// No format handles this file extension.
    #[error("unsupported map file type: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    /// Tile data encoding other than plain or base64.
    #[error("unsupported tile encoding '{0}'")]
    UnsupportedEncoding(String),
    /// Tile data compression other than zlib or zstd.
    #[error("unsupported tile compression '{0}'")]
    UnsupportedCompression(String),
    /// A non-orthogonal map.
    #[error("unsupported map orientation '{0}', only orthogonal maps can be opened")]
    UnsupportedOrientation(String),
    /// A map made of chunks rather than a fixed grid.
    #[error("infinite maps are not supported")]
    UnsupportedInfiniteMap,
    /// Image layers and other layer kinds the editor does not model.
    #[error("unsupported layer type '{0}'")]
    UnsupportedLayerType(String),
    /// Polygons, text and other object shapes the editor does not model.
    #[error("unsupported object type '{0}'")]
    UnsupportedObjectType(String),
    /// A property type name that maps to no attribute type.
    #[error("property '{name}' has unsupported type '{kind}'")]
    UnsupportedPropertyType {
        /// Property name.
        name: String,
        /// Type name as written in the file.
        kind: String,
    },
    /// A property value that does not fit its declared type.
    #[error("property '{name}' has an invalid {kind} value")]
    InvalidPropertyValue {
        /// Property name.
        name: String,
        /// Declared type.
        kind: AttributeType,
    },
    /// A layer or object id that leaves no room for the next one.
    #[error("{kind} id {id} is out of range")]
    IdOutOfRange {
        /// `"layer"` or `"object"`.
        kind: &'static str,
        /// Id as written in the file.
        id: i64,
    },
    /// A component instance whose definition is missing.
    #[error("component '{0}' is used but never defined")]
    UnknownComponent(String),
    /// A tileset reference points to a missing file.
    #[error("external tileset '{}' does not exist", .0.display())]
    ExternalTilesetNotFound(PathBuf),
    /// A tileset with an empty grid or a tile range outside 32 bits.
    #[error("tileset '{name}' is invalid: {reason}")]
    InvalidTileset {
        /// Tileset name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },
    /// Tile layer data that cannot be decoded into the layer's grid.
    #[error("tile data of layer '{layer}' is corrupt: {source}")]
    CorruptTileLayerData {
        /// Layer name.
        layer: String,
        /// Decoder error.
        #[source]
        source: CodecError,
    },
    /// The file parsed but describes an inconsistent map.
    #[error("map contents are inconsistent: {0}")]
    InvalidMap(#[from] MapError),
    /// Anything else.
    #[error("unexpected error: {0}")]
    Unknown(String),
}

/// Reasons a map could not be written. The destination is left untouched in every case.
#[derive(Debug, Error)]
pub enum WriteError {
    /// A file or directory could not be written.
    #[error("could not write '{}': {source}", path.display())]
    Io {
        /// Destination.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// JSON serialization failed.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    /// YAML serialization failed.
    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// XML serialization failed.
    #[error("XML serialization failed: {0}")]
    Xml(String),
    /// Tile data could not be encoded or compressed.
    #[error("could not encode tile data: {0}")]
    TileData(#[from] CodecError),
    /// The format cannot represent this map or destination.
    #[error("not supported: {0}")]
    NotSupported(String),
    /// No format handles this file extension.
    #[error("unsupported map file type: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    /// Saving a document that was never given a path.
    #[error("the document has no file path yet")]
    MissingPath,
    /// Anything else.
    #[error("unexpected error: {0}")]
    Unknown(String),
}
