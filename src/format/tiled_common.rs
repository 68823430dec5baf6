//! Pieces shared by the Tiled JSON and XML formats.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::attribute::{Attribute, AttributeType, Color, ObjectRef};
use crate::codec::{TileCompression, TileEncoding, TileFormat};
use crate::error::ParseError;
use crate::format::{path_to_string, relative_path, resolve_external, tiled_json, tiled_xml};
use crate::geom::Size;
use crate::ir_map::{IrContext, IrTile, IrTileset};
use crate::object::ObjectType;
use crate::tile_matrix::{tile_pos, TileExtent, TileId, TileMatrix};

pub(crate) const TILED_VERSION: &str = "1.10.2";
pub(crate) const FORMAT_VERSION: &str = "1.10";

/// Horizontal, vertical and diagonal flip bits of a Tiled gid.
const FLIP_FLAGS: u32 = 0xE000_0000;

/// Hands out layer and object ids, keeping the ids a file declares and numbering the
/// ones it leaves out.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IdAllocator {
    next_layer: i32,
    next_object: i32,
}

impl IdAllocator {
    pub(crate) fn new(next_layer: i32, next_object: i32) -> Self {
        IdAllocator {
            next_layer: next_layer.max(1),
            next_object: next_object.max(1),
        }
    }

    pub(crate) fn layer(&mut self, declared: i32) -> Result<i32, ParseError> {
        Self::take(&mut self.next_layer, declared, "layer")
    }

    pub(crate) fn object(&mut self, declared: i32) -> Result<i32, ParseError> {
        Self::take(&mut self.next_object, declared, "object")
    }

    pub(crate) fn next_layer(&self) -> i32 {
        self.next_layer
    }

    pub(crate) fn next_object(&self) -> i32 {
        self.next_object
    }

    /// The counter must stay representable, so `i32::MAX` itself is never handed out.
    fn take(next: &mut i32, declared: i32, kind: &'static str) -> Result<i32, ParseError> {
        let id = if declared > 0 { declared } else { *next };
        let after = id
            .checked_add(1)
            .ok_or(ParseError::IdOutOfRange { kind, id: i64::from(id) })?;
        *next = (*next).max(after);
        Ok(id)
    }
}

/// Reads an external tileset, `.tsx` files as XML and everything else as JSON.
pub(crate) fn read_external_tileset(
    dir: &Path,
    source: &str,
    first_tile: TileId,
    ids: &mut IdAllocator,
) -> Result<IrTileset, ParseError> {
    let path = resolve_external(dir, source)?;
    let is_xml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("tsx") || e.eq_ignore_ascii_case("xml"));
    debug!(path = %path.display(), first_tile, "reading external tileset");
    if is_xml {
        tiled_xml::read_tileset_file(&path, first_tile, ids)
    } else {
        tiled_json::read_tileset_file(&path, first_tile, ids)
    }
}

/// Checks the declared grid of a tileset and that its global ids fit in a [`TileId`].
pub(crate) fn check_tileset(
    name: &str,
    first_tile: TileId,
    tile_count: i32,
    column_count: i32,
    tile_size: Size,
) -> Result<(), ParseError> {
    let invalid = |reason: &str| ParseError::InvalidTileset {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };
    if !tile_size.is_positive() {
        return Err(invalid("tile size must be positive"));
    }
    if tile_count < 1 {
        return Err(invalid("it has no tiles"));
    }
    if column_count < 1 {
        return Err(invalid("it has no columns"));
    }
    if first_tile < 1 {
        return Err(invalid("its first tile id must be positive"));
    }
    if first_tile.checked_add(tile_count).is_none() {
        return Err(invalid("its tile ids do not fit in 32 bits"));
    }
    Ok(())
}

/// Keeps per-tile metadata only for tiles inside the declared grid.
pub(crate) fn retain_valid_tiles(name: &str, tiles: &mut Vec<IrTile>, tile_count: i32) {
    let before = tiles.len();
    tiles.retain(|t| t.index >= 0 && t.index < tile_count);
    if tiles.len() != before {
        warn!(tileset = name, dropped = before - tiles.len(), "metadata for tiles outside the tileset was dropped");
    }
    tiles.sort_by_key(|t| t.index);
}

/// Picks unique external tileset file names for one export.
#[derive(Debug, Default)]
pub(crate) struct TilesetFileNames {
    used: Vec<String>,
}

impl TilesetFileNames {
    pub(crate) fn next(&mut self, name: &str, extension: &str) -> String {
        let mut file = tileset_file_name(name, extension);
        let mut n = 2;
        while self.used.contains(&file) {
            file = tileset_file_name(&format!("{name}_{n}"), extension);
            n += 1;
        }
        self.used.push(file.clone());
        file
    }
}

pub(crate) fn check_orientation(orientation: &str) -> Result<(), ParseError> {
    if orientation == "orthogonal" {
        Ok(())
    } else {
        Err(ParseError::UnsupportedOrientation(orientation.to_owned()))
    }
}

/// Reads the `encoding`/`compression` pair of a tile layer.
pub(crate) fn tile_format(
    encoding: Option<&str>,
    compression: Option<&str>,
) -> Result<TileFormat, ParseError> {
    let encoding = match encoding.unwrap_or("csv") {
        "csv" => TileEncoding::Plain,
        "base64" => TileEncoding::Base64,
        other => return Err(ParseError::UnsupportedEncoding(other.to_owned())),
    };
    let compression = match compression.unwrap_or("") {
        "" => TileCompression::None,
        "zlib" => TileCompression::Zlib,
        "zstd" => TileCompression::Zstd,
        other => return Err(ParseError::UnsupportedCompression(other.to_owned())),
    };
    Ok(TileFormat {
        encoding,
        compression,
        ..TileFormat::default()
    })
}

/// `encoding` and `compression` attribute values for writing.
pub(crate) fn tile_format_names(format: &TileFormat) -> (&'static str, Option<&'static str>) {
    match format.encoding {
        TileEncoding::Plain => ("csv", None),
        TileEncoding::Base64 => match format.compression {
            TileCompression::None => ("base64", None),
            TileCompression::Zlib => ("base64", Some("zlib")),
            TileCompression::Zstd => ("base64", Some("zstd")),
        },
    }
}

/// Clears flip flags and fits a decoded layer to the map's extent.
pub(crate) fn finish_tile_layer(layer: &str, mut tiles: TileMatrix, map: TileExtent) -> TileMatrix {
    let mut flipped = 0;
    for row in 0..tiles.row_count() {
        for col in 0..tiles.col_count() {
            let pos = tile_pos(row as i32, col as i32);
            if let Some(id) = tiles.get(pos) {
                let raw = id as u32;
                if raw & FLIP_FLAGS != 0 {
                    flipped += 1;
                    let _ = tiles.set(pos, (raw & !FLIP_FLAGS) as i32);
                }
            }
        }
    }
    if flipped > 0 {
        warn!(layer, flipped, "tile flip flags are not supported and were cleared");
    }

    if tiles.extent() != map {
        warn!(
            layer,
            declared_rows = tiles.row_count(),
            declared_cols = tiles.col_count(),
            map_rows = map.rows,
            map_cols = map.cols,
            "tile layer size differs from the map, using the map size"
        );
        tiles.resize(map);
    }
    tiles
}

/// Declared layer size, falling back to the map size when absent.
pub(crate) fn layer_extent(width: Option<usize>, height: Option<usize>, map: TileExtent) -> TileExtent {
    TileExtent::new(height.unwrap_or(map.rows), width.unwrap_or(map.cols))
}

pub(crate) fn object_type(point: bool, ellipse: bool) -> ObjectType {
    if point {
        ObjectType::Point
    } else if ellipse {
        ObjectType::Ellipse
    } else {
        ObjectType::Rect
    }
}

/// The Tiled property type name for an attribute, `None` for kinds Tiled lacks.
pub(crate) fn property_type(attr: &Attribute) -> Option<&'static str> {
    match attr.attr_type() {
        AttributeType::String => Some("string"),
        AttributeType::Int => Some("int"),
        AttributeType::Float => Some("float"),
        AttributeType::Bool => Some("bool"),
        AttributeType::Color => Some("color"),
        AttributeType::Path => Some("file"),
        AttributeType::Object => Some("object"),
        _ => None,
    }
}

/// Properties of a context that can be written to a Tiled file. Everything else is
/// reported and skipped.
pub(crate) fn exportable_properties<'a>(
    context: &'a IrContext,
    owner: &str,
) -> Vec<(&'a str, &'static str, &'a Attribute)> {
    if !context.components.is_empty() {
        warn!(
            owner,
            count = context.components.len(),
            "components cannot be stored in Tiled maps and were dropped"
        );
    }
    context
        .properties
        .iter()
        .filter_map(|(name, value)| match property_type(value) {
            Some(kind) => Some((name, kind, value)),
            None => {
                warn!(owner, property = name, kind = %value.attr_type(), "vector properties cannot be stored in Tiled maps and were dropped");
                None
            }
        })
        .collect()
}

/// Text form of a property value as used by Tiled XML attributes.
pub(crate) fn property_text(attr: &Attribute) -> String {
    match attr {
        Attribute::String(s) => s.clone(),
        Attribute::Int(i) => i.to_string(),
        Attribute::Float(f) => f.to_string(),
        Attribute::Bool(b) => b.to_string(),
        Attribute::Color(c) => c.to_argb_hex(),
        Attribute::Path(p) => path_to_string(p),
        Attribute::Object(o) => o.0.to_string(),
        other => format!("{other:?}"),
    }
}

/// Parses a Tiled property given as text. A missing type means string.
pub(crate) fn property_from_text(
    name: &str,
    kind: Option<&str>,
    text: &str,
) -> Result<Attribute, ParseError> {
    let ty = attribute_type(name, kind)?;
    let invalid = || ParseError::InvalidPropertyValue {
        name: name.to_owned(),
        kind: ty,
    };
    Ok(match ty {
        AttributeType::String => Attribute::String(text.to_owned()),
        AttributeType::Int => Attribute::Int(text.trim().parse().map_err(|_| invalid())?),
        AttributeType::Float => Attribute::Float(text.trim().parse().map_err(|_| invalid())?),
        AttributeType::Bool => match text.trim() {
            "true" | "1" => Attribute::Bool(true),
            "false" | "0" => Attribute::Bool(false),
            _ => return Err(invalid()),
        },
        AttributeType::Color if text.is_empty() => Attribute::Color(Color::default()),
        AttributeType::Color => Attribute::Color(Color::from_argb_hex(text).ok_or_else(invalid)?),
        AttributeType::Path => Attribute::Path(PathBuf::from(text)),
        AttributeType::Object => {
            Attribute::Object(ObjectRef(text.trim().parse().map_err(|_| invalid())?))
        }
        _ => return Err(invalid()),
    })
}

/// Maps a Tiled property type name onto an attribute type.
pub(crate) fn attribute_type(name: &str, kind: Option<&str>) -> Result<AttributeType, ParseError> {
    match kind.unwrap_or("string") {
        "string" => Ok(AttributeType::String),
        "int" => Ok(AttributeType::Int),
        "float" => Ok(AttributeType::Float),
        "bool" => Ok(AttributeType::Bool),
        "color" => Ok(AttributeType::Color),
        "file" => Ok(AttributeType::Path),
        "object" => Ok(AttributeType::Object),
        other => Err(ParseError::UnsupportedPropertyType {
            name: name.to_owned(),
            kind: other.to_owned(),
        }),
    }
}

/// Image path as written into a tileset stored at `dir`.
pub(crate) fn image_reference(image: &Path, dir: &Path) -> String {
    path_to_string(&relative_path(image, dir))
}

/// File name used for an external tileset written next to the map.
pub(crate) fn tileset_file_name(name: &str, extension: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = if stem.is_empty() { "tileset".to_owned() } else { stem };
    format!("{stem}.{extension}")
}
