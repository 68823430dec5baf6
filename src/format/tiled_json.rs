//! Tiled JSON maps (`.json`, `.tmj`) and tilesets (`.json`, `.tsj`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::attribute::{Attribute, AttributeType, Color, ObjectRef};
use crate::codec::{
    decode_tiles, encode_tiles, matrix_from_ids, CodecError, TileCompression, TileEncoding,
    TileFormat,
};
use crate::error::{ParseError, WriteError};
use crate::format::tiled_common::{
    self, check_orientation, check_tileset, exportable_properties, finish_tile_layer,
    image_reference, layer_extent, read_external_tileset, retain_valid_tiles, tile_format,
    tile_format_names, IdAllocator, TilesetFileNames, FORMAT_VERSION, TILED_VERSION,
};
use crate::format::{parent_dir, path_to_string, read_text, resolve_path, MapFormat, OutputFile, SaveOptions};
use crate::geom::{vec2, Size};
use crate::ir_map::{
    IrAnimationFrame, IrContext, IrLayer, IrLayerKind, IrMap, IrObject, IrTile, IrTileset,
};
use crate::object::ObjectType;
use crate::tile_matrix::{TileExtent, TileId, TileMatrix};

#[derive(Debug, Serialize, Deserialize)]
struct JsonMap {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tiledversion: Option<String>,
    #[serde(default = "orthogonal")]
    orientation: String,
    #[serde(default = "right_down")]
    renderorder: String,
    #[serde(default)]
    infinite: bool,
    width: Option<usize>,
    height: Option<usize>,
    tilewidth: Option<i32>,
    tileheight: Option<i32>,
    #[serde(default = "one_i32")]
    nextlayerid: i32,
    #[serde(default = "one_i32")]
    nextobjectid: i32,
    #[serde(default = "minus_one")]
    compressionlevel: i32,
    #[serde(default)]
    layers: Vec<JsonLayer>,
    #[serde(default)]
    tilesets: Vec<JsonTilesetEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<JsonProperty>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum JsonTileData {
    Ids(Vec<i64>),
    Encoded(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonLayer {
    #[serde(default)]
    id: i32,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default = "one")]
    opacity: f32,
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    width: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    height: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<JsonTileData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    draworder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    objects: Option<Vec<JsonObject>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    layers: Option<Vec<JsonLayer>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<JsonProperty>,
}

impl JsonLayer {
    fn new(id: i32, name: &str, kind: &str) -> Self {
        JsonLayer {
            id,
            name: name.to_owned(),
            kind: Some(kind.to_owned()),
            visible: true,
            opacity: 1.0,
            x: 0,
            y: 0,
            width: None,
            height: None,
            data: None,
            encoding: None,
            compression: None,
            draworder: None,
            objects: None,
            layers: None,
            properties: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonObject {
    #[serde(default)]
    id: i32,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default, skip_serializing)]
    class: String,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    width: f32,
    #[serde(default)]
    height: f32,
    #[serde(default)]
    rotation: f32,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    point: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    ellipse: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    polygon: Vec<JsonValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    polyline: Vec<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gid: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<JsonProperty>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonTilesetEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    firstgid: Option<TileId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(flatten)]
    tileset: JsonTileset,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonTileset {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tiledversion: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tilewidth: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tileheight: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tilecount: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    columns: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    imagewidth: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    imageheight: Option<i32>,
    #[serde(default, skip_serializing_if = "is_zero")]
    margin: i32,
    #[serde(default, skip_serializing_if = "is_zero")]
    spacing: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tiles: Vec<JsonTile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<JsonProperty>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonTile {
    id: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    animation: Vec<JsonFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    objectgroup: Option<JsonLayer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<JsonProperty>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonFrame {
    tileid: i32,
    duration: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonProperty {
    name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    value: JsonValue,
}

fn default_true() -> bool {
    true
}
fn one() -> f32 {
    1.0
}
fn one_i32() -> i32 {
    1
}
fn minus_one() -> i32 {
    -1
}
fn orthogonal() -> String {
    "orthogonal".to_owned()
}
fn right_down() -> String {
    "right-down".to_owned()
}
fn is_false(b: &bool) -> bool {
    !*b
}
fn is_zero(n: &i32) -> bool {
    *n == 0
}

/// Tiled's JSON flavour.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiledJsonFormat;

impl MapFormat for TiledJsonFormat {
    fn name(&self) -> &'static str {
        "Tiled JSON"
    }

    fn parse(&self, path: &Path) -> Result<IrMap, ParseError> {
        let text = read_text(path)?;
        let json: JsonMap = serde_json::from_str(&text).map_err(|source| ParseError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        read_map(path, json)
    }

    fn export(
        &self,
        ir: &IrMap,
        path: &Path,
        options: &SaveOptions,
    ) -> Result<Vec<OutputFile>, WriteError> {
        let dir = parent_dir(path);
        let mut files = Vec::new();
        let mut names = TilesetFileNames::default();

        let mut tilesets = Vec::with_capacity(ir.tilesets.len());
        for tileset in &ir.tilesets {
            if options.embed_tilesets {
                tilesets.push(JsonTilesetEntry {
                    firstgid: Some(tileset.first_tile),
                    source: None,
                    tileset: tileset_to_json(tileset, &dir),
                });
            } else {
                let file_name = names.next(&tileset.name, "tsj");
                let mut json = tileset_to_json(tileset, &dir);
                json.kind = Some("tileset".to_owned());
                json.version = Some(JsonValue::from(FORMAT_VERSION));
                json.tiledversion = Some(TILED_VERSION.to_owned());
                files.push(OutputFile::new(dir.join(&file_name), to_bytes(&json, options)?));
                tilesets.push(JsonTilesetEntry {
                    firstgid: Some(tileset.first_tile),
                    source: Some(file_name),
                    tileset: JsonTileset::default(),
                });
            }
        }

        let format = ir.tile_format;
        let json = JsonMap {
            kind: Some("map".to_owned()),
            version: Some(JsonValue::from(FORMAT_VERSION)),
            tiledversion: Some(TILED_VERSION.to_owned()),
            orientation: orthogonal(),
            renderorder: right_down(),
            infinite: false,
            width: Some(ir.extent.cols),
            height: Some(ir.extent.rows),
            tilewidth: Some(ir.tile_size.width),
            tileheight: Some(ir.tile_size.height),
            nextlayerid: ir.next_layer_id,
            nextobjectid: ir.next_object_id,
            compressionlevel: compression_level(&format),
            layers: ir
                .layers
                .iter()
                .map(|layer| layer_to_json(layer, &format))
                .collect::<Result<_, _>>()?,
            tilesets,
            properties: properties_to_json(&ir.context, "map"),
        };
        files.insert(0, OutputFile::new(path, to_bytes(&json, options)?));
        Ok(files)
    }
}

fn to_bytes<T: Serialize>(value: &T, options: &SaveOptions) -> Result<Vec<u8>, WriteError> {
    let bytes = if options.indent_output {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };
    Ok(bytes)
}

fn compression_level(format: &TileFormat) -> i32 {
    match format.effective_compression() {
        TileCompression::Zlib => format.zlib_level.map_or(-1, |l| l as i32),
        TileCompression::Zstd => format.zstd_level.unwrap_or(-1),
        TileCompression::None => -1,
    }
}

// Reading

fn missing(path: &Path, field: &'static str) -> ParseError {
    ParseError::MissingField {
        path: path.to_path_buf(),
        field,
    }
}

struct Reader<'a> {
    path: &'a Path,
    dir: PathBuf,
    extent: TileExtent,
    ids: IdAllocator,
    tile_format: Option<TileFormat>,
}

fn read_map(path: &Path, json: JsonMap) -> Result<IrMap, ParseError> {
    if json.infinite {
        return Err(ParseError::UnsupportedInfiniteMap);
    }
    check_orientation(&json.orientation)?;

    let width = json.width.ok_or_else(|| missing(path, "width"))?;
    let height = json.height.ok_or_else(|| missing(path, "height"))?;
    let tile_width = json.tilewidth.ok_or_else(|| missing(path, "tilewidth"))?;
    let tile_height = json.tileheight.ok_or_else(|| missing(path, "tileheight"))?;
    let extent = TileExtent::new(height, width).validate()?;

    let mut reader = Reader {
        path,
        dir: parent_dir(path),
        extent,
        ids: IdAllocator::new(json.nextlayerid, json.nextobjectid),
        tile_format: None,
    };

    let mut ir = IrMap::new(extent, Size::new(tile_width, tile_height));
    for entry in json.tilesets {
        let first = entry.firstgid.ok_or_else(|| missing(path, "firstgid"))?;
        let tileset = match &entry.source {
            Some(source) => read_external_tileset(&reader.dir, source, first, &mut reader.ids)?,
            None => tileset_from_json(path, &reader.dir, first, entry.tileset, &mut reader.ids)?,
        };
        ir.tilesets.push(tileset);
    }

    for layer in json.layers {
        ir.layers.push(reader.layer(layer)?);
    }
    ir.context = context_from_json(json.properties)?;

    let mut format = reader.tile_format.unwrap_or_default();
    if json.compressionlevel >= 0 {
        match format.compression {
            TileCompression::Zlib => format.zlib_level = Some(json.compressionlevel as u32),
            TileCompression::Zstd => format.zstd_level = Some(json.compressionlevel),
            TileCompression::None => {}
        }
    }
    ir.tile_format = format;
    ir.next_layer_id = reader.ids.next_layer();
    ir.next_object_id = reader.ids.next_object();
    Ok(ir)
}

impl Reader<'_> {
    fn layer(&mut self, json: JsonLayer) -> Result<IrLayer, ParseError> {
        let id = self.ids.layer(json.id)?;
        let kind = json.kind.as_deref().ok_or_else(|| missing(self.path, "type"))?;
        let kind = match kind {
            "tilelayer" => IrLayerKind::Tile(self.tiles(&json)?),
            "objectgroup" => IrLayerKind::Object(
                json.objects
                    .unwrap_or_default()
                    .into_iter()
                    .map(|o| object_from_json(o, &mut self.ids))
                    .collect::<Result<_, _>>()?,
            ),
            "group" => IrLayerKind::Group(
                json.layers
                    .unwrap_or_default()
                    .into_iter()
                    .map(|l| self.layer(l))
                    .collect::<Result<_, _>>()?,
            ),
            other => return Err(ParseError::UnsupportedLayerType(other.to_owned())),
        };
        Ok(IrLayer {
            id,
            name: json.name,
            opacity: json.opacity,
            visible: json.visible,
            context: context_from_json(json.properties)?,
            kind,
        })
    }

    fn tiles(&mut self, json: &JsonLayer) -> Result<TileMatrix, ParseError> {
        let format = tile_format(json.encoding.as_deref(), json.compression.as_deref())?;
        self.tile_format.get_or_insert(format);

        let declared = layer_extent(json.width, json.height, self.extent);
        let corrupt = |source: CodecError| ParseError::CorruptTileLayerData {
            layer: json.name.clone(),
            source,
        };
        let tiles = match &json.data {
            Some(JsonTileData::Ids(ids)) => {
                let ids = ids
                    .iter()
                    .map(|id| gid(*id))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(corrupt)?;
                matrix_from_ids(&ids, declared).map_err(corrupt)?
            }
            Some(JsonTileData::Encoded(text)) => {
                decode_tiles(text, declared, &format).map_err(corrupt)?
            }
            None => return Err(missing(self.path, "data")),
        };
        Ok(finish_tile_layer(&json.name, tiles, self.extent))
    }
}

/// Tiled gids are unsigned, with flip flags in the high bits.
fn gid(value: i64) -> Result<TileId, CodecError> {
    if value >= i64::from(i32::MIN) && value <= i64::from(u32::MAX) {
        Ok(value as u32 as TileId)
    } else {
        Err(CodecError::InvalidToken(value.to_string()))
    }
}

fn object_from_json(json: JsonObject, ids: &mut IdAllocator) -> Result<IrObject, ParseError> {
    if json.gid.is_some() || !json.polygon.is_empty() || !json.polyline.is_empty() {
        let kind = if json.gid.is_some() {
            "tile"
        } else if json.polygon.is_empty() {
            "polyline"
        } else {
            "polygon"
        };
        return Err(ParseError::UnsupportedObjectType(kind.to_owned()));
    }
    if json.rotation != 0.0 {
        warn!(object = json.id, "object rotation is not supported and was ignored");
    }
    let mut object = IrObject::new(
        ids.object(json.id)?,
        tiled_common::object_type(json.point, json.ellipse),
    );
    object.position = vec2(json.x, json.y);
    if object.object_type != ObjectType::Point {
        object.size = vec2(json.width, json.height);
    }
    object.name = json.name;
    object.tag = if json.class.is_empty() { json.kind } else { json.class };
    object.visible = json.visible;
    object.context = context_from_json(json.properties)?;
    Ok(object)
}

fn context_from_json(properties: Vec<JsonProperty>) -> Result<IrContext, ParseError> {
    let mut context = IrContext::default();
    for prop in properties {
        let value = property_from_json(&prop)?;
        if context.properties.contains(&prop.name) {
            warn!(property = %prop.name, "duplicate property, keeping the first value");
            continue;
        }
        let _ = context.properties.add(prop.name, value);
    }
    Ok(context)
}

fn property_from_json(prop: &JsonProperty) -> Result<Attribute, ParseError> {
    let ty = tiled_common::attribute_type(&prop.name, prop.kind.as_deref())?;
    let invalid = || ParseError::InvalidPropertyValue {
        name: prop.name.clone(),
        kind: ty,
    };
    let value = &prop.value;
    let attr = match ty {
        AttributeType::String => Attribute::String(value.as_str().ok_or_else(invalid)?.to_owned()),
        AttributeType::Int => Attribute::Int(
            value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(invalid)?,
        ),
        AttributeType::Float => Attribute::Float(value.as_f64().ok_or_else(invalid)? as f32),
        AttributeType::Bool => Attribute::Bool(value.as_bool().ok_or_else(invalid)?),
        AttributeType::Color => match value.as_str().ok_or_else(invalid)? {
            "" => Attribute::Color(Color::default()),
            hex => Attribute::Color(Color::from_argb_hex(hex).ok_or_else(invalid)?),
        },
        AttributeType::Path => Attribute::Path(PathBuf::from(value.as_str().ok_or_else(invalid)?)),
        AttributeType::Object => Attribute::Object(ObjectRef(
            value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(invalid)?,
        )),
        _ => return Err(invalid()),
    };
    Ok(attr)
}

/// Reads an external `.tsj`/`.json` tileset.
pub(crate) fn read_tileset_file(
    path: &Path,
    first_tile: TileId,
    ids: &mut IdAllocator,
) -> Result<IrTileset, ParseError> {
    let text = read_text(path)?;
    let json: JsonTileset = serde_json::from_str(&text).map_err(|source| ParseError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    tileset_from_json(path, &parent_dir(path), first_tile, json, ids)
}

fn tileset_from_json(
    path: &Path,
    dir: &Path,
    first_tile: TileId,
    json: JsonTileset,
    ids: &mut IdAllocator,
) -> Result<IrTileset, ParseError> {
    let tile_size = Size::new(
        json.tilewidth.ok_or_else(|| missing(path, "tilewidth"))?,
        json.tileheight.ok_or_else(|| missing(path, "tileheight"))?,
    );
    let tile_count = json.tilecount.ok_or_else(|| missing(path, "tilecount"))?;
    let column_count = json.columns.ok_or_else(|| missing(path, "columns"))?;
    check_tileset(&json.name, first_tile, tile_count, column_count, tile_size)?;
    let image = json.image.as_deref().ok_or_else(|| missing(path, "image"))?;
    let image_size = Size::new(
        json.imagewidth.ok_or_else(|| missing(path, "imagewidth"))?,
        json.imageheight.ok_or_else(|| missing(path, "imageheight"))?,
    );
    if json.margin != 0 || json.spacing != 0 {
        warn!(tileset = %json.name, "tileset margin and spacing are not supported and were ignored");
    }

    let mut tiles = Vec::with_capacity(json.tiles.len());
    for tile in json.tiles {
        tiles.push(IrTile {
            index: tile.id,
            frames: tile
                .animation
                .iter()
                .map(|f| IrAnimationFrame {
                    tile: f.tileid,
                    duration_ms: f.duration,
                })
                .collect(),
            objects: tile
                .objectgroup
                .and_then(|group| group.objects)
                .unwrap_or_default()
                .into_iter()
                .map(|o| object_from_json(o, ids))
                .collect::<Result<_, _>>()?,
            context: context_from_json(tile.properties)?,
        });
    }
    retain_valid_tiles(&json.name, &mut tiles, tile_count);

    Ok(IrTileset {
        name: json.name,
        first_tile,
        tile_size,
        column_count,
        tile_count,
        image_path: resolve_path(dir, image),
        image_size,
        tiles,
        context: context_from_json(json.properties)?,
    })
}

// Writing

fn layer_to_json(layer: &IrLayer, format: &TileFormat) -> Result<JsonLayer, WriteError> {
    let mut json = match &layer.kind {
        IrLayerKind::Tile(tiles) => {
            let mut json = JsonLayer::new(layer.id, &layer.name, "tilelayer");
            json.width = Some(tiles.col_count());
            json.height = Some(tiles.row_count());
            let (encoding, compression) = tile_format_names(format);
            json.data = Some(match format.encoding {
                TileEncoding::Plain => JsonTileData::Ids(tiles.iter().map(i64::from).collect()),
                TileEncoding::Base64 => JsonTileData::Encoded(encode_tiles(tiles, format)?),
            });
            json.encoding = Some(encoding.to_owned());
            json.compression = compression.map(str::to_owned);
            json
        }
        IrLayerKind::Object(objects) => {
            let mut json = JsonLayer::new(layer.id, &layer.name, "objectgroup");
            json.draworder = Some("topdown".to_owned());
            json.objects = Some(objects.iter().map(object_to_json).collect());
            json
        }
        IrLayerKind::Group(children) => {
            let mut json = JsonLayer::new(layer.id, &layer.name, "group");
            json.layers = Some(
                children
                    .iter()
                    .map(|child| layer_to_json(child, format))
                    .collect::<Result<_, _>>()?,
            );
            json
        }
    };
    json.visible = layer.visible;
    json.opacity = layer.opacity;
    json.properties = properties_to_json(&layer.context, &layer.name);
    Ok(json)
}

fn object_to_json(object: &IrObject) -> JsonObject {
    let (width, height) = match object.object_type {
        ObjectType::Point => (0.0, 0.0),
        _ => (object.size.x, object.size.y),
    };
    JsonObject {
        id: object.id,
        name: object.name.clone(),
        kind: object.tag.clone(),
        class: String::new(),
        x: object.position.x,
        y: object.position.y,
        width,
        height,
        rotation: 0.0,
        visible: object.visible,
        point: object.object_type == ObjectType::Point,
        ellipse: object.object_type == ObjectType::Ellipse,
        polygon: Vec::new(),
        polyline: Vec::new(),
        gid: None,
        properties: properties_to_json(&object.context, &object.name),
    }
}

fn properties_to_json(context: &IrContext, owner: &str) -> Vec<JsonProperty> {
    exportable_properties(context, owner)
        .into_iter()
        .map(|(name, kind, value)| JsonProperty {
            name: name.to_owned(),
            kind: Some(kind.to_owned()),
            value: property_to_json(value),
        })
        .collect()
}

fn property_to_json(value: &Attribute) -> JsonValue {
    match value {
        Attribute::String(s) => JsonValue::from(s.as_str()),
        Attribute::Int(i) => JsonValue::from(*i),
        Attribute::Float(f) => JsonValue::from(f64::from(*f)),
        Attribute::Bool(b) => JsonValue::from(*b),
        Attribute::Color(c) => JsonValue::from(c.to_argb_hex()),
        Attribute::Path(p) => JsonValue::from(path_to_string(p)),
        Attribute::Object(o) => JsonValue::from(o.0),
        other => JsonValue::from(tiled_common::property_text(other)),
    }
}

fn tileset_to_json(tileset: &IrTileset, dir: &Path) -> JsonTileset {
    JsonTileset {
        kind: None,
        version: None,
        tiledversion: None,
        name: tileset.name.clone(),
        tilewidth: Some(tileset.tile_size.width),
        tileheight: Some(tileset.tile_size.height),
        tilecount: Some(tileset.tile_count),
        columns: Some(tileset.column_count),
        image: Some(image_reference(&tileset.image_path, dir)),
        imagewidth: Some(tileset.image_size.width),
        imageheight: Some(tileset.image_size.height),
        margin: 0,
        spacing: 0,
        tiles: tileset
            .tiles
            .iter()
            .map(|tile| JsonTile {
                id: tile.index,
                animation: tile
                    .frames
                    .iter()
                    .map(|f| JsonFrame {
                        tileid: f.tile,
                        duration: f.duration_ms,
                    })
                    .collect(),
                objectgroup: (!tile.objects.is_empty()).then(|| {
                    let mut group = JsonLayer::new(0, "", "objectgroup");
                    group.draworder = Some("index".to_owned());
                    group.objects = Some(tile.objects.iter().map(object_to_json).collect());
                    group
                }),
                properties: properties_to_json(&tile.context, &tileset.name),
            })
            .collect(),
        properties: properties_to_json(&tileset.context, &tileset.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile_matrix::tile_pos;
    use pretty_assertions::assert_eq;
    use std::fs;

    const MAP: &str = r#"{
      "type": "map", "version": "1.10", "orientation": "orthogonal", "renderorder": "right-down",
      "width": 3, "height": 2, "tilewidth": 16, "tileheight": 16, "infinite": false,
      "nextlayerid": 4, "nextobjectid": 2,
      "properties": [{"name": "gravity", "type": "float", "value": 9.5}],
      "tilesets": [{"firstgid": 1, "source": "terrain.tsj"}],
      "layers": [
        {"id": 1, "name": "ground", "type": "tilelayer", "width": 3, "height": 2,
         "data": [1, 2, 0, 0, 4, 3], "opacity": 0.5, "visible": true, "x": 0, "y": 0},
        {"id": 2, "name": "group", "type": "group", "visible": false, "opacity": 1, "layers": [
          {"id": 3, "name": "things", "type": "objectgroup", "draworder": "topdown", "objects": [
            {"id": 1, "name": "spawn", "type": "player", "x": 4, "y": 8, "width": 0, "height": 0,
             "point": true, "visible": true,
             "properties": [{"name": "hp", "type": "int", "value": 10}]}
          ]}
        ]}
      ]
    }"#;

    const TILESET: &str = r#"{
      "type": "tileset", "name": "terrain", "tilewidth": 16, "tileheight": 16,
      "tilecount": 8, "columns": 4, "image": "images/terrain.png",
      "imagewidth": 64, "imageheight": 32,
      "tiles": [{"id": 2, "animation": [{"tileid": 2, "duration": 100}, {"tileid": 3, "duration": 100}]}]
    }"#;

    fn write_fixture(dir: &Path) -> PathBuf {
        fs::write(dir.join("terrain.tsj"), TILESET).unwrap();
        let path = dir.join("map.tmj");
        fs::write(&path, MAP).unwrap();
        path
    }

    #[test]
    fn parses_layers_objects_and_external_tilesets() {
        let dir = tempfile::tempdir().unwrap();
        let ir = TiledJsonFormat.parse(&write_fixture(dir.path())).unwrap();

        assert_eq!(ir.extent, TileExtent::new(2, 3));
        assert_eq!(ir.next_layer_id, 4);
        assert_eq!(ir.context.properties.get("gravity"), Some(&Attribute::Float(9.5)));

        let ground = ir.find_layer("ground").unwrap();
        assert_eq!(ground.opacity, 0.5);
        let IrLayerKind::Tile(tiles) = &ground.kind else { panic!("not a tile layer") };
        assert_eq!(tiles.get(tile_pos(1, 2)), Some(3));

        let things = ir.find_layer("things").unwrap();
        let IrLayerKind::Object(objects) = &things.kind else { panic!("not an object layer") };
        assert_eq!(objects[0].object_type, ObjectType::Point);
        assert_eq!(objects[0].tag, "player");
        assert_eq!(objects[0].context.properties.get("hp"), Some(&Attribute::Int(10)));

        let tileset = &ir.tilesets[0];
        assert_eq!((tileset.first_tile, tileset.tile_count, tileset.column_count), (1, 8, 4));
        assert_eq!(tileset.image_path, dir.path().join("images/terrain.png"));
        assert_eq!(tileset.tiles[0].frames.len(), 2);
    }

    #[test]
    fn missing_external_tileset_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");
        fs::write(&path, MAP).unwrap();
        assert!(matches!(
            TiledJsonFormat.parse(&path),
            Err(ParseError::ExternalTilesetNotFound(p)) if p.ends_with("terrain.tsj")
        ));
    }

    #[test]
    fn infinite_and_isometric_maps_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());

        fs::write(&path, MAP.replace(r#""infinite": false"#, r#""infinite": true"#)).unwrap();
        assert!(matches!(TiledJsonFormat.parse(&path), Err(ParseError::UnsupportedInfiniteMap)));

        fs::write(&path, MAP.replace("orthogonal", "isometric")).unwrap();
        assert!(matches!(
            TiledJsonFormat.parse(&path),
            Err(ParseError::UnsupportedOrientation(o)) if o == "isometric"
        ));
    }

    #[test]
    fn missing_size_names_the_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());
        fs::write(&path, MAP.replace(r#""width": 3, "height": 2, "tilewidth""#, r#""height": 2, "tilewidth""#))
            .unwrap();
        assert!(matches!(
            TiledJsonFormat.parse(&path),
            Err(ParseError::MissingField { field: "width", .. })
        ));
    }

    #[test]
    fn huge_layer_extent_is_corrupt_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());
        let huge = MAP.replace(
            r#""tilelayer", "width": 3, "height": 2"#,
            r#""tilelayer", "width": 4294967296, "height": 4294967296"#,
        );
        fs::write(&path, huge).unwrap();
        assert!(matches!(
            TiledJsonFormat.parse(&path),
            Err(ParseError::CorruptTileLayerData { layer, .. }) if layer == "ground"
        ));
    }

    #[test]
    fn largest_layer_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());
        let text = MAP.replace(r#"{"id": 1, "name": "ground""#, r#"{"id": 2147483647, "name": "ground""#);
        fs::write(&path, text).unwrap();
        assert!(matches!(
            TiledJsonFormat.parse(&path),
            Err(ParseError::IdOutOfRange { kind: "layer", id: 2147483647 })
        ));
    }

    #[test]
    fn tileset_range_past_the_id_space_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());
        fs::write(dir.path().join("terrain.tsj"), TILESET.replace(r#""tilecount": 8"#, r#""tilecount": 1000"#))
            .unwrap();
        fs::write(&path, MAP.replace(r#""firstgid": 1"#, r#""firstgid": 2147483000"#)).unwrap();
        assert!(matches!(
            TiledJsonFormat.parse(&path),
            Err(ParseError::InvalidTileset { name, .. }) if name == "terrain"
        ));
    }

    #[test]
    fn export_then_parse_gives_the_same_ir() {
        let dir = tempfile::tempdir().unwrap();
        let mut ir = TiledJsonFormat.parse(&write_fixture(dir.path())).unwrap();
        ir.tile_format = TileFormat::base64(TileCompression::Zlib);

        let out = dir.path().join("out/copy.tmj");
        TiledJsonFormat.save(&ir, &out, &SaveOptions::default()).unwrap();
        assert!(dir.path().join("out/terrain.tsj").is_file());

        let reread = TiledJsonFormat.parse(&out).unwrap();
        assert_eq!(reread, ir);
    }

    #[test]
    fn vector_properties_are_dropped_on_export() {
        let mut ir = IrMap::new(TileExtent::new(1, 1), Size::new(8, 8));
        ir.context.properties.add("v", Attribute::Int2([1, 2])).unwrap();
        ir.context.properties.add("n", Attribute::Int(1)).unwrap();
        let files = TiledJsonFormat
            .export(&ir, Path::new("m.json"), &SaveOptions::default())
            .unwrap();
        let text = files[0].text().unwrap();
        assert!(text.contains("\"n\""));
        assert!(!text.contains("\"v\""));
    }
}
