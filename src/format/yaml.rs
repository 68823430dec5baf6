//! Tactile YAML maps and tilesets.
//!
//! The native format. Unlike the Tiled formats it stores every attribute kind and
//! component, so a save/load cycle reproduces the IR exactly. Tilesets always live in
//! their own YAML files next to the map and are referenced by `path` and
//! `first-global-id`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use tracing::{debug, warn};

use crate::attribute::{Attribute, AttributeType, Color, ObjectRef};
use crate::codec::{
    decode_tiles, encode_tiles, matrix_from_ids, parse_tile_id, CodecError, TileCompression,
    TileEncoding, TileFormat,
};
use crate::context::PropertyMap;
use crate::error::{ParseError, WriteError};
use crate::format::tiled_common::{check_tileset, retain_valid_tiles, IdAllocator, TilesetFileNames};
use crate::format::{
    parent_dir, path_to_string, read_text, relative_path, resolve_external, resolve_path,
    MapFormat, OutputFile, SaveOptions,
};
use crate::geom::{vec2, Size};
use crate::ir_map::{
    IrAnimationFrame, IrComponent, IrComponentDefinition, IrContext, IrLayer, IrLayerKind, IrMap,
    IrObject, IrTile, IrTileset,
};
use crate::object::ObjectType;
use crate::tile_matrix::{TileExtent, TileId, TileMatrix};

const FORMAT_VERSION: i32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct YamlMap {
    #[serde(default = "format_version")]
    version: i32,
    row_count: Option<usize>,
    column_count: Option<usize>,
    tile_width: Option<i32>,
    tile_height: Option<i32>,
    #[serde(default = "one")]
    next_layer_id: i32,
    #[serde(default = "one")]
    next_object_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tile_format: Option<YamlTileFormat>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    component_definitions: Vec<YamlComponentDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tilesets: Vec<YamlTilesetRef>,
    #[serde(default)]
    layers: Vec<YamlLayer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<YamlProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    components: Vec<YamlComponent>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct YamlTileFormat {
    #[serde(default = "plain")]
    encoding: String,
    #[serde(default = "none")]
    compression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    zlib_compression_level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    zstd_compression_level: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct YamlComponentDefinition {
    name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    attributes: Vec<YamlProperty>,
}

/// A named, typed value. Component definitions use the same shape for their defaults.
#[derive(Debug, Serialize, Deserialize)]
struct YamlProperty {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<YamlValue>,
}

#[derive(Debug, Serialize, Deserialize)]
struct YamlComponent {
    #[serde(rename = "type")]
    definition: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    values: Vec<YamlComponentValue>,
}

#[derive(Debug, Serialize, Deserialize)]
struct YamlComponentValue {
    name: String,
    value: YamlValue,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct YamlTilesetRef {
    first_global_id: Option<TileId>,
    path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct YamlLayer {
    #[serde(default)]
    id: i32,
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default = "one_f32")]
    opacity: f32,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    objects: Vec<YamlObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    layers: Vec<YamlLayer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<YamlProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    components: Vec<YamlComponent>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct YamlObject {
    #[serde(default)]
    id: i32,
    #[serde(rename = "type", default = "rect")]
    kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    tag: String,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default, skip_serializing_if = "is_zero")]
    width: f32,
    #[serde(default, skip_serializing_if = "is_zero")]
    height: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<YamlProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    components: Vec<YamlComponent>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct YamlTileset {
    #[serde(default = "format_version")]
    version: i32,
    #[serde(default)]
    name: String,
    tile_width: Option<i32>,
    tile_height: Option<i32>,
    tile_count: Option<i32>,
    column_count: Option<i32>,
    image_path: Option<String>,
    image_width: Option<i32>,
    image_height: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tiles: Vec<YamlTile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<YamlProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    components: Vec<YamlComponent>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct YamlTile {
    id: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    animation: Vec<YamlFrame>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    objects: Vec<YamlObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<YamlProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    components: Vec<YamlComponent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct YamlFrame {
    tile: i32,
    duration: u64,
}

fn format_version() -> i32 {
    FORMAT_VERSION
}
fn one() -> i32 {
    1
}
fn one_f32() -> f32 {
    1.0
}
fn default_true() -> bool {
    true
}
fn plain() -> String {
    TileEncoding::Plain.name().to_owned()
}
fn none() -> String {
    TileCompression::None.name().to_owned()
}
fn rect() -> String {
    "rect".to_owned()
}
fn is_zero(v: &f32) -> bool {
    *v == 0.0
}

/// Tactile's own YAML format.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlFormat;

impl MapFormat for YamlFormat {
    fn name(&self) -> &'static str {
        "Tactile YAML"
    }

    fn parse(&self, path: &Path) -> Result<IrMap, ParseError> {
        let yaml: YamlMap = read_yaml(path)?;
        read_map(path, yaml)
    }

    fn export(
        &self,
        ir: &IrMap,
        path: &Path,
        _options: &SaveOptions,
    ) -> Result<Vec<OutputFile>, WriteError> {
        let dir = parent_dir(path);
        let mut files = Vec::new();
        let mut names = TilesetFileNames::default();

        let mut tilesets = Vec::with_capacity(ir.tilesets.len());
        for tileset in &ir.tilesets {
            let file_name = names.next(&tileset.name, "yaml");
            let yaml = tileset_to_yaml(tileset, &dir);
            files.push(OutputFile::new(dir.join(&file_name), serde_yaml::to_string(&yaml)?));
            tilesets.push(YamlTilesetRef {
                first_global_id: Some(tileset.first_tile),
                path: Some(file_name),
            });
        }

        let format = &ir.tile_format;
        let yaml = YamlMap {
            version: FORMAT_VERSION,
            row_count: Some(ir.extent.rows),
            column_count: Some(ir.extent.cols),
            tile_width: Some(ir.tile_size.width),
            tile_height: Some(ir.tile_size.height),
            next_layer_id: ir.next_layer_id,
            next_object_id: ir.next_object_id,
            tile_format: Some(YamlTileFormat {
                encoding: format.encoding.name().to_owned(),
                compression: format.effective_compression().name().to_owned(),
                zlib_compression_level: format.zlib_level,
                zstd_compression_level: format.zstd_level,
            }),
            component_definitions: ir
                .component_definitions
                .iter()
                .map(|def| YamlComponentDefinition {
                    name: def.name.clone(),
                    attributes: properties_to_yaml(&def.attributes),
                })
                .collect(),
            tilesets,
            layers: ir
                .layers
                .iter()
                .map(|layer| layer_to_yaml(layer, format))
                .collect::<Result<_, _>>()?,
            properties: properties_to_yaml(&ir.context.properties),
            components: components_to_yaml(&ir.context),
        };
        files.insert(0, OutputFile::new(path, serde_yaml::to_string(&yaml)?));
        Ok(files)
    }
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ParseError> {
    let text = read_text(path)?;
    serde_yaml::from_str(&text).map_err(|source| ParseError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

fn missing(path: &Path, field: &'static str) -> ParseError {
    ParseError::MissingField {
        path: path.to_path_buf(),
        field,
    }
}

// Reading

struct Reader<'a> {
    path: &'a Path,
    extent: TileExtent,
    format: TileFormat,
    definitions: &'a [IrComponentDefinition],
    ids: IdAllocator,
}

fn read_map(path: &Path, yaml: YamlMap) -> Result<IrMap, ParseError> {
    if yaml.version != FORMAT_VERSION {
        warn!(path = %path.display(), version = yaml.version, "unknown format version, reading anyway");
    }
    let rows = yaml.row_count.ok_or_else(|| missing(path, "row-count"))?;
    let cols = yaml.column_count.ok_or_else(|| missing(path, "column-count"))?;
    let tile_size = Size::new(
        yaml.tile_width.ok_or_else(|| missing(path, "tile-width"))?,
        yaml.tile_height.ok_or_else(|| missing(path, "tile-height"))?,
    );
    let extent = TileExtent::new(rows, cols).validate()?;

    let mut ir = IrMap::new(extent, tile_size);
    ir.tile_format = match yaml.tile_format {
        Some(format) => read_tile_format(format)?,
        None => TileFormat::default(),
    };
    ir.component_definitions = yaml
        .component_definitions
        .into_iter()
        .map(read_definition)
        .collect::<Result<_, _>>()?;

    let dir = parent_dir(path);
    let mut reader = Reader {
        path,
        extent,
        format: ir.tile_format,
        definitions: &ir.component_definitions,
        ids: IdAllocator::new(yaml.next_layer_id, yaml.next_object_id),
    };

    let mut tilesets = Vec::with_capacity(yaml.tilesets.len());
    for entry in yaml.tilesets {
        let first = entry
            .first_global_id
            .ok_or_else(|| missing(path, "first-global-id"))?;
        let source = entry.path.ok_or_else(|| missing(path, "path"))?;
        let file = resolve_external(&dir, &source)?;
        debug!(path = %file.display(), first, "reading external tileset");
        let yaml: YamlTileset = read_yaml(&file)?;
        tilesets.push(reader.tileset(&file, first, yaml)?);
    }

    let layers = yaml
        .layers
        .into_iter()
        .map(|layer| reader.layer(layer))
        .collect::<Result<Vec<_>, _>>()?;
    let context = reader.context(yaml.properties, yaml.components)?;
    let (next_layer, next_object) = (reader.ids.next_layer(), reader.ids.next_object());

    tilesets.sort_by_key(|t| t.first_tile);
    ir.tilesets = tilesets;
    ir.layers = layers;
    ir.context = context;
    ir.next_layer_id = next_layer;
    ir.next_object_id = next_object;
    Ok(ir)
}

fn read_tile_format(yaml: YamlTileFormat) -> Result<TileFormat, ParseError> {
    let encoding: TileEncoding = yaml
        .encoding
        .parse()
        .map_err(ParseError::UnsupportedEncoding)?;
    let compression: TileCompression = yaml
        .compression
        .parse()
        .map_err(ParseError::UnsupportedCompression)?;
    Ok(TileFormat {
        encoding,
        compression,
        zlib_level: yaml.zlib_compression_level,
        zstd_level: yaml.zstd_compression_level,
    })
}

fn read_definition(yaml: YamlComponentDefinition) -> Result<IrComponentDefinition, ParseError> {
    let mut attributes = PropertyMap::new();
    for attr in yaml.attributes {
        let value = read_property(&attr)?;
        attributes.add(attr.name, value)?;
    }
    Ok(IrComponentDefinition {
        name: yaml.name,
        attributes,
    })
}

fn read_property(yaml: &YamlProperty) -> Result<Attribute, ParseError> {
    let ty: AttributeType = yaml
        .kind
        .parse()
        .map_err(|kind| ParseError::UnsupportedPropertyType {
            name: yaml.name.clone(),
            kind,
        })?;
    match &yaml.value {
        Some(value) => attribute_from_yaml(&yaml.name, ty, value),
        None => Ok(Attribute::with_type(ty)),
    }
}

impl Reader<'_> {
    fn layer(&mut self, yaml: YamlLayer) -> Result<IrLayer, ParseError> {
        let id = self.ids.layer(yaml.id)?;
        let kind = match yaml.kind.as_deref() {
            Some("tile-layer") => IrLayerKind::Tile(self.tiles(&yaml)?),
            Some("object-layer") => IrLayerKind::Object(
                yaml.objects
                    .into_iter()
                    .map(|o| self.object(o))
                    .collect::<Result<_, _>>()?,
            ),
            Some("group-layer") => IrLayerKind::Group(
                yaml.layers
                    .into_iter()
                    .map(|l| self.layer(l))
                    .collect::<Result<_, _>>()?,
            ),
            Some(other) => return Err(ParseError::UnsupportedLayerType(other.to_owned())),
            None => return Err(missing(self.path, "type")),
        };
        Ok(IrLayer {
            id,
            name: yaml.name,
            opacity: yaml.opacity,
            visible: yaml.visible,
            context: self.context(yaml.properties, yaml.components)?,
            kind,
        })
    }

    fn tiles(&self, yaml: &YamlLayer) -> Result<TileMatrix, ParseError> {
        let data = yaml.data.as_deref().ok_or_else(|| missing(self.path, "data"))?;
        let corrupt = |source: CodecError| ParseError::CorruptTileLayerData {
            layer: yaml.name.clone(),
            source,
        };
        match self.format.encoding {
            TileEncoding::Plain => decode_rows(data, self.extent).map_err(corrupt),
            TileEncoding::Base64 => decode_tiles(data, self.extent, &self.format).map_err(corrupt),
        }
    }

    fn object(&mut self, yaml: YamlObject) -> Result<IrObject, ParseError> {
        let object_type = match yaml.kind.as_str() {
            "rect" => ObjectType::Rect,
            "ellipse" => ObjectType::Ellipse,
            "point" => ObjectType::Point,
            other => return Err(ParseError::UnsupportedObjectType(other.to_owned())),
        };
        let mut object = IrObject::new(self.ids.object(yaml.id)?, object_type);
        object.position = vec2(yaml.x, yaml.y);
        object.size = vec2(yaml.width, yaml.height);
        object.name = yaml.name;
        object.tag = yaml.tag;
        object.visible = yaml.visible;
        object.context = self.context(yaml.properties, yaml.components)?;
        Ok(object)
    }

    fn tileset(
        &mut self,
        path: &Path,
        first_tile: TileId,
        yaml: YamlTileset,
    ) -> Result<IrTileset, ParseError> {
        let tile_size = Size::new(
            yaml.tile_width.ok_or_else(|| missing(path, "tile-width"))?,
            yaml.tile_height.ok_or_else(|| missing(path, "tile-height"))?,
        );
        let tile_count = yaml.tile_count.ok_or_else(|| missing(path, "tile-count"))?;
        let column_count = yaml.column_count.ok_or_else(|| missing(path, "column-count"))?;
        check_tileset(&yaml.name, first_tile, tile_count, column_count, tile_size)?;
        let image = yaml.image_path.as_deref().ok_or_else(|| missing(path, "image-path"))?;
        let image_size = Size::new(
            yaml.image_width.ok_or_else(|| missing(path, "image-width"))?,
            yaml.image_height.ok_or_else(|| missing(path, "image-height"))?,
        );

        let mut tiles = Vec::with_capacity(yaml.tiles.len());
        for tile in yaml.tiles {
            tiles.push(IrTile {
                index: tile.id,
                frames: tile
                    .animation
                    .iter()
                    .map(|f| IrAnimationFrame {
                        tile: f.tile,
                        duration_ms: f.duration,
                    })
                    .collect(),
                objects: tile
                    .objects
                    .into_iter()
                    .map(|o| self.object(o))
                    .collect::<Result<_, _>>()?,
                context: self.context(tile.properties, tile.components)?,
            });
        }
        retain_valid_tiles(&yaml.name, &mut tiles, tile_count);

        Ok(IrTileset {
            first_tile,
            tile_size,
            column_count,
            tile_count,
            image_path: resolve_path(&parent_dir(path), image),
            image_size,
            tiles,
            context: self.context(yaml.properties, yaml.components)?,
            name: yaml.name,
        })
    }

    fn context(
        &self,
        properties: Vec<YamlProperty>,
        components: Vec<YamlComponent>,
    ) -> Result<IrContext, ParseError> {
        let mut context = IrContext::default();
        for prop in properties {
            let value = read_property(&prop)?;
            if context.properties.contains(&prop.name) {
                warn!(property = %prop.name, "duplicate property, keeping the first value");
                continue;
            }
            context.properties.add(prop.name, value)?;
        }

        for component in components {
            let definition = self
                .definitions
                .iter()
                .find(|d| d.name == component.definition)
                .ok_or_else(|| ParseError::UnknownComponent(component.definition.clone()))?;
            let mut values = definition.attributes.clone();
            for value in component.values {
                let Some(ty) = values.get(&value.name).map(Attribute::attr_type) else {
                    warn!(
                        component = %component.definition,
                        attribute = %value.name,
                        "value for an attribute the component does not define, ignoring it"
                    );
                    continue;
                };
                let parsed = attribute_from_yaml(&value.name, ty, &value.value)?;
                values.update(&value.name, parsed)?;
            }
            context.components.push(IrComponent {
                definition: component.definition,
                values,
            });
        }
        Ok(context)
    }
}

/// Plain tile data: one line per row, ids separated by spaces.
fn decode_rows(data: &str, extent: TileExtent) -> Result<TileMatrix, CodecError> {
    let ids = data
        .split(|c: char| c.is_ascii_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(parse_tile_id)
        .collect::<Result<Vec<_>, _>>()?;
    matrix_from_ids(&ids, extent)
}

fn encode_rows(tiles: &TileMatrix) -> String {
    tiles
        .rows()
        .map(|row| {
            row.iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn attribute_from_yaml(
    name: &str,
    ty: AttributeType,
    value: &YamlValue,
) -> Result<Attribute, ParseError> {
    let invalid = || ParseError::InvalidPropertyValue {
        name: name.to_owned(),
        kind: ty,
    };
    let int = |v: &YamlValue| v.as_i64().and_then(|i| i32::try_from(i).ok());
    let float = |v: &YamlValue| v.as_f64().map(|f| f as f32);
    let ints = |n: usize| -> Result<Vec<i32>, ParseError> {
        let seq = value.as_sequence().filter(|s| s.len() == n).ok_or_else(invalid)?;
        seq.iter().map(|v| int(v).ok_or_else(invalid)).collect()
    };
    let floats = |n: usize| -> Result<Vec<f32>, ParseError> {
        let seq = value.as_sequence().filter(|s| s.len() == n).ok_or_else(invalid)?;
        seq.iter().map(|v| float(v).ok_or_else(invalid)).collect()
    };

    let attr = match ty {
        AttributeType::String => Attribute::String(value.as_str().ok_or_else(invalid)?.to_owned()),
        AttributeType::Int => Attribute::Int(int(value).ok_or_else(invalid)?),
        AttributeType::Int2 => Attribute::Int2(ints(2)?.try_into().map_err(|_| invalid())?),
        AttributeType::Int3 => Attribute::Int3(ints(3)?.try_into().map_err(|_| invalid())?),
        AttributeType::Int4 => Attribute::Int4(ints(4)?.try_into().map_err(|_| invalid())?),
        AttributeType::Float => Attribute::Float(float(value).ok_or_else(invalid)?),
        AttributeType::Float2 => Attribute::Float2(floats(2)?.try_into().map_err(|_| invalid())?),
        AttributeType::Float3 => Attribute::Float3(floats(3)?.try_into().map_err(|_| invalid())?),
        AttributeType::Float4 => Attribute::Float4(floats(4)?.try_into().map_err(|_| invalid())?),
        AttributeType::Bool => Attribute::Bool(value.as_bool().ok_or_else(invalid)?),
        AttributeType::Color => Attribute::Color(
            value
                .as_str()
                .and_then(Color::from_rgba_hex)
                .ok_or_else(invalid)?,
        ),
        AttributeType::Path => Attribute::Path(PathBuf::from(value.as_str().ok_or_else(invalid)?)),
        AttributeType::Object => Attribute::Object(ObjectRef(int(value).ok_or_else(invalid)?)),
    };
    Ok(attr)
}

// Writing

fn attribute_to_yaml(value: &Attribute) -> YamlValue {
    fn seq<T: Copy + Into<YamlValue>>(values: &[T]) -> YamlValue {
        YamlValue::Sequence(values.iter().map(|v| (*v).into()).collect())
    }
    match value {
        Attribute::String(s) => YamlValue::from(s.as_str()),
        Attribute::Int(i) => YamlValue::from(*i),
        Attribute::Int2(v) => seq(v),
        Attribute::Int3(v) => seq(v),
        Attribute::Int4(v) => seq(v),
        Attribute::Float(f) => YamlValue::from(*f),
        Attribute::Float2(v) => seq(v),
        Attribute::Float3(v) => seq(v),
        Attribute::Float4(v) => seq(v),
        Attribute::Bool(b) => YamlValue::from(*b),
        Attribute::Color(c) => YamlValue::from(c.to_rgba_hex()),
        Attribute::Path(p) => YamlValue::from(path_to_string(p)),
        Attribute::Object(o) => YamlValue::from(o.0),
    }
}

fn properties_to_yaml(properties: &PropertyMap) -> Vec<YamlProperty> {
    properties
        .iter()
        .map(|(name, value)| YamlProperty {
            name: name.to_owned(),
            kind: value.attr_type().name().to_owned(),
            value: Some(attribute_to_yaml(value)),
        })
        .collect()
}

fn components_to_yaml(context: &IrContext) -> Vec<YamlComponent> {
    context
        .components
        .iter()
        .map(|component| YamlComponent {
            definition: component.definition.clone(),
            values: component
                .values
                .iter()
                .map(|(name, value)| YamlComponentValue {
                    name: name.to_owned(),
                    value: attribute_to_yaml(value),
                })
                .collect(),
        })
        .collect()
}

fn layer_to_yaml(layer: &IrLayer, format: &TileFormat) -> Result<YamlLayer, WriteError> {
    let mut yaml = YamlLayer {
        id: layer.id,
        name: layer.name.clone(),
        kind: None,
        opacity: layer.opacity,
        visible: layer.visible,
        data: None,
        objects: Vec::new(),
        layers: Vec::new(),
        properties: properties_to_yaml(&layer.context.properties),
        components: components_to_yaml(&layer.context),
    };
    let kind = match &layer.kind {
        IrLayerKind::Tile(tiles) => {
            yaml.data = Some(match format.encoding {
                TileEncoding::Plain => encode_rows(tiles),
                TileEncoding::Base64 => encode_tiles(tiles, format)?,
            });
            "tile-layer"
        }
        IrLayerKind::Object(objects) => {
            yaml.objects = objects.iter().map(object_to_yaml).collect();
            "object-layer"
        }
        IrLayerKind::Group(children) => {
            yaml.layers = children
                .iter()
                .map(|child| layer_to_yaml(child, format))
                .collect::<Result<_, _>>()?;
            "group-layer"
        }
    };
    yaml.kind = Some(kind.to_owned());
    Ok(yaml)
}

fn object_to_yaml(object: &IrObject) -> YamlObject {
    YamlObject {
        id: object.id,
        kind: match object.object_type {
            ObjectType::Rect => "rect",
            ObjectType::Ellipse => "ellipse",
            ObjectType::Point => "point",
        }
        .to_owned(),
        name: object.name.clone(),
        tag: object.tag.clone(),
        visible: object.visible,
        x: object.position.x,
        y: object.position.y,
        width: object.size.x,
        height: object.size.y,
        properties: properties_to_yaml(&object.context.properties),
        components: components_to_yaml(&object.context),
    }
}

fn tileset_to_yaml(tileset: &IrTileset, dir: &Path) -> YamlTileset {
    YamlTileset {
        version: FORMAT_VERSION,
        name: tileset.name.clone(),
        tile_width: Some(tileset.tile_size.width),
        tile_height: Some(tileset.tile_size.height),
        tile_count: Some(tileset.tile_count),
        column_count: Some(tileset.column_count),
        image_path: Some(path_to_string(&relative_path(&tileset.image_path, dir))),
        image_width: Some(tileset.image_size.width),
        image_height: Some(tileset.image_size.height),
        tiles: tileset
            .tiles
            .iter()
            .map(|tile| YamlTile {
                id: tile.index,
                animation: tile
                    .frames
                    .iter()
                    .map(|f| YamlFrame {
                        tile: f.tile,
                        duration: f.duration_ms,
                    })
                    .collect(),
                objects: tile.objects.iter().map(object_to_yaml).collect(),
                properties: properties_to_yaml(&tile.context.properties),
                components: components_to_yaml(&tile.context),
            })
            .collect(),
        properties: properties_to_yaml(&tileset.context.properties),
        components: components_to_yaml(&tileset.context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MapError;
    use crate::tile_matrix::tile_pos;
    use pretty_assertions::assert_eq;
    use std::fs;

    const MAP: &str = "\
version: 1
row-count: 3
column-count: 3
tile-width: 32
tile-height: 32
next-layer-id: 3
next-object-id: 2
tile-format:
  encoding: plain
  compression: none
component-definitions:
  - name: physics
    attributes:
      - name: mass
        type: float
        value: 1.5
      - name: offset
        type: float2
tilesets:
  - first-global-id: 1
    path: terrain.yaml
layers:
  - id: 1
    name: ground
    type: tile-layer
    data: |
      0 0 0
      0 7 0
      0 0 0
  - id: 2
    name: things
    type: object-layer
    opacity: 0.5
    objects:
      - id: 1
        type: ellipse
        name: pond
        x: 16
        y: 8
        width: 32
        height: 16
        components:
          - type: physics
            values:
              - name: mass
                value: 4.0
properties:
  - name: tint
    type: color
    value: '#10203040'
  - name: spawn
    type: int3
    value: [1, 2, 3]
";

    const TILESET: &str = "\
version: 1
name: terrain
tile-width: 32
tile-height: 32
tile-count: 4
column-count: 2
image-path: art/terrain.png
image-width: 64
image-height: 64
tiles:
  - id: 3
    animation:
      - tile: 3
        duration: 150
      - tile: 0
        duration: 150
";

    fn fixture(dir: &Path) -> PathBuf {
        fs::write(dir.join("terrain.yaml"), TILESET).unwrap();
        let path = dir.join("map.yaml");
        fs::write(&path, MAP).unwrap();
        path
    }

    #[test]
    fn parses_the_full_schema() {
        let dir = tempfile::tempdir().unwrap();
        let ir = YamlFormat.parse(&fixture(dir.path())).unwrap();

        assert_eq!(ir.extent, TileExtent::new(3, 3));
        assert_eq!(ir.tile_size, Size::new(32, 32));
        assert_eq!((ir.next_layer_id, ir.next_object_id), (3, 2));

        let IrLayerKind::Tile(tiles) = &ir.layers[0].kind else { panic!("not a tile layer") };
        assert_eq!(tiles.get(tile_pos(1, 1)), Some(7));
        assert_eq!(tiles.iter().filter(|id| *id != 0).count(), 1);

        let IrLayerKind::Object(objects) = &ir.layers[1].kind else { panic!("not an object layer") };
        let physics = &objects[0].context.components[0];
        assert_eq!(physics.values.get("mass"), Some(&Attribute::Float(4.0)));
        assert_eq!(physics.values.get("offset"), Some(&Attribute::Float2([0.0, 0.0])));

        assert_eq!(
            ir.context.properties.get("tint"),
            Some(&Attribute::Color(Color::rgba(0x10, 0x20, 0x30, 0x40)))
        );
        assert_eq!(ir.context.properties.get("spawn"), Some(&Attribute::Int3([1, 2, 3])));

        let tileset = &ir.tilesets[0];
        assert_eq!(tileset.image_path, dir.path().join("art/terrain.png"));
        assert_eq!(tileset.tiles[0].frames.len(), 2);
    }

    #[test]
    fn save_and_reload_reproduce_the_ir() {
        let dir = tempfile::tempdir().unwrap();
        let mut ir = YamlFormat.parse(&fixture(dir.path())).unwrap();

        for format in [TileFormat::plain(), TileFormat::base64(TileCompression::Zlib)] {
            ir.tile_format = format;
            let out = dir.path().join("saved/map.yaml");
            YamlFormat.save(&ir, &out, &SaveOptions::default()).unwrap();
            assert!(dir.path().join("saved/terrain.yaml").is_file());
            assert_eq!(YamlFormat.parse(&out).unwrap(), ir);
        }
    }

    #[test]
    fn unknown_component_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(dir.path());
        fs::write(&path, MAP.replace("- type: physics", "- type: health")).unwrap();
        assert!(matches!(
            YamlFormat.parse(&path),
            Err(ParseError::UnknownComponent(name)) if name == "health"
        ));
    }

    #[test]
    fn missing_fields_and_tilesets_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.yaml");
        fs::write(&path, MAP).unwrap();
        assert!(matches!(
            YamlFormat.parse(&path),
            Err(ParseError::ExternalTilesetNotFound(_))
        ));

        let path = fixture(dir.path());
        fs::write(&path, MAP.replace("row-count: 3\n", "")).unwrap();
        assert!(matches!(
            YamlFormat.parse(&path),
            Err(ParseError::MissingField { field: "row-count", .. })
        ));
    }

    #[test]
    fn short_tile_data_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(dir.path());
        fs::write(&path, MAP.replace("      0 0 0\n  - id: 2", "  - id: 2")).unwrap();
        assert!(matches!(
            YamlFormat.parse(&path),
            Err(ParseError::CorruptTileLayerData { layer, .. }) if layer == "ground"
        ));
    }

    #[test]
    fn values_at_the_top_of_their_range_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(dir.path());

        fs::write(&path, MAP.replace("  - id: 2\n", "  - id: 2147483647\n")).unwrap();
        assert!(matches!(
            YamlFormat.parse(&path),
            Err(ParseError::IdOutOfRange { kind: "layer", id: 2147483647 })
        ));

        fs::write(&path, MAP.replace("first-global-id: 1", "first-global-id: 2147483645")).unwrap();
        assert!(matches!(
            YamlFormat.parse(&path),
            Err(ParseError::InvalidTileset { name, .. }) if name == "terrain"
        ));

        let huge = MAP
            .replace("row-count: 3", "row-count: 4294967296")
            .replace("column-count: 3", "column-count: 4294967296");
        fs::write(&path, huge).unwrap();
        assert!(matches!(
            YamlFormat.parse(&path),
            Err(ParseError::InvalidMap(MapError::InvalidExtent { .. }))
        ));
    }

    #[test]
    fn wrong_property_value_names_the_property() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(dir.path());
        fs::write(&path, MAP.replace("value: [1, 2, 3]", "value: [1, 2]")).unwrap();
        assert!(matches!(
            YamlFormat.parse(&path),
            Err(ParseError::InvalidPropertyValue { name, kind: AttributeType::Int3 }) if name == "spawn"
        ));
    }
}
