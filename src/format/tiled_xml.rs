//! Tiled XML maps (`.tmx`) and tilesets (`.tsx`).
//!
//! Reading goes through a small element tree built from the quick-xml event stream,
//! which keeps the structural code free of reader state. Writing drives a
//! [`quick_xml::Writer`] directly.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::warn;

use crate::codec::{
    decode_tiles, encode_csv, encode_tiles, matrix_from_ids, parse_tile_id, CodecError,
    TileCompression, TileEncoding, TileFormat,
};
use crate::error::{ParseError, WriteError};
use crate::format::tiled_common::{
    self, check_orientation, check_tileset, exportable_properties, finish_tile_layer,
    image_reference, layer_extent, read_external_tileset, retain_valid_tiles, tile_format,
    tile_format_names, IdAllocator, TilesetFileNames, FORMAT_VERSION, TILED_VERSION,
};
use crate::format::{parent_dir, read_text, resolve_path, MapFormat, OutputFile, SaveOptions};
use crate::geom::{vec2, Size};
use crate::ir_map::{
    IrAnimationFrame, IrContext, IrLayer, IrLayerKind, IrMap, IrObject, IrTile, IrTileset,
};
use crate::object::ObjectType;
use crate::tile_matrix::{TileExtent, TileId, TileMatrix};

/// One element of a parsed document.
#[derive(Debug, Default)]
struct XmlNode {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<XmlNode>,
    text: String,
}

impl XmlNode {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn parse<T: FromStr>(&self, path: &Path, key: &str) -> Result<Option<T>, ParseError> {
        match self.attr(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse().map(Some).map_err(|_| ParseError::Xml {
                path: path.to_path_buf(),
                message: format!("attribute '{key}' of <{}> has invalid value '{raw}'", self.name),
            }),
        }
    }

    fn require<T: FromStr>(&self, path: &Path, key: &'static str) -> Result<T, ParseError> {
        self.parse(path, key)?.ok_or_else(|| ParseError::MissingField {
            path: path.to_path_buf(),
            field: key,
        })
    }

    /// Tiled writes `visible="0"` for hidden elements and leaves it out otherwise.
    fn flag(&self, key: &str, default: bool) -> bool {
        match self.attr(key) {
            Some(v) => v.trim() != "0" && v.trim() != "false",
            None => default,
        }
    }
}

fn read_document(path: &Path) -> Result<XmlNode, ParseError> {
    let text = read_text(path)?;
    parse_document(path, &text)
}

fn parse_document(path: &Path, text: &str) -> Result<XmlNode, ParseError> {
    let xml_err = |message: String| ParseError::Xml {
        path: path.to_path_buf(),
        message,
    };

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = vec![XmlNode::default()];
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => stack.push(element(&e).map_err(xml_err)?),
            Ok(Event::Empty(e)) => {
                let node = element(&e).map_err(xml_err)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|e| xml_err(e.to_string()))?;
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::End(_)) => {
                let node = stack.pop().ok_or_else(|| xml_err("unbalanced end tag".to_owned()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Err(xml_err("unbalanced end tag".to_owned())),
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(xml_err(format!(
                    "error at position {}: {e}",
                    reader.buffer_position()
                )))
            }
        }
        buf.clear();
    }

    if stack.len() != 1 {
        return Err(xml_err("unexpected end of document".to_owned()));
    }
    stack
        .pop()
        .and_then(|root| root.children.into_iter().next())
        .ok_or_else(|| xml_err("document has no root element".to_owned()))
}

fn element(e: &BytesStart) -> Result<XmlNode, String> {
    let mut node = XmlNode {
        name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        ..XmlNode::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
        node.attrs.push((key, value));
    }
    Ok(node)
}

/// Tiled's XML flavour.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiledXmlFormat;

impl MapFormat for TiledXmlFormat {
    fn name(&self) -> &'static str {
        "Tiled XML"
    }

    fn parse(&self, path: &Path) -> Result<IrMap, ParseError> {
        let root = read_document(path)?;
        if root.name != "map" {
            return Err(ParseError::Xml {
                path: path.to_path_buf(),
                message: format!("expected a <map> root element, found <{}>", root.name),
            });
        }
        read_map(path, &root)
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

        let mut out = XmlOut::new(options);
        out.declaration()?;
        let mut map_attrs = vec![
            ("version", FORMAT_VERSION.to_owned()),
            ("tiledversion", TILED_VERSION.to_owned()),
            ("orientation", "orthogonal".to_owned()),
            ("renderorder", "right-down".to_owned()),
            ("width", ir.extent.cols.to_string()),
            ("height", ir.extent.rows.to_string()),
            ("tilewidth", ir.tile_size.width.to_string()),
            ("tileheight", ir.tile_size.height.to_string()),
            ("infinite", "0".to_owned()),
            ("nextlayerid", ir.next_layer_id.to_string()),
            ("nextobjectid", ir.next_object_id.to_string()),
        ];
        if let Some(level) = compression_level(&ir.tile_format) {
            map_attrs.insert(8, ("compressionlevel", level.to_string()));
        }
        out.start("map", &map_attrs)?;
        out.properties(&ir.context, "map")?;

        for tileset in &ir.tilesets {
            let first = ("firstgid", tileset.first_tile.to_string());
            if options.embed_tilesets {
                out.tileset(tileset, &dir, Some(first))?;
            } else {
                let file_name = names.next(&tileset.name, "tsx");
                let mut tsx = XmlOut::new(options);
                tsx.declaration()?;
                tsx.tileset(tileset, &dir, None)?;
                files.push(OutputFile::new(dir.join(&file_name), tsx.finish()));
                out.empty("tileset", &[first, ("source", file_name)])?;
            }
        }

        for layer in &ir.layers {
            out.layer(layer, &ir.tile_format)?;
        }
        out.end("map")?;

        files.insert(0, OutputFile::new(path, out.finish()));
        Ok(files)
    }
}

fn compression_level(format: &TileFormat) -> Option<i64> {
    match format.effective_compression() {
        TileCompression::Zlib => format.zlib_level.map(i64::from),
        TileCompression::Zstd => format.zstd_level.map(i64::from),
        TileCompression::None => None,
    }
}

// Reading

struct MapReader<'a> {
    path: &'a Path,
    extent: TileExtent,
    ids: IdAllocator,
    tile_format: Option<TileFormat>,
}

fn read_map(path: &Path, root: &XmlNode) -> Result<IrMap, ParseError> {
    if root.flag("infinite", false) {
        return Err(ParseError::UnsupportedInfiniteMap);
    }
    check_orientation(root.attr("orientation").unwrap_or("orthogonal"))?;

    let width: usize = root.require(path, "width")?;
    let height: usize = root.require(path, "height")?;
    let tile_size = Size::new(
        root.require(path, "tilewidth")?,
        root.require(path, "tileheight")?,
    );
    let extent = TileExtent::new(height, width).validate()?;
    let dir = parent_dir(path);

    let mut reader = MapReader {
        path,
        extent,
        ids: IdAllocator::new(
            root.parse(path, "nextlayerid")?.unwrap_or(1),
            root.parse(path, "nextobjectid")?.unwrap_or(1),
        ),
        tile_format: None,
    };

    let mut ir = IrMap::new(extent, tile_size);
    for node in root.children_named("tileset") {
        let first: TileId = node.require(path, "firstgid")?;
        let tileset = match node.attr("source") {
            Some(source) => read_external_tileset(&dir, source, first, &mut reader.ids)?,
            None => read_tileset(path, &dir, first, node, &mut reader.ids)?,
        };
        ir.tilesets.push(tileset);
    }

    ir.layers = reader.layers(root)?;
    ir.context = read_properties(path, root)?;

    let mut format = reader.tile_format.unwrap_or_default();
    if let Some(level) = root.parse::<i32>(path, "compressionlevel")?.filter(|l| *l >= 0) {
        match format.compression {
            TileCompression::Zlib => format.zlib_level = Some(level as u32),
            TileCompression::Zstd => format.zstd_level = Some(level),
            TileCompression::None => {}
        }
    }
    ir.tile_format = format;
    ir.next_layer_id = reader.ids.next_layer();
    ir.next_object_id = reader.ids.next_object();
    Ok(ir)
}

impl MapReader<'_> {
    fn layers(&mut self, parent: &XmlNode) -> Result<Vec<IrLayer>, ParseError> {
        let mut layers = Vec::new();
        for node in &parent.children {
            if !matches!(node.name.as_str(), "layer" | "objectgroup" | "group" | "imagelayer") {
                continue;
            }
            let id = self.ids.layer(node.parse(self.path, "id")?.unwrap_or(0))?;
            let kind = match node.name.as_str() {
                "layer" => IrLayerKind::Tile(self.tiles(node)?),
                "objectgroup" => IrLayerKind::Object(read_objects(self.path, node, &mut self.ids)?),
                "group" => IrLayerKind::Group(self.layers(node)?),
                other => return Err(ParseError::UnsupportedLayerType(other.to_owned())),
            };
            layers.push(IrLayer {
                id,
                name: node.attr("name").unwrap_or_default().to_owned(),
                opacity: node.parse(self.path, "opacity")?.unwrap_or(1.0),
                visible: node.flag("visible", true),
                context: read_properties(self.path, node)?,
                kind,
            });
        }
        Ok(layers)
    }

    fn tiles(&mut self, node: &XmlNode) -> Result<TileMatrix, ParseError> {
        let name = node.attr("name").unwrap_or_default();
        let data = node.child("data").ok_or_else(|| ParseError::MissingField {
            path: self.path.to_path_buf(),
            field: "data",
        })?;

        let declared = layer_extent(
            node.parse(self.path, "width")?,
            node.parse(self.path, "height")?,
            self.extent,
        );
        let corrupt = |source: CodecError| ParseError::CorruptTileLayerData {
            layer: name.to_owned(),
            source,
        };

        let tiles = match data.attr("encoding") {
            // Oldest form, one <tile gid=".."/> element per cell.
            None => {
                let ids = data
                    .children_named("tile")
                    .map(|tile| parse_tile_id(tile.attr("gid").unwrap_or("0")))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(corrupt)?;
                self.tile_format.get_or_insert(TileFormat::plain());
                matrix_from_ids(&ids, declared).map_err(corrupt)?
            }
            Some(encoding) => {
                let format = tile_format(Some(encoding), data.attr("compression"))?;
                self.tile_format.get_or_insert(format);
                decode_tiles(&data.text, declared, &format).map_err(corrupt)?
            }
        };
        Ok(finish_tile_layer(name, tiles, self.extent))
    }
}

fn read_objects(
    path: &Path,
    group: &XmlNode,
    ids: &mut IdAllocator,
) -> Result<Vec<IrObject>, ParseError> {
    group
        .children_named("object")
        .map(|node| read_object(path, node, ids))
        .collect()
}

fn read_object(path: &Path, node: &XmlNode, ids: &mut IdAllocator) -> Result<IrObject, ParseError> {
    for shape in ["polygon", "polyline", "text"] {
        if node.child(shape).is_some() {
            return Err(ParseError::UnsupportedObjectType(shape.to_owned()));
        }
    }
    if node.attr("gid").is_some() {
        return Err(ParseError::UnsupportedObjectType("tile".to_owned()));
    }
    let id = node.parse(path, "id")?.unwrap_or(0);
    if node.parse::<f32>(path, "rotation")?.is_some_and(|r| r != 0.0) {
        warn!(object = id, "object rotation is not supported and was ignored");
    }

    let object_type = tiled_common::object_type(
        node.child("point").is_some(),
        node.child("ellipse").is_some(),
    );
    let mut object = IrObject::new(ids.object(id)?, object_type);
    object.position = vec2(
        node.parse(path, "x")?.unwrap_or(0.0),
        node.parse(path, "y")?.unwrap_or(0.0),
    );
    if object_type != ObjectType::Point {
        object.size = vec2(
            node.parse(path, "width")?.unwrap_or(0.0),
            node.parse(path, "height")?.unwrap_or(0.0),
        );
    }
    object.name = node.attr("name").unwrap_or_default().to_owned();
    object.tag = node
        .attr("class")
        .or_else(|| node.attr("type"))
        .unwrap_or_default()
        .to_owned();
    object.visible = node.flag("visible", true);
    object.context = read_properties(path, node)?;
    Ok(object)
}

fn read_properties(path: &Path, owner: &XmlNode) -> Result<IrContext, ParseError> {
    let mut context = IrContext::default();
    let Some(properties) = owner.child("properties") else {
        return Ok(context);
    };
    for prop in properties.children_named("property") {
        let name = prop.attr("name").ok_or_else(|| ParseError::MissingField {
            path: path.to_path_buf(),
            field: "name",
        })?;
        // Multi-line strings are stored as element text instead of an attribute.
        let text = prop.attr("value").unwrap_or(&prop.text);
        let value = tiled_common::property_from_text(name, prop.attr("type"), text)?;
        if context.properties.contains(name) {
            warn!(property = name, "duplicate property, keeping the first value");
            continue;
        }
        context.properties.add(name, value)?;
    }
    Ok(context)
}

/// Reads an external `.tsx` tileset.
pub(crate) fn read_tileset_file(
    path: &Path,
    first_tile: TileId,
    ids: &mut IdAllocator,
) -> Result<IrTileset, ParseError> {
    let root = read_document(path)?;
    if root.name != "tileset" {
        return Err(ParseError::Xml {
            path: path.to_path_buf(),
            message: format!("expected a <tileset> root element, found <{}>", root.name),
        });
    }
    read_tileset(path, &parent_dir(path), first_tile, &root, ids)
}

fn read_tileset(
    path: &Path,
    dir: &Path,
    first_tile: TileId,
    node: &XmlNode,
    ids: &mut IdAllocator,
) -> Result<IrTileset, ParseError> {
    let name = node.attr("name").unwrap_or_default().to_owned();
    let tile_size = Size::new(
        node.require(path, "tilewidth")?,
        node.require(path, "tileheight")?,
    );
    let tile_count: i32 = node.require(path, "tilecount")?;
    let column_count: i32 = node.require(path, "columns")?;
    check_tileset(&name, first_tile, tile_count, column_count, tile_size)?;

    let image = node.child("image").ok_or_else(|| ParseError::MissingField {
        path: path.to_path_buf(),
        field: "image",
    })?;
    let source: String = image.require(path, "source")?;
    let image_size = Size::new(image.require(path, "width")?, image.require(path, "height")?);
    if node.parse::<i32>(path, "margin")?.unwrap_or(0) != 0
        || node.parse::<i32>(path, "spacing")?.unwrap_or(0) != 0
    {
        warn!(tileset = %name, "tileset margin and spacing are not supported and were ignored");
    }

    let mut tiles = Vec::new();
    for tile in node.children_named("tile") {
        let frames = match tile.child("animation") {
            Some(animation) => animation
                .children_named("frame")
                .map(|frame| -> Result<IrAnimationFrame, ParseError> {
                    Ok(IrAnimationFrame {
                        tile: frame.require(path, "tileid")?,
                        duration_ms: frame.require(path, "duration")?,
                    })
                })
                .collect::<Result<_, _>>()?,
            None => Vec::new(),
        };
        let objects = match tile.child("objectgroup") {
            Some(group) => read_objects(path, group, ids)?,
            None => Vec::new(),
        };
        tiles.push(IrTile {
            index: tile.require(path, "id")?,
            frames,
            objects,
            context: read_properties(path, tile)?,
        });
    }
    retain_valid_tiles(&name, &mut tiles, tile_count);

    Ok(IrTileset {
        context: read_properties(path, node)?,
        name,
        first_tile,
        tile_size,
        column_count,
        tile_count,
        image_path: resolve_path(dir, &source),
        image_size,
        tiles,
    })
}

// Writing

struct XmlOut {
    writer: Writer<Vec<u8>>,
    fold: bool,
}

impl XmlOut {
    fn new(options: &SaveOptions) -> Self {
        let writer = if options.indent_output {
            Writer::new_with_indent(Vec::new(), b' ', 1)
        } else {
            Writer::new(Vec::new())
        };
        XmlOut {
            writer,
            fold: options.fold_tile_data,
        }
    }

    fn write(&mut self, event: Event<'_>) -> Result<(), WriteError> {
        self.writer
            .write_event(event)
            .map_err(|e| WriteError::Xml(e.to_string()))
    }

    fn declaration(&mut self) -> Result<(), WriteError> {
        self.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
    }

    fn open<'a>(name: &'a str, attrs: &'a [(&str, String)]) -> BytesStart<'a> {
        let mut start = BytesStart::new(name);
        for (key, value) in attrs {
            start.push_attribute((*key, value.as_str()));
        }
        start
    }

    fn start(&mut self, name: &str, attrs: &[(&str, String)]) -> Result<(), WriteError> {
        self.write(Event::Start(Self::open(name, attrs)))
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, String)]) -> Result<(), WriteError> {
        self.write(Event::Empty(Self::open(name, attrs)))
    }

    fn end(&mut self, name: &str) -> Result<(), WriteError> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn text(&mut self, text: &str) -> Result<(), WriteError> {
        self.write(Event::Text(BytesText::new(text)))
    }

    fn finish(self) -> Vec<u8> {
        let mut bytes = self.writer.into_inner();
        bytes.push(b'\n');
        bytes
    }

    fn properties(&mut self, context: &IrContext, owner: &str) -> Result<(), WriteError> {
        let properties = exportable_properties(context, owner);
        if properties.is_empty() {
            return Ok(());
        }
        self.start("properties", &[])?;
        for (name, kind, value) in properties {
            let mut attrs = vec![("name", name.to_owned())];
            if kind != "string" {
                attrs.push(("type", kind.to_owned()));
            }
            let text = tiled_common::property_text(value);
            if text.contains('\n') {
                self.start("property", &attrs)?;
                self.text(&text)?;
                self.end("property")?;
            } else {
                attrs.push(("value", text));
                self.empty("property", &attrs)?;
            }
        }
        self.end("properties")
    }

    fn tileset(
        &mut self,
        tileset: &IrTileset,
        dir: &Path,
        first: Option<(&'static str, String)>,
    ) -> Result<(), WriteError> {
        let mut attrs: Vec<(&str, String)> = first.into_iter().collect();
        if attrs.is_empty() {
            attrs.push(("version", FORMAT_VERSION.to_owned()));
            attrs.push(("tiledversion", TILED_VERSION.to_owned()));
        }
        attrs.extend([
            ("name", tileset.name.clone()),
            ("tilewidth", tileset.tile_size.width.to_string()),
            ("tileheight", tileset.tile_size.height.to_string()),
            ("tilecount", tileset.tile_count.to_string()),
            ("columns", tileset.column_count.to_string()),
        ]);
        self.start("tileset", &attrs)?;
        self.properties(&tileset.context, &tileset.name)?;
        self.empty(
            "image",
            &[
                ("source", image_reference(&tileset.image_path, dir)),
                ("width", tileset.image_size.width.to_string()),
                ("height", tileset.image_size.height.to_string()),
            ],
        )?;

        for tile in &tileset.tiles {
            self.start("tile", &[("id", tile.index.to_string())])?;
            self.properties(&tile.context, &tileset.name)?;
            if !tile.objects.is_empty() {
                self.start("objectgroup", &[("draworder", "index".to_owned())])?;
                for object in &tile.objects {
                    self.object(object)?;
                }
                self.end("objectgroup")?;
            }
            if !tile.frames.is_empty() {
                self.start("animation", &[])?;
                for frame in &tile.frames {
                    self.empty(
                        "frame",
                        &[
                            ("tileid", frame.tile.to_string()),
                            ("duration", frame.duration_ms.to_string()),
                        ],
                    )?;
                }
                self.end("animation")?;
            }
            self.end("tile")?;
        }
        self.end("tileset")
    }

    fn layer(&mut self, layer: &IrLayer, format: &TileFormat) -> Result<(), WriteError> {
        let mut attrs = vec![("id", layer.id.to_string()), ("name", layer.name.clone())];
        let element = match &layer.kind {
            IrLayerKind::Tile(tiles) => {
                attrs.push(("width", tiles.col_count().to_string()));
                attrs.push(("height", tiles.row_count().to_string()));
                "layer"
            }
            IrLayerKind::Object(_) => "objectgroup",
            IrLayerKind::Group(_) => "group",
        };
        if !layer.visible {
            attrs.push(("visible", "0".to_owned()));
        }
        if layer.opacity != 1.0 {
            attrs.push(("opacity", layer.opacity.to_string()));
        }

        self.start(element, &attrs)?;
        self.properties(&layer.context, &layer.name)?;
        match &layer.kind {
            IrLayerKind::Tile(tiles) => self.tile_data(tiles, format)?,
            IrLayerKind::Object(objects) => {
                for object in objects {
                    self.object(object)?;
                }
            }
            IrLayerKind::Group(children) => {
                for child in children {
                    self.layer(child, format)?;
                }
            }
        }
        self.end(element)
    }

    fn tile_data(&mut self, tiles: &TileMatrix, format: &TileFormat) -> Result<(), WriteError> {
        let (encoding, compression) = tile_format_names(format);
        let mut attrs = vec![("encoding", encoding.to_owned())];
        if let Some(compression) = compression {
            attrs.push(("compression", compression.to_owned()));
        }
        let text = match format.encoding {
            TileEncoding::Plain => format!("\n{}\n", encode_csv(tiles, self.fold)),
            TileEncoding::Base64 => encode_tiles(tiles, format)?,
        };
        self.start("data", &attrs)?;
        self.text(&text)?;
        self.end("data")
    }

    fn object(&mut self, object: &IrObject) -> Result<(), WriteError> {
        let mut attrs = vec![("id", object.id.to_string())];
        if !object.name.is_empty() {
            attrs.push(("name", object.name.clone()));
        }
        if !object.tag.is_empty() {
            attrs.push(("type", object.tag.clone()));
        }
        attrs.push(("x", object.position.x.to_string()));
        attrs.push(("y", object.position.y.to_string()));
        if object.object_type != ObjectType::Point {
            attrs.push(("width", object.size.x.to_string()));
            attrs.push(("height", object.size.y.to_string()));
        }
        if !object.visible {
            attrs.push(("visible", "0".to_owned()));
        }

        let shape = match object.object_type {
            ObjectType::Point => Some("point"),
            ObjectType::Ellipse => Some("ellipse"),
            ObjectType::Rect => None,
        };
        let properties = exportable_properties(&object.context, &object.name);
        if shape.is_none() && properties.is_empty() {
            return self.empty("object", &attrs);
        }
        self.start("object", &attrs)?;
        self.properties(&object.context, &object.name)?;
        if let Some(shape) = shape {
            self.empty(shape, &[])?;
        }
        self.end("object")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{Attribute, Color};
    use crate::tile_matrix::tile_pos;
    use pretty_assertions::assert_eq;
    use std::fs;

    const MAP: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<map version="1.10" tiledversion="1.10.2" orientation="orthogonal" renderorder="right-down" width="3" height="2" tilewidth="16" tileheight="16" infinite="0" nextlayerid="4" nextobjectid="3">
 <properties>
  <property name="title" value="Level &amp; One"/>
  <property name="notes">line one
line two</property>
  <property name="tint" type="color" value="#ff102030"/>
 </properties>
 <tileset firstgid="1" name="terrain" tilewidth="16" tileheight="16" tilecount="8" columns="4">
  <image source="terrain.png" width="64" height="32"/>
  <tile id="1">
   <properties><property name="solid" type="bool" value="true"/></properties>
   <animation><frame tileid="1" duration="120"/><frame tileid="2" duration="80"/></animation>
  </tile>
 </tileset>
 <layer id="1" name="ground" width="3" height="2">
  <data encoding="csv">
1,2,3,
4,2147483653,0
</data>
 </layer>
 <group id="2" name="decor" opacity="0.25">
  <objectgroup id="3" name="things" visible="0">
   <object id="1" name="spawn" type="player" x="8" y="4"><point/></object>
   <object id="2" name="pond" x="16" y="0" width="32" height="16"><ellipse/></object>
  </objectgroup>
 </group>
</map>
"##;

    fn fixture(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn parses_embedded_tilesets_layers_and_properties() {
        let dir = tempfile::tempdir().unwrap();
        let ir = TiledXmlFormat.parse(&fixture(dir.path(), "map.tmx", MAP)).unwrap();

        assert_eq!(ir.extent, TileExtent::new(2, 3));
        assert_eq!((ir.next_layer_id, ir.next_object_id), (4, 3));
        assert_eq!(
            ir.context.properties.get("title"),
            Some(&Attribute::String("Level & One".to_owned()))
        );
        assert_eq!(
            ir.context.properties.get("notes"),
            Some(&Attribute::String("line one\nline two".to_owned()))
        );
        assert_eq!(
            ir.context.properties.get("tint"),
            Some(&Attribute::Color(Color::rgba(0x10, 0x20, 0x30, 0xff)))
        );

        let ground = ir.find_layer("ground").unwrap();
        let IrLayerKind::Tile(tiles) = &ground.kind else { panic!("not a tile layer") };
        // 2147483653 is tile 5 with the horizontal flip bit set.
        assert_eq!(tiles.get(tile_pos(1, 1)), Some(5));
        assert_eq!(tiles.get(tile_pos(0, 2)), Some(3));

        let decor = ir.find_layer("decor").unwrap();
        assert_eq!(decor.opacity, 0.25);
        let things = ir.find_layer("things").unwrap();
        assert!(!things.visible);
        let IrLayerKind::Object(objects) = &things.kind else { panic!("not an object layer") };
        assert_eq!(objects[0].object_type, ObjectType::Point);
        assert_eq!(objects[0].tag, "player");
        assert_eq!(objects[1].object_type, ObjectType::Ellipse);
        assert_eq!(objects[1].size, vec2(32.0, 16.0));

        let tileset = &ir.tilesets[0];
        assert_eq!(tileset.image_path, dir.path().join("terrain.png"));
        assert_eq!(tileset.tiles[0].frames[1], IrAnimationFrame { tile: 2, duration_ms: 80 });
        assert_eq!(
            tileset.tiles[0].context.properties.get("solid"),
            Some(&Attribute::Bool(true))
        );
    }

    #[test]
    fn legacy_tile_elements_and_external_tilesets() {
        let dir = tempfile::tempdir().unwrap();
        fixture(
            dir.path(),
            "terrain.tsx",
            r#"<?xml version="1.0" encoding="UTF-8"?>
<tileset version="1.10" name="terrain" tilewidth="16" tileheight="16" tilecount="8" columns="4">
 <image source="img/terrain.png" width="64" height="32"/>
</tileset>"#,
        );
        let path = fixture(
            dir.path(),
            "map.tmx",
            r#"<map orientation="orthogonal" width="2" height="1" tilewidth="16" tileheight="16">
 <tileset firstgid="1" source="terrain.tsx"/>
 <layer name="ground" width="2" height="1">
  <data><tile gid="7"/><tile/></data>
 </layer>
</map>"#,
        );

        let ir = TiledXmlFormat.parse(&path).unwrap();
        assert_eq!(ir.tilesets[0].image_path, dir.path().join("img/terrain.png"));
        assert_eq!(ir.tilesets[0].last_tile(), 8);
        let IrLayerKind::Tile(tiles) = &ir.layers[0].kind else { panic!("not a tile layer") };
        assert_eq!(tiles.iter().collect::<Vec<_>>(), [7, 0]);
        assert_eq!(ir.layers[0].id, 1);
        assert_eq!(ir.next_layer_id, 2);
    }

    #[test]
    fn gzip_and_image_layers_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let gzip = MAP.replace(r#"<data encoding="csv">"#, r#"<data encoding="base64" compression="gzip">"#);
        let path = fixture(dir.path(), "gzip.tmx", &gzip);
        assert!(matches!(
            TiledXmlFormat.parse(&path),
            Err(ParseError::UnsupportedCompression(c)) if c == "gzip"
        ));

        let image = MAP.replace("</map>", r#"<imagelayer id="9" name="sky"/></map>"#);
        let path = fixture(dir.path(), "image.tmx", &image);
        assert!(matches!(
            TiledXmlFormat.parse(&path),
            Err(ParseError::UnsupportedLayerType(t)) if t == "imagelayer"
        ));
    }

    #[test]
    fn malformed_documents_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(dir.path(), "bad.tmx", "<map width=\"2\"><layer></map>");
        assert!(matches!(TiledXmlFormat.parse(&path), Err(ParseError::Xml { .. })));
    }

    #[test]
    fn huge_layer_extent_is_corrupt_data() {
        let dir = tempfile::tempdir().unwrap();
        let text = MAP.replace(
            r#"name="ground" width="3" height="2""#,
            r#"name="ground" width="4294967296" height="4294967296""#,
        );
        let path = fixture(dir.path(), "huge.tmx", &text);
        assert!(matches!(
            TiledXmlFormat.parse(&path),
            Err(ParseError::CorruptTileLayerData { layer, .. }) if layer == "ground"
        ));
    }

    #[test]
    fn ids_at_the_top_of_the_range_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let text = MAP.replace(r#"<object id="2" name="pond""#, r#"<object id="2147483647" name="pond""#);
        let path = fixture(dir.path(), "ids.tmx", &text);
        assert!(matches!(
            TiledXmlFormat.parse(&path),
            Err(ParseError::IdOutOfRange { kind: "object", id: 2147483647 })
        ));

        let text = MAP.replace(r#"<tileset firstgid="1""#, r#"<tileset firstgid="2147483641""#);
        let path = fixture(dir.path(), "gids.tmx", &text);
        assert!(matches!(TiledXmlFormat.parse(&path), Err(ParseError::InvalidTileset { .. })));
    }

    #[test]
    fn export_then_parse_gives_the_same_ir() {
        let dir = tempfile::tempdir().unwrap();
        let mut ir = TiledXmlFormat.parse(&fixture(dir.path(), "map.tmx", MAP)).unwrap();

        for format in [
            TileFormat::plain(),
            TileFormat::base64(TileCompression::None),
            TileFormat::base64(TileCompression::Zstd),
        ] {
            ir.tile_format = format;
            let out = dir.path().join("out/copy.tmx");
            TiledXmlFormat.save(&ir, &out, &SaveOptions::default()).unwrap();
            assert!(dir.path().join("out/terrain.tsx").is_file());
            assert_eq!(TiledXmlFormat.parse(&out).unwrap(), ir);
        }
    }

    #[test]
    fn embedded_export_folds_csv_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut ir = TiledXmlFormat.parse(&fixture(dir.path(), "map.tmx", MAP)).unwrap();
        ir.tile_format = TileFormat::plain();
        let options = SaveOptions {
            embed_tilesets: true,
            ..SaveOptions::default()
        };
        let files = TiledXmlFormat.export(&ir, &dir.path().join("embedded.tmx"), &options).unwrap();
        assert_eq!(files.len(), 1);
        let text = files[0].text().unwrap();
        assert!(text.contains("1,2,3,\n4,5,0"));
        assert!(text.contains(r#"<tileset firstgid="1" name="terrain""#));
    }
}
