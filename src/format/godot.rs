//! Godot 3 scene export (`.tscn`, text scene format 2).
//!
//! Write only. The generated scene looks like:
//!
//! ```text
//! [gd_scene load_steps=4 format=2]
//!
//! [ext_resource path="res://terrain.png" type="Texture" id=1]
//!
//! [sub_resource type="TileSet" id=1]
//! 0/name = "terrain"
//! 0/texture = ExtResource( 1 )
//! 0/region = Rect2( 0, 0, 64, 32 )
//! 0/tile_mode = 2
//! ...
//!
//! [node name="level" type="Node2D"]
//!
//! [node name="ground" type="TileMap" parent="."]
//! tile_set = SubResource( 1 )
//! cell_size = Vector2( 16, 16 )
//! format = 1
//! tile_data = PoolIntArray( 65537, 0, 1 )
//! ```
//!
//! Every tileset becomes one atlas tile of the `TileSet`. Animated tiles get an
//! `AnimatedTexture` over per-frame `AtlasTexture`s and their own single tile.
//! Rectangles become `Area2D` nodes with a `RectangleShape2D`, ellipses an `Area2D`
//! with a polygon approximation, points `Position2D` nodes.

use std::collections::{HashMap, HashSet};
use std::f32::consts::TAU;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::attribute::Attribute;
use crate::error::{ParseError, WriteError};
use crate::format::{parent_dir, path_to_string, relative_path, MapFormat, OutputFile, SaveOptions};
use crate::geom::{vec2, Vec2};
use crate::ir_map::{IrAnimationFrame, IrContext, IrLayer, IrLayerKind, IrMap, IrObject, IrTileset};
use crate::object::ObjectType;
use crate::tile_matrix::{TileId, TileMatrix, EMPTY_TILE};

/// Godot's `TileSet::ATLAS_TILE`.
const ATLAS_TILE: i32 = 2;
/// Godot's `TileSet::SINGLE_TILE`.
const SINGLE_TILE: i32 = 0;
const ELLIPSE_POINTS: usize = 32;

/// Writes Godot 3 scenes.
#[derive(Debug, Clone, Copy, Default)]
pub struct GodotFormat;

impl MapFormat for GodotFormat {
    fn name(&self) -> &'static str {
        "Godot scene"
    }

    fn parse(&self, path: &Path) -> Result<IrMap, ParseError> {
        Err(ParseError::UnsupportedFormat(path.to_path_buf()))
    }

    fn export(
        &self,
        ir: &IrMap,
        path: &Path,
        options: &SaveOptions,
    ) -> Result<Vec<OutputFile>, WriteError> {
        match options.godot_version {
            3 => {}
            4 => return Err(WriteError::NotSupported("Godot 4 scenes".to_owned())),
            other => {
                return Err(WriteError::NotSupported(format!("Godot version {other}")))
            }
        }

        let scene_dir = parent_dir(path);
        let project_dir = options
            .godot_project_dir
            .clone()
            .unwrap_or_else(|| scene_dir.clone());

        let mut scene = Scene::default();
        let mut files = Vec::new();
        let textures = copy_textures(ir, &scene_dir, &project_dir, &mut scene, &mut files)?;
        let tiles = TileMapping::build(ir, &textures, &mut scene);

        let root = path
            .file_stem()
            .map(|s| node_name(&s.to_string_lossy()))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Map".to_owned());
        let mut body = vec![];
        if let Some(meta) = meta(&ir.context) {
            body.push(meta);
        }
        scene.nodes.push(Node {
            name: root,
            kind: "Node2D",
            parent: None,
            body,
        });

        let mut writer = SceneWriter {
            ir,
            tiles: &tiles,
            scene: &mut scene,
        };
        let mut names = UniqueNames::default();
        for layer in &ir.layers {
            writer.layer(layer, ".", &mut names);
        }

        debug!(
            ext_resources = scene.ext_resources.len(),
            sub_resources = scene.sub_resources.len(),
            nodes = scene.nodes.len(),
            "generated godot scene"
        );
        files.insert(0, OutputFile::new(path, scene.render()));
        Ok(files)
    }
}

// Resources

struct ExtResource {
    path: String,
    kind: &'static str,
    id: usize,
}

struct SubResource {
    kind: &'static str,
    id: usize,
    body: Vec<String>,
}

struct Node {
    name: String,
    kind: &'static str,
    /// `None` for the scene root.
    parent: Option<String>,
    body: Vec<String>,
}

/// Resource ids are scene-local and handed out in declaration order.
#[derive(Default)]
struct Scene {
    ext_resources: Vec<ExtResource>,
    sub_resources: Vec<SubResource>,
    nodes: Vec<Node>,
}

impl Scene {
    fn add_ext(&mut self, path: String, kind: &'static str) -> usize {
        let id = self.ext_resources.len() + 1;
        self.ext_resources.push(ExtResource { path, kind, id });
        id
    }

    fn add_sub(&mut self, kind: &'static str, body: Vec<String>) -> usize {
        let id = self.sub_resources.len() + 1;
        self.sub_resources.push(SubResource { kind, id, body });
        id
    }

    fn render(&self) -> String {
        let load_steps = self.ext_resources.len() + self.sub_resources.len() + 1;
        let mut out = format!("[gd_scene load_steps={load_steps} format=2]\n\n");

        for res in &self.ext_resources {
            let _ = writeln!(
                out,
                "[ext_resource path=\"{}\" type=\"{}\" id={}]",
                escape(&res.path),
                res.kind,
                res.id
            );
        }
        if !self.ext_resources.is_empty() {
            out.push('\n');
        }

        for res in &self.sub_resources {
            let _ = writeln!(out, "[sub_resource type=\"{}\" id={}]", res.kind, res.id);
            for line in &res.body {
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }

        for node in &self.nodes {
            match &node.parent {
                None => {
                    let _ = writeln!(out, "[node name=\"{}\" type=\"{}\"]", node.name, node.kind);
                }
                Some(parent) => {
                    let _ = writeln!(
                        out,
                        "[node name=\"{}\" type=\"{}\" parent=\"{}\"]",
                        node.name, node.kind, parent
                    );
                }
            }
            for line in &node.body {
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }

        // One trailing newline only.
        while out.ends_with("\n\n") {
            out.pop();
        }
        out
    }
}

/// Copies every tileset image into the project and declares it as a texture.
/// Returns the texture resource id of each tileset, by index.
fn copy_textures(
    ir: &IrMap,
    scene_dir: &Path,
    project_dir: &Path,
    scene: &mut Scene,
    files: &mut Vec<OutputFile>,
) -> Result<Vec<usize>, WriteError> {
    let mut by_source: HashMap<&Path, usize> = HashMap::new();
    let mut taken: HashSet<String> = HashSet::new();
    let mut ids = Vec::with_capacity(ir.tilesets.len());

    for tileset in &ir.tilesets {
        if let Some(id) = by_source.get(tileset.image_path.as_path()) {
            ids.push(*id);
            continue;
        }

        let bytes = fs::read(&tileset.image_path).map_err(|source| WriteError::Io {
            path: tileset.image_path.clone(),
            source,
        })?;
        let file_name = unique_file_name(&tileset.image_path, &mut taken);
        let target = scene_dir.join(&file_name);
        let res_path = res_path(&target, project_dir)?;
        debug!(image = %tileset.image_path.display(), target = %target.display(), "copying texture");
        files.push(OutputFile::new(target, bytes));

        let id = scene.add_ext(res_path, "Texture");
        by_source.insert(tileset.image_path.as_path(), id);
        ids.push(id);
    }
    Ok(ids)
}

fn unique_file_name(image: &Path, taken: &mut HashSet<String>) -> String {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "texture".to_owned());
    let ext = image
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut name = format!("{stem}{ext}");
    let mut n = 1;
    while !taken.insert(name.clone()) {
        n += 1;
        name = format!("{stem}_{n}{ext}");
    }
    name
}

fn res_path(target: &Path, project_dir: &Path) -> Result<String, WriteError> {
    let relative = relative_path(target, project_dir);
    if relative.is_absolute() || relative.starts_with("..") {
        return Err(WriteError::NotSupported(format!(
            "'{}' is outside of the Godot project '{}'",
            target.display(),
            project_dir.display()
        )));
    }
    Ok(format!("res://{}", path_to_string(&relative)))
}

// Tiles

/// Cell contents of a Godot tile map: tile id within the `TileSet` and the atlas
/// coordinate, packed as `(row << 16) | column`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GodotTile {
    id: i32,
    coord: i32,
}

struct TileMapping {
    tileset_resource: Option<usize>,
    /// Keyed by global tile id.
    animated: HashMap<TileId, i32>,
    /// `(first tile, last tile, columns, atlas tile id)` per tileset.
    ranges: Vec<(TileId, TileId, i32, i32)>,
}

impl TileMapping {
    fn build(ir: &IrMap, textures: &[usize], scene: &mut Scene) -> Self {
        let mut mapping = TileMapping {
            tileset_resource: None,
            animated: HashMap::new(),
            ranges: Vec::new(),
        };
        if ir.tilesets.is_empty() {
            return mapping;
        }

        let mut body = Vec::new();
        let mut next_id = ir.tilesets.len() as i32;
        for (index, (tileset, texture)) in ir.tilesets.iter().zip(textures).enumerate() {
            let atlas_id = index as i32;
            mapping
                .ranges
                .push((tileset.first_tile, tileset.last_tile(), tileset.column_count, atlas_id));
            atlas_tile(&mut body, atlas_id, tileset, *texture);

            for tile in tileset.tiles.iter().filter(|t| !t.frames.is_empty()) {
                let animation = animated_texture(scene, tileset, *texture, tile.index, &tile.frames);
                let id = next_id;
                next_id += 1;
                let size = tileset.tile_size;
                body.push(format!("{id}/name = \"{} {}\"", escape(&tileset.name), tile.index));
                body.push(format!("{id}/texture = SubResource( {animation} )"));
                body.push(format!("{id}/tex_offset = Vector2( 0, 0 )"));
                body.push(format!("{id}/modulate = Color( 1, 1, 1, 1 )"));
                body.push(format!("{id}/region = Rect2( 0, 0, {}, {} )", size.width, size.height));
                body.push(format!("{id}/tile_mode = {SINGLE_TILE}"));
                body.push(format!("{id}/shapes = [  ]"));
                body.push(format!("{id}/z_index = 0"));
                mapping
                    .animated
                    .insert(tileset.first_tile + tile.index, id);
            }
        }
        mapping.tileset_resource = Some(scene.add_sub("TileSet", body));
        mapping
    }

    fn get(&self, global: TileId) -> Option<GodotTile> {
        if let Some(id) = self.animated.get(&global) {
            return Some(GodotTile { id: *id, coord: 0 });
        }
        let (first, _, columns, atlas) = self
            .ranges
            .iter()
            .find(|(first, last, _, _)| (*first..=*last).contains(&global))?;
        let local = global - first;
        let columns = (*columns).max(1);
        let (row, col) = (local / columns, local % columns);
        Some(GodotTile {
            id: *atlas,
            coord: (row << 16) | col,
        })
    }
}

fn atlas_tile(body: &mut Vec<String>, id: i32, tileset: &IrTileset, texture: usize) {
    let (tw, th) = (tileset.tile_size.width, tileset.tile_size.height);
    let width = tileset.column_count * tw;
    let height = tileset.row_count() * th;
    body.push(format!("{id}/name = \"{}\"", escape(&tileset.name)));
    body.push(format!("{id}/texture = ExtResource( {texture} )"));
    body.push(format!("{id}/tex_offset = Vector2( 0, 0 )"));
    body.push(format!("{id}/modulate = Color( 1, 1, 1, 1 )"));
    body.push(format!("{id}/region = Rect2( 0, 0, {width}, {height} )"));
    body.push(format!("{id}/tile_mode = {ATLAS_TILE}"));
    body.push(format!("{id}/autotile/icon_coordinate = Vector2( 0, 0 )"));
    body.push(format!("{id}/autotile/tile_size = Vector2( {tw}, {th} )"));
    body.push(format!("{id}/autotile/spacing = 0"));
    body.push(format!("{id}/shapes = [  ]"));
    body.push(format!("{id}/z_index = 0"));
}

fn animated_texture(
    scene: &mut Scene,
    tileset: &IrTileset,
    texture: usize,
    tile: i32,
    frames: &[IrAnimationFrame],
) -> usize {
    let (tw, th) = (tileset.tile_size.width, tileset.tile_size.height);
    let columns = tileset.column_count.max(1);

    let mut body = vec![format!("frames = {}", frames.len())];
    for (i, frame) in frames.iter().enumerate() {
        let (row, col) = (frame.tile / columns, frame.tile % columns);
        let atlas = scene.add_sub(
            "AtlasTexture",
            vec![
                format!("atlas = ExtResource( {texture} )"),
                format!("region = Rect2( {}, {}, {tw}, {th} )", col * tw, row * th),
            ],
        );
        body.push(format!("frame_{i}/texture = SubResource( {atlas} )"));
        body.push(format!(
            "frame_{i}/delay_sec = {}",
            real(frame.duration_ms as f32 / 1000.0)
        ));
    }
    debug!(tileset = %tileset.name, tile, frames = frames.len(), "animated tile");
    scene.add_sub("AnimatedTexture", body)
}

// Nodes

struct SceneWriter<'a> {
    ir: &'a IrMap,
    tiles: &'a TileMapping,
    scene: &'a mut Scene,
}

impl SceneWriter<'_> {
    fn layer(&mut self, layer: &IrLayer, parent: &str, names: &mut UniqueNames) {
        let fallback = format!("Layer {}", layer.id);
        let name = names.claim(&layer.name, &fallback);
        let mut body = Vec::new();
        if !layer.visible {
            body.push("visible = false".to_owned());
        }
        if layer.opacity != 1.0 {
            body.push(format!("modulate = Color( 1, 1, 1, {} )", real(layer.opacity)));
        }

        let kind = match &layer.kind {
            IrLayerKind::Tile(tiles) => {
                if let Some(id) = self.tiles.tileset_resource {
                    body.push(format!("tile_set = SubResource( {id} )"));
                }
                let size = self.ir.tile_size;
                body.push(format!("cell_size = Vector2( {}, {} )", size.width, size.height));
                body.push("format = 1".to_owned());
                body.push(format!("tile_data = PoolIntArray( {} )", self.tile_data(&layer.name, tiles)));
                "TileMap"
            }
            IrLayerKind::Object(_) | IrLayerKind::Group(_) => "Node2D",
        };
        if let Some(meta) = meta(&layer.context) {
            body.push(meta);
        }
        self.scene.nodes.push(Node {
            name: name.clone(),
            kind,
            parent: Some(parent.to_owned()),
            body,
        });

        let path = child_path(parent, &name);
        let mut children = UniqueNames::default();
        match &layer.kind {
            IrLayerKind::Tile(_) => {}
            IrLayerKind::Object(objects) => {
                for object in objects {
                    self.object(object, &path, &mut children);
                }
            }
            IrLayerKind::Group(layers) => {
                for child in layers {
                    self.layer(child, &path, &mut children);
                }
            }
        }
    }

    fn tile_data(&self, layer: &str, tiles: &TileMatrix) -> String {
        let mut values = Vec::new();
        let mut unknown = 0;
        for (pos, id) in tiles.cells() {
            if id == EMPTY_TILE {
                continue;
            }
            match self.tiles.get(id) {
                Some(tile) => {
                    values.push(((pos.row << 16) | (pos.col & 0xFFFF)).to_string());
                    values.push(tile.id.to_string());
                    values.push(tile.coord.to_string());
                }
                None => unknown += 1,
            }
        }
        if unknown > 0 {
            warn!(layer, unknown, "tiles without a tileset were left out");
        }
        values.join(", ")
    }

    fn object(&mut self, object: &IrObject, parent: &str, names: &mut UniqueNames) {
        let fallback = format!("Object {}", object.id);
        let name = names.claim(&object.name, &fallback);
        let mut body = Vec::new();
        let kind = match object.object_type {
            ObjectType::Point => {
                body.push(format!("position = {}", vector(object.position)));
                "Position2D"
            }
            ObjectType::Rect | ObjectType::Ellipse => {
                let center = vec2(
                    object.position.x + object.size.x / 2.0,
                    object.position.y + object.size.y / 2.0,
                );
                body.push(format!("position = {}", vector(center)));
                "Area2D"
            }
        };
        if !object.visible {
            body.push("visible = false".to_owned());
        }
        let mut meta_entries = meta_entries(&object.context);
        if !object.tag.is_empty() {
            meta_entries.insert(0, format!("\"tag\": {}", string(&object.tag)));
        }
        if !meta_entries.is_empty() {
            body.push(format!("__meta__ = {{\n{}\n}}", meta_entries.join(",\n")));
        }
        self.scene.nodes.push(Node {
            name: name.clone(),
            kind,
            parent: Some(parent.to_owned()),
            body,
        });

        let path = child_path(parent, &name);
        let (rx, ry) = (object.size.x / 2.0, object.size.y / 2.0);
        match object.object_type {
            ObjectType::Point => {}
            ObjectType::Rect => {
                let shape = self.scene.add_sub(
                    "RectangleShape2D",
                    vec![format!("extents = {}", vector(vec2(rx, ry)))],
                );
                self.scene.nodes.push(Node {
                    name: "Shape".to_owned(),
                    kind: "CollisionShape2D",
                    parent: Some(path),
                    body: vec![format!("shape = SubResource( {shape} )")],
                });
            }
            ObjectType::Ellipse => {
                let points = (0..ELLIPSE_POINTS)
                    .flat_map(|i| {
                        let angle = TAU * i as f32 / ELLIPSE_POINTS as f32;
                        [real(rx * angle.cos()), real(ry * angle.sin())]
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                self.scene.nodes.push(Node {
                    name: "Shape".to_owned(),
                    kind: "CollisionPolygon2D",
                    parent: Some(path),
                    body: vec![format!("polygon = PoolVector2Array( {points} )")],
                });
            }
        }
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent == "." {
        name.to_owned()
    } else {
        format!("{parent}/{name}")
    }
}

/// Godot rejects duplicate sibling names.
#[derive(Default)]
struct UniqueNames {
    taken: HashSet<String>,
}

impl UniqueNames {
    fn claim(&mut self, name: &str, fallback: &str) -> String {
        let base = match node_name(name) {
            n if n.is_empty() => node_name(fallback),
            n => n,
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while !self.taken.insert(candidate.clone()) {
            n += 1;
            candidate = format!("{base}{n}");
        }
        candidate
    }
}

/// Strips the characters Godot does not allow in node names.
fn node_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '.' | ':' | '@' | '/' | '"' | '%' => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_owned()
}

// Values

fn meta(context: &IrContext) -> Option<String> {
    let entries = meta_entries(context);
    (!entries.is_empty()).then(|| format!("__meta__ = {{\n{}\n}}", entries.join(",\n")))
}

fn meta_entries(context: &IrContext) -> Vec<String> {
    let mut entries: Vec<String> = context
        .properties
        .iter()
        .map(|(name, value)| format!("{}: {}", string(name), variant(value)))
        .collect();
    for component in &context.components {
        let values: Vec<String> = component
            .values
            .iter()
            .map(|(name, value)| format!("{}: {}", string(name), variant(value)))
            .collect();
        entries.push(format!(
            "{}: {{\n{}\n}}",
            string(&component.definition),
            values.join(",\n")
        ));
    }
    entries
}

fn variant(value: &Attribute) -> String {
    match value {
        Attribute::String(s) => string(s),
        Attribute::Int(i) => i.to_string(),
        Attribute::Int2([x, y]) => format!("Vector2( {x}, {y} )"),
        Attribute::Int3([x, y, z]) => format!("Vector3( {x}, {y}, {z} )"),
        Attribute::Int4(v) => format!("[ {} ]", v.map(|i| i.to_string()).join(", ")),
        Attribute::Float(f) => real(*f),
        Attribute::Float2([x, y]) => format!("Vector2( {}, {} )", real(*x), real(*y)),
        Attribute::Float3([x, y, z]) => {
            format!("Vector3( {}, {}, {} )", real(*x), real(*y), real(*z))
        }
        Attribute::Float4(v) => format!("[ {} ]", v.map(real).join(", ")),
        Attribute::Bool(b) => b.to_string(),
        Attribute::Color(c) => {
            let [r, g, b, a] = c.to_normalized();
            format!("Color( {}, {}, {}, {} )", real(r), real(g), real(b), real(a))
        }
        Attribute::Path(p) => string(&path_to_string(p)),
        Attribute::Object(o) => o.0.to_string(),
    }
}

fn vector(v: Vec2) -> String {
    format!("Vector2( {}, {} )", real(v.x), real(v.y))
}

/// Godot prints whole reals without a fraction.
fn real(value: f32) -> String {
    if value == 0.0 {
        "0".to_owned()
    } else {
        value.to_string()
    }
}

fn string(s: &str) -> String {
    format!("\"{}\"", escape(s))
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Color;
    use crate::geom::Size;
    use crate::ir_map::IrTile;
    use crate::tile_matrix::{tile_pos, TileExtent};
    use pretty_assertions::assert_eq;

    fn sample(dir: &Path) -> IrMap {
        let image = dir.join("art/terrain.png");
        fs::create_dir_all(image.parent().unwrap()).unwrap();
        fs::write(&image, b"png bytes").unwrap();

        let mut ir = IrMap::new(TileExtent::new(2, 2), Size::new(16, 16));
        let mut tileset = IrTileset {
            name: "terrain".to_owned(),
            first_tile: 1,
            tile_size: Size::new(16, 16),
            column_count: 4,
            tile_count: 8,
            image_path: image,
            image_size: Size::new(64, 32),
            tiles: Vec::new(),
            context: IrContext::default(),
        };
        tileset.tiles.push(IrTile {
            index: 5,
            frames: vec![
                IrAnimationFrame { tile: 5, duration_ms: 100 },
                IrAnimationFrame { tile: 6, duration_ms: 250 },
            ],
            ..IrTile::default()
        });
        ir.tilesets.push(tileset);

        let mut tiles = TileMatrix::new(ir.extent);
        tiles.set(tile_pos(0, 1), 2).unwrap();
        tiles.set(tile_pos(1, 0), 6).unwrap();
        tiles.set(tile_pos(1, 1), 7).unwrap();
        let mut ground = IrLayer {
            id: 1,
            name: "ground".to_owned(),
            opacity: 0.5,
            visible: true,
            context: IrContext::default(),
            kind: IrLayerKind::Tile(tiles),
        };
        ground.context.properties.add("depth", Attribute::Int(3)).unwrap();

        let mut rect = IrObject::new(1, ObjectType::Rect);
        rect.name = "door".to_owned();
        rect.position = vec2(10.0, 20.0);
        rect.size = vec2(30.0, 40.0);
        let mut ellipse = IrObject::new(2, ObjectType::Ellipse);
        ellipse.size = vec2(8.0, 4.0);
        let mut point = IrObject::new(3, ObjectType::Point);
        point.name = "spawn".to_owned();
        point.tag = "player".to_owned();
        point.position = vec2(5.0, 6.0);
        let things = IrLayer {
            id: 3,
            name: "things".to_owned(),
            opacity: 1.0,
            visible: false,
            context: IrContext::default(),
            kind: IrLayerKind::Object(vec![rect, ellipse, point]),
        };
        ir.layers.push(ground);
        ir.layers.push(IrLayer {
            id: 2,
            name: "group".to_owned(),
            opacity: 1.0,
            visible: true,
            context: IrContext::default(),
            kind: IrLayerKind::Group(vec![things]),
        });
        ir.context
            .properties
            .add("tint", Attribute::Color(Color::rgba(255, 0, 0, 255)))
            .unwrap();
        ir
    }

    fn export(dir: &Path, ir: &IrMap) -> (String, Vec<OutputFile>) {
        let files = GodotFormat
            .export(ir, &dir.join("level.tscn"), &SaveOptions::default())
            .unwrap();
        (files[0].text().unwrap().to_owned(), files)
    }

    #[test]
    fn scene_declares_resources_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (text, files) = export(dir.path(), &sample(dir.path()));

        // texture, two atlas frames, the animation, the tile set and one rectangle
        assert!(text.starts_with("[gd_scene load_steps=7 format=2]\n"));
        assert!(text.contains("[ext_resource path=\"res://terrain.png\" type=\"Texture\" id=1]"));
        assert!(text.contains("[sub_resource type=\"AtlasTexture\" id=1]\natlas = ExtResource( 1 )\nregion = Rect2( 16, 16, 16, 16 )"));
        assert!(text.contains("frame_1/delay_sec = 0.25"));
        assert!(text.contains("[sub_resource type=\"AnimatedTexture\" id=3]"));
        assert!(text.contains("[sub_resource type=\"TileSet\" id=4]"));
        assert!(text.contains("0/region = Rect2( 0, 0, 64, 32 )"));
        assert!(text.contains("1/texture = SubResource( 3 )"));
        assert!(text.contains("[sub_resource type=\"RectangleShape2D\" id=5]\nextents = Vector2( 15, 20 )"));

        assert_eq!(files.len(), 2);
        assert_eq!(files[1].path, dir.path().join("terrain.png"));
        assert_eq!(files[1].contents, b"png bytes");
    }

    #[test]
    fn tile_map_cells_use_atlas_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let (text, _) = export(dir.path(), &sample(dir.path()));

        // (0,1) -> tile 2 = atlas (0,1); (1,0) -> animated tile 6; (1,1) -> tile 7 = atlas (1,2)
        assert!(text.contains("tile_data = PoolIntArray( 1, 0, 1, 65536, 1, 0, 65537, 0, 65538 )"));
        assert!(text.contains("[node name=\"ground\" type=\"TileMap\" parent=\".\"]"));
        assert!(text.contains("modulate = Color( 1, 1, 1, 0.5 )"));
        assert!(text.contains("__meta__ = {\n\"depth\": 3\n}"));
    }

    #[test]
    fn objects_become_nodes_under_their_layers() {
        let dir = tempfile::tempdir().unwrap();
        let (text, _) = export(dir.path(), &sample(dir.path()));

        assert!(text.contains("[node name=\"group\" type=\"Node2D\" parent=\".\"]"));
        assert!(text.contains("[node name=\"things\" type=\"Node2D\" parent=\"group\"]\nvisible = false"));
        assert!(text.contains("[node name=\"door\" type=\"Area2D\" parent=\"group/things\"]\nposition = Vector2( 25, 40 )"));
        assert!(text.contains("[node name=\"Shape\" type=\"CollisionShape2D\" parent=\"group/things/door\"]"));
        assert!(text.contains("[node name=\"Object 2\" type=\"Area2D\" parent=\"group/things\"]"));
        assert!(text.contains("[node name=\"Shape\" type=\"CollisionPolygon2D\" parent=\"group/things/Object 2\"]\npolygon = PoolVector2Array( 4, 0,"));
        assert!(text.contains("[node name=\"spawn\" type=\"Position2D\" parent=\"group/things\"]\nposition = Vector2( 5, 6 )\n__meta__ = {\n\"tag\": \"player\"\n}"));
        assert!(text.contains("[node name=\"level\" type=\"Node2D\"]\n__meta__ = {\n\"tint\": Color( 1, 0, 0, 1 )\n}"));
    }

    #[test]
    fn godot_4_and_parsing_are_not_supported() {
        let dir = tempfile::tempdir().unwrap();
        let ir = sample(dir.path());
        let options = SaveOptions {
            godot_version: 4,
            ..SaveOptions::default()
        };
        assert!(matches!(
            GodotFormat.export(&ir, &dir.path().join("level.tscn"), &options),
            Err(WriteError::NotSupported(_))
        ));
        assert!(matches!(
            GodotFormat.parse(&dir.path().join("level.tscn")),
            Err(ParseError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn scene_outside_the_project_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ir = sample(dir.path());
        let options = SaveOptions {
            godot_project_dir: Some(dir.path().join("project")),
            ..SaveOptions::default()
        };
        assert!(matches!(
            GodotFormat.export(&ir, &dir.path().join("level.tscn"), &options),
            Err(WriteError::NotSupported(_))
        ));
    }

    #[test]
    fn missing_image_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut ir = sample(dir.path());
        ir.tilesets[0].image_path = dir.path().join("gone.png");
        assert!(matches!(
            GodotFormat.export(&ir, &dir.path().join("level.tscn"), &SaveOptions::default()),
            Err(WriteError::Io { .. })
        ));
    }
}
