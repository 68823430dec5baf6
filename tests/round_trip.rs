// tests/round_trip.rs

use std::fs;
use std::path::Path;

use anyhow::Result;
use pretty_assertions::assert_eq;
use tactile_core::format::{GodotFormat, TiledJsonFormat, TiledXmlFormat, YamlFormat};
use tactile_core::geom::vec2;
use tactile_core::ir_map::{
    IrAnimationFrame, IrContext, IrLayer, IrLayerKind, IrObject, IrTile, IrTileset,
};
use tactile_core::tile_matrix::tile_pos;
use tactile_core::{
    load_map, save_map, Attribute, Color, IrMap, MapFormat, ObjectType, SaveOptions, Size,
    TileCompression, TileExtent, TileFormat, TileMatrix,
};

fn layer(id: i32, name: &str, kind: IrLayerKind) -> IrLayer {
    IrLayer {
        id,
        name: name.to_owned(),
        opacity: 1.0,
        visible: true,
        context: IrContext::default(),
        kind,
    }
}

/// A 3x3 map with tile 7 in the middle, a tileset with an animated tile and a group
/// holding an object layer.
fn sample_map(dir: &Path) -> Result<IrMap> {
    let mut ir = IrMap::new(TileExtent::new(3, 3), Size::new(32, 32));
    ir.next_layer_id = 4;
    ir.next_object_id = 3;
    ir.context.properties.add("title", Attribute::String("Cave".to_owned()))?;
    ir.context.properties.add("depth", Attribute::Int(3))?;
    ir.context
        .properties
        .add("tint", Attribute::Color(Color::rgba(0x20, 0x40, 0x60, 0xff)))?;

    let mut animated = IrTile {
        index: 2,
        frames: vec![
            IrAnimationFrame { tile: 2, duration_ms: 100 },
            IrAnimationFrame { tile: 3, duration_ms: 150 },
        ],
        ..IrTile::default()
    };
    animated.context.properties.add("solid", Attribute::Bool(true))?;

    let mut tileset = IrTileset {
        name: "terrain".to_owned(),
        first_tile: 1,
        tile_size: Size::new(32, 32),
        column_count: 4,
        tile_count: 16,
        image_path: dir.join("terrain.png"),
        image_size: Size::new(128, 128),
        tiles: vec![animated],
        context: IrContext::default(),
    };
    tileset.context.properties.add("biome", Attribute::String("rock".to_owned()))?;
    ir.tilesets.push(tileset);

    let mut tiles = TileMatrix::new(ir.extent);
    tiles.set(tile_pos(1, 1), 7)?;
    tiles.set(tile_pos(0, 2), 3)?;
    let mut ground = layer(1, "ground", IrLayerKind::Tile(tiles));
    ground.opacity = 0.5;
    ground.context.properties.add("speed", Attribute::Float(1.5))?;

    let mut spawn = IrObject::new(1, ObjectType::Point);
    spawn.name = "spawn".to_owned();
    spawn.tag = "player".to_owned();
    spawn.position = vec2(48.0, 48.0);

    let mut door = IrObject::new(2, ObjectType::Rect);
    door.name = "door".to_owned();
    door.position = vec2(64.0, 0.0);
    door.size = vec2(32.0, 64.0);
    door.visible = false;
    door.context.properties.add("locked", Attribute::Bool(true))?;

    let mut things = layer(3, "things", IrLayerKind::Object(vec![spawn, door]));
    things.visible = false;
    let decor = layer(2, "decor", IrLayerKind::Group(vec![things]));

    ir.layers = vec![ground, decor];
    Ok(ir)
}

#[test]
fn yaml_keeps_a_stamped_tile() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let ir = sample_map(dir.path())?;
    let path = dir.path().join("cave.yaml");

    save_map(&ir, &path, &SaveOptions::default())?;
    assert!(dir.path().join("terrain.yaml").is_file());

    let loaded = load_map(&path)?;
    let ground = loaded.find_layer("ground").expect("ground layer");
    let IrLayerKind::Tile(tiles) = &ground.kind else {
        panic!("ground is not a tile layer");
    };
    assert_eq!(tiles.get(tile_pos(1, 1)), Some(7));
    assert_eq!(loaded, ir);
    Ok(())
}

#[test]
fn every_editable_format_round_trips() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let ir = sample_map(dir.path())?;

    let formats: [(&dyn MapFormat, &str); 3] = [
        (&YamlFormat, "map.yaml"),
        (&TiledJsonFormat, "map.tmj"),
        (&TiledXmlFormat, "map.tmx"),
    ];
    for tile_format in [
        TileFormat::plain(),
        TileFormat::base64(TileCompression::Zlib),
        TileFormat::base64(TileCompression::Zstd),
    ] {
        let mut ir = ir.clone();
        ir.tile_format = tile_format;
        for (format, file) in formats {
            let path = dir.path().join(file);
            format.save(&ir, &path, &SaveOptions::default())?;
            assert_eq!(format.parse(&path)?, ir, "{} with {:?}", format.name(), tile_format);
        }
    }
    Ok(())
}

#[test]
fn maps_survive_conversion_between_formats() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let ir = sample_map(dir.path())?;
    let options = SaveOptions::default();

    save_map(&ir, &dir.path().join("a.yaml"), &options)?;
    let from_yaml = load_map(&dir.path().join("a.yaml"))?;
    save_map(&from_yaml, &dir.path().join("b.json"), &options)?;
    let from_json = load_map(&dir.path().join("b.json"))?;
    save_map(&from_json, &dir.path().join("c.tmx"), &options)?;
    let from_xml = load_map(&dir.path().join("c.tmx"))?;

    assert_eq!(from_xml, ir);
    Ok(())
}

#[test]
fn embedded_tilesets_need_no_companion_files() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let ir = sample_map(dir.path())?;
    let options = SaveOptions {
        embed_tilesets: true,
        ..SaveOptions::default()
    };

    let formats: [(&dyn MapFormat, &str); 2] = [
        (&TiledJsonFormat, "embedded.json"),
        (&TiledXmlFormat, "embedded.tmx"),
    ];
    for (format, file) in formats {
        let files = format.export(&ir, &dir.path().join(file), &options)?;
        assert_eq!(files.len(), 1, "{}", format.name());
    }
    Ok(())
}

#[test]
fn godot_export_copies_textures_into_the_project() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let assets = dir.path().join("assets");
    fs::create_dir_all(&assets)?;
    fs::write(assets.join("terrain.png"), b"not really a png")?;
    let ir = sample_map(&assets)?;

    let project = dir.path().join("game");
    let scene = project.join("levels/cave.tscn");
    let options = SaveOptions {
        godot_project_dir: Some(project.clone()),
        ..SaveOptions::default()
    };
    GodotFormat.save(&ir, &scene, &options)?;

    let text = fs::read_to_string(&scene)?;
    assert!(text.starts_with("[gd_scene"));
    assert!(text.contains(r#"path="res://levels/terrain.png""#));
    assert!(text.contains("type=\"TileMap\""));
    assert!(text.contains("type=\"AnimatedTexture\""));
    assert_eq!(fs::read(project.join("levels/terrain.png"))?, b"not really a png");

    assert!(GodotFormat.parse(&scene).is_err());
    Ok(())
}

#[test]
fn unknown_extensions_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("map.png");
    fs::write(&path, "").unwrap();
    match load_map(&path) {
        Err(tactile_core::ParseError::UnsupportedFormat(p)) => assert_eq!(p, path),
        other => panic!("expected UnsupportedFormat, got {:?}", other),
    }
}
