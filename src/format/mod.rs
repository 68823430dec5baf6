//! Map file formats.
//!
//! Every format converts between bytes on disk and an [`IrMap`]. Parsing starts from a
//! path because external tilesets are resolved relative to the map file. Exporting
//! produces every output file in memory first, [`MapFormat::save`] only touches the disk
//! once all of them were generated.
//!
//! | Extension | Format |
//! |---|---|
//! | `.yaml`, `.yml` | Tactile YAML |
//! | `.json`, `.tmj` | Tiled JSON |
//! | `.tmx`, `.xml` | Tiled XML |
//! | `.tscn` | Godot scene (write only) |

pub mod godot;
mod tiled_common;
pub mod tiled_json;
pub mod tiled_xml;
pub mod yaml;

pub use godot::GodotFormat;
pub use tiled_json::TiledJsonFormat;
pub use tiled_xml::TiledXmlFormat;
pub use yaml::YamlFormat;

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ParseError, WriteError};
use crate::ir_map::IrMap;

/// Godot major version targeted when none is configured.
pub const DEFAULT_GODOT_VERSION: u32 = 3;

/// Knobs exporters read, usually built from [`crate::settings::Settings`].
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOptions {
    /// Store tilesets inside the map file instead of next to it.
    pub embed_tilesets: bool,
    /// Put each row of plain tile data on its own line.
    pub fold_tile_data: bool,
    /// Pretty-print JSON and XML.
    pub indent_output: bool,
    /// Godot major version to target. Only 3 is supported.
    pub godot_version: u32,
    /// Root of the Godot project, `res://` paths are relative to it. Defaults to the
    /// directory of the exported scene.
    pub godot_project_dir: Option<PathBuf>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        SaveOptions {
            embed_tilesets: false,
            fold_tile_data: true,
            indent_output: true,
            godot_version: DEFAULT_GODOT_VERSION,
            godot_project_dir: None,
        }
    }
}

/// A generated file, waiting to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFile {
    /// Destination.
    pub path: PathBuf,
    /// Bytes to write.
    pub contents: Vec<u8>,
}

impl OutputFile {
    /// A file with the given destination and contents.
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        OutputFile {
            path: path.into(),
            contents: contents.into(),
        }
    }

    /// The contents as UTF-8, if they are valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.contents).ok()
    }
}

/// A map file format.
pub trait MapFormat {
    /// Human readable name for logs and errors.
    fn name(&self) -> &'static str;

    /// Reads the map at `path`, with its external tilesets.
    fn parse(&self, path: &Path) -> Result<IrMap, ParseError>;

    /// Generates the map file at `path` plus any companion files.
    fn export(
        &self,
        ir: &IrMap,
        path: &Path,
        options: &SaveOptions,
    ) -> Result<Vec<OutputFile>, WriteError>;

    /// Exports and writes every file, each one atomically.
    fn save(&self, ir: &IrMap, path: &Path, options: &SaveOptions) -> Result<(), WriteError> {
        let files = self.export(ir, path, options)?;
        write_files(&files)
    }
}

/// Picks a format by file extension.
pub fn format_for_path(path: &Path) -> Option<&'static dyn MapFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "yaml" | "yml" => Some(&YamlFormat),
        "json" | "tmj" => Some(&TiledJsonFormat),
        "tmx" | "xml" => Some(&TiledXmlFormat),
        "tscn" => Some(&GodotFormat),
        _ => None,
    }
}

/// Reads a map, choosing the format by extension.
pub fn load_map(path: &Path) -> Result<IrMap, ParseError> {
    let format =
        format_for_path(path).ok_or_else(|| ParseError::UnsupportedFormat(path.to_path_buf()))?;
    info!(path = %path.display(), format = format.name(), "loading map");
    let ir = format.parse(path)?;
    info!(
        path = %path.display(),
        rows = ir.extent.rows,
        cols = ir.extent.cols,
        layers = ir.layers.len(),
        tilesets = ir.tilesets.len(),
        "map loaded"
    );
    Ok(ir)
}

/// Writes a map, choosing the format by extension.
pub fn save_map(ir: &IrMap, path: &Path, options: &SaveOptions) -> Result<(), WriteError> {
    let format =
        format_for_path(path).ok_or_else(|| WriteError::UnsupportedFormat(path.to_path_buf()))?;
    info!(path = %path.display(), format = format.name(), "saving map");
    format.save(ir, path, options)?;
    info!(path = %path.display(), "map saved");
    Ok(())
}

/// Writes each file through a sibling temp file and a rename, so a destination is either
/// fully replaced or left alone.
pub fn write_files(files: &[OutputFile]) -> Result<(), WriteError> {
    for file in files {
        write_atomic(&file.path, &file.contents)?;
    }
    Ok(())
}

/// Writes through a temporary file in the same directory, then renames it over `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), WriteError> {
    let io_err = |source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(io_err)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| WriteError::Unknown(format!("'{}' is not a file path", path.display())))?;
    let temp = dir.join(format!(".{file_name}.tmp"));
    fs::write(&temp, contents).map_err(io_err)?;
    if let Err(source) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(io_err(source));
    }
    debug!(path = %path.display(), bytes = contents.len(), "wrote file");
    Ok(())
}

pub(crate) fn read_text(path: &Path) -> Result<String, ParseError> {
    fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Resolves a path read from a file located in `dir`.
pub(crate) fn resolve_path(dir: &Path, relative: &str) -> PathBuf {
    normalize(&dir.join(relative))
}

/// Resolves an external tileset reference, failing if the file is missing.
pub(crate) fn resolve_external(dir: &Path, relative: &str) -> Result<PathBuf, ParseError> {
    let path = resolve_path(dir, relative);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ParseError::ExternalTilesetNotFound(path))
    }
}

/// Drops `.` components and folds `..` into the preceding component where possible.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        PathBuf::from(".")
    } else {
        out.iter().collect()
    }
}

/// `target` expressed relative to the directory `base`.
///
/// Falls back to `target` itself when the two do not share a root.
pub(crate) fn relative_path(target: &Path, base: &Path) -> PathBuf {
    let target = normalize(target);
    let base = normalize(base);
    if target.is_absolute() != base.is_absolute() {
        return target;
    }

    let target_parts: Vec<_> = target.components().collect();
    let base_parts: Vec<_> = base
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    let common = target_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();
    if base_parts[common..]
        .iter()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return target;
    }

    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &target_parts[common..] {
        out.push(part);
    }
    out
}

/// Forward slashes on every platform, as all the formats expect.
pub(crate) fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_are_picked_by_extension() {
        let name = |p: &str| format_for_path(Path::new(p)).map(|f| f.name());
        assert_eq!(name("a/map.yaml"), Some("Tactile YAML"));
        assert_eq!(name("map.YML"), Some("Tactile YAML"));
        assert_eq!(name("map.tmj"), Some("Tiled JSON"));
        assert_eq!(name("map.tmx"), Some("Tiled XML"));
        assert_eq!(name("scene.tscn"), Some("Godot scene"));
        assert_eq!(name("map.txt"), None);
        assert_eq!(name("map"), None);
    }

    #[test]
    fn relative_paths() {
        assert_eq!(
            relative_path(Path::new("maps/tiles/grass.png"), Path::new("maps")),
            PathBuf::from("tiles/grass.png")
        );
        assert_eq!(
            relative_path(Path::new("assets/grass.png"), Path::new("maps/level1")),
            PathBuf::from("../../assets/grass.png")
        );
        assert_eq!(
            relative_path(Path::new("/abs/grass.png"), Path::new("maps")),
            PathBuf::from("/abs/grass.png")
        );
        assert_eq!(
            relative_path(Path::new("./maps/grass.png"), Path::new(".")),
            PathBuf::from("maps/grass.png")
        );
    }

    #[test]
    fn resolve_folds_parent_components() {
        assert_eq!(
            resolve_path(Path::new("maps/level1"), "../tiles/grass.png"),
            PathBuf::from("maps/tiles/grass.png")
        );
    }

    #[test]
    fn atomic_write_replaces_the_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/map.yaml");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn unknown_extension_is_a_parse_error() {
        assert!(matches!(
            load_map(Path::new("map.bmp")),
            Err(ParseError::UnsupportedFormat(_))
        ));
    }
}
