//! User settings, read from a TOML file.
//!
//! ```toml
//! embed-tilesets = false
//! fold-tile-data = true
//! indent-output = true
//! command-capacity = 100
//! godot-version = 3
//!
//! [preferred-tile-size]
//! width = 32
//! height = 32
//!
//! [tile-format]
//! encoding = "base64"
//! compression = "zstd"
//! ```
//!
//! Every key is optional, missing keys keep their default.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::codec::TileFormat;
use crate::command::{CommandStack, DEFAULT_CAPACITY};
use crate::error::MapError;
use crate::format::{SaveOptions, DEFAULT_GODOT_VERSION};
use crate::geom::Size;
use crate::map::Map;
use crate::tile_matrix::TileExtent;

/// Reasons a settings file could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read settings from '{}': {source}", path.display())]
    Io {
        /// Settings file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The text is not valid TOML for the settings schema.
    #[error("failed to parse settings{}: {source}", path.as_ref().map(|p| format!(" in '{}'", p.display())).unwrap_or_default())]
    Parse {
        /// Settings file, `None` when parsing a string.
        path: Option<PathBuf>,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },
    /// A value outside its allowed range.
    #[error("invalid setting '{key}': {reason}")]
    Invalid {
        /// Setting name as written in the file.
        key: &'static str,
        /// What is wrong with the value.
        reason: String,
    },
}

/// Editor preferences that affect saving and new documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    /// Write tilesets into the map file instead of next to it.
    pub embed_tilesets: bool,
    /// Break plain tile data into one line per row.
    pub fold_tile_data: bool,
    /// Pretty-print JSON and XML output.
    pub indent_output: bool,
    /// Maximum number of undoable commands kept per document.
    pub command_capacity: usize,
    /// Tile size given to new maps.
    pub preferred_tile_size: Size,
    /// Tile data format given to new maps.
    pub tile_format: TileFormat,
    /// Godot major version targeted by scene export.
    pub godot_version: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            embed_tilesets: false,
            fold_tile_data: true,
            indent_output: true,
            command_capacity: DEFAULT_CAPACITY,
            preferred_tile_size: Size::new(32, 32),
            tile_format: TileFormat::default(),
            godot_version: DEFAULT_GODOT_VERSION,
        }
    }
}

impl Settings {
    /// Reads and validates a settings file.
    pub fn load(path: &Path) -> Result<Settings, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::parse(&text).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: Some(path.to_path_buf()),
                source,
            },
            other => other,
        })?;
        debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Parses and validates settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Settings, ConfigError> {
        Self::parse(text)
    }

    fn parse(text: &str) -> Result<Settings, ConfigError> {
        let settings: Settings =
            toml::from_str(text).map_err(|source| ConfigError::Parse { path: None, source })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.command_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "command-capacity",
                reason: "must be at least 1".to_owned(),
            });
        }
        if !self.preferred_tile_size.is_positive() {
            return Err(ConfigError::Invalid {
                key: "preferred-tile-size",
                reason: format!(
                    "{}x{} is not a positive size",
                    self.preferred_tile_size.width, self.preferred_tile_size.height
                ),
            });
        }
        Ok(())
    }

    /// The settings as TOML, in the same schema `load` reads.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Save options carrying these preferences. No Godot project directory is set.
    pub fn save_options(&self) -> SaveOptions {
        SaveOptions {
            embed_tilesets: self.embed_tilesets,
            fold_tile_data: self.fold_tile_data,
            indent_output: self.indent_output,
            godot_version: self.godot_version,
            godot_project_dir: None,
        }
    }

    /// An empty map using the preferred tile size and tile format.
    pub fn new_map(&self, extent: TileExtent) -> Result<Map, MapError> {
        let mut map = Map::new(extent, self.preferred_tile_size)?;
        map.tile_format = self.tile_format;
        Ok(map)
    }

    /// An empty history bounded by `command_capacity`.
    pub fn command_stack(&self) -> CommandStack {
        CommandStack::new(self.command_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{TileCompression, TileEncoding};

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.save_options(), SaveOptions::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let settings = Settings::from_toml_str(
            r#"
embed-tilesets = true
command-capacity = 5

[tile-format]
encoding = "base64"
compression = "zstd"
"#,
        )
        .unwrap();

        assert!(settings.embed_tilesets);
        assert!(settings.fold_tile_data);
        assert_eq!(settings.command_capacity, 5);
        assert_eq!(settings.tile_format.encoding, TileEncoding::Base64);
        assert_eq!(settings.tile_format.compression, TileCompression::Zstd);
        assert_eq!(settings.command_stack().capacity(), 5);
        assert!(settings.save_options().embed_tilesets);
    }

    #[test]
    fn new_map_uses_preferences() {
        let settings = Settings::from_toml_str(
            "[preferred-tile-size]\nwidth = 16\nheight = 8\n[tile-format]\nencoding = \"base64\"\n",
        )
        .unwrap();
        let map = settings.new_map(TileExtent::new(4, 5)).unwrap();
        assert_eq!(map.tile_size(), Size::new(16, 8));
        assert_eq!(map.tile_format.encoding, TileEncoding::Base64);
        assert_eq!(map.row_count(), 4);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = Settings::from_toml_str("command-capacity = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "command-capacity", .. }));
    }

    #[test]
    fn wrong_type_is_a_parse_error() {
        let err = Settings::from_toml_str("indent-output = \"yes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { path: None, .. }));
    }

    #[test]
    fn load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "godot-version = [").unwrap();
        let err = Settings::load(&path).unwrap_err();
        assert!(err.to_string().contains("settings.toml"));

        let missing = Settings::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn written_settings_load_back() {
        let settings = Settings {
            indent_output: false,
            godot_version: 4,
            ..Settings::default()
        };
        let text = settings.to_toml_string().unwrap();
        assert_eq!(Settings::from_toml_str(&text).unwrap(), settings);
    }
}
