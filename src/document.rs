//! An open map file with its undo history.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::command::{Command, CommandStack};
use crate::error::{MapError, ParseError, WriteError};
use crate::format::{self, MapFormat, SaveOptions};
use crate::map::Map;
use crate::settings::Settings;

/// An open map together with its edit history and the file it belongs to.
#[derive(Debug)]
pub struct MapDocument {
    map: Map,
    history: CommandStack,
    path: Option<PathBuf>,
}

impl MapDocument {
    /// A document that has never been saved.
    pub fn new(map: Map, settings: &Settings) -> Self {
        MapDocument {
            map,
            history: settings.command_stack(),
            path: None,
        }
    }

    /// Reads a map in any readable format. The history starts out clean.
    pub fn open(path: &Path, settings: &Settings) -> Result<Self, ParseError> {
        let ir = format::load_map(path)?;
        let map = Map::from_ir(&ir)?;
        Ok(MapDocument {
            map,
            history: settings.command_stack(),
            path: Some(path.to_path_buf()),
        })
    }

    /// The current map.
    pub fn map(&self) -> &Map {
        &self.map
    }

    /// The edit history.
    pub fn history(&self) -> &CommandStack {
        &self.history
    }

    /// The file the document is saved to, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Unsaved changes exist.
    pub fn is_dirty(&self) -> bool {
        !self.history.is_clean()
    }

    /// Applies a command and records it for undo.
    pub fn execute<C: Command + 'static>(&mut self, command: C) -> Result<(), MapError> {
        self.history.push(&mut self.map, command)
    }

    /// Reverts the newest edit.
    pub fn undo(&mut self) -> Result<(), MapError> {
        self.history.undo(&mut self.map)
    }

    /// Reapplies the newest undone edit.
    pub fn redo(&mut self) -> Result<(), MapError> {
        self.history.redo(&mut self.map)
    }

    /// Bounds the history, evicting the oldest edits if needed.
    pub fn set_command_capacity(&mut self, capacity: usize) {
        self.history.set_capacity(capacity);
    }

    /// Writes to the document's own path and marks it clean.
    pub fn save(&mut self, options: &SaveOptions) -> Result<(), WriteError> {
        let path = self.path.clone().ok_or(WriteError::MissingPath)?;
        self.write(&path, options)?;
        self.history.mark_clean();
        Ok(())
    }

    /// Saves to `path` and makes it the document's file. On failure the document keeps
    /// its previous path and dirty state.
    pub fn save_as(&mut self, path: &Path, options: &SaveOptions) -> Result<(), WriteError> {
        if format::format_for_path(path).is_some_and(|f| f.name() == format::GodotFormat.name()) {
            return Err(WriteError::NotSupported(
                "Godot scenes can be exported but not reopened".to_owned(),
            ));
        }
        self.write(path, options)?;
        self.path = Some(path.to_path_buf());
        self.history.mark_clean();
        Ok(())
    }

    /// Writes a copy of the map without adopting `path` or touching the dirty state.
    pub fn export(&self, path: &Path, options: &SaveOptions) -> Result<(), WriteError> {
        self.write(path, options)
    }

    fn write(&self, path: &Path, options: &SaveOptions) -> Result<(), WriteError> {
        let ir = self.map.to_ir();
        format::save_map(&ir, path, options).inspect_err(|err| {
            warn!(path = %path.display(), %err, "failed to save map");
        })?;
        info!(path = %path.display(), "document written");
        Ok(())
    }
}
