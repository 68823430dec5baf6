//! Undoable document edits and the history that replays them.
//!
//! A command is constructed against the current map, which is where it checks that its
//! targets exist. After that `redo`/`undo` are expected to succeed; an error from either
//! one means the document was changed behind the history's back.

use std::any::Any;
use std::fmt;

use tracing::{debug, warn};

use crate::error::MapError;
use crate::map::Map;

/// `kind()` and `as_any()` for a command type named like its [`CommandKind`].
macro_rules! command_kind {
    ($kind:ident) => {
        fn kind(&self) -> $crate::command::CommandKind {
            $crate::command::CommandKind::$kind
        }

        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }
    };
}

mod component;
mod layer;
mod map;
mod object;
mod property;
mod tile;
mod tileset;

pub use component::{
    AttachComponent, DefineComponent, DetachComponent, UndefineComponent, UpdateAttachedComponent,
};
pub use layer::{
    AddLayer, DuplicateLayer, MoveLayerDown, MoveLayerUp, RemoveLayer, RenameLayer,
    ReparentLayer, SetLayerOpacity, SetLayerVisible,
};
pub use map::{AddColumn, AddRow, FixTiles, RemoveColumn, RemoveRow, ResizeMap};
pub use object::{
    AddObject, MoveObject, RemoveObject, RenameObject, SetObjectTag, SetObjectVisible,
};
pub use property::{AddProperty, ChangePropertyType, RemoveProperty, RenameProperty, UpdateProperty};
pub use tile::{BucketFill, EraseSequence, StampSequence};
pub use tileset::{AddTileset, RemoveTileset};

/// History length used when none is configured.
pub const DEFAULT_CAPACITY: usize = 100;

/// Stable identifier for each command type. Only commands of equal kind are offered to
/// [`Command::merge_with`].
///
/// Each variant is named after the command type it identifies.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    AddLayer,
    RemoveLayer,
    DuplicateLayer,
    RenameLayer,
    SetLayerOpacity,
    SetLayerVisible,
    MoveLayerUp,
    MoveLayerDown,
    ReparentLayer,
    AddRow,
    AddColumn,
    RemoveRow,
    RemoveColumn,
    ResizeMap,
    FixTiles,
    StampSequence,
    EraseSequence,
    BucketFill,
    AddObject,
    RemoveObject,
    MoveObject,
    RenameObject,
    SetObjectTag,
    SetObjectVisible,
    AddProperty,
    RemoveProperty,
    RenameProperty,
    UpdateProperty,
    ChangePropertyType,
    DefineComponent,
    UndefineComponent,
    AttachComponent,
    DetachComponent,
    UpdateAttachedComponent,
    AddTileset,
    RemoveTileset,
}

/// A reversible edit of a [`Map`].
pub trait Command: fmt::Debug {
    /// Applies the edit. Called once when the command is pushed and again for every redo.
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError>;

    /// Reverts the last application.
    fn undo(&mut self, map: &mut Map) -> Result<(), MapError>;

    /// Label for "Undo ..." / "Redo ..." menu entries.
    fn name(&self) -> &str;

    /// Identifies the command type for merging.
    fn kind(&self) -> CommandKind;

    /// Tries to absorb `other`, a command of the same kind that has not been applied yet.
    ///
    /// On `Ok(true)` this command must have applied the extra effect of `other` to `map`
    /// and now undoes both at once. `other` is dropped without ever being applied.
    fn merge_with(&mut self, _map: &mut Map, _other: &dyn Command) -> Result<bool, MapError> {
        Ok(false)
    }

    /// Releases anything expensive the command keeps for undo. Called when the command
    /// leaves the history for good.
    fn dispose(&mut self) {}

    /// Lets [`Command::merge_with`] downcast the other command.
    fn as_any(&self) -> &dyn Any;
}

/// Downcasts a merge candidate to the concrete type of the receiving command.
pub(crate) fn downcast<T: 'static>(other: &dyn Command) -> Option<&T> {
    other.as_any().downcast_ref::<T>()
}

/// Bounded undo/redo history.
pub struct CommandStack {
    undo_stack: Vec<Box<dyn Command>>,
    redo_stack: Vec<Box<dyn Command>>,
    capacity: usize,
    /// Undo depth at which the document matches what is on disk.
    clean_index: Option<usize>,
}

impl fmt::Debug for CommandStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandStack")
            .field("undo", &self.undo_stack.len())
            .field("redo", &self.redo_stack.len())
            .field("capacity", &self.capacity)
            .field("clean_index", &self.clean_index)
            .finish()
    }
}

impl Default for CommandStack {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl CommandStack {
    /// A history holding at most `capacity` undoable commands, at least one.
    pub fn new(capacity: usize) -> Self {
        CommandStack {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            capacity: capacity.max(1),
            clean_index: Some(0),
        }
    }

    /// Maximum number of undoable commands.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Shrinking evicts the oldest commands until the history fits.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.undo_stack.len() > self.capacity {
            self.evict_oldest();
        }
    }

    /// Number of commands that can be undone.
    pub fn len(&self) -> usize {
        self.undo_stack.len()
    }

    /// Nothing to undo or redo.
    pub fn is_empty(&self) -> bool {
        self.undo_stack.is_empty() && self.redo_stack.is_empty()
    }

    /// Number of commands that can be redone.
    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// There is a command to undo.
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// There is a command to redo.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Name of the command [`CommandStack::undo`] would revert.
    pub fn undo_text(&self) -> Option<&str> {
        self.undo_stack.last().map(|c| c.name())
    }

    /// Name of the command [`CommandStack::redo`] would reapply.
    pub fn redo_text(&self) -> Option<&str> {
        self.redo_stack.last().map(|c| c.name())
    }

    /// The document matches the state last marked clean.
    pub fn is_clean(&self) -> bool {
        self.clean_index == Some(self.undo_stack.len())
    }

    /// Records the current state as the saved one.
    pub fn mark_clean(&mut self) {
        self.clean_index = Some(self.undo_stack.len());
    }

    /// Applies `command` and records it.
    ///
    /// If the top of the history is of the same kind and accepts the merge, the new command
    /// is folded into it instead. Merging never happens across the clean point or while
    /// there is something to redo.
    pub fn push<C: Command + 'static>(&mut self, map: &mut Map, command: C) -> Result<(), MapError> {
        self.push_boxed(map, Box::new(command))
    }

    /// Like [`CommandStack::push`] for an already boxed command.
    pub fn push_boxed(&mut self, map: &mut Map, mut command: Box<dyn Command>) -> Result<(), MapError> {
        let can_merge = self.redo_stack.is_empty() && !self.is_clean();
        if can_merge {
            if let Some(top) = self.undo_stack.last_mut() {
                if top.kind() == command.kind() && top.merge_with(map, command.as_ref())? {
                    debug!(command = top.name(), "merged command");
                    return Ok(());
                }
            }
        }

        command.redo(map)?;
        self.clear_redo_and_adjust_clean();

        if self.undo_stack.len() >= self.capacity {
            self.evict_oldest();
        }
        debug!(command = command.name(), "pushed command");
        self.undo_stack.push(command);
        Ok(())
    }

    /// Reverts the newest command. A no-op when there is nothing to undo.
    pub fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        let Some(mut command) = self.undo_stack.pop() else {
            return Ok(());
        };
        if let Err(err) = command.undo(map) {
            warn!(command = command.name(), %err, "undo failed");
            self.undo_stack.push(command);
            return Err(err);
        }
        self.redo_stack.push(command);
        Ok(())
    }

    /// Reapplies the newest undone command. A no-op when there is nothing to redo.
    pub fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        let Some(mut command) = self.redo_stack.pop() else {
            return Ok(());
        };
        if let Err(err) = command.redo(map) {
            warn!(command = command.name(), %err, "redo failed");
            self.redo_stack.push(command);
            return Err(err);
        }
        self.undo_stack.push(command);
        Ok(())
    }

    /// Drops the whole history. The current state becomes the clean one.
    pub fn clear(&mut self) {
        for mut command in self.undo_stack.drain(..).chain(self.redo_stack.drain(..)) {
            command.dispose();
        }
        self.clean_index = Some(0);
    }

    fn clear_redo_and_adjust_clean(&mut self) {
        if self.redo_stack.is_empty() {
            return;
        }
        if self.clean_index.is_some_and(|clean| clean > self.undo_stack.len()) {
            self.clean_index = None;
        }
        for mut command in self.redo_stack.drain(..) {
            command.dispose();
        }
    }

    fn evict_oldest(&mut self) {
        if self.undo_stack.is_empty() {
            return;
        }
        let mut oldest = self.undo_stack.remove(0);
        debug!(command = oldest.name(), "evicted command");
        oldest.dispose();
        self.clean_index = match self.clean_index {
            Some(0) | None => None,
            Some(clean) => Some(clean - 1),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Size;
    use crate::tile_matrix::TileExtent;

    fn map() -> Map {
        Map::new(TileExtent::new(2, 2), Size::new(16, 16)).unwrap()
    }

    #[test]
    fn undo_and_redo_walk_the_history() {
        let mut map = map();
        let mut stack = CommandStack::default();
        let cmd = AddRow::new(&map);
        stack.push(&mut map, cmd).unwrap();
        let cmd = AddColumn::new(&map);
        stack.push(&mut map, cmd).unwrap();
        assert_eq!(map.extent(), TileExtent::new(3, 3));
        assert_eq!(stack.undo_text(), Some("Add Column"));

        stack.undo(&mut map).unwrap();
        assert_eq!(map.extent(), TileExtent::new(3, 2));
        assert_eq!(stack.redo_text(), Some("Add Column"));

        stack.redo(&mut map).unwrap();
        assert_eq!(map.extent(), TileExtent::new(3, 3));
        assert!(!stack.can_redo());
    }

    #[test]
    fn pushing_discards_the_redo_branch() {
        let mut map = map();
        let mut stack = CommandStack::default();
        let cmd = AddRow::new(&map);
        stack.push(&mut map, cmd).unwrap();
        stack.undo(&mut map).unwrap();
        let cmd = AddColumn::new(&map);
        stack.push(&mut map, cmd).unwrap();
        assert!(!stack.can_redo());
        assert_eq!(stack.len(), 1);
        assert_eq!(map.extent(), TileExtent::new(2, 3));
    }

    #[test]
    fn repeated_rows_merge_into_one_entry() {
        let mut map = map();
        let mut stack = CommandStack::default();
        stack.mark_clean();
        for _ in 0..4 {
            let cmd = AddRow::new(&map);
            stack.push(&mut map, cmd).unwrap();
        }
        // The first push sits on the clean point and cannot absorb, the rest merge into it.
        assert_eq!(stack.len(), 1);
        assert_eq!(map.extent(), TileExtent::new(6, 2));

        stack.undo(&mut map).unwrap();
        assert_eq!(map.extent(), TileExtent::new(2, 2));
        assert!(stack.is_clean());
    }

    #[test]
    fn no_merge_onto_the_clean_point() {
        let mut map = map();
        let mut stack = CommandStack::default();
        let cmd = AddRow::new(&map);
        stack.push(&mut map, cmd).unwrap();
        stack.mark_clean();
        let cmd = AddRow::new(&map);
        stack.push(&mut map, cmd).unwrap();
        assert_eq!(stack.len(), 2);
        assert!(!stack.is_clean());
        stack.undo(&mut map).unwrap();
        assert!(stack.is_clean());
    }

    #[test]
    fn capacity_evicts_the_oldest() {
        let mut map = map();
        let mut stack = CommandStack::new(2);
        let cmd = AddRow::new(&map);
        stack.push(&mut map, cmd).unwrap();
        let cmd = AddColumn::new(&map);
        stack.push(&mut map, cmd).unwrap();
        let cmd = RemoveRow::new(&map).unwrap();
        stack.push(&mut map, cmd).unwrap();
        assert_eq!(stack.len(), 2);
        assert!(!stack.is_clean());

        stack.undo(&mut map).unwrap();
        stack.undo(&mut map).unwrap();
        assert!(!stack.can_undo());
        // The evicted AddRow can no longer be reverted.
        assert_eq!(map.extent(), TileExtent::new(3, 2));
    }

    #[test]
    fn shrinking_capacity_trims_history() {
        let mut map = map();
        let mut stack = CommandStack::new(10);
        let cmd = AddRow::new(&map);
        stack.push(&mut map, cmd).unwrap();
        let cmd = AddColumn::new(&map);
        stack.push(&mut map, cmd).unwrap();
        let cmd = RemoveRow::new(&map).unwrap();
        stack.push(&mut map, cmd).unwrap();
        stack.set_capacity(1);
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.undo_text(), Some("Remove Row"));
    }

    #[test]
    fn undo_on_empty_history_is_a_no_op() {
        let mut map = map();
        let mut stack = CommandStack::default();
        stack.undo(&mut map).unwrap();
        stack.redo(&mut map).unwrap();
        assert!(stack.is_clean());
        assert_eq!(map.extent(), TileExtent::new(2, 2));
    }
}
