//! Tilesets and the global tile id ranges they occupy.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::context::AttributeContext;
use crate::error::MapError;
use crate::geom::Size;
use crate::object::Object;
use crate::tile_matrix::{TileId, TileIndex};

/// What the texture collaborator reports about a loaded image.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureInfo {
    /// Image file.
    pub path: PathBuf,
    /// Image size in pixels.
    pub size: Size,
    /// Opaque renderer handle, if the image was actually uploaded somewhere.
    pub handle: Option<u64>,
}

impl TextureInfo {
    /// Texture info without a renderer handle.
    pub fn new(path: impl Into<PathBuf>, size: Size) -> Self {
        TextureInfo {
            path: path.into(),
            size,
            handle: None,
        }
    }
}

/// Loads images for tilesets. Implemented by the GUI; tests use a stub.
pub trait TextureLoader {
    /// Loads `path`, returning `None` if it is not a readable image.
    fn load_texture(&self, path: &Path) -> Option<TextureInfo>;
}

/// One step of a tile animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationFrame {
    /// Local index shown during this frame.
    pub tile: TileIndex,
    /// How long the frame lasts.
    pub duration_ms: u64,
}

/// Per-tile metadata. Only tiles with something non-default get an entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileMeta {
    /// Animation frames, empty for a static tile.
    pub frames: Vec<AnimationFrame>,
    /// Collision and marker shapes.
    pub objects: Vec<Object>,
    /// Tile properties and components.
    pub context: AttributeContext,
}

impl TileMeta {
    /// The tile has at least one frame.
    pub fn is_animated(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Nothing worth keeping an entry for.
    pub fn is_default(&self) -> bool {
        self.frames.is_empty()
            && self.objects.is_empty()
            && self.context.properties.is_empty()
            && self.context.components().is_empty()
    }
}

/// A texture cut into equally sized tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct Tileset {
    id: Uuid,
    /// Display name.
    pub name: String,
    texture: TextureInfo,
    tile_size: Size,
    row_count: i32,
    column_count: i32,
    tile_count: i32,
    tiles: BTreeMap<TileIndex, TileMeta>,
    /// Tileset properties and components.
    pub context: AttributeContext,
}

impl Tileset {
    /// A tileset covering as many whole tiles as fit in the texture.
    pub fn new(name: impl Into<String>, texture: TextureInfo, tile_size: Size) -> Result<Self, MapError> {
        if !tile_size.is_positive() {
            return Err(MapError::InvalidArgument(format!(
                "tile size must be positive, got {}x{}",
                tile_size.width, tile_size.height
            )));
        }
        let column_count = texture.size.width / tile_size.width;
        let row_count = texture.size.height / tile_size.height;
        if column_count < 1 || row_count < 1 {
            return Err(MapError::InvalidArgument(format!(
                "texture '{}' is smaller than a single tile",
                texture.path.display()
            )));
        }
        let tile_count = row_count.checked_mul(column_count).ok_or_else(|| {
            MapError::InvalidArgument(format!(
                "texture '{}' holds too many tiles",
                texture.path.display()
            ))
        })?;

        Ok(Tileset {
            id: Uuid::new_v4(),
            name: name.into(),
            texture,
            tile_size,
            row_count,
            column_count,
            tile_count,
            tiles: BTreeMap::new(),
            context: AttributeContext::new(),
        })
    }

    /// Creates a tileset whose grid was declared by a file rather than derived from the
    /// image, so a partial last row is allowed.
    pub fn with_grid(
        name: impl Into<String>,
        texture: TextureInfo,
        tile_size: Size,
        column_count: i32,
        tile_count: i32,
    ) -> Result<Self, MapError> {
        let name = name.into();
        if !tile_size.is_positive() || column_count < 1 || tile_count < 1 {
            return Err(MapError::InvalidArgument(format!(
                "tileset '{name}' declares an empty tile grid"
            )));
        }
        Ok(Tileset {
            id: Uuid::new_v4(),
            name,
            texture,
            tile_size,
            row_count: (tile_count - 1) / column_count + 1,
            column_count,
            tile_count,
            tiles: BTreeMap::new(),
            context: AttributeContext::new(),
        })
    }

    /// Creates a tileset from an image on disk, named after the file stem.
    pub fn load(loader: &dyn TextureLoader, path: &Path, tile_size: Size) -> Result<Self, MapError> {
        let texture = loader.load_texture(path).ok_or_else(|| {
            MapError::InvalidArgument(format!("could not load image '{}'", path.display()))
        })?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tileset".to_owned());
        Tileset::new(name, texture, tile_size)
    }

    /// Runtime id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The backing image.
    pub fn texture(&self) -> &TextureInfo {
        &self.texture
    }

    /// Pixel size of one tile.
    pub fn tile_size(&self) -> Size {
        self.tile_size
    }

    /// Texture rows.
    pub fn row_count(&self) -> i32 {
        self.row_count
    }

    /// Tiles per texture row.
    pub fn column_count(&self) -> i32 {
        self.column_count
    }

    /// Tiles in the texture.
    pub fn tile_count(&self) -> i32 {
        self.tile_count
    }

    /// `index` is a valid local index.
    pub fn contains_index(&self, index: TileIndex) -> bool {
        index >= 0 && index < self.tile_count()
    }

    /// Metadata for `index`, if it has any.
    pub fn tile(&self, index: TileIndex) -> Option<&TileMeta> {
        self.tiles.get(&index)
    }

    /// Tiles with metadata, by index.
    pub fn tiles(&self) -> impl Iterator<Item = (TileIndex, &TileMeta)> {
        self.tiles.iter().map(|(i, t)| (*i, t))
    }

    /// Metadata for `index`, created on first access.
    pub fn tile_mut(&mut self, index: TileIndex) -> Result<&mut TileMeta, MapError> {
        if !self.contains_index(index) {
            return Err(MapError::InvalidArgument(format!(
                "tile index {index} is outside tileset '{}'",
                self.name
            )));
        }
        Ok(self.tiles.entry(index).or_default())
    }

    /// Metadata for `index`, without creating an entry.
    pub fn existing_tile_mut(&mut self, index: TileIndex) -> Option<&mut TileMeta> {
        self.tiles.get_mut(&index)
    }

    /// Drops metadata entries that went back to their default state.
    pub fn prune_tiles(&mut self) {
        self.tiles.retain(|_, t| !t.is_default());
    }

    /// Pixel region of a tile inside the texture, as `(x, y, width, height)`.
    pub fn tile_region(&self, index: TileIndex) -> Option<(i32, i32, i32, i32)> {
        if !self.contains_index(index) {
            return None;
        }
        let row = index / self.column_count;
        let col = index % self.column_count;
        Some((
            col * self.tile_size.width,
            row * self.tile_size.height,
            self.tile_size.width,
            self.tile_size.height,
        ))
    }

    pub(crate) fn contexts(&self) -> impl Iterator<Item = &AttributeContext> {
        std::iter::once(&self.context).chain(self.tiles.values().flat_map(|t| {
            std::iter::once(&t.context).chain(t.objects.iter().map(|o| &o.context))
        }))
    }

    pub(crate) fn for_each_context_mut(&mut self, f: &mut dyn FnMut(&mut AttributeContext)) {
        f(&mut self.context);
        for tile in self.tiles.values_mut() {
            f(&mut tile.context);
            for object in &mut tile.objects {
                f(&mut object.context);
            }
        }
    }

    pub(crate) fn context_mut(&mut self, id: Uuid) -> Option<&mut AttributeContext> {
        if self.context.id() == id {
            return Some(&mut self.context);
        }
        for tile in self.tiles.values_mut() {
            if tile.context.id() == id {
                return Some(&mut tile.context);
            }
            if let Some(o) = tile.objects.iter_mut().find(|o| o.context.id() == id) {
                return Some(&mut o.context);
            }
        }
        None
    }
}

/// A tileset attached to a map, claiming the global ids `first_tile..=last_tile`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachedTileset {
    /// The attached tileset.
    pub tileset: Tileset,
    first_tile: TileId,
}

impl AttachedTileset {
    /// Global id of local tile 0.
    pub fn first_tile(&self) -> TileId {
        self.first_tile
    }

    /// Global id of the last tile.
    pub fn last_tile(&self) -> TileId {
        self.first_tile.saturating_add(self.tileset.tile_count() - 1)
    }

    /// The global id falls in this range.
    pub fn contains_tile(&self, id: TileId) -> bool {
        id >= self.first_tile && id <= self.last_tile()
    }

    /// Converts a global id in this range to a local index.
    pub fn to_local(&self, id: TileId) -> Option<TileIndex> {
        self.contains_tile(id).then(|| id - self.first_tile)
    }

    /// Converts a local index to its global id.
    pub fn to_global(&self, index: TileIndex) -> Option<TileId> {
        if self.tileset.contains_index(index) {
            self.first_tile.checked_add(index)
        } else {
            None
        }
    }
}

/// The ordered set of tilesets attached to one map.
#[derive(Debug, Clone, PartialEq)]
pub struct TilesetBundle {
    tilesets: Vec<AttachedTileset>,
    next_tile_id: TileId,
    active: Option<Uuid>,
}

impl Default for TilesetBundle {
    fn default() -> Self {
        TilesetBundle {
            tilesets: Vec::new(),
            next_tile_id: 1,
            active: None,
        }
    }
}

impl TilesetBundle {
    /// Number of attached tilesets.
    pub fn len(&self) -> usize {
        self.tilesets.len()
    }

    /// No tilesets attached.
    pub fn is_empty(&self) -> bool {
        self.tilesets.is_empty()
    }

    /// Tilesets in attachment order.
    pub fn iter(&self) -> impl Iterator<Item = &AttachedTileset> {
        self.tilesets.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut AttachedTileset> {
        self.tilesets.iter_mut()
    }

    /// First global id after every range handed out so far.
    pub fn next_tile_id(&self) -> TileId {
        self.next_tile_id
    }

    /// The selected tileset, if any.
    pub fn active_tileset(&self) -> Option<Uuid> {
        self.active
    }

    /// Looks up a tileset by id.
    pub fn get(&self, id: Uuid) -> Option<&AttachedTileset> {
        self.tilesets.iter().find(|t| t.tileset.id() == id)
    }

    /// Mutable lookup by id.
    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut AttachedTileset> {
        self.tilesets.iter_mut().find(|t| t.tileset.id() == id)
    }

    /// Attaches with the next free global id as first tile. Becomes the active tileset.
    pub fn attach(&mut self, tileset: Tileset) -> Result<Uuid, MapError> {
        let first = self.next_tile_id;
        self.attach_at(tileset, first)
    }

    /// Attaches with an explicit first tile, as read from a file.
    pub fn attach_at(&mut self, tileset: Tileset, first_tile: TileId) -> Result<Uuid, MapError> {
        let index = self.tilesets.len();
        self.insert(index, AttachedTileset { tileset, first_tile })
    }

    fn insert(&mut self, index: usize, attached: AttachedTileset) -> Result<Uuid, MapError> {
        let first = attached.first_tile;
        if first < 1 {
            return Err(MapError::InvalidArgument(format!(
                "first tile id must be positive, got {first}"
            )));
        }
        let end = first
            .checked_add(attached.tileset.tile_count())
            .ok_or_else(|| {
                MapError::InvalidArgument(format!(
                    "tile ids of tileset '{}' starting at {first} do not fit in 32 bits",
                    attached.tileset.name
                ))
            })?;
        let last = end - 1;
        if self.get(attached.tileset.id()).is_some() {
            return Err(MapError::InvalidArgument(format!(
                "tileset {} is already attached",
                attached.tileset.id()
            )));
        }
        if let Some(other) = self
            .tilesets
            .iter()
            .find(|t| first <= t.last_tile() && t.first_tile <= last)
        {
            return Err(MapError::InvalidArgument(format!(
                "tile range {first}..={last} overlaps tileset '{}'",
                other.tileset.name
            )));
        }

        let id = attached.tileset.id();
        self.next_tile_id = self.next_tile_id.max(end);
        let index = index.min(self.tilesets.len());
        self.tilesets.insert(index, attached);
        self.active = Some(id);
        Ok(id)
    }

    /// Detaches a tileset, returning it with its former position.
    pub fn detach(&mut self, id: Uuid) -> Option<(usize, AttachedTileset)> {
        let index = self.tilesets.iter().position(|t| t.tileset.id() == id)?;
        let attached = self.tilesets.remove(index);
        if self.active == Some(id) {
            self.active = self.tilesets.first().map(|t| t.tileset.id());
        }
        Some((index, attached))
    }

    /// Puts a detached tileset back, keeping its original first tile.
    pub fn restore(&mut self, index: usize, attached: AttachedTileset) -> Result<(), MapError> {
        self.insert(index, attached).map(|_| ())
    }

    /// Makes `id` the active tileset.
    pub fn select(&mut self, id: Uuid) -> Result<(), MapError> {
        if self.get(id).is_none() {
            return Err(MapError::TilesetNotFound(id));
        }
        self.active = Some(id);
        Ok(())
    }

    /// Range lookup of the tileset owning a global tile id.
    pub fn find_tileset_for_tile(&self, id: TileId) -> Option<&AttachedTileset> {
        self.tilesets.iter().find(|t| t.contains_tile(id))
    }

    /// Some attached tileset claims `id`.
    pub fn is_valid_tile(&self, id: TileId) -> bool {
        self.find_tileset_for_tile(id).is_some()
    }

    /// Local index of a global id in whichever tileset claims it.
    pub fn to_local_index(&self, id: TileId) -> Option<TileIndex> {
        self.find_tileset_for_tile(id).and_then(|t| t.to_local(id))
    }
}
