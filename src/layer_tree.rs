//! Arena storage for the layer hierarchy.
//!
//! All layers live in one table keyed by UUID. Group layers and the invisible root only
//! hold child UUIDs, and each layer keeps a non-owning `parent` link for lookups.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::MapError;
use crate::layer::{GroupLayer, Layer, LayerKind, LayerType, LayerVisitor, ObjectLayer, TileLayer};
use crate::map::mint;

/// Every layer of a map keyed by UUID, plus the top-level draw order.
#[derive(Debug, Clone, Default)]
pub struct LayerTree {
    nodes: HashMap<Uuid, Layer>,
    root: Vec<Uuid>,
}

/// A detached layer together with all of its descendants.
///
/// Remembers where it was attached so it can be put back exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSubtree {
    root: Uuid,
    parent: Option<Uuid>,
    index: usize,
    nodes: Vec<Layer>,
}

impl LayerSubtree {
    /// The layer the subtree was detached from.
    pub fn root_id(&self) -> Uuid {
        self.root
    }

    /// Where the root used to hang, `None` for the top level.
    pub fn parent(&self) -> Option<Uuid> {
        self.parent
    }

    /// Former position among its siblings.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Root first, then descendants depth-first.
    pub fn layers(&self) -> &[Layer] {
        &self.nodes
    }

    /// The layer is part of the subtree.
    pub fn contains(&self, id: Uuid) -> bool {
        self.nodes.iter().any(|l| l.id == id)
    }
}

impl LayerTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of layers, at any depth.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// No layers at all.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The layer is part of the tree.
    pub fn contains(&self, id: Uuid) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Looks up a layer at any depth.
    pub fn get(&self, id: Uuid) -> Option<&Layer> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: Uuid) -> Option<&mut Layer> {
        self.nodes.get_mut(&id)
    }

    /// Like `get`, but a missing id is an error.
    pub fn layer(&self, id: Uuid) -> Result<&Layer, MapError> {
        self.nodes.get(&id).ok_or(MapError::LayerNotFound(id))
    }

    pub(crate) fn layer_mut(&mut self, id: Uuid) -> Result<&mut Layer, MapError> {
        self.nodes.get_mut(&id).ok_or(MapError::LayerNotFound(id))
    }

    /// The tile payload of `id`, if it is a tile layer.
    pub fn find_tile_layer(&self, id: Uuid) -> Option<&TileLayer> {
        self.get(id).and_then(Layer::as_tile_layer)
    }

    /// The object payload of `id`, if it is an object layer.
    pub fn find_object_layer(&self, id: Uuid) -> Option<&ObjectLayer> {
        self.get(id).and_then(Layer::as_object_layer)
    }

    /// Mutable object payload of `id`.
    pub fn find_object_layer_mut(&mut self, id: Uuid) -> Option<&mut ObjectLayer> {
        self.get_mut(id).and_then(Layer::as_object_layer_mut)
    }

    /// The group payload of `id`, if it is a group.
    pub fn find_group_layer(&self, id: Uuid) -> Option<&GroupLayer> {
        self.get(id).and_then(Layer::as_group_layer)
    }

    /// Tile payload, erroring on a missing or non-tile layer.
    pub fn get_tile_layer(&self, id: Uuid) -> Result<&TileLayer, MapError> {
        self.layer(id)?
            .as_tile_layer()
            .ok_or(MapError::WrongLayerType {
                id,
                expected: LayerType::Tile,
            })
    }

    pub(crate) fn get_tile_layer_mut(&mut self, id: Uuid) -> Result<&mut TileLayer, MapError> {
        self.layer_mut(id)?
            .as_tile_layer_mut()
            .ok_or(MapError::WrongLayerType {
                id,
                expected: LayerType::Tile,
            })
    }

    /// Object payload, erroring on a missing or non-object layer.
    pub fn get_object_layer(&self, id: Uuid) -> Result<&ObjectLayer, MapError> {
        self.layer(id)?
            .as_object_layer()
            .ok_or(MapError::WrongLayerType {
                id,
                expected: LayerType::Object,
            })
    }

    /// Mutable object payload, with the same errors as `get_object_layer`.
    pub fn get_object_layer_mut(&mut self, id: Uuid) -> Result<&mut ObjectLayer, MapError> {
        self.layer_mut(id)?
            .as_object_layer_mut()
            .ok_or(MapError::WrongLayerType {
                id,
                expected: LayerType::Object,
            })
    }

    /// Group payload, erroring on a missing or non-group layer.
    pub fn get_group_layer(&self, id: Uuid) -> Result<&GroupLayer, MapError> {
        self.layer(id)?
            .as_group_layer()
            .ok_or(MapError::WrongLayerType {
                id,
                expected: LayerType::Group,
            })
    }

    /// Direct children of `parent`, or the top-level layers for `None`.
    pub fn children(&self, parent: Option<Uuid>) -> Result<&[Uuid], MapError> {
        match parent {
            None => Ok(&self.root),
            Some(p) => self
                .get(p)
                .and_then(Layer::as_group_layer)
                .map(GroupLayer::children)
                .ok_or(MapError::InvalidParent(p)),
        }
    }

    /// Number of direct children of `parent`, zero for anything that is not a group.
    pub fn layer_count(&self, parent: Option<Uuid>) -> usize {
        self.children(parent).map_or(0, <[Uuid]>::len)
    }

    /// Position of a layer among its siblings.
    pub fn local_index(&self, id: Uuid) -> Option<usize> {
        let parent = self.get(id)?.parent;
        self.children(parent).ok()?.iter().position(|c| *c == id)
    }

    /// The parent group, `None` for top-level or unknown layers.
    pub fn parent_of(&self, id: Uuid) -> Option<Uuid> {
        self.get(id).and_then(Layer::parent)
    }

    /// True if `ancestor` is `id` itself or one of its parents.
    pub fn is_ancestor(&self, ancestor: Uuid, id: Uuid) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent_of(current);
        }
        false
    }

    /// Appends `layer` as the last child of `parent` (or of the root).
    pub fn add(&mut self, layer: Layer, parent: Option<Uuid>) -> Result<Uuid, MapError> {
        self.insert(layer, parent, usize::MAX)
    }

    /// Inserts a childless layer at `index` (clamped) among the children of `parent`.
    pub fn insert(&mut self, mut layer: Layer, parent: Option<Uuid>, index: usize) -> Result<Uuid, MapError> {
        if self.contains(layer.id) {
            return Err(MapError::DuplicateLayer(layer.id));
        }
        if layer.as_group_layer().is_some_and(|g| !g.is_empty()) {
            return Err(MapError::InvalidArgument(
                "a group layer must be added before its children".to_owned(),
            ));
        }

        let id = layer.id;
        let siblings = self.siblings_mut(parent)?;
        let index = index.min(siblings.len());
        siblings.insert(index, id);

        layer.parent = parent;
        self.nodes.insert(id, layer);
        Ok(id)
    }

    /// Detaches a layer and its descendants. Unknown ids are ignored.
    pub fn remove(&mut self, id: Uuid) -> Option<LayerSubtree> {
        let parent = self.get(id)?.parent;
        let index = self.local_index(id)?;
        if let Ok(siblings) = self.siblings_mut(parent) {
            siblings.remove(index);
        }

        let nodes = self
            .subtree_ids(id)
            .into_iter()
            .filter_map(|i| self.nodes.remove(&i))
            .collect();

        Some(LayerSubtree {
            root: id,
            parent,
            index,
            nodes,
        })
    }

    /// Re-attaches a subtree previously returned by [`LayerTree::remove`].
    pub fn restore(&mut self, subtree: LayerSubtree) -> Result<(), MapError> {
        if let Some(clash) = subtree.nodes.iter().find(|l| self.contains(l.id)) {
            return Err(MapError::DuplicateLayer(clash.id));
        }
        let siblings = self.siblings_mut(subtree.parent)?;
        let index = subtree.index.min(siblings.len());
        siblings.insert(index, subtree.root);

        for layer in subtree.nodes {
            self.nodes.insert(layer.id, layer);
        }
        Ok(())
    }

    /// Deep-copies a layer and its descendants right after the original.
    ///
    /// Every copied node, object and context receives a fresh UUID, and fresh persistent
    /// ids are drawn from the two counters.
    pub fn duplicate(
        &mut self,
        id: Uuid,
        next_layer_id: &mut i32,
        next_object_id: &mut i32,
    ) -> Result<Uuid, MapError> {
        let source = self.layer(id)?;
        let parent = source.parent;
        let index = self.local_index(id).unwrap_or(usize::MAX);

        let ids = self.subtree_ids(id);
        let remap: HashMap<Uuid, Uuid> = ids.iter().map(|old| (*old, Uuid::new_v4())).collect();

        let mut copies = Vec::with_capacity(ids.len());
        for old in &ids {
            let mut copy = self.layer(*old)?.clone();
            copy.id = remap[old];
            copy.parent = copy.parent.map(|p| remap.get(&p).copied().unwrap_or(p));
            copy.persistent_id = mint(next_layer_id, "layer")?;
            copy.context = copy.context.clone_fresh();

            match &mut copy.kind {
                LayerKind::Group(group) => {
                    for child in &mut group.children {
                        *child = remap[child];
                    }
                }
                LayerKind::Object(objects) => {
                    let mut fresh = ObjectLayer::default();
                    let mut active = None;
                    for object in objects.objects() {
                        let object_copy = object.clone_fresh(mint(next_object_id, "object")?);
                        if objects.active_object() == Some(object.id) {
                            active = Some(object_copy.id);
                        }
                        fresh.add_object(object_copy);
                    }
                    fresh.select_object(active)?;
                    *objects = fresh;
                }
                LayerKind::Tile(_) => {}
            }
            copies.push(copy);
        }

        let new_root = remap[&id];
        self.restore(LayerSubtree {
            root: new_root,
            parent,
            index: index.saturating_add(1),
            nodes: copies,
        })?;
        Ok(new_root)
    }

    /// Moves a layer under a new parent at `index` (clamped), returning its old parent and
    /// index. A layer can never be moved into its own subtree.
    pub fn reparent(
        &mut self,
        id: Uuid,
        new_parent: Option<Uuid>,
        index: usize,
    ) -> Result<(Option<Uuid>, usize), MapError> {
        let old_parent = self.layer(id)?.parent;
        if let Some(p) = new_parent {
            if self.is_ancestor(id, p) {
                return Err(MapError::CyclicLayerTree(id));
            }
        }
        // Validate the destination before detaching anything.
        self.children(new_parent)?;

        let old_index = self
            .local_index(id)
            .ok_or(MapError::LayerNotFound(id))?;
        self.siblings_mut(old_parent)?.remove(old_index);

        let siblings = self.siblings_mut(new_parent)?;
        let index = index.min(siblings.len());
        siblings.insert(index, id);
        self.layer_mut(id)?.parent = new_parent;

        Ok((old_parent, old_index))
    }

    /// The layer has a sibling before it.
    pub fn can_move_up(&self, id: Uuid) -> bool {
        self.local_index(id).is_some_and(|i| i > 0)
    }

    /// The layer has a sibling after it.
    pub fn can_move_down(&self, id: Uuid) -> bool {
        let Some(layer) = self.get(id) else {
            return false;
        };
        match (self.local_index(id), self.children(layer.parent)) {
            (Some(i), Ok(siblings)) => i + 1 < siblings.len(),
            _ => false,
        }
    }

    /// Swaps a layer with its previous sibling.
    pub fn move_up(&mut self, id: Uuid) -> Result<(), MapError> {
        self.swap_with_sibling(id, -1)
    }

    /// Swaps a layer with its next sibling.
    pub fn move_down(&mut self, id: Uuid) -> Result<(), MapError> {
        self.swap_with_sibling(id, 1)
    }

    fn swap_with_sibling(&mut self, id: Uuid, delta: isize) -> Result<(), MapError> {
        let parent = self.layer(id)?.parent;
        let index = self.local_index(id).ok_or(MapError::LayerNotFound(id))?;
        let siblings = self.siblings_mut(parent)?;
        let target = index
            .checked_add_signed(delta)
            .filter(|t| *t < siblings.len())
            .ok_or_else(|| MapError::InvalidArgument(format!("layer {id} cannot be moved further")))?;
        siblings.swap(index, target);
        Ok(())
    }

    /// Every layer id, parents before children, siblings in order.
    pub fn depth_first(&self) -> Vec<Uuid> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<Uuid> = self.root.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(group) = self.find_group_layer(id) {
                stack.extend(group.children().iter().rev().copied());
            }
        }
        out
    }

    /// Calls `visitor` for every layer, depth first in draw order.
    pub fn visit(&self, visitor: &mut dyn LayerVisitor) {
        for id in self.depth_first() {
            if let Some(layer) = self.get(id) {
                layer.dispatch(visitor);
            }
        }
    }

    /// All layers, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.nodes.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Layer> {
        self.nodes.values_mut()
    }

    pub(crate) fn tile_layers_mut(&mut self) -> impl Iterator<Item = (Uuid, &mut TileLayer)> {
        self.nodes
            .iter_mut()
            .filter_map(|(id, layer)| layer.as_tile_layer_mut().map(|t| (*id, t)))
    }

    fn subtree_ids(&self, id: Uuid) -> Vec<Uuid> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(group) = self.find_group_layer(current) {
                stack.extend(group.children().iter().rev().copied());
            }
        }
        out
    }

    fn siblings_mut(&mut self, parent: Option<Uuid>) -> Result<&mut Vec<Uuid>, MapError> {
        match parent {
            None => Ok(&mut self.root),
            Some(p) => self
                .nodes
                .get_mut(&p)
                .and_then(Layer::as_group_layer_mut)
                .map(|g| &mut g.children)
                .ok_or(MapError::InvalidParent(p)),
        }
    }
}
