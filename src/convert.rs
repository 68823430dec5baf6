//! Snapshotting the live map into the IR and materialising an IR into a fresh map.

use tracing::warn;
use uuid::Uuid;

use crate::context::{AttributeContext, Component, ComponentDefinition, ComponentIndex};
use crate::error::MapError;
use crate::ir_map::{
    IrAnimationFrame, IrComponent, IrComponentDefinition, IrContext, IrLayer, IrLayerKind, IrMap,
    IrObject, IrTile, IrTileset,
};
use crate::layer::{Layer, LayerKind, ObjectLayer, TileLayer};
use crate::map::Map;
use crate::object::Object;
use crate::tileset::{AnimationFrame, Tileset, TextureInfo};

impl Map {
    /// A complete, self-contained copy of the document.
    pub fn to_ir(&self) -> IrMap {
        IrMap {
            extent: self.extent(),
            tile_size: self.tile_size(),
            next_layer_id: self.next_layer_id(),
            next_object_id: self.next_object_id(),
            tile_format: self.tile_format,
            component_definitions: self
                .components()
                .iter()
                .map(|def| IrComponentDefinition {
                    name: def.name.clone(),
                    attributes: def.attributes.clone(),
                })
                .collect(),
            tilesets: self
                .tilesets()
                .iter()
                .map(|attached| tileset_to_ir(&attached.tileset, attached.first_tile()))
                .collect(),
            layers: self.layers_to_ir(None),
            context: context_to_ir(&self.context),
        }
    }

    fn layers_to_ir(&self, parent: Option<Uuid>) -> Vec<IrLayer> {
        let Ok(children) = self.layers().children(parent) else {
            return Vec::new();
        };
        children
            .iter()
            .filter_map(|id| self.layers().get(*id))
            .map(|layer| IrLayer {
                id: layer.persistent_id,
                name: layer.name.clone(),
                opacity: layer.opacity(),
                visible: layer.visible,
                context: context_to_ir(&layer.context),
                kind: match &layer.kind {
                    LayerKind::Tile(tiles) => IrLayerKind::Tile(tiles.tiles().clone()),
                    LayerKind::Object(objects) => {
                        IrLayerKind::Object(objects.objects().iter().map(object_to_ir).collect())
                    }
                    LayerKind::Group(_) => IrLayerKind::Group(self.layers_to_ir(Some(layer.id()))),
                },
            })
            .collect()
    }

    /// Builds a new map from an IR. Tile layers whose grid disagrees with the map extent
    /// are resized to fit.
    pub fn from_ir(ir: &IrMap) -> Result<Map, MapError> {
        let mut map = Map::new(ir.extent, ir.tile_size)?;
        map.tile_format = ir.tile_format;

        for def in &ir.component_definitions {
            map.components_mut().insert(
                ComponentDefinition {
                    id: Uuid::new_v4(),
                    name: def.name.clone(),
                    attributes: def.attributes.clone(),
                },
                usize::MAX,
            )?;
        }
        map.context = context_from_ir(&ir.context, map.components())?;

        for ts in &ir.tilesets {
            let tileset = tileset_from_ir(ts, map.components())?;
            map.tilesets_mut().attach_at(tileset, ts.first_tile)?;
        }

        let mut max_layer_id = 0;
        let mut max_object_id = 0;
        add_layers(&mut map, &ir.layers, None, &mut max_layer_id, &mut max_object_id)?;
        let after_layers = max_layer_id.checked_add(1).ok_or(MapError::IdsExhausted("layer"))?;
        let after_objects = max_object_id.checked_add(1).ok_or(MapError::IdsExhausted("object"))?;
        map.advance_ids(
            ir.next_layer_id.max(after_layers),
            ir.next_object_id.max(after_objects),
        );
        Ok(map)
    }
}

fn add_layers(
    map: &mut Map,
    layers: &[IrLayer],
    parent: Option<Uuid>,
    max_layer_id: &mut i32,
    max_object_id: &mut i32,
) -> Result<(), MapError> {
    for ir in layers {
        *max_layer_id = (*max_layer_id).max(ir.id);
        let kind = match &ir.kind {
            IrLayerKind::Tile(matrix) => {
                let mut tiles = TileLayer::from_matrix(matrix.clone());
                if tiles.extent() != map.extent() {
                    warn!(
                        layer = %ir.name,
                        rows = matrix.row_count(),
                        cols = matrix.col_count(),
                        "tile layer extent differs from the map, using the map's"
                    );
                    tiles.resize(map.extent());
                }
                LayerKind::Tile(tiles)
            }
            IrLayerKind::Object(objects) => {
                let mut layer = ObjectLayer::default();
                for object in objects {
                    *max_object_id = (*max_object_id).max(object.id);
                    layer.add_object(object_from_ir(object, map.components())?);
                }
                LayerKind::Object(layer)
            }
            IrLayerKind::Group(_) => LayerKind::Group(Default::default()),
        };

        let mut layer = Layer::new(kind, ir.id, ir.name.clone());
        layer.set_opacity(ir.opacity);
        layer.visible = ir.visible;
        layer.context = context_from_ir(&ir.context, map.components())?;
        let id = map.add_layer(layer, parent)?;

        if let IrLayerKind::Group(children) = &ir.kind {
            add_layers(map, children, Some(id), max_layer_id, max_object_id)?;
        }
    }
    Ok(())
}

pub(crate) fn context_to_ir(ctx: &AttributeContext) -> IrContext {
    IrContext {
        properties: ctx.properties.clone(),
        components: ctx
            .components()
            .iter()
            .map(|c| IrComponent {
                definition: c.definition.clone(),
                values: c.values.clone(),
            })
            .collect(),
    }
}

pub(crate) fn context_from_ir(
    ir: &IrContext,
    components: &ComponentIndex,
) -> Result<AttributeContext, MapError> {
    let mut ctx = AttributeContext::new();
    ctx.properties = ir.properties.clone();
    for component in &ir.components {
        components.require(&component.definition)?;
        ctx.attach_component(Component {
            definition: component.definition.clone(),
            values: component.values.clone(),
        })?;
    }
    Ok(ctx)
}

fn object_to_ir(object: &Object) -> IrObject {
    IrObject {
        id: object.persistent_id,
        object_type: object.object_type,
        position: object.position,
        size: object.size,
        name: object.name.clone(),
        tag: object.tag.clone(),
        visible: object.visible,
        context: context_to_ir(&object.context),
    }
}

fn object_from_ir(ir: &IrObject, components: &ComponentIndex) -> Result<Object, MapError> {
    let mut object = Object::new(ir.object_type, ir.id);
    object.position = ir.position;
    object.size = ir.size;
    object.name = ir.name.clone();
    object.tag = ir.tag.clone();
    object.visible = ir.visible;
    object.context = context_from_ir(&ir.context, components)?;
    Ok(object)
}

fn tileset_to_ir(tileset: &Tileset, first_tile: i32) -> IrTileset {
    IrTileset {
        name: tileset.name.clone(),
        first_tile,
        tile_size: tileset.tile_size(),
        column_count: tileset.column_count(),
        tile_count: tileset.tile_count(),
        image_path: tileset.texture().path.clone(),
        image_size: tileset.texture().size,
        tiles: tileset
            .tiles()
            .filter(|(_, meta)| !meta.is_default())
            .map(|(index, meta)| IrTile {
                index,
                frames: meta
                    .frames
                    .iter()
                    .map(|f| IrAnimationFrame {
                        tile: f.tile,
                        duration_ms: f.duration_ms,
                    })
                    .collect(),
                objects: meta.objects.iter().map(object_to_ir).collect(),
                context: context_to_ir(&meta.context),
            })
            .collect(),
        context: context_to_ir(&tileset.context),
    }
}

fn tileset_from_ir(ir: &IrTileset, components: &ComponentIndex) -> Result<Tileset, MapError> {
    let mut tileset = Tileset::with_grid(
        ir.name.clone(),
        TextureInfo::new(ir.image_path.clone(), ir.image_size),
        ir.tile_size,
        ir.column_count,
        ir.tile_count,
    )?;
    tileset.context = context_from_ir(&ir.context, components)?;
    for tile in &ir.tiles {
        let meta = tileset.tile_mut(tile.index)?;
        meta.frames = tile
            .frames
            .iter()
            .map(|f| AnimationFrame {
                tile: f.tile,
                duration_ms: f.duration_ms,
            })
            .collect();
        meta.objects = tile
            .objects
            .iter()
            .map(|o| object_from_ir(o, components))
            .collect::<Result<_, _>>()?;
        meta.context = context_from_ir(&tile.context, components)?;
    }
    tileset.prune_tiles();
    Ok(tileset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{Attribute, AttributeType};
    use crate::geom::{vec2, Size};
    use crate::object::ObjectType;
    use crate::tile_matrix::{tile_pos, TileExtent, TileMatrix};
    use pretty_assertions::assert_eq;

    fn sample() -> Map {
        let mut map = Map::new(TileExtent::new(3, 4), Size::new(16, 16)).unwrap();
        map.define_component("Spawn").unwrap();
        map.add_component_attribute("Spawn", "team", AttributeType::Int)
            .unwrap();
        map.context.add_property("title", AttributeType::String).unwrap();

        let tileset = Tileset::new("tiles", TextureInfo::new("tiles.png", Size::new(64, 32)), Size::new(16, 16))
            .unwrap();
        let ts = map.attach_tileset(tileset).unwrap();
        map.tilesets_mut()
            .get_mut(ts)
            .unwrap()
            .tileset
            .tile_mut(3)
            .unwrap()
            .frames
            .push(AnimationFrame { tile: 4, duration_ms: 100 });

        let ground = map.add_tile_layer(None).unwrap();
        map.get_tile_layer_mut(ground)
            .unwrap()
            .set_tile(tile_pos(1, 2), 5)
            .unwrap();

        let group = map.add_group_layer(None).unwrap();
        let objects = map.add_object_layer(Some(group)).unwrap();
        let mut object = map.new_object(ObjectType::Ellipse).unwrap();
        object.position = vec2(8.0, 24.0);
        object.size = vec2(16.0, 8.0);
        object.tag = "enemy".into();
        map.get_object_layer_mut(objects).unwrap().add_object(object);

        let layer_ctx = map.layer(objects).unwrap().context.id();
        map.attach_component(layer_ctx, "Spawn").unwrap();
        map.layer_mut(group).unwrap().set_opacity(0.5);
        map
    }

    #[test]
    fn snapshot_mirrors_the_tree() {
        let ir = sample().to_ir();
        assert_eq!(ir.layers.len(), 2);
        assert_eq!(ir.next_layer_id, 4);
        assert_eq!(ir.next_object_id, 2);
        assert_eq!(ir.tilesets[0].tiles.len(), 1);

        let IrLayerKind::Group(children) = &ir.layers[1].kind else {
            panic!("expected a group");
        };
        assert_eq!(ir.layers[1].opacity, 0.5);
        let IrLayerKind::Object(objects) = &children[0].kind else {
            panic!("expected an object layer");
        };
        assert_eq!(objects[0].tag, "enemy");
        assert_eq!(children[0].context.components[0].definition, "Spawn");
        assert_eq!(
            children[0].context.components[0].values.get("team"),
            Some(&Attribute::Int(0))
        );
    }

    #[test]
    fn materialised_map_snapshots_identically() {
        let ir = sample().to_ir();
        let map = Map::from_ir(&ir).unwrap();
        assert_eq!(map.to_ir(), ir);
    }

    #[test]
    fn mismatched_tile_layer_is_resized() {
        let mut ir = IrMap::new(TileExtent::new(2, 2), Size::new(8, 8));
        ir.layers.push(IrLayer {
            id: 1,
            name: "wide".into(),
            opacity: 1.0,
            visible: true,
            context: IrContext::default(),
            kind: IrLayerKind::Tile(TileMatrix::new(TileExtent::new(2, 5))),
        });
        let map = Map::from_ir(&ir).unwrap();
        let id = map.layers().children(None).unwrap()[0];
        assert_eq!(map.get_tile_layer(id).unwrap().extent(), TileExtent::new(2, 2));
        assert_eq!(map.next_layer_id(), 2);
    }

    #[test]
    fn largest_layer_id_leaves_no_room_for_new_layers() {
        let mut ir = IrMap::new(TileExtent::new(1, 1), Size::new(8, 8));
        ir.layers.push(IrLayer {
            id: i32::MAX,
            name: "last".into(),
            opacity: 1.0,
            visible: true,
            context: IrContext::default(),
            kind: IrLayerKind::Group(Vec::new()),
        });
        assert_eq!(Map::from_ir(&ir).err(), Some(MapError::IdsExhausted("layer")));
    }

    #[test]
    fn unknown_component_is_rejected() {
        let mut ir = IrMap::new(TileExtent::new(1, 1), Size::new(8, 8));
        ir.context.components.push(IrComponent {
            definition: "Ghost".into(),
            values: Default::default(),
        });
        assert_eq!(
            Map::from_ir(&ir).err(),
            Some(MapError::ComponentNotFound("Ghost".into()))
        );
    }
}
