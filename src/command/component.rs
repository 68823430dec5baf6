use uuid::Uuid;

use crate::attribute::Attribute;
use crate::command::{downcast, Command};
use crate::context::Component;
use crate::error::MapError;
use crate::map::{Map, RemovedComponent};

/// Adds an empty component definition.
#[derive(Debug)]
pub struct DefineComponent {
    name: String,
}

impl DefineComponent {
    /// Fails if the name is taken.
    pub fn new(map: &Map, name: impl Into<String>) -> Result<Self, MapError> {
        let name = name.into();
        if map.components().get(&name).is_some() {
            return Err(MapError::DuplicateComponent(name));
        }
        Ok(DefineComponent { name })
    }
}

impl Command for DefineComponent {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.define_component(self.name.clone())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.undefine_component(&self.name).map(|_| ())
    }

    fn name(&self) -> &str {
        "Define Component"
    }

    command_kind!(DefineComponent);
}

/// Removes a component definition along with every instance of it.
#[derive(Debug)]
pub struct UndefineComponent {
    name: String,
    removed: Option<RemovedComponent>,
}

impl UndefineComponent {
    /// Fails if no definition has that name.
    pub fn new(map: &Map, name: impl Into<String>) -> Result<Self, MapError> {
        let name = name.into();
        map.components().require(&name)?;
        Ok(UndefineComponent {
            name,
            removed: None,
        })
    }
}

impl Command for UndefineComponent {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.removed = Some(map.undefine_component(&self.name)?);
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        match self.removed.take() {
            Some(removed) => map.restore_component(removed),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "Undefine Component"
    }

    fn dispose(&mut self) {
        self.removed = None;
    }

    command_kind!(UndefineComponent);
}

/// Attaches a fresh instance of a component to a context.
#[derive(Debug)]
pub struct AttachComponent {
    context: Uuid,
    definition: String,
}

impl AttachComponent {
    /// Fails if the definition is unknown or already attached to the context.
    pub fn new(map: &Map, context: Uuid, definition: impl Into<String>) -> Result<Self, MapError> {
        let definition = definition.into();
        map.components().require(&definition)?;
        if map.get_context(context)?.has_component(&definition) {
            return Err(MapError::DuplicateComponent(definition));
        }
        Ok(AttachComponent {
            context,
            definition,
        })
    }
}

impl Command for AttachComponent {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.attach_component(self.context, &self.definition)
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.get_context_mut(self.context)?
            .detach_component(&self.definition)
            .map(|_| ())
    }

    fn name(&self) -> &str {
        "Attach Component"
    }

    command_kind!(AttachComponent);
}

/// Removes a component instance from a context. Undo puts back its values.
#[derive(Debug)]
pub struct DetachComponent {
    context: Uuid,
    definition: String,
    removed: Option<(usize, Component)>,
}

impl DetachComponent {
    /// Fails if the context has no instance of the definition.
    pub fn new(map: &Map, context: Uuid, definition: impl Into<String>) -> Result<Self, MapError> {
        let definition = definition.into();
        if !map.get_context(context)?.has_component(&definition) {
            return Err(MapError::ComponentNotFound(definition));
        }
        Ok(DetachComponent {
            context,
            definition,
            removed: None,
        })
    }
}

impl Command for DetachComponent {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.removed = Some(
            map.get_context_mut(self.context)?
                .detach_component(&self.definition)?,
        );
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        if let Some((index, component)) = self.removed.take() {
            map.get_context_mut(self.context)?
                .attach_component_at(component, index)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Detach Component"
    }

    command_kind!(DetachComponent);
}

/// Sets one attribute of an attached component. Edits of the same attribute merge.
#[derive(Debug)]
pub struct UpdateAttachedComponent {
    context: Uuid,
    definition: String,
    attribute: String,
    old_value: Attribute,
    new_value: Attribute,
}

impl UpdateAttachedComponent {
    /// The new value must keep the attribute's type.
    pub fn new(
        map: &Map,
        context: Uuid,
        definition: impl Into<String>,
        attribute: impl Into<String>,
        value: Attribute,
    ) -> Result<Self, MapError> {
        let (definition, attribute) = (definition.into(), attribute.into());
        let component = map
            .get_context(context)?
            .component(&definition)
            .ok_or_else(|| MapError::ComponentNotFound(definition.clone()))?;
        let old_value = component
            .values
            .get(&attribute)
            .cloned()
            .ok_or_else(|| MapError::PropertyNotFound(attribute.clone()))?;
        if old_value.attr_type() != value.attr_type() {
            return Err(MapError::TypeMismatch {
                expected: old_value.attr_type(),
                actual: value.attr_type(),
            });
        }
        Ok(UpdateAttachedComponent {
            context,
            definition,
            attribute,
            old_value,
            new_value: value,
        })
    }

    fn apply(&self, map: &mut Map, value: &Attribute) -> Result<(), MapError> {
        map.get_context_mut(self.context)?
            .update_component_value(&self.definition, &self.attribute, value.clone())
            .map(|_| ())
    }
}

impl Command for UpdateAttachedComponent {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.apply(map, &self.new_value)
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.apply(map, &self.old_value)
    }

    fn name(&self) -> &str {
        "Update Component Value"
    }

    fn merge_with(&mut self, map: &mut Map, other: &dyn Command) -> Result<bool, MapError> {
        match downcast::<UpdateAttachedComponent>(other) {
            Some(other)
                if other.context == self.context
                    && other.definition == self.definition
                    && other.attribute == self.attribute =>
            {
                self.new_value = other.new_value.clone();
                self.redo(map)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    command_kind!(UpdateAttachedComponent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeType;
    use crate::command::CommandStack;
    use crate::geom::Size;
    use crate::tile_matrix::TileExtent;
    use pretty_assertions::assert_eq;

    fn map_with_physics() -> (Map, Uuid) {
        let mut map = Map::new(TileExtent::new(2, 2), Size::new(16, 16)).unwrap();
        map.define_component("physics").unwrap();
        map.add_component_attribute("physics", "mass", AttributeType::Float)
            .unwrap();
        let layer = map.add_object_layer(None).unwrap();
        let ctx = map.layer(layer).unwrap().context.id();
        (map, ctx)
    }

    #[test]
    fn undefine_restores_definition_and_instances() {
        let (mut map, ctx) = map_with_physics();
        map.attach_component(ctx, "physics").unwrap();
        map.get_context_mut(ctx)
            .unwrap()
            .update_component_value("physics", "mass", Attribute::Float(3.5))
            .unwrap();
        let before = map.to_ir();

        let mut cmd = UndefineComponent::new(&map, "physics").unwrap();
        cmd.redo(&mut map).unwrap();
        assert!(map.components().is_empty());
        assert!(!map.get_context(ctx).unwrap().has_component("physics"));

        cmd.undo(&mut map).unwrap();
        assert_eq!(map.to_ir(), before);
    }

    #[test]
    fn attach_and_detach_round_trip() {
        let (mut map, ctx) = map_with_physics();
        let mut attach = AttachComponent::new(&map, ctx, "physics").unwrap();
        attach.redo(&mut map).unwrap();
        assert_eq!(
            map.get_context(ctx).unwrap().component("physics").unwrap().values.get("mass"),
            Some(&Attribute::Float(0.0))
        );
        assert_eq!(
            AttachComponent::new(&map, ctx, "physics").err(),
            Some(MapError::DuplicateComponent("physics".to_owned()))
        );

        let mut detach = DetachComponent::new(&map, ctx, "physics").unwrap();
        detach.redo(&mut map).unwrap();
        assert!(!map.get_context(ctx).unwrap().has_component("physics"));
        detach.undo(&mut map).unwrap();
        assert!(map.get_context(ctx).unwrap().has_component("physics"));

        attach.undo(&mut map).unwrap();
        assert!(map.get_context(ctx).unwrap().components().is_empty());
    }

    #[test]
    fn value_edits_merge() {
        let (mut map, ctx) = map_with_physics();
        map.attach_component(ctx, "physics").unwrap();
        let mut stack = CommandStack::default();
        for mass in [1.0, 2.0, 4.0] {
            let cmd =
                UpdateAttachedComponent::new(&map, ctx, "physics", "mass", Attribute::Float(mass))
                    .unwrap();
            stack.push(&mut map, cmd).unwrap();
        }
        assert_eq!(stack.len(), 1);
        let mass = |map: &Map| {
            map.get_context(ctx).unwrap().component("physics").unwrap().values.get("mass").cloned()
        };
        assert_eq!(mass(&map), Some(Attribute::Float(4.0)));
        stack.undo(&mut map).unwrap();
        assert_eq!(mass(&map), Some(Attribute::Float(0.0)));
    }

    #[test]
    fn value_of_the_wrong_type_is_rejected() {
        let (mut map, ctx) = map_with_physics();
        map.attach_component(ctx, "physics").unwrap();
        assert!(matches!(
            UpdateAttachedComponent::new(&map, ctx, "physics", "mass", Attribute::Int(1)),
            Err(MapError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn define_then_undo() {
        let (mut map, _) = map_with_physics();
        let mut cmd = DefineComponent::new(&map, "health").unwrap();
        cmd.redo(&mut map).unwrap();
        assert!(map.components().get("health").is_some());
        cmd.undo(&mut map).unwrap();
        assert!(map.components().get("health").is_none());
        assert!(DefineComponent::new(&map, "physics").is_err());
    }
}
