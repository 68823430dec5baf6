use uuid::Uuid;

use crate::attribute::{Attribute, AttributeType};
use crate::command::{downcast, Command};
use crate::error::MapError;
use crate::map::Map;

/// Adds a property holding the default value of its type. Every redo adds it fresh.
#[derive(Debug)]
pub struct AddProperty {
    context: Uuid,
    name: String,
    ty: AttributeType,
}

impl AddProperty {
    /// Fails if the context already has a property of that name.
    pub fn new(
        map: &Map,
        context: Uuid,
        name: impl Into<String>,
        ty: AttributeType,
    ) -> Result<Self, MapError> {
        let name = name.into();
        if map.get_context(context)?.has_property(&name) {
            return Err(MapError::DuplicateProperty(name));
        }
        Ok(AddProperty { context, name, ty })
    }
}

impl Command for AddProperty {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.get_context_mut(self.context)?
            .add_property(self.name.clone(), self.ty)
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.get_context_mut(self.context)?
            .remove_property(&self.name)
            .map(|_| ())
    }

    fn name(&self) -> &str {
        "Add Property"
    }

    command_kind!(AddProperty);
}

/// Removes a property. Undo restores its value and position.
#[derive(Debug)]
pub struct RemoveProperty {
    context: Uuid,
    name: String,
    removed: Option<(usize, Attribute)>,
}

impl RemoveProperty {
    /// Fails if the property does not exist.
    pub fn new(map: &Map, context: Uuid, name: impl Into<String>) -> Result<Self, MapError> {
        let name = name.into();
        if !map.get_context(context)?.has_property(&name) {
            return Err(MapError::PropertyNotFound(name));
        }
        Ok(RemoveProperty {
            context,
            name,
            removed: None,
        })
    }
}

impl Command for RemoveProperty {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        self.removed = Some(map.get_context_mut(self.context)?.remove_property(&self.name)?);
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        let ctx = map.get_context_mut(self.context)?;
        if let Some((index, value)) = self.removed.take() {
            ctx.properties.insert_at(index, self.name.clone(), value)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Remove Property"
    }

    command_kind!(RemoveProperty);
}

/// Renames a property in place.
#[derive(Debug)]
pub struct RenameProperty {
    context: Uuid,
    old_name: String,
    new_name: String,
}

impl RenameProperty {
    /// Fails if `old_name` is missing or `new_name` is taken by another property.
    pub fn new(
        map: &Map,
        context: Uuid,
        old_name: impl Into<String>,
        new_name: impl Into<String>,
    ) -> Result<Self, MapError> {
        let (old_name, new_name) = (old_name.into(), new_name.into());
        let ctx = map.get_context(context)?;
        if !ctx.has_property(&old_name) {
            return Err(MapError::PropertyNotFound(old_name));
        }
        if old_name != new_name && ctx.has_property(&new_name) {
            return Err(MapError::DuplicateProperty(new_name));
        }
        Ok(RenameProperty {
            context,
            old_name,
            new_name,
        })
    }
}

impl Command for RenameProperty {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.get_context_mut(self.context)?
            .rename_property(&self.old_name, self.new_name.clone())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.get_context_mut(self.context)?
            .rename_property(&self.new_name, self.old_name.clone())
    }

    fn name(&self) -> &str {
        "Rename Property"
    }

    command_kind!(RenameProperty);
}

/// Sets a property value. Edits of the same property merge and undo to the value it had
/// before the first one.
#[derive(Debug)]
pub struct UpdateProperty {
    context: Uuid,
    name: String,
    old_value: Attribute,
    new_value: Attribute,
}

impl UpdateProperty {
    /// Fails if the property does not exist.
    pub fn new(
        map: &Map,
        context: Uuid,
        name: impl Into<String>,
        value: Attribute,
    ) -> Result<Self, MapError> {
        let name = name.into();
        let old_value = map
            .get_context(context)?
            .property(&name)
            .cloned()
            .ok_or_else(|| MapError::PropertyNotFound(name.clone()))?;
        Ok(UpdateProperty {
            context,
            name,
            old_value,
            new_value: value,
        })
    }
}

impl Command for UpdateProperty {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.get_context_mut(self.context)?
            .update_property(&self.name, self.new_value.clone())
            .map(|_| ())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        map.get_context_mut(self.context)?
            .update_property(&self.name, self.old_value.clone())
            .map(|_| ())
    }

    fn name(&self) -> &str {
        "Update Property"
    }

    fn merge_with(&mut self, map: &mut Map, other: &dyn Command) -> Result<bool, MapError> {
        match downcast::<UpdateProperty>(other) {
            Some(other) if other.context == self.context && other.name == self.name => {
                self.new_value = other.new_value.clone();
                self.redo(map)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    command_kind!(UpdateProperty);
}

/// Switches a property to another type. The value is reset to the new type's default.
#[derive(Debug)]
pub struct ChangePropertyType {
    context: Uuid,
    name: String,
    ty: AttributeType,
    previous: Option<Attribute>,
}

impl ChangePropertyType {
    /// Fails if the property does not exist.
    pub fn new(
        map: &Map,
        context: Uuid,
        name: impl Into<String>,
        ty: AttributeType,
    ) -> Result<Self, MapError> {
        let name = name.into();
        if !map.get_context(context)?.has_property(&name) {
            return Err(MapError::PropertyNotFound(name));
        }
        Ok(ChangePropertyType {
            context,
            name,
            ty,
            previous: None,
        })
    }
}

impl Command for ChangePropertyType {
    fn redo(&mut self, map: &mut Map) -> Result<(), MapError> {
        let previous = map
            .get_context_mut(self.context)?
            .change_property_type(&self.name, self.ty)?;
        self.previous = Some(previous);
        Ok(())
    }

    fn undo(&mut self, map: &mut Map) -> Result<(), MapError> {
        if let Some(previous) = self.previous.take() {
            map.get_context_mut(self.context)?
                .update_property(&self.name, previous)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Change Property Type"
    }

    command_kind!(ChangePropertyType);
}
