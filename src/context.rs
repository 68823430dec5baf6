//! Property and component bundles.
//!
//! Every map, layer, object, tileset and tile owns exactly one [`AttributeContext`]. A context
//! holds free-form properties plus instances of the map-wide component schemas kept in a
//! [`ComponentIndex`].

use uuid::Uuid;

use crate::attribute::{Attribute, AttributeType};
use crate::error::MapError;

/// Name -> attribute mapping that remembers insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMap {
    entries: Vec<(String, Attribute)>,
}

impl PropertyMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// An entry with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Position of the entry in insertion order.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n == name)
    }

    /// Value by name.
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    /// Mutable value by name. Replacing it may change its type.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, a)| a)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.entries.iter().map(|(n, a)| (n.as_str(), a))
    }

    /// Names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Appends a new entry, names must be unique.
    pub fn add(&mut self, name: impl Into<String>, value: Attribute) -> Result<(), MapError> {
        let name = name.into();
        if self.contains(&name) {
            return Err(MapError::DuplicateProperty(name));
        }
        self.entries.push((name, value));
        Ok(())
    }

    /// Inserts at `index` (clamped), used to put a removed entry back where it was.
    pub fn insert_at(
        &mut self,
        index: usize,
        name: impl Into<String>,
        value: Attribute,
    ) -> Result<(), MapError> {
        let name = name.into();
        if self.contains(&name) {
            return Err(MapError::DuplicateProperty(name));
        }
        let index = index.min(self.entries.len());
        self.entries.insert(index, (name, value));
        Ok(())
    }

    /// Removes an entry, returning its former index and value.
    pub fn remove(&mut self, name: &str) -> Result<(usize, Attribute), MapError> {
        let index = self
            .index_of(name)
            .ok_or_else(|| MapError::PropertyNotFound(name.to_owned()))?;
        let (_, value) = self.entries.remove(index);
        Ok((index, value))
    }

    /// Renames in place, keeping the entry's position.
    pub fn rename(&mut self, old: &str, new: impl Into<String>) -> Result<(), MapError> {
        let new = new.into();
        if old == new {
            return Ok(());
        }
        if self.contains(&new) {
            return Err(MapError::DuplicateProperty(new));
        }
        let index = self
            .index_of(old)
            .ok_or_else(|| MapError::PropertyNotFound(old.to_owned()))?;
        self.entries[index].0 = new;
        Ok(())
    }

    /// Replaces a value, returning the previous one.
    pub fn update(&mut self, name: &str, value: Attribute) -> Result<Attribute, MapError> {
        let slot = self
            .get_mut(name)
            .ok_or_else(|| MapError::PropertyNotFound(name.to_owned()))?;
        Ok(std::mem::replace(slot, value))
    }
}

impl FromIterator<(String, Attribute)> for PropertyMap {
    /// Later duplicates replace earlier values.
    fn from_iter<T: IntoIterator<Item = (String, Attribute)>>(iter: T) -> Self {
        let mut map = PropertyMap::new();
        for (name, value) in iter {
            match map.get_mut(&name) {
                Some(slot) => *slot = value,
                None => map.entries.push((name, value)),
            }
        }
        map
    }
}

/// A map-wide component schema: a name plus default attribute values.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDefinition {
    /// Stable identity, independent of the name.
    pub id: Uuid,
    /// Unique among the map's definitions.
    pub name: String,
    /// Attribute names, types and default values.
    pub attributes: PropertyMap,
}

impl ComponentDefinition {
    /// An empty schema with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        ComponentDefinition {
            id: Uuid::new_v4(),
            name: name.into(),
            attributes: PropertyMap::new(),
        }
    }

    /// A fresh instance holding the schema's default values.
    pub fn instantiate(&self) -> Component {
        Component {
            definition: self.name.clone(),
            values: self.attributes.clone(),
        }
    }
}

/// An instance of a [`ComponentDefinition`] attached to a context.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Name of the [`ComponentDefinition`] this instantiates.
    pub definition: String,
    /// Current values, one per schema attribute.
    pub values: PropertyMap,
}

/// The component schemas defined for a map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentIndex {
    definitions: Vec<ComponentDefinition>,
}

impl ComponentIndex {
    /// No definitions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// No definitions.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Definitions in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentDefinition> {
        self.definitions.iter()
    }

    /// Definition by name.
    pub fn get(&self, name: &str) -> Option<&ComponentDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    /// Mutable definition by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ComponentDefinition> {
        self.definitions.iter_mut().find(|d| d.name == name)
    }

    /// Like [`ComponentIndex::get`], failing with `ComponentNotFound`.
    pub fn require(&self, name: &str) -> Result<&ComponentDefinition, MapError> {
        self.get(name)
            .ok_or_else(|| MapError::ComponentNotFound(name.to_owned()))
    }

    /// Appends an empty definition. Names must be unique.
    pub fn define(&mut self, name: impl Into<String>) -> Result<&mut ComponentDefinition, MapError> {
        self.insert(ComponentDefinition::new(name), usize::MAX)
    }

    /// Inserts a whole definition at `index` (clamped).
    pub fn insert(
        &mut self,
        definition: ComponentDefinition,
        index: usize,
    ) -> Result<&mut ComponentDefinition, MapError> {
        if self.get(&definition.name).is_some() {
            return Err(MapError::DuplicateComponent(definition.name));
        }
        let index = index.min(self.definitions.len());
        self.definitions.insert(index, definition);
        Ok(&mut self.definitions[index])
    }

    /// Removes a definition, returning it with its former index.
    pub fn undefine(&mut self, name: &str) -> Result<(usize, ComponentDefinition), MapError> {
        let index = self
            .definitions
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| MapError::ComponentNotFound(name.to_owned()))?;
        Ok((index, self.definitions.remove(index)))
    }

    /// Renames a definition. Renaming to the current name is a no-op.
    pub fn rename(&mut self, old: &str, new: impl Into<String>) -> Result<(), MapError> {
        let new = new.into();
        self.require(old)?;
        if old == new {
            return Ok(());
        }
        if self.get(&new).is_some() {
            return Err(MapError::DuplicateComponent(new));
        }
        self.require_mut(old)?.name = new;
        Ok(())
    }

    /// Adds an attribute with the zero value of `ty` as default.
    pub fn add_attribute(
        &mut self,
        definition: &str,
        name: impl Into<String>,
        ty: AttributeType,
    ) -> Result<(), MapError> {
        self.require_mut(definition)?
            .attributes
            .add(name, Attribute::with_type(ty))
    }

    /// Removes an attribute, returning its index and default value.
    pub fn remove_attribute(
        &mut self,
        definition: &str,
        name: &str,
    ) -> Result<(usize, Attribute), MapError> {
        self.require_mut(definition)?.attributes.remove(name)
    }

    /// Changes the default value new instances start out with.
    pub fn update_default(
        &mut self,
        definition: &str,
        name: &str,
        value: Attribute,
    ) -> Result<Attribute, MapError> {
        self.require_mut(definition)?.attributes.update(name, value)
    }

    fn require_mut(&mut self, name: &str) -> Result<&mut ComponentDefinition, MapError> {
        self.get_mut(name)
            .ok_or_else(|| MapError::ComponentNotFound(name.to_owned()))
    }
}

/// Properties plus attached components, identified by a UUID so commands can find it again.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeContext {
    id: Uuid,
    /// Free-form properties.
    pub properties: PropertyMap,
    components: Vec<Component>,
}

impl Default for AttributeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeContext {
    /// An empty context with a fresh id.
    pub fn new() -> Self {
        AttributeContext {
            id: Uuid::new_v4(),
            properties: PropertyMap::new(),
            components: Vec::new(),
        }
    }

    /// Identity used by commands to find this context again.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// A deep copy with a fresh identity.
    pub fn clone_fresh(&self) -> Self {
        AttributeContext {
            id: Uuid::new_v4(),
            ..self.clone()
        }
    }

    /// Property value by name.
    pub fn property(&self, name: &str) -> Option<&Attribute> {
        self.properties.get(name)
    }

    /// A property with this name exists.
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains(name)
    }

    /// Adds a property holding the default value of `ty`.
    pub fn add_property(&mut self, name: impl Into<String>, ty: AttributeType) -> Result<(), MapError> {
        self.properties.add(name, Attribute::with_type(ty))
    }

    /// Removes a property, returning its index and value.
    pub fn remove_property(&mut self, name: &str) -> Result<(usize, Attribute), MapError> {
        self.properties.remove(name)
    }

    /// Renames a property in place. Renaming to the current name is a no-op.
    pub fn rename_property(&mut self, old: &str, new: impl Into<String>) -> Result<(), MapError> {
        self.properties.rename(old, new)
    }

    /// Replaces a property value, returning the previous one.
    pub fn update_property(&mut self, name: &str, value: Attribute) -> Result<Attribute, MapError> {
        self.properties.update(name, value)
    }

    /// Switches the property to `ty` with that type's default value, returning the old value.
    pub fn change_property_type(
        &mut self,
        name: &str,
        ty: AttributeType,
    ) -> Result<Attribute, MapError> {
        self.properties.update(name, Attribute::with_type(ty))
    }

    /// Attached components in attach order.
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// An instance of `definition` is attached.
    pub fn has_component(&self, definition: &str) -> bool {
        self.component(definition).is_some()
    }

    /// The attached instance of `definition`.
    pub fn component(&self, definition: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.definition == definition)
    }

    /// Mutable attached instance of `definition`.
    pub fn component_mut(&mut self, definition: &str) -> Option<&mut Component> {
        self.components
            .iter_mut()
            .find(|c| c.definition == definition)
    }

    /// Appends a component. At most one instance per definition.
    pub fn attach_component(&mut self, component: Component) -> Result<(), MapError> {
        self.attach_component_at(component, usize::MAX)
    }

    /// Inserts a component at `index` (clamped).
    pub fn attach_component_at(&mut self, component: Component, index: usize) -> Result<(), MapError> {
        if self.has_component(&component.definition) {
            return Err(MapError::DuplicateComponent(component.definition));
        }
        let index = index.min(self.components.len());
        self.components.insert(index, component);
        Ok(())
    }

    /// Removes a component, returning it with its former index.
    pub fn detach_component(&mut self, definition: &str) -> Result<(usize, Component), MapError> {
        let index = self
            .components
            .iter()
            .position(|c| c.definition == definition)
            .ok_or_else(|| MapError::ComponentNotFound(definition.to_owned()))?;
        Ok((index, self.components.remove(index)))
    }

    /// Sets one value of an attached component, returning the previous one.
    pub fn update_component_value(
        &mut self,
        definition: &str,
        name: &str,
        value: Attribute,
    ) -> Result<Attribute, MapError> {
        self.component_mut(definition)
            .ok_or_else(|| MapError::ComponentNotFound(definition.to_owned()))?
            .values
            .update(name, value)
    }

    pub(crate) fn rename_component_instances(&mut self, old: &str, new: &str) {
        if let Some(c) = self.component_mut(old) {
            c.definition = new.to_owned();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_keep_insertion_order() {
        let mut ctx = AttributeContext::new();
        ctx.add_property("b", AttributeType::Int).unwrap();
        ctx.add_property("a", AttributeType::Bool).unwrap();
        ctx.add_property("c", AttributeType::String).unwrap();
        assert_eq!(ctx.properties.names().collect::<Vec<_>>(), ["b", "a", "c"]);

        ctx.rename_property("a", "z").unwrap();
        assert_eq!(ctx.properties.names().collect::<Vec<_>>(), ["b", "z", "c"]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut ctx = AttributeContext::new();
        ctx.add_property("foo", AttributeType::Int).unwrap();
        ctx.add_property("bar", AttributeType::Int).unwrap();
        assert_eq!(
            ctx.add_property("foo", AttributeType::Float),
            Err(MapError::DuplicateProperty("foo".into()))
        );
        assert_eq!(
            ctx.rename_property("bar", "foo"),
            Err(MapError::DuplicateProperty("foo".into()))
        );
    }

    #[test]
    fn remove_then_insert_restores_position() {
        let mut ctx = AttributeContext::new();
        for name in ["a", "b", "c"] {
            ctx.add_property(name, AttributeType::Int).unwrap();
        }
        let (index, value) = ctx.remove_property("b").unwrap();
        assert_eq!(index, 1);
        ctx.properties.insert_at(index, "b", value).unwrap();
        assert_eq!(ctx.properties.names().collect::<Vec<_>>(), ["a", "b", "c"]);
    }

    #[test]
    fn change_type_resets_to_default() {
        let mut ctx = AttributeContext::new();
        ctx.add_property("hp", AttributeType::Int).unwrap();
        ctx.update_property("hp", Attribute::Int(42)).unwrap();
        let old = ctx.change_property_type("hp", AttributeType::Float).unwrap();
        assert_eq!(old, Attribute::Int(42));
        assert_eq!(ctx.property("hp"), Some(&Attribute::Float(0.0)));
    }

    #[test]
    fn components_instantiate_defaults() {
        let mut index = ComponentIndex::new();
        let def = index.define("Health").unwrap();
        def.attributes.add("max", Attribute::Int(100)).unwrap();

        let mut ctx = AttributeContext::new();
        ctx.attach_component(index.require("Health").unwrap().instantiate())
            .unwrap();
        assert_eq!(
            ctx.component("Health").unwrap().values.get("max"),
            Some(&Attribute::Int(100))
        );
        assert!(matches!(
            ctx.attach_component(index.require("Health").unwrap().instantiate()),
            Err(MapError::DuplicateComponent(_))
        ));

        let old = ctx
            .update_component_value("Health", "max", Attribute::Int(5))
            .unwrap();
        assert_eq!(old, Attribute::Int(100));
    }

    #[test]
    fn renaming_a_component_to_its_own_name_is_a_no_op() {
        let mut index = ComponentIndex::new();
        index.define("Health").unwrap();
        index.define("Armor").unwrap();

        index.rename("Health", "Health").unwrap();
        assert!(index.get("Health").is_some());
        assert!(matches!(index.rename("Health", "Armor"), Err(MapError::DuplicateComponent(_))));
        assert!(matches!(index.rename("Mana", "Mana"), Err(MapError::ComponentNotFound(_))));

        let mut properties = PropertyMap::new();
        properties.add("speed", Attribute::Int(1)).unwrap();
        properties.rename("speed", "speed").unwrap();
        assert_eq!(properties.get("speed"), Some(&Attribute::Int(1)));
    }

    #[test]
    fn clone_fresh_changes_identity_only() {
        let mut ctx = AttributeContext::new();
        ctx.add_property("x", AttributeType::Int).unwrap();
        let copy = ctx.clone_fresh();
        assert_ne!(copy.id(), ctx.id());
        assert_eq!(copy.properties, ctx.properties);
    }
}
