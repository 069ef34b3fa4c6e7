//! Entity metadata and instances.
//!
//! An [`EntityType`] describes a persistable type: its name, its identifier
//! attribute and the attributes a fixture script may assign. Instances are
//! [`Entity`] values created by default-construction through
//! [`EntityType::instantiate`] and then populated attribute by attribute.

use crate::value::Value;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Metadata for a persistable entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityType {
    name: String,
    id_attribute: String,
    attributes: Vec<String>,
    defaults: BTreeMap<String, Value>,
    instantiable: bool,
}

impl EntityType {
    /// Creates a new entity type with an `id` attribute and nothing else.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_attribute: "id".to_string(),
            attributes: vec!["id".to_string()],
            defaults: BTreeMap::new(),
            instantiable: true,
        }
    }

    /// Declares an attribute.
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.attributes.contains(&name) {
            self.attributes.push(name);
        }
        self
    }

    /// Declares several attributes.
    pub fn attributes<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(self, |ty, name| ty.attribute(name))
    }

    /// Renames the identifier attribute (default `id`).
    pub fn id_attribute(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.attributes.retain(|a| a != &self.id_attribute);
        self.attributes.insert(0, name.clone());
        self.id_attribute = name;
        self
    }

    /// Declares an attribute with a default value applied at construction.
    pub fn default_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        self = self.attribute(name.clone());
        self.defaults.insert(name, value.into());
        self
    }

    /// Marks the type as abstract: it cannot be default-constructed.
    pub fn abstract_type(mut self) -> Self {
        self.instantiable = false;
        self
    }

    /// Returns the type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name of the identifier attribute.
    pub fn id_name(&self) -> &str {
        &self.id_attribute
    }

    /// Returns the declared attributes, identifier first.
    pub fn attribute_names(&self) -> &[String] {
        &self.attributes
    }

    /// Returns true if the attribute is declared.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    /// Returns true if the type can be default-constructed.
    pub fn is_instantiable(&self) -> bool {
        self.instantiable
    }

    /// Default-constructs a new, unpersisted instance.
    ///
    /// Every declared attribute is present, holding its default or `Nil`.
    pub fn instantiate(&self) -> Result<Entity> {
        if !self.instantiable {
            return Err(Error::instantiation(
                &self.name,
                "type is abstract and has no default constructor",
            ));
        }

        let attributes = self
            .attributes
            .iter()
            .map(|name| (name.clone(), self.defaults.get(name).cloned().unwrap_or_default()))
            .collect();

        Ok(Entity { entity_type: self.name.clone(), attributes })
    }
}

/// An instance of an [`EntityType`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    entity_type: String,
    attributes: BTreeMap<String, Value>,
}

impl Entity {
    /// Returns the name of the entity's type.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Returns an attribute value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Assigns a declared attribute.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the attribute was not declared on the type.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        match self.attributes.get_mut(name) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(Error::usage(format!(
                "entity type '{}' has no attribute '{}'",
                self.entity_type, name
            ))),
        }
    }

    /// Returns all attributes.
    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.entity_type)?;
        for (i, (name, value)) in self.attributes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        write!(f, "}}")
    }
}

/// Registry of entity types available to fixture scripts, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    types: BTreeMap<String, Arc<EntityType>>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type, replacing any type with the same name.
    pub fn register(&mut self, entity_type: EntityType) -> Arc<EntityType> {
        let entity_type = Arc::new(entity_type);
        self.types.insert(entity_type.name().to_string(), Arc::clone(&entity_type));
        entity_type
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with(mut self, entity_type: EntityType) -> Self {
        self.register(entity_type);
        self
    }

    /// Looks up a type by name.
    pub fn get(&self, name: &str) -> Option<Arc<EntityType>> {
        self.types.get(name).cloned()
    }

    /// Looks up a type by name, failing with `NotFound`.
    pub fn require(&self, name: &str) -> Result<Arc<EntityType>> {
        self.get(name).ok_or_else(|| Error::not_found(format!("entity type '{}'", name)))
    }

    /// Iterates over registered types in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityType>> {
        self.types.values()
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if no type is registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
