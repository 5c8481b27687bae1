//! Explicit per-type schema tables.
//!
//! Field enumeration is declared by the caller (usually as statics) instead
//! of recovered through runtime introspection; correctness lives in the
//! table, not in reflection. The registry is the per-type cache: repeat
//! lookups hand back the same `'static` slice, so downstream caching by
//! slice identity is sound.

use crate::{
    collection::{EntityCollection, WrapperError},
    entity::{EntityHandle, EntityValue},
    error::MapError,
};
use std::collections::BTreeMap;

///
/// CollectionCtor
///
/// Builds a caller-declared collection wrapper from an assembled handle
/// sequence during hydration. A failing ctor surfaces as
/// `MapError::WrapperNotConstructible`.
///

pub type CollectionCtor = fn(Vec<EntityHandle>) -> Result<EntityCollection, WrapperError>;

///
/// ContainerKind
///

#[derive(Clone, Copy)]
pub enum ContainerKind {
    /// Plain ordered membership with no tracking and no wrapper.
    Array,
    /// Caller-declared collection wrapper.
    Wrapper(CollectionCtor),
}

///
/// FieldKind
///

#[derive(Clone, Copy)]
pub enum FieldKind {
    Scalar,
    /// To-one relation; `target` names the related entity type.
    One { target: &'static str },
    /// To-many relation; `element` names the related entity type.
    /// Its absence is not an error until the field is actually hydrated.
    Many {
        element: Option<&'static str>,
        container: ContainerKind,
    },
}

///
/// FieldModel
///
/// One row of the schema table: entity field name, persisted attribute
/// name, identity marker, and shape.
///

#[derive(Clone, Copy)]
pub struct FieldModel {
    pub name: &'static str,
    pub attribute: &'static str,
    pub identity: bool,
    pub kind: FieldKind,
}

impl FieldModel {
    #[must_use]
    pub const fn scalar(name: &'static str) -> Self {
        Self {
            name,
            attribute: name,
            identity: false,
            kind: FieldKind::Scalar,
        }
    }

    /// Identity-marked scalar field. The marker is explicit; no naming
    /// convention is ever consulted.
    #[must_use]
    pub const fn identity(name: &'static str) -> Self {
        Self {
            name,
            attribute: name,
            identity: true,
            kind: FieldKind::Scalar,
        }
    }

    #[must_use]
    pub const fn one(name: &'static str, target: &'static str) -> Self {
        Self {
            name,
            attribute: name,
            identity: false,
            kind: FieldKind::One { target },
        }
    }

    #[must_use]
    pub const fn many(
        name: &'static str,
        element: Option<&'static str>,
        container: ContainerKind,
    ) -> Self {
        Self {
            name,
            attribute: name,
            identity: false,
            kind: FieldKind::Many { element, container },
        }
    }

    /// Override the persisted attribute name when it differs from the field
    /// name.
    #[must_use]
    pub const fn with_attribute(mut self, attribute: &'static str) -> Self {
        self.attribute = attribute;
        self
    }

    #[must_use]
    pub const fn is_relation(&self) -> bool {
        matches!(self.kind, FieldKind::One { .. } | FieldKind::Many { .. })
    }

    /// Declared element type for container fields.
    #[must_use]
    pub const fn element(&self) -> Option<&'static str> {
        match self.kind {
            FieldKind::Many { element, .. } => element,
            FieldKind::Scalar | FieldKind::One { .. } => None,
        }
    }
}

///
/// EntitySchema
///

pub struct EntitySchema {
    pub entity: &'static str,
    pub fields: &'static [FieldModel],
    /// Constructs a field-uninitialized instance of the domain type.
    pub new_uninit: fn() -> Box<dyn EntityValue>,
}

impl EntitySchema {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldModel> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The identity-marked field, if the type declares one. Absence means
    /// the type can be hydrated but never assigned a key on persist.
    #[must_use]
    pub fn identity_field(&self) -> Option<&'static FieldModel> {
        self.fields.iter().find(|f| f.identity)
    }
}

///
/// SchemaRegistry
///
/// Entity-name keyed schema cache. Registration is first-wins and
/// idempotent; the registered reference is stable for the registry's
/// lifetime.
///

#[derive(Default)]
pub struct SchemaRegistry {
    by_entity: BTreeMap<&'static str, &'static EntitySchema>,
}

impl SchemaRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            by_entity: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, schema: &'static EntitySchema) {
        self.by_entity.entry(schema.entity).or_insert(schema);
    }

    pub fn get(&self, entity: &str) -> Result<&'static EntitySchema, MapError> {
        self.by_entity
            .get(entity)
            .copied()
            .ok_or_else(|| MapError::UnknownEntityType {
                entity: entity.to_string(),
            })
    }

    /// Stable-identity field list: repeat calls return the same slice.
    pub fn fields(&self, entity: &str) -> Result<&'static [FieldModel], MapError> {
        self.get(entity).map(|schema| schema.fields)
    }

    pub fn identity_field(&self, entity: &str) -> Result<Option<&'static FieldModel>, MapError> {
        self.get(entity).map(EntitySchema::identity_field)
    }
}

///
/// TESTS
///
