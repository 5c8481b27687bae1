//! Core runtime for Entmap: schema tables, the entity arena, the identity
//! map, and the mapper session, with the ergonomics exported via the
//! `prelude`.
#![warn(unreachable_pub)]

pub mod builder;
pub mod collection;
pub mod entity;
pub mod error;
pub mod identity;
pub mod obs;
pub mod record;
pub(crate) mod relation;
pub mod schema;
pub mod session;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_fixtures;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, processors, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        collection::EntityCollection,
        entity::{EntityHandle, EntityValue, FieldState},
        record::{Record, Relation, RelationKind, RelationValue, Store},
        schema::{ContainerKind, EntitySchema, FieldKind, FieldModel, SchemaRegistry},
        session::{MapOptions, Session},
        value::{Key, Value},
    };
}
