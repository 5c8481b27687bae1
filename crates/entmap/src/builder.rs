//! Record construction from entity scalar state.
//!
//! Builds a fresh persistence record from an entity's initialized scalar
//! fields. Relation classification is asked of the record instance itself
//! (structural), never guessed from the entity's declared shape; relation
//! persistence belongs to the relation processor.

use crate::{
    entity::{EntityValue, FieldState},
    error::MapError,
    record::{Record, Store},
    schema::EntitySchema,
};

/// Build a new record of `record_type` from `entity`.
///
/// The identity field is copied onto the record's key attribute only when
/// initialized and non-null, so the persistence layer can auto-generate
/// keys for new entities. Every other initialized, non-relation field is
/// copied to its attribute name; uninitialized fields are skipped without
/// error.
pub fn build_record(
    store: &dyn Store,
    schema: &'static EntitySchema,
    entity: &dyn EntityValue,
    record_type: &str,
) -> Result<Box<dyn Record>, MapError> {
    let identity_field = schema
        .identity_field()
        .ok_or(MapError::MissingIdentityField {
            entity: schema.entity,
        })?;

    let mut record = store.new_record(record_type)?;

    if let FieldState::Scalar(value) = entity.get(identity_field.name) {
        if !value.is_null() {
            let key_name = record.key_name();
            record.set(key_name, value);
        }
    }

    for field in schema.fields {
        if field.identity || record.is_relation(field.name) {
            continue;
        }
        if let FieldState::Scalar(value) = entity.get(field.name) {
            record.set(field.attribute, value);
        }
    }

    Ok(record)
}

///
/// TESTS
///
