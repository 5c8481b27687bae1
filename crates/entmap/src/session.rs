//! Mapper session: the unit of work.
//!
//! A session owns the entity arena, the identity map, and a handle to the
//! persistence collaborator. `map` hydrates domain entities from records,
//! registering each record in the identity map before recursing into its
//! relations so cyclic graphs terminate. `flush` walks every live identity
//! entry in registration order, writes scalar state back, reconciles
//! relation fields, and saves.

use crate::{
    collection::EntityCollection,
    entity::{EntityArena, EntityHandle, EntityValue, FieldState},
    error::{MapError, PersistenceError},
    identity::{IdentityEntry, IdentityMap},
    obs::SessionMetrics,
    record::{Record, RelationValue, Store},
    relation::RelationProcessor,
    schema::{ContainerKind, EntitySchema, FieldKind, FieldModel, SchemaRegistry},
    value::{Key, Value},
};
use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

///
/// MapOptions
///
/// Per-call hydration options. Excluded relation fields are skipped
/// entirely and stay `Unset` on the hydrated entity.
///

#[derive(Clone, Debug, Default)]
pub struct MapOptions {
    without: BTreeMap<&'static str, Vec<&'static str>>,
}

impl MapOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the named relation fields when hydrating records of
    /// `record_type`, anywhere in the graph.
    #[must_use]
    pub fn without_relations(
        mut self,
        record_type: &'static str,
        fields: &[&'static str],
    ) -> Self {
        self.without
            .entry(record_type)
            .or_default()
            .extend_from_slice(fields);
        self
    }

    fn is_excluded(&self, record_type: &str, field: &str) -> bool {
        self.without
            .get(record_type)
            .is_some_and(|fields| fields.contains(&field))
    }
}

///
/// Session
///

pub struct Session {
    store: Rc<dyn Store>,
    registry: SchemaRegistry,
    arena: EntityArena,
    identity: IdentityMap,
    metrics: SessionMetrics,
}

impl Session {
    #[must_use]
    pub fn new(store: Rc<dyn Store>, registry: SchemaRegistry) -> Self {
        Self {
            store,
            registry,
            arena: EntityArena::new(),
            identity: IdentityMap::new(),
            metrics: SessionMetrics::default(),
        }
    }

    /// Bring a new domain entity under session management.
    pub fn track<E: EntityValue + 'static>(&mut self, entity: E) -> EntityHandle {
        self.track_boxed(Box::new(entity))
    }

    pub fn track_boxed(&mut self, entity: Box<dyn EntityValue>) -> EntityHandle {
        SessionMetrics::bump(&mut self.metrics.entities_tracked);
        self.arena.track_boxed(entity)
    }

    /// Run `f` against the entity behind `handle`. Returns `None` for a
    /// handle this session never issued.
    pub fn with_entity<R>(
        &self,
        handle: EntityHandle,
        f: impl FnOnce(&dyn EntityValue) -> R,
    ) -> Option<R> {
        self.arena.with_entity(handle, f)
    }

    pub fn with_entity_mut<R>(
        &self,
        handle: EntityHandle,
        f: impl FnOnce(&mut dyn EntityValue) -> R,
    ) -> Option<R> {
        self.arena.with_entity_mut(handle, f)
    }

    /// Look up the already-hydrated entity for `(entity_type, key)`.
    #[must_use]
    pub fn lookup(&self, entity_type: &str, key: &Key) -> Option<EntityHandle> {
        let schema = self.registry.get(entity_type).ok()?;
        let index = self.identity.get(schema.entity, key)?;
        Some(self.identity.entry(index)?.borrow().entity())
    }

    #[must_use]
    pub const fn metrics(&self) -> SessionMetrics {
        self.metrics
    }

    /// Hydrate `record` into an entity of `entity_type`.
    ///
    /// A record whose key is already in the identity map returns the
    /// existing handle without touching the entity. Otherwise the record is
    /// registered first and relation fields are hydrated afterwards, so a
    /// relation cycle resolves to the handle already being built. Field
    /// states are computed for the whole schema before any of them is
    /// assigned.
    pub fn map(
        &mut self,
        record: Box<dyn Record>,
        entity_type: &str,
        options: &MapOptions,
    ) -> Result<EntityHandle, MapError> {
        SessionMetrics::bump(&mut self.metrics.records_mapped);
        let schema = self.registry.get(entity_type)?;

        if let Some(key) = record.key() {
            if let Some(index) = self.identity.get(schema.entity, &key) {
                if let Some(entry) = self.identity.entry(index) {
                    return Ok(entry.borrow().entity());
                }
            }
        }

        let record_type = record.record_type();
        let handle = self.track_boxed((schema.new_uninit)());
        let index = self.identity.register(schema.entity, handle, record);
        let entry = self.entry(index)?;

        let mut states: Vec<(&'static str, FieldState)> = Vec::with_capacity(schema.fields.len());
        for field in schema.fields {
            if options.is_excluded(record_type, field.name) {
                continue;
            }
            let state = self.map_field(&entry, schema, field, options)?;
            states.push((field.name, state));
        }

        for (name, state) in states {
            self.arena
                .with_entity_mut(handle, |entity| entity.set(name, state));
        }

        Ok(handle)
    }

    fn map_field(
        &mut self,
        entry: &Rc<RefCell<IdentityEntry>>,
        schema: &'static EntitySchema,
        field: &'static FieldModel,
        options: &MapOptions,
    ) -> Result<FieldState, MapError> {
        let is_relation = entry.borrow().record().is_relation(field.name);
        if !is_relation {
            let value = entry
                .borrow()
                .record()
                .get(field.attribute)
                .unwrap_or(Value::Null);
            return Ok(FieldState::Scalar(value));
        }

        match &field.kind {
            FieldKind::Many { element, container } => {
                let element = element.ok_or(MapError::MissingElementType {
                    entity: schema.entity,
                    field: field.name,
                })?;

                let related = entry.borrow().record().related(field.name)?;
                let children = match related {
                    RelationValue::Many(records) => records,
                    RelationValue::One(record) => vec![record],
                    RelationValue::None => Vec::new(),
                };

                let mut handles = Vec::with_capacity(children.len());
                for child in children {
                    handles.push(self.map(child, element, options)?);
                }

                let collection = match container {
                    ContainerKind::Array => EntityCollection::from_handles(handles),
                    ContainerKind::Wrapper(ctor) => {
                        ctor(handles).map_err(|err| MapError::WrapperNotConstructible {
                            entity: schema.entity,
                            field: field.name,
                            reason: err.reason,
                        })?
                    }
                };
                Ok(FieldState::Many(collection))
            }

            FieldKind::One { target } => {
                let related = entry.borrow().record().related(field.name)?;
                let child = match related {
                    RelationValue::One(record) => Some(self.map(record, target, options)?),
                    RelationValue::Many(mut records) => {
                        if records.is_empty() {
                            None
                        } else {
                            Some(self.map(records.remove(0), target, options)?)
                        }
                    }
                    RelationValue::None => None,
                };
                Ok(FieldState::One(child))
            }

            // The record claims a relation the schema models as a scalar;
            // hydrate nothing rather than a foreign key value.
            FieldKind::Scalar => Ok(FieldState::Scalar(Value::Null)),
        }
    }

    /// Persist a tracked entity immediately and return its assigned key.
    /// The saved record joins the identity map, so a later flush updates
    /// it instead of inserting again.
    pub fn persist(
        &mut self,
        handle: EntityHandle,
        record_type: &str,
    ) -> Result<Key, MapError> {
        let index = self.processor().resolve_or_persist(handle, record_type)?;
        let entry = self.entry(index)?;
        let key = entry.borrow().record().key().ok_or_else(|| {
            PersistenceError::internal("save did not assign a key")
        })?;
        Ok(key)
    }

    /// Write every live identity entry back to the persistence layer.
    ///
    /// Entries are visited in registration order and the walk re-reads the
    /// length each step, so records registered mid-flush by relation
    /// cascades are visited too. With `use_transaction` the whole pass runs
    /// inside the collaborator's transaction and any error rolls it back.
    pub fn flush(&mut self, use_transaction: bool) -> Result<(), MapError> {
        SessionMetrics::bump(&mut self.metrics.flush_passes);

        if use_transaction {
            let store = Rc::clone(&self.store);
            let mut pass = || self.flush_pass();
            store.transaction(&mut pass)
        } else {
            self.flush_pass()
        }
    }

    fn flush_pass(&mut self) -> Result<(), MapError> {
        let mut index = 0;
        while index < self.identity.len() {
            let entry = self.entry(index)?;
            index += 1;

            if entry.borrow().is_deleted() {
                continue;
            }

            let entity_type = entry.borrow().entity_type();
            let handle = entry.borrow().entity();
            let schema = self.registry.get(entity_type)?;

            for field in schema.fields {
                let Some(state) = self.arena.with_entity(handle, |entity| entity.get(field.name))
                else {
                    continue;
                };
                if state.is_unset() {
                    continue;
                }
                // A null identity never overwrites an assigned key.
                if field.identity && state.is_null_scalar() {
                    continue;
                }

                if entry.borrow().record().is_relation(field.name) {
                    let Some(relation) = entry.borrow().record().relation(field.name) else {
                        continue;
                    };
                    let written = self.processor().process(&entry, &relation, state)?;
                    self.arena
                        .with_entity_mut(handle, |entity| entity.set(field.name, written));
                } else if let FieldState::Scalar(value) = state {
                    entry.borrow_mut().record_mut().set(field.attribute, value);
                }
            }

            entry.borrow_mut().record_mut().save()?;
            SessionMetrics::bump(&mut self.metrics.records_saved);
        }

        Ok(())
    }

    fn processor(&mut self) -> RelationProcessor<'_> {
        RelationProcessor {
            store: &*self.store,
            registry: &self.registry,
            arena: &self.arena,
            identity: &mut self.identity,
            metrics: &mut self.metrics,
        }
    }

    fn entry(&self, index: usize) -> Result<Rc<RefCell<IdentityEntry>>, MapError> {
        self.identity
            .entry(index)
            .ok_or_else(|| PersistenceError::internal("identity entry index out of range").into())
    }
}

///
/// TESTS
///
