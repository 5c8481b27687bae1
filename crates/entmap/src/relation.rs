//! Relation reconciliation during a flush pass.
//!
//! Each relation field is reconciled against the persistence side by kind:
//! owning to-one sets or clears the foreign key on the parent, inverse
//! to-one and exclusive-many cascade through `save_related`, shared-many
//! adds and removes memberships. Tracked collections reconcile their
//! recorded deltas only; plain collections save every member.

use crate::{
    builder::build_record,
    collection::EntityCollection,
    entity::{EntityArena, EntityHandle, FieldState},
    error::{MapError, PersistenceError},
    identity::{IdentityEntry, IdentityMap},
    obs::SessionMetrics,
    record::{Relation, RelationKind, Store},
    schema::SchemaRegistry,
};
use std::{cell::RefCell, rc::Rc};

///
/// RelationProcessor
///
/// Borrows the session's working state for the duration of one relation
/// field. Returns the field state to write back, with tracked deltas
/// cleared once applied.
///

pub(crate) struct RelationProcessor<'a> {
    pub(crate) store: &'a dyn Store,
    pub(crate) registry: &'a SchemaRegistry,
    pub(crate) arena: &'a EntityArena,
    pub(crate) identity: &'a mut IdentityMap,
    pub(crate) metrics: &'a mut SessionMetrics,
}

impl RelationProcessor<'_> {
    /// Reconcile one relation field of `parent`. A field state whose shape
    /// does not match the relation kind is returned untouched.
    pub(crate) fn process(
        &mut self,
        parent: &Rc<RefCell<IdentityEntry>>,
        relation: &Relation,
        value: FieldState,
    ) -> Result<FieldState, MapError> {
        SessionMetrics::bump(&mut self.metrics.relations_processed);

        match (relation.kind, value) {
            (
                RelationKind::ManyExclusive | RelationKind::ManyShared,
                FieldState::Many(collection),
            ) => self
                .process_many(parent, relation, collection)
                .map(FieldState::Many),

            (RelationKind::OneOwning | RelationKind::OneInverse, FieldState::One(child)) => {
                self.process_one(parent, relation, child).map(FieldState::One)
            }

            (_, other) => Ok(other),
        }
    }

    fn process_one(
        &mut self,
        parent: &Rc<RefCell<IdentityEntry>>,
        relation: &Relation,
        child: Option<EntityHandle>,
    ) -> Result<Option<EntityHandle>, MapError> {
        let Some(handle) = child else {
            if relation.kind == RelationKind::OneOwning {
                parent.borrow_mut().record_mut().dissociate(relation.field)?;
            }
            return Ok(None);
        };

        let child_index = self.resolve_or_persist(handle, relation.target)?;

        if relation.kind == RelationKind::OneOwning {
            let key = self
                .entry(child_index)?
                .borrow()
                .record()
                .key()
                .ok_or_else(|| {
                    PersistenceError::internal("related record has no key after save")
                })?;
            parent
                .borrow_mut()
                .record_mut()
                .associate(relation.field, &key)?;
        } else {
            self.save_child(parent, relation.field, child_index)?;
        }

        Ok(Some(handle))
    }

    fn process_many(
        &mut self,
        parent: &Rc<RefCell<IdentityEntry>>,
        relation: &Relation,
        mut collection: EntityCollection,
    ) -> Result<EntityCollection, MapError> {
        if collection.is_tracked() {
            for handle in collection.added().to_vec() {
                let child_index = self.resolve_or_persist(handle, relation.target)?;
                self.save_child(parent, relation.field, child_index)?;
            }

            for handle in collection.deleted().to_vec() {
                self.remove_child(parent, relation, handle)?;
            }

            collection.clear_tracking();
        } else {
            for handle in collection.handles().to_vec() {
                let child_index = self.resolve_or_persist(handle, relation.target)?;
                self.save_child(parent, relation.field, child_index)?;
            }
        }

        Ok(collection)
    }

    /// Detach a shared member, or tombstone and delete an exclusive one.
    /// A removed entity that was never persisted skips the store call.
    fn remove_child(
        &mut self,
        parent: &Rc<RefCell<IdentityEntry>>,
        relation: &Relation,
        handle: EntityHandle,
    ) -> Result<(), MapError> {
        let Some(child_index) = self.identity.get_by_handle(handle) else {
            return Ok(());
        };
        let child = self.entry(child_index)?;
        let key = child.borrow().record().key();

        if relation.kind == RelationKind::ManyShared {
            if let Some(key) = key {
                parent.borrow().record().detach(relation.field, &key)?;
            }
        } else {
            child.borrow_mut().set_deleted();
            SessionMetrics::bump(&mut self.metrics.tombstones_set);
            if let Some(key) = key {
                parent.borrow().record().delete_related(relation.field, &key)?;
            }
        }

        Ok(())
    }

    /// Locate the related entity in the identity map, persisting it first
    /// when it has never been seen.
    pub(crate) fn resolve_or_persist(
        &mut self,
        handle: EntityHandle,
        record_type: &str,
    ) -> Result<usize, MapError> {
        if let Some(index) = self.identity.get_by_handle(handle) {
            return Ok(index);
        }

        let slot = self.arena.slot(handle).ok_or(MapError::UnknownHandle)?;
        let entity = slot.borrow();
        let schema = self.registry.get(entity.entity_type())?;
        let mut record = build_record(self.store, schema, &**entity, record_type)?;
        drop(entity);

        record.save()?;
        SessionMetrics::bump(&mut self.metrics.records_persisted);

        Ok(self.identity.register(schema.entity, handle, record))
    }

    fn save_child(
        &mut self,
        parent: &Rc<RefCell<IdentityEntry>>,
        field: &'static str,
        child_index: usize,
    ) -> Result<(), MapError> {
        let child = self.entry(child_index)?;
        if Rc::ptr_eq(parent, &child) {
            return Err(PersistenceError::unsupported(
                "record relates to itself through a child-saving relation",
            )
            .into());
        }

        let parent_ref = parent.borrow();
        let mut child_ref = child.borrow_mut();
        parent_ref
            .record()
            .save_related(field, child_ref.record_mut())?;

        Ok(())
    }

    fn entry(&self, index: usize) -> Result<Rc<RefCell<IdentityEntry>>, MapError> {
        self.identity
            .entry(index)
            .ok_or_else(|| PersistenceError::internal("identity entry index out of range").into())
    }
}
