//! Identity map: one domain entity per persisted record per session.
//!
//! Implemented as an append-only arena of entries with two index tables,
//! `(entity type, key)` and `EntityHandle`, pointing into the same slots.
//! Entries are only ever mutated to set the tombstone flag; positional
//! order is the deterministic flush order.

use crate::{entity::EntityHandle, record::Record, value::Key};
use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

///
/// IdentityEntry
///
/// Pairs exactly one record with exactly one entity. The tombstone flag
/// marks logical deletion; tombstoned entries are excluded from flush.
///

pub struct IdentityEntry {
    entity_type: &'static str,
    entity: EntityHandle,
    record: Box<dyn Record>,
    deleted: bool,
}

impl IdentityEntry {
    const fn new(entity_type: &'static str, entity: EntityHandle, record: Box<dyn Record>) -> Self {
        Self {
            entity_type,
            entity,
            record,
            deleted: false,
        }
    }

    #[must_use]
    pub const fn entity_type(&self) -> &'static str {
        self.entity_type
    }

    #[must_use]
    pub const fn entity(&self) -> EntityHandle {
        self.entity
    }

    #[must_use]
    pub fn record(&self) -> &dyn Record {
        &*self.record
    }

    pub fn record_mut(&mut self) -> &mut dyn Record {
        &mut *self.record
    }

    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub const fn set_deleted(&mut self) {
        self.deleted = true;
    }
}

///
/// IdentityMap
///

#[derive(Default)]
pub struct IdentityMap {
    entries: Vec<Rc<RefCell<IdentityEntry>>>,
    by_key: BTreeMap<(&'static str, Key), usize>,
    by_handle: BTreeMap<EntityHandle, usize>,
}

impl IdentityMap {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_key: BTreeMap::new(),
            by_handle: BTreeMap::new(),
        }
    }

    /// Register a record/entity pair. First registration wins: a later
    /// duplicate by `(entity type, key)` or by handle is a complete no-op
    /// that returns the existing entry index (the duplicate's record is
    /// dropped). Records without a key index by handle only; entries are
    /// never rekeyed after registration.
    pub fn register(
        &mut self,
        entity_type: &'static str,
        entity: EntityHandle,
        record: Box<dyn Record>,
    ) -> usize {
        let key = record.key();

        if let Some(key) = &key {
            if let Some(&index) = self.by_key.get(&(entity_type, key.clone())) {
                return index;
            }
        }
        if let Some(&index) = self.by_handle.get(&entity) {
            return index;
        }

        let index = self.entries.len();
        self.entries
            .push(Rc::new(RefCell::new(IdentityEntry::new(
                entity_type,
                entity,
                record,
            ))));

        if let Some(key) = key {
            self.by_key.insert((entity_type, key), index);
        }
        self.by_handle.insert(entity, index);

        index
    }

    #[must_use]
    pub fn get(&self, entity_type: &'static str, key: &Key) -> Option<usize> {
        self.by_key.get(&(entity_type, key.clone())).copied()
    }

    #[must_use]
    pub fn get_by_handle(&self, entity: EntityHandle) -> Option<usize> {
        self.by_handle.get(&entity).copied()
    }

    /// Positional access in registration order.
    #[must_use]
    pub fn entry(&self, index: usize) -> Option<Rc<RefCell<IdentityEntry>>> {
        self.entries.get(index).map(Rc::clone)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

///
/// TESTS
///
