//! Domain-entity surface: handles, field state, and the session arena.
//!
//! Entities stay persistence-ignorant: the only contract they carry is the
//! object-safe `EntityValue` trait, a dynamic get/set over named fields.
//! Identity is an explicit `EntityHandle` token issued when an entity first
//! enters a session through the arena, never an address-of-object trick.

use crate::{collection::EntityCollection, value::Value};
use std::{cell::RefCell, fmt, rc::Rc};

///
/// EntityHandle
///
/// Opaque per-session identity token. Handles from different sessions are
/// never comparable in a meaningful way.
///

#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EntityHandle(u32);

impl EntityHandle {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityHandle({})", self.0)
    }
}

///
/// FieldState
///
/// Value of one entity field as the mapper sees it. `Unset` models a field
/// that was never initialized, which is distinct from an explicit null.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub enum FieldState {
    #[default]
    Unset,
    Scalar(Value),
    One(Option<EntityHandle>),
    Many(EntityCollection),
}

impl FieldState {
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    #[must_use]
    pub const fn is_null_scalar(&self) -> bool {
        matches!(self, Self::Scalar(Value::Null))
    }
}

///
/// EntityValue
///
/// Dynamic field access implemented by domain entity types. `get` returns
/// `FieldState::Unset` for fields that were never initialized; `set` on an
/// unknown field name is a no-op by contract (the schema table drives which
/// names are ever used).
///

pub trait EntityValue {
    fn entity_type(&self) -> &'static str;

    fn get(&self, field: &str) -> FieldState;

    fn set(&mut self, field: &str, value: FieldState);
}

impl EntityValue for Box<dyn EntityValue> {
    fn entity_type(&self) -> &'static str {
        (**self).entity_type()
    }

    fn get(&self, field: &str) -> FieldState {
        (**self).get(field)
    }

    fn set(&mut self, field: &str, value: FieldState) {
        (**self).set(field, value);
    }
}

///
/// EntityArena
///
/// Session-owned storage for tracked entities. Slots are shared refcells so
/// the mapper can hold one entity open while recursing into others; sessions
/// are single-threaded, so slot borrows follow call structure.
///

#[derive(Default)]
pub struct EntityArena {
    slots: Vec<Rc<RefCell<Box<dyn EntityValue>>>>,
}

impl EntityArena {
    #[must_use]
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Issue a handle for an entity entering the session.
    pub fn track<E: EntityValue + 'static>(&mut self, entity: E) -> EntityHandle {
        self.track_boxed(Box::new(entity))
    }

    pub fn track_boxed(&mut self, entity: Box<dyn EntityValue>) -> EntityHandle {
        let handle = EntityHandle::from_raw(u32::try_from(self.slots.len()).unwrap_or(u32::MAX));
        self.slots.push(Rc::new(RefCell::new(entity)));
        handle
    }

    pub(crate) fn slot(&self, handle: EntityHandle) -> Option<Rc<RefCell<Box<dyn EntityValue>>>> {
        self.slots.get(handle.index()).map(Rc::clone)
    }

    /// Run `f` against the entity behind `handle`. Returns `None` for a
    /// handle this arena never issued.
    pub fn with_entity<R>(
        &self,
        handle: EntityHandle,
        f: impl FnOnce(&dyn EntityValue) -> R,
    ) -> Option<R> {
        let slot = self.slots.get(handle.index())?;
        let entity = slot.borrow();
        Some(f(&**entity))
    }

    pub fn with_entity_mut<R>(
        &self,
        handle: EntityHandle,
        f: impl FnOnce(&mut dyn EntityValue) -> R,
    ) -> Option<R> {
        let slot = self.slots.get(handle.index())?;
        let mut entity = slot.borrow_mut();
        Some(f(&mut **entity))
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

///
/// TESTS
///
