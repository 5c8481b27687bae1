//! Change-tracking entity collections.
//!
//! One container type with an optional tracking mode. Membership is
//! deduplicated by entity handle, never by value equality. Tracked
//! collections record `added`/`deleted` deltas since the last
//! `clear_tracking`, which is what lets flush reconcile a to-many relation
//! as a diff instead of a full rewrite.

use crate::entity::EntityHandle;
use derive_more::{Deref, IntoIterator};
use thiserror::Error as ThisError;

///
/// WrapperError
///
/// Raised by a caller-supplied collection constructor that rejects the
/// assembled handle sequence.
///

#[derive(Debug, ThisError)]
#[error("{reason}")]
pub struct WrapperError {
    pub reason: String,
}

impl WrapperError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

///
/// Tracking
///
/// Invariant: `added` and `deleted` are disjoint, with one asymmetric
/// exception documented on `EntityCollection::add`.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct Tracking {
    added: Vec<EntityHandle>,
    deleted: Vec<EntityHandle>,
}

///
/// EntityCollection
///

#[derive(Clone, Debug, Default, Deref, Eq, IntoIterator, PartialEq)]
pub struct EntityCollection {
    #[deref]
    #[into_iterator(owned, ref)]
    items: Vec<EntityHandle>,
    tracking: Option<Tracking>,
}

impl EntityCollection {
    /// Empty untracked collection.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: Vec::new(),
            tracking: None,
        }
    }

    /// Empty tracked collection.
    #[must_use]
    pub const fn tracked() -> Self {
        Self {
            items: Vec::new(),
            tracking: Some(Tracking {
                added: Vec::new(),
                deleted: Vec::new(),
            }),
        }
    }

    /// Untracked collection seeded with `items`. Seeding records no deltas.
    #[must_use]
    pub const fn from_handles(items: Vec<EntityHandle>) -> Self {
        Self {
            items,
            tracking: None,
        }
    }

    /// Tracked collection seeded with `items`. Seeding records no deltas;
    /// hydration is not an addition.
    #[must_use]
    pub const fn tracked_from_handles(items: Vec<EntityHandle>) -> Self {
        Self {
            items,
            tracking: Some(Tracking {
                added: Vec::new(),
                deleted: Vec::new(),
            }),
        }
    }

    /// Standard constructor shape for `ContainerKind::Wrapper`.
    pub const fn build_plain(items: Vec<EntityHandle>) -> Result<Self, WrapperError> {
        Ok(Self::from_handles(items))
    }

    /// Standard constructor shape for `ContainerKind::Wrapper`.
    pub const fn build_tracked(items: Vec<EntityHandle>) -> Result<Self, WrapperError> {
        Ok(Self::tracked_from_handles(items))
    }

    /// Add an entity. No-op when already present.
    ///
    /// Tracked mode: no-op when the handle is already in `added`; otherwise
    /// the handle is appended to `added` before the base add. An `add` does
    /// NOT cancel a pending `deleted` entry; the asymmetry mirrors the
    /// observed behavior of delete-side cancellation only.
    pub fn add(&mut self, handle: EntityHandle) {
        if let Some(tracking) = self.tracking.as_mut() {
            if tracking.added.contains(&handle) {
                return;
            }
            tracking.added.push(handle);
        }

        if self.items.contains(&handle) {
            return;
        }
        self.items.push(handle);
    }

    /// Remove an entity. No-op when absent; storage compacts.
    ///
    /// Tracked mode: deleting a handle still pending in `added` withdraws
    /// the addition delta and leaves the member in place; no deletion is
    /// recorded.
    pub fn delete(&mut self, handle: EntityHandle) {
        if let Some(tracking) = self.tracking.as_mut() {
            if let Some(pos) = tracking.added.iter().position(|h| *h == handle) {
                tracking.added.remove(pos);
                return;
            }
            tracking.deleted.push(handle);
        }

        if let Some(pos) = self.items.iter().position(|h| *h == handle) {
            self.items.remove(pos);
        }
    }

    /// Positional lookup by current order.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<EntityHandle> {
        self.items.get(index).copied()
    }

    #[must_use]
    pub const fn is_tracked(&self) -> bool {
        self.tracking.is_some()
    }

    /// Handles added since the last `clear_tracking`. Empty when untracked.
    #[must_use]
    pub fn added(&self) -> &[EntityHandle] {
        self.tracking.as_ref().map_or(&[], |t| &t.added)
    }

    /// Handles deleted since the last `clear_tracking`. Empty when untracked.
    #[must_use]
    pub fn deleted(&self) -> &[EntityHandle] {
        self.tracking.as_ref().map_or(&[], |t| &t.deleted)
    }

    /// Empty both delta lists. Invoked after a relation has been flushed.
    pub fn clear_tracking(&mut self) {
        if let Some(tracking) = self.tracking.as_mut() {
            tracking.added.clear();
            tracking.deleted.clear();
        }
    }

    #[must_use]
    pub fn handles(&self) -> &[EntityHandle] {
        &self.items
    }
}

///
/// TESTS
///
