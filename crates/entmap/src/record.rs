//! Persistence collaborator contract.
//!
//! The mapper consumes row storage, relation queries, and transactions
//! through these traits and never implements them itself. Relation dispatch
//! is a closed `RelationKind` tag supplied by the collaborator; the mapper
//! never reasons about concrete relation implementations.

use crate::{
    error::{MapError, PersistenceError},
    value::{Key, Value},
};

///
/// RelationKind
///
/// Which end of the relation holds the foreign key reference, and whether
/// the relation is single- or multi-valued. `ManyShared` membership is
/// jointly owned (many-to-many style); `ManyExclusive` children belong to
/// exactly one parent (one-to-many style).
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RelationKind {
    OneOwning,
    OneInverse,
    ManyExclusive,
    ManyShared,
}

///
/// Relation
///
/// Per-field relation descriptor. `target` names the related record type.
///

#[derive(Clone, Copy, Debug)]
pub struct Relation {
    pub field: &'static str,
    pub kind: RelationKind,
    pub target: &'static str,
}

///
/// RelationValue
///
/// Result of executing a relation query on a record. An absent related
/// record is a value, not an error.
///

pub enum RelationValue {
    None,
    One(Box<dyn Record>),
    Many(Vec<Box<dyn Record>>),
}

///
/// Record
///
/// One persistence-layer row with named attributes and declared relations.
/// `save` persists the row and assigns an auto-generated key when none is
/// present. Relation operations mutate the persistence side only; the
/// mapper owns the domain side.
///

pub trait Record {
    fn record_type(&self) -> &'static str;

    fn get(&self, attr: &str) -> Option<Value>;

    fn set(&mut self, attr: &str, value: Value);

    fn save(&mut self) -> Result<(), PersistenceError>;

    fn key(&self) -> Option<Key>;

    fn key_name(&self) -> &'static str;

    /// Structural relation classification, answered by the record itself.
    fn is_relation(&self, field: &str) -> bool;

    fn relation(&self, field: &str) -> Option<Relation>;

    /// Execute the relation query for `field` and return the related
    /// record(s).
    fn related(&self, field: &str) -> Result<RelationValue, PersistenceError>;

    /// Point `child` at this record and save it (child-save on the inverse
    /// or exclusive-many side).
    fn save_related(&self, field: &str, child: &mut dyn Record)
    -> Result<(), PersistenceError>;

    /// Set this record's foreign key for an owning to-one relation.
    fn associate(&mut self, field: &str, key: &Key) -> Result<(), PersistenceError>;

    /// Clear this record's foreign key for an owning to-one relation.
    fn dissociate(&mut self, field: &str) -> Result<(), PersistenceError>;

    /// Remove shared membership with the related record keyed `key`.
    fn detach(&self, field: &str, key: &Key) -> Result<(), PersistenceError>;

    /// Delete the related record keyed `key` through this relation.
    fn delete_related(&self, field: &str, key: &Key) -> Result<(), PersistenceError>;
}

///
/// Store
///
/// Record construction and the transaction boundary. `transaction` runs
/// `work` atomically: any error rolls back every write made inside it and
/// propagates unmodified.
///

pub trait Store {
    fn new_record(&self, record_type: &str) -> Result<Box<dyn Record>, PersistenceError>;

    fn transaction(&self, work: &mut dyn FnMut() -> Result<(), MapError>)
    -> Result<(), MapError>;
}
