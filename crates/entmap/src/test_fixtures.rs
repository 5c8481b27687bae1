//! Test-only fixtures: an in-memory persistence collaborator with
//! snapshot/rollback transactions, a dynamic field-bag entity, and the
//! fixture schemas shared across module tests.

use crate::{
    collection::EntityCollection,
    entity::{EntityValue, FieldState},
    error::{MapError, PersistenceError},
    record::{Record, Relation, RelationKind, RelationValue, Store},
    schema::{ContainerKind, EntitySchema, FieldModel, SchemaRegistry},
    value::{Key, Value},
};
use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};

type Row = BTreeMap<String, Value>;

///
/// RelationSpec / RecordSpec
///
/// Static wiring for the in-memory record types.
///

pub(crate) struct RelationSpec {
    pub(crate) field: &'static str,
    pub(crate) kind: RelationKind,
    pub(crate) target: &'static str,
    pub(crate) foreign_key: &'static str,
    pub(crate) pivot: Option<&'static str>,
}

pub(crate) struct RecordSpec {
    pub(crate) record_type: &'static str,
    pub(crate) key_name: &'static str,
    pub(crate) relations: &'static [RelationSpec],
}

impl RecordSpec {
    fn relation_spec(&self, field: &str) -> Option<&'static RelationSpec> {
        self.relations.iter().find(|r| r.field == field)
    }
}

static AUTHORS_SPEC: RecordSpec = RecordSpec {
    record_type: "authors",
    key_name: "id",
    relations: &[
        RelationSpec {
            field: "posts",
            kind: RelationKind::ManyExclusive,
            target: "posts",
            foreign_key: "author_id",
            pivot: None,
        },
        RelationSpec {
            field: "profile",
            kind: RelationKind::OneInverse,
            target: "profiles",
            foreign_key: "author_id",
            pivot: None,
        },
    ],
};

static POSTS_SPEC: RecordSpec = RecordSpec {
    record_type: "posts",
    key_name: "id",
    relations: &[
        RelationSpec {
            field: "author",
            kind: RelationKind::OneOwning,
            target: "authors",
            foreign_key: "author_id",
            pivot: None,
        },
        RelationSpec {
            field: "tags",
            kind: RelationKind::ManyShared,
            target: "tags",
            foreign_key: "post_id",
            pivot: Some("post_tags"),
        },
    ],
};

static PROFILES_SPEC: RecordSpec = RecordSpec {
    record_type: "profiles",
    key_name: "id",
    relations: &[RelationSpec {
        field: "owner",
        kind: RelationKind::OneOwning,
        target: "authors",
        foreign_key: "author_id",
        pivot: None,
    }],
};

static TAGS_SPEC: RecordSpec = RecordSpec {
    record_type: "tags",
    key_name: "id",
    relations: &[],
};

static BOARDS_SPEC: RecordSpec = RecordSpec {
    record_type: "boards",
    key_name: "id",
    relations: &[RelationSpec {
        field: "pins",
        kind: RelationKind::ManyExclusive,
        target: "tags",
        foreign_key: "board_id",
        pivot: None,
    }],
};

static RECORD_SPECS: [&RecordSpec; 5] = [
    &AUTHORS_SPEC,
    &POSTS_SPEC,
    &PROFILES_SPEC,
    &TAGS_SPEC,
    &BOARDS_SPEC,
];

fn spec_for(record_type: &str) -> Option<&'static RecordSpec> {
    RECORD_SPECS
        .iter()
        .find(|spec| spec.record_type == record_type)
        .copied()
}

///
/// MemState / MemStore
///

#[derive(Clone, Default)]
struct MemState {
    tables: BTreeMap<&'static str, BTreeMap<Key, Row>>,
    pivots: BTreeMap<&'static str, BTreeSet<(Key, Key)>>,
    next_key: u64,
}

#[derive(Clone, Default)]
pub(crate) struct MemStore {
    state: Rc<RefCell<MemState>>,
}

impl MemStore {
    /// Insert a row directly, bypassing the record surface.
    pub(crate) fn seed(&self, record_type: &'static str, key: Key, attrs: &[(&str, Value)]) {
        let spec = spec_for(record_type).expect("unknown record type in seed");
        let mut row = Row::new();
        row.insert(spec.key_name.to_string(), key.to_value());
        for (attr, value) in attrs {
            row.insert((*attr).to_string(), value.clone());
        }

        let mut state = self.state.borrow_mut();
        state
            .tables
            .entry(record_type)
            .or_default()
            .insert(key, row);
    }

    pub(crate) fn seed_pivot(&self, pivot: &'static str, left: Key, right: Key) {
        self.state
            .borrow_mut()
            .pivots
            .entry(pivot)
            .or_default()
            .insert((left, right));
    }

    /// Fetch a stored row as a record, as a relation query would.
    pub(crate) fn fetch(&self, record_type: &str, key: &Key) -> Option<Box<dyn Record>> {
        let spec = spec_for(record_type)?;
        let state = self.state.borrow();
        let row = state.tables.get(spec.record_type)?.get(key)?.clone();
        drop(state);

        Some(Box::new(MemRecord {
            state: Rc::clone(&self.state),
            spec,
            attrs: row,
        }))
    }

    pub(crate) fn stored(&self, record_type: &str, key: &Key, attr: &str) -> Option<Value> {
        let state = self.state.borrow();
        state.tables.get(record_type)?.get(key)?.get(attr).cloned()
    }

    pub(crate) fn table_len(&self, record_type: &str) -> usize {
        self.state
            .borrow()
            .tables
            .get(record_type)
            .map_or(0, BTreeMap::len)
    }

    pub(crate) fn pivot_contains(&self, pivot: &str, left: &Key, right: &Key) -> bool {
        self.state
            .borrow()
            .pivots
            .get(pivot)
            .is_some_and(|set| set.contains(&(left.clone(), right.clone())))
    }

    pub(crate) fn pivot_len(&self, pivot: &str) -> usize {
        self.state
            .borrow()
            .pivots
            .get(pivot)
            .map_or(0, BTreeSet::len)
    }
}

impl Store for MemStore {
    fn new_record(&self, record_type: &str) -> Result<Box<dyn Record>, PersistenceError> {
        let spec = spec_for(record_type).ok_or_else(|| {
            PersistenceError::unsupported(format!("unknown record type '{record_type}'"))
        })?;

        Ok(Box::new(MemRecord {
            state: Rc::clone(&self.state),
            spec,
            attrs: Row::new(),
        }))
    }

    fn transaction(
        &self,
        work: &mut dyn FnMut() -> Result<(), MapError>,
    ) -> Result<(), MapError> {
        let snapshot = self.state.borrow().clone();
        let result = work();
        if result.is_err() {
            *self.state.borrow_mut() = snapshot;
        }
        result
    }
}

///
/// MemRecord
///

struct MemRecord {
    state: Rc<RefCell<MemState>>,
    spec: &'static RecordSpec,
    attrs: Row,
}

impl MemRecord {
    fn from_row(state: &Rc<RefCell<MemState>>, spec: &'static RecordSpec, attrs: Row) -> Box<dyn Record> {
        Box::new(Self {
            state: Rc::clone(state),
            spec,
            attrs,
        })
    }

    fn relation_spec(&self, field: &str) -> Result<&'static RelationSpec, PersistenceError> {
        self.spec.relation_spec(field).ok_or_else(|| {
            PersistenceError::unsupported(format!(
                "'{}' is not a relation on '{}'",
                field, self.spec.record_type
            ))
        })
    }

    fn require_key(&self) -> Result<Key, PersistenceError> {
        self.key()
            .ok_or_else(|| PersistenceError::internal("record has no key"))
    }

    fn rows_referencing(&self, relation: &'static RelationSpec, key: &Key) -> Vec<Row> {
        let state = self.state.borrow();
        state
            .tables
            .get(relation.target)
            .map(|table| {
                table
                    .values()
                    .filter(|row| {
                        row.get(relation.foreign_key)
                            .and_then(Value::as_key)
                            .as_ref()
                            == Some(key)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Record for MemRecord {
    fn record_type(&self) -> &'static str {
        self.spec.record_type
    }

    fn get(&self, attr: &str) -> Option<Value> {
        self.attrs.get(attr).cloned()
    }

    fn set(&mut self, attr: &str, value: Value) {
        self.attrs.insert(attr.to_string(), value);
    }

    fn save(&mut self) -> Result<(), PersistenceError> {
        let key = match self.key() {
            Some(key) => key,
            None => {
                let mut state = self.state.borrow_mut();
                state.next_key += 1;
                let key = Key::Uint(state.next_key);
                drop(state);
                self.attrs
                    .insert(self.spec.key_name.to_string(), key.to_value());
                key
            }
        };

        self.state
            .borrow_mut()
            .tables
            .entry(self.spec.record_type)
            .or_default()
            .insert(key, self.attrs.clone());

        Ok(())
    }

    fn key(&self) -> Option<Key> {
        self.attrs.get(self.spec.key_name).and_then(Value::as_key)
    }

    fn key_name(&self) -> &'static str {
        self.spec.key_name
    }

    fn is_relation(&self, field: &str) -> bool {
        self.spec.relation_spec(field).is_some()
    }

    fn relation(&self, field: &str) -> Option<Relation> {
        self.spec.relation_spec(field).map(|r| Relation {
            field: r.field,
            kind: r.kind,
            target: r.target,
        })
    }

    fn related(&self, field: &str) -> Result<RelationValue, PersistenceError> {
        let relation = self.relation_spec(field)?;
        let target_spec = spec_for(relation.target)
            .ok_or_else(|| PersistenceError::internal("relation target has no record spec"))?;

        match relation.kind {
            RelationKind::OneOwning => {
                let Some(fk) = self.attrs.get(relation.foreign_key).and_then(Value::as_key)
                else {
                    return Ok(RelationValue::None);
                };
                let state = self.state.borrow();
                let row = state
                    .tables
                    .get(relation.target)
                    .and_then(|table| table.get(&fk))
                    .cloned();
                drop(state);

                Ok(row.map_or(RelationValue::None, |row| {
                    RelationValue::One(MemRecord::from_row(&self.state, target_spec, row))
                }))
            }
            RelationKind::OneInverse => {
                let key = self.require_key()?;
                let mut rows = self.rows_referencing(relation, &key);
                Ok(if rows.is_empty() {
                    RelationValue::None
                } else {
                    RelationValue::One(MemRecord::from_row(
                        &self.state,
                        target_spec,
                        rows.remove(0),
                    ))
                })
            }
            RelationKind::ManyExclusive => {
                let key = self.require_key()?;
                let records = self
                    .rows_referencing(relation, &key)
                    .into_iter()
                    .map(|row| MemRecord::from_row(&self.state, target_spec, row))
                    .collect();
                Ok(RelationValue::Many(records))
            }
            RelationKind::ManyShared => {
                let pivot = relation
                    .pivot
                    .ok_or_else(|| PersistenceError::internal("shared relation has no pivot"))?;
                let key = self.require_key()?;
                let state = self.state.borrow();
                let rows: Vec<Row> = state
                    .pivots
                    .get(pivot)
                    .map(|set| {
                        set.iter()
                            .filter(|(left, _)| *left == key)
                            .filter_map(|(_, right)| {
                                state
                                    .tables
                                    .get(relation.target)
                                    .and_then(|table| table.get(right))
                                    .cloned()
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                drop(state);

                let records = rows
                    .into_iter()
                    .map(|row| MemRecord::from_row(&self.state, target_spec, row))
                    .collect();
                Ok(RelationValue::Many(records))
            }
        }
    }

    fn save_related(
        &self,
        field: &str,
        child: &mut dyn Record,
    ) -> Result<(), PersistenceError> {
        let relation = self.relation_spec(field)?;

        match relation.kind {
            RelationKind::ManyExclusive | RelationKind::OneInverse => {
                let key = self.require_key()?;
                child.set(relation.foreign_key, key.to_value());
                child.save()
            }
            RelationKind::ManyShared => {
                let pivot = relation
                    .pivot
                    .ok_or_else(|| PersistenceError::internal("shared relation has no pivot"))?;
                child.save()?;
                let mine = self.require_key()?;
                let theirs = child
                    .key()
                    .ok_or_else(|| PersistenceError::internal("child has no key after save"))?;
                self.state
                    .borrow_mut()
                    .pivots
                    .entry(pivot)
                    .or_default()
                    .insert((mine, theirs));
                Ok(())
            }
            RelationKind::OneOwning => Err(PersistenceError::unsupported(
                "save_related on the owning side",
            )),
        }
    }

    fn associate(&mut self, field: &str, key: &Key) -> Result<(), PersistenceError> {
        let relation = self.relation_spec(field)?;
        self.attrs
            .insert(relation.foreign_key.to_string(), key.to_value());
        Ok(())
    }

    fn dissociate(&mut self, field: &str) -> Result<(), PersistenceError> {
        let relation = self.relation_spec(field)?;
        self.attrs
            .insert(relation.foreign_key.to_string(), Value::Null);
        Ok(())
    }

    fn detach(&self, field: &str, key: &Key) -> Result<(), PersistenceError> {
        let relation = self.relation_spec(field)?;
        let pivot = relation
            .pivot
            .ok_or_else(|| PersistenceError::unsupported("detach on a non-shared relation"))?;
        let mine = self.require_key()?;
        self.state
            .borrow_mut()
            .pivots
            .entry(pivot)
            .or_default()
            .remove(&(mine, key.clone()));
        Ok(())
    }

    fn delete_related(&self, field: &str, key: &Key) -> Result<(), PersistenceError> {
        let relation = self.relation_spec(field)?;
        self.state
            .borrow_mut()
            .tables
            .entry(relation.target)
            .or_default()
            .remove(key);
        Ok(())
    }
}

///
/// TestEntity
///
/// Schema-driven field bag standing in for a domain type.
///

pub(crate) struct TestEntity {
    schema: &'static EntitySchema,
    fields: BTreeMap<&'static str, FieldState>,
}

impl TestEntity {
    pub(crate) fn uninit(schema: &'static EntitySchema) -> Self {
        Self {
            schema,
            fields: BTreeMap::new(),
        }
    }

    pub(crate) fn with_scalar(self, name: &'static str, value: Value) -> Self {
        self.with_field(name, FieldState::Scalar(value))
    }

    pub(crate) fn with_field(mut self, name: &'static str, state: FieldState) -> Self {
        self.fields.insert(name, state);
        self
    }
}

impl EntityValue for TestEntity {
    fn entity_type(&self) -> &'static str {
        self.schema.entity
    }

    fn get(&self, field: &str) -> FieldState {
        self.fields.get(field).cloned().unwrap_or_default()
    }

    fn set(&mut self, field: &str, value: FieldState) {
        if let Some(model) = self.schema.field(field) {
            self.fields.insert(model.name, value);
        }
    }
}

///
/// Fixture entity schemas
///

fn author_uninit() -> Box<dyn EntityValue> {
    Box::new(TestEntity::uninit(&AUTHOR))
}

fn post_uninit() -> Box<dyn EntityValue> {
    Box::new(TestEntity::uninit(&POST))
}

fn profile_uninit() -> Box<dyn EntityValue> {
    Box::new(TestEntity::uninit(&PROFILE))
}

fn tag_uninit() -> Box<dyn EntityValue> {
    Box::new(TestEntity::uninit(&TAG))
}

fn board_uninit() -> Box<dyn EntityValue> {
    Box::new(TestEntity::uninit(&BOARD))
}

static AUTHOR_FIELDS: [FieldModel; 5] = [
    FieldModel::identity("id"),
    FieldModel::scalar("name"),
    FieldModel::scalar("rating"),
    FieldModel::many(
        "posts",
        Some("Post"),
        ContainerKind::Wrapper(EntityCollection::build_tracked),
    ),
    FieldModel::one("profile", "Profile"),
];

pub(crate) static AUTHOR: EntitySchema = EntitySchema {
    entity: "Author",
    fields: &AUTHOR_FIELDS,
    new_uninit: author_uninit,
};

static POST_FIELDS: [FieldModel; 4] = [
    FieldModel::identity("id"),
    FieldModel::scalar("title"),
    FieldModel::one("author", "Author"),
    FieldModel::many(
        "tags",
        Some("Tag"),
        ContainerKind::Wrapper(EntityCollection::build_tracked),
    ),
];

pub(crate) static POST: EntitySchema = EntitySchema {
    entity: "Post",
    fields: &POST_FIELDS,
    new_uninit: post_uninit,
};

static PROFILE_FIELDS: [FieldModel; 3] = [
    FieldModel::identity("id"),
    FieldModel::scalar("bio"),
    FieldModel::one("owner", "Author"),
];

pub(crate) static PROFILE: EntitySchema = EntitySchema {
    entity: "Profile",
    fields: &PROFILE_FIELDS,
    new_uninit: profile_uninit,
};

static TAG_FIELDS: [FieldModel; 2] = [FieldModel::identity("id"), FieldModel::scalar("label")];

pub(crate) static TAG: EntitySchema = EntitySchema {
    entity: "Tag",
    fields: &TAG_FIELDS,
    new_uninit: tag_uninit,
};

static BOARD_FIELDS: [FieldModel; 3] = [
    FieldModel::identity("id"),
    FieldModel::scalar("title"),
    FieldModel::many("pins", Some("Tag"), ContainerKind::Array),
];

pub(crate) static BOARD: EntitySchema = EntitySchema {
    entity: "Board",
    fields: &BOARD_FIELDS,
    new_uninit: board_uninit,
};

pub(crate) fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry.register(&AUTHOR);
    registry.register(&POST);
    registry.register(&PROFILE);
    registry.register(&TAG);
    registry.register(&BOARD);
    registry
}

pub(crate) fn mem_store() -> MemStore {
    MemStore::default()
}
