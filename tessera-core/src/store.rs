use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::{RecordPayload, RelationshipData, SaveRequest};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::graph::Graph;
use crate::identity::Identity;
use crate::merge::Attributes;
use crate::observer::{LifecycleEvent, NoopObserver, StoreObserver};
use crate::record::{DefaultFactory, Record, RecordFactory};
use crate::reference::RecordReference;
use crate::relationship::{InverseLinks, Relationship};
use crate::scheduler::{Scheduler, Task};
use crate::schema::{
    implicit_name, PropertyMeta, RelationshipKind, RelationshipMeta, SchemaRegistry, TypeSchema,
};
use crate::validation::FieldErrors;

/// The identity map and everything that acts on it.
///
/// Responsibilities:
/// - Uniqueness: one live [`RecordReference`] per identity
/// - Attribute state: canonical, dirty and in-flight layers per record
/// - Relationship consistency: inverses kept in step across records
/// - Batching: deferred work runs when the host calls [`Store::flush`]
///
/// Operations that address a record as data (`push`, `set`, `get_record`,
/// relationship edits, preload) create its reference on demand. Operations
/// that assume a known record (`begin_save`, `rollback`, `unload_record`, ..)
/// fail with [`StoreError::NotFound`] instead.
pub struct Store {
    config: StoreConfig,
    pub(crate) schema: SchemaRegistry,
    pub(crate) references: HashMap<Identity, RecordReference>,
    pub(crate) scheduler: Scheduler,
    factory: Box<dyn RecordFactory>,
    pub(crate) observer: Box<dyn StoreObserver>,
    next_client_id: u64,
}

impl Store {
    pub fn new(schema: SchemaRegistry) -> Self {
        Self::with_config(schema, StoreConfig::default())
    }

    pub fn with_config(schema: SchemaRegistry, config: StoreConfig) -> Self {
        Store {
            config,
            schema,
            references: HashMap::new(),
            scheduler: Scheduler::new(),
            factory: Box::new(DefaultFactory),
            observer: Box::new(NoopObserver),
            next_client_id: 0,
        }
    }

    /// Replaces the factory used to materialize records.
    pub fn with_factory(mut self, factory: impl RecordFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    pub fn with_observer(mut self, observer: impl StoreObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Pending deferred work.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Number of live references.
    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.references.contains_key(identity)
    }

    pub fn reference(&self, identity: &Identity) -> Option<&RecordReference> {
        self.references.get(identity)
    }

    pub fn references(&self) -> impl Iterator<Item = &RecordReference> {
        self.references.values()
    }

    /// Returns the reference for `identity`, creating an empty one if needed.
    pub fn lookup_or_create(&mut self, identity: &Identity) -> Result<&RecordReference> {
        self.ensure(identity)?;
        self.references
            .get(identity)
            .ok_or_else(|| StoreError::NotFound(identity.clone()))
    }

    pub(crate) fn ensure(&mut self, identity: &Identity) -> Result<()> {
        if self.references.contains_key(identity) {
            return Ok(());
        }

        let model = identity.model();
        let schema = type_schema(&self.schema, model)?;
        let relationships = schema.relationships().map(|(key, meta)| {
            let inverse = meta
                .inverse
                .clone()
                .unwrap_or_else(|| implicit_name(model, key));
            Relationship::new(identity.clone(), key, meta.kind, inverse)
        });

        self.next_client_id += 1;
        let reference = RecordReference::new(identity.clone(), self.next_client_id, relationships);
        log::trace!("new reference {} (client id {})", identity, self.next_client_id);
        self.references.insert(identity.clone(), reference);
        Ok(())
    }

    /// Returns the record object for `identity`, materializing it once.
    pub fn get_record(&mut self, identity: &Identity) -> Result<Arc<Record>> {
        self.ensure(identity)?;
        let reference = entry(&mut self.references, identity)?;
        Ok(reference.get_record(self.factory.as_ref()))
    }

    /// Current value of an attribute, local edits included.
    pub fn attribute(&self, identity: &Identity, key: &str) -> Option<&Value> {
        self.references.get(identity)?.attribute(key)
    }

    /// Local edit of one attribute.
    pub fn set(
        &mut self,
        identity: &Identity,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let key = key.into();
        self.check_attribute(identity, &key)?;
        self.ensure(identity)?;

        let reference = entry(&mut self.references, identity)?;
        let changed = reference.set_attribute(key.clone(), value.into());
        reference.update_record_arrays_later(&mut self.scheduler);
        if changed {
            self.observer.properties_changed(identity, &[key]);
        }
        Ok(())
    }

    /// Merges trusted attributes into canonical without notifying anyone.
    pub fn setup_data(&mut self, identity: &Identity, data: &Attributes) -> Result<Vec<String>> {
        self.ensure(identity)?;
        let policy = self.config.pending_edit_policy;
        Ok(entry(&mut self.references, identity)?.setup_data(data, policy))
    }

    /// Accepts a record from the remote source.
    ///
    /// Relationship data is validated before anything is written. A
    /// belongs-to relationship given a list keeps its last member.
    pub fn push(&mut self, identity: &Identity, payload: RecordPayload) -> Result<()> {
        let mut updates = Vec::with_capacity(payload.relationships.len());
        for (key, data) in payload.relationships {
            let meta = self.relationship_meta(identity, &key)?;
            let members: Vec<Identity> = match (meta.kind, data) {
                (RelationshipKind::HasMany, RelationshipData::One(_)) => {
                    return Err(StoreError::NotASequence {
                        model: identity.model().to_string(),
                        key,
                    });
                }
                (_, RelationshipData::One(member)) => member.into_iter().collect(),
                (_, RelationshipData::Many(members)) => members,
            };
            for member in &members {
                check_member(&self.schema, identity, &key, meta, member)?;
            }
            updates.push((key, members));
        }

        self.ensure(identity)?;
        let policy = self.config.pending_edit_policy;
        let reference = entry(&mut self.references, identity)?;
        let first_load = !reference.is_loaded();
        let changed = reference.setup_data(&payload.attributes, policy);
        if first_load {
            reference.trigger_later(LifecycleEvent::DidLoad, &mut self.scheduler);
        }
        reference.update_record_arrays_later(&mut self.scheduler);
        log::debug!("pushed {identity}: {} changed key(s)", changed.len());
        self.notify(identity, &changed);

        for (key, members) in updates {
            for member in &members {
                self.ensure(member)?;
            }
            self.with_relationship(identity, &key, |relationship, links| {
                relationship.set_canonical(members, links)
            })?;
        }
        Ok(())
    }

    /// Registers a record created locally. Its attributes start dirty.
    pub fn create_record(
        &mut self,
        identity: &Identity,
        attributes: Attributes,
    ) -> Result<Arc<Record>> {
        for key in attributes.keys() {
            self.check_attribute(identity, key)?;
        }
        self.ensure(identity)?;

        let reference = entry(&mut self.references, identity)?;
        if reference.is_loaded() || reference.is_new() {
            return Err(StoreError::AlreadyLoaded(identity.clone()));
        }
        reference.mark_new(attributes);
        reference.update_record_arrays_later(&mut self.scheduler);
        log::debug!("created {identity}");
        Ok(reference.get_record(self.factory.as_ref()))
    }

    /// Starts a save: moves dirty attributes in flight and returns what to
    /// send.
    pub fn begin_save(&mut self, identity: &Identity) -> Result<SaveRequest> {
        entry(&mut self.references, identity)?
            .will_commit()
            .map_err(|err| StoreError::transition(identity, err))
    }

    /// The remote source accepted the save. Keys whose canonical value
    /// `data` changed are notified.
    pub fn adapter_did_commit(
        &mut self,
        identity: &Identity,
        data: Option<Attributes>,
    ) -> Result<()> {
        let reference = entry(&mut self.references, identity)?;
        let changed = reference
            .adapter_did_commit(data.as_ref(), &mut self.scheduler)
            .map_err(|err| StoreError::transition(identity, err))?;
        self.notify(identity, &changed);

        for key in self.relationship_keys(identity) {
            self.with_relationship(identity, &key, |relationship, links| {
                relationship.commit(links)
            })?;
        }
        Ok(())
    }

    pub fn adapter_did_invalidate(
        &mut self,
        identity: &Identity,
        errors: FieldErrors,
    ) -> Result<()> {
        entry(&mut self.references, identity)?
            .adapter_did_invalidate(errors, &mut self.scheduler)
            .map_err(|err| StoreError::transition(identity, err))
    }

    pub fn adapter_did_error(&mut self, identity: &Identity) -> Result<()> {
        entry(&mut self.references, identity)?
            .adapter_did_error(&mut self.scheduler)
            .map_err(|err| StoreError::transition(identity, err))
    }

    /// A failed fetch marks the record as errored unless a save owns its
    /// state.
    pub(crate) fn fetch_did_error(&mut self, identity: &Identity) {
        let Some(reference) = self.references.get_mut(identity) else {
            return;
        };
        if let Err(err) = reference.adapter_did_error(&mut self.scheduler) {
            log::debug!("{identity} keeps its state after failed fetch: {err}");
        }
    }

    /// Discards local attribute edits, field errors and relationship edits.
    pub fn rollback(&mut self, identity: &Identity) -> Result<()> {
        let reference = entry(&mut self.references, identity)?;
        let reverted = reference
            .rollback()
            .map_err(|err| StoreError::transition(identity, err))?;
        reference.update_record_arrays_later(&mut self.scheduler);
        self.notify(identity, &reverted);

        for key in self.relationship_keys(identity) {
            self.with_relationship(identity, &key, |relationship, links| {
                relationship.flush_canonical(links)
            })?;
        }
        Ok(())
    }

    /// Looks up an explicit or implicit relationship of a live record.
    pub fn relationship(&self, identity: &Identity, key: &str) -> Option<&Relationship> {
        self.references.get(identity)?.relationship(key)
    }

    /// Current value of a belongs-to relationship.
    pub fn belongs_to(&self, identity: &Identity, key: &str) -> Result<Option<&Identity>> {
        Ok(self.declared(identity, key, RelationshipKind::BelongsTo)?.value())
    }

    /// Current members of a has-many relationship.
    pub fn has_many(&self, identity: &Identity, key: &str) -> Result<Vec<&Identity>> {
        Ok(self
            .declared(identity, key, RelationshipKind::HasMany)?
            .members()
            .collect())
    }

    /// Local edit of a belongs-to relationship.
    pub fn set_belongs_to(
        &mut self,
        identity: &Identity,
        key: &str,
        value: Option<Identity>,
    ) -> Result<()> {
        let meta = self.relationship_of_kind(identity, key, RelationshipKind::BelongsTo)?;
        if let Some(member) = &value {
            check_member(&self.schema, identity, key, &meta, member)?;
            self.ensure(member)?;
        }
        self.ensure(identity)?;
        self.with_relationship(identity, key, |relationship, links| {
            relationship.set_value(value, links)
        })?;
        self.relationship_changed(identity, key);
        Ok(())
    }

    /// Local edit: adds `member` to a has-many relationship.
    pub fn add_to_has_many(
        &mut self,
        identity: &Identity,
        key: &str,
        member: Identity,
    ) -> Result<()> {
        let meta = self.relationship_of_kind(identity, key, RelationshipKind::HasMany)?;
        check_member(&self.schema, identity, key, &meta, &member)?;
        self.ensure(&member)?;
        self.ensure(identity)?;
        self.with_relationship(identity, key, |relationship, links| {
            relationship.add(member, links)
        })?;
        self.relationship_changed(identity, key);
        Ok(())
    }

    /// Local edit: removes `member` from a has-many relationship. Returns
    /// whether it was a member.
    pub fn remove_from_has_many(
        &mut self,
        identity: &Identity,
        key: &str,
        member: &Identity,
    ) -> Result<bool> {
        self.relationship_of_kind(identity, key, RelationshipKind::HasMany)?;
        self.ensure(identity)?;
        let removed = self.with_relationship(identity, key, |relationship, links| {
            relationship.remove_member(member, links)
        })?;
        if removed {
            self.relationship_changed(identity, key);
        }
        Ok(removed)
    }

    /// Runs deferred work: record-array refreshes and lifecycle triggers, in
    /// the order they were scheduled. Work for references discarded since
    /// scheduling is skipped.
    pub fn flush(&mut self) {
        while let Some(task) = self.scheduler.pop() {
            match task {
                Task::UpdateRecordArrays(identity) => {
                    let Some(reference) = self.references.get_mut(&identity) else {
                        continue;
                    };
                    if reference.update_record_arrays() {
                        self.observer.record_arrays_changed(&identity);
                    }
                }
                Task::FlushTriggers(identity) => {
                    let Some(reference) = self.references.get_mut(&identity) else {
                        continue;
                    };
                    for event in reference.take_deferred_triggers() {
                        log::trace!("{identity}: {event:?}");
                        self.observer.lifecycle(&identity, event);
                    }
                }
            }
        }
    }

    /// Runs `f` on one relationship with the rest of the graph available for
    /// inverse bookkeeping.
    pub(crate) fn with_relationship<T>(
        &mut self,
        identity: &Identity,
        key: &str,
        f: impl FnOnce(&mut Relationship, &mut dyn InverseLinks) -> T,
    ) -> Result<T> {
        let reference = entry(&mut self.references, identity)?;
        let (slot, mut relationship) =
            reference
                .take_relationship(key)
                .ok_or_else(|| StoreError::UnknownRelationship {
                    model: identity.model().to_string(),
                    key: key.to_string(),
                })?;

        let result = f(&mut relationship, &mut Graph::new(&mut self.references, &self.schema));

        if let Some(reference) = self.references.get_mut(identity) {
            reference.restore_relationship(slot, relationship);
        }
        Ok(result)
    }

    fn relationship_keys(&self, identity: &Identity) -> Vec<String> {
        self.references
            .get(identity)
            .map(RecordReference::relationship_keys)
            .unwrap_or_default()
    }

    fn relationship_changed(&mut self, identity: &Identity, key: &str) {
        if let Some(reference) = self.references.get_mut(identity) {
            reference.update_record_arrays_later(&mut self.scheduler);
        }
        self.observer.properties_changed(identity, &[key.to_string()]);
    }

    fn notify(&mut self, identity: &Identity, keys: &[String]) {
        if !keys.is_empty() {
            self.observer.properties_changed(identity, keys);
        }
    }

    fn check_attribute(&self, identity: &Identity, key: &str) -> Result<()> {
        let schema = type_schema(&self.schema, identity.model())?;
        match schema.meta_for_property(key) {
            PropertyMeta::Relationship(_) => Err(StoreError::NotAnAttribute {
                model: identity.model().to_string(),
                key: key.to_string(),
            }),
            PropertyMeta::Attribute if self.config.strict_schema && !schema.is_attribute(key) => {
                Err(StoreError::UnknownProperty {
                    model: identity.model().to_string(),
                    key: key.to_string(),
                })
            }
            PropertyMeta::Attribute => Ok(()),
        }
    }

    pub(crate) fn relationship_meta(
        &self,
        identity: &Identity,
        key: &str,
    ) -> Result<&RelationshipMeta> {
        type_schema(&self.schema, identity.model())?
            .meta_for_property(key)
            .relationship()
            .ok_or_else(|| StoreError::UnknownRelationship {
                model: identity.model().to_string(),
                key: key.to_string(),
            })
    }

    fn relationship_of_kind(
        &self,
        identity: &Identity,
        key: &str,
        kind: RelationshipKind,
    ) -> Result<RelationshipMeta> {
        let meta = self.relationship_meta(identity, key)?;
        if meta.kind != kind {
            return Err(StoreError::WrongCardinality {
                model: identity.model().to_string(),
                key: key.to_string(),
                expected: kind,
            });
        }
        Ok(meta.clone())
    }

    fn declared(
        &self,
        identity: &Identity,
        key: &str,
        kind: RelationshipKind,
    ) -> Result<&Relationship> {
        self.relationship_of_kind(identity, key, kind)?;
        self.references
            .get(identity)
            .and_then(|reference| reference.relationship(key))
            .ok_or_else(|| StoreError::NotFound(identity.clone()))
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("references", &self.references.len())
            .field("scheduled", &self.scheduler.len())
            .finish_non_exhaustive()
    }
}

pub(crate) fn entry<'a>(
    references: &'a mut HashMap<Identity, RecordReference>,
    identity: &Identity,
) -> Result<&'a mut RecordReference> {
    references
        .get_mut(identity)
        .ok_or_else(|| StoreError::NotFound(identity.clone()))
}

pub(crate) fn type_schema<'a>(schema: &'a SchemaRegistry, model: &str) -> Result<&'a TypeSchema> {
    schema
        .get(model)
        .ok_or_else(|| StoreError::UnknownModel(model.to_string()))
}

/// Checks that `member` may join `owner.key`: its model is registered and,
/// unless the relationship is polymorphic, is the declared target. Members
/// of a polymorphic relationship must declare its inverse.
pub(crate) fn check_member(
    schema: &SchemaRegistry,
    owner: &Identity,
    key: &str,
    meta: &RelationshipMeta,
    member: &Identity,
) -> Result<()> {
    if !schema.contains(member.model()) {
        return Err(StoreError::UnknownModel(member.model().to_string()));
    }
    if !meta.polymorphic && member.model() != meta.target {
        return Err(StoreError::TypeMismatch {
            model: owner.model().to_string(),
            key: key.to_string(),
            expected: meta.target.clone(),
            found: member.clone(),
        });
    }
    if let (true, Some(inverse)) = (meta.polymorphic, &meta.inverse) {
        let declared = schema
            .meta_for_property(member.model(), inverse)
            .is_some_and(|meta| meta.is_relationship());
        if !declared {
            return Err(StoreError::MissingInverse {
                model: owner.model().to_string(),
                key: key.to_string(),
                member: member.clone(),
                inverse: inverse.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::attributes_from_value;
    use crate::schema::TypeSchema;
    use crate::state::SaveState;
    use serde_json::json;

    fn schema() -> SchemaRegistry {
        SchemaRegistry::build([
            TypeSchema::new("user")
                .attribute("name")
                .relationship("posts", RelationshipMeta::has_many("post").inverse("author")),
            TypeSchema::new("post")
                .attribute("title")
                .relationship("author", RelationshipMeta::belongs_to("user").inverse("posts"))
                .has_many("tags", "tag"),
            TypeSchema::new("tag").attribute("label"),
        ])
        .unwrap()
    }

    fn post(id: &str) -> Identity {
        Identity::new("post", id)
    }

    fn user(id: &str) -> Identity {
        Identity::new("user", id)
    }

    fn attrs(value: Value) -> Attributes {
        attributes_from_value(value).unwrap()
    }

    #[test]
    fn lookup_is_idempotent() {
        let mut store = Store::new(schema());
        let first = store.lookup_or_create(&post("1")).unwrap().client_id();
        let second = store.lookup_or_create(&post("1")).unwrap().client_id();
        let other = store.lookup_or_create(&post("2")).unwrap().client_id();

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn unknown_model_is_rejected() {
        let mut store = Store::new(schema());
        let err = store.lookup_or_create(&Identity::new("comment", "1")).unwrap_err();
        assert!(matches!(err, StoreError::UnknownModel(model) if model == "comment"));
    }

    #[test]
    fn declared_relationships_exist_on_creation() {
        let mut store = Store::new(schema());
        let reference = store.lookup_or_create(&post("1")).unwrap();

        let keys: Vec<_> = reference.relationships().map(Relationship::key).collect();
        assert_eq!(keys, ["author", "tags"]);
        assert_eq!(reference.relationship("tags").unwrap().inverse_key(), "~post:tags");
    }

    #[test]
    fn set_rejects_relationship_keys() {
        let mut store = Store::new(schema());
        let err = store.set(&post("1"), "author", "x").unwrap_err();
        assert!(matches!(err, StoreError::NotAnAttribute { .. }));
    }

    #[test]
    fn strict_schema_rejects_undeclared_keys() {
        let config = StoreConfig {
            strict_schema: true,
            ..StoreConfig::default()
        };
        let mut store = Store::with_config(schema(), config);

        assert!(matches!(
            store.set(&post("1"), "subtitle", "x"),
            Err(StoreError::UnknownProperty { .. })
        ));
        store.set(&post("1"), "title", "x").unwrap();
    }

    #[test]
    fn push_links_inverse() {
        let mut store = Store::new(schema());
        store
            .push(
                &post("1"),
                RecordPayload::new()
                    .attribute("title", "hello")
                    .belongs_to("author", Some(user("a"))),
            )
            .unwrap();

        assert_eq!(store.attribute(&post("1"), "title"), Some(&json!("hello")));
        assert_eq!(store.belongs_to(&post("1"), "author").unwrap(), Some(&user("a")));
        assert_eq!(store.has_many(&user("a"), "posts").unwrap(), [&post("1")]);
    }

    #[test]
    fn push_validates_before_writing() {
        let mut store = Store::new(schema());
        let err = store
            .push(
                &post("1"),
                RecordPayload::new()
                    .attribute("title", "hello")
                    .has_many("tags", [user("a")]),
            )
            .unwrap_err();

        assert!(matches!(err, StoreError::TypeMismatch { .. }));
        assert!(!store.contains(&post("1")));
    }

    #[test]
    fn push_rejects_single_value_for_has_many() {
        let mut store = Store::new(schema());
        let err = store
            .push(&user("a"), RecordPayload::new().belongs_to("posts", None))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotASequence { .. }));
    }

    #[test]
    fn create_record_starts_dirty() {
        let mut store = Store::new(schema());
        let record = store
            .create_record(&post("new"), attrs(json!({"title": "draft"})))
            .unwrap();

        let reference = store.reference(&post("new")).unwrap();
        assert!(reference.is_new());
        assert_eq!(reference.state(), SaveState::Dirty);
        assert_eq!(reference.dirty().get("title"), Some(&json!("draft")));
        assert!(Arc::ptr_eq(reference.record().unwrap(), &record));
    }

    #[test]
    fn create_record_over_loaded_record_fails() {
        let mut store = Store::new(schema());
        store.push(&post("1"), RecordPayload::new().attribute("title", "x")).unwrap();

        let err = store.create_record(&post("1"), Attributes::new()).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyLoaded(_)));
    }

    #[test]
    fn begin_save_twice_is_invalid_transition() {
        let mut store = Store::new(schema());
        store.set(&post("1"), "title", "x").unwrap();
        store.begin_save(&post("1")).unwrap();

        let err = store.begin_save(&post("1")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn save_paths_require_known_record() {
        let mut store = Store::new(schema());
        assert!(matches!(store.begin_save(&post("1")), Err(StoreError::NotFound(_))));
        assert!(matches!(store.rollback(&post("1")), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn local_relationship_edit_then_rollback() {
        let mut store = Store::new(schema());
        store
            .push(&post("1"), RecordPayload::new().belongs_to("author", Some(user("a"))))
            .unwrap();

        store.set_belongs_to(&post("1"), "author", Some(user("b"))).unwrap();
        assert_eq!(store.has_many(&user("a"), "posts").unwrap(), Vec::<&Identity>::new());
        assert_eq!(store.has_many(&user("b"), "posts").unwrap(), [&post("1")]);

        store.rollback(&post("1")).unwrap();
        assert_eq!(store.belongs_to(&post("1"), "author").unwrap(), Some(&user("a")));
        assert_eq!(store.has_many(&user("a"), "posts").unwrap(), [&post("1")]);
        assert!(store.has_many(&user("b"), "posts").unwrap().is_empty());
    }

    #[test]
    fn commit_confirms_relationship_edits() {
        let mut store = Store::new(schema());
        store.add_to_has_many(&user("a"), "posts", post("1")).unwrap();
        assert!(store.relationship(&user("a"), "posts").unwrap().has_local_changes());

        store.begin_save(&user("a")).unwrap();
        store.adapter_did_commit(&user("a"), None).unwrap();

        assert!(!store.relationship(&user("a"), "posts").unwrap().has_local_changes());
        assert_eq!(
            store.relationship(&post("1"), "author").unwrap().canonical_value(),
            Some(&user("a"))
        );
    }

    #[test]
    fn relationship_cardinality_is_checked() {
        let mut store = Store::new(schema());
        let err = store.set_belongs_to(&user("a"), "posts", None).unwrap_err();
        assert!(matches!(
            err,
            StoreError::WrongCardinality { expected: RelationshipKind::BelongsTo, .. }
        ));
        assert!(matches!(
            store.has_many(&post("1"), "title"),
            Err(StoreError::UnknownRelationship { .. })
        ));
    }

    #[test]
    fn remove_from_has_many_reports_membership() {
        let mut store = Store::new(schema());
        store.add_to_has_many(&post("1"), "tags", Identity::new("tag", "t")).unwrap();

        let tag = Identity::new("tag", "t");
        assert!(store.remove_from_has_many(&post("1"), "tags", &tag).unwrap());
        assert!(!store.remove_from_has_many(&post("1"), "tags", &tag).unwrap());
        assert!(
            store
                .relationship(&Identity::new("tag", "t"), "~post:tags")
                .unwrap()
                .members()
                .next()
                .is_none()
        );
    }

    #[test]
    fn polymorphic_edit_checks_member_declares_inverse() {
        let schema = SchemaRegistry::build([
            TypeSchema::new("comment").relationship(
                "subject",
                RelationshipMeta::belongs_to("subject").polymorphic().inverse("comments"),
            ),
            TypeSchema::new("user").relationship(
                "comments",
                RelationshipMeta::has_many("comment").inverse("subject"),
            ),
            TypeSchema::new("tag").attribute("label"),
        ])
        .unwrap();
        let mut store = Store::new(schema);
        let comment = Identity::new("comment", "1");

        let err = store
            .set_belongs_to(&comment, "subject", Some(Identity::new("tag", "t")))
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingInverse { .. }));
        assert!(!store.contains(&Identity::new("tag", "t")));

        store.set_belongs_to(&comment, "subject", Some(user("u"))).unwrap();
        assert_eq!(store.has_many(&user("u"), "comments").unwrap(), [&comment]);
    }
}
