//! The identity-map entry for one record.
//!
//! A reference holds three attribute layers: `canonical` (confirmed by the
//! remote source), `in_flight` (snapshot being saved) and `dirty` (local
//! edits not yet sent). Reads resolve dirty, then in-flight, then canonical.
//!
//! # Invariants
//! - A key moves dirty -> in-flight in one step when a save begins.
//! - In-flight is cleared only when the save resolves: folded into canonical
//!   on commit, restored to dirty on rejection unless dirty holds a newer
//!   value for the key.
//! - The record object is created at most once.

use indexmap::IndexMap;
use serde_json::Value;
use std::sync::{Arc, OnceLock};

use crate::adapter::SaveRequest;
use crate::config::PendingEditPolicy;
use crate::identity::Identity;
use crate::merge::{merge_and_diff, Attributes};
use crate::observer::LifecycleEvent;
use crate::record::{Record, RecordFactory};
use crate::relationship::Relationship;
use crate::scheduler::{Scheduler, Task};
use crate::state::{InvalidTransition, SaveEvent, SaveState};
use crate::validation::FieldErrors;

/// Where a relationship was taken from, so it can be put back in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Explicit(usize),
    Implicit(usize),
}

pub struct RecordReference {
    identity: Identity,
    client_id: u64,
    canonical: Attributes,
    dirty: Attributes,
    in_flight: Attributes,
    relationships: IndexMap<String, Relationship>,
    implicit_relationships: IndexMap<String, Relationship>,
    record: OnceLock<Arc<Record>>,
    is_empty: bool,
    is_loaded: bool,
    is_new: bool,
    is_error: bool,
    state: SaveState,
    errors: FieldErrors,
    deferred_triggers: Vec<LifecycleEvent>,
    record_arrays_pending: bool,
}

impl RecordReference {
    /// Creates an empty reference with one state object per declared
    /// relationship.
    pub(crate) fn new(
        identity: Identity,
        client_id: u64,
        relationships: impl IntoIterator<Item = Relationship>,
    ) -> Self {
        RecordReference {
            identity,
            client_id,
            canonical: Attributes::new(),
            dirty: Attributes::new(),
            in_flight: Attributes::new(),
            relationships: relationships
                .into_iter()
                .map(|rel| (rel.key().to_string(), rel))
                .collect(),
            implicit_relationships: IndexMap::new(),
            record: OnceLock::new(),
            is_empty: true,
            is_loaded: false,
            is_new: false,
            is_error: false,
            state: SaveState::Clean,
            errors: FieldErrors::new(),
            deferred_triggers: Vec::new(),
            record_arrays_pending: false,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Store-local serial number, stable for the lifetime of the reference.
    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    pub fn canonical(&self) -> &Attributes {
        &self.canonical
    }

    pub fn dirty(&self) -> &Attributes {
        &self.dirty
    }

    pub fn in_flight(&self) -> &Attributes {
        &self.in_flight
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// True until the record is materialized or receives data.
    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    /// True once any data was set up from a trusted source.
    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// The record object, if it was materialized.
    pub fn record(&self) -> Option<&Arc<Record>> {
        self.record.get()
    }

    /// Returns the record object, materializing it on first call.
    pub fn get_record(&mut self, factory: &dyn RecordFactory) -> Arc<Record> {
        let identity = &self.identity;
        let record = self
            .record
            .get_or_init(|| {
                log::trace!("materializing {}", identity);
                Arc::new(factory.create(identity))
            })
            .clone();
        self.is_empty = false;
        record
    }

    /// Reads an attribute through dirty, in-flight and canonical layers.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.dirty
            .get(key)
            .or_else(|| self.in_flight.get(key))
            .or_else(|| self.canonical.get(key))
    }

    /// Merges trusted data into canonical and returns the changed keys.
    ///
    /// Does not notify anyone. Under [`PendingEditPolicy::PreferRemote`]
    /// pending local edits of the pushed keys are discarded.
    pub fn setup_data(&mut self, data: &Attributes, policy: PendingEditPolicy) -> Vec<String> {
        let changed = merge_and_diff(&mut self.canonical, Some(data));
        if policy == PendingEditPolicy::PreferRemote {
            for key in data.keys() {
                self.dirty.shift_remove(key);
            }
            self.sync_dirty_state();
        }
        self.is_empty = false;
        self.is_loaded = true;
        changed
    }

    /// Writes one canonical value without merge bookkeeping.
    pub(crate) fn write_canonical(&mut self, key: String, value: Value) {
        self.canonical.insert(key, value);
        self.is_empty = false;
        self.is_loaded = true;
    }

    /// Stages a local edit. Returns whether the visible value changed.
    pub(crate) fn set_attribute(&mut self, key: String, value: Value) -> bool {
        let changed = self.attribute(&key) != Some(&value);

        let original = self.in_flight.get(&key).or_else(|| self.canonical.get(&key));
        if original == Some(&value) {
            self.dirty.shift_remove(&key);
        } else {
            self.dirty.insert(key.clone(), value);
        }

        if self.errors.remove(&key) && self.errors.is_empty() && self.state == SaveState::Invalid {
            self.transition(SaveEvent::BecameValid);
        }
        self.sync_dirty_state();
        changed
    }

    /// Marks the reference as a locally created record.
    pub(crate) fn mark_new(&mut self, attributes: Attributes) {
        self.dirty = attributes;
        self.is_new = true;
        self.is_empty = false;
        self.transition(SaveEvent::BecomeDirty);
    }

    /// Starts a save: dirty attributes become the in-flight snapshot.
    pub(crate) fn will_commit(&mut self) -> Result<SaveRequest, InvalidTransition> {
        self.state = self.state.send(SaveEvent::WillCommit)?;
        self.in_flight = std::mem::take(&mut self.dirty);
        log::debug!("{} in flight with {} attribute(s)", self.identity, self.in_flight.len());
        Ok(SaveRequest {
            identity: self.identity.clone(),
            attributes: self.in_flight.clone(),
            is_new: self.is_new,
        })
    }

    /// Completes a save.
    ///
    /// `data` (if the remote source echoed any) is merged into canonical and
    /// the keys it changed are returned. In-flight values `data` does not
    /// mention are folded in without being reported.
    pub fn adapter_did_commit(
        &mut self,
        data: Option<&Attributes>,
        scheduler: &mut Scheduler,
    ) -> Result<Vec<String>, InvalidTransition> {
        self.state = self.state.send(SaveEvent::DidCommit)?;

        let in_flight = std::mem::take(&mut self.in_flight);
        let changed = merge_and_diff(&mut self.canonical, data);
        for (key, value) in in_flight {
            if !data.is_some_and(|data| data.contains_key(&key)) {
                self.canonical.insert(key, value);
            }
        }

        self.is_error = false;
        self.is_loaded = true;
        self.errors.clear();
        let was_new = std::mem::replace(&mut self.is_new, false);
        self.sync_dirty_state();

        log::debug!("{} committed, {} key(s) changed", self.identity, changed.len());

        let event = if was_new {
            LifecycleEvent::DidCreate
        } else {
            LifecycleEvent::DidUpdate
        };
        self.trigger_later(event, scheduler);
        self.trigger_later(LifecycleEvent::DidCommit, scheduler);
        self.update_record_arrays_later(scheduler);
        Ok(changed)
    }

    /// The remote source rejected the save with field errors.
    pub fn adapter_did_invalidate(
        &mut self,
        errors: FieldErrors,
        scheduler: &mut Scheduler,
    ) -> Result<(), InvalidTransition> {
        self.state = self.state.send(SaveEvent::BecameInvalid)?;
        self.errors.merge(errors);
        self.save_was_rejected();
        log::debug!("{} invalid: {} field(s)", self.identity, self.errors.len());
        self.trigger_later(LifecycleEvent::BecameInvalid, scheduler);
        Ok(())
    }

    /// The remote operation failed without a structured error.
    pub fn adapter_did_error(
        &mut self,
        scheduler: &mut Scheduler,
    ) -> Result<(), InvalidTransition> {
        self.state = self.state.send(SaveEvent::BecameError)?;
        self.is_error = true;
        self.save_was_rejected();
        log::debug!("{} became error", self.identity);
        self.trigger_later(LifecycleEvent::BecameError, scheduler);
        Ok(())
    }

    /// Moves in-flight values back to dirty, unless a newer local edit of the
    /// same key exists.
    pub(crate) fn save_was_rejected(&mut self) {
        for (key, value) in std::mem::take(&mut self.in_flight) {
            self.dirty.entry(key).or_insert(value);
        }
    }

    /// Drops local edits and errors. Returns the keys whose visible value
    /// reverted.
    pub(crate) fn rollback(&mut self) -> Result<Vec<String>, InvalidTransition> {
        self.state = self.state.send(SaveEvent::Rollback)?;
        let dirty = std::mem::take(&mut self.dirty);
        self.errors.clear();
        self.is_error = false;
        Ok(dirty
            .into_iter()
            .filter(|(key, value)| self.canonical.get(key) != Some(value))
            .map(|(key, _)| key)
            .collect())
    }

    /// Requests a record-array refresh, at most once per flush.
    pub fn update_record_arrays_later(&mut self, scheduler: &mut Scheduler) {
        if self.record_arrays_pending {
            return;
        }
        self.record_arrays_pending = true;
        scheduler.schedule_once(Task::UpdateRecordArrays(self.identity.clone()));
    }

    /// Consumes the pending refresh request. Returns false when nothing was
    /// pending.
    pub(crate) fn update_record_arrays(&mut self) -> bool {
        std::mem::replace(&mut self.record_arrays_pending, false)
    }

    /// Queues a lifecycle notification for the next flush.
    pub fn trigger_later(&mut self, event: LifecycleEvent, scheduler: &mut Scheduler) {
        self.deferred_triggers.push(event);
        scheduler.schedule_once(Task::FlushTriggers(self.identity.clone()));
    }

    pub fn deferred_triggers(&self) -> &[LifecycleEvent] {
        &self.deferred_triggers
    }

    pub(crate) fn take_deferred_triggers(&mut self) -> Vec<LifecycleEvent> {
        std::mem::take(&mut self.deferred_triggers)
    }

    /// Applies a transition that cannot fail from the current state.
    fn transition(&mut self, event: SaveEvent) {
        if let Ok(next) = self.state.send(event) {
            self.state = next;
        }
    }

    fn sync_dirty_state(&mut self) {
        let event = if self.dirty.is_empty() && !self.is_new {
            SaveEvent::BecomeClean
        } else {
            SaveEvent::BecomeDirty
        };
        self.transition(event);
    }

    /// Looks up an explicit or implicit relationship.
    pub fn relationship(&self, key: &str) -> Option<&Relationship> {
        self.relationships
            .get(key)
            .or_else(|| self.implicit_relationships.get(key))
    }

    pub(crate) fn relationship_mut(&mut self, key: &str) -> Option<&mut Relationship> {
        match self.relationships.get_mut(key) {
            Some(rel) => Some(rel),
            None => self.implicit_relationships.get_mut(key),
        }
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }

    pub fn implicit_relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.implicit_relationships.values()
    }

    pub(crate) fn relationship_keys(&self) -> Vec<String> {
        self.relationships.keys().cloned().collect()
    }

    /// Adds an implicit relationship, returning the existing one if present.
    pub(crate) fn implicit_entry(&mut self, relationship: Relationship) -> &mut Relationship {
        self.implicit_relationships
            .entry(relationship.key().to_string())
            .or_insert(relationship)
    }

    pub(crate) fn take_relationship(&mut self, key: &str) -> Option<(Slot, Relationship)> {
        if let Some((index, _, rel)) = self.relationships.shift_remove_full(key) {
            return Some((Slot::Explicit(index), rel));
        }
        self.implicit_relationships
            .shift_remove_full(key)
            .map(|(index, _, rel)| (Slot::Implicit(index), rel))
    }

    pub(crate) fn restore_relationship(&mut self, slot: Slot, relationship: Relationship) {
        let (map, index) = match slot {
            Slot::Explicit(index) => (&mut self.relationships, index),
            Slot::Implicit(index) => (&mut self.implicit_relationships, index),
        };
        let index = index.min(map.len());
        map.shift_insert(index, relationship.key().to_string(), relationship);
    }

    /// Takes every relationship out for a bulk pass over the graph.
    pub(crate) fn take_relationships(
        &mut self,
    ) -> (IndexMap<String, Relationship>, IndexMap<String, Relationship>) {
        (
            std::mem::take(&mut self.relationships),
            std::mem::take(&mut self.implicit_relationships),
        )
    }

    /// Puts relationships back after a bulk pass. Implicit relationships
    /// created on this reference during the pass are kept after the restored
    /// ones.
    pub(crate) fn restore_relationships(
        &mut self,
        explicit: IndexMap<String, Relationship>,
        implicit: IndexMap<String, Relationship>,
    ) {
        self.relationships = explicit;
        let created = std::mem::replace(&mut self.implicit_relationships, implicit);
        for (key, rel) in created {
            self.implicit_relationships.entry(key).or_insert(rel);
        }
    }
}

impl std::fmt::Debug for RecordReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordReference")
            .field("identity", &self.identity)
            .field("client_id", &self.client_id)
            .field("state", &self.state)
            .field("canonical", &self.canonical)
            .field("dirty", &self.dirty)
            .field("in_flight", &self.in_flight)
            .field("is_empty", &self.is_empty)
            .finish_non_exhaustive()
    }
}
