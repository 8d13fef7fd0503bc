//! Store-level relationship passes and record teardown.
//!
//! Each pass takes every relationship out of the record, explicit ones first,
//! runs the protocol against the rest of the graph and puts them back.

use crate::error::{Result, StoreError};
use crate::graph::Graph;
use crate::identity::Identity;
use crate::observer::LifecycleEvent;
use crate::relationship::{teardown, InverseLinks, Relationship, RelationshipLifecycle};
use crate::store::{entry, Store};

impl Store {
    /// Clears then destroys every relationship of `identity`.
    ///
    /// One failing relationship does not stop the pass; failures are
    /// reported together once every relationship was processed.
    pub fn clear_relationships(&mut self, identity: &Identity) -> Result<()> {
        let failures = self.each_relationship(identity, |relationships, graph| {
            teardown(relationships, graph)
        })?;

        if failures.is_empty() {
            return Ok(());
        }
        for failure in &failures {
            log::warn!("teardown of {identity}: {failure}");
        }
        Err(StoreError::Teardown {
            identity: identity.clone(),
            failures,
        })
    }

    /// Detaches `identity` from the inverse side of all its relationships
    /// while keeping its own membership.
    pub fn disconnect_relationships(&mut self, identity: &Identity) -> Result<()> {
        self.each_relationship(identity, |relationships, graph| {
            for relationship in relationships {
                relationship.disconnect(graph);
            }
        })
    }

    /// Re-establishes the inverses removed by
    /// [`disconnect_relationships`](Store::disconnect_relationships).
    pub fn reconnect_relationships(&mut self, identity: &Identity) -> Result<()> {
        self.each_relationship(identity, |relationships, graph| {
            for relationship in relationships {
                relationship.reconnect(graph);
            }
        })
    }

    /// Drops a record from the cache.
    ///
    /// Its relationships are torn down and the reference discarded; a later
    /// lookup of the same identity starts from an empty reference. A record
    /// with a save in flight cannot be unloaded.
    pub fn unload_record(&mut self, identity: &Identity) -> Result<()> {
        let reference = entry(&mut self.references, identity)?;
        if reference.state().is_in_flight() {
            return Err(StoreError::RecordInFlight(identity.clone()));
        }

        let result = self.clear_relationships(identity);
        self.discard(identity, LifecycleEvent::DidUnload);
        result
    }

    /// Tears a record down unconditionally.
    pub fn destroy(&mut self, identity: &Identity) -> Result<()> {
        entry(&mut self.references, identity)?;
        let result = self.clear_relationships(identity);
        self.discard(identity, LifecycleEvent::DidDestroy);
        result
    }

    fn discard(&mut self, identity: &Identity, event: LifecycleEvent) {
        let Some(reference) = self.references.remove(identity) else {
            return;
        };
        if let Some(record) = reference.record() {
            record.release();
        }
        log::debug!("{identity} discarded ({event:?})");
        self.observer.record_arrays_changed(identity);
        self.observer.lifecycle(identity, event);
    }

    fn each_relationship<T>(
        &mut self,
        identity: &Identity,
        f: impl FnOnce(Vec<&mut Relationship>, &mut dyn InverseLinks) -> T,
    ) -> Result<T> {
        let (mut explicit, mut implicit) =
            entry(&mut self.references, identity)?.take_relationships();

        let result = {
            let relationships = explicit.values_mut().chain(implicit.values_mut()).collect();
            f(relationships, &mut Graph::new(&mut self.references, &self.schema))
        };

        if let Some(reference) = self.references.get_mut(identity) {
            reference.restore_relationships(explicit, implicit);
        }
        Ok(result)
    }
}
