use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// Lifecycle notifications delivered to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    DidLoad,
    DidCreate,
    DidUpdate,
    DidCommit,
    BecameInvalid,
    BecameError,
    DidUnload,
    DidDestroy,
}

/// Receives change notifications from the store.
///
/// Every method defaults to a no-op so observers only implement what they
/// care about.
pub trait StoreObserver: Send {
    /// Properties of `identity` whose value changed.
    fn properties_changed(&mut self, _identity: &Identity, _keys: &[String]) {}

    /// Record arrays containing `identity` need a refresh.
    fn record_arrays_changed(&mut self, _identity: &Identity) {}

    fn lifecycle(&mut self, _identity: &Identity, _event: LifecycleEvent) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StoreObserver for NoopObserver {}
