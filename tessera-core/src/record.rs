use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::identity::Identity;

/// The materialized record object bound to one reference.
///
/// A record carries no data of its own: reads and writes go through the
/// store by identity, so the record always observes its reference's
/// current state. Hosts can hang their own model object off `extension`.
pub struct Record {
    identity: Identity,
    extension: Option<Box<dyn Any + Send + Sync>>,
    released: AtomicBool,
}

impl Record {
    pub fn new(identity: Identity) -> Self {
        Record {
            identity,
            extension: None,
            released: AtomicBool::new(false),
        }
    }

    /// Attaches a host-side object to the record.
    pub fn with_extension<T: Any + Send + Sync>(mut self, extension: T) -> Self {
        self.extension = Some(Box::new(extension));
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn extension<T: Any>(&self) -> Option<&T> {
        self.extension.as_ref().and_then(|ext| ext.downcast_ref::<T>())
    }

    /// True once the owning reference has been unloaded or destroyed.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub(crate) fn release(&self) {
        self.released.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("identity", &self.identity)
            .field("extension", &self.extension.is_some())
            .field("released", &self.is_released())
            .finish()
    }
}

/// Builds record objects on first access.
pub trait RecordFactory: Send + Sync {
    fn create(&self, identity: &Identity) -> Record;
}

/// Factory producing bare records.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFactory;

impl RecordFactory for DefaultFactory {
    fn create(&self, identity: &Identity) -> Record {
        Record::new(identity.clone())
    }
}

impl<F> RecordFactory for F
where
    F: Fn(&Identity) -> Record + Send + Sync,
{
    fn create(&self, identity: &Identity) -> Record {
        self(identity)
    }
}
