//! Tessera is a client-side record cache with relationship consistency.
//!
//! Core concepts:
//! - **Identity**: the `(model, id)` pair naming a record
//! - **RecordReference**: the single identity-map entry per record, holding
//!   canonical, in-flight and dirty attributes plus relationship state
//! - **Relationship**: membership of one relationship, kept in step with its
//!   inverse on the other records
//! - **Store**: owns the identity map and drives saves, pushes and teardown
//!
//! # Example
//!
//! ```
//! use tessera_core::{
//!     Identity, RecordPayload, RelationshipMeta, SchemaRegistry, Store, TypeSchema,
//! };
//!
//! let schema = SchemaRegistry::builder()
//!     .register(
//!         TypeSchema::new("user")
//!             .attribute("name")
//!             .relationship("posts", RelationshipMeta::has_many("post").inverse("author")),
//!     )
//!     .register(
//!         TypeSchema::new("post")
//!             .attribute("title")
//!             .relationship("author", RelationshipMeta::belongs_to("user").inverse("posts")),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let mut store = Store::new(schema);
//! let post = Identity::new("post", "1");
//! let user = Identity::new("user", "7");
//!
//! store
//!     .push(
//!         &post,
//!         RecordPayload::new()
//!             .attribute("title", "hello")
//!             .belongs_to("author", Some(user.clone())),
//!     )
//!     .unwrap();
//!
//! // The inverse side was filled in.
//! assert_eq!(store.has_many(&user, "posts").unwrap(), [&post]);
//!
//! // Local edits shadow canonical data until saved.
//! store.set(&post, "title", "edited").unwrap();
//! assert_eq!(store.attribute(&post, "title"), Some(&serde_json::json!("edited")));
//! assert!(store.reference(&post).unwrap().is_dirty());
//! ```

mod adapter;
mod config;
mod error;
mod graph;
mod identity;
mod lifecycle;
mod merge;
mod observer;
mod preload;
mod record;
mod reference;
mod relationship;
mod scheduler;
mod schema;
mod state;
mod store;
mod validation;

pub use adapter::{
    Adapter, AdapterError, FetchOutcome, RecordPayload, RelationshipData, SaveOutcome, SaveRequest,
};
pub use config::{ConfigError, PendingEditPolicy, StoreConfig};
pub use error::{Result, StoreError};
pub use identity::Identity;
pub use merge::{Attributes, attributes_from_value, merge_and_diff, merge_value_and_diff};
pub use observer::{LifecycleEvent, NoopObserver, StoreObserver};
pub use preload::PreloadValue;
pub use record::{DefaultFactory, Record, RecordFactory};
pub use reference::RecordReference;
pub use relationship::{
    InverseLinks, Relationship, RelationshipError, RelationshipLifecycle, Side, teardown,
};
pub use scheduler::{Scheduler, Task};
pub use schema::{
    IMPLICIT_PREFIX, ImplicitInverse, Model, PropertyMeta, RelationshipKind, RelationshipMeta,
    SchemaError, SchemaRegistry, SchemaRegistryBuilder, TypeSchema, implicit_name,
};
pub use state::{InvalidTransition, SaveEvent, SaveState};
pub use store::Store;
pub use validation::FieldErrors;

#[cfg(feature = "derive")]
pub use tessera_derive::Model;
