use thiserror::Error;

use crate::config::ConfigError;
use crate::identity::Identity;
use crate::relationship::RelationshipError;
use crate::schema::{RelationshipKind, SchemaError};
use crate::state::InvalidTransition;

/// Contract violations reported synchronously by the store.
///
/// Remote rejections and transport failures are not errors of this type:
/// they are recorded on the reference and reported through
/// [`SaveOutcome`](crate::SaveOutcome) / [`FetchOutcome`](crate::FetchOutcome).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown model `{0}`")]
    UnknownModel(String),

    #[error("record {0} not found")]
    NotFound(Identity),

    #[error("`{model}` has no relationship `{key}`")]
    UnknownRelationship { model: String, key: String },

    #[error("`{model}.{key}` is a relationship, not an attribute")]
    NotAnAttribute { model: String, key: String },

    #[error("`{model}` declares no property `{key}`")]
    UnknownProperty { model: String, key: String },

    #[error("`{model}.{key}` expects `{expected}`, got {found}")]
    TypeMismatch {
        model: String,
        key: String,
        expected: String,
        found: Identity,
    },

    #[error("{member} cannot join `{model}.{key}`: no relationship `{inverse}` on its model")]
    MissingInverse {
        model: String,
        key: String,
        member: Identity,
        inverse: String,
    },

    #[error("`{model}.{key}` is not a {expected:?} relationship")]
    WrongCardinality {
        model: String,
        key: String,
        expected: RelationshipKind,
    },

    #[error("`{model}.{key}` is a has-many relationship and needs a sequence")]
    NotASequence { model: String, key: String },

    #[error("`{model}.{key}` is polymorphic; members need an explicit type")]
    UntaggedPolymorphic { model: String, key: String },

    #[error("invalid preload for `{model}.{key}`: {reason}")]
    InvalidPreload {
        model: String,
        key: String,
        reason: String,
    },

    #[error("record {0} already holds data")]
    AlreadyLoaded(Identity),

    #[error("record {0} has a save in flight")]
    RecordInFlight(Identity),

    #[error("{identity}: {source}")]
    InvalidTransition {
        identity: Identity,
        #[source]
        source: InvalidTransition,
    },

    #[error("teardown of {identity} failed for {} relationship(s)", .failures.len())]
    Teardown {
        identity: Identity,
        failures: Vec<RelationshipError>,
    },

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl StoreError {
    pub(crate) fn transition(identity: &Identity, source: InvalidTransition) -> Self {
        StoreError::InvalidTransition {
            identity: identity.clone(),
            source,
        }
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
