use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

use crate::error::Result;
use crate::identity::Identity;
use crate::merge::Attributes;
use crate::store::Store;
use crate::validation::FieldErrors;

/// Snapshot handed to the adapter when a save begins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveRequest {
    pub identity: Identity,
    /// The in-flight attributes.
    pub attributes: Attributes,
    /// True when the record was created locally and never committed.
    pub is_new: bool,
}

/// Relationship data carried by a payload.
///
/// Decodes from `null`, `{"type": .., "id": ..}` or a list of those.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    Many(Vec<Identity>),
    One(Option<Identity>),
}

/// A record as delivered by the remote source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPayload {
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub relationships: IndexMap<String, RelationshipData>,
}

impl RecordPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn belongs_to(mut self, key: impl Into<String>, member: Option<Identity>) -> Self {
        self.relationships.insert(key.into(), RelationshipData::One(member));
        self
    }

    pub fn has_many(
        mut self,
        key: impl Into<String>,
        members: impl IntoIterator<Item = Identity>,
    ) -> Self {
        self.relationships
            .insert(key.into(), RelationshipData::Many(members.into_iter().collect()));
        self
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    /// The remote source rejected the record with per-field errors.
    #[error("record rejected with {} invalid field(s)", .0.len())]
    Invalid(FieldErrors),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Remote data source for records.
///
/// The store never calls an adapter on its own: hosts drive it through
/// [`Store::save_record`] and [`Store::fetch_record`].
pub trait Adapter: Send + Sync {
    fn find_record(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<RecordPayload, AdapterError>> + Send;

    /// Persists the request. `Ok(Some(data))` carries attributes the remote
    /// source wants merged back; `Ok(None)` trusts the local state.
    fn save_record(
        &self,
        request: &SaveRequest,
    ) -> impl Future<Output = Result<Option<Attributes>, AdapterError>> + Send;

    /// Batch find - default impl calls find_record() in sequence.
    fn find_records(
        &self,
        identities: &[Identity],
    ) -> impl Future<Output = Vec<Result<RecordPayload, AdapterError>>> + Send {
        let identities = identities.to_vec();
        async move {
            let mut results = Vec::with_capacity(identities.len());
            for identity in &identities {
                results.push(self.find_record(identity).await);
            }
            results
        }
    }
}

/// How a save resolved. Remote failures are outcomes, not errors: the record
/// stays usable and keeps the unsaved values.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Committed,
    Invalid(FieldErrors),
    Errored(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Loaded,
    Errored(String),
}

impl Store {
    /// Saves one record through `adapter`.
    ///
    /// The in-flight snapshot is taken before the first await, so edits made
    /// by other tasks afterwards stay dirty and are not part of this save.
    pub async fn save_record<A: Adapter>(
        &mut self,
        identity: &Identity,
        adapter: &A,
    ) -> Result<SaveOutcome> {
        let request = self.begin_save(identity)?;

        match adapter.save_record(&request).await {
            Ok(data) => {
                self.adapter_did_commit(identity, data)?;
                Ok(SaveOutcome::Committed)
            }
            Err(AdapterError::Invalid(errors)) => {
                self.adapter_did_invalidate(identity, errors.clone())?;
                Ok(SaveOutcome::Invalid(errors))
            }
            Err(AdapterError::Transport(message)) => {
                log::warn!("save of {identity} failed: {message}");
                self.adapter_did_error(identity)?;
                Ok(SaveOutcome::Errored(message))
            }
        }
    }

    /// Loads one record through `adapter` and pushes the result.
    pub async fn fetch_record<A: Adapter>(
        &mut self,
        identity: &Identity,
        adapter: &A,
    ) -> Result<FetchOutcome> {
        self.lookup_or_create(identity)?;

        match adapter.find_record(identity).await {
            Ok(payload) => {
                self.push(identity, payload)?;
                Ok(FetchOutcome::Loaded)
            }
            Err(err) => {
                log::warn!("fetch of {identity} failed: {err}");
                self.fetch_did_error(identity);
                Ok(FetchOutcome::Errored(err.to_string()))
            }
        }
    }

    /// Loads several records, one outcome per identity in input order.
    pub async fn fetch_records<A: Adapter>(
        &mut self,
        identities: &[Identity],
        adapter: &A,
    ) -> Result<Vec<FetchOutcome>> {
        for identity in identities {
            self.lookup_or_create(identity)?;
        }

        let results = adapter.find_records(identities).await;
        let mut outcomes = Vec::with_capacity(results.len());
        for (identity, result) in identities.iter().zip(results) {
            match result {
                Ok(payload) => {
                    self.push(identity, payload)?;
                    outcomes.push(FetchOutcome::Loaded);
                }
                Err(err) => {
                    log::warn!("fetch of {identity} failed: {err}");
                    self.fetch_did_error(identity);
                    outcomes.push(FetchOutcome::Errored(err.to_string()));
                }
            }
        }
        Ok(outcomes)
    }
}
