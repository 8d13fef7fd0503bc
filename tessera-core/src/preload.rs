//! Caller-supplied hints applied before a record is fetched.
//!
//! Preloaded data is treated as trusted: attributes go straight into
//! canonical data and relationships take the canonical pathway, so local
//! edits are never touched.

use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::identity::Identity;
use crate::record::Record;
use crate::schema::{PropertyMeta, RelationshipKind, RelationshipMeta, SchemaRegistry};
use crate::store::{check_member, entry, type_schema, Store};

/// One preloaded value.
#[derive(Debug, Clone)]
pub enum PreloadValue {
    /// A plain value: an attribute, a bare id, a `{"type", "id"}` object or,
    /// for has-many relationships, an array of those.
    Value(Value),
    /// An already materialized record.
    Record(Arc<Record>),
    Many(Vec<PreloadValue>),
}

impl PreloadValue {
    /// The plain JSON form, if the value holds no record objects.
    fn into_json(self) -> Option<Value> {
        match self {
            PreloadValue::Value(value) => Some(value),
            PreloadValue::Record(_) => None,
            PreloadValue::Many(items) => items
                .into_iter()
                .map(PreloadValue::into_json)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }
}

impl From<Value> for PreloadValue {
    fn from(value: Value) -> Self {
        PreloadValue::Value(value)
    }
}

impl From<Arc<Record>> for PreloadValue {
    fn from(record: Arc<Record>) -> Self {
        PreloadValue::Record(record)
    }
}

impl From<&Identity> for PreloadValue {
    fn from(identity: &Identity) -> Self {
        PreloadValue::Value(serde_json::json!({
            "type": identity.model(),
            "id": identity.id(),
        }))
    }
}

impl<T: Into<PreloadValue>> From<Vec<T>> for PreloadValue {
    fn from(items: Vec<T>) -> Self {
        PreloadValue::Many(items.into_iter().map(Into::into).collect())
    }
}

/// A preload entry after validation.
enum Resolved {
    Attribute(String, Value),
    One(String, Option<Identity>),
    Many(String, Vec<Identity>),
}

impl Store {
    /// Applies preloaded data to `identity`.
    ///
    /// Every key is resolved before anything is written, so a rejected
    /// preload leaves the record as it was.
    pub fn preload_data(
        &mut self,
        identity: &Identity,
        preload: IndexMap<String, PreloadValue>,
    ) -> Result<()> {
        let schema = type_schema(&self.schema, identity.model())?;

        let mut resolved = Vec::with_capacity(preload.len());
        for (key, value) in preload {
            let item = match schema.meta_for_property(&key) {
                PropertyMeta::Attribute => match value.into_json() {
                    Some(value) => Resolved::Attribute(key, value),
                    None => {
                        return Err(StoreError::InvalidPreload {
                            model: identity.model().to_string(),
                            key,
                            reason: "a record is not an attribute value".to_string(),
                        });
                    }
                },
                PropertyMeta::Relationship(meta) => {
                    resolve_relationship(&self.schema, identity, key, meta, value)?
                }
            };
            resolved.push(item);
        }

        self.ensure(identity)?;
        for item in resolved {
            match item {
                Resolved::Attribute(key, value) => {
                    entry(&mut self.references, identity)?.write_canonical(key, value);
                }
                Resolved::One(key, member) => {
                    if let Some(member) = &member {
                        self.ensure(member)?;
                    }
                    self.with_relationship(identity, &key, |relationship, links| {
                        relationship.set_canonical(member, links)
                    })?;
                }
                Resolved::Many(key, members) => {
                    for member in &members {
                        self.ensure(member)?;
                    }
                    self.with_relationship(identity, &key, |relationship, links| {
                        relationship.set_canonical(members, links)
                    })?;
                }
            }
        }

        log::debug!("preloaded {identity}");
        entry(&mut self.references, identity)?.update_record_arrays_later(&mut self.scheduler);
        Ok(())
    }
}

fn resolve_relationship(
    schema: &SchemaRegistry,
    owner: &Identity,
    key: String,
    meta: &RelationshipMeta,
    value: PreloadValue,
) -> Result<Resolved> {
    match meta.kind {
        RelationshipKind::HasMany => {
            let items = match value {
                PreloadValue::Value(Value::Array(items)) => {
                    items.into_iter().map(PreloadValue::Value).collect()
                }
                PreloadValue::Many(items) => items,
                _ => {
                    return Err(StoreError::NotASequence {
                        model: owner.model().to_string(),
                        key,
                    });
                }
            };
            let members = items
                .into_iter()
                .map(|item| resolve_member(schema, owner, &key, meta, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(Resolved::Many(key, members))
        }
        RelationshipKind::BelongsTo => match value {
            PreloadValue::Value(Value::Null) => Ok(Resolved::One(key, None)),
            PreloadValue::Many(_) | PreloadValue::Value(Value::Array(_)) => {
                Err(StoreError::InvalidPreload {
                    model: owner.model().to_string(),
                    key,
                    reason: "a belongs-to relationship takes a single record".to_string(),
                })
            }
            value => {
                let member = resolve_member(schema, owner, &key, meta, value)?;
                Ok(Resolved::One(key, Some(member)))
            }
        },
    }
}

/// Turns one preloaded relationship value into an identity.
fn resolve_member(
    schema: &SchemaRegistry,
    owner: &Identity,
    key: &str,
    meta: &RelationshipMeta,
    value: PreloadValue,
) -> Result<Identity> {
    let invalid = |reason: String| StoreError::InvalidPreload {
        model: owner.model().to_string(),
        key: key.to_string(),
        reason,
    };

    let member = match value {
        PreloadValue::Record(record) => record.identity().clone(),
        PreloadValue::Value(Value::Object(tagged)) => {
            let model = tagged.get("type").and_then(Value::as_str);
            let id = tagged.get("id");
            match (model, id) {
                (Some(model), Some(id)) => Identity::from_value(model, id)
                    .ok_or_else(|| invalid(format!("`{id}` is not a record id")))?,
                _ => return Err(invalid("expected an object with `type` and `id`".to_string())),
            }
        }
        PreloadValue::Value(id) => {
            if meta.polymorphic {
                return Err(StoreError::UntaggedPolymorphic {
                    model: owner.model().to_string(),
                    key: key.to_string(),
                });
            }
            Identity::from_value(meta.target.as_str(), &id)
                .ok_or_else(|| invalid(format!("`{id}` is not a record id")))?
        }
        PreloadValue::Many(_) => return Err(invalid("nested sequence".to_string())),
    };

    check_member(schema, owner, key, meta, &member)?;
    Ok(member)
}
