use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The `(model, id)` pair that uniquely identifies a record in the identity map.
///
/// Serialized as `{"type": "...", "id": "..."}`, the same shape accepted as a
/// type-tagged reference in preload and push payloads.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "type")]
    model: String,
    id: String,
}

impl Identity {
    /// Creates an identity from a model name and a record id.
    pub fn new(model: impl Into<String>, id: impl Into<String>) -> Self {
        Identity {
            model: model.into(),
            id: id.into(),
        }
    }

    /// Builds an identity from a JSON id, accepting strings and numbers.
    ///
    /// Numeric ids are normalized to their decimal string form so that
    /// `1` and `"1"` address the same record.
    pub fn from_value(model: impl Into<String>, id: &Value) -> Option<Self> {
        let id = match id {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(Identity::new(model, id))
    }

    /// Returns the model (type) name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the record id.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model, self.id)
    }
}
