use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Prefix reserved for synthesized implicit relationship names.
///
/// Declared property names may not start with it, so an implicit name can
/// never shadow a declared one.
pub const IMPLICIT_PREFIX: char = '~';

/// Error raised while building a [`SchemaRegistry`].
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("model `{0}` registered twice")]
    DuplicateModel(String),
    #[error("model name must not be empty")]
    EmptyModelName,
    #[error("property `{key}` declared twice on `{model}`")]
    DuplicateProperty { model: String, key: String },
    #[error("property `{key}` on `{model}` uses the reserved `~` prefix")]
    ReservedName { model: String, key: String },
    #[error("relationship `{model}.{key}` targets unknown model `{target}`")]
    UnknownTarget {
        model: String,
        key: String,
        target: String,
    },
    #[error("relationship `{model}.{key}` names missing inverse `{target}.{inverse}`")]
    MissingInverse {
        model: String,
        key: String,
        target: String,
        inverse: String,
    },
    #[error("inverse `{target}.{inverse}` does not point back at `{model}.{key}`")]
    InverseMismatch {
        model: String,
        key: String,
        target: String,
        inverse: String,
    },
}

/// Cardinality of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    BelongsTo,
    HasMany,
}

/// Declared metadata for one relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipMeta {
    pub kind: RelationshipKind,
    /// Target model. For polymorphic relationships this is the base type name
    /// and members may be of any registered model.
    pub target: String,
    pub inverse: Option<String>,
    #[serde(default)]
    pub polymorphic: bool,
}

impl RelationshipMeta {
    pub fn belongs_to(target: impl Into<String>) -> Self {
        RelationshipMeta {
            kind: RelationshipKind::BelongsTo,
            target: target.into(),
            inverse: None,
            polymorphic: false,
        }
    }

    pub fn has_many(target: impl Into<String>) -> Self {
        RelationshipMeta {
            kind: RelationshipKind::HasMany,
            target: target.into(),
            inverse: None,
            polymorphic: false,
        }
    }

    /// Declares the inverse relationship on the target model.
    pub fn inverse(mut self, key: impl Into<String>) -> Self {
        self.inverse = Some(key.into());
        self
    }

    pub fn polymorphic(mut self) -> Self {
        self.polymorphic = true;
        self
    }
}

/// What `meta_for_property` knows about a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyMeta<'a> {
    Attribute,
    Relationship(&'a RelationshipMeta),
}

impl<'a> PropertyMeta<'a> {
    pub fn is_relationship(&self) -> bool {
        matches!(self, PropertyMeta::Relationship(_))
    }

    pub fn relationship(&self) -> Option<&'a RelationshipMeta> {
        match self {
            PropertyMeta::Attribute => None,
            PropertyMeta::Relationship(meta) => Some(meta),
        }
    }
}

/// Schema of a single model: its attributes and declared relationships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSchema {
    name: String,
    attributes: IndexSet<String>,
    relationships: IndexMap<String, RelationshipMeta>,
    duplicate: Option<String>,
}

impl TypeSchema {
    pub fn new(name: impl Into<String>) -> Self {
        TypeSchema {
            name: name.into(),
            attributes: IndexSet::new(),
            relationships: IndexMap::new(),
            duplicate: None,
        }
    }

    pub fn attribute(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if self.relationships.contains_key(&key) || !self.attributes.insert(key.clone()) {
            self.duplicate.get_or_insert(key);
        }
        self
    }

    pub fn relationship(mut self, key: impl Into<String>, meta: RelationshipMeta) -> Self {
        let key = key.into();
        if self.attributes.contains(&key) || self.relationships.contains_key(&key) {
            self.duplicate.get_or_insert(key.clone());
        }
        self.relationships.insert(key, meta);
        self
    }

    pub fn belongs_to(self, key: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationship(key, RelationshipMeta::belongs_to(target))
    }

    pub fn has_many(self, key: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationship(key, RelationshipMeta::has_many(target))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(String::as_str)
    }

    pub fn relationships(&self) -> impl Iterator<Item = (&str, &RelationshipMeta)> {
        self.relationships.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_attribute(&self, key: &str) -> bool {
        self.attributes.contains(key)
    }

    /// Returns relationship metadata for `key`, or `Attribute` for anything
    /// that is not a declared relationship.
    pub fn meta_for_property(&self, key: &str) -> PropertyMeta<'_> {
        match self.relationships.get(key) {
            Some(meta) => PropertyMeta::Relationship(meta),
            None => PropertyMeta::Attribute,
        }
    }
}

/// Implemented by types that describe a model schema, usually via
/// `#[derive(Model)]`.
pub trait Model {
    fn schema() -> TypeSchema;
}

/// An inverse-less association pointing at some model.
///
/// Records of the target model get an implicit relationship named `name`
/// whose members are the owners of `owner_model.owner_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplicitInverse {
    pub name: String,
    pub owner_model: String,
    pub owner_key: String,
}

/// Synthesized name of the implicit inverse of `model.key`.
pub fn implicit_name(model: &str, key: &str) -> String {
    format!("{IMPLICIT_PREFIX}{model}:{key}")
}

/// All model schemas plus the implicit inverse registry derived from them.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    models: IndexMap<String, TypeSchema>,
    implicit: HashMap<String, Vec<ImplicitInverse>>,
    implicit_any: Vec<ImplicitInverse>,
}

/// Collects schemas before validating them as a whole.
#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    schemas: Vec<TypeSchema>,
}

impl SchemaRegistryBuilder {
    pub fn register(mut self, schema: TypeSchema) -> Self {
        self.schemas.push(schema);
        self
    }

    pub fn model<M: Model>(self) -> Self {
        self.register(M::schema())
    }

    pub fn build(self) -> Result<SchemaRegistry, SchemaError> {
        SchemaRegistry::build(self.schemas)
    }
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    /// Validates the schemas and builds the implicit inverse registry.
    pub fn build(schemas: impl IntoIterator<Item = TypeSchema>) -> Result<Self, SchemaError> {
        let mut models = IndexMap::new();
        for schema in schemas {
            if schema.name.is_empty() {
                return Err(SchemaError::EmptyModelName);
            }
            if let Some(key) = &schema.duplicate {
                return Err(SchemaError::DuplicateProperty {
                    model: schema.name.clone(),
                    key: key.clone(),
                });
            }
            let reserved = schema
                .attributes
                .iter()
                .chain(schema.relationships.keys())
                .find(|key| key.starts_with(IMPLICIT_PREFIX));
            if let Some(key) = reserved {
                return Err(SchemaError::ReservedName {
                    model: schema.name.clone(),
                    key: key.clone(),
                });
            }
            if models.contains_key(&schema.name) {
                return Err(SchemaError::DuplicateModel(schema.name));
            }
            models.insert(schema.name.clone(), schema);
        }

        let mut implicit: HashMap<String, Vec<ImplicitInverse>> = HashMap::new();
        let mut implicit_any = Vec::new();

        for (model, schema) in &models {
            for (key, meta) in &schema.relationships {
                if !meta.polymorphic && !models.contains_key(&meta.target) {
                    return Err(SchemaError::UnknownTarget {
                        model: model.clone(),
                        key: key.clone(),
                        target: meta.target.clone(),
                    });
                }

                match &meta.inverse {
                    Some(inverse) => {
                        // Polymorphic inverses are resolved per member type.
                        if meta.polymorphic {
                            continue;
                        }
                        check_inverse(&models, model, key, meta, inverse)?;
                    }
                    None => {
                        let entry = ImplicitInverse {
                            name: implicit_name(model, key),
                            owner_model: model.clone(),
                            owner_key: key.clone(),
                        };
                        if meta.polymorphic {
                            implicit_any.push(entry);
                        } else {
                            implicit.entry(meta.target.clone()).or_default().push(entry);
                        }
                    }
                }
            }
        }

        log::debug!(
            "schema registry built: {} models, {} implicit inverses",
            models.len(),
            implicit.values().map(Vec::len).sum::<usize>() + implicit_any.len()
        );

        Ok(SchemaRegistry {
            models,
            implicit,
            implicit_any,
        })
    }

    pub fn get(&self, model: &str) -> Option<&TypeSchema> {
        self.models.get(model)
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    pub fn models(&self) -> impl Iterator<Item = &TypeSchema> {
        self.models.values()
    }

    /// Metadata for `model.key`; `None` only when the model is unknown.
    pub fn meta_for_property(&self, model: &str, key: &str) -> Option<PropertyMeta<'_>> {
        self.models.get(model).map(|schema| schema.meta_for_property(key))
    }

    /// The key that members of `model.key` use to point back at the owner:
    /// the declared inverse, or the synthesized implicit name.
    pub fn inverse_key(&self, model: &str, key: &str) -> Option<String> {
        let meta = self.models.get(model)?.relationships.get(key)?;
        Some(match &meta.inverse {
            Some(inverse) => inverse.clone(),
            None => implicit_name(model, key),
        })
    }

    /// Implicit inverses that records of `model` may carry.
    pub fn implicit_inverses<'a>(
        &'a self,
        model: &str,
    ) -> impl Iterator<Item = &'a ImplicitInverse> {
        self.implicit
            .get(model)
            .into_iter()
            .flatten()
            .chain(self.implicit_any.iter())
    }

    /// Looks up the implicit inverse named `name` on `model`.
    pub fn implicit_inverse(&self, model: &str, name: &str) -> Option<&ImplicitInverse> {
        self.implicit_inverses(model).find(|inverse| inverse.name == name)
    }
}

fn check_inverse(
    models: &IndexMap<String, TypeSchema>,
    model: &str,
    key: &str,
    meta: &RelationshipMeta,
    inverse: &str,
) -> Result<(), SchemaError> {
    let Some(counterpart) = models
        .get(&meta.target)
        .and_then(|target| target.relationships.get(inverse))
    else {
        return Err(SchemaError::MissingInverse {
            model: model.to_string(),
            key: key.to_string(),
            target: meta.target.clone(),
            inverse: inverse.to_string(),
        });
    };

    let points_back = counterpart.polymorphic || counterpart.target == model;
    let names_back = counterpart
        .inverse
        .as_deref()
        .is_none_or(|back| back == key);
    if !points_back || !names_back {
        return Err(SchemaError::InverseMismatch {
            model: model.to_string(),
            key: key.to_string(),
            target: meta.target.clone(),
            inverse: inverse.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blog() -> Vec<TypeSchema> {
        vec![
            TypeSchema::new("user")
                .attribute("name")
                .relationship("posts", RelationshipMeta::has_many("post").inverse("author")),
            TypeSchema::new("post")
                .attribute("title")
                .relationship("author", RelationshipMeta::belongs_to("user").inverse("posts"))
                .has_many("tags", "tag"),
            TypeSchema::new("tag").attribute("label"),
        ]
    }

    #[test]
    fn meta_for_property_distinguishes_relationships() {
        let registry = SchemaRegistry::build(blog()).unwrap();

        let title = registry.meta_for_property("post", "title").unwrap();
        assert!(!title.is_relationship());

        let author = registry.meta_for_property("post", "author").unwrap();
        let meta = author.relationship().unwrap();
        assert_eq!(meta.kind, RelationshipKind::BelongsTo);
        assert_eq!(meta.target, "user");

        assert!(registry.meta_for_property("missing", "x").is_none());
    }

    #[test]
    fn undeclared_keys_are_attributes() {
        let registry = SchemaRegistry::build(blog()).unwrap();
        let meta = registry.meta_for_property("post", "subtitle").unwrap();
        assert_eq!(meta, PropertyMeta::Attribute);
    }

    #[test]
    fn implicit_inverse_synthesized_for_inverse_less_relationship() {
        let registry = SchemaRegistry::build(blog()).unwrap();

        let inverses: Vec<_> = registry.implicit_inverses("tag").collect();
        assert_eq!(inverses.len(), 1);
        assert_eq!(inverses[0].name, "~post:tags");
        assert_eq!(inverses[0].owner_model, "post");
        assert_eq!(inverses[0].owner_key, "tags");

        assert_eq!(registry.implicit_inverses("user").count(), 0);
        assert_eq!(registry.inverse_key("post", "tags").unwrap(), "~post:tags");
        assert_eq!(registry.inverse_key("post", "author").unwrap(), "posts");
    }

    #[test]
    fn polymorphic_implicit_inverse_applies_to_every_model() {
        let registry = SchemaRegistry::build([
            TypeSchema::new("comment")
                .relationship("subject", RelationshipMeta::belongs_to("commentable").polymorphic()),
            TypeSchema::new("post"),
            TypeSchema::new("photo"),
        ])
        .unwrap();

        assert!(registry.implicit_inverse("post", "~comment:subject").is_some());
        assert!(registry.implicit_inverse("photo", "~comment:subject").is_some());
    }

    #[test]
    fn rejects_unknown_target() {
        let err = SchemaRegistry::build([TypeSchema::new("post").belongs_to("author", "user")])
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownTarget { .. }));
    }

    #[test]
    fn rejects_missing_inverse() {
        let err = SchemaRegistry::build([
            TypeSchema::new("user"),
            TypeSchema::new("post")
                .relationship("author", RelationshipMeta::belongs_to("user").inverse("posts")),
        ])
        .unwrap_err();
        assert!(matches!(err, SchemaError::MissingInverse { .. }));
    }

    #[test]
    fn rejects_inverse_pointing_elsewhere() {
        let err = SchemaRegistry::build([
            TypeSchema::new("user")
                .relationship("posts", RelationshipMeta::has_many("post").inverse("editor")),
            TypeSchema::new("post")
                .relationship("author", RelationshipMeta::belongs_to("user").inverse("posts"))
                .relationship("editor", RelationshipMeta::belongs_to("user").inverse("posts")),
        ])
        .unwrap_err();
        assert!(matches!(err, SchemaError::InverseMismatch { .. }));
    }

    #[test]
    fn rejects_reserved_and_duplicate_names() {
        let reserved = SchemaRegistry::build([TypeSchema::new("post").attribute("~secret")]);
        assert!(matches!(reserved, Err(SchemaError::ReservedName { .. })));

        let duplicate = SchemaRegistry::build([TypeSchema::new("post")
            .attribute("title")
            .has_many("title", "post")]);
        assert!(matches!(duplicate, Err(SchemaError::DuplicateProperty { .. })));

        let twice = SchemaRegistry::build([TypeSchema::new("post"), TypeSchema::new("post")]);
        assert!(matches!(twice, Err(SchemaError::DuplicateModel(_))));
    }
}
