use std::collections::HashMap;

use crate::identity::Identity;
use crate::reference::RecordReference;
use crate::relationship::{InverseLinks, Relationship, Side};
use crate::schema::SchemaRegistry;

/// Inverse bookkeeping over the identity map.
///
/// The relationship driving an operation must be taken out of its reference
/// first, so the graph never aliases it.
pub(crate) struct Graph<'a> {
    references: &'a mut HashMap<Identity, RecordReference>,
    schema: &'a SchemaRegistry,
}

impl<'a> Graph<'a> {
    pub(crate) fn new(
        references: &'a mut HashMap<Identity, RecordReference>,
        schema: &'a SchemaRegistry,
    ) -> Self {
        Graph { references, schema }
    }
}

impl InverseLinks for Graph<'_> {
    fn link(&mut self, member: &Identity, inverse_key: &str, owner: &Identity, side: Side) {
        let Some(reference) = self.references.get_mut(member) else {
            log::warn!("cannot link {owner} into unknown {member}.{inverse_key}");
            return;
        };

        if reference.relationship(inverse_key).is_none() {
            let Some(implicit) = self.schema.implicit_inverse(member.model(), inverse_key) else {
                log::warn!("{member} has no relationship `{inverse_key}`");
                return;
            };
            log::trace!("creating implicit {member}.{inverse_key}");
            reference.implicit_entry(Relationship::implicit(
                member.clone(),
                implicit.name.clone(),
                implicit.owner_key.clone(),
            ));
        }

        let Some(relationship) = reference.relationship_mut(inverse_key) else {
            return;
        };
        let displaced = relationship.insert(owner.clone(), side);
        let back_key = relationship.inverse_key().to_string();
        let connected = relationship.is_connected();

        // One-to-one: the displaced owner no longer points at `member`.
        if let Some(displaced) = displaced.filter(|_| connected) {
            self.unlink(&displaced, &back_key, member, side);
        }
    }

    fn unlink(
        &mut self,
        member: &Identity,
        inverse_key: &str,
        owner: &Identity,
        side: Side,
    ) -> bool {
        self.references
            .get_mut(member)
            .and_then(|reference| reference.relationship_mut(inverse_key))
            .is_some_and(|relationship| relationship.remove(owner, side))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RelationshipKind, RelationshipMeta, TypeSchema};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::build([
            TypeSchema::new("user")
                .relationship("profile", RelationshipMeta::belongs_to("profile").inverse("user")),
            TypeSchema::new("profile")
                .relationship("user", RelationshipMeta::belongs_to("user").inverse("profile")),
            TypeSchema::new("post").has_many("tags", "tag"),
            TypeSchema::new("tag"),
        ])
        .unwrap()
    }

    fn insert(
        references: &mut HashMap<Identity, RecordReference>,
        identity: Identity,
        relationships: Vec<Relationship>,
    ) {
        let client_id = references.len() as u64;
        let reference = RecordReference::new(identity.clone(), client_id, relationships);
        references.insert(identity, reference);
    }

    #[test]
    fn link_creates_implicit_relationship() {
        let schema = registry();
        let mut references = HashMap::new();
        let tag = Identity::new("tag", "t");
        let post = Identity::new("post", "1");
        insert(&mut references, tag.clone(), vec![]);

        let mut graph = Graph::new(&mut references, &schema);
        graph.link(&tag, "~post:tags", &post, Side::Current);

        let implicit = references[&tag].relationship("~post:tags").unwrap();
        assert!(implicit.is_implicit());
        assert_eq!(implicit.inverse_key(), "tags");
        assert!(implicit.contains(&post));
    }

    #[test]
    fn link_into_one_to_one_displaces_previous_owner() {
        let schema = registry();
        let mut references = HashMap::new();
        let alice = Identity::new("user", "alice");
        let bob = Identity::new("user", "bob");
        let profile = Identity::new("profile", "p");

        let profile_of = |owner: &Identity| {
            vec![Relationship::new(owner.clone(), "profile", RelationshipKind::BelongsTo, "user")]
        };
        insert(&mut references, alice.clone(), profile_of(&alice));
        insert(&mut references, bob.clone(), profile_of(&bob));
        insert(
            &mut references,
            profile.clone(),
            vec![Relationship::new(
                profile.clone(),
                "user",
                RelationshipKind::BelongsTo,
                "profile",
            )],
        );

        let mut graph = Graph::new(&mut references, &schema);
        // alice.profile = p, mirrored on p.user
        references_link(&mut graph, &alice, &profile);
        references_link(&mut graph, &bob, &profile);

        assert_eq!(references[&profile].relationship("user").unwrap().value(), Some(&bob));
        assert_eq!(references[&alice].relationship("profile").unwrap().value(), None);
    }

    fn references_link(graph: &mut Graph<'_>, owner: &Identity, profile: &Identity) {
        let owner_rel = graph
            .references
            .get_mut(owner)
            .and_then(|r| r.relationship_mut("profile"))
            .unwrap();
        owner_rel.insert(profile.clone(), Side::Current);
        graph.link(profile, "user", owner, Side::Current);
    }

    #[test]
    fn unknown_member_is_skipped() {
        let schema = registry();
        let mut references = HashMap::new();
        let mut graph = Graph::new(&mut references, &schema);

        let (tag, post) = (Identity::new("tag", "x"), Identity::new("post", "1"));
        graph.link(&tag, "~post:tags", &post, Side::Current);
        assert!(!graph.unlink(&tag, "~post:tags", &post, Side::Current));
    }
}
