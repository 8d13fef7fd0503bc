//! Relationship state and the clear / disconnect / reconnect protocol.
//!
//! Every relationship keeps two memberships: `canonical`, as last confirmed by
//! the remote source, and `current`, which includes local edits. Each member
//! is mirrored on the member's side under `inverse_key` (a declared inverse or
//! a synthesized implicit name). Relationships never reach into other
//! references directly; inverse bookkeeping goes through [`InverseLinks`].

use indexmap::IndexSet;

use crate::identity::Identity;
use crate::schema::RelationshipKind;

/// Which membership an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Canonical,
    Current,
}

/// Error raised while tearing a relationship down.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelationshipError {
    #[error("relationship `{owner}.{key}` was already destroyed")]
    AlreadyDestroyed { owner: Identity, key: String },
    #[error("relationship `{owner}.{key}` destroyed with {members} member(s) left")]
    NotCleared {
        owner: Identity,
        key: String,
        members: usize,
    },
}

/// Access to the inverse side of relationships.
pub trait InverseLinks {
    /// Adds `owner` to `member`'s relationship named `inverse_key`.
    fn link(&mut self, member: &Identity, inverse_key: &str, owner: &Identity, side: Side);

    /// Removes `owner` from `member`'s relationship named `inverse_key`.
    /// Returns whether anything was removed.
    fn unlink(
        &mut self,
        member: &Identity,
        inverse_key: &str,
        owner: &Identity,
        side: Side,
    ) -> bool;
}

/// Lifecycle operations applied uniformly to explicit and implicit
/// relationships.
pub trait RelationshipLifecycle {
    /// Empties membership on both sides, without remote side effects.
    fn clear(&mut self, links: &mut dyn InverseLinks);

    /// Detaches from inverses while keeping local membership.
    fn disconnect(&mut self, links: &mut dyn InverseLinks);

    /// Re-establishes the inverse linkage removed by `disconnect`.
    fn reconnect(&mut self, links: &mut dyn InverseLinks);

    /// Marks the relationship as torn down.
    fn destroy(&mut self) -> Result<(), RelationshipError>;
}

/// State of one relationship owned by one reference.
#[derive(Debug, Clone)]
pub struct Relationship {
    owner: Identity,
    key: String,
    kind: RelationshipKind,
    inverse_key: String,
    implicit: bool,
    canonical: IndexSet<Identity>,
    current: IndexSet<Identity>,
    connected: bool,
    destroyed: bool,
}

impl Relationship {
    /// A declared relationship.
    pub fn new(
        owner: Identity,
        key: impl Into<String>,
        kind: RelationshipKind,
        inverse_key: impl Into<String>,
    ) -> Self {
        Relationship {
            owner,
            key: key.into(),
            kind,
            inverse_key: inverse_key.into(),
            implicit: false,
            canonical: IndexSet::new(),
            current: IndexSet::new(),
            connected: true,
            destroyed: false,
        }
    }

    /// A synthesized inverse of `owner_key` on another model. Implicit
    /// relationships always hold a set of owners.
    pub fn implicit(
        owner: Identity,
        name: impl Into<String>,
        owner_key: impl Into<String>,
    ) -> Self {
        Relationship {
            implicit: true,
            ..Relationship::new(owner, name, RelationshipKind::HasMany, owner_key)
        }
    }

    pub fn owner(&self) -> &Identity {
        &self.owner
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> RelationshipKind {
        self.kind
    }

    pub fn inverse_key(&self) -> &str {
        &self.inverse_key
    }

    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Current membership, including local edits.
    pub fn members(&self) -> impl Iterator<Item = &Identity> {
        self.current.iter()
    }

    pub fn canonical_members(&self) -> impl Iterator<Item = &Identity> {
        self.canonical.iter()
    }

    /// Current value of a single-valued relationship.
    pub fn value(&self) -> Option<&Identity> {
        self.current.first()
    }

    pub fn canonical_value(&self) -> Option<&Identity> {
        self.canonical.first()
    }

    pub fn contains(&self, member: &Identity) -> bool {
        self.current.contains(member)
    }

    pub fn has_local_changes(&self) -> bool {
        self.canonical != self.current
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty() && self.current.is_empty()
    }

    fn side(&self, side: Side) -> &IndexSet<Identity> {
        match side {
            Side::Canonical => &self.canonical,
            Side::Current => &self.current,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut IndexSet<Identity> {
        match side {
            Side::Canonical => &mut self.canonical,
            Side::Current => &mut self.current,
        }
    }

    /// Adds `member` to one side without touching inverses. For single-valued
    /// relationships the previous value is displaced and returned.
    pub(crate) fn insert(&mut self, member: Identity, side: Side) -> Option<Identity> {
        let kind = self.kind;
        let set = self.side_mut(side);
        match kind {
            RelationshipKind::HasMany => {
                set.insert(member);
                None
            }
            RelationshipKind::BelongsTo => {
                let previous = set.pop();
                set.insert(member.clone());
                previous.filter(|p| *p != member)
            }
        }
    }

    /// Removes `member` from one side without touching inverses.
    pub(crate) fn remove(&mut self, member: &Identity, side: Side) -> bool {
        self.side_mut(side).shift_remove(member)
    }

    fn is_reflexive(&self, member: &Identity) -> bool {
        *member == self.owner && self.inverse_key == self.key
    }

    fn link_inverse(&self, member: &Identity, side: Side, links: &mut dyn InverseLinks) {
        if self.connected && !self.is_reflexive(member) {
            links.link(member, &self.inverse_key, &self.owner, side);
        }
    }

    fn unlink_inverse(&self, member: &Identity, side: Side, links: &mut dyn InverseLinks) {
        if self.connected && !self.is_reflexive(member) {
            links.unlink(member, &self.inverse_key, &self.owner, side);
        }
    }

    /// Replaces one side's membership, keeping inverses in step.
    pub fn replace(
        &mut self,
        side: Side,
        members: impl IntoIterator<Item = Identity>,
        links: &mut dyn InverseLinks,
    ) {
        let mut next: IndexSet<Identity> = members.into_iter().collect();
        if self.kind == RelationshipKind::BelongsTo && next.len() > 1 {
            next = next.pop().into_iter().collect();
        }

        let previous = std::mem::take(self.side_mut(side));
        for member in previous.iter().filter(|m| !next.contains(*m)) {
            self.unlink_inverse(member, side, links);
        }
        for member in next.iter().filter(|m| !previous.contains(*m)) {
            self.link_inverse(member, side, links);
        }
        *self.side_mut(side) = next;
    }

    /// Trusted update: sets canonical membership and flushes it to current.
    pub fn set_canonical(
        &mut self,
        members: impl IntoIterator<Item = Identity>,
        links: &mut dyn InverseLinks,
    ) {
        self.replace(Side::Canonical, members, links);
        self.flush_canonical(links);
    }

    /// Discards local edits: current membership becomes canonical.
    pub fn flush_canonical(&mut self, links: &mut dyn InverseLinks) {
        let canonical = self.canonical.clone();
        self.replace(Side::Current, canonical, links);
    }

    /// Accepts local edits as confirmed: canonical becomes current.
    pub fn commit(&mut self, links: &mut dyn InverseLinks) {
        let current = self.current.clone();
        self.replace(Side::Canonical, current, links);
    }

    /// Local edit: adds a member to the current membership.
    pub fn add(&mut self, member: Identity, links: &mut dyn InverseLinks) {
        if self.current.contains(&member) {
            return;
        }
        if let Some(displaced) = self.insert(member.clone(), Side::Current) {
            self.unlink_inverse(&displaced, Side::Current, links);
        }
        self.link_inverse(&member, Side::Current, links);
    }

    /// Local edit: removes a member from the current membership.
    pub fn remove_member(&mut self, member: &Identity, links: &mut dyn InverseLinks) -> bool {
        if !self.remove(member, Side::Current) {
            return false;
        }
        self.unlink_inverse(member, Side::Current, links);
        true
    }

    /// Local edit of a single-valued relationship.
    pub fn set_value(&mut self, value: Option<Identity>, links: &mut dyn InverseLinks) {
        self.replace(Side::Current, value, links);
    }

    fn all_members(&self) -> Vec<Identity> {
        self.canonical.union(&self.current).cloned().collect()
    }
}

impl RelationshipLifecycle for Relationship {
    fn clear(&mut self, links: &mut dyn InverseLinks) {
        for member in self.all_members() {
            self.unlink_inverse(&member, Side::Canonical, links);
            self.unlink_inverse(&member, Side::Current, links);
        }
        self.canonical.clear();
        self.current.clear();
    }

    fn disconnect(&mut self, links: &mut dyn InverseLinks) {
        if !self.connected {
            return;
        }
        for member in self.all_members() {
            self.unlink_inverse(&member, Side::Canonical, links);
            self.unlink_inverse(&member, Side::Current, links);
        }
        self.connected = false;
    }

    fn reconnect(&mut self, links: &mut dyn InverseLinks) {
        if self.connected || self.destroyed {
            return;
        }
        self.connected = true;
        for side in [Side::Canonical, Side::Current] {
            for member in self.side(side).clone() {
                self.link_inverse(&member, side, links);
            }
        }
    }

    fn destroy(&mut self) -> Result<(), RelationshipError> {
        if self.destroyed {
            return Err(RelationshipError::AlreadyDestroyed {
                owner: self.owner.clone(),
                key: self.key.clone(),
            });
        }
        self.destroyed = true;
        self.connected = false;

        let members = self.canonical.union(&self.current).count();
        if members > 0 {
            return Err(RelationshipError::NotCleared {
                owner: self.owner.clone(),
                key: self.key.clone(),
                members,
            });
        }
        Ok(())
    }
}

/// Runs `clear()` then `destroy()` on every relationship in order, never
/// stopping early. Failures are returned after the full pass.
pub fn teardown<'r, R, I>(relationships: I, links: &mut dyn InverseLinks) -> Vec<RelationshipError>
where
    R: RelationshipLifecycle + 'r,
    I: IntoIterator<Item = &'r mut R>,
{
    let mut failures = Vec::new();
    for relationship in relationships {
        relationship.clear(links);
        if let Err(err) = relationship.destroy() {
            failures.push(err);
        }
    }
    failures
}
