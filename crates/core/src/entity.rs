//! Entity trait: identity + ownership.

use crate::id::UserId;

/// Owned record with a stable identity.
///
/// Every persisted record belongs to exactly one user. Stores use `owner_id`
/// to scope visibility, so a record is never returned to another identity.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;

    /// Returns the identity that owns this record.
    fn owner_id(&self) -> UserId;

    /// Whether `user` may see this record.
    fn is_owned_by(&self, user: UserId) -> bool {
        self.owner_id() == user
    }
}
