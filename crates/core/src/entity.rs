//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Identity records (users, tenants, roles, permissions) implement this so
/// storage adapters can key them uniformly.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing revision of the stored row.
    ///
    /// Defaults to `0` for records that are never updated in place.
    fn version(&self) -> u64 {
        0
    }
}
