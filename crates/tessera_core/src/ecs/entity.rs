//! # Entity Management
//!
//! Entities are lightweight handles consisting of:
//! - An id, the identity of the entity and the key of its index record
//! - A version, bumped every time the id is recycled

use std::fmt;

use bytemuck::{Pod, Zeroable};

/// Versioned entity handle.
///
/// Identity is the id; the version detects stale handles after the id has
/// been freed and issued again. Ordering compares ids first, which lets the
/// allocator's free list hand out the lowest id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
#[repr(C)]
pub struct Entity {
    id: i32,
    version: i32,
}

impl Entity {
    /// Null/invalid entity handle.
    pub const NULL: Self = Self { id: 0, version: -1 };

    /// Creates an entity handle from id and version.
    #[inline]
    #[must_use]
    pub const fn new(id: i32, version: i32) -> Self {
        Self { id, version }
    }

    /// Returns the id portion of the handle.
    #[inline]
    #[must_use]
    pub const fn id(self) -> i32 {
        self.id
    }

    /// Returns the version portion of the handle.
    #[inline]
    #[must_use]
    pub const fn version(self) -> i32 {
        self.version
    }

    /// Checks if this handle is the null sentinel (or any handle shaped like it).
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.id <= 0 || self.version < 0
    }

    /// Index of this entity's record in dense per-entity tables.
    #[inline]
    #[must_use]
    pub(crate) const fn slot(self) -> usize {
        self.id as usize
    }

    /// Handle issued when this id is recycled.
    #[inline]
    #[must_use]
    pub(crate) const fn next_version(self) -> Self {
        let version = if self.version == i32::MAX { 0 } else { self.version + 1 };
        Self { id: self.id, version }
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.id, self.version)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.id, self.version)
    }
}

/// Storage location of a live entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityLocation {
    /// Index of the archetype in the store.
    pub archetype: usize,
    /// Chunk index within the archetype.
    pub chunk: usize,
    /// Row index within the chunk.
    pub row: usize,
}

/// Per-id record kept by the archetype store.
#[derive(Clone, Copy, Debug)]
pub(crate) struct EntityRecord {
    /// Version of the handle currently issued for this id.
    pub version: i32,
    /// Where the entity lives, `None` while the id is free.
    pub location: Option<EntityLocation>,
}

impl Default for EntityRecord {
    fn default() -> Self {
        Self {
            version: -1,
            location: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_roundtrip() {
        let entity = Entity::new(12345, 678);
        assert_eq!(entity.id(), 12345);
        assert_eq!(entity.version(), 678);
        assert!(!entity.is_null());
    }

    #[test]
    fn test_null_sentinel() {
        assert!(Entity::NULL.is_null());
        assert!(Entity::default().is_null());
        assert!(Entity::new(-4, 2).is_null());
        assert!(Entity::new(3, -1).is_null());
    }

    #[test]
    fn test_next_version_wraps_to_zero() {
        assert_eq!(Entity::new(7, 3).next_version(), Entity::new(7, 4));
        assert_eq!(Entity::new(7, i32::MAX).next_version(), Entity::new(7, 0));
    }

    #[test]
    fn test_ordering_by_id_first() {
        assert!(Entity::new(1, 9) < Entity::new(2, 0));
        assert!(Entity::new(2, 0) < Entity::new(2, 1));
    }

    #[test]
    fn test_entity_is_eight_bytes() {
        assert_eq!(std::mem::size_of::<Entity>(), 8);
    }
}
