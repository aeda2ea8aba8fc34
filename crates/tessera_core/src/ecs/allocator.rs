//! # Entity Allocator
//!
//! Issues entity handles. Freed ids go back to a [`FreeList`] and the lowest
//! freed id is always reused first, so ids stay dense and the entity index
//! stays compact. Fresh ids start at 1; id 0 is reserved for [`Entity::NULL`].

use std::sync::atomic::{AtomicI32, Ordering};

use crate::ecs::Entity;
use crate::error::{EcsError, EcsResult};
use crate::memory::FreeList;

/// Highest id the allocator issues.
pub const MAX_ENTITY_ID: i32 = i32::MAX - 1;

/// Thread-safe entity handle allocator.
///
/// Shared through an `Arc` by the world, its command buffers and command
/// senders, so spawns can hand out an entity before the spawn is applied.
#[derive(Debug)]
pub struct EntityAllocator {
    next_id: AtomicI32,
    free: FreeList<Entity>,
}

impl EntityAllocator {
    /// Creates an allocator with room for `capacity` recycled handles.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            next_id: AtomicI32::new(1),
            free: FreeList::with_capacity(capacity),
        }
    }

    #[cfg(test)]
    pub(crate) fn starting_at(next_id: i32) -> Self {
        let allocator = Self::default();
        allocator.next_id.store(next_id, Ordering::Relaxed);
        allocator
    }

    /// Returns a handle nobody else currently holds.
    ///
    /// Recycled handles already carry their bumped version. The counter
    /// stops at [`MAX_ENTITY_ID`] instead of wrapping.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityCapacity`] when every id is issued and
    /// none is free.
    pub fn try_allocate(&self) -> EcsResult<Entity> {
        if let Some(entity) = self.free.try_pop() {
            return Ok(entity);
        }
        self.next_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| {
                (id <= MAX_ENTITY_ID).then_some(id + 1)
            })
            .map(|id| Entity::new(id, 0))
            .map_err(|_| EcsError::EntityCapacity(MAX_ENTITY_ID))
    }

    /// Like [`Self::try_allocate`], but returns [`Entity::NULL`] once ids
    /// are exhausted. Storing the null handle fails with
    /// [`EcsError::EntityCapacity`], so deferred spawns report it at flush.
    pub fn allocate(&self) -> Entity {
        self.try_allocate().unwrap_or(Entity::NULL)
    }

    /// Returns the id to the pool. The next handle issued for it has the
    /// version incremented (wrapping from `i32::MAX` to 0).
    pub fn free(&self, entity: Entity) {
        if entity.is_null() {
            return;
        }
        self.free.push(entity.next_version());
    }

    /// Number of ids waiting for reuse.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Highest id ever issued.
    #[must_use]
    pub fn high_water_mark(&self) -> i32 {
        self.next_id.load(Ordering::Relaxed) - 1
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}
