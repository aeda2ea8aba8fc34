//! # Change Tracking
//!
//! Structural and write events are stamped with the world generation at
//! which they happened. A stamp is visible while the generation that wrote it
//! is the current one or the one right before it, so a system running after
//! the writer in the same tick and every system in the next tick both see it.
//!
//! Removed components cannot be read from their old row, so their final
//! values are kept per component in a [`RemovedTracker`] for the same window.

use bytemuck::Pod;

use crate::ecs::component::{ComponentId, ComponentInfo};
use crate::ecs::Entity;

/// World generation counter. Advances once per tick.
pub type Generation = u32;

/// Stamp value meaning "never happened". Live generations skip it.
pub const NEVER: Generation = 0;

/// True iff `stamped` happened at `current` or the generation before it.
#[inline]
#[must_use]
pub const fn is_visible(current: Generation, stamped: Generation) -> bool {
    if stamped == NEVER {
        return false;
    }
    let mut distance = current.wrapping_sub(stamped);
    if stamped > current {
        // The counter wrapped past NEVER, which is never issued.
        distance = distance.wrapping_sub(1);
    }
    distance <= 1
}

/// Picks the more recent of two stamps.
#[inline]
#[must_use]
const fn newer(left: Generation, right: Generation) -> Generation {
    if left == NEVER {
        right
    } else if right == NEVER {
        left
    } else if (right.wrapping_sub(left) as i32) > 0 {
        right
    } else {
        left
    }
}

/// Kind of event a stamp records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The component was attached to an entity.
    Added,
    /// The component value was (potentially) written.
    Changed,
    /// The component was detached or its entity despawned.
    Removed,
}

/// Chunk-wide stamps for one component column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeBlock {
    /// Last generation a row of this column was added.
    pub added: Generation,
    /// Last generation a row of this column was written.
    pub changed: Generation,
    /// Last generation a row carrying this component left the chunk.
    pub removed: Generation,
}

impl ChangeBlock {
    /// Records `kind` at `generation`.
    #[inline]
    pub fn stamp(&mut self, kind: ChangeKind, generation: Generation) {
        match kind {
            ChangeKind::Added => self.added = generation,
            ChangeKind::Changed => self.changed = generation,
            ChangeKind::Removed => self.removed = generation,
        }
    }

    /// Stamp recorded for `kind`.
    #[inline]
    #[must_use]
    pub const fn get(&self, kind: ChangeKind) -> Generation {
        match kind {
            ChangeKind::Added => self.added,
            ChangeKind::Changed => self.changed,
            ChangeKind::Removed => self.removed,
        }
    }

    /// True if `kind` is visible at `current`.
    #[inline]
    #[must_use]
    pub const fn check(&self, kind: ChangeKind, current: Generation) -> bool {
        is_visible(current, self.get(kind))
    }

    /// Folds the added/changed stamps of a row moved in from another chunk.
    #[inline]
    pub fn absorb(&mut self, row: RowStamps) {
        self.added = newer(self.added, row.added);
        self.changed = newer(self.changed, row.changed);
    }

    /// Folds another chunk's added/changed stamps into this one.
    #[inline]
    pub fn merge(&mut self, other: &Self) {
        self.added = newer(self.added, other.added);
        self.changed = newer(self.changed, other.changed);
    }
}

/// Per-row stamps for one component, kept when row tracking is enabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RowStamps {
    /// Generation the component was attached to this row's entity.
    pub added: Generation,
    /// Generation the component was last written on this row.
    pub changed: Generation,
}

impl RowStamps {
    /// Records `kind`. Row-level removal is not tracked.
    #[inline]
    pub fn stamp(&mut self, kind: ChangeKind, generation: Generation) {
        match kind {
            ChangeKind::Added => self.added = generation,
            ChangeKind::Changed => self.changed = generation,
            ChangeKind::Removed => {}
        }
    }

    /// True if `kind` is visible at `current`. Removed always passes, since
    /// removal lives at chunk granularity.
    #[inline]
    #[must_use]
    pub const fn check(&self, kind: ChangeKind, current: Generation) -> bool {
        match kind {
            ChangeKind::Added => is_visible(current, self.added),
            ChangeKind::Changed => is_visible(current, self.changed),
            ChangeKind::Removed => true,
        }
    }
}

/// The world's current generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeTracker {
    current: Generation,
}

impl ChangeTracker {
    /// Starts at generation 1.
    #[must_use]
    pub const fn new() -> Self {
        Self { current: 1 }
    }

    /// Current generation.
    #[inline]
    #[must_use]
    pub const fn current(&self) -> Generation {
        self.current
    }

    /// Advances the generation, skipping [`NEVER`] on wrap-around.
    pub fn tick(&mut self) -> Generation {
        self.current = self.current.wrapping_add(1);
        if self.current == NEVER {
            self.current = 1;
        }
        self.current
    }
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug)]
struct RemovedEntry {
    entity: Entity,
    generation: Generation,
}

/// Final values of one component type for recently detached rows.
///
/// Sparse set keyed by entity id: `sparse[id]` holds the dense index plus one.
/// Values are stored as raw bytes, `size` bytes per entry, in dense order.
#[derive(Debug)]
pub struct RemovedTracker {
    component: ComponentId,
    name: &'static str,
    size: usize,
    sparse: Vec<u32>,
    entries: Vec<RemovedEntry>,
    bytes: Vec<u8>,
}

impl RemovedTracker {
    /// Creates an empty tracker for one component type.
    #[must_use]
    pub fn new(info: &ComponentInfo) -> Self {
        Self {
            component: info.id,
            name: info.name,
            size: info.size,
            sparse: Vec::new(),
            entries: Vec::new(),
            bytes: Vec::new(),
        }
    }

    /// Component this tracker belongs to.
    #[must_use]
    pub const fn component(&self) -> ComponentId {
        self.component
    }

    /// Records the final value of `entity`, replacing an older snapshot.
    pub fn set_removed(&mut self, entity: Entity, value: &[u8], generation: Generation) {
        if entity.is_null() || value.len() != self.size {
            return;
        }
        let slot = entity.slot();
        if slot >= self.sparse.len() {
            self.sparse.resize(slot + 1, 0);
        }

        match self.sparse[slot] {
            0 => {
                self.entries.push(RemovedEntry { entity, generation });
                self.bytes.extend_from_slice(value);
                self.sparse[slot] = self.entries.len() as u32;
            }
            index => {
                let dense = index as usize - 1;
                self.entries[dense] = RemovedEntry { entity, generation };
                let start = dense * self.size;
                self.bytes[start..start + self.size].copy_from_slice(value);
            }
        }
    }

    /// Purges snapshots that fell out of the visibility window.
    pub fn tick(&mut self, current: Generation) {
        let mut dense = 0;
        while dense < self.entries.len() {
            if is_visible(current, self.entries[dense].generation) {
                dense += 1;
            } else {
                self.swap_remove(dense);
            }
        }
    }

    /// True if `entity` lost this component within the window.
    #[must_use]
    pub fn was_removed(&self, entity: Entity, current: Generation) -> bool {
        self.entry(entity)
            .is_some_and(|(entry, _)| is_visible(current, entry.generation))
    }

    /// Raw bytes of the removed value, if still visible.
    #[must_use]
    pub fn removed_bytes(&self, entity: Entity, current: Generation) -> Option<&[u8]> {
        let (entry, dense) = self.entry(entity)?;
        if !is_visible(current, entry.generation) {
            return None;
        }
        let start = dense * self.size;
        Some(&self.bytes[start..start + self.size])
    }

    /// Typed copy of the removed value, if still visible.
    #[must_use]
    pub fn get_removed<C: Pod>(&self, entity: Entity, current: Generation) -> Option<C> {
        let bytes = self.removed_bytes(entity, current)?;
        bytemuck::try_pod_read_unaligned(bytes).ok()
    }

    /// Entities whose removal is visible at `current`.
    pub fn iter(&self, current: Generation) -> impl Iterator<Item = Entity> + '_ {
        self.entries
            .iter()
            .filter(move |entry| is_visible(current, entry.generation))
            .map(|entry| entry.entity)
    }

    /// Number of stored snapshots, visible or not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no snapshot is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Type name, for diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    fn entry(&self, entity: Entity) -> Option<(RemovedEntry, usize)> {
        if entity.is_null() {
            return None;
        }
        let index = *self.sparse.get(entity.slot())?;
        if index == 0 {
            return None;
        }
        let dense = index as usize - 1;
        let entry = self.entries[dense];
        (entry.entity == entity).then_some((entry, dense))
    }

    fn swap_remove(&mut self, dense: usize) {
        let last = self.entries.len() - 1;
        let removed = self.entries[dense].entity;
        if dense != last {
            let moved = self.entries[last];
            self.entries[dense] = moved;
            self.sparse[moved.entity.slot()] = (dense + 1) as u32;
            let (start, end) = (last * self.size, dense * self.size);
            self.bytes.copy_within(start..start + self.size, end);
        }
        self.entries.pop();
        self.bytes.truncate(last * self.size);
        self.sparse[removed.slot()] = 0;
    }
}

/// Removed-value trackers indexed by component id.
#[derive(Debug, Default)]
pub struct RemovedComponents {
    trackers: Vec<Option<RemovedTracker>>,
}

impl RemovedComponents {
    /// Creates the tracker for `info` if it does not exist yet.
    pub fn ensure(&mut self, info: &ComponentInfo) {
        let index = usize::from(info.id);
        if index >= self.trackers.len() {
            self.trackers.resize_with(index + 1, || None);
        }
        if self.trackers[index].is_none() {
            self.trackers[index] = Some(RemovedTracker::new(info));
        }
    }

    /// Records a removal snapshot.
    pub fn record(&mut self, id: ComponentId, entity: Entity, value: &[u8], generation: Generation) {
        if let Some(Some(tracker)) = self.trackers.get_mut(usize::from(id)) {
            tracker.set_removed(entity, value, generation);
        }
    }

    /// Tracker of one component, if any archetype ever held it.
    #[must_use]
    pub fn get(&self, id: ComponentId) -> Option<&RemovedTracker> {
        self.trackers.get(usize::from(id))?.as_ref()
    }

    /// Sweeps every tracker.
    pub fn tick(&mut self, current: Generation) {
        for tracker in self.trackers.iter_mut().flatten() {
            tracker.tick(current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::{Component, ComponentRegistry};
    use bytemuck::Zeroable;

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Ammo(u32);
    impl Component for Ammo {}

    fn tracker() -> RemovedTracker {
        let mut registry = ComponentRegistry::default();
        let info = registry.register::<Ammo>().unwrap();
        RemovedTracker::new(&info)
    }

    #[test]
    fn test_visibility_window() {
        assert!(is_visible(5, 5));
        assert!(is_visible(6, 5));
        assert!(!is_visible(7, 5));
        assert!(!is_visible(5, NEVER));
        assert!(is_visible(1, u32::MAX));
    }

    #[test]
    fn test_tracker_skips_never_on_wrap() {
        let mut tracker = ChangeTracker { current: u32::MAX };
        assert_eq!(tracker.tick(), 1);
        assert_eq!(ChangeTracker::new().current(), 1);
    }

    #[test]
    fn test_change_block_stamps() {
        let mut block = ChangeBlock::default();
        block.stamp(ChangeKind::Added, 3);
        assert!(block.check(ChangeKind::Added, 4));
        assert!(!block.check(ChangeKind::Added, 5));
        assert!(!block.check(ChangeKind::Changed, 3));

        block.absorb(RowStamps { added: 2, changed: 9 });
        assert_eq!(block.added, 3);
        assert_eq!(block.changed, 9);
    }

    #[test]
    fn test_removed_snapshot_lifecycle() {
        let mut removed = tracker();
        let entity = Entity::new(4, 0);
        removed.set_removed(entity, bytemuck::bytes_of(&Ammo(12)), 10);

        assert!(removed.was_removed(entity, 10));
        assert_eq!(removed.get_removed::<Ammo>(entity, 11), Some(Ammo(12)));
        assert!(!removed.was_removed(Entity::new(4, 1), 10));

        removed.tick(12);
        assert!(removed.is_empty());
        assert!(!removed.was_removed(entity, 12));
    }

    #[test]
    fn test_refresh_replaces_value() {
        let mut removed = tracker();
        let entity = Entity::new(2, 0);
        removed.set_removed(entity, bytemuck::bytes_of(&Ammo(1)), 1);
        removed.set_removed(entity, bytemuck::bytes_of(&Ammo(2)), 2);

        assert_eq!(removed.len(), 1);
        assert_eq!(removed.get_removed::<Ammo>(entity, 2), Some(Ammo(2)));
    }

    #[test]
    fn test_sweep_keeps_sparse_consistent() {
        let mut removed = tracker();
        for id in 1..=4 {
            let generation = if id % 2 == 0 { 1 } else { 5 };
            removed.set_removed(Entity::new(id, 0), bytemuck::bytes_of(&Ammo(id as u32)), generation);
        }

        removed.tick(5);
        assert_eq!(removed.len(), 2);
        assert_eq!(removed.get_removed::<Ammo>(Entity::new(3, 0), 5), Some(Ammo(3)));
        assert_eq!(removed.get_removed::<Ammo>(Entity::new(1, 0), 5), Some(Ammo(1)));
        assert!(!removed.was_removed(Entity::new(2, 0), 5));

        let mut visible: Vec<_> = removed.iter(5).map(Entity::id).collect();
        visible.sort_unstable();
        assert_eq!(visible, vec![1, 3]);
    }
}
