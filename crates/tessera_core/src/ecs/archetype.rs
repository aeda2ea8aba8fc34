//! # Archetype-based Entity Storage
//!
//! Entities with the same component set are stored together:
//!
//! ```text
//! Archetype {Position, Velocity}, 3 rows per chunk:
//!   chunk 0: [E1 E2 E3]  Position: [P1 P2 P3]  Velocity: [V1 V2 V3]
//!   chunk 1: [E4 E5 __]  Position: [P4 P5 __]  Velocity: [V4 V5 __]
//! ```
//!
//! Every chunk before the last occupied one is full, so row `k` of the
//! archetype always lives at `(k / capacity, k % capacity)`. Removing a row
//! backfills it from the archetype's last row, keeping that layout dense.

use std::collections::HashMap;

use crate::ecs::chunk::Chunk;
use crate::ecs::component::{ComponentId, ComponentInfo, Signature};
use crate::ecs::Entity;

/// Order-independent archetype identity: XOR of zobrist keys.
pub type ArchetypeId = u64;

/// Storage for every entity of one exact component set.
pub struct Archetype {
    id: ArchetypeId,
    index: usize,
    components: Vec<ComponentId>,
    infos: Vec<ComponentInfo>,
    signature: Signature,
    chunks: Vec<Chunk>,
    last_chunk: usize,
    entity_count: usize,
    chunk_capacity: usize,
    row_tracking: bool,
    add_edges: HashMap<ComponentId, usize>,
    remove_edges: HashMap<ComponentId, usize>,
}

/// Rows that fit in `chunk_bytes` for a row layout, at least one.
#[must_use]
pub fn rows_per_chunk(chunk_bytes: usize, infos: &[ComponentInfo]) -> usize {
    let row_bytes = std::mem::size_of::<Entity>() + infos.iter().map(|info| info.size).sum::<usize>();
    (chunk_bytes / row_bytes).max(1)
}

impl Archetype {
    /// Creates an empty archetype. `infos` must be sorted by id.
    #[must_use]
    pub fn new(
        id: ArchetypeId,
        index: usize,
        infos: Vec<ComponentInfo>,
        chunk_bytes: usize,
        row_tracking: bool,
    ) -> Self {
        let components: Vec<ComponentId> = infos.iter().map(|info| info.id).collect();
        Self {
            id,
            index,
            signature: Signature::from_ids(&components),
            chunk_capacity: rows_per_chunk(chunk_bytes, &infos),
            components,
            infos,
            chunks: Vec::new(),
            last_chunk: 0,
            entity_count: 0,
            row_tracking,
            add_edges: HashMap::new(),
            remove_edges: HashMap::new(),
        }
    }

    /// Zobrist id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Position in the store's archetype list.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Sorted component ids.
    #[inline]
    #[must_use]
    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    /// Component metadata, same order as [`Self::components`].
    #[inline]
    #[must_use]
    pub fn infos(&self) -> &[ComponentInfo] {
        &self.infos
    }

    /// Component bitset.
    #[inline]
    #[must_use]
    pub const fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entity_count
    }

    /// True when the archetype holds no entity.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entity_count == 0
    }

    /// Rows per chunk.
    #[inline]
    #[must_use]
    pub const fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// Index of the last partially filled chunk.
    #[inline]
    #[must_use]
    pub const fn last_chunk(&self) -> usize {
        self.last_chunk
    }

    /// True if chunks keep per-row change stamps.
    #[inline]
    #[must_use]
    pub const fn row_tracking(&self) -> bool {
        self.row_tracking
    }

    /// Allocated chunks, including empty spares.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Chunks that hold at least one row.
    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks[..self.used_chunks()]
    }

    /// Mutable access to the occupied chunks.
    #[inline]
    pub fn chunks_mut(&mut self) -> &mut [Chunk] {
        let used = self.used_chunks();
        &mut self.chunks[..used]
    }

    /// Chunk by index.
    #[inline]
    #[must_use]
    pub fn chunk(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    /// Mutable chunk by index.
    #[inline]
    pub fn chunk_mut(&mut self, index: usize) -> Option<&mut Chunk> {
        self.chunks.get_mut(index)
    }

    /// Component ids alongside one mutable chunk.
    pub(crate) fn writer_parts(&mut self, chunk: usize) -> Option<(&[ComponentId], &mut Chunk)> {
        let chunk = self.chunks.get_mut(chunk)?;
        Some((&self.components, chunk))
    }

    /// Column position of a component, by binary search.
    #[inline]
    #[must_use]
    pub fn column_index(&self, id: ComponentId) -> Option<usize> {
        self.components.binary_search(&id).ok()
    }

    /// True if the archetype stores component `id`.
    #[inline]
    #[must_use]
    pub fn has(&self, id: ComponentId) -> bool {
        self.signature.has(id)
    }

    fn used_chunks(&self) -> usize {
        self.entity_count.div_ceil(self.chunk_capacity)
    }

    fn locate(&self, row: usize) -> (usize, usize) {
        (row / self.chunk_capacity, row % self.chunk_capacity)
    }

    /// Appends an entity at the end of the archetype.
    ///
    /// Returns `(chunk, row)`; component cells start zeroed.
    pub fn add_entity(&mut self, entity: Entity) -> (usize, usize) {
        let (chunk, expected_row) = self.locate(self.entity_count);
        if chunk == self.chunks.len() {
            self.chunks
                .push(Chunk::new(&self.infos, self.chunk_capacity, self.row_tracking));
        }
        let row = self.chunks[chunk].push(entity);
        debug_assert_eq!(row, expected_row);
        self.entity_count += 1;
        self.last_chunk = chunk;
        (chunk, row)
    }

    /// Removes the row at `(chunk, row)`.
    ///
    /// The archetype's last row is copied into the hole. Returns the entity
    /// that moved, or `None` when the removed row was the last one.
    pub fn remove_entity(&mut self, chunk: usize, row: usize) -> Option<Entity> {
        if self.entity_count == 0 {
            return None;
        }
        let (last_chunk, last_row) = self.locate(self.entity_count - 1);

        let moved = if (chunk, row) == (last_chunk, last_row) {
            None
        } else if chunk == last_chunk {
            self.chunks[chunk].copy_row_within(last_row, row);
            self.chunks[chunk].entity(row)
        } else {
            let (head, tail) = self.chunks.split_at_mut(last_chunk);
            head[chunk].copy_row_from(row, &tail[0], last_row);
            head[chunk].entity(row)
        };

        self.chunks[last_chunk].pop();
        self.entity_count -= 1;
        self.last_chunk = self.entity_count.saturating_sub(1) / self.chunk_capacity;
        moved
    }

    /// Moves the row at `(chunk, row)` into `dst`, carrying every component
    /// both archetypes share (bytes and stamps).
    ///
    /// Returns the row's new `(chunk, row)` in `dst` and the entity that
    /// backfilled the source row, if any.
    pub fn move_entity(
        &mut self,
        chunk: usize,
        row: usize,
        dst: &mut Self,
    ) -> ((usize, usize), Option<Entity>) {
        let entity = self.chunks[chunk].entity(row).unwrap_or(Entity::NULL);
        let (dst_chunk, dst_row) = dst.add_entity(entity);

        let source = &self.chunks[chunk];
        let target = &mut dst.chunks[dst_chunk];
        for (col, id) in self.components.iter().enumerate() {
            if let Ok(dst_col) = dst.components.binary_search(id) {
                source.copy_cell_to(col, row, target, dst_col, dst_row);
            }
        }

        let moved = self.remove_entity(chunk, row);
        ((dst_chunk, dst_row), moved)
    }

    /// Ensures chunks exist for `count` more entities.
    pub fn preallocate(&mut self, count: usize) {
        let needed = (self.entity_count + count).div_ceil(self.chunk_capacity);
        while self.chunks.len() < needed {
            self.chunks
                .push(Chunk::new(&self.infos, self.chunk_capacity, self.row_tracking));
        }
    }

    /// Frees spare chunks past the last occupied one.
    pub fn optimize(&mut self) {
        let used = self.used_chunks();
        self.chunks.truncate(used);
        self.chunks.shrink_to_fit();
    }

    /// Cached archetype reached by adding `id`.
    #[inline]
    #[must_use]
    pub fn add_edge(&self, id: ComponentId) -> Option<usize> {
        self.add_edges.get(&id).copied()
    }

    /// Cached archetype reached by removing `id`.
    #[inline]
    #[must_use]
    pub fn remove_edge(&self, id: ComponentId) -> Option<usize> {
        self.remove_edges.get(&id).copied()
    }

    pub(crate) fn set_add_edge(&mut self, id: ComponentId, target: usize) {
        self.add_edges.insert(id, target);
    }

    pub(crate) fn set_remove_edge(&mut self, id: ComponentId, target: usize) {
        self.remove_edges.insert(id, target);
    }
}

impl std::fmt::Debug for Archetype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &format_args!("{:#018x}", self.id))
            .field("index", &self.index)
            .field("components", &self.components)
            .field("entities", &self.entity_count)
            .field("chunks", &self.chunks.len())
            .field("chunk_capacity", &self.chunk_capacity)
            .finish()
    }
}
