//! # Chunks
//!
//! A chunk is a fixed-capacity block of rows inside an archetype: one entity
//! column plus one column per component, all indexed by the same row. Rows
//! `[0, len)` are occupied; the archetype keeps them dense.

use crate::ecs::component::ComponentInfo;
use crate::ecs::query::MAX_QUERY_TERMS;
use crate::ecs::storage::{Column, ColumnStorage};
use crate::ecs::tracker::{ChangeBlock, ChangeKind, Generation, RowStamps};
use crate::ecs::{Component, Entity};
use crate::error::{EcsError, EcsResult};

/// Fixed-capacity columnar block.
pub struct Chunk {
    entities: Vec<Entity>,
    columns: Vec<Box<dyn ColumnStorage>>,
    changes: Vec<ChangeBlock>,
    rows: Vec<Box<[RowStamps]>>,
    capacity: usize,
}

/// Mutable borrow of one chunk, split by field.
///
/// `columns` holds the requested columns in request order; every column is
/// borrowed at most once, so each slot can be downcast independently.
pub struct ChunkViewMut<'w> {
    /// Entities of the occupied rows.
    pub entities: &'w [Entity],
    /// Chunk-wide stamps, one per column of the archetype.
    pub changes: &'w mut [ChangeBlock],
    /// Per-row stamps, one slice per column (empty without row tracking).
    pub rows: &'w mut [Box<[RowStamps]>],
    /// Requested columns.
    pub columns: [Option<&'w mut dyn ColumnStorage>; MAX_QUERY_TERMS],
}

impl Chunk {
    /// Allocates a chunk with zeroed columns for `infos`.
    #[must_use]
    pub fn new(infos: &[ComponentInfo], capacity: usize, row_tracking: bool) -> Self {
        let row_len = if row_tracking { capacity } else { 0 };
        Self {
            entities: Vec::with_capacity(capacity),
            columns: infos.iter().map(|info| info.new_column(capacity)).collect(),
            changes: vec![ChangeBlock::default(); infos.len()],
            rows: infos
                .iter()
                .map(|_| vec![RowStamps::default(); row_len].into_boxed_slice())
                .collect(),
            capacity,
        }
    }

    /// Occupied rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when no row is occupied.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// True when every row is occupied.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entities.len() == self.capacity
    }

    /// Row capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entities of the occupied rows.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Entity at `row`.
    #[inline]
    #[must_use]
    pub fn entity(&self, row: usize) -> Option<Entity> {
        self.entities.get(row).copied()
    }

    /// Chunk-wide stamps of column `col`.
    #[inline]
    #[must_use]
    pub fn change_block(&self, col: usize) -> Option<&ChangeBlock> {
        self.changes.get(col)
    }

    /// Per-row stamps of column `col`, if row tracking is on.
    #[inline]
    #[must_use]
    pub fn row_stamps(&self, col: usize, row: usize) -> Option<RowStamps> {
        self.rows.get(col)?.get(row).copied()
    }

    /// Appends an entity at row `len`, with zeroed components.
    pub(crate) fn push(&mut self, entity: Entity) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        for column in &mut self.columns {
            column.reset(row);
        }
        for stamps in &mut self.rows {
            if let Some(stamp) = stamps.get_mut(row) {
                *stamp = RowStamps::default();
            }
        }
        row
    }

    /// Drops the last row.
    pub(crate) fn pop(&mut self) -> Option<Entity> {
        self.entities.pop()
    }

    /// Moves row `from` over row `to` inside this chunk.
    pub(crate) fn copy_row_within(&mut self, from: usize, to: usize) {
        self.entities[to] = self.entities[from];
        for column in &mut self.columns {
            column.copy_within(from, to);
        }
        for stamps in &mut self.rows {
            if from < stamps.len() && to < stamps.len() {
                stamps[to] = stamps[from];
            }
        }
    }

    /// Copies row `src_row` of `src` over `dst_row` of this chunk. Both
    /// chunks must belong to the same archetype.
    pub(crate) fn copy_row_from(&mut self, dst_row: usize, src: &Self, src_row: usize) {
        self.entities[dst_row] = src.entities[src_row];
        for (dst, src_column) in self.columns.iter_mut().zip(&src.columns) {
            src_column.copy_to(src_row, &mut **dst, dst_row);
        }
        for (col, (dst, src_stamps)) in self.rows.iter_mut().zip(&src.rows).enumerate() {
            if let (Some(slot), Some(&stamp)) = (dst.get_mut(dst_row), src_stamps.get(src_row)) {
                *slot = stamp;
                self.changes[col].absorb(stamp);
            }
        }
        if self.rows.iter().all(|stamps| stamps.is_empty()) {
            for (dst, src_block) in self.changes.iter_mut().zip(&src.changes) {
                dst.merge(src_block);
            }
        }
    }

    /// Copies one column cell into another chunk's column, with its stamps.
    pub(crate) fn copy_cell_to(
        &self,
        col: usize,
        row: usize,
        dst: &mut Self,
        dst_col: usize,
        dst_row: usize,
    ) {
        self.columns[col].copy_to(row, &mut *dst.columns[dst_col], dst_row);
        match self.row_stamps(col, row) {
            Some(stamp) => {
                if let Some(slot) = dst.rows[dst_col].get_mut(dst_row) {
                    *slot = stamp;
                }
                dst.changes[dst_col].absorb(stamp);
            }
            None => {
                let block = self.changes[col];
                dst.changes[dst_col].merge(&block);
            }
        }
    }

    /// Stamps `kind` on column `col` chunk-wide, and on `row` when given and
    /// row tracking is on.
    pub fn set_flag(&mut self, col: usize, kind: ChangeKind, generation: Generation, row: Option<usize>) {
        if let Some(block) = self.changes.get_mut(col) {
            block.stamp(kind, generation);
        }
        if let Some(row) = row {
            if let Some(stamp) = self.rows.get_mut(col).and_then(|stamps| stamps.get_mut(row)) {
                stamp.stamp(kind, generation);
            }
        }
    }

    /// True if `kind` is visible on column `col` anywhere in the chunk.
    #[must_use]
    pub fn check_flag(&self, col: usize, kind: ChangeKind, current: Generation) -> bool {
        self.changes
            .get(col)
            .is_some_and(|block| block.check(kind, current))
    }

    /// Raw bytes of one cell.
    #[must_use]
    pub fn cell_bytes(&self, col: usize, row: usize) -> &[u8] {
        self.columns[col].row_bytes(row)
    }

    /// Overwrites one cell from raw bytes.
    pub(crate) fn write_cell_bytes(&mut self, col: usize, row: usize, bytes: &[u8]) -> EcsResult<()> {
        self.columns
            .get_mut(col)
            .ok_or_else(|| EcsError::Corrupted(format!("column {col} out of range")))?
            .write_bytes(row, bytes)
    }

    /// Typed view of column `col`, occupied rows only.
    #[must_use]
    pub fn column<C: Component>(&self, col: usize) -> Option<&[C]> {
        let column = self.columns.get(col)?.as_any().downcast_ref::<Column<C>>()?;
        Some(column.as_slice(self.entities.len()))
    }

    /// Mutable typed view of column `col`, occupied rows only.
    pub fn column_mut<C: Component>(&mut self, col: usize) -> Option<&mut [C]> {
        let len = self.entities.len();
        let column = self
            .columns
            .get_mut(col)?
            .as_any_mut()
            .downcast_mut::<Column<C>>()?;
        Some(column.as_mut_slice(len))
    }

    /// Writes a typed value into one cell. Returns false on a type mismatch.
    pub(crate) fn write<C: Component>(&mut self, col: usize, row: usize, value: C) -> bool {
        match self.column_mut::<C>(col).and_then(|column| column.get_mut(row)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Borrows the chunk split by field, with `indices[i]` placed in slot `i`.
    ///
    /// Indices must be distinct; an index that appears twice keeps only the
    /// first slot filled.
    pub fn view_mut(&mut self, indices: &[usize]) -> ChunkViewMut<'_> {
        let mut columns: [Option<&mut dyn ColumnStorage>; MAX_QUERY_TERMS] =
            std::array::from_fn(|_| None);
        for (col, column) in self.columns.iter_mut().enumerate() {
            if let Some(slot) = indices.iter().position(|&wanted| wanted == col) {
                if slot < MAX_QUERY_TERMS {
                    columns[slot] = Some(&mut **column);
                }
            }
        }
        let len = self.entities.len();
        ChunkViewMut {
            entities: &self.entities[..len],
            changes: &mut self.changes,
            rows: &mut self.rows,
            columns,
        }
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("len", &self.entities.len())
            .field("capacity", &self.capacity)
            .field("columns", &self.columns.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::ComponentRegistry;
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Speed(f32);
    impl Component for Speed {}

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Fuel(u32);
    impl Component for Fuel {}

    fn chunk(capacity: usize, row_tracking: bool) -> Chunk {
        let mut registry = ComponentRegistry::default();
        let infos = [
            registry.register::<Speed>().unwrap(),
            registry.register::<Fuel>().unwrap(),
        ];
        Chunk::new(&infos, capacity, row_tracking)
    }

    #[test]
    fn test_push_and_write() {
        let mut chunk = chunk(4, true);
        let row = chunk.push(Entity::new(1, 0));
        assert!(chunk.write(0, row, Speed(3.0)));
        assert!(!chunk.write(0, row, Fuel(1)));

        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk.column::<Speed>(0), Some(&[Speed(3.0)][..]));
        assert_eq!(chunk.column::<Fuel>(1), Some(&[Fuel(0)][..]));
    }

    #[test]
    fn test_flags_chunk_and_row() {
        let mut chunk = chunk(4, true);
        chunk.push(Entity::new(1, 0));
        chunk.push(Entity::new(2, 0));
        chunk.set_flag(1, ChangeKind::Changed, 8, Some(1));

        assert!(chunk.check_flag(1, ChangeKind::Changed, 9));
        assert!(!chunk.check_flag(0, ChangeKind::Changed, 9));
        assert_eq!(chunk.row_stamps(1, 1).map(|s| s.changed), Some(8));
        assert_eq!(chunk.row_stamps(1, 0).map(|s| s.changed), Some(0));
    }

    #[test]
    fn test_no_row_stamps_without_tracking() {
        let mut chunk = chunk(2, false);
        chunk.push(Entity::new(1, 0));
        chunk.set_flag(0, ChangeKind::Added, 3, Some(0));
        assert!(chunk.row_stamps(0, 0).is_none());
        assert!(chunk.check_flag(0, ChangeKind::Added, 3));
    }

    #[test]
    fn test_view_mut_splits_columns() {
        let mut chunk = chunk(2, false);
        chunk.push(Entity::new(5, 0));
        let view = chunk.view_mut(&[1, 0]);
        assert_eq!(view.entities, &[Entity::new(5, 0)]);
        assert!(view.columns[0].is_some());
        assert!(view.columns[1].is_some());
        assert!(view.columns[2].is_none());
    }
}
