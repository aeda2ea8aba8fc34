//! # Column Storage
//!
//! One column holds one component type for every row of a chunk.
//!
//! - All rows are allocated when the chunk is created (zeroed)
//! - Access is O(1) by row index
//! - Typed access goes through a downcast, untyped moves go through bytes

use std::any::{type_name, Any};

use super::component::Component;
use crate::error::{EcsError, EcsResult};

/// Type-erased column interface used by chunks and structural moves.
pub trait ColumnStorage: Any + Send + Sync {
    /// Upcast for typed downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Number of rows the column can hold.
    fn capacity(&self) -> usize;

    /// Copies row `from` over row `to`.
    fn copy_within(&mut self, from: usize, to: usize);

    /// Copies `row` into `dst_row` of another column of the same component.
    fn copy_to(&self, row: usize, dst: &mut dyn ColumnStorage, dst_row: usize);

    /// Raw bytes of one row.
    fn row_bytes(&self, row: usize) -> &[u8];

    /// Overwrites one row from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::Corrupted`] when `bytes` is not exactly one value.
    fn write_bytes(&mut self, row: usize, bytes: &[u8]) -> EcsResult<()>;

    /// Zeroes one row.
    fn reset(&mut self, row: usize);
}

/// Fixed-capacity array of one component type.
pub struct Column<C: Component> {
    pub(crate) data: Box<[C]>,
}

impl<C: Component> Column<C> {
    /// Creates a zeroed column with `capacity` rows.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![C::zeroed(); capacity].into_boxed_slice(),
        }
    }

    /// The first `len` rows.
    #[inline]
    #[must_use]
    pub fn as_slice(&self, len: usize) -> &[C] {
        &self.data[..len.min(self.data.len())]
    }

    /// The first `len` rows, mutably.
    #[inline]
    pub fn as_mut_slice(&mut self, len: usize) -> &mut [C] {
        let len = len.min(self.data.len());
        &mut self.data[..len]
    }

    /// Value at `row`.
    #[inline]
    #[must_use]
    pub fn get(&self, row: usize) -> Option<&C> {
        self.data.get(row)
    }

    /// Mutable value at `row`.
    #[inline]
    pub fn get_mut(&mut self, row: usize) -> Option<&mut C> {
        self.data.get_mut(row)
    }
}

impl<C: Component> ColumnStorage for Column<C> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn copy_within(&mut self, from: usize, to: usize) {
        self.data[to] = self.data[from];
    }

    fn copy_to(&self, row: usize, dst: &mut dyn ColumnStorage, dst_row: usize) {
        if let Some(dst) = dst.as_any_mut().downcast_mut::<Self>() {
            dst.data[dst_row] = self.data[row];
            return;
        }
        let written = dst.write_bytes(dst_row, self.row_bytes(row));
        debug_assert!(written.is_ok(), "cell copied between columns of different size");
    }

    fn row_bytes(&self, row: usize) -> &[u8] {
        bytemuck::bytes_of(&self.data[row])
    }

    fn write_bytes(&mut self, row: usize, bytes: &[u8]) -> EcsResult<()> {
        let value = bytemuck::try_pod_read_unaligned::<C>(bytes).map_err(|_| {
            EcsError::Corrupted(format!(
                "{} takes {} bytes, got {}",
                type_name::<C>(),
                std::mem::size_of::<C>(),
                bytes.len()
            ))
        })?;
        self.data[row] = value;
        Ok(())
    }

    fn reset(&mut self, row: usize) {
        self.data[row] = C::zeroed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Temperature(f32);
    impl Component for Temperature {}

    #[test]
    fn test_column_starts_zeroed() {
        let column = Column::<Temperature>::new(4);
        assert_eq!(column.capacity(), 4);
        assert!(column.as_slice(4).iter().all(|t| t.0 == 0.0));
    }

    #[test]
    fn test_copy_to_typed_and_bytes() {
        let mut src = Column::<Temperature>::new(2);
        src.data[1] = Temperature(36.6);

        let mut dst: Box<dyn ColumnStorage> = Box::new(Column::<Temperature>::new(3));
        src.copy_to(1, dst.as_mut(), 2);
        assert_eq!(dst.row_bytes(2), bytemuck::bytes_of(&Temperature(36.6)));

        dst.reset(2);
        assert_eq!(dst.row_bytes(2), &[0; 4]);
    }

    #[test]
    fn test_write_bytes_rejects_wrong_length() {
        let mut column = Column::<Temperature>::new(1);
        assert!(matches!(column.write_bytes(0, &[1, 2]), Err(EcsError::Corrupted(_))));
        assert_eq!(column.data[0], Temperature(0.0));

        column.write_bytes(0, bytemuck::bytes_of(&Temperature(2.5))).unwrap();
        assert_eq!(column.data[0], Temperature(2.5));
    }

    #[test]
    fn test_copy_within() {
        let mut column = Column::<Temperature>::new(3);
        column.data[2] = Temperature(9.0);
        column.copy_within(2, 0);
        assert_eq!(column.get(0), Some(&Temperature(9.0)));
    }
}
