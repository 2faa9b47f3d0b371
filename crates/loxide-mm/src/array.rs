//! Growable array backing byte buffers, line tables and constant pools.

use core::slice;

use crate::{grow_capacity, Allocator, MmResult};

/// Append-only growable array with an explicit, geometrically growing capacity.
///
/// `len() <= capacity()` always holds. The capacity is the one accounted by
/// the [`Allocator`], independent of what the host allocator rounded up to.
///
/// Not `Clone`: a copy would hold storage the allocator never accounted.
///
/// ```compile_fail
/// let code = loxide_mm::DynArray::<u8>::new();
/// let _copy = code.clone();
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct DynArray<T> {
    data: Vec<T>,
    capacity: usize,
}

impl<T> Default for DynArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DynArray<T> {
    /// Empty array without storage.
    pub const fn new() -> Self {
        Self { data: Vec::new(), capacity: 0 }
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Accounted capacity.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// True when nothing was appended since creation or the last reset.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Stored elements, in append order.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Iterates in append order.
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.data.iter()
    }

    /// Appends `item`, growing capacity first when full.
    ///
    /// # Errors
    /// Propagates [`crate::MmError::OutOfMemory`]; the array is unchanged.
    pub fn push(&mut self, alloc: &mut Allocator, item: T) -> MmResult<()> {
        if self.data.len() == self.capacity {
            let new_capacity = grow_capacity(self.capacity);
            alloc.reallocate(&mut self.data, self.capacity, new_capacity)?;
            self.capacity = new_capacity;
        }
        self.data.push(item);
        Ok(())
    }

    /// Removes the last element. Capacity is kept.
    pub fn pop(&mut self) -> Option<T> {
        self.data.pop()
    }

    /// Drops content and releases backing storage.
    pub fn reset(&mut self, alloc: &mut Allocator) {
        alloc.free(&mut self.data, self.capacity);
        self.capacity = 0;
    }
}

impl<T: Copy> DynArray<T> {
    /// Element at `index`, `None` past the end.
    pub fn get(&self, index: usize) -> Option<T> {
        self.data.get(index).copied()
    }
}

impl<'a, T> IntoIterator for &'a DynArray<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
