//! loxide-mm: memory toolkit shared by the loxide bytecode core
//!
//! - [`Allocator`] : the single reallocation seam (byte accounting, optional
//!   budget, collection requests)
//! - [`DynArray<T>`] : growable array with the geometric growth policy used by
//!   byte buffers, line tables and constant pools
//! - [`GenArena<T>`] : slot table with **generational handles** (stable while
//!   the element lives, detectably stale afterwards)
//!
//! Every growth goes through [`Allocator::reallocate`], so a caller that runs
//! out of budget gets [`MmError::OutOfMemory`] back instead of a process abort.
//!
//! # Example
//! ```
//! use loxide_mm::{Allocator, DynArray};
//! let mut alloc = Allocator::default();
//! let mut code = DynArray::<u8>::new();
//! code.push(&mut alloc, 0x01).unwrap();
//! assert_eq!(code.capacity(), 8);
//! assert_eq!(alloc.bytes_allocated(), 8);
//! ```

use core::{
    fmt,
    hash::{Hash, Hasher},
};

pub mod array;
pub mod memory;

pub use array::DynArray;
pub use memory::{grow_capacity, AllocConfig, Allocator, Storage};

// ───────────────────────────── Errors ─────────────────────────────

/// Low-level memory errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmError {
    /// The host allocator refused the request or the configured budget is exhausted.
    OutOfMemory {
        /// Size in bytes of the block that could not be provided.
        requested: usize,
    },
    /// Handle does not designate a live slot (released, or from another arena).
    InvalidHandle,
}

impl fmt::Display for MmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested } => write!(f, "out of memory ({requested} bytes requested)"),
            Self::InvalidHandle => write!(f, "stale or foreign handle"),
        }
    }
}

impl std::error::Error for MmError {}

/// Result alias for this crate.
pub type MmResult<T> = core::result::Result<T, MmError>;

// ───────────────────────── Generational handles ─────────────────────────

/// Index + generation into a [`GenArena`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Default)]
pub struct Handle {
    idx: u32,
    gen: u32,
}

impl Handle {
    /// Builds a handle from raw parts.
    pub const fn new(idx: u32, gen: u32) -> Self {
        Self { idx, gen }
    }
    /// Slot index.
    pub const fn index(self) -> u32 {
        self.idx
    }
    /// Generation of the slot at the time the handle was issued.
    pub const fn generation(self) -> u32 {
        self.gen
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h#{}@{}", self.idx, self.gen)
    }
}

impl PartialEq for Handle {
    fn eq(&self, o: &Self) -> bool {
        self.idx == o.idx && self.gen == o.gen
    }
}
impl Eq for Handle {}

impl Hash for Handle {
    fn hash<H: Hasher>(&self, h: &mut H) {
        self.idx.hash(h);
        self.gen.hash(h);
    }
}

#[derive(Debug)]
struct Slot<T> {
    gen: u32,
    val: Option<T>,
}

/// Slot table with generational handles.
///
/// Slot storage grows through the [`Allocator`]; a released slot bumps its
/// generation so handles issued before the release no longer resolve.
#[derive(Debug)]
pub struct GenArena<T> {
    slots: Vec<Slot<T>>,
    capacity: usize,
    free: Vec<u32>,
    len: u32,
}

impl<T> Default for GenArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> GenArena<T> {
    /// Empty arena, no storage reserved.
    pub const fn new() -> Self {
        Self { slots: Vec::new(), capacity: 0, free: Vec::new(), len: 0 }
    }
    /// Number of slots backed by storage.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
    /// Number of live elements.
    pub const fn len(&self) -> usize {
        self.len as usize
    }
    /// True when no element is live.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Makes sure the next [`GenArena::insert`] needs no allocation.
    ///
    /// # Errors
    /// [`MmError::OutOfMemory`] if slot storage cannot grow.
    pub fn reserve(&mut self, alloc: &mut Allocator) -> MmResult<()> {
        if self.free.is_empty() && self.slots.len() == self.capacity {
            let new_capacity = grow_capacity(self.capacity);
            alloc.reallocate(&mut self.slots, self.capacity, new_capacity)?;
            self.capacity = new_capacity;
        }
        Ok(())
    }

    /// Stores `v`, reusing a released slot when one exists.
    ///
    /// # Errors
    /// [`MmError::OutOfMemory`] if slot storage cannot grow; `v` is dropped.
    pub fn insert(&mut self, alloc: &mut Allocator, v: T) -> MmResult<Handle> {
        self.reserve(alloc)?;
        if let Some(idx) = self.free.pop() {
            let s = &mut self.slots[idx as usize];
            debug_assert!(s.val.is_none());
            s.val = Some(v);
            self.len += 1;
            return Ok(Handle::new(idx, s.gen));
        }
        let idx = u32::try_from(self.slots.len())
            .map_err(|_| MmError::OutOfMemory { requested: self.slots.len() })?;
        self.slots.push(Slot { gen: 0, val: Some(v) });
        self.len += 1;
        Ok(Handle::new(idx, 0))
    }

    /// True if `h` designates a live element.
    pub fn contains(&self, h: Handle) -> bool {
        self.get(h).is_some()
    }

    /// Shared access, `None` for a stale handle.
    pub fn get(&self, h: Handle) -> Option<&T> {
        self.slots
            .get(h.idx as usize)
            .filter(|s| s.gen == h.gen)
            .and_then(|s| s.val.as_ref())
    }

    /// Exclusive access, `None` for a stale handle.
    pub fn get_mut(&mut self, h: Handle) -> Option<&mut T> {
        if let Some(s) = self.slots.get_mut(h.idx as usize) {
            if s.gen == h.gen {
                return s.val.as_mut();
            }
        }
        None
    }

    /// Takes the element out and invalidates every handle to it.
    pub fn remove(&mut self, h: Handle) -> Option<T> {
        if let Some(s) = self.slots.get_mut(h.idx as usize) {
            if s.gen == h.gen && s.val.is_some() {
                self.len -= 1;
                s.gen = s.gen.wrapping_add(1);
                self.free.push(h.idx);
                return s.val.take();
            }
        }
        None
    }

    /// Drops every element. Slots and their generations are kept so handles
    /// issued before the call stay stale.
    pub fn clear(&mut self) {
        for (i, s) in self.slots.iter_mut().enumerate() {
            if s.val.take().is_some() {
                s.gen = s.gen.wrapping_add(1);
                self.free.push(i as u32);
            }
        }
        self.len = 0;
    }

    /// Live elements in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.val.as_ref().map(|v| (Handle::new(i as u32, s.gen), v)))
    }
}

// ───────────────────────────── Tests ─────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_handles_invalidate() {
        let mut alloc = Allocator::default();
        let mut a = GenArena::<i32>::new();
        let h = a.insert(&mut alloc, 7).unwrap();
        assert_eq!(a.get(h), Some(&7));
        let _ = a.remove(h).unwrap();
        assert!(a.get(h).is_none());
        let h2 = a.insert(&mut alloc, 8).unwrap();
        assert_eq!(h2.index(), h.index());
        assert_ne!(h, h2);
    }

    #[test]
    fn arena_grows_through_allocator() {
        let mut alloc = Allocator::default();
        let mut a = GenArena::<u64>::new();
        for i in 0..9 {
            a.insert(&mut alloc, i).unwrap();
        }
        assert_eq!(a.capacity(), 16);
        assert!(alloc.bytes_allocated() > 0);
        assert_eq!(a.len(), 9);
    }

    #[test]
    fn arena_clear_keeps_handles_stale() {
        let mut alloc = Allocator::default();
        let mut a = GenArena::<&str>::new();
        let h = a.insert(&mut alloc, "x").unwrap();
        a.clear();
        assert!(a.is_empty());
        assert!(!a.contains(h));
        let h2 = a.insert(&mut alloc, "y").unwrap();
        assert_ne!(h, h2);
        assert_eq!(a.get(h2), Some(&"y"));
    }

    #[test]
    fn budget_exhaustion_is_reported() {
        let mut alloc = Allocator::new(AllocConfig::default().with_max_bytes(16));
        let mut a = GenArena::<[u8; 64]>::new();
        let err = a.insert(&mut alloc, [0; 64]).unwrap_err();
        assert!(matches!(err, MmError::OutOfMemory { .. }));
        assert!(a.is_empty());
    }
}
