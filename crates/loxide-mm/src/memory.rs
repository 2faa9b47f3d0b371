//! Allocator facade.
//!
//! All storage owned by chunks, pools and heap objects is resized through
//! [`Allocator::reallocate`]. The facade keeps a running byte count, enforces
//! an optional budget and raises a collection request once the count crosses
//! the current threshold. The collector itself lives elsewhere: it polls
//! [`Allocator::take_collect_request`] and reports back with
//! [`Allocator::collected`].

use std::collections::TryReserveError;

use crate::{MmError, MmResult};

/// Capacity policy shared by every growable store: 8 slots first, then doubling.
pub const fn grow_capacity(capacity: usize) -> usize {
    if capacity < 8 {
        8
    } else {
        capacity.saturating_mul(2)
    }
}

// ───────────────────────────── Configuration ─────────────────────────────

/// Tuning knobs for an [`Allocator`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AllocConfig {
    /// Hard budget in bytes. `None` leaves the host allocator as the only limit.
    pub max_bytes: Option<usize>,
    /// Byte count that raises the first collection request.
    pub initial_gc_threshold: usize,
    /// After a collection the next threshold is `live_bytes * heap_grow_factor`.
    pub heap_grow_factor: usize,
    /// Request a collection on every growth.
    pub stress_gc: bool,
}

impl Default for AllocConfig {
    fn default() -> Self {
        Self {
            max_bytes: None,
            initial_gc_threshold: 1024 * 1024,
            heap_grow_factor: 2,
            stress_gc: false,
        }
    }
}

impl AllocConfig {
    /// Sets a hard byte budget.
    #[must_use]
    pub const fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }
    /// Sets the first collection threshold.
    #[must_use]
    pub const fn with_gc_threshold(mut self, bytes: usize) -> Self {
        self.initial_gc_threshold = bytes;
        self
    }
    /// Sets the threshold multiplier applied after a collection.
    #[must_use]
    pub const fn with_heap_grow_factor(mut self, factor: usize) -> Self {
        self.heap_grow_factor = factor;
        self
    }
    /// Enables or disables stress mode.
    #[must_use]
    pub const fn with_stress_gc(mut self, on: bool) -> Self {
        self.stress_gc = on;
        self
    }
}

// ───────────────────────────── Storage ─────────────────────────────

/// Backing store the facade knows how to resize.
pub trait Storage {
    /// Size in bytes of one element.
    const ELEM_SIZE: usize;

    /// Resizes to hold exactly `capacity` elements, keeping the overlapping prefix.
    ///
    /// # Errors
    /// Returns the host allocator's refusal unchanged.
    fn try_resize(&mut self, capacity: usize) -> Result<(), TryReserveError>;

    /// Drops content and backing storage.
    fn release(&mut self);
}

impl<T> Storage for Vec<T> {
    const ELEM_SIZE: usize = core::mem::size_of::<T>();

    fn try_resize(&mut self, capacity: usize) -> Result<(), TryReserveError> {
        if capacity < self.len() {
            self.truncate(capacity);
        }
        if capacity > self.capacity() {
            self.try_reserve_exact(capacity - self.len())
        } else {
            self.shrink_to(capacity);
            Ok(())
        }
    }

    fn release(&mut self) {
        *self = Vec::new();
    }
}

impl Storage for String {
    const ELEM_SIZE: usize = 1;

    fn try_resize(&mut self, capacity: usize) -> Result<(), TryReserveError> {
        if capacity < self.len() {
            let mut cut = capacity;
            while !self.is_char_boundary(cut) {
                cut -= 1;
            }
            self.truncate(cut);
        }
        if capacity > self.capacity() {
            self.try_reserve_exact(capacity - self.len())
        } else {
            self.shrink_to(capacity);
            Ok(())
        }
    }

    fn release(&mut self) {
        *self = String::new();
    }
}

// ───────────────────────────── Allocator ─────────────────────────────

/// Byte-accounting allocation seam. One per heap/session.
#[derive(Debug, Clone)]
pub struct Allocator {
    config: AllocConfig,
    bytes_allocated: usize,
    next_gc: usize,
    collect_requested: bool,
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new(AllocConfig::default())
    }
}

impl Allocator {
    /// Creates an allocator with no bytes accounted.
    pub fn new(config: AllocConfig) -> Self {
        let next_gc = config.initial_gc_threshold;
        Self { config, bytes_allocated: 0, next_gc, collect_requested: false }
    }

    /// Active configuration.
    pub const fn config(&self) -> &AllocConfig {
        &self.config
    }

    /// Bytes currently accounted to live storage.
    pub const fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Threshold that raises the next collection request.
    pub const fn next_gc(&self) -> usize {
        self.next_gc
    }

    /// True if a collection was requested and not yet taken.
    pub const fn collect_requested(&self) -> bool {
        self.collect_requested
    }

    /// Resizes `storage` from `old_capacity` to `new_capacity` elements.
    ///
    /// `new_capacity == 0` releases the storage and cannot fail. Any other size
    /// is checked against the budget before the host allocator is asked.
    ///
    /// # Errors
    /// [`MmError::OutOfMemory`] if the budget would be exceeded or the host
    /// allocator refuses. `storage` and the accounting are left unchanged.
    pub fn reallocate<S: Storage>(
        &mut self,
        storage: &mut S,
        old_capacity: usize,
        new_capacity: usize,
    ) -> MmResult<()> {
        if new_capacity == 0 {
            self.free(storage, old_capacity);
            return Ok(());
        }
        let old_size = old_capacity.saturating_mul(S::ELEM_SIZE);
        let new_size = new_capacity
            .checked_mul(S::ELEM_SIZE)
            .ok_or(MmError::OutOfMemory { requested: usize::MAX })?;

        self.account_checked(old_size, new_size)?;
        if storage.try_resize(new_capacity).is_err() {
            self.undo(old_size, new_size);
            #[cfg(feature = "tracing")]
            tracing::warn!(requested = new_size, "host allocator refused request");
            return Err(MmError::OutOfMemory { requested: new_size });
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(old_size, new_size, total = self.bytes_allocated, "reallocate");
        Ok(())
    }

    /// Releases `storage` whose accounted capacity was `old_capacity` elements.
    pub fn free<S: Storage>(&mut self, storage: &mut S, old_capacity: usize) {
        storage.release();
        let old_size = old_capacity.saturating_mul(S::ELEM_SIZE);
        self.bytes_allocated = self.bytes_allocated.saturating_sub(old_size);
        #[cfg(feature = "tracing")]
        tracing::trace!(old_size, total = self.bytes_allocated, "free");
    }

    /// Records a size change for storage the facade does not resize itself
    /// (buffers adopted from the caller). Shrinks are always accepted.
    ///
    /// # Errors
    /// [`MmError::OutOfMemory`] if a growth would exceed the budget.
    pub fn account(&mut self, old_size: usize, new_size: usize) -> MmResult<()> {
        self.account_checked(old_size, new_size)
    }

    /// Consumes a pending collection request.
    pub fn take_collect_request(&mut self) -> bool {
        core::mem::take(&mut self.collect_requested)
    }

    /// Re-arms the threshold once a collection left `bytes_allocated` live.
    pub fn collected(&mut self) {
        self.next_gc = self
            .bytes_allocated
            .saturating_mul(self.config.heap_grow_factor)
            .max(self.config.initial_gc_threshold);
        self.collect_requested = false;
        #[cfg(feature = "tracing")]
        tracing::debug!(live = self.bytes_allocated, next_gc = self.next_gc, "collection finished");
    }

    fn account_checked(&mut self, old_size: usize, new_size: usize) -> MmResult<()> {
        if new_size <= old_size {
            self.bytes_allocated = self.bytes_allocated.saturating_sub(old_size - new_size);
            return Ok(());
        }
        let total = self
            .bytes_allocated
            .checked_add(new_size - old_size)
            .ok_or(MmError::OutOfMemory { requested: new_size })?;
        if let Some(max) = self.config.max_bytes {
            if total > max {
                #[cfg(feature = "tracing")]
                tracing::warn!(requested = new_size, total, max, "allocation budget exhausted");
                return Err(MmError::OutOfMemory { requested: new_size });
            }
        }
        self.bytes_allocated = total;
        if self.config.stress_gc || total > self.next_gc {
            if !self.collect_requested {
                #[cfg(feature = "tracing")]
                tracing::debug!(total, next_gc = self.next_gc, "collection requested");
            }
            self.collect_requested = true;
        }
        Ok(())
    }

    fn undo(&mut self, old_size: usize, new_size: usize) {
        self.bytes_allocated = self.bytes_allocated.saturating_sub(new_size - old_size);
    }
}
