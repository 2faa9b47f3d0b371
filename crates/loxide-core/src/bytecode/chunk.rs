//! Bytecode chunk: code bytes, per-byte source lines and a constant pool.

use core::{ops::Range, slice};

use loxide_mm::{Allocator, DynArray, MmError};

use super::OpCode;
use crate::{value::Value, Diagnostic, Error, Result};

/// Constant pool with stable indices (0-based, in insertion order).
///
/// No deduplication: adding the same value twice yields two indices.
#[derive(Debug, Default, PartialEq)]
pub struct ConstPool {
    values: DynArray<Value>,
}

impl ConstPool {
    /// Empty pool; allocates nothing.
    pub const fn new() -> Self {
        Self { values: DynArray::new() }
    }

    /// Number of stored constants.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no constant has been added.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Accounted capacity.
    pub const fn capacity(&self) -> usize {
        self.values.capacity()
    }

    /// Appends `value` and returns its index.
    ///
    /// # Errors
    /// [`MmError::OutOfMemory`] if the pool cannot grow; the pool is unchanged.
    pub fn add(&mut self, alloc: &mut Allocator, value: Value) -> Result<u32> {
        let index = u32::try_from(self.values.len())
            .map_err(|_| MmError::OutOfMemory { requested: self.values.len() })?;
        self.values.push(alloc, value)?;
        Ok(index)
    }

    /// Lookup a constant by index.
    ///
    /// # Errors
    /// [`Error::IndexOutOfRange`] past the end of the pool.
    pub fn get(&self, index: usize) -> Result<Value> {
        self.values.get(index).ok_or(Error::IndexOutOfRange {
            what: "constant",
            index,
            len: self.values.len(),
        })
    }

    /// Iterate as `(index, value)`.
    pub fn iter(&self) -> ConstIter<'_> {
        ConstIter { inner: self.values.iter().enumerate() }
    }

    /// Releases the storage; previously returned indices become invalid.
    pub fn free(&mut self, alloc: &mut Allocator) {
        self.values.reset(alloc);
    }
}

/// Iterator returned by [`ConstPool::iter`].
pub struct ConstIter<'a> {
    inner: core::iter::Enumerate<slice::Iter<'a, Value>>,
}

impl Iterator for ConstIter<'_> {
    type Item = (usize, Value);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(i, v)| (i, *v))
    }
}

impl<'a> IntoIterator for &'a ConstPool {
    type Item = (usize, Value);
    type IntoIter = ConstIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Source line of every code byte.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LineTable {
    lines: DynArray<u32>,
}

impl LineTable {
    /// Empty table.
    pub const fn new() -> Self {
        Self { lines: DynArray::new() }
    }

    /// Number of recorded bytes.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True for an empty chunk.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line recorded for the byte at `offset`.
    pub fn line_for(&self, offset: usize) -> Option<u32> {
        self.lines.get(offset)
    }

    /// Contiguous runs of the same line, as `(offsets, line)`.
    pub fn iter_ranges(&self) -> LineRangeIter<'_> {
        LineRangeIter { lines: self.lines.as_slice(), index: 0 }
    }
}

/// Iterator returned by [`LineTable::iter_ranges`].
pub struct LineRangeIter<'a> {
    lines: &'a [u32],
    index: usize,
}

impl Iterator for LineRangeIter<'_> {
    type Item = (Range<usize>, u32);

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.index;
        let line = *self.lines.get(start)?;
        self.index += 1;
        while self.lines.get(self.index) == Some(&line) {
            self.index += 1;
        }
        Some((start..self.index, line))
    }
}

/// Unit of compiled code.
///
/// `code().len() == lines().len()` at all times: every byte carries the line
/// it was emitted for.
///
/// A chunk owns accounted storage, so it cannot be duplicated behind the
/// allocator's back:
///
/// ```compile_fail
/// let chunk = loxide_core::Chunk::new();
/// let _copy = chunk.clone();
/// ```
#[derive(Debug, Default, PartialEq)]
pub struct Chunk {
    code: DynArray<u8>,
    lines: LineTable,
    constants: ConstPool,
}

impl Chunk {
    /// Empty chunk; allocates nothing until the first write.
    pub const fn new() -> Self {
        Self { code: DynArray::new(), lines: LineTable::new(), constants: ConstPool::new() }
    }

    /// Appends one byte emitted for source `line`.
    ///
    /// # Errors
    /// [`MmError::OutOfMemory`]; the chunk is unchanged.
    pub fn write(&mut self, alloc: &mut Allocator, byte: u8, line: u32) -> Result<()> {
        self.code.push(alloc, byte)?;
        if let Err(e) = self.lines.lines.push(alloc, line) {
            self.code.pop();
            return Err(e.into());
        }
        Ok(())
    }

    /// Appends an opcode byte.
    ///
    /// # Errors
    /// See [`Chunk::write`].
    pub fn write_op(&mut self, alloc: &mut Allocator, op: OpCode, line: u32) -> Result<()> {
        self.write(alloc, op.into(), line)
    }

    /// Adds `value` to the pool and returns its index.
    ///
    /// # Errors
    /// [`MmError::OutOfMemory`]; the pool is unchanged.
    pub fn add_constant(&mut self, alloc: &mut Allocator, value: Value) -> Result<u32> {
        self.constants.add(alloc, value)
    }

    /// Releases code, lines and constants, leaving an empty chunk.
    pub fn free(&mut self, alloc: &mut Allocator) {
        self.code.reset(alloc);
        self.lines.lines.reset(alloc);
        self.constants.free(alloc);
    }

    // ───────────────────────────── Readers ─────────────────────────────

    /// Code byte at `offset`.
    ///
    /// # Errors
    /// [`Error::IndexOutOfRange`] past the end of the code.
    pub fn read_byte(&self, offset: usize) -> Result<u8> {
        self.code.get(offset).ok_or_else(|| self.out_of_code(offset))
    }

    /// Big-endian 16-bit operand starting at `offset`.
    ///
    /// # Errors
    /// [`Error::IndexOutOfRange`] if either byte is missing.
    pub fn read_u16(&self, offset: usize) -> Result<u16> {
        let hi = self.read_byte(offset)?;
        let lo = self.read_byte(offset + 1)?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    /// Source line of the byte at `offset`.
    ///
    /// # Errors
    /// [`Error::IndexOutOfRange`] past the end of the code.
    pub fn line_at(&self, offset: usize) -> Result<u32> {
        self.lines.line_for(offset).ok_or(Error::IndexOutOfRange {
            what: "line",
            index: offset,
            len: self.lines.len(),
        })
    }

    /// Pool entry at `index`.
    ///
    /// # Errors
    /// [`Error::IndexOutOfRange`] past the end of the pool.
    pub fn constant(&self, index: usize) -> Result<Value> {
        self.constants.get(index)
    }

    /// Raw code bytes.
    pub fn code(&self) -> &[u8] {
        self.code.as_slice()
    }

    /// Number of code bytes.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// True when no byte has been written.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Per-byte source lines.
    pub const fn lines(&self) -> &LineTable {
        &self.lines
    }

    /// Constant pool.
    pub const fn constants(&self) -> &ConstPool {
        &self.constants
    }

    /// Pairs `error` with the line recorded for `offset`.
    pub fn diagnostic(&self, offset: usize, error: Error) -> Diagnostic {
        Diagnostic { line: self.line_at(offset).ok(), error }
    }

    fn out_of_code(&self, offset: usize) -> Error {
        Error::IndexOutOfRange { what: "code", index: offset, len: self.code.len() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loxide_mm::AllocConfig;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn constants_get_sequential_indices() {
        let mut alloc = Allocator::default();
        let mut chunk = Chunk::new();
        assert_eq!(chunk.add_constant(&mut alloc, Value::Number(1.2)).unwrap(), 0);
        assert_eq!(chunk.add_constant(&mut alloc, Value::Number(3.4)).unwrap(), 1);
        assert_eq!(chunk.add_constant(&mut alloc, Value::Number(1.2)).unwrap(), 2);
        assert_eq!(chunk.constant(2), Ok(Value::Number(1.2)));
        assert_eq!(
            chunk.constant(3),
            Err(Error::IndexOutOfRange { what: "constant", index: 3, len: 3 })
        );
    }

    #[test]
    fn bytes_and_lines_stay_paired() {
        let mut alloc = Allocator::default();
        let mut chunk = Chunk::new();
        chunk.write_op(&mut alloc, OpCode::Constant, 123).unwrap();
        chunk.write(&mut alloc, 0, 123).unwrap();
        chunk.write_op(&mut alloc, OpCode::Return, 124).unwrap();

        assert_eq!(chunk.code(), &[0x00, 0x00, 0x01]);
        assert_eq!(chunk.line_at(1), Ok(123));
        assert_eq!(chunk.line_at(2), Ok(124));
        assert_eq!(chunk.lines().len(), chunk.len());
        let ranges: Vec<_> = chunk.lines().iter_ranges().collect();
        assert_eq!(ranges, vec![(0..2, 123), (2..3, 124)]);
    }

    #[test]
    fn readers_are_bounds_checked() {
        let mut alloc = Allocator::default();
        let mut chunk = Chunk::new();
        chunk.write_op(&mut alloc, OpCode::Jump, 1).unwrap();
        chunk.write(&mut alloc, 0x01, 1).unwrap();
        chunk.write(&mut alloc, 0x02, 1).unwrap();

        assert_eq!(chunk.read_u16(1), Ok(0x0102));
        assert_eq!(
            chunk.read_u16(2),
            Err(Error::IndexOutOfRange { what: "code", index: 3, len: 3 })
        );
        assert!(chunk.read_byte(3).is_err());
        assert!(chunk.line_at(3).is_err());
    }

    #[test]
    fn diagnostic_carries_line() {
        let mut alloc = Allocator::default();
        let mut chunk = Chunk::new();
        chunk.write(&mut alloc, 0xEE, 7).unwrap();
        let err = OpCode::try_from(chunk.read_byte(0).unwrap()).unwrap_err();
        let d = chunk.diagnostic(0, err);
        assert_eq!(d.to_string(), "[line 7] error: unknown opcode 0xEE");
        assert_eq!(chunk.diagnostic(9, Error::UnknownOpcode { byte: 1 }).line, None);
    }

    #[test]
    fn free_returns_every_byte() {
        let mut alloc = Allocator::default();
        let mut chunk = Chunk::new();
        for i in 0..100u32 {
            chunk.write(&mut alloc, 1, i).unwrap();
            chunk.add_constant(&mut alloc, Value::Number(f64::from(i))).unwrap();
        }
        assert!(alloc.bytes_allocated() > 0);
        chunk.free(&mut alloc);
        assert!(chunk.is_empty());
        assert!(chunk.constants().is_empty());
        assert_eq!(alloc.bytes_allocated(), 0);
    }

    #[test]
    fn budget_failure_keeps_content() {
        // 8 code bytes and their lines take 40 bytes; growing the line table overflows.
        let mut alloc = Allocator::new(AllocConfig::default().with_max_bytes(48));
        let mut chunk = Chunk::new();
        for b in 0..8 {
            chunk.write(&mut alloc, b, 1).unwrap();
        }
        let err = chunk.write(&mut alloc, 8, 1).unwrap_err();
        assert!(err.is_out_of_memory());
        assert_eq!(chunk.code(), &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(chunk.lines().len(), 8);
    }

    proptest! {
        #[test]
        fn pool_indices_follow_insertion(values in proptest::collection::vec(any::<i32>(), 0..300)) {
            let mut alloc = Allocator::default();
            let mut chunk = Chunk::new();
            for (i, &n) in values.iter().enumerate() {
                let idx = chunk.add_constant(&mut alloc, Value::Number(f64::from(n))).unwrap();
                prop_assert_eq!(idx as usize, i);
            }
            for (i, v) in chunk.constants() {
                prop_assert_eq!(v, Value::Number(f64::from(values[i])));
            }
        }
    }
}
