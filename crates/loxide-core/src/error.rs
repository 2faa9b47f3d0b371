//! Error taxonomy of the core.

use core::fmt;

use loxide_mm::MmError;
use thiserror::Error;

use crate::{object::ObjKind, value::ValueKind};

/// Failures surfaced by values, chunks and the heap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Allocation refused or stale object handle.
    #[error(transparent)]
    Memory(#[from] MmError),

    /// A value was extracted as the wrong variant.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Variant the caller asked for.
        expected: ValueKind,
        /// Variant actually held.
        found: ValueKind,
    },

    /// A heap object was down-cast to the wrong kind.
    #[error("invalid cast: expected {expected} object, found {found}")]
    InvalidCast {
        /// Kind the caller asked for.
        expected: ObjKind,
        /// Kind actually stored.
        found: ObjKind,
    },

    /// Read past the end of a code buffer, line table or constant pool.
    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        /// Which store was read.
        what: &'static str,
        /// Requested index.
        index: usize,
        /// Current length of the store.
        len: usize,
    },

    /// `OP_CLOSURE` decoded without a heap: the number of upvalue pairs that
    /// follow is unknown.
    #[error("closure at offset {offset} needs a heap to decode its upvalues")]
    UnresolvedClosure {
        /// Offset of the instruction.
        offset: usize,
    },

    /// Byte does not encode any opcode.
    #[error("unknown opcode 0x{byte:02X}")]
    UnknownOpcode {
        /// The offending byte.
        byte: u8,
    },
}

impl Error {
    /// True for allocation failures (the unit must be abandoned).
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::Memory(MmError::OutOfMemory { .. }))
    }
}

/// Result alias for the core.
pub type Result<T> = core::result::Result<T, Error>;

/// An [`Error`] paired with the source line recorded for the offending byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Line recorded at emission time, if the offset was valid.
    pub line: Option<u32>,
    /// The failure.
    pub error: Error,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "[line {line}] error: {}", self.error),
            None => write!(f, "error: {}", self.error),
        }
    }
}

impl std::error::Error for Diagnostic {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
