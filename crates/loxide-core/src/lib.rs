//! loxide-core: data model of a clox-style bytecode virtual machine
//!
//! Provides:
//! - [`Value`] : tagged runtime value (bool, nil, number, object handle)
//! - [`Chunk`] : code bytes + per-byte source lines + [`ConstPool`]
//! - [`Heap`] : string, function, native and closure objects, linked in a
//!   live-object list a collector can walk
//! - a disassembler producing classic text listings or structured rows
//! - [`Error`] + alias [`Result<T>`]
//!
//! All storage grows through a [`loxide_mm::Allocator`], which accounts bytes,
//! enforces an optional budget and raises collection requests.
//!
//! Features:
//! - `serde` (default): derive on kinds, opcodes, config and disassembly rows
//! - `tracing` (default): allocation and heap events
//!
//! # Example
//! ```
//! use loxide_core::prelude::*;
//!
//! let mut heap = Heap::new();
//! let mut chunk = Chunk::new();
//! let alloc = heap.allocator_mut();
//! let constant = chunk.add_constant(alloc, Value::Number(1.2)).unwrap();
//! chunk.write_op(alloc, OpCode::Constant, 123).unwrap();
//! chunk.write(alloc, constant as u8, 123).unwrap();
//! chunk.write_op(alloc, OpCode::Return, 123).unwrap();
//!
//! let text = disassemble_chunk(&chunk, Some(&heap), "test chunk").unwrap();
//! assert_eq!(
//!     text,
//!     "== test chunk ==\n0000  123 OP_CONSTANT         0 '1.2'\n0002    | OP_RETURN\n"
//! );
//! chunk.free(heap.allocator_mut());
//! ```

#![deny(missing_docs)]

/* ─────────────────────────── Modules ─────────────────────────── */

pub mod bytecode;
pub mod error;
pub mod object;
pub mod value;

pub use bytecode::{disassemble_chunk, disassemble_instruction, Chunk, ConstPool, OpCode};
pub use error::{Diagnostic, Error, Result};
pub use object::{FunctionProto, Heap, NativeFn, ObjKind, ObjRef, Object};
pub use value::{Value, ValueKind};

pub use loxide_mm::{AllocConfig, Allocator, MmError};

/* ─────────────────────────── Prelude ─────────────────────────── */

pub mod prelude {
    //! Common imports.
    pub use super::{
        bytecode::{DisasmRow, Disassembler, Operand},
        disassemble_chunk, disassemble_instruction, AllocConfig, Allocator, Chunk, ConstPool,
        Diagnostic, Error, FunctionProto, Heap, NativeFn, ObjKind, ObjRef, Object, OpCode, Result,
        Value, ValueKind,
    };
}
