//! Human-readable and structured disassembly of a [`Chunk`].
//!
//! The text form follows the classic listing layout:
//!
//! ```text
//! == test chunk ==
//! 0000  123 OP_CONSTANT         0 '1.2'
//! 0002    | OP_RETURN
//! ```
//!
//! The same rows are available as [`DisasmRow`] values (serializable with the
//! `serde` feature) for tools that want JSON instead of text.

use core::fmt::{self, Write};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{Chunk, OpCode, OpFormat};
use crate::{object::Heap, value::Value, Error, Result};

/// One captured upvalue of an `OP_CLOSURE`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UpvalueRef {
    /// Offset of the `(is_local, index)` pair.
    pub offset: usize,
    /// Captures a local of the enclosing function rather than one of its upvalues.
    pub is_local: bool,
    /// Slot or upvalue index in the enclosing function.
    pub index: u8,
}

/// Decoded operand of an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Operand {
    /// No operand.
    None,
    /// Pool index with the rendered constant.
    Constant {
        /// Pool index.
        index: u8,
        /// Rendered constant.
        value: String,
    },
    /// Raw byte operand.
    Byte {
        /// The byte.
        value: u8,
    },
    /// Raw 16-bit offset and the resolved target.
    Jump {
        /// Encoded offset.
        jump: u16,
        /// Offset the jump lands on.
        target: i64,
    },
    /// Function constant and the upvalues it captures.
    Closure {
        /// Pool index of the function.
        index: u8,
        /// Rendered function.
        value: String,
        /// One entry per captured variable.
        upvalues: Vec<UpvalueRef>,
    },
    /// Byte that is not an opcode.
    Unknown {
        /// The offending byte.
        byte: u8,
    },
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DisasmRow {
    /// Offset of the opcode byte.
    pub offset: usize,
    /// Source line of the opcode byte.
    pub line: u32,
    /// Same line as the previous byte.
    pub same_line: bool,
    /// `None` for an unknown opcode.
    pub op: Option<OpCode>,
    /// Decoded operand.
    pub operand: Operand,
    /// Encoded size in bytes, operands included.
    pub size: usize,
}

impl DisasmRow {
    /// Offset of the following instruction.
    pub const fn next_offset(&self) -> usize {
        self.offset + self.size
    }
}

impl fmt::Display for DisasmRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04} ", self.offset)?;
        if self.same_line {
            f.write_str("   | ")?;
        } else {
            write!(f, "{:4} ", self.line)?;
        }
        let name = self.op.map_or("", OpCode::mnemonic);
        match &self.operand {
            Operand::None => f.write_str(name),
            Operand::Constant { index, value } => write!(f, "{name:<16} {index:4} '{value}'"),
            Operand::Byte { value } => write!(f, "{name:<16} {value:4}"),
            Operand::Jump { target, .. } => write!(f, "{name:<16} {:4} -> {target}", self.offset),
            Operand::Closure { index, value, upvalues } => {
                write!(f, "{name:<16} {index:4} {value}")?;
                for up in upvalues {
                    let kind = if up.is_local { "local" } else { "upvalue" };
                    write!(f, "\n{:04}      |                     {kind} {}", up.offset, up.index)?;
                }
                Ok(())
            }
            Operand::Unknown { byte } => write!(f, "Unknown opcode {byte}"),
        }
    }
}

/// Decoder over one chunk. The heap, when given, is used to render object
/// constants and to find how many upvalues a closure captures.
pub struct Disassembler<'a> {
    chunk: &'a Chunk,
    heap: Option<&'a Heap>,
}

impl<'a> Disassembler<'a> {
    /// Decoder over `chunk`; pass the heap that owns its object constants.
    pub const fn new(chunk: &'a Chunk, heap: Option<&'a Heap>) -> Self {
        Self { chunk, heap }
    }

    /// Decodes the instruction starting at `offset`.
    ///
    /// # Errors
    /// [`crate::Error::IndexOutOfRange`] if the instruction is truncated.
    /// A closure fails with [`crate::Error::UnresolvedClosure`] without a heap,
    /// and with [`crate::Error::InvalidCast`] if its constant is not a function.
    pub fn decode(&self, offset: usize) -> Result<DisasmRow> {
        let chunk = self.chunk;
        let byte = chunk.read_byte(offset)?;
        let line = chunk.line_at(offset)?;
        let same_line = offset > 0 && chunk.line_at(offset - 1).ok() == Some(line);

        let Ok(op) = OpCode::try_from(byte) else {
            return Ok(DisasmRow {
                offset,
                line,
                same_line,
                op: None,
                operand: Operand::Unknown { byte },
                size: 1,
            });
        };

        let (operand, size) = match op.format() {
            OpFormat::Simple => (Operand::None, 1),
            OpFormat::Byte => (Operand::Byte { value: chunk.read_byte(offset + 1)? }, 2),
            OpFormat::Constant => {
                let index = chunk.read_byte(offset + 1)?;
                let value = self.render(chunk.constant(usize::from(index))?);
                (Operand::Constant { index, value }, 2)
            }
            OpFormat::Jump | OpFormat::Loop => {
                let jump = chunk.read_u16(offset + 1)?;
                let base = i64::try_from(offset + 3).unwrap_or(i64::MAX);
                let target = if op.format() == OpFormat::Loop {
                    base - i64::from(jump)
                } else {
                    base + i64::from(jump)
                };
                (Operand::Jump { jump, target }, 3)
            }
            OpFormat::Closure => {
                let index = chunk.read_byte(offset + 1)?;
                let constant = chunk.constant(usize::from(index))?;
                let value = self.render(constant);
                let count = self.upvalue_count(constant, offset)?;
                let mut upvalues = Vec::with_capacity(count);
                let mut at = offset + 2;
                for _ in 0..count {
                    let is_local = chunk.read_byte(at)? != 0;
                    let index = chunk.read_byte(at + 1)?;
                    upvalues.push(UpvalueRef { offset: at, is_local, index });
                    at += 2;
                }
                (Operand::Closure { index, value, upvalues }, at - offset)
            }
        };

        Ok(DisasmRow { offset, line, same_line, op: Some(op), operand, size })
    }

    /// Every instruction, in code order.
    ///
    /// # Errors
    /// See [`Disassembler::decode`].
    pub fn rows(&self) -> Result<Vec<DisasmRow>> {
        let mut rows = Vec::new();
        let mut offset = 0;
        while offset < self.chunk.len() {
            let row = self.decode(offset)?;
            offset = row.next_offset();
            rows.push(row);
        }
        Ok(rows)
    }

    fn render(&self, value: Value) -> String {
        match self.heap {
            Some(heap) => heap.display(value).to_string(),
            None => value.to_string(),
        }
    }

    fn upvalue_count(&self, constant: Value, offset: usize) -> Result<usize> {
        let heap = self.heap.ok_or(Error::UnresolvedClosure { offset })?;
        Ok(heap.as_function(constant.as_obj()?)?.upvalue_count)
    }
}

/// Renders the whole chunk under a `== name ==` header, one line per
/// instruction (closures add one line per captured upvalue).
///
/// # Errors
/// See [`Disassembler::decode`].
pub fn disassemble_chunk(chunk: &Chunk, heap: Option<&Heap>, name: &str) -> Result<String> {
    let mut out = String::new();
    let _ = writeln!(out, "== {name} ==");
    for row in Disassembler::new(chunk, heap).rows()? {
        let _ = writeln!(out, "{row}");
    }
    Ok(out)
}

/// Renders the instruction at `offset` and returns the offset of the next one.
///
/// # Errors
/// See [`Disassembler::decode`].
pub fn disassemble_instruction(
    chunk: &Chunk,
    heap: Option<&Heap>,
    offset: usize,
) -> Result<(String, usize)> {
    let row = Disassembler::new(chunk, heap).decode(offset)?;
    Ok((row.to_string(), row.next_offset()))
}
