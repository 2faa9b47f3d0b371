//! Bytecode: instruction set, chunks and the disassembler.

pub mod chunk;
pub mod disasm;
pub mod op;

pub use chunk::{Chunk, ConstIter, ConstPool, LineRangeIter, LineTable};
pub use disasm::{
    disassemble_chunk, disassemble_instruction, DisasmRow, Disassembler, Operand, UpvalueRef,
};
pub use op::{OpCode, OpFormat};
