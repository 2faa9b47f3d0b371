//! Instruction set.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Error;

/// Operand layout that follows an opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpFormat {
    /// No operand.
    Simple,
    /// One-byte constant-pool index.
    Constant,
    /// One raw byte (slot, upvalue index or argument count).
    Byte,
    /// Two-byte big-endian offset, forward.
    Jump,
    /// Two-byte big-endian offset, backward.
    Loop,
    /// Constant index of a function, then one `(is_local, index)` pair per upvalue.
    Closure,
}

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $name:ident = $byte:literal, $mnemonic:literal, $format:ident; )*) => {
        /// One-byte operation code.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub enum OpCode {
            $( $(#[$doc])* $name = $byte, )*
        }

        impl OpCode {
            /// Every opcode, in encoding order.
            pub const ALL: &'static [Self] = &[$(Self::$name),*];

            /// Listing name, e.g. `OP_CONSTANT`.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( Self::$name => $mnemonic, )*
                }
            }

            /// Operand layout following the opcode byte.
            pub const fn format(self) -> OpFormat {
                match self {
                    $( Self::$name => OpFormat::$format, )*
                }
            }
        }

        impl TryFrom<u8> for OpCode {
            type Error = Error;

            fn try_from(byte: u8) -> Result<Self, Error> {
                match byte {
                    $( $byte => Ok(Self::$name), )*
                    _ => Err(Error::UnknownOpcode { byte }),
                }
            }
        }
    };
}

opcodes! {
    /// Push a constant.
    Constant     = 0x00, "OP_CONSTANT",      Constant;
    /// Return from the current function.
    Return       = 0x01, "OP_RETURN",        Simple;
    /// Push `nil`.
    Nil          = 0x02, "OP_NIL",           Simple;
    /// Push `true`.
    True         = 0x03, "OP_TRUE",          Simple;
    /// Push `false`.
    False        = 0x04, "OP_FALSE",         Simple;
    /// Discard the top of the stack.
    Pop          = 0x05, "OP_POP",           Simple;
    /// Push a local slot.
    GetLocal     = 0x06, "OP_GET_LOCAL",     Byte;
    /// Store into a local slot.
    SetLocal     = 0x07, "OP_SET_LOCAL",     Byte;
    /// Push a global; operand names it.
    GetGlobal    = 0x08, "OP_GET_GLOBAL",    Constant;
    /// Bind a new global.
    DefineGlobal = 0x09, "OP_DEFINE_GLOBAL", Constant;
    /// Assign an existing global.
    SetGlobal    = 0x0A, "OP_SET_GLOBAL",    Constant;
    /// Push a captured variable.
    GetUpvalue   = 0x0B, "OP_GET_UPVALUE",   Byte;
    /// Assign a captured variable.
    SetUpvalue   = 0x0C, "OP_SET_UPVALUE",   Byte;
    /// `==`
    Equal        = 0x0D, "OP_EQUAL",         Simple;
    /// `>`
    Greater      = 0x0E, "OP_GREATER",       Simple;
    /// `<`
    Less         = 0x0F, "OP_LESS",          Simple;
    /// `+`
    Add          = 0x10, "OP_ADD",           Simple;
    /// Binary `-`.
    Subtract     = 0x11, "OP_SUBTRACT",      Simple;
    /// `*`
    Multiply     = 0x12, "OP_MULTIPLY",      Simple;
    /// `/`
    Divide       = 0x13, "OP_DIVIDE",        Simple;
    /// `!`
    Not          = 0x14, "OP_NOT",           Simple;
    /// Unary `-`.
    Negate       = 0x15, "OP_NEGATE",        Simple;
    /// Print the top of the stack.
    Print        = 0x16, "OP_PRINT",         Simple;
    /// Unconditional forward jump.
    Jump         = 0x17, "OP_JUMP",          Jump;
    /// Forward jump taken when the top of the stack is falsey.
    JumpIfFalse  = 0x18, "OP_JUMP_IF_FALSE", Jump;
    /// Backward jump.
    Loop         = 0x19, "OP_LOOP",          Loop;
    /// Operand is the argument count.
    Call         = 0x1A, "OP_CALL",          Byte;
    /// Wrap a function constant in a closure.
    Closure      = 0x1B, "OP_CLOSURE",       Closure;
    /// Move the top local to the heap.
    CloseUpvalue = 0x1C, "OP_CLOSE_UPVALUE", Simple;
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op as Self
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn byte_encoding_roundtrips() {
        for (i, &op) in OpCode::ALL.iter().enumerate() {
            assert_eq!(usize::from(u8::from(op)), i);
            assert_eq!(OpCode::try_from(u8::from(op)), Ok(op));
        }
    }

    #[test]
    fn unknown_bytes_are_rejected() {
        let first_free = u8::try_from(OpCode::ALL.len()).unwrap();
        assert_eq!(OpCode::try_from(first_free), Err(Error::UnknownOpcode { byte: first_free }));
        assert_eq!(OpCode::try_from(0xFF), Err(Error::UnknownOpcode { byte: 0xFF }));
    }

    #[test]
    fn mnemonics_and_formats() {
        assert_eq!(OpCode::Constant.to_string(), "OP_CONSTANT");
        assert_eq!(OpCode::JumpIfFalse.mnemonic(), "OP_JUMP_IF_FALSE");
        assert_eq!(OpCode::Loop.format(), OpFormat::Loop);
        assert_eq!(OpCode::Call.format(), OpFormat::Byte);
        assert_eq!(OpCode::DefineGlobal.format(), OpFormat::Constant);
        assert_eq!(OpCode::Closure.format(), OpFormat::Closure);
    }
}
