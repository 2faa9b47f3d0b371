//! Heap-object model: kinds, concrete object payloads and handles.
//!
//! Objects live in a [`Heap`]. Each one carries a header linking it to the
//! object allocated just before it, so the heap can walk every live
//! allocation from its head without a second registry.

use core::fmt;

use loxide_mm::Handle;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{bytecode::Chunk, value::Value};

mod heap;

pub use heap::{Heap, Objects, ValueDisplay};

/// Non-owning, generation-checked reference to a heap object.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(Handle);

impl ObjRef {
    pub(crate) const fn new(handle: Handle) -> Self {
        Self(handle)
    }

    pub(crate) const fn handle(self) -> Handle {
        self.0
    }

    /// Slot index in the heap (stable for the object's lifetime).
    pub const fn index(self) -> u32 {
        self.0.index()
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjRef({:?})", self.0)
    }
}

/// Kind tag of a heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ObjKind {
    /// [`ObjString`]
    String,
    /// [`ObjFunction`]
    Function,
    /// [`ObjNative`]
    Native,
    /// [`ObjClosure`]
    Closure,
}

impl fmt::Display for ObjKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::String => "string",
            Self::Function => "function",
            Self::Native => "native",
            Self::Closure => "closure",
        })
    }
}

/// Payload of a heap object. The variant is the kind tag.
///
/// Objects are created and released only by the [`Heap`], so they are not
/// `Clone`.
#[derive(Debug)]
pub enum Object {
    /// Immutable text.
    String(ObjString),
    /// Compiled function.
    Function(ObjFunction),
    /// Host function.
    Native(ObjNative),
    /// Function plus captures.
    Closure(ObjClosure),
}

impl Object {
    /// Kind tag, O(1).
    pub const fn kind(&self) -> ObjKind {
        match self {
            Self::String(_) => ObjKind::String,
            Self::Function(_) => ObjKind::Function,
            Self::Native(_) => ObjKind::Native,
            Self::Closure(_) => ObjKind::Closure,
        }
    }
}

// ───────────────────────────── Strings ─────────────────────────────

/// 32-bit FNV-1a.
pub fn hash_string(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

/// Immutable text with its precomputed hash.
#[derive(Debug, PartialEq, Eq)]
pub struct ObjString {
    chars: String,
    hash: u32,
}

impl ObjString {
    pub(crate) fn new(chars: String) -> Self {
        let hash = hash_string(chars.as_bytes());
        Self { chars, hash }
    }

    /// The text.
    pub fn as_str(&self) -> &str {
        &self.chars
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// True for `""`.
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// FNV-1a of the bytes, computed once at creation.
    pub const fn hash(&self) -> u32 {
        self.hash
    }

    pub(crate) fn storage_mut(&mut self) -> &mut String {
        &mut self.chars
    }
}

impl fmt::Display for ObjString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.chars)
    }
}

// ───────────────────────────── Callables ─────────────────────────────

/// Everything needed to allocate an [`ObjFunction`].
#[derive(Debug, Default)]
pub struct FunctionProto {
    /// Name string object; `None` for the top-level script.
    pub name: Option<ObjRef>,
    /// Number of declared parameters.
    pub arity: u8,
    /// Number of variables the function captures.
    pub upvalue_count: usize,
    /// Compiled body. Ownership moves into the function object.
    pub chunk: Chunk,
}

/// Compiled function.
#[derive(Debug)]
pub struct ObjFunction {
    /// Number of declared parameters.
    pub arity: u8,
    /// Number of variables the function captures.
    pub upvalue_count: usize,
    /// Body, owned by the function.
    pub chunk: Chunk,
    /// Name string object; `None` for the top-level script.
    pub name: Option<ObjRef>,
}

/// Host function: receives the call arguments, returns the result.
pub type NativeFn = fn(args: &[Value]) -> Value;

/// Host-provided callable.
#[derive(Clone)]
pub struct ObjNative {
    /// Name used when printing.
    pub name: &'static str,
    /// Host entry point.
    pub function: NativeFn,
}

impl fmt::Debug for ObjNative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjNative").field("name", &self.name).finish_non_exhaustive()
    }
}

impl ObjNative {
    /// Invokes the host function.
    pub fn call(&self, args: &[Value]) -> Value {
        (self.function)(args)
    }
}

/// Runtime wrapper of a function. Every callable the VM invokes is one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjClosure {
    /// Always designates an [`ObjFunction`].
    pub function: ObjRef,
}
