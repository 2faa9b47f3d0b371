//! Tagged runtime value.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{object::ObjRef, Error, Result};

/// One runtime datum. `Copy`, at most 16 bytes.
///
/// `Obj` is a non-owning handle: copying a value never transfers ownership of
/// the object it designates.
#[derive(Debug, Clone, Copy)]
pub enum Value {
    /// `true` / `false`.
    Bool(bool),
    /// Absence of value.
    Nil,
    /// IEEE-754 double.
    Number(f64),
    /// Reference into the heap.
    Obj(ObjRef),
}

/// Discriminant of a [`Value`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ValueKind {
    /// [`Value::Bool`]
    Bool,
    /// [`Value::Nil`]
    Nil,
    /// [`Value::Number`]
    Number,
    /// [`Value::Obj`]
    Obj,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bool => "bool",
            Self::Nil => "nil",
            Self::Number => "number",
            Self::Obj => "object",
        })
    }
}

impl Value {
    /// Discriminant.
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Nil => ValueKind::Nil,
            Self::Number(_) => ValueKind::Number,
            Self::Obj(_) => ValueKind::Obj,
        }
    }

    /// True for `Bool`.
    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    /// True for `Nil`.
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// True for `Number`.
    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    /// True for `Obj`.
    pub const fn is_obj(&self) -> bool {
        matches!(self, Self::Obj(_))
    }

    /// Nil and `false` are falsey, everything else is truthy.
    pub const fn is_falsey(&self) -> bool {
        matches!(self, Self::Nil | Self::Bool(false))
    }

    /// # Errors
    /// [`Error::TypeMismatch`] unless this is a `Bool`.
    pub const fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(mismatch(ValueKind::Bool, other)),
        }
    }

    /// # Errors
    /// [`Error::TypeMismatch`] unless this is a `Number`.
    pub const fn as_number(&self) -> Result<f64> {
        match self {
            Self::Number(n) => Ok(*n),
            other => Err(mismatch(ValueKind::Number, other)),
        }
    }

    /// # Errors
    /// [`Error::TypeMismatch`] unless this is an `Obj`.
    pub const fn as_obj(&self) -> Result<ObjRef> {
        match self {
            Self::Obj(r) => Ok(*r),
            other => Err(mismatch(ValueKind::Obj, other)),
        }
    }
}

const fn mismatch(expected: ValueKind, found: &Value) -> Error {
    Error::TypeMismatch { expected, found: found.kind() }
}

/// Numbers use IEEE-754 `==` (NaN is unequal to itself, `-0.0 == 0.0`);
/// objects compare by handle identity. Use `Heap::values_equal` for the
/// language-level equality that compares strings by content.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Nil, Self::Nil) => true,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Obj(a), Self::Obj(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}
impl From<ObjRef> for Value {
    fn from(v: ObjRef) -> Self {
        Self::Obj(v)
    }
}
impl From<()> for Value {
    fn from((): ()) -> Self {
        Self::Nil
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;
    fn try_from(v: Value) -> Result<Self> {
        v.as_bool()
    }
}
impl TryFrom<Value> for f64 {
    type Error = Error;
    fn try_from(v: Value) -> Result<Self> {
        v.as_number()
    }
}
impl TryFrom<Value> for ObjRef {
    type Error = Error;
    fn try_from(v: Value) -> Result<Self> {
        v.as_obj()
    }
}

/// Heap-free rendering. Objects print as `<obj #slot>`; resolve them with
/// `Heap::display` to get their contents.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Nil => f.write_str("nil"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Obj(r) => write!(f, "<obj #{}>", r.index()),
        }
    }
}

/// Formats like C's `printf("%g", n)`: six significant digits, exponent form
/// when the exponent is below -4 or at least 6, trailing zeros removed.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.into();
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.into();
    }

    let sci = format!("{n:.5e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    if !(-4..6).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exp.unsigned_abs())
    } else {
        let decimals = usize::try_from(5 - exp).unwrap_or(0);
        trim_fraction(&format!("{n:.decimals$}")).to_owned()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
