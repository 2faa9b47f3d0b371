//! Object heap: slot table, live-object list and the allocation entry points.

use core::fmt;

use loxide_mm::{AllocConfig, Allocator, GenArena, MmError};

use super::{
    FunctionProto, NativeFn, ObjClosure, ObjFunction, ObjKind, ObjNative, ObjRef, ObjString, Object,
};
use crate::{bytecode::Chunk, value::Value, Error, Result};

/// Header + payload stored in a slot.
#[derive(Debug)]
struct HeapObject {
    /// Object allocated just before this one.
    next: Option<ObjRef>,
    marked: bool,
    object: Object,
}

/// Owner of every heap object of one interpreter instance.
///
/// New objects are linked at the head of the live list; following the links
/// from [`Heap::head`] visits each live object once, newest first.
///
/// Headers live in the slot table, so their bytes are accounted when the
/// table grows; only payload storage (string text, chunks) is charged per object.
#[derive(Debug, Default)]
pub struct Heap {
    objects: GenArena<HeapObject>,
    head: Option<ObjRef>,
    alloc: Allocator,
}

impl Heap {
    /// Empty heap with the default [`AllocConfig`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty heap whose allocator uses `config`.
    pub fn with_config(config: AllocConfig) -> Self {
        Self { objects: GenArena::new(), head: None, alloc: Allocator::new(config) }
    }

    /// Byte accounting shared by every object of this heap.
    pub const fn allocator(&self) -> &Allocator {
        &self.alloc
    }

    /// The facade chunks must grow through while compiling.
    pub fn allocator_mut(&mut self) -> &mut Allocator {
        &mut self.alloc
    }

    /// Consumes a pending collection request raised by the allocator.
    pub fn take_collect_request(&mut self) -> bool {
        self.alloc.take_collect_request()
    }

    /// Number of live objects.
    pub const fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when no object is live.
    pub const fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Most recently allocated live object.
    pub const fn head(&self) -> Option<ObjRef> {
        self.head
    }

    /// Walks the live list from the head.
    pub fn objects(&self) -> Objects<'_> {
        Objects { heap: self, next: self.head }
    }

    // ───────────────────────────── Allocation ─────────────────────────────

    /// Wraps `chars` without copying; the object becomes its sole owner.
    ///
    /// # Errors
    /// [`Error::Memory`] if the budget is exhausted; `chars` is dropped.
    pub fn take_string(&mut self, chars: String) -> Result<ObjRef> {
        self.alloc.account(0, chars.len())?;
        self.link(Object::String(ObjString::new(chars)))
    }

    /// Copies `chars` into storage owned by the new object.
    ///
    /// # Errors
    /// [`Error::Memory`] if the copy or the header cannot be allocated.
    pub fn copy_string(&mut self, chars: &str) -> Result<ObjRef> {
        let mut owned = String::new();
        self.alloc.reallocate(&mut owned, 0, chars.len())?;
        owned.push_str(chars);
        self.link(Object::String(ObjString::new(owned)))
    }

    /// Allocates a function owning `proto.chunk`.
    ///
    /// # Errors
    /// [`Error::InvalidCast`] if `proto.name` is not a string,
    /// [`Error::Memory`] on allocation failure. The chunk is released either way.
    pub fn new_function(&mut self, proto: FunctionProto) -> Result<ObjRef> {
        let FunctionProto { name, arity, upvalue_count, mut chunk } = proto;
        if let Some(name) = name {
            if let Err(e) = self.expect_kind(name, ObjKind::String) {
                chunk.free(&mut self.alloc);
                return Err(e);
            }
        }
        self.link(Object::Function(ObjFunction { arity, upvalue_count, chunk, name }))
    }

    /// Allocates a host-function object.
    ///
    /// # Errors
    /// [`Error::Memory`] on allocation failure.
    pub fn new_native(&mut self, name: &'static str, function: NativeFn) -> Result<ObjRef> {
        self.link(Object::Native(ObjNative { name, function }))
    }

    /// Allocates a closure over `function`.
    ///
    /// # Errors
    /// [`Error::InvalidCast`] if `function` is not a function object.
    pub fn new_closure(&mut self, function: ObjRef) -> Result<ObjRef> {
        self.expect_kind(function, ObjKind::Function)?;
        self.link(Object::Closure(ObjClosure { function }))
    }

    fn link(&mut self, object: Object) -> Result<ObjRef> {
        if let Err(e) = self.objects.reserve(&mut self.alloc) {
            release_payload(&mut self.alloc, object);
            return Err(e.into());
        }

        #[cfg(feature = "tracing")]
        let kind = object.kind();
        let entry = HeapObject { next: self.head, marked: false, object };
        let r = ObjRef::new(self.objects.insert(&mut self.alloc, entry)?);
        self.head = Some(r);
        #[cfg(feature = "tracing")]
        tracing::trace!(obj = ?r, %kind, total = self.alloc.bytes_allocated(), "allocate");
        Ok(r)
    }

    /// Releases every object, newest first, and empties the live list.
    /// Handles issued before the call become stale.
    pub fn free_objects(&mut self) {
        let mut next = self.head.take();
        let mut freed = 0usize;
        while let Some(r) = next {
            let Some(entry) = self.objects.remove(r.handle()) else {
                break;
            };
            next = entry.next;
            release_payload(&mut self.alloc, entry.object);
            freed += 1;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(freed, remaining = self.alloc.bytes_allocated(), "heap released");
        #[cfg(not(feature = "tracing"))]
        let _ = freed;
    }

    // ───────────────────────────── Access ─────────────────────────────

    /// # Errors
    /// [`MmError::InvalidHandle`] for a stale handle.
    pub fn get(&self, r: ObjRef) -> Result<&Object> {
        self.entry(r).map(|e| &e.object)
    }

    /// Kind tag, O(1).
    ///
    /// # Errors
    /// [`MmError::InvalidHandle`] for a stale handle.
    pub fn kind_of(&self, r: ObjRef) -> Result<ObjKind> {
        self.get(r).map(Object::kind)
    }

    /// # Errors
    /// [`Error::InvalidCast`] unless `r` is a string.
    pub fn as_string(&self, r: ObjRef) -> Result<&ObjString> {
        match self.get(r)? {
            Object::String(s) => Ok(s),
            other => Err(cast(ObjKind::String, other)),
        }
    }

    /// # Errors
    /// [`Error::InvalidCast`] unless `r` is a function.
    pub fn as_function(&self, r: ObjRef) -> Result<&ObjFunction> {
        match self.get(r)? {
            Object::Function(f) => Ok(f),
            other => Err(cast(ObjKind::Function, other)),
        }
    }

    /// # Errors
    /// [`Error::InvalidCast`] unless `r` is a function.
    pub fn as_function_mut(&mut self, r: ObjRef) -> Result<&mut ObjFunction> {
        match &mut self.entry_mut(r)?.object {
            Object::Function(f) => Ok(f),
            other => Err(cast(ObjKind::Function, other)),
        }
    }

    /// A function's chunk together with the allocator it grows through.
    ///
    /// # Errors
    /// [`Error::InvalidCast`] unless `r` is a function.
    pub fn chunk_mut(&mut self, r: ObjRef) -> Result<(&mut Chunk, &mut Allocator)> {
        let entry = self
            .objects
            .get_mut(r.handle())
            .ok_or(Error::Memory(MmError::InvalidHandle))?;
        match &mut entry.object {
            Object::Function(f) => Ok((&mut f.chunk, &mut self.alloc)),
            other => Err(cast(ObjKind::Function, other)),
        }
    }

    /// # Errors
    /// [`Error::InvalidCast`] unless `r` is a native.
    pub fn as_native(&self, r: ObjRef) -> Result<&ObjNative> {
        match self.get(r)? {
            Object::Native(n) => Ok(n),
            other => Err(cast(ObjKind::Native, other)),
        }
    }

    /// # Errors
    /// [`Error::InvalidCast`] unless `r` is a closure.
    pub fn as_closure(&self, r: ObjRef) -> Result<&ObjClosure> {
        match self.get(r)? {
            Object::Closure(c) => Ok(c),
            other => Err(cast(ObjKind::Closure, other)),
        }
    }

    /// Mark bit reserved for a collector.
    ///
    /// # Errors
    /// [`MmError::InvalidHandle`] for a stale handle.
    pub fn is_marked(&self, r: ObjRef) -> Result<bool> {
        self.entry(r).map(|e| e.marked)
    }

    /// # Errors
    /// [`MmError::InvalidHandle`] for a stale handle.
    pub fn set_marked(&mut self, r: ObjRef, marked: bool) -> Result<()> {
        self.entry_mut(r)?.marked = marked;
        Ok(())
    }

    fn entry(&self, r: ObjRef) -> Result<&HeapObject> {
        self.objects.get(r.handle()).ok_or(Error::Memory(MmError::InvalidHandle))
    }

    fn entry_mut(&mut self, r: ObjRef) -> Result<&mut HeapObject> {
        self.objects.get_mut(r.handle()).ok_or(Error::Memory(MmError::InvalidHandle))
    }

    fn expect_kind(&self, r: ObjRef, expected: ObjKind) -> Result<()> {
        let found = self.kind_of(r)?;
        if found == expected {
            Ok(())
        } else {
            Err(Error::InvalidCast { expected, found })
        }
    }

    // ───────────────────────────── Values ─────────────────────────────

    /// Language-level equality: like `Value::eq`, except that two strings
    /// compare by content.
    pub fn values_equal(&self, a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::Obj(x), Value::Obj(y)) if x != y => {
                match (self.as_string(x), self.as_string(y)) {
                    (Ok(s), Ok(t)) => s.hash() == t.hash() && s.as_str() == t.as_str(),
                    _ => false,
                }
            }
            _ => a == b,
        }
    }

    /// Renders `value`, resolving object references.
    pub const fn display(&self, value: Value) -> ValueDisplay<'_> {
        ValueDisplay { heap: self, value }
    }
}

fn cast(expected: ObjKind, found: &Object) -> Error {
    Error::InvalidCast { expected, found: found.kind() }
}

fn release_payload(alloc: &mut Allocator, object: Object) {
    match object {
        Object::String(mut s) => {
            let len = s.len();
            alloc.free(s.storage_mut(), len);
        }
        Object::Function(mut f) => f.chunk.free(alloc),
        Object::Native(_) | Object::Closure(_) => {}
    }
}

/// Iterator over the live-object list, newest first.
pub struct Objects<'a> {
    heap: &'a Heap,
    next: Option<ObjRef>,
}

impl<'a> Iterator for Objects<'a> {
    type Item = (ObjRef, &'a Object);

    fn next(&mut self) -> Option<Self::Item> {
        let r = self.next?;
        let entry = self.heap.entry(r).ok()?;
        self.next = entry.next;
        Some((r, &entry.object))
    }
}

/// [`fmt::Display`] adapter returned by [`Heap::display`].
pub struct ValueDisplay<'a> {
    heap: &'a Heap,
    value: Value,
}

impl ValueDisplay<'_> {
    fn function(&self, f: &mut fmt::Formatter<'_>, function: &ObjFunction) -> fmt::Result {
        match function.name {
            None => f.write_str("<script>"),
            Some(name) => match self.heap.as_string(name) {
                Ok(name) => write!(f, "<fn {name}>"),
                Err(_) => f.write_str("<fn ?>"),
            },
        }
    }
}

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Value::Obj(r) = self.value else {
            return write!(f, "{}", self.value);
        };
        match self.heap.get(r) {
            Ok(Object::String(s)) => write!(f, "{s}"),
            Ok(Object::Function(function)) => self.function(f, function),
            Ok(Object::Native(_)) => f.write_str("<native fn>"),
            Ok(Object::Closure(c)) => match self.heap.as_function(c.function) {
                Ok(function) => self.function(f, function),
                Err(_) => f.write_str("<closure ?>"),
            },
            Err(_) => f.write_str("<dangling>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn clock(_: &[Value]) -> Value {
        Value::Number(0.0)
    }

    #[test]
    fn every_allocation_is_listed_once() {
        let mut heap = Heap::new();
        let a = heap.copy_string("a").unwrap();
        let b = heap.take_string(String::from("b")).unwrap();
        let n = heap.new_native("clock", clock).unwrap();
        let f = heap.new_function(FunctionProto::default()).unwrap();
        let c = heap.new_closure(f).unwrap();

        let listed: Vec<ObjRef> = heap.objects().map(|(r, _)| r).collect();
        assert_eq!(listed, vec![c, f, n, b, a]);
        assert_eq!(heap.head(), Some(c));
        assert_eq!(heap.len(), 5);
    }

    #[test]
    fn downcasts_are_checked() {
        let mut heap = Heap::new();
        let s = heap.copy_string("x").unwrap();
        assert_eq!(heap.kind_of(s), Ok(ObjKind::String));
        assert_eq!(heap.as_string(s).unwrap().as_str(), "x");
        assert_eq!(
            heap.as_function(s).unwrap_err(),
            Error::InvalidCast { expected: ObjKind::Function, found: ObjKind::String }
        );
        assert_eq!(
            heap.new_closure(s).unwrap_err(),
            Error::InvalidCast { expected: ObjKind::Function, found: ObjKind::String }
        );
        assert!(heap.as_native(s).is_err());
        assert!(heap.as_closure(s).is_err());
    }

    #[test]
    fn function_name_must_be_a_string() {
        let mut heap = Heap::new();
        let native = heap.new_native("clock", clock).unwrap();
        let proto = FunctionProto { name: Some(native), ..FunctionProto::default() };
        assert_eq!(
            heap.new_function(proto).unwrap_err(),
            Error::InvalidCast { expected: ObjKind::String, found: ObjKind::Native }
        );
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn free_objects_invalidates_handles() {
        let mut heap = Heap::new();
        let s = heap.copy_string("gone").unwrap();
        let before = heap.allocator().bytes_allocated();
        assert!(before > 0);
        heap.free_objects();
        assert!(heap.is_empty());
        assert_eq!(heap.head(), None);
        assert_eq!(heap.get(s).unwrap_err(), Error::Memory(MmError::InvalidHandle));
        assert!(heap.allocator().bytes_allocated() < before);
        assert_eq!(heap.display(Value::Obj(s)).to_string(), "<dangling>");
    }

    #[test]
    fn string_equality_is_by_content() {
        let mut heap = Heap::new();
        let a = heap.copy_string("same").unwrap();
        let b = heap.take_string("same".to_owned()).unwrap();
        let c = heap.copy_string("other").unwrap();
        assert_ne!(Value::Obj(a), Value::Obj(b));
        assert!(heap.values_equal(Value::Obj(a), Value::Obj(b)));
        assert!(!heap.values_equal(Value::Obj(a), Value::Obj(c)));
        assert!(heap.values_equal(Value::Number(1.0), Value::Number(1.0)));
        assert!(!heap.values_equal(Value::Obj(a), Value::Nil));

        let f = heap.new_function(FunctionProto::default()).unwrap();
        let g = heap.new_function(FunctionProto::default()).unwrap();
        assert!(heap.values_equal(Value::Obj(f), Value::Obj(f)));
        assert!(!heap.values_equal(Value::Obj(f), Value::Obj(g)));
    }

    #[test]
    fn objects_render_by_kind() {
        let mut heap = Heap::new();
        let name = heap.copy_string("fib").unwrap();
        let script = heap.new_function(FunctionProto::default()).unwrap();
        let fib = heap
            .new_function(FunctionProto { name: Some(name), arity: 1, ..FunctionProto::default() })
            .unwrap();
        let closure = heap.new_closure(fib).unwrap();
        let native = heap.new_native("clock", clock).unwrap();

        let show = |v: Value| heap.display(v).to_string();
        assert_eq!(show(Value::Obj(name)), "fib");
        assert_eq!(show(Value::Obj(script)), "<script>");
        assert_eq!(show(Value::Obj(fib)), "<fn fib>");
        assert_eq!(show(Value::Obj(closure)), "<fn fib>");
        assert_eq!(show(Value::Obj(native)), "<native fn>");
        assert_eq!(show(Value::Number(2.5)), "2.5");
    }

    #[test]
    fn budget_failure_leaves_list_intact() {
        let mut heap = Heap::with_config(AllocConfig::default().with_max_bytes(8192));
        let kept = heap.copy_string("ok").unwrap();
        let big = "x".repeat(16 * 1024);
        let err = heap.copy_string(&big).unwrap_err();
        assert!(err.is_out_of_memory());
        let err = heap.take_string(big).unwrap_err();
        assert!(err.is_out_of_memory());
        assert_eq!(heap.objects().map(|(r, _)| r).collect::<Vec<_>>(), vec![kept]);
    }

    #[test]
    fn chunk_mut_grows_through_heap_allocator() {
        let mut heap = Heap::new();
        let f = heap.new_function(FunctionProto::default()).unwrap();
        let before = heap.allocator().bytes_allocated();
        {
            let (chunk, alloc) = heap.chunk_mut(f).unwrap();
            chunk.write(alloc, 0x00, 1).unwrap();
        }
        assert!(heap.allocator().bytes_allocated() > before);
        assert_eq!(heap.as_function(f).unwrap().chunk.len(), 1);
        heap.as_function_mut(f).unwrap().arity = 2;
        assert_eq!(heap.as_function(f).unwrap().arity, 2);
    }

    #[test]
    fn headers_are_charged_once() {
        let mut heap = Heap::new();
        heap.new_native("clock", clock).unwrap();
        let one = heap.allocator().bytes_allocated();
        assert!(one > 0);
        // Seven more fit in the first slot block: no further growth.
        for _ in 0..7 {
            heap.new_native("clock", clock).unwrap();
        }
        assert_eq!(heap.allocator().bytes_allocated(), one);
        heap.free_objects();
        assert_eq!(heap.allocator().bytes_allocated(), one);

        let s = heap.copy_string("abcd").unwrap();
        assert_eq!(heap.allocator().bytes_allocated(), one + 4);
        assert_eq!(heap.as_string(s).unwrap().len(), 4);
    }

    #[test]
    fn mark_bit_roundtrips() {
        let mut heap = Heap::new();
        let s = heap.copy_string("m").unwrap();
        assert_eq!(heap.is_marked(s), Ok(false));
        heap.set_marked(s, true).unwrap();
        assert_eq!(heap.is_marked(s), Ok(true));
    }
}
