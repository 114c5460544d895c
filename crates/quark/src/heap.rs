//! Heap facade for every reference-shared runtime value.
//!
//! The specification leaves host memory management as an implementation
//! choice (§5) so long as a captured upvalue cell stays alive as long as any
//! closure referencing it does. This implementation backs every heap value
//! with `Rc<RefCell<HeapData>>`: `HeapId` is a thin newtype around that `Rc`,
//! so cloning a `HeapId` is reference sharing (exactly what "assignment
//! copies the reference, not the contents" requires) and identity comparison
//! (distinct `ObjectRef`s, `BoolObject`-style singleton checks) is
//! `Rc::ptr_eq`. A hand-rolled arena with manual `inc_ref`/`dec_ref`
//! bookkeeping was considered and rejected — see DESIGN.md.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::CompiledFunction;
use crate::value::Value;

/// The payload stored behind every `HeapId`.
#[derive(Debug)]
pub enum HeapData {
    String(String),
    List(Vec<Value>),
    Dict(IndexMap<String, Value>),
    Closure(ClosureData),
    /// `ObjectRef`: a mutable cell shared between an owning frame and the
    /// closures that captured it.
    Cell(Value),
}

/// A compiled function paired with the upvalue cells it captured at closure
/// creation time (§4.5 "Closure construction").
#[derive(Debug)]
pub struct ClosureData {
    pub function: Rc<CompiledFunction>,
    pub upvalues: Vec<HeapId>,
}

/// Reference-counted handle to a heap-allocated value.
#[derive(Debug, Clone)]
pub struct HeapId(Rc<RefCell<HeapData>>);

impl HeapId {
    pub fn borrow(&self) -> Ref<'_, HeapData> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, HeapData> {
        self.0.borrow_mut()
    }

    /// True if `self` and `other` are the *same* heap cell, not merely equal
    /// in content. Used for `ObjectRef` aliasing checks during closure
    /// construction.
    pub fn ptr_eq(&self, other: &HeapId) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Allocator for heap-backed values. Holds no state of its own today (each
/// `HeapId` is self-sufficient once allocated) but gives allocation call
/// sites a single, greppable entry point and a seam for future bookkeeping
/// (e.g. allocation counters for resource limits) without touching callers.
#[derive(Debug, Default)]
pub struct Heap;

impl Heap {
    pub fn new() -> Self {
        Self
    }

    fn alloc(&self, data: HeapData) -> HeapId {
        HeapId(Rc::new(RefCell::new(data)))
    }

    pub fn alloc_string(&self, s: String) -> HeapId {
        self.alloc(HeapData::String(s))
    }

    pub fn alloc_list(&self, values: Vec<Value>) -> HeapId {
        self.alloc(HeapData::List(values))
    }

    pub fn alloc_dict(&self, entries: IndexMap<String, Value>) -> HeapId {
        self.alloc(HeapData::Dict(entries))
    }

    pub fn alloc_cell(&self, value: Value) -> HeapId {
        self.alloc(HeapData::Cell(value))
    }

    pub fn alloc_closure(&self, function: Rc<CompiledFunction>, upvalues: Vec<HeapId>) -> HeapId {
        self.alloc(HeapData::Closure(ClosureData { function, upvalues }))
    }
}
