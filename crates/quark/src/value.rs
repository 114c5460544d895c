//! Runtime value model (§3 "Runtime value").
//!
//! `Int`, `Float`, `Bool`, and `Null` are immediate (`Copy`) variants with no
//! heap allocation at all, so the "small-int cache" invariant (§3, testable
//! property 4) is automatically satisfied: two `Value::Int(5)`s are already
//! the same value, there is no separate heap cell whose identity could
//! diverge. A process-wide array of boxed integers (as the original
//! pointer-based object model needs) would only be meaningful if integers
//! were heap-allocated; here it would be dead weight. See DESIGN.md.

use std::fmt;
use std::rc::Rc;

use crate::builtins::BuiltinFunction;
use crate::bytecode::CompiledFunction;
use crate::heap::{Heap, HeapData, HeapId};

/// A runtime value. Heap-allocated payloads (`String`, `List`, `Dict`,
/// `Closure`, `ObjectRef`) are represented as a `HeapId` pointing into the
/// `Rc<RefCell<_>>`-backed heap; everything else is inline.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(HeapId),
    List(HeapId),
    Dict(HeapId),
    /// A compiled function that has not (yet) been wrapped in a closure —
    /// produced by loading a function literal's constant, consumed by
    /// `OpClosure`.
    Function(Rc<CompiledFunction>),
    /// A compiled function paired with its captured upvalue cells.
    Closure(HeapId),
    BuiltinFunction(BuiltinFunction),
    /// A mutable cell shared between an owning frame and the closures that
    /// captured it (§3 "ObjectRef").
    ObjectRef(HeapId),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
            Self::Function(_) | Self::Closure(_) => "function",
            Self::BuiltinFunction(_) => "builtin_function",
            Self::ObjectRef(cell) => match &*cell.borrow() {
                HeapData::Cell(inner) => inner.type_name(),
                _ => unreachable!("ObjectRef always wraps HeapData::Cell"),
            },
        }
    }

    /// Truthiness contract (§4.5): `null`→false, `Bool`→own value,
    /// `Int`/`Float`→nonzero, `String`/`List`/`Dict`→nonempty, functions and
    /// closures→true.
    pub fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => match &*s.borrow() {
                HeapData::String(s) => !s.is_empty(),
                _ => unreachable!(),
            },
            Self::List(l) => match &*l.borrow() {
                HeapData::List(v) => !v.is_empty(),
                _ => unreachable!(),
            },
            Self::Dict(d) => match &*d.borrow() {
                HeapData::Dict(m) => !m.is_empty(),
                _ => unreachable!(),
            },
            Self::Function(_) | Self::Closure(_) | Self::BuiltinFunction(_) => true,
            Self::ObjectRef(cell) => match &*cell.borrow() {
                HeapData::Cell(inner) => inner.truthy(),
                _ => unreachable!(),
            },
        }
    }

    /// If this value is an `ObjectRef`, returns the value it currently
    /// holds; otherwise returns a clone of `self`. Used wherever a local or
    /// upvalue slot is read, so a boxed capture is transparent to the reader.
    pub fn unwrap_ref(&self) -> Value {
        match self {
            Self::ObjectRef(cell) => match &*cell.borrow() {
                HeapData::Cell(inner) => inner.clone(),
                _ => unreachable!(),
            },
            other => other.clone(),
        }
    }

    /// True if this value is already an `ObjectRef` cell.
    pub fn is_object_ref(&self) -> bool {
        matches!(self, Self::ObjectRef(_))
    }

    /// Writes the value-to-string contract used by `print`/`to_string`/REPL
    /// echo.
    pub fn display_string(&self) -> String {
        match self {
            Self::Null => "null".to_owned(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => format_float(*f),
            Self::String(s) => match &*s.borrow() {
                HeapData::String(s) => s.clone(),
                _ => unreachable!(),
            },
            Self::List(l) => match &*l.borrow() {
                HeapData::List(items) => {
                    let parts: Vec<String> = items.iter().map(Value::repr_string).collect();
                    format!("[{}]", parts.join(", "))
                }
                _ => unreachable!(),
            },
            Self::Dict(d) => match &*d.borrow() {
                HeapData::Dict(map) => {
                    let parts: Vec<String> = map.iter().map(|(k, v)| format!("{k}: {}", v.repr_string())).collect();
                    format!("{{{}}}", parts.join(", "))
                }
                _ => unreachable!(),
            },
            Self::Function(f) => format!("<function {}>", f.name),
            Self::Closure(c) => match &*c.borrow() {
                HeapData::Closure(data) => format!("<function {}>", data.function.name),
                _ => unreachable!(),
            },
            Self::BuiltinFunction(b) => format!("<builtin {}>", b.name()),
            Self::ObjectRef(cell) => match &*cell.borrow() {
                HeapData::Cell(inner) => inner.display_string(),
                _ => unreachable!(),
            },
        }
    }

    /// Same as `display_string` except strings are quoted, matching how
    /// nested values print inside a list/dict.
    fn repr_string(&self) -> String {
        match self {
            Self::String(s) => match &*s.borrow() {
                HeapData::String(s) => format!("\"{s}\""),
                _ => unreachable!(),
            },
            other => other.display_string(),
        }
    }

    pub fn new_string(heap: &Heap, s: impl Into<String>) -> Value {
        Value::String(heap.alloc_string(s.into()))
    }

    pub fn new_list(heap: &Heap, values: Vec<Value>) -> Value {
        Value::List(heap.alloc_list(values))
    }
}

/// Matches the host language's default float formatting closely enough for
/// this language's needs: integral floats print with a trailing `.0` only
/// when rendered as a standalone float, so `1.0` is never confused with `1`.
fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_owned();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".to_owned() } else { "-inf".to_owned() };
    }
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_ints_are_structurally_identical_values() {
        // No heap allocation occurs for Int at all, so every `Value::Int(5)`
        // literal is already the same value - this is the invariant, not a
        // cache that needs separate testing.
        let a = Value::Int(5);
        let b = Value::Int(5);
        assert_eq!(a.display_string(), b.display_string());
    }

    #[test]
    fn truthiness_matches_contract() {
        let heap = Heap::new();
        assert!(!Value::Null.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(Value::Int(1).truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::new_string(&heap, "").truthy());
        assert!(Value::new_string(&heap, "x").truthy());
        assert!(!Value::new_list(&heap, vec![]).truthy());
    }

    #[test]
    fn float_formatting_keeps_trailing_zero() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(1.5), "1.5");
    }
}
