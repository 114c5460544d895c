//! Stack-based bytecode interpreter (§4.5).
//!
//! The dispatch loop below is the only place that mutates `Context::stack`,
//! `Context::frames`, and `Context::ip` during execution. There is no
//! separate `Vm` struct: `Context` *is* the machine state, which is what
//! lets a builtin (`import`) recurse straight back into `run_entry` on the
//! same context instead of constructing and wiring up a second one - the
//! call stack of the nested `run_entry` invocation is the call stack of the
//! recursive Rust function call, and `base_depth` tells each invocation
//! where its own frame sits so a `Return`/`Export` inside the nested module
//! unwinds only as far as its own entry frame, never the caller's.

use std::rc::Rc;
use std::sync::atomic::Ordering;

use indexmap::IndexMap;

use crate::bytecode::{CompiledFunction, Instruction, Opcode};
use crate::context::{Context, Frame, MAX_EXPORTS, MAX_FRAMES, MAX_STACK};
use crate::error::{RunResult, RuntimeError};
use crate::heap::{HeapData, HeapId};
use crate::symbol::Scope;
use crate::value::Value;

/// Runs `function` as a fresh call on `ctx` to completion and returns the
/// value it returned or exported. Used both for a module's top-level chunk
/// (`Context::run_source`) and, recursively, for a module pulled in via the
/// `import` builtin (`Context::builtin_import`) - in the latter case this
/// call nests inside an already-running dispatch loop, sharing the same
/// stack/frame vectors without disturbing the caller's slice of them.
pub(crate) fn run_entry(ctx: &mut Context, function: Rc<CompiledFunction>) -> RunResult<Value> {
    call_compiled(ctx, function, Vec::new(), Vec::new())?;
    let base_depth = ctx.frames.len() - 1;
    run_loop(ctx, base_depth)
}

fn run_loop(ctx: &mut Context, base_depth: usize) -> RunResult<Value> {
    loop {
        if ctx.abort.load(Ordering::Relaxed) {
            return Err(RuntimeError::Cancelled);
        }

        let frame_top = ctx.frames.len() - 1;
        let next_ip = ctx.ip + 1;
        let function = Rc::clone(&ctx.frames[frame_top].function);
        let instr: Instruction = *function
            .instructions
            .get(next_ip as usize)
            .expect("compiler-emitted functions always end in Return");
        ctx.ip = next_ip;

        let Some(opcode) = instr.opcode() else {
            return Err(RuntimeError::InvalidOpcode(instr.opcode_byte()));
        };

        match opcode {
            Opcode::Nop => {}

            Opcode::LoadNull => push(ctx, Value::Null)?,
            Opcode::LoadTrue => push(ctx, Value::Bool(true))?,
            Opcode::LoadFalse => push(ctx, Value::Bool(false))?,
            Opcode::LoadConst => {
                let value = ctx.constants[instr.operand() as usize].clone();
                push(ctx, value)?;
            }
            Opcode::LoadLocal => {
                let bp = ctx.frames[frame_top].bp;
                let value = ctx.stack[bp + instr.operand() as usize].unwrap_ref();
                push(ctx, value)?;
            }
            Opcode::LoadOuter => {
                let cell = ctx.frames[frame_top].upvalues[instr.operand() as usize].clone();
                let value = read_cell(&cell);
                push(ctx, value)?;
            }
            Opcode::LoadGlobal => {
                let value = ctx.globals.get(instr.operand() as usize).cloned().unwrap_or(Value::Null);
                push(ctx, value.unwrap_ref())?;
            }
            Opcode::LoadIndex => {
                let index = pop(ctx);
                let collection = pop(ctx);
                let value = load_index(ctx, &collection, &index)?;
                push(ctx, value)?;
            }
            Opcode::LoadAttribute => {
                let name = pop(ctx);
                let collection = pop(ctx);
                let value = load_attribute(&collection, &name)?;
                push(ctx, value)?;
            }

            Opcode::StoreLocal => {
                let bp = ctx.frames[frame_top].bp;
                let slot = bp + instr.operand() as usize;
                let value = pop(ctx);
                store_local(ctx, slot, value);
            }
            Opcode::StoreOuter => {
                let cell = ctx.frames[frame_top].upvalues[instr.operand() as usize].clone();
                let value = pop(ctx);
                write_cell(&cell, value);
            }
            Opcode::StoreGlobal => {
                let idx = instr.operand() as usize;
                let value = pop(ctx);
                if idx >= ctx.globals.len() {
                    ctx.globals.resize(idx + 1, Value::Null);
                }
                ctx.globals[idx] = value;
            }
            Opcode::StoreIndex => {
                // Stack order bottom-to-top is (value, collection, index) -
                // the compiler's reverse-target emission for `a[i] = v`
                // pushes `v` first, then the target's own addressing.
                let index = pop(ctx);
                let collection = pop(ctx);
                let value = pop(ctx);
                store_index(&collection, &index, value)?;
            }
            Opcode::StoreAttribute => {
                let name = pop(ctx);
                let collection = pop(ctx);
                let value = pop(ctx);
                store_attribute(&collection, &name, value)?;
            }

            Opcode::UnaryBitNot | Opcode::UnaryNot | Opcode::UnaryPlus | Opcode::UnaryMinus => {
                let operand = pop(ctx);
                let result = unary_op(opcode, operand)?;
                push(ctx, result)?;
            }

            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::Lt
            | Opcode::Lte
            | Opcode::Gt
            | Opcode::Gte
            | Opcode::Eq
            | Opcode::Neq
            | Opcode::BitAnd
            | Opcode::BitOr
            | Opcode::BitXor
            | Opcode::BitLhs
            | Opcode::BitRhs => {
                let right = pop(ctx);
                let left = pop(ctx);
                let result = binary_op(ctx, opcode, left, right)?;
                push(ctx, result)?;
            }

            Opcode::Jump => jump_to(ctx, instr.operand()),
            Opcode::JumpIfFalse => {
                let cond = pop(ctx);
                if !cond.truthy() {
                    jump_to(ctx, instr.operand());
                }
            }
            Opcode::JumpIfFalseOrPop => {
                if peek(ctx).truthy() {
                    pop(ctx);
                } else {
                    jump_to(ctx, instr.operand());
                }
            }
            Opcode::JumpIfTrueOrPop => {
                if peek(ctx).truthy() {
                    jump_to(ctx, instr.operand());
                } else {
                    pop(ctx);
                }
            }

            Opcode::Closure => build_closure(ctx, frame_top)?,
            Opcode::Call => do_call(ctx, instr.operand() as usize)?,
            Opcode::Return => {
                let value = pop(ctx);
                if let Some(result) = unwind_frame(ctx, base_depth, value) {
                    return Ok(result);
                }
            }
            Opcode::RemoveTop => {
                pop(ctx);
            }

            Opcode::BuildList => {
                let n = instr.operand() as usize;
                let len = ctx.stack.len();
                let items = ctx.stack.split_off(len - n);
                let value = Value::new_list(&ctx.heap, items);
                push(ctx, value)?;
            }
            Opcode::BuildDict => {
                let entries = instr.operand() as usize;
                let len = ctx.stack.len();
                let flat = ctx.stack.split_off(len - entries * 2);
                let mut map = IndexMap::with_capacity(entries);
                for pair in flat.chunks_exact(2) {
                    let key = string_of(match &pair[0] {
                        Value::String(h) => h,
                        _ => unreachable!("dict keys are always string constants"),
                    });
                    map.insert(key, pair[1].clone());
                }
                let value = Value::Dict(ctx.heap.alloc_dict(map));
                push(ctx, value)?;
            }

            Opcode::Import => return Err(RuntimeError::NotImplemented("OpImport (use the import() builtin)".to_owned())),
            Opcode::Export => {
                let value = pop(ctx);
                if ctx.export_stage.len() >= MAX_EXPORTS {
                    return Err(RuntimeError::StackOverflow);
                }
                ctx.export_stage.push(value.clone());
                if let Some(result) = unwind_frame(ctx, base_depth, value) {
                    return Ok(result);
                }
            }

            Opcode::Debugger => {}
        }
    }
}

/// Pops the current frame, reclaims its locals, and either yields the final
/// value (this invocation's own entry frame just unwound) or resumes the
/// caller with `value` pushed (§4.5 "Return").
fn unwind_frame(ctx: &mut Context, base_depth: usize, value: Value) -> Option<Value> {
    let frame = ctx.frames.pop().expect("a frame is always current while executing");
    ctx.stack.truncate(frame.bp);
    ctx.ip = frame.return_ip;
    if ctx.frames.len() == base_depth {
        return Some(value);
    }
    ctx.stack.push(value);
    None
}

fn push(ctx: &mut Context, value: Value) -> RunResult<()> {
    if ctx.stack.len() >= MAX_STACK {
        return Err(RuntimeError::StackOverflow);
    }
    ctx.stack.push(value);
    Ok(())
}

fn pop(ctx: &mut Context) -> Value {
    ctx.stack.pop().expect("compiler-emitted bytecode keeps the stack balanced")
}

fn peek(ctx: &Context) -> &Value {
    ctx.stack.last().expect("compiler-emitted bytecode keeps the stack balanced")
}

/// Sets the instruction pointer so the *next* loop iteration (which always
/// adds one) lands on `target`.
fn jump_to(ctx: &mut Context, target: u32) {
    ctx.ip = target as isize - 1;
}

fn do_call(ctx: &mut Context, argc: usize) -> RunResult<()> {
    let callee = pop(ctx);
    let len = ctx.stack.len();
    let args = ctx.stack.split_off(len - argc);
    match callee {
        Value::BuiltinFunction(builtin) => {
            let result = builtin.call(ctx, &args)?;
            push(ctx, result)
        }
        Value::Closure(h) => {
            let (function, upvalues) = match &*h.borrow() {
                HeapData::Closure(data) => (Rc::clone(&data.function), data.upvalues.clone()),
                _ => unreachable!("Value::Closure always wraps HeapData::Closure"),
            };
            call_compiled(ctx, function, args, upvalues)
        }
        // A bare compiled-function constant that was never wrapped by
        // `OpClosure` - reachable only if a caller gets hold of a function
        // value before its enclosing `Closure` instruction runs, which does
        // not happen via any emitted bytecode but is handled defensively.
        Value::Function(function) => call_compiled(ctx, function, args, Vec::new()),
        other => Err(RuntimeError::TypeError(format!("'{}' is not callable", other.type_name()))),
    }
}

fn call_compiled(ctx: &mut Context, function: Rc<CompiledFunction>, args: Vec<Value>, upvalues: Vec<HeapId>) -> RunResult<()> {
    let arity = function.arity();
    if args.len() != arity {
        return Err(RuntimeError::WrongArity {
            name: function.name.clone(),
            expected: arity,
            got: args.len(),
        });
    }
    if ctx.frames.len() >= MAX_FRAMES {
        return Err(RuntimeError::StackOverflow);
    }
    let bp = ctx.stack.len();
    let num_locals = function.num_locals as usize;
    if bp + num_locals > MAX_STACK {
        return Err(RuntimeError::StackOverflow);
    }
    ctx.stack.extend(args);
    ctx.stack.resize(bp + num_locals, Value::Null);
    let return_ip = ctx.ip;
    ctx.frames.push(Frame {
        function,
        upvalues,
        return_ip,
        bp,
    });
    ctx.ip = -1;
    Ok(())
}

/// Boxes each captured local/upvalue into a shared cell on first capture and
/// builds the closure's upvalue array (§4.5 "Closure construction" - the
/// subtle part).
fn build_closure(ctx: &mut Context, frame_top: usize) -> RunResult<()> {
    let value = pop(ctx);
    let Value::Function(function) = value else {
        return Err(RuntimeError::TypeError(format!(
            "OpClosure expected a compiled function constant, got {}",
            value.type_name()
        )));
    };
    let bp = ctx.frames[frame_top].bp;
    let mut upvalues = Vec::with_capacity(function.upvalues.len());
    for source in &function.upvalues {
        let cell = match source.outer_scope {
            Scope::Local => {
                let slot = bp + source.outer_index as usize;
                match &ctx.stack[slot] {
                    Value::ObjectRef(h) => h.clone(),
                    _ => {
                        let current = ctx.stack[slot].clone();
                        let h = ctx.heap.alloc_cell(current);
                        ctx.stack[slot] = Value::ObjectRef(h.clone());
                        h
                    }
                }
            }
            Scope::Upvalue => ctx.frames[frame_top].upvalues[source.outer_index as usize].clone(),
            Scope::Global => unreachable!("globals are never promoted to upvalues"),
        };
        upvalues.push(cell);
    }
    let closure = ctx.heap.alloc_closure(function, upvalues);
    push(ctx, Value::Closure(closure))
}

fn read_cell(cell: &HeapId) -> Value {
    match &*cell.borrow() {
        HeapData::Cell(value) => value.clone(),
        _ => unreachable!("upvalue cells always wrap HeapData::Cell"),
    }
}

fn write_cell(cell: &HeapId, value: Value) {
    match &mut *cell.borrow_mut() {
        HeapData::Cell(slot) => *slot = value,
        _ => unreachable!("upvalue cells always wrap HeapData::Cell"),
    }
}

/// Writes through an already-boxed local transparently, matching
/// `LoadLocal`'s symmetric unwrap (§4.5 "reading a local transparently
/// unwraps a ref").
fn store_local(ctx: &mut Context, slot: usize, value: Value) {
    if let Value::ObjectRef(h) = &ctx.stack[slot] {
        let h = h.clone();
        write_cell(&h, value);
    } else {
        ctx.stack[slot] = value;
    }
}

fn string_of(h: &HeapId) -> String {
    match &*h.borrow() {
        HeapData::String(s) => s.clone(),
        _ => unreachable!("Value::String always wraps HeapData::String"),
    }
}

/// Any non-string indexer/attribute is coerced to its display form, per §3's
/// "Keys are strings (any non-string indexer is coerced to string)".
fn index_to_key(index: &Value) -> String {
    match index {
        Value::String(h) => string_of(h),
        other => other.display_string(),
    }
}

fn check_index(i: i64, len: usize) -> RunResult<usize> {
    if i < 0 || i as usize >= len {
        return Err(RuntimeError::IndexError(format!("index {i} out of range for length {len}")));
    }
    Ok(i as usize)
}

fn load_index(ctx: &Context, collection: &Value, index: &Value) -> RunResult<Value> {
    match collection {
        Value::List(h) => {
            let HeapData::List(items) = &*h.borrow() else {
                unreachable!("Value::List always wraps HeapData::List");
            };
            let Value::Int(i) = index else {
                return Err(RuntimeError::IndexError(format!("list index must be an int, got {}", index.type_name())));
            };
            Ok(items[check_index(*i, items.len())?].clone())
        }
        Value::Dict(h) => {
            let HeapData::Dict(map) = &*h.borrow() else {
                unreachable!("Value::Dict always wraps HeapData::Dict");
            };
            let key = index_to_key(index);
            Ok(map.get(&key).cloned().unwrap_or(Value::Null))
        }
        Value::String(h) => {
            let Value::Int(i) = index else {
                return Err(RuntimeError::IndexError(format!("string index must be an int, got {}", index.type_name())));
            };
            let bytes = string_of(h).into_bytes();
            let byte = bytes[check_index(*i, bytes.len())?];
            Ok(Value::new_string(&ctx.heap, (byte as char).to_string()))
        }
        other => Err(RuntimeError::TypeError(format!("'{}' is not indexable", other.type_name()))),
    }
}

fn store_index(collection: &Value, index: &Value, value: Value) -> RunResult<()> {
    match collection {
        Value::List(h) => {
            let HeapData::List(items) = &mut *h.borrow_mut() else {
                unreachable!("Value::List always wraps HeapData::List");
            };
            let Value::Int(i) = index else {
                return Err(RuntimeError::IndexError(format!("list index must be an int, got {}", index.type_name())));
            };
            let slot = check_index(*i, items.len())?;
            items[slot] = value;
            Ok(())
        }
        Value::Dict(h) => {
            let HeapData::Dict(map) = &mut *h.borrow_mut() else {
                unreachable!("Value::Dict always wraps HeapData::Dict");
            };
            map.insert(index_to_key(index), value);
            Ok(())
        }
        other => Err(RuntimeError::TypeError(format!("'{}' does not support index assignment", other.type_name()))),
    }
}

fn attribute_name(name: &Value) -> RunResult<String> {
    let key = match name {
        Value::String(h) => string_of(h),
        _ => unreachable!("attribute names are always string constants"),
    };
    if key.is_empty() {
        return Err(RuntimeError::AttributeError("empty attribute name".to_owned()));
    }
    Ok(key)
}

fn load_attribute(collection: &Value, name: &Value) -> RunResult<Value> {
    let key = attribute_name(name)?;
    match collection {
        Value::Dict(h) => {
            let HeapData::Dict(map) = &*h.borrow() else {
                unreachable!("Value::Dict always wraps HeapData::Dict");
            };
            Ok(map.get(&key).cloned().unwrap_or(Value::Null))
        }
        other => Err(RuntimeError::TypeError(format!("'{}' has no attributes", other.type_name()))),
    }
}

fn store_attribute(collection: &Value, name: &Value, value: Value) -> RunResult<()> {
    let key = attribute_name(name)?;
    match collection {
        Value::Dict(h) => {
            let HeapData::Dict(map) = &mut *h.borrow_mut() else {
                unreachable!("Value::Dict always wraps HeapData::Dict");
            };
            map.insert(key, value);
            Ok(())
        }
        other => Err(RuntimeError::TypeError(format!("'{}' does not support attribute assignment", other.type_name()))),
    }
}

fn unary_op(op: Opcode, operand: Value) -> RunResult<Value> {
    match (op, operand) {
        (Opcode::UnaryNot, value) => Ok(Value::Bool(!value.truthy())),
        (Opcode::UnaryBitNot, Value::Int(i)) => Ok(Value::Int(!i)),
        (Opcode::UnaryBitNot, other) => Err(RuntimeError::TypeError(format!("'~' expects an int, got {}", other.type_name()))),
        (Opcode::UnaryPlus, Value::Int(i)) => Ok(Value::Int(i)),
        (Opcode::UnaryPlus, Value::Float(f)) => Ok(Value::Float(f)),
        (Opcode::UnaryPlus, other) => Err(RuntimeError::TypeError(format!("unary '+' expects a number, got {}", other.type_name()))),
        (Opcode::UnaryMinus, Value::Int(i)) => Ok(Value::Int(-i)),
        (Opcode::UnaryMinus, Value::Float(f)) => Ok(Value::Float(-f)),
        (Opcode::UnaryMinus, other) => Err(RuntimeError::TypeError(format!("unary '-' expects a number, got {}", other.type_name()))),
        (other, _) => unreachable!("{other:?} is not a unary opcode"),
    }
}

fn binary_op(ctx: &Context, op: Opcode, left: Value, right: Value) -> RunResult<Value> {
    match op {
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => arithmetic(ctx, op, left, right),
        Opcode::Lt | Opcode::Lte | Opcode::Gt | Opcode::Gte => compare(op, &left, &right),
        Opcode::Eq => Ok(Value::Bool(values_equal(&left, &right))),
        Opcode::Neq => Ok(Value::Bool(!values_equal(&left, &right))),
        Opcode::BitAnd | Opcode::BitOr | Opcode::BitXor | Opcode::BitLhs | Opcode::BitRhs => bitwise(op, &left, &right),
        other => unreachable!("{other:?} is not a binary opcode"),
    }
}

fn opname(op: Opcode) -> &'static str {
    match op {
        Opcode::Add => "+",
        Opcode::Sub => "-",
        Opcode::Mul => "*",
        Opcode::Div => "/",
        Opcode::Mod => "%",
        _ => "?",
    }
}

/// `Int op Int` stays `Int`; `Int op Float`/`Float op Int` truncates the
/// float operand to `Int` rather than promoting the int to `Float` - a
/// deliberate, preserved quirk, not a bug (§9 "Open questions").
fn arithmetic(ctx: &Context, op: Opcode, left: Value, right: Value) -> RunResult<Value> {
    if op == Opcode::Add {
        if let (Value::String(a), Value::String(b)) = (&left, &right) {
            return Ok(Value::new_string(&ctx.heap, format!("{}{}", string_of(a), string_of(b))));
        }
    }
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_arith(op, a, b),
        (Value::Float(a), Value::Float(b)) => float_arith(op, a, b).map(Value::Float),
        (Value::Int(a), Value::Float(b)) => int_arith(op, a, b as i64),
        (Value::Float(a), Value::Int(b)) => int_arith(op, a as i64, b),
        (l, r) => Err(RuntimeError::TypeError(format!(
            "unsupported operand types for '{}': {} and {}",
            opname(op),
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn int_arith(op: Opcode, a: i64, b: i64) -> RunResult<Value> {
    match op {
        Opcode::Add => Ok(Value::Int(a.wrapping_add(b))),
        Opcode::Sub => Ok(Value::Int(a.wrapping_sub(b))),
        Opcode::Mul => Ok(Value::Int(a.wrapping_mul(b))),
        Opcode::Div if b == 0 => Err(RuntimeError::TypeError("division by zero".to_owned())),
        Opcode::Div => Ok(Value::Int(a.wrapping_div(b))),
        Opcode::Mod if b == 0 => Err(RuntimeError::TypeError("modulo by zero".to_owned())),
        Opcode::Mod => Ok(Value::Int(a.wrapping_rem(b))),
        _ => unreachable!(),
    }
}

fn float_arith(op: Opcode, a: f64, b: f64) -> RunResult<f64> {
    match op {
        Opcode::Add => Ok(a + b),
        Opcode::Sub => Ok(a - b),
        Opcode::Mul => Ok(a * b),
        Opcode::Div => Ok(a / b),
        Opcode::Mod => Err(RuntimeError::TypeError("'%' is only defined between integers".to_owned())),
        _ => unreachable!(),
    }
}

fn compare(op: Opcode, left: &Value, right: &Value) -> RunResult<Value> {
    let ord = match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => a.partial_cmp(&(*b as i64)),
        (Value::Float(a), Value::Int(b)) => (*a as i64).partial_cmp(b),
        (l, r) => {
            return Err(RuntimeError::TypeError(format!(
                "unsupported operand types for comparison: {} and {}",
                l.type_name(),
                r.type_name()
            )))
        }
    };
    let Some(ord) = ord else {
        return Err(RuntimeError::TypeError("comparison involving NaN has no ordering".to_owned()));
    };
    let result = match op {
        Opcode::Lt => ord.is_lt(),
        Opcode::Lte => ord.is_le(),
        Opcode::Gt => ord.is_gt(),
        Opcode::Gte => ord.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

/// `BoolObject.BinaryEq`-style identity comparison is unnecessary here:
/// `Bool`/`Int`/`Float`/`Null` are immediate values (§9), so plain value
/// equality already gives the correct, singleton-proof answer. Heap values
/// compare by cell identity rather than deep structural equality - sharing a
/// list/dict reference is "equal," two structurally-identical-but-distinct
/// ones are not, which keeps `==` a cheap, well-defined O(1) operation.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Int(a), Value::Float(b)) => *a == *b as i64,
        (Value::Float(a), Value::Int(b)) => *a as i64 == *b,
        (Value::String(a), Value::String(b)) => string_of(a) == string_of(b),
        (Value::List(a), Value::List(b)) => a.ptr_eq(b),
        (Value::Dict(a), Value::Dict(b)) => a.ptr_eq(b),
        (Value::Closure(a), Value::Closure(b)) => a.ptr_eq(b),
        (Value::BuiltinFunction(a), Value::BuiltinFunction(b)) => a == b,
        _ => false,
    }
}

fn bitwise(op: Opcode, left: &Value, right: &Value) -> RunResult<Value> {
    let (Value::Int(a), Value::Int(b)) = (left, right) else {
        return Err(RuntimeError::TypeError(format!(
            "bitwise operators require two ints, got {} and {}",
            left.type_name(),
            right.type_name()
        )));
    };
    let result = match op {
        Opcode::BitAnd => a & b,
        Opcode::BitOr => a | b,
        Opcode::BitXor => a ^ b,
        Opcode::BitLhs => a.wrapping_shl((*b & 63) as u32),
        Opcode::BitRhs => a.wrapping_shr((*b & 63) as u32),
        _ => unreachable!(),
    };
    Ok(Value::Int(result))
}

#[cfg(test)]
mod tests {
    use crate::context::Context;

    fn export(source: &str) -> String {
        let mut ctx = Context::new();
        ctx.run_source("<test>", source).unwrap().display_string()
    }

    #[test]
    fn fibonacci_recursion() {
        let source = "fn fib(n){ if n<3 {return 1} return fib(n-1)+fib(n-2) }\nexport fib(10)\n";
        assert_eq!(export(source), "55");
    }

    #[test]
    fn multi_assign_swap() {
        assert_eq!(export("a,b=1,2\na,b=b,a\nexport [a,b]\n"), "[2, 1]");
    }

    #[test]
    fn closures_share_a_boxed_local_across_calls() {
        let source = "fn makeCounter(){\n  n = 0\n  fn inc(){\n    n = n + 1\n    return n\n  }\n  return inc\n}\nc = makeCounter()\nexport [c(), c(), c()]\n";
        assert_eq!(export(source), "[1, 2, 3]");
    }

    #[test]
    fn dict_and_attribute_roundtrip() {
        assert_eq!(export("d={x:1}\nd.x = d.x + 1\nexport d.x\n"), "2");
    }

    #[test]
    fn for_loop_break_and_continue() {
        let source = "out = []\nfor i=0;i<5;i=i+1 { if i==3 {break} if i==1 {continue} out = out + [i] }\nexport out\n";
        assert_eq!(export(source), "[0, 2]");
    }

    #[test]
    fn short_circuit_and_does_not_evaluate_right_side() {
        let source = "called = false\nfn diverge(){ called = true\n return true }\nx = false && diverge()\nexport called\n";
        assert_eq!(export(source), "false");
    }

    #[test]
    fn stack_returns_to_pre_call_depth_after_a_call() {
        let mut ctx = Context::new();
        ctx.run_source("<test>", "fn f(a,b){ return a+b }\nr = f(1,2)\n").unwrap();
        assert_eq!(ctx.stack.len(), 0);
    }

    #[test]
    fn wrong_arity_builtin_call_is_an_error_not_a_panic() {
        let mut ctx = Context::new();
        let err = ctx.run_source("<test>", "length(1, 2)\n").unwrap_err();
        assert!(matches!(err, crate::error::QuarkError::Runtime(crate::error::RuntimeError::WrongArity { .. })));
    }

    #[test]
    fn int_float_arithmetic_truncates_the_float_side() {
        assert_eq!(export("export 7 / 2.9\n"), "3");
    }
}
