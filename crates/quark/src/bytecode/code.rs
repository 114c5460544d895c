//! Compiled function representation (§4.4).

use crate::bytecode::op::Instruction;
use crate::symbol::Scope;

/// Where an upvalue slot's real binding lives in the *enclosing* function,
/// captured at the moment this function's scope was pushed (§4.3 rule 3).
#[derive(Debug, Clone, Copy)]
pub struct UpvalueSource {
    pub outer_scope: Scope,
    pub outer_index: u32,
}

/// One compiled function body: its instructions plus enough metadata for the
/// VM to set up a call frame and, if it's captured in a closure, to build the
/// upvalue array (§4.5 "Closure construction").
#[derive(Debug)]
pub struct CompiledFunction {
    pub name: String,
    pub instructions: Vec<Instruction>,
    pub param_names: Vec<String>,
    pub num_locals: u32,
    /// Index-ordered upvalue sources; `OpClosure` walks this to build the
    /// closure's captured-cell array.
    pub upvalues: Vec<UpvalueSource>,
}

impl CompiledFunction {
    pub fn arity(&self) -> usize {
        self.param_names.len()
    }
}
