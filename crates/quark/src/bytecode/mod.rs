//! Bytecode: instruction encoding (§3 "Instruction"), compiled-function
//! representation (§4.4), and the single-pass compiler that turns an AST into
//! both.

mod code;
mod compiler;
mod op;

pub use code::{CompiledFunction, UpvalueSource};
pub use compiler::Compiler;
pub use op::{Instruction, Opcode, INVALID_OPERAND};
