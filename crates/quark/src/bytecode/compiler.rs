//! Single-pass AST-to-bytecode compiler (§4.4).
//!
//! One `Compiler` borrows the owning `Context` mutably for its constant
//! pool and symbol tables, and walks the AST once with a pattern match
//! instead of the source's visitor double-dispatch (§9 "Visitor pattern
//! over AST"). Compiling a nested function swaps in a fresh instruction
//! buffer and loop stack, recurses, then restores the enclosing ones -
//! there is no separate function table; each compiled function becomes a
//! `Value::Function` constant in the single deduplicated pool the moment
//! its body finishes (see `Context::append_function_constant`).

use std::rc::Rc;

use crate::ast::{BinaryOp, ElifArm, Expr, Stmt, UnaryOp};
use crate::bytecode::code::{CompiledFunction, UpvalueSource};
use crate::bytecode::op::{Instruction, Opcode};
use crate::context::Context;
use crate::error::{CompileError, CompileResult};
use crate::symbol::Scope;
use crate::token::Position;

/// One open loop's pending `break`/`continue` jump sites, patched once the
/// loop's start and end marks are known (§4.4 "For").
struct LoopMarks {
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

pub struct Compiler<'a> {
    ctx: &'a mut Context,
    instructions: Vec<Instruction>,
    loops: Vec<LoopMarks>,
}

impl<'a> Compiler<'a> {
    pub fn new(ctx: &'a mut Context) -> Self {
        Self {
            ctx,
            instructions: Vec::new(),
            loops: Vec::new(),
        }
    }

    /// Compiles a parsed `Stmt::Chunk` into the module's entry function. The
    /// chunk always returns `null` regardless of its last statement's
    /// value - the source's `VisitChunk` unconditionally appends
    /// `LoadNull; Return`, so a REPL line's result is whatever it `export`s,
    /// never an echoed expression value.
    pub fn compile_chunk(mut self, chunk: &Stmt) -> CompileResult<Rc<CompiledFunction>> {
        let Stmt::Chunk(statements) = chunk else {
            panic!("compile_chunk called with a non-Chunk root");
        };
        for stmt in statements {
            self.compile_stmt(stmt)?;
        }
        self.emit(Opcode::LoadNull, 0);
        self.emit(Opcode::Return, 0);

        let table_id = self.ctx.symbols.current_id();
        let (num_locals, upvalues) = self.finish_table(table_id);
        Ok(Rc::new(CompiledFunction {
            name: "<chunk>".to_owned(),
            instructions: self.instructions,
            param_names: Vec::new(),
            num_locals,
            upvalues,
        }))
    }

    fn mark(&self) -> usize {
        self.instructions.len()
    }

    fn emit(&mut self, opcode: Opcode, operand: u32) -> usize {
        self.instructions.push(Instruction::new(opcode, operand));
        self.mark() - 1
    }

    fn emit_no_operand(&mut self, opcode: Opcode) -> usize {
        self.instructions.push(Instruction::no_operand(opcode));
        self.mark() - 1
    }

    fn patch(&mut self, at: usize, target: usize) {
        self.instructions[at] = self.instructions[at].with_operand(target as u32);
    }

    fn finish_table(&self, table_id: usize) -> (u32, Vec<UpvalueSource>) {
        let table = self.ctx.symbols.table(table_id);
        let upvalues = table
            .upvalues_in_order()
            .into_iter()
            .map(|(_, symbol)| UpvalueSource {
                outer_scope: symbol.outer_scope.expect("upvalue symbol always records outer_scope"),
                outer_index: symbol.outer_index,
            })
            .collect();
        (table.local_count(), upvalues)
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Chunk(_) => panic!("nested Chunk"),
            Stmt::Block(statements) => {
                self.ctx.symbols.push_block();
                for s in statements {
                    self.compile_stmt(s)?;
                }
                self.ctx.symbols.pop();
                Ok(())
            }
            Stmt::Return(exprs, _) => self.compile_return(exprs),
            Stmt::If {
                cond,
                then_body,
                elifs,
                else_body,
            } => self.compile_if(cond, then_body, elifs, else_body.as_deref()),
            Stmt::For { init, cond, post, body } => self.compile_for(init.as_deref(), cond.as_ref(), post.as_deref(), body),
            Stmt::FunctionDecl { name, params, body, position } => self.compile_function_decl(name, params, body, position),
            Stmt::Assign { targets, values, position } => self.compile_assign(targets, values, position),
            Stmt::Import { path, .. } => {
                let idx = self.ctx.add_string_constant(path);
                self.emit(Opcode::Import, idx);
                Ok(())
            }
            Stmt::Export(expr, _) => {
                self.compile_expr(expr)?;
                self.emit_no_operand(Opcode::Export);
                Ok(())
            }
            Stmt::ExprStmt(expr) => {
                self.compile_expr(expr)?;
                self.emit_no_operand(Opcode::RemoveTop);
                Ok(())
            }
            Stmt::CallStmt(expr) => {
                self.compile_expr(expr)?;
                self.emit_no_operand(Opcode::RemoveTop);
                Ok(())
            }
            Stmt::Break(position) => {
                let mark = self.mark();
                self.emit_no_operand(Opcode::Jump);
                self.current_loop(position)?.breaks.push(mark);
                Ok(())
            }
            Stmt::Continue(position) => {
                let mark = self.mark();
                self.emit_no_operand(Opcode::Jump);
                self.current_loop(position)?.continues.push(mark);
                Ok(())
            }
            Stmt::Debugger(_) => {
                self.emit_no_operand(Opcode::Debugger);
                Ok(())
            }
            Stmt::Empty => Ok(()),
        }
    }

    fn current_loop(&mut self, position: &Position) -> CompileResult<&mut LoopMarks> {
        self.loops
            .last_mut()
            .ok_or_else(|| CompileError::new("'break'/'continue' outside a loop", position.clone()))
    }

    /// Evaluates every return expression left to right (so side effects run
    /// in source order) but keeps only the last value on the stack before
    /// `OpReturn`, which pops exactly one value (§9 "ReturnStatement's
    /// ignored multi-return operand"). Preserves the source's "last
    /// expression wins" behavior without leaving the earlier ones stranded
    /// on the stack.
    fn compile_return(&mut self, exprs: &[Expr]) -> CompileResult<()> {
        if exprs.is_empty() {
            self.emit(Opcode::LoadNull, 0);
        } else {
            for expr in &exprs[..exprs.len() - 1] {
                self.compile_expr(expr)?;
                self.emit_no_operand(Opcode::RemoveTop);
            }
            self.compile_expr(&exprs[exprs.len() - 1])?;
        }
        self.emit(Opcode::Return, exprs.len().max(1) as u32);
        Ok(())
    }

    fn compile_if(&mut self, cond: &Expr, then_body: &[Stmt], elifs: &[ElifArm], else_body: Option<&[Stmt]>) -> CompileResult<()> {
        self.compile_expr(cond)?;
        let mut jump_next = self.mark();
        self.emit_no_operand(Opcode::JumpIfFalse);

        self.compile_block(then_body)?;
        let mut quit_marks = vec![self.mark()];
        self.emit_no_operand(Opcode::Jump);

        let mut jump_else = None;
        if elifs.is_empty() {
            jump_else = Some(jump_next);
        } else {
            for (i, elif) in elifs.iter().enumerate() {
                self.patch(jump_next, self.mark());
                self.compile_expr(&elif.cond)?;
                jump_next = self.mark();
                self.emit_no_operand(Opcode::JumpIfFalse);
                if i == elifs.len() - 1 {
                    jump_else = Some(jump_next);
                }
                self.compile_block(&elif.body)?;
                quit_marks.push(self.mark());
                self.emit_no_operand(Opcode::Jump);
            }
        }

        self.patch(jump_else.expect("jump_else is always set"), self.mark());
        if let Some(else_body) = else_body {
            self.compile_block(else_body)?;
        }
        for mark in quit_marks {
            self.patch(mark, self.mark());
        }
        self.emit_no_operand(Opcode::Nop);
        Ok(())
    }

    fn compile_block(&mut self, statements: &[Stmt]) -> CompileResult<()> {
        self.ctx.symbols.push_block();
        for stmt in statements {
            self.compile_stmt(stmt)?;
        }
        self.ctx.symbols.pop();
        Ok(())
    }

    /// `continue` targets loop-start (before the condition is re-evaluated,
    /// after `init`), so it re-checks the condition but skips `post` - this
    /// matches the documented semantics exactly; it is not a bug to fix.
    fn compile_for(&mut self, init: Option<&Stmt>, cond: Option<&Expr>, post: Option<&Stmt>, body: &[Stmt]) -> CompileResult<()> {
        self.loops.push(LoopMarks {
            breaks: Vec::new(),
            continues: Vec::new(),
        });
        self.ctx.symbols.push_block();

        if let Some(init) = init {
            self.compile_stmt(init)?;
        }

        let start_mark = self.mark();
        if let Some(cond) = cond {
            self.compile_expr(cond)?;
        } else {
            self.emit(Opcode::LoadTrue, 0);
        }
        let break_mark = self.mark();
        self.emit_no_operand(Opcode::JumpIfFalse);
        self.loops.last_mut().unwrap().breaks.push(break_mark);

        for stmt in body {
            self.compile_stmt(stmt)?;
        }

        if let Some(post) = post {
            self.compile_stmt(post)?;
        }
        self.emit(Opcode::Jump, start_mark as u32);

        let quit_mark = self.mark();
        self.emit_no_operand(Opcode::Nop);

        self.ctx.symbols.pop();
        let loop_marks = self.loops.pop().unwrap();
        for mark in loop_marks.continues {
            self.patch(mark, start_mark);
        }
        for mark in loop_marks.breaks {
            self.patch(mark, quit_mark);
        }
        Ok(())
    }

    fn compile_function_decl(&mut self, name: &str, params: &[String], body: &[Stmt], position: &Position) -> CompileResult<()> {
        let symbol = self.ctx.symbols.resolve_or_declare_write(name);
        self.compile_function_body(name.to_owned(), params, body, position)?;
        match symbol.scope {
            Scope::Local => self.emit(Opcode::StoreLocal, symbol.index),
            Scope::Upvalue => self.emit(Opcode::StoreOuter, symbol.index),
            Scope::Global => self.emit(Opcode::StoreGlobal, symbol.index),
        };
        Ok(())
    }

    /// Compiles a function body into its own `CompiledFunction`, appends it
    /// to the constant pool, and emits `LoadConst <fn>; Closure` in the
    /// *enclosing* function so the closure ends up on top of the stack.
    /// Shared by both `FunctionDecl` and the `FunctionLit` expression - the
    /// declaration form additionally stores the result afterward.
    fn compile_function_body(&mut self, name: String, params: &[String], body: &[Stmt], position: &Position) -> CompileResult<()> {
        self.ctx.symbols.push_function();
        for param in params {
            self.ctx.symbols.declare_local(param);
        }

        let outer_instructions = std::mem::take(&mut self.instructions);
        let outer_loops = std::mem::take(&mut self.loops);

        for stmt in body {
            self.compile_stmt(stmt)?;
        }
        self.emit(Opcode::LoadNull, 0);
        self.emit(Opcode::Return, 0);

        let table_id = self.ctx.symbols.current_id();
        let (num_locals, upvalues) = self.finish_table(table_id);
        let function_instructions = std::mem::replace(&mut self.instructions, outer_instructions);
        self.loops = outer_loops;
        self.ctx.symbols.pop();

        let _ = position;
        let compiled = Rc::new(CompiledFunction {
            name,
            instructions: function_instructions,
            param_names: params.to_vec(),
            num_locals,
            upvalues,
        });
        let const_idx = self.ctx.append_function_constant(compiled);
        self.emit(Opcode::LoadConst, const_idx);
        self.emit_no_operand(Opcode::Closure);
        Ok(())
    }

    /// Evaluates the RHS list left to right, then each target in reverse, so
    /// every target's store sees its paired value already beneath whatever
    /// that target pushes for its own addressing (container/index, or
    /// container/name) - this is what makes `a, b = b, a` a true swap
    /// (§4.4 "Assignment").
    fn compile_assign(&mut self, targets: &[Expr], values: &[Expr], _position: &Position) -> CompileResult<()> {
        for value in values {
            self.compile_expr(value)?;
        }
        for target in targets.iter().rev() {
            self.compile_store_target(target)?;
        }
        Ok(())
    }

    fn compile_store_target(&mut self, target: &Expr) -> CompileResult<()> {
        match target {
            Expr::Identifier { name, .. } => {
                let symbol = self.ctx.symbols.resolve_or_declare_write(name);
                match symbol.scope {
                    Scope::Local => self.emit(Opcode::StoreLocal, symbol.index),
                    Scope::Upvalue => self.emit(Opcode::StoreOuter, symbol.index),
                    Scope::Global => self.emit(Opcode::StoreGlobal, symbol.index),
                };
                Ok(())
            }
            Expr::Index { value, index, .. } => {
                self.compile_expr(value)?;
                self.compile_expr(index)?;
                self.emit_no_operand(Opcode::StoreIndex);
                Ok(())
            }
            Expr::Attribute { value, name, .. } => {
                self.compile_expr(value)?;
                let idx = self.ctx.add_string_constant(name);
                self.emit(Opcode::LoadConst, idx);
                self.emit_no_operand(Opcode::StoreAttribute);
                Ok(())
            }
            other => Err(CompileError::new("invalid assignment target", other.position().clone())),
        }
    }

    fn compile_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        match expr {
            Expr::Null(_) => {
                self.emit(Opcode::LoadNull, 0);
            }
            Expr::True(_) => {
                self.emit(Opcode::LoadTrue, 0);
            }
            Expr::False(_) => {
                self.emit(Opcode::LoadFalse, 0);
            }
            Expr::Int(value, _) => {
                let idx = self.ctx.add_int_constant(*value);
                self.emit(Opcode::LoadConst, idx);
            }
            Expr::Float(value, _) => {
                let idx = self.ctx.add_float_constant(*value);
                self.emit(Opcode::LoadConst, idx);
            }
            Expr::String(value, _) => {
                let idx = self.ctx.add_string_constant(value);
                self.emit(Opcode::LoadConst, idx);
            }
            Expr::List(items, _) => {
                for item in items {
                    self.compile_expr(item)?;
                }
                self.emit(Opcode::BuildList, items.len() as u32);
            }
            Expr::Dict(entries, _) => {
                for (key, value) in entries {
                    let idx = self.ctx.add_string_constant(key);
                    self.emit(Opcode::LoadConst, idx);
                    self.compile_expr(value)?;
                }
                self.emit(Opcode::BuildDict, entries.len() as u32);
            }
            Expr::Identifier {
                name,
                is_assign_target,
                position,
            } => {
                debug_assert!(!is_assign_target, "assign-target identifiers are compiled via compile_store_target");
                let symbol = self.ctx.symbols.resolve_read(name, position)?;
                match symbol.scope {
                    Scope::Local => self.emit(Opcode::LoadLocal, symbol.index),
                    Scope::Upvalue => self.emit(Opcode::LoadOuter, symbol.index),
                    Scope::Global => self.emit(Opcode::LoadGlobal, symbol.index),
                };
            }
            Expr::Index { value, index, .. } => {
                self.compile_expr(value)?;
                self.compile_expr(index)?;
                self.emit_no_operand(Opcode::LoadIndex);
            }
            Expr::Attribute { value, name, .. } => {
                self.compile_expr(value)?;
                let idx = self.ctx.add_string_constant(name);
                self.emit(Opcode::LoadConst, idx);
                self.emit_no_operand(Opcode::LoadAttribute);
            }
            Expr::FunctionLit { params, body, position } => {
                self.compile_function_body("<anonymous>".to_owned(), params, body, position)?;
            }
            Expr::Call { callee, args, .. } => {
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.compile_expr(callee)?;
                self.emit(Opcode::Call, args.len() as u32);
            }
            Expr::Unary { op, expr, .. } => {
                self.compile_expr(expr)?;
                let opcode = match op {
                    UnaryOp::BitNot => Opcode::UnaryBitNot,
                    UnaryOp::Not => Opcode::UnaryNot,
                    UnaryOp::Pos => Opcode::UnaryPlus,
                    UnaryOp::Neg => Opcode::UnaryMinus,
                };
                self.emit_no_operand(opcode);
            }
            Expr::Binary { op, left, right, .. } => self.compile_binary(*op, left, right)?,
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
                ..
            } => {
                self.compile_expr(cond)?;
                let jump_else = self.mark();
                self.emit_no_operand(Opcode::JumpIfFalse);
                self.compile_expr(then_expr)?;
                let jump_end = self.mark();
                self.emit_no_operand(Opcode::Jump);
                self.patch(jump_else, self.mark());
                self.compile_expr(else_expr)?;
                self.patch(jump_end, self.mark());
            }
        }
        Ok(())
    }

    fn compile_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> CompileResult<()> {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            self.compile_expr(left)?;
            let mark = self.mark();
            self.emit_no_operand(if op == BinaryOp::And {
                Opcode::JumpIfFalseOrPop
            } else {
                Opcode::JumpIfTrueOrPop
            });
            self.compile_expr(right)?;
            self.patch(mark, self.mark());
            return Ok(());
        }

        self.compile_expr(left)?;
        self.compile_expr(right)?;
        let opcode = match op {
            BinaryOp::Add => Opcode::Add,
            BinaryOp::Sub => Opcode::Sub,
            BinaryOp::Mul => Opcode::Mul,
            BinaryOp::Div => Opcode::Div,
            BinaryOp::Mod => Opcode::Mod,
            BinaryOp::Lt => Opcode::Lt,
            BinaryOp::Lte => Opcode::Lte,
            BinaryOp::Gt => Opcode::Gt,
            BinaryOp::Gte => Opcode::Gte,
            BinaryOp::Eq => Opcode::Eq,
            BinaryOp::Neq => Opcode::Neq,
            BinaryOp::BitAnd => Opcode::BitAnd,
            BinaryOp::BitOr => Opcode::BitOr,
            BinaryOp::BitXor => Opcode::BitXor,
            BinaryOp::Shl => Opcode::BitLhs,
            BinaryOp::Shr => Opcode::BitRhs,
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        };
        self.emit_no_operand(opcode);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn compile(source: &str) -> Rc<CompiledFunction> {
        let mut parser = Parser::new("<test>", source.as_bytes());
        let chunk = parser.parse().expect("parse");
        let mut ctx = Context::new();
        Compiler::new(&mut ctx).compile_chunk(&chunk).expect("compile")
    }

    #[test]
    fn literal_and_print_compiles_without_error() {
        let func = compile("print(1 + 2)\n");
        assert!(func.instructions.iter().any(|i| i.opcode() == Some(Opcode::Add)));
        assert!(func.instructions.last().unwrap().opcode() == Some(Opcode::Return));
    }

    #[test]
    fn undeclared_read_is_a_compile_error() {
        let mut parser = Parser::new("<test>", b"print(x)\n");
        let chunk = parser.parse().expect("parse");
        let mut ctx = Context::new();
        let err = Compiler::new(&mut ctx).compile_chunk(&chunk).unwrap_err();
        assert!(err.message.contains("undeclared"));
    }

    #[test]
    fn closure_over_outer_local_emits_upvalue_load() {
        let func = compile("n = 0\nfn counter(){ n = n + 1\n return n }\n");
        assert!(func.instructions.iter().any(|i| i.opcode() == Some(Opcode::Closure)));
    }

    #[test]
    fn for_loop_continue_targets_loop_start_not_post() {
        let func = compile("for i=0;i<5;i=i+1 {\n if i==1 { continue }\n print(i)\n }\n");
        // every Jump with no-pending-patch operand should resolve to some
        // earlier-or-equal index; we only assert the shape compiles cleanly.
        assert!(func.instructions.iter().any(|i| i.opcode() == Some(Opcode::JumpIfFalse)));
    }
}
