//! `Context`: the single owner of every piece of mutable state a running
//! program touches (§5 "Concurrency & resource model").
//!
//! A context owns one value stack, one frame stack, one constant pool, one
//! globals vector, one set of compiled and built-in modules, and one export
//! staging area. Nothing here is shared across contexts; running two
//! programs concurrently means constructing two contexts. Cancellation is a
//! single atomic flag sampled by the VM between instructions, so a host can
//! request it from another thread without synchronizing anything else.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::AHashMap;

use crate::ast::Stmt;
use crate::bytecode::{CompiledFunction, Compiler};
use crate::builtins::{stdlib_modules, BuiltinFunction, GLOBAL_BUILTINS};
use crate::error::{QuarkError, QuarkResult, RuntimeError, RunResult};
use crate::heap::Heap;
use crate::parser::Parser;
use crate::symbol::SymbolTables;
use crate::value::Value;
use crate::vm;

/// Value-stack depth at which a push raises `StackOverflow` (§5).
pub const MAX_STACK: usize = 1024;
/// Call-frame depth at which a call raises `StackOverflow` (§5).
pub const MAX_FRAMES: usize = 128;
/// Export staging area capacity (§5, §6 "export").
pub const MAX_EXPORTS: usize = 128;

/// One active call: the function running, its captured upvalue cells, the
/// instruction pointer to resume the caller at, and the stack base this
/// frame's locals start from.
pub(crate) struct Frame {
    pub function: Rc<CompiledFunction>,
    pub upvalues: Vec<crate::heap::HeapId>,
    pub return_ip: isize,
    pub bp: usize,
}

pub struct Context {
    pub(crate) heap: Heap,
    pub(crate) constants: Vec<Value>,
    int_const_index: AHashMap<i64, u32>,
    float_const_index: AHashMap<u64, u32>,
    string_const_index: AHashMap<String, u32>,
    pub(crate) symbols: SymbolTables,
    pub(crate) globals: Vec<Value>,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) ip: isize,
    pub(crate) export_stage: Vec<Value>,
    builtin_modules: AHashMap<String, Value>,
    compiled_modules: AHashMap<PathBuf, Value>,
    import_base: PathBuf,
    pub(crate) abort: Arc<AtomicBool>,
    pub(crate) stdout: Box<dyn Write>,
}

impl Context {
    pub fn new() -> Self {
        Self::with_import_base(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    pub fn with_import_base(import_base: PathBuf) -> Self {
        let heap = Heap::new();
        let mut ctx = Self {
            symbols: SymbolTables::new(),
            constants: Vec::new(),
            int_const_index: AHashMap::new(),
            float_const_index: AHashMap::new(),
            string_const_index: AHashMap::new(),
            globals: Vec::new(),
            stack: Vec::new(),
            frames: Vec::new(),
            ip: -1,
            export_stage: Vec::new(),
            builtin_modules: AHashMap::new(),
            compiled_modules: AHashMap::new(),
            import_base,
            abort: Arc::new(AtomicBool::new(false)),
            stdout: Box::new(std::io::stdout()),
            heap,
        };
        ctx.install_builtins();
        ctx
    }

    fn install_builtins(&mut self) {
        for builtin in GLOBAL_BUILTINS {
            self.define_global(builtin.name(), Value::BuiltinFunction(*builtin));
        }
        for (name, value) in stdlib_modules(&self.heap) {
            self.builtin_modules.insert(name.to_owned(), value.clone());
            self.define_global(name, value);
        }
    }

    fn define_global(&mut self, name: &str, value: Value) {
        self.symbols.declare_global(name);
        self.globals.push(value);
    }

    /// A handle the host can flip from another thread to cancel a running
    /// program; sampled between instructions by the VM.
    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn set_stdout(&mut self, writer: Box<dyn Write>) {
        self.stdout = writer;
    }

    /// Lexes, parses, compiles, and runs `source` to completion, returning
    /// whatever value the program's implicit or explicit `return`/`export`
    /// produced. Globals, the symbol table, and the module cache persist
    /// across calls on the same context, which is what lets the REPL compile
    /// and run one line at a time (§11.2) and lets `import` share a single
    /// namespace with the importing script (§6 "import").
    pub fn run_source(&mut self, filename: &str, source: &str) -> QuarkResult<Value> {
        let chunk = self.parse(filename, source)?;
        let entry = self.compile(&chunk)?;
        Ok(vm::run_entry(self, entry)?)
    }

    pub fn parse(&self, filename: &str, source: &str) -> QuarkResult<Stmt> {
        let mut parser = Parser::new(filename.to_owned(), source.as_bytes());
        Ok(parser.parse()?)
    }

    pub fn compile(&mut self, chunk: &Stmt) -> QuarkResult<Rc<CompiledFunction>> {
        Ok(Compiler::new(self).compile_chunk(chunk)?)
    }

    pub(crate) fn add_int_constant(&mut self, value: i64) -> u32 {
        if let Some(&idx) = self.int_const_index.get(&value) {
            return idx;
        }
        let idx = self.constants.len() as u32;
        self.constants.push(Value::Int(value));
        self.int_const_index.insert(value, idx);
        idx
    }

    pub(crate) fn add_float_constant(&mut self, value: f64) -> u32 {
        let key = value.to_bits();
        if let Some(&idx) = self.float_const_index.get(&key) {
            return idx;
        }
        let idx = self.constants.len() as u32;
        self.constants.push(Value::Float(value));
        self.float_const_index.insert(key, idx);
        idx
    }

    pub(crate) fn add_string_constant(&mut self, value: &str) -> u32 {
        if let Some(&idx) = self.string_const_index.get(value) {
            return idx;
        }
        let idx = self.constants.len() as u32;
        self.constants.push(Value::new_string(&self.heap, value));
        self.string_const_index.insert(value.to_owned(), idx);
        idx
    }

    pub(crate) fn append_function_constant(&mut self, function: Rc<CompiledFunction>) -> u32 {
        let idx = self.constants.len() as u32;
        self.constants.push(Value::Function(function));
        idx
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves `path` against the context's import base, runs it (or returns
/// the cached result if already imported), and returns the value it staged
/// via `export` — or `null` if the module never exported anything (§6
/// "import").
pub(crate) fn builtin_import(ctx: &mut Context, args: &[Value]) -> RunResult<Value> {
    let Value::String(h) = &args[0] else {
        return Err(RuntimeError::TypeError(format!("import() expects a string path, got {}", args[0].type_name())));
    };
    let path = match &*h.borrow() {
        crate::heap::HeapData::String(s) => s.clone(),
        _ => unreachable!(),
    };

    if let Some(module) = ctx.builtin_modules.get(&path) {
        return Ok(module.clone());
    }

    let abs = normalize(&ctx.import_base, Path::new(&path));
    if let Some(cached) = ctx.compiled_modules.get(&abs) {
        return Ok(cached.clone());
    }

    let source = std::fs::read_to_string(&abs).map_err(|e| RuntimeError::ImportError(format!("{}: {e}", abs.display())))?;
    let filename = abs.display().to_string();
    let chunk = ctx
        .parse(&filename, &source)
        .map_err(|e| RuntimeError::ImportError(e.to_string()))?;
    let entry = ctx.compile(&chunk).map_err(|e| RuntimeError::ImportError(e.to_string()))?;

    let stage_depth = ctx.export_stage.len();
    vm::run_entry(ctx, entry)?;
    let value = if ctx.export_stage.len() > stage_depth {
        ctx.export_stage.pop().unwrap_or(Value::Null)
    } else {
        Value::Null
    };

    ctx.compiled_modules.insert(abs, value.clone());
    Ok(value)
}

fn normalize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() { path.to_path_buf() } else { base.join(path) };
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}
