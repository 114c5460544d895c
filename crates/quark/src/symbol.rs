//! Scoped symbol tables: local/upvalue/global classification (§4.3).
//!
//! A fresh global table is created once per module. Each function or block
//! pushes a child scope. Pushing a *function* scope re-materializes every
//! name currently visible from the parent as either a global (unchanged) or
//! a freshly indexed upvalue recording where the original binding lives.
//! Pushing a *block* scope just inherits the parent's symbols and counters
//! as-is, since blocks share their enclosing function's local numbering.

use ahash::AHashMap;

use crate::error::{CompileError, CompileResult};
use crate::token::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    Upvalue,
    Global,
}

/// One resolved name: which scope it lives in, its slot index within that
/// scope, and — for upvalues — where the captured binding lives in the
/// enclosing function (`outer_scope`, `outer_index`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub scope: Scope,
    pub index: u32,
    pub outer_scope: Option<Scope>,
    pub outer_index: u32,
}

impl Symbol {
    fn local(index: u32) -> Self {
        Self {
            scope: Scope::Local,
            index,
            outer_scope: None,
            outer_index: 0,
        }
    }

    fn global(index: u32) -> Self {
        Self {
            scope: Scope::Global,
            index,
            outer_scope: None,
            outer_index: 0,
        }
    }

    fn upvalue(index: u32, outer_scope: Scope, outer_index: u32) -> Self {
        Self {
            scope: Scope::Upvalue,
            index,
            outer_scope: Some(outer_scope),
            outer_index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Global,
    Function,
    Block,
}

/// One node in the scope tree. Tables form a tree via `parent` indices into
/// the `SymbolTables` arena that owns them all, so a compiled function can
/// keep a cheap reference to "its" table without borrowing issues.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    kind: ScopeKind,
    parent: Option<usize>,
    names: AHashMap<String, Symbol>,
    /// Insertion order of upvalues, for `OpClosure`'s emission (see
    /// `bytecode::compiler`), since the VM needs to walk them in index order.
    upvalue_order: Vec<String>,
    local_count: u32,
    upvalue_count: u32,
    global_count: u32,
}

impl SymbolTable {
    fn new_global() -> Self {
        Self {
            kind: ScopeKind::Global,
            parent: None,
            names: AHashMap::new(),
            upvalue_order: Vec::new(),
            local_count: 0,
            upvalue_count: 0,
            global_count: 0,
        }
    }

    pub fn local_count(&self) -> u32 {
        self.local_count
    }

    pub fn upvalue_count(&self) -> u32 {
        self.upvalue_count
    }

    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.names.get(name).copied()
    }

    /// Returns upvalues in index order: `(name, symbol)`.
    pub fn upvalues_in_order(&self) -> Vec<(&str, Symbol)> {
        self.upvalue_order
            .iter()
            .map(|name| (name.as_str(), self.names[name]))
            .collect()
    }
}

/// Owns every `SymbolTable` created while compiling one module, so tables can
/// reference their parent by index instead of by borrow.
pub struct SymbolTables {
    tables: Vec<SymbolTable>,
    current: usize,
}

impl SymbolTables {
    pub fn new() -> Self {
        Self {
            tables: vec![SymbolTable::new_global()],
            current: 0,
        }
    }

    pub fn current(&self) -> &SymbolTable {
        &self.tables[self.current]
    }

    pub fn current_id(&self) -> usize {
        self.current
    }

    pub fn table(&self, id: usize) -> &SymbolTable {
        &self.tables[id]
    }

    /// Resolves `name` by walking from the current scope toward the globals,
    /// per §4.3 rule 1/2. Returns `None` if nowhere declares it (a
    /// compile-time error for the caller to raise with the right position).
    pub fn resolve(&self, name: &str) -> Option<Symbol> {
        self.current().lookup(name)
    }

    /// Declares `name` as a new local in the current scope. Used for
    /// assignment to an unknown name inside a function/block (§4.3).
    pub fn declare_local(&mut self, name: &str) -> Symbol {
        let table = &mut self.tables[self.current];
        let index = table.local_count;
        table.local_count += 1;
        let symbol = Symbol::local(index);
        table.names.insert(name.to_owned(), symbol);
        symbol
    }

    /// Declares `name` as a new global. Used for assignment to an unknown
    /// name at module top level.
    pub fn declare_global(&mut self, name: &str) -> Symbol {
        // Globals live in the single global table; `current` may itself be
        // that table (module top level) or a descendant, in which case the
        // new global must still be recorded at the root so every scope sees
        // it going forward.
        let root = self.root_id();
        let index = self.tables[root].global_count;
        self.tables[root].global_count += 1;
        let symbol = Symbol::global(index);
        self.tables[root].names.insert(name.to_owned(), symbol);
        if self.current != root {
            self.tables[self.current].names.insert(name.to_owned(), symbol);
        }
        symbol
    }

    fn root_id(&self) -> usize {
        let mut id = self.current;
        while let Some(parent) = self.tables[id].parent {
            id = parent;
        }
        id
    }

    /// Pushes a block scope: inherits every name and counter from the parent
    /// as-is (§4.3 rule 4).
    pub fn push_block(&mut self) {
        let parent_id = self.current;
        let parent = self.tables[parent_id].clone();
        let child = SymbolTable {
            kind: ScopeKind::Block,
            parent: Some(parent_id),
            names: parent.names,
            upvalue_order: parent.upvalue_order,
            local_count: parent.local_count,
            upvalue_count: parent.upvalue_count,
            global_count: parent.global_count,
        };
        self.tables.push(child);
        self.current = self.tables.len() - 1;
    }

    /// Pushes a function scope: every name visible in the parent is
    /// re-materialized — globals pass through unchanged, everything else is
    /// promoted to a fresh upvalue recording where it lived (§4.3 rule 3).
    pub fn push_function(&mut self) {
        let parent_id = self.current;
        let parent = &self.tables[parent_id];
        let mut names = AHashMap::new();
        let mut upvalue_order = Vec::new();
        let mut upvalue_count = 0u32;
        for (name, symbol) in &parent.names {
            let new_symbol = match symbol.scope {
                Scope::Global => *symbol,
                Scope::Local | Scope::Upvalue => {
                    let upvalue = Symbol::upvalue(upvalue_count, symbol.scope, symbol.index);
                    upvalue_count += 1;
                    upvalue_order.push(name.clone());
                    upvalue
                }
            };
            names.insert(name.clone(), new_symbol);
        }
        let global_count = parent.global_count;
        let child = SymbolTable {
            kind: ScopeKind::Function,
            parent: Some(parent_id),
            names,
            upvalue_order,
            local_count: 0,
            upvalue_count,
            global_count,
        };
        self.tables.push(child);
        self.current = self.tables.len() - 1;
    }

    /// Pops back to the parent of the current scope.
    pub fn pop(&mut self) {
        let parent = self.tables[self.current].parent.expect("cannot pop the global scope");
        self.current = parent;
    }

    pub fn is_global_scope(&self) -> bool {
        self.current().kind == ScopeKind::Global
    }

    /// Looks up a name for reading, raising a `CompileError` at `position` if
    /// it is undeclared anywhere visible — §4.3: "reading an unknown name is
    /// a compile-time error."
    pub fn resolve_read(&self, name: &str, position: &Position) -> CompileResult<Symbol> {
        self.resolve(name)
            .ok_or_else(|| CompileError::new(format!("undeclared identifier: {name}"), position.clone()))
    }

    /// Resolves or declares a name being assigned to: existing binding if
    /// any, else a new local (inner scope) or new global (module top level),
    /// per §4.3's final paragraph.
    pub fn resolve_or_declare_write(&mut self, name: &str) -> Symbol {
        if let Some(symbol) = self.resolve(name) {
            return symbol;
        }
        if self.is_global_scope() {
            self.declare_global(name)
        } else {
            self.declare_local(name)
        }
    }
}

impl Default for SymbolTables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_inherits_parent_locals() {
        let mut tables = SymbolTables::new();
        tables.declare_global("g");
        tables.push_block();
        tables.declare_local("x");
        assert_eq!(tables.resolve("g").unwrap().scope, Scope::Global);
        assert_eq!(tables.resolve("x").unwrap().scope, Scope::Local);
    }

    #[test]
    fn function_scope_promotes_locals_to_upvalues() {
        let mut tables = SymbolTables::new();
        tables.push_block();
        tables.declare_local("x");
        tables.push_function();
        let sym = tables.resolve("x").unwrap();
        assert_eq!(sym.scope, Scope::Upvalue);
        assert_eq!(sym.outer_scope, Some(Scope::Local));
    }

    #[test]
    fn function_scope_leaves_globals_untouched() {
        let mut tables = SymbolTables::new();
        tables.declare_global("g");
        tables.push_function();
        let sym = tables.resolve("g").unwrap();
        assert_eq!(sym.scope, Scope::Global);
    }

    #[test]
    fn nested_function_scopes_chain_upvalues() {
        let mut tables = SymbolTables::new();
        tables.declare_local("x"); // top level acts like a block for this test
        tables.push_function();
        tables.push_function();
        let sym = tables.resolve("x").unwrap();
        assert_eq!(sym.scope, Scope::Upvalue);
        assert_eq!(sym.outer_scope, Some(Scope::Upvalue));
    }

    #[test]
    fn assigning_unknown_name_at_top_level_creates_global() {
        let mut tables = SymbolTables::new();
        let sym = tables.resolve_or_declare_write("x");
        assert_eq!(sym.scope, Scope::Global);
    }

    #[test]
    fn assigning_unknown_name_in_function_creates_local() {
        let mut tables = SymbolTables::new();
        tables.push_function();
        let sym = tables.resolve_or_declare_write("x");
        assert_eq!(sym.scope, Scope::Local);
    }
}
