//! Abstract syntax tree produced by the parser and consumed by the compiler.
//!
//! Node variants follow §3 of the language specification directly. Every
//! expression carries the `Position` of its leading token, used for
//! `CompileError`/`RuntimeError` diagnostics further down the pipeline.

use crate::token::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    And,
    Or,
}

/// An expression node. The boolean carried by `Identifier`/`Index`/`Attribute`
/// is the "is an assignment target" flag described in §3 — flipped by the
/// parser when the node is used on the left of `=`, read by the compiler to
/// pick a store opcode instead of re-matching the node shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null(Position),
    True(Position),
    False(Position),
    Int(i64, Position),
    Float(f64, Position),
    String(String, Position),
    List(Vec<Expr>, Position),
    Dict(Vec<(String, Expr)>, Position),
    Identifier {
        name: String,
        is_assign_target: bool,
        position: Position,
    },
    Index {
        value: Box<Expr>,
        index: Box<Expr>,
        is_assign_target: bool,
        position: Position,
    },
    Attribute {
        value: Box<Expr>,
        name: String,
        is_assign_target: bool,
        position: Position,
    },
    FunctionLit {
        params: Vec<String>,
        body: Vec<Stmt>,
        position: Position,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        position: Position,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        position: Position,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        position: Position,
    },
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
        position: Position,
    },
}

impl Expr {
    pub fn position(&self) -> &Position {
        match self {
            Self::Null(p)
            | Self::True(p)
            | Self::False(p)
            | Self::Int(_, p)
            | Self::Float(_, p)
            | Self::String(_, p)
            | Self::List(_, p)
            | Self::Dict(_, p) => p,
            Self::Identifier { position, .. }
            | Self::Index { position, .. }
            | Self::Attribute { position, .. }
            | Self::FunctionLit { position, .. }
            | Self::Call { position, .. }
            | Self::Unary { position, .. }
            | Self::Binary { position, .. }
            | Self::Ternary { position, .. } => position,
        }
    }

    /// Re-flags this expression as an assignment target, if its shape allows
    /// it (identifier, index, or attribute access). Returns `Err` with the
    /// original expression's position for anything else, matching §4.2's
    /// "any other shape is a parse error" rule.
    pub fn into_assign_target(self) -> Result<Expr, Position> {
        match self {
            Expr::Identifier { name, position, .. } => Ok(Expr::Identifier {
                name,
                is_assign_target: true,
                position,
            }),
            Expr::Index {
                value, index, position, ..
            } => Ok(Expr::Index {
                value,
                index,
                is_assign_target: true,
                position,
            }),
            Expr::Attribute {
                value, name, position, ..
            } => Ok(Expr::Attribute {
                value,
                name,
                is_assign_target: true,
                position,
            }),
            other => Err(other.position().clone()),
        }
    }
}

/// An `if`/`else if`/`else` arm list.
#[derive(Debug, Clone, PartialEq)]
pub struct ElifArm {
    pub cond: Expr,
    pub body: Vec<Stmt>,
}

/// A statement node.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Chunk(Vec<Stmt>),
    Block(Vec<Stmt>),
    Return(Vec<Expr>, Position),
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        elifs: Vec<ElifArm>,
        else_body: Option<Vec<Stmt>>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Vec<Stmt>,
    },
    FunctionDecl {
        name: String,
        params: Vec<String>,
        body: Vec<Stmt>,
        position: Position,
    },
    Assign {
        targets: Vec<Expr>,
        values: Vec<Expr>,
        position: Position,
    },
    Import {
        path: String,
        alias: Option<String>,
        position: Position,
    },
    Export(Expr, Position),
    ExprStmt(Expr),
    CallStmt(Expr),
    Break(Position),
    Continue(Position),
    Debugger(Position),
    Empty,
}
