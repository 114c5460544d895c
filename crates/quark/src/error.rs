//! Error taxonomy for every stage of the pipeline: lexing, parsing, compiling,
//! and running. Every variant here is returned, never panicked, for any
//! condition a user's source program can trigger.

use std::fmt;

use crate::token::Position;

/// A lexical error: an unrecognized character, an unterminated string, or an
/// invalid escape sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub position: Position,
}

impl LexError {
    pub fn new(message: impl Into<String>, position: Position) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: lexical error: {}", self.position, self.message)
    }
}

/// A syntax error: a token mismatch or grammar violation at a known position.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: Position,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: Position) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: parse error: {}", self.position, self.message)
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        Self::new(err.message, err.position)
    }
}

/// A compile-time error: an undeclared identifier, an invalid assignment
/// target, or an unsupported construct discovered while emitting bytecode.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub message: String,
    pub position: Position,
}

impl CompileError {
    pub fn new(message: impl Into<String>, position: Position) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: compile error: {}", self.position, self.message)
    }
}

/// A runtime error raised while the VM is executing bytecode.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// A builtin or compiled function was called with the wrong number of arguments.
    WrongArity { name: String, expected: usize, got: usize },
    /// An operator or builtin received operand(s) of an unsupported type.
    TypeError(String),
    /// An index was of the wrong type, or out of range.
    IndexError(String),
    /// An attribute access used an empty or unsupported name.
    AttributeError(String),
    /// The call-frame stack exceeded `MAX_FRAMES`.
    StackOverflow,
    /// The bytecode stream contained an opcode the VM does not know how to execute.
    InvalidOpcode(u8),
    /// A reserved-but-unimplemented construct was reached at runtime (e.g. `OpImport`).
    NotImplemented(String),
    /// `import` failed to resolve, read, or compile the requested module.
    ImportError(String),
    /// The host requested cancellation via the abort flag.
    Cancelled,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongArity { name, expected, got } => {
                write!(f, "wrong number of arguments to '{name}': expected {expected}, got {got}")
            }
            Self::TypeError(msg) => write!(f, "type error: {msg}"),
            Self::IndexError(msg) => write!(f, "index error: {msg}"),
            Self::AttributeError(msg) => write!(f, "attribute error: {msg}"),
            Self::StackOverflow => write!(f, "stack overflow"),
            Self::InvalidOpcode(op) => write!(f, "invalid opcode: 0x{op:02x}"),
            Self::NotImplemented(what) => write!(f, "not implemented: {what}"),
            Self::ImportError(msg) => write!(f, "import error: {msg}"),
            Self::Cancelled => write!(f, "execution cancelled"),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Sum of every error kind the host may see out of `Context::run_*`.
#[derive(Debug, Clone, PartialEq)]
pub enum QuarkError {
    Lex(LexError),
    Parse(ParseError),
    Compile(CompileError),
    Runtime(RuntimeError),
}

impl fmt::Display for QuarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lex(e) => write!(f, "{e}"),
            Self::Parse(e) => write!(f, "{e}"),
            Self::Compile(e) => write!(f, "{e}"),
            Self::Runtime(e) => write!(f, "runtime error: {e}"),
        }
    }
}

impl std::error::Error for QuarkError {}

impl From<LexError> for QuarkError {
    fn from(err: LexError) -> Self {
        Self::Lex(err)
    }
}

impl From<ParseError> for QuarkError {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<CompileError> for QuarkError {
    fn from(err: CompileError) -> Self {
        Self::Compile(err)
    }
}

impl From<RuntimeError> for QuarkError {
    fn from(err: RuntimeError) -> Self {
        Self::Runtime(err)
    }
}

pub type LexResult<T> = Result<T, LexError>;
pub type ParseResult<T> = Result<T, ParseError>;
pub type CompileResult<T> = Result<T, CompileError>;
pub type RunResult<T> = Result<T, RuntimeError>;
pub type QuarkResult<T> = Result<T, QuarkError>;
