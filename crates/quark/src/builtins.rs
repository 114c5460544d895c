//! Built-in functions and standard-library modules (§6 / §11.1, §11.3).
//!
//! Each built-in is a plain `fn(&mut Context, &[Value]) -> RunResult<Value>`
//! — no trait object, no closure capturing state, since none of these need
//! to. `BuiltinFunction` is the enum `Value::BuiltinFunction` actually
//! stores; `strum` gives it name<->variant conversion instead of a
//! hand-written match, mirroring how the teacher derives its own builtin
//! registry.

use std::fmt::Write as _;
use std::io::Write as _;

use indexmap::IndexMap;

use crate::context::Context;
use crate::error::{RunResult, RuntimeError};
use crate::value::Value;

pub type BuiltinFn = fn(&mut Context, &[Value]) -> RunResult<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::IntoStaticStr, strum::Display)]
pub enum BuiltinFunction {
    #[strum(serialize = "print")]
    Print,
    #[strum(serialize = "println")]
    Println,
    #[strum(serialize = "panic")]
    Panic,
    #[strum(serialize = "input")]
    Input,
    #[strum(serialize = "length")]
    Length,
    #[strum(serialize = "typename")]
    Typename,
    #[strum(serialize = "import")]
    Import,
    #[strum(serialize = "to_bool")]
    ToBool,
    #[strum(serialize = "to_int")]
    ToInt,
    #[strum(serialize = "to_float")]
    ToFloat,
    #[strum(serialize = "to_string")]
    ToString,
    #[strum(serialize = "chr")]
    Chr,
    #[strum(serialize = "abs")]
    MathAbs,
    #[strum(serialize = "pow")]
    MathPow,
    #[strum(serialize = "fromCharCode")]
    StringsFromCharCode,
    #[strum(serialize = "createWithLength")]
    ArraysCreateWithLength,
    #[strum(serialize = "fill")]
    ArraysFill,
}

impl BuiltinFunction {
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Fixed arity, or `None` for the variadic `print`/`println`.
    pub fn arity(self) -> Option<usize> {
        match self {
            Self::Print | Self::Println => None,
            Self::Input => Some(0),
            Self::Panic
            | Self::Length
            | Self::Typename
            | Self::Import
            | Self::ToBool
            | Self::ToInt
            | Self::ToFloat
            | Self::ToString
            | Self::Chr
            | Self::MathAbs
            | Self::StringsFromCharCode
            | Self::ArraysCreateWithLength => Some(1),
            Self::MathPow | Self::ArraysFill => Some(2),
        }
    }

    pub fn call(self, ctx: &mut Context, args: &[Value]) -> RunResult<Value> {
        if let Some(expected) = self.arity() {
            if args.len() != expected {
                return Err(RuntimeError::WrongArity {
                    name: self.name().to_owned(),
                    expected,
                    got: args.len(),
                });
            }
        }
        match self {
            Self::Print => builtin_print(ctx, args, false),
            Self::Println => builtin_print(ctx, args, true),
            Self::Panic => builtin_panic(args),
            Self::Input => builtin_input(ctx),
            Self::Length => builtin_length(args),
            Self::Typename => Ok(Value::new_string(&ctx.heap, args[0].type_name())),
            Self::Import => crate::context::builtin_import(ctx, args),
            Self::ToBool => Ok(Value::Bool(args[0].truthy())),
            Self::ToInt => builtin_to_int(ctx, args),
            Self::ToFloat => builtin_to_float(args),
            Self::ToString => Ok(Value::new_string(&ctx.heap, args[0].display_string())),
            Self::Chr => builtin_chr(ctx, args),
            Self::MathAbs => builtin_math_abs(args),
            Self::MathPow => builtin_math_pow(args),
            Self::StringsFromCharCode => builtin_chr(ctx, args),
            Self::ArraysCreateWithLength => builtin_arrays_create_with_length(ctx, args),
            Self::ArraysFill => builtin_arrays_fill(args),
        }
    }
}

fn builtin_print(ctx: &mut Context, args: &[Value], newline: bool) -> RunResult<Value> {
    let mut out = String::new();
    for arg in args {
        let _ = write!(out, "{}", arg.display_string());
    }
    if newline {
        out.push('\n');
    }
    let _ = ctx.stdout.write_all(out.as_bytes());
    Ok(Value::Null)
}

fn builtin_panic(args: &[Value]) -> RunResult<Value> {
    eprintln!("panic: {}", args[0].display_string());
    Ok(Value::Null)
}

fn builtin_input(ctx: &mut Context) -> RunResult<Value> {
    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) | Err(_) => Ok(Value::Null),
        Ok(_) => {
            let trimmed = line.trim_end_matches(['\n', '\r']);
            Ok(Value::new_string(&ctx.heap, trimmed))
        }
    }
}

fn builtin_length(args: &[Value]) -> RunResult<Value> {
    use crate::heap::HeapData;
    let len = match &args[0] {
        Value::String(h) => match &*h.borrow() {
            HeapData::String(s) => s.len(),
            _ => unreachable!(),
        },
        Value::List(h) => match &*h.borrow() {
            HeapData::List(v) => v.len(),
            _ => unreachable!(),
        },
        Value::Dict(h) => match &*h.borrow() {
            HeapData::Dict(m) => m.len(),
            _ => unreachable!(),
        },
        other => {
            return Err(RuntimeError::TypeError(format!(
                "length() expects a string, list, or dict, got {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(len as i64))
}

fn builtin_to_int(ctx: &mut Context, args: &[Value]) -> RunResult<Value> {
    let _ = ctx;
    Ok(Value::Int(match &args[0] {
        Value::Null => 0,
        Value::Bool(b) => i64::from(*b),
        Value::Int(i) => *i,
        Value::Float(f) => *f as i64,
        Value::String(_) => args[0].display_string().trim().parse::<i64>().unwrap_or(0),
        other => return Err(RuntimeError::TypeError(format!("cannot convert {} to int", other.type_name()))),
    }))
}

fn builtin_to_float(args: &[Value]) -> RunResult<Value> {
    Ok(Value::Float(match &args[0] {
        Value::Null => 0.0,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        Value::String(_) => args[0].display_string().trim().parse::<f64>().unwrap_or(0.0),
        other => return Err(RuntimeError::TypeError(format!("cannot convert {} to float", other.type_name()))),
    }))
}

fn builtin_chr(ctx: &mut Context, args: &[Value]) -> RunResult<Value> {
    let Value::Int(code) = &args[0] else {
        return Err(RuntimeError::TypeError(format!("chr() expects an int, got {}", args[0].type_name())));
    };
    let code = u32::try_from(*code).map_err(|_| RuntimeError::TypeError(format!("{code} is not a valid char code")))?;
    let ch = char::from_u32(code).ok_or_else(|| RuntimeError::TypeError(format!("{code} is not a valid char code")))?;
    Ok(Value::new_string(&ctx.heap, ch.to_string()))
}

fn builtin_math_abs(args: &[Value]) -> RunResult<Value> {
    match &args[0] {
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(RuntimeError::TypeError(format!("abs() expects a float, got {}", other.type_name()))),
    }
}

fn builtin_math_pow(args: &[Value]) -> RunResult<Value> {
    match (&args[0], &args[1]) {
        (Value::Float(base), Value::Float(exp)) => Ok(Value::Float(base.powf(*exp))),
        _ => Err(RuntimeError::TypeError("pow() expects two floats".to_owned())),
    }
}

fn builtin_arrays_create_with_length(ctx: &mut Context, args: &[Value]) -> RunResult<Value> {
    let Value::Int(n) = &args[0] else {
        return Err(RuntimeError::TypeError(format!(
            "createWithLength() expects an int, got {}",
            args[0].type_name()
        )));
    };
    let n = usize::try_from(*n).map_err(|_| RuntimeError::TypeError("createWithLength() expects a non-negative length".to_owned()))?;
    Ok(Value::new_list(&ctx.heap, vec![Value::Null; n]))
}

fn builtin_arrays_fill(args: &[Value]) -> RunResult<Value> {
    use crate::heap::HeapData;
    let Value::List(h) = &args[0] else {
        return Err(RuntimeError::TypeError(format!("fill() expects a list, got {}", args[0].type_name())));
    };
    let fill_value = args[1].clone();
    match &mut *h.borrow_mut() {
        HeapData::List(items) => {
            for slot in items.iter_mut() {
                *slot = fill_value.clone();
            }
        }
        _ => unreachable!(),
    }
    Ok(args[0].clone())
}

/// Builds the `math`/`strings`/`arrays`/`fmt`/`os`/`time` module dicts
/// installed as globals at context creation (§11.3). `fmt`/`os`/`time` are
/// reserved names with empty bodies: the specification scopes their
/// functionality out, but the identifiers still exist so user code that
/// merely references the module (without calling anything on it) doesn't
/// hit an undeclared-identifier error.
pub fn stdlib_modules(heap: &crate::heap::Heap) -> Vec<(&'static str, Value)> {
    let mut math = IndexMap::new();
    math.insert("PI".to_owned(), Value::Float(std::f64::consts::PI));
    math.insert("E".to_owned(), Value::Float(std::f64::consts::E));
    math.insert("abs".to_owned(), Value::BuiltinFunction(BuiltinFunction::MathAbs));
    math.insert("pow".to_owned(), Value::BuiltinFunction(BuiltinFunction::MathPow));

    let mut strings = IndexMap::new();
    strings.insert(
        "fromCharCode".to_owned(),
        Value::BuiltinFunction(BuiltinFunction::StringsFromCharCode),
    );

    let mut arrays = IndexMap::new();
    arrays.insert(
        "createWithLength".to_owned(),
        Value::BuiltinFunction(BuiltinFunction::ArraysCreateWithLength),
    );
    arrays.insert("fill".to_owned(), Value::BuiltinFunction(BuiltinFunction::ArraysFill));

    vec![
        ("math", Value::Dict(heap.alloc_dict(math))),
        ("strings", Value::Dict(heap.alloc_dict(strings))),
        ("arrays", Value::Dict(heap.alloc_dict(arrays))),
        ("fmt", Value::Dict(heap.alloc_dict(IndexMap::new()))),
        ("os", Value::Dict(heap.alloc_dict(IndexMap::new()))),
        ("time", Value::Dict(heap.alloc_dict(IndexMap::new()))),
    ]
}

pub const GLOBAL_BUILTINS: &[BuiltinFunction] = &[
    BuiltinFunction::Print,
    BuiltinFunction::Println,
    BuiltinFunction::Panic,
    BuiltinFunction::Input,
    BuiltinFunction::Length,
    BuiltinFunction::Typename,
    BuiltinFunction::Import,
    BuiltinFunction::ToBool,
    BuiltinFunction::ToInt,
    BuiltinFunction::ToFloat,
    BuiltinFunction::ToString,
    BuiltinFunction::Chr,
];
