//! Everyday text helpers.

use std::fmt::Write as _;

use ecow::EcoString;

use crate::values::{FuncMap, Function, FunctionError, ParamType, Signature, Value};

use super::{rest, to_function_error};

pub fn register_text_functions(funcs: FuncMap) -> FuncMap {
    funcs
        .bind(
            Function::new(
                "print",
                Signature::new([]).variadic(ParamType::Any).returns(ParamType::Str),
                |args| Ok(Value::str(sprint(rest(args)))),
            )
            .with_fast_path(|_, tail| Ok(Value::str(sprint(tail))))
            .pure(),
        )
        .bind(
            Function::new(
                "printf",
                Signature::new([ParamType::Str])
                    .variadic(ParamType::Any)
                    .returns(ParamType::Str),
                |args| {
                    let format = args.first().and_then(Value::as_str).unwrap_or_default();
                    sprintf(format, tail(args)).map(Value::str)
                },
            )
            .with_fast_path(|fixed, tail| {
                let format = fixed.first().and_then(Value::as_str).unwrap_or_default();
                sprintf(format, tail).map(Value::str)
            })
            .pure(),
        )
        .bind(
            Function::new(
                "len",
                Signature::new([ParamType::Any]).returns(ParamType::Int),
                |args| {
                    let value = args.first().cloned().unwrap_or_default().stackable();
                    match value.len() {
                        Some(len) => i64::try_from(len).map(Value::Int).map_err(to_function_error),
                        None => Err(FunctionError::new(format!(
                            "len of type {}",
                            value.type_name()
                        ))),
                    }
                },
            )
            .pure(),
        )
        .bind(
            Function::new(
                "not",
                Signature::new([ParamType::Any]).returns(ParamType::Bool),
                |args| Ok(Value::Bool(!args.first().is_some_and(Value::is_true))),
            )
            .pure(),
        )
        .bind(
            Function::new(
                "eq",
                Signature::new([ParamType::Any])
                    .variadic(ParamType::Any)
                    .returns(ParamType::Bool),
                |args| eq(args.first(), tail(args)),
            )
            .with_fast_path(|fixed, tail| eq(fixed.first(), tail))
            .pure(),
        )
        .bind(case("lower", str::to_lowercase))
        .bind(case("upper", str::to_uppercase))
}

/// Variadic operands following a single fixed parameter.
fn tail(args: &[Value]) -> &[Value] {
    args.get(1..).map(rest).unwrap_or_default()
}

fn case(name: &str, convert: fn(&str) -> String) -> Function {
    Function::new(
        name,
        Signature::new([ParamType::Str]).returns(ParamType::Str),
        move |args| {
            let s = args.first().and_then(Value::as_str).unwrap_or_default();
            Ok(Value::str(convert(s)))
        },
    )
    .pure()
}

/// Whether `first` equals any of `others`.
fn eq(first: Option<&Value>, others: &[Value]) -> Result<Value, FunctionError> {
    let Some(first) = first else {
        return Err(FunctionError::new("missing argument for comparison"));
    };
    if others.is_empty() {
        return Err(FunctionError::new("missing argument for comparison"));
    }
    let first = first.clone().stackable();
    Ok(Value::Bool(
        others.iter().any(|other| same(&first, &other.clone().stackable())),
    ))
}

/// Numbers compare by value across int and float.
fn same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(i), Value::Float(f)) | (Value::Float(f), Value::Int(i)) => *i as f64 == *f,
        _ => match (a.as_str(), b.as_str()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
    }
}

// ============================================================================
// Formatting
// ============================================================================

fn is_string(value: &Value) -> bool {
    matches!(value, Value::Str(_) | Value::Html(_) | Value::Js(_))
}

/// Operands in their default form, separated by a space when neither side is
/// a string.
pub(crate) fn sprint(args: &[Value]) -> EcoString {
    let mut out = EcoString::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !is_string(&args[i - 1]) && !is_string(arg) {
            out.push(' ');
        }
        let _ = write!(out, "{arg}");
    }
    out
}

/// A subset of printf verbs: `%v %s %d %f %q %t %x %%`, with an optional
/// precision for `%f` (`%.2f`). Extra or missing operands are reported
/// inline, as in `%!d(MISSING)`.
pub(crate) fn sprintf(format: &str, args: &[Value]) -> Result<EcoString, FunctionError> {
    let mut out = EcoString::new();
    let mut args = args.iter();
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(d);
                chars.next();
            }
            precision = Some(digits.parse::<usize>().unwrap_or(0));
        }
        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = args.next() else {
            let _ = write!(out, "%!{verb}(MISSING)");
            continue;
        };
        format_verb(&mut out, verb, precision, arg).map_err(to_function_error)?;
    }
    let extra: Vec<&Value> = args.collect();
    if !extra.is_empty() {
        out.push_str("%!(EXTRA ");
        for (i, arg) in extra.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}={arg}", arg.type_name());
        }
        out.push(')');
    }
    Ok(out)
}

fn format_verb(
    out: &mut EcoString,
    verb: char,
    precision: Option<usize>,
    arg: &Value,
) -> std::fmt::Result {
    let arg = arg.clone().stackable();
    match (verb, &arg) {
        ('v' | 's', _) => write!(out, "{arg}"),
        ('d', Value::Int(i)) => write!(out, "{i}"),
        ('f', Value::Float(f)) => write!(out, "{:.*}", precision.unwrap_or(6), f),
        ('f', Value::Int(i)) => write!(out, "{:.*}", precision.unwrap_or(6), *i as f64),
        ('q', Value::Str(s) | Value::Html(s) | Value::Js(s)) => write!(out, "{:?}", s.as_str()),
        ('t', Value::Bool(b)) => write!(out, "{b}"),
        ('x', Value::Int(i)) => write!(out, "{i:x}"),
        ('x', Value::Str(s) | Value::Html(s) | Value::Js(s)) => {
            for byte in s.as_bytes() {
                write!(out, "{byte:02x}")?;
            }
            Ok(())
        }
        _ => write!(out, "%!{verb}({}={arg})", arg.type_name()),
    }
}

#[cfg(test)]
#[path = "text_test.rs"]
mod text_test;
