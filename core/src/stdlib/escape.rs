//! Escaping helpers inserted by the HTML-escaping pass.
//!
//! Each escaper accepts any number of arguments, stringifies them the way
//! printing does, and escapes the result for its context. Values already
//! carrying the target content type are passed through untouched, which is
//! what lets the compiler drop the call when it knows the argument type.

use ecow::EcoString;
use serde_json::{Map as JsonMap, Number, Value as Json};

use crate::values::{FuncMap, Function, FunctionError, ParamType, Signature, Value};
use crate::vm::print_value;

use super::{rest, to_function_error};

pub const HTML_ESCAPER: &str = "html_template_htmlescaper";
pub const HTML_STRING_ESCAPER: &str = "html_template_htmlstringescaper";
pub const JS_ESCAPER: &str = "html_template_jsvalescaper";
pub const COMMENT_ESCAPER: &str = "html_template_commentescaper";

pub fn register_escape_functions(funcs: FuncMap) -> FuncMap {
    funcs
        .bind(variadic(HTML_ESCAPER, ParamType::Html, html_escaper))
        .bind(
            Function::new(
                HTML_STRING_ESCAPER,
                Signature::new([ParamType::Str]).returns(ParamType::Html),
                |args| {
                    let s = args.first().and_then(Value::as_str).unwrap_or_default();
                    Ok(Value::html(escape_html(s)))
                },
            )
            .pure(),
        )
        .bind(variadic(JS_ESCAPER, ParamType::Js, js_val_escaper))
        .bind(variadic(COMMENT_ESCAPER, ParamType::Html, |_| Ok(Value::html(""))))
}

fn variadic(
    name: &str,
    returns: ParamType,
    f: fn(&[Value]) -> Result<Value, FunctionError>,
) -> Function {
    Function::new(
        name,
        Signature::new([]).variadic(ParamType::Any).returns(returns),
        move |args| f(rest(args)),
    )
    .with_fast_path(move |_, tail| f(tail))
    .pure()
}

// ============================================================================
// HTML
// ============================================================================

fn html_escaper(args: &[Value]) -> Result<Value, FunctionError> {
    if let [Value::Html(s)] = args {
        return Ok(Value::Html(s.clone()));
    }
    let s = stringify(args)?;
    Ok(Value::html(escape_html(&s)))
}

/// Escape text for use in HTML element content or a quoted attribute.
pub fn escape_html(s: &str) -> EcoString {
    let mut out = EcoString::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\0' => out.push('\u{FFFD}'),
            '"' => out.push_str("&#34;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '+' => out.push_str("&#43;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

/// Print each argument, separating two operands with a space when neither is
/// a string. Nil arguments print as nothing.
fn stringify(args: &[Value]) -> Result<String, FunctionError> {
    let mut out = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !is_string(&args[i - 1]) && !is_string(arg) {
            out.push(b' ');
        }
        print_value(&mut out, arg).map_err(to_function_error)?;
    }
    String::from_utf8(out).map_err(to_function_error)
}

fn is_string(value: &Value) -> bool {
    matches!(value, Value::Str(_) | Value::Html(_) | Value::Js(_))
}

// ============================================================================
// JavaScript
// ============================================================================

fn js_val_escaper(args: &[Value]) -> Result<Value, FunctionError> {
    let json = match args {
        [Value::Js(s)] => return Ok(Value::Js(s.clone())),
        [value] => to_json(value)?,
        _ => Json::String(stringify(args)?),
    };
    let encoded = serde_json::to_string(&json).map_err(to_function_error)?;
    Ok(Value::js(escape_json_for_script(&encoded)))
}

/// JSON text can't close a `<script>` element or start an HTML comment once
/// these are escaped.
fn escape_json_for_script(json: &str) -> EcoString {
    let mut out = EcoString::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

fn to_json(value: &Value) -> Result<Json, FunctionError> {
    Ok(match value {
        Value::Nil | Value::Ptr(None) | Value::Dyn(None) => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::Number(Number::from(*i)),
        Value::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Str(s) | Value::Html(s) | Value::Js(s) => Json::String(s.to_string()),
        Value::Seq(items) => Json::Array(items.iter().map(to_json).collect::<Result<_, _>>()?),
        Value::Map(map) => {
            let mut object = JsonMap::new();
            for (key, value) in map.sorted_entries() {
                object.insert(key.to_string(), to_json(value)?);
            }
            Json::Object(object)
        }
        Value::Record(record) => {
            let mut object = JsonMap::new();
            for (name, value) in record.ty().field_names().iter().zip(record.fields()) {
                object.insert(name.to_string(), to_json(value)?);
            }
            Json::Object(object)
        }
        Value::Ptr(Some(inner)) | Value::Dyn(Some(inner)) => to_json(inner)?,
        Value::Func(_) | Value::Stream(_) => {
            return Err(FunctionError::new(format!(
                "can't encode {} as JavaScript",
                value.type_name()
            )));
        }
    })
}

#[cfg(test)]
#[path = "escape_test.rs"]
mod escape_test;
