//! Built-in functions.
//!
//! Two groups are registered by default:
//! - [`escape`]: the escaping helpers an HTML-escaping pass inserts into
//!   pipelines (`html_template_htmlescaper`, ...). The compiler knows their
//!   names and elides or specializes them when the escaped type is known.
//! - [`text`]: small helpers for everyday templates (`print`, `printf`,
//!   `len`, `not`, `eq`, `lower`, `upper`).
//!
//! Every built-in is pure, so constant pipelines using them are folded at
//! compile time.

use once_cell::sync::Lazy;

use crate::values::{FuncMap, FunctionError, Value};

pub mod escape;
pub mod text;

pub use escape::register_escape_functions;
pub use text::register_text_functions;

static STDLIB: Lazy<FuncMap> =
    Lazy::new(|| register_text_functions(register_escape_functions(FuncMap::new())));

/// Register the whole standard library.
///
/// ```
/// use quill_core::stdlib::register_stdlib;
/// use quill_core::values::FuncMap;
///
/// let funcs = register_stdlib(FuncMap::new());
/// assert!(funcs.contains("printf"));
/// assert!(funcs.contains("html_template_htmlescaper"));
/// ```
pub fn register_stdlib(mut funcs: FuncMap) -> FuncMap {
    if funcs.is_empty() {
        return STDLIB.clone();
    }
    for name in STDLIB.names() {
        if let Some(function) = STDLIB.get(name) {
            funcs.insert_shared(function.clone());
        }
    }
    funcs
}

/// Trailing packed variadic arguments.
fn rest(args: &[Value]) -> &[Value] {
    args.last().and_then(Value::as_seq).unwrap_or_default()
}

fn to_function_error(err: impl std::fmt::Display) -> FunctionError {
    FunctionError::new(err.to_string())
}
