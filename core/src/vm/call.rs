//! Argument checking and coercion shared by function and method calls.

use smallvec::SmallVec;

use crate::values::{FunctionError, ParamType, Signature, Value};

use super::error::RuntimeError;

pub(crate) type Args = SmallVec<[Value; 4]>;

pub(crate) fn check_arity(name: &str, sig: &Signature, given: usize) -> Result<(), RuntimeError> {
    let fixed = sig.params().len();
    let ok = if sig.is_variadic() {
        given >= fixed
    } else {
        given == fixed
    };
    if ok {
        Ok(())
    } else {
        Err(RuntimeError::FunctionArityMismatch {
            name: name.to_string(),
            expected: fixed,
            given,
            variadic: sig.is_variadic(),
        })
    }
}

/// Convert `value` to something `ty` accepts.
///
/// Nil becomes the parameter's zero value, pointers and boxes are followed
/// once, and addressable records are passed by pointer when the parameter
/// wants one.
pub(crate) fn coerce(
    name: &str,
    index: usize,
    ty: &ParamType,
    value: Value,
) -> Result<Value, RuntimeError> {
    if matches!(value, Value::Nil | Value::Dyn(None)) {
        return Ok(ty.zero());
    }
    if ty.accepts(&value) {
        return Ok(value);
    }
    if let Some(inner) = value.deref_once() {
        if ty.accepts(&inner) {
            return Ok(inner);
        }
    }
    if let ParamType::Ptr(_) = ty {
        if value.is_addressable() {
            let ptr = Value::ptr(value.clone());
            if ty.accepts(&ptr) {
                return Ok(ptr);
            }
        }
    }
    Err(RuntimeError::ArgumentTypeMismatch {
        name: name.to_string(),
        index,
        expected: ty.to_string(),
        found: value.type_name(),
    })
}

/// Coerce every argument in place against `sig`.
pub(crate) fn coerce_args(name: &str, sig: &Signature, args: &mut Args) -> Result<(), RuntimeError> {
    for (index, slot) in args.iter_mut().enumerate() {
        let ty = match sig.param(index) {
            Some(ty) => ty,
            None => continue,
        };
        let value = std::mem::take(slot);
        *slot = coerce(name, index, ty, value)?;
    }
    Ok(())
}

/// Replace everything past the fixed parameters with a single `Seq`.
pub(crate) fn pack_variadic(fixed: usize, args: &mut Args) {
    let tail: Vec<Value> = args.drain(fixed..).collect();
    args.push(Value::seq(tail));
}

pub(crate) fn returned(name: &str, result: Result<Value, FunctionError>) -> Result<Value, RuntimeError> {
    match result {
        Ok(value) => Ok(value.stackable()),
        Err(err) => Err(RuntimeError::FunctionReturnedError {
            name: name.to_string(),
            message: err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::TypeDescriptor;

    #[test]
    fn test_arity() {
        let sig = Signature::new([ParamType::Int]);
        assert!(check_arity("f", &sig, 1).is_ok());
        let err = check_arity("f", &sig, 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "function \"f\" requires exactly 1 arguments, 2 given"
        );

        let sig = Signature::new([ParamType::Int]).variadic(ParamType::Any);
        assert!(check_arity("f", &sig, 5).is_ok());
        assert!(check_arity("f", &sig, 0).is_err());
    }

    #[test]
    fn test_nil_becomes_zero_value() {
        assert_eq!(
            coerce("f", 0, &ParamType::Int, Value::Nil).unwrap(),
            Value::Int(0)
        );
        assert_eq!(
            coerce("f", 0, &ParamType::Str, Value::Dyn(None)).unwrap(),
            Value::str("")
        );
    }

    #[test]
    fn test_pointers_are_followed() {
        let v = coerce("f", 0, &ParamType::Int, Value::ptr(Value::Int(4))).unwrap();
        assert_eq!(v, Value::Int(4));
    }

    #[test]
    fn test_addressable_record_taken_by_pointer() {
        let ty = TypeDescriptor::builder("T").field("A").build();
        let rec = Value::ptr(Value::record(&ty, vec![])).deref_once().unwrap();
        let v = coerce("f", 0, &ParamType::Ptr(ty.clone()), rec).unwrap();
        assert!(matches!(v, Value::Ptr(Some(_))));

        let plain = Value::record(&ty, vec![]);
        assert!(coerce("f", 0, &ParamType::Ptr(ty), plain).is_err());
    }

    #[test]
    fn test_mismatch_message() {
        let err = coerce("f", 1, &ParamType::Int, Value::str("x")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "can't call \"f\" with string as argument 1, need int"
        );
    }
}
