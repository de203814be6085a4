//! The per-render stack machine.

use std::io::{self, Write};

use crate::api::vars::unpack_map;
use crate::values::{Function, KeyKind, Method, ParamType, Receiver, Value};

use super::call::{self, Args};
use super::error::{ExecutionError, RuntimeError};
use super::instruction_set::Instruction;
use super::iter::RangeIter;
use super::location::Location;
use super::program::{Program, ROOT_VAR, VARS_VAR};

/// Mutable machine state for one render. Nested template calls run on the
/// same state.
#[derive(Default)]
pub(crate) struct State {
    stack: Vec<Value>,
    marks: Vec<usize>,
    /// Bindings by interned name. Lookups scan backwards so the innermost
    /// binding wins.
    vars: Vec<(u32, Value)>,
    dots: Vec<Value>,
    iterators: Vec<RangeIter>,
}

/// Outcome of a single instruction.
type Step = Result<Option<i32>, RuntimeError>;

impl State {
    /// Clear every stack, keeping the allocations.
    pub(crate) fn reset(&mut self) {
        self.stack.clear();
        self.marks.clear();
        self.vars.clear();
        self.dots.clear();
        self.iterators.clear();
    }

    /// Render template `name` with `data` as dot and `vars` bound to `$Vars`.
    pub(crate) fn run(
        &mut self,
        program: &Program,
        w: &mut dyn Write,
        name: &str,
        data: Value,
        vars: Value,
    ) -> Result<(), ExecutionError> {
        self.vars.push((VARS_VAR, vars));
        self.execute(program, w, name, "", data)
    }

    /// Run a detached instruction sequence against a nil dot and return the
    /// resulting stack. Output is discarded.
    pub(crate) fn evaluate(
        &mut self,
        program: &Program,
        code: &[Instruction],
    ) -> Result<Vec<Value>, RuntimeError> {
        let mut sink = io::sink();
        let mut dot = Value::Nil;
        self.vars.push((ROOT_VAR, Value::Nil));
        let mut pc = 0;
        while pc < code.len() {
            let inst = code[pc];
            if let Instruction::Template { .. } = inst {
                return Err(RuntimeError::InvalidOpcode("template call in detached code"));
            }
            pc = match self.step(program, &mut sink, inst, &mut dot)? {
                None => pc + 1,
                Some(off) => jump(pc, off, code.len())?,
            };
        }
        Ok(std::mem::take(&mut self.stack))
    }

    fn execute(
        &mut self,
        program: &Program,
        w: &mut dyn Write,
        name: &str,
        ns: &str,
        mut dot: Value,
    ) -> Result<(), ExecutionError> {
        let Some(template) = program.templates.get(name) else {
            return Err(ExecutionError::new(
                RuntimeError::UndefinedTemplate(name.to_string()),
                None,
            ));
        };
        let code = template.code.as_slice();
        self.vars.push((ROOT_VAR, dot.clone()));
        if !ns.is_empty() {
            if let Some(Value::Map(vars)) = self.var(VARS_VAR) {
                let unpacked = unpack_map(vars, ns);
                self.vars.push((VARS_VAR, unpacked));
            }
        }

        let locate = |pc: usize| {
            template
                .position_of(pc)
                .map(|pos| Location::new(name, pos, template.source.as_deref()))
        };

        let mut pc = 0;
        while pc < code.len() {
            let inst = code[pc];
            tracing::trace!(template = name, pc, %inst, "Dispatch");
            if let Instruction::Template { ns, name: callee } = inst {
                // Errors from the callee already carry their own location.
                self.call_template(program, w, ns, callee)
                    .map_err(|e| e.or_locate(|| locate(pc)))?;
                pc += 1;
                continue;
            }
            pc = match self.step(program, w, inst, &mut dot) {
                Ok(None) => pc + 1,
                Ok(Some(off)) => {
                    jump(pc, off, code.len()).map_err(|e| ExecutionError::new(e, locate(pc)))?
                }
                Err(e) => return Err(ExecutionError::new(e, locate(pc))),
            };
        }
        Ok(())
    }

    fn call_template(
        &mut self,
        program: &Program,
        w: &mut dyn Write,
        ns: u16,
        name: u32,
    ) -> Result<(), ExecutionError> {
        let (Some(ns), Some(name)) = (program.string(u32::from(ns)), program.string(name)) else {
            return Err(RuntimeError::InvalidOpcode("template operand out of range").into());
        };
        let dot = self.top().map_err(ExecutionError::from)?.clone();
        let mark = self.vars.len();
        self.execute(program, w, name, ns, dot)?;
        self.vars.truncate(mark);
        Ok(())
    }

    // ========================================================================
    // Instructions
    // ========================================================================

    fn step(&mut self, p: &Program, w: &mut dyn Write, inst: Instruction, dot: &mut Value) -> Step {
        match inst {
            Instruction::Nop => {}
            Instruction::Mark => self.marks.push(self.stack.len()),
            Instruction::Pop(0) => {
                let mark = self
                    .marks
                    .pop()
                    .ok_or(RuntimeError::InvalidOpcode("pop without mark"))?;
                self.stack.truncate(mark);
            }
            Instruction::Pop(n) => {
                let n = n as usize;
                if n > self.stack.len() {
                    return Err(RuntimeError::InvalidOpcode("stack underflow"));
                }
                self.stack.truncate(self.stack.len() - n);
            }
            Instruction::Field { argc, name } => {
                let name = p
                    .string(name)
                    .ok_or(RuntimeError::InvalidOpcode("string index out of range"))?;
                self.field(name, argc as usize)?;
            }
            Instruction::Func { argc, func } => {
                let func = p
                    .func(func)
                    .ok_or(RuntimeError::InvalidOpcode("function index out of range"))?;
                let args = self.pop_args(argc as usize)?;
                let result = call_function(func, args)?;
                self.stack.push(result);
            }
            Instruction::Var(name) => {
                let value = self.var(name).cloned().ok_or_else(|| undefined(p, name))?;
                self.stack.push(value);
            }
            Instruction::Dot => self.stack.push(dot.clone()),
            Instruction::Iter => {
                let iter = RangeIter::new(self.top()?)?;
                self.iterators.push(iter);
            }
            Instruction::Next(off) => {
                let iter = self
                    .iterators
                    .last_mut()
                    .ok_or(RuntimeError::InvalidOpcode("no active iterator"))?;
                match iter.next() {
                    Some((pos, value)) => {
                        self.stack.push(pos);
                        self.stack.push(value);
                    }
                    None => {
                        self.iterators.pop();
                        return Ok(Some(off));
                    }
                }
            }
            Instruction::Jmp(off) => return Ok(Some(off)),
            Instruction::Jmpf(off) => {
                if !self.stack.last().is_some_and(Value::is_true) {
                    return Ok(Some(off));
                }
            }
            Instruction::Jmpt(off) => {
                if self.stack.last().is_some_and(Value::is_true) {
                    return Ok(Some(off));
                }
            }
            Instruction::SetVar { name, assign } => {
                let value = self.pop()?;
                if assign {
                    let slot = self.var_mut(name).ok_or_else(|| undefined(p, name))?;
                    *slot = value;
                } else {
                    self.vars.push((name, value));
                }
            }
            Instruction::UnsetVar(name) => {
                let index = self
                    .vars
                    .iter()
                    .rposition(|(n, _)| *n == name)
                    .ok_or_else(|| undefined(p, name))?;
                self.vars.remove(index);
            }
            Instruction::Print => print_value(w, self.top()?)?,
            Instruction::PushDot => {
                let top = self.top()?.clone();
                self.dots.push(std::mem::replace(dot, top));
            }
            Instruction::PopDot => {
                *dot = self
                    .dots
                    .pop()
                    .ok_or(RuntimeError::InvalidOpcode("no saved dot"))?;
            }
            Instruction::String(i) => {
                let s = p
                    .rstring(i)
                    .ok_or(RuntimeError::InvalidOpcode("string index out of range"))?;
                self.stack.push(s.clone());
            }
            Instruction::Val(i) => {
                let v = p
                    .value(i)
                    .ok_or(RuntimeError::InvalidOpcode("value index out of range"))?;
                self.stack.push(v.clone());
            }
            Instruction::Wb(i) => {
                let bytes = p
                    .bytes(i)
                    .ok_or(RuntimeError::InvalidOpcode("bytes index out of range"))?;
                w.write_all(bytes)?;
            }
            Instruction::Template { .. } => {
                return Err(RuntimeError::InvalidOpcode("template call outside a template"));
            }
        }
        Ok(None)
    }

    /// FIELD: map lookup, method call or record field, in that order.
    fn field(&mut self, name: &str, argc: usize) -> Result<(), RuntimeError> {
        let top = self.pop()?;
        if let Value::Map(map) = &top {
            if map.key_kind() == KeyKind::Str {
                let value = map.get_str(name).cloned().unwrap_or_default();
                self.stack.push(value.stackable());
                return Ok(());
            }
        }
        if let Some((method, receiver)) = find_method(&top, name) {
            let args = self.pop_args(argc)?;
            let result = call_method(method, &receiver, args)?;
            self.stack.push(result);
            return Ok(());
        }

        // Access through a nil pointer or box yields nil.
        let mut target = top;
        while matches!(target, Value::Ptr(_) | Value::Dyn(_)) {
            match target.deref_once() {
                Some(inner) => target = inner,
                None => {
                    self.stack.push(Value::Nil);
                    return Ok(());
                }
            }
        }
        let value = match &target {
            Value::Nil => Value::Nil,
            Value::Record(record) => record
                .field(name)
                .ok_or_else(|| missing_field(&target, name))?
                .stackable(),
            Value::Map(map) if map.key_kind() == KeyKind::Str => {
                map.get_str(name).cloned().unwrap_or_default().stackable()
            }
            other => return Err(missing_field(other, name)),
        };
        self.stack.push(value);
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn top(&self) -> Result<&Value, RuntimeError> {
        self.stack
            .last()
            .ok_or(RuntimeError::InvalidOpcode("stack underflow"))
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or(RuntimeError::InvalidOpcode("stack underflow"))
    }

    /// Arguments are pushed last-to-first, so the popped slice is reversed.
    fn pop_args(&mut self, argc: usize) -> Result<Args, RuntimeError> {
        let len = self.stack.len();
        if argc > len {
            return Err(RuntimeError::InvalidOpcode("stack underflow"));
        }
        let mut args: Args = self.stack.drain(len - argc..).collect();
        args.reverse();
        Ok(args)
    }

    fn var(&self, name: u32) -> Option<&Value> {
        self.vars.iter().rev().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    fn var_mut(&mut self, name: u32) -> Option<&mut Value> {
        self.vars
            .iter_mut()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }
}

fn jump(pc: usize, off: i32, len: usize) -> Result<usize, RuntimeError> {
    let target = (pc as i64)
        .checked_add(i64::from(off))
        .and_then(|t| t.checked_add(1))
        .and_then(|t| usize::try_from(t).ok())
        .filter(|&t| t <= len);
    target.ok_or(RuntimeError::InvalidOpcode("jump out of range"))
}

fn undefined(p: &Program, name: u32) -> RuntimeError {
    RuntimeError::UndefinedVariable {
        name: p.string(name).map(ToString::to_string).unwrap_or_default(),
    }
}

/// Method lookup honoring receiver kinds. Returns the method and the value to
/// pass as its receiver.
fn find_method<'a>(value: &'a Value, name: &str) -> Option<(&'a Method, Value)> {
    match value {
        Value::Record(record) => {
            let method = record.ty().method(name)?;
            match method.receiver() {
                Receiver::Value => Some((method, value.clone())),
                Receiver::Pointer if record.is_addressable() => {
                    Some((method, Value::ptr(value.clone())))
                }
                Receiver::Pointer => None,
            }
        }
        Value::Ptr(Some(inner)) => match inner.as_ref() {
            Value::Record(record) => {
                let method = record.ty().method(name)?;
                let receiver = match method.receiver() {
                    Receiver::Value => value.deref_once().unwrap_or_default(),
                    Receiver::Pointer => value.clone(),
                };
                Some((method, receiver))
            }
            Value::Dyn(Some(boxed)) => find_method(boxed, name),
            _ => None,
        },
        Value::Dyn(Some(boxed)) => find_method(boxed, name),
        _ => None,
    }
}

fn missing_field(value: &Value, name: &str) -> RuntimeError {
    if let Value::Record(record) = value {
        if record
            .ty()
            .method(name)
            .is_some_and(|m| m.receiver() == Receiver::Pointer)
        {
            return RuntimeError::RequiresPointerReceiver {
                name: name.to_string(),
                type_name: record.ty().name().to_string(),
            };
        }
        return RuntimeError::FieldNotFound {
            name: name.to_string(),
            type_name: record.ty().name().to_string(),
        };
    }
    RuntimeError::NotEvaluable {
        name: name.to_string(),
        type_name: value.type_name(),
    }
}

fn call_function(func: &Function, mut args: Args) -> Result<Value, RuntimeError> {
    let sig = func.signature();
    call::check_arity(func.name(), sig, args.len())?;
    call::coerce_args(func.name(), sig, &mut args)?;
    let fixed = sig.params().len();
    let result = match (sig.variadic_type(), func.fast_path()) {
        (Some(ParamType::Any), Some(fast)) => fast(&args[..fixed], &args[fixed..]),
        (Some(_), _) => {
            call::pack_variadic(fixed, &mut args);
            func.invoke(&args)
        }
        (None, _) => func.invoke(&args),
    };
    call::returned(func.name(), result)
}

fn call_method(method: &Method, receiver: &Value, mut args: Args) -> Result<Value, RuntimeError> {
    let sig = method.signature();
    call::check_arity(method.name(), sig, args.len())?;
    call::coerce_args(method.name(), sig, &mut args)?;
    if sig.is_variadic() {
        call::pack_variadic(sig.params().len(), &mut args);
    }
    call::returned(method.name(), method.invoke(receiver, &args))
}

/// Write `value` the way PRINT does.
pub(crate) fn print_value(w: &mut dyn Write, value: &Value) -> Result<(), RuntimeError> {
    match value {
        Value::Str(s) | Value::Html(s) | Value::Js(s) => w.write_all(s.as_bytes())?,
        Value::Nil | Value::Dyn(None) => {}
        Value::Ptr(Some(_)) | Value::Dyn(Some(_)) => {
            if let Some(inner) = value.deref_once() {
                // Pointers to records keep their `&{...}` form.
                if matches!(inner, Value::Record(_)) && matches!(value, Value::Ptr(_)) {
                    write!(w, "{value}")?;
                } else {
                    print_value(w, &inner)?;
                }
            }
        }
        Value::Func(_) | Value::Stream(_) => {
            return Err(RuntimeError::NotPrintable {
                type_name: value.type_name(),
            });
        }
        other => write!(w, "{other}")?,
    }
    Ok(())
}

impl ExecutionError {
    fn or_locate(mut self, locate: impl FnOnce() -> Option<Location>) -> Self {
        if self.location.is_none() {
            self.location = locate();
        }
        self
    }
}

impl From<RuntimeError> for ExecutionError {
    fn from(kind: RuntimeError) -> Self {
        ExecutionError::new(kind, None)
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod state_test;
