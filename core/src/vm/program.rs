//! The compiled artifact shared by every render.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use ecow::EcoString;
use hashbrown::HashMap;

use crate::api::RunOptions;
use crate::syntax::Pos;
use crate::values::{Function, Value};

use super::instruction_set::Instruction;
use super::state::State;

/// String table slot of the root variable (`$`).
pub(crate) const ROOT_VAR: u32 = 0;
/// String table slot of the `$Vars` variable.
pub(crate) const VARS_VAR: u32 = 1;

/// Maps an instruction offset back to the syntax node that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Context {
    pub(crate) pc: usize,
    pub(crate) pos: Pos,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct CompiledTemplate {
    pub(crate) code: Vec<Instruction>,
    /// Entries are ordered by `pc`. An error at `pc` is attributed to the
    /// first entry whose `pc` is not smaller.
    pub(crate) context: Vec<Context>,
    pub(crate) source: Option<Arc<str>>,
}

impl CompiledTemplate {
    pub(crate) fn position_of(&self, pc: usize) -> Option<Pos> {
        self.context.iter().find(|c| c.pc >= pc).map(|c| c.pos)
    }
}

/// A compiled template set.
///
/// Programs are immutable once compiled and can be rendered concurrently from
/// many threads; each render gets its own execution state, taken from an
/// internal pool when [`RunOptions::pool_states`] is on.
pub struct Program {
    strings: Vec<EcoString>,
    string_index: HashMap<EcoString, u32>,
    /// `strings`, pre-wrapped as values for STRING.
    rstrings: Vec<Value>,
    values: Vec<Value>,
    bytes: Vec<Arc<[u8]>>,
    funcs: Vec<Arc<Function>>,
    func_index: HashMap<EcoString, u32>,
    pub(crate) templates: HashMap<EcoString, CompiledTemplate>,
    root: EcoString,
    pool: Mutex<Vec<State>>,
    pub(crate) run_options: RunOptions,
}

impl Program {
    pub(crate) fn new(root: &str, run_options: RunOptions) -> Self {
        let mut program = Self {
            strings: Vec::new(),
            string_index: HashMap::new(),
            rstrings: Vec::new(),
            values: Vec::new(),
            bytes: Vec::new(),
            funcs: Vec::new(),
            func_index: HashMap::new(),
            templates: HashMap::new(),
            root: root.into(),
            pool: Mutex::new(Vec::new()),
            run_options,
        };
        // The VM looks these up by fixed index.
        program.add_string("");
        program.add_string("Vars");
        program
    }

    /// Name of the template rendered when no name is given.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Compiled template names, sorted.
    pub fn template_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(EcoString::as_str).collect();
        names.sort_unstable();
        names
    }

    // ========================================================================
    // Tables
    // ========================================================================

    /// Intern `s`. `None` when the table is full.
    pub(crate) fn add_string(&mut self, s: &str) -> Option<u32> {
        if let Some(&index) = self.string_index.get(s) {
            return Some(index);
        }
        let index = u32::try_from(self.strings.len()).ok()?;
        let s = EcoString::from(s);
        self.strings.push(s.clone());
        self.rstrings.push(Value::Str(s.clone()));
        self.string_index.insert(s, index);
        Some(index)
    }

    pub(crate) fn add_value(&mut self, value: Value) -> Option<u32> {
        let index = u32::try_from(self.values.len()).ok()?;
        self.values.push(value);
        Some(index)
    }

    pub(crate) fn add_bytes(&mut self, bytes: &[u8]) -> Option<u32> {
        let index = u32::try_from(self.bytes.len()).ok()?;
        self.bytes.push(bytes.into());
        Some(index)
    }

    /// Register a function, deduplicated by name. Indices must fit the
    /// 16-bit FUNC operand.
    pub(crate) fn add_func(&mut self, func: &Arc<Function>) -> Option<u32> {
        if let Some(&index) = self.func_index.get(func.name()) {
            return Some(index);
        }
        let index = u32::try_from(self.funcs.len()).ok().filter(|&i| i <= u32::from(u16::MAX))?;
        self.funcs.push(Arc::clone(func));
        self.func_index.insert(func.name().into(), index);
        Some(index)
    }

    pub(crate) fn string(&self, index: u32) -> Option<&EcoString> {
        self.strings.get(index as usize)
    }

    pub(crate) fn rstring(&self, index: u32) -> Option<&Value> {
        self.rstrings.get(index as usize)
    }

    pub(crate) fn value(&self, index: u32) -> Option<&Value> {
        self.values.get(index as usize)
    }

    pub(crate) fn bytes(&self, index: u32) -> Option<&[u8]> {
        self.bytes.get(index as usize).map(|b| b.as_ref())
    }

    pub(crate) fn func(&self, index: u32) -> Option<&Arc<Function>> {
        self.funcs.get(index as usize)
    }

    pub(crate) fn code(&self, name: &str) -> Option<&[Instruction]> {
        self.templates.get(name).map(|t| t.code.as_slice())
    }

    // ========================================================================
    // State pool
    // ========================================================================

    pub(crate) fn checkout(&self, pooled: bool) -> State {
        if pooled {
            if let Some(state) = self.pool.lock().ok().and_then(|mut pool| pool.pop()) {
                tracing::debug!("Reusing pooled execution state");
                return state;
            }
        }
        State::default()
    }

    pub(crate) fn checkin(&self, mut state: State, pooled: bool) {
        if !pooled {
            return;
        }
        state.reset();
        if let Ok(mut pool) = self.pool.lock() {
            pool.push(state);
        }
    }

    // ========================================================================
    // Disassembly
    // ========================================================================

    /// Human-readable listing of a template's instructions, one per line, with
    /// table operands resolved. `None` if there's no such template.
    pub fn disassemble(&self, name: &str) -> Option<String> {
        let code = self.code(name)?;
        let mut out = String::new();
        for (pc, inst) in code.iter().enumerate() {
            let _ = write!(out, "{pc:04} {inst}");
            if let Some(note) = self.annotate(inst) {
                let _ = write!(out, " ; {note}");
            }
            out.push('\n');
        }
        Some(out)
    }

    fn annotate(&self, inst: &Instruction) -> Option<String> {
        match *inst {
            Instruction::Field { name, .. }
            | Instruction::SetVar { name, .. }
            | Instruction::String(name)
            | Instruction::UnsetVar(name)
            | Instruction::Var(name) => self.string(name).map(|s| format!("{s:?}")),
            Instruction::Func { func, .. } => self.func(func).map(|f| f.name().to_string()),
            Instruction::Val(i) => self.value(i).map(|v| format!("{v:?}")),
            Instruction::Wb(i) => self
                .bytes(i)
                .map(|b| format!("{:?}", String::from_utf8_lossy(b))),
            Instruction::Template { ns, name } => {
                let ns = self.string(u32::from(ns))?;
                let name = self.string(name)?;
                Some(format!("{ns:?} {name:?}"))
            }
            _ => None,
        }
    }
}

impl core::fmt::Debug for Program {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Program")
            .field("root", &self.root)
            .field("templates", &self.template_names())
            .field("strings", &self.strings.len())
            .field("values", &self.values.len())
            .field("funcs", &self.funcs.len())
            .finish()
    }
}
