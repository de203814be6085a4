//! Syntax tree to bytecode compiler.

use std::sync::Arc;

use crate::{
    api::{CompileOptions, FuncMap, RunOptions, TemplateSet},
    stdlib::escape::{COMMENT_ESCAPER, HTML_ESCAPER, HTML_STRING_ESCAPER, JS_ESCAPER},
    syntax::{Arg, BranchNode, CommandNode, ListNode, Node, NumberNode, PipeNode, Pos, VariableNode},
    values::{ParamType, Value},
    vm::{CompiledTemplate, Instruction, Location, Program, State, print_value},
};

use super::{
    emitter::Emitter,
    error::{CompileError, CompileErrorKind},
    stitch,
};

/// Legacy asset hooks. They are no longer functions: their output is known at
/// compile time and emitted as static bytes.
pub const TOP_ASSETS: &str = "render_top_assets";
pub const BOTTOM_ASSETS: &str = "render_bottom_assets";

/// Separates a template's namespace from its name, as in `ns|name`.
pub const NAMESPACE_SEPARATOR: char = '|';

type CResult<T = ()> = Result<T, CompileError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchKind {
    If,
    With,
    Range,
}

/// Compiles every template of a [`TemplateSet`] into one [`Program`].
///
/// The compiler walks each tree once, emitting into an [`Emitter`]. Branches
/// compile their pieces into separate emitters so they can be measured before
/// the jumps around them are written.
pub(crate) struct BytecodeCompiler<'a> {
    program: Program,
    funcs: &'a FuncMap,
    options: &'a CompileOptions,
    set: &'a TemplateSet,

    /// Template being compiled.
    name: String,
    source: Option<Arc<str>>,
    e: Emitter,

    /// Argument count for the command argument being compiled, one entry per
    /// nested command.
    cmd: Vec<u16>,
    /// Index of the command being compiled within its pipeline.
    pipe: Vec<usize>,
    /// Variables declared in each enclosing branch body.
    scopes: Vec<Vec<u32>>,
    /// Set by the asset hooks: the enclosing action must not PRINT.
    no_print: bool,
    /// Compiling a branch condition, whose declarations the branch binds itself.
    branch_pipe: bool,
}

impl<'a> BytecodeCompiler<'a> {
    pub(crate) fn compile(
        set: &'a TemplateSet,
        funcs: &'a FuncMap,
        options: &'a CompileOptions,
        run_options: RunOptions,
    ) -> Result<Program, CompileError> {
        let mut compiler = BytecodeCompiler {
            program: Program::new(set.root(), run_options),
            funcs,
            options,
            set,
            name: String::new(),
            source: None,
            e: Emitter::default(),
            cmd: Vec::new(),
            pipe: Vec::new(),
            scopes: Vec::new(),
            no_print: false,
            branch_pipe: false,
        };

        for (name, tree) in set.trees() {
            tracing::debug!(template = name.as_str(), "Compiling template");
            compiler.name = name.clone();
            compiler.source = tree.source.clone();
            compiler.no_print = false;
            compiler.walk_list(&tree.root)?;
            let Emitter { buf, ctx } = compiler.e.snap();
            tracing::debug!(
                template = name.as_str(),
                instructions = buf.len(),
                "Compiled template"
            );
            compiler.program.templates.insert(
                name.as_str().into(),
                CompiledTemplate {
                    code: buf,
                    context: ctx,
                    source: tree.source.clone(),
                },
            );
        }

        let mut program = compiler.program;
        if options.stitch {
            stitch::stitch(&mut program);
        }
        Ok(program)
    }

    fn error(&self, kind: CompileErrorKind, pos: Pos) -> CompileError {
        CompileError {
            kind,
            location: Location::new(&self.name, pos, self.source.as_deref()),
        }
    }

    // ========================================================================
    // Tables
    // ========================================================================

    fn intern(&mut self, s: &str, pos: Pos) -> CResult<u32> {
        match self.program.add_string(s) {
            Some(index) => Ok(index),
            None => Err(self.error(CompileErrorKind::TableOverflow("string"), pos)),
        }
    }

    fn value(&mut self, value: Value, pos: Pos) -> CResult<u32> {
        match self.program.add_value(value) {
            Some(index) => Ok(index),
            None => Err(self.error(CompileErrorKind::TableOverflow("value"), pos)),
        }
    }

    fn push_value(&mut self, value: Value, pos: Pos) -> CResult {
        let index = self.value(value, pos)?;
        self.e.push(Instruction::Val(index));
        Ok(())
    }

    fn push_bytes(&mut self, bytes: &[u8], pos: Pos) -> CResult {
        match self.program.add_bytes(bytes) {
            Some(index) => {
                self.e.push(Instruction::Wb(index));
                Ok(())
            }
            None => Err(self.error(CompileErrorKind::TableOverflow("bytes"), pos)),
        }
    }

    fn jump_offset(&self, len: usize, pos: Pos) -> CResult<i32> {
        i32::try_from(len).map_err(|_| self.error(CompileErrorKind::TableOverflow("jump"), pos))
    }

    /// Argument count for the function or method being compiled. The head of
    /// a command that isn't first in its pipeline also receives the previous
    /// command's result.
    fn argc(&self) -> u16 {
        self.cmd.last().copied().unwrap_or(0)
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn walk_list(&mut self, list: &ListNode) -> CResult {
        for node in &list.nodes {
            self.walk_node(node)?;
        }
        self.e.mark(list.pos);
        Ok(())
    }

    fn walk_node(&mut self, node: &Node) -> CResult {
        match node {
            Node::List(list) => return self.walk_list(list),
            Node::Text { pos, text } => self.walk_text(*pos, text)?,
            Node::Action { pos, pipe } => self.walk_action(*pos, pipe)?,
            Node::Comment { .. } => {}
            Node::If(branch) => self.walk_branch(BranchKind::If, branch)?,
            Node::With(branch) => self.walk_branch(BranchKind::With, branch)?,
            Node::Range(branch) => self.walk_branch(BranchKind::Range, branch)?,
            Node::Template { pos, name, pipe } => self.walk_template(*pos, name, pipe.as_ref())?,
            Node::Break { pos } => {
                return Err(self.error(CompileErrorKind::UnsupportedNode("break"), *pos));
            }
            Node::Continue { pos } => {
                return Err(self.error(CompileErrorKind::UnsupportedNode("continue"), *pos));
            }
        }
        self.e.mark(node.pos());
        Ok(())
    }

    fn walk_text(&mut self, pos: Pos, text: &str) -> CResult {
        let mut bytes = text.as_bytes();
        // Leading newline of an HTML template, left behind by its header line.
        if self.e.is_empty() && self.set.content_type().contains("html") && bytes.starts_with(b"\n<")
        {
            bytes = &bytes[1..];
        }
        if !bytes.is_empty() {
            self.push_bytes(bytes, pos)?;
        }
        Ok(())
    }

    fn walk_action(&mut self, pos: Pos, pipe: &PipeNode) -> CResult {
        let saved = self.e.snap();
        self.walk_pipe(pipe)?;
        if pipe.decl.is_empty() && !self.no_print {
            self.e.push(Instruction::Print);
        }
        self.no_print = false;
        let mut action = self.e.snap();
        self.e.restore(saved);

        // A constant that's printed right away becomes static text. Values
        // that can't be printed keep their runtime error.
        if let [Instruction::Val(index), Instruction::Print] = action.buf.as_slice() {
            if let Some(bytes) = self.printed(*index) {
                if !bytes.is_empty() {
                    self.push_bytes(&bytes, pos)?;
                }
                return Ok(());
            }
        }

        action.balance().map_err(|kind| self.error(kind, pos))?;
        self.e.append(action);
        Ok(())
    }

    fn printed(&self, index: u32) -> Option<Vec<u8>> {
        let value = self.program.value(index)?;
        let mut out = Vec::new();
        print_value(&mut out, value).ok()?;
        Some(out)
    }

    fn walk_template(&mut self, pos: Pos, name: &str, pipe: Option<&PipeNode>) -> CResult {
        if !self.set.contains(name) {
            return Err(self.error(CompileErrorKind::UndefinedTemplate(name.to_string()), pos));
        }
        let saved = self.e.snap();
        match pipe {
            Some(pipe) => self.walk_pipe(pipe)?,
            None => self.push_value(Value::Nil, pos)?,
        }
        let mut call = self.e.snap();
        self.e.restore(saved);
        call.balance().map_err(|kind| self.error(kind, pos))?;
        let pop = call.take_pop();
        self.e.append(call);

        // The namespace is relative to the caller's own.
        let target_ns = namespace(name);
        let ns = match namespace(&self.name) {
            "" => target_ns,
            caller_ns => target_ns.strip_prefix(caller_ns).unwrap_or(target_ns),
        };
        let ns = self.intern(ns, pos)?;
        let ns = u16::try_from(ns)
            .map_err(|_| self.error(CompileErrorKind::TableOverflow("string"), pos))?;
        let name = self.intern(name, pos)?;
        self.e.push(Instruction::Template { ns, name });
        self.e.add_pop(pop);
        Ok(())
    }

    // ========================================================================
    // Branches
    // ========================================================================

    /// Compile a branch body. Variables it declares are unset at its end.
    fn walk_body(&mut self, list: &ListNode) -> CResult<Emitter> {
        self.scopes.push(Vec::new());
        let result = self.walk_list(list);
        let declared = self.scopes.pop().unwrap_or_default();
        result?;
        for name in declared.into_iter().rev() {
            self.e.push(Instruction::UnsetVar(name));
        }
        Ok(self.e.snap())
    }

    fn walk_branch(&mut self, kind: BranchKind, branch: &BranchNode) -> CResult {
        let pos = branch.pos;
        let saved = self.e.snap();

        self.branch_pipe = true;
        let result = self.walk_pipe(&branch.pipe);
        self.branch_pipe = false;
        result?;
        let mut pipe = self.e.snap();

        let mut list = self.walk_body(&branch.list)?;
        let mut else_list = match &branch.else_list {
            Some(else_list) => Some(self.walk_body(else_list)?).filter(|e| !e.is_empty()),
            None => None,
        };
        self.e.restore(saved);

        pipe.balance().map_err(|kind| self.error(kind, pos))?;
        let mut pop = pipe.take_pop();
        self.e.append(pipe);

        let mut decl = Vec::with_capacity(branch.pipe.decl.len());
        for var in &branch.pipe.decl {
            decl.push(self.intern(var_name(var), var.pos)?);
        }
        let assign = branch.pipe.is_assign;

        if kind != BranchKind::Range {
            if let Some(&name) = decl.first() {
                // The then-path consumes the condition through SETVAR, so it
                // pops one value less than the else-path.
                list.prepend(Instruction::SetVar { name, assign });
                if !assign {
                    list.push(Instruction::UnsetVar(name));
                }
                list.add_pop(match pop {
                    Some(0) => Some(0),
                    Some(n) if n > 1 => Some(n - 1),
                    _ => None,
                });
                if pop.is_some() {
                    else_list.get_or_insert_with(Emitter::default).add_pop(pop);
                }
                pop = None;
            }
        }

        let skip = list.len() + usize::from(else_list.is_some());
        match kind {
            BranchKind::If => {
                let skip = self.jump_offset(skip, pos)?;
                self.e.push(Instruction::Jmpf(skip));
                self.e.append(list);
            }
            BranchKind::With => {
                let skip = self.jump_offset(skip + 2, pos)?;
                self.e.push(Instruction::Jmpf(skip));
                self.e.push(Instruction::PushDot);
                self.e.append(list);
                self.e.push(Instruction::PopDot);
            }
            BranchKind::Range => {
                if !assign {
                    for &name in &decl {
                        list.push(Instruction::UnsetVar(name));
                    }
                }
                list.push(Instruction::PopDot);
                // Bind (position, value) or drop them.
                match decl.as_slice() {
                    &[key, value, ..] => {
                        list.prepend(Instruction::SetVar { name: key, assign });
                        list.prepend(Instruction::SetVar { name: value, assign });
                    }
                    &[value] => {
                        list.prepend(Instruction::Pop(1));
                        list.prepend(Instruction::SetVar { name: value, assign });
                    }
                    [] => list.prepend(Instruction::Pop(2)),
                }
                list.prepend(Instruction::PushDot);
                // Back to the NEXT right before the body.
                let back = self.jump_offset(list.len() + 2, pos)?;
                list.push(Instruction::Jmp(-back));

                self.e.push(Instruction::Iter);
                let body = list.len();
                match &else_list {
                    None => {
                        let out = self.jump_offset(body, pos)?;
                        self.e.push(Instruction::Next(out));
                    }
                    Some(else_list) => {
                        // First NEXT: empty source goes to the else body,
                        // past the JMP in front of it.
                        let first = self.jump_offset(body + 3, pos)?;
                        self.e.push(Instruction::Next(first));
                        self.e.push(Instruction::Jmp(1));
                        let out = self.jump_offset(body + 1 + else_list.len(), pos)?;
                        self.e.push(Instruction::Next(out));
                    }
                }
                self.e.append(list);
            }
        }
        if let Some(else_list) = else_list {
            let len = self.jump_offset(else_list.len(), pos)?;
            self.e.push(Instruction::Jmp(len));
            self.e.append(else_list);
        }
        self.e.add_pop(pop);
        Ok(())
    }

    // ========================================================================
    // Pipelines
    // ========================================================================

    fn walk_pipe(&mut self, pipe: &PipeNode) -> CResult {
        let saved = self.e.snap();
        for (index, cmd) in pipe.cmds.iter().enumerate() {
            self.pipe.push(index);
            let result = self.walk_command(cmd);
            self.pipe.pop();
            result?;
        }
        let mut body = self.e.snap();
        self.e.restore(saved);
        if self.options.fold_constants && body.len() > 1 && self.is_pure(&body.buf) {
            self.fold(&mut body, pipe.pos)?;
        }
        self.e.append(body);

        if !self.branch_pipe {
            for var in &pipe.decl {
                let name = self.intern(var_name(var), var.pos)?;
                self.e.push(Instruction::SetVar {
                    name,
                    assign: pipe.is_assign,
                });
                if !pipe.is_assign {
                    if let Some(scope) = self.scopes.last_mut() {
                        scope.push(name);
                    }
                }
            }
        }
        self.e.mark(pipe.pos);
        Ok(())
    }

    /// Whether `code` only pushes constants and calls pure functions.
    fn is_pure(&self, code: &[Instruction]) -> bool {
        code.iter().all(|inst| match *inst {
            Instruction::Val(_) | Instruction::String(_) => true,
            Instruction::Func { func, .. } => self.program.func(func).is_some_and(|f| f.is_pure()),
            _ => false,
        })
    }

    /// Run a pure fragment now and replace it with its results. On failure
    /// the fragment is kept so the error surfaces at render time.
    fn fold(&mut self, body: &mut Emitter, pos: Pos) -> CResult {
        let mut state = State::default();
        match state.evaluate(&self.program, &body.buf) {
            Ok(stack) => {
                tracing::debug!(
                    template = %self.name,
                    instructions = body.len(),
                    values = stack.len(),
                    "Folded constant pipeline"
                );
                body.clear();
                for value in stack {
                    let index = self.value(value, pos)?;
                    body.push(Instruction::Val(index));
                }
            }
            Err(err) => {
                tracing::debug!(template = %self.name, error = %err, "Not folding pipeline");
            }
        }
        Ok(())
    }

    /// Arguments are compiled last to first; the head carries the argument
    /// count.
    fn walk_command(&mut self, cmd: &CommandNode) -> CResult {
        let chained = self.pipe.last().is_some_and(|&index| index > 0);
        let head_argc = cmd.args.len().saturating_sub(1) + usize::from(chained);
        let head_argc = u16::try_from(head_argc)
            .map_err(|_| self.error(CompileErrorKind::TableOverflow("argument"), cmd.pos))?;

        self.cmd.push(0);
        for (index, arg) in cmd.args.iter().enumerate().rev() {
            if let Some(argc) = self.cmd.last_mut() {
                *argc = if index == 0 { head_argc } else { 0 };
            }
            if let Err(err) = self.walk_arg(arg) {
                self.cmd.pop();
                return Err(err);
            }
        }
        self.cmd.pop();
        self.e.mark(cmd.pos);
        Ok(())
    }

    fn walk_arg(&mut self, arg: &Arg) -> CResult {
        let pos = arg.pos();
        match arg {
            Arg::Bool { value, .. } => self.push_value(Value::Bool(*value), pos)?,
            Arg::Number(number) => self.walk_number(number)?,
            Arg::String { text, .. } => {
                let index = self.intern(text, pos)?;
                self.e.push(Instruction::String(index));
            }
            Arg::Nil { .. } => self.push_value(Value::Nil, pos)?,
            Arg::Dot { .. } => self.e.push(Instruction::Dot),
            Arg::Field { ident, .. } => {
                self.e.push(Instruction::Dot);
                self.fields(ident, pos)?;
            }
            Arg::Chain { node, field, .. } => {
                self.cmd.push(0);
                let result = self.walk_arg(node);
                self.cmd.pop();
                result?;
                self.fields(field, pos)?;
            }
            Arg::Variable(var) => {
                let name = self.intern(var_name(var), pos)?;
                self.e.push(Instruction::Var(name));
                self.fields(var.ident.get(1..).unwrap_or_default(), pos)?;
            }
            Arg::Identifier { name, .. } => self.walk_identifier(name, pos)?,
            Arg::Pipe(pipe) => {
                let branch = std::mem::replace(&mut self.branch_pipe, false);
                let result = self.walk_pipe(pipe);
                self.branch_pipe = branch;
                result?;
                // SETVAR consumed the value, the pipeline still yields it.
                if let Some(var) = pipe.decl.last() {
                    let name = self.intern(var_name(var), var.pos)?;
                    self.e.push(Instruction::Var(name));
                }
            }
        }
        self.e.mark(pos);
        Ok(())
    }

    /// One FIELD per segment. Only the last one can be a method call with
    /// arguments.
    fn fields(&mut self, names: &[String], pos: Pos) -> CResult {
        for (index, name) in names.iter().enumerate() {
            let argc = if index + 1 == names.len() { self.argc() } else { 0 };
            let name = self.intern(name, pos)?;
            self.e.push(Instruction::Field { argc, name });
        }
        Ok(())
    }

    fn walk_number(&mut self, number: &NumberNode) -> CResult {
        let text = number.text.trim_start_matches(['+', '-']);
        let hex = text.starts_with("0x") || text.starts_with("0X");
        let looks_float = text.contains('.')
            || (!hex && text.contains(['e', 'E']))
            || (hex && text.contains(['p', 'P']));
        let value = match (number.float, number.int) {
            (Some(f), _) if looks_float => Value::Float(f),
            (_, Some(i)) => Value::Int(i),
            _ => {
                return Err(self.error(
                    CompileErrorKind::InvalidNumber(number.text.clone()),
                    number.pos,
                ));
            }
        };
        self.push_value(value, number.pos)
    }

    fn walk_identifier(&mut self, name: &str, pos: Pos) -> CResult {
        if self.cmd.is_empty() {
            return Err(self.error(
                CompileErrorKind::IdentifierOutsideCommand(name.to_string()),
                pos,
            ));
        }
        if name == TOP_ASSETS || name == BOTTOM_ASSETS {
            let assets = if name == TOP_ASSETS {
                self.set.top_assets()
            } else {
                self.set.bottom_assets()
            };
            if !assets.is_empty() {
                self.push_bytes(assets, pos)?;
            }
            self.no_print = true;
            return Ok(());
        }

        let mut name = name;
        if name.starts_with("html_") {
            if self.no_print {
                return Ok(());
            }
            if name == COMMENT_ESCAPER && !self.options.drop_comments {
                return Ok(());
            }
            match self.escaper_input() {
                Some(ParamType::Int) => return Ok(()),
                Some(ParamType::Str) if name == HTML_ESCAPER => name = HTML_STRING_ESCAPER,
                Some(ParamType::Html) if name == HTML_ESCAPER => return Ok(()),
                Some(ParamType::Js) if name == JS_ESCAPER => return Ok(()),
                _ => {}
            }
        }

        let Some(func) = self.funcs.get(name) else {
            return Err(self.error(CompileErrorKind::UndefinedFunction(name.to_string()), pos));
        };
        let Some(func) = self.program.add_func(func) else {
            return Err(self.error(CompileErrorKind::TableOverflow("function"), pos));
        };
        let argc = self.argc();
        self.e.push(Instruction::Func { argc, func });
        Ok(())
    }

    /// Declared type of an escaper's only argument, when it's the result of
    /// the function called right before.
    fn escaper_input(&self) -> Option<ParamType> {
        if self.argc() != 1 {
            return None;
        }
        match self.e.last()? {
            Instruction::Func { func, .. } => self
                .program
                .func(*func)
                .map(|f| f.signature().return_type().clone()),
            _ => None,
        }
    }
}

/// `"$x"` → `"x"`, `"$"` → `""`.
fn var_name(var: &VariableNode) -> &str {
    let head = var.ident.first().map(String::as_str).unwrap_or_default();
    head.strip_prefix('$').unwrap_or(head)
}

/// Namespace of a template name: everything before the first separator.
pub(crate) fn namespace(name: &str) -> &str {
    match name.find(NAMESPACE_SEPARATOR) {
        Some(index) => &name[..index],
        None => "",
    }
}

#[cfg(test)]
#[path = "bytecode_test.rs"]
mod bytecode_test;
