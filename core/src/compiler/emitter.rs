//! Instruction buffer used while compiling a construct.

use crate::syntax::Pos;
use crate::vm::{Context, Instruction};

use super::error::CompileErrorKind;

/// An instruction buffer plus the context entries recorded while filling it.
///
/// Context `pc`s are relative to the start of the buffer and get renumbered
/// whenever the buffer is prepended to or appended to another one. Jumps are
/// relative, so moving a whole buffer never requires touching them.
#[derive(Debug, Clone, Default)]
pub(crate) struct Emitter {
    pub(crate) buf: Vec<Instruction>,
    pub(crate) ctx: Vec<Context>,
}

impl Emitter {
    pub(crate) fn push(&mut self, inst: Instruction) {
        self.buf.push(inst);
    }

    pub(crate) fn prepend(&mut self, inst: Instruction) {
        self.buf.insert(0, inst);
        for c in &mut self.ctx {
            c.pc += 1;
        }
    }

    /// Take the current contents, leaving the emitter empty.
    pub(crate) fn snap(&mut self) -> Emitter {
        std::mem::take(self)
    }

    pub(crate) fn restore(&mut self, saved: Emitter) {
        *self = saved;
    }

    /// Concatenate `other` at the end.
    pub(crate) fn append(&mut self, other: Emitter) {
        let offset = self.buf.len();
        self.buf.extend(other.buf);
        self.ctx.extend(other.ctx.into_iter().map(|c| Context {
            pc: c.pc + offset,
            pos: c.pos,
        }));
    }

    /// Record that the code emitted so far belongs to the node at `pos`.
    pub(crate) fn mark(&mut self, pos: Pos) {
        self.ctx.push(Context {
            pc: self.buf.len(),
            pos,
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn last(&self) -> Option<&Instruction> {
        self.buf.last()
    }

    pub(crate) fn clear(&mut self) {
        self.buf.clear();
        self.ctx.clear();
    }

    // ========================================================================
    // Stack accounting
    // ========================================================================

    fn marks_and_pops(&self) -> bool {
        matches!(self.buf.last(), Some(Instruction::Pop(0)))
    }

    /// Values the buffer pushes, `None` when it contains a FIELD (which may
    /// consume method arguments).
    pub(crate) fn pushes(&self) -> Option<usize> {
        if self.marks_and_pops() {
            return Some(0);
        }
        let mut pushes = 0;
        for inst in &self.buf {
            match inst {
                Instruction::String(_)
                | Instruction::Dot
                | Instruction::Val(_)
                | Instruction::Var(_)
                | Instruction::Func { .. } => pushes += 1,
                Instruction::Next(_) => pushes += 2,
                Instruction::Field { .. } => return None,
                _ => {}
            }
        }
        Some(pushes)
    }

    pub(crate) fn pops(&self) -> usize {
        if self.marks_and_pops() {
            return 0;
        }
        self.buf
            .iter()
            .map(|inst| match *inst {
                Instruction::Pop(n) => n as usize,
                Instruction::SetVar { .. } => 1,
                Instruction::Func { argc, .. } => argc as usize,
                _ => 0,
            })
            .sum()
    }

    /// Make the buffer's net stack effect zero.
    pub(crate) fn balance(&mut self) -> Result<(), CompileErrorKind> {
        match self.pushes() {
            None => {
                self.prepend(Instruction::Mark);
                self.push(Instruction::Pop(0));
            }
            Some(pushes) => {
                let delta = pushes as i64 - self.pops() as i64;
                if delta < 0 {
                    return Err(CompileErrorKind::Unbalanced(delta));
                }
                if delta > 0 {
                    let n = u32::try_from(delta)
                        .map_err(|_| CompileErrorKind::TableOverflow("pop"))?;
                    self.push(Instruction::Pop(n));
                }
            }
        }
        Ok(())
    }

    /// Remove a trailing POP and return its count.
    pub(crate) fn take_pop(&mut self) -> Option<u32> {
        match self.buf.last() {
            Some(&Instruction::Pop(n)) => {
                self.buf.pop();
                Some(n)
            }
            _ => None,
        }
    }

    pub(crate) fn add_pop(&mut self, pop: Option<u32>) {
        if let Some(n) = pop {
            self.push(Instruction::Pop(n));
        }
    }
}

/// Replace `count` instructions at `idx` with `repl`, fixing every relative
/// jump that crosses the replaced range and shifting the context entries
/// after it.
pub(crate) fn splice(
    code: &mut Vec<Instruction>,
    ctx: &mut [Context],
    idx: usize,
    count: usize,
    repl: &[Instruction],
) {
    let end = idx + count;
    let delta = repl.len() as i64 - count as i64;
    if delta != 0 {
        for (pc, inst) in code.iter_mut().enumerate() {
            let Some(off) = inst.jump_offset() else {
                continue;
            };
            let target = pc as i64 + i64::from(off) + 1;
            let fixed = if pc < idx && target >= end as i64 {
                i64::from(off) + delta
            } else if pc >= end && target <= idx as i64 {
                i64::from(off) - delta
            } else {
                continue;
            };
            if let Ok(fixed) = i32::try_from(fixed) {
                *inst = inst.with_jump_offset(fixed);
            }
        }
        for c in ctx.iter_mut().filter(|c| c.pc >= end) {
            c.pc = (c.pc as i64 + delta) as usize;
        }
    }
    code.splice(idx..end, repl.iter().copied());
}

#[cfg(test)]
#[path = "emitter_test.rs"]
mod emitter_test;
