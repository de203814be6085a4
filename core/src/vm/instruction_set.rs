use core::fmt;

use static_assertions::assert_eq_size;

/// Operation tag of an [`Instruction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop,
    Field,
    Func,
    Iter,
    Jmp,
    Jmpf,
    Jmpt,
    Mark,
    Next,
    Dot,
    Print,
    PushDot,
    PopDot,
    Pop,
    SetVar,
    String,
    Template,
    UnsetVar,
    Val,
    Var,
    Wb,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Field => "FIELD",
            Opcode::Func => "FUNC",
            Opcode::Iter => "ITER",
            Opcode::Jmp => "JMP",
            Opcode::Jmpf => "JMPF",
            Opcode::Jmpt => "JMPT",
            Opcode::Mark => "MARK",
            Opcode::Next => "NEXT",
            Opcode::Dot => "DOT",
            Opcode::Print => "PRINT",
            Opcode::PushDot => "PUSHDOT",
            Opcode::PopDot => "POPDOT",
            Opcode::Pop => "POP",
            Opcode::SetVar => "SETVAR",
            Opcode::String => "STRING",
            Opcode::Template => "TEMPLATE",
            Opcode::UnsetVar => "UNSETVAR",
            Opcode::Val => "VAL",
            Opcode::Var => "VAR",
            Opcode::Wb => "WB",
        }
    }
}

/// A single VM instruction: an opcode and one operand word.
///
/// Jump offsets are relative: a jump at `pc` with offset `k` continues at
/// `pc + k + 1`. Table operands index into the owning `Program`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    /// Look up `name` on the stack top; calls a method with `argc` arguments
    /// when one exists.
    Field { argc: u16, name: u32 },
    Func { argc: u16, func: u32 },
    /// Start iterating the stack top (which stays on the stack).
    Iter,
    Jmp(i32),
    /// Jump if the stack top is false. Does not pop.
    Jmpf(i32),
    /// Jump if the stack top is true. Does not pop.
    Jmpt(i32),
    /// Remember the current stack depth.
    Mark,
    /// Push (position, value) or drop the iterator and jump.
    Next(i32),
    Dot,
    /// Print the stack top. Does not pop.
    Print,
    PushDot,
    PopDot,
    /// Pop `n` values; 0 pops back to the last mark.
    Pop(u32),
    /// Pop into a variable. Declarations push a new binding, assignments
    /// overwrite the innermost one.
    SetVar { name: u32, assign: bool },
    String(u32),
    /// Run another template with the stack top as its dot.
    Template { ns: u16, name: u32 },
    UnsetVar(u32),
    Val(u32),
    Var(u32),
    /// Write a static byte chunk.
    Wb(u32),
}

// One machine word per instruction.
assert_eq_size!(Instruction, u64);

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Nop => Opcode::Nop,
            Instruction::Field { .. } => Opcode::Field,
            Instruction::Func { .. } => Opcode::Func,
            Instruction::Iter => Opcode::Iter,
            Instruction::Jmp(_) => Opcode::Jmp,
            Instruction::Jmpf(_) => Opcode::Jmpf,
            Instruction::Jmpt(_) => Opcode::Jmpt,
            Instruction::Mark => Opcode::Mark,
            Instruction::Next(_) => Opcode::Next,
            Instruction::Dot => Opcode::Dot,
            Instruction::Print => Opcode::Print,
            Instruction::PushDot => Opcode::PushDot,
            Instruction::PopDot => Opcode::PopDot,
            Instruction::Pop(_) => Opcode::Pop,
            Instruction::SetVar { .. } => Opcode::SetVar,
            Instruction::String(_) => Opcode::String,
            Instruction::Template { .. } => Opcode::Template,
            Instruction::UnsetVar(_) => Opcode::UnsetVar,
            Instruction::Val(_) => Opcode::Val,
            Instruction::Var(_) => Opcode::Var,
            Instruction::Wb(_) => Opcode::Wb,
        }
    }

    /// Relative offset of jump-like instructions.
    pub fn jump_offset(&self) -> Option<i32> {
        match *self {
            Instruction::Jmp(off)
            | Instruction::Jmpf(off)
            | Instruction::Jmpt(off)
            | Instruction::Next(off) => Some(off),
            _ => None,
        }
    }

    /// Same instruction with a different jump offset. Non-jumps are
    /// returned unchanged.
    pub fn with_jump_offset(self, off: i32) -> Self {
        match self {
            Instruction::Jmp(_) => Instruction::Jmp(off),
            Instruction::Jmpf(_) => Instruction::Jmpf(off),
            Instruction::Jmpt(_) => Instruction::Jmpt(off),
            Instruction::Next(_) => Instruction::Next(off),
            other => other,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode().mnemonic();
        match *self {
            Instruction::Field { argc, name } => write!(f, "{op} {name} argc={argc}"),
            Instruction::Func { argc, func } => write!(f, "{op} {func} argc={argc}"),
            Instruction::Jmp(off)
            | Instruction::Jmpf(off)
            | Instruction::Jmpt(off)
            | Instruction::Next(off) => write!(f, "{op} {off:+}"),
            Instruction::Pop(n) => write!(f, "{op} {n}"),
            Instruction::SetVar { name, assign } => {
                write!(f, "{op} {name}{}", if assign { " assign" } else { "" })
            }
            Instruction::Template { ns, name } => write!(f, "{op} {ns}:{name}"),
            Instruction::String(i)
            | Instruction::UnsetVar(i)
            | Instruction::Val(i)
            | Instruction::Var(i)
            | Instruction::Wb(i) => write!(f, "{op} {i}"),
            _ => write!(f, "{op}"),
        }
    }
}
