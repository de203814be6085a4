use pretty_assertions::assert_eq;

use super::{Emitter, splice};
use crate::compiler::error::CompileErrorKind;
use crate::vm::{Context, Instruction::*};

fn emitter(buf: Vec<crate::vm::Instruction>) -> Emitter {
    Emitter {
        buf,
        ctx: Vec::new(),
    }
}

#[test]
fn test_prepend_and_append_renumber_context() {
    let mut a = emitter(vec![Dot]);
    a.mark(7);
    a.prepend(Mark);
    assert_eq!(a.ctx, vec![Context { pc: 2, pos: 7 }]);

    let mut b = emitter(vec![Print]);
    b.mark(9);
    a.append(b);
    assert_eq!(a.buf, vec![Mark, Dot, Print]);
    assert_eq!(
        a.ctx,
        vec![Context { pc: 2, pos: 7 }, Context { pc: 3, pos: 9 }]
    );
}

#[test]
fn test_snap_and_restore() {
    let mut e = emitter(vec![Dot]);
    let saved = e.snap();
    assert!(e.is_empty());
    e.push(Print);
    let inner = e.snap();
    e.restore(saved);
    assert_eq!(e.buf, vec![Dot]);
    assert_eq!(inner.buf, vec![Print]);
}

#[test]
fn test_stack_accounting() {
    let e = emitter(vec![Val(0), Var(1), Func { argc: 2, func: 0 }, Print]);
    assert_eq!(e.pushes(), Some(3));
    assert_eq!(e.pops(), 2);

    let e = emitter(vec![Dot, Field { argc: 0, name: 2 }]);
    assert_eq!(e.pushes(), None);

    let e = emitter(vec![Mark, Dot, Field { argc: 0, name: 2 }, Pop(0)]);
    assert_eq!(e.pushes(), Some(0));
    assert_eq!(e.pops(), 0);
}

#[test]
fn test_balance_appends_pop() {
    let mut e = emitter(vec![Val(0), Print]);
    e.balance().unwrap();
    assert_eq!(e.buf, vec![Val(0), Print, Pop(1)]);

    let mut e = emitter(vec![Val(0), SetVar { name: 3, assign: false }]);
    e.balance().unwrap();
    assert_eq!(e.buf, vec![Val(0), SetVar { name: 3, assign: false }]);
}

#[test]
fn test_balance_wraps_unknown_effects() {
    let mut e = emitter(vec![Dot, Field { argc: 1, name: 2 }, Print]);
    e.mark(4);
    e.balance().unwrap();
    assert_eq!(
        e.buf,
        vec![Mark, Dot, Field { argc: 1, name: 2 }, Print, Pop(0)]
    );
    assert_eq!(e.ctx, vec![Context { pc: 4, pos: 4 }]);
    assert_eq!(e.take_pop(), Some(0));
}

#[test]
fn test_balance_rejects_underflow() {
    let mut e = emitter(vec![Pop(2)]);
    assert_eq!(e.balance(), Err(CompileErrorKind::Unbalanced(-2)));
}

#[test]
fn test_take_and_add_pop() {
    let mut e = emitter(vec![Val(0), Pop(1)]);
    let pop = e.take_pop();
    assert_eq!(pop, Some(1));
    assert_eq!(e.take_pop(), None);
    e.push(UnsetVar(2));
    e.add_pop(pop);
    assert_eq!(e.buf, vec![Val(0), UnsetVar(2), Pop(1)]);
}

#[test]
fn test_splice_fixes_crossing_jumps() {
    // 0 JMPF +3 -> 4
    // 1 TEMPLATE
    // 2 WB
    // 3 JMP -4 -> 0
    // 4 WB
    let mut code = vec![
        Jmpf(3),
        Template { ns: 0, name: 1 },
        Wb(0),
        Jmp(-4),
        Wb(1),
    ];
    let mut ctx = vec![Context { pc: 2, pos: 10 }, Context { pc: 4, pos: 20 }];
    splice(&mut code, &mut ctx, 1, 1, &[Wb(5), Wb(6)]);
    assert_eq!(
        code,
        vec![Jmpf(4), Wb(5), Wb(6), Wb(0), Jmp(-5), Wb(1)]
    );
    assert_eq!(
        ctx,
        vec![Context { pc: 3, pos: 10 }, Context { pc: 5, pos: 20 }]
    );
}

#[test]
fn test_splice_leaves_local_jumps_alone() {
    let mut code = vec![Wb(0), Jmp(0), Template { ns: 0, name: 1 }, Jmp(-2)];
    let mut ctx = Vec::new();
    splice(&mut code, &mut ctx, 2, 1, &[]);
    // JMP +0 targets the removed slot: left alone. JMP -2 from 3 targets 2.
    assert_eq!(code, vec![Wb(0), Jmp(0), Jmp(-1)]);
}
