//! Inlining of trivial template calls.
//!
//! A template whose whole body is one static chunk (asset hooks, shared
//! headers) is cheaper to write in place than to call. Calls to anything else
//! are kept, so runtime errors still name the template they happened in.

use ecow::EcoString;

use crate::vm::{Instruction, Program};

use super::emitter::splice;

pub(crate) fn stitch(program: &mut Program) {
    let names: Vec<EcoString> = program.templates.keys().cloned().collect();
    for name in names {
        let Some(template) = program.templates.get(&name) else {
            continue;
        };
        let mut code = template.code.clone();
        let mut context = template.context.clone();
        let mut stitched = 0;

        let mut pc = 0;
        while pc < code.len() {
            if let Instruction::Template { name: target, .. } = code[pc] {
                if let Some(chunk) = static_chunk(program, target) {
                    splice(&mut code, &mut context, pc, 1, &[chunk]);
                    stitched += 1;
                }
            }
            pc += 1;
        }

        if stitched > 0 {
            tracing::debug!(template = name.as_str(), stitched, "Stitched template calls");
            if let Some(template) = program.templates.get_mut(&name) {
                template.code = code;
                template.context = context;
            }
        }
    }
}

/// The single WB making up the body of the template named by string `name`.
fn static_chunk(program: &Program, name: u32) -> Option<Instruction> {
    let target = program.string(name)?;
    match program.templates.get(target)?.code.as_slice() {
        &[wb @ Instruction::Wb(_)] => Some(wb),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::api::RunOptions;
    use crate::vm::CompiledTemplate;

    fn template(code: Vec<Instruction>) -> CompiledTemplate {
        CompiledTemplate {
            code,
            ..Default::default()
        }
    }

    #[test]
    fn test_inlines_static_templates() {
        let mut program = Program::new("main", RunOptions::default());
        let header = program.add_string("header").unwrap();
        let body = program.add_string("body").unwrap();
        let chunk = program.add_bytes(b"<head>").unwrap();
        program
            .templates
            .insert("header".into(), template(vec![Instruction::Wb(chunk)]));
        program.templates.insert(
            "body".into(),
            template(vec![Instruction::Dot, Instruction::Print, Instruction::Pop(1)]),
        );
        program.templates.insert(
            "main".into(),
            template(vec![
                Instruction::Val(0),
                Instruction::Template { ns: 0, name: header },
                Instruction::Pop(1),
                Instruction::Val(0),
                Instruction::Template { ns: 0, name: body },
                Instruction::Pop(1),
            ]),
        );

        stitch(&mut program);

        assert_eq!(
            program.code("main").unwrap(),
            &[
                Instruction::Val(0),
                Instruction::Wb(chunk),
                Instruction::Pop(1),
                Instruction::Val(0),
                Instruction::Template { ns: 0, name: body },
                Instruction::Pop(1),
            ]
        );
    }
}
