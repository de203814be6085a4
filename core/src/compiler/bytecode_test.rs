//! Tests for the bytecode compiler.

use expect_test::{Expect, expect};
use pretty_assertions::assert_eq;

use crate::{
    api::{CompileOptions, RunOptions, TemplateSet, VarMap},
    compiler::{BytecodeCompiler, CompileError, CompileErrorKind},
    stdlib::{
        escape::{COMMENT_ESCAPER, HTML_ESCAPER},
        register_stdlib,
    },
    syntax::{Arg, CommandNode, Node, NumberNode, PipeNode, Tree, VariableNode},
    values::{FuncMap, Function, ParamType, Receiver, Signature, TypeDescriptor, Value},
    vm::{Program, RuntimeError},
};

fn funcs() -> FuncMap {
    register_stdlib(FuncMap::new()).bind(Function::new(
        "now",
        Signature::new([]).returns(ParamType::Int),
        |_| Ok(Value::Int(1234)),
    ))
}

fn try_compile_with(options: CompileOptions, set: &TemplateSet) -> Result<Program, CompileError> {
    crate::test_utils::init_test_logging();
    BytecodeCompiler::compile(set, &funcs(), &options, RunOptions::default())
}

fn compile_with(options: CompileOptions, set: &TemplateSet) -> Program {
    try_compile_with(options, set).unwrap()
}

fn compile(set: &TemplateSet) -> Program {
    compile_with(CompileOptions::default(), set)
}

fn compile_error(set: &TemplateSet) -> CompileError {
    try_compile_with(CompileOptions::default(), set).unwrap_err()
}

fn unfolded() -> CompileOptions {
    CompileOptions {
        fold_constants: false,
        ..Default::default()
    }
}

fn main(nodes: Vec<Node>) -> TemplateSet {
    TemplateSet::new(Tree::new("main", nodes))
}

fn try_render(program: &Program, data: Value) -> Result<String, crate::api::Error> {
    program.render_to_string("main", &data, &VarMap::new())
}

fn render(program: &Program, data: Value) -> String {
    try_render(program, data).unwrap()
}

fn check_disassembly(program: &Program, name: &str, expect: Expect) {
    expect.assert_eq(&program.disassemble(name).unwrap());
}

/// `{{ a | b | c }}`
fn chain(cmds: Vec<Vec<Arg>>) -> PipeNode {
    PipeNode::new(cmds.into_iter().map(CommandNode::new).collect())
}

fn runtime_kind(err: crate::api::Error) -> RuntimeError {
    match err {
        crate::api::Error::Runtime { error, .. } => error.kind,
        other => panic!("expected a runtime error, got {other}"),
    }
}

// ============================================================================
// Text and actions
// ============================================================================

#[test]
fn test_text_and_field() {
    let program = compile(&main(vec![
        Node::text("Hello "),
        Node::action(Arg::field("Name")),
        Node::text("!"),
    ]));
    check_disassembly(
        &program,
        "main",
        expect![[r#"
            0000 WB 0 ; "Hello "
            0001 MARK
            0002 DOT
            0003 FIELD 2 argc=0 ; "Name"
            0004 PRINT
            0005 POP 0
            0006 WB 1 ; "!"
        "#]],
    );
    let data = Value::map([("Name", Value::str("World"))]);
    assert_eq!(render(&program, data), "Hello World!");
}

#[test]
fn test_static_text_renders_verbatim() {
    let text = "<p>\n  caf\u{e9} {{not an action}}\n</p>";
    let program = compile(&main(vec![Node::text(text)]));
    assert_eq!(render(&program, Value::Nil), text);
}

#[test]
fn test_html_leading_newline_is_dropped() {
    let nodes = vec![Node::text("\n<p>hi</p>\n")];
    let html = main(nodes.clone()).with_content_type("text/html; charset=utf-8");
    assert_eq!(render(&compile(&html), Value::Nil), "<p>hi</p>\n");
    assert_eq!(render(&compile(&main(nodes)), Value::Nil), "\n<p>hi</p>\n");
}

#[test]
fn test_comments_emit_nothing() {
    let program = compile(&main(vec![Node::comment("note"), Node::text("x")]));
    assert_eq!(program.disassemble("main").unwrap(), "0000 WB 0 ; \"x\"\n");
}

#[test]
fn test_numbers() {
    let hex = Arg::Number(NumberNode {
        pos: 0,
        text: "0x1e".to_string(),
        int: Some(30),
        float: Some(30.0),
    });
    let exp = Arg::Number(NumberNode {
        pos: 0,
        text: "1e3".to_string(),
        int: Some(1000),
        float: Some(1000.0),
    });
    let program = compile(&main(vec![
        Node::action(Arg::int(7)),
        Node::text(" "),
        Node::action(Arg::float(2.5)),
        Node::text(" "),
        Node::action(hex),
        Node::text(" "),
        Node::action(exp),
    ]));
    assert_eq!(render(&program, Value::Nil), "7 2.5 30 1000");
}

#[test]
fn test_invalid_number() {
    let bad = Arg::Number(NumberNode {
        pos: 3,
        text: "1.5".to_string(),
        int: None,
        float: None,
    });
    let err = compile_error(&main(vec![Node::action(bad)]));
    assert_eq!(err.kind, CompileErrorKind::InvalidNumber("1.5".to_string()));
    assert_eq!(err.location.offset, 3);
}

#[test]
fn test_nil_constant_prints_nothing() {
    let program = compile(&main(vec![Node::action(Arg::nil()), Node::text(".")]));
    assert_eq!(program.disassemble("main").unwrap(), "0000 WB 0 ; \".\"\n");
}

#[test]
fn test_printing_a_function_fails() {
    let f = Value::func(Function::new("f", Signature::new([]), |_| Ok(Value::Nil)));
    let set = main(vec![Node::action(Arg::field("F"))]);
    let program = compile(&set);
    let err = try_render(&program, Value::map([("F", f)])).unwrap_err();
    assert!(matches!(runtime_kind(err), RuntimeError::NotPrintable { .. }));
}

// ============================================================================
// Functions and folding
// ============================================================================

#[test]
fn test_pure_pipeline_is_folded_into_text() {
    let set = main(vec![Node::action(vec![Arg::ident("upper"), Arg::string("abc")])]);
    let program = compile(&set);
    check_disassembly(
        &program,
        "main",
        expect![[r#"
            0000 WB 0 ; "ABC"
        "#]],
    );

    let program = compile_with(unfolded(), &set);
    check_disassembly(
        &program,
        "main",
        expect![[r#"
            0000 STRING 2 ; "abc"
            0001 FUNC 0 argc=1 ; upper
            0002 PRINT
            0003 POP 1
        "#]],
    );
    assert_eq!(render(&program, Value::Nil), "ABC");
}

#[test]
fn test_chained_pure_pipeline() {
    // {{ "a" | printf "%s-%s" "b" | upper }}
    let set = main(vec![Node::action(chain(vec![
        vec![Arg::string("a")],
        vec![Arg::ident("printf"), Arg::string("%s-%s"), Arg::string("b")],
        vec![Arg::ident("upper")],
    ]))]);
    let folded = compile(&set);
    assert_eq!(folded.disassemble("main").unwrap(), "0000 WB 0 ; \"B-A\"\n");
    assert_eq!(render(&compile_with(unfolded(), &set), Value::Nil), "B-A");
}

#[test]
fn test_impure_functions_are_not_folded() {
    let set = main(vec![Node::action(vec![Arg::ident("print"), Arg::pipe(Arg::ident("now"))])]);
    let program = compile(&set);
    let listing = program.disassemble("main").unwrap();
    assert!(listing.contains("now"), "{listing}");
    assert_eq!(render(&program, Value::Nil), "1234");
}

#[test]
fn test_failing_fold_keeps_the_runtime_error() {
    let set = main(vec![Node::action(vec![Arg::ident("len"), Arg::int(3)])]);
    let folded = try_render(&compile(&set), Value::Nil).unwrap_err();
    let unfolded = try_render(&compile_with(unfolded(), &set), Value::Nil).unwrap_err();
    assert_eq!(folded.to_string(), unfolded.to_string());
    assert!(matches!(
        runtime_kind(folded),
        RuntimeError::FunctionReturnedError { .. }
    ));
}

#[test]
fn test_undefined_function() {
    let err = compile_error(&main(vec![
        Node::text("x"),
        Node::action(Arg::ident("foo").at(4)),
    ]));
    assert_eq!(err.kind, CompileErrorKind::UndefinedFunction("foo".to_string()));
    assert_eq!(err.location.template, "main");
    assert_eq!(err.location.offset, 4);
}

#[test]
fn test_method_with_arguments() {
    let ty = TypeDescriptor::builder("Counter")
        .field("N")
        .method(
            "Add",
            Receiver::Value,
            Signature::new([ParamType::Int]).returns(ParamType::Int),
            |recv, args| {
                let n = recv.as_record().and_then(|r| r.field("N")).and_then(|n| n.as_int());
                Ok(Value::Int(n.unwrap_or(0) + args[0].as_int().unwrap_or(0)))
            },
        )
        .build();
    // {{.Add 2}}
    let set = main(vec![Node::action(vec![Arg::field("Add"), Arg::int(2)])]);
    let program = compile(&set);
    check_disassembly(
        &program,
        "main",
        expect![[r#"
            0000 MARK
            0001 VAL 0 ; Int(2)
            0002 DOT
            0003 FIELD 2 argc=1 ; "Add"
            0004 PRINT
            0005 POP 0
        "#]],
    );
    let counter = Value::record(&ty, vec![Value::Int(40)]);
    assert_eq!(render(&program, counter), "42");
}

#[test]
fn test_chain_node_fields() {
    // {{ (.A).B.C }}
    let set = main(vec![Node::action(Arg::chain(Arg::pipe(Arg::field("A")), "B.C"))]);
    let data = Value::map([(
        "A",
        Value::map([("B", Value::map([("C", Value::str("deep"))]))]),
    )]);
    assert_eq!(render(&compile(&set), data), "deep");
}

// ============================================================================
// Escapers
// ============================================================================

#[test]
fn test_escaper_specialized_for_strings() {
    // {{ .Name | upper | html_template_htmlescaper }}
    let set = main(vec![Node::action(chain(vec![
        vec![Arg::field("Name")],
        vec![Arg::ident("upper")],
        vec![Arg::ident(HTML_ESCAPER)],
    ]))]);
    let program = compile(&set);
    let listing = program.disassemble("main").unwrap();
    assert!(listing.contains("html_template_htmlstringescaper"), "{listing}");
    let data = Value::map([("Name", Value::str("<b>"))]);
    assert_eq!(render(&program, data), "&lt;B&gt;");
}

#[test]
fn test_escaper_elided_for_numbers() {
    // {{ len .Items | html_template_htmlescaper }}
    let set = main(vec![Node::action(chain(vec![
        vec![Arg::ident("len"), Arg::field("Items")],
        vec![Arg::ident(HTML_ESCAPER)],
    ]))]);
    let program = compile(&set);
    let listing = program.disassemble("main").unwrap();
    assert!(!listing.contains("escaper"), "{listing}");
    let data = Value::map([("Items", Value::seq([Value::Nil, Value::Nil]))]);
    assert_eq!(render(&program, data), "2");
}

#[test]
fn test_escaper_kept_for_unknown_types() {
    let set = main(vec![Node::action(chain(vec![
        vec![Arg::field("Name")],
        vec![Arg::ident(HTML_ESCAPER)],
    ]))]);
    let data = Value::map([("Name", Value::str("a&b"))]);
    assert_eq!(render(&compile(&set), data), "a&amp;b");
}

#[test]
fn test_comment_escaper() {
    let set = main(vec![Node::action(chain(vec![
        vec![Arg::field("C")],
        vec![Arg::ident(COMMENT_ESCAPER)],
    ]))]);
    let data = Value::map([("C", Value::str("hi"))]);
    assert_eq!(render(&compile(&set), data.clone()), "hi");

    let options = CompileOptions {
        drop_comments: true,
        ..Default::default()
    };
    assert_eq!(render(&compile_with(options, &set), data), "");
}

#[test]
fn test_asset_hooks() {
    // {{ render_top_assets | html_template_htmlescaper }}body{{ render_bottom_assets }}
    let set = main(vec![
        Node::action(chain(vec![
            vec![Arg::ident("render_top_assets")],
            vec![Arg::ident(HTML_ESCAPER)],
        ])),
        Node::text("body"),
        Node::action(Arg::ident("render_bottom_assets")),
    ])
    .with_top_assets("<link>");
    let program = compile(&set);
    check_disassembly(
        &program,
        "main",
        expect![[r#"
            0000 WB 0 ; "<link>"
            0001 WB 1 ; "body"
        "#]],
    );
    assert_eq!(render(&program, Value::Nil), "<link>body");
}

// ============================================================================
// Branches
// ============================================================================

#[test]
fn test_if_else() {
    let set = main(vec![Node::if_(
        Arg::field("OK"),
        vec![Node::text("yes")],
        Some(vec![Node::text("no")]),
    )]);
    let program = compile(&set);
    check_disassembly(
        &program,
        "main",
        expect![[r#"
            0000 MARK
            0001 DOT
            0002 FIELD 2 argc=0 ; "OK"
            0003 JMPF +2
            0004 WB 0 ; "yes"
            0005 JMP +1
            0006 WB 1 ; "no"
            0007 POP 0
        "#]],
    );
    assert_eq!(render(&program, Value::map([("OK", Value::Bool(true))])), "yes");
    assert_eq!(render(&program, Value::map([("OK", Value::Int(0))])), "no");
    assert_eq!(render(&program, Value::map([("Other", Value::Int(1))])), "no");
}

#[test]
fn test_with_declaration() {
    let set = main(vec![Node::with(
        PipeNode::from(Arg::field("A")).declare(&["$x"]),
        vec![Node::action(Arg::var("$x"))],
        None,
    )]);
    let program = compile(&set);
    check_disassembly(
        &program,
        "main",
        expect![[r#"
            0000 MARK
            0001 DOT
            0002 FIELD 2 argc=0 ; "A"
            0003 JMPF +9
            0004 PUSHDOT
            0005 SETVAR 3 ; "x"
            0006 VAR 3 ; "x"
            0007 PRINT
            0008 POP 1
            0009 UNSETVAR 3 ; "x"
            0010 POP 0
            0011 POPDOT
            0012 JMP +1
            0013 POP 0
        "#]],
    );
    assert_eq!(render(&program, Value::map([("A", Value::str("hi"))])), "hi");
    assert_eq!(render(&program, Value::map([("B", Value::str("hi"))])), "");
}

#[test]
fn test_with_rebinds_dot() {
    let set = main(vec![
        Node::with(
            Arg::field("User"),
            vec![Node::action(Arg::field("Name"))],
            Some(vec![Node::text("anonymous")]),
        ),
        Node::action(Arg::field("Site")),
    ]);
    let program = compile(&set);
    let data = Value::map([
        ("User", Value::map([("Name", Value::str("ann"))])),
        ("Site", Value::str("@x")),
    ]);
    assert_eq!(render(&program, data), "ann@x");
    assert_eq!(
        render(&program, Value::map([("User", Value::Nil), ("Site", Value::str("!"))])),
        "anonymous!"
    );
}

#[test]
fn test_if_declaration_with_else() {
    // {{if $x := .A}}{{$x}}{{else}}none{{end}}
    let set = main(vec![Node::if_(
        PipeNode::from(Arg::field("A")).declare(&["$x"]),
        vec![Node::action(Arg::var("$x"))],
        Some(vec![Node::text("none")]),
    )]);
    let program = compile(&set);
    assert_eq!(render(&program, Value::map([("A", Value::Int(5))])), "5");
    assert_eq!(render(&program, Value::map([("A", Value::Int(0))])), "none");
}

#[test]
fn test_variable_unset_after_branch() {
    // {{if true}}{{$x := 1}}{{end}}{{$x}}
    let set = main(vec![
        Node::if_(
            Arg::bool(true),
            vec![Node::action(PipeNode::from(Arg::int(1)).declare(&["$x"]))],
            None,
        ),
        Node::action(Arg::var("$x")),
    ]);
    let err = try_render(&compile(&set), Value::Nil).unwrap_err();
    assert!(matches!(
        runtime_kind(err),
        RuntimeError::UndefinedVariable { name } if name == "x"
    ));
}

#[test]
fn test_assignment_inside_branch_persists() {
    // {{$x := 1}}{{if true}}{{$x = 2}}{{end}}{{$x}}
    let set = main(vec![
        Node::action(PipeNode::from(Arg::int(1)).declare(&["$x"])),
        Node::if_(
            Arg::bool(true),
            vec![Node::action(PipeNode::from(Arg::int(2)).assign("$x"))],
            None,
        ),
        Node::action(Arg::var("$x")),
    ]);
    assert_eq!(render(&compile(&set), Value::Nil), "2");
}

#[test]
fn test_declaration_in_nested_pipeline() {
    // {{with ($x := "a")}}{{$x}}{{.}}{{end}}
    let inner = PipeNode::from(Arg::string("a")).declare(&["$x"]);
    let set = main(vec![Node::with(
        Arg::pipe(inner),
        vec![Node::action(Arg::var("$x")), Node::action(Arg::dot())],
        None,
    )]);
    assert_eq!(render(&compile(&set), Value::Nil), "aa");
    assert_eq!(render(&compile_with(unfolded(), &set), Value::Nil), "aa");
}

#[test]
fn test_nested_declaration_in_action() {
    // {{$y := ($x := 2)}}{{$x}}{{$y}}
    let set = main(vec![
        Node::action(
            PipeNode::from(Arg::pipe(PipeNode::from(Arg::int(2)).declare(&["$x"])))
                .declare(&["$y"]),
        ),
        Node::action(Arg::var("$x")),
        Node::action(Arg::var("$y")),
    ]);
    assert_eq!(render(&compile(&set), Value::Nil), "22");
}

#[test]
fn test_variable_without_identifier_is_root() {
    let set = main(vec![Node::action(Arg::Variable(VariableNode {
        pos: 0,
        ident: Vec::new(),
    }))]);
    let program = compile(&set);
    assert_eq!(render(&program, Value::str("root")), "root");
}

#[test]
fn test_range() {
    let set = main(vec![Node::range(
        Arg::field("Items"),
        vec![Node::action(Arg::dot()), Node::text(",")],
        None,
    )]);
    let program = compile(&set);
    check_disassembly(
        &program,
        "main",
        expect![[r#"
            0000 MARK
            0001 DOT
            0002 FIELD 2 argc=0 ; "Items"
            0003 ITER
            0004 NEXT +8
            0005 PUSHDOT
            0006 POP 2
            0007 DOT
            0008 PRINT
            0009 POP 1
            0010 WB 0 ; ","
            0011 POPDOT
            0012 JMP -9
            0013 POP 0
        "#]],
    );
    let items = Value::seq([Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert_eq!(render(&program, Value::map([("Items", items)])), "1,2,3,");
    assert_eq!(render(&program, Value::map([("Items", Value::seq([]))])), "");
}

#[test]
fn test_range_else() {
    let set = main(vec![Node::range(
        Arg::field("Items"),
        vec![Node::action(Arg::dot())],
        Some(vec![Node::text("none")]),
    )]);
    let program = compile(&set);
    let items = Value::seq([Value::str("a"), Value::str("b")]);
    assert_eq!(render(&program, Value::map([("Items", items)])), "ab");
    assert_eq!(render(&program, Value::map([("Items", Value::seq([]))])), "none");
    assert_eq!(render(&program, Value::map([("Items", Value::Nil)])), "none");
}

#[test]
fn test_range_map_with_variables() {
    // {{range $k, $v := .M}}{{$k}}={{$v}};{{end}}
    let set = main(vec![Node::range(
        PipeNode::from(Arg::field("M")).declare(&["$k", "$v"]),
        vec![
            Node::action(Arg::var("$k")),
            Node::text("="),
            Node::action(Arg::var("$v")),
            Node::text(";"),
        ],
        None,
    )]);
    let program = compile(&set);
    let m = Value::map([("b", Value::Int(2)), ("a", Value::Int(1)), ("c", Value::Int(3))]);
    let data = Value::map([("M", m)]);
    assert_eq!(render(&program, data.clone()), "a=1;b=2;c=3;");
    assert_eq!(render(&program, data), "a=1;b=2;c=3;");
}

#[test]
fn test_range_variable_unset_after_loop() {
    // {{range $v := .Items}}{{end}}{{$v}}
    let set = main(vec![
        Node::range(
            PipeNode::from(Arg::field("Items")).declare(&["$v"]),
            vec![],
            None,
        ),
        Node::action(Arg::var("$v")),
    ]);
    let data = Value::map([("Items", Value::seq([Value::Int(1)]))]);
    let err = try_render(&compile(&set), data).unwrap_err();
    assert!(matches!(
        runtime_kind(err),
        RuntimeError::UndefinedVariable { .. }
    ));
}

#[test]
fn test_break_is_unsupported() {
    let set = main(vec![Node::range(
        Arg::field("Items"),
        vec![Node::Break { pos: 9 }],
        None,
    )]);
    let err = compile_error(&set);
    assert_eq!(err.kind, CompileErrorKind::UnsupportedNode("break"));
    assert_eq!(err.location.offset, 9);
}

// ============================================================================
// Template calls
// ============================================================================

fn with_header() -> TemplateSet {
    main(vec![
        Node::text("a"),
        Node::template("header", None),
        Node::text("c"),
    ])
    .with_template(Tree::new("header", vec![Node::text("b")]))
}

#[test]
fn test_static_template_is_stitched() {
    let program = compile(&with_header());
    check_disassembly(
        &program,
        "main",
        expect![[r#"
            0000 WB 1 ; "a"
            0001 VAL 0 ; Nil
            0002 WB 0 ; "b"
            0003 POP 1
            0004 WB 2 ; "c"
        "#]],
    );
    assert_eq!(render(&program, Value::Nil), "abc");
}

#[test]
fn test_template_call_without_stitching() {
    let options = CompileOptions {
        stitch: false,
        ..Default::default()
    };
    let program = compile_with(options, &with_header());
    check_disassembly(
        &program,
        "main",
        expect![[r#"
            0000 WB 1 ; "a"
            0001 VAL 0 ; Nil
            0002 TEMPLATE 0:2 ; "" "header"
            0003 POP 1
            0004 WB 2 ; "c"
        "#]],
    );
    assert_eq!(render(&program, Value::Nil), "abc");
}

#[test]
fn test_template_with_pipeline() {
    let set = main(vec![Node::template(
        "item",
        Some(PipeNode::from(Arg::field("X"))),
    )])
    .with_template(Tree::new(
        "item",
        vec![Node::text("["), Node::action(Arg::dot()), Node::text("]")],
    ));
    let program = compile(&set);
    assert_eq!(render(&program, Value::map([("X", Value::Int(9))])), "[9]");
}

#[test]
fn test_undefined_template() {
    let err = compile_error(&main(vec![Node::template("missing", None)]));
    assert_eq!(err.kind, CompileErrorKind::UndefinedTemplate("missing".to_string()));
}

#[test]
fn test_namespaced_template_sees_its_vars() {
    // {{ template "blog|title" }} in main, {{ $Vars.Title }} in blog|title.
    let set = main(vec![
        Node::template("blog|title", None),
        Node::text("/"),
        Node::action(Arg::var("$Vars.Title")),
    ])
    .with_template(Tree::new(
        "blog|title",
        vec![Node::action(Arg::var("$Vars.Title"))],
    ));
    let program = compile(&set);
    let vars = VarMap::new()
        .with("Title", Value::str("site"))
        .with("blog|Title", Value::str("blog"));
    let out = program
        .render_to_string("main", &Value::Nil, &vars)
        .unwrap();
    assert_eq!(out, "blog/site");
}
