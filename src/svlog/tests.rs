//! End-to-end tests that drive the compilation manager, type system, binder,
//! and evaluator together.

use crate::binder::{BindContext, ConversionKind, ExpressionKind};
use crate::compilation::{Compilation, CompilationError, GlobalArenas};
use crate::symbols::SymbolKind;
use crate::ty::IntegralFlags;
use crate::value::ConstantValue;
use crate::EvalContext;
use mead_common::errors::DiagCode;
use mead_common::name::get_name_table;
use mead_common::source::SourceManager;
use mead_svlog_syntax::tree::{parse_expression_text, SyntaxTree};
use std::rc::Rc;

fn add_tree<'gcx>(cx: &Compilation<'gcx>, sm: &Rc<SourceManager>, text: &str) {
    let tree = SyntaxTree::from_text(sm.clone(), text);
    assert!(
        tree.diagnostics().is_empty(),
        "unexpected parse diagnostics: {:?}",
        tree.diagnostics()
    );
    cx.add_syntax_tree(tree).expect("tree should be accepted");
}

fn bind<'gcx>(
    cx: &Compilation<'gcx>,
    scope: &'gcx crate::Symbol<'gcx>,
    sm: &Rc<SourceManager>,
    text: &str,
) -> &'gcx crate::Expression<'gcx> {
    let (expr, diags) = parse_expression_text(sm.clone(), text);
    assert!(diags.is_empty(), "parse diagnostics for `{}`: {:?}", text, diags);
    let expr = expr.expect("expression should parse");
    cx.bind_expression(&expr, &BindContext::new(scope))
}

fn eval_int<'gcx>(
    cx: &Compilation<'gcx>,
    scope: &'gcx crate::Symbol<'gcx>,
    sm: &Rc<SourceManager>,
    text: &str,
) -> i64 {
    let expr = bind(cx, scope, sm, text);
    let mut ctx = EvalContext::new();
    let value = expr.eval(cx, &mut ctx);
    assert!(ctx.diagnostics.is_empty(), "eval diagnostics for `{}`: {:?}", text, ctx.diagnostics);
    value
        .integer()
        .and_then(|v| v.as_i64())
        .unwrap_or_else(|| panic!("`{}` did not evaluate to a known integer", text))
}

#[test]
fn type_interning_is_pointer_stable() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    for &width in &[1u32, 8, 16, 32, 64, 1234] {
        for &flags in &[
            IntegralFlags::empty(),
            IntegralFlags::SIGNED,
            IntegralFlags::FOUR_STATE,
            IntegralFlags::SIGNED | IntegralFlags::FOUR_STATE,
        ] {
            let a = cx.get_type(width, flags);
            let b = cx.get_type(width, flags);
            assert!(std::ptr::eq(a, b), "types must intern to the same pointer");
            assert_eq!(a.bit_width(), width);
            assert_eq!(
                a.is_four_state(),
                flags.contains(IntegralFlags::FOUR_STATE)
            );
        }
    }
}

#[test]
fn binary_operator_type_rules() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);

    // 32-bit signed four-state with 16-bit unsigned two-state: the result is
    // 32 bits wide, unsigned, and four-state.
    let lt = cx.get_type(32, IntegralFlags::SIGNED | IntegralFlags::FOUR_STATE);
    let rt = cx.get_type(16, IntegralFlags::empty());
    let result = cx.binary_operator_type(lt, rt, false);
    assert_eq!(result.bit_width(), 32);
    assert!(!result.is_signed());
    assert!(result.is_four_state());

    // Width is the maximum and four-state-ness is sticky or forced.
    for &(lw, rw) in &[(1u32, 1u32), (8, 24), (64, 3)] {
        for &force in &[false, true] {
            let lt = cx.get_type(lw, IntegralFlags::FOUR_STATE);
            let rt = cx.get_type(rw, IntegralFlags::empty());
            let result = cx.binary_operator_type(lt, rt, force);
            assert_eq!(result.bit_width(), lw.max(rw));
            assert!(result.is_four_state());

            let lt2 = cx.get_type(lw, IntegralFlags::empty());
            let result2 = cx.binary_operator_type(lt2, rt, force);
            assert_eq!(result2.is_four_state(), force);
        }
    }

    // Reals dominate.
    let result = cx.binary_operator_type(cx.real_type(), rt, false);
    assert!(std::ptr::eq(result, cx.real_type()));
    let result = cx.binary_operator_type(cx.shortreal_type(), rt, false);
    assert!(std::ptr::eq(result, cx.shortreal_type()));

    // A one-bit result stays scalar when an operand was scalar.
    let result = cx.binary_operator_type(cx.bit_type(), cx.logic_type(), false);
    assert!(result.is_scalar());
    assert!(result.is_four_state());
}

#[test]
fn assignment_truncation() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(&cx, &sm, "bit [15:0] a;\nbit [7:0] b;");
    let unit = cx.compilation_units()[0];

    // Binding a 16-bit rhs into an 8-bit target inserts one truncation
    // conversion; there is no BadAssignment.
    let (expr, _) = parse_expression_text(sm.clone(), "a");
    let expr = expr.unwrap();
    let target = cx.get_type(8, IntegralFlags::empty());
    let bound = cx.bind_assignment(
        target,
        &expr,
        mead_common::source::INVALID_LOCATION,
        &BindContext::new(unit),
    );
    assert!(!bound.bad());
    assert_eq!(bound.ty.bit_width(), 8);
    match &bound.kind {
        ExpressionKind::Conversion { kind, .. } => {
            assert_eq!(*kind, ConversionKind::IntTruncation)
        }
        _ => panic!("expected a truncation conversion at the top"),
    }
    assert!(cx
        .get_semantic_diagnostics()
        .iter()
        .all(|d| d.code != DiagCode::BadAssignment));
}

#[test]
fn incompatible_assignment_is_diagnosed() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(&cx, &sm, "chandle c = 5;");
    let diags = cx.get_semantic_diagnostics();
    assert!(diags.iter().any(|d| d.code == DiagCode::BadAssignment));
}

#[test]
fn replication_zero_count() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(&cx, &sm, "bit [3:0] x;\nbit [7:0] a;");
    let unit = cx.compilation_units()[0];

    // Zero replication at top level is an error.
    let expr = bind(&cx, unit, &sm, "{0{x}}");
    assert!(expr.bad());
    assert!(cx
        .get_semantic_diagnostics()
        .iter()
        .any(|d| d.code == DiagCode::ReplicationZeroOutsideConcat));

    // Inside a concatenation it is a void placeholder contributing zero
    // width.
    let arena2 = GlobalArenas::default();
    let cx2 = Compilation::new(&arena2);
    let sm2 = Rc::new(SourceManager::new());
    add_tree(&cx2, &sm2, "bit [3:0] x;\nbit [7:0] a;");
    let unit2 = cx2.compilation_units()[0];
    let expr = bind(&cx2, unit2, &sm2, "{a, {0{x}}}");
    assert!(!expr.bad());
    assert_eq!(expr.ty.bit_width(), 8);
    assert!(cx2
        .get_semantic_diagnostics()
        .iter()
        .all(|d| d.code != DiagCode::ReplicationZeroOutsideConcat));
}

#[test]
fn lvalue_closure() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(
        &cx,
        &sm,
        "typedef struct packed { logic [3:0] hi; logic [3:0] lo; } pair_t;\n\
         pair_t p;\nbit [7:0] v;",
    );
    let unit = cx.compilation_units()[0];

    assert!(bind(&cx, unit, &sm, "v").is_lvalue());
    assert!(bind(&cx, unit, &sm, "v[3]").is_lvalue());
    assert!(bind(&cx, unit, &sm, "v[3:0]").is_lvalue());
    assert!(bind(&cx, unit, &sm, "p.lo").is_lvalue());
    assert!(!bind(&cx, unit, &sm, "5").is_lvalue());
    assert!(!bind(&cx, unit, &sm, "v + 1").is_lvalue());
    assert!(!bind(&cx, unit, &sm, "{v, v}").is_lvalue());
}

#[test]
fn finalization_is_idempotent() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(
        &cx,
        &sm,
        "module leaf; endmodule\nmodule top; leaf l1(); endmodule",
    );

    let root1 = cx.get_root();
    let tops1 = cx.top_instances();
    let root2 = cx.get_root();
    let tops2 = cx.top_instances();
    assert!(std::ptr::eq(root1, root2));
    assert_eq!(tops1.len(), tops2.len());
    for (a, b) in tops1.iter().zip(tops2.iter()) {
        assert!(std::ptr::eq(*a, *b));
    }

    // Only `top` is a top-level module; `leaf` is instantiated.
    assert_eq!(tops1.len(), 1);
    assert_eq!(&*tops1[0].name.as_str(), "top");
}

#[test]
fn top_level_detection_with_shadowing() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    // The nested module shadows the global `leaf`, so the global one is
    // never instantiated and becomes top-level.
    add_tree(
        &cx,
        &sm,
        "module leaf; endmodule\n\
         module top;\n\
           module leaf; endmodule\n\
           leaf l();\n\
         endmodule",
    );
    cx.get_root();
    let names: Vec<String> = cx
        .top_instances()
        .iter()
        .map(|i| i.name.as_str().to_string())
        .collect();
    assert_eq!(names, vec!["leaf", "top"]);
}

#[test]
fn add_after_finalize_is_refused() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(&cx, &sm, "module a; endmodule");
    cx.get_root();
    let tree = SyntaxTree::from_text(sm.clone(), "module b; endmodule");
    assert_eq!(
        cx.add_syntax_tree(tree),
        Err(CompilationError::AlreadyFinalized)
    );
}

#[test]
fn mismatched_source_manager_is_refused() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm1 = Rc::new(SourceManager::new());
    let sm2 = Rc::new(SourceManager::new());
    add_tree(&cx, &sm1, "module a; endmodule");
    let tree = SyntaxTree::from_text(sm2, "module b; endmodule");
    assert_eq!(
        cx.add_syntax_tree(tree),
        Err(CompilationError::MismatchedSourceManager)
    );
}

#[test]
fn parameter_port_inheritance() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(
        &cx,
        &sm,
        "module m #(parameter int N = 4, localparam W = N, X = 8) ();\n\
           parameter Y = 1;\n\
         endmodule",
    );
    let root = cx.get_root();
    let def = cx
        .get_definition(get_name_table().intern("m"), root)
        .expect("definition should exist");

    let flags: Vec<(String, bool, bool)> = def
        .parameters
        .iter()
        .map(|p| (p.name.as_str().to_string(), p.is_port, p.is_local))
        .collect();
    assert_eq!(
        flags,
        vec![
            ("N".to_string(), true, false),
            ("W".to_string(), true, true),
            // An undecorated declaration inherits the preceding keyword.
            ("X".to_string(), true, true),
            // A body parameter is local when a port list exists.
            ("Y".to_string(), false, true),
        ]
    );
}

#[test]
fn parameters_evaluate_transitively() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(
        &cx,
        &sm,
        "parameter int N = 4;\nparameter int W = N * 2 + 1;",
    );
    let unit = cx.compilation_units()[0];
    assert_eq!(eval_int(&cx, unit, &sm, "W"), 9);
    assert_eq!(eval_int(&cx, unit, &sm, "W + N"), 13);
}

#[test]
fn constant_expressions() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(&cx, &sm, "parameter int N = 16;");
    let unit = cx.compilation_units()[0];

    assert_eq!(eval_int(&cx, unit, &sm, "1 + 2 * 3"), 7);
    assert_eq!(eval_int(&cx, unit, &sm, "(1 << 4) - 1"), 15);
    assert_eq!(eval_int(&cx, unit, &sm, "7 / 2"), 3);
    assert_eq!(eval_int(&cx, unit, &sm, "7 % 2"), 1);
    assert_eq!(eval_int(&cx, unit, &sm, "2 ** 10"), 1024);
    assert_eq!(eval_int(&cx, unit, &sm, "8'hff"), 255);
    assert_eq!(eval_int(&cx, unit, &sm, "16'shffff"), -1);
    assert_eq!(eval_int(&cx, unit, &sm, "4'b1010 & 4'b0110"), 2);
    assert_eq!(eval_int(&cx, unit, &sm, "{4'h5, 4'ha}"), 0x5a);
    assert_eq!(eval_int(&cx, unit, &sm, "{2{4'h7}}"), 0x77);
    assert_eq!(eval_int(&cx, unit, &sm, "N > 4 ? 1 : 2"), 1);
    assert_eq!(eval_int(&cx, unit, &sm, "$clog2(N)"), 4);
    assert_eq!(eval_int(&cx, unit, &sm, "$clog2(17)"), 5);
    assert_eq!(eval_int(&cx, unit, &sm, "$bits(N)"), 32);
    assert_eq!(eval_int(&cx, unit, &sm, "$bits(logic [7:0])"), 8);
    assert_eq!(eval_int(&cx, unit, &sm, "8'hf0[5]"), 1);
    assert_eq!(eval_int(&cx, unit, &sm, "8'ha5[3:0]"), 5);
}

#[test]
fn constant_context_rejects_variables() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(&cx, &sm, "int v;\nint w = 1;");
    let unit = cx.compilation_units()[0];

    let (expr, _) = parse_expression_text(sm.clone(), "v + 1");
    let expr = expr.unwrap();
    let bound = cx.bind_expression(&expr, &BindContext::constant(unit));
    assert!(!bound.bad());
    let diags = cx.get_semantic_diagnostics();
    let not_constant = diags
        .iter()
        .find(|d| d.code == DiagCode::ExpressionNotConstant)
        .expect("should report ExpressionNotConstant");
    assert!(!not_constant.notes.is_empty());
}

#[test]
fn struct_member_access() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(
        &cx,
        &sm,
        "typedef struct packed { logic [3:0] hi; logic [3:0] lo; } pair_t;\n\
         parameter pair_t P = 8'h5a;",
    );
    let unit = cx.compilation_units()[0];

    let expr = bind(&cx, unit, &sm, "P.lo");
    assert_eq!(expr.ty.bit_width(), 4);
    assert_eq!(eval_int(&cx, unit, &sm, "P.lo"), 0xa);
    assert_eq!(eval_int(&cx, unit, &sm, "P.hi"), 0x5);

    // Access of an unknown member is diagnosed.
    let expr = bind(&cx, unit, &sm, "P.nothere");
    assert!(expr.bad());
    assert!(cx
        .get_semantic_diagnostics()
        .iter()
        .any(|d| d.code == DiagCode::UnknownMember));
}

#[test]
fn enum_values_auto_increment() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(&cx, &sm, "typedef enum { A, B = 5, C } abc_t;");
    let unit = cx.compilation_units()[0];
    assert_eq!(eval_int(&cx, unit, &sm, "A"), 0);
    assert_eq!(eval_int(&cx, unit, &sm, "B"), 5);
    assert_eq!(eval_int(&cx, unit, &sm, "C"), 6);
}

#[test]
fn packages_and_imports() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(
        &cx,
        &sm,
        "package pkg;\n  parameter int WIDTH = 12;\nendpackage\n\
         import pkg::*;\n\
         parameter int D = WIDTH - 2;",
    );
    let unit = cx.compilation_units()[0];
    assert_eq!(eval_int(&cx, unit, &sm, "pkg::WIDTH"), 12);
    assert_eq!(eval_int(&cx, unit, &sm, "D"), 10);
}

#[test]
fn undeclared_and_early_references() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(&cx, &sm, "int a = b;\nint b = 1;\nint c = nosuch;");
    let diags = cx.get_semantic_diagnostics();
    assert!(diags.iter().any(|d| d.code == DiagCode::UsedBeforeDeclared));
    assert!(diags
        .iter()
        .any(|d| d.code == DiagCode::UndeclaredIdentifier));
}

#[test]
fn shift_type_rules() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(&cx, &sm, "bit [7:0] a;\nlogic [3:0] s;");
    let unit = cx.compilation_units()[0];

    // The shift result has the lhs type, four-stated when the rhs is.
    let expr = bind(&cx, unit, &sm, "a << 2");
    assert_eq!(expr.ty.bit_width(), 8);
    assert!(!expr.ty.is_four_state());
    let expr = bind(&cx, unit, &sm, "a << s");
    assert_eq!(expr.ty.bit_width(), 8);
    assert!(expr.ty.is_four_state());
}

#[test]
fn comparison_and_equality_types() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(&cx, &sm, "bit [7:0] a;\nlogic [7:0] b;");
    let unit = cx.compilation_units()[0];

    let expr = bind(&cx, unit, &sm, "a < b");
    assert_eq!(expr.ty.bit_width(), 1);
    assert!(expr.ty.is_four_state());

    // Case equality is never four-state.
    let expr = bind(&cx, unit, &sm, "a === b");
    assert!(!expr.ty.is_four_state());
    assert!(expr.ty.is_scalar());
}

#[test]
fn subroutine_calls() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(
        &cx,
        &sm,
        "function int add(int a, int b);\n  return 0;\nendfunction\nint v;",
    );
    let unit = cx.compilation_units()[0];

    let expr = bind(&cx, unit, &sm, "add(1, 2)");
    assert!(!expr.bad());
    assert_eq!(expr.ty.bit_width(), 32);

    let expr = bind(&cx, unit, &sm, "add(1, 2, 3)");
    assert!(expr.bad());
    assert!(cx
        .get_semantic_diagnostics()
        .iter()
        .any(|d| d.code == DiagCode::TooManyArguments));

    let expr = bind(&cx, unit, &sm, "v(1)");
    assert!(expr.bad());
    assert!(cx
        .get_semantic_diagnostics()
        .iter()
        .any(|d| d.code == DiagCode::NotASubroutine));
}

#[test]
fn instance_bodies_are_lazily_elaborated() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(
        &cx,
        &sm,
        "module top;\n\
           parameter int N = 3;\n\
           bit [N-1:0] data;\n\
         endmodule",
    );
    cx.get_root();
    let top = cx.top_instances()[0];
    let scope = top.scope().unwrap();
    let data = scope
        .find(&cx, top, get_name_table().intern("data"))
        .expect("member should exist");
    assert_eq!(cx.value_type(data).bit_width(), 3);
    match &data.kind {
        SymbolKind::Variable(..) => (),
        _ => panic!("expected a variable"),
    }
    assert!(cx.get_semantic_diagnostics().is_empty());
}

#[test]
fn unbased_unsized_literals_widen() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(&cx, &sm, "bit [7:0] a;");
    let unit = cx.compilation_units()[0];

    // '1 in an 8-bit context fills all bits.
    let (expr, _) = parse_expression_text(sm.clone(), "'1");
    let expr = expr.unwrap();
    let target = cx.get_type(8, IntegralFlags::empty());
    let bound = cx.bind_assignment(
        target,
        &expr,
        mead_common::source::INVALID_LOCATION,
        &BindContext::new(unit),
    );
    let mut ctx = EvalContext::new();
    let value = bound.eval(&cx, &mut ctx);
    assert_eq!(value.integer().and_then(|v| v.as_i64()), Some(255));
}

#[test]
fn real_arithmetic() {
    let arena = GlobalArenas::default();
    let cx = Compilation::new(&arena);
    let sm = Rc::new(SourceManager::new());
    add_tree(&cx, &sm, "parameter real PI = 3.25;");
    let unit = cx.compilation_units()[0];

    let expr = bind(&cx, unit, &sm, "PI * 2");
    assert!(expr.ty.is_floating());
    let mut ctx = EvalContext::new();
    match expr.eval(&cx, &mut ctx) {
        ConstantValue::Real(v) => assert!((v - 6.5).abs() < 1e-12),
        other => panic!("expected a real value, got {:?}", other),
    }
}
