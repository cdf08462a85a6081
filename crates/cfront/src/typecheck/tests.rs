use std::rc::Rc;

use pretty_assertions::assert_eq;

use crate::ast::{init_list, layout, ExprKind, TransUnit, TypeId};
use crate::diag::{DiagCtx, NullReporter, WarnOpts};
use crate::driver;
use crate::file_dir::FileDir;

fn run(src: &str) -> (Result<TransUnit, crate::Error>, DiagCtx) {
    let fdir = Rc::new(FileDir::new());
    let diag = DiagCtx::new(Box::new(NullReporter), WarnOpts::default());
    let result = driver::check_source(&fdir, &diag, &Default::default(), "test.c", src);
    (result, diag)
}

fn check_ok(src: &str) -> TransUnit {
    let (result, diag) = run(src);
    match result {
        Ok(tu) => tu,
        Err(_) => panic!("expected clean check ({} errors): {}", diag.error_count(), src),
    }
}

fn check_fails(src: &str) {
    let (result, _) = run(src);
    assert!(result.is_err(), "expected errors: {}", src);
}

/// The type declared by the n-th global declaration, modifiers stripped.
fn nth_type(tu: &TransUnit, n: usize) -> TypeId {
    let decl = tu.gdecl(tu.gdecl_order[n]).decl;
    tu.unmod(tu.decl_type(decl))
}

// ----------------------------------------------------------------------
// Layout
// ----------------------------------------------------------------------

#[test]
fn bit_field_run_is_packed() {
    // a:3 and b:5 share one byte; c lands at offset 1; the struct rounds
    // up to int alignment.
    let tu = check_ok("struct s { int a:3; int b:5; char c; };");
    let s = nth_type(&tu, 0);
    assert_eq!(layout::type_size(&tu, s), 4);
    assert_eq!(layout::type_align(&tu, s), 4);
    assert_eq!(layout::find_member(&tu, s, "c").unwrap().1, 1);
}

#[test]
fn bit_field_straddle_opens_new_unit() {
    let tu = check_ok("struct s { int a:30; int b:30; };");
    let s = nth_type(&tu, 0);
    assert_eq!(layout::type_size(&tu, s), 8);
}

#[test]
fn zero_width_bit_field_aligns_to_byte() {
    let tu = check_ok("struct s { char a:2; char :0; char b:1; };");
    let s = nth_type(&tu, 0);
    assert_eq!(layout::find_member(&tu, s, "b").unwrap().1, 1);
    assert_eq!(layout::type_size(&tu, s), 2);
}

#[test]
fn struct_padding_and_alignment() {
    let tu = check_ok("struct s { char c; long l; };");
    let s = nth_type(&tu, 0);
    assert_eq!(layout::type_size(&tu, s), 16);
    assert_eq!(layout::type_align(&tu, s), 8);
    assert_eq!(layout::find_member(&tu, s, "l").unwrap().1, 8);
}

#[test]
fn size_is_multiple_of_alignment() {
    let sources = [
        "struct s { char a; };",
        "struct s { char a; short b; char c; };",
        "struct s { int a; char b; };",
        "struct s { long double x; char y; };",
        "union s { char a[3]; int b; };",
    ];
    for src in sources {
        let tu = check_ok(src);
        let s = nth_type(&tu, 0);
        let size = layout::type_size(&tu, s);
        let align = layout::type_align(&tu, s);
        assert_eq!(size % align, 0, "{}", src);
    }
}

#[test]
fn union_members_share_offset_zero() {
    let tu = check_ok("union u { char c; int i; long l; };");
    let u = nth_type(&tu, 0);
    assert_eq!(layout::type_size(&tu, u), 8);
    assert_eq!(layout::find_member(&tu, u, "c").unwrap().1, 0);
    assert_eq!(layout::find_member(&tu, u, "l").unwrap().1, 0);
}

#[test]
fn array_size_is_count_times_element() {
    let tu = check_ok("int a[10];");
    let decl = tu.gdecl(tu.gdecl_order[0]).decl;
    let node = tu.decl(decl).nodes[0];
    assert_eq!(layout::type_size(&tu, tu.decl_node(node).ty), 40);
}

#[test]
fn anonymous_aggregate_layout() {
    // The S5 shape: offsets reach through the anonymous union and struct.
    let tu = check_ok(
        "typedef struct { int a; union { int b; struct { int c, d; }; }; } T; T t;",
    );
    let t = tu
        .scopes
        .lookup_typedef(tu.root_scope, "T")
        .expect("typedef T");
    let t = tu.unmod(t);
    assert_eq!(layout::type_size(&tu, t), 12);
    assert_eq!(layout::find_member(&tu, t, "a").unwrap().1, 0);
    assert_eq!(layout::find_member(&tu, t, "b").unwrap().1, 4);
    assert_eq!(layout::find_member(&tu, t, "c").unwrap().1, 4);
    assert_eq!(layout::find_member(&tu, t, "d").unwrap().1, 8);
}

#[test]
fn offsetof_folds_to_member_offset() {
    let tu = check_ok(
        "struct s { int a; long b; int c[4]; };\n\
         unsigned long ob = __builtin_offsetof(struct s, b);\n\
         unsigned long oc = __builtin_offsetof(struct s, c[2]);",
    );
    let eval_init = |n: usize| {
        let decl = tu.gdecl(tu.gdecl_order[n]).decl;
        let node = tu.decl(decl).nodes[0];
        let init = tu.decl_node(node).init.expect("initializer");
        super::const_eval::eval(&tu, Some(tu.root_scope), init).expect("constant")
    };
    assert_eq!(eval_init(1), 8);
    assert_eq!(eval_init(2), 16 + 2 * 4);
}

// ----------------------------------------------------------------------
// Initializer lists
// ----------------------------------------------------------------------

fn global_init(tu: &TransUnit, n: usize) -> crate::ast::ExprId {
    let decl = tu.gdecl(tu.gdecl_order[n]).decl;
    let node = tu.decl(decl).nodes[0];
    tu.decl_node(node).init.expect("initializer")
}

#[test]
fn designators_reorder_into_member_order() {
    let tu = check_ok("struct s { int a, b, c; }; struct s v = { .c = 3, .a = 1 };");
    let init = global_init(&tu, 1);
    let exprs = match &tu.expr(init).kind {
        ExprKind::InitList { exprs } => exprs.clone(),
        _ => panic!("not a list"),
    };
    assert_eq!(exprs.len(), 3);
    assert!(matches!(
        tu.expr(exprs[0]).kind,
        ExprKind::ConstInt { val: 1, .. }
    ));
    // The unfilled middle slot is a placeholder.
    assert!(matches!(tu.expr(exprs[1]).kind, ExprKind::Void));
    assert!(matches!(
        tu.expr(exprs[2]).kind,
        ExprKind::ConstInt { val: 3, .. }
    ));
}

#[test]
fn designators_descend_into_anonymous_members() {
    // S5: the .c/.d designators land in a synthetic list for the anonymous
    // union, which holds a synthetic list for the anonymous struct.
    let tu = check_ok(
        "typedef struct { int a; union { int b; struct { int c, d; }; }; } T;\n\
         T t = { .a = 1, .c = 2, .d = 3 };",
    );
    let init = global_init(&tu, 1);
    let outer = match &tu.expr(init).kind {
        ExprKind::InitList { exprs } => exprs.clone(),
        _ => panic!("not a list"),
    };
    assert_eq!(outer.len(), 2);
    assert!(matches!(
        tu.expr(outer[0]).kind,
        ExprKind::ConstInt { val: 1, .. }
    ));
    let union_list = match &tu.expr(outer[1]).kind {
        ExprKind::InitList { exprs } => exprs.clone(),
        _ => panic!("second element is not a nested list"),
    };
    assert_eq!(union_list.len(), 1);
    let struct_list = match &tu.expr(union_list[0]).kind {
        ExprKind::InitList { exprs } => exprs.clone(),
        _ => panic!("union element is not a nested list"),
    };
    assert_eq!(struct_list.len(), 2);
    assert!(matches!(
        tu.expr(struct_list[0]).kind,
        ExprKind::ConstInt { val: 2, .. }
    ));
    assert!(matches!(
        tu.expr(struct_list[1]).kind,
        ExprKind::ConstInt { val: 3, .. }
    ));
}

#[test]
fn canonicalization_is_idempotent() {
    let mut tu = check_ok("struct s { int a, b; }; struct s v = { .b = 2 };");
    let init = global_init(&tu, 1);
    let before = match &tu.expr(init).kind {
        ExprKind::InitList { exprs } => exprs.clone(),
        _ => panic!("not a list"),
    };
    let target = nth_type(&tu, 0);
    let diag = DiagCtx::new(Box::new(NullReporter), WarnOpts::default());
    assert!(init_list::canonicalize(&mut tu, &diag, target, init));
    let after = match &tu.expr(init).kind {
        ExprKind::InitList { exprs } => exprs.clone(),
        _ => panic!("not a list"),
    };
    assert_eq!(before, after);
    assert_eq!(diag.error_count(), 0);
}

#[test]
fn union_initializer_keeps_one_value() {
    let (result, diag) = run("union u { int a; int b; }; union u v = { 1, 2 };");
    assert!(result.is_ok());
    assert!(diag.warning_count() > 0, "excess union elements should warn");
}

#[test]
fn unknown_designator_is_an_error() {
    check_fails("struct s { int a; }; struct s v = { .nope = 1 };");
}

#[test]
fn array_from_init_list_length() {
    let tu = check_ok("int a[] = { 1, 2, 3 };");
    let decl = tu.gdecl(tu.gdecl_order[0]).decl;
    let node = tu.decl(decl).nodes[0];
    assert_eq!(layout::type_size(&tu, tu.decl_node(node).ty), 12);
}

#[test]
fn short_array_initializer_warns_when_excess() {
    let (result, diag) = run("int a[2] = { 1, 2, 3 };");
    assert!(result.is_ok());
    assert!(diag.warning_count() > 0);
}

// ----------------------------------------------------------------------
// Typing
// ----------------------------------------------------------------------

#[test]
fn numeric_assignability_is_transitive() {
    check_ok(
        "void f(void) { char c = 1; int i = c; long l = i; double d = l; }",
    );
}

#[test]
fn struct_assignment_requires_same_node() {
    check_ok("struct a { int x; }; void f(struct a p, struct a q) { p = q; }");
    check_fails(
        "struct a { int x; }; struct b { int x; };\n\
         void f(struct a p, struct b q) { p = q; }",
    );
}

#[test]
fn void_pointer_unifies() {
    check_ok("void f(void *p, int *q) { p = q; q = p; }");
}

#[test]
fn int_to_pointer_warns_but_passes() {
    let (result, diag) = run("void f(void) { int *p = 5; }");
    assert!(result.is_ok());
    assert!(diag.warning_count() > 0);
}

#[test]
fn float_to_pointer_is_an_error() {
    check_fails("void f(float z) { int *p = z; }");
}

#[test]
fn undeclared_identifier() {
    check_fails("void f(void) { x = 1; }");
}

#[test]
fn assignment_needs_an_lvalue() {
    check_fails("void f(void) { 3 = 4; }");
}

#[test]
fn pointer_difference_is_size_t() {
    let tu = check_ok("unsigned long f(int *a, int *b) { return a - b; }");
    drop(tu);
}

#[test]
fn comparison_yields_bool_condition() {
    check_ok("int f(int a, int b) { if (a < b) return 1; return 0; }");
}

#[test]
fn break_and_continue_need_context() {
    check_fails("void f(void) { break; }");
    check_fails("void f(void) { continue; }");
    check_fails("void f(int n) { switch (n) { case 1: continue; } }");
    check_ok("void f(int n) { while (n) { if (n == 2) break; continue; } }");
}

#[test]
fn goto_must_resolve() {
    check_ok("void f(void) { goto out; out: return; }");
    check_fails("void f(void) { goto nowhere; }");
}

#[test]
fn case_needs_constant_integral_value() {
    check_ok("void f(int n) { switch (n) { case 1 + 2: break; } }");
    check_fails("void f(int n, int m) { switch (n) { case m: break; } }");
    check_fails("void f(float x) { switch (x) { default: break; } }");
}

#[test]
fn call_arity_is_checked() {
    check_fails("int g(int a, int b); void f(void) { g(1); }");
    check_fails("int g(int a); void f(void) { g(1, 2); }");
    check_ok("int g(void); void f(void) { g(); }");
    check_ok("int g(int a, ...); void f(void) { g(1, 2, 3); }");
}

#[test]
fn return_mismatches_warn() {
    let (result, diag) = run("int f(void) { return; }");
    assert!(result.is_ok());
    assert!(diag.warning_count() > 0);

    let (result, diag) = run("void g(void) { return 1; }");
    assert!(result.is_ok());
    assert!(diag.warning_count() > 0);
}

#[test]
fn duplicate_member_is_an_error() {
    check_fails("struct s { int a; int a; };");
    check_fails("struct s { int a; struct { int a; int b; }; };");
}

#[test]
fn variable_redefinition() {
    check_fails("int x; int x;");
    check_ok("extern int x; int x;");
    check_ok("int g(void); int g(void) { return 0; }");
}

#[test]
fn incomplete_struct_needs_pointer() {
    check_fails("struct nosuch v;");
    check_ok("struct nosuch *p;");
}

#[test]
fn dereference_checks() {
    let (result, diag) = run("void f(void *p) { *p; }");
    assert!(result.is_ok());
    assert!(diag.warning_count() > 0, "void * deref warns");

    check_fails("struct q; void f(struct q *p) { *p; }");
    check_fails("void f(int x) { *x; }");
}

#[test]
fn member_access_forms() {
    check_ok(
        "struct s { int a; }; void f(struct s v, struct s *p) { v.a = p->a; }",
    );
    check_fails("struct s { int a; }; void f(struct s v) { v->a; }");
    check_fails("struct s { int a; }; void f(struct s v) { v.nope; }");
}

#[test]
fn enumerators_are_constants() {
    let tu = check_ok("enum e { A = 3 * 4, B }; int arr[B];");
    let decl = tu.gdecl(tu.gdecl_order[1]).decl;
    let node = tu.decl(decl).nodes[0];
    // B follows A implicitly: 13 elements.
    assert_eq!(layout::type_size(&tu, tu.decl_node(node).ty), 13 * 4);
}

#[test]
fn constant_evaluator_is_deterministic() {
    let tu = check_ok("enum e { A = 5 }; int arr[A * 2 + 1];");
    let decl = tu.gdecl(tu.gdecl_order[1]).decl;
    let node = tu.decl(decl).nodes[0];
    let len = match &tu.ty(tu.decl_node(node).ty).kind {
        crate::ast::TypeKind::Arr { len, .. } => len.expect("length expression"),
        _ => panic!("not an array"),
    };
    let a = super::const_eval::eval(&tu, Some(tu.root_scope), len);
    let b = super::const_eval::eval(&tu, Some(tu.root_scope), len);
    assert_eq!(a, b);
    assert_eq!(a, Some(11));
}

#[test]
fn static_assert_checks() {
    check_ok("_Static_assert(sizeof(int) == 4, \"int is 4 bytes\");");
    check_fails("_Static_assert(sizeof(int) == 3, \"will not hold\");");
}

#[test]
fn va_builtins() {
    check_ok(
        "void f(int last, ...) {\n\
         __builtin_va_list ap, ap2;\n\
         __builtin_va_start(ap, last);\n\
         int x = __builtin_va_arg(ap, int);\n\
         __builtin_va_copy(ap2, ap);\n\
         __builtin_va_end(ap);\n\
         }",
    );
    check_fails(
        "void f(int a, int b, ...) {\n\
         __builtin_va_list ap;\n\
         __builtin_va_start(ap, a);\n\
         }",
    );
    check_fails("void f(int a, ...) { int ap; __builtin_va_start(ap, a); }");
}

#[test]
fn typedef_scoping_shadows() {
    check_ok(
        "typedef int t;\n\
         void f(void) { typedef char t; t small; small = 'x'; }\n\
         t wide;",
    );
}

#[test]
fn conditional_operator_types() {
    check_ok("int f(int a, int b) { return a ? a + 1 : b; }");
    check_fails("struct s { int x; }; void f(struct s v) { if (v) ; }");
}
