use std::rc::Rc;

use pretty_assertions::assert_eq;

use crate::ast::{ExprKind, GDeclKind, Oper, StmtKind, TransUnit, TypeKind, TY_INT};
use crate::diag::{DiagCtx, NullReporter, WarnOpts};
use crate::driver;
use crate::file_dir::FileDir;
use crate::typecheck::const_eval;

fn diag() -> DiagCtx {
    DiagCtx::new(Box::new(NullReporter), WarnOpts::default())
}

fn parse_clean(src: &str) -> TransUnit {
    let fdir = Rc::new(FileDir::new());
    let diag = diag();
    let toks = driver::tokenize_source(&fdir, &diag, &Default::default(), "test.c", src);
    let mut tu = TransUnit::new();
    let ok = super::parse(&mut tu, &toks, &diag, false);
    assert!(ok, "parse failed: {}", src);
    assert_eq!(diag.error_count(), 0, "errors parsing: {}", src);
    tu
}

fn eval_expr(src: &str) -> i64 {
    let fdir = Rc::new(FileDir::new());
    let diag = diag();
    let toks = driver::tokenize_source(&fdir, &diag, &Default::default(), "expr.c", src);
    let mut tu = TransUnit::new();
    let expr = super::parse_constant_expr(&mut tu, &toks, &diag).expect("expression parses");
    const_eval::eval(&tu, None, expr).expect("expression folds")
}

#[test]
fn simple_declaration() {
    let tu = parse_clean("int x;");
    assert_eq!(tu.gdecl_order.len(), 1);
    let decl = tu.gdecl(tu.gdecl_order[0]).decl;
    let node = tu.decl(decl).nodes[0];
    assert_eq!(tu.decl_node(node).id.as_deref(), Some("x"));
    assert_eq!(tu.decl_node(node).ty, TY_INT);
}

#[test]
fn declarators_share_one_base() {
    let tu = parse_clean("int *p, q[3];");
    let decl = tu.gdecl(tu.gdecl_order[0]).decl;
    let nodes = &tu.decl(decl).nodes;
    assert_eq!(nodes.len(), 2);

    let p_ty = tu.decl_node(nodes[0]).ty;
    match &tu.ty(p_ty).kind {
        TypeKind::Ptr { base, .. } => assert_eq!(*base, TY_INT),
        other => panic!("expected pointer, got {}", other.basic_name()),
    }
    let q_ty = tu.decl_node(nodes[1]).ty;
    match &tu.ty(q_ty).kind {
        TypeKind::Arr { base, .. } => assert_eq!(*base, TY_INT),
        other => panic!("expected array, got {}", other.basic_name()),
    }
}

#[test]
fn nested_declarator_attaches_inside_out() {
    // `int (*a[5])(void)`: array of pointer to function returning int.
    let tu = parse_clean("int (*a[5])(void);");
    let decl = tu.gdecl(tu.gdecl_order[0]).decl;
    let node = tu.decl(decl).nodes[0];
    let arr = tu.decl_node(node).ty;
    let ptr = match &tu.ty(arr).kind {
        TypeKind::Arr { base, .. } => *base,
        other => panic!("expected array at top, got {}", other.basic_name()),
    };
    let func = match &tu.ty(ptr).kind {
        TypeKind::Ptr { base, .. } => *base,
        other => panic!("expected pointer next, got {}", other.basic_name()),
    };
    match &tu.ty(func).kind {
        TypeKind::Func { ret, .. } => assert_eq!(*ret, TY_INT),
        other => panic!("expected function inside, got {}", other.basic_name()),
    }
}

#[test]
fn pointer_to_array_declarator() {
    // `int (*p)[4]`: pointer to array of int.
    let tu = parse_clean("int (*p)[4];");
    let decl = tu.gdecl(tu.gdecl_order[0]).decl;
    let node = tu.decl(decl).nodes[0];
    let ptr = tu.decl_node(node).ty;
    let arr = match &tu.ty(ptr).kind {
        TypeKind::Ptr { base, .. } => *base,
        other => panic!("expected pointer at top, got {}", other.basic_name()),
    };
    assert!(matches!(tu.ty(arr).kind, TypeKind::Arr { .. }));
}

#[test]
fn typedef_name_resolves_in_declaration_position() {
    let tu = parse_clean("typedef int myint; myint y;");
    let decl = tu.gdecl(tu.gdecl_order[1]).decl;
    let node = tu.decl(decl).nodes[0];
    match &tu.ty(tu.decl_node(node).ty).kind {
        TypeKind::Typedef { name, base, .. } => {
            assert_eq!(&**name, "myint");
            assert_eq!(*base, TY_INT);
        }
        other => panic!("expected typedef reference, got {}", other.basic_name()),
    }
}

#[test]
fn typedef_shadowed_by_declarator_name() {
    // The second `x` is the declared variable, not a type.
    parse_clean("typedef int x; void f(void) { x x; }");
}

#[test]
fn repeat_typedef_is_accepted() {
    parse_clean("typedef int t; typedef int t;");
}

#[test]
fn struct_definition_with_bit_fields() {
    let tu = parse_clean("struct s { int a:3; int b:5; char c; };");
    let decl = tu.gdecl(tu.gdecl_order[0]).decl;
    let ty = tu.decl(decl).ty;
    let inner = tu.unmod(ty);
    match &tu.ty(inner).kind {
        TypeKind::Struct(data) => assert_eq!(data.decls.len(), 3),
        other => panic!("expected struct, got {}", other.basic_name()),
    }
}

#[test]
fn anonymous_struct_and_union_members() {
    parse_clean("struct outer { int a; union { int b; struct { int c, d; }; }; };");
}

#[test]
fn enum_with_explicit_values() {
    let tu = parse_clean("enum color { RED, GREEN = 5, BLUE, };");
    let decl = tu.gdecl(tu.gdecl_order[0]).decl;
    let inner = tu.unmod(tu.decl(decl).ty);
    match &tu.ty(inner).kind {
        TypeKind::Enum { ids, .. } => assert_eq!(ids.len(), 3),
        other => panic!("expected enum, got {}", other.basic_name()),
    }
}

#[test]
fn long_long_and_unsigned_combine() {
    parse_clean("unsigned long long big; long double ld; short int si;");
}

#[test]
fn function_definition_parses_body() {
    let tu = parse_clean("int main(void) { int x = 1; return x; }");
    match &tu.gdecl(tu.gdecl_order[0]).kind {
        GDeclKind::FnDef { body, .. } => {
            match &tu.stmt(*body).kind {
                StmtKind::Compound { stmts, .. } => assert_eq!(stmts.len(), 2),
                _ => panic!("function body is not compound"),
            }
        }
        _ => panic!("expected a function definition"),
    }
}

#[test]
fn statements_parse() {
    parse_clean(
        "void f(int n) {\n\
         loop:\n\
         for (int i = 0; i < n; i++) { if (i == 2) continue; else break; }\n\
         while (n) { n--; }\n\
         do { n++; } while (n < 3);\n\
         switch (n) { case 1: n = 2; break; default: n = 0; }\n\
         if (n) goto loop;\n\
         }",
    );
}

#[test]
fn sizeof_type_and_expression() {
    parse_clean("int a; unsigned long b = sizeof(int); unsigned long c = sizeof a;");
}

#[test]
fn cast_vs_parenthesized_expression() {
    // `(t)(x)` is a cast when t is a typedef name, a call otherwise.
    let tu = parse_clean("typedef int t; int f(int x) { return (t)(x); }");
    match &tu.gdecl(tu.gdecl_order[1]).kind {
        GDeclKind::FnDef { body, .. } => {
            let ret = match &tu.stmt(*body).kind {
                StmtKind::Compound { stmts, .. } => stmts[0],
                _ => panic!("no body"),
            };
            let expr = match &tu.stmt(ret).kind {
                StmtKind::Return { expr: Some(e), .. } => *e,
                _ => panic!("no return expression"),
            };
            assert!(matches!(tu.expr(expr).kind, ExprKind::Cast { .. }));
        }
        _ => panic!("expected function"),
    }
}

#[test]
fn compound_literal() {
    parse_clean("typedef struct { int x, y; } point; void f(void) { point p = (point){ 1, 2 }; }");
}

#[test]
fn designated_initializers_parse() {
    let tu = parse_clean("struct s { int a, b; }; struct s v = { .b = 2, .a = 1 };");
    let decl = tu.gdecl(tu.gdecl_order[1]).decl;
    let node = tu.decl(decl).nodes[0];
    let init = tu.decl_node(node).init.expect("has initializer");
    match &tu.expr(init).kind {
        ExprKind::InitList { exprs } => assert_eq!(exprs.len(), 2),
        _ => panic!("expected an initializer list"),
    }
}

#[test]
fn offsetof_path() {
    parse_clean(
        "struct s { int a; int b[4]; };\n\
         unsigned long off = __builtin_offsetof(struct s, b[2]);",
    );
}

#[test]
fn precedence_and_associativity() {
    assert_eq!(eval_expr("2+3*4"), 14);
    assert_eq!(eval_expr("(2+3)*4"), 20);
    assert_eq!(eval_expr("10-3-2"), 5);
    assert_eq!(eval_expr("1 << 2+1"), 8);
    assert_eq!(eval_expr("7 & 3 | 4 ^ 1"), 7 & 3 | 4 ^ 1);
    assert_eq!(eval_expr("1 || 0 && 0"), 1);
    assert_eq!(eval_expr("-3 + +2"), -1);
    assert_eq!(eval_expr("~0 & 0xff"), 0xff);
}

#[test]
fn conditional_operator_binds_low_and_right() {
    assert_eq!(eval_expr("1 ? 2 : 3"), 2);
    assert_eq!(eval_expr("0 ? 2 : 0 ? 4 : 5"), 5);
    assert_eq!(eval_expr("1 + 1 ? 10 : 20"), 10);
}

#[test]
fn unary_operator_shapes() {
    let tu = parse_clean("void f(int *p) { int x = *p + -1; int *q = &x; }");
    drop(tu);
}

#[test]
fn assignment_operators() {
    let tu = parse_clean("void f(int x) { x += 2; x <<= 1; x = x; }");
    match &tu.gdecl(tu.gdecl_order[0]).kind {
        GDeclKind::FnDef { body, .. } => {
            let first = match &tu.stmt(*body).kind {
                StmtKind::Compound { stmts, .. } => stmts[0],
                _ => panic!("no body"),
            };
            let expr = match &tu.stmt(first).kind {
                StmtKind::Expr(e) => *e,
                _ => panic!("expected expression statement"),
            };
            match &tu.expr(expr).kind {
                ExprKind::Assign { op, .. } => assert_eq!(*op, Some(Oper::Plus)),
                _ => panic!("expected compound assignment"),
            }
        }
        _ => panic!("expected function"),
    }
}

#[test]
fn error_recovery_reaches_next_declaration() {
    let fdir = Rc::new(FileDir::new());
    let diag = diag();
    let toks = driver::tokenize_source(
        &fdir,
        &diag,
        &Default::default(),
        "test.c",
        "int 5; int y;",
    );
    let mut tu = TransUnit::new();
    let ok = super::parse(&mut tu, &toks, &diag, false);
    assert!(!ok);
    // The second declaration still made it into the unit.
    assert!(tu.gdecl_order.iter().any(|&g| {
        let decl = tu.gdecl(g).decl;
        tu.decl(decl)
            .nodes
            .iter()
            .any(|&n| tu.decl_node(n).id.as_deref() == Some("y"))
    }));
}

#[test]
fn static_assert_declaration() {
    parse_clean("_Static_assert(1 + 1 == 2, \"math works\");");
}

#[test]
fn varargs_signature() {
    let tu = parse_clean("int printf(const char *fmt, ...);");
    let decl = tu.gdecl(tu.gdecl_order[0]).decl;
    let node = tu.decl(decl).nodes[0];
    match &tu.ty(tu.decl_node(node).ty).kind {
        TypeKind::Func {
            params, varargs, ..
        } => {
            assert_eq!(params.len(), 1);
            assert!(*varargs);
        }
        other => panic!("expected function type, got {}", other.basic_name()),
    }
}
