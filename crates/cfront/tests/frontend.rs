//! End-to-end runs of the whole front end: preprocess, lex, parse,
//! type-check.

use std::rc::Rc;

use pretty_assertions::assert_eq;

use cfront::ast::{print, ExprKind, GDeclKind, Oper, StmtKind, TransUnit};
use cfront::diag::{CollectReporter, DiagCtx, NullReporter, Severity, WarnOpts};
use cfront::driver;
use cfront::file_dir::FileDir;
use cfront::typecheck::const_eval;

fn front(src: &str) -> (Result<TransUnit, cfront::Error>, DiagCtx) {
    front_with(Rc::new(FileDir::new()), src)
}

fn front_with(fdir: Rc<FileDir>, src: &str) -> (Result<TransUnit, cfront::Error>, DiagCtx) {
    let diag = DiagCtx::new(Box::new(NullReporter), WarnOpts::default());
    let result = driver::check_source(&fdir, &diag, &Default::default(), "main.c", src);
    (result, diag)
}

fn front_ok(src: &str) -> TransUnit {
    let (result, diag) = front(src);
    match result {
        Ok(tu) => tu,
        Err(_) => panic!("front end failed ({} errors)", diag.error_count()),
    }
}

/// The expression of the first `return` in the named function.
fn return_expr(tu: &TransUnit, fn_name: &str) -> cfront::ast::ExprId {
    for &g in &tu.gdecl_order {
        let gd = tu.gdecl(g);
        let body = match &gd.kind {
            GDeclKind::FnDef { body, .. } => *body,
            _ => continue,
        };
        let decl = gd.decl;
        let name = tu
            .decl(decl)
            .nodes
            .first()
            .and_then(|&n| tu.decl_node(n).id.clone());
        if name.as_deref() != Some(fn_name) {
            continue;
        }
        let stmts = match &tu.stmt(body).kind {
            StmtKind::Compound { stmts, .. } => stmts.clone(),
            _ => continue,
        };
        for s in stmts {
            if let StmtKind::Return { expr: Some(e), .. } = &tu.stmt(s).kind {
                return *e;
            }
        }
    }
    panic!("no return expression in {}", fn_name);
}

#[test]
fn nested_function_macros_fold() {
    // S1: nested function-like macros with pre-expanded arguments.
    let tu = front_ok(
        "#define FOO(a, b) ((a) + (b))\n\
         #define BAR(c, d) FOO(c*d, c*d)\n\
         int main() { return BAR(1,2); }\n",
    );
    let ret = return_expr(&tu, "main");
    let ety = tu.expr(ret).etype.get().expect("typed expression");
    assert!(tu.ty(tu.unmod(ety)).kind.is_integral());
    assert_eq!(const_eval::eval(&tu, Some(tu.root_scope), ret), Some(4));
}

#[test]
fn token_paste_chain_builds_long_literal() {
    // S2: `1 ## ## 2 ## 3 ## L` lexes as the single token `123L`.
    let tu = front_ok(
        "#define CATTER(a,b,c) a ## ## b ## c ## L\n\
         int main() { return CATTER(1,2,3); }\n",
    );
    let ret = return_expr(&tu, "main");
    match &tu.expr(ret).kind {
        ExprKind::ConstInt { val, .. } => assert_eq!(*val, 123),
        _ => panic!("pasted literal did not fold into one constant"),
    }
    assert_eq!(const_eval::eval(&tu, Some(tu.root_scope), ret), Some(123));
}

#[test]
fn macro_shadowing_function_expands_once() {
    // S3: the macro expands once; the inner call survives as a real call to
    // the function of the same name.
    let tu = front_ok(
        "#define plus(x,y) x*y+plus(x,y)\n\
         int plus(int a,int b){return a+b;}\n\
         int main(){ return plus(2,3); }\n",
    );
    let ret = return_expr(&tu, "main");
    match &tu.expr(ret).kind {
        ExprKind::Bin { op, lhs, rhs } => {
            assert_eq!(*op, Oper::Plus);
            assert!(matches!(
                tu.expr(*lhs).kind,
                ExprKind::Bin {
                    op: Oper::Times,
                    ..
                }
            ));
            match &tu.expr(*rhs).kind {
                ExprKind::Call { func, args } => {
                    assert!(matches!(&tu.expr(*func).kind, ExprKind::Var(n) if &**n == "plus"));
                    assert_eq!(args.len(), 2);
                }
                _ => panic!("inner plus(2,3) is not a call"),
            }
        }
        _ => panic!("expansion shape is wrong"),
    }
}

#[test]
fn include_guard_defines_once() {
    // S4: the guarded header contributes its declaration exactly once.
    let fdir = Rc::new(FileDir::new());
    fdir.insert_virtual(
        "guard.h",
        "#ifndef H\n#define H\nint x;\n#endif\n",
    );
    let (result, diag) = front_with(
        fdir,
        "#include \"guard.h\"\n#include \"guard.h\"\nint main(void) { return x; }\n",
    );
    assert!(result.is_ok(), "{} errors", diag.error_count());
}

#[test]
fn unguarded_double_include_redefines() {
    let fdir = Rc::new(FileDir::new());
    fdir.insert_virtual("plain.h", "int x;\n");
    let (result, _) = front_with(
        fdir,
        "#include \"plain.h\"\n#include \"plain.h\"\n",
    );
    assert!(result.is_err(), "second definition of x must be an error");
}

#[test]
fn anonymous_aggregate_offsets_via_static_assert() {
    // S5's arithmetic checked by the compiler under test itself.
    front_ok(
        "typedef struct { int a; union { int b; struct { int c, d; }; }; } T;\n\
         T t = { .a=1, .c=2, .d=3 };\n\
         _Static_assert(sizeof(T) == 12, \"size\");\n\
         _Static_assert(__builtin_offsetof(T, a) == 0, \"a\");\n\
         _Static_assert(__builtin_offsetof(T, b) == 4, \"b\");\n\
         _Static_assert(__builtin_offsetof(T, c) == 4, \"c\");\n\
         _Static_assert(__builtin_offsetof(T, d) == 8, \"d\");\n",
    );
}

#[test]
fn bit_field_struct_size_via_static_assert() {
    // S6.
    front_ok(
        "struct S { int a:3; int b:5; char c; };\n\
         _Static_assert(sizeof(struct S) == 4, \"size\");\n",
    );
}

#[test]
fn failing_unit_is_not_handed_on() {
    let (result, diag) = front("int main(void) { return undeclared_thing; }\n");
    assert!(matches!(result, Err(cfront::Error::Failed)));
    assert!(diag.error_count() > 0);
}

#[test]
fn diagnostics_name_file_line_column() {
    let fdir = Rc::new(FileDir::new());
    let reporter = Rc::new(CollectReporter::new());
    struct Fwd(Rc<CollectReporter>);
    impl cfront::diag::Reporter for Fwd {
        fn report(&self, d: &cfront::diag::Diagnostic) {
            self.0.report(d)
        }
    }
    let diag = DiagCtx::new(Box::new(Fwd(Rc::clone(&reporter))), WarnOpts::default());
    let result = driver::check_source(
        &fdir,
        &diag,
        &Default::default(),
        "main.c",
        "int main(void) {\n  return nope;\n}\n",
    );
    assert!(result.is_err());
    let diags = reporter.diags.borrow();
    let (sev, mark, msg) = &diags[0];
    assert_eq!(*sev, Severity::Error);
    assert!(msg.contains("nope"));
    assert!(mark.as_deref().unwrap_or("").starts_with("main.c:2:"));
}

#[test]
fn werror_fails_the_unit() {
    let fdir = Rc::new(FileDir::new());
    let diag = DiagCtx::new(
        Box::new(NullReporter),
        WarnOpts {
            error: true,
            ..WarnOpts::default()
        },
    );
    let result = driver::check_source(
        &fdir,
        &diag,
        &Default::default(),
        "main.c",
        "void f(void) { int *p = 5; }\n",
    );
    assert!(result.is_err());
}

#[test]
fn cli_defines_reach_the_unit() {
    let fdir = Rc::new(FileDir::new());
    let diag = DiagCtx::new(Box::new(NullReporter), WarnOpts::default());
    let config = driver::Config {
        defines: vec!["N=3".to_string()],
        ..Default::default()
    };
    let result = driver::check_source(
        &fdir,
        &diag,
        &config,
        "main.c",
        "int arr[N];\n_Static_assert(sizeof(arr) == 12, \"N\");\n",
    );
    assert!(result.is_ok());
}

#[test]
fn ast_dump_round_trips_declarator_shape() {
    let fdir = Rc::new(FileDir::new());
    let diag = DiagCtx::new(Box::new(NullReporter), WarnOpts::default());
    let config = driver::Config {
        keep_parens: true,
        ..Default::default()
    };
    let parse = driver::parse_source(
        &fdir,
        &diag,
        &config,
        "main.c",
        "int (*handlers[4])(void);\n",
    );
    assert!(parse.ok);
    let out = print::print_translation_unit(&parse.tu);
    assert!(
        out.contains("(*handlers[4])"),
        "printer lost the declarator shape: {}",
        out
    );
}

#[test]
fn function_scope_and_labels() {
    front_ok(
        "int collatz(int n) {\n\
         int steps = 0;\n\
         again:\n\
         if (n == 1) return steps;\n\
         if (n % 2) { n = 3 * n + 1; } else { n = n / 2; }\n\
         steps++;\n\
         goto again;\n\
         }\n",
    );
}

#[test]
fn conditional_compilation_selects_declarations() {
    let tu = front_ok(
        "#define FEATURE 1\n\
         #if FEATURE\n\
         int enabled(void) { return 1; }\n\
         #else\n\
         int disabled(void) { return 0; }\n\
         #endif\n\
         int main(void) { return enabled(); }\n",
    );
    assert_eq!(tu.gdecl_order.len(), 2);
}
