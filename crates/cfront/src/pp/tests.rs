use std::rc::Rc;

use pretty_assertions::assert_eq;

use crate::diag::{DiagCtx, NullReporter, WarnOpts};
use crate::file_dir::FileDir;

use super::Preprocessor;

struct Run {
    output: String,
    diag: DiagCtx,
}

fn run_with(fdir: Rc<FileDir>, input: &str) -> Run {
    let diag = DiagCtx::new(Box::new(NullReporter), WarnOpts::default());
    let mut pp = Preprocessor::new(fdir, diag.clone(), &[]);
    pp.open_virtual("test.c", input);
    let mut output = String::new();
    while let Some(c) = pp.next_char() {
        output.push(c as char);
    }
    Run { output, diag }
}

fn run(input: &str) -> Run {
    run_with(Rc::new(FileDir::new()), input)
}

/// Whitespace-insensitive comparison: comments become spaces and macro
/// boundaries shift spacing, but token adjacency must be preserved.
fn norm(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn expand(input: &str, expected: &str) {
    let run = run(input);
    assert_eq!(norm(&run.output), norm(expected), "(actual on the left)");
    assert_eq!(run.diag.error_count(), 0, "unexpected errors");
}

#[test]
fn plain_text_passes_through() {
    let input = "int main() { return 0; }\n";
    let run = run(input);
    assert_eq!(run.output, input);
}

#[test]
fn comments_become_whitespace() {
    expand("a/* comment */b // eol\nc", "a b\nc");
}

#[test]
fn comment_does_not_fuse_tokens() {
    let run = run("int/*x*/y;");
    assert!(run.output.contains("int"));
    assert!(!norm(&run.output).contains("inty"));
}

#[test]
fn object_macro() {
    expand("#define FIVE 5\nFIVE+FIVE", "5+5");
}

#[test]
fn nested_object_macros_rescan() {
    expand(
        "#define ONE TWO\n#define TWO THREE\n#define THREE 21\nONE+3",
        "21+3",
    );
}

#[test]
fn function_macro() {
    expand("#define ADD(x,y) x+y\nADD(1, 2)", "1+2");
}

#[test]
fn function_macro_without_parens_is_identifier() {
    expand("#define ADD(x,y) x+y\nADD", "ADD");
}

#[test]
fn nested_function_macros() {
    expand(
        "#define FOO(a, b) ((a) + (b))\n#define BAR(c, d) FOO(c*d, c*d)\nBAR(1,2)",
        "((1*2) + (1*2))",
    );
}

#[test]
fn self_reference_is_bounded() {
    expand("#define A A\nA", "A");
}

#[test]
fn recursive_function_macro_expands_once() {
    expand(
        "#define plus(x,y) x*y+plus(x,y)\nplus(2,3)",
        "2*3+plus(2,3)",
    );
}

#[test]
fn stringify_parameter() {
    expand("#define S(x) #x\nS(a b)", "\"a b\"");
}

#[test]
fn stringify_escapes_quotes() {
    let run = run("#define S(x) #x\nS(\"q\")");
    assert_eq!(norm(&run.output), r#""\"q\"""#);
    assert_eq!(run.diag.error_count(), 0);
}

#[test]
fn paste_tokens() {
    expand("#define CAT(a,b) a ## b\nCAT(foo, bar)", "foobar");
    expand("#define CAT(a,b) a##b\nCAT(12, 34)", "1234");
}

#[test]
fn paste_chain_with_literal_suffix() {
    expand(
        "#define CATTER(a,b,c) a ## ## b ## c ## L\nCATTER(1,2,3)",
        "123L",
    );
}

#[test]
fn pasted_name_is_not_rescanned() {
    expand(
        "#define FOO bar\n#define CAT(a,b) a##b\nCAT(F, OO)",
        "FOO",
    );
}

#[test]
fn macro_args_strip_surrounding_whitespace() {
    expand("#define ID(x) x\nID(  7  )+1", "7+1");
}

#[test]
fn wrong_argument_count_is_an_error() {
    let run = run("#define ADD(x,y) x+y\nADD(1)\n");
    assert!(run.diag.error_count() > 0);
}

#[test]
fn ifdef_takes_defined_branch() {
    expand("#define A\n#ifdef A\nyes\n#else\nno\n#endif", "yes");
    expand("#ifdef B\nyes\n#else\nno\n#endif", "no");
}

#[test]
fn ifndef_takes_undefined_branch() {
    expand("#ifndef B\nyes\n#endif", "yes");
}

#[test]
fn nested_conditionals_skip_correctly() {
    expand(
        "#ifdef A\n#ifdef B\nb\n#else\nnb\n#endif\nx\n#else\nouter\n#endif",
        "outer",
    );
}

#[test]
fn if_evaluates_arithmetic() {
    expand("#if 1 + 2 > 2\nyes\n#endif", "yes");
    expand("#if 1 + 2 > 4\nyes\n#else\nno\n#endif", "no");
}

#[test]
fn if_treats_unknown_identifiers_as_zero() {
    expand("#if MYSTERY\nyes\n#else\nno\n#endif", "no");
}

#[test]
fn if_defined_operator() {
    expand(
        "#define A 1\n#if defined(A) && A > 0\nyes\n#endif",
        "yes",
    );
    expand("#if defined B\nyes\n#else\nno\n#endif", "no");
}

#[test]
fn elif_chain_takes_first_true_branch() {
    expand(
        "#define V 2\n#if V == 1\none\n#elif V == 2\ntwo\n#elif V == 3\nthree\n#else\nother\n#endif",
        "two",
    );
}

#[test]
fn elif_after_taken_branch_is_skipped() {
    expand("#if 1\nfirst\n#elif 1\nsecond\n#endif", "first");
}

#[test]
fn undef_removes_macro() {
    expand("#define A 1\n#undef A\nA", "A");
}

#[test]
fn redefinition_warns() {
    let run = run("#define A 1\n#define A 2\nA\n");
    assert_eq!(run.diag.warning_count(), 1);
    assert_eq!(norm(&run.output), "2");
}

#[test]
fn unterminated_conditional_is_an_error() {
    let run = run("#ifdef A\nx\n");
    assert!(run.diag.error_count() > 0);
}

#[test]
fn unknown_directive_is_an_error() {
    let run = run("#frobnicate all the things\nint x;\n");
    assert!(run.diag.error_count() > 0);
    assert!(run.output.contains("int x;"));
}

#[test]
fn error_directive_reports() {
    let run = run("#error something is off\n");
    assert_eq!(run.diag.error_count(), 1);
}

#[test]
fn stray_hash_is_an_error() {
    let run = run("int x; #define A 1\n");
    assert!(run.diag.error_count() > 0);
}

#[test]
fn line_directive_updates_mark() {
    let run = run("#line 100 \"other.c\"\n__LINE__ __FILE__\n");
    assert_eq!(norm(&run.output), "100 \"other.c\"");
}

#[test]
fn predefined_macros() {
    expand("__STDC__", "1");
    expand("__STDC_VERSION__", "201112L");
    expand("__alignof__", "_Alignof");
    expand("__attribute__((unused)) int x;", "int x;");
}

#[test]
fn file_and_line_builtins() {
    let run = run("__FILE__\n__LINE__\n");
    assert_eq!(norm(&run.output), "\"test.c\" 2");
}

#[test]
fn cli_defines() {
    let fdir = Rc::new(FileDir::new());
    let diag = DiagCtx::new(Box::new(NullReporter), WarnOpts::default());
    let mut pp = Preprocessor::new(Rc::clone(&fdir), diag.clone(), &[]);
    pp.define_cli("FLAG");
    pp.define_cli("VALUE=41");
    pp.open_virtual("test.c", "#if FLAG\nVALUE+1\n#endif\n");
    let mut out = String::new();
    while let Some(c) = pp.next_char() {
        out.push(c as char);
    }
    assert_eq!(norm(&out), "41+1");
}

#[test]
fn include_pushes_file() {
    let fdir = Rc::new(FileDir::new());
    fdir.insert_virtual("decls.h", "int from_header;\n");
    let run = run_with(fdir, "#include \"decls.h\"\nint after;\n");
    assert_eq!(norm(&run.output), "int from_header; int after;");
    assert_eq!(run.diag.error_count(), 0);
}

#[test]
fn include_guard_elides_second_inclusion() {
    let fdir = Rc::new(FileDir::new());
    fdir.insert_virtual("guard.h", "#ifndef H\n#define H\nint x;\n#endif\n");
    let run = run_with(
        fdir,
        "#include \"guard.h\"\n#include \"guard.h\"\nint y;\n",
    );
    assert_eq!(run.output.matches("int x;").count(), 1);
    assert_eq!(run.diag.error_count(), 0);
}

#[test]
fn include_expands_macro_operand() {
    let fdir = Rc::new(FileDir::new());
    fdir.insert_virtual("real.h", "int real;\n");
    let run = run_with(fdir, "#define WHERE \"real.h\"\n#include WHERE\n");
    assert_eq!(norm(&run.output), "int real;");
    assert_eq!(run.diag.error_count(), 0);
}

#[test]
fn missing_include_is_an_error() {
    let run = run("#include \"no/such/file_xyz.h\"\nint x;\n");
    assert!(run.diag.error_count() > 0);
    assert!(run.output.contains("int x;"));
}

#[test]
fn include_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let header = dir.path().join("disk.h");
    std::fs::write(&header, "int on_disk;\n").expect("write header");

    let fdir = Rc::new(FileDir::new());
    let diag = DiagCtx::new(Box::new(NullReporter), WarnOpts::default());
    let mut pp = Preprocessor::new(
        Rc::clone(&fdir),
        diag.clone(),
        &[dir.path().to_path_buf()],
    );
    pp.open_virtual("main.c", "#include <disk.h>\nint after;\n");
    let mut out = String::new();
    while let Some(c) = pp.next_char() {
        out.push(c as char);
    }
    assert_eq!(norm(&out), "int on_disk; int after;");
    assert_eq!(diag.error_count(), 0);
}

#[test]
fn backslash_newline_continues_directive() {
    expand("#define LONG 1 + \\\n2\nLONG", "1 + 2");
}

#[test]
fn strings_are_not_expanded() {
    expand("#define A 5\n\"A\" 'A' A", "\"A\" 'A' 5");
}

#[test]
fn macro_diag_carries_expansion_chain() {
    use crate::lexer::Lexer;

    let fdir = Rc::new(FileDir::new());
    let diag = DiagCtx::new(Box::new(NullReporter), WarnOpts::default());
    let mut pp = Preprocessor::new(fdir, diag.clone(), &[]);
    pp.open_virtual("test.c", "#define ID(x) x\nID(1)\n");
    let mut lexer = Lexer::new(pp, diag.clone());
    let toks = lexer.tokenize();
    // The `1` token came out of a macro expansion and must know it.
    let lit = toks
        .iter()
        .find(|t| matches!(t.kind, crate::lexer::TokenKind::IntLit))
        .expect("literal token");
    assert!(lit.mark.parent.is_some());
    assert_eq!(
        &*lit.mark.parent.as_ref().unwrap().macro_name,
        "ID"
    );
}
