//! Preprocessor directives.
//!
//! Entered from the state machine when a `#` opens a line outside of any
//! macro frame. Each handler consumes its own operands from the top file
//! stream; the rest of the logical line is discarded afterwards.

use std::rc::Rc;

use crate::ast::TransUnit;
use crate::diag::DiagCtx;
use crate::lexer::Lexer;
use crate::mark::Mark;
use crate::parser;
use crate::text_stream::{is_id_start, TStream};
use crate::typecheck::const_eval;

use super::{CondState, Macro, MacroKind, PpFile, Preprocessor};

pub(super) fn run(pp: &mut Preprocessor, name: &str) {
    let diag = pp.diag.clone();
    let skip_rest = match name {
        "define" => {
            define(pp);
            true
        }
        "undef" => {
            undef(pp);
            true
        }
        "include" => include(pp),
        "ifdef" => {
            ifdef(pp, false);
            true
        }
        "ifndef" => {
            ifdef(pp, true);
            true
        }
        "if" => {
            let taken = eval_if_line(pp);
            pp.top_file_conds().push(CondState {
                taken,
                was_taken: taken,
                seen_else: false,
            });
            false
        }
        "elif" => {
            // Reached only from a live branch, so this conditional has
            // already been taken; the branch just closes.
            let mark = pp.top_file_stream().mark.clone();
            match pp.top_file_conds().last_mut() {
                None => diag.error(Some(&mark), "#elif without #if"),
                Some(cond) => {
                    if cond.seen_else {
                        diag.error(Some(&mark), "#elif after #else");
                    }
                    cond.taken = false;
                }
            }
            true
        }
        "else" => {
            let mark = pp.top_file_stream().mark.clone();
            match pp.top_file_conds().last_mut() {
                None => diag.error(Some(&mark), "#else without #if"),
                Some(cond) => {
                    if cond.seen_else {
                        diag.error(Some(&mark), "#else after #else");
                    }
                    cond.seen_else = true;
                    cond.taken = false;
                }
            }
            true
        }
        "endif" => {
            let mark = pp.top_file_stream().mark.clone();
            if pp.top_file_conds().pop().is_none() {
                diag.error(Some(&mark), "#endif without #if");
            }
            true
        }
        "error" => {
            let (mark, text) = rest_of_line(pp);
            diag.error(Some(&mark), format!("#error {}", text.trim()));
            false
        }
        "warning" => {
            let (mark, text) = rest_of_line(pp);
            diag.warn(Some(&mark), format!("#warning {}", text.trim()));
            false
        }
        "pragma" => {
            let (_, text) = rest_of_line(pp);
            log::debug!("ignoring #pragma {}", text.trim());
            false
        }
        "line" => {
            line(pp);
            false
        }
        _ => {
            let mark = pp.top_file_stream().mark.clone();
            diag.error(
                Some(&mark),
                format!("invalid preprocessing directive #{}", name),
            );
            true
        }
    };
    if skip_rest {
        skip_directive_line(pp);
    }
}

/// Directive dispatch inside a false conditional branch: only the
/// conditional family is live, and a nested conditional is pushed inert so
/// its branches can never activate.
pub(super) fn run_skipping(pp: &mut Preprocessor, name: &str) {
    let diag = pp.diag.clone();
    match name {
        "if" | "ifdef" | "ifndef" => {
            pp.top_file_conds().push(CondState {
                taken: false,
                was_taken: true,
                seen_else: false,
            });
            skip_directive_line(pp);
        }
        "elif" => {
            let mark = pp.top_file_stream().mark.clone();
            let conds = pp.top_file_conds();
            match conds.last() {
                None => {
                    diag.error(Some(&mark), "#elif without #if");
                    skip_directive_line(pp);
                }
                Some(top) => {
                    if top.seen_else {
                        diag.error(Some(&mark), "#elif after #else");
                    }
                    let n = conds.len();
                    let others_taken = conds[..n - 1].iter().all(|c| c.taken);
                    let eligible = others_taken && !conds[n - 1].was_taken;
                    if eligible {
                        let taken = eval_if_line(pp);
                        let cond = pp.top_file_conds().last_mut().expect("cond vanished");
                        cond.taken = taken;
                        cond.was_taken = taken;
                    } else {
                        skip_directive_line(pp);
                    }
                }
            }
        }
        "else" => {
            let mark = pp.top_file_stream().mark.clone();
            let conds = pp.top_file_conds();
            match conds.last() {
                None => diag.error(Some(&mark), "#else without #if"),
                Some(top) => {
                    if top.seen_else {
                        diag.error(Some(&mark), "#else after #else");
                    }
                    let n = conds.len();
                    let others_taken = conds[..n - 1].iter().all(|c| c.taken);
                    let take = others_taken && !top.was_taken;
                    let cond = conds.last_mut().expect("cond vanished");
                    cond.seen_else = true;
                    cond.taken = take;
                    cond.was_taken = cond.was_taken || take;
                }
            }
            skip_directive_line(pp);
        }
        "endif" => {
            let mark = pp.top_file_stream().mark.clone();
            if pp.top_file_conds().pop().is_none() {
                diag.error(Some(&mark), "#endif without #if");
            }
            skip_directive_line(pp);
        }
        _ => skip_directive_line(pp),
    }
}

fn skip_directive_line(pp: &mut Preprocessor) {
    let mut block_comment = pp.block_comment;
    pp.top_file_stream().skip_line(&mut block_comment);
    pp.block_comment = block_comment;
}

/// Collect the raw text of the rest of the logical line, consuming the
/// newline.
fn rest_of_line(pp: &mut Preprocessor) -> (Mark, String) {
    let stream = pp.top_file_stream();
    stream.skip_ws_and_comments(false);
    let mark = stream.mark.clone();
    let start = stream.location();
    while let Some(c) = stream.cur() {
        if c == b'\n' {
            break;
        }
        stream.advance();
    }
    let text = stream.slice_from(start).text().to_string();
    stream.advance();
    (mark, text)
}

// ----------------------------------------------------------------------
// #define / #undef
// ----------------------------------------------------------------------

fn define(pp: &mut Preprocessor) {
    let diag = pp.diag.clone();
    let mac = match parse_define(pp.top_file_stream(), &diag) {
        Some(mac) => mac,
        None => return,
    };
    let mut macros = pp.macros.borrow_mut();
    if macros.contains_key(&*mac.name) {
        diag.warn(
            Some(&mac.def_mark),
            format!("\"{}\" redefined", mac.name),
        );
    }
    macros.insert(Rc::clone(&mac.name), Rc::new(mac));
}

/// Parse `name[(params)] body` at the stream cursor. Shared with the
/// `-D name=value` command-line path.
pub(super) fn parse_define(stream: &mut TStream, diag: &DiagCtx) -> Option<Macro> {
    stream.skip_ws_and_comments(false);
    let mark = stream.mark.clone();
    if stream.at_end() || stream.cur() == Some(b'\n') {
        diag.error(Some(&mark), "no macro name given in #define directive");
        return None;
    }
    let name = stream.advance_identifier();
    if name.is_empty() {
        diag.error(Some(&mark), "macro names must be identifiers");
        return None;
    }

    // A parameter list only when `(` hugs the name.
    let mut params: Vec<Rc<str>> = Vec::new();
    let mut num_params = -1i32;
    if stream.cur() == Some(b'(') {
        stream.advance();
        num_params = 0;
        loop {
            stream.skip_ws_and_comments(false);
            if stream.cur() == Some(b')') {
                stream.advance();
                break;
            }
            let param = stream.advance_identifier();
            if param.is_empty() {
                diag.error(Some(&stream.mark), "macro parameter name expected");
                return None;
            }
            params.push(param.into());
            num_params += 1;
            stream.skip_ws_and_comments(false);
            match stream.cur() {
                Some(b',') => {
                    stream.advance();
                }
                Some(b')') => {
                    stream.advance();
                    break;
                }
                _ => {
                    diag.error(
                        Some(&stream.mark),
                        "expected ',' or ')' in macro parameter list",
                    );
                    return None;
                }
            }
        }
    }

    stream.skip_ws_and_comments(false);
    let body_mark = stream.mark.clone();
    let start = stream.location();
    while let Some(c) = stream.cur() {
        if c == b'\n' {
            break;
        }
        stream.advance();
    }
    let body = stream.slice_from(start);
    Some(Macro {
        name: name.into(),
        kind: MacroKind::Basic,
        params,
        num_params,
        body,
        def_mark: body_mark,
    })
}

fn undef(pp: &mut Preprocessor) {
    let diag = pp.diag.clone();
    let stream = pp.top_file_stream();
    stream.skip_ws_and_comments(false);
    let mark = stream.mark.clone();
    let name = stream.advance_identifier();
    if name.is_empty() {
        diag.error(Some(&mark), "no macro name given in #undef directive");
        return;
    }
    pp.macros.borrow_mut().remove(name.as_str());
}

// ----------------------------------------------------------------------
// #include
// ----------------------------------------------------------------------

/// Returns whether the rest of the line still needs discarding.
fn include(pp: &mut Preprocessor) -> bool {
    let diag = pp.diag.clone();
    let stream = pp.top_file_stream();
    stream.skip_ws_and_comments(false);
    let mark = stream.mark.clone();

    match stream.cur() {
        Some(q @ (b'"' | b'<')) => {
            let endsym = if q == b'"' { b'"' } else { b'>' };
            stream.advance();
            let start = stream.location();
            while let Some(c) = stream.cur() {
                if c == endsym || c == b'\n' {
                    break;
                }
                stream.advance();
            }
            if stream.cur() != Some(endsym) {
                diag.error(Some(&mark), "missing terminating character in #include");
                return true;
            }
            let name = stream.slice_from(start).text().to_string();
            stream.advance();
            if name.is_empty() {
                diag.error(Some(&mark), "empty file name in #include");
                return true;
            }
            // The rest of the line must go before the included file lands on
            // top of the stack.
            skip_directive_line(pp);
            resolve_include(pp, &name, q == b'"', &mark);
            false
        }
        Some(c) if is_id_start(c) => {
            // The operand starts with a macro; expand until a quote or
            // angle bracket appears, then read to its terminator.
            let endsym;
            loop {
                match pp.next_char() {
                    None | Some(b'\n') => {
                        diag.error(Some(&mark), "unexpected end of line in #include");
                        return false;
                    }
                    Some(b'"') => {
                        endsym = b'"';
                        break;
                    }
                    Some(b'<') => {
                        endsym = b'>';
                        break;
                    }
                    Some(b' ') | Some(b'\t') => continue,
                    Some(c) => {
                        diag.error(
                            Some(&mark),
                            format!("unexpected character {:?} in #include", c as char),
                        );
                        return false;
                    }
                }
            }
            let mut name = String::new();
            loop {
                match pp.next_char() {
                    None | Some(b'\n') => {
                        diag.error(Some(&mark), "unexpected end of line in #include");
                        return false;
                    }
                    Some(c) if c == endsym => break,
                    Some(c) => name.push(c as char),
                }
            }
            // Discard the remainder of the line before the new file goes on
            // top of the stack.
            loop {
                match pp.next_char() {
                    None | Some(b'\n') => break,
                    Some(_) => continue,
                }
            }
            resolve_include(pp, &name, endsym == b'"', &mark);
            false
        }
        _ => {
            diag.error(Some(&mark), "expected \"file\" or <file> in #include");
            true
        }
    }
}

fn resolve_include(pp: &mut Preprocessor, name: &str, quoted: bool, mark: &Mark) {
    // Already mapped (possibly as an in-memory buffer): reuse the entry.
    if let Some(entry) = pp.fdir.lookup(name) {
        let buf = Rc::clone(&entry.buf);
        let filename = Rc::clone(&entry.filename);
        pp.push_file_entry(&filename, &buf, name);
        return;
    }
    let mut candidates = Vec::new();
    // `"..."` searches the including file's directory first; `<...>` only
    // the include path.
    if quoted {
        candidates.push(pp.top_file_dir().join(name));
    }
    candidates.extend(pp.search_path.iter().map(|dir| dir.join(name)));

    for path in candidates {
        if !path.exists() {
            continue;
        }
        let path_str = path.to_string_lossy().into_owned();
        match pp.fdir.insert(&path_str) {
            Ok(entry) => {
                log::debug!("including {:?}", path);
                let buf = Rc::clone(&entry.buf);
                let filename = Rc::clone(&entry.filename);
                pp.push_file_entry(&filename, &buf, &path_str);
            }
            Err(err) => {
                pp.diag
                    .clone()
                    .error(Some(mark), format!("failed to include {}: {}", name, err));
            }
        }
        return;
    }
    pp.diag
        .clone()
        .error(Some(mark), format!("{}: no such file or directory", name));
}

// ----------------------------------------------------------------------
// Conditionals
// ----------------------------------------------------------------------

fn ifdef(pp: &mut Preprocessor, negate: bool) {
    let diag = pp.diag.clone();
    let stream = pp.top_file_stream();
    stream.skip_ws_and_comments(false);
    let mark = stream.mark.clone();
    let name = stream.advance_identifier();
    if name.is_empty() {
        diag.error(
            Some(&mark),
            if negate {
                "no macro name given in #ifndef directive"
            } else {
                "no macro name given in #ifdef directive"
            },
        );
        // An unconditionally false group is the least damaging recovery.
        pp.top_file_conds().push(CondState {
            taken: false,
            was_taken: true,
            seen_else: false,
        });
        return;
    }
    let defined = pp.macros.borrow().contains_key(name.as_str());
    let taken = defined != negate;
    pp.top_file_conds().push(CondState {
        taken,
        was_taken: taken,
        seen_else: false,
    });
}

/// Evaluate the controlling expression of `#if`/`#elif`.
///
/// The raw line text is run through a second preprocessor in if-expression
/// mode (shared macro table, unknown identifiers become `0`, `defined` is
/// live), then lexed and parsed with the ordinary expression grammar and
/// folded by the constant evaluator.
pub(super) fn eval_if_line(pp: &mut Preprocessor) -> bool {
    let diag = pp.diag.clone();
    let stream = pp.top_file_stream();
    stream.skip_ws_and_comments(false);
    let mark = stream.mark.clone();
    let start = stream.location();
    while let Some(c) = stream.cur() {
        if c == b'\n' {
            break;
        }
        stream.advance();
    }
    let slice = stream.slice_from(start);
    stream.advance(); // the newline

    if slice.is_empty() {
        diag.error(Some(&mark), "#if with no expression");
        return false;
    }

    let mut sub = pp.for_if_expr();
    sub.files.push(PpFile {
        stream: slice.stream(mark.clone()),
        conds: Vec::new(),
        dir: ".".into(),
    });
    let mut lexer = Lexer::new(sub, diag.clone());
    let tokens = lexer.tokenize();

    let mut tu = TransUnit::new();
    match parser::parse_constant_expr(&mut tu, &tokens, &diag) {
        Some(expr) => const_eval::eval_pp(&tu, expr) != 0,
        None => false,
    }
}

// ----------------------------------------------------------------------
// #line
// ----------------------------------------------------------------------

fn line(pp: &mut Preprocessor) {
    let diag = pp.diag.clone();
    let stream = pp.top_file_stream();
    stream.skip_ws_and_comments(false);
    let mark = stream.mark.clone();
    let mut digits = String::new();
    while let Some(c) = stream.cur() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c as char);
        stream.advance();
    }
    let lineno: u32 = match digits.parse() {
        Ok(n) => n,
        Err(_) => {
            diag.error(Some(&mark), "#line requires a line number");
            let mut bc = false;
            stream.skip_line(&mut bc);
            return;
        }
    };
    stream.skip_ws_and_comments(false);
    let mut filename = None;
    if stream.cur() == Some(b'"') {
        stream.advance();
        let start = stream.location();
        while let Some(c) = stream.cur() {
            if c == b'"' || c == b'\n' {
                break;
            }
            stream.advance();
        }
        filename = Some(stream.slice_from(start).text().to_string());
        if stream.cur() == Some(b'"') {
            stream.advance();
        }
    }
    let mut bc = false;
    stream.skip_line(&mut bc);
    stream.mark.line = lineno;
    if let Some(name) = filename {
        stream.mark.file = name.into();
    }
}
