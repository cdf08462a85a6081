//! Front-end driver: wires preprocessor, lexer, parser and analyzer into
//! one pipeline over a single translation unit. The compiler binary and the
//! test suite both go through here.

use std::path::PathBuf;
use std::rc::Rc;

use crate::ast::TransUnit;
use crate::diag::{DiagCtx, WarnOpts};
use crate::file_dir::FileDir;
use crate::lexer::{Lexeme, Lexer};
use crate::parser;
use crate::pp::Preprocessor;
use crate::typecheck;
use crate::Error;

#[derive(Default, Clone)]
pub struct Config {
    /// `-I` directories, searched after the default path.
    pub include_dirs: Vec<PathBuf>,
    /// `-D name[=value]` macros.
    pub defines: Vec<String>,
    /// `-U name` removals, applied after the defines.
    pub undefs: Vec<String>,
    pub warn_opts: WarnOpts,
    /// Materialize parenthesis nodes; only the AST dump wants them.
    pub keep_parens: bool,
}

/// The outcome of parsing one translation unit. `ok` is false when any
/// diagnostic of error severity was reported along the way.
pub struct Parse {
    pub tu: TransUnit,
    pub ok: bool,
}

fn build_pp(fdir: &Rc<FileDir>, diag: &DiagCtx, config: &Config) -> Preprocessor {
    let mut pp = Preprocessor::new(Rc::clone(fdir), diag.clone(), &config.include_dirs);
    for define in &config.defines {
        pp.define_cli(define);
    }
    for undef in &config.undefs {
        pp.undefine(undef);
    }
    pp
}

/// Lex a file to the token vector, end-of-file token included.
pub fn tokenize(
    fdir: &Rc<FileDir>,
    diag: &DiagCtx,
    config: &Config,
    path: &str,
) -> Result<Vec<Lexeme>, Error> {
    let mut pp = build_pp(fdir, diag, config);
    pp.open(path)?;
    let mut lexer = Lexer::new(pp, diag.clone());
    Ok(lexer.tokenize())
}

/// Lex an in-memory buffer registered under `name`.
pub fn tokenize_source(
    fdir: &Rc<FileDir>,
    diag: &DiagCtx,
    config: &Config,
    name: &str,
    text: &str,
) -> Vec<Lexeme> {
    let mut pp = build_pp(fdir, diag, config);
    pp.open_virtual(name, text);
    let mut lexer = Lexer::new(pp, diag.clone());
    lexer.tokenize()
}

/// Preprocess + lex + parse a file.
pub fn parse(
    fdir: &Rc<FileDir>,
    diag: &DiagCtx,
    config: &Config,
    path: &str,
) -> Result<Parse, Error> {
    let tokens = tokenize(fdir, diag, config, path)?;
    Ok(parse_tokens(&tokens, diag, config))
}

pub fn parse_source(
    fdir: &Rc<FileDir>,
    diag: &DiagCtx,
    config: &Config,
    name: &str,
    text: &str,
) -> Parse {
    let tokens = tokenize_source(fdir, diag, config, name, text);
    parse_tokens(&tokens, diag, config)
}

fn parse_tokens(tokens: &[Lexeme], diag: &DiagCtx, config: &Config) -> Parse {
    let mut tu = TransUnit::new();
    let mut ok = parser::parse(&mut tu, tokens, diag, config.keep_parens);
    ok &= diag.error_count() == 0;
    Parse { tu, ok }
}

/// The whole front end: parse, then type-check. `Err(Error::Failed)` when
/// the unit must not reach later stages.
pub fn check(
    fdir: &Rc<FileDir>,
    diag: &DiagCtx,
    config: &Config,
    path: &str,
) -> Result<TransUnit, Error> {
    let mut parse = parse(fdir, diag, config, path)?;
    let ok = typecheck::check(&mut parse.tu, diag) && parse.ok && diag.error_count() == 0;
    if ok {
        Ok(parse.tu)
    } else {
        Err(Error::Failed)
    }
}

pub fn check_source(
    fdir: &Rc<FileDir>,
    diag: &DiagCtx,
    config: &Config,
    name: &str,
    text: &str,
) -> Result<TransUnit, Error> {
    let mut parse = parse_source(fdir, diag, config, name, text);
    let ok = typecheck::check(&mut parse.tu, diag) && parse.ok && diag.error_count() == 0;
    if ok {
        Ok(parse.tu)
    } else {
        Err(Error::Failed)
    }
}
