//! C front end: preprocessor, lexer, parser and semantic analyzer.
//!
//! The pipeline turns one C source file into a typed, canonicalized AST:
//!
//! * [`pp`] expands macros, runs directives and conditional compilation,
//!   and hands out preprocessed characters;
//! * [`lexer`] turns those characters into tokens, interning identifiers
//!   and string literals through [`symtab`];
//! * [`parser`] builds the AST in the translation unit's arenas, consulting
//!   the scoped [`type_table`] to tell typedef names from identifiers;
//! * [`typecheck`] computes layout, canonicalizes initializer lists, folds
//!   constant expressions and type-checks the whole unit.
//!
//! [`driver`] wires the stages together for one translation unit at a time.
//! Diagnostics flow through an injectable reporter in [`diag`]; any reported
//! error marks the unit as failed without stopping the walk.

pub mod ast;
pub mod diag;
pub mod driver;
pub mod file_dir;
pub mod lexer;
pub mod mark;
pub mod parser;
pub mod pp;
pub mod symtab;
pub mod text_stream;
pub mod type_table;
pub mod typecheck;

use thiserror::Error;

/// Hard failures; everything recoverable goes through [`diag`] instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("translation unit contains errors")]
    Failed,
}
