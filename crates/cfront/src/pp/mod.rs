//! Preprocessor.
//!
//! A character-level macro engine: it consumes a stack of text streams
//! (open files, macro bodies, parameter expansions) and delivers one
//! preprocessed character at a time. Directives execute as a side effect of
//! pulling characters; the internal step function answers `Retry` after one,
//! meaning "I consumed a directive, call again".
//!
//! Macro bodies are stored as raw text slices and re-scanned on every
//! expansion. A macro invocation pushes a frame carrying the body stream and
//! the parameter map; parameter references push sub-frames. Recursion is
//! cut off by scanning the frame stack for the macro's own name, so
//! `#define A A` expands to `A`.

mod directives;

#[cfg(test)]
mod tests;

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use custom_debug_derive::Debug as CustomDebug;

use crate::diag::DiagCtx;
use crate::file_dir::FileDir;
use crate::mark::{Mark, MarkLink, COMMAND_LINE_FILENAME};
use crate::text_stream::{is_id_char, is_id_start, TStream, TextSlice};
use crate::Error;

/// What one internal step of the preprocessor produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpChar {
    Byte(u8),
    Eof,
    /// A directive ran or a frame changed; pull again.
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroKind {
    /// Ordinary `#define`, object-like or function-like.
    Basic,
    /// Defined on the command line with `-D`.
    Cli,
    File,
    Line,
    Date,
    Time,
    Defined,
    Pragma,
}

#[derive(CustomDebug)]
pub struct Macro {
    pub name: Rc<str>,
    pub kind: MacroKind,
    /// Ordered parameter names; empty for object-like macros.
    pub params: Vec<Rc<str>>,
    /// -1 means object-like.
    pub num_params: i32,
    #[debug(skip)]
    pub body: TextSlice,
    #[debug(skip)]
    pub def_mark: Mark,
}

pub type MacroTable = Rc<RefCell<HashMap<Rc<str>, Rc<Macro>>>>;

/// A collected macro argument: the raw (pre-expansion) text used by `#` and
/// `##`, and the expanded text used everywhere else.
struct ParamValue {
    raw: Rc<str>,
    expand: Rc<str>,
}

struct ParamInst {
    stream: TStream,
    stringify: bool,
}

struct MacroInst {
    /// `None` marks a mapped stream: a plain buffer pushed for nested
    /// expansion, whose exhaustion reads as end-of-input to the puller.
    macro_: Option<Rc<Macro>>,
    stream: TStream,
    params: HashMap<Rc<str>, ParamValue>,
    param_insts: Vec<ParamInst>,
}

/// One `#if`/`#ifdef`/`#ifndef` level in a file.
struct CondState {
    /// The branch we are currently inside is live.
    taken: bool,
    /// Some branch of this conditional has already been taken.
    was_taken: bool,
    seen_else: bool,
}

struct PpFile {
    stream: TStream,
    conds: Vec<CondState>,
    /// Directory of the file, searched first for `"..."` includes.
    dir: PathBuf,
}

enum Active {
    Eof,
    /// A mapped stream ran dry; ends a nested expansion pull.
    MappedEof,
    /// A stringification frame ran dry; emit the closing quote.
    StringifyClose,
    Param { stringify: bool },
    Main,
}

pub struct Preprocessor {
    files: Vec<PpFile>,
    macro_insts: Vec<MacroInst>,
    macros: MacroTable,
    search_path: Vec<PathBuf>,
    fdir: Rc<FileDir>,
    diag: DiagCtx,
    last_mark: Mark,
    /// `#if`-expression mode: undefined identifiers become `0` and the
    /// `defined` operator is live.
    pp_if: bool,

    // Character-level state machine.
    line_comment: bool,
    block_comment: bool,
    in_string: bool,
    in_char: bool,
    ignore_escape: bool,
    stringify_esc: bool,
    char_line: bool,
    in_directive: bool,
}

/// Default `#include` search path; `-I` directories are appended after it.
pub const DEFAULT_SEARCH_PATH: &[&str] = &[".", "/usr/local/include", "/usr/include"];

const PREDEF_MACROS: &[(&str, &str)] = &[
    ("__STDC__", "1"),
    ("__STDC_VERSION__", "201112L"),
    ("__STDC_HOSTED__", "1"),
    ("__x86_64__", "1"),
    // Compatibility shims.
    ("__alignof__", "_Alignof"),
    ("__FUNCTION__", "__func__"),
    ("char16_t", "short"),
    ("char32_t", "int"),
];

const PREDEF_BUILTINS: &[(&str, MacroKind)] = &[
    ("__FILE__", MacroKind::File),
    ("__LINE__", MacroKind::Line),
    ("__DATE__", MacroKind::Date),
    ("__TIME__", MacroKind::Time),
    ("defined", MacroKind::Defined),
    ("_Pragma", MacroKind::Pragma),
];

impl Preprocessor {
    pub fn new(fdir: Rc<FileDir>, diag: DiagCtx, include_dirs: &[PathBuf]) -> Preprocessor {
        let mut search_path: Vec<PathBuf> =
            DEFAULT_SEARCH_PATH.iter().map(PathBuf::from).collect();
        search_path.extend(include_dirs.iter().cloned());

        let mut pp = Preprocessor {
            files: Vec::new(),
            macro_insts: Vec::new(),
            macros: Rc::new(RefCell::new(HashMap::new())),
            search_path,
            fdir,
            diag,
            last_mark: Mark::built_in(),
            pp_if: false,
            line_comment: false,
            block_comment: false,
            in_string: false,
            in_char: false,
            ignore_escape: false,
            stringify_esc: false,
            char_line: false,
            in_directive: false,
        };
        pp.load_predefined();
        pp
    }

    /// A preprocessor over the same macro table, used to evaluate `#if`
    /// expressions: the macro table is shared (and assumed not to change for
    /// the duration), and lookup misses substitute `0`.
    fn for_if_expr(&self) -> Preprocessor {
        Preprocessor {
            files: Vec::new(),
            macro_insts: Vec::new(),
            macros: Rc::clone(&self.macros),
            search_path: Vec::new(),
            fdir: Rc::clone(&self.fdir),
            diag: self.diag.clone(),
            last_mark: self.last_mark.clone(),
            pp_if: true,
            line_comment: false,
            block_comment: false,
            in_string: false,
            in_char: false,
            ignore_escape: false,
            stringify_esc: false,
            char_line: false,
            in_directive: false,
        }
    }

    fn load_predefined(&mut self) {
        let mut macros = self.macros.borrow_mut();
        for &(name, kind) in PREDEF_BUILTINS {
            let name: Rc<str> = name.into();
            macros.insert(
                Rc::clone(&name),
                Rc::new(Macro {
                    name,
                    kind,
                    params: Vec::new(),
                    num_params: -1,
                    body: "".into(),
                    def_mark: Mark::built_in(),
                }),
            );
        }
        for &(name, body) in PREDEF_MACROS {
            let name: Rc<str> = name.into();
            macros.insert(
                Rc::clone(&name),
                Rc::new(Macro {
                    name,
                    kind: MacroKind::Basic,
                    params: Vec::new(),
                    num_params: -1,
                    body: body.into(),
                    def_mark: Mark::built_in(),
                }),
            );
        }
        // `__attribute__(x)` expands to nothing.
        let name: Rc<str> = "__attribute__".into();
        macros.insert(
            Rc::clone(&name),
            Rc::new(Macro {
                name,
                kind: MacroKind::Basic,
                params: vec!["xyz".into()],
                num_params: 1,
                body: "".into(),
                def_mark: Mark::built_in(),
            }),
        );
        drop(macros);
    }

    /// Install a `-D name[=value]` macro; a missing value means `1`.
    pub fn define_cli(&mut self, spec: &str) {
        let (name, value) = match spec.split_once('=') {
            Some((n, v)) => (n, v),
            None => (spec, "1"),
        };
        let text = format!("{} {}", name, value);
        let entry = self
            .fdir
            .insert_virtual(COMMAND_LINE_FILENAME, &text);
        let mut stream = TStream::new(Rc::clone(&entry.buf), Mark::new(Rc::clone(&entry.filename)));
        if let Some(mut mac) = directives::parse_define(&mut stream, &self.diag) {
            mac.kind = MacroKind::Cli;
            self.macros
                .borrow_mut()
                .insert(Rc::clone(&mac.name), Rc::new(mac));
        }
    }

    /// Remove a macro, for `-U name`.
    pub fn undefine(&mut self, name: &str) {
        self.macros.borrow_mut().remove(name);
    }

    /// Open a source file and push it onto the file stack.
    pub fn open(&mut self, path: &str) -> Result<(), Error> {
        let entry = self.fdir.insert(path)?;
        self.push_file_entry(&entry.filename, &entry.buf, path);
        Ok(())
    }

    /// Push an in-memory buffer as if it were a file; used by tests and by
    /// the `#if` evaluator.
    pub fn open_virtual(&mut self, name: &str, text: &str) {
        let entry = self.fdir.insert_virtual(name, text);
        self.push_file_entry(&entry.filename, &entry.buf, name);
    }

    fn push_file_entry(&mut self, filename: &Rc<str>, buf: &Rc<str>, path: &str) {
        let dir = Path::new(path)
            .parent()
            .map(|p| p.to_path_buf())
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("."));
        self.files.push(PpFile {
            stream: TStream::new(Rc::clone(buf), Mark::new(Rc::clone(filename))),
            conds: Vec::new(),
            dir,
        });
    }

    /// Mark of the last character handed out.
    pub fn last_mark(&self) -> Mark {
        self.last_mark.clone()
    }

    pub fn macros(&self) -> MacroTable {
        Rc::clone(&self.macros)
    }

    pub fn diag(&self) -> &DiagCtx {
        &self.diag
    }

    /// Fetch the next preprocessed character; `None` is end of input.
    pub fn next_char(&mut self) -> Option<u8> {
        loop {
            match self.step() {
                PpChar::Byte(c) => return Some(c),
                PpChar::Eof => return None,
                PpChar::Retry => continue,
            }
        }
    }

    // ------------------------------------------------------------------
    // Stream stack management
    // ------------------------------------------------------------------

    fn skipping(&self) -> bool {
        self.files
            .last()
            .map(|f| f.conds.iter().any(|c| !c.taken))
            .unwrap_or(false)
    }

    /// Pop exhausted frames until an unfinished stream is on top, and say
    /// which kind it is.
    fn settle(&mut self) -> Active {
        while let Some(inst) = self.macro_insts.last_mut() {
            while let Some(param) = inst.param_insts.last_mut() {
                if !param.stream.at_end() {
                    return Active::Param {
                        stringify: param.stringify,
                    };
                }
                // Report the end of a stringification once, so the closing
                // quote lands before anything else.
                if param.stringify {
                    param.stringify = false;
                    return Active::StringifyClose;
                }
                inst.param_insts.pop();
            }
            if !inst.stream.at_end() {
                return Active::Main;
            }
            let mapped = inst.macro_.is_none();
            self.macro_insts.pop();
            if mapped {
                return Active::MappedEof;
            }
        }
        while let Some(file) = self.files.last() {
            if !file.stream.at_end() {
                return Active::Main;
            }
            if !file.conds.is_empty() {
                self.diag.error(
                    Some(&file.stream.mark),
                    "unterminated conditional directive",
                );
            }
            self.files.pop();
        }
        Active::Eof
    }

    fn main_stream(&self) -> &TStream {
        match self.macro_insts.last() {
            Some(inst) => &inst.stream,
            None => &self.files.last().expect("settle left a stream").stream,
        }
    }

    fn store_main_stream(&mut self, stream: TStream) {
        match self.macro_insts.last_mut() {
            Some(inst) => inst.stream = stream,
            None => self.files.last_mut().expect("settle left a stream").stream = stream,
        }
    }

    /// The parameter map of the innermost real (non-mapped) macro frame.
    fn lookup_macro_param(&self, name: &str) -> Option<&ParamValue> {
        for inst in self.macro_insts.iter().rev() {
            if inst.macro_.is_none() {
                continue;
            }
            return inst.params.get(name);
        }
        None
    }

    fn lookup_macro(&self, name: &str) -> Option<Rc<Macro>> {
        self.macros.borrow().get(name).cloned()
    }

    // ------------------------------------------------------------------
    // The state machine
    // ------------------------------------------------------------------

    fn step(&mut self) -> PpChar {
        if self.skipping() {
            return self.step_skipping();
        }

        let diag = self.diag.clone();
        match self.settle() {
            Active::Eof => {
                if self.block_comment {
                    diag.error(Some(&self.last_mark), "unterminated comment");
                    self.block_comment = false;
                }
                return PpChar::Eof;
            }
            Active::MappedEof => return PpChar::Eof,
            Active::StringifyClose => return PpChar::Byte(b'"'),
            Active::Param { stringify } => return self.step_param(stringify),
            Active::Main => {}
        }

        let in_macro = !self.macro_insts.is_empty();
        let mut stream = self.main_stream().clone();
        self.last_mark = stream.mark.clone();

        let mut cur = match stream.cur() {
            Some(c) => c,
            None => return PpChar::Retry,
        };
        let next = stream.next_ch();
        let mut last = stream.last();

        // Comments collapse to a single space so adjacent tokens do not
        // fuse; newlines keep their identity so line-oriented logic survives.
        if cur == b'/'
            && !self.line_comment
            && !self.block_comment
            && !self.in_string
            && !self.in_char
        {
            if next == Some(b'/') {
                self.line_comment = true;
            } else if next == Some(b'*') {
                self.block_comment = true;
                stream.advance();
                stream.advance();
                self.store_main_stream(stream);
                return PpChar::Byte(b' ');
            }
        }
        if self.line_comment {
            let c = stream.advance();
            self.store_main_stream(stream);
            if c == Some(b'\n') {
                self.line_comment = false;
                self.char_line = false;
                return PpChar::Byte(b'\n');
            }
            return PpChar::Byte(b' ');
        }
        if self.block_comment {
            let c = stream.advance();
            if last == Some(b'*') && cur == b'/' {
                self.block_comment = false;
            }
            self.store_main_stream(stream);
            if c == Some(b'\n') {
                self.char_line = false;
                return PpChar::Byte(b'\n');
            }
            return PpChar::Byte(b' ');
        }

        // A non-whitespace character before `#` disqualifies the line from
        // holding a directive.
        if !self.char_line && cur != b'#' && !cur.is_ascii_whitespace() {
            self.char_line = true;
        }

        // Character constants and strings pass through with expansion off.
        if !self.in_string && !self.in_char && cur == b'\'' {
            self.in_char = true;
            let c = stream.advance();
            self.store_main_stream(stream);
            return byte_or_retry(c);
        }
        if self.in_char && cur == b'\'' && (last != Some(b'\\') || self.ignore_escape) {
            self.in_char = false;
        }
        if !self.in_string && !self.in_char && cur == b'"' {
            self.in_string = true;
            let c = stream.advance();
            self.store_main_stream(stream);
            return byte_or_retry(c);
        }
        if self.in_string && cur == b'"' && (last != Some(b'\\') || self.ignore_escape) {
            self.in_string = false;
        }
        if cur == b'\n' {
            self.char_line = false;
        }
        if self.in_string || self.in_char {
            self.ignore_escape = cur == b'\\' && last == Some(b'\\');
            let c = stream.advance();
            self.store_main_stream(stream);
            return byte_or_retry(c);
        }

        // `##` concatenation: when the last emitted character was solid and
        // whitespace or `#` follows, look across it for paste operators.
        let mut lookahead = stream.clone();
        let mut concat = false;
        if in_macro
            && !last.map(|c| c.is_ascii_whitespace()).unwrap_or(true)
            && (cur == b' ' || cur == b'\t' || cur == b'#')
        {
            lookahead.skip_ws_and_comments(false);
            while !lookahead.at_end() {
                if lookahead.cur() == Some(b'#') && lookahead.next_ch() == Some(b'#') {
                    concat = true;
                    lookahead.advance();
                    lookahead.advance();
                } else {
                    break;
                }
                lookahead.skip_ws_and_comments(false);
            }
            if concat {
                stream = lookahead.clone();
                cur = match stream.cur() {
                    Some(c) => c,
                    None => {
                        self.store_main_stream(stream);
                        return PpChar::Retry;
                    }
                };
                last = stream.last();
            } else {
                lookahead = stream.clone();
            }
        }

        if cur == b'#' {
            if !in_macro {
                // Directive position.
                if self.char_line {
                    diag.error(Some(&stream.mark), "stray '#' in program");
                    stream.advance();
                    self.store_main_stream(stream);
                    return PpChar::Retry;
                }
                if self.in_directive {
                    diag.error(Some(&stream.mark), "unexpected '#' in directive");
                }
                stream.advance();
                stream.skip_ws_and_comments(false);
                let name = stream.advance_identifier();
                self.store_main_stream(stream);
                if name.is_empty() {
                    // A lone `#` is a null directive.
                    return PpChar::Retry;
                }
                self.in_directive = true;
                directives::run(self, &name);
                self.in_directive = false;
                self.char_line = false;
                return PpChar::Retry;
            }
            // Inside a macro: `#` stringifies a parameter (`##` was already
            // consumed by the paste scan above).
            let site = stream.mark.clone();
            stream.advance();
            let name = stream.advance_identifier();
            match self.lookup_macro_param(&name) {
                None => {
                    diag.error(
                        Some(&site),
                        "'#' is not followed by a macro parameter",
                    );
                    self.store_main_stream(stream);
                    return PpChar::Retry;
                }
                Some(param) => {
                    let slice: TextSlice = param.raw.as_ref().into();
                    // The frame's marks name the parameter's use site, whose
                    // chain leads to the invocation.
                    let inst = ParamInst {
                        stream: slice.stream(site),
                        stringify: true,
                    };
                    self.store_main_stream(stream);
                    self.macro_insts
                        .last_mut()
                        .expect("stringify outside macro")
                        .param_insts
                        .push(inst);
                    // The opening quote; the value follows escaped.
                    return PpChar::Byte(b'"');
                }
            }
        }

        // If we are already inside an identifier, the current position
        // cannot start a macro name.
        if last.map(is_id_char).unwrap_or(false) {
            let c = stream.advance();
            self.store_main_stream(stream);
            return byte_or_retry(c);
        }
        if !is_id_start(cur) {
            let c = stream.advance();
            self.store_main_stream(stream);
            return byte_or_retry(c);
        }

        let name = lookahead.advance_identifier();

        // Macro parameters shadow macros.
        if in_macro {
            if let Some(param) = self.lookup_macro_param(&name) {
                let mut concat_param = concat;
                if !concat_param {
                    let mut la = lookahead.clone();
                    la.skip_ws_and_comments(false);
                    if la.cur() == Some(b'#') && la.next_ch() == Some(b'#') {
                        concat_param = true;
                    }
                }
                // Raw text next to `#`/`##`, expanded text elsewhere.
                let text = if concat_param {
                    Rc::clone(&param.raw)
                } else {
                    Rc::clone(&param.expand)
                };
                // Substituted tokens carry the parameter-site mark, whose
                // parent is the invocation site.
                let site = stream.mark.clone();
                let slice: TextSlice = text.as_ref().into();
                let inst = ParamInst {
                    stream: slice.stream(site),
                    stringify: false,
                };
                self.store_main_stream(lookahead);
                self.macro_insts
                    .last_mut()
                    .expect("param use outside macro")
                    .param_insts
                    .push(inst);
                return PpChar::Retry;
            }
        }

        // Token pasting suppresses expansion of the operands.
        if concat {
            let c = stream.advance();
            self.store_main_stream(stream);
            return byte_or_retry(c);
        }

        let macro_ = match self.lookup_macro(&name) {
            Some(m) => m,
            None => {
                if self.pp_if {
                    // In `#if` arithmetic an unknown identifier is `0`.
                    self.store_main_stream(lookahead);
                    return PpChar::Byte(b'0');
                }
                let c = stream.advance();
                self.store_main_stream(stream);
                return byte_or_retry(c);
            }
        };

        // A macro never expands inside its own expansion.
        let recursive = self
            .macro_insts
            .iter()
            .any(|mi| mi.macro_.as_ref().map(|m| &*m.name) == Some(&*name));
        if recursive {
            let c = stream.advance();
            self.store_main_stream(stream);
            return byte_or_retry(c);
        }

        match macro_.kind {
            MacroKind::Basic | MacroKind::Cli => {}
            MacroKind::File | MacroKind::Line | MacroKind::Date | MacroKind::Time => {
                self.store_main_stream(lookahead);
                return self.expand_special(&macro_);
            }
            MacroKind::Defined => {
                if self.pp_if {
                    return self.expand_defined(stream, lookahead);
                }
                let c = stream.advance();
                self.store_main_stream(stream);
                return byte_or_retry(c);
            }
            MacroKind::Pragma => {
                return self.expand_pragma_operator(stream, lookahead);
            }
        }

        self.expand_macro(macro_, stream, lookahead)
    }

    /// Deliver characters of a parameter expansion, escaping for `#`.
    fn step_param(&mut self, stringify: bool) -> PpChar {
        let inst = self
            .macro_insts
            .last_mut()
            .expect("param step without macro");
        let param = inst
            .param_insts
            .last_mut()
            .expect("param step without param");
        let stream = &mut param.stream;
        if stringify {
            match stream.cur() {
                Some(c @ (b'"' | b'\\' | b'\n')) => {
                    if !self.stringify_esc {
                        self.stringify_esc = true;
                        return PpChar::Byte(b'\\');
                    }
                    self.stringify_esc = false;
                    if c == b'\n' {
                        stream.advance();
                        return PpChar::Byte(b'n');
                    }
                }
                Some(c) if c.is_ascii_whitespace() => {
                    stream.skip_ws_and_comments(true);
                    return PpChar::Byte(b' ');
                }
                _ => {}
            }
        }
        match stream.advance() {
            Some(c) => PpChar::Byte(c),
            None => PpChar::Retry,
        }
    }

    /// `__FILE__`, `__LINE__`, `__DATE__`, `__TIME__`.
    fn expand_special(&mut self, macro_: &Rc<Macro>) -> PpChar {
        let text = match macro_.kind {
            MacroKind::File => format!("\"{}\"", self.last_mark.file),
            MacroKind::Line => format!("{}", self.last_mark.line),
            MacroKind::Date => chrono::Local::now().format("\"%b %d %Y\"").to_string(),
            MacroKind::Time => chrono::Local::now().format("\"%T\"").to_string(),
            _ => unreachable!("not a special macro"),
        };
        let slice: TextSlice = text.as_str().into();
        let stream = slice.stream(self.last_mark.clone());
        self.macro_insts.push(MacroInst {
            macro_: Some(Rc::clone(macro_)),
            stream,
            params: HashMap::new(),
            param_insts: Vec::new(),
        });
        PpChar::Retry
    }

    /// `defined X` / `defined(X)` in `#if` arithmetic.
    fn expand_defined(&mut self, stream: TStream, mut lookahead: TStream) -> PpChar {
        let diag = self.diag.clone();
        lookahead.skip_ws_and_comments(false);
        let mut paren = false;
        if lookahead.cur() == Some(b'(') {
            lookahead.advance();
            paren = true;
            lookahead.skip_ws_and_comments(false);
        }
        let name = lookahead.advance_identifier();
        if name.is_empty() {
            diag.error(
                Some(&stream.mark),
                "operator \"defined\" requires an identifier",
            );
            self.store_main_stream(lookahead);
            return PpChar::Retry;
        }
        if paren {
            lookahead.skip_ws_and_comments(false);
            if lookahead.cur() != Some(b')') {
                diag.error(Some(&stream.mark), "missing ')' after \"defined\"");
                self.store_main_stream(lookahead);
                return PpChar::Retry;
            }
            lookahead.advance();
        }
        let defined = self.macros.borrow().contains_key(name.as_str());
        self.store_main_stream(lookahead);
        PpChar::Byte(if defined { b'1' } else { b'0' })
    }

    /// The `_Pragma("...")` operator; the operand is discarded.
    fn expand_pragma_operator(&mut self, stream: TStream, mut lookahead: TStream) -> PpChar {
        lookahead.skip_ws_and_comments(true);
        if lookahead.cur() != Some(b'(') {
            self.diag
                .error(Some(&stream.mark), "expected '(' after _Pragma");
            self.store_main_stream(lookahead);
            return PpChar::Retry;
        }
        lookahead.advance();
        lookahead.skip_ws_and_comments(true);
        let start = lookahead.location();
        if matches!(lookahead.cur(), Some(b'"')) {
            lookahead.skip_string();
        }
        let operand = lookahead.slice_from(start);
        log::debug!("_Pragma operand ignored: {}", operand.text());
        lookahead.skip_ws_and_comments(true);
        if lookahead.cur() == Some(b')') {
            lookahead.advance();
        } else {
            self.diag
                .error(Some(&stream.mark), "missing ')' after _Pragma operand");
        }
        self.store_main_stream(lookahead);
        PpChar::Retry
    }

    /// Expand an ordinary macro. `stream` sits on the macro name,
    /// `lookahead` just past it.
    fn expand_macro(
        &mut self,
        macro_: Rc<Macro>,
        mut stream: TStream,
        mut lookahead: TStream,
    ) -> PpChar {
        let diag = self.diag.clone();
        let invocation_mark = stream.mark.clone();
        let mut params = HashMap::new();

        if macro_.num_params >= 0 {
            lookahead.skip_ws_and_comments(true);
            if lookahead.cur() != Some(b'(') {
                // Function-like macro without arguments is a plain
                // identifier.
                let c = stream.advance();
                self.store_main_stream(stream);
                return byte_or_retry(c);
            }
            lookahead.advance();

            if macro_.num_params == 0 {
                lookahead.skip_ws_and_comments(true);
                if lookahead.cur() != Some(b')') {
                    diag.error(
                        Some(&stream.mark),
                        format!(
                            "unterminated argument list invoking macro \"{}\"",
                            macro_.name
                        ),
                    );
                    stream.advance();
                    self.store_main_stream(stream);
                    return PpChar::Retry;
                }
                lookahead.advance();
            } else {
                let in_macro = !self.macro_insts.is_empty();
                let mut num_args = 0;
                let mut done = false;
                for param_name in &macro_.params {
                    lookahead.skip_ws_and_comments(true);
                    num_args += 1;
                    let arg_mark = lookahead.mark.clone();
                    let arg_start = lookahead.location();
                    let mut space_start: Option<usize> = None;
                    let mut depth = 0;
                    while !lookahead.at_end() {
                        let c = lookahead.cur().expect("checked not at end");
                        if c == b'"' || c == b'\'' {
                            lookahead.skip_string();
                            space_start = None;
                            continue;
                        }
                        if c == b'/' && lookahead.next_ch() == Some(b'*') {
                            lookahead.skip_ws_and_comments(true);
                            continue;
                        }
                        if c == b'(' {
                            depth += 1;
                        } else if depth > 0 && c == b')' {
                            depth -= 1;
                        } else if depth == 0 {
                            if c == b',' {
                                break;
                            }
                            if c == b')' {
                                done = true;
                                break;
                            }
                        }
                        if !c.is_ascii_whitespace() {
                            space_start = None;
                        } else if space_start.is_none() {
                            space_start = Some(lookahead.location());
                        }
                        lookahead.advance();
                    }

                    if lookahead.at_end() && (num_args != macro_.num_params || !done) {
                        diag.error(
                            Some(&stream.mark),
                            "unexpected end of file while scanning macro arguments",
                        );
                        stream.advance();
                        self.store_main_stream(stream);
                        return PpChar::Retry;
                    }

                    let arg_end = space_start.unwrap_or_else(|| lookahead.location());
                    let mut raw_slice = lookahead.slice_from(arg_start);
                    raw_slice.end = arg_end;
                    let raw_text: Rc<str> = raw_slice.text().into();

                    let expand: Rc<str> = if raw_slice.is_empty() {
                        "".into()
                    } else {
                        self.expand_fragment(&raw_slice, &arg_mark).into()
                    };

                    // Inside another expansion the raw text references that
                    // expansion's parameters, which will not be in scope
                    // later; keep the expanded form for both.
                    let raw = if in_macro {
                        Rc::clone(&expand)
                    } else {
                        raw_text
                    };
                    params.insert(Rc::clone(param_name), ParamValue { raw, expand });

                    lookahead.advance(); // the `,` or `)`
                    if done {
                        break;
                    }
                }
                if !done || num_args != macro_.num_params {
                    diag.error(
                        Some(&stream.mark),
                        format!(
                            "macro \"{}\" requires {} arguments",
                            macro_.name, macro_.num_params
                        ),
                    );
                    stream.advance();
                    self.store_main_stream(stream);
                    return PpChar::Retry;
                }
            }
        }

        let link = Rc::new(MarkLink {
            macro_name: Rc::clone(&macro_.name),
            site: invocation_mark,
        });
        let body_mark = macro_.def_mark.with_parent(link);
        let body_stream = macro_.body.stream(body_mark);
        self.store_main_stream(lookahead);
        self.macro_insts.push(MacroInst {
            macro_: Some(macro_),
            stream: body_stream,
            params,
            param_insts: Vec::new(),
        });
        PpChar::Retry
    }

    /// Run a text fragment through the machine and collect the output; used
    /// to pre-expand macro arguments.
    fn expand_fragment(&mut self, slice: &TextSlice, mark: &Mark) -> String {
        self.macro_insts.push(MacroInst {
            macro_: None,
            stream: slice.stream(mark.clone()),
            params: HashMap::new(),
            param_insts: Vec::new(),
        });
        let mut out = String::new();
        loop {
            match self.step() {
                PpChar::Byte(c) => out.push(c as char),
                PpChar::Retry => continue,
                PpChar::Eof => break,
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Conditional skip mode
    // ------------------------------------------------------------------

    /// While inside a false conditional branch only directives are looked
    /// at; everything else is discarded line by line.
    fn step_skipping(&mut self) -> PpChar {
        let diag = self.diag.clone();
        let file = self.files.last_mut().expect("skipping without a file");
        if file.stream.at_end() {
            diag.error(
                Some(&file.stream.mark),
                "unterminated conditional directive",
            );
            file.conds.clear();
            return PpChar::Retry;
        }
        file.stream.skip_ws_and_comments(false);
        match file.stream.cur() {
            None => PpChar::Retry,
            Some(b'\n') => {
                file.stream.advance();
                PpChar::Retry
            }
            Some(b'#') => {
                file.stream.advance();
                file.stream.skip_ws_and_comments(false);
                let name = file.stream.advance_identifier();
                directives::run_skipping(self, &name);
                PpChar::Retry
            }
            Some(_) => {
                let mut bc = false;
                file.stream.skip_line(&mut bc);
                PpChar::Retry
            }
        }
    }
}

fn byte_or_retry(c: Option<u8>) -> PpChar {
    match c {
        Some(c) => PpChar::Byte(c),
        None => PpChar::Retry,
    }
}

impl Preprocessor {
    fn top_file_stream(&mut self) -> &mut TStream {
        &mut self
            .files
            .last_mut()
            .expect("directive outside of a file")
            .stream
    }

    fn top_file_conds(&mut self) -> &mut Vec<CondState> {
        &mut self
            .files
            .last_mut()
            .expect("directive outside of a file")
            .conds
    }

    fn top_file_dir(&self) -> PathBuf {
        self.files
            .last()
            .map(|f| f.dir.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
