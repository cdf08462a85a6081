//! Lexer.
//!
//! Converts the preprocessed character stream into tokens. Identifiers and
//! string literals are interned through the symbol table; keywords fall out
//! of the identifier lookup because the table is seeded with them.

use std::rc::Rc;

use crate::diag::DiagCtx;
use crate::mark::Mark;
use crate::pp::Preprocessor;
use crate::symtab::Symtab;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Delimiters
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBrack,
    RBrack,
    Semi,
    Comma,
    Question,
    Colon,

    // Assignment operators
    Assign,
    PlusEq,
    MinusEq,
    StarEq,
    DivEq,
    ModEq,
    BitAndEq,
    BitXorEq,
    BitOrEq,
    RShiftEq,
    LShiftEq,

    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    // Arithmetic
    RShift,
    LShift,
    LogicAnd,
    LogicOr,
    LogicNot,
    Plus,
    Minus,
    Star,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    Inc,
    Dec,
    Arrow,
    Dot,
    Ellipsis,

    // Keywords
    Auto,
    Break,
    Case,
    Const,
    Continue,
    Default,
    Do,
    Else,
    Enum,
    Extern,
    For,
    Goto,
    If,
    Inline,
    Register,
    Restrict,
    Return,
    Sizeof,
    Static,
    Struct,
    Switch,
    Typedef,
    Union,
    Volatile,
    While,
    Alignas,
    Alignof,
    Bool,
    Complex,
    Generic,
    Imaginary,
    Noreturn,
    StaticAssert,
    ThreadLocal,

    // Type names
    Void,
    Char,
    Short,
    Int,
    Long,
    Unsigned,
    Signed,
    Double,
    Float,

    // Builtins seeded through the symbol table
    VaList,
    VaStart,
    VaArg,
    VaEnd,
    VaCopy,
    Offsetof,
    FuncName,

    // Tokens with payload
    Id,
    IntLit,
    FloatLit,
    String,

    Eof,
}

impl TokenKind {
    pub fn describe(self) -> &'static str {
        use TokenKind::*;
        match self {
            LBrace => "{",
            RBrace => "}",
            LParen => "(",
            RParen => ")",
            LBrack => "[",
            RBrack => "]",
            Semi => ";",
            Comma => ",",
            Question => "?",
            Colon => ":",
            Assign => "=",
            PlusEq => "+=",
            MinusEq => "-=",
            StarEq => "*=",
            DivEq => "/=",
            ModEq => "%=",
            BitAndEq => "&=",
            BitXorEq => "^=",
            BitOrEq => "|=",
            RShiftEq => ">>=",
            LShiftEq => "<<=",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Gt => ">",
            Le => "<=",
            Ge => ">=",
            RShift => ">>",
            LShift => "<<",
            LogicAnd => "&&",
            LogicOr => "||",
            LogicNot => "!",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Div => "/",
            Mod => "%",
            BitAnd => "&",
            BitOr => "|",
            BitXor => "^",
            BitNot => "~",
            Inc => "++",
            Dec => "--",
            Arrow => "->",
            Dot => ".",
            Ellipsis => "...",
            Auto => "auto",
            Break => "break",
            Case => "case",
            Const => "const",
            Continue => "continue",
            Default => "default",
            Do => "do",
            Else => "else",
            Enum => "enum",
            Extern => "extern",
            For => "for",
            Goto => "goto",
            If => "if",
            Inline => "inline",
            Register => "register",
            Restrict => "restrict",
            Return => "return",
            Sizeof => "sizeof",
            Static => "static",
            Struct => "struct",
            Switch => "switch",
            Typedef => "typedef",
            Union => "union",
            Volatile => "volatile",
            While => "while",
            Alignas => "_Alignas",
            Alignof => "_Alignof",
            Bool => "_Bool",
            Complex => "_Complex",
            Generic => "_Generic",
            Imaginary => "_Imaginary",
            Noreturn => "_Noreturn",
            StaticAssert => "_Static_assert",
            ThreadLocal => "_Thread_local",
            Void => "void",
            Char => "char",
            Short => "short",
            Int => "int",
            Long => "long",
            Unsigned => "unsigned",
            Signed => "signed",
            Double => "double",
            Float => "float",
            VaList => "__builtin_va_list",
            VaStart => "__builtin_va_start",
            VaArg => "__builtin_va_arg",
            VaEnd => "__builtin_va_end",
            VaCopy => "__builtin_va_copy",
            Offsetof => "__builtin_offsetof",
            FuncName => "__func__",
            Id => "<identifier>",
            IntLit => "<integer literal>",
            FloatLit => "<float literal>",
            String => "<string literal>",
            Eof => "<eof>",
        }
    }
}

#[derive(Debug, Clone)]
pub enum TokenData {
    None,
    Id(Rc<str>),
    Str(Rc<str>),
    Int {
        val: u64,
        has_u: bool,
        has_l: bool,
        has_ll: bool,
    },
    Float {
        val: f64,
        has_f: bool,
        has_l: bool,
    },
}

#[derive(Debug, Clone)]
pub struct Lexeme {
    pub kind: TokenKind,
    pub mark: Mark,
    pub data: TokenData,
}

impl Lexeme {
    pub fn id_name(&self) -> Option<&Rc<str>> {
        match &self.data {
            TokenData::Id(name) => Some(name),
            _ => None,
        }
    }

    pub fn str_val(&self) -> Option<&Rc<str>> {
        match &self.data {
            TokenData::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Which kind of character/string literal is being lexed. Wide and unicode
/// prefixes are recognized but all collapse to the same token payload.
#[derive(Clone, Copy, PartialEq, Eq)]
enum StrKind {
    Plain,
    Wide,
}

pub struct Lexer {
    pp: Preprocessor,
    symtab: Symtab,
    string_tab: Symtab,
    peeked: Option<u8>,
    diag: DiagCtx,
}

impl Lexer {
    pub fn new(pp: Preprocessor, diag: DiagCtx) -> Lexer {
        Lexer {
            pp,
            symtab: Symtab::with_keywords(),
            string_tab: Symtab::plain(),
            peeked: None,
            diag,
        }
    }

    fn getc(&mut self) -> Option<u8> {
        match self.peeked.take() {
            Some(c) => Some(c),
            None => self.pp.next_char(),
        }
    }

    fn ungetc(&mut self, c: Option<u8>) {
        self.peeked = c;
    }

    /// Lex every token up to and including `Eof`.
    pub fn tokenize(&mut self) -> Vec<Lexeme> {
        let mut toks = Vec::new();
        loop {
            let tok = self.next_token();
            let done = tok.kind == TokenKind::Eof;
            toks.push(tok);
            if done {
                return toks;
            }
        }
    }

    pub fn next_token(&mut self) -> Lexeme {
        use TokenKind::*;

        let mut cur;
        loop {
            cur = self.getc();
            match cur {
                Some(c) if c.is_ascii_whitespace() || c == b'\\' => continue,
                _ => break,
            }
        }
        let mark = self.pp.last_mark();
        let tok = |kind| Lexeme {
            kind,
            mark: mark.clone(),
            data: TokenData::None,
        };

        let c = match cur {
            None => return tok(Eof),
            Some(c) => c,
        };

        match c {
            b'{' => tok(LBrace),
            b'}' => tok(RBrace),
            b'(' => tok(LParen),
            b')' => tok(RParen),
            b';' => tok(Semi),
            b',' => tok(Comma),
            b'[' => tok(LBrack),
            b']' => tok(RBrack),
            b'?' => tok(Question),
            b':' => tok(Colon),
            b'~' => tok(BitNot),
            b'=' => tok(self.check_eq(Assign, Eq)),
            b'*' => tok(self.check_eq(Star, StarEq)),
            b'/' => tok(self.check_eq(Div, DivEq)),
            b'%' => tok(self.check_eq(Mod, ModEq)),
            b'!' => tok(self.check_eq(LogicNot, Ne)),
            b'^' => tok(self.check_eq(BitXor, BitXorEq)),
            b'.' => {
                let next = self.getc();
                match next {
                    Some(b'.') => match self.getc() {
                        Some(b'.') => tok(Ellipsis),
                        _ => {
                            self.diag.error(Some(&mark), "unexpected token: ..");
                            tok(Dot)
                        }
                    },
                    Some(d) if d.is_ascii_digit() => {
                        self.ungetc(Some(d));
                        // Put the dot back in front of the digits.
                        return self.lex_number(b'.', mark);
                    }
                    _ => {
                        self.ungetc(next);
                        tok(Dot)
                    }
                }
            }
            b'+' => {
                let next = self.getc();
                match next {
                    Some(b'+') => tok(Inc),
                    Some(b'=') => tok(PlusEq),
                    _ => {
                        self.ungetc(next);
                        tok(Plus)
                    }
                }
            }
            b'-' => {
                let next = self.getc();
                match next {
                    Some(b'-') => tok(Dec),
                    Some(b'=') => tok(MinusEq),
                    Some(b'>') => tok(Arrow),
                    _ => {
                        self.ungetc(next);
                        tok(Minus)
                    }
                }
            }
            b'|' => {
                let next = self.getc();
                match next {
                    Some(b'|') => tok(LogicOr),
                    Some(b'=') => tok(BitOrEq),
                    _ => {
                        self.ungetc(next);
                        tok(BitOr)
                    }
                }
            }
            b'&' => {
                let next = self.getc();
                match next {
                    Some(b'&') => tok(LogicAnd),
                    Some(b'=') => tok(BitAndEq),
                    _ => {
                        self.ungetc(next);
                        tok(BitAnd)
                    }
                }
            }
            b'>' => {
                let next = self.getc();
                match next {
                    Some(b'=') => tok(Ge),
                    Some(b'>') => tok(self.check_eq(RShift, RShiftEq)),
                    _ => {
                        self.ungetc(next);
                        tok(Gt)
                    }
                }
            }
            b'<' => {
                let next = self.getc();
                match next {
                    Some(b'=') => tok(Le),
                    Some(b'<') => tok(self.check_eq(LShift, LShiftEq)),
                    _ => {
                        self.ungetc(next);
                        tok(Lt)
                    }
                }
            }
            b'L' | b'u' | b'U' => {
                // Wide / unicode literal prefixes; widths are not
                // distinguished downstream.
                let next = self.getc();
                match next {
                    Some(b'"') => self.lex_string(mark, StrKind::Wide),
                    Some(b'\'') => self.lex_char(mark, StrKind::Wide),
                    _ => {
                        self.ungetc(next);
                        self.lex_id(c, mark)
                    }
                }
            }
            b'"' => self.lex_string(mark, StrKind::Plain),
            b'\'' => self.lex_char(mark, StrKind::Plain),
            c if c.is_ascii_digit() => self.lex_number(c, mark),
            c if c.is_ascii_alphabetic() || c == b'_' => self.lex_id(c, mark),
            c => {
                self.diag
                    .error(Some(&mark), format!("unexpected character: {}", c as char));
                self.next_token()
            }
        }
    }

    fn check_eq(&mut self, without: TokenKind, with: TokenKind) -> TokenKind {
        let next = self.getc();
        if next == Some(b'=') {
            with
        } else {
            self.ungetc(next);
            without
        }
    }

    fn lex_id(&mut self, first: u8, mark: Mark) -> Lexeme {
        let mut text = String::new();
        text.push(first as char);
        loop {
            match self.getc() {
                Some(c) if c.is_ascii_alphanumeric() || c == b'_' => text.push(c as char),
                other => {
                    self.ungetc(other);
                    break;
                }
            }
        }
        let (name, kind) = self.symtab.intern(&text, TokenKind::Id);
        let data = if kind == TokenKind::Id {
            TokenData::Id(name)
        } else {
            TokenData::None
        };
        Lexeme { kind, mark, data }
    }

    /// Decode one (possibly escaped) character of a character constant or
    /// string literal.
    fn lex_single_char(&mut self, cur: u8, wide: StrKind, mark: &Mark) -> u32 {
        if cur != b'\\' {
            return cur as u32;
        }
        let esc = match self.getc() {
            Some(c) => c,
            None => return b'\\' as u32,
        };
        match esc {
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0c,
            b'n' => b'\n' as u32,
            b'r' => b'\r' as u32,
            b't' => b'\t' as u32,
            b'v' => 0x0b,
            b'\\' => b'\\' as u32,
            b'\'' => b'\'' as u32,
            b'"' => b'"' as u32,
            b'?' => b'?' as u32,
            b'0'..=b'7' | b'x' => {
                let is_oct = esc != b'x';
                let mut digits = String::new();
                if is_oct {
                    digits.push(esc as char);
                }
                loop {
                    match self.getc() {
                        Some(c)
                            if (is_oct && (b'0'..=b'7').contains(&c))
                                || (!is_oct && c.is_ascii_hexdigit()) =>
                        {
                            digits.push(c as char)
                        }
                        other => {
                            self.ungetc(other);
                            break;
                        }
                    }
                }
                let radix = if is_oct { 8 } else { 16 };
                let val = u64::from_str_radix(&digits, radix).unwrap_or(u64::MAX);
                let limit = match wide {
                    StrKind::Plain => 0xff,
                    StrKind::Wide => 0xffff_ffff,
                };
                if val > limit {
                    self.diag.warn(
                        Some(mark),
                        format!("overflow in character constant '\\{}'", digits),
                    );
                }
                (val & limit) as u32
            }
            other => {
                self.diag.warn(
                    Some(mark),
                    format!("unknown escape sequence: '\\{}'", other as char),
                );
                other as u32
            }
        }
    }

    fn lex_char(&mut self, mark: Mark, wide: StrKind) -> Lexeme {
        let cur = match self.getc() {
            Some(c) => c,
            None => {
                self.diag.error(Some(&mark), "unterminated character literal");
                return Lexeme {
                    kind: TokenKind::IntLit,
                    mark,
                    data: TokenData::Int {
                        val: 0,
                        has_u: false,
                        has_l: false,
                        has_ll: false,
                    },
                };
            }
        };
        let val = self.lex_single_char(cur, wide, &mark) as u64;
        let mut close = self.getc();
        if close != Some(b'\'') {
            self.diag
                .error(Some(&mark), "unexpected junk in character literal");
            while close.is_some() && close != Some(b'\'') {
                close = self.getc();
            }
        }
        Lexeme {
            kind: TokenKind::IntLit,
            mark,
            data: TokenData::Int {
                val,
                has_u: false,
                has_l: false,
                has_ll: false,
            },
        }
    }

    fn lex_string(&mut self, mark: Mark, wide: StrKind) -> Lexeme {
        let mut text = String::new();
        loop {
            let c = match self.getc() {
                Some(c) => c,
                None => {
                    self.diag.error(Some(&mark), "unterminated string");
                    break;
                }
            };
            if c == b'"' {
                // Adjacent string literals concatenate: skip whitespace and
                // continue if another quote follows.
                let mut next = self.getc();
                while let Some(n) = next {
                    if !n.is_ascii_whitespace() {
                        break;
                    }
                    next = self.getc();
                }
                match next {
                    Some(b'"') => continue,
                    other => {
                        self.ungetc(other);
                        break;
                    }
                }
            }
            let decoded = self.lex_single_char(c, wide, &mark);
            match char::from_u32(decoded) {
                Some(ch) => text.push(ch),
                None => text.push(char::REPLACEMENT_CHARACTER),
            }
        }
        let (interned, _) = self.string_tab.intern(&text, TokenKind::String);
        Lexeme {
            kind: TokenKind::String,
            mark,
            data: TokenData::Str(interned),
        }
    }

    fn lex_number(&mut self, first: u8, mark: Mark) -> Lexeme {
        let mut text = String::new();
        let mut cur = Some(first);

        let mut has_e = false;
        let mut has_dot = false;
        let mut has_f = false;
        let mut has_u = false;
        let mut has_l = false;
        let mut has_ll = false;
        let mut is_hex = false;
        let mut err = false;
        let mut last: u8 = 0;

        loop {
            let c = match cur {
                Some(c) => c,
                None => break,
            };
            let done = match c {
                b'e' | b'E' => {
                    if !is_hex {
                        if has_e {
                            err = true;
                        }
                        has_e = true;
                    }
                    false
                }
                b'.' => {
                    if has_dot {
                        err = true;
                    }
                    has_dot = true;
                    false
                }
                b'f' | b'F' => {
                    if !is_hex {
                        if has_f || has_u || has_ll {
                            err = true;
                        }
                        has_f = true;
                    }
                    false
                }
                b'u' | b'U' => {
                    if has_f || has_u {
                        err = true;
                    }
                    has_u = true;
                    false
                }
                b'l' | b'L' => {
                    if has_f || has_ll || (has_l && c != last) {
                        err = true;
                    }
                    if has_l {
                        has_ll = true;
                    }
                    has_l = true;
                    false
                }
                b'x' | b'X' => {
                    if last == b'0' && text.len() == 1 {
                        is_hex = true;
                    } else {
                        err = true;
                    }
                    false
                }
                b'+' | b'-' => {
                    // Exponent sign, only directly after 'e'.
                    if !is_hex && has_e && (last == b'e' || last == b'E') {
                        false
                    } else {
                        true
                    }
                }
                c if c.is_ascii_digit() => {
                    if has_f || has_u || has_l || has_ll {
                        err = true;
                    }
                    false
                }
                b'a'..=b'd' | b'A'..=b'D' => {
                    if !is_hex {
                        err = true;
                    }
                    false
                }
                c if c.is_ascii_alphabetic() || c == b'_' => {
                    err = true;
                    false
                }
                _ => true,
            };
            if done {
                break;
            }
            last = c;
            text.push(c as char);
            cur = self.getc();
        }
        self.ungetc(cur);

        let is_float = has_e || has_dot || has_f;
        if is_float && (has_u || has_ll || is_hex) {
            err = true;
        }
        if err {
            self.diag.error(Some(&mark), "invalid numeric literal");
            return Lexeme {
                kind: TokenKind::IntLit,
                mark,
                data: TokenData::Int {
                    val: 0,
                    has_u: false,
                    has_l: false,
                    has_ll: false,
                },
            };
        }

        let digits: String = text
            .trim_end_matches(|c| matches!(c, 'u' | 'U' | 'l' | 'L' | 'f' | 'F'))
            .to_string();

        if is_float {
            let val = match digits.parse::<f64>() {
                Ok(v) => v,
                Err(_) => {
                    self.diag.error(Some(&mark), "invalid numeric literal");
                    0.0
                }
            };
            return Lexeme {
                kind: TokenKind::FloatLit,
                mark,
                data: TokenData::Float { val, has_f, has_l },
            };
        }

        let parsed = if is_hex {
            u64::from_str_radix(&digits[2..], 16)
        } else if digits.len() > 1 && digits.starts_with('0') {
            u64::from_str_radix(&digits[1..], 8)
        } else {
            digits.parse::<u64>()
        };
        let val = match parsed {
            Ok(v) => v,
            Err(_) => {
                self.diag.error(Some(&mark), "overflow in numeric literal");
                0
            }
        };
        Lexeme {
            kind: TokenKind::IntLit,
            mark,
            data: TokenData::Int {
                val,
                has_u,
                has_l,
                has_ll,
            },
        }
    }
}
