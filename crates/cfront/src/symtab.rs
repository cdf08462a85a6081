//! Symbol tables.
//!
//! Identifiers and string literals are interned per translation unit. The
//! identifier table is pre-seeded with every keyword, so the lexer discovers
//! keyword-ness simply by reading back the token kind the table assigned at
//! initialization.

use std::collections::HashMap;
use std::rc::Rc;

use crate::lexer::TokenKind;

pub struct Symtab {
    map: HashMap<Rc<str>, usize>,
    entries: Vec<SymEntry>,
}

pub struct SymEntry {
    pub name: Rc<str>,
    pub kind: TokenKind,
}

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("auto", TokenKind::Auto),
    ("break", TokenKind::Break),
    ("case", TokenKind::Case),
    ("char", TokenKind::Char),
    ("const", TokenKind::Const),
    ("continue", TokenKind::Continue),
    ("default", TokenKind::Default),
    ("do", TokenKind::Do),
    ("double", TokenKind::Double),
    ("else", TokenKind::Else),
    ("enum", TokenKind::Enum),
    ("extern", TokenKind::Extern),
    ("float", TokenKind::Float),
    ("for", TokenKind::For),
    ("goto", TokenKind::Goto),
    ("if", TokenKind::If),
    ("inline", TokenKind::Inline),
    ("int", TokenKind::Int),
    ("long", TokenKind::Long),
    ("register", TokenKind::Register),
    ("restrict", TokenKind::Restrict),
    ("return", TokenKind::Return),
    ("short", TokenKind::Short),
    ("signed", TokenKind::Signed),
    ("sizeof", TokenKind::Sizeof),
    ("static", TokenKind::Static),
    ("struct", TokenKind::Struct),
    ("switch", TokenKind::Switch),
    ("typedef", TokenKind::Typedef),
    ("union", TokenKind::Union),
    ("unsigned", TokenKind::Unsigned),
    ("void", TokenKind::Void),
    ("volatile", TokenKind::Volatile),
    ("while", TokenKind::While),
    ("_Alignas", TokenKind::Alignas),
    ("_Alignof", TokenKind::Alignof),
    ("_Bool", TokenKind::Bool),
    ("_Complex", TokenKind::Complex),
    ("_Generic", TokenKind::Generic),
    ("_Imaginary", TokenKind::Imaginary),
    ("_Noreturn", TokenKind::Noreturn),
    ("_Static_assert", TokenKind::StaticAssert),
    ("_Thread_local", TokenKind::ThreadLocal),
    ("__builtin_va_list", TokenKind::VaList),
    ("__builtin_va_start", TokenKind::VaStart),
    ("__builtin_va_arg", TokenKind::VaArg),
    ("__builtin_va_end", TokenKind::VaEnd),
    ("__builtin_va_copy", TokenKind::VaCopy),
    ("__builtin_offsetof", TokenKind::Offsetof),
    ("__func__", TokenKind::FuncName),
];

impl Symtab {
    /// Table for identifiers, seeded with the keywords.
    pub fn with_keywords() -> Symtab {
        let mut tab = Symtab::plain();
        for &(word, kind) in KEYWORDS {
            tab.intern(word, kind);
        }
        tab
    }

    /// Table without seeds; used for string literals.
    pub fn plain() -> Symtab {
        Symtab {
            map: HashMap::new(),
            entries: Vec::new(),
        }
    }

    /// Intern `text`. A fresh entry gets `kind`; an existing entry keeps the
    /// kind it was created with, which is how keywords are recognized.
    pub fn intern(&mut self, text: &str, kind: TokenKind) -> (Rc<str>, TokenKind) {
        if let Some(&idx) = self.map.get(text) {
            let entry = &self.entries[idx];
            return (Rc::clone(&entry.name), entry.kind);
        }
        let name: Rc<str> = text.into();
        self.entries.push(SymEntry {
            name: Rc::clone(&name),
            kind,
        });
        self.map.insert(Rc::clone(&name), self.entries.len() - 1);
        (name, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_read_back_their_kind() {
        let mut tab = Symtab::with_keywords();
        let (_, kind) = tab.intern("while", TokenKind::Id);
        assert_eq!(kind, TokenKind::While);
        let (_, kind) = tab.intern("_Alignof", TokenKind::Id);
        assert_eq!(kind, TokenKind::Alignof);
    }

    #[test]
    fn identifiers_share_one_interned_string() {
        let mut tab = Symtab::with_keywords();
        let (a, kind) = tab.intern("foo", TokenKind::Id);
        assert_eq!(kind, TokenKind::Id);
        let (b, _) = tab.intern("foo", TokenKind::Id);
        assert!(Rc::ptr_eq(&a, &b));
    }
}
