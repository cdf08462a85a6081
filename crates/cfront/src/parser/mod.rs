//! Parser.
//!
//! Recursive descent with a two-token view, based on the K&R grammar with
//! left factoring and left recursion elimination applied. A small amount of
//! backtracking distinguishes type names from expressions, but it is always
//! decided before a speculative parse takes any irreversible action: the
//! scope stack fully determines whether an identifier is a typedef name.
//!
//! All nodes go into the translation unit's arenas. Typedef names are
//! inserted the moment their declarator closes, so later tokens on the same
//! line already see them.

mod expr;
mod stmt;

#[cfg(test)]
mod tests;

use std::rc::Rc;

use crate::ast::{
    DeclId, DeclNodeId, ExprId, GDeclKind, TransUnit, TypeId, TypeKind, TypeMods, TypedefOf,
    TY_DOUBLE, TY_INT, TY_LONG, TY_LONG_DOUBLE, TY_LONG_LONG, TY_SHORT,
};
use crate::diag::DiagCtx;
use crate::lexer::{Lexeme, TokenKind};
use crate::mark::Mark;
use crate::type_table::{ScopeId, TagEntry};
use crate::typecheck;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PErr {
    /// The speculative parse does not apply; nothing was consumed past the
    /// decision point.
    Backtrack,
    /// A reported syntax error.
    Syntax,
}

pub type PRes<T> = Result<T, PErr>;

/// Parse a whole translation unit into `tu`. Returns false when any
/// declaration failed; parsing continues at the next top-level declaration.
pub fn parse(tu: &mut TransUnit, tokens: &[Lexeme], diag: &DiagCtx, keep_parens: bool) -> bool {
    let root = tu.root_scope;
    let mut parser = Parser {
        toks: tokens,
        pos: 0,
        tu,
        scope: root,
        func_name: None,
        diag: diag.clone(),
        keep_parens,
    };
    let mut ok = true;
    while parser.cur_kind() != TokenKind::Eof {
        match parser.external_declaration() {
            Ok(gdecl) => parser.tu.gdecl_order.push(gdecl),
            Err(_) => {
                ok = false;
                parser.recover();
            }
        }
    }
    ok
}

/// Parse a single expression; the `#if` evaluator runs the main expression
/// grammar over the preprocessed line this way.
pub fn parse_constant_expr(
    tu: &mut TransUnit,
    tokens: &[Lexeme],
    diag: &DiagCtx,
) -> Option<ExprId> {
    let root = tu.root_scope;
    let mut parser = Parser {
        toks: tokens,
        pos: 0,
        tu,
        scope: root,
        func_name: None,
        diag: diag.clone(),
        keep_parens: false,
    };
    parser.expression().ok()
}

pub(crate) struct Parser<'a> {
    toks: &'a [Lexeme],
    pos: usize,
    pub(crate) tu: &'a mut TransUnit,
    pub(crate) scope: ScopeId,
    pub(crate) func_name: Option<Rc<str>>,
    pub(crate) diag: DiagCtx,
    keep_parens: bool,
}

/// A location a declarator still has to fill with the type it elaborates:
/// either the declarator's own slot or the open base of a partially built
/// chain.
#[derive(Clone, Copy)]
pub(crate) enum Hole {
    Node(DeclNodeId),
    PtrBase(TypeId),
    ArrBase(TypeId),
    FuncRet(TypeId),
    ParenBase(TypeId),
}

impl Hole {
    fn get(self, tu: &TransUnit) -> TypeId {
        match self {
            Hole::Node(n) => tu.decl_node(n).ty,
            Hole::PtrBase(t) => match &tu.ty(t).kind {
                TypeKind::Ptr { base, .. } => *base,
                _ => unreachable!("hole type changed"),
            },
            Hole::ArrBase(t) => match &tu.ty(t).kind {
                TypeKind::Arr { base, .. } => *base,
                _ => unreachable!("hole type changed"),
            },
            Hole::FuncRet(t) => match &tu.ty(t).kind {
                TypeKind::Func { ret, .. } => *ret,
                _ => unreachable!("hole type changed"),
            },
            Hole::ParenBase(t) => match &tu.ty(t).kind {
                TypeKind::Paren(base) => *base,
                _ => unreachable!("hole type changed"),
            },
        }
    }

    fn set(self, tu: &mut TransUnit, val: TypeId) {
        match self {
            Hole::Node(n) => tu.decl_node_mut(n).ty = val,
            Hole::PtrBase(t) => {
                if let TypeKind::Ptr { base, .. } = &mut tu.ty_mut(t).kind {
                    *base = val;
                }
            }
            Hole::ArrBase(t) => {
                if let TypeKind::Arr { base, .. } = &mut tu.ty_mut(t).kind {
                    *base = val;
                }
            }
            Hole::FuncRet(t) => {
                if let TypeKind::Func { ret, .. } = &mut tu.ty_mut(t).kind {
                    *ret = val;
                }
            }
            Hole::ParenBase(t) => {
                if let TypeKind::Paren(base) = &mut tu.ty_mut(t).kind {
                    *base = val;
                }
            }
        }
    }
}

fn is_storage_class(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Auto
            | TokenKind::Register
            | TokenKind::Static
            | TokenKind::Extern
            | TokenKind::Typedef
            | TokenKind::Inline
    )
}

fn is_type_spec_no_id(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Void
            | TokenKind::Bool
            | TokenKind::Char
            | TokenKind::Short
            | TokenKind::Int
            | TokenKind::Long
            | TokenKind::Float
            | TokenKind::Double
            | TokenKind::Signed
            | TokenKind::Unsigned
            | TokenKind::Struct
            | TokenKind::Union
            | TokenKind::Enum
            | TokenKind::VaList
            | TokenKind::Alignas
            | TokenKind::Noreturn
            | TokenKind::StaticAssert
    )
}

fn is_type_qualifier(kind: TokenKind) -> bool {
    matches!(kind, TokenKind::Const | TokenKind::Volatile)
}

impl<'a> Parser<'a> {
    pub(crate) fn cur(&self) -> &Lexeme {
        &self.toks[self.pos.min(self.toks.len() - 1)]
    }

    pub(crate) fn next(&self) -> &Lexeme {
        &self.toks[(self.pos + 1).min(self.toks.len() - 1)]
    }

    pub(crate) fn cur_kind(&self) -> TokenKind {
        self.cur().kind
    }

    pub(crate) fn next_kind(&self) -> TokenKind {
        self.next().kind
    }

    pub(crate) fn mark(&self) -> Mark {
        self.cur().mark.clone()
    }

    pub(crate) fn advance(&mut self) {
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> PRes<()> {
        if self.cur_kind() == kind {
            self.advance();
            Ok(())
        } else {
            self.diag.error(
                Some(&self.cur().mark),
                format!(
                    "expected '{}', found '{}'",
                    kind.describe(),
                    self.cur_kind().describe()
                ),
            );
            Err(PErr::Syntax)
        }
    }

    pub(crate) fn syntax_error(&self, msg: impl Into<String>) -> PErr {
        self.diag.error(Some(&self.cur().mark), msg);
        PErr::Syntax
    }

    /// Skip to the next plausible top-level declaration start.
    fn recover(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.cur_kind() {
                TokenKind::Eof => return,
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    if depth > 0 {
                        depth -= 1;
                        if depth == 0 {
                            self.advance();
                            // Allow `};` after a type definition.
                            if self.cur_kind() == TokenKind::Semi {
                                self.advance();
                            }
                            return;
                        }
                    }
                }
                TokenKind::Semi if depth == 0 => {
                    self.advance();
                    return;
                }
                _ => {}
            }
            self.advance();
        }
    }

    fn cur_id_is_typedef(&self) -> bool {
        match self.cur().id_name() {
            Some(name) => self.tu.scopes.lookup_typedef(self.scope, name).is_some(),
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // External declarations
    // ------------------------------------------------------------------

    fn external_declaration(&mut self) -> PRes<crate::ast::GDeclId> {
        let mark = self.mark();
        let ty = self.declaration_specifiers()?;
        let ty = match ty {
            Some(ty) => ty,
            None => {
                if !is_decl_start_token(self.cur_kind()) {
                    return Err(self.syntax_error(format!(
                        "expected declaration, found '{}'",
                        self.cur_kind().describe()
                    )));
                }
                self.diag.warn(
                    Some(&mark),
                    "data definition has no type or storage class",
                );
                TY_INT
            }
        };
        let decl = self.tu.new_decl(mark.clone(), ty);
        let gdecl = self
            .tu
            .new_gdecl(mark, GDeclKind::Decl, decl);

        match self.declarator_base(decl) {
            Err(PErr::Backtrack) => {
                // A bare type declaration, e.g. a struct definition.
                self.expect(TokenKind::Semi)?;
                return Ok(gdecl);
            }
            Err(e) => return Err(e),
            Ok(()) => {}
        }

        if self.cur_kind() == TokenKind::Semi {
            self.advance();
            return Ok(gdecl);
        }

        let node = *self
            .tu
            .decl(decl)
            .nodes
            .last()
            .expect("declarator_base adds a node");
        let is_fn = matches!(
            self.tu.ty(self.tu.decl_node(node).ty).kind,
            TypeKind::Func { .. }
        );
        if is_fn && self.cur_kind() == TokenKind::LBrace {
            self.function_definition(gdecl)?;
        } else {
            self.declaration(Some(decl), true)?;
            self.expect(TokenKind::Semi)?;
        }
        Ok(gdecl)
    }

    fn function_definition(&mut self, gdecl: crate::ast::GDeclId) -> PRes<()> {
        let decl = self.tu.gdecl(gdecl).decl;
        let node = *self
            .tu
            .decl(decl)
            .nodes
            .first()
            .expect("function definition without declarator");
        let name = match &self.tu.decl_node(node).id {
            Some(name) => Rc::clone(name),
            None => return Err(self.syntax_error("function definition without a name")),
        };
        self.func_name = Some(name);
        let body = self.compound_statement();
        self.func_name = None;
        let body = body?;
        self.tu.gdecl_mut(gdecl).kind = GDeclKind::FnDef {
            body,
            labels: Default::default(),
            gotos: Vec::new(),
        };
        Ok(())
    }

    // ------------------------------------------------------------------
    // Declaration specifiers
    // ------------------------------------------------------------------

    /// Accumulate declaration specifiers into a modifier chain plus an end
    /// type. `None` when the current token starts no specifier at all.
    fn declaration_specifiers(&mut self) -> PRes<Option<TypeId>> {
        let mut ty: Option<TypeId> = None;
        loop {
            let kind = self.cur_kind();
            if is_storage_class(kind) {
                self.storage_class_specifier(&mut ty)?;
                continue;
            }
            if kind == TokenKind::Id {
                if !self.cur_id_is_typedef() {
                    break;
                }
                // If a declarator terminator follows, the identifier must be
                // the declared name, not another type specifier.
                if matches!(
                    self.next_kind(),
                    TokenKind::Assign | TokenKind::Semi | TokenKind::Comma
                ) && self.has_type_specifier(ty)
                {
                    break;
                }
                // `typedef old new;` re-using an existing typedef name.
                if self.is_typedef_chain(ty)
                    && matches!(self.next_kind(), TokenKind::Semi | TokenKind::Comma)
                {
                    break;
                }
                self.type_specifier(&mut ty)?;
                continue;
            }
            if is_type_spec_no_id(kind) {
                self.type_specifier(&mut ty)?;
                continue;
            }
            if is_type_qualifier(kind) {
                self.type_qualifier(&mut ty)?;
                continue;
            }
            break;
        }
        Ok(ty)
    }

    /// Like declaration specifiers, without storage classes; used for struct
    /// members and type names. In a compound definition a typedef name may
    /// collide with the member name, so a second specifier ends the list.
    fn specifier_qualifiers(&mut self, compound: bool) -> PRes<Option<TypeId>> {
        let mut ty: Option<TypeId> = None;
        loop {
            let kind = self.cur_kind();
            if kind == TokenKind::Id {
                if !self.cur_id_is_typedef() {
                    break;
                }
                if compound && self.has_type_specifier(ty) {
                    break;
                }
                self.type_specifier(&mut ty)?;
                continue;
            }
            if is_type_spec_no_id(kind) {
                self.type_specifier(&mut ty)?;
                continue;
            }
            if is_type_qualifier(kind) {
                self.type_qualifier(&mut ty)?;
                continue;
            }
            break;
        }
        if let Some(t) = ty {
            // A lone qualifier/modifier list defaults to int.
            if let TypeKind::Mod { base: None, .. } = &self.tu.ty(t).kind {
                if let TypeKind::Mod { base, .. } = &mut self.tu.ty_mut(t).kind {
                    *base = Some(TY_INT);
                }
            }
        }
        Ok(ty)
    }

    /// Whether the accumulated specifiers already contain a type specifier
    /// (not just modifiers).
    fn has_type_specifier(&self, ty: Option<TypeId>) -> bool {
        match ty {
            None => false,
            Some(t) => !matches!(&self.tu.ty(t).kind, TypeKind::Mod { base: None, .. }),
        }
    }

    fn is_typedef_chain(&self, ty: Option<TypeId>) -> bool {
        match ty {
            Some(t) => match &self.tu.ty(t).kind {
                TypeKind::Mod { mods, .. } => mods.contains(TypeMods::TYPEDEF),
                _ => false,
            },
            None => false,
        }
    }

    fn storage_class_specifier(&mut self, ty: &mut Option<TypeId>) -> PRes<()> {
        let mods = match self.cur_kind() {
            TokenKind::Auto => TypeMods::AUTO,
            TokenKind::Register => TypeMods::REGISTER,
            TokenKind::Static => TypeMods::STATIC,
            TokenKind::Extern => TypeMods::EXTERN,
            TokenKind::Typedef => TypeMods::TYPEDEF,
            TokenKind::Inline => TypeMods::INLINE,
            _ => unreachable!("checked by caller"),
        };
        let mod_node = self.ensure_mod_node(ty);
        if let TypeKind::Mod { mods: m, .. } = &self.tu.ty(mod_node).kind {
            if m.contains(mods) {
                self.diag.warn(
                    Some(&self.cur().mark),
                    format!("duplicate storage class specifier: {}", mods.name()),
                );
            }
        }
        self.add_mod(mod_node, mods);
        self.advance();
        Ok(())
    }

    fn type_qualifier(&mut self, ty: &mut Option<TypeId>) -> PRes<()> {
        let mods = match self.cur_kind() {
            TokenKind::Const => TypeMods::CONST,
            TokenKind::Volatile => TypeMods::VOLATILE,
            _ => return Err(PErr::Backtrack),
        };
        self.advance();
        let mod_node = self.ensure_mod_node(ty);
        self.add_mod(mod_node, mods);
        Ok(())
    }

    /// The leading modifier node of the specifier chain, created on demand.
    fn ensure_mod_node(&mut self, ty: &mut Option<TypeId>) -> TypeId {
        if let Some(t) = *ty {
            if matches!(self.tu.ty(t).kind, TypeKind::Mod { .. }) {
                return t;
            }
        }
        let mark = self.mark();
        let node = self.tu.new_type(
            mark,
            TypeKind::Mod {
                mods: TypeMods::NONE,
                base: *ty,
                alignas_ty: None,
                alignas_expr: None,
                alignas_align: std::cell::Cell::new(0),
            },
        );
        *ty = Some(node);
        node
    }

    fn add_mod(&mut self, mod_node: TypeId, add: TypeMods) {
        if let TypeKind::Mod { mods, .. } = &mut self.tu.ty_mut(mod_node).kind {
            *mods |= add;
        }
    }

    fn type_specifier(&mut self, ty: &mut Option<TypeId>) -> PRes<()> {
        if self.cur_kind() == TokenKind::StaticAssert {
            return self.static_assert_specifier(ty);
        }

        // The slot the end type goes into: the mod node's base, or the
        // specifier chain itself.
        let mod_node = match *ty {
            Some(t) if matches!(self.tu.ty(t).kind, TypeKind::Mod { .. }) => Some(t),
            _ => None,
        };
        let end_value = match mod_node {
            Some(m) => match &self.tu.ty(m).kind {
                TypeKind::Mod { base, .. } => *base,
                _ => None,
            },
            None => *ty,
        };

        let kind = self.cur_kind();
        let combining = !matches!(
            kind,
            TokenKind::Alignas | TokenKind::Noreturn | TokenKind::Signed | TokenKind::Unsigned
        );

        if combining {
            if let Some(end) = end_value {
                // `long long`, `long double`, `short int` and friends arrive
                // one word at a time; combine them in place.
                let combined = match (&self.tu.ty(end).kind, kind) {
                    (TypeKind::Int, TokenKind::Short) => Some(TY_SHORT),
                    (TypeKind::Int, TokenKind::Long) => Some(TY_LONG),
                    (TypeKind::Short, TokenKind::Int) => Some(end),
                    (TypeKind::Long, TokenKind::Int) => Some(end),
                    (TypeKind::Long, TokenKind::Long) => Some(TY_LONG_LONG),
                    (TypeKind::Long, TokenKind::Double) => Some(TY_LONG_DOUBLE),
                    (TypeKind::LongLong, TokenKind::Int) => Some(end),
                    (TypeKind::Double, TokenKind::Long) => Some(TY_LONG_DOUBLE),
                    _ => None,
                };
                match combined {
                    Some(new_end) => {
                        self.set_end(ty, mod_node, new_end);
                        self.advance();
                        return Ok(());
                    }
                    None => {
                        return Err(self.syntax_error("multiple type specifiers in declaration"));
                    }
                }
            }
        }

        match kind {
            TokenKind::Id => {
                let name = Rc::clone(self.cur().id_name().expect("checked Id"));
                let base = self
                    .tu
                    .scopes
                    .lookup_typedef(self.scope, &name)
                    .expect("checked by caller");
                let mark = self.mark();
                let node = self.tu.new_type(
                    mark,
                    TypeKind::Typedef {
                        name,
                        base,
                        of: TypedefOf::Plain,
                    },
                );
                self.set_end(ty, mod_node, node);
            }
            TokenKind::Void => self.set_end(ty, mod_node, crate::ast::TY_VOID),
            TokenKind::Bool => self.set_end(ty, mod_node, crate::ast::TY_BOOL),
            TokenKind::Char => self.set_end(ty, mod_node, crate::ast::TY_CHAR),
            TokenKind::Short => self.set_end(ty, mod_node, TY_SHORT),
            TokenKind::Int => self.set_end(ty, mod_node, TY_INT),
            TokenKind::Long => self.set_end(ty, mod_node, TY_LONG),
            TokenKind::Float => self.set_end(ty, mod_node, crate::ast::TY_FLOAT),
            TokenKind::Double => self.set_end(ty, mod_node, TY_DOUBLE),
            TokenKind::VaList => self.set_end(ty, mod_node, crate::ast::TY_VA_LIST),
            TokenKind::Signed | TokenKind::Unsigned | TokenKind::Noreturn | TokenKind::Alignas => {
                let add = match kind {
                    TokenKind::Signed => TypeMods::SIGNED,
                    TokenKind::Unsigned => TypeMods::UNSIGNED,
                    TokenKind::Noreturn => TypeMods::NORETURN,
                    _ => TypeMods::ALIGNAS,
                };
                let mod_node = self.ensure_mod_node(ty);
                if let TypeKind::Mod { mods, .. } = &self.tu.ty(mod_node).kind {
                    if mods.contains(add) {
                        self.diag.error(
                            Some(&self.cur().mark),
                            format!("duplicate type specifier: {}", add.name()),
                        );
                    }
                }
                self.add_mod(mod_node, add);
                if kind == TokenKind::Alignas {
                    return self.alignas_operand(mod_node);
                }
            }
            TokenKind::Struct | TokenKind::Union | TokenKind::Enum => {
                let end = self.struct_union_enum_specifier()?;
                self.set_end(ty, mod_node, end);
                return Ok(());
            }
            _ => unreachable!("checked by caller"),
        }
        self.advance();
        Ok(())
    }

    fn set_end(&mut self, ty: &mut Option<TypeId>, mod_node: Option<TypeId>, val: TypeId) {
        match mod_node {
            Some(m) => {
                if let TypeKind::Mod { base, .. } = &mut self.tu.ty_mut(m).kind {
                    *base = Some(val);
                }
            }
            None => *ty = Some(val),
        }
    }

    /// `_Alignas(type-name)` or `_Alignas(const-expr)`.
    fn alignas_operand(&mut self, mod_node: TypeId) -> PRes<()> {
        self.advance(); // _Alignas
        self.expect(TokenKind::LParen)?;
        match self.type_name(false) {
            Ok(decl) => {
                if let TypeKind::Mod { alignas_ty, .. } = &mut self.tu.ty_mut(mod_node).kind {
                    *alignas_ty = Some(decl);
                }
            }
            Err(PErr::Backtrack) => {
                let expr = self.oper_expression(None)?;
                if let TypeKind::Mod { alignas_expr, .. } = &mut self.tu.ty_mut(mod_node).kind {
                    *alignas_expr = Some(expr);
                }
            }
            Err(e) => return Err(e),
        }
        self.expect(TokenKind::RParen)?;
        Ok(())
    }

    fn static_assert_specifier(&mut self, ty: &mut Option<TypeId>) -> PRes<()> {
        if ty.is_some() {
            return Err(self.syntax_error("unexpected _Static_assert"));
        }
        let mark = self.mark();
        self.advance();
        self.expect(TokenKind::LParen)?;
        let expr = self.oper_expression(None)?;
        self.expect(TokenKind::Comma)?;
        if self.cur_kind() != TokenKind::String {
            return Err(self.syntax_error("expected string literal in _Static_assert"));
        }
        let msg = Rc::clone(self.cur().str_val().expect("checked String"));
        self.advance();
        self.expect(TokenKind::RParen)?;
        let node = self
            .tu
            .new_type(mark, TypeKind::StaticAssert { expr, msg });
        *ty = Some(node);
        Ok(())
    }

    // ------------------------------------------------------------------
    // struct / union / enum
    // ------------------------------------------------------------------

    fn struct_union_enum_specifier(&mut self) -> PRes<TypeId> {
        let mark = self.mark();
        let tok = self.cur_kind();
        self.advance();

        let is_enum = tok == TokenKind::Enum;
        let of = match tok {
            TokenKind::Struct => TypedefOf::Struct,
            TokenKind::Union => TypedefOf::Union,
            _ => TypedefOf::Enum,
        };

        let mut name: Option<Rc<str>> = None;
        let mut entry: Option<(ScopeId, TagEntry)> = None;
        if self.cur_kind() == TokenKind::Id {
            let n = Rc::clone(self.cur().id_name().expect("checked Id"));
            entry = self.tu.scopes.lookup_tag(self.scope, &n);
            name = Some(n);
            self.advance();

            if self.cur_kind() != TokenKind::LBrace {
                if let Some((_, tag)) = entry {
                    if !self.tag_matches(tag.ty, tok) {
                        return Err(self.syntax_error(format!(
                            "wrong tag kind: '{}' is not a {}",
                            name.as_deref().unwrap_or(""),
                            tok.describe()
                        )));
                    }
                    return Ok(self.tag_reference(mark, name.expect("tag has name"), tag.ty, of));
                }
            }

            // A definition shadows a tag from an outer scope.
            if self.cur_kind() == TokenKind::LBrace {
                if let Some((scope, _)) = entry {
                    if scope != self.scope {
                        entry = None;
                    }
                }
            }
        }

        let entry_type = match entry {
            Some((_, tag)) => {
                if !self.tag_matches(tag.ty, tok) {
                    return Err(self.syntax_error(format!(
                        "wrong tag kind: '{}' is not a {}",
                        name.as_deref().unwrap_or(""),
                        tok.describe()
                    )));
                }
                tag.ty
            }
            None => {
                let kind = if is_enum {
                    TypeKind::Enum {
                        name: name.clone(),
                        base: TY_INT,
                        ids: Vec::new(),
                    }
                } else if tok == TokenKind::Struct {
                    TypeKind::Struct(crate::ast::CompoundData::named(name.clone()))
                } else {
                    TypeKind::Union(crate::ast::CompoundData::named(name.clone()))
                };
                let new_type = self.tu.new_type(mark.clone(), kind);
                if let Some(n) = &name {
                    self.tu.scopes.insert_tag(
                        self.scope,
                        Rc::clone(n),
                        TagEntry {
                            ty: new_type,
                            defined: false,
                        },
                    );
                }
                new_type
            }
        };

        if self.cur_kind() != TokenKind::LBrace {
            return match name {
                Some(n) => Ok(self.tag_reference(mark, n, entry_type, of)),
                None => Err(self.syntax_error("compound type without name or definition")),
            };
        }

        if let Some(n) = &name {
            let already = self
                .tu
                .scopes
                .tag_entry_mut(self.scope, n)
                .map(|tag| {
                    let was = tag.defined;
                    tag.defined = true;
                    was
                })
                .unwrap_or(false);
            if already {
                let prev_mark = self.tu.ty(entry_type).mark.clone();
                self.diag.error(
                    Some(&self.cur().mark),
                    format!("redefinition of '{}'", n),
                );
                self.diag.note(Some(&prev_mark), "originally defined here");
                return Err(PErr::Syntax);
            }
        }

        self.expect(TokenKind::LBrace)?;
        if is_enum {
            self.enumerator_list(entry_type)?;
        } else {
            loop {
                match self.struct_declaration(entry_type) {
                    Ok(()) => {}
                    Err(PErr::Backtrack) => break,
                    Err(e) => return Err(e),
                }
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(entry_type)
    }

    fn tag_matches(&self, ty: TypeId, tok: TokenKind) -> bool {
        matches!(
            (&self.tu.ty(ty).kind, tok),
            (TypeKind::Struct(_), TokenKind::Struct)
                | (TypeKind::Union(_), TokenKind::Union)
                | (TypeKind::Enum { .. }, TokenKind::Enum)
        )
    }

    /// A reference to a named tag is represented as a typedef node so the
    /// printer can reproduce `struct foo x;`.
    fn tag_reference(&mut self, mark: Mark, name: Rc<str>, base: TypeId, of: TypedefOf) -> TypeId {
        self.tu.new_type(
            mark,
            TypeKind::Typedef { name, base, of },
        )
    }

    fn struct_declaration(&mut self, compound: TypeId) -> PRes<()> {
        let ty = self.specifier_qualifiers(true)?;
        let ty = match ty {
            Some(ty) => ty,
            None => return Err(PErr::Backtrack),
        };
        self.struct_declarator_list(compound, ty)?;
        self.expect(TokenKind::Semi)?;
        Ok(())
    }

    fn struct_declarator_list(&mut self, compound: TypeId, base: TypeId) -> PRes<()> {
        let mark = self.mark();
        let decl = self.tu.new_decl(mark, base);
        if self.cur_kind() != TokenKind::Semi {
            self.struct_declarator(decl)?;
            while self.cur_kind() == TokenKind::Comma {
                self.advance();
                self.struct_declarator(decl)?;
            }
        }
        match &mut self.tu.ty_mut(compound).kind {
            TypeKind::Struct(data) | TypeKind::Union(data) => data.decls.push(decl),
            _ => unreachable!("member of a non-compound"),
        }
        Ok(())
    }

    fn struct_declarator(&mut self, decl: DeclId) -> PRes<()> {
        let node = if self.cur_kind() != TokenKind::Colon {
            match self.declarator_base(decl) {
                Ok(()) => {}
                Err(PErr::Backtrack) => {
                    return Err(self.syntax_error("expected member declarator"))
                }
                Err(e) => return Err(e),
            }
            *self.tu.decl(decl).nodes.last().expect("declarator added")
        } else {
            // Unnamed bit-field.
            let mark = self.mark();
            let base = self.tu.decl(decl).ty;
            let node = self.tu.new_decl_node(mark, base);
            self.tu.decl_mut(decl).nodes.push(node);
            node
        };

        if self.cur_kind() == TokenKind::Colon {
            self.advance();
            let width = self.oper_expression(None)?;
            self.tu.decl_node_mut(node).init = Some(width);
        }
        Ok(())
    }

    fn enumerator_list(&mut self, ty: TypeId) -> PRes<()> {
        self.enumerator(ty)?;
        while self.cur_kind() == TokenKind::Comma {
            self.advance();
            match self.enumerator(ty) {
                Ok(()) => {}
                Err(PErr::Backtrack) => break, // trailing comma
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn enumerator(&mut self, ty: TypeId) -> PRes<()> {
        if self.cur_kind() != TokenKind::Id {
            return Err(PErr::Backtrack);
        }
        let mark = self.mark();
        let name = Rc::clone(self.cur().id_name().expect("checked Id"));
        let base = match &self.tu.ty(ty).kind {
            TypeKind::Enum { base, .. } => *base,
            _ => unreachable!("enumerator of a non-enum"),
        };
        let node = self.tu.new_decl_node(mark, base);
        self.tu.decl_node_mut(node).id = Some(name);
        self.advance();

        if self.cur_kind() == TokenKind::Assign {
            self.advance();
            let val = self.oper_expression(None)?;
            self.tu.decl_node_mut(node).init = Some(val);
        }
        if let TypeKind::Enum { ids, .. } = &mut self.tu.ty_mut(ty).kind {
            ids.push(node);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Declarators
    // ------------------------------------------------------------------

    /// Parse one declarator into a fresh decl node on `decl`, and register
    /// typedef names the moment the declarator closes.
    pub(crate) fn declarator_base(&mut self, decl: DeclId) -> PRes<()> {
        match self.cur_kind() {
            TokenKind::Star | TokenKind::Id | TokenKind::LParen | TokenKind::LBrack => {}
            _ => return Err(PErr::Backtrack),
        }
        let mark = self.mark();
        let base = self.tu.decl(decl).ty;
        let node = self.tu.new_decl_node(mark, base);
        self.declarator(node)?;
        self.tu.decl_mut(decl).nodes.push(node);

        let is_typedef = match &self.tu.ty(self.tu.decl(decl).ty).kind {
            TypeKind::Mod { mods, .. } => mods.contains(TypeMods::TYPEDEF),
            _ => false,
        };
        if is_typedef {
            self.register_typedef(node)?;
        }
        Ok(())
    }

    /// Insert the declared name into the typedef namespace of the current
    /// scope, with the `typedef` modifier stripped from the stored type.
    fn register_typedef(&mut self, node: DeclNodeId) -> PRes<()> {
        let node_ty = self.tu.decl_node(node).ty;
        let name = match &self.tu.decl_node(node).id {
            Some(name) => Rc::clone(name),
            None => return Ok(()), // nothing to name; reported elsewhere
        };
        let mark = self.tu.decl_node(node).mark.clone();

        let base = match &self.tu.ty(node_ty).kind {
            TypeKind::Mod { mods, base, .. } => {
                if (*mods & !TypeMods::TYPEDEF).is_empty() {
                    (*base).unwrap_or(TY_INT)
                } else {
                    let stripped = *mods & !TypeMods::TYPEDEF;
                    let inner = *base;
                    self.tu.new_type(
                        mark.clone(),
                        TypeKind::Mod {
                            mods: stripped,
                            base: inner,
                            alignas_ty: None,
                            alignas_expr: None,
                            alignas_align: std::cell::Cell::new(0),
                        },
                    )
                }
            }
            _ => node_ty,
        };

        if let Err(existing) = self
            .tu
            .scopes
            .insert_typedef(self.scope, Rc::clone(&name), base)
        {
            // Redeclaring a typedef with a compatible type is accepted.
            if !typecheck::type_equal(self.tu, existing, base) {
                self.diag.error(
                    Some(&mark),
                    format!("conflicting types for '{}'", name),
                );
                return Err(PErr::Syntax);
            }
        }
        Ok(())
    }

    fn declarator(&mut self, node: DeclNodeId) -> PRes<Hole> {
        let mut lpatch = Hole::Node(node);
        while self.cur_kind() == TokenKind::Star {
            lpatch = self.pointer(lpatch)?;
        }
        self.direct_declarator(node)?;
        Ok(lpatch)
    }

    fn pointer(&mut self, lpatch: Hole) -> PRes<Hole> {
        let mark = self.mark();
        self.expect(TokenKind::Star)?;
        let mut mods = TypeMods::NONE;
        loop {
            match self.cur_kind() {
                TokenKind::Const => mods |= TypeMods::CONST,
                TokenKind::Volatile => mods |= TypeMods::VOLATILE,
                TokenKind::Restrict => {} // accepted, carries no meaning here
                _ => break,
            }
            self.advance();
        }
        let base = lpatch.get(self.tu);
        let ptr = self.tu.new_type(mark, TypeKind::Ptr { base, mods });
        lpatch.set(self.tu, ptr);
        Ok(Hole::PtrBase(ptr))
    }

    /// Direct declarator with the patch-hole technique: suffixes (`[]`,
    /// `()`) wrap the base from the outside in, and the finished suffix
    /// chain is plugged into the innermost hole of a parenthesized
    /// declarator, so `int (*a[5])(void)` nests correctly.
    fn direct_declarator(&mut self, node: DeclNodeId) -> PRes<()> {
        let base = self.tu.decl_node(node).ty;
        let mut lpatch: Option<Hole> = None;

        match self.cur_kind() {
            TokenKind::LParen => {
                self.advance();
                let mut hole = self.declarator(node)?;
                self.expect(TokenKind::RParen)?;
                if self.keep_parens {
                    let mark = self.mark();
                    let inner = hole.get(self.tu);
                    let paren = self.tu.new_type(mark, TypeKind::Paren(inner));
                    hole.set(self.tu, paren);
                    hole = Hole::ParenBase(paren);
                }
                lpatch = Some(hole);
            }
            TokenKind::Id => {
                let name = Rc::clone(self.cur().id_name().expect("checked Id"));
                self.tu.decl_node_mut(node).id = Some(name);
                self.advance();
            }
            _ => {
                // Abstract declarator: no identifier.
            }
        }

        let mut suffix_root: Option<TypeId> = None;
        let mut inner: Option<Hole> = None;
        loop {
            match self.cur_kind() {
                TokenKind::LBrack => {
                    let mark = self.mark();
                    self.advance();
                    let len = if self.cur_kind() == TokenKind::RBrack {
                        self.advance();
                        None
                    } else {
                        let len = self.oper_expression(None)?;
                        self.expect(TokenKind::RBrack)?;
                        Some(len)
                    };
                    let wrapped = match inner {
                        None => base,
                        Some(h) => h.get(self.tu),
                    };
                    let arr = self.tu.new_type(
                        mark,
                        TypeKind::Arr {
                            base: wrapped,
                            len,
                            nelems: std::cell::Cell::new(None),
                        },
                    );
                    match inner {
                        None => suffix_root = Some(arr),
                        Some(h) => h.set(self.tu, arr),
                    }
                    inner = Some(Hole::ArrBase(arr));
                }
                TokenKind::LParen => {
                    let mark = self.mark();
                    self.advance();
                    let (params, varargs) = self.parameter_type_list()?;
                    self.expect(TokenKind::RParen)?;
                    let wrapped = match inner {
                        None => base,
                        Some(h) => h.get(self.tu),
                    };
                    let func = self.tu.new_type(
                        mark,
                        TypeKind::Func {
                            ret: wrapped,
                            params,
                            varargs,
                        },
                    );
                    match inner {
                        None => suffix_root = Some(func),
                        Some(h) => h.set(self.tu, func),
                    }
                    inner = Some(Hole::FuncRet(func));
                }
                _ => break,
            }
        }

        match (lpatch, suffix_root) {
            (None, Some(root)) => self.tu.decl_node_mut(node).ty = root,
            (Some(hole), Some(root)) => hole.set(self.tu, root),
            (None, None) | (Some(_), None) => {}
        }
        Ok(())
    }

    fn parameter_type_list(&mut self) -> PRes<(Vec<DeclId>, bool)> {
        let mut params = Vec::new();
        loop {
            match self.parameter_declaration() {
                Ok(decl) => params.push(decl),
                Err(PErr::Backtrack) => break,
                Err(e) => return Err(e),
            }
            if self.cur_kind() != TokenKind::RParen {
                self.expect(TokenKind::Comma)?;
                if self.cur_kind() == TokenKind::RParen {
                    return Err(self.syntax_error("expected parameter after ','"));
                }
            }
        }
        let varargs = if self.cur_kind() == TokenKind::Ellipsis {
            self.advance();
            true
        } else {
            false
        };
        Ok((params, varargs))
    }

    fn parameter_declaration(&mut self) -> PRes<DeclId> {
        let mark = self.mark();
        let ty = self.declaration_specifiers()?;
        let ty = match ty {
            Some(ty) => ty,
            None => return Err(PErr::Backtrack),
        };
        let decl = self.tu.new_decl(mark, ty);
        match self.declarator_base(decl) {
            Ok(()) | Err(PErr::Backtrack) => {} // declarators are optional
            Err(e) => return Err(e),
        }
        Ok(decl)
    }

    /// `(type-name)` for casts, sizeof and friends. With `match_parens`, the
    /// token after `(` decides type-vs-expression before anything is
    /// consumed.
    pub(crate) fn type_name(&mut self, match_parens: bool) -> PRes<DeclId> {
        if match_parens {
            match self.next_kind() {
                TokenKind::Id => {
                    let is_typedef = self
                        .next()
                        .id_name()
                        .map(|n| self.tu.scopes.lookup_typedef(self.scope, n).is_some())
                        .unwrap_or(false);
                    if !is_typedef {
                        return Err(PErr::Backtrack);
                    }
                }
                k if is_type_spec_no_id(k) || is_type_qualifier(k) => {}
                _ => return Err(PErr::Backtrack),
            }
            self.expect(TokenKind::LParen)?;
        }

        let mark = self.mark();
        let base = match self.specifier_qualifiers(false)? {
            Some(base) => base,
            None => return Err(PErr::Backtrack),
        };
        let decl = self.tu.new_decl(mark, base);
        match self.declarator_base(decl) {
            Ok(()) | Err(PErr::Backtrack) => {}
            Err(e) => return Err(e),
        }
        if match_parens {
            self.expect(TokenKind::RParen)?;
        }
        Ok(decl)
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    /// A full declaration. With `partial`, the first declarator of `decl`
    /// has already been parsed by the caller.
    pub(crate) fn declaration(&mut self, decl: Option<DeclId>, partial: bool) -> PRes<DeclId> {
        let decl = match decl {
            Some(d) => d,
            None => {
                let mark = self.mark();
                let ty = match self.declaration_specifiers()? {
                    Some(ty) => ty,
                    None => return Err(PErr::Backtrack),
                };
                self.tu.new_decl(mark, ty)
            }
        };

        match self.init_declarator(decl, partial) {
            Ok(()) => {}
            Err(PErr::Backtrack) => return Ok(decl), // no init declarators
            Err(e) => return Err(e),
        }
        while self.cur_kind() == TokenKind::Comma {
            self.advance();
            match self.init_declarator(decl, false) {
                Ok(()) => {}
                Err(PErr::Backtrack) => {
                    return Err(self.syntax_error("expected declarator after ','"))
                }
                Err(e) => return Err(e),
            }
        }
        Ok(decl)
    }

    fn init_declarator(&mut self, decl: DeclId, partial: bool) -> PRes<()> {
        if !partial {
            self.declarator_base(decl)?;
        }
        let node = match self.tu.decl(decl).nodes.last() {
            Some(&n) => n,
            None => return Ok(()),
        };

        let is_typedef = match &self.tu.ty(self.tu.decl(decl).ty).kind {
            TypeKind::Mod { mods, .. } => mods.contains(TypeMods::TYPEDEF),
            _ => false,
        };
        if self.cur_kind() == TokenKind::Assign {
            if is_typedef {
                let name = self
                    .tu
                    .decl_node(node)
                    .id
                    .as_deref()
                    .unwrap_or("")
                    .to_string();
                return Err(self.syntax_error(format!("typedef '{}' is initialized", name)));
            }
            self.advance();
            let init = self.initializer()?;
            self.tu.decl_node_mut(node).init = Some(init);
        }
        Ok(())
    }
}

fn is_decl_start_token(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Star | TokenKind::Id | TokenKind::LParen | TokenKind::LBrack
    )
}
