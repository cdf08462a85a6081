//! Semantic analyzer.
//!
//! A recursive walk over the parsed translation unit that annotates every
//! expression with its type, computes layout for aggregates, canonicalizes
//! initializer lists, folds required constant expressions, and resolves
//! `break`/`continue`/`case`/`goto` back-references. A failed check reports
//! through the diagnostic context and the walk continues into sibling
//! subtrees, so one pass surfaces as many errors as possible.

pub mod const_eval;

#[cfg(test)]
mod tests;

use std::rc::Rc;

use crate::ast::layout;
use crate::ast::{
    compound_members, init_list, DeclId, DeclNodeId, ExprId, ExprKind, GDeclId, GDeclKind, Member,
    Oper, StmtId, StmtKind, TransUnit, TypeId, TypeKind, TypeMods, TY_BOOL, TY_INT, TY_SIZE_T,
    TY_VOID,
};
use crate::diag::DiagCtx;
use crate::mark::Mark;
use crate::type_table::{OrdEntry, OrdKind, ScopeId};

/// Type-check a whole translation unit. False when any check failed; the
/// unit must then not be handed to later stages.
pub fn check(tu: &mut TransUnit, diag: &DiagCtx) -> bool {
    let scope = tu.root_scope;
    let mut tcs = TypeChecker {
        tu,
        diag: diag.clone(),
        scope,
        func: None,
        last_switch: None,
        last_loop: None,
        last_break: None,
    };
    let gdecls = tcs.tu.gdecl_order.clone();
    let mut ok = true;
    for gdecl in gdecls {
        ok &= tcs.check_gdecl(gdecl);
    }
    ok
}

/// Structural type equivalence: typedefs and parens are stripped, modifiers
/// that do not affect identity (`extern`, `typedef`, `inline`) are masked
/// off, and compound types are equal only as the same node.
pub fn type_equal(tu: &TransUnit, t1: TypeId, t2: TypeId) -> bool {
    let ignored = TypeMods::EXTERN | TypeMods::TYPEDEF | TypeMods::INLINE;
    let strip = |mut t: TypeId| {
        t = tu.untypedef(t);
        loop {
            match &tu.ty(t).kind {
                TypeKind::Mod {
                    mods,
                    base: Some(base),
                    ..
                } if (*mods & !ignored).is_empty() => {
                    t = tu.untypedef(*base);
                }
                _ => return t,
            }
        }
    };
    let t1 = strip(t1);
    let t2 = strip(t2);

    if t1 == t2 {
        // Shared singletons (and identical nodes) compare by id.
        return true;
    }

    match (&tu.ty(t1).kind, &tu.ty(t2).kind) {
        (TypeKind::Mod { mods: m1, base: b1, .. }, TypeKind::Mod { mods: m2, base: b2, .. }) => {
            (*m1 & !ignored) == (*m2 & !ignored)
                && type_equal(
                    tu,
                    (*b1).unwrap_or(TY_INT),
                    (*b2).unwrap_or(TY_INT),
                )
        }
        (
            TypeKind::Func {
                ret: r1,
                params: p1,
                ..
            },
            TypeKind::Func {
                ret: r2,
                params: p2,
                ..
            },
        ) => {
            if !type_equal(tu, *r1, *r2) || p1.len() != p2.len() {
                return false;
            }
            p1.iter()
                .zip(p2.iter())
                .all(|(&d1, &d2)| type_equal(tu, tu.decl_type(d1), tu.decl_type(d2)))
        }
        (
            TypeKind::Arr {
                base: b1, len: l1, ..
            },
            TypeKind::Arr {
                base: b2, len: l2, ..
            },
        ) => {
            if !type_equal(tu, *b1, *b2) {
                return false;
            }
            // An array of unknown length is compatible with any length.
            match (l1, l2) {
                (Some(l1), Some(l2)) => {
                    match (
                        const_eval::eval(tu, None, *l1),
                        const_eval::eval(tu, None, *l2),
                    ) {
                        (Some(a), Some(b)) => a == b,
                        _ => false,
                    }
                }
                _ => true,
            }
        }
        (
            TypeKind::Ptr { base: b1, mods: m1 },
            TypeKind::Ptr { base: b2, mods: m2 },
        ) => m1 == m2 && type_equal(tu, *b1, *b2),
        _ => false,
    }
}

/// Context a declaration is checked in; it decides what the optional
/// declarator expression means and whether names enter the scope.
#[derive(Clone, Copy, PartialEq, Eq)]
enum DeclCtx {
    /// Ordinary declaration: names are inserted, the expression is an
    /// initializer.
    Normal,
    /// Struct/union member: the expression is a bit-field width.
    Member,
    /// Enumerator: the expression is the constant value.
    Enum,
    /// Parameter of a function declaration (not a definition): checked but
    /// not inserted anywhere.
    ParamDecl,
}

struct TypeChecker<'a> {
    tu: &'a mut TransUnit,
    diag: DiagCtx,
    scope: ScopeId,
    func: Option<GDeclId>,
    last_switch: Option<StmtId>,
    last_loop: Option<StmtId>,
    last_break: Option<StmtId>,
}

impl<'a> TypeChecker<'a> {
    fn emark(&self, expr: ExprId) -> Mark {
        self.tu.expr(expr).mark.clone()
    }

    fn etype(&self, expr: ExprId) -> Option<TypeId> {
        self.tu.expr(expr).etype.get()
    }

    fn set_etype(&self, expr: ExprId, ty: TypeId) {
        self.tu.expr(expr).etype.set(Some(ty));
    }

    fn compound_incomplete(&self, ty: TypeId) -> bool {
        match &self.tu.ty(ty).kind {
            TypeKind::Struct(data) | TypeKind::Union(data) => data.size.get().is_none(),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Global declarations
    // ------------------------------------------------------------------

    fn check_gdecl(&mut self, gdecl: GDeclId) -> bool {
        let decl = self.tu.gdecl(gdecl).decl;
        match &self.tu.gdecl(gdecl).kind {
            GDeclKind::FnDef { body, .. } => {
                let body = *body;
                debug_assert!(self.func.is_none(), "no nested functions in C");
                self.func = Some(gdecl);
                let mut ok = self.check_decl(decl, DeclCtx::Normal);
                ok &= self.check_stmt(body);
                ok &= self.resolve_gotos(gdecl);
                self.func = None;
                ok
            }
            GDeclKind::Decl | GDeclKind::Nop => self.check_decl(decl, DeclCtx::Normal),
        }
    }

    fn resolve_gotos(&mut self, gdecl: GDeclId) -> bool {
        let (gotos, labels) = match &self.tu.gdecl(gdecl).kind {
            GDeclKind::FnDef { gotos, labels, .. } => (gotos.clone(), labels.clone()),
            _ => return true,
        };
        let mut ok = true;
        for goto in gotos {
            let name = match &self.tu.stmt(goto).kind {
                StmtKind::Goto { label } => Rc::clone(label),
                _ => continue,
            };
            if !labels.contains_key(&name) {
                let mark = self.tu.stmt(goto).mark.clone();
                self.diag
                    .error(Some(&mark), format!("label '{}' used but not defined", name));
                ok = false;
            }
        }
        ok
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn check_decl(&mut self, decl: DeclId, ctx: DeclCtx) -> bool {
        let base_ty = self.tu.decl(decl).ty;
        let mut ok = self.check_type(base_ty);

        if let TypeKind::Mod { mods, .. } = &self.tu.ty(base_ty).kind {
            if mods.contains(TypeMods::TYPEDEF) {
                // The declarators introduced typedef names during parsing;
                // there is nothing further to declare.
                return ok;
            }
        }
        let nodes = self.tu.decl(decl).nodes.clone();
        for node in nodes {
            ok &= self.check_decl_node(node, ctx);
        }
        ok
    }

    fn check_decl_node(&mut self, node: DeclNodeId, ctx: DeclCtx) -> bool {
        let node_ty_raw = self.tu.decl_node(node).ty;
        let mut ok = self.check_type(node_ty_raw);
        let mark = self.tu.decl_node(node).mark.clone();
        let node_ty = self.tu.untypedef(node_ty_raw);
        let unmod = self.tu.unmod(node_ty_raw);
        let name = self.tu.decl_node(node).id.clone();

        let is_extern = self.tu.has_mod(node_ty, TypeMods::EXTERN);
        if self.tu.ty(unmod).kind.is_compound() && self.compound_incomplete(unmod) && !is_extern {
            self.diag.error(
                Some(&mark),
                format!(
                    "storage size of '{}' isn't known",
                    name.as_deref().unwrap_or("<anonymous>")
                ),
            );
            return false;
        }

        if matches!(self.tu.ty(unmod).kind, TypeKind::Void) {
            self.diag.error(
                Some(&mark),
                format!(
                    "variable or field '{}' declared void",
                    name.as_deref().unwrap_or("<anonymous>")
                ),
            );
            return false;
        }

        if ctx == DeclCtx::Normal {
            if let Some(name) = &name {
                ok &= self.declare_variable(node, node_ty, name, &mark);
            }
        }

        let init = self.tu.decl_node(node).init;
        if let Some(init) = init {
            match ctx {
                DeclCtx::Normal => {
                    if !self.check_expr(init, false) {
                        return false;
                    }
                    match &self.tu.expr(init).kind {
                        ExprKind::InitList { .. } => {
                            ok &= self.check_init_list(node_ty, init);
                            // An array without a length takes its element
                            // count from the initializer.
                            if let TypeKind::Arr {
                                len: None, nelems, ..
                            } = &self.tu.ty(node_ty).kind
                            {
                                if let ExprKind::InitList { exprs } = &self.tu.expr(init).kind {
                                    nelems.set(Some(exprs.len()));
                                }
                            }
                        }
                        _ => {
                            if let Some(from) = self.etype(init) {
                                ok &= self.check_assignable(&mark, node_ty, from, true);
                            }
                        }
                    }
                }
                DeclCtx::Member | DeclCtx::Enum => {
                    // Bit-field width or enumerator value.
                    if !self.check_expr(init, true) {
                        return false;
                    }
                    let ety = self.etype(init).unwrap_or(TY_INT);
                    let unmod_e = self.tu.unmod(ety);
                    if !self.tu.ty(unmod_e).kind.is_integral()
                        && !matches!(self.tu.ty(unmod_e).kind, TypeKind::Enum { .. })
                    {
                        self.diag.error(
                            Some(&mark),
                            format!(
                                "bit-field '{}' width not an integer constant",
                                name.as_deref().unwrap_or("<anonymous>")
                            ),
                        );
                        return false;
                    }
                    if ctx == DeclCtx::Member {
                        match const_eval::eval(self.tu, Some(self.scope), init) {
                            Some(w) if w >= 0 => {
                                self.tu.decl_node(node).bit_width.set(Some(w as u32))
                            }
                            Some(_) => {
                                self.diag.error(
                                    Some(&mark),
                                    format!(
                                        "negative width in bit-field '{}'",
                                        name.as_deref().unwrap_or("<anonymous>")
                                    ),
                                );
                                return false;
                            }
                            None => {
                                self.diag.error(
                                    Some(&mark),
                                    "bit-field width is not a constant expression",
                                );
                                return false;
                            }
                        }
                    }
                }
                DeclCtx::ParamDecl => {}
            }
        }
        ok
    }

    /// Put a variable into the current scope, diagnosing redefinitions. A
    /// declaration (extern variable, or a function prototype other than the
    /// one being defined) may repeat; a definition may not.
    fn declare_variable(
        &mut self,
        node: DeclNodeId,
        node_ty: TypeId,
        name: &Rc<str>,
        mark: &Mark,
    ) -> bool {
        let mut type_base = node_ty;
        loop {
            match &self.tu.ty(type_base).kind {
                TypeKind::Ptr { base, .. } => type_base = self.tu.untypedef(*base),
                TypeKind::Arr { base, .. } => type_base = self.tu.untypedef(*base),
                _ => break,
            }
        }
        let base_extern = matches!(
            &self.tu.ty(type_base).kind,
            TypeKind::Mod { mods, .. } if mods.contains(TypeMods::EXTERN)
        );
        let is_fn_decl = matches!(self.tu.ty(node_ty).kind, TypeKind::Func { .. }) && {
            match self.func {
                None => true,
                Some(func) => {
                    let fn_decl = self.tu.gdecl(func).decl;
                    self.tu.decl(fn_decl).nodes.first() != Some(&node)
                }
            }
        };
        let is_decl = base_extern || is_fn_decl;

        let mut entry = OrdEntry::var(node_ty);
        entry.defined = !is_decl;
        match self
            .tu
            .scopes
            .insert_ord(self.scope, Rc::clone(name), entry)
        {
            Ok(()) => true,
            Err(()) => {
                let (_, existing) = self
                    .tu
                    .scopes
                    .lookup_ord(self.scope, name)
                    .expect("duplicate entry exists");
                // Compare against the type without extern when the first
                // declaration carried it.
                let cmp_type = match &self.tu.ty(existing.ty).kind {
                    TypeKind::Mod {
                        mods,
                        base: Some(base),
                        ..
                    } if *mods == TypeMods::EXTERN => *base,
                    _ => existing.ty,
                };
                if existing.kind != OrdKind::Var
                    || (existing.defined && !is_decl)
                    || !type_equal(self.tu, cmp_type, node_ty)
                {
                    self.diag
                        .error(Some(mark), format!("redefinition of '{}'", name));
                    return false;
                }
                true
            }
        }
    }

    // ------------------------------------------------------------------
    // Initializer lists
    // ------------------------------------------------------------------

    fn check_init_list(&mut self, ty: TypeId, expr: ExprId) -> bool {
        let ty = self.tu.unmod(ty);
        self.set_etype(expr, ty);
        let mut ok = true;

        match &self.tu.ty(ty).kind {
            TypeKind::Union(_) => {
                ok &= init_list::canonicalize(self.tu, &self.diag, ty, expr);
                let head = match &self.tu.expr(expr).kind {
                    ExprKind::InitList { exprs } => exprs.first().copied(),
                    _ => None,
                };
                let head = match head {
                    Some(h) => h,
                    None => return ok,
                };
                let dest = match init_list::union_member_type(self.tu, ty, head) {
                    Some(t) => t,
                    None => return ok,
                };
                let (head, dest) = match &self.tu.expr(head).kind {
                    ExprKind::DesigInit { val, .. } => (*val, dest),
                    _ => (head, dest),
                };
                if matches!(self.tu.expr(head).kind, ExprKind::InitList { .. }) {
                    ok &= self.check_init_list(dest, head);
                } else {
                    if !self.check_expr(head, false) {
                        return false;
                    }
                    if let Some(from) = self.etype(head) {
                        let mark = self.emark(head);
                        ok &= self.check_assignable(&mark, dest, from, true);
                    }
                }
                ok
            }
            TypeKind::Struct(_) => {
                ok &= init_list::canonicalize(self.tu, &self.diag, ty, expr);
                let exprs = match &self.tu.expr(expr).kind {
                    ExprKind::InitList { exprs } => exprs.clone(),
                    _ => return ok,
                };
                let members: Vec<Member> = compound_members(self.tu, ty)
                    .into_iter()
                    .filter(|m| m.name(self.tu).is_some() || m.is_anon_compound(self.tu))
                    .collect();
                for (i, &item) in exprs.iter().enumerate() {
                    let member = match members.get(i) {
                        Some(m) => *m,
                        None => break,
                    };
                    if matches!(self.tu.expr(item).kind, ExprKind::Void) {
                        continue;
                    }
                    let mty = member.ty(self.tu);
                    if member.is_anon_compound(self.tu)
                        || matches!(self.tu.expr(item).kind, ExprKind::InitList { .. })
                    {
                        if matches!(self.tu.expr(item).kind, ExprKind::InitList { .. }) {
                            ok &= self.check_init_list(mty, item);
                        } else {
                            ok &= self.check_expr(item, false);
                        }
                    } else {
                        if !self.check_expr(item, false) {
                            ok = false;
                            continue;
                        }
                        if let Some(from) = self.etype(item) {
                            let mark = self.emark(item);
                            ok &= self.check_assignable(&mark, mty, from, true);
                        }
                    }
                }
                ok
            }
            TypeKind::Arr { base, len, .. } => {
                let base = *base;
                let decl_len = match len {
                    Some(len) => {
                        let len = *len;
                        if !self.check_expr(len, true) {
                            return false;
                        }
                        const_eval::eval(self.tu, Some(self.scope), len).unwrap_or(-1)
                    }
                    None => -1,
                };
                let exprs = match &self.tu.expr(expr).kind {
                    ExprKind::InitList { exprs } => exprs.clone(),
                    _ => return ok,
                };
                for &item in &exprs {
                    if matches!(self.tu.expr(item).kind, ExprKind::InitList { .. }) {
                        ok &= self.check_init_list(base, item);
                    } else {
                        if !self.check_expr(item, false) {
                            ok = false;
                            continue;
                        }
                        if let Some(from) = self.etype(item) {
                            let mark = self.emark(item);
                            ok &= self.check_assignable(&mark, base, from, true);
                        }
                    }
                }
                if decl_len >= 0 && (decl_len as usize) < exprs.len() {
                    let mark = self.emark(expr);
                    self.diag
                        .warn(Some(&mark), "excess elements in array initializer");
                }
                ok
            }
            _ => {
                // Scalar wrapped in braces.
                let exprs = match &self.tu.expr(expr).kind {
                    ExprKind::InitList { exprs } => exprs.clone(),
                    _ => return ok,
                };
                let mark = self.emark(expr);
                let first = match exprs.first() {
                    Some(&f) => f,
                    None => {
                        self.diag.error(Some(&mark), "empty scalar initializer");
                        return false;
                    }
                };
                if exprs.len() > 1 {
                    self.diag
                        .warn(Some(&mark), "excess elements in scalar initializer");
                }
                ok &= self.check_expr(first, false);
                if let Some(from) = self.etype(first) {
                    ok &= self.check_assignable(&mark, ty, from, true);
                }
                ok
            }
        }
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    fn check_type(&mut self, ty: TypeId) -> bool {
        let mut ok = true;
        match &self.tu.ty(ty).kind {
            TypeKind::Void
            | TypeKind::Bool
            | TypeKind::Char
            | TypeKind::Short
            | TypeKind::Int
            | TypeKind::Long
            | TypeKind::LongLong
            | TypeKind::Float
            | TypeKind::Double
            | TypeKind::LongDouble
            | TypeKind::VaList => true,

            TypeKind::Struct(data) | TypeKind::Union(data) => {
                if data.size.get().is_some() {
                    // Completed and therefore already checked.
                    return true;
                }
                let decls = data.decls.clone();
                for decl in decls {
                    ok &= self.check_decl(decl, DeclCtx::Member);
                }
                if !ok {
                    return false;
                }
                ok &= self.check_duplicate_members(ty);
                // Taking the size marks the type complete.
                layout::type_size(self.tu, ty);
                ok
            }

            TypeKind::Enum { base, ids, .. } => {
                let base = *base;
                let ids = ids.clone();
                ok &= self.check_type(base);
                let mut next_val: i64 = 0;
                for node in ids {
                    ok &= self.check_decl_node(node, DeclCtx::Enum);
                    let name = match &self.tu.decl_node(node).id {
                        Some(name) => Rc::clone(name),
                        None => continue,
                    };
                    let val = match self.tu.decl_node(node).init {
                        Some(expr) => {
                            match const_eval::eval(self.tu, Some(self.scope), expr) {
                                Some(v) => v,
                                None => {
                                    let mark = self.tu.decl_node(node).mark.clone();
                                    self.diag.error(
                                        Some(&mark),
                                        format!(
                                            "enumerator value for '{}' is not a constant",
                                            name
                                        ),
                                    );
                                    ok = false;
                                    next_val
                                }
                            }
                        }
                        None => next_val,
                    };
                    next_val = val + 1;
                    if self
                        .tu
                        .scopes
                        .insert_ord(self.scope, Rc::clone(&name), OrdEntry::enum_id(base, val))
                        .is_err()
                    {
                        let mark = self.tu.decl_node(node).mark.clone();
                        self.diag
                            .error(Some(&mark), format!("redefinition of '{}'", name));
                        ok = false;
                    }
                }
                ok
            }

            // Typedefs were checked where they were defined.
            TypeKind::Typedef { .. } => true,

            TypeKind::Mod { .. } => self.check_mod_type(ty),
            TypeKind::Paren(base) => {
                let base = *base;
                self.check_type(base)
            }
            TypeKind::Func { .. } => self.check_fn_type(ty),
            TypeKind::Arr { .. } => self.check_arr_type(ty),
            TypeKind::Ptr { base, .. } => {
                let base = *base;
                self.check_type(base)
            }
            TypeKind::StaticAssert { expr, msg } => {
                let expr = *expr;
                let msg = Rc::clone(msg);
                let mark = self.tu.ty(ty).mark.clone();
                if !self.check_expr(expr, true) {
                    return false;
                }
                match const_eval::eval(self.tu, Some(self.scope), expr) {
                    Some(0) => {
                        self.diag
                            .error(Some(&mark), format!("static assertion failed: \"{}\"", msg));
                        false
                    }
                    Some(_) => true,
                    None => {
                        self.diag.error(
                            Some(&mark),
                            "expression in static assertion is not constant",
                        );
                        false
                    }
                }
            }
        }
    }

    fn check_duplicate_members(&mut self, ty: TypeId) -> bool {
        let members = compound_members(self.tu, ty);
        let mut ok = true;
        for (i, member) in members.iter().enumerate() {
            let name = match member.name(self.tu) {
                Some(n) => Rc::clone(n),
                None => continue,
            };
            for other in &members[i + 1..] {
                let clash = match other.name(self.tu) {
                    Some(other_name) => **other_name == *name,
                    None => {
                        other.is_anon_compound(self.tu)
                            && layout::find_member(
                                self.tu,
                                self.tu.unmod(other.ty(self.tu)),
                                &name,
                            )
                            .is_some()
                    }
                };
                if clash {
                    let mark = match other.node {
                        Some(n) => self.tu.decl_node(n).mark.clone(),
                        None => self.tu.decl(other.decl).mark.clone(),
                    };
                    self.diag
                        .error(Some(&mark), format!("duplicate member '{}'", name));
                    ok = false;
                }
            }
        }
        ok
    }

    fn check_mod_type(&mut self, ty: TypeId) -> bool {
        let mut ok = true;
        // A modifier without a base type means int.
        let (mods, base, alignas_ty, alignas_expr) = match &self.tu.ty(ty).kind {
            TypeKind::Mod {
                mods,
                base,
                alignas_ty,
                alignas_expr,
                ..
            } => (*mods, *base, *alignas_ty, *alignas_expr),
            _ => unreachable!("checked by caller"),
        };
        let base = match base {
            Some(base) => base,
            None => {
                if let TypeKind::Mod { base, .. } = &mut self.tu.ty_mut(ty).kind {
                    *base = Some(TY_INT);
                }
                TY_INT
            }
        };
        ok &= self.check_type(base);

        let mark = self.tu.ty(ty).mark.clone();
        if mods.contains(TypeMods::SIGNED) && mods.contains(TypeMods::UNSIGNED) {
            self.diag.error(
                Some(&mark),
                "both 'signed' and 'unsigned' in declaration specifiers",
            );
            ok = false;
        }
        let storage = [
            TypeMods::AUTO,
            TypeMods::REGISTER,
            TypeMods::STATIC,
            TypeMods::EXTERN,
        ]
        .iter()
        .filter(|&&m| mods.contains(m))
        .count();
        if storage > 1 {
            self.diag.error(
                Some(&mark),
                "multiple storage classes in declaration specifiers",
            );
            ok = false;
        }

        if mods.contains(TypeMods::ALIGNAS) {
            let align = if let Some(decl) = alignas_ty {
                ok &= self.check_decl(decl, DeclCtx::ParamDecl);
                layout::type_align(self.tu, self.tu.decl_type(decl))
            } else if let Some(expr) = alignas_expr {
                if self.check_expr(expr, true) {
                    const_eval::eval(self.tu, Some(self.scope), expr)
                        .map(|v| v.max(0) as usize)
                        .unwrap_or(0)
                } else {
                    ok = false;
                    0
                }
            } else {
                0
            };
            if let TypeKind::Mod { alignas_align, .. } = &self.tu.ty(ty).kind {
                alignas_align.set(align);
            }
        }
        ok
    }

    fn check_fn_type(&mut self, ty: TypeId) -> bool {
        let (ret, params) = match &self.tu.ty(ty).kind {
            TypeKind::Func { ret, params, .. } => (*ret, params.clone()),
            _ => unreachable!("checked by caller"),
        };
        let mut ok = self.check_type(ret);

        // When this is the signature of the function being defined, its
        // parameters belong in the body's scope.
        let mut body_scope = None;
        if let Some(func) = self.func {
            let fn_decl = self.tu.gdecl(func).decl;
            if let Some(&first) = self.tu.decl(fn_decl).nodes.first() {
                if self.tu.decl_node(first).ty == ty {
                    if let GDeclKind::FnDef { body, .. } = &self.tu.gdecl(func).kind {
                        if let StmtKind::Compound { scope, .. } = &self.tu.stmt(*body).kind {
                            body_scope = Some(*scope);
                        }
                    }
                }
            }
        }

        // Reject duplicated parameter names.
        for (i, &decl) in params.iter().enumerate() {
            let node = self.tu.decl(decl).nodes.first().copied();
            let name = match node.and_then(|n| self.tu.decl_node(n).id.clone()) {
                Some(n) => n,
                None => continue,
            };
            for &other in &params[..i] {
                let other_name = self
                    .tu
                    .decl(other)
                    .nodes
                    .first()
                    .and_then(|&n| self.tu.decl_node(n).id.clone());
                if other_name.as_deref() == Some(&*name) {
                    let mark = self.tu.decl(decl).mark.clone();
                    let prev = self.tu.decl(other).mark.clone();
                    self.diag.error(
                        Some(&mark),
                        format!("redefinition of parameter '{}'", name),
                    );
                    self.diag
                        .note(Some(&prev), format!("previous definition of '{}' was here", name));
                    ok = false;
                }
            }
        }

        let saved = self.scope;
        let ctx = match body_scope {
            Some(scope) => {
                self.scope = scope;
                DeclCtx::Normal
            }
            None => DeclCtx::ParamDecl,
        };
        for &decl in &params {
            ok &= self.check_decl(decl, ctx);
        }
        self.scope = saved;
        ok
    }

    fn check_arr_type(&mut self, ty: TypeId) -> bool {
        let (base, len, has_count) = match &self.tu.ty(ty).kind {
            TypeKind::Arr { base, len, nelems } => (*base, *len, nelems.get().is_some()),
            _ => unreachable!("checked by caller"),
        };
        let mut ok = self.check_type(base);
        if let Some(len) = len {
            if !self.check_expr(len, true) {
                return false;
            }
            match const_eval::eval(self.tu, Some(self.scope), len) {
                Some(n) if n < 0 => {
                    let mark = self.emark(len);
                    self.diag.error(Some(&mark), "size of array is negative");
                    ok = false;
                }
                Some(n) => {
                    if let TypeKind::Arr { nelems, .. } = &self.tu.ty(ty).kind {
                        nelems.set(Some(n as usize));
                    }
                }
                None => {
                    let mark = self.emark(len);
                    self.diag
                        .error(Some(&mark), "array size is not a constant expression");
                    ok = false;
                }
            }
        } else if !has_count {
            // Length may be filled in later from an initializer.
        }
        ok
    }

    // ------------------------------------------------------------------
    // Assignability, operators, conversions
    // ------------------------------------------------------------------

    /// Whether an rvalue of `from` may initialize/assign an lvalue of `to`.
    /// With `report`, failures are diagnosed at `mark`.
    fn check_assignable(&mut self, mark: &Mark, to: TypeId, from: TypeId, report: bool) -> bool {
        let to = self.tu.untypedef(to);
        let from = self.tu.untypedef(from);
        let umod_to = self.tu.unmod(to);
        let umod_from = self.tu.unmod(from);

        if matches!(self.tu.ty(umod_to).kind, TypeKind::Void) {
            if report {
                self.diag.error(Some(mark), "invalid use of void expression");
            }
            return false;
        }
        if matches!(self.tu.ty(umod_from).kind, TypeKind::Void) {
            if report {
                self.diag
                    .error(Some(mark), "void value not ignored as it ought to be");
            }
            return false;
        }
        if type_equal(self.tu, umod_to, umod_from) {
            return true;
        }
        if self.tu.ty(umod_from).kind.is_compound() {
            if report {
                self.diag
                    .error(Some(mark), "incompatible types when assigning");
            }
            return false;
        }

        let from_numeric = self.tu.ty(umod_from).kind.is_numeric()
            || matches!(self.tu.ty(umod_from).kind, TypeKind::Enum { .. });
        let from_int = self.tu.ty(umod_from).kind.is_integral()
            || matches!(self.tu.ty(umod_from).kind, TypeKind::Enum { .. });
        let from_ptr = self.tu.ty(umod_from).kind.is_ptr_like();

        match &self.tu.ty(umod_to).kind {
            k if k.is_numeric() => {
                if from_numeric {
                    return true;
                }
                if from_ptr {
                    if report {
                        self.diag.warn(
                            Some(mark),
                            "initialization makes integer from pointer without a cast",
                        );
                    }
                    return true;
                }
            }
            TypeKind::Enum { .. } => {
                if from_numeric {
                    return true;
                }
            }
            TypeKind::Arr { base, .. } => {
                let base = *base;
                if let TypeKind::Ptr { base: fbase, .. } = &self.tu.ty(umod_from).kind {
                    let fbase = *fbase;
                    if self.check_assignable(mark, base, fbase, false) {
                        return true;
                    }
                }
                if report {
                    self.diag
                        .error(Some(mark), "assignment to expression with array type");
                }
                return false;
            }
            TypeKind::Ptr { base, .. } => {
                let to_base = *base;
                if from_int {
                    if report && !from_ptr {
                        self.diag.warn(
                            Some(mark),
                            "initialization makes pointer from integer without a cast",
                        );
                    }
                    return true;
                }
                // Any pointer converts to and from void *.
                if matches!(self.tu.ty(self.tu.unmod(to_base)).kind, TypeKind::Void) && from_ptr {
                    return true;
                }
                match &self.tu.ty(umod_from).kind {
                    TypeKind::Func { .. } => {
                        if type_equal(self.tu, self.tu.unmod(to_base), umod_from) {
                            return true;
                        }
                    }
                    TypeKind::Arr { base: fbase, .. } => {
                        let fbase = *fbase;
                        if self.check_assignable(mark, to_base, fbase, false) {
                            return true;
                        }
                    }
                    TypeKind::Ptr { base: fbase, .. } => {
                        let fbase = *fbase;
                        if matches!(self.tu.ty(self.tu.unmod(fbase)).kind, TypeKind::Void) {
                            return true;
                        }
                        if self.check_assignable(mark, to_base, fbase, false) {
                            return true;
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }

        if report {
            self.diag
                .error(Some(mark), "incompatible types when assigning");
        }
        false
    }

    fn check_binop(&mut self, mark: &Mark, op: Oper, t1: TypeId, t2: TypeId) -> bool {
        let umod1 = self.tu.unmod(t1);
        let umod2 = self.tu.unmod(t2);
        let enum1 = matches!(self.tu.ty(umod1).kind, TypeKind::Enum { .. });
        let enum2 = matches!(self.tu.ty(umod2).kind, TypeKind::Enum { .. });
        let num1 = self.tu.ty(umod1).kind.is_numeric() || enum1;
        let num2 = self.tu.ty(umod2).kind.is_numeric() || enum2;
        let int1 = self.tu.ty(umod1).kind.is_integral() || enum1;
        let int2 = self.tu.ty(umod2).kind.is_integral() || enum2;
        let ptr1 = self.tu.ty(umod1).kind.is_ptr_like();
        let ptr2 = self.tu.ty(umod2).kind.is_ptr_like();

        // Two integer operands work with every binary operator.
        if int1 && int2 {
            return true;
        }

        let allowed = match op {
            Oper::Times | Oper::Div => num1 && num2,
            Oper::Mod
            | Oper::LShift
            | Oper::RShift
            | Oper::BitAnd
            | Oper::BitXor
            | Oper::BitOr => false, // integer-only, checked above
            Oper::Minus => {
                if ptr1 && ptr2 {
                    let b1 = self.tu.unmod(self.tu.ptr_base(umod1));
                    let b2 = self.tu.unmod(self.tu.ptr_base(umod2));
                    if type_equal(self.tu, b1, b2) {
                        return true;
                    }
                }
                (num1 && num2) || (ptr1 && int2) || (int1 && ptr2)
            }
            Oper::Plus => (num1 && num2) || (ptr1 && int2) || (int1 && ptr2),
            Oper::Lt
            | Oper::Gt
            | Oper::Le
            | Oper::Ge
            | Oper::Eq
            | Oper::Ne
            | Oper::LogicAnd
            | Oper::LogicOr => {
                (num1 && num2) || (ptr1 && ptr2) || (ptr1 && int2) || (int1 && ptr2)
            }
            _ => false,
        };
        if !allowed {
            self.diag.error(
                Some(mark),
                format!("invalid operands to binary {}", op.symbol()),
            );
        }
        allowed
    }

    fn check_unaryop(&mut self, mark: &Mark, op: Oper, ty: TypeId) -> bool {
        let unmod = self.tu.unmod(ty);
        let kind = &self.tu.ty(unmod).kind;
        let numeric = kind.is_numeric();
        let int = kind.is_integral();
        let ptr = kind.is_ptr_like();
        let is_enum = matches!(kind, TypeKind::Enum { .. });

        let allowed = match op {
            Oper::PreInc | Oper::PostInc | Oper::PreDec | Oper::PostDec => numeric || ptr,
            Oper::Addr => true,
            Oper::Deref => ptr,
            Oper::UPlus | Oper::UMinus => numeric || is_enum,
            Oper::BitNot => int || is_enum,
            Oper::LogicNot => numeric || ptr || is_enum,
            _ => false,
        };
        if !allowed {
            self.diag.error(
                Some(mark),
                format!("invalid operand to unary {}", op.symbol()),
            );
        }
        allowed
    }

    /// The "higher" of two types under the usual conversions.
    fn type_max(&mut self, mark: &Mark, t1: TypeId, t2: TypeId) -> Option<TypeId> {
        let t1 = self.tu.untypedef(t1);
        let t2 = self.tu.untypedef(t2);
        if type_equal(self.tu, t1, t2) {
            return Some(t1);
        }
        let umod1 = self.tu.unmod(t1);
        let umod2 = self.tu.unmod(t2);

        let num1 = self.tu.ty(umod1).kind.is_numeric();
        let num2 = self.tu.ty(umod2).kind.is_numeric();
        let int2 = self.tu.ty(umod2).kind.is_integral()
            || matches!(self.tu.ty(umod2).kind, TypeKind::Enum { .. });
        let ptr2 = self.tu.ty(umod2).kind.is_ptr_like();

        if num1 && num2 {
            return Some(if self.tu.ty(umod1).kind.rank() >= self.tu.ty(umod2).kind.rank() {
                t1
            } else {
                t2
            });
        }

        match &self.tu.ty(umod1).kind {
            k if k.is_numeric() => {
                if matches!(self.tu.ty(umod2).kind, TypeKind::Enum { .. }) {
                    return Some(t1);
                }
                if ptr2 {
                    return Some(t2);
                }
            }
            TypeKind::Enum { .. } => {
                if matches!(self.tu.ty(umod2).kind, TypeKind::Enum { .. }) {
                    return Some(t1);
                }
                if int2 || num2 {
                    return Some(t2);
                }
            }
            TypeKind::Func { .. } | TypeKind::Arr { .. } | TypeKind::Ptr { .. } => {
                if int2 {
                    return Some(t1);
                }
                if let TypeKind::Ptr { base, .. } = &self.tu.ty(umod2).kind {
                    if matches!(self.tu.ty(self.tu.unmod(*base)).kind, TypeKind::Void) {
                        return Some(t1);
                    }
                }
                if ptr2 {
                    if let TypeKind::Ptr { base, .. } = &self.tu.ty(umod1).kind {
                        if matches!(self.tu.ty(self.tu.unmod(*base)).kind, TypeKind::Void) {
                            return Some(t2);
                        }
                    }
                    let b1 = self.tu.unmod(self.tu.ptr_base(umod1));
                    let b2 = self.tu.unmod(self.tu.ptr_base(umod2));
                    if type_equal(self.tu, b1, b2) {
                        return Some(t1);
                    }
                }
            }
            _ => {}
        }

        self.diag.error(Some(mark), "incompatible types");
        None
    }

    fn check_cast(&mut self, mark: &Mark, to: TypeId, from: TypeId) -> bool {
        let to = self.tu.untypedef(to);
        let from = self.tu.untypedef(from);
        if type_equal(self.tu, to, from) {
            return true;
        }
        // Anything casts to void.
        if matches!(self.tu.ty(self.tu.unmod(to)).kind, TypeKind::Void) {
            return true;
        }
        if self.tu.ty(self.tu.unmod(to)).kind.is_compound() {
            self.diag
                .error(Some(mark), "conversion to non-scalar type requested");
            return false;
        }
        if self.tu.ty(self.tu.unmod(from)).kind.is_compound() {
            self.diag
                .error(Some(mark), "conversion from non-scalar type requested");
            return false;
        }
        true
    }

    fn type_is_integral(&mut self, mark: &Mark, ty: TypeId) -> bool {
        let unmod = self.tu.unmod(ty);
        let ok = self.tu.ty(unmod).kind.is_integral()
            || matches!(self.tu.ty(unmod).kind, TypeKind::Enum { .. });
        if !ok {
            self.diag.error(Some(mark), "integral type required");
        }
        ok
    }

    /// Usable as a condition: numeric, enum, pointer, array or function.
    fn type_is_conditional(&mut self, mark: &Mark, ty: TypeId) -> bool {
        let unmod = self.tu.unmod(ty);
        let kind = &self.tu.ty(unmod).kind;
        let ok = kind.is_numeric()
            || kind.is_ptr_like()
            || matches!(kind, TypeKind::Enum { .. });
        if !ok {
            self.diag.error(Some(mark), "conditional type required");
        }
        ok
    }

    fn check_expr_conditional(&mut self, expr: ExprId) -> bool {
        if !self.check_expr(expr, false) {
            return false;
        }
        let ty = match self.etype(expr) {
            Some(t) => t,
            None => return false,
        };
        let mark = self.emark(expr);
        self.type_is_conditional(&mark, ty)
    }

    fn check_expr_integral(&mut self, expr: ExprId) -> bool {
        if !self.check_expr(expr, false) {
            return false;
        }
        let ty = match self.etype(expr) {
            Some(t) => t,
            None => return false,
        };
        let mark = self.emark(expr);
        self.type_is_integral(&mark, ty)
    }

    fn check_expr_va_list(&mut self, expr: ExprId) -> bool {
        if !self.check_expr(expr, false) {
            return false;
        }
        let ty = match self.etype(expr) {
            Some(t) => t,
            None => return false,
        };
        if !matches!(self.tu.ty(self.tu.unmod(ty)).kind, TypeKind::VaList) {
            let mark = self.emark(expr);
            self.diag.error(Some(&mark), "expected __builtin_va_list");
            return false;
        }
        true
    }

    /// Lvalue classification.
    fn check_lvalue(&mut self, expr: ExprId) -> bool {
        let ok = match &self.tu.expr(expr).kind {
            ExprKind::Paren(base) => {
                let base = *base;
                return self.check_lvalue(base);
            }
            ExprKind::MemAcc { .. } | ExprKind::ArrIdx { .. } | ExprKind::Var(_) => true,
            ExprKind::Unary { op, expr: inner } => match op {
                Oper::PreInc | Oper::PostInc | Oper::PreDec | Oper::PostDec => {
                    let inner = *inner;
                    return self.check_lvalue(inner);
                }
                Oper::Deref => true,
                _ => false,
            },
            ExprKind::Cmpd { exprs } => match exprs.last() {
                Some(&last) => return self.check_lvalue(last),
                None => false,
            },
            _ => false,
        };
        if !ok {
            let mark = self.emark(expr);
            self.diag
                .error(Some(&mark), "lvalue required as left operand of assignment");
        }
        ok
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn check_stmt(&mut self, stmt: StmtId) -> bool {
        let mark = self.tu.stmt(stmt).mark.clone();
        let mut ok = true;
        match &self.tu.stmt(stmt).kind {
            StmtKind::Nop => true,
            StmtKind::Decl(decl) => {
                let decl = *decl;
                self.check_decl(decl, DeclCtx::Normal)
            }
            StmtKind::Label { name, stmt: inner } => {
                let name = Rc::clone(name);
                let inner = *inner;
                ok &= self.check_stmt(inner);
                let func = self.func.expect("label outside of a function");
                if let GDeclKind::FnDef { labels, .. } = &mut self.tu.gdecl_mut(func).kind {
                    if labels.insert(Rc::clone(&name), stmt).is_some() {
                        self.diag
                            .error(Some(&mark), format!("duplicate label '{}'", name));
                        ok = false;
                    }
                }
                ok
            }
            StmtKind::Case { val, stmt: inner } => {
                let val = *val;
                let inner = *inner;
                match self.last_switch {
                    None => {
                        self.diag
                            .error(Some(&mark), "'case' label not within a switch statement");
                        ok = false;
                    }
                    Some(switch) => {
                        if let StmtKind::Switch { cases, .. } =
                            &mut self.tu.stmt_mut(switch).kind
                        {
                            cases.push(stmt);
                        }
                    }
                }
                ok &= self.check_expr(val, true);
                ok &= self.check_expr_integral(val);
                if const_eval::eval(self.tu, Some(self.scope), val).is_none() {
                    let vmark = self.emark(val);
                    self.diag
                        .error(Some(&vmark), "case label does not reduce to an integer constant");
                    ok = false;
                }
                ok &= self.check_stmt(inner);
                ok
            }
            StmtKind::Default { stmt: inner } => {
                let inner = *inner;
                match self.last_switch {
                    None => {
                        self.diag
                            .error(Some(&mark), "'default' label not within a switch statement");
                        ok = false;
                    }
                    Some(switch) => {
                        if let StmtKind::Switch { default, .. } =
                            &mut self.tu.stmt_mut(switch).kind
                        {
                            *default = Some(stmt);
                        }
                    }
                }
                ok &= self.check_stmt(inner);
                ok
            }
            StmtKind::If { cond, then, els } => {
                let (cond, then, els) = (*cond, *then, *els);
                ok &= self.check_expr_conditional(cond);
                ok &= self.check_stmt(then);
                if let Some(els) = els {
                    ok &= self.check_stmt(els);
                }
                ok
            }
            StmtKind::Switch { cond, body, .. } => {
                let (cond, body) = (*cond, *body);
                ok &= self.check_expr_integral(cond);
                let save_switch = self.last_switch.replace(stmt);
                let save_break = self.last_break.replace(stmt);
                ok &= self.check_stmt(body);
                self.last_switch = save_switch;
                self.last_break = save_break;
                ok
            }
            StmtKind::Do { body, cond } => {
                let (body, cond) = (*body, *cond);
                let save_loop = self.last_loop.replace(stmt);
                let save_break = self.last_break.replace(stmt);
                ok &= self.check_stmt(body);
                ok &= self.check_expr_conditional(cond);
                self.last_loop = save_loop;
                self.last_break = save_break;
                ok
            }
            StmtKind::While { cond, body } => {
                let (cond, body) = (*cond, *body);
                ok &= self.check_expr_conditional(cond);
                let save_loop = self.last_loop.replace(stmt);
                let save_break = self.last_break.replace(stmt);
                ok &= self.check_stmt(body);
                self.last_loop = save_loop;
                self.last_break = save_break;
                ok
            }
            StmtKind::For {
                init_decl,
                scope,
                init_expr,
                cond,
                step,
                body,
            } => {
                let (init_decl, scope, init_expr, cond, step, body) =
                    (*init_decl, *scope, *init_expr, *cond, *step, *body);
                let save_loop = self.last_loop.replace(stmt);
                let save_break = self.last_break.replace(stmt);
                let save_scope = self.scope;
                if let Some(scope) = scope {
                    self.scope = scope;
                }
                if let Some(expr) = init_expr {
                    ok &= self.check_expr(expr, false);
                }
                if let Some(decl) = init_decl {
                    ok &= self.check_decl(decl, DeclCtx::Normal);
                }
                if let Some(cond) = cond {
                    ok &= self.check_expr_conditional(cond);
                }
                if let Some(step) = step {
                    ok &= self.check_expr(step, false);
                }
                ok &= self.check_stmt(body);
                self.scope = save_scope;
                self.last_loop = save_loop;
                self.last_break = save_break;
                ok
            }
            StmtKind::Goto { .. } => {
                let func = self.func.expect("goto outside of a function");
                if let GDeclKind::FnDef { gotos, .. } = &mut self.tu.gdecl_mut(func).kind {
                    gotos.push(stmt);
                }
                true
            }
            StmtKind::Continue { parent } => {
                match self.last_loop {
                    None => {
                        self.diag
                            .error(Some(&mark), "continue statement not within a loop");
                        false
                    }
                    Some(looped) => {
                        parent.set(Some(looped));
                        true
                    }
                }
            }
            StmtKind::Break { parent } => {
                match self.last_break {
                    None => {
                        self.diag
                            .error(Some(&mark), "break statement not within loop or switch");
                        false
                    }
                    Some(target) => {
                        parent.set(Some(target));
                        true
                    }
                }
            }
            StmtKind::Return { expr, ret_ty } => {
                let expr = *expr;
                let func = self.func.expect("return outside of a function");
                let fn_decl = self.tu.gdecl(func).decl;
                let sig = self
                    .tu
                    .decl(fn_decl)
                    .nodes
                    .first()
                    .map(|&n| self.tu.decl_node(n).ty)
                    .unwrap_or(TY_INT);
                let ret = match &self.tu.ty(self.tu.untypedef(sig)).kind {
                    TypeKind::Func { ret, .. } => *ret,
                    _ => TY_INT,
                };
                ret_ty.set(Some(ret));
                let ret_void = matches!(self.tu.ty(self.tu.unmod(ret)).kind, TypeKind::Void);
                match expr {
                    None => {
                        if !ret_void {
                            self.diag.warn(
                                Some(&mark),
                                "'return' with no value, in function returning non-void",
                            );
                        }
                        true
                    }
                    Some(expr) => {
                        if !self.check_expr(expr, false) {
                            return false;
                        }
                        if ret_void {
                            self.diag.warn(
                                Some(&mark),
                                "'return' with a value, in function returning void",
                            );
                            return true;
                        }
                        match self.etype(expr) {
                            Some(from) => self.check_assignable(&mark, ret, from, true),
                            None => false,
                        }
                    }
                }
            }
            StmtKind::Compound { stmts, scope } => {
                let stmts = stmts.clone();
                let scope = *scope;
                let saved = self.scope;
                self.scope = scope;
                for s in stmts {
                    ok &= self.check_stmt(s);
                }
                self.scope = saved;
                ok
            }
            StmtKind::Expr(expr) => {
                let expr = *expr;
                self.check_expr(expr, false)
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn check_expr(&mut self, expr: ExprId, constant: bool) -> bool {
        let mark = self.emark(expr);
        match &self.tu.expr(expr).kind {
            ExprKind::Void => {
                self.set_etype(expr, TY_VOID);
                true
            }
            ExprKind::Paren(base) => {
                let base = *base;
                let ok = self.check_expr(base, constant);
                if let Some(t) = self.etype(base) {
                    self.set_etype(expr, t);
                }
                ok
            }
            ExprKind::Var(name) => {
                let name = Rc::clone(name);
                match self.tu.scopes.lookup_ord(self.scope, &name) {
                    Some((_, entry))
                        if entry.kind == OrdKind::Var || entry.kind == OrdKind::EnumId =>
                    {
                        if constant && entry.kind == OrdKind::Var {
                            self.diag
                                .error(Some(&mark), "expected constant value");
                            return false;
                        }
                        self.set_etype(expr, entry.ty);
                        true
                    }
                    _ => {
                        self.diag
                            .error(Some(&mark), format!("'{}' undeclared", name));
                        false
                    }
                }
            }
            ExprKind::Assign { dest, val, op } => {
                let (dest, val, op) = (*dest, *val, *op);
                let mut ok = self.check_expr(dest, false);
                ok &= self.check_expr(val, false);
                if !ok {
                    return false;
                }
                ok &= self.check_lvalue(dest);
                let (dt, vt) = match (self.etype(dest), self.etype(val)) {
                    (Some(d), Some(v)) => (d, v),
                    _ => return false,
                };
                let dmark = self.emark(dest);
                ok &= self.check_assignable(&dmark, dt, vt, true);
                if let Some(op) = op {
                    ok &= self.check_binop(&mark, op, dt, vt);
                }
                self.set_etype(expr, dt);
                ok
            }
            ExprKind::ConstInt { ty, .. }
            | ExprKind::ConstFloat { ty, .. }
            | ExprKind::ConstStr { ty, .. } => {
                let ty = *ty;
                self.set_etype(expr, ty);
                true
            }
            ExprKind::Bin { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                let mut ok = self.check_expr(lhs, false);
                ok &= self.check_expr(rhs, false);
                if !ok {
                    return false;
                }
                let (lt, rt) = match (self.etype(lhs), self.etype(rhs)) {
                    (Some(l), Some(r)) => (l, r),
                    _ => return false,
                };
                ok &= self.check_binop(&mark, op, lt, rt);
                match op {
                    Oper::Lt
                    | Oper::Gt
                    | Oper::Le
                    | Oper::Ge
                    | Oper::Eq
                    | Oper::Ne
                    | Oper::LogicAnd
                    | Oper::LogicOr => self.set_etype(expr, TY_BOOL),
                    Oper::Minus
                        if matches!(
                            self.tu.ty(self.tu.unmod(lt)).kind,
                            TypeKind::Ptr { .. }
                        ) && matches!(
                            self.tu.ty(self.tu.unmod(rt)).kind,
                            TypeKind::Ptr { .. }
                        ) =>
                    {
                        // Pointer difference is size_t.
                        self.set_etype(expr, TY_SIZE_T)
                    }
                    _ => match self.type_max(&mark, lt, rt) {
                        Some(t) => self.set_etype(expr, t),
                        None => ok = false,
                    },
                }
                ok
            }
            ExprKind::Unary { op, expr: inner } => {
                let (op, inner) = (*op, *inner);
                if !self.check_expr(inner, false) {
                    return false;
                }
                let it = match self.etype(inner) {
                    Some(t) => t,
                    None => return false,
                };
                if !self.check_unaryop(&mark, op, it) {
                    return false;
                }
                let mut ok = true;
                match op {
                    Oper::Addr => {
                        if !self.check_lvalue(inner) {
                            return false;
                        }
                        let ptr = self.tu.new_type(
                            mark.clone(),
                            TypeKind::Ptr {
                                base: it,
                                mods: TypeMods::NONE,
                            },
                        );
                        self.set_etype(expr, ptr);
                    }
                    Oper::Deref => {
                        let unmod = self.tu.unmod(it);
                        let base = match &self.tu.ty(unmod).kind {
                            TypeKind::Ptr { base, .. } => *base,
                            TypeKind::Arr { base, .. } => *base,
                            TypeKind::Func { .. } => unmod,
                            _ => return false,
                        };
                        let base_unmod = self.tu.unmod(base);
                        if matches!(self.tu.ty(base_unmod).kind, TypeKind::Void) {
                            self.diag
                                .warn(Some(&mark), "dereferencing a 'void *' pointer");
                        }
                        if self.tu.ty(base_unmod).kind.is_compound()
                            && self.compound_incomplete(base_unmod)
                        {
                            self.diag
                                .error(Some(&mark), "dereferencing pointer to incomplete type");
                            ok = false;
                        }
                        self.set_etype(expr, base);
                    }
                    Oper::LogicNot => self.set_etype(expr, TY_BOOL),
                    _ => self.set_etype(expr, it),
                }
                ok
            }
            ExprKind::Cond { cond, then, els } => {
                let (cond, then, els) = (*cond, *then, *els);
                let mut ok = self.check_expr_conditional(cond);
                ok &= self.check_expr(then, false);
                ok &= self.check_expr(els, false);
                if !ok {
                    return false;
                }
                let (tt, et) = match (self.etype(then), self.etype(els)) {
                    (Some(t), Some(e)) => (t, e),
                    _ => return false,
                };
                if matches!(self.tu.ty(self.tu.unmod(tt)).kind, TypeKind::Void)
                    || matches!(self.tu.ty(self.tu.unmod(et)).kind, TypeKind::Void)
                {
                    self.set_etype(expr, TY_VOID);
                } else {
                    match self.type_max(&mark, tt, et) {
                        Some(t) => self.set_etype(expr, t),
                        None => ok = false,
                    }
                }
                ok
            }
            ExprKind::Cast { to, base } => {
                let (to, base) = (*to, *base);
                if !self.check_expr(base, false) {
                    return false;
                }
                let mut ok = self.check_decl(to, DeclCtx::ParamDecl);
                let target = self.tu.decl_type(to);
                if let Some(from) = self.etype(base) {
                    ok &= self.check_cast(&mark, target, from);
                }
                // A compound literal is checked against the cast target.
                if matches!(self.tu.expr(base).kind, ExprKind::InitList { .. }) {
                    ok &= self.check_init_list(target, base);
                }
                self.set_etype(expr, target);
                ok
            }
            ExprKind::Call { func, args } => {
                let func = *func;
                let args = args.clone();
                if !self.check_expr(func, false) {
                    return false;
                }
                let fty = match self.etype(func) {
                    Some(t) => t,
                    None => return false,
                };
                let mut sig = self.tu.unmod(fty);
                if let TypeKind::Ptr { base, .. } = &self.tu.ty(sig).kind {
                    sig = self.tu.unmod(*base);
                }
                let (ret, params, varargs) = match &self.tu.ty(sig).kind {
                    TypeKind::Func {
                        ret,
                        params,
                        varargs,
                    } => (*ret, params.clone(), *varargs),
                    _ => {
                        self.diag.error(
                            Some(&mark),
                            "called object is not a function or function pointer",
                        );
                        return false;
                    }
                };
                let mut ok = true;

                // `(void)` counts as an empty parameter list.
                let void_only = params.len() == 1
                    && self.tu.decl(params[0]).nodes.is_empty()
                    && matches!(
                        self.tu.ty(self.tu.unmod(self.tu.decl(params[0]).ty)).kind,
                        TypeKind::Void
                    );
                let expected = if void_only { 0 } else { params.len() };

                for (i, &arg) in args.iter().enumerate() {
                    ok &= self.check_expr(arg, false);
                    if i >= expected {
                        continue;
                    }
                    let param_ty = self.tu.decl_type(params[i]);
                    if let Some(at) = self.etype(arg) {
                        if !self.check_assignable(&mark, param_ty, at, false) {
                            let amark = self.emark(arg);
                            self.diag.error(
                                Some(&amark),
                                format!("incompatible type for argument {} of function", i + 1),
                            );
                            ok = false;
                        }
                    }
                }
                if args.len() < expected {
                    self.diag
                        .error(Some(&mark), "too few arguments to function");
                    ok = false;
                } else if args.len() > expected && !varargs {
                    self.diag
                        .error(Some(&mark), "too many arguments to function");
                    ok = false;
                }
                self.set_etype(expr, ret);
                ok
            }
            ExprKind::Cmpd { exprs } => {
                let exprs = exprs.clone();
                let mut ok = true;
                for &e in &exprs {
                    ok &= self.check_expr(e, false);
                }
                if let Some(&last) = exprs.last() {
                    if let Some(t) = self.etype(last) {
                        self.set_etype(expr, t);
                    }
                }
                ok
            }
            ExprKind::SizeOf { ty, expr: inner } | ExprKind::AlignOf { ty, expr: inner } => {
                let (ty, inner) = (*ty, *inner);
                let mut ok = true;
                if let Some(decl) = ty {
                    let target = self.tu.unmod(self.tu.decl_type(decl));
                    if self.tu.ty(target).kind.is_compound() && self.compound_incomplete(target) {
                        self.diag.error(
                            Some(&mark),
                            "invalid application of 'sizeof' to incomplete type",
                        );
                        return false;
                    }
                    ok &= self.check_decl(decl, DeclCtx::ParamDecl);
                }
                if let Some(inner) = inner {
                    ok &= self.check_expr(inner, false);
                }
                self.set_etype(expr, TY_SIZE_T);
                ok
            }
            ExprKind::OffsetOf { ty, path } => {
                let ty = *ty;
                let path = path.clone();
                let mut ok = self.check_decl(ty, DeclCtx::ParamDecl);
                let mut cur = self.tu.unmod(self.tu.decl_type(ty));
                if !self.tu.ty(cur).kind.is_compound() {
                    self.diag.error(
                        Some(&mark),
                        "request for member in something not a structure or union",
                    );
                    return false;
                }
                for &step in &path {
                    match &self.tu.expr(step).kind {
                        ExprKind::MemAcc { name, .. } => {
                            let name = Rc::clone(name);
                            match layout::find_member(self.tu, cur, &name) {
                                Some((mty, _)) => cur = self.tu.unmod(mty),
                                None => {
                                    self.diag.error(
                                        Some(&mark),
                                        format!("compound type has no member '{}'", name),
                                    );
                                    return false;
                                }
                            }
                        }
                        ExprKind::ArrIdx { index, .. } => {
                            let index = *index;
                            ok &= self.check_expr(index, true);
                            match const_eval::eval(self.tu, Some(self.scope), index) {
                                Some(v) if v >= 0 => {
                                    if let ExprKind::ArrIdx { const_idx, .. } =
                                        &self.tu.expr(step).kind
                                    {
                                        const_idx.set(v as usize);
                                    }
                                }
                                _ => {
                                    self.diag.error(
                                        Some(&mark),
                                        "offsetof index is not a constant expression",
                                    );
                                    ok = false;
                                }
                            }
                            match &self.tu.ty(cur).kind {
                                TypeKind::Arr { base, .. } => cur = self.tu.unmod(*base),
                                _ => {
                                    self.diag.error(
                                        Some(&mark),
                                        "subscripted offsetof member is not an array",
                                    );
                                    return false;
                                }
                            }
                        }
                        _ => return false,
                    }
                }
                self.set_etype(expr, TY_SIZE_T);
                ok
            }
            ExprKind::MemAcc {
                base, name, arrow, ..
            } => {
                let base = match base {
                    Some(b) => *b,
                    None => return false,
                };
                let name = Rc::clone(name);
                let arrow = *arrow;
                if !self.check_expr(base, false) {
                    return false;
                }
                let bt = match self.etype(base) {
                    Some(t) => t,
                    None => return false,
                };
                let mut compound = self.tu.unmod(bt);
                match &self.tu.ty(compound).kind {
                    TypeKind::Struct(_) | TypeKind::Union(_) => {
                        if arrow {
                            self.diag.error(
                                Some(&mark),
                                "invalid type argument of '->' (have a struct or union)",
                            );
                            return false;
                        }
                    }
                    TypeKind::Ptr { base: pbase, .. } => {
                        let pbase = *pbase;
                        let inner = self.tu.unmod(pbase);
                        if arrow && self.tu.ty(inner).kind.is_compound() {
                            compound = inner;
                        } else {
                            self.diag.error(
                                Some(&mark),
                                format!(
                                    "request for member '{}' in something not a structure or union",
                                    name
                                ),
                            );
                            return false;
                        }
                    }
                    _ => {
                        self.diag.error(
                            Some(&mark),
                            format!(
                                "request for member '{}' in something not a structure or union",
                                name
                            ),
                        );
                        return false;
                    }
                }
                if self.compound_incomplete(compound) {
                    self.diag
                        .error(Some(&mark), "dereferencing pointer to incomplete type");
                    return false;
                }
                match layout::find_member(self.tu, compound, &name) {
                    Some((mty, _)) => {
                        self.set_etype(expr, mty);
                        true
                    }
                    None => {
                        self.diag.error(
                            Some(&mark),
                            format!("compound type has no member '{}'", name),
                        );
                        false
                    }
                }
            }
            ExprKind::ArrIdx { base, index, .. } => {
                let base = match base {
                    Some(b) => *b,
                    None => return false,
                };
                let index = *index;
                let mut ok = self.check_expr(base, false);
                ok &= self.check_expr(index, false);
                if !ok {
                    return false;
                }
                let (bt, it) = match (self.etype(base), self.etype(index)) {
                    (Some(b), Some(i)) => (b, i),
                    _ => return false,
                };
                let umod_arr = self.tu.unmod(bt);
                let umod_idx = self.tu.unmod(it);
                let elem = match &self.tu.ty(umod_arr).kind {
                    TypeKind::Ptr { base, .. } => *base,
                    TypeKind::Arr { base, .. } => *base,
                    _ => {
                        let bmark = self.emark(base);
                        self.diag.error(
                            Some(&bmark),
                            "subscripted value is neither array nor pointer",
                        );
                        return false;
                    }
                };
                if !self.tu.ty(umod_idx).kind.is_integral()
                    && !matches!(self.tu.ty(umod_idx).kind, TypeKind::Enum { .. })
                {
                    let imark = self.emark(index);
                    self.diag
                        .error(Some(&imark), "array subscript is not an integer");
                    ok = false;
                }
                self.set_etype(expr, elem);
                ok
            }
            ExprKind::InitList { exprs } => {
                // Typed when checked against its target.
                let exprs = exprs.clone();
                let mut ok = true;
                for e in exprs {
                    ok &= self.check_expr(e, false);
                }
                ok
            }
            ExprKind::DesigInit { val, .. } => {
                let val = *val;
                self.check_expr(val, false)
            }
            ExprKind::VaStart { ap, last } => {
                let (ap, last) = (*ap, *last);
                let mut ok = self.check_expr_va_list(ap);
                // `last` must name the final named parameter of this
                // function.
                let mut matches_last = false;
                if let (Some(func), ExprKind::Var(name)) =
                    (self.func, &self.tu.expr(last).kind)
                {
                    let name = Rc::clone(name);
                    let fn_decl = self.tu.gdecl(func).decl;
                    if let Some(&first) = self.tu.decl(fn_decl).nodes.first() {
                        if let TypeKind::Func { params, .. } =
                            &self.tu.ty(self.tu.untypedef(self.tu.decl_node(first).ty)).kind
                        {
                            if let Some(&last_param) = params.last() {
                                let last_name = self
                                    .tu
                                    .decl(last_param)
                                    .nodes
                                    .last()
                                    .and_then(|&n| self.tu.decl_node(n).id.clone());
                                matches_last = last_name.as_deref() == Some(&*name);
                            }
                        }
                    }
                }
                if !matches_last {
                    let lmark = self.emark(last);
                    self.diag
                        .error(Some(&lmark), "expected function parameter name");
                    ok = false;
                } else {
                    ok &= self.check_expr(last, false);
                }
                self.set_etype(expr, TY_VOID);
                ok
            }
            ExprKind::VaArg { ap, ty } => {
                let (ap, ty) = (*ap, *ty);
                let mut ok = self.check_expr_va_list(ap);
                ok &= self.check_decl(ty, DeclCtx::ParamDecl);
                self.set_etype(expr, self.tu.decl_type(ty));
                ok
            }
            ExprKind::VaEnd { ap } => {
                let ap = *ap;
                let ok = self.check_expr_va_list(ap);
                self.set_etype(expr, TY_VOID);
                ok
            }
            ExprKind::VaCopy { dest, src } => {
                let (dest, src) = (*dest, *src);
                let mut ok = self.check_expr_va_list(dest);
                ok &= self.check_expr_va_list(src);
                self.set_etype(expr, TY_VOID);
                ok
            }
        }
    }
}
