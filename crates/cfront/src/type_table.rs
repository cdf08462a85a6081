//! Scoped type tables.
//!
//! Each scope holds three independent namespaces: the ordinary one
//! (variables, enumerators, primitives), the typedef names, and the
//! struct/union/enum tags. Lookup walks the parent chain; insertion always
//! targets the scope it is given. The parser consults the typedef namespace
//! to settle the classic "typedef name or identifier" question.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::{
    TypeId, TY_BOOL, TY_CHAR, TY_DOUBLE, TY_FLOAT, TY_INT, TY_LONG, TY_LONG_DOUBLE, TY_LONG_LONG,
    TY_SHORT, TY_VA_LIST, TY_VOID,
};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl fmt::Debug for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeId({})", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OrdKind {
    Prim,
    Var,
    EnumId,
}

/// An entry in the ordinary namespace.
#[derive(Clone, Copy, Debug)]
pub struct OrdEntry {
    pub kind: OrdKind,
    pub ty: TypeId,
    /// For variables: a definition (not just a declaration) was seen.
    pub defined: bool,
    /// For enumerators: the constant value.
    pub enum_val: i64,
}

impl OrdEntry {
    pub fn var(ty: TypeId) -> OrdEntry {
        OrdEntry {
            kind: OrdKind::Var,
            ty,
            defined: false,
            enum_val: 0,
        }
    }

    pub fn enum_id(ty: TypeId, val: i64) -> OrdEntry {
        OrdEntry {
            kind: OrdKind::EnumId,
            ty,
            defined: true,
            enum_val: val,
        }
    }
}

/// An entry in the tag namespace.
#[derive(Clone, Copy, Debug)]
pub struct TagEntry {
    pub ty: TypeId,
    /// The tag's body has been seen, not just a forward reference.
    pub defined: bool,
}

struct Scope {
    parent: Option<ScopeId>,
    ordinary: HashMap<Rc<str>, OrdEntry>,
    typedefs: HashMap<Rc<str>, TypeId>,
    tags: HashMap<Rc<str>, TagEntry>,
}

pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl Default for ScopeArena {
    fn default() -> ScopeArena {
        ScopeArena::new()
    }
}

impl ScopeArena {
    pub fn new() -> ScopeArena {
        ScopeArena { scopes: Vec::new() }
    }

    pub fn new_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        self.scopes.push(Scope {
            parent,
            ordinary: HashMap::new(),
            typedefs: HashMap::new(),
            tags: HashMap::new(),
        });
        ScopeId(self.scopes.len() as u32 - 1)
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0 as usize].parent
    }

    /// The primitive type names live in the root ordinary namespace.
    pub fn seed_primitives(&mut self, root: ScopeId) {
        const PRIMS: &[(&str, TypeId)] = &[
            ("void", TY_VOID),
            ("_Bool", TY_BOOL),
            ("char", TY_CHAR),
            ("short", TY_SHORT),
            ("int", TY_INT),
            ("long", TY_LONG),
            ("float", TY_FLOAT),
            ("double", TY_DOUBLE),
            ("long double", TY_LONG_DOUBLE),
            ("long long", TY_LONG_LONG),
            ("__builtin_va_list", TY_VA_LIST),
        ];
        let scope = &mut self.scopes[root.0 as usize];
        for &(name, ty) in PRIMS {
            scope.ordinary.insert(
                name.into(),
                OrdEntry {
                    kind: OrdKind::Prim,
                    ty,
                    defined: true,
                    enum_val: 0,
                },
            );
        }
    }

    // ------------------------------------------------------------------
    // Ordinary namespace
    // ------------------------------------------------------------------

    pub fn lookup_ord(&self, mut scope: ScopeId, name: &str) -> Option<(ScopeId, OrdEntry)> {
        loop {
            let s = &self.scopes[scope.0 as usize];
            if let Some(entry) = s.ordinary.get(name) {
                return Some((scope, *entry));
            }
            scope = s.parent?;
        }
    }

    /// Insert into this scope only; an existing entry is an error.
    pub fn insert_ord(&mut self, scope: ScopeId, name: Rc<str>, entry: OrdEntry) -> Result<(), ()> {
        let s = &mut self.scopes[scope.0 as usize];
        if s.ordinary.contains_key(&name) {
            return Err(());
        }
        s.ordinary.insert(name, entry);
        Ok(())
    }

    pub fn ord_entry_mut(&mut self, scope: ScopeId, name: &str) -> Option<&mut OrdEntry> {
        self.scopes[scope.0 as usize].ordinary.get_mut(name)
    }

    // ------------------------------------------------------------------
    // Typedef namespace
    // ------------------------------------------------------------------

    pub fn lookup_typedef(&self, mut scope: ScopeId, name: &str) -> Option<TypeId> {
        loop {
            let s = &self.scopes[scope.0 as usize];
            if let Some(&ty) = s.typedefs.get(name) {
                return Some(ty);
            }
            scope = s.parent?;
        }
    }

    /// Insert a typedef; on a name clash in this scope the existing type is
    /// handed back so the caller can decide whether the redefinition is
    /// compatible.
    pub fn insert_typedef(
        &mut self,
        scope: ScopeId,
        name: Rc<str>,
        ty: TypeId,
    ) -> Result<(), TypeId> {
        let s = &mut self.scopes[scope.0 as usize];
        if let Some(&existing) = s.typedefs.get(&name) {
            return Err(existing);
        }
        s.typedefs.insert(name, ty);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tag namespace
    // ------------------------------------------------------------------

    pub fn lookup_tag(&self, mut scope: ScopeId, name: &str) -> Option<(ScopeId, TagEntry)> {
        loop {
            let s = &self.scopes[scope.0 as usize];
            if let Some(entry) = s.tags.get(name) {
                return Some((scope, *entry));
            }
            scope = s.parent?;
        }
    }

    pub fn insert_tag(&mut self, scope: ScopeId, name: Rc<str>, entry: TagEntry) {
        self.scopes[scope.0 as usize].tags.insert(name, entry);
    }

    pub fn tag_entry_mut(&mut self, scope: ScopeId, name: &str) -> Option<&mut TagEntry> {
        self.scopes[scope.0 as usize].tags.get_mut(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TY_INT;

    #[test]
    fn lookup_walks_parents() {
        let mut arena = ScopeArena::new();
        let outer = arena.new_scope(None);
        let inner = arena.new_scope(Some(outer));
        arena.insert_typedef(outer, "t".into(), TY_INT).unwrap();
        assert_eq!(arena.lookup_typedef(inner, "t"), Some(TY_INT));
    }

    #[test]
    fn inner_typedef_shadows_outer() {
        let mut arena = ScopeArena::new();
        let outer = arena.new_scope(None);
        let inner = arena.new_scope(Some(outer));
        arena.insert_typedef(outer, "t".into(), TY_INT).unwrap();
        arena.insert_typedef(inner, "t".into(), TY_CHAR).unwrap();
        assert_eq!(arena.lookup_typedef(inner, "t"), Some(TY_CHAR));
        assert_eq!(arena.lookup_typedef(outer, "t"), Some(TY_INT));
    }

    #[test]
    fn namespaces_do_not_collide() {
        let mut arena = ScopeArena::new();
        let scope = arena.new_scope(None);
        arena.insert_typedef(scope, "x".into(), TY_INT).unwrap();
        arena
            .insert_ord(scope, "x".into(), OrdEntry::var(TY_CHAR))
            .unwrap();
        arena.insert_tag(
            scope,
            "x".into(),
            TagEntry {
                ty: TY_INT,
                defined: false,
            },
        );
        assert_eq!(arena.lookup_typedef(scope, "x"), Some(TY_INT));
        assert_eq!(arena.lookup_ord(scope, "x").unwrap().1.ty, TY_CHAR);
        assert!(arena.lookup_tag(scope, "x").is_some());
    }

    #[test]
    fn duplicate_ordinary_insert_is_rejected() {
        let mut arena = ScopeArena::new();
        let scope = arena.new_scope(None);
        arena
            .insert_ord(scope, "v".into(), OrdEntry::var(TY_INT))
            .unwrap();
        assert!(arena
            .insert_ord(scope, "v".into(), OrdEntry::var(TY_INT))
            .is_err());
    }
}
