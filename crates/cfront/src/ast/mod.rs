//! AST.
//!
//! All nodes of a translation unit live in per-kind arenas owned by
//! `TransUnit` and are addressed by typed index handles. References between
//! nodes, including back-references like `continue` to its loop, are plain
//! ids: nothing owns anything but the arena, and the whole unit is dropped at
//! once.
//!
//! The primitive types are pre-seeded arena slots shared by the entire unit;
//! id equality on them is the fast path of the equivalence check, so they
//! must never be mutated in place.

pub mod init_list;
pub mod layout;
pub mod print;

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::ops;
use std::rc::Rc;

use crate::mark::Mark;
use crate::type_table::{ScopeArena, ScopeId};

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) u32);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

arena_id!(TypeId);
arena_id!(ExprId);
arena_id!(StmtId);
arena_id!(DeclId);
arena_id!(DeclNodeId);
arena_id!(GDeclId);

// The pre-seeded primitive slots.
pub const TY_VOID: TypeId = TypeId(0);
pub const TY_BOOL: TypeId = TypeId(1);
pub const TY_CHAR: TypeId = TypeId(2);
pub const TY_SHORT: TypeId = TypeId(3);
pub const TY_INT: TypeId = TypeId(4);
pub const TY_LONG: TypeId = TypeId(5);
pub const TY_LONG_LONG: TypeId = TypeId(6);
pub const TY_FLOAT: TypeId = TypeId(7);
pub const TY_DOUBLE: TypeId = TypeId(8);
pub const TY_LONG_DOUBLE: TypeId = TypeId(9);
pub const TY_VA_LIST: TypeId = TypeId(10);
/// `unsigned long`, the type of `sizeof` and pointer difference.
pub const TY_SIZE_T: TypeId = TypeId(11);

/// Type modifiers, stored as a bitmask.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeMods(pub u16);

impl TypeMods {
    pub const NONE: TypeMods = TypeMods(0);
    pub const SIGNED: TypeMods = TypeMods(1 << 0);
    pub const UNSIGNED: TypeMods = TypeMods(1 << 1);
    pub const AUTO: TypeMods = TypeMods(1 << 2);
    pub const REGISTER: TypeMods = TypeMods(1 << 3);
    pub const STATIC: TypeMods = TypeMods(1 << 4);
    pub const EXTERN: TypeMods = TypeMods(1 << 5);
    pub const TYPEDEF: TypeMods = TypeMods(1 << 6);
    pub const CONST: TypeMods = TypeMods(1 << 7);
    pub const VOLATILE: TypeMods = TypeMods(1 << 8);
    pub const INLINE: TypeMods = TypeMods(1 << 9);
    pub const ALIGNAS: TypeMods = TypeMods(1 << 10);
    pub const NORETURN: TypeMods = TypeMods(1 << 11);

    pub fn contains(self, other: TypeMods) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Name of a single-bit modifier.
    pub fn name(self) -> &'static str {
        match self {
            TypeMods::SIGNED => "signed",
            TypeMods::UNSIGNED => "unsigned",
            TypeMods::AUTO => "auto",
            TypeMods::REGISTER => "register",
            TypeMods::STATIC => "static",
            TypeMods::EXTERN => "extern",
            TypeMods::TYPEDEF => "typedef",
            TypeMods::CONST => "const",
            TypeMods::VOLATILE => "volatile",
            TypeMods::INLINE => "inline",
            TypeMods::ALIGNAS => "_Alignas",
            TypeMods::NORETURN => "_Noreturn",
            _ => "?",
        }
    }

    pub const ALL_BITS: &'static [TypeMods] = &[
        TypeMods::SIGNED,
        TypeMods::UNSIGNED,
        TypeMods::AUTO,
        TypeMods::REGISTER,
        TypeMods::STATIC,
        TypeMods::EXTERN,
        TypeMods::TYPEDEF,
        TypeMods::CONST,
        TypeMods::VOLATILE,
        TypeMods::INLINE,
        TypeMods::ALIGNAS,
        TypeMods::NORETURN,
    ];
}

impl ops::BitOr for TypeMods {
    type Output = TypeMods;
    fn bitor(self, rhs: TypeMods) -> TypeMods {
        TypeMods(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for TypeMods {
    fn bitor_assign(&mut self, rhs: TypeMods) {
        self.0 |= rhs.0;
    }
}

impl ops::BitAnd for TypeMods {
    type Output = TypeMods;
    fn bitand(self, rhs: TypeMods) -> TypeMods {
        TypeMods(self.0 & rhs.0)
    }
}

impl ops::Not for TypeMods {
    type Output = TypeMods;
    fn not(self) -> TypeMods {
        TypeMods(!self.0)
    }
}

impl fmt::Debug for TypeMods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for &bit in TypeMods::ALL_BITS {
            if self.contains(bit) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", bit.name())?;
                first = false;
            }
        }
        if first {
            write!(f, "none")?;
        }
        Ok(())
    }
}

/// Data of a struct or union type. `size`/`align` stay `None` until the
/// analyzer completes the type; a `None` size is what "incomplete" means.
pub struct CompoundData {
    pub name: Option<Rc<str>>,
    pub decls: Vec<DeclId>,
    pub size: Cell<Option<usize>>,
    pub align: Cell<Option<usize>>,
}

impl CompoundData {
    pub fn named(name: Option<Rc<str>>) -> CompoundData {
        CompoundData {
            name,
            decls: Vec::new(),
            size: Cell::new(None),
            align: Cell::new(None),
        }
    }
}

/// What a typedef reference stands for; only the pretty printer cares.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TypedefOf {
    Plain,
    Struct,
    Union,
    Enum,
}

pub struct Type {
    pub mark: Mark,
    pub kind: TypeKind,
}

pub enum TypeKind {
    Void,
    Bool,
    Char,
    Short,
    Int,
    Long,
    LongLong,
    Float,
    Double,
    LongDouble,
    VaList,

    Struct(CompoundData),
    Union(CompoundData),
    Enum {
        name: Option<Rc<str>>,
        base: TypeId,
        ids: Vec<DeclNodeId>,
    },

    /// Reference to a typedef (or tag) name.
    Typedef {
        name: Rc<str>,
        base: TypeId,
        of: TypedefOf,
    },

    Mod {
        mods: TypeMods,
        base: Option<TypeId>,
        alignas_ty: Option<DeclId>,
        alignas_expr: Option<ExprId>,
        alignas_align: Cell<usize>,
    },

    Paren(TypeId),

    Func {
        ret: TypeId,
        params: Vec<DeclId>,
        varargs: bool,
    },
    Arr {
        base: TypeId,
        len: Option<ExprId>,
        nelems: Cell<Option<usize>>,
    },
    Ptr {
        base: TypeId,
        mods: TypeMods,
    },

    /// `_Static_assert(expr, "msg")` in declaration position.
    StaticAssert { expr: ExprId, msg: Rc<str> },
}

impl TypeKind {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TypeKind::Bool
                | TypeKind::Char
                | TypeKind::Short
                | TypeKind::Int
                | TypeKind::Long
                | TypeKind::LongLong
                | TypeKind::Float
                | TypeKind::Double
                | TypeKind::LongDouble
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            TypeKind::Bool
                | TypeKind::Char
                | TypeKind::Short
                | TypeKind::Int
                | TypeKind::Long
                | TypeKind::LongLong
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            TypeKind::Float | TypeKind::Double | TypeKind::LongDouble
        )
    }

    /// Pointer-ish: function, array, or pointer.
    pub fn is_ptr_like(&self) -> bool {
        matches!(
            self,
            TypeKind::Func { .. } | TypeKind::Arr { .. } | TypeKind::Ptr { .. }
        )
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, TypeKind::Struct(_) | TypeKind::Union(_))
    }

    /// Conversion rank of a numeric primitive; higher wins in arithmetic.
    pub fn rank(&self) -> u8 {
        match self {
            TypeKind::Bool => 1,
            TypeKind::Char => 2,
            TypeKind::Short => 3,
            TypeKind::Int => 4,
            TypeKind::Long => 5,
            TypeKind::LongLong => 6,
            TypeKind::Float => 7,
            TypeKind::Double => 8,
            TypeKind::LongDouble => 9,
            _ => 0,
        }
    }

    /// Name of a basic type, for diagnostics and printing.
    pub fn basic_name(&self) -> &'static str {
        match self {
            TypeKind::Void => "void",
            TypeKind::Bool => "_Bool",
            TypeKind::Char => "char",
            TypeKind::Short => "short",
            TypeKind::Int => "int",
            TypeKind::Long => "long",
            TypeKind::LongLong => "long long",
            TypeKind::Float => "float",
            TypeKind::Double => "double",
            TypeKind::LongDouble => "long double",
            TypeKind::VaList => "__builtin_va_list",
            TypeKind::Struct(_) => "struct",
            TypeKind::Union(_) => "union",
            TypeKind::Enum { .. } => "enum",
            TypeKind::Typedef { .. } => "typedef",
            TypeKind::Mod { .. } => "modified",
            TypeKind::Paren(_) => "paren",
            TypeKind::Func { .. } => "function",
            TypeKind::Arr { .. } => "array",
            TypeKind::Ptr { .. } => "pointer",
            TypeKind::StaticAssert { .. } => "_Static_assert",
        }
    }
}

/// Operators, unary and binary, including the member-access pair.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Oper {
    Plus,
    UPlus,
    Minus,
    UMinus,
    Times,
    Deref,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    Addr,
    BitXor,
    BitOr,
    LShift,
    RShift,
    LogicNot,
    LogicAnd,
    LogicOr,
    BitNot,
    PreInc,
    PostInc,
    PreDec,
    PostDec,
    Arrow,
    Dot,
}

impl Oper {
    pub fn symbol(self) -> &'static str {
        use Oper::*;
        match self {
            Plus | UPlus => "+",
            Minus | UMinus => "-",
            Times | Deref => "*",
            Div => "/",
            Mod => "%",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
            Eq => "==",
            Ne => "!=",
            BitAnd | Addr => "&",
            BitXor => "^",
            BitOr => "|",
            LShift => "<<",
            RShift => ">>",
            LogicNot => "!",
            LogicAnd => "&&",
            LogicOr => "||",
            BitNot => "~",
            PreInc | PostInc => "++",
            PreDec | PostDec => "--",
            Arrow => "->",
            Dot => ".",
        }
    }
}

pub struct Expr {
    pub mark: Mark,
    pub kind: ExprKind,
    /// Filled by the analyzer.
    pub etype: Cell<Option<TypeId>>,
}

pub enum ExprKind {
    /// Placeholder for an uninitialized slot in a canonical init list.
    Void,
    Paren(ExprId),
    Var(Rc<str>),
    Assign {
        dest: ExprId,
        val: ExprId,
        /// The operation of a compound assignment like `+=`; `None` for `=`.
        op: Option<Oper>,
    },
    ConstInt {
        val: i64,
        ty: TypeId,
    },
    ConstFloat {
        val: f64,
        ty: TypeId,
    },
    ConstStr {
        val: Rc<str>,
        ty: TypeId,
    },
    Bin {
        op: Oper,
        lhs: ExprId,
        rhs: ExprId,
    },
    Unary {
        op: Oper,
        expr: ExprId,
    },
    Cond {
        cond: ExprId,
        then: ExprId,
        els: ExprId,
    },
    Cast {
        to: DeclId,
        base: ExprId,
    },
    Call {
        func: ExprId,
        args: Vec<ExprId>,
    },
    /// Comma expression.
    Cmpd {
        exprs: Vec<ExprId>,
    },
    SizeOf {
        ty: Option<DeclId>,
        expr: Option<ExprId>,
    },
    AlignOf {
        ty: Option<DeclId>,
        expr: Option<ExprId>,
    },
    OffsetOf {
        ty: DeclId,
        /// `MemAcc`/`ArrIdx` nodes with no base.
        path: Vec<ExprId>,
    },
    MemAcc {
        base: Option<ExprId>,
        name: Rc<str>,
        arrow: bool,
    },
    ArrIdx {
        base: Option<ExprId>,
        index: ExprId,
        /// Constant index, for offsetof paths.
        const_idx: Cell<usize>,
    },
    InitList {
        exprs: Vec<ExprId>,
    },
    DesigInit {
        name: Rc<str>,
        val: ExprId,
    },
    VaStart {
        ap: ExprId,
        last: ExprId,
    },
    VaArg {
        ap: ExprId,
        ty: DeclId,
    },
    VaEnd {
        ap: ExprId,
    },
    VaCopy {
        dest: ExprId,
        src: ExprId,
    },
}

/// One declarator of a declaration: `int foo, *bar;` has two of these
/// sharing a base type. For struct members `width` holds the bit-field
/// width expression.
pub struct DeclNode {
    pub mark: Mark,
    pub ty: TypeId,
    pub id: Option<Rc<str>>,
    pub init: Option<ExprId>,
    /// Bit-field width in bits, evaluated by the analyzer.
    pub bit_width: Cell<Option<u32>>,
}

pub struct Decl {
    pub mark: Mark,
    pub ty: TypeId,
    pub nodes: Vec<DeclNodeId>,
}

pub enum StmtKind {
    Nop,
    Decl(DeclId),
    Label {
        name: Rc<str>,
        stmt: StmtId,
    },
    Case {
        val: ExprId,
        stmt: StmtId,
    },
    Default {
        stmt: StmtId,
    },
    If {
        cond: ExprId,
        then: StmtId,
        els: Option<StmtId>,
    },
    Switch {
        cond: ExprId,
        body: StmtId,
        /// Filled by the analyzer.
        cases: Vec<StmtId>,
        default: Option<StmtId>,
    },
    Do {
        body: StmtId,
        cond: ExprId,
    },
    While {
        cond: ExprId,
        body: StmtId,
    },
    For {
        init_decl: Option<DeclId>,
        /// Scope of a declaration in the initializer.
        scope: Option<ScopeId>,
        init_expr: Option<ExprId>,
        cond: Option<ExprId>,
        step: Option<ExprId>,
        body: StmtId,
    },
    Goto {
        label: Rc<str>,
    },
    Continue {
        /// The enclosing loop; set by the analyzer.
        parent: Cell<Option<StmtId>>,
    },
    Break {
        parent: Cell<Option<StmtId>>,
    },
    Return {
        expr: Option<ExprId>,
        /// The function's return type; set by the analyzer.
        ret_ty: Cell<Option<TypeId>>,
    },
    Compound {
        stmts: Vec<StmtId>,
        scope: ScopeId,
    },
    Expr(ExprId),
}

pub struct Stmt {
    pub mark: Mark,
    pub kind: StmtKind,
}

pub enum GDeclKind {
    Nop,
    Decl,
    FnDef {
        body: StmtId,
        /// Labels by name, collected by the analyzer.
        labels: HashMap<Rc<str>, StmtId>,
        /// `goto`s awaiting resolution against `labels`.
        gotos: Vec<StmtId>,
    },
}

pub struct GDecl {
    pub mark: Mark,
    pub kind: GDeclKind,
    pub decl: DeclId,
}

/// Top level AST structure: the arenas, the scope tree, and the ordered list
/// of global declarations.
pub struct TransUnit {
    types: Vec<Type>,
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    decls: Vec<Decl>,
    decl_nodes: Vec<DeclNode>,
    gdecls: Vec<GDecl>,
    pub scopes: ScopeArena,
    pub root_scope: ScopeId,
    pub gdecl_order: Vec<GDeclId>,
}

impl Default for TransUnit {
    fn default() -> TransUnit {
        TransUnit::new()
    }
}

impl TransUnit {
    pub fn new() -> TransUnit {
        let mut scopes = ScopeArena::new();
        let root_scope = scopes.new_scope(None);
        let mut tu = TransUnit {
            types: Vec::new(),
            exprs: Vec::new(),
            stmts: Vec::new(),
            decls: Vec::new(),
            decl_nodes: Vec::new(),
            gdecls: Vec::new(),
            scopes,
            root_scope,
            gdecl_order: Vec::new(),
        };
        // Primitive singletons; order must match the TY_* constants.
        for kind in [
            TypeKind::Void,
            TypeKind::Bool,
            TypeKind::Char,
            TypeKind::Short,
            TypeKind::Int,
            TypeKind::Long,
            TypeKind::LongLong,
            TypeKind::Float,
            TypeKind::Double,
            TypeKind::LongDouble,
            TypeKind::VaList,
        ] {
            tu.new_type(Mark::built_in(), kind);
        }
        let size_t = tu.new_type(
            Mark::built_in(),
            TypeKind::Mod {
                mods: TypeMods::UNSIGNED,
                base: Some(TY_LONG),
                alignas_ty: None,
                alignas_expr: None,
                alignas_align: Cell::new(0),
            },
        );
        debug_assert_eq!(size_t, TY_SIZE_T);
        tu.scopes.seed_primitives(root_scope);
        tu
    }

    pub fn new_type(&mut self, mark: Mark, kind: TypeKind) -> TypeId {
        self.types.push(Type { mark, kind });
        TypeId(self.types.len() as u32 - 1)
    }

    pub fn ty(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    pub fn ty_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id.0 as usize]
    }

    pub fn new_expr(&mut self, mark: Mark, kind: ExprKind) -> ExprId {
        self.exprs.push(Expr {
            mark,
            kind,
            etype: Cell::new(None),
        });
        ExprId(self.exprs.len() as u32 - 1)
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.0 as usize]
    }

    pub fn new_stmt(&mut self, mark: Mark, kind: StmtKind) -> StmtId {
        self.stmts.push(Stmt { mark, kind });
        StmtId(self.stmts.len() as u32 - 1)
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0 as usize]
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.0 as usize]
    }

    pub fn new_decl(&mut self, mark: Mark, ty: TypeId) -> DeclId {
        self.decls.push(Decl {
            mark,
            ty,
            nodes: Vec::new(),
        });
        DeclId(self.decls.len() as u32 - 1)
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.0 as usize]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        &mut self.decls[id.0 as usize]
    }

    pub fn new_decl_node(&mut self, mark: Mark, ty: TypeId) -> DeclNodeId {
        self.decl_nodes.push(DeclNode {
            mark,
            ty,
            id: None,
            init: None,
            bit_width: Cell::new(None),
        });
        DeclNodeId(self.decl_nodes.len() as u32 - 1)
    }

    pub fn decl_node(&self, id: DeclNodeId) -> &DeclNode {
        &self.decl_nodes[id.0 as usize]
    }

    pub fn decl_node_mut(&mut self, id: DeclNodeId) -> &mut DeclNode {
        &mut self.decl_nodes[id.0 as usize]
    }

    pub fn new_gdecl(&mut self, mark: Mark, kind: GDeclKind, decl: DeclId) -> GDeclId {
        self.gdecls.push(GDecl { mark, kind, decl });
        GDeclId(self.gdecls.len() as u32 - 1)
    }

    pub fn gdecl(&self, id: GDeclId) -> &GDecl {
        &self.gdecls[id.0 as usize]
    }

    pub fn gdecl_mut(&mut self, id: GDeclId) -> &mut GDecl {
        &mut self.gdecls[id.0 as usize]
    }

    /// The declared type of a declaration: the first declarator's elaborated
    /// type, or the base type when there are no declarators.
    pub fn decl_type(&self, decl: DeclId) -> TypeId {
        match self.decl(decl).nodes.first() {
            Some(&node) => self.decl_node(node).ty,
            None => self.decl(decl).ty,
        }
    }

    // ------------------------------------------------------------------
    // Type-chain helpers
    // ------------------------------------------------------------------

    /// Strip typedef references and parens.
    pub fn untypedef(&self, mut t: TypeId) -> TypeId {
        loop {
            match &self.ty(t).kind {
                TypeKind::Typedef { base, .. } => t = *base,
                TypeKind::Paren(base) => t = *base,
                _ => return t,
            }
        }
    }

    /// Strip typedefs, parens and modifier nodes down to the bare type.
    pub fn unmod(&self, t: TypeId) -> TypeId {
        let mut t = self.untypedef(t);
        loop {
            match &self.ty(t).kind {
                TypeKind::Mod { base: Some(b), .. } => t = self.untypedef(*b),
                TypeKind::Mod { base: None, .. } => return TY_INT,
                _ => return t,
            }
        }
    }

    /// Base of a pointer-like type; a function "decays" to itself.
    pub fn ptr_base(&self, t: TypeId) -> TypeId {
        match &self.ty(t).kind {
            TypeKind::Func { .. } => t,
            TypeKind::Ptr { base, .. } => *base,
            TypeKind::Arr { base, .. } => *base,
            _ => t,
        }
    }

    /// Whether `t` (possibly wrapped in modifiers) carries `mods`.
    pub fn has_mod(&self, t: TypeId, mods: TypeMods) -> bool {
        let mut t = self.untypedef(t);
        loop {
            match &self.ty(t).kind {
                TypeKind::Mod {
                    mods: m,
                    base: Some(b),
                    ..
                } => {
                    if m.contains(mods) {
                        return true;
                    }
                    t = self.untypedef(*b);
                }
                TypeKind::Mod { mods: m, .. } => return m.contains(mods),
                _ => return false,
            }
        }
    }

    pub fn is_unsigned(&self, t: TypeId) -> bool {
        let u = self.unmod(t);
        matches!(self.ty(u).kind, TypeKind::Bool) || self.has_mod(t, TypeMods::UNSIGNED)
    }
}

/// A struct or union member as the layout and init-list passes see it:
/// either one declarator, or a whole declaration with no declarators (an
/// anonymous aggregate, or an unnamed bit-field group).
#[derive(Clone, Copy)]
pub struct Member {
    pub decl: DeclId,
    pub node: Option<DeclNodeId>,
}

impl Member {
    pub fn ty(&self, tu: &TransUnit) -> TypeId {
        match self.node {
            Some(node) => tu.decl_node(node).ty,
            None => tu.decl(self.decl).ty,
        }
    }

    pub fn name<'a>(&self, tu: &'a TransUnit) -> Option<&'a Rc<str>> {
        self.node.and_then(|n| tu.decl_node(n).id.as_ref())
    }

    /// An anonymous struct/union member: a memberless declaration of
    /// compound type.
    pub fn is_anon_compound(&self, tu: &TransUnit) -> bool {
        self.node.is_none() && tu.ty(tu.unmod(self.ty(tu))).kind.is_compound()
    }
}

/// Flatten the member declarations of a struct/union type, in order.
pub fn compound_members(tu: &TransUnit, ty: TypeId) -> Vec<Member> {
    let decls = match &tu.ty(ty).kind {
        TypeKind::Struct(data) | TypeKind::Union(data) => data.decls.clone(),
        _ => return Vec::new(),
    };
    let mut members = Vec::new();
    for decl in decls {
        if matches!(tu.ty(tu.decl(decl).ty).kind, TypeKind::StaticAssert { .. }) {
            continue;
        }
        let nodes = &tu.decl(decl).nodes;
        if nodes.is_empty() {
            members.push(Member { decl, node: None });
        } else {
            for &node in nodes {
                members.push(Member {
                    decl,
                    node: Some(node),
                });
            }
        }
    }
    members
}
