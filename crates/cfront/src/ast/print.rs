//! AST pretty printer, used by the driver's dump mode.
//!
//! Renders the tree back to C-ish source. Declarators are rebuilt inside
//! out, so `int (*a[5])(void)` round-trips with its parentheses.

use std::fmt::Write;

use super::{
    compound_members, DeclId, ExprId, ExprKind, GDeclKind, Oper, StmtId, StmtKind, TransUnit,
    TypeId, TypeKind, TypeMods, TypedefOf,
};

pub fn print_translation_unit(tu: &TransUnit) -> String {
    let mut p = Printer {
        tu,
        out: String::new(),
        indent: 0,
    };
    for &gdecl in &tu.gdecl_order {
        p.gdecl(gdecl);
    }
    p.out
}

struct Printer<'a> {
    tu: &'a TransUnit,
    out: String,
    indent: usize,
}

impl<'a> Printer<'a> {
    fn line_start(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
    }

    fn gdecl(&mut self, gdecl: super::GDeclId) {
        let g = self.tu.gdecl(gdecl);
        match &g.kind {
            GDeclKind::Nop => {}
            GDeclKind::Decl => {
                self.line_start();
                let text = self.decl_str(g.decl);
                self.out.push_str(&text);
                self.out.push_str(";\n");
            }
            GDeclKind::FnDef { body, .. } => {
                self.line_start();
                let text = self.decl_str(g.decl);
                self.out.push_str(&text);
                self.out.push(' ');
                self.stmt(*body);
                self.out.push('\n');
            }
        }
    }

    fn decl_str(&mut self, decl: DeclId) -> String {
        let ty = self.tu.decl(decl).ty;
        let nodes = self.tu.decl(decl).nodes.clone();
        if nodes.is_empty() {
            return self.type_str(ty);
        }
        let mut out = String::new();
        for (i, &node) in nodes.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let node_ty = self.tu.decl_node(node).ty;
            let name = self
                .tu
                .decl_node(node)
                .id
                .as_deref()
                .unwrap_or("")
                .to_string();
            let init = self.tu.decl_node(node).init;
            out.push_str(&self.declarator_str(node_ty, name));
            if let Some(init) = init {
                write!(out, " = {}", self.expr_str(init)).ok();
            }
        }
        out
    }

    /// Build `inner` into a full declarator for `ty`.
    fn declarator_str(&mut self, ty: TypeId, inner: String) -> String {
        match &self.tu.ty(ty).kind {
            TypeKind::Ptr { base, mods } => {
                let base = *base;
                let mut s = String::from("*");
                s.push_str(&mods_prefix(*mods));
                s.push_str(&inner);
                self.declarator_str(base, s)
            }
            TypeKind::Arr { base, len, .. } => {
                let base = *base;
                let len = *len;
                let inner = parenthesize_if_ptr(inner);
                let len_str = match len {
                    Some(l) => self.expr_str(l),
                    None => String::new(),
                };
                self.declarator_str(base, format!("{}[{}]", inner, len_str))
            }
            TypeKind::Func {
                ret,
                params,
                varargs,
            } => {
                let ret = *ret;
                let params = params.clone();
                let varargs = *varargs;
                let inner = parenthesize_if_ptr(inner);
                let mut plist = String::new();
                for (i, &param) in params.iter().enumerate() {
                    if i > 0 {
                        plist.push_str(", ");
                    }
                    plist.push_str(&self.decl_str(param));
                }
                if varargs {
                    if !plist.is_empty() {
                        plist.push_str(", ");
                    }
                    plist.push_str("...");
                }
                self.declarator_str(ret, format!("{}({})", inner, plist))
            }
            TypeKind::Paren(base) => {
                let base = *base;
                self.declarator_str(base, format!("({})", inner))
            }
            _ => {
                let base = self.type_str(ty);
                if inner.is_empty() {
                    base
                } else {
                    format!("{} {}", base, inner)
                }
            }
        }
    }

    fn type_str(&mut self, ty: TypeId) -> String {
        match &self.tu.ty(ty).kind {
            TypeKind::Struct(data) | TypeKind::Union(data) => {
                let keyword = if matches!(self.tu.ty(ty).kind, TypeKind::Struct(_)) {
                    "struct"
                } else {
                    "union"
                };
                let name = data.name.clone();
                match name {
                    Some(name) => format!("{} {}", keyword, name),
                    None => {
                        let mut out = format!("{} {{ ", keyword);
                        for member in compound_members(self.tu, ty) {
                            let mty = member.ty(self.tu);
                            let name =
                                member.name(self.tu).map(|n| n.to_string()).unwrap_or_default();
                            out.push_str(&self.declarator_str(mty, name));
                            out.push_str("; ");
                        }
                        out.push('}');
                        out
                    }
                }
            }
            TypeKind::Enum { name, ids, .. } => {
                let name = name.clone();
                match name {
                    Some(name) => format!("enum {}", name),
                    None => {
                        let ids = ids.clone();
                        let mut out = String::from("enum { ");
                        for (i, &id) in ids.iter().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            if let Some(n) = &self.tu.decl_node(id).id {
                                out.push_str(n);
                            }
                            if let Some(val) = self.tu.decl_node(id).init {
                                write!(out, " = {}", self.expr_str(val)).ok();
                            }
                        }
                        out.push_str(" }");
                        out
                    }
                }
            }
            TypeKind::Typedef { name, of, .. } => match of {
                TypedefOf::Plain => name.to_string(),
                TypedefOf::Struct => format!("struct {}", name),
                TypedefOf::Union => format!("union {}", name),
                TypedefOf::Enum => format!("enum {}", name),
            },
            TypeKind::Mod { mods, base, .. } => {
                let mods = *mods;
                let base = *base;
                let mut out = mods_prefix(mods);
                match base {
                    Some(base) => out.push_str(&self.type_str(base)),
                    None => out.push_str("int"),
                }
                out
            }
            TypeKind::Paren(base) => {
                let base = *base;
                format!("({})", self.type_str(base))
            }
            TypeKind::Ptr { .. } | TypeKind::Arr { .. } | TypeKind::Func { .. } => {
                self.declarator_str(ty, String::new())
            }
            TypeKind::StaticAssert { expr, msg } => {
                let expr = *expr;
                let msg = msg.clone();
                format!("_Static_assert({}, \"{}\")", self.expr_str(expr), msg)
            }
            kind => kind.basic_name().to_string(),
        }
    }

    fn stmt(&mut self, stmt: StmtId) {
        match &self.tu.stmt(stmt).kind {
            StmtKind::Nop => self.out.push_str(";\n"),
            StmtKind::Decl(decl) => {
                let decl = *decl;
                let text = self.decl_str(decl);
                self.out.push_str(&text);
                self.out.push_str(";\n");
            }
            StmtKind::Label { name, stmt: inner } => {
                let name = name.to_string();
                let inner = *inner;
                write!(self.out, "{}:\n", name).ok();
                self.line_start();
                self.stmt(inner);
            }
            StmtKind::Case { val, stmt: inner } => {
                let (val, inner) = (*val, *inner);
                let v = self.expr_str(val);
                write!(self.out, "case {}:\n", v).ok();
                self.line_start();
                self.stmt(inner);
            }
            StmtKind::Default { stmt: inner } => {
                let inner = *inner;
                self.out.push_str("default:\n");
                self.line_start();
                self.stmt(inner);
            }
            StmtKind::If { cond, then, els } => {
                let (cond, then, els) = (*cond, *then, *els);
                let c = self.expr_str(cond);
                write!(self.out, "if ({}) ", c).ok();
                self.stmt(then);
                if let Some(els) = els {
                    self.line_start();
                    self.out.push_str("else ");
                    self.stmt(els);
                }
            }
            StmtKind::Switch { cond, body, .. } => {
                let (cond, body) = (*cond, *body);
                let c = self.expr_str(cond);
                write!(self.out, "switch ({}) ", c).ok();
                self.stmt(body);
            }
            StmtKind::Do { body, cond } => {
                let (body, cond) = (*body, *cond);
                self.out.push_str("do ");
                self.stmt(body);
                self.line_start();
                let c = self.expr_str(cond);
                write!(self.out, "while ({});\n", c).ok();
            }
            StmtKind::While { cond, body } => {
                let (cond, body) = (*cond, *body);
                let c = self.expr_str(cond);
                write!(self.out, "while ({}) ", c).ok();
                self.stmt(body);
            }
            StmtKind::For {
                init_decl,
                init_expr,
                cond,
                step,
                body,
                ..
            } => {
                let (init_decl, init_expr, cond, step, body) =
                    (*init_decl, *init_expr, *cond, *step, *body);
                self.out.push_str("for (");
                if let Some(d) = init_decl {
                    let text = self.decl_str(d);
                    self.out.push_str(&text);
                } else if let Some(e) = init_expr {
                    let text = self.expr_str(e);
                    self.out.push_str(&text);
                }
                self.out.push_str("; ");
                if let Some(c) = cond {
                    let text = self.expr_str(c);
                    self.out.push_str(&text);
                }
                self.out.push_str("; ");
                if let Some(s) = step {
                    let text = self.expr_str(s);
                    self.out.push_str(&text);
                }
                self.out.push_str(") ");
                self.stmt(body);
            }
            StmtKind::Goto { label } => {
                let label = label.to_string();
                write!(self.out, "goto {};\n", label).ok();
            }
            StmtKind::Continue { .. } => self.out.push_str("continue;\n"),
            StmtKind::Break { .. } => self.out.push_str("break;\n"),
            StmtKind::Return { expr, .. } => {
                let expr = *expr;
                match expr {
                    Some(e) => {
                        let text = self.expr_str(e);
                        write!(self.out, "return {};\n", text).ok();
                    }
                    None => self.out.push_str("return;\n"),
                }
            }
            StmtKind::Compound { stmts, .. } => {
                let stmts = stmts.clone();
                self.out.push_str("{\n");
                self.indent += 1;
                for s in stmts {
                    self.line_start();
                    self.stmt(s);
                }
                self.indent -= 1;
                self.line_start();
                self.out.push_str("}\n");
            }
            StmtKind::Expr(expr) => {
                let expr = *expr;
                let text = self.expr_str(expr);
                write!(self.out, "{};\n", text).ok();
            }
        }
    }

    fn expr_str(&mut self, expr: ExprId) -> String {
        match &self.tu.expr(expr).kind {
            ExprKind::Void => String::new(),
            ExprKind::Paren(inner) => {
                let inner = *inner;
                format!("({})", self.expr_str(inner))
            }
            ExprKind::Var(name) => name.to_string(),
            ExprKind::Assign { dest, val, op } => {
                let (dest, val, op) = (*dest, *val, *op);
                let op_str = match op {
                    Some(op) => format!("{}=", op.symbol()),
                    None => "=".to_string(),
                };
                format!(
                    "{} {} {}",
                    self.expr_str(dest),
                    op_str,
                    self.expr_str(val)
                )
            }
            ExprKind::ConstInt { val, .. } => format!("{}", val),
            ExprKind::ConstFloat { val, .. } => format!("{}", val),
            ExprKind::ConstStr { val, .. } => format!("{:?}", val),
            ExprKind::Bin { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                format!(
                    "{} {} {}",
                    self.expr_str(lhs),
                    op.symbol(),
                    self.expr_str(rhs)
                )
            }
            ExprKind::Unary { op, expr: inner } => {
                let (op, inner) = (*op, *inner);
                match op {
                    Oper::PostInc | Oper::PostDec => {
                        format!("{}{}", self.expr_str(inner), op.symbol())
                    }
                    _ => format!("{}{}", op.symbol(), self.expr_str(inner)),
                }
            }
            ExprKind::Cond { cond, then, els } => {
                let (cond, then, els) = (*cond, *then, *els);
                format!(
                    "{} ? {} : {}",
                    self.expr_str(cond),
                    self.expr_str(then),
                    self.expr_str(els)
                )
            }
            ExprKind::Cast { to, base } => {
                let (to, base) = (*to, *base);
                let ty = self.decl_str(to);
                format!("({}){}", ty, self.expr_str(base))
            }
            ExprKind::Call { func, args } => {
                let func = *func;
                let args = args.clone();
                let mut out = self.expr_str(func);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.expr_str(*arg));
                }
                out.push(')');
                out
            }
            ExprKind::Cmpd { exprs } => {
                let exprs = exprs.clone();
                exprs
                    .iter()
                    .map(|&e| self.expr_str(e))
                    .collect::<Vec<_>>()
                    .join(", ")
            }
            ExprKind::SizeOf { ty, expr: inner } => {
                let (ty, inner) = (*ty, *inner);
                match (ty, inner) {
                    (Some(ty), _) => format!("sizeof({})", self.decl_str(ty)),
                    (None, Some(e)) => format!("sizeof {}", self.expr_str(e)),
                    _ => "sizeof ?".to_string(),
                }
            }
            ExprKind::AlignOf { ty, expr: inner } => {
                let (ty, inner) = (*ty, *inner);
                match (ty, inner) {
                    (Some(ty), _) => format!("_Alignof({})", self.decl_str(ty)),
                    (None, Some(e)) => format!("_Alignof {}", self.expr_str(e)),
                    _ => "_Alignof ?".to_string(),
                }
            }
            ExprKind::OffsetOf { ty, path } => {
                let ty = *ty;
                let path = path.clone();
                let mut out = format!("__builtin_offsetof({}, ", self.decl_str(ty));
                for (i, step) in path.iter().enumerate() {
                    match &self.tu.expr(*step).kind {
                        ExprKind::MemAcc { name, .. } => {
                            if i > 0 {
                                out.push('.');
                            }
                            out.push_str(name);
                        }
                        ExprKind::ArrIdx { index, .. } => {
                            let index = *index;
                            let text = self.expr_str(index);
                            write!(out, "[{}]", text).ok();
                        }
                        _ => {}
                    }
                }
                out.push(')');
                out
            }
            ExprKind::MemAcc { base, name, arrow } => {
                let base = *base;
                let name = name.to_string();
                let sep = if *arrow { "->" } else { "." };
                match base {
                    Some(b) => format!("{}{}{}", self.expr_str(b), sep, name),
                    None => name,
                }
            }
            ExprKind::ArrIdx { base, index, .. } => {
                let (base, index) = (*base, *index);
                match base {
                    Some(b) => format!("{}[{}]", self.expr_str(b), self.expr_str(index)),
                    None => format!("[{}]", self.expr_str(index)),
                }
            }
            ExprKind::InitList { exprs } => {
                let exprs = exprs.clone();
                let mut out = String::from("{ ");
                for (i, &e) in exprs.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    if matches!(self.tu.expr(e).kind, ExprKind::Void) {
                        out.push_str("/* hole */");
                    } else {
                        out.push_str(&self.expr_str(e));
                    }
                }
                out.push_str(" }");
                out
            }
            ExprKind::DesigInit { name, val } => {
                let name = name.to_string();
                let val = *val;
                format!(".{} = {}", name, self.expr_str(val))
            }
            ExprKind::VaStart { ap, last } => {
                let (ap, last) = (*ap, *last);
                format!(
                    "__builtin_va_start({}, {})",
                    self.expr_str(ap),
                    self.expr_str(last)
                )
            }
            ExprKind::VaArg { ap, ty } => {
                let (ap, ty) = (*ap, *ty);
                format!(
                    "__builtin_va_arg({}, {})",
                    self.expr_str(ap),
                    self.decl_str(ty)
                )
            }
            ExprKind::VaEnd { ap } => {
                let ap = *ap;
                format!("__builtin_va_end({})", self.expr_str(ap))
            }
            ExprKind::VaCopy { dest, src } => {
                let (dest, src) = (*dest, *src);
                format!(
                    "__builtin_va_copy({}, {})",
                    self.expr_str(dest),
                    self.expr_str(src)
                )
            }
        }
    }
}

fn mods_prefix(mods: TypeMods) -> String {
    let mut out = String::new();
    for &bit in TypeMods::ALL_BITS {
        if mods.contains(bit) && bit != TypeMods::ALIGNAS {
            out.push_str(bit.name());
            out.push(' ');
        }
    }
    out
}

fn parenthesize_if_ptr(inner: String) -> String {
    if inner.starts_with('*') {
        format!("({})", inner)
    } else {
        inner
    }
}
