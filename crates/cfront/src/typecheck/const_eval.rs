//! Constant-expression evaluation.
//!
//! Walks an expression tree and folds it to an integer. Used for `#if`
//! arithmetic, array lengths, bit-field widths, enum values, `case` labels
//! and `_Static_assert`. Forms outside the constant subset yield `None`;
//! contexts that require a constant report the error.

use crate::ast::layout;
use crate::ast::{ExprId, ExprKind, Oper, TransUnit};
use crate::type_table::{OrdKind, ScopeId};

/// Evaluate a constant expression. Variable references resolve only to
/// enumerators, looked up through `scope`.
pub fn eval(tu: &TransUnit, scope: Option<ScopeId>, expr: ExprId) -> Option<i64> {
    eval_inner(tu, scope, expr, false)
}

/// Evaluate `#if` arithmetic: identifiers that survived macro expansion
/// count as `0`.
pub fn eval_pp(tu: &TransUnit, expr: ExprId) -> i64 {
    eval_inner(tu, None, expr, true).unwrap_or(0)
}

fn eval_inner(tu: &TransUnit, scope: Option<ScopeId>, expr: ExprId, pp_mode: bool) -> Option<i64> {
    match &tu.expr(expr).kind {
        ExprKind::Paren(base) => eval_inner(tu, scope, *base, pp_mode),
        ExprKind::ConstInt { val, .. } => Some(*val),
        ExprKind::Bin { op, lhs, rhs } => {
            let l = eval_inner(tu, scope, *lhs, pp_mode)?;
            let r = eval_inner(tu, scope, *rhs, pp_mode)?;
            Some(match op {
                Oper::Times => l.wrapping_mul(r),
                Oper::Div => {
                    if r == 0 {
                        return None;
                    }
                    l.wrapping_div(r)
                }
                Oper::Mod => {
                    if r == 0 {
                        return None;
                    }
                    l.wrapping_rem(r)
                }
                Oper::Plus => l.wrapping_add(r),
                Oper::Minus => l.wrapping_sub(r),
                Oper::LShift => l.wrapping_shl(r as u32),
                Oper::RShift => l.wrapping_shr(r as u32),
                Oper::Lt => (l < r) as i64,
                Oper::Gt => (l > r) as i64,
                Oper::Le => (l <= r) as i64,
                Oper::Ge => (l >= r) as i64,
                Oper::Eq => (l == r) as i64,
                Oper::Ne => (l != r) as i64,
                Oper::BitAnd => l & r,
                Oper::BitXor => l ^ r,
                Oper::BitOr => l | r,
                Oper::LogicAnd => (l != 0 && r != 0) as i64,
                Oper::LogicOr => (l != 0 || r != 0) as i64,
                _ => return None,
            })
        }
        ExprKind::Unary { op, expr: inner } => {
            let v = eval_inner(tu, scope, *inner, pp_mode)?;
            Some(match op {
                Oper::UPlus => v,
                Oper::UMinus => v.wrapping_neg(),
                Oper::BitNot => !v,
                Oper::LogicNot => (v == 0) as i64,
                _ => return None,
            })
        }
        ExprKind::Cond { cond, then, els } => {
            if eval_inner(tu, scope, *cond, pp_mode)? != 0 {
                eval_inner(tu, scope, *then, pp_mode)
            } else {
                eval_inner(tu, scope, *els, pp_mode)
            }
        }
        ExprKind::Cast { base, .. } => eval_inner(tu, scope, *base, pp_mode),
        ExprKind::SizeOf { ty, expr: e } => {
            let t = match (ty, e) {
                (Some(decl), _) => tu.decl_type(*decl),
                (None, Some(e)) => tu.expr(*e).etype.get()?,
                (None, None) => return None,
            };
            Some(layout::type_size(tu, t) as i64)
        }
        ExprKind::AlignOf { ty, expr: e } => {
            let t = match (ty, e) {
                (Some(decl), _) => tu.decl_type(*decl),
                (None, Some(e)) => tu.expr(*e).etype.get()?,
                (None, None) => return None,
            };
            Some(layout::type_align(tu, t) as i64)
        }
        ExprKind::OffsetOf { ty, path } => {
            let t = tu.decl_type(*ty);
            layout::path_offset(tu, t, path).map(|o| o as i64)
        }
        ExprKind::Var(name) => {
            if let Some(scope) = scope {
                if let Some((_, entry)) = tu.scopes.lookup_ord(scope, name) {
                    if entry.kind == OrdKind::EnumId {
                        return Some(entry.enum_val);
                    }
                }
            }
            if pp_mode {
                // Identifiers that survive expansion count as zero in
                // `#if` arithmetic.
                Some(0)
            } else {
                None
            }
        }
        _ => None,
    }
}
