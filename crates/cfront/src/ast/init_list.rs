//! Initializer-list canonicalization.
//!
//! Rewrites an `InitList` in place until it matches the target aggregate
//! one-to-one: designated initializers move to their field's position
//! (overwriting any positional value there), unfilled slots become `Void`
//! placeholders, and values for aggregate-typed members are wrapped into
//! nested lists which are canonicalized recursively. Designators that name a
//! field of an anonymous member are collected into a synthetic nested list
//! for that member. Running the pass on an already canonical list changes
//! nothing.

use std::rc::Rc;

use crate::diag::DiagCtx;

use super::layout;
use super::{compound_members, ExprId, ExprKind, Member, TransUnit, TypeId, TypeKind};

/// A position in the canonical list: a named member, or an anonymous
/// aggregate whose fields are addressable from the outer braces.
struct Slot {
    member: Member,
    anon: bool,
}

fn member_slots(tu: &TransUnit, ty: TypeId) -> Vec<Slot> {
    compound_members(tu, ty)
        .into_iter()
        .filter_map(|member| {
            if member.name(tu).is_some() {
                Some(Slot {
                    member,
                    anon: false,
                })
            } else if member.is_anon_compound(tu) {
                Some(Slot { member, anon: true })
            } else {
                // Unnamed bit-field padding takes no initializer.
                None
            }
        })
        .collect()
}

pub fn canonicalize(tu: &mut TransUnit, diag: &DiagCtx, ty: TypeId, expr: ExprId) -> bool {
    debug_assert!(tu.ty(ty).kind.is_compound());
    let items = match &tu.expr(expr).kind {
        ExprKind::InitList { exprs } => exprs.clone(),
        _ => return true,
    };
    if items.is_empty() {
        return true;
    }
    let has_desig = items
        .iter()
        .any(|&e| matches!(tu.expr(e).kind, ExprKind::DesigInit { .. }));

    if matches!(tu.ty(ty).kind, TypeKind::Union(_)) {
        return canonicalize_union(tu, diag, ty, expr, &items, has_desig);
    }

    let slots = member_slots(tu, ty);
    let has_compound = slots
        .iter()
        .any(|s| tu.ty(tu.unmod(s.member.ty(tu))).kind.is_compound());
    if !has_desig && !has_compound {
        return true;
    }

    let mut ok = true;
    let list_mark = tu.expr(expr).mark.clone();

    // Phase 1: pair values with slots. Positional values fill successive
    // slots; a designator jumps to its field and positional filling resumes
    // after it.
    let mut values: Vec<Option<ExprId>> = vec![None; slots.len()];
    let mut anon_extra: Vec<Vec<ExprId>> = vec![Vec::new(); slots.len()];
    let mut cursor = 0usize;
    let mut warned_excess = false;
    for &item in &items {
        match &tu.expr(item).kind {
            ExprKind::DesigInit { name, val } => {
                let name = Rc::clone(name);
                let val = *val;
                let named = slots.iter().position(|s| {
                    s.member
                        .name(tu)
                        .map(|n| **n == *name)
                        .unwrap_or(false)
                });
                if let Some(idx) = named {
                    values[idx] = Some(val);
                    cursor = idx + 1;
                    continue;
                }
                let inside_anon = slots.iter().position(|s| {
                    s.anon
                        && layout::find_member(tu, tu.unmod(s.member.ty(tu)), &name).is_some()
                });
                match inside_anon {
                    Some(idx) => anon_extra[idx].push(item),
                    None => {
                        let mark = tu.expr(item).mark.clone();
                        diag.error(
                            Some(&mark),
                            format!("unknown field '{}' specified in initializer", name),
                        );
                        ok = false;
                    }
                }
            }
            _ => {
                if cursor < slots.len() {
                    values[cursor] = Some(item);
                    cursor += 1;
                } else if !warned_excess {
                    let mark = tu.expr(item).mark.clone();
                    diag.warn(Some(&mark), "excess elements in struct initializer");
                    warned_excess = true;
                }
            }
        }
    }

    // Without designators the list may legitimately be shorter than the
    // struct; only designators force placeholders up to the last named slot.
    let filled = if has_desig {
        slots.len()
    } else {
        values
            .iter()
            .rposition(|v| v.is_some())
            .map(|i| i + 1)
            .unwrap_or(0)
    };

    // Phase 2: emit one entry per slot, descending into aggregate members.
    let mut result = Vec::with_capacity(filled);
    for (idx, slot) in slots.iter().take(filled).enumerate() {
        let member_ty = tu.unmod(slot.member.ty(tu));
        let is_comp = tu.ty(member_ty).kind.is_compound();
        let value = values[idx];
        if !is_comp {
            let entry = match value {
                Some(v) => v,
                None => tu.new_expr(list_mark.clone(), ExprKind::Void),
            };
            result.push(entry);
            continue;
        }

        let extra = std::mem::take(&mut anon_extra[idx]);
        let nested = match value {
            Some(v) if matches!(tu.expr(v).kind, ExprKind::InitList { .. }) => {
                if !extra.is_empty() {
                    if let ExprKind::InitList { exprs } = &mut tu.expr_mut(v).kind {
                        exprs.extend(extra);
                    }
                }
                v
            }
            Some(v) if matches!(tu.expr(v).kind, ExprKind::Void) => {
                tu.new_expr(list_mark.clone(), ExprKind::InitList { exprs: extra })
            }
            Some(v) => {
                let mark = tu.expr(v).mark.clone();
                let mut exprs = vec![v];
                exprs.extend(extra);
                tu.new_expr(mark, ExprKind::InitList { exprs })
            }
            None => tu.new_expr(list_mark.clone(), ExprKind::InitList { exprs: extra }),
        };
        ok &= canonicalize(tu, diag, member_ty, nested);
        result.push(nested);
    }

    if let ExprKind::InitList { exprs } = &mut tu.expr_mut(expr).kind {
        *exprs = result;
    }
    ok
}

/// A union keeps exactly one element: the last value selected by a
/// designator, or the first positional one. Designators naming fields of an
/// anonymous aggregate are bundled into a synthetic nested list for that
/// member; its own canonicalization happens when the member is checked.
fn canonicalize_union(
    tu: &mut TransUnit,
    diag: &DiagCtx,
    ty: TypeId,
    expr: ExprId,
    items: &[ExprId],
    has_desig: bool,
) -> bool {
    let mut ok = true;
    let slots = member_slots(tu, ty);

    enum Sel {
        None,
        Item(ExprId),
        Anon(usize, Vec<ExprId>),
    }
    let mut sel = Sel::None;
    for &item in items {
        match &tu.expr(item).kind {
            ExprKind::DesigInit { name, .. } => {
                let name = Rc::clone(name);
                let direct = slots.iter().any(|s| {
                    s.member.name(tu).map(|n| **n == *name).unwrap_or(false)
                });
                if direct {
                    sel = Sel::Item(item);
                    continue;
                }
                let inside = slots.iter().position(|s| {
                    s.anon
                        && layout::find_member(tu, tu.unmod(s.member.ty(tu)), &name).is_some()
                });
                match inside {
                    Some(idx) => match &mut sel {
                        Sel::Anon(cur, list) if *cur == idx => list.push(item),
                        _ => sel = Sel::Anon(idx, vec![item]),
                    },
                    None => {
                        let mark = tu.expr(item).mark.clone();
                        diag.error(
                            Some(&mark),
                            format!("unknown field '{}' specified in initializer", name),
                        );
                        ok = false;
                    }
                }
            }
            _ => {
                if matches!(sel, Sel::None) {
                    sel = Sel::Item(item);
                } else if !has_desig {
                    let mark = tu.expr(item).mark.clone();
                    diag.warn(Some(&mark), "excess elements in union initializer");
                }
            }
        }
    }

    let elem = match sel {
        Sel::None => return ok,
        Sel::Item(item) => item,
        Sel::Anon(_, exprs) => {
            let mark = tu.expr(expr).mark.clone();
            tu.new_expr(mark, ExprKind::InitList { exprs })
        }
    };
    if let ExprKind::InitList { exprs } = &mut tu.expr_mut(expr).kind {
        *exprs = vec![elem];
    }
    ok
}

/// The member a canonical union initializer selects, and thus the type its
/// single value is checked against. A designator naming a field of an
/// anonymous member resolves to that member.
pub fn union_member_type(tu: &TransUnit, ty: TypeId, head: ExprId) -> Option<TypeId> {
    debug_assert!(matches!(tu.ty(ty).kind, TypeKind::Union(_)));
    let slots = member_slots(tu, ty);
    let member_for = |name: &str| {
        slots
            .iter()
            .find(|s| {
                s.member.name(tu).map(|n| **n == *name).unwrap_or(false)
                    || (s.anon
                        && layout::find_member(tu, tu.unmod(s.member.ty(tu)), name).is_some())
            })
            .map(|s| s.member.ty(tu))
    };
    match &tu.expr(head).kind {
        ExprKind::DesigInit { name, .. } => member_for(name),
        ExprKind::InitList { exprs } => {
            // A synthetic list of routed designators belongs to the
            // anonymous member its first designator names.
            let first_desig = exprs.iter().find_map(|&e| match &tu.expr(e).kind {
                ExprKind::DesigInit { name, .. } => Some(Rc::clone(name)),
                _ => None,
            });
            match first_desig {
                Some(name) => member_for(&name).or_else(|| slots.first().map(|s| s.member.ty(tu))),
                None => slots.first().map(|s| s.member.ty(tu)),
            }
        }
        _ => slots.first().map(|s| s.member.ty(tu)),
    }
}
