//! Layout: sizes, alignments, member offsets.
//!
//! LP64 model. Struct layout walks the member declarations in order,
//! packing bit-field runs bit by bit; a field that would straddle its
//! declaring type's storage unit opens a new unit, a zero-width field aligns
//! the next one to a byte boundary, and the run's storage rounds up to whole
//! bytes when it closes. Results are cached on the compound type; a type
//! whose size cache is still empty is incomplete.

use super::{compound_members, Member, TransUnit, TypeId, TypeKind, TypeMods};
use crate::typecheck::const_eval;

pub const PTR_SIZE: usize = 8;
pub const PTR_ALIGN: usize = 8;

pub fn align_up(x: usize, align: usize) -> usize {
    if align <= 1 {
        return x;
    }
    let rem = x % align;
    if rem == 0 {
        x
    } else {
        x + align - rem
    }
}

fn prim_size(kind: &TypeKind) -> Option<usize> {
    Some(match kind {
        TypeKind::Void => 1,
        TypeKind::Bool => 1,
        TypeKind::Char => 1,
        TypeKind::Short => 2,
        TypeKind::Int => 4,
        TypeKind::Long => 8,
        TypeKind::LongLong => 8,
        TypeKind::Float => 4,
        TypeKind::Double => 8,
        TypeKind::LongDouble => 16,
        TypeKind::VaList => 24,
        _ => return None,
    })
}

fn prim_align(kind: &TypeKind) -> Option<usize> {
    Some(match kind {
        TypeKind::Void => 1,
        TypeKind::Bool => 1,
        TypeKind::Char => 1,
        TypeKind::Short => 2,
        TypeKind::Int => 4,
        TypeKind::Long => 8,
        TypeKind::LongLong => 8,
        TypeKind::Float => 4,
        TypeKind::Double => 8,
        TypeKind::LongDouble => 16,
        TypeKind::VaList => 8,
        _ => return None,
    })
}

pub fn type_size(tu: &TransUnit, t: TypeId) -> usize {
    let kind = &tu.ty(t).kind;
    if let Some(s) = prim_size(kind) {
        return s;
    }
    match kind {
        TypeKind::Struct(data) | TypeKind::Union(data) => {
            if let Some(size) = data.size.get() {
                return size;
            }
            let is_union = matches!(kind, TypeKind::Union(_));
            let mut walker = LayoutWalker::new(is_union);
            for member in compound_members(tu, t) {
                walker.place(tu, &member);
            }
            let (size, align) = walker.finish();
            data.size.set(Some(size));
            data.align.set(Some(align));
            size
        }
        TypeKind::Enum { base, .. } => type_size(tu, *base),
        TypeKind::Typedef { base, .. } => type_size(tu, *base),
        TypeKind::Mod { base, .. } => type_size(tu, (*base).unwrap_or(super::TY_INT)),
        TypeKind::Paren(base) => type_size(tu, *base),
        TypeKind::Func { .. } => PTR_SIZE,
        TypeKind::Arr { base, .. } => type_size(tu, *base) * arr_len(tu, t),
        TypeKind::Ptr { .. } => PTR_SIZE,
        TypeKind::StaticAssert { .. } => 0,
        _ => unreachable!("primitive sizes handled above"),
    }
}

pub fn type_align(tu: &TransUnit, t: TypeId) -> usize {
    let kind = &tu.ty(t).kind;
    if let Some(a) = prim_align(kind) {
        return a;
    }
    match kind {
        TypeKind::Struct(data) | TypeKind::Union(data) => {
            if let Some(align) = data.align.get() {
                return align;
            }
            // Computing the size fills both caches.
            type_size(tu, t);
            data.align.get().unwrap_or(1)
        }
        TypeKind::Enum { base, .. } => type_align(tu, *base),
        TypeKind::Typedef { base, .. } => type_align(tu, *base),
        TypeKind::Mod {
            mods,
            base,
            alignas_align,
            ..
        } => {
            let base_align = type_align(tu, (*base).unwrap_or(super::TY_INT));
            if mods.contains(TypeMods::ALIGNAS) {
                base_align.max(alignas_align.get())
            } else {
                base_align
            }
        }
        TypeKind::Paren(base) => type_align(tu, *base),
        TypeKind::Func { .. } => PTR_ALIGN,
        TypeKind::Arr { base, .. } => type_align(tu, *base),
        TypeKind::Ptr { .. } => PTR_ALIGN,
        TypeKind::StaticAssert { .. } => 1,
        _ => unreachable!("primitive alignments handled above"),
    }
}

/// Element count of an array type, falling back to evaluating the length
/// expression when the analyzer has not cached it yet.
pub fn arr_len(tu: &TransUnit, t: TypeId) -> usize {
    match &tu.ty(t).kind {
        TypeKind::Arr { len, nelems, .. } => {
            if let Some(n) = nelems.get() {
                return n;
            }
            let n = (*len)
                .and_then(|l| const_eval::eval(tu, None, l))
                .map(|v| v.max(0) as usize)
                .unwrap_or(0);
            nelems.set(Some(n));
            n
        }
        _ => 0,
    }
}

/// The width of a bit-field member, if it is one.
fn member_bit_width(tu: &TransUnit, member: &Member) -> Option<u32> {
    let node = member.node?;
    let dn = tu.decl_node(node);
    let width = dn.init?;
    if let Some(w) = dn.bit_width.get() {
        return Some(w);
    }
    let w = const_eval::eval(tu, None, width)
        .map(|v| v.max(0) as u32)
        .unwrap_or(0);
    dn.bit_width.set(Some(w));
    Some(w)
}

/// The shared state machine behind struct size and member offsets. Both
/// passes must walk the same way or cached sizes and reported offsets would
/// disagree.
struct LayoutWalker {
    is_union: bool,
    size: usize,
    max_align: usize,
    run_start: usize,
    /// Bits consumed since the start of the current bit-field run.
    bit_pos: Option<u64>,
}

impl LayoutWalker {
    fn new(is_union: bool) -> LayoutWalker {
        LayoutWalker {
            is_union,
            size: 0,
            max_align: 1,
            run_start: 0,
            bit_pos: None,
        }
    }

    /// Account for one member and return its byte offset (always 0 in a
    /// union).
    fn place(&mut self, tu: &TransUnit, member: &Member) -> usize {
        let mty = member.ty(tu);
        if self.is_union {
            self.max_align = self.max_align.max(type_align(tu, mty));
            self.size = self.size.max(type_size(tu, mty));
            return 0;
        }

        if let Some(width) = member_bit_width(tu, member) {
            let unit_align = type_align(tu, mty);
            let unit_bits = 8 * type_size(tu, mty) as u64;
            if self.bit_pos.is_none() {
                self.size = align_up(self.size, unit_align);
                self.run_start = self.size;
                self.bit_pos = Some(0);
            }
            let bit = self.bit_pos.unwrap_or(0);
            if width == 0 {
                // Zero width forces the next field to a byte boundary.
                self.bit_pos = Some(align_up(bit as usize, 8) as u64);
                return self.run_start + (bit / 8) as usize;
            }
            let bit = if unit_bits > 0 && (bit % unit_bits) + width as u64 > unit_bits {
                align_up(bit as usize, unit_bits as usize) as u64
            } else {
                bit
            };
            self.bit_pos = Some(bit + width as u64);
            self.max_align = self.max_align.max(unit_align);
            return self.run_start + (bit / 8) as usize;
        }

        self.flush_run();
        let align = type_align(tu, mty);
        self.max_align = self.max_align.max(align);
        self.size = align_up(self.size, align);
        let offset = self.size;
        self.size += type_size(tu, mty);
        offset
    }

    fn flush_run(&mut self) {
        if let Some(bits) = self.bit_pos.take() {
            self.size = self.run_start + ((bits as usize) + 7) / 8;
        }
    }

    fn finish(mut self) -> (usize, usize) {
        self.flush_run();
        (align_up(self.size, self.max_align), self.max_align)
    }
}

/// Find a member of a struct/union by name: its type and byte offset.
/// Members of anonymous aggregates are found recursively, their offsets
/// accumulated.
pub fn find_member(tu: &TransUnit, ty: TypeId, name: &str) -> Option<(TypeId, usize)> {
    let is_union = match &tu.ty(ty).kind {
        TypeKind::Struct(_) => false,
        TypeKind::Union(_) => true,
        _ => return None,
    };
    let mut walker = LayoutWalker::new(is_union);
    for member in compound_members(tu, ty) {
        let offset = walker.place(tu, &member);
        if let Some(n) = member.name(tu) {
            if &**n == name {
                return Some((member.ty(tu), offset));
            }
        } else if member.is_anon_compound(tu) {
            let inner = tu.unmod(member.ty(tu));
            if let Some((t, inner_off)) = find_member(tu, inner, name) {
                return Some((t, offset + inner_off));
            }
        }
    }
    None
}

/// Accumulated offset of an `offsetof` member path. Each element is a
/// base-less `MemAcc` or `ArrIdx` expression.
pub fn path_offset(tu: &TransUnit, ty: TypeId, path: &[super::ExprId]) -> Option<usize> {
    let mut ty = tu.unmod(ty);
    let mut offset = 0usize;
    for &step in path {
        match &tu.expr(step).kind {
            super::ExprKind::MemAcc { name, .. } => {
                let (member_ty, member_off) = find_member(tu, ty, name)?;
                offset += member_off;
                ty = tu.unmod(member_ty);
            }
            super::ExprKind::ArrIdx {
                index, const_idx, ..
            } => {
                let idx = match const_eval::eval(tu, None, *index) {
                    Some(v) => v.max(0) as usize,
                    None => const_idx.get(),
                };
                let base = match &tu.ty(ty).kind {
                    TypeKind::Arr { base, .. } => *base,
                    _ => return None,
                };
                offset += type_size(tu, base) * idx;
                ty = tu.unmod(base);
            }
            _ => return None,
        }
    }
    Some(offset)
}
