//! Expression grammar.
//!
//! Binary expressions are built by a precedence-climbing routine that keeps
//! left associativity without a grammar rule per precedence level. The
//! conditional operator binds below every binary operator and associates to
//! the right; its middle operand is a full expression.

use std::rc::Rc;

use crate::ast::layout;
use crate::ast::{
    ExprId, ExprKind, Oper, TypeKind, TypeMods, TY_CHAR, TY_DOUBLE, TY_FLOAT, TY_INT, TY_LONG,
    TY_LONG_DOUBLE, TY_LONG_LONG,
};
use crate::lexer::{TokenData, TokenKind};

use super::{PErr, PRes, Parser};

fn bin_op(kind: TokenKind) -> Option<Oper> {
    Some(match kind {
        TokenKind::Star => Oper::Times,
        TokenKind::Div => Oper::Div,
        TokenKind::Mod => Oper::Mod,
        TokenKind::Plus => Oper::Plus,
        TokenKind::Minus => Oper::Minus,
        TokenKind::LShift => Oper::LShift,
        TokenKind::RShift => Oper::RShift,
        TokenKind::Lt => Oper::Lt,
        TokenKind::Gt => Oper::Gt,
        TokenKind::Le => Oper::Le,
        TokenKind::Ge => Oper::Ge,
        TokenKind::Eq => Oper::Eq,
        TokenKind::Ne => Oper::Ne,
        TokenKind::BitAnd => Oper::BitAnd,
        TokenKind::BitXor => Oper::BitXor,
        TokenKind::BitOr => Oper::BitOr,
        TokenKind::LogicAnd => Oper::LogicAnd,
        TokenKind::LogicOr => Oper::LogicOr,
        _ => return None,
    })
}

fn prec(op: Option<Oper>) -> i32 {
    match op {
        None => 0,
        Some(Oper::Times) | Some(Oper::Div) | Some(Oper::Mod) => 10,
        Some(Oper::Plus) | Some(Oper::Minus) => 9,
        Some(Oper::LShift) | Some(Oper::RShift) => 8,
        Some(Oper::Lt) | Some(Oper::Gt) | Some(Oper::Le) | Some(Oper::Ge) => 7,
        Some(Oper::Eq) | Some(Oper::Ne) => 6,
        Some(Oper::BitAnd) => 5,
        Some(Oper::BitXor) => 4,
        Some(Oper::BitOr) => 3,
        Some(Oper::LogicAnd) => 2,
        Some(Oper::LogicOr) => 1,
        _ => 0,
    }
}

impl<'a> Parser<'a> {
    /// Comma expression.
    pub(crate) fn expression(&mut self) -> PRes<ExprId> {
        let first = self.assignment_expression()?;
        if self.cur_kind() != TokenKind::Comma {
            return Ok(first);
        }
        let mark = self.mark();
        let mut exprs = vec![first];
        while self.cur_kind() == TokenKind::Comma {
            self.advance();
            exprs.push(self.assignment_expression()?);
        }
        Ok(self.tu.new_expr(mark, ExprKind::Cmpd { exprs }))
    }

    pub(crate) fn assignment_expression(&mut self) -> PRes<ExprId> {
        let left = self.cast_expression()?;
        let op = match self.cur_kind() {
            TokenKind::Assign => None,
            TokenKind::StarEq => Some(Oper::Times),
            TokenKind::DivEq => Some(Oper::Div),
            TokenKind::ModEq => Some(Oper::Mod),
            TokenKind::PlusEq => Some(Oper::Plus),
            TokenKind::MinusEq => Some(Oper::Minus),
            TokenKind::LShiftEq => Some(Oper::LShift),
            TokenKind::RShiftEq => Some(Oper::RShift),
            TokenKind::BitAndEq => Some(Oper::BitAnd),
            TokenKind::BitXorEq => Some(Oper::BitXor),
            TokenKind::BitOrEq => Some(Oper::BitOr),
            _ => return self.oper_expr_prec(None, Some(left)),
        };
        let mark = self.mark();
        self.advance();
        let val = self.assignment_expression()?;
        Ok(self.tu.new_expr(
            mark,
            ExprKind::Assign {
                dest: left,
                val,
                op,
            },
        ))
    }

    pub(crate) fn oper_expression(&mut self, left: Option<ExprId>) -> PRes<ExprId> {
        self.oper_expr_prec(None, left)
    }

    fn oper_expr_prec(&mut self, prev_op: Option<Oper>, left: Option<ExprId>) -> PRes<ExprId> {
        let mut left = match left {
            Some(left) => left,
            None => self.cast_expression()?,
        };

        loop {
            let op1 = match bin_op(self.cur_kind()) {
                Some(op) => op,
                None if self.cur_kind() == TokenKind::Question => {
                    // `?:` binds below everything; with a pending operator
                    // the caller finishes first.
                    if prev_op.is_some() {
                        return Ok(left);
                    }
                    let mark = self.mark();
                    self.advance();
                    let then = self.expression()?;
                    self.expect(TokenKind::Colon)?;
                    let els = self.oper_expr_prec(None, None)?;
                    left = self.tu.new_expr(
                        mark,
                        ExprKind::Cond {
                            cond: left,
                            then,
                            els,
                        },
                    );
                    continue;
                }
                None => return Ok(left),
            };
            let mark = self.mark();
            self.advance();

            let right = self.cast_expression()?;

            let op2 = match bin_op(self.cur_kind()) {
                Some(op) => Some(op),
                None if self.cur_kind() == TokenKind::Question => {
                    if prev_op.is_some() {
                        return Ok(self.tu.new_expr(
                            mark,
                            ExprKind::Bin {
                                op: op1,
                                lhs: left,
                                rhs: right,
                            },
                        ));
                    }
                    let cond_mark = self.mark();
                    self.advance();
                    let bin = self.tu.new_expr(
                        mark,
                        ExprKind::Bin {
                            op: op1,
                            lhs: left,
                            rhs: right,
                        },
                    );
                    let then = self.expression()?;
                    self.expect(TokenKind::Colon)?;
                    let els = self.oper_expr_prec(None, None)?;
                    return Ok(self.tu.new_expr(
                        cond_mark,
                        ExprKind::Cond {
                            cond: bin,
                            then,
                            els,
                        },
                    ));
                }
                None => {
                    return Ok(self.tu.new_expr(
                        mark,
                        ExprKind::Bin {
                            op: op1,
                            lhs: left,
                            rhs: right,
                        },
                    ));
                }
            };

            if prec(Some(op1)) >= prec(op2) {
                // Left associativity: combine now.
                let bin = self.tu.new_expr(
                    mark,
                    ExprKind::Bin {
                        op: op1,
                        lhs: left,
                        rhs: right,
                    },
                );
                if prec(prev_op) >= prec(op2) {
                    return Ok(bin);
                }
                left = bin;
            } else {
                // The upcoming operator binds tighter; let it eat `right`.
                let rhs = self.oper_expr_prec(Some(op1), Some(right))?;
                left = self.tu.new_expr(
                    mark,
                    ExprKind::Bin {
                        op: op1,
                        lhs: left,
                        rhs,
                    },
                );
            }
        }
    }

    pub(crate) fn cast_expression(&mut self) -> PRes<ExprId> {
        if self.cur_kind() != TokenKind::LParen {
            return self.unary_expression();
        }
        let mark = self.mark();
        let ty = match self.type_name(true) {
            Ok(ty) => ty,
            Err(PErr::Backtrack) => return self.unary_expression(),
            Err(e) => return Err(e),
        };
        // `(T){...}` is a compound literal.
        let base = if self.cur_kind() == TokenKind::LBrace {
            self.initializer()?
        } else {
            self.cast_expression()?
        };
        Ok(self.tu.new_expr(mark, ExprKind::Cast { to: ty, base }))
    }

    fn unary_expression(&mut self) -> PRes<ExprId> {
        let mark = self.mark();
        match self.cur_kind() {
            TokenKind::Inc | TokenKind::Dec => {
                let op = if self.cur_kind() == TokenKind::Inc {
                    Oper::PreInc
                } else {
                    Oper::PreDec
                };
                self.advance();
                let expr = self.unary_expression()?;
                Ok(self.tu.new_expr(mark, ExprKind::Unary { op, expr }))
            }
            TokenKind::Sizeof | TokenKind::Alignof => {
                let is_sizeof = self.cur_kind() == TokenKind::Sizeof;
                self.advance();
                let mut ty = None;
                let mut expr = None;
                if self.cur_kind() == TokenKind::LParen {
                    match self.type_name(true) {
                        Ok(t) => ty = Some(t),
                        Err(PErr::Backtrack) => expr = Some(self.unary_expression()?),
                        Err(e) => return Err(e),
                    }
                } else {
                    expr = Some(self.unary_expression()?);
                }
                let kind = if is_sizeof {
                    ExprKind::SizeOf { ty, expr }
                } else {
                    ExprKind::AlignOf { ty, expr }
                };
                Ok(self.tu.new_expr(mark, kind))
            }
            TokenKind::Offsetof => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let ty = self.type_name(false)?;
                self.expect(TokenKind::Comma)?;
                let path = self.mem_acc_list(true)?;
                self.expect(TokenKind::RParen)?;
                Ok(self.tu.new_expr(mark, ExprKind::OffsetOf { ty, path }))
            }
            TokenKind::VaStart => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let ap = self.assignment_expression()?;
                self.expect(TokenKind::Comma)?;
                let last = self.assignment_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(self.tu.new_expr(mark, ExprKind::VaStart { ap, last }))
            }
            TokenKind::VaArg => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let ap = self.assignment_expression()?;
                self.expect(TokenKind::Comma)?;
                let ty = self.type_name(false)?;
                self.expect(TokenKind::RParen)?;
                Ok(self.tu.new_expr(mark, ExprKind::VaArg { ap, ty }))
            }
            TokenKind::VaEnd => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let ap = self.assignment_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(self.tu.new_expr(mark, ExprKind::VaEnd { ap }))
            }
            TokenKind::VaCopy => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let dest = self.assignment_expression()?;
                self.expect(TokenKind::Comma)?;
                let src = self.assignment_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(self.tu.new_expr(mark, ExprKind::VaCopy { dest, src }))
            }
            TokenKind::BitAnd
            | TokenKind::Star
            | TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::BitNot
            | TokenKind::LogicNot => {
                let op = match self.cur_kind() {
                    TokenKind::BitAnd => Oper::Addr,
                    TokenKind::Star => Oper::Deref,
                    TokenKind::Plus => Oper::UPlus,
                    TokenKind::Minus => Oper::UMinus,
                    TokenKind::BitNot => Oper::BitNot,
                    _ => Oper::LogicNot,
                };
                self.advance();
                let expr = self.cast_expression()?;
                Ok(self.tu.new_expr(mark, ExprKind::Unary { op, expr }))
            }
            _ => self.postfix_expression(),
        }
    }

    fn postfix_expression(&mut self) -> PRes<ExprId> {
        let mut base = self.primary_expression()?;
        loop {
            let mark = self.mark();
            match self.cur_kind() {
                TokenKind::LBrack => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(TokenKind::RBrack)?;
                    base = self.tu.new_expr(
                        mark,
                        ExprKind::ArrIdx {
                            base: Some(base),
                            index,
                            const_idx: std::cell::Cell::new(0),
                        },
                    );
                }
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    while self.cur_kind() != TokenKind::RParen {
                        args.push(self.assignment_expression()?);
                        if self.cur_kind() == TokenKind::RParen {
                            break;
                        }
                        self.expect(TokenKind::Comma)?;
                    }
                    self.advance();
                    base = self.tu.new_expr(mark, ExprKind::Call { func: base, args });
                }
                TokenKind::Dot | TokenKind::Arrow => {
                    let arrow = self.cur_kind() == TokenKind::Arrow;
                    self.advance();
                    if self.cur_kind() != TokenKind::Id {
                        return Err(self.syntax_error(format!(
                            "expected member name, found '{}'",
                            self.cur_kind().describe()
                        )));
                    }
                    let name = Rc::clone(self.cur().id_name().expect("checked Id"));
                    self.advance();
                    base = self.tu.new_expr(
                        mark,
                        ExprKind::MemAcc {
                            base: Some(base),
                            name,
                            arrow,
                        },
                    );
                }
                TokenKind::Inc | TokenKind::Dec => {
                    let op = if self.cur_kind() == TokenKind::Inc {
                        Oper::PostInc
                    } else {
                        Oper::PostDec
                    };
                    self.advance();
                    base = self.tu.new_expr(mark, ExprKind::Unary { op, expr: base });
                }
                _ => return Ok(base),
            }
        }
    }

    fn primary_expression(&mut self) -> PRes<ExprId> {
        let mark = self.mark();
        match self.cur_kind() {
            TokenKind::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(TokenKind::RParen)?;
                if self.keep_parens {
                    Ok(self.tu.new_expr(mark, ExprKind::Paren(inner)))
                } else {
                    Ok(inner)
                }
            }
            TokenKind::Id => {
                let name = Rc::clone(self.cur().id_name().expect("checked Id"));
                self.advance();
                Ok(self.tu.new_expr(mark, ExprKind::Var(name)))
            }
            TokenKind::FuncName | TokenKind::String => {
                let is_func = self.cur_kind() == TokenKind::FuncName;
                let val: Rc<str> = if is_func {
                    match &self.func_name {
                        Some(name) => Rc::clone(name),
                        None => {
                            self.diag.warn(
                                Some(&mark),
                                "'__func__' is not defined outside of function scope",
                            );
                            "".into()
                        }
                    }
                } else {
                    Rc::clone(self.cur().str_val().expect("checked String"))
                };
                self.advance();
                let nelems = val.len() + 1;
                let ty = self.tu.new_type(
                    mark.clone(),
                    TypeKind::Arr {
                        base: TY_CHAR,
                        len: None,
                        nelems: std::cell::Cell::new(Some(nelems)),
                    },
                );
                Ok(self.tu.new_expr(mark, ExprKind::ConstStr { val, ty }))
            }
            TokenKind::IntLit => {
                let (val, has_u, has_l, has_ll) = match &self.cur().data {
                    TokenData::Int {
                        val,
                        has_u,
                        has_l,
                        has_ll,
                    } => (*val, *has_u, *has_l, *has_ll),
                    _ => unreachable!("IntLit without payload"),
                };
                self.advance();
                let ty = self.int_literal_type(&mark, val, has_u, has_l, has_ll);
                Ok(self.tu.new_expr(
                    mark,
                    ExprKind::ConstInt {
                        val: val as i64,
                        ty,
                    },
                ))
            }
            TokenKind::FloatLit => {
                let (val, has_f, has_l) = match &self.cur().data {
                    TokenData::Float { val, has_f, has_l } => (*val, *has_f, *has_l),
                    _ => unreachable!("FloatLit without payload"),
                };
                self.advance();
                let ty = if has_f {
                    TY_FLOAT
                } else if has_l {
                    TY_LONG_DOUBLE
                } else {
                    TY_DOUBLE
                };
                Ok(self
                    .tu
                    .new_expr(mark, ExprKind::ConstFloat { val, ty }))
            }
            kind => Err(self.syntax_error(format!(
                "unexpected token '{}', expected primary expression",
                kind.describe()
            ))),
        }
    }

    /// Select the type of an integer constant from its value and suffixes.
    /// An unsuffixed decimal that does not fit `int` is promoted, with a
    /// warning when it thereby turns unsigned.
    fn int_literal_type(
        &mut self,
        mark: &crate::mark::Mark,
        val: u64,
        has_u: bool,
        has_l: bool,
        has_ll: bool,
    ) -> crate::ast::TypeId {
        let mut need_u = false;
        let mut need_l = false;
        let mut need_ll = false;
        if val > i64::MAX as u64 {
            need_ll = true;
            need_u = true;
        } else if val > u32::MAX as u64 {
            need_l = true;
        } else if val > i32::MAX as u64 {
            need_u = true;
        }

        let explicit = if has_ll {
            TY_LONG_LONG
        } else if has_l {
            TY_LONG
        } else {
            TY_INT
        };
        let explicit_size = layout::type_size(self.tu, explicit);
        let ll_size = layout::type_size(self.tu, TY_LONG_LONG);

        let base = if need_ll && need_u {
            if !has_u && explicit_size < ll_size {
                self.diag.warn(
                    Some(mark),
                    "integer constant is so large that it is unsigned",
                );
            }
            TY_LONG_LONG
        } else if need_ll && explicit_size < ll_size {
            TY_LONG_LONG
        } else if need_l && explicit_size < ll_size {
            TY_LONG
        } else {
            explicit
        };

        if has_u || need_u {
            self.tu.new_type(
                mark.clone(),
                TypeKind::Mod {
                    mods: TypeMods::UNSIGNED,
                    base: Some(base),
                    alignas_ty: None,
                    alignas_expr: None,
                    alignas_align: std::cell::Cell::new(0),
                },
            )
        } else {
            base
        }
    }

    /// `.name` / `[index]` access paths for `offsetof`. With `nodot` the
    /// first segment needs no leading dot.
    fn mem_acc_list(&mut self, mut nodot: bool) -> PRes<Vec<ExprId>> {
        let mut path = Vec::new();
        loop {
            let mark = self.mark();
            if nodot || self.cur_kind() == TokenKind::Dot {
                if !nodot {
                    self.advance();
                }
                nodot = false;
                if self.cur_kind() != TokenKind::Id {
                    return Err(self.syntax_error(format!(
                        "expected member name, found '{}'",
                        self.cur_kind().describe()
                    )));
                }
                let name = Rc::clone(self.cur().id_name().expect("checked Id"));
                self.advance();
                path.push(self.tu.new_expr(
                    mark,
                    ExprKind::MemAcc {
                        base: None,
                        name,
                        arrow: false,
                    },
                ));
            } else if self.cur_kind() == TokenKind::LBrack {
                self.advance();
                let index = self.expression()?;
                self.expect(TokenKind::RBrack)?;
                path.push(self.tu.new_expr(
                    mark,
                    ExprKind::ArrIdx {
                        base: None,
                        index,
                        const_idx: std::cell::Cell::new(0),
                    },
                ));
            } else {
                return Ok(path);
            }
        }
    }

    pub(crate) fn initializer(&mut self) -> PRes<ExprId> {
        if self.cur_kind() != TokenKind::LBrace {
            return self.assignment_expression();
        }
        self.advance();
        let list = self.initializer_list()?;
        self.expect(TokenKind::RBrace)?;
        Ok(list)
    }

    fn initializer_list(&mut self) -> PRes<ExprId> {
        let mark = self.mark();
        let mut exprs = Vec::new();
        loop {
            if self.cur_kind() == TokenKind::Comma {
                self.advance();
            }
            if self.cur_kind() == TokenKind::RBrace {
                break; // trailing commas allowed
            }
            let item = if self.cur_kind() == TokenKind::Dot {
                let mark = self.mark();
                self.advance();
                if self.cur_kind() != TokenKind::Id || self.next_kind() != TokenKind::Assign {
                    return Err(self.syntax_error("expected '.name =' designator"));
                }
                let name = Rc::clone(self.cur().id_name().expect("checked Id"));
                self.advance();
                self.advance();
                let val = self.initializer()?;
                self.tu.new_expr(mark, ExprKind::DesigInit { name, val })
            } else {
                self.initializer()?
            };
            exprs.push(item);
        }
        Ok(self.tu.new_expr(mark, ExprKind::InitList { exprs }))
    }
}
