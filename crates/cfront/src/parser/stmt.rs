//! Statement grammar.
//!
//! Compound statements open a fresh scope; a `for` whose initializer is a
//! declaration gets its own scope covering the loop. `case`/`default`/
//! `break`/`continue`/`goto` are parsed structurally here and wired to
//! their targets by the analyzer.

use std::rc::Rc;

use crate::ast::{StmtId, StmtKind};
use crate::lexer::TokenKind;

use super::{PRes, Parser};

impl<'a> Parser<'a> {
    pub(crate) fn statement(&mut self) -> PRes<StmtId> {
        match self.cur_kind() {
            TokenKind::Id => {
                if self.next_kind() == TokenKind::Colon {
                    self.labeled_statement()
                } else {
                    self.expression_statement()
                }
            }
            TokenKind::Case | TokenKind::Default => self.labeled_statement(),
            TokenKind::If | TokenKind::Switch => self.selection_statement(),
            TokenKind::Do | TokenKind::While | TokenKind::For => self.iteration_statement(),
            TokenKind::Goto | TokenKind::Continue | TokenKind::Break | TokenKind::Return => {
                self.jump_statement()
            }
            TokenKind::LBrace => self.compound_statement(),
            _ => self.expression_statement(),
        }
    }

    fn labeled_statement(&mut self) -> PRes<StmtId> {
        let mark = self.mark();
        match self.cur_kind() {
            TokenKind::Id => {
                let name = Rc::clone(self.cur().id_name().expect("checked Id"));
                self.advance();
                self.expect(TokenKind::Colon)?;
                let stmt = self.statement()?;
                Ok(self
                    .tu
                    .new_stmt(mark, StmtKind::Label { name, stmt }))
            }
            TokenKind::Case => {
                self.advance();
                let val = self.oper_expression(None)?;
                self.expect(TokenKind::Colon)?;
                let stmt = self.statement()?;
                Ok(self.tu.new_stmt(mark, StmtKind::Case { val, stmt }))
            }
            TokenKind::Default => {
                self.advance();
                self.expect(TokenKind::Colon)?;
                let stmt = self.statement()?;
                Ok(self.tu.new_stmt(mark, StmtKind::Default { stmt }))
            }
            _ => unreachable!("checked by statement"),
        }
    }

    fn selection_statement(&mut self) -> PRes<StmtId> {
        let mark = self.mark();
        match self.cur_kind() {
            TokenKind::If => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.expression()?;
                self.expect(TokenKind::RParen)?;
                let then = self.statement()?;
                let els = if self.cur_kind() == TokenKind::Else {
                    self.advance();
                    Some(self.statement()?)
                } else {
                    None
                };
                Ok(self.tu.new_stmt(mark, StmtKind::If { cond, then, els }))
            }
            TokenKind::Switch => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.expression()?;
                self.expect(TokenKind::RParen)?;
                let body = self.statement()?;
                Ok(self.tu.new_stmt(
                    mark,
                    StmtKind::Switch {
                        cond,
                        body,
                        cases: Vec::new(),
                        default: None,
                    },
                ))
            }
            _ => unreachable!("checked by statement"),
        }
    }

    fn iteration_statement(&mut self) -> PRes<StmtId> {
        let mark = self.mark();
        match self.cur_kind() {
            TokenKind::Do => {
                self.advance();
                let body = self.statement()?;
                self.expect(TokenKind::While)?;
                self.expect(TokenKind::LParen)?;
                let cond = self.expression()?;
                self.expect(TokenKind::RParen)?;
                self.expect(TokenKind::Semi)?;
                Ok(self.tu.new_stmt(mark, StmtKind::Do { body, cond }))
            }
            TokenKind::While => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.expression()?;
                self.expect(TokenKind::RParen)?;
                let body = self.statement()?;
                Ok(self.tu.new_stmt(mark, StmtKind::While { cond, body }))
            }
            TokenKind::For => {
                self.advance();
                self.expect(TokenKind::LParen)?;

                let mut init_decl = None;
                let mut init_expr = None;
                let mut scope = None;
                if self.cur_kind() != TokenKind::Semi {
                    if self.starts_declaration() {
                        init_decl = Some(self.declaration(None, false)?);
                        scope = Some(self.tu.scopes.new_scope(Some(self.scope)));
                    } else {
                        init_expr = Some(self.expression()?);
                    }
                }
                self.expect(TokenKind::Semi)?;

                let cond = if self.cur_kind() != TokenKind::Semi {
                    Some(self.expression()?)
                } else {
                    None
                };
                self.expect(TokenKind::Semi)?;

                let step = if self.cur_kind() != TokenKind::RParen {
                    Some(self.expression()?)
                } else {
                    None
                };
                self.expect(TokenKind::RParen)?;

                let saved = self.scope;
                if let Some(s) = scope {
                    self.scope = s;
                }
                let body = self.statement();
                self.scope = saved;
                let body = body?;

                Ok(self.tu.new_stmt(
                    mark,
                    StmtKind::For {
                        init_decl,
                        scope,
                        init_expr,
                        cond,
                        step,
                        body,
                    },
                ))
            }
            _ => unreachable!("checked by statement"),
        }
    }

    fn jump_statement(&mut self) -> PRes<StmtId> {
        let mark = self.mark();
        match self.cur_kind() {
            TokenKind::Goto => {
                self.advance();
                if self.cur_kind() != TokenKind::Id {
                    return Err(self.syntax_error("expected label name after goto"));
                }
                let label = Rc::clone(self.cur().id_name().expect("checked Id"));
                self.advance();
                self.expect(TokenKind::Semi)?;
                Ok(self.tu.new_stmt(mark, StmtKind::Goto { label }))
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semi)?;
                Ok(self.tu.new_stmt(
                    mark,
                    StmtKind::Continue {
                        parent: std::cell::Cell::new(None),
                    },
                ))
            }
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semi)?;
                Ok(self.tu.new_stmt(
                    mark,
                    StmtKind::Break {
                        parent: std::cell::Cell::new(None),
                    },
                ))
            }
            TokenKind::Return => {
                self.advance();
                let expr = if self.cur_kind() != TokenKind::Semi {
                    Some(self.expression()?)
                } else {
                    None
                };
                self.expect(TokenKind::Semi)?;
                Ok(self.tu.new_stmt(
                    mark,
                    StmtKind::Return {
                        expr,
                        ret_ty: std::cell::Cell::new(None),
                    },
                ))
            }
            _ => unreachable!("checked by statement"),
        }
    }

    pub(crate) fn compound_statement(&mut self) -> PRes<StmtId> {
        let mark = self.mark();
        let scope = self.tu.scopes.new_scope(Some(self.scope));
        let saved = self.scope;
        self.scope = scope;

        let result = self.compound_body(mark, scope);

        self.scope = saved;
        result
    }

    fn compound_body(&mut self, mark: crate::mark::Mark, scope: crate::type_table::ScopeId) -> PRes<StmtId> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while self.cur_kind() != TokenKind::RBrace {
            if self.cur_kind() == TokenKind::Eof {
                return Err(self.syntax_error("unexpected end of file in compound statement"));
            }
            let stmt = if self.starts_declaration() {
                let mark = self.mark();
                let decl = self.declaration(None, false)?;
                self.expect(TokenKind::Semi)?;
                self.tu.new_stmt(mark, StmtKind::Decl(decl))
            } else {
                self.statement()?
            };
            stmts.push(stmt);
        }
        self.advance(); // consume the closing brace
        Ok(self.tu.new_stmt(mark, StmtKind::Compound { stmts, scope }))
    }

    /// Whether the current token opens a declaration rather than a
    /// statement; an identifier does only when it names a typedef and is
    /// not a label.
    fn starts_declaration(&self) -> bool {
        match self.cur_kind() {
            TokenKind::Id => {
                if self.next_kind() == TokenKind::Colon {
                    return false;
                }
                self.cur()
                    .id_name()
                    .map(|n| self.tu.scopes.lookup_typedef(self.scope, n).is_some())
                    .unwrap_or(false)
            }
            k => {
                super::is_storage_class(k)
                    || super::is_type_spec_no_id(k)
                    || super::is_type_qualifier(k)
            }
        }
    }

    fn expression_statement(&mut self) -> PRes<StmtId> {
        let mark = self.mark();
        let stmt = if self.cur_kind() == TokenKind::Semi {
            self.tu.new_stmt(mark, StmtKind::Nop)
        } else {
            let expr = self.expression()?;
            self.tu.new_stmt(mark, StmtKind::Expr(expr))
        };
        self.expect(TokenKind::Semi)?;
        Ok(stmt)
    }
}
