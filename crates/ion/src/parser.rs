//! Recursive-descent parser.
//!
//! Turns a flat token stream into an [`Ast`] rooted at a global [`ScopeId`]. Like the lexer,
//! the parser is an external collaborator from the resolver/emitter's point of view — nothing
//! downstream re-parses source text, it only walks the tree this module produces — but it has
//! to exist for the pipeline to run end to end.

use crate::ast::{
    Ast, BinaryOp, BuiltinTypeName, Declaration, ExprId, ExprKind, Procedure, ScopeData, ScopeId, StmtId, StmtKind,
    UnaryOp,
};
use crate::diagnostics::{CodeRange, DiagnosticBag};
use crate::intern::Interner;
use crate::token::{AssignOp, Keyword, Literal, Operator, Punct, Token, TokenKind};

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    ast: Ast,
    interner: &'a mut Interner,
    diagnostics: DiagnosticBag,
    scope_stack: Vec<ScopeId>,
}

/// Sentinel name used for an unnamed procedure-type parameter (`(int) -> int`). No source
/// identifier can ever intern to this text, so it can never collide with a real parameter.
const ANONYMOUS_PARAM: &str = "";

impl<'a> Parser<'a> {
    #[must_use]
    pub fn new(tokens: Vec<Token>, interner: &'a mut Interner) -> Self {
        Self {
            tokens,
            pos: 0,
            ast: Ast::new(),
            interner,
            diagnostics: DiagnosticBag::new(),
            scope_stack: Vec::new(),
        }
    }

    pub fn parse_program(mut self) -> (Ast, ScopeId, DiagnosticBag) {
        let global = self.ast.alloc_scope(ScopeData::new(true, None, None));
        self.scope_stack.push(global);
        while !self.at_eof() {
            if let Some(stmt) = self.parse_statement() {
                self.ast.scope_mut(global).statements.push(stmt);
            } else {
                self.synchronize();
            }
        }
        self.scope_stack.pop();
        (self.ast, global, self.diagnostics)
    }

    // -- token stream helpers -------------------------------------------------------------

    fn at_eof(&self) -> bool {
        matches!(self.tokens[self.pos].kind, TokenKind::EndOfFile)
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn current_range(&self) -> CodeRange {
        self.tokens[self.pos].range
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if !self.at_eof() {
            self.pos += 1;
        }
        tok
    }

    fn check_punct(&self, p: Punct) -> bool {
        matches!(self.peek(), TokenKind::Punct(x) if *x == p)
    }

    fn check_keyword(&self, k: Keyword) -> bool {
        matches!(self.peek(), TokenKind::Keyword(x) if *x == k)
    }

    fn eat_punct(&mut self, p: Punct) -> bool {
        if self.check_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: Punct, what: &str) -> bool {
        if self.eat_punct(p) {
            true
        } else {
            self.diagnostics.error(format!("expected {what}"), self.current_range());
            false
        }
    }

    fn expect_arrow(&mut self) -> bool {
        if matches!(self.peek(), TokenKind::Operator(Operator::Arrow)) {
            self.advance();
            true
        } else {
            self.diagnostics
                .error("expected '->' after parameter list", self.current_range());
            false
        }
    }

    fn current_scope(&self) -> ScopeId {
        *self.scope_stack.last().expect("scope stack is never empty while parsing")
    }

    /// Skips tokens until a statement boundary, so one parse error doesn't cascade.
    fn synchronize(&mut self) {
        loop {
            if self.at_eof() {
                return;
            }
            if self.check_punct(Punct::Semicolon) {
                self.advance();
                return;
            }
            if self.check_punct(Punct::RightBrace) {
                return;
            }
            self.advance();
        }
    }

    // -- statements -------------------------------------------------------------------------

    fn parse_statement(&mut self) -> Option<StmtId> {
        let start = self.current_range();
        let parent_scope = self.current_scope();

        if self.check_punct(Punct::LeftBrace) {
            let scope = self.parse_block()?;
            return Some(self.alloc_stmt(parent_scope, start, StmtKind::Scope(scope)));
        }
        if self.check_punct(Punct::Semicolon) {
            self.advance();
            return Some(self.alloc_stmt(parent_scope, start, StmtKind::Semicolon));
        }
        if self.check_keyword(Keyword::If) {
            return self.parse_if();
        }
        if self.check_keyword(Keyword::While) {
            return self.parse_while();
        }
        if self.check_keyword(Keyword::Break) {
            self.advance();
            self.expect_punct(Punct::Semicolon, "';' after 'break'");
            return Some(self.alloc_stmt(parent_scope, start, StmtKind::Break));
        }
        if self.check_keyword(Keyword::Continue) {
            self.advance();
            self.expect_punct(Punct::Semicolon, "';' after 'continue'");
            return Some(self.alloc_stmt(parent_scope, start, StmtKind::Continue));
        }
        if self.check_keyword(Keyword::Return) {
            self.advance();
            let value = if self.check_punct(Punct::Semicolon) {
                None
            } else {
                Some(self.parse_expression(parent_scope)?)
            };
            self.expect_punct(Punct::Semicolon, "';' after 'return'");
            return Some(self.alloc_stmt(parent_scope, start, StmtKind::Return(value)));
        }
        if self.check_keyword(Keyword::Print) {
            self.advance();
            let value = self.parse_expression(parent_scope)?;
            self.expect_punct(Punct::Semicolon, "';' after 'print'");
            return Some(self.alloc_stmt(parent_scope, start, StmtKind::Print(value)));
        }
        if matches!(self.peek(), TokenKind::Identifier(_))
            && matches!(self.peek_at(1), TokenKind::Punct(Punct::Colon) | TokenKind::Punct(Punct::ColonColon))
        {
            return self.parse_declaration();
        }

        // Assignment or expression statement.
        let target = self.parse_expression(parent_scope)?;
        if let TokenKind::Assign(op) = *self.peek() {
            self.advance();
            let value = self.parse_expression(parent_scope)?;
            self.expect_punct(Punct::Semicolon, "';' after assignment");
            return Some(self.alloc_stmt(parent_scope, start, StmtKind::Assignment { op, target, value }));
        }
        self.expect_punct(Punct::Semicolon, "';' after expression");
        Some(self.alloc_stmt(parent_scope, start, StmtKind::StatementExpression(target)))
    }

    fn alloc_stmt(&mut self, parent_scope: ScopeId, range: CodeRange, kind: StmtKind) -> StmtId {
        self.ast.alloc_stmt(crate::ast::StmtNode {
            parent_scope,
            range,
            kind,
        })
    }

    /// Parses `{ stmt* }` into a new non-global scope nested in the current scope.
    fn parse_block(&mut self) -> Option<ScopeId> {
        self.expect_punct(Punct::LeftBrace, "'{'");
        let parent = self.current_scope();
        let scope = self.ast.alloc_scope(ScopeData::new(false, None, Some(parent)));
        self.scope_stack.push(scope);
        while !self.check_punct(Punct::RightBrace) && !self.at_eof() {
            if let Some(stmt) = self.parse_statement() {
                self.ast.scope_mut(scope).statements.push(stmt);
            } else {
                self.synchronize();
            }
        }
        self.expect_punct(Punct::RightBrace, "'}'");
        self.scope_stack.pop();
        Some(scope)
    }

    /// Parses either `{ block }` or the `do` single-statement form. Both produce a `Scope`
    /// statement wrapping a nested, non-global scope that shares the enclosing function's
    /// frame: the `do` form is sugar for a one-statement block, not a bare statement spliced
    /// into the parent scope, so every `if`/`while` body is a genuine nested scope whose own
    /// `statements` list is the single source of truth for name lookup and duplicate checks.
    fn parse_body(&mut self) -> Option<StmtId> {
        let start = self.current_range();
        let parent_scope = self.current_scope();
        if self.check_punct(Punct::LeftBrace) {
            let scope = self.parse_block()?;
            return Some(self.alloc_stmt(parent_scope, start, StmtKind::Scope(scope)));
        }
        if self.check_keyword(Keyword::Do) {
            self.advance();
        } else {
            self.diagnostics
                .error("expected 'do' or '{' to start a statement body", self.current_range());
            return None;
        }
        let scope = self.ast.alloc_scope(ScopeData::new(false, None, Some(parent_scope)));
        self.scope_stack.push(scope);
        let inner = self.parse_statement();
        self.scope_stack.pop();
        if let Some(inner) = inner {
            self.ast.scope_mut(scope).statements.push(inner);
        }
        Some(self.alloc_stmt(parent_scope, start, StmtKind::Scope(scope)))
    }

    fn parse_if(&mut self) -> Option<StmtId> {
        let start = self.current_range();
        let parent_scope = self.current_scope();
        self.advance(); // 'if'
        let condition = self.parse_expression(parent_scope)?;
        let then_branch = self.parse_body()?;
        let else_branch = if self.check_keyword(Keyword::Else) {
            self.advance();
            Some(self.parse_body()?)
        } else {
            None
        };
        Some(self.alloc_stmt(
            parent_scope,
            start,
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
        ))
    }

    fn parse_while(&mut self) -> Option<StmtId> {
        let start = self.current_range();
        let parent_scope = self.current_scope();
        self.advance(); // 'while'
        let condition = self.parse_expression(parent_scope)?;
        let body = self.parse_body()?;
        Some(self.alloc_stmt(parent_scope, start, StmtKind::While { condition, body }))
    }

    fn parse_declaration(&mut self) -> Option<StmtId> {
        let start = self.current_range();
        let parent_scope = self.current_scope();
        let name_tok = self.advance();
        let TokenKind::Identifier(name) = name_tok.kind else {
            unreachable!("caller checked for Identifier");
        };
        let name_range = name_tok.range;

        let (type_expr, constant, value) = if self.eat_punct(Punct::ColonColon) {
            let value = self.parse_expression(parent_scope)?;
            (None, true, value)
        } else {
            self.expect_punct(Punct::Colon, "':' in declaration");
            if matches!(self.peek(), TokenKind::Assign(AssignOp::Equal)) {
                self.advance();
                let value = self.parse_expression(parent_scope)?;
                (None, false, value)
            } else {
                let ty = self.parse_type_expr(parent_scope)?;
                if matches!(self.peek(), TokenKind::Assign(AssignOp::Equal)) {
                    self.advance();
                    let value = self.parse_expression(parent_scope)?;
                    (Some(ty), false, value)
                } else if self.eat_punct(Punct::Colon) {
                    let value = self.parse_expression(parent_scope)?;
                    (Some(ty), true, value)
                } else {
                    self.diagnostics
                        .error("expected '=' or ':' in declaration", self.current_range());
                    return None;
                }
            }
        };
        self.expect_punct(Punct::Semicolon, "';' after declaration");
        let decl = Declaration::new(name, name_range, type_expr, Some(value), constant, None);
        Some(self.alloc_stmt(parent_scope, start, StmtKind::Declaration(decl)))
    }

    // -- expressions --------------------------------------------------------------------------

    fn parse_expression(&mut self, owner: ScopeId) -> Option<ExprId> {
        self.parse_equality(owner)
    }

    fn parse_equality(&mut self, owner: ScopeId) -> Option<ExprId> {
        let mut left = self.parse_relational(owner)?;
        loop {
            let op = match self.peek() {
                TokenKind::Operator(Operator::EqualEqual) => BinaryOp::Equal,
                TokenKind::Operator(Operator::NotEqual) => BinaryOp::NotEqual,
                _ => break,
            };
            let start = self.ast.expr(left).range;
            self.advance();
            let right = self.parse_relational(owner)?;
            left = self.alloc_binary(owner, start, op, left, right);
        }
        Some(left)
    }

    fn parse_relational(&mut self, owner: ScopeId) -> Option<ExprId> {
        let mut left = self.parse_additive(owner)?;
        loop {
            let op = match self.peek() {
                TokenKind::Operator(Operator::Less) => BinaryOp::Less,
                TokenKind::Operator(Operator::Greater) => BinaryOp::Greater,
                TokenKind::Operator(Operator::LessEqual) => BinaryOp::LessEqual,
                TokenKind::Operator(Operator::GreaterEqual) => BinaryOp::GreaterEqual,
                _ => break,
            };
            let start = self.ast.expr(left).range;
            self.advance();
            let right = self.parse_additive(owner)?;
            left = self.alloc_binary(owner, start, op, left, right);
        }
        Some(left)
    }

    fn parse_additive(&mut self, owner: ScopeId) -> Option<ExprId> {
        let mut left = self.parse_multiplicative(owner)?;
        loop {
            let op = match self.peek() {
                TokenKind::Operator(Operator::Plus) => BinaryOp::Add,
                TokenKind::Operator(Operator::Minus) => BinaryOp::Sub,
                _ => break,
            };
            let start = self.ast.expr(left).range;
            self.advance();
            let right = self.parse_multiplicative(owner)?;
            left = self.alloc_binary(owner, start, op, left, right);
        }
        Some(left)
    }

    fn parse_multiplicative(&mut self, owner: ScopeId) -> Option<ExprId> {
        let mut left = self.parse_unary(owner)?;
        loop {
            let op = match self.peek() {
                TokenKind::Operator(Operator::Star) => BinaryOp::Mul,
                TokenKind::Operator(Operator::Slash) => BinaryOp::Div,
                TokenKind::Operator(Operator::Percent) => BinaryOp::Mod,
                _ => break,
            };
            let start = self.ast.expr(left).range;
            self.advance();
            let right = self.parse_unary(owner)?;
            left = self.alloc_binary(owner, start, op, left, right);
        }
        Some(left)
    }

    fn alloc_binary(&mut self, owner: ScopeId, start: CodeRange, op: BinaryOp, left: ExprId, right: ExprId) -> ExprId {
        let range = start.with_end(self.ast.expr(right).range.end);
        self.alloc_expr_for_scope(owner, range, ExprKind::Binary { op, left, right })
    }

    fn parse_unary(&mut self, owner: ScopeId) -> Option<ExprId> {
        let start = self.current_range();
        let op = match self.peek() {
            TokenKind::Operator(Operator::Plus) => Some(UnaryOp::Plus),
            TokenKind::Operator(Operator::Minus) => Some(UnaryOp::Negate),
            TokenKind::Operator(Operator::Bang) => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary(owner)?;
            return Some(self.alloc_expr_for_scope(owner, start, ExprKind::Unary { op, operand }));
        }
        self.parse_postfix(owner)
    }

    fn parse_postfix(&mut self, owner: ScopeId) -> Option<ExprId> {
        let start = self.current_range();
        let mut expr = self.parse_primary(owner)?;
        loop {
            if self.eat_punct(Punct::LeftParen) {
                let mut args = Vec::new();
                if !self.check_punct(Punct::RightParen) {
                    loop {
                        args.push(self.parse_expression(owner)?);
                        if !self.eat_punct(Punct::Comma) {
                            break;
                        }
                    }
                }
                self.expect_punct(Punct::RightParen, "')' after call arguments");
                let range = start.with_end(self.current_range().end);
                expr = self.alloc_expr_for_scope(owner, range, ExprKind::Call { callee: expr, args });
            } else if matches!(self.peek(), TokenKind::Operator(Operator::Dot)) {
                self.advance();
                let member_tok = self.advance();
                let TokenKind::Identifier(member) = member_tok.kind else {
                    self.diagnostics
                        .error("expected member name after '.'", member_tok.range);
                    return None;
                };
                let range = start.with_end(member_tok.range.end);
                expr = self.alloc_expr_for_scope(owner, range, ExprKind::MemberAccess { base: expr, member });
            } else {
                break;
            }
        }
        Some(expr)
    }

    fn parse_primary(&mut self, owner: ScopeId) -> Option<ExprId> {
        let start = self.current_range();
        let tok = self.tokens[self.pos].clone();
        match tok.kind {
            TokenKind::Literal(Literal::Integer(value)) => {
                self.advance();
                Some(self.alloc_expr_for_scope(owner, start, ExprKind::Integer(value)))
            }
            TokenKind::Literal(Literal::Float(value)) => {
                self.advance();
                Some(self.alloc_expr_for_scope(owner, start, ExprKind::Float(value)))
            }
            TokenKind::Literal(Literal::String(id)) => {
                self.advance();
                Some(self.alloc_expr_for_scope(owner, start, ExprKind::String(id)))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Some(self.alloc_expr_for_scope(owner, start, ExprKind::True))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Some(self.alloc_expr_for_scope(owner, start, ExprKind::False))
            }
            TokenKind::Keyword(Keyword::Cast) => self.parse_cast_or_transmute(owner, true),
            TokenKind::Keyword(Keyword::Transmute) => self.parse_cast_or_transmute(owner, false),
            TokenKind::Keyword(Keyword::TypeOf) => {
                self.advance();
                self.expect_punct(Punct::LeftParen, "'(' after 'typeof'");
                let inner = self.parse_expression(owner)?;
                self.expect_punct(Punct::RightParen, "')' after typeof operand");
                Some(self.alloc_expr_for_scope(owner, start, ExprKind::TypeOf(inner)))
            }
            TokenKind::Keyword(Keyword::SizeOf) => {
                self.advance();
                self.expect_punct(Punct::LeftParen, "'(' after 'sizeof'");
                let inner = self.parse_expression(owner)?;
                self.expect_punct(Punct::RightParen, "')' after sizeof operand");
                Some(self.alloc_expr_for_scope(owner, start, ExprKind::SizeOf(inner)))
            }
            TokenKind::Keyword(Keyword::Struct) => self.parse_struct_literal(owner),
            TokenKind::Punct(Punct::LeftParen) => self.parse_procedure_literal(owner),
            TokenKind::Identifier(name) => {
                self.advance();
                if let Some(builtin) = BuiltinTypeName::from_str(self.interner.resolve(name)) {
                    return Some(self.alloc_expr_for_scope(owner, start, ExprKind::BuiltinType(builtin)));
                }
                Some(self.alloc_expr_for_scope(owner, start, ExprKind::Name { name, resolved: None }))
            }
            _ => {
                self.diagnostics.error("unexpected token in expression", start);
                self.advance();
                Some(self.alloc_expr_for_scope(owner, start, ExprKind::InvalidExpression))
            }
        }
    }

    fn parse_cast_or_transmute(&mut self, owner: ScopeId, is_cast: bool) -> Option<ExprId> {
        let start = self.current_range();
        self.advance(); // 'cast' | 'transmute'
        self.expect_punct(Punct::LeftParen, "'(' after cast/transmute keyword");
        let target_type = self.parse_type_expr(owner)?;
        self.expect_punct(Punct::RightParen, "')' after cast/transmute target type");
        let expr = self.parse_unary(owner)?;
        let kind = if is_cast {
            ExprKind::Cast { target_type, expr }
        } else {
            ExprKind::Transmute { target_type, expr }
        };
        Some(self.alloc_expr_for_scope(owner, start, kind))
    }

    fn parse_struct_literal(&mut self, owner: ScopeId) -> Option<ExprId> {
        let start = self.current_range();
        self.advance(); // 'struct'
        self.expect_punct(Punct::LeftBrace, "'{' after 'struct'");
        let mut members = Vec::new();
        while !self.check_punct(Punct::RightBrace) && !self.at_eof() {
            let name_tok = self.advance();
            let TokenKind::Identifier(name) = name_tok.kind else {
                self.diagnostics.error("expected member name", name_tok.range);
                return None;
            };
            self.expect_punct(Punct::Colon, "':' after struct member name");
            let ty = self.parse_type_expr(owner)?;
            self.expect_punct(Punct::Semicolon, "';' after struct member");
            members.push((name, name_tok.range, ty));
        }
        self.expect_punct(Punct::RightBrace, "'}' after struct members");
        Some(self.alloc_expr_for_scope(owner, start, ExprKind::Struct { members }))
    }

    /// Parses `(params) -> ReturnType` followed by an optional `{ body }`. Without a body
    /// this is a procedure *type* expression; the resolver decides which based on whether
    /// `body` is `Some`.
    fn parse_procedure_literal(&mut self, owner: ScopeId) -> Option<ExprId> {
        let start = self.current_range();
        self.advance(); // '('
        let mut params = Vec::new();
        if !self.check_punct(Punct::RightParen) {
            loop {
                params.push(self.parse_param(owner)?);
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RightParen, "')' after parameter list");

        // A stub StmtId is required up-front because `ExprKind::Procedure` needs to exist
        // before its body scope's `parent_procedure` can point at it; the expression is
        // allocated first with `body: None`, then patched in place once the scope is built.
        let proc_id = self.alloc_expr_for_scope(
            owner,
            start,
            ExprKind::Procedure(Procedure {
                params,
                return_type: None,
                body: None,
                builtin_name: None,
            }),
        );

        self.expect_arrow();
        let return_type = self.parse_type_expr(owner)?;
        if let ExprKind::Procedure(procedure) = &mut self.ast.expr_mut(proc_id).kind {
            procedure.return_type = Some(return_type);
        }

        if self.check_punct(Punct::LeftBrace) {
            let parent = self.current_scope();
            let body = self.ast.alloc_scope(ScopeData::new(false, Some(proc_id), Some(parent)));
            self.scope_stack.push(body);
            self.expect_punct(Punct::LeftBrace, "'{'");
            while !self.check_punct(Punct::RightBrace) && !self.at_eof() {
                if let Some(stmt) = self.parse_statement() {
                    self.ast.scope_mut(body).statements.push(stmt);
                } else {
                    self.synchronize();
                }
            }
            self.expect_punct(Punct::RightBrace, "'}' after procedure body");
            self.scope_stack.pop();
            if let ExprKind::Procedure(procedure) = &mut self.ast.expr_mut(proc_id).kind {
                procedure.body = Some(body);
            }
        }
        Some(proc_id)
    }

    fn parse_param(&mut self, owner: ScopeId) -> Option<Declaration> {
        if matches!(self.peek(), TokenKind::Identifier(_)) && matches!(self.peek_at(1), TokenKind::Punct(Punct::Colon)) {
            let name_tok = self.advance();
            let TokenKind::Identifier(name) = name_tok.kind else {
                unreachable!("checked above");
            };
            self.advance(); // ':'
            let ty = self.parse_type_expr(owner)?;
            return Some(Declaration::new(name, name_tok.range, Some(ty), None, false, None));
        }
        let start = self.current_range();
        let ty = self.parse_type_expr(owner)?;
        let anon = self.interner.intern(ANONYMOUS_PARAM);
        Some(Declaration::new(anon, start, Some(ty), None, false, None))
    }

    /// Parses a type expression: a restricted expression grammar with no binary operators,
    /// covering built-in type names, named type constants, procedure-type literals, and
    /// struct-type literals.
    fn parse_type_expr(&mut self, owner: ScopeId) -> Option<ExprId> {
        self.parse_postfix(owner)
    }

    fn alloc_expr_for_scope(&mut self, owner: ScopeId, range: CodeRange, kind: ExprKind) -> ExprId {
        self.ast.alloc_expr(owner, range, kind)
    }
}
