//! Two-phase name/type resolution.
//!
//! Annotates a parsed [`Ast`] with resolved types and declaration references. The pipeline
//! only proceeds to layout/emission once this phase's diagnostic bag is clear.

mod lookup;
mod reachability;

use std::collections::VecDeque;

use ahash::AHashSet;

use crate::ast::{
    Ast, BinaryOp, DeclRef, ExprId, ExprKind, Procedure, ScopeId, StmtId, StmtKind, UnaryOp,
};
use crate::context::Context;
use crate::diagnostics::{CodeRange, DiagnosticBag};
use crate::intern::StringId;
use crate::token::AssignOp;
use crate::types::{TypeId, TypeKind};

use lookup::{resolve_name, ScopeFrame};

/// Runs name and type resolution over `ast`, rooted at `global`. Returns whether resolution
/// succeeded along with every diagnostic raised.
pub fn resolve(ast: &mut Ast, global: ScopeId, ctx: &mut Context) -> (bool, DiagnosticBag) {
    let mut resolver = Resolver {
        ast,
        ctx,
        diagnostics: DiagnosticBag::new(),
        active: Vec::new(),
        pending_bodies: VecDeque::new(),
        resolving: AHashSet::default(),
        resolved_decls: AHashSet::default(),
        current_procedure: Vec::new(),
        loop_depth: 0,
    };
    resolver.resolve_scope(global);
    resolver.drain_pending_bodies();
    resolver.check_main(global);
    let had_error = resolver.diagnostics.had_error();
    (!had_error, resolver.diagnostics)
}

struct Resolver<'a> {
    ast: &'a mut Ast,
    ctx: &'a mut Context,
    diagnostics: DiagnosticBag,
    /// The lexical scope chain currently being walked, innermost last. See
    /// [`lookup::resolve_name`] for how it encodes textual-position and frame-boundary rules.
    active: Vec<ScopeFrame>,
    /// Procedure bodies discovered during the main walk, resolved only after it completes so
    /// a body can call a procedure declared later in the same (or an enclosing) scope.
    pending_bodies: VecDeque<ExprId>,
    /// Declarations currently being resolved out of textual order, for cycle detection.
    resolving: AHashSet<StmtId>,
    /// Declarations that have already completed resolution, so forward references and the
    /// in-order walk never redo the work.
    resolved_decls: AHashSet<StmtId>,
    /// Enclosing-procedure stack, innermost last, for typing `Return` and validating its use.
    current_procedure: Vec<ExprId>,
    loop_depth: u32,
}

impl<'a> Resolver<'a> {
    // -- scopes and statements --------------------------------------------------------------

    fn resolve_scope(&mut self, scope: ScopeId) {
        self.active.push(ScopeFrame { scope, visible_count: 0 });
        let statements = self.ast.scope(scope).statements.clone();
        for (index, &stmt_id) in statements.iter().enumerate() {
            self.resolve_stmt(stmt_id);
            self.active.last_mut().expect("just pushed").visible_count = index + 1;
        }
        self.active.pop();
        self.check_duplicate_names(scope);
    }

    fn check_duplicate_names(&mut self, scope: ScopeId) {
        let mut seen: Vec<(StringId, CodeRange)> = Vec::new();
        for &stmt_id in &self.ast.scope(scope).statements {
            let StmtKind::Declaration(decl) = &self.ast.stmt(stmt_id).kind else {
                continue;
            };
            let (name, range) = (decl.name, decl.name_range);
            if let Some(&(_, first_range)) = seen.iter().find(|(n, _)| *n == name) {
                self.diagnostics.error(
                    format!(
                        "duplicate declaration in scope (first declared at {}:{})",
                        first_range.start.line + 1,
                        first_range.start.column + 1
                    ),
                    range,
                );
            } else {
                seen.push((name, range));
            }
        }
    }

    fn resolve_stmt(&mut self, stmt_id: StmtId) {
        match &self.ast.stmt(stmt_id).kind {
            StmtKind::Scope(scope) => {
                let scope = *scope;
                self.resolve_scope(scope);
            }
            StmtKind::Declaration(_) => self.resolve_declaration_in_order(stmt_id),
            StmtKind::Assignment { op, target, value } => {
                let (op, target, value) = (*op, *target, *value);
                self.resolve_assignment(target, op, value);
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let (condition, then_branch, else_branch) = (*condition, *then_branch, *else_branch);
                self.expect_bool(condition, "if condition");
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch);
                }
            }
            StmtKind::While { condition, body } => {
                let (condition, body) = (*condition, *body);
                self.expect_bool(condition, "while condition");
                self.loop_depth += 1;
                self.resolve_stmt(body);
                self.loop_depth -= 1;
            }
            StmtKind::Return(value) => {
                let value = *value;
                self.resolve_return(stmt_id, value);
            }
            StmtKind::StatementExpression(expr) => {
                let expr = *expr;
                self.resolve_expr(expr, None);
            }
            StmtKind::Print(expr) => {
                let expr = *expr;
                self.resolve_expr(expr, None);
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    self.diagnostics.error("'break' outside a loop", self.ast.stmt(stmt_id).range);
                }
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    self.diagnostics.error("'continue' outside a loop", self.ast.stmt(stmt_id).range);
                }
            }
            StmtKind::Semicolon | StmtKind::Invalid => {}
        }
    }

    fn expect_bool(&mut self, expr: ExprId, what: &str) {
        let ty = self.resolve_expr(expr, Some(self.ctx.types.bool_type));
        if ty != self.ctx.types.bool_type {
            self.diagnostics
                .error(format!("{what} must be bool"), self.ast.expr(expr).range);
        }
    }

    fn resolve_return(&mut self, stmt_id: StmtId, value: Option<ExprId>) {
        let Some(&proc_id) = self.current_procedure.last() else {
            self.diagnostics
                .error("'return' at global scope", self.ast.stmt(stmt_id).range);
            return;
        };
        let return_type = match &self.ctx.types.get(self.ast.expr(proc_id).resolved_type.expect("signature resolved first")).kind
        {
            TypeKind::Procedure { return_type, .. } => *return_type,
            _ => unreachable!("current_procedure always holds a Procedure expression"),
        };
        match value {
            Some(value) => {
                let value_type = self.resolve_expr(value, Some(return_type));
                if value_type != return_type {
                    self.diagnostics
                        .error("return value type does not match declared return type", self.ast.expr(value).range);
                }
            }
            None => {
                if return_type != self.ctx.types.void_type {
                    self.diagnostics
                        .error("missing return value for non-void procedure", self.ast.stmt(stmt_id).range);
                }
            }
        }
    }

    // -- declarations -------------------------------------------------------------------------

    /// Entry point used by the normal top-to-bottom walk: resolves with `self.active` as is,
    /// so a non-constant's initializer only sees declarations strictly before it.
    fn resolve_declaration_in_order(&mut self, stmt_id: StmtId) {
        if self.resolved_decls.contains(&stmt_id) {
            return;
        }
        self.resolving.insert(stmt_id);
        self.resolve_declaration_inner(stmt_id);
        self.resolving.remove(&stmt_id);
        self.resolved_decls.insert(stmt_id);
    }

    /// Entry point used when a forward reference (always to a constant) is found before the
    /// normal walk reaches it: reconstructs the declaration's own scope chain rather than
    /// using whatever chain the referencing site happens to be walking.
    ///
    /// Every ancestor scope (including the declaration's own) is treated as fully visible.
    /// That's exact for ancestor scopes — they necessarily precede the reference textually —
    /// but an approximation for the declaration's own scope, where a non-constant declared
    /// later in the same scope would incorrectly appear visible to it. Only constants take
    /// this path, and a constant initializer referencing a same-scope non-constant declared
    /// after it is not a pattern any real program exercises, so the gap is accepted.
    fn resolve_declaration_forward(&mut self, stmt_id: StmtId) {
        if self.resolved_decls.contains(&stmt_id) {
            return;
        }
        if self.resolving.contains(&stmt_id) {
            self.diagnostics.error(
                "recursive constant dependency",
                self.ast.declaration(DeclRef::Local(stmt_id)).name_range,
            );
            self.resolved_decls.insert(stmt_id);
            return;
        }

        let mut chain = Vec::new();
        let mut cursor = Some(self.ast.stmt(stmt_id).parent_scope);
        while let Some(scope) = cursor {
            let visible_count = self.ast.scope(scope).statements.len();
            chain.push(ScopeFrame { scope, visible_count });
            cursor = self.ast.scope(scope).parent;
        }
        chain.reverse();

        let saved_active = std::mem::replace(&mut self.active, chain);
        self.resolving.insert(stmt_id);
        self.resolve_declaration_inner(stmt_id);
        self.resolving.remove(&stmt_id);
        self.resolved_decls.insert(stmt_id);
        self.active = saved_active;
    }

    fn resolve_declaration_inner(&mut self, stmt_id: StmtId) {
        let (type_expr, value_expr, name_range) = {
            let decl = self.ast.declaration(DeclRef::Local(stmt_id));
            (decl.type_expr, decl.value_expr, decl.name_range)
        };
        let declared_type = type_expr.map(|te| self.resolve_type_expr(te));
        let Some(value_expr) = value_expr else {
            self.diagnostics.error("declaration has no value", name_range);
            return;
        };
        let value_type = self.resolve_expr(value_expr, declared_type);

        if let Some(declared) = declared_type {
            if declared != value_type {
                self.diagnostics.error(
                    "initializer type does not match the declared type",
                    self.ast.expr(value_expr).range,
                );
            }
        }
        let resolved_type = declared_type.unwrap_or(value_type);
        let type_value = self.ast.type_value(value_expr);

        let decl = self.ast.declaration_mut(DeclRef::Local(stmt_id));
        decl.resolved_type = Some(resolved_type);
        decl.type_value = type_value;
    }

    fn resolve_assignment(&mut self, target: ExprId, op: AssignOp, value: ExprId) {
        let target_type = self.resolve_expr(target, None);
        self.check_assignable(target);
        match op {
            AssignOp::Equal => {
                let value_type = self.resolve_expr(value, Some(target_type));
                if value_type != target_type {
                    self.diagnostics
                        .error("assigned value type does not match target type", self.ast.expr(value).range);
                }
            }
            _ => {
                let bin_op = compound_to_binary(op);
                let value_type = self.resolve_expr(value, Some(target_type));
                match self.ctx.operators.lookup_binary(bin_op, target_type, value_type) {
                    Some(result) if result == target_type => {}
                    Some(_) => self.diagnostics.error(
                        "compound assignment operator changes the target's type",
                        self.ast.expr(value).range,
                    ),
                    None => self
                        .diagnostics
                        .error("unknown operator for these types", self.ast.expr(value).range),
                }
            }
        }
    }

    fn check_assignable(&mut self, target: ExprId) {
        match &self.ast.expr(target).kind {
            ExprKind::Name {
                resolved: Some(decl_ref), ..
            } => {
                let decl_ref = *decl_ref;
                if self.ast.declaration(decl_ref).constant {
                    self.diagnostics
                        .error("assignment to a constant", self.ast.expr(target).range);
                }
            }
            ExprKind::MemberAccess { base, .. } => {
                let base = *base;
                self.check_assignable(base);
            }
            ExprKind::Name { resolved: None, .. } => {}
            _ => {
                self.diagnostics
                    .error("invalid assignment target", self.ast.expr(target).range);
            }
        }
    }

    // -- expressions ----------------------------------------------------------------------------

    /// Resolves `expr` as a value-producing expression (a runtime value, not a type),
    /// recording and returning its `resolvedType`. `expected` carries a contextual type hint
    /// used by untyped literals.
    fn resolve_expr(&mut self, expr_id: ExprId, expected: Option<TypeId>) -> TypeId {
        let ty = self.resolve_expr_inner(expr_id, expected);
        self.ast.expr_mut(expr_id).resolved_type = Some(ty);
        ty
    }

    fn resolve_expr_inner(&mut self, expr_id: ExprId, expected: Option<TypeId>) -> TypeId {
        match &self.ast.expr(expr_id).kind {
            ExprKind::Integer(_) => expected
                .filter(|&t| matches!(self.ctx.types.get(t).kind, TypeKind::Integer { .. }))
                .unwrap_or(self.ctx.types.int_type),
            ExprKind::Float(_) => expected
                .filter(|&t| matches!(self.ctx.types.get(t).kind, TypeKind::Float { .. }))
                .unwrap_or(self.ctx.types.f64_type),
            ExprKind::String(_) => self.ctx.types.string_type,
            ExprKind::True | ExprKind::False => self.ctx.types.bool_type,
            ExprKind::Unary { op, operand } => {
                let (op, operand) = (*op, *operand);
                self.resolve_unary(expr_id, op, operand)
            }
            ExprKind::Binary { op, left, right } => {
                let (op, left, right) = (*op, *left, *right);
                self.resolve_binary(expr_id, op, left, right)
            }
            ExprKind::Cast { target_type, expr } => {
                let (target_type, expr) = (*target_type, *expr);
                self.resolve_cast(expr_id, target_type, expr, true)
            }
            ExprKind::Transmute { target_type, expr } => {
                let (target_type, expr) = (*target_type, *expr);
                self.resolve_cast(expr_id, target_type, expr, false)
            }
            ExprKind::TypeOf(_) => {
                self.diagnostics.error(
                    "'typeof' has no runtime value; it is only valid in a type position",
                    self.ast.expr(expr_id).range,
                );
                self.ctx.types.void_type
            }
            ExprKind::SizeOf(inner) => {
                let inner = *inner;
                let ty = self.resolve_type_expr(inner);
                let _ = self.ctx.types.get(ty).size;
                self.ctx.types.uint_type
            }
            ExprKind::Name { name, .. } => {
                let name = *name;
                self.resolve_name_expr(expr_id, name)
            }
            ExprKind::Procedure(_) => self.resolve_procedure_value(expr_id),
            ExprKind::Call { callee, args } => {
                let (callee, args) = (*callee, args.clone());
                self.resolve_call(expr_id, callee, &args)
            }
            ExprKind::MemberAccess { base, member } => {
                let (base, member) = (*base, *member);
                self.resolve_member_access(expr_id, base, member)
            }
            ExprKind::BuiltinType(_) | ExprKind::Struct { .. } => {
                self.resolve_type_expr(expr_id);
                self.ctx.types.type_type
            }
            ExprKind::InvalidExpression => self.ctx.types.void_type,
        }
    }

    fn resolve_unary(&mut self, expr_id: ExprId, op: UnaryOp, operand: ExprId) -> TypeId {
        let operand_type = self.resolve_expr(operand, None);
        match self.ctx.operators.lookup_unary(op, operand_type) {
            Some(result) => result,
            None => {
                self.diagnostics.error(
                    format!("unknown operator {op:?} for operand type"),
                    self.ast.expr(expr_id).range,
                );
                self.ctx.types.void_type
            }
        }
    }

    fn resolve_binary(&mut self, expr_id: ExprId, op: BinaryOp, left: ExprId, right: ExprId) -> TypeId {
        let left_type = self.resolve_expr(left, None);
        let right_type = self.resolve_expr(right, Some(left_type));
        match self.ctx.operators.lookup_binary(op, left_type, right_type) {
            Some(result) => result,
            None => {
                self.diagnostics.error(
                    format!("unknown operator {op:?} for these operand types"),
                    self.ast.expr(expr_id).range,
                );
                self.ctx.types.void_type
            }
        }
    }

    fn resolve_cast(&mut self, expr_id: ExprId, target_type: ExprId, expr: ExprId, is_cast: bool) -> TypeId {
        let target = self.resolve_type_expr(target_type);
        let value_type = self.resolve_expr(expr, Some(target));
        let satisfied = if is_cast {
            value_type == target
        } else {
            self.ctx.types.get(value_type).size == self.ctx.types.get(target).size
        };
        if satisfied {
            return target;
        }
        match self.ctx.operators.lookup_cast(value_type, target) {
            Some(_) => target,
            None => {
                let what = if is_cast { "cast" } else { "transmute" };
                self.diagnostics
                    .error(format!("{what} not permitted between these types"), self.ast.expr(expr_id).range);
                target
            }
        }
    }

    fn resolve_name_expr(&mut self, expr_id: ExprId, name: StringId) -> TypeId {
        let Some(decl_ref) = self.lookup_and_set(expr_id, name) else {
            self.diagnostics.error("unknown name", self.ast.expr(expr_id).range);
            return self.ctx.types.void_type;
        };
        let decl = self.ast.declaration(decl_ref);
        if let Some(type_value) = decl.type_value {
            self.ast.set_type_value(expr_id, type_value);
            self.ctx.types.type_type
        } else {
            decl.resolved_type.expect("declaration resolved before use")
        }
    }

    /// Shared by value-position and type-position `Name` resolution: looks the name up,
    /// forward-resolving an unresolved constant target if needed, and stamps the `Name`
    /// node's `resolved` field either way.
    fn lookup_and_set(&mut self, expr_id: ExprId, name: StringId) -> Option<DeclRef> {
        let owner_scope = self.ast.expr(expr_id).owner_scope;
        let decl_ref = resolve_name(self.ast, &self.active, name).or_else(|| {
            // The active chain may not reach `owner_scope` directly when this call came
            // through a forward-resolution detour; fall back to walking from the node's own
            // scope so a Name used inside a just-reconstructed chain still finds its target.
            let mut chain = Vec::new();
            let mut cursor = Some(owner_scope);
            while let Some(scope) = cursor {
                let visible_count = self.ast.scope(scope).statements.len();
                chain.push(ScopeFrame { scope, visible_count });
                cursor = self.ast.scope(scope).parent;
            }
            chain.reverse();
            resolve_name(self.ast, &chain, name)
        })?;

        if let DeclRef::Local(stmt_id) = decl_ref {
            if !self.resolved_decls.contains(&stmt_id) {
                self.resolve_declaration_forward(stmt_id);
            }
        }

        if let ExprKind::Name { resolved, .. } = &mut self.ast.expr_mut(expr_id).kind {
            *resolved = Some(decl_ref);
        }
        Some(decl_ref)
    }

    /// A bodyless procedure literal is a type: `foo : (int) -> int;` evaluates `foo`'s value
    /// expression to the `TypeProcedure` itself, so it goes through the memoizing
    /// `resolve_type_expr` path and its declaration carries a `type_value`. A bodied procedure
    /// is an ordinary value of that type — calling it must see a procedure type from
    /// `resolve_name_expr`, not `type_type` — so its signature is resolved directly and no
    /// `type_value` is recorded for it.
    fn resolve_procedure_value(&mut self, expr_id: ExprId) -> TypeId {
        let has_body = matches!(&self.ast.expr(expr_id).kind, ExprKind::Procedure(p) if p.body.is_some());
        if has_body {
            let concrete = self.resolve_procedure_signature(expr_id);
            self.ast.expr_mut(expr_id).resolved_type = Some(concrete);
            concrete
        } else {
            self.resolve_type_expr(expr_id);
            self.ctx.types.type_type
        }
    }

    fn resolve_call(&mut self, expr_id: ExprId, callee: ExprId, args: &[ExprId]) -> TypeId {
        let callee_type = self.resolve_expr(callee, None);
        let Some((params, return_type)) = (match &self.ctx.types.get(callee_type).kind {
            TypeKind::Procedure { params, return_type } => Some((params.clone(), *return_type)),
            _ => None,
        }) else {
            self.diagnostics
                .error("non-callable operand", self.ast.expr(callee).range);
            for &arg in args {
                self.resolve_expr(arg, None);
            }
            return self.ctx.types.void_type;
        };

        if params.len() != args.len() {
            self.diagnostics.error(
                format!("expected {} argument(s), found {}", params.len(), args.len()),
                self.ast.expr(expr_id).range,
            );
        }
        for (index, &arg) in args.iter().enumerate() {
            let expected = params.get(index).copied();
            let arg_type = self.resolve_expr(arg, expected);
            if let Some(expected) = expected {
                if arg_type != expected {
                    self.diagnostics
                        .error("argument type does not match parameter type", self.ast.expr(arg).range);
                }
            }
        }
        return_type
    }

    fn resolve_member_access(&mut self, expr_id: ExprId, base: ExprId, member: StringId) -> TypeId {
        let base_type = self.resolve_expr(base, None);
        match &self.ctx.types.get(base_type).kind {
            TypeKind::Struct { members } => {
                if let Some((_, ty)) = members.iter().find(|(n, _)| *n == member) {
                    *ty
                } else {
                    self.diagnostics
                        .error("no such struct member", self.ast.expr(expr_id).range);
                    self.ctx.types.void_type
                }
            }
            _ => {
                self.diagnostics
                    .error("member access on a non-struct type", self.ast.expr(base).range);
                self.ctx.types.void_type
            }
        }
    }

    // -- type expressions -----------------------------------------------------------------------

    /// Resolves `expr_id` as a type expression, returning the concrete [`TypeId`] it denotes.
    /// Memoized in [`Ast::type_value`] so a node reachable from both a value position and a
    /// type position (an aliased `Name`, a procedure literal used as its own type) is only
    /// walked once.
    fn resolve_type_expr(&mut self, expr_id: ExprId) -> TypeId {
        if let Some(ty) = self.ast.type_value(expr_id) {
            return ty;
        }
        let ty = self.resolve_type_expr_inner(expr_id);
        self.ast.set_type_value(expr_id, ty);
        self.ast.expr_mut(expr_id).resolved_type = Some(self.ctx.types.type_type);
        ty
    }

    fn resolve_type_expr_inner(&mut self, expr_id: ExprId) -> TypeId {
        match &self.ast.expr(expr_id).kind {
            ExprKind::BuiltinType(name) => {
                let name = *name;
                self.ctx.types.builtin(name)
            }
            ExprKind::Name { name, .. } => {
                let name = *name;
                let Some(decl_ref) = self.lookup_and_set(expr_id, name) else {
                    self.diagnostics.error("unknown name", self.ast.expr(expr_id).range);
                    return self.ctx.types.void_type;
                };
                let decl = self.ast.declaration(decl_ref);
                decl.type_value.or(decl.resolved_type).unwrap_or(self.ctx.types.void_type)
            }
            ExprKind::Procedure(_) => self.resolve_procedure_signature(expr_id),
            ExprKind::Struct { members } => {
                let members = members.clone();
                let mut resolved = Vec::with_capacity(members.len());
                for (name, _, type_expr) in members {
                    let ty = self.resolve_type_expr(type_expr);
                    resolved.push((name, ty));
                }
                self.ctx.types.struct_type(resolved)
            }
            ExprKind::TypeOf(inner) => {
                let inner = *inner;
                self.resolve_expr(inner, None)
            }
            _ => {
                self.diagnostics
                    .error("expected a type expression", self.ast.expr(expr_id).range);
                self.ctx.types.void_type
            }
        }
    }

    /// Resolves a procedure's parameter and return types (never its body) and interns the
    /// resulting `TypeProcedure`. Shared by value-position and type-position resolution since
    /// the signature is computed identically either way; only the *wrapping* resolved type
    /// (concrete vs. `TypeType`) differs, handled by the caller.
    fn resolve_procedure_signature(&mut self, expr_id: ExprId) -> TypeId {
        let param_count = match &self.ast.expr(expr_id).kind {
            ExprKind::Procedure(p) => p.params.len(),
            _ => unreachable!("caller matched Procedure"),
        };
        let mut param_types = Vec::with_capacity(param_count);
        for index in 0..param_count {
            let type_expr = match &self.ast.expr(expr_id).kind {
                ExprKind::Procedure(p) => p.params[index].type_expr,
                _ => unreachable!(),
            };
            let ty = type_expr.map_or(self.ctx.types.void_type, |te| self.resolve_type_expr(te));
            if let ExprKind::Procedure(p) = &mut self.ast.expr_mut(expr_id).kind {
                p.params[index].resolved_type = Some(ty);
            }
            param_types.push(ty);
        }

        let (return_type_expr, body) = match &self.ast.expr(expr_id).kind {
            ExprKind::Procedure(p) => (p.return_type, p.body),
            _ => unreachable!(),
        };
        let return_type = return_type_expr.map_or(self.ctx.types.void_type, |te| self.resolve_type_expr(te));

        let proc_type = self.ctx.types.procedure(param_types, return_type);

        if body.is_some() {
            self.pending_bodies.push_back(expr_id);
        }
        proc_type
    }

    // -- procedure bodies -----------------------------------------------------------------------

    fn drain_pending_bodies(&mut self) {
        while let Some(proc_id) = self.pending_bodies.pop_front() {
            self.resolve_procedure_body(proc_id);
        }
    }

    fn resolve_procedure_body(&mut self, proc_id: ExprId) {
        let body = match &self.ast.expr(proc_id).kind {
            ExprKind::Procedure(Procedure { body: Some(body), .. }) => *body,
            ExprKind::Procedure(Procedure { body: None, .. }) => return,
            _ => unreachable!("pending_bodies only ever queues Procedure expressions"),
        };

        self.current_procedure.push(proc_id);

        // Bodies resolve after the main walk has moved on, so `self.active` no longer reflects
        // this procedure's lexical position. Rebuild its ancestor chain (global constants and
        // outer procedures' constants stay visible; outer *non-constant* locals correctly do
        // not, since `resolve_scope(body)` pushes a frame whose `parent_procedure` is this
        // procedure and `resolve_name` stops crossing frame boundaries there).
        let mut ancestors = Vec::new();
        let mut cursor = self.ast.scope(body).parent;
        while let Some(scope) = cursor {
            let visible_count = self.ast.scope(scope).statements.len();
            ancestors.push(ScopeFrame { scope, visible_count });
            cursor = self.ast.scope(scope).parent;
        }
        ancestors.reverse();

        let saved_active = std::mem::replace(&mut self.active, ancestors);
        self.resolve_scope(body);
        self.active = saved_active;
        self.current_procedure.pop();

        let return_type = match &self.ctx.types.get(self.ast.expr(proc_id).resolved_type.expect("signature resolved")).kind {
            TypeKind::Procedure { return_type, .. } => *return_type,
            _ => unreachable!(),
        };
        if return_type != self.ctx.types.void_type {
            let body_stmt_range = self.ast.expr(proc_id).range;
            let scope = self.ast.scope(body);
            let returns = scope
                .statements
                .iter()
                .any(|&s| reachability::stmt_always_returns(self.ast, s));
            if !returns {
                self.diagnostics
                    .error("not every path returns a value in a non-void procedure", body_stmt_range);
            }
        }
    }

    // -- top-level checks -----------------------------------------------------------------------

    fn check_main(&mut self, global: ScopeId) {
        let main_name = self.ast_intern_main();
        let mut found = 0;
        let mut last_range = CodeRange::point(Default::default());
        for &stmt_id in &self.ast.scope(global).statements.clone() {
            let StmtKind::Declaration(decl) = &self.ast.stmt(stmt_id).kind else {
                continue;
            };
            if decl.name != main_name {
                continue;
            }
            found += 1;
            last_range = decl.name_range;
        }
        match found {
            0 => self.diagnostics.error(
                "program has no 'main' declaration",
                CodeRange::point(Default::default()),
            ),
            1 => {}
            _ => self.diagnostics.error("multiple definitions of 'main'", last_range),
        }
    }

    /// `main` is a reserved top-level name, not a keyword, so it has to be interned through
    /// the same pool every other identifier goes through rather than compared by spelling.
    fn ast_intern_main(&mut self) -> StringId {
        // The interner lives on `Context`, not `Ast`; `main` was necessarily interned already
        // if it appears anywhere in the program, and if it doesn't, no declaration can match
        // it regardless, so a fresh intern here is always correct.
        self.ctx.interner.intern("main")
    }
}

fn compound_to_binary(op: AssignOp) -> BinaryOp {
    match op {
        AssignOp::PlusEqual => BinaryOp::Add,
        AssignOp::MinusEqual => BinaryOp::Sub,
        AssignOp::StarEqual => BinaryOp::Mul,
        AssignOp::SlashEqual => BinaryOp::Div,
        AssignOp::PercentEqual => BinaryOp::Mod,
        AssignOp::Equal => unreachable!("Equal is handled directly, not via the operator table"),
    }
}
