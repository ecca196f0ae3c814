//! Storage layout: assigns every declaration an absolute or frame-relative byte offset.
//!
//! One pre-order walk over the resolved AST. Global and constant declarations — including
//! local constants nested inside a function body, since a constant's value is computed once
//! regardless of where it's textually declared — get an offset into a single global/constant
//! arena at the bottom of the stack. Every other declaration (locals and procedure parameters)
//! gets an offset relative to its enclosing function's frame.
//!
//! A frame's saved `ip`/`bp` pair lives *below* `bp`, not inside the offset-addressable range:
//! `Call` re-pushes arguments starting exactly at the new `bp`, so parameter zero always sits
//! at offset 0 and the header never needs an offset of its own (see `bytecode::vm`).

use crate::ast::{Ast, DeclRef, ExprId, ExprKind, ScopeId, StmtId, StmtKind};
use crate::types::Types;

/// The result of the layout pass: the global/constant arena's total size and the declarations
/// whose initializers belong in it, in discovery order.
pub struct Layout {
    /// Constant declarations (including local constants), in discovery order; the emitter
    /// walks this list to emit every initializer once, before `main` is ever called.
    pub constants: Vec<StmtId>,
    /// Total size of the global/constant arena; the emitter's first instruction is an
    /// `AllocStack` of this many bytes.
    pub global_size: u32,
}

#[must_use]
pub fn layout(ast: &mut Ast, global: ScopeId, types: &Types) -> Layout {
    let mut state = State {
        running_global: 0,
        constants: Vec::new(),
    };
    state.layout_scope(ast, global, global, types);
    Layout {
        constants: state.constants,
        global_size: state.running_global,
    }
}

struct State {
    running_global: u32,
    constants: Vec<StmtId>,
}

impl State {
    fn layout_scope(&mut self, ast: &mut Ast, scope: ScopeId, frame: ScopeId, types: &Types) {
        let statements = ast.scope(scope).statements.clone();
        for stmt_id in statements {
            self.layout_stmt(ast, stmt_id, frame, types);
        }
    }

    fn layout_stmt(&mut self, ast: &mut Ast, stmt_id: StmtId, frame: ScopeId, types: &Types) {
        match &ast.stmt(stmt_id).kind {
            StmtKind::Scope(inner) => {
                let inner = *inner;
                self.layout_scope(ast, inner, frame, types);
            }
            StmtKind::Declaration(_) => self.layout_declaration(ast, stmt_id, frame, types),
            StmtKind::Assignment { target, value, .. } => {
                let (target, value) = (*target, *value);
                self.layout_expr(ast, target, types);
                self.layout_expr(ast, value, types);
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let (condition, then_branch, else_branch) = (*condition, *then_branch, *else_branch);
                self.layout_expr(ast, condition, types);
                self.layout_stmt(ast, then_branch, frame, types);
                if let Some(else_branch) = else_branch {
                    self.layout_stmt(ast, else_branch, frame, types);
                }
            }
            StmtKind::While { condition, body } => {
                let (condition, body) = (*condition, *body);
                self.layout_expr(ast, condition, types);
                self.layout_stmt(ast, body, frame, types);
            }
            StmtKind::Return(Some(value)) => {
                let value = *value;
                self.layout_expr(ast, value, types);
            }
            StmtKind::StatementExpression(expr) | StmtKind::Print(expr) => {
                let expr = *expr;
                self.layout_expr(ast, expr, types);
            }
            StmtKind::Return(None) | StmtKind::Semicolon | StmtKind::Break | StmtKind::Continue | StmtKind::Invalid => {}
        }
    }

    /// A declaration is "at global scope" iff its own enclosing scope is the program's root
    /// scope, not merely a descendant of it — a non-constant declared directly inside a block
    /// nested under global has no frame to be relative to either, but that configuration never
    /// arises from a procedure-shaped program and is left as a narrow, documented gap.
    fn layout_declaration(&mut self, ast: &mut Ast, stmt_id: StmtId, frame: ScopeId, types: &Types) {
        let decl_ref = DeclRef::Local(stmt_id);
        let (constant, resolved_type, value_expr) = {
            let decl = ast.declaration(decl_ref);
            (decl.constant, decl.resolved_type, decl.value_expr)
        };
        let at_global_scope = ast.scope(ast.stmt(stmt_id).parent_scope).global;
        let size = resolved_type.map_or(0, |t| types.get(t).size);

        if constant || at_global_scope {
            let offset = self.running_global;
            self.running_global += size;
            let decl = ast.declaration_mut(decl_ref);
            decl.global_offset = true;
            decl.offset = offset;
            self.constants.push(stmt_id);
        } else {
            let offset = ast.scope(frame).declaration_offset;
            ast.scope_mut(frame).declaration_offset = offset + size;
            let decl = ast.declaration_mut(decl_ref);
            decl.global_offset = false;
            decl.offset = offset;
        }

        if let Some(value_expr) = value_expr {
            self.layout_expr(ast, value_expr, types);
        }
    }

    /// Lays out a procedure's parameters and, if present, its body. Parameter zero always sits
    /// at frame offset 0: `Call` re-pushes arguments starting exactly at the new `bp`.
    fn layout_procedure(&mut self, ast: &mut Ast, proc_id: ExprId, types: &Types) {
        let param_count = match &ast.expr(proc_id).kind {
            ExprKind::Procedure(p) => p.params.len(),
            _ => unreachable!("caller matched Procedure"),
        };
        let body = match &ast.expr(proc_id).kind {
            ExprKind::Procedure(p) => p.body,
            _ => unreachable!(),
        };
        let Some(body) = body else { return };

        for index in 0..param_count {
            let size = {
                let decl_ref = DeclRef::Param(proc_id, u32::try_from(index).expect("param count fits u32"));
                let ty = ast.declaration(decl_ref).resolved_type;
                ty.map_or(0, |t| types.get(t).size)
            };
            let offset = ast.scope(body).declaration_offset;
            ast.scope_mut(body).declaration_offset = offset + size;
            let decl_ref = DeclRef::Param(proc_id, u32::try_from(index).expect("param count fits u32"));
            let decl = ast.declaration_mut(decl_ref);
            decl.global_offset = false;
            decl.offset = offset;
        }

        self.layout_scope(ast, body, body, types);
    }

    fn layout_expr(&mut self, ast: &mut Ast, expr_id: ExprId, types: &Types) {
        match &ast.expr(expr_id).kind {
            ExprKind::Unary { operand, .. } | ExprKind::SizeOf(operand) | ExprKind::TypeOf(operand) => {
                let operand = *operand;
                self.layout_expr(ast, operand, types);
            }
            ExprKind::Binary { left, right, .. } => {
                let (left, right) = (*left, *right);
                self.layout_expr(ast, left, types);
                self.layout_expr(ast, right, types);
            }
            ExprKind::Cast { expr, .. } | ExprKind::Transmute { expr, .. } => {
                let expr = *expr;
                self.layout_expr(ast, expr, types);
            }
            ExprKind::Procedure(p) => {
                if p.body.is_some() {
                    self.layout_procedure(ast, expr_id, types);
                }
            }
            ExprKind::Call { callee, args } => {
                let (callee, args) = (*callee, args.clone());
                self.layout_expr(ast, callee, types);
                for arg in args {
                    self.layout_expr(ast, arg, types);
                }
            }
            ExprKind::MemberAccess { base, .. } => {
                let base = *base;
                self.layout_expr(ast, base, types);
            }
            ExprKind::Integer(_)
            | ExprKind::Float(_)
            | ExprKind::String(_)
            | ExprKind::True
            | ExprKind::False
            | ExprKind::Name { .. }
            | ExprKind::BuiltinType(_)
            | ExprKind::Struct { .. }
            | ExprKind::InvalidExpression => {}
        }
    }
}
