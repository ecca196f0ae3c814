//! Code generation: walks a laid-out, resolved AST and emits bytecode for it.
//!
//! Two details don't fall out of a single top-to-bottom walk:
//!
//! - A procedure literal is encountered (and must push its own address) long before its body
//!   can be placed in the code stream, since the body's own size isn't known yet and forward
//!   calls need a stable address ahead of time. [`CodeBuilder::emit_patch_site`] defers that:
//!   the literal pushes a placeholder, queues itself, and every queued body is emitted only
//!   after the rest of the program (so a body may itself queue further bodies).
//! - `break` needs the exit address of its nearest enclosing `while`, which isn't known until
//!   that loop finishes emitting. Each active loop keeps its own list of pending break patches
//!   on a stack, popped and patched together with the loop's own exit jump.

use std::collections::VecDeque;

use crate::ast::{Ast, BinaryOp, DeclRef, ExprId, ExprKind, ScopeId, StmtId, StmtKind, UnaryOp};
use crate::context::Context;
use crate::tables::CastOp;
use crate::token::AssignOp;
use crate::types::{TypeId, TypeKind, Types};

use super::builder::{CodeBuilder, PatchSite};
use super::layout::Layout;
use super::op::Opcode;

/// Emits a complete program: the global/constant arena allocation, every constant's
/// initializer, a call into `main`, and every procedure body `main` (transitively) reaches.
#[must_use]
pub fn emit(ast: &Ast, layout: &Layout, ctx: &Context, main_decl: StmtId) -> Vec<u8> {
    let mut emitter = Emitter {
        ast,
        ctx,
        builder: CodeBuilder::new(),
        pending_calls: VecDeque::new(),
        loop_stack: Vec::new(),
    };

    emitter.builder.emit_op(Opcode::AllocStack);
    emitter.builder.emit_u64(u64::from(layout.global_size));

    for &stmt_id in &layout.constants {
        emitter.emit_constant_init(stmt_id);
    }

    let main = ast.declaration(DeclRef::Local(main_decl));
    let main_size = main.resolved_type.map_or(8, |t| ctx.types.get(t).size);
    emitter.emit_load(main.global_offset, u64::from(main.offset), main_size);
    emitter.builder.emit_op(Opcode::Call);
    emitter.builder.emit_u64(0);
    emitter.builder.emit_op(Opcode::Exit);

    emitter.drain_pending();

    emitter.builder.build()
}

struct LoopFrame {
    start: u64,
    break_patches: Vec<PatchSite>,
}

struct Emitter<'a> {
    ast: &'a Ast,
    ctx: &'a Context,
    builder: CodeBuilder,
    pending_calls: VecDeque<(PatchSite, ExprId)>,
    loop_stack: Vec<LoopFrame>,
}

impl<'a> Emitter<'a> {
    fn types(&self) -> &Types {
        &self.ctx.types
    }

    fn emit_load(&mut self, global: bool, offset: u64, size: u32) {
        self.builder.emit_op(if global { Opcode::LoadAbsolute } else { Opcode::LoadRelative });
        self.builder.emit_u64(offset);
        self.builder.emit_u64(u64::from(size));
    }

    fn emit_store(&mut self, global: bool, offset: u64, size: u32) {
        self.builder.emit_op(if global { Opcode::StoreAbsolute } else { Opcode::StoreRelative });
        self.builder.emit_u64(offset);
        self.builder.emit_u64(u64::from(size));
    }

    /// Resolves a `Name` or `MemberAccess` expression to its storage location, recursing
    /// through member accesses to sum the base's offset with each member's position-in-order.
    fn lvalue(&self, expr_id: ExprId) -> (bool, u64, u32) {
        match &self.ast.expr(expr_id).kind {
            ExprKind::Name { resolved: Some(decl_ref), .. } => {
                let decl = self.ast.declaration(*decl_ref);
                let size = decl.resolved_type.map_or(0, |t| self.types().get(t).size);
                (decl.global_offset, u64::from(decl.offset), size)
            }
            ExprKind::MemberAccess { base, member } => {
                let (global, base_offset, _) = self.lvalue(*base);
                let base_ty = self.ast.expr(*base).resolved_type.expect("resolver typed this");
                let TypeKind::Struct { members } = &self.types().get(base_ty).kind else {
                    unreachable!("MemberAccess base always resolves to a struct type")
                };
                let mut running = 0u32;
                let mut found = None;
                for (name, ty) in members {
                    let size = self.types().get(*ty).size;
                    if *name == *member {
                        found = Some(size);
                        break;
                    }
                    running += size;
                }
                let size = found.expect("resolver validated the member exists");
                (global, base_offset + u64::from(running), size)
            }
            _ => unreachable!("lvalue is only computed for Name and MemberAccess expressions"),
        }
    }

    // -- statements -----------------------------------------------------------------------------

    fn emit_scope_statements(&mut self, scope: ScopeId) {
        for &stmt_id in &self.ast.scope(scope).statements {
            self.emit_stmt(stmt_id);
        }
    }

    fn emit_stmt(&mut self, stmt_id: StmtId) {
        match &self.ast.stmt(stmt_id).kind {
            StmtKind::Scope(inner) => {
                let inner = *inner;
                self.emit_scope_statements(inner);
            }
            StmtKind::Declaration(_) => self.emit_declaration(stmt_id),
            StmtKind::Assignment { op, target, value } => {
                let (op, target, value) = (*op, *target, *value);
                self.emit_assignment(op, target, value);
            }
            StmtKind::If { condition, then_branch, else_branch } => {
                let (condition, then_branch, else_branch) = (*condition, *then_branch, *else_branch);
                self.emit_if(condition, then_branch, else_branch);
            }
            StmtKind::While { condition, body } => {
                let (condition, body) = (*condition, *body);
                self.emit_while(condition, body);
            }
            StmtKind::Break => self.emit_break(),
            StmtKind::Continue => self.emit_continue(),
            StmtKind::Return(value) => {
                let value = *value;
                self.emit_return(value);
            }
            StmtKind::StatementExpression(expr) => {
                let expr = *expr;
                self.emit_expr(expr);
                let size = self.ast.expr(expr).resolved_type.map_or(0, |t| self.types().get(t).size);
                if size > 0 {
                    self.builder.emit_op(Opcode::Pop);
                    self.builder.emit_u64(u64::from(size));
                }
            }
            StmtKind::Print(expr) => {
                let expr = *expr;
                self.emit_expr(expr);
                let ty = self.ast.expr(expr).resolved_type.expect("resolver typed this");
                self.builder.emit_op(print_opcode(ty, self.types()));
            }
            StmtKind::Semicolon | StmtKind::Invalid => {}
        }
    }

    /// A constant declaration is emitted exactly once, from the global initializer pass
    /// ([`emit_constant_init`](Self::emit_constant_init)); the ordinary statement walk skips it
    /// wherever it's textually declared.
    fn emit_declaration(&mut self, stmt_id: StmtId) {
        let decl_ref = DeclRef::Local(stmt_id);
        let decl = self.ast.declaration(decl_ref);
        if decl.constant {
            return;
        }
        let (value_expr, global_offset, offset, resolved_type) =
            (decl.value_expr, decl.global_offset, decl.offset, decl.resolved_type);
        let value_expr = value_expr.expect("resolver rejects declarations with no initializer");
        self.emit_expr(value_expr);
        let size = resolved_type.map_or(0, |t| self.types().get(t).size);
        self.emit_store(global_offset, u64::from(offset), size);
    }

    fn emit_constant_init(&mut self, stmt_id: StmtId) {
        let decl_ref = DeclRef::Local(stmt_id);
        let decl = self.ast.declaration(decl_ref);
        let (value_expr, offset, resolved_type) = (decl.value_expr, decl.offset, decl.resolved_type);
        let value_expr = value_expr.expect("resolver rejects declarations with no initializer");
        self.emit_expr(value_expr);
        let size = resolved_type.map_or(0, |t| self.types().get(t).size);
        self.emit_store(true, u64::from(offset), size);
    }

    fn emit_assignment(&mut self, op: AssignOp, target: ExprId, value: ExprId) {
        let (global, offset, size) = self.lvalue(target);
        if op == AssignOp::Equal {
            self.emit_expr(value);
        } else {
            self.emit_load(global, offset, size);
            self.emit_expr(value);
            let ty = self.ast.expr(target).resolved_type.expect("resolver typed this");
            let signed = is_signed(ty, self.types());
            self.builder.emit_op(arithmetic_opcode(assign_op_to_binary(op), signed));
        }
        self.emit_store(global, offset, size);
    }

    fn emit_if(&mut self, condition: ExprId, then_branch: StmtId, else_branch: Option<StmtId>) {
        self.emit_expr(condition);
        let cond_size = self.ast.expr(condition).resolved_type.map_or(1, |t| self.types().get(t).size);
        self.builder.emit_op(Opcode::JumpZero);
        let false_site = self.builder.emit_patch_site();
        self.builder.emit_u64(u64::from(cond_size));

        self.emit_stmt(then_branch);
        self.builder.emit_op(Opcode::Jump);
        let end_site = self.builder.emit_patch_site();

        let false_target = self.builder.current_offset();
        self.builder.patch(false_site, false_target);
        if let Some(else_branch) = else_branch {
            self.emit_stmt(else_branch);
        }
        let end_target = self.builder.current_offset();
        self.builder.patch(end_site, end_target);
    }

    fn emit_while(&mut self, condition: ExprId, body: StmtId) {
        let loop_start = self.builder.current_offset();
        self.emit_expr(condition);
        let cond_size = self.ast.expr(condition).resolved_type.map_or(1, |t| self.types().get(t).size);
        self.builder.emit_op(Opcode::JumpZero);
        let exit_site = self.builder.emit_patch_site();
        self.builder.emit_u64(u64::from(cond_size));

        self.loop_stack.push(LoopFrame { start: loop_start, break_patches: Vec::new() });
        self.emit_stmt(body);
        self.builder.emit_op(Opcode::Jump);
        self.builder.emit_u64(loop_start);

        let exit_target = self.builder.current_offset();
        self.builder.patch(exit_site, exit_target);
        let frame = self.loop_stack.pop().expect("pushed immediately above");
        for site in frame.break_patches {
            self.builder.patch(site, exit_target);
        }
    }

    fn emit_break(&mut self) {
        self.builder.emit_op(Opcode::Jump);
        let site = self.builder.emit_patch_site();
        let frame = self.loop_stack.last_mut().expect("resolver rejects 'break' outside a loop");
        frame.break_patches.push(site);
    }

    fn emit_continue(&mut self) {
        let start = self.loop_stack.last().expect("resolver rejects 'continue' outside a loop").start;
        self.builder.emit_op(Opcode::Jump);
        self.builder.emit_u64(start);
    }

    fn emit_return(&mut self, value: Option<ExprId>) {
        match value {
            Some(value) => {
                self.emit_expr(value);
                let size = self.ast.expr(value).resolved_type.map_or(0, |t| self.types().get(t).size);
                self.builder.emit_op(Opcode::Return);
                self.builder.emit_u64(u64::from(size));
            }
            None => {
                self.builder.emit_op(Opcode::Return);
                self.builder.emit_u64(0);
            }
        }
    }

    // -- expressions ----------------------------------------------------------------------------

    fn emit_expr(&mut self, expr_id: ExprId) {
        match &self.ast.expr(expr_id).kind {
            ExprKind::Unary { op, operand } => {
                let (op, operand) = (*op, *operand);
                self.emit_expr(operand);
                let ty = self.ast.expr(operand).resolved_type.expect("resolver typed this");
                if let Some(opcode) = unary_opcode(op, ty, self.types()) {
                    self.builder.emit_op(opcode);
                }
            }
            ExprKind::Binary { op, left, right } => {
                let (op, left, right) = (*op, *left, *right);
                self.emit_expr(left);
                self.emit_expr(right);
                self.emit_binary_op(op, left);
            }
            ExprKind::Cast { target_type, expr } => {
                let (target_type, inner) = (*target_type, *expr);
                self.emit_expr(inner);
                let from_ty = self.ast.expr(inner).resolved_type.expect("resolver typed this");
                let to_ty = self.ast.type_value(target_type).expect("resolver set the cast's target type");
                match self.ctx.operators.lookup_cast(from_ty, to_ty) {
                    Some(CastOp::I64ToU64) => self.builder.emit_op(Opcode::I64ToU64),
                    Some(CastOp::U64ToI64) => self.builder.emit_op(Opcode::U64ToI64),
                    Some(CastOp::Noop) | None => {}
                }
            }
            ExprKind::Transmute { expr, .. } => {
                let inner = *expr;
                self.emit_expr(inner);
            }
            ExprKind::SizeOf(inner) => {
                let inner = *inner;
                let ty = self.ast.type_value(inner).expect("resolver set this");
                let size = self.types().get(ty).size;
                self.builder.emit_op(Opcode::Push);
                self.builder.emit_u64(8);
                self.builder.emit_u64(u64::from(size));
            }
            ExprKind::Integer(value) => {
                let value = *value;
                self.builder.emit_op(Opcode::Push);
                self.builder.emit_u64(8);
                self.builder.emit_u64(value);
            }
            ExprKind::Float(value) => {
                let value = *value;
                let ty = self.ast.expr(expr_id).resolved_type.expect("resolver typed this");
                let size = self.types().get(ty).size;
                self.builder.emit_op(Opcode::Push);
                self.builder.emit_u64(u64::from(size));
                if size == 4 {
                    #[allow(clippy::cast_possible_truncation)]
                    self.builder.emit_bytes(&(value as f32).to_le_bytes());
                } else {
                    self.builder.emit_bytes(&value.to_le_bytes());
                }
            }
            ExprKind::String(_) => {
                // No heap: there is nowhere for string contents to live on a data-stack-only
                // machine. A literal reserves its 8-byte slot but carries no backing storage.
                self.builder.emit_op(Opcode::Push);
                self.builder.emit_u64(8);
                self.builder.emit_u64(0);
            }
            ExprKind::True => {
                self.builder.emit_op(Opcode::Push);
                self.builder.emit_u64(1);
                self.builder.emit_u8(1);
            }
            ExprKind::False => {
                self.builder.emit_op(Opcode::Push);
                self.builder.emit_u64(1);
                self.builder.emit_u8(0);
            }
            ExprKind::Name { resolved: Some(_), .. } => {
                let (global, offset, size) = self.lvalue(expr_id);
                self.emit_load(global, offset, size);
            }
            ExprKind::MemberAccess { .. } => {
                let (global, offset, size) = self.lvalue(expr_id);
                self.emit_load(global, offset, size);
            }
            ExprKind::Procedure(p) => {
                assert!(p.body.is_some(), "bodyless procedures are type expressions, never emitted as values");
                self.builder.emit_op(Opcode::Push);
                self.builder.emit_u64(8);
                let site = self.builder.emit_patch_site();
                self.pending_calls.push_back((site, expr_id));
            }
            ExprKind::Call { callee, args } => {
                let (callee, args) = (*callee, args.clone());
                self.emit_expr(callee);
                let mut total_size = 0u32;
                for &arg in &args {
                    self.emit_expr(arg);
                    total_size += self.ast.expr(arg).resolved_type.map_or(0, |t| self.types().get(t).size);
                }
                self.builder.emit_op(Opcode::Call);
                self.builder.emit_u64(u64::from(total_size));
            }
            ExprKind::Name { resolved: None, .. }
            | ExprKind::TypeOf(_)
            | ExprKind::BuiltinType(_)
            | ExprKind::Struct { .. }
            | ExprKind::InvalidExpression => {
                unreachable!("resolver never lets this expression kind reach emission in value position")
            }
        }
    }

    fn emit_binary_op(&mut self, op: BinaryOp, left: ExprId) {
        let left_ty = self.ast.expr(left).resolved_type.expect("resolver typed this");
        match op {
            BinaryOp::Equal | BinaryOp::NotEqual => {
                let size = self.types().get(left_ty).size;
                self.builder.emit_op(Opcode::Equal);
                self.builder.emit_u64(u64::from(size));
                if op == BinaryOp::NotEqual {
                    self.builder.emit_op(Opcode::NegateBool);
                }
            }
            _ => {
                let signed = is_signed(left_ty, self.types());
                self.builder.emit_op(arithmetic_opcode(op, signed));
            }
        }
    }

    fn drain_pending(&mut self) {
        while let Some((site, proc_id)) = self.pending_calls.pop_front() {
            let addr = self.builder.current_offset();
            self.builder.patch(site, addr);
            self.emit_procedure_body(proc_id);
        }
    }

    /// A body's `AllocStack` operand is its scope's full `declaration_offset`, which already
    /// counts parameter bytes `Call` re-pushed before control reached here: the allocation
    /// lands just past those bytes and over-reserves by `argSize`, but `Return` resets `sp`
    /// to `bp` unconditionally, so the slack is harmless and never observable.
    fn emit_procedure_body(&mut self, proc_id: ExprId) {
        let body = match &self.ast.expr(proc_id).kind {
            ExprKind::Procedure(p) => p.body,
            _ => unreachable!("pending_calls only ever queues Procedure expressions"),
        };
        let body = body.expect("only procedures with a body are queued");

        self.builder.emit_op(Opcode::AllocStack);
        self.builder.emit_u64(u64::from(self.ast.scope(body).declaration_offset));
        self.emit_scope_statements(body);
        self.builder.emit_op(Opcode::Return);
        self.builder.emit_u64(0);
    }
}

fn is_signed(ty: TypeId, types: &Types) -> bool {
    matches!(types.get(ty).kind, TypeKind::Integer { signed: true, .. })
}

fn print_opcode(ty: TypeId, types: &Types) -> Opcode {
    match &types.get(ty).kind {
        TypeKind::Integer { signed: true, .. } => Opcode::PrintI64,
        TypeKind::Integer { signed: false, .. } => Opcode::PrintU64,
        TypeKind::Bool => Opcode::PrintBool,
        other => panic!("'print' has no VM support for {other:?}; only int/uint/bool are printable"),
    }
}

fn unary_opcode(op: UnaryOp, ty: TypeId, types: &Types) -> Option<Opcode> {
    match op {
        UnaryOp::Plus => None,
        UnaryOp::Negate => Some(if is_signed(ty, types) { Opcode::NegateI64 } else { Opcode::NegateU64 }),
        UnaryOp::Not => Some(Opcode::NegateBool),
    }
}

fn arithmetic_opcode(op: BinaryOp, signed: bool) -> Opcode {
    match (op, signed) {
        (BinaryOp::Add, true) => Opcode::AddI64,
        (BinaryOp::Add, false) => Opcode::AddU64,
        (BinaryOp::Sub, true) => Opcode::SubI64,
        (BinaryOp::Sub, false) => Opcode::SubU64,
        (BinaryOp::Mul, true) => Opcode::MulI64,
        (BinaryOp::Mul, false) => Opcode::MulU64,
        (BinaryOp::Div, true) => Opcode::DivI64,
        (BinaryOp::Div, false) => Opcode::DivU64,
        (BinaryOp::Mod, true) => Opcode::ModI64,
        (BinaryOp::Mod, false) => Opcode::ModU64,
        (BinaryOp::Less, true) => Opcode::LessI64,
        (BinaryOp::Less, false) => Opcode::LessU64,
        (BinaryOp::Greater, true) => Opcode::GreaterI64,
        (BinaryOp::Greater, false) => Opcode::GreaterU64,
        (BinaryOp::LessEqual, true) => Opcode::LessEqualI64,
        (BinaryOp::LessEqual, false) => Opcode::LessEqualU64,
        (BinaryOp::GreaterEqual, true) => Opcode::GreaterEqualI64,
        (BinaryOp::GreaterEqual, false) => Opcode::GreaterEqualU64,
        (BinaryOp::Equal | BinaryOp::NotEqual, _) => {
            unreachable!("Equal/NotEqual are emitted through the size-parameterized Equal opcode")
        }
    }
}

fn assign_op_to_binary(op: AssignOp) -> BinaryOp {
    match op {
        AssignOp::PlusEqual => BinaryOp::Add,
        AssignOp::MinusEqual => BinaryOp::Sub,
        AssignOp::StarEqual => BinaryOp::Mul,
        AssignOp::SlashEqual => BinaryOp::Div,
        AssignOp::PercentEqual => BinaryOp::Mod,
        AssignOp::Equal => unreachable!("Equal is handled directly in emit_assignment"),
    }
}
