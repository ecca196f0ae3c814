//! Bytecode compilation: storage layout followed by code generation, and the VM that runs
//! the result.

pub mod op;
pub mod vm;

mod builder;
mod emit;
mod layout;

use crate::ast::{Ast, ScopeId, StmtId, StmtKind};
use crate::context::Context;

/// Compiles a resolved, laid-out-free `Ast` into a bytecode buffer ready for [`vm::Vm::run`].
///
/// Panics if `global` has no `main` declaration; callers are expected to only call this after
/// `resolver::resolve` has reported success, which guarantees exactly one.
#[must_use]
pub fn compile(ast: &mut Ast, global: ScopeId, ctx: &Context) -> Vec<u8> {
    let main_decl = find_main(ast, global, ctx);
    let layout = layout::layout(ast, global, &ctx.types);
    emit::emit(ast, &layout, ctx, main_decl)
}

fn find_main(ast: &Ast, global: ScopeId, ctx: &Context) -> StmtId {
    ast.scope(global)
        .statements
        .iter()
        .copied()
        .find(|&stmt_id| match &ast.stmt(stmt_id).kind {
            StmtKind::Declaration(decl) => ctx.interner.resolve(decl.name) == "main",
            _ => false,
        })
        .expect("resolver's check_main guarantees exactly one global 'main' declaration")
}
