//! "Does every path through this procedure body return a value" analysis.
//!
//! Run once per non-void procedure after its body resolves, so a procedure declared to
//! return a value but that can fall off the end is rejected before the emitter ever sees it
//! (the emitter's implicit `Return 0` at the end of a scope is only correct for `void`).

use crate::ast::{Ast, StmtId, StmtKind};

/// Returns whether every path through `stmt` ends in a `return`.
#[must_use]
pub fn stmt_always_returns(ast: &Ast, stmt: StmtId) -> bool {
    match &ast.stmt(stmt).kind {
        StmtKind::Return(_) => true,
        StmtKind::Scope(scope) => {
            let scope = ast.scope(*scope);
            scope.statements.iter().any(|&s| stmt_always_returns(ast, s))
        }
        StmtKind::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        } => stmt_always_returns(ast, *then_branch) && stmt_always_returns(ast, *else_branch),
        StmtKind::If { .. } => false,
        StmtKind::While { body, .. } => stmt_always_returns(ast, *body),
        StmtKind::Assignment { .. }
        | StmtKind::StatementExpression(_)
        | StmtKind::Semicolon
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Print(_)
        | StmtKind::Declaration(_)
        | StmtKind::Invalid => false,
    }
}
