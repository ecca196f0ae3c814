//! Name lookup: walking the active scope chain to find what a `Name` expression refers to.

use crate::ast::{Ast, DeclRef, ExprKind, ScopeId, StmtKind};
use crate::intern::StringId;

/// One entry of the scope chain currently being resolved, innermost last.
///
/// `visible_count` is how many of that scope's statements have already been fully resolved;
/// a non-constant declaration at or after that index is not yet in scope (the language's
/// "declare before use" rule for ordinary variables). Constants ignore this count entirely —
/// they're visible anywhere in their scope, which is what lets two global procedures call
/// each other regardless of declaration order.
pub struct ScopeFrame {
    pub scope: ScopeId,
    pub visible_count: usize,
}

/// Resolves `name` against the active scope chain (innermost frame last), honoring:
/// - procedure parameters, visible throughout their procedure's own body frame;
/// - non-constant declarations, visible only after their textual position and only within
///   the frame that declares them (crossing into an enclosing procedure's frame does not see
///   that procedure's locals or parameters — there are no closures);
/// - constant declarations, visible anywhere in their scope and every enclosing scope,
///   because constants live at a global offset rather than in a stack frame.
#[must_use]
pub fn resolve_name(ast: &Ast, active: &[ScopeFrame], name: StringId) -> Option<DeclRef> {
    let mut same_frame = true;
    for frame in active.iter().rev() {
        let scope = ast.scope(frame.scope);

        if same_frame {
            if let Some(proc_id) = scope.parent_procedure {
                if let ExprKind::Procedure(procedure) = &ast.expr(proc_id).kind {
                    for (index, param) in procedure.params.iter().enumerate() {
                        if param.name == name {
                            return Some(DeclRef::Param(proc_id, u32::try_from(index).expect("param count fits u32")));
                        }
                    }
                }
            }
        }

        for (index, &stmt_id) in scope.statements.iter().enumerate() {
            let StmtKind::Declaration(decl) = &ast.stmt(stmt_id).kind else {
                continue;
            };
            if decl.name != name {
                continue;
            }
            if decl.constant || (same_frame && index < frame.visible_count) {
                return Some(DeclRef::Local(stmt_id));
            }
        }

        if scope.parent_procedure.is_some() {
            same_frame = false;
        }
    }
    None
}
