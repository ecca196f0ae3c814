//! Abstract syntax tree: a tagged tree of statements, expressions, and type expressions.
//!
//! Nodes live in flat arenas owned by an [`Ast`] and are addressed by newtype handles
//! (`ScopeId`, `StmtId`, `ExprId`) rather than owned references, so back-edges like
//! `parent_scope` and `Name::resolved` are plain `Copy` values instead of `Rc`/`RefCell`
//! cycles. The arena is freed in one shot when compilation ends.

use ahash::AHashMap;

use crate::diagnostics::CodeRange;
use crate::intern::StringId;
use crate::types::TypeId;

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(u32);

        impl $name {
            #[must_use]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(ScopeId);
arena_id!(StmtId);
arena_id!(ExprId);

/// A lexical scope: an ordered list of statements plus the layout bookkeeping the emitter
/// needs. Scopes form a tree whose root is the global scope (`parent == None`).
#[derive(Debug)]
pub struct ScopeData {
    pub statements: Vec<StmtId>,
    pub global: bool,
    pub parent_procedure: Option<ExprId>,
    pub parent: Option<ScopeId>,
    /// Running local-variable offset, advanced during layout. Nested (non-function) scopes
    /// share their enclosing function's counter instead of owning one.
    pub declaration_offset: u32,
}

impl ScopeData {
    #[must_use]
    pub fn new(global: bool, parent_procedure: Option<ExprId>, parent: Option<ScopeId>) -> Self {
        Self {
            statements: Vec::new(),
            global,
            parent_procedure,
            parent,
            declaration_offset: 0,
        }
    }
}

/// A name binding. Used both for statement-level declarations and procedure parameters
/// (distinguished by `parent_procedure`, which is `Some` only for the latter).
#[derive(Debug, Clone)]
pub struct Declaration {
    pub name: StringId,
    pub name_range: CodeRange,
    pub type_expr: Option<ExprId>,
    pub value_expr: Option<ExprId>,
    pub constant: bool,
    pub parent_procedure: Option<ExprId>,
    pub resolved_type: Option<TypeId>,
    /// Set only for constants whose value denotes a type (a builtin type name, a struct
    /// literal, a bodyless procedure literal, or `typeof(...)`) rather than an ordinary
    /// runtime value, so a later `name : ThisConstant` annotation can recover the concrete
    /// type instead of just `type`, the meta-type every such value shares.
    pub type_value: Option<TypeId>,
    pub global_offset: bool,
    pub offset: u32,
}

impl Declaration {
    #[must_use]
    pub fn new(
        name: StringId,
        name_range: CodeRange,
        type_expr: Option<ExprId>,
        value_expr: Option<ExprId>,
        constant: bool,
        parent_procedure: Option<ExprId>,
    ) -> Self {
        Self {
            name,
            name_range,
            type_expr,
            value_expr,
            constant,
            parent_procedure,
            resolved_type: None,
            type_value: None,
            global_offset: false,
            offset: 0,
        }
    }
}

/// A reference to the declaration a `Name` expression resolved to: either a statement-level
/// declaration (addressed by the `Declaration` statement's id) or a procedure parameter
/// (addressed by the owning `Procedure` expression and a positional index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclRef {
    Local(StmtId),
    Param(ExprId, u32),
}

#[derive(Debug)]
pub struct StmtNode {
    pub parent_scope: ScopeId,
    pub range: CodeRange,
    pub kind: StmtKind,
}

#[derive(Debug)]
pub enum StmtKind {
    Scope(ScopeId),
    Declaration(Declaration),
    Assignment {
        op: crate::token::AssignOp,
        target: ExprId,
        value: ExprId,
    },
    If {
        condition: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
    },
    While {
        condition: ExprId,
        body: StmtId,
    },
    Return(Option<ExprId>),
    StatementExpression(ExprId),
    Semicolon,
    Break,
    Continue,
    Print(ExprId),
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Plus,
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Equal,
    NotEqual,
}

/// A procedure literal: `(params) -> ReturnType { body }`.
///
/// A procedure with no body is, per the language's type-literal convention, a procedure
/// *type* expression (`foo : (int) -> int;`); the resolver rewrites such expressions'
/// `resolved_type` to `TypeType` rather than `TypeProcedure` but keeps this representation
/// so param/return syntax stays uniform between values and types.
#[derive(Debug)]
pub struct Procedure {
    pub params: Vec<Declaration>,
    pub return_type: Option<ExprId>,
    pub body: Option<ScopeId>,
    pub builtin_name: Option<StringId>,
}

#[derive(Debug)]
pub struct ExprNode {
    /// The scope this expression was parsed in. The spec's `parentStatement` back-edge and
    /// the "follow `parentStatement.parentScope` to reach global scope" invariant both exist
    /// to answer one question during resolution — "what scope encloses this expression" — so
    /// this field stores that scope directly instead of indirecting through an owning
    /// statement that, for most expressions (operands, call arguments, nested expressions),
    /// would just be a pass-through to the same answer.
    pub owner_scope: ScopeId,
    /// Process-unique monotonic identity, used only for debug printing.
    pub id: u32,
    pub range: CodeRange,
    pub resolved_type: Option<TypeId>,
    pub kind: ExprKind,
}

#[derive(Debug)]
pub enum ExprKind {
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    Binary {
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    },
    Cast {
        target_type: ExprId,
        expr: ExprId,
    },
    Transmute {
        target_type: ExprId,
        expr: ExprId,
    },
    TypeOf(ExprId),
    SizeOf(ExprId),
    Integer(u64),
    Float(f64),
    String(StringId),
    True,
    False,
    Name {
        name: StringId,
        resolved: Option<DeclRef>,
    },
    Procedure(Procedure),
    Call {
        callee: ExprId,
        args: Vec<ExprId>,
    },
    MemberAccess {
        base: ExprId,
        member: StringId,
    },
    BuiltinType(BuiltinTypeName),
    Struct {
        members: Vec<(StringId, CodeRange, ExprId)>,
    },
    InvalidExpression,
}

/// Names the parser recognizes as built-in type keywords. `TypeName` resolves these to
/// interned `Type`s rather than name-table lookups, since they are reserved words, not
/// ordinary identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinTypeName {
    Type,
    Int,
    UInt,
    Bool,
    Void,
    U8,
    U16,
    U32,
    U64,
    S8,
    S16,
    S32,
    S64,
    F32,
    F64,
    String,
}

impl BuiltinTypeName {
    #[must_use]
    pub fn from_str(text: &str) -> Option<Self> {
        Some(match text {
            "type" => Self::Type,
            "int" => Self::Int,
            "uint" => Self::UInt,
            "bool" => Self::Bool,
            "void" => Self::Void,
            "u8" => Self::U8,
            "u16" => Self::U16,
            "u32" => Self::U32,
            "u64" => Self::U64,
            "s8" => Self::S8,
            "s16" => Self::S16,
            "s32" => Self::S32,
            "s64" => Self::S64,
            "f32" => Self::F32,
            "f64" => Self::F64,
            "string" => Self::String,
            _ => return None,
        })
    }
}

/// Owns every statement, expression, and scope in the program as flat arenas.
#[derive(Debug, Default)]
pub struct Ast {
    scopes: Vec<ScopeData>,
    stmts: Vec<StmtNode>,
    exprs: Vec<ExprNode>,
    next_expr_identity: u32,
    /// The concrete type denoted by a type expression (a `BuiltinType`, `Struct`, bodyless
    /// `Procedure`, `TypeOf`, or type-aliasing `Name`), keyed by that expression's id.
    ///
    /// `ExprNode::resolved_type` for these nodes holds `TypeType`, the meta-type of a type
    /// value — that's the type *of* the expression, not the type it *denotes*. This map is
    /// the other half: what concrete type does this expression, used as a type, stand for.
    /// Populated by the resolver, read by the emitter for `sizeof` and by nothing else (type
    /// expressions are otherwise never walked for emission).
    type_values: AHashMap<ExprId, TypeId>,
}

impl Ast {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_type_value(&mut self, id: ExprId, ty: TypeId) {
        self.type_values.insert(id, ty);
    }

    #[must_use]
    pub fn type_value(&self, id: ExprId) -> Option<TypeId> {
        self.type_values.get(&id).copied()
    }

    pub fn alloc_scope(&mut self, scope: ScopeData) -> ScopeId {
        self.scopes.push(scope);
        ScopeId(u32::try_from(self.scopes.len() - 1).expect("scope arena exceeded u32 capacity"))
    }

    pub fn alloc_stmt(&mut self, node: StmtNode) -> StmtId {
        self.stmts.push(node);
        StmtId(u32::try_from(self.stmts.len() - 1).expect("statement arena exceeded u32 capacity"))
    }

    pub fn alloc_expr(&mut self, owner_scope: ScopeId, range: CodeRange, kind: ExprKind) -> ExprId {
        let id = self.next_expr_identity;
        self.next_expr_identity += 1;
        self.exprs.push(ExprNode {
            owner_scope,
            id,
            range,
            resolved_type: None,
            kind,
        });
        ExprId(u32::try_from(self.exprs.len() - 1).expect("expression arena exceeded u32 capacity"))
    }

    #[must_use]
    pub fn scope(&self, id: ScopeId) -> &ScopeData {
        &self.scopes[id.index()]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut ScopeData {
        &mut self.scopes[id.index()]
    }

    #[must_use]
    pub fn stmt(&self, id: StmtId) -> &StmtNode {
        &self.stmts[id.index()]
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut StmtNode {
        &mut self.stmts[id.index()]
    }

    #[must_use]
    pub fn expr(&self, id: ExprId) -> &ExprNode {
        &self.exprs[id.index()]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut ExprNode {
        &mut self.exprs[id.index()]
    }

    /// Looks up a declaration by reference, regardless of whether it is a statement-level
    /// declaration or a procedure parameter.
    #[must_use]
    pub fn declaration(&self, decl_ref: DeclRef) -> &Declaration {
        match decl_ref {
            DeclRef::Local(stmt_id) => match &self.stmt(stmt_id).kind {
                StmtKind::Declaration(decl) => decl,
                _ => unreachable!("DeclRef::Local must point at a Declaration statement"),
            },
            DeclRef::Param(proc_id, index) => match &self.expr(proc_id).kind {
                ExprKind::Procedure(procedure) => &procedure.params[index as usize],
                _ => unreachable!("DeclRef::Param must point at a Procedure expression"),
            },
        }
    }

    pub fn declaration_mut(&mut self, decl_ref: DeclRef) -> &mut Declaration {
        match decl_ref {
            DeclRef::Local(stmt_id) => match &mut self.stmt_mut(stmt_id).kind {
                StmtKind::Declaration(decl) => decl,
                _ => unreachable!("DeclRef::Local must point at a Declaration statement"),
            },
            DeclRef::Param(proc_id, index) => match &mut self.expr_mut(proc_id).kind {
                ExprKind::Procedure(procedure) => &mut procedure.params[index as usize],
                _ => unreachable!("DeclRef::Param must point at a Procedure expression"),
            },
        }
    }

}
