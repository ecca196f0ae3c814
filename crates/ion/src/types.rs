//! Structurally interned types.
//!
//! Two types compare equal iff they are structurally equal, and the resolver only ever
//! hands out [`TypeId`]s from a single intern pool, so "are these the same type" is an
//! identity comparison (`TypeId == TypeId`) once interning has happened once.

use ahash::AHashMap;

use crate::intern::StringId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// The meta-type of type expressions themselves (the result of `typeof(e)` and of a
    /// bodyless procedure or struct literal).
    Type,
    Integer { signed: bool, size: u8 },
    Float { size: u8 },
    Bool,
    String,
    Void,
    Procedure { params: Vec<TypeId>, return_type: TypeId },
    Struct { members: Vec<(StringId, TypeId)> },
}

/// A single interned type: its structural kind plus the byte size the emitter uses for
/// load/store/allocation sizing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Type {
    pub kind: TypeKind,
    pub size: u32,
}

/// Size in bytes for every kind except `Struct`, whose size depends on already-interned
/// member types and is computed separately in `intern`.
fn size_of_kind(kind: &TypeKind) -> u32 {
    match kind {
        TypeKind::Type | TypeKind::Void => 0,
        TypeKind::Bool => 1,
        TypeKind::Integer { size, .. } | TypeKind::Float { size } => u32::from(*size),
        TypeKind::String | TypeKind::Procedure { .. } => 8,
        TypeKind::Struct { .. } => unreachable!("struct size is computed in Types::intern"),
    }
}

/// Owns every interned type. Construction always goes through `intern`, which deduplicates
/// structurally-equal kinds so callers never need to intern the same shape twice.
#[derive(Debug)]
pub struct Types {
    types: Vec<Type>,
    lookup: AHashMap<TypeKind, TypeId>,
    pub type_type: TypeId,
    pub int_type: TypeId,
    pub uint_type: TypeId,
    pub bool_type: TypeId,
    pub void_type: TypeId,
    pub string_type: TypeId,
    pub f32_type: TypeId,
    pub f64_type: TypeId,
}

impl Types {
    #[must_use]
    pub fn new() -> Self {
        let mut types = Self {
            types: Vec::new(),
            lookup: AHashMap::new(),
            type_type: TypeId(0),
            int_type: TypeId(0),
            uint_type: TypeId(0),
            bool_type: TypeId(0),
            void_type: TypeId(0),
            string_type: TypeId(0),
            f32_type: TypeId(0),
            f64_type: TypeId(0),
        };
        types.type_type = types.intern(TypeKind::Type);
        types.int_type = types.intern(TypeKind::Integer { signed: true, size: 8 });
        types.uint_type = types.intern(TypeKind::Integer { signed: false, size: 8 });
        types.bool_type = types.intern(TypeKind::Bool);
        types.void_type = types.intern(TypeKind::Void);
        types.string_type = types.intern(TypeKind::String);
        types.f32_type = types.intern(TypeKind::Float { size: 4 });
        types.f64_type = types.intern(TypeKind::Float { size: 8 });
        types
    }

    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.lookup.get(&kind) {
            return id;
        }
        let size = match &kind {
            TypeKind::Struct { members } => members.iter().map(|(_, ty)| self.get(*ty).size).sum(),
            other => size_of_kind(other),
        };
        let id = TypeId(u32::try_from(self.types.len()).expect("type arena exceeded u32 capacity"));
        self.types.push(Type { kind: kind.clone(), size });
        self.lookup.insert(kind, id);
        id
    }

    #[must_use]
    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    #[must_use]
    pub fn integer(&mut self, signed: bool, size: u8) -> TypeId {
        self.intern(TypeKind::Integer { signed, size })
    }

    #[must_use]
    pub fn procedure(&mut self, params: Vec<TypeId>, return_type: TypeId) -> TypeId {
        self.intern(TypeKind::Procedure { params, return_type })
    }

    #[must_use]
    pub fn struct_type(&mut self, members: Vec<(StringId, TypeId)>) -> TypeId {
        self.intern(TypeKind::Struct { members })
    }

    /// Resolves a built-in type keyword to its interned `TypeId`.
    #[must_use]
    pub fn builtin(&mut self, name: crate::ast::BuiltinTypeName) -> TypeId {
        use crate::ast::BuiltinTypeName as B;
        match name {
            B::Type => self.type_type,
            B::Int => self.int_type,
            B::UInt => self.uint_type,
            B::Bool => self.bool_type,
            B::Void => self.void_type,
            B::String => self.string_type,
            B::F32 => self.f32_type,
            B::F64 => self.f64_type,
            B::U8 => self.integer(false, 1),
            B::U16 => self.integer(false, 2),
            B::U32 => self.integer(false, 4),
            B::U64 => self.uint_type,
            B::S8 => self.integer(true, 1),
            B::S16 => self.integer(true, 2),
            B::S32 => self.integer(true, 4),
            B::S64 => self.int_type,
        }
    }
}

impl Default for Types {
    fn default() -> Self {
        Self::new()
    }
}
