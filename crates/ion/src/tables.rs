//! Operator and cast tables: the resolver's dispatch rules for unary/binary operators and
//! the compiler's rules for which casts are permitted and what the VM emits for them.
//!
//! All three tables are populated once, at [`Context`](crate::context::Context) construction,
//! from the fixed set of `int`/`uint`/`bool` entries the VM's opcode set actually supports
//! (see `bytecode::op::Opcode`). Narrower integer aliases (`u8`, `s16`, ...) intern fine and
//! are valid for declarations, casts, and `sizeof`, but have no arithmetic entries, matching
//! the VM's two arithmetic widths.

use ahash::AHashMap;

use crate::ast::{BinaryOp, UnaryOp};
use crate::types::{TypeId, Types};

/// What the emitter does for a permitted cast: either nothing (the bit pattern is already
/// correct) or a specific reinterpretation opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    Noop,
    I64ToU64,
    U64ToI64,
}

#[derive(Debug, Default)]
pub struct OperatorTables {
    unary: AHashMap<(UnaryOp, TypeId), TypeId>,
    binary: AHashMap<(BinaryOp, TypeId, TypeId), TypeId>,
    casts: AHashMap<(TypeId, TypeId), CastOp>,
}

impl OperatorTables {
    #[must_use]
    pub fn build(types: &mut Types) -> Self {
        let mut table = Self::default();
        let int_t = types.int_type;
        let uint_t = types.uint_type;
        let bool_t = types.bool_type;

        table.unary.insert((UnaryOp::Plus, int_t), int_t);
        table.unary.insert((UnaryOp::Plus, uint_t), uint_t);
        table.unary.insert((UnaryOp::Negate, int_t), int_t);
        table.unary.insert((UnaryOp::Negate, uint_t), uint_t);
        table.unary.insert((UnaryOp::Not, bool_t), bool_t);

        for &(op, ty) in &[
            (BinaryOp::Add, int_t),
            (BinaryOp::Sub, int_t),
            (BinaryOp::Mul, int_t),
            (BinaryOp::Div, int_t),
            (BinaryOp::Mod, int_t),
            (BinaryOp::Add, uint_t),
            (BinaryOp::Sub, uint_t),
            (BinaryOp::Mul, uint_t),
            (BinaryOp::Div, uint_t),
            (BinaryOp::Mod, uint_t),
        ] {
            table.binary.insert((op, ty, ty), ty);
        }
        for &(op, ty) in &[
            (BinaryOp::Less, int_t),
            (BinaryOp::Greater, int_t),
            (BinaryOp::LessEqual, int_t),
            (BinaryOp::GreaterEqual, int_t),
            (BinaryOp::Less, uint_t),
            (BinaryOp::Greater, uint_t),
            (BinaryOp::LessEqual, uint_t),
            (BinaryOp::GreaterEqual, uint_t),
        ] {
            table.binary.insert((op, ty, ty), bool_t);
        }
        // Equal/NotEqual are defined for every primitive the VM can hold in a fixed-width
        // slot: comparison is a byte-for-byte Equal over the operand's size.
        for ty in [int_t, uint_t, bool_t] {
            table.binary.insert((BinaryOp::Equal, ty, ty), bool_t);
            table.binary.insert((BinaryOp::NotEqual, ty, ty), bool_t);
        }

        // Reflexive casts are always permitted and always a no-op; register them for every
        // type the resolver is likely to cast between as they're interned.
        for ty in [int_t, uint_t, bool_t, types.void_type, types.string_type] {
            table.casts.insert((ty, ty), CastOp::Noop);
        }
        table.casts.insert((int_t, uint_t), CastOp::I64ToU64);
        table.casts.insert((uint_t, int_t), CastOp::U64ToI64);

        table
    }

    #[must_use]
    pub fn lookup_unary(&self, op: UnaryOp, operand: TypeId) -> Option<TypeId> {
        self.unary.get(&(op, operand)).copied()
    }

    #[must_use]
    pub fn lookup_binary(&self, op: BinaryOp, left: TypeId, right: TypeId) -> Option<TypeId> {
        self.binary.get(&(op, left, right)).copied()
    }

    #[must_use]
    pub fn lookup_cast(&self, from: TypeId, to: TypeId) -> Option<CastOp> {
        if from == to {
            return Some(CastOp::Noop);
        }
        self.casts.get(&(from, to)).copied()
    }
}
