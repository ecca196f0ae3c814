//! The VM's complete opcode set.
//!
//! Every instruction is one opcode byte followed by zero or more little-endian immediates:
//! mostly 8-byte words, occasionally a single byte (the boolean payload of a `Push`, or the
//! operand-size tag on `Equal`/jump instructions). The layout of each opcode's immediates is
//! fixed and is the binary contract between the emitter and the VM — see `vm::Vm::step` for
//! the decode side of each variant.
//!
//! `Mod{I,U}64` and the four relational comparisons are not literal transcriptions of anything
//! upstream; they fill in a gap where the resolver's operator table accepts `%`, `<`, `>`, `<=`
//! and `>=` over `int`/`uint` but nothing would otherwise emit them. They follow the same
//! pop-two-push-one shape as the arithmetic opcodes next to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Invalid = 0,
    Exit,
    Push,
    Pop,
    AllocStack,
    Dup,
    AddI64,
    SubI64,
    MulI64,
    DivI64,
    ModI64,
    AddU64,
    SubU64,
    MulU64,
    DivU64,
    ModU64,
    LessI64,
    LessU64,
    GreaterI64,
    GreaterU64,
    LessEqualI64,
    LessEqualU64,
    GreaterEqualI64,
    GreaterEqualU64,
    NegateI64,
    NegateU64,
    NegateBool,
    PrintI64,
    PrintU64,
    PrintBool,
    I64ToU64,
    U64ToI64,
    Equal,
    Jump,
    JumpZero,
    JumpNonZero,
    Call,
    Return,
    LoadRelative,
    StoreRelative,
    LoadAbsolute,
    StoreAbsolute,
}

impl Opcode {
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Invalid,
            1 => Self::Exit,
            2 => Self::Push,
            3 => Self::Pop,
            4 => Self::AllocStack,
            5 => Self::Dup,
            6 => Self::AddI64,
            7 => Self::SubI64,
            8 => Self::MulI64,
            9 => Self::DivI64,
            10 => Self::ModI64,
            11 => Self::AddU64,
            12 => Self::SubU64,
            13 => Self::MulU64,
            14 => Self::DivU64,
            15 => Self::ModU64,
            16 => Self::LessI64,
            17 => Self::LessU64,
            18 => Self::GreaterI64,
            19 => Self::GreaterU64,
            20 => Self::LessEqualI64,
            21 => Self::LessEqualU64,
            22 => Self::GreaterEqualI64,
            23 => Self::GreaterEqualU64,
            24 => Self::NegateI64,
            25 => Self::NegateU64,
            26 => Self::NegateBool,
            27 => Self::PrintI64,
            28 => Self::PrintU64,
            29 => Self::PrintBool,
            30 => Self::I64ToU64,
            31 => Self::U64ToI64,
            32 => Self::Equal,
            33 => Self::Jump,
            34 => Self::JumpZero,
            35 => Self::JumpNonZero,
            36 => Self::Call,
            37 => Self::Return,
            38 => Self::LoadRelative,
            39 => Self::StoreRelative,
            40 => Self::LoadAbsolute,
            41 => Self::StoreAbsolute,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Opcode;

    #[test]
    fn every_variant_round_trips_through_its_byte() {
        let variants = [
            Opcode::Invalid,
            Opcode::Exit,
            Opcode::Push,
            Opcode::Pop,
            Opcode::AllocStack,
            Opcode::Dup,
            Opcode::AddI64,
            Opcode::SubI64,
            Opcode::MulI64,
            Opcode::DivI64,
            Opcode::ModI64,
            Opcode::AddU64,
            Opcode::SubU64,
            Opcode::MulU64,
            Opcode::DivU64,
            Opcode::ModU64,
            Opcode::LessI64,
            Opcode::LessU64,
            Opcode::GreaterI64,
            Opcode::GreaterU64,
            Opcode::LessEqualI64,
            Opcode::LessEqualU64,
            Opcode::GreaterEqualI64,
            Opcode::GreaterEqualU64,
            Opcode::NegateI64,
            Opcode::NegateU64,
            Opcode::NegateBool,
            Opcode::PrintI64,
            Opcode::PrintU64,
            Opcode::PrintBool,
            Opcode::I64ToU64,
            Opcode::U64ToI64,
            Opcode::Equal,
            Opcode::Jump,
            Opcode::JumpZero,
            Opcode::JumpNonZero,
            Opcode::Call,
            Opcode::Return,
            Opcode::LoadRelative,
            Opcode::StoreRelative,
            Opcode::LoadAbsolute,
            Opcode::StoreAbsolute,
        ];
        for op in variants {
            assert_eq!(Opcode::from_byte(op as u8), Some(op));
        }
        assert_eq!(Opcode::from_byte(255), None);
    }
}
