//! Builder for emitting bytecode during code generation.
//!
//! `CodeBuilder` encodes opcodes and their little-endian immediates into a growable byte
//! buffer and hands back [`PatchSite`] handles for operands whose value (a jump target or a
//! not-yet-emitted procedure address) isn't known until later in the emission pass.

use super::op::Opcode;

/// A byte offset into the bytecode buffer at which an 8-byte little-endian operand was
/// written as a placeholder and must later be overwritten with its real value.
#[derive(Debug, Clone, Copy)]
pub struct PatchSite(usize);

#[derive(Debug, Default)]
pub struct CodeBuilder {
    code: Vec<u8>,
}

impl CodeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current_offset(&self) -> u64 {
        u64::try_from(self.code.len()).expect("bytecode buffer exceeds u64")
    }

    pub fn emit_op(&mut self, op: Opcode) {
        self.code.push(op as u8);
    }

    pub fn emit_u64(&mut self, value: u64) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_u8(&mut self, value: u8) {
        self.code.push(value);
    }

    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    /// Emits an 8-byte placeholder operand and returns a handle for patching it once the real
    /// value is known.
    pub fn emit_patch_site(&mut self) -> PatchSite {
        let site = PatchSite(self.code.len());
        self.emit_u64(0);
        site
    }

    pub fn patch(&mut self, site: PatchSite, value: u64) {
        let bytes = value.to_le_bytes();
        self.code[site.0..site.0 + 8].copy_from_slice(&bytes);
    }

    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.code
    }
}
