//! The stack virtual machine: a fetch/decode/step loop over a byte-addressable code region
//! and a separate byte-addressable data stack.
//!
//! There is no heap and no garbage collector — the data stack, preallocated once at
//! construction, is the only managed storage a running program has. Every cursor (`ip`, `sp`,
//! `bp`) is range-checked before each access; leaving its permitted region halts execution
//! with an error rather than reading or writing out of bounds.

pub mod io;

use super::op::Opcode;
use io::{PrintSink, StdPrint};

const STACK_SIZE: usize = 1 << 20;

pub struct Vm<'a, P: PrintSink = StdPrint> {
    code: &'a [u8],
    stack: Vec<u8>,
    ip: usize,
    sp: usize,
    bp: usize,
    sink: P,
}

impl<'a> Vm<'a, StdPrint> {
    #[must_use]
    pub fn new(code: &'a [u8]) -> Self {
        Self::with_sink(code, StdPrint)
    }
}

impl<'a, P: PrintSink> Vm<'a, P> {
    #[must_use]
    pub fn with_sink(code: &'a [u8], sink: P) -> Self {
        Self {
            code,
            stack: vec![0u8; STACK_SIZE],
            ip: 0,
            sp: 0,
            bp: 0,
            sink,
        }
    }

    /// Recovers the print sink, e.g. to read back what a [`CollectPrint`](io::CollectPrint)
    /// accumulated after [`run`](Self::run) returns.
    pub fn into_sink(self) -> P {
        self.sink
    }

    /// Runs until `Exit` or a halting error. `Ok(())` is a clean `Exit`; `Err` carries a
    /// human-readable description of whatever went wrong.
    pub fn run(&mut self) -> Result<(), String> {
        loop {
            if !self.step()? {
                return Ok(());
            }
        }
    }

    /// Executes one instruction. Returns `Ok(true)` to keep running, `Ok(false)` on `Exit`.
    fn step(&mut self) -> Result<bool, String> {
        let byte = self.fetch_u8()?;
        let Some(op) = Opcode::from_byte(byte) else {
            return Err(format!("invalid opcode byte {byte}"));
        };
        match op {
            Opcode::Invalid => return Err("executed an Invalid opcode".to_string()),
            Opcode::Exit => return Ok(false),
            Opcode::Push => {
                let size = self.fetch_size()?;
                let mut bytes = vec![0u8; size];
                for byte in &mut bytes {
                    *byte = self.fetch_u8()?;
                }
                self.push_bytes(&bytes)?;
            }
            Opcode::Pop => {
                let size = self.fetch_size()?;
                self.pop_bytes(size)?;
            }
            Opcode::AllocStack => {
                let size = self.fetch_size()?;
                let end = self.sp.checked_add(size).filter(|&e| e <= self.stack.len());
                let Some(end) = end else {
                    return Err("stack pointer out of range".to_string());
                };
                self.stack[self.sp..end].fill(0);
                self.sp = end;
            }
            Opcode::Dup => {
                let size = self.fetch_size()?;
                let bytes = self.read_range(self.sp.checked_sub(size).ok_or("stack pointer out of range")?, size)?;
                self.push_bytes(&bytes)?;
            }
            Opcode::AddI64 => self.binary_i64(i64::wrapping_add)?,
            Opcode::SubI64 => self.binary_i64(i64::wrapping_sub)?,
            Opcode::MulI64 => self.binary_i64(i64::wrapping_mul)?,
            Opcode::DivI64 => self.binary_i64_checked(i64::checked_div)?,
            Opcode::ModI64 => self.binary_i64_checked(i64::checked_rem)?,
            Opcode::AddU64 => self.binary_u64(u64::wrapping_add)?,
            Opcode::SubU64 => self.binary_u64(u64::wrapping_sub)?,
            Opcode::MulU64 => self.binary_u64(u64::wrapping_mul)?,
            Opcode::DivU64 => self.binary_u64_checked(u64::checked_div)?,
            Opcode::ModU64 => self.binary_u64_checked(u64::checked_rem)?,
            Opcode::LessI64 => self.compare_i64(|a, b| a < b)?,
            Opcode::LessU64 => self.compare_u64(|a, b| a < b)?,
            Opcode::GreaterI64 => self.compare_i64(|a, b| a > b)?,
            Opcode::GreaterU64 => self.compare_u64(|a, b| a > b)?,
            Opcode::LessEqualI64 => self.compare_i64(|a, b| a <= b)?,
            Opcode::LessEqualU64 => self.compare_u64(|a, b| a <= b)?,
            Opcode::GreaterEqualI64 => self.compare_i64(|a, b| a >= b)?,
            Opcode::GreaterEqualU64 => self.compare_u64(|a, b| a >= b)?,
            Opcode::NegateI64 => {
                let value = self.pop_i64()?;
                self.push_i64(value.wrapping_neg())?;
            }
            Opcode::NegateU64 => {
                let value = self.pop_u64()?;
                self.push_u64(value.wrapping_neg())?;
            }
            Opcode::NegateBool => {
                let value = self.pop_bytes(1)?[0];
                self.push_bytes(&[u8::from(value == 0)])?;
            }
            Opcode::PrintI64 => {
                let value = self.pop_i64()?;
                self.sink.print_line(&value.to_string());
            }
            Opcode::PrintU64 => {
                let value = self.pop_u64()?;
                self.sink.print_line(&value.to_string());
            }
            Opcode::PrintBool => {
                let value = self.pop_bytes(1)?[0] != 0;
                self.sink.print_line(&value.to_string());
            }
            // The bit pattern doesn't change between `int` and `uint`; only the compile-time
            // type tag does.
            Opcode::I64ToU64 | Opcode::U64ToI64 => {}
            Opcode::Equal => {
                let size = self.fetch_size()?;
                let b = self.pop_bytes(size)?;
                let a = self.pop_bytes(size)?;
                self.push_bytes(&[u8::from(a == b)])?;
            }
            Opcode::Jump => {
                let location = self.fetch_size()?;
                self.ip = location;
            }
            Opcode::JumpZero | Opcode::JumpNonZero => {
                let location = self.fetch_size()?;
                let size = self.fetch_size()?;
                let bytes = self.pop_bytes(size)?;
                let all_zero = bytes.iter().all(|&b| b == 0);
                let take = if op == Opcode::JumpZero { all_zero } else { !all_zero };
                if take {
                    self.ip = location;
                }
            }
            Opcode::Call => self.call()?,
            Opcode::Return => self.do_return()?,
            Opcode::LoadRelative => {
                let (offset, size) = (self.fetch_size()?, self.fetch_size()?);
                let addr = self.bp.checked_add(offset).ok_or("base pointer out of range")?;
                let bytes = self.read_range(addr, size)?;
                self.push_bytes(&bytes)?;
            }
            Opcode::StoreRelative => {
                let (offset, size) = (self.fetch_size()?, self.fetch_size()?);
                let addr = self.bp.checked_add(offset).ok_or("base pointer out of range")?;
                let bytes = self.pop_bytes(size)?;
                self.write_range(addr, &bytes)?;
            }
            Opcode::LoadAbsolute => {
                let (offset, size) = (self.fetch_size()?, self.fetch_size()?);
                let bytes = self.read_range(offset, size)?;
                self.push_bytes(&bytes)?;
            }
            Opcode::StoreAbsolute => {
                let (offset, size) = (self.fetch_size()?, self.fetch_size()?);
                let bytes = self.pop_bytes(size)?;
                self.write_range(offset, &bytes)?;
            }
        }
        Ok(true)
    }

    fn call(&mut self) -> Result<(), String> {
        let arg_size = self.fetch_size()?;
        let args = self.pop_bytes(arg_size)?;
        let callee_bytes = self.pop_bytes(8)?;
        let callee = u64::from_le_bytes(callee_bytes.try_into().expect("popped exactly 8 bytes"));

        let saved_ip = u64::try_from(self.ip).expect("code offset fits u64");
        let saved_bp = u64::try_from(self.bp).expect("stack offset fits u64");
        self.push_bytes(&saved_ip.to_le_bytes())?;
        self.push_bytes(&saved_bp.to_le_bytes())?;
        self.bp = self.sp;
        self.ip = usize::try_from(callee).map_err(|_| "call target out of range".to_string())?;
        self.push_bytes(&args)?;
        Ok(())
    }

    fn do_return(&mut self) -> Result<(), String> {
        let return_size = self.fetch_size()?;
        if self.bp < 16 || self.bp > self.sp {
            return Err("base pointer out of range".to_string());
        }
        let return_start = self.sp.checked_sub(return_size).ok_or("stack pointer out of range")?;
        let return_bytes = self.read_range(return_start, return_size)?;
        let saved_bp = self.read_range(self.bp - 8, 8)?;
        let saved_ip = self.read_range(self.bp - 16, 8)?;

        self.sp = self.bp - 16;
        self.bp = usize::try_from(u64::from_le_bytes(saved_bp.try_into().expect("8 bytes"))).expect("fits usize");
        self.ip = usize::try_from(u64::from_le_bytes(saved_ip.try_into().expect("8 bytes"))).expect("fits usize");
        self.push_bytes(&return_bytes)
    }

    // -- cursor-checked primitives ----------------------------------------------------------

    fn fetch_u8(&mut self) -> Result<u8, String> {
        let byte = *self.code.get(self.ip).ok_or("instruction pointer out of range")?;
        self.ip += 1;
        Ok(byte)
    }

    /// Every size, offset, location, and arg/return-size immediate is an 8-byte little-endian
    /// unsigned integer.
    fn fetch_size(&mut self) -> Result<usize, String> {
        let end = self.ip.checked_add(8).filter(|&e| e <= self.code.len());
        let end = end.ok_or("instruction pointer out of range")?;
        let bytes: [u8; 8] = self.code[self.ip..end].try_into().expect("exactly 8 bytes");
        self.ip = end;
        usize::try_from(u64::from_le_bytes(bytes)).map_err(|_| "immediate out of range".to_string())
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), String> {
        let end = self.sp.checked_add(bytes.len()).filter(|&e| e <= self.stack.len());
        let end = end.ok_or("stack pointer out of range")?;
        self.stack[self.sp..end].copy_from_slice(bytes);
        self.sp = end;
        Ok(())
    }

    fn pop_bytes(&mut self, size: usize) -> Result<Vec<u8>, String> {
        let start = self.sp.checked_sub(size).ok_or("stack pointer out of range")?;
        let bytes = self.stack[start..self.sp].to_vec();
        self.sp = start;
        Ok(bytes)
    }

    fn read_range(&self, addr: usize, size: usize) -> Result<Vec<u8>, String> {
        let end = addr.checked_add(size).filter(|&e| e <= self.stack.len());
        let end = end.ok_or("address out of range")?;
        Ok(self.stack[addr..end].to_vec())
    }

    fn write_range(&mut self, addr: usize, bytes: &[u8]) -> Result<(), String> {
        let end = addr.checked_add(bytes.len()).filter(|&e| e <= self.stack.len());
        let end = end.ok_or("address out of range")?;
        self.stack[addr..end].copy_from_slice(bytes);
        Ok(())
    }

    fn pop_i64(&mut self) -> Result<i64, String> {
        let bytes = self.pop_bytes(8)?;
        Ok(i64::from_le_bytes(bytes.try_into().expect("8 bytes")))
    }

    fn pop_u64(&mut self) -> Result<u64, String> {
        let bytes = self.pop_bytes(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("8 bytes")))
    }

    fn push_i64(&mut self, value: i64) -> Result<(), String> {
        self.push_bytes(&value.to_le_bytes())
    }

    fn push_u64(&mut self, value: u64) -> Result<(), String> {
        self.push_bytes(&value.to_le_bytes())
    }

    fn binary_i64(&mut self, f: impl Fn(i64, i64) -> i64) -> Result<(), String> {
        let b = self.pop_i64()?;
        let a = self.pop_i64()?;
        self.push_i64(f(a, b))
    }

    fn binary_u64(&mut self, f: impl Fn(u64, u64) -> u64) -> Result<(), String> {
        let b = self.pop_u64()?;
        let a = self.pop_u64()?;
        self.push_u64(f(a, b))
    }

    fn binary_i64_checked(&mut self, f: impl Fn(i64, i64) -> Option<i64>) -> Result<(), String> {
        let b = self.pop_i64()?;
        let a = self.pop_i64()?;
        let result = f(a, b).ok_or("division by zero")?;
        self.push_i64(result)
    }

    fn binary_u64_checked(&mut self, f: impl Fn(u64, u64) -> Option<u64>) -> Result<(), String> {
        let b = self.pop_u64()?;
        let a = self.pop_u64()?;
        let result = f(a, b).ok_or("division by zero")?;
        self.push_u64(result)
    }

    fn compare_i64(&mut self, f: impl Fn(i64, i64) -> bool) -> Result<(), String> {
        let b = self.pop_i64()?;
        let a = self.pop_i64()?;
        self.push_bytes(&[u8::from(f(a, b))])
    }

    fn compare_u64(&mut self, f: impl Fn(u64, u64) -> bool) -> Result<(), String> {
        let b = self.pop_u64()?;
        let a = self.pop_u64()?;
        self.push_bytes(&[u8::from(f(a, b))])
    }
}

#[cfg(test)]
mod tests {
    use super::Vm;
    use crate::bytecode::op::Opcode;

    fn push_u64(code: &mut Vec<u8>, value: u64) {
        code.push(Opcode::Push as u8);
        code.extend_from_slice(&8u64.to_le_bytes());
        code.extend_from_slice(&value.to_le_bytes());
    }

    #[test]
    fn arithmetic_and_exit_halt_cleanly() {
        let mut code = Vec::new();
        push_u64(&mut code, 2);
        push_u64(&mut code, 3);
        code.push(Opcode::AddI64 as u8);
        code.push(Opcode::Pop as u8);
        code.extend_from_slice(&8u64.to_le_bytes());
        code.push(Opcode::Exit as u8);

        assert!(Vm::new(&code).run().is_ok());
    }

    #[test]
    fn invalid_opcode_halts_with_an_error() {
        let code = vec![Opcode::Invalid as u8];
        assert!(Vm::new(&code).run().is_err());
    }

    #[test]
    fn running_off_the_end_of_code_is_an_error() {
        let code: Vec<u8> = Vec::new();
        assert!(Vm::new(&code).run().is_err());
    }
}
