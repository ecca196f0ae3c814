//! Pluggable output sink for the VM's `Print{I64,U64,Bool}` opcodes.
//!
//! The VM never calls `println!` directly; tests swap in [`CollectPrint`] to assert on
//! exact output without spawning a process or capturing the real stdout.

/// Receives one formatted line per executed `Print*` opcode.
pub trait PrintSink {
    fn print_line(&mut self, line: &str);
}

/// Writes straight to process stdout. What a running `ion` program uses.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintSink for StdPrint {
    fn print_line(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Collects every printed line into a string, newline-terminated. For tests.
#[derive(Debug, Default)]
pub struct CollectPrint(String);

impl CollectPrint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn output(&self) -> &str {
        &self.0
    }
}

impl PrintSink for CollectPrint {
    fn print_line(&mut self, line: &str) {
        self.0.push_str(line);
        self.0.push('\n');
    }
}
