//! Source-anchored diagnostics shared by every compiler phase.
//!
//! Every phase (lexer, parser, resolver) accumulates [`Diagnostic`] values into a
//! [`DiagnosticBag`] rather than failing fast, so a single invocation can report as many
//! problems as it can discover. Each phase exposes a `had_error()` flag on its bag and the
//! driver only advances to the next phase when the previous one's bag is clear.

use std::fmt;

/// A single position within a source file (0-indexed line and column, for easy `+1` display).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CodeLoc {
    pub line: u32,
    pub column: u32,
}

impl CodeLoc {
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A half-open span of source text, anchored to the file it came from.
///
/// `start` and `end` may be equal (an insertion point) or span multiple lines; diagnostic
/// rendering only shows a single-line excerpt and falls back to just the start position
/// when the range crosses lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeRange {
    pub start: CodeLoc,
    pub end: CodeLoc,
}

impl CodeRange {
    #[must_use]
    pub const fn new(start: CodeLoc, end: CodeLoc) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn point(loc: CodeLoc) -> Self {
        Self { start: loc, end: loc }
    }

    /// Returns a new range with the same start but an updated end.
    #[must_use]
    pub const fn with_end(self, end: CodeLoc) -> Self {
        Self { start: self.start, end }
    }
}

/// Severity of a diagnostic. Only `Error` currently affects `had_error`, but the distinction
/// is kept so warnings can be added without threading a new bag through every phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
}

/// A single formatted, source-anchored diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub range: CodeRange,
}

impl Diagnostic {
    #[must_use]
    pub fn error(message: impl Into<String>, range: CodeRange) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            range,
        }
    }

    /// Renders `<path>:<line>:<col>: <message>` followed by a source excerpt with a caret
    /// underline, matching the external diagnostics format.
    #[must_use]
    pub fn render(&self, path: &str, source: &str) -> String {
        let mut out = format!(
            "{path}:{}:{}: {}\n",
            self.range.start.line + 1,
            self.range.start.column + 1,
            self.message
        );
        if let Some(line_text) = source.lines().nth(self.range.start.line as usize) {
            out.push_str(line_text);
            out.push('\n');
            let caret_width = if self.range.start.line == self.range.end.line && self.range.end.column > self.range.start.column
            {
                (self.range.end.column - self.range.start.column) as usize
            } else {
                1
            };
            out.push_str(&" ".repeat(self.range.start.column as usize));
            out.push_str(&"^".repeat(caret_width.max(1)));
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.range.start.line + 1, self.range.start.column + 1, self.message)
    }
}

/// Accumulates diagnostics for one compiler phase and tracks the sticky `hadError` flag.
///
/// A phase keeps running after the first error so callers see every problem in one pass;
/// only fatal conditions (e.g. a recursive constant dependency) short-circuit early by
/// returning an error directly instead of pushing to the bag.
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn error(&mut self, message: impl Into<String>, range: CodeRange) {
        self.push(Diagnostic::error(message, range));
    }

    #[must_use]
    pub fn had_error(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}
