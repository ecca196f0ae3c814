//! Library entry point: lexer, parser, resolver, bytecode compiler, and VM wired into one
//! source-to-exit-status pipeline.
//!
//! Each phase only runs once the previous one's diagnostic bag is clear — a lex error is
//! never followed by a parse attempt over broken tokens, and resolution never runs over a
//! program the parser already gave up on.

pub mod ast;
pub mod bytecode;
pub mod context;
pub mod diagnostics;
pub mod intern;
mod lexer;
mod parser;
mod resolver;
pub mod tables;
pub mod token;
pub mod types;

use bytecode::vm::io::{PrintSink, StdPrint};
use bytecode::vm::Vm;
use context::Context;
use diagnostics::Diagnostic;
use lexer::Lexer;
use parser::Parser;

/// What happened when [`compile_and_run`] or [`compile_and_run_with_sink`] tried to run a
/// source file.
pub enum Outcome {
    /// Lexing, parsing, or resolution reported at least one diagnostic.
    CompileError(Vec<Diagnostic>),
    /// Compilation succeeded and the VM ran to completion or halted with an error.
    Ran(Result<(), String>),
}

/// Runs the full pipeline over `source`, printing to stdout.
#[must_use]
pub fn compile_and_run(source: &str) -> Outcome {
    compile_and_run_with_sink(source, StdPrint).0
}

/// Runs the full pipeline over `source` with a caller-supplied [`PrintSink`], returning it
/// back alongside the outcome — the hook tests use to assert on exact program output
/// without touching the real stdout.
#[must_use]
pub fn compile_and_run_with_sink<P: PrintSink>(source: &str, sink: P) -> (Outcome, P) {
    let mut ctx = Context::new();

    let (tokens, lex_diagnostics) = Lexer::new(source, &mut ctx.interner).tokenize();
    if lex_diagnostics.had_error() {
        return (Outcome::CompileError(lex_diagnostics.into_diagnostics()), sink);
    }

    let (mut ast, global, parse_diagnostics) = Parser::new(tokens, &mut ctx.interner).parse_program();
    if parse_diagnostics.had_error() {
        return (Outcome::CompileError(parse_diagnostics.into_diagnostics()), sink);
    }

    let (resolved, resolve_diagnostics) = resolver::resolve(&mut ast, global, &mut ctx);
    if !resolved || resolve_diagnostics.had_error() {
        return (Outcome::CompileError(resolve_diagnostics.into_diagnostics()), sink);
    }

    let code = bytecode::compile(&mut ast, global, &ctx);
    let mut vm = Vm::with_sink(&code, sink);
    let result = vm.run();
    (Outcome::Ran(result), vm.into_sink())
}
