//! End-to-end scenarios: source text in, process outcome and stdout out.

use ion::bytecode::vm::io::CollectPrint;
use ion::{compile_and_run_with_sink, Outcome};

/// Runs `source` to completion and returns its collected stdout. Panics with the
/// diagnostics or runtime error message otherwise, since every caller here expects success.
fn run_and_collect(source: &str) -> String {
    let (outcome, sink) = compile_and_run_with_sink(source, CollectPrint::new());
    match outcome {
        Outcome::Ran(Ok(())) => sink.output().to_owned(),
        Outcome::Ran(Err(message)) => panic!("program halted with an error: {message}"),
        Outcome::CompileError(diagnostics) => {
            let rendered: Vec<_> = diagnostics.iter().map(ToString::to_string).collect();
            panic!("compilation failed:\n{}", rendered.join("\n"));
        }
    }
}

#[test]
fn hello_integer() {
    assert_eq!(run_and_collect("main :: () -> void { print 42; };"), "42\n");
}

#[test]
fn arithmetic_precedence() {
    assert_eq!(run_and_collect("main :: () -> void { print 2 + 3 * 4; };"), "14\n");
}

#[test]
fn recursive_factorial() {
    let source = r"
fact :: (n: int) -> int {
  if n == 0 do return 1;
  return n * fact(n - 1);
};
main :: () -> void { print fact(6); };
";
    assert_eq!(run_and_collect(source), "720\n");
}

#[test]
fn while_loop_with_break() {
    let source = r"
main :: () -> void {
  i := 0;
  while true { if i == 5 do break; i = i + 1; };
  print i;
};
";
    assert_eq!(run_and_collect(source), "5\n");
}

#[test]
fn cast_signed_to_unsigned() {
    let source = r"
main :: () -> void {
  x : int = -1;
  y : uint = cast(uint) x;
  print y;
};
";
    assert_eq!(run_and_collect(source), "18446744073709551615\n");
}

#[test]
fn mutual_recursion_through_constants() {
    let source = r"
isEven :: (n: int) -> bool { if n == 0 do return true; return isOdd(n - 1); };
isOdd  :: (n: int) -> bool { if n == 0 do return false; return isEven(n - 1); };
main :: () -> void { print isEven(10); };
";
    assert_eq!(run_and_collect(source), "true\n");
}

#[test]
fn while_loop_with_continue() {
    let source = r"
main :: () -> void {
  i := 0;
  sum := 0;
  while i < 10 {
    i = i + 1;
    if i % 2 == 0 do continue;
    sum = sum + i;
  };
  print sum;
};
";
    assert_eq!(run_and_collect(source), "25\n");
}

#[test]
fn compound_assignment() {
    let source = r"
main :: () -> void {
  x := 10;
  x += 5;
  x *= 2;
  print x;
};
";
    assert_eq!(run_and_collect(source), "30\n");
}

#[test]
fn empty_program_is_a_compile_error_about_main() {
    let (outcome, _) = compile_and_run_with_sink("", CollectPrint::new());
    match outcome {
        Outcome::CompileError(diagnostics) => {
            assert!(!diagnostics.is_empty());
            assert!(diagnostics.iter().any(|d| d.message.to_lowercase().contains("main")));
        }
        Outcome::Ran(_) => panic!("a program with no main must not run"),
    }
}

#[test]
fn duplicate_main_is_a_compile_error() {
    let source = r"
main :: () -> void { print 1; };
main :: () -> void { print 2; };
";
    let (outcome, _) = compile_and_run_with_sink(source, CollectPrint::new());
    match outcome {
        Outcome::CompileError(diagnostics) => {
            assert!(diagnostics.iter().any(|d| d.message.to_lowercase().contains("main")));
        }
        Outcome::Ran(_) => panic!("duplicate main must not run"),
    }
}

#[test]
fn while_false_body_is_unreachable_but_valid() {
    let source = r"
main :: () -> void {
  while false { break; continue; };
  print 1;
};
";
    assert_eq!(run_and_collect(source), "1\n");
}

#[test]
fn missing_return_on_non_void_path_is_rejected() {
    let source = r"
bad :: (n: int) -> int {
  if n == 0 do return 1;
};
main :: () -> void { print bad(0); };
";
    let (outcome, _) = compile_and_run_with_sink(source, CollectPrint::new());
    assert!(
        matches!(outcome, Outcome::CompileError(_)),
        "a non-void procedure missing a return on every path must not compile"
    );
}

#[test]
fn recursive_constant_dependency_is_rejected() {
    let source = "a :: b; b :: a; main :: () -> void { print a; };";
    let (outcome, _) = compile_and_run_with_sink(source, CollectPrint::new());
    assert!(
        matches!(outcome, Outcome::CompileError(_)),
        "a recursive constant dependency must not compile"
    );
}

#[test]
fn name_shadowing_resolves_to_the_inner_declaration() {
    let source = r"
main :: () -> void {
  x := 1;
  {
    x := 2;
    print x;
  };
  print x;
};
";
    assert_eq!(run_and_collect(source), "2\n1\n");
}

#[test]
fn division_by_zero_halts_with_a_runtime_error() {
    let source = r"
main :: () -> void {
  x := 1;
  y := 0;
  print x / y;
};
";
    let (outcome, _) = compile_and_run_with_sink(source, CollectPrint::new());
    assert!(
        matches!(outcome, Outcome::Ran(Err(_))),
        "division by zero must halt the VM with an error, not crash the host process"
    );
}
