use std::io::Write as _;
use std::{env, fs, io, process::ExitCode};

use ion::Outcome;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let Some(path) = args.get(1) else {
        eprintln!("usage: {} <path>", args.first().map_or("ion", String::as_str));
        return ExitCode::FAILURE;
    };

    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error reading {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    match ion::compile_and_run(&source) {
        Outcome::CompileError(diagnostics) => {
            for diagnostic in &diagnostics {
                eprintln!("{}", diagnostic.render(path, &source));
            }
            ExitCode::FAILURE
        }
        Outcome::Ran(Ok(())) => ExitCode::SUCCESS,
        Outcome::Ran(Err(message)) => {
            let _ = io::stdout().flush();
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}
