use std::{cell::RefCell, rc::Rc};

use clap::Parser;
use justerror::Error;

use nano::interpreter::Interpreter;

/// Tree-walking interpreter for the NANO scripting language.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the NANO source file to execute.
    file: String,
}

#[Error]
enum RunError {
    Io(std::io::Error),
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(&cli.file) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

/// Scan, parse, and execute the source. Lex and parse diagnostics go to
/// stderr in order, then whatever could be parsed runs anyway; diagnostics
/// never make the run fatal.
fn run(path: &str) -> Result<(), RunError> {
    let source = std::fs::read_to_string(path).map_err(RunError::Io)?;

    let (tokens, lex_diagnostics) = nano::lexer::scan(&source);
    for diagnostic in &lex_diagnostics {
        eprintln!("{diagnostic}");
    }

    let (program, parse_diagnostics) = nano::parser::program(&tokens);
    for diagnostic in &parse_diagnostics {
        eprintln!("{diagnostic}");
    }

    let mut interpreter = Interpreter::new(
        Rc::new(RefCell::new(std::io::stdout())),
        Rc::new(RefCell::new(std::io::stderr())),
    );
    interpreter.interpret(&program);

    Ok(())
}
