//! pcc command-line interface
//!
//! `pcc <source.p> <out.j>` compiles a P source file to an assembly listing.
//! `pcc <source.p>` compiles and runs the program on the built-in VM.
//! `pcc` starts an interactive REPL.

use pcc::vm::Interpreter;
use pcc::{Assembly, CompileError};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io;
use std::path::Path;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    match args.len() {
        3 => compile_file(&args[1], &args[2]),
        2 => run_file(&args[1]),
        1 => run_repl(),
        _ => {
            eprintln!("usage: pcc <source.p> [output.j]");
            std::process::exit(2);
        }
    }
}

/// Print a compile error, prefixed with `<filename[line:column]>` when the
/// error carries a source position
fn report(path: &str, error: &CompileError) {
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());

    match error.position() {
        Some((line, column)) => eprintln!("<{}[{}:{}]> {}", name, line, column, error),
        None => eprintln!("{}", error),
    }
}

/// Read and compile a source file, exiting on any failure
fn compile_or_exit(path: &str) -> Assembly {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error reading {}: {}", path, e);
            std::process::exit(1);
        }
    };

    match pcc::compile(&source) {
        Ok(assembly) => assembly,
        Err(e) => {
            report(path, &e);
            std::process::exit(1);
        }
    }
}

fn compile_file(source_path: &str, out_path: &str) {
    let assembly = compile_or_exit(source_path);

    // The listing is fully built before anything is written, so a failed
    // compilation never leaves a partial output file behind
    if let Err(e) = std::fs::write(out_path, assembly.to_string()) {
        eprintln!("error writing {}: {}", out_path, e);
        std::process::exit(1);
    }
}

fn run_file(source_path: &str) {
    let assembly = compile_or_exit(source_path);

    let stdin = io::stdin();
    let mut vm = Interpreter::with_fuel(stdin.lock(), io::stdout(), usize::MAX);
    if let Err(e) = vm.run(&assembly) {
        eprintln!("runtime error: {}", e);
        std::process::exit(1);
    }
}

fn run_repl() {
    println!("pcc - P language REPL");
    println!("Each line is compiled and run as one program. Ctrl+D to exit.\n");

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("error initializing line editor: {}", e);
            std::process::exit(1);
        }
    };

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);

                match pcc::compile(line) {
                    Ok(assembly) => {
                        let stdin = io::stdin();
                        let mut vm = Interpreter::new(stdin.lock(), io::stdout());
                        if let Err(e) = vm.run(&assembly) {
                            eprintln!("runtime error: {}", e);
                        }
                    }
                    Err(e) => report("repl", &e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                eprintln!("error reading input: {}", e);
                break;
            }
        }
    }
}
