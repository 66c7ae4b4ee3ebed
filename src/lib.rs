//! pcc - a compiler for the P imperative language
//!
//! P is a small single-typed language (32-bit integers only) with prefix
//! arithmetic, short-circuit boolean conditions, assignment, conditionals,
//! loops, and print/read. The compiler pipeline is lex → parse → generate →
//! serialize: a hand-rolled lexer feeds a recursive-descent parser one token
//! at a time, the resulting syntax tree is walked exactly once by the code
//! generator, and the finished instruction stream serializes to a textual
//! assembly listing for a stack-based virtual machine.
//!
//! Boolean conditions compile to "jumping" code: each boolean expression
//! receives a true label and a false label and transfers control to exactly
//! one of them, so no truth value is ever materialized on the stack.
//!
//! The crate also ships an interpreter for the generated instruction stream,
//! which backs the CLI's run mode and REPL.
//!
//! # Example
//! ```
//! use pcc::vm::Interpreter;
//!
//! let assembly = pcc::compile("assign 2 to x; print(*(x, 21))").unwrap();
//!
//! let mut output = Vec::new();
//! let mut vm = Interpreter::new(std::io::empty(), &mut output);
//! vm.run(&assembly).unwrap();
//! assert_eq!(output, b"42\n");
//! ```

// Code generation backend
pub mod codegen;

// Compiler driver
pub mod compiler;

// Lexer and parser
pub mod parser;

// Instruction stream interpreter
pub mod vm;

// Re-export main types
pub use codegen::{Assembly, CodeGenerator};
pub use compiler::{CompileError, Compiler, compile};
pub use parser::{Lexer, Parser, Token};
