//! Instruction stream interpreter
//!
//! Executes a generated [`Assembly`] directly, without going through the
//! textual listing: label markers are resolved to stream indices up front,
//! then a fetch/dispatch loop drives a program counter over the entities.
//!
//! The external routines of the target machine are mapped onto the
//! interpreter's input and output: `invoke-read` parses the next
//! whitespace-delimited integer from the reader, `invoke-print` writes one
//! line per value to the writer.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io::{BufRead, Write};

use crate::codegen::{Assembly, Entity, Label, Opcode, Operand};
use crate::vm::stack::Stack;

/// Interpreter error
#[derive(Debug)]
pub enum InterpreterError {
    /// Stack underflow
    StackUnderflow,
    /// Division by zero
    DivisionByZero,
    /// Load from a slot no store has written yet
    UninitializedSlot(usize),
    /// Read input was not an integer
    InvalidReadInput(String),
    /// Read past the end of input
    EndOfInput,
    /// Execution exceeded the step limit
    StepLimitExceeded,
    /// I/O failure on the input or output channel
    Io(std::io::Error),
    /// Malformed instruction stream (a generator bug, not user input)
    InternalError(String),
}

impl fmt::Display for InterpreterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackUnderflow => write!(f, "stack underflow"),
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::UninitializedSlot(slot) => write!(f, "load from uninitialized slot {}", slot),
            Self::InvalidReadInput(token) => write!(f, "read a non-integer input: '{}'", token),
            Self::EndOfInput => write!(f, "read past the end of input"),
            Self::StepLimitExceeded => write!(f, "execution exceeded the step limit"),
            Self::Io(e) => write!(f, "i/o error: {}", e),
            Self::InternalError(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for InterpreterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for interpreter operations
pub type InterpreterResult<T> = Result<T, InterpreterError>;

/// Stack-machine interpreter over a generated entity stream
pub struct Interpreter<R, W> {
    /// Operand stack
    stack: Stack,
    /// Local-variable slots; `None` until first stored to
    locals: Vec<Option<i32>>,
    /// Source of `invoke-read` values
    input: R,
    /// Sink of `invoke-print` lines
    output: W,
    /// Input tokens split off the current line, not yet consumed
    pending_input: VecDeque<String>,
    /// Remaining execution steps before bailing out
    fuel: usize,
}

impl<R: BufRead, W: Write> Interpreter<R, W> {
    /// Default operand stack capacity
    const DEFAULT_STACK_SIZE: usize = 64;
    /// Default step limit
    const DEFAULT_STEP_LIMIT: usize = 1_000_000;

    /// Create an interpreter with the default step limit
    pub fn new(input: R, output: W) -> Self {
        Self::with_fuel(input, output, Self::DEFAULT_STEP_LIMIT)
    }

    /// Create an interpreter with a custom step limit
    pub fn with_fuel(input: R, output: W, fuel: usize) -> Self {
        Interpreter {
            stack: Stack::new(Self::DEFAULT_STACK_SIZE),
            locals: Vec::new(),
            input,
            output,
            pending_input: VecDeque::new(),
            fuel,
        }
    }

    /// Value currently held by a slot, if any store has written it
    pub fn local(&self, slot: usize) -> Option<i32> {
        self.locals.get(slot).copied().flatten()
    }

    /// Execute the assembly from its first entity to the end of the stream
    pub fn run(&mut self, assembly: &Assembly) -> InterpreterResult<()> {
        let entities = assembly.entities();

        // Resolve every label marker to its stream index
        let mut targets: HashMap<Label, usize> = HashMap::new();
        for (index, entity) in entities.iter().enumerate() {
            if let Entity::Label(label) = entity {
                targets.insert(*label, index);
            }
        }
        let target = |label: Label| -> InterpreterResult<usize> {
            targets.get(&label).copied().ok_or_else(|| {
                InterpreterError::InternalError(format!("jump to unplaced label {}", label))
            })
        };

        let mut pc = 0;
        while pc < entities.len() {
            if self.fuel == 0 {
                return Err(InterpreterError::StepLimitExceeded);
            }
            self.fuel -= 1;

            let Entity::Instruction(instruction) = &entities[pc] else {
                pc += 1;
                continue;
            };
            pc += 1;

            match (instruction.opcode(), instruction.operand()) {
                (Opcode::LoadConst, Some(Operand::Constant(value))) => {
                    self.stack.push(value);
                }
                (Opcode::InvokeRead, None) => {
                    let value = self.read_int()?;
                    self.stack.push(value);
                }
                (Opcode::InvokePrint, None) => {
                    let value = self.pop()?;
                    writeln!(self.output, "{}", value).map_err(InterpreterError::Io)?;
                }
                (Opcode::Add, None) => self.binary_op(|a, b| a.wrapping_add(b))?,
                (Opcode::Mul, None) => self.binary_op(|a, b| a.wrapping_mul(b))?,
                (Opcode::Sub, None) => self.binary_op(|a, b| a.wrapping_sub(b))?,
                (Opcode::Div, None) => {
                    let (lhs, rhs) = self.pop2()?;
                    if rhs == 0 {
                        return Err(InterpreterError::DivisionByZero);
                    }
                    self.stack.push(lhs.wrapping_div(rhs));
                }
                (Opcode::Neg, None) => {
                    let value = self.pop()?;
                    self.stack.push(value.wrapping_neg());
                }
                (Opcode::Or, None) => self.binary_op(|a, b| a | b)?,
                (Opcode::And, None) => self.binary_op(|a, b| a & b)?,
                (Opcode::StoreSlot, Some(Operand::Slot(slot))) => {
                    let value = self.pop()?;
                    if self.locals.len() <= slot {
                        self.locals.resize(slot + 1, None);
                    }
                    self.locals[slot] = Some(value);
                }
                (Opcode::LoadSlot, Some(Operand::Slot(slot))) => {
                    let value = self
                        .local(slot)
                        .ok_or(InterpreterError::UninitializedSlot(slot))?;
                    self.stack.push(value);
                }
                (Opcode::IfEq, Some(Operand::Label(label))) => {
                    let (lhs, rhs) = self.pop2()?;
                    if lhs == rhs {
                        pc = target(label)?;
                    }
                }
                (Opcode::IfNe, Some(Operand::Label(label))) => {
                    let (lhs, rhs) = self.pop2()?;
                    if lhs != rhs {
                        pc = target(label)?;
                    }
                }
                (Opcode::IfLt, Some(Operand::Label(label))) => {
                    let (lhs, rhs) = self.pop2()?;
                    if lhs < rhs {
                        pc = target(label)?;
                    }
                }
                (Opcode::IfLe, Some(Operand::Label(label))) => {
                    let (lhs, rhs) = self.pop2()?;
                    if lhs <= rhs {
                        pc = target(label)?;
                    }
                }
                (Opcode::IfGt, Some(Operand::Label(label))) => {
                    let (lhs, rhs) = self.pop2()?;
                    if lhs > rhs {
                        pc = target(label)?;
                    }
                }
                (Opcode::IfGe, Some(Operand::Label(label))) => {
                    let (lhs, rhs) = self.pop2()?;
                    if lhs >= rhs {
                        pc = target(label)?;
                    }
                }
                (Opcode::IfNonZero, Some(Operand::Label(label))) => {
                    let value = self.pop()?;
                    if value != 0 {
                        pc = target(label)?;
                    }
                }
                (Opcode::Goto, Some(Operand::Label(label))) => {
                    pc = target(label)?;
                }
                (opcode, operand) => {
                    return Err(InterpreterError::InternalError(format!(
                        "instruction {:?} has an invalid operand: {:?}",
                        opcode, operand
                    )));
                }
            }
        }

        Ok(())
    }

    fn pop(&mut self) -> InterpreterResult<i32> {
        self.stack.pop().ok_or(InterpreterError::StackUnderflow)
    }

    /// Pop the right operand, then the left (the left was pushed first)
    fn pop2(&mut self) -> InterpreterResult<(i32, i32)> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        Ok((lhs, rhs))
    }

    fn binary_op(&mut self, op: impl Fn(i32, i32) -> i32) -> InterpreterResult<()> {
        let (lhs, rhs) = self.pop2()?;
        self.stack.push(op(lhs, rhs));
        Ok(())
    }

    /// Parse the next whitespace-delimited integer from the input
    fn read_int(&mut self) -> InterpreterResult<i32> {
        loop {
            if let Some(token) = self.pending_input.pop_front() {
                return token
                    .parse()
                    .map_err(|_| InterpreterError::InvalidReadInput(token));
            }

            let mut line = String::new();
            let read = self
                .input
                .read_line(&mut line)
                .map_err(InterpreterError::Io)?;
            if read == 0 {
                return Err(InterpreterError::EndOfInput);
            }
            self.pending_input
                .extend(line.split_whitespace().map(str::to_string));
        }
    }
}
