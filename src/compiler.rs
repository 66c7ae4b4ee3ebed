//! P compiler driver
//!
//! Walks the syntax tree exactly once, in tree order, translating each
//! construct into instructions and label placements on the code generator.
//!
//! Control flow is synthesized purely through jumps: every statement emission
//! receives the label of the instruction that must run next (its
//! continuation), and every boolean expression emission receives a true label
//! and a false label and transfers control to exactly one of them without
//! ever pushing a truth value on the stack. Nothing relies on fallthrough
//! except immediately after a freshly placed label.

use std::fmt;

use crate::codegen::{Assembly, CodeGenerator, Label, Opcode, UndefinedVariable};
use crate::parser::ast::{
    BoolExpr, Expr, ExprList, ExprListTail, IdList, IdListTail, IfTail, Program, Stat, StatList,
    StatListTail,
};
use crate::parser::{LexicalError, ParseError, Parser, SyntaxError};

/// Error aborting a compilation
///
/// Each case is detected exactly once and aborts the pipeline immediately;
/// there is no recovery and no multi-error accumulation. `Display` renders
/// the bare message; callers that know the source file name can prepend the
/// position obtained from [`CompileError::position`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    Lexical(LexicalError),
    Syntax(SyntaxError),
    UndefinedVariable(UndefinedVariable),
}

impl CompileError {
    /// Source position of the error, if one is available
    ///
    /// Lexical and syntax errors carry the offending token's start position;
    /// undefined-variable errors are detected during generation, where token
    /// positions are gone.
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            CompileError::Lexical(e) => Some((e.line, e.column)),
            CompileError::Syntax(e) => Some((e.line, e.column)),
            CompileError::UndefinedVariable(_) => None,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Lexical(e) => write!(f, "{}", e),
            CompileError::Syntax(e) => write!(f, "{}", e),
            CompileError::UndefinedVariable(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Lexical(e) => CompileError::Lexical(e),
            ParseError::Syntax(e) => CompileError::Syntax(e),
        }
    }
}

impl From<UndefinedVariable> for CompileError {
    fn from(e: UndefinedVariable) -> Self {
        CompileError::UndefinedVariable(e)
    }
}

/// Compile P source text into an [`Assembly`]
pub fn compile(source: &str) -> Result<Assembly, CompileError> {
    let program = Parser::new(source)?.parse()?;
    Compiler::new().compile(&program)
}

/// Tree-walking emitter for one compilation
pub struct Compiler {
    codegen: CodeGenerator,
}

impl Compiler {
    /// Create a compiler with a fresh generator
    pub fn new() -> Self {
        Compiler {
            codegen: CodeGenerator::new(),
        }
    }

    /// Emit the whole program and seal the stream
    pub fn compile(mut self, program: &Program) -> Result<Assembly, CompileError> {
        let end_label = self.codegen.new_label();
        self.emit_stat_list(&program.body, end_label)?;
        self.codegen.place_label(end_label);
        Ok(self.codegen.finish())
    }

    /// Emit a statement list
    ///
    /// The head statement runs with a fresh continuation placed right before
    /// the tail; once the trailing ε is reached, control jumps to the list's
    /// own continuation.
    fn emit_stat_list(&mut self, list: &StatList, continuation: Label) -> Result<(), CompileError> {
        let next = self.codegen.new_label();
        self.emit_stat(&list.head, next)?;
        self.codegen.place_label(next);
        self.emit_stat_list_tail(&list.tail)?;
        self.codegen.emit_goto(continuation);
        Ok(())
    }

    fn emit_stat_list_tail(&mut self, tail: &StatListTail) -> Result<(), CompileError> {
        match tail {
            StatListTail::More { head, rest } => {
                let next = self.codegen.new_label();
                self.emit_stat(head, next)?;
                self.codegen.place_label(next);
                self.emit_stat_list_tail(rest)
            }
            StatListTail::Empty => Ok(()),
        }
    }

    /// Emit one statement; `continuation` is where control goes when the
    /// statement completes normally
    fn emit_stat(&mut self, stat: &Stat, continuation: Label) -> Result<(), CompileError> {
        match stat {
            Stat::Assign { value, targets } => {
                self.emit_expr(value)?;
                self.emit_assign_targets(targets)?;
                self.codegen.emit_goto(continuation);
            }
            Stat::Print { args } => {
                self.emit_print_args(args)?;
                self.codegen.emit_goto(continuation);
            }
            Stat::Read { targets } => {
                self.emit_read_targets(targets);
                self.codegen.emit_goto(continuation);
            }
            Stat::While { cond, body } => {
                let body_label = self.codegen.new_label();
                let top_label = self.codegen.new_label();
                self.codegen.place_label(top_label);
                self.emit_bool_expr(cond, body_label, continuation)?;
                self.codegen.place_label(body_label);
                // Falling off the body re-tests the condition
                self.emit_stat(body, top_label)?;
            }
            Stat::If {
                cond,
                then_body,
                tail,
            } => {
                let true_label = self.codegen.new_label();
                let false_label = self.codegen.new_label();
                self.emit_bool_expr(cond, true_label, false_label)?;
                self.codegen.place_label(true_label);
                self.emit_stat(then_body, continuation)?;
                self.codegen.place_label(false_label);
                match tail {
                    IfTail::End => self.codegen.emit_goto(continuation),
                    IfTail::Else { body } => self.emit_stat(body, continuation)?,
                }
            }
            Stat::Block { body } => {
                // A block introduces no control-flow label of its own
                self.emit_stat_list(body, continuation)?;
            }
        }
        Ok(())
    }

    /// Emit the stores of an assignment target list
    ///
    /// The computed value is on the stack. It is stored into the first
    /// target; every further target reloads the first target's slot and
    /// stores it, so all listed variables end up holding the same value.
    fn emit_assign_targets(&mut self, targets: &IdList) -> Result<(), CompileError> {
        self.codegen.emit_store(&targets.head);

        let mut tail = &targets.tail;
        while let IdListTail::More { head, rest } = tail {
            self.codegen.emit_load(&targets.head)?;
            self.codegen.emit_store(head);
            tail = rest;
        }
        Ok(())
    }

    /// Emit one external read and store per identifier
    fn emit_read_targets(&mut self, targets: &IdList) {
        self.codegen.emit_read();
        self.codegen.emit_store(&targets.head);

        let mut tail = &targets.tail;
        while let IdListTail::More { head, rest } = tail {
            self.codegen.emit_read();
            self.codegen.emit_store(head);
            tail = rest;
        }
    }

    /// Emit the arguments of a print statement, evaluating and printing each
    /// one left to right (prints interleave with evaluation)
    fn emit_print_args(&mut self, args: &ExprList) -> Result<(), CompileError> {
        self.emit_expr(&args.head)?;
        self.codegen.emit_print();

        let mut tail = &args.tail;
        while let ExprListTail::More { head, rest } = tail {
            self.emit_expr(head)?;
            self.codegen.emit_print();
            tail = rest;
        }
        Ok(())
    }

    /// Emit an n-ary fold over an expression list: push the first operand,
    /// then push and combine each remaining operand left to right
    fn emit_fold(&mut self, operands: &ExprList, opcode: Opcode) -> Result<(), CompileError> {
        self.emit_expr(&operands.head)?;

        let mut tail = &operands.tail;
        while let ExprListTail::More { head, rest } = tail {
            self.emit_expr(head)?;
            self.codegen.emit(opcode);
            tail = rest;
        }
        Ok(())
    }

    /// Emit a value expression, leaving its result on the stack
    fn emit_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Add { operands } => self.emit_fold(operands, Opcode::Add)?,
            Expr::Mul { operands } => self.emit_fold(operands, Opcode::Mul)?,
            Expr::Sub { lhs, rhs } => {
                self.emit_expr(lhs)?;
                self.emit_expr(rhs)?;
                self.codegen.emit(Opcode::Sub);
            }
            Expr::Div { lhs, rhs } => {
                self.emit_expr(lhs)?;
                self.emit_expr(rhs)?;
                self.codegen.emit(Opcode::Div);
            }
            Expr::Number { value } => self.codegen.emit_const(*value),
            Expr::Ident { name } => self.codegen.emit_load(name)?,
        }
        Ok(())
    }

    /// Emit jumping code for a boolean expression
    ///
    /// Control transfers to `on_true` exactly when the expression holds and
    /// to `on_false` otherwise; no truth value ever touches the stack. Leaf
    /// comparisons emit a single conditional jump on the negated outcome and
    /// fall through toward `on_true`, which every caller reaches either by
    /// placing `on_true` immediately after this code or by an explicit goto.
    fn emit_bool_expr(
        &mut self,
        expr: &BoolExpr,
        on_true: Label,
        on_false: Label,
    ) -> Result<(), CompileError> {
        match expr {
            BoolExpr::Eq { lhs, rhs } => self.emit_comparison(lhs, rhs, Opcode::IfNe, on_false)?,
            BoolExpr::Ne { lhs, rhs } => self.emit_comparison(lhs, rhs, Opcode::IfEq, on_false)?,
            BoolExpr::Lt { lhs, rhs } => self.emit_comparison(lhs, rhs, Opcode::IfGe, on_false)?,
            BoolExpr::Le { lhs, rhs } => self.emit_comparison(lhs, rhs, Opcode::IfGt, on_false)?,
            BoolExpr::Gt { lhs, rhs } => self.emit_comparison(lhs, rhs, Opcode::IfLe, on_false)?,
            BoolExpr::Ge { lhs, rhs } => self.emit_comparison(lhs, rhs, Opcode::IfLt, on_false)?,
            BoolExpr::And { lhs, rhs } => {
                let mid = self.codegen.new_label();
                self.emit_bool_expr(lhs, mid, on_false)?;
                self.codegen.place_label(mid);
                self.emit_bool_expr(rhs, on_true, on_false)?;
            }
            BoolExpr::Or { lhs, rhs } => {
                let mid = self.codegen.new_label();
                self.emit_bool_expr(lhs, on_true, mid)?;
                self.codegen.emit_goto(on_true);
                self.codegen.place_label(mid);
                self.emit_bool_expr(rhs, on_true, on_false)?;
            }
            BoolExpr::Not { inner } => {
                self.emit_bool_expr(inner, on_false, on_true)?;
                // The inner expression's fallthrough path means "inner true",
                // which is this expression's false outcome
                self.codegen.emit_goto(on_false);
            }
        }
        Ok(())
    }

    /// Emit a leaf comparison: both operands, then one conditional jump
    fn emit_comparison(
        &mut self,
        lhs: &Expr,
        rhs: &Expr,
        negated: Opcode,
        on_false: Label,
    ) -> Result<(), CompileError> {
        self.emit_expr(lhs)?;
        self.emit_expr(rhs)?;
        self.codegen.emit_jump(negated, on_false);
        Ok(())
    }
}
