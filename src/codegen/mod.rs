//! Code generation backend
//!
//! The `CodeGenerator` accumulates an append-only stream of instructions and
//! label markers while the compiler walks the syntax tree, allocates labels
//! scoped to this one compilation, and owns the symbol table. `finish`
//! validates the label invariants and seals the stream into an `Assembly`,
//! which serializes to the textual listing.

pub mod instruction;
pub mod opcode;
pub mod symbol_table;

pub use instruction::{Entity, Instruction, Label, Operand, LABEL_PREFIX};
pub use opcode::Opcode;
pub use symbol_table::{SymbolTable, UndefinedVariable};

use std::collections::HashSet;
use std::fmt;

/// Fixed prologue of every listing: the `Output` class scaffold, the external
/// `print(int)` and `read():int` routines, and the opening of the generated
/// `run` body.
const HEADER: &str = "\
.class public Output
.super java/lang/Object

.method public <init>()V
 aload_0
 invokenonvirtual java/lang/Object/<init>()V
 return
.end method

.method public static print(I)V
 .limit stack 2
 getstatic java/lang/System/out Ljava/io/PrintStream;
 iload_0
 invokestatic java/lang/Integer/toString(I)Ljava/lang/String;
 invokevirtual java/io/PrintStream/println(Ljava/lang/String;)V
 return
.end method

.method public static read()I
 .limit stack 3
 new java/util/Scanner
 dup
 getstatic java/lang/System/in Ljava/io/InputStream;
 invokespecial java/util/Scanner/<init>(Ljava/io/InputStream;)V
 invokevirtual java/util/Scanner/next()Ljava/lang/String;
 invokestatic java/lang/Integer.parseInt(Ljava/lang/String;)I
 ireturn
.end method

.method public static run()V
 .limit stack 1024
 .limit locals 256
";

/// Fixed epilogue: closes `run` and delegates the program entry point to it.
const FOOTER: &str = "\
 return
.end method

.method public static main([Ljava/lang/String;)V
 invokestatic Output/run()V
 return
.end method
";

/// Emission state for one compilation
pub struct CodeGenerator {
    entities: Vec<Entity>,
    symbols: SymbolTable,
    next_label: u32,
}

impl CodeGenerator {
    /// Create a generator with an empty stream and symbol table
    pub fn new() -> Self {
        CodeGenerator {
            entities: Vec::new(),
            symbols: SymbolTable::new(),
            next_label: 0,
        }
    }

    /// Allocate a fresh label, scoped to this compilation
    pub fn new_label(&mut self) -> Label {
        let label = Label::new(self.next_label);
        self.next_label += 1;
        label
    }

    /// Append an operand-less instruction
    pub fn emit(&mut self, opcode: Opcode) {
        self.entities.push(Entity::Instruction(Instruction::new(opcode)));
    }

    /// Append a load-constant instruction
    pub fn emit_const(&mut self, value: i32) {
        self.entities.push(Entity::Instruction(Instruction::with_operand(
            Opcode::LoadConst,
            Operand::Constant(value),
        )));
    }

    /// Append a conditional jump to `target`
    pub fn emit_jump(&mut self, opcode: Opcode, target: Label) {
        debug_assert!(opcode.is_jump());
        self.entities.push(Entity::Instruction(Instruction::with_operand(
            opcode,
            Operand::Label(target),
        )));
    }

    /// Append an unconditional jump to `target`
    pub fn emit_goto(&mut self, target: Label) {
        self.emit_jump(Opcode::Goto, target);
    }

    /// Append an invocation of the external read routine
    pub fn emit_read(&mut self) {
        self.emit(Opcode::InvokeRead);
    }

    /// Append an invocation of the external print routine
    pub fn emit_print(&mut self) {
        self.emit(Opcode::InvokePrint);
    }

    /// Append a store into the named variable's slot, assigning a slot on
    /// the variable's first reference
    pub fn emit_store(&mut self, name: &str) {
        let slot = self.symbols.slot_or_insert(name);
        self.entities.push(Entity::Instruction(Instruction::with_operand(
            Opcode::StoreSlot,
            Operand::Slot(slot),
        )));
    }

    /// Append a load of the named variable's slot
    ///
    /// Fails if no store has assigned the variable a slot yet.
    pub fn emit_load(&mut self, name: &str) -> Result<(), UndefinedVariable> {
        let slot = self.symbols.lookup(name)?;
        self.entities.push(Entity::Instruction(Instruction::with_operand(
            Opcode::LoadSlot,
            Operand::Slot(slot),
        )));
        Ok(())
    }

    /// Place `label` at the current end of the stream
    pub fn place_label(&mut self, label: Label) {
        self.entities.push(Entity::Label(label));
    }

    /// Number of distinct variables referenced so far
    pub fn variable_count(&self) -> usize {
        self.symbols.len()
    }

    /// Seal the stream into an `Assembly`
    ///
    /// # Panics
    /// Panics if a label was placed more than once, or if a jump references
    /// a label that was never placed. Both are generator bugs, not user
    /// diagnostics.
    pub fn finish(self) -> Assembly {
        let mut placed = HashSet::new();
        for entity in &self.entities {
            if let Entity::Label(label) = entity {
                if !placed.insert(*label) {
                    panic!("label {} placed more than once", label);
                }
            }
        }

        for entity in &self.entities {
            if let Entity::Instruction(instruction) = entity {
                if let Some(Operand::Label(label)) = instruction.operand() {
                    if !placed.contains(&label) {
                        panic!("label {} referenced but never placed", label);
                    }
                }
            }
        }

        Assembly {
            entities: self.entities,
        }
    }
}

/// A fully generated program, ready to serialize or execute
///
/// Construction goes through `CodeGenerator::finish`, so every label in the
/// stream is known to be placed exactly once.
#[derive(Debug)]
pub struct Assembly {
    entities: Vec<Entity>,
}

impl Assembly {
    /// The generated entity stream, in emission order
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }
}

impl fmt::Display for Assembly {
    /// Serialize the listing: prologue, one entity per line, epilogue
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(HEADER)?;
        for entity in &self.entities {
            writeln!(f, "{}", entity)?;
        }
        f.write_str(FOOTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_order_is_emission_order() {
        let mut codegen = CodeGenerator::new();
        let label = codegen.new_label();

        codegen.emit_const(7);
        codegen.emit_store("x");
        codegen.emit_load("x").unwrap();
        codegen.emit(Opcode::Neg);
        codegen.emit_goto(label);
        codegen.place_label(label);

        let assembly = codegen.finish();
        let rendered: Vec<String> = assembly
            .entities()
            .iter()
            .map(|e| e.to_string())
            .collect();
        assert_eq!(
            rendered,
            vec![
                "\tldc 7",
                "\tistore 0",
                "\tiload 0",
                "\tineg",
                "\tgoto LB_0",
                "LB_0:",
            ]
        );
    }

    #[test]
    fn test_labels_allocated_monotonically_per_generator() {
        let mut first = CodeGenerator::new();
        let mut second = CodeGenerator::new();

        assert_eq!(first.new_label().id(), 0);
        assert_eq!(first.new_label().id(), 1);
        // A fresh generator starts over; allocation is not global
        assert_eq!(second.new_label().id(), 0);
    }

    #[test]
    fn test_load_of_unknown_variable_fails() {
        let mut codegen = CodeGenerator::new();
        assert_eq!(codegen.variable_count(), 0);
        assert!(codegen.emit_load("nope").is_err());

        codegen.emit_store("nope");
        assert!(codegen.emit_load("nope").is_ok());
        assert_eq!(codegen.variable_count(), 1);
    }

    #[test]
    #[should_panic(expected = "referenced but never placed")]
    fn test_unplaced_label_panics() {
        let mut codegen = CodeGenerator::new();
        let label = codegen.new_label();
        codegen.emit_goto(label);
        codegen.finish();
    }

    #[test]
    #[should_panic(expected = "placed more than once")]
    fn test_doubly_placed_label_panics() {
        let mut codegen = CodeGenerator::new();
        let label = codegen.new_label();
        codegen.place_label(label);
        codegen.place_label(label);
        codegen.finish();
    }

    #[test]
    fn test_backward_and_forward_references_are_legal() {
        let mut codegen = CodeGenerator::new();
        let back = codegen.new_label();
        let forward = codegen.new_label();

        codegen.place_label(back);
        codegen.emit_goto(forward);
        codegen.emit_goto(back);
        codegen.place_label(forward);

        assert_eq!(codegen.finish().entities().len(), 4);
    }

    #[test]
    fn test_listing_wraps_body_in_prologue_and_epilogue() {
        let mut codegen = CodeGenerator::new();
        let end = codegen.new_label();
        codegen.emit_const(1);
        codegen.emit_print();
        codegen.emit_goto(end);
        codegen.place_label(end);

        let listing = codegen.finish().to_string();
        assert!(listing.starts_with(".class public Output\n"));
        assert!(listing.contains(".method public static run()V\n"));
        assert!(listing.contains("\tldc 1\n\tinvokestatic Output/print(I)V\n"));
        assert!(listing.ends_with(
            ".method public static main([Ljava/lang/String;)V\n invokestatic Output/run()V\n return\n.end method\n"
        ));
    }

    #[test]
    fn test_body_lines_match_listing_grammar() {
        let pattern = regex::Regex::new(
            r"(?x)^(
                LB_\d+:
              | \t(iadd|imul|isub|idiv|ineg|ior|iand)
              | \tldc\ -?\d+
              | \t(istore|iload)\ \d+
              | \t(if_icmpeq|if_icmpne|if_icmplt|if_icmple|if_icmpgt|if_icmpge|ifne|goto)\ LB_\d+
              | \tinvokestatic\ Output/(read\(\)I|print\(I\)V)
            )$",
        )
        .unwrap();

        let mut codegen = CodeGenerator::new();
        let top = codegen.new_label();
        let out = codegen.new_label();
        codegen.place_label(top);
        codegen.emit_read();
        codegen.emit_store("n");
        codegen.emit_load("n").unwrap();
        codegen.emit_const(0);
        codegen.emit_jump(Opcode::IfLe, out);
        codegen.emit_load("n").unwrap();
        codegen.emit_print();
        codegen.emit_goto(top);
        codegen.place_label(out);

        let assembly = codegen.finish();
        for entity in assembly.entities() {
            let line = entity.to_string();
            assert!(pattern.is_match(&line), "unexpected listing line: {line:?}");
        }
    }
}
