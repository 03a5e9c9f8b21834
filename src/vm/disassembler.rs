use super::byte_code::chunk::{self, Chunk, DecodedInstruction};
use super::byte_code::error;
use super::byte_code::operand::{CompareOp, FormatValue, OperandKind};
use super::byte_code::registry::Registry;
use std::io::Write;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] chunk::Error),
    #[error(transparent)]
    Registry(#[from] error::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub fn disassemble<T: Write>(
    writer: &mut T,
    registry: &Registry,
    chunk: &Chunk,
    context: &str,
) -> Result<()> {
    Disassembler::new(writer, registry).disassemble(chunk, context)
}

/// Renders byte code in a human readable form.
///
/// The argument of every instruction is explained according to its operand kind,
/// so the output shows jump destinations, comparison operators and the sub-operation
/// selected through a carrier opcode instead of bare numbers.
pub struct Disassembler<'a, T: Write> {
    writer: T,
    registry: &'a Registry,
}

impl<'a, T: Write> Disassembler<'a, T> {
    pub fn new(writer: T, registry: &'a Registry) -> Disassembler<'a, T> {
        Disassembler { writer, registry }
    }

    pub fn disassemble(&mut self, chunk: &Chunk, context: &str) -> Result<()> {
        writeln!(self.writer, "== {} ==", context)?;

        for instruction in chunk.decode(self.registry)? {
            self.disassemble_instruction(chunk, &instruction)?;
        }

        writeln!(self.writer)?;
        Ok(())
    }

    pub fn disassemble_instruction(
        &mut self,
        chunk: &Chunk,
        instruction: &DecodedInstruction,
    ) -> Result<()> {
        let address = instruction.offset;

        write!(self.writer, "{:04} ", address)?;
        match chunk.find_line(address) {
            Some((begin, _, _)) if begin < address => write!(self.writer, "   | ")?,
            Some((_, _, line)) => write!(self.writer, "{:4} ", line)?,
            None => write!(self.writer, "     ")?,
        }

        let op = self.registry.opcode(instruction.code)?;
        let name = op.name;

        if !op.has_argument() {
            writeln!(self.writer, "{}", name)?;
            return Ok(());
        }

        match self.describe(instruction) {
            Some(detail) => writeln!(
                self.writer,
                "{:<28} {:>5} ({})",
                name, instruction.arg, detail
            )?,
            None => writeln!(self.writer, "{:<28} {:>5}", name, instruction.arg)?,
        }

        Ok(())
    }

    /// Explain the argument of an instruction, if there is anything to explain
    pub fn describe(&self, instruction: &DecodedInstruction) -> Option<String> {
        let registry = self.registry;
        let arg = instruction.arg;

        if let Some(ops) = registry.extended_by_code(instruction.code) {
            return Some(
                ops.name(arg)
                    .map(String::from)
                    .unwrap_or_else(|_| String::from("<unknown>")),
            );
        }

        let op = registry.opcode(instruction.code).ok()?;
        if op.is_jump() {
            return instruction
                .jump_target(op.kinds)
                .map(|target| format!("to {}", target));
        }

        let kind = op.kinds.iter().next();
        match kind {
            Some(OperandKind::Constant) => Some(format!("const #{}", arg)),
            Some(OperandKind::Local) => Some(format!("local #{}", arg)),
            Some(OperandKind::Free) => Some(format!("cell #{}", arg)),
            Some(OperandKind::Name) => Some(format!("name #{}", arg)),
            Some(OperandKind::Compare) => Some(
                CompareOp::from_arg(arg)
                    .map(|compare| compare.to_string())
                    .unwrap_or_else(|_| String::from("<invalid>")),
            ),
            _ if op.name == "FORMAT_VALUE" => describe_format_value(arg),
            _ => None,
        }
    }
}

fn describe_format_value(arg: u32) -> Option<String> {
    let mut parts = vec![];

    if let Some(conversion) = FormatValue::conversion(arg) {
        parts.push(conversion.to_string());
    }
    if FormatValue::has_spec(arg) {
        parts.push(String::from("with format"));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::byte_code::chunk::Instruction;
    use crate::vm::byte_code::opcodes::{OPCODES, READONLY_OPERATION};

    fn chunk(instructions: &[(&str, u32)]) -> Chunk {
        let mut chunk = Chunk::new();
        for (name, arg) in instructions {
            chunk
                .write_instruction(&OPCODES, Instruction::named(&OPCODES, name, *arg).unwrap())
                .unwrap();
        }
        chunk
    }

    fn render(chunk: &Chunk) -> String {
        let mut out = Vec::new();
        disassemble(&mut out, &OPCODES, chunk, "test").unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn renders_operand_kinds() {
        let chunk = chunk(&[
            ("LOAD_FAST", 0),
            ("LOAD_CONST", 1),
            ("COMPARE_OP", 4),
            ("POP_JUMP_IF_FALSE", 12),
            ("LOAD_GLOBAL", 2),
            ("RETURN_VALUE", 0),
            ("LOAD_DEREF", 0),
        ]);
        let output = render(&chunk);
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines[0], "== test ==");
        assert!(lines[1].starts_with("0000      LOAD_FAST"));
        assert!(lines[1].ends_with("0 (local #0)"));
        assert!(lines[2].ends_with("1 (const #1)"));
        assert!(lines[3].ends_with("4 (>)"));
        assert!(lines[4].ends_with("12 (to 12)"));
        assert!(lines[5].ends_with("2 (name #2)"));
        assert_eq!(lines[6], "0010      RETURN_VALUE");
        assert!(lines[7].ends_with("0 (cell #0)"));
    }

    #[test]
    fn resolves_relative_jumps_and_sub_operations() {
        let chunk = chunk(&[
            ("JUMP_FORWARD", 4),
            (READONLY_OPERATION, 19),
            ("FORMAT_VALUE", 0x6),
        ]);
        let output = render(&chunk);
        let lines: Vec<&str> = output.lines().collect();

        assert!(lines[1].ends_with("4 (to 6)"));
        assert!(lines[2].ends_with("19 (COMPARE_OP)"));
        assert!(lines[3].ends_with("6 (!r, with format)"));
    }

    #[test]
    fn marks_continued_lines() {
        let mut chunk = chunk(&[("LOAD_CONST", 0), ("RETURN_VALUE", 0)]);
        chunk.write_line(0, 3, 7);

        let output = render(&chunk);
        let lines: Vec<&str> = output.lines().collect();

        assert!(lines[1].starts_with("0000    7 LOAD_CONST"));
        assert_eq!(lines[2], "0002    | RETURN_VALUE");
    }

    #[test]
    fn fails_on_undecodable_code() {
        let mut out = Vec::new();
        let result = disassemble(&mut out, &OPCODES, &Chunk::from_bytes(vec![7, 0]), "bad");

        assert_matches!(result, Err(Error::Decode(_)));
    }
}
