//! A `Chunk` holds encoded byte code together with its line table.
//!
//! Byte code is a sequence of two byte code units: the opcode followed by the low byte
//! of its argument. Arguments that don't fit into a byte are widened by prefixing the
//! instruction with `EXTENDED_ARG` units, each carrying the next higher byte.

use super::error;
use super::operand::{OperandKind, OperandKinds};
use super::registry::Registry;
use super::{has_argument, CodeType, Oparg, EXTENDED_ARG};
use std::cmp::Ordering;
use thiserror::Error;

pub type AddressType = usize;
pub type LineNumber = u32;
// start address, end address, line number
pub type LineInfo = (AddressType, AddressType, LineNumber);

pub const CODE_UNIT_SIZE: usize = 2;
const MAX_PREFIXES: usize = 3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] error::Error),
    #[error("Unknown opcode {code} at offset {offset}")]
    UnknownOpcode { offset: AddressType, code: CodeType },
    #[error("{name} at offset {offset} takes no argument but has {arg}")]
    UnexpectedArgument {
        offset: AddressType,
        name: String,
        arg: Oparg,
    },
    #[error("Argument at offset {0} is wider than 32 bits")]
    ArgumentTooLarge(AddressType),
    #[error("Code of length {0} ends in the middle of an instruction")]
    TruncatedCode(usize),
    #[error("EXTENDED_ARG at offset {0} isn't followed by an instruction")]
    DanglingExtendedArg(AddressType),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub code: CodeType,
    pub arg: Oparg,
}

impl Instruction {
    pub fn new(code: CodeType, arg: Oparg) -> Self {
        Self { code, arg }
    }

    pub fn simple(code: CodeType) -> Self {
        Self { code, arg: 0 }
    }

    /// Build an instruction by opcode name
    pub fn named(registry: &Registry, name: &str, arg: Oparg) -> error::Result<Self> {
        Ok(Self::new(registry.lookup_by_name(name)?, arg))
    }

    /// Number of code units needed to encode this instruction, including prefixes
    pub fn units(&self) -> usize {
        1 + prefixes(self.arg)
    }

    /// Number of bytes needed to encode this instruction, including prefixes
    #[inline]
    pub fn size(&self) -> usize {
        self.units() * CODE_UNIT_SIZE
    }
}

/// An instruction as found in encoded byte code, with `EXTENDED_ARG` prefixes folded in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// offset of the first byte, which is the first prefix if there is any
    pub offset: AddressType,
    pub code: CodeType,
    pub arg: Oparg,
    /// size in bytes including prefixes
    pub size: usize,
}

impl DecodedInstruction {
    #[inline]
    pub fn next_offset(&self) -> AddressType {
        self.offset + self.size
    }

    pub fn instruction(&self) -> Instruction {
        Instruction::new(self.code, self.arg)
    }

    /// The destination of a jump. Relative jumps count from the following instruction.
    pub fn jump_target(&self, kinds: OperandKinds) -> Option<AddressType> {
        match kinds.jump()? {
            OperandKind::RelativeJump => Some(self.next_offset() + self.arg as AddressType),
            _ => Some(self.arg as AddressType),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Chunk {
    pub(crate) lines: Vec<LineInfo>,
    pub(crate) code: Vec<u8>,
}

impl Chunk {
    pub fn new() -> Chunk {
        Chunk {
            code: vec![],
            lines: vec![],
        }
    }

    /// Wrap already encoded byte code
    pub fn from_bytes(code: Vec<u8>) -> Chunk {
        Chunk {
            code,
            lines: vec![],
        }
    }

    pub fn write_line(&mut self, from: AddressType, to: AddressType, line: LineNumber) {
        self.lines.push((from, to, line));
    }

    /// Encode and append the instruction, returning the address of its first byte
    pub fn write_instruction(
        &mut self,
        registry: &Registry,
        instruction: Instruction,
    ) -> Result<AddressType> {
        let address = self.code.len();
        let op = registry
            .opcode(instruction.code)
            .map_err(|_| Error::UnknownOpcode {
                offset: address,
                code: instruction.code,
            })?;

        if !op.has_argument() && instruction.arg != 0 {
            return Err(Error::UnexpectedArgument {
                offset: address,
                name: op.name.to_string(),
                arg: instruction.arg,
            });
        }

        for shift in (1..=prefixes(instruction.arg)).rev() {
            self.code.push(EXTENDED_ARG);
            self.code.push((instruction.arg >> (8 * shift)) as u8);
        }
        self.code.push(instruction.code);
        self.code.push(instruction.arg as u8);

        Ok(address)
    }

    pub fn write_all<I>(&mut self, registry: &Registry, instructions: I) -> Result<()>
    where
        I: IntoIterator<Item = Instruction>,
    {
        for instruction in instructions {
            self.write_instruction(registry, instruction)?;
        }
        Ok(())
    }

    pub fn find_line(&self, address: AddressType) -> Option<LineInfo> {
        let index = self.lines.binary_search_by(|&(begin, end, _)| {
            if address < begin {
                Ordering::Greater
            } else if address > end {
                Ordering::Less
            } else {
                Ordering::Equal
            }
        });

        match index {
            Ok(idx) => Some(self.lines[idx]),
            Err(_) => None,
        }
    }

    #[inline]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Decode the whole chunk.
    ///
    /// Every opcode must be known to the registry and opcodes without an argument
    /// must have a zero argument byte and no prefix.
    pub fn decode(&self, registry: &Registry) -> Result<Vec<DecodedInstruction>> {
        if self.code.len() % CODE_UNIT_SIZE != 0 {
            return Err(Error::TruncatedCode(self.code.len()));
        }

        let mut instructions = Vec::with_capacity(self.code.len() / CODE_UNIT_SIZE);
        let mut start = 0;
        let mut extended: Oparg = 0;
        let mut prefix_count = 0;

        for (unit, pair) in self.code.chunks_exact(CODE_UNIT_SIZE).enumerate() {
            let offset = unit * CODE_UNIT_SIZE;
            let (code, byte) = (pair[0], pair[1]);
            let op = registry
                .opcode(code)
                .map_err(|_| Error::UnknownOpcode { offset, code })?;
            let arg = extended | Oparg::from(byte);

            if !has_argument(code) && arg != 0 {
                return Err(Error::UnexpectedArgument {
                    offset: start,
                    name: op.name.to_string(),
                    arg,
                });
            }

            if code == EXTENDED_ARG {
                prefix_count += 1;
                if prefix_count > MAX_PREFIXES {
                    return Err(Error::ArgumentTooLarge(start));
                }
                extended = arg << 8;
                continue;
            }

            instructions.push(DecodedInstruction {
                offset: start,
                code,
                arg,
                size: offset + CODE_UNIT_SIZE - start,
            });

            start = offset + CODE_UNIT_SIZE;
            extended = 0;
            prefix_count = 0;
        }

        if prefix_count > 0 {
            return Err(Error::DanglingExtendedArg(start));
        }

        Ok(instructions)
    }
}

/// Number of `EXTENDED_ARG` prefixes required to carry `arg`
fn prefixes(arg: Oparg) -> usize {
    match arg {
        0..=0xFF => 0,
        0x100..=0xFFFF => 1,
        0x1_0000..=0xFF_FFFF => 2,
        _ => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::byte_code::opcodes::OPCODES;

    fn op(name: &str) -> CodeType {
        OPCODES.lookup_by_name(name).unwrap()
    }

    #[test]
    fn write_simple_instructions() {
        let mut chunk = Chunk::new();

        let first = chunk
            .write_instruction(&OPCODES, Instruction::new(op("LOAD_CONST"), 1))
            .unwrap();
        let second = chunk
            .write_instruction(&OPCODES, Instruction::simple(op("RETURN_VALUE")))
            .unwrap();

        assert_eq!(first, 0);
        assert_eq!(second, 2);
        assert_eq!(chunk.code(), &[100, 1, 83, 0]);
    }

    #[test]
    fn wide_arguments_are_prefixed() {
        let mut chunk = Chunk::new();
        chunk
            .write_instruction(&OPCODES, Instruction::new(op("LOAD_CONST"), 0x01_0203))
            .unwrap();

        assert_eq!(chunk.code(), &[144, 0x01, 144, 0x02, 100, 0x03]);

        let decoded = chunk.decode(&OPCODES).unwrap();
        assert_eq!(
            decoded,
            vec![DecodedInstruction {
                offset: 0,
                code: 100,
                arg: 0x01_0203,
                size: 6
            }]
        );
        assert_eq!(decoded[0].next_offset(), 6);
    }

    #[test]
    fn jump_targets() {
        let jump = |code, arg| DecodedInstruction {
            offset: 4,
            code,
            arg,
            size: 2,
        };

        assert_eq!(
            jump(110, 6).jump_target(OPCODES.classify(110).unwrap()),
            Some(12)
        );
        assert_eq!(
            jump(113, 6).jump_target(OPCODES.classify(113).unwrap()),
            Some(6)
        );
        assert_eq!(
            jump(100, 6).jump_target(OPCODES.classify(100).unwrap()),
            None
        );
    }

    #[test]
    fn instruction_sizes() {
        assert_eq!(Instruction::new(100, 0xFF).size(), 2);
        assert_eq!(Instruction::new(100, 0x100).size(), 4);
        assert_eq!(Instruction::new(100, 0xFFFF_FFFF).size(), 8);
    }

    #[test]
    fn zero_operand_instructions_reject_arguments() {
        let mut chunk = Chunk::new();

        assert_matches!(
            chunk.write_instruction(&OPCODES, Instruction::new(op("POP_TOP"), 1)),
            Err(Error::UnexpectedArgument { arg: 1, .. })
        );
        assert!(chunk.is_empty());

        let chunk = Chunk::from_bytes(vec![1, 7]);
        assert_matches!(
            chunk.decode(&OPCODES),
            Err(Error::UnexpectedArgument { offset: 0, arg: 7, .. })
        );

        let chunk = Chunk::from_bytes(vec![144, 1, 1, 0]);
        assert_matches!(
            chunk.decode(&OPCODES),
            Err(Error::UnexpectedArgument { arg: 0x100, .. })
        );
    }

    #[test]
    fn unknown_opcodes_are_rejected() {
        let mut chunk = Chunk::new();

        assert_matches!(
            chunk.write_instruction(&OPCODES, Instruction::simple(7)),
            Err(Error::UnknownOpcode { code: 7, .. })
        );
        assert_matches!(
            Chunk::from_bytes(vec![9, 0, 255, 0]).decode(&OPCODES),
            Err(Error::UnknownOpcode {
                offset: 2,
                code: 255
            })
        );
    }

    #[test]
    fn malformed_code_is_rejected() {
        assert_matches!(
            Chunk::from_bytes(vec![9, 0, 9]).decode(&OPCODES),
            Err(Error::TruncatedCode(3))
        );
        assert_matches!(
            Chunk::from_bytes(vec![9, 0, 144, 1]).decode(&OPCODES),
            Err(Error::DanglingExtendedArg(2))
        );
        assert_matches!(
            Chunk::from_bytes(vec![144, 1, 144, 1, 144, 1, 144, 1, 100, 0]).decode(&OPCODES),
            Err(Error::ArgumentTooLarge(0))
        );
    }

    #[test]
    fn find_line_returns_enclosing_range() {
        let mut chunk = Chunk::new();
        chunk.write_line(0, 3, 10);
        chunk.write_line(4, 7, 11);

        assert_eq!(chunk.find_line(2), Some((0, 3, 10)));
        assert_eq!(chunk.find_line(4), Some((4, 7, 11)));
        assert_eq!(chunk.find_line(9), None);
    }

    #[quickcheck]
    fn decode_inverts_write(args: Vec<u32>) -> bool {
        let load_const = op("LOAD_CONST");
        let instructions: Vec<Instruction> = args
            .iter()
            .map(|arg| Instruction::new(load_const, *arg))
            .collect();
        let mut chunk = Chunk::new();

        if chunk.write_all(&OPCODES, instructions.clone()).is_err() {
            return false;
        }

        match chunk.decode(&OPCODES) {
            Ok(decoded) => {
                decoded.iter().map(|d| d.instruction()).collect::<Vec<_>>() == instructions
            }
            Err(_) => false,
        }
    }
}
