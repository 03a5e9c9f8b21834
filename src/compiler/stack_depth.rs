//! Static stack depth analysis.
//!
//! Walks all paths through a piece of byte code, tracking the operand stack depth with
//! the stack effects of the registry. This yields the maximum depth a frame has to
//! reserve and verifies that every instruction is reached with the same depth on all
//! paths and that no path pops more than it pushed.

use crate::vm::byte_code::chunk::{self, AddressType, Chunk, DecodedInstruction};
use crate::vm::byte_code::error;
use crate::vm::byte_code::registry::Registry;
use crate::vm::byte_code::stack_effect::Branch;
use crate::vm::byte_code::CodeType;
#[cfg(feature = "debug_code")]
use crate::vm::disassembler::disassemble;
use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] error::Error),
    #[error(transparent)]
    Decode(#[from] chunk::Error),
    #[error("Stack underflow at offset {offset}: depth would drop to {depth}")]
    StackUnderflow { offset: AddressType, depth: i64 },
    #[error("Inconsistent stack depth at offset {offset}: reached with {expected} and {found}")]
    InconsistentDepth {
        offset: AddressType,
        expected: i64,
        found: i64,
    },
    #[error("Jump at offset {offset} targets {target}, which isn't the start of an instruction")]
    InvalidJumpTarget {
        offset: AddressType,
        target: AddressType,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub max_depth: usize,
    depths: FxHashMap<AddressType, usize>,
}

impl Analysis {
    /// The stack depth on entry of the instruction at `offset`, if it's reachable
    pub fn depth_at(&self, offset: AddressType) -> Option<usize> {
        self.depths.get(&offset).copied()
    }

    pub fn reachable(&self) -> usize {
        self.depths.len()
    }
}

/// Decode the chunk and compute the maximum stack depth it needs
pub fn max_stack_depth(registry: &Registry, chunk: &Chunk) -> Result<usize> {
    #[cfg(feature = "debug_code")]
    {
        let mut out = Vec::new();
        if disassemble(&mut out, registry, chunk, "stack depth").is_ok() {
            log::debug!("{}", String::from_utf8_lossy(&out));
        }
    }

    let instructions = chunk.decode(registry)?;
    Ok(StackDepth::new(registry).analyse(&instructions)?.max_depth)
}

pub struct StackDepth<'a> {
    registry: &'a Registry,
    unconditional: Vec<CodeType>,
    terminal: Vec<CodeType>,
}

impl<'a> StackDepth<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        let codes = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| registry.lookup_by_name(name).ok())
                .collect::<Vec<_>>()
        };

        Self {
            registry,
            unconditional: codes(&["JUMP_FORWARD", "JUMP_ABSOLUTE"]),
            terminal: codes(&["RETURN_VALUE", "RAISE_VARARGS"]),
        }
    }

    pub fn analyse(&self, instructions: &[DecodedInstruction]) -> Result<Analysis> {
        let index: FxHashMap<AddressType, usize> = instructions
            .iter()
            .enumerate()
            .map(|(idx, instruction)| (instruction.offset, idx))
            .collect();
        let mut depths: Vec<Option<i64>> = vec![None; instructions.len()];
        let mut worklist: Vec<(usize, i64)> = vec![];
        let mut max_depth: i64 = 0;

        if !instructions.is_empty() {
            worklist.push((0, 0));
        }

        while let Some((idx, depth)) = worklist.pop() {
            let instruction = &instructions[idx];

            match depths[idx] {
                Some(known) if known == depth => continue,
                Some(known) => {
                    return Err(Error::InconsistentDepth {
                        offset: instruction.offset,
                        expected: known,
                        found: depth,
                    })
                }
                None => depths[idx] = Some(depth),
            }

            let op = self.registry.opcode(instruction.code)?;
            log::trace!("{:04} {} depth {}", instruction.offset, op.name, depth);

            let fall_through = match instruction.jump_target(op.kinds) {
                Some(target) => {
                    let taken = self.apply(instruction, op.name, depth, Branch::Taken)?;
                    let target_idx =
                        index
                            .get(&target)
                            .copied()
                            .ok_or(Error::InvalidJumpTarget {
                                offset: instruction.offset,
                                target,
                            })?;

                    max_depth = max_depth.max(taken);
                    worklist.push((target_idx, taken));

                    if self.unconditional.contains(&instruction.code) {
                        continue;
                    }
                    self.apply(instruction, op.name, depth, Branch::NotTaken)?
                }
                None => self.apply(instruction, op.name, depth, Branch::NotApplicable)?,
            };

            max_depth = max_depth.max(depth).max(fall_through);

            if !self.terminal.contains(&instruction.code) && idx + 1 < instructions.len() {
                worklist.push((idx + 1, fall_through));
            }
        }

        let depths = instructions
            .iter()
            .zip(depths)
            .filter_map(|(instruction, depth)| depth.map(|d| (instruction.offset, d as usize)))
            .collect();

        Ok(Analysis {
            max_depth: max_depth as usize,
            depths,
        })
    }

    fn apply(
        &self,
        instruction: &DecodedInstruction,
        name: &str,
        depth: i64,
        branch: Branch,
    ) -> Result<i64> {
        let effect = self.registry.stack_effect(name, instruction.arg, branch)?;
        let next = depth + i64::from(effect);

        if next < 0 {
            return Err(Error::StackUnderflow {
                offset: instruction.offset,
                depth: next,
            });
        }

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::byte_code::chunk::Instruction;
    use crate::vm::byte_code::opcodes::{standard, OPCODES};
    use crate::vm::settings::{Setting, Settings};

    fn chunk(registry: &Registry, instructions: &[(&str, u32)]) -> Chunk {
        let mut chunk = Chunk::new();
        for (name, arg) in instructions {
            chunk
                .write_instruction(registry, Instruction::named(registry, name, *arg).unwrap())
                .unwrap();
        }
        chunk
    }

    #[test]
    fn straight_line_code() {
        let code = chunk(
            &OPCODES,
            &[
                ("LOAD_CONST", 0),
                ("LOAD_CONST", 1),
                ("BINARY_ADD", 0),
                ("RETURN_VALUE", 0),
            ],
        );

        assert_eq!(max_stack_depth(&OPCODES, &code), Ok(2));
    }

    #[test]
    fn empty_code_needs_no_stack() {
        assert_eq!(max_stack_depth(&OPCODES, &Chunk::new()), Ok(0));
    }

    #[test]
    fn loops_merge_with_equal_depth() {
        let code = chunk(
            &OPCODES,
            &[
                ("LOAD_FAST", 0),
                ("GET_ITER", 0),
                ("FOR_ITER", 4),
                ("STORE_FAST", 1),
                ("JUMP_ABSOLUTE", 4),
                ("LOAD_CONST", 0),
                ("RETURN_VALUE", 0),
            ],
        );
        let instructions = code.decode(&OPCODES).unwrap();
        let analysis = StackDepth::new(&OPCODES).analyse(&instructions).unwrap();

        assert_eq!(analysis.max_depth, 2);
        assert_eq!(analysis.depth_at(4), Some(1));
        assert_eq!(analysis.depth_at(6), Some(2));
        assert_eq!(analysis.depth_at(10), Some(0));
        assert_eq!(analysis.reachable(), 7);
    }

    #[test]
    fn conditional_branches() {
        let code = chunk(
            &OPCODES,
            &[
                ("LOAD_FAST", 0),
                ("POP_JUMP_IF_FALSE", 8),
                ("LOAD_CONST", 1),
                ("RETURN_VALUE", 0),
                ("LOAD_CONST", 0),
                ("RETURN_VALUE", 0),
            ],
        );

        assert_eq!(max_stack_depth(&OPCODES, &code), Ok(1));
    }

    #[test]
    fn handler_frames_are_reserved() {
        let instructions = [
            ("SETUP_FINALLY", 4),
            ("LOAD_CONST", 0),
            ("RETURN_VALUE", 0),
            ("END_FINALLY", 0),
            ("LOAD_CONST", 0),
            ("RETURN_VALUE", 0),
        ];

        let code = chunk(&OPCODES, &instructions);
        assert_eq!(max_stack_depth(&OPCODES, &code), Ok(6));

        let narrow = standard(Settings::default().with(Setting::HandlerFrameSize, 4)).unwrap();
        let code = chunk(&narrow, &instructions);
        assert_eq!(max_stack_depth(&narrow, &code), Ok(4));
    }

    #[test]
    fn detects_underflow() {
        let code = chunk(&OPCODES, &[("POP_TOP", 0)]);

        assert_matches!(
            max_stack_depth(&OPCODES, &code),
            Err(Error::StackUnderflow {
                offset: 0,
                depth: -1
            })
        );
    }

    #[test]
    fn detects_inconsistent_merges() {
        let code = chunk(
            &OPCODES,
            &[
                ("LOAD_CONST", 0),
                ("POP_JUMP_IF_TRUE", 8),
                ("LOAD_CONST", 0),
                ("LOAD_CONST", 0),
                ("RETURN_VALUE", 0),
            ],
        );

        assert_matches!(
            max_stack_depth(&OPCODES, &code),
            Err(Error::InconsistentDepth { offset: 8, .. })
        );
    }

    #[test]
    fn detects_invalid_jump_targets() {
        let code = chunk(&OPCODES, &[("JUMP_ABSOLUTE", 3), ("NOP", 0)]);

        assert_matches!(
            max_stack_depth(&OPCODES, &code),
            Err(Error::InvalidJumpTarget {
                offset: 0,
                target: 3
            })
        );
    }
}
