#![allow(dead_code)]

use opcodes::vm::byte_code::chunk::{Chunk, Instruction};
pub use opcodes::vm::byte_code::error::Error;
use opcodes::vm::byte_code::opcodes::standard;
pub use opcodes::vm::{Branch, Registry, Setting, Settings, OPCODES};
pub use matches::assert_matches;

pub fn effect(name: &str, arg: u32) -> i32 {
    OPCODES
        .stack_effect(name, arg, Branch::NotApplicable)
        .unwrap()
}

pub fn branch_effect(name: &str, arg: u32, taken: bool) -> i32 {
    OPCODES.stack_effect(name, arg, Branch::from(taken)).unwrap()
}

pub fn registry_with(setting: Setting, value: i32) -> Registry {
    standard(Settings::default().with(setting, value)).unwrap()
}

pub fn assemble(registry: &Registry, instructions: &[(&str, u32)]) -> Chunk {
    let mut chunk = Chunk::new();
    for (name, arg) in instructions {
        let instruction = Instruction::named(registry, name, *arg).unwrap();
        chunk.write_instruction(registry, instruction).unwrap();
    }
    chunk
}
