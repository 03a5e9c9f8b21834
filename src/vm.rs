pub mod byte_code;
pub mod disassembler;
pub mod settings;

pub use byte_code::opcodes::OPCODES;
pub use byte_code::registry::{Registry, RegistryBuilder};
pub use byte_code::stack_effect::{Branch, StackEffect};
pub use settings::{Setting, Settings};
