pub mod chunk;
pub mod error;
pub mod extended;
pub mod opcodes;
pub mod operand;
pub mod registry;
pub mod stack_effect;

use operand::OperandKinds;
use std::fmt;

pub type CodeType = u8;
pub type Oparg = u32;

/// Opcodes numbered at or above this value carry an argument, all others don't.
pub const HAVE_ARGUMENT: CodeType = 90;

/// The argument-widening prefix. Its argument supplies the next higher byte of
/// the following instruction's argument.
pub const EXTENDED_ARG: CodeType = 144;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpCode {
    pub name: &'static str,
    pub code: CodeType,
    pub kinds: OperandKinds,
}

impl OpCode {
    pub fn new(name: &'static str, code: CodeType) -> Self {
        Self {
            name,
            code,
            kinds: OperandKinds::empty(),
        }
    }

    #[inline]
    pub fn has_argument(&self) -> bool {
        has_argument(self.code)
    }

    #[inline]
    pub fn is_jump(&self) -> bool {
        self.kinds.is_jump()
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[inline]
pub fn has_argument(code: CodeType) -> bool {
    code >= HAVE_ARGUMENT
}
