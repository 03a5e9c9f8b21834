use super::{CodeType, HAVE_ARGUMENT};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Opcode {0} is already defined")]
    DuplicateName(String),
    #[error("Code {code} is already taken by {existing}, can't define {name}")]
    DuplicateCode {
        name: String,
        code: CodeType,
        existing: String,
    },
    #[error("Code {code} of {name} is out of range (0..=255)")]
    CodeOutOfRange { name: String, code: u32 },
    #[error("{name} ({code}) needs an argument but is below {}", HAVE_ARGUMENT)]
    MissingArgument { name: String, code: CodeType },
    #[error("{0} is already classified as a different jump")]
    ConflictingJumpKind(String),
    #[error("Unknown carrier opcode {0}")]
    UnknownCarrier(String),
    #[error("Carrier opcode {0} doesn't take an argument")]
    CarrierWithoutArgument(String),
    #[error("Selector {selector} of {carrier} is already taken by {existing}")]
    DuplicateSelector {
        carrier: String,
        selector: u32,
        existing: String,
    },
    #[error("Selector {selector} of {carrier} is out of range (0..=255)")]
    SelectorOutOfRange { carrier: String, selector: u32 },
    #[error("Sub-operation {name} is already defined for {carrier}")]
    DuplicateExtendedName { carrier: String, name: String },
    #[error("Stack effect of {0} is already defined")]
    DuplicateStackEffect(String),

    #[error("Unknown opcode {0}")]
    UnknownName(String),
    #[error("Unknown opcode code {0}")]
    UnknownCode(CodeType),
    #[error("No stack effect is defined for {0}")]
    UnknownStackEffect(String),
    #[error("Unknown sub-operation {name} of {carrier}")]
    UnknownSubOperation { carrier: String, name: String },
    #[error("Unknown selector {selector} of {carrier}")]
    UnknownSelector { carrier: String, selector: u32 },
    #[error("Stack effect of {name} with argument {arg} doesn't fit into an i32")]
    EffectOutOfRange { name: String, arg: u32 },
}

impl Error {
    /// Registration errors can only happen while the table is being built
    pub fn is_registration_conflict(&self) -> bool {
        !self.is_lookup_miss() && !matches!(self, Error::EffectOutOfRange { .. })
    }

    pub fn is_lookup_miss(&self) -> bool {
        matches!(
            self,
            Error::UnknownName(_)
                | Error::UnknownCode(_)
                | Error::UnknownStackEffect(_)
                | Error::UnknownSubOperation { .. }
                | Error::UnknownSelector { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
