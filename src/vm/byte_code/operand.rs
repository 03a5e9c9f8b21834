//! Operand kinds describe how the raw argument of an instruction has to be interpreted.
//!
//! An opcode may belong to several kinds, with the exception of the two jump kinds,
//! which are mutually exclusive.

use super::Oparg;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("{0} is not a valid comparison operator")]
    InvalidComparison(Oparg),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperandKind {
    /// index into the constant pool
    Constant = 0x01,
    /// index into the local variable slots
    Local = 0x02,
    /// index into the cell and free variable list
    Free = 0x04,
    /// index into the name table
    Name = 0x08,
    /// comparison operator enumerant
    Compare = 0x10,
    /// offset relative to the following instruction
    RelativeJump = 0x20,
    /// destination offset from the beginning of the code
    AbsoluteJump = 0x40,
}

impl OperandKind {
    pub const ALL: [OperandKind; 7] = [
        OperandKind::Constant,
        OperandKind::Local,
        OperandKind::Free,
        OperandKind::Name,
        OperandKind::Compare,
        OperandKind::RelativeJump,
        OperandKind::AbsoluteJump,
    ];

    #[inline]
    fn bit(self) -> u8 {
        self as u8
    }

    pub fn is_jump(self) -> bool {
        matches!(self, OperandKind::RelativeJump | OperandKind::AbsoluteJump)
    }
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperandKind::Constant => "const",
            OperandKind::Local => "local",
            OperandKind::Free => "free",
            OperandKind::Name => "name",
            OperandKind::Compare => "compare",
            OperandKind::RelativeJump => "jrel",
            OperandKind::AbsoluteJump => "jabs",
        };

        f.write_str(name)
    }
}

/// A small set of `OperandKind`s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OperandKinds(u8);

impl OperandKinds {
    pub const fn empty() -> Self {
        OperandKinds(0)
    }

    pub fn of(kind: OperandKind) -> Self {
        OperandKinds(kind.bit())
    }

    #[inline]
    pub fn contains(&self, kind: OperandKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn insert(&mut self, kind: OperandKind) {
        self.0 |= kind.bit();
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_jump(&self) -> bool {
        self.contains(OperandKind::RelativeJump) || self.contains(OperandKind::AbsoluteJump)
    }

    /// The jump kind of this set, if any
    pub fn jump(&self) -> Option<OperandKind> {
        if self.contains(OperandKind::RelativeJump) {
            Some(OperandKind::RelativeJump)
        } else if self.contains(OperandKind::AbsoluteJump) {
            Some(OperandKind::AbsoluteJump)
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = OperandKind> + '_ {
        OperandKind::ALL
            .iter()
            .copied()
            .filter(move |k| self.contains(*k))
    }
}

impl fmt::Display for OperandKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<String> = self.iter().map(|k| k.to_string()).collect();
        f.write_str(&kinds.join(","))
    }
}

/// The comparison selected by the argument of `COMPARE_OP`.
/// The discriminants are the argument values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Lt = 0,
    Le = 1,
    Eq = 2,
    Ne = 3,
    Gt = 4,
    Ge = 5,
    In = 6,
    NotIn = 7,
    Is = 8,
    IsNot = 9,
    ExceptionMatch = 10,
    Bad = 11,
}

impl CompareOp {
    const ALL: [CompareOp; 12] = [
        CompareOp::Lt,
        CompareOp::Le,
        CompareOp::Eq,
        CompareOp::Ne,
        CompareOp::Gt,
        CompareOp::Ge,
        CompareOp::In,
        CompareOp::NotIn,
        CompareOp::Is,
        CompareOp::IsNot,
        CompareOp::ExceptionMatch,
        CompareOp::Bad,
    ];

    pub fn from_arg(arg: Oparg) -> Result<Self, Error> {
        Self::ALL
            .get(arg as usize)
            .copied()
            .ok_or(Error::InvalidComparison(arg))
    }

    #[inline]
    pub fn as_arg(self) -> Oparg {
        self as Oparg
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
            CompareOp::ExceptionMatch => "exception match",
            CompareOp::Bad => "BAD",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Flags carried by the argument of `FORMAT_VALUE`
pub struct FormatValue;

impl FormatValue {
    pub const CONVERSION_MASK: Oparg = 0x3;
    pub const CONVERSION_NONE: Oparg = 0x0;
    pub const CONVERSION_STR: Oparg = 0x1;
    pub const CONVERSION_REPR: Oparg = 0x2;
    pub const CONVERSION_ASCII: Oparg = 0x3;
    pub const SPEC_MASK: Oparg = 0x4;
    pub const HAVE_SPEC: Oparg = 0x4;

    /// A format spec is on the stack in addition to the value
    #[inline]
    pub fn has_spec(arg: Oparg) -> bool {
        arg & Self::SPEC_MASK == Self::HAVE_SPEC
    }

    pub fn conversion(arg: Oparg) -> Option<&'static str> {
        match arg & Self::CONVERSION_MASK {
            Self::CONVERSION_STR => Some("!s"),
            Self::CONVERSION_REPR => Some("!r"),
            Self::CONVERSION_ASCII => Some("!a"),
            _ => None,
        }
    }
}
