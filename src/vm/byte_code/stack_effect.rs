//! Static stack effects.
//!
//! The effect of an instruction is the net number of operand stack slots it adds
//! (positive) or removes (negative). It's either a constant or a small closed-form
//! function of the decoded argument and, for branching instructions, of the branch outcome.
use super::error::{Error, Result};
use super::registry::Registry;
use super::{CodeType, Oparg};
use crate::vm::settings::Settings;
use std::convert::TryFrom;
use std::fmt;

/// The outcome of a branch, as far as a stack effect is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    /// The instruction doesn't branch or the outcome doesn't matter
    NotApplicable,
    /// Execution continues with the next instruction
    NotTaken,
    /// Execution continues at the jump target
    Taken,
}

impl Branch {
    #[inline]
    pub fn is_taken(self) -> bool {
        self == Branch::Taken
    }
}

impl From<bool> for Branch {
    fn from(taken: bool) -> Self {
        if taken {
            Branch::Taken
        } else {
            Branch::NotTaken
        }
    }
}

impl From<Option<bool>> for Branch {
    fn from(taken: Option<bool>) -> Self {
        taken.map_or(Branch::NotApplicable, Branch::from)
    }
}

/// What an effect rule may consult besides its argument
pub struct EffectContext<'a> {
    pub settings: &'a Settings,
    pub registry: &'a Registry,
}

/// Rules compute in `i64` so that no 32-bit argument can overflow them
pub type EffectFn = fn(Oparg, Branch, &EffectContext<'_>) -> Result<i64>;

#[derive(Clone, Copy)]
pub enum StackEffect {
    /// The effect is the same regardless of argument and branch
    Constant(i32),
    /// The effect is computed from argument and branch
    Computed(EffectFn),
}

impl StackEffect {
    pub fn evaluate(
        &self,
        arg: Oparg,
        branch: Branch,
        context: &EffectContext<'_>,
    ) -> Result<i64> {
        match self {
            StackEffect::Constant(effect) => Ok(i64::from(*effect)),
            StackEffect::Computed(rule) => rule(arg, branch, context),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, StackEffect::Constant(_))
    }
}

impl fmt::Debug for StackEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackEffect::Constant(effect) => write!(f, "Constant({})", effect),
            StackEffect::Computed(_) => f.write_str("Computed"),
        }
    }
}

impl Registry {
    /// The net stack effect of executing `name` with `arg`.
    ///
    /// Instructions that don't look at their argument or branch outcome
    /// simply ignore them. Fails if no effect is known for `name` or if the
    /// effect of `arg` doesn't fit into an `i32`.
    pub fn stack_effect(&self, name: &str, arg: Oparg, branch: Branch) -> Result<i32> {
        let effect = self
            .stack_effect_entry(name)?
            .evaluate(arg, branch, &self.effect_context())?;

        i32::try_from(effect).map_err(|_| Error::EffectOutOfRange {
            name: name.to_string(),
            arg,
        })
    }

    pub fn stack_effect_of(&self, code: CodeType, arg: Oparg, branch: Branch) -> Result<i32> {
        let name = self.lookup_by_code(code)?;
        self.stack_effect(name, arg, branch)
    }

    /// The larger effect of both branch outcomes.
    /// This is what needs to be reserved to execute the instruction safely.
    pub fn max_stack_effect(&self, name: &str, arg: Oparg) -> Result<i32> {
        let not_taken = self.stack_effect(name, arg, Branch::NotTaken)?;
        let taken = self.stack_effect(name, arg, Branch::Taken)?;
        Ok(not_taken.max(taken))
    }

    /// The declared effect of `name`, without evaluating it
    pub fn stack_effect_entry(&self, name: &str) -> Result<&StackEffect> {
        self.effects
            .get(name)
            .ok_or_else(|| Error::UnknownStackEffect(name.to_string()))
    }

    #[inline]
    pub fn has_stack_effect(&self, name: &str) -> bool {
        self.effects.contains_key(name)
    }

    /// Opcodes that are defined without a stack effect
    pub fn missing_stack_effects(&self) -> Vec<&'static str> {
        self.iter()
            .filter(|op| !self.effects.contains_key(op.name))
            .map(|op| op.name)
            .collect()
    }

    fn effect_context(&self) -> EffectContext<'_> {
        EffectContext {
            settings: &self.settings,
            registry: self,
        }
    }
}
