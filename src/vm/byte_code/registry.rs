//! The `Registry` is the single source of truth about the instruction set.
//!
//! It maps opcode names to their numeric codes and back, knows how the argument of each
//! opcode is to be interpreted, which sub-operations are multiplexed through carrier
//! opcodes and what effect every instruction has on the depth of the operand stack.
//!
//! A `Registry` is immutable. It's assembled exactly once with a `RegistryBuilder`,
//! which validates every definition as it is made, and then shared read-only by everything
//! that encodes, decodes or analyses byte code.

use super::error::{Error, Result};
use super::extended::ExtendedOps;
use super::operand::{OperandKind, OperandKinds};
use super::stack_effect::StackEffect;
use super::{CodeType, OpCode, HAVE_ARGUMENT};
use crate::vm::settings::Settings;
use rustc_hash::FxHashMap;

const CODE_SPACE: usize = 256;

#[derive(Debug, Clone)]
pub struct Registry {
    by_name: FxHashMap<&'static str, CodeType>,
    by_code: Vec<Option<OpCode>>,
    extended: FxHashMap<CodeType, ExtendedOps>,
    pub(super) effects: FxHashMap<&'static str, StackEffect>,
    pub(super) settings: Settings,
}

impl Registry {
    fn new(settings: Settings) -> Self {
        Self {
            by_name: FxHashMap::default(),
            by_code: vec![None; CODE_SPACE],
            extended: FxHashMap::default(),
            effects: FxHashMap::default(),
            settings,
        }
    }

    pub fn builder(settings: Settings) -> RegistryBuilder {
        RegistryBuilder::new(settings)
    }

    pub fn lookup_by_name(&self, name: &str) -> Result<CodeType> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownName(name.to_string()))
    }

    pub fn lookup_by_code(&self, code: CodeType) -> Result<&'static str> {
        self.opcode(code).map(|op| op.name)
    }

    pub fn get(&self, name: &str) -> Result<&OpCode> {
        let code = self.lookup_by_name(name)?;
        self.opcode(code)
    }

    pub fn opcode(&self, code: CodeType) -> Result<&OpCode> {
        self.by_code[code as usize]
            .as_ref()
            .ok_or(Error::UnknownCode(code))
    }

    /// The operand kinds of the opcode. The set is empty for opcodes
    /// whose argument is a plain count or flag word.
    pub fn classify(&self, code: CodeType) -> Result<OperandKinds> {
        self.opcode(code).map(|op| op.kinds)
    }

    #[inline]
    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    #[inline]
    pub fn contains_code(&self, code: CodeType) -> bool {
        self.by_code[code as usize].is_some()
    }

    /// All opcodes ordered by code
    pub fn iter(&self) -> impl Iterator<Item = &OpCode> {
        self.by_code.iter().filter_map(|op| op.as_ref())
    }

    /// All opcodes that belong to the given operand kind, ordered by code
    pub fn with_kind(&self, kind: OperandKind) -> Vec<CodeType> {
        self.iter()
            .filter(|op| op.kinds.contains(kind))
            .map(|op| op.code)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// The sub-operation table of a carrier opcode
    pub fn extended(&self, carrier: &str) -> Result<&ExtendedOps> {
        let code = self.lookup_by_name(carrier)?;
        self.extended
            .get(&code)
            .ok_or_else(|| Error::UnknownCarrier(carrier.to_string()))
    }

    pub fn extended_by_code(&self, code: CodeType) -> Option<&ExtendedOps> {
        self.extended.get(&code)
    }

    pub fn carriers(&self) -> impl Iterator<Item = &ExtendedOps> {
        let mut carriers: Vec<&ExtendedOps> = self.extended.values().collect();
        carriers.sort_by_key(|ops| ops.carrier_code());
        carriers.into_iter()
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

/// Assembles a `Registry`.
///
/// Every definition is checked on the spot. Any conflict is reported as an error and
/// should be treated as fatal by the caller.
#[derive(Debug)]
pub struct RegistryBuilder {
    registry: Registry,
}

impl RegistryBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            registry: Registry::new(settings),
        }
    }

    pub fn define(&mut self, name: &'static str, code: u32) -> Result<&mut Self> {
        self.insert(name, code, None)?;
        Ok(self)
    }

    /// Define an opcode whose argument indexes the name table
    pub fn define_with_name_argument(&mut self, name: &'static str, code: u32) -> Result<&mut Self> {
        self.insert(name, code, Some(OperandKind::Name))?;
        Ok(self)
    }

    /// Define an opcode whose argument indexes the constant pool
    pub fn define_constant(&mut self, name: &'static str, code: u32) -> Result<&mut Self> {
        self.insert(name, code, Some(OperandKind::Constant))?;
        Ok(self)
    }

    /// Define an opcode whose argument is a local variable slot
    pub fn define_local(&mut self, name: &'static str, code: u32) -> Result<&mut Self> {
        self.insert(name, code, Some(OperandKind::Local))?;
        Ok(self)
    }

    /// Define an opcode whose argument indexes the cell and free variables
    pub fn define_free(&mut self, name: &'static str, code: u32) -> Result<&mut Self> {
        self.insert(name, code, Some(OperandKind::Free))?;
        Ok(self)
    }

    pub fn define_compare(&mut self, name: &'static str, code: u32) -> Result<&mut Self> {
        self.insert(name, code, Some(OperandKind::Compare))?;
        Ok(self)
    }

    /// Define a jump whose argument is an offset from the following instruction
    pub fn define_relative_jump(&mut self, name: &'static str, code: u32) -> Result<&mut Self> {
        self.insert(name, code, Some(OperandKind::RelativeJump))?;
        Ok(self)
    }

    /// Define a jump whose argument is the destination offset
    pub fn define_absolute_jump(&mut self, name: &'static str, code: u32) -> Result<&mut Self> {
        self.insert(name, code, Some(OperandKind::AbsoluteJump))?;
        Ok(self)
    }

    /// Add an operand kind to an already defined opcode
    pub fn mark(&mut self, name: &str, kind: OperandKind) -> Result<&mut Self> {
        let code = self.registry.lookup_by_name(name)?;
        self.classify(code, kind)?;
        Ok(self)
    }

    /// Register the sub-operation `name` under `carrier`, selected by `selector`
    pub fn define_extended_op(
        &mut self,
        carrier: &str,
        name: &'static str,
        selector: u32,
    ) -> Result<&mut Self> {
        let carrier_code = self
            .registry
            .lookup_by_name(carrier)
            .map_err(|_| Error::UnknownCarrier(carrier.to_string()))?;
        let carrier_op = *self.registry.opcode(carrier_code)?;

        if !carrier_op.has_argument() {
            return Err(Error::CarrierWithoutArgument(carrier.to_string()));
        }

        self.registry
            .extended
            .entry(carrier_code)
            .or_insert_with(|| ExtendedOps::new(carrier_op))
            .define(name, selector)?;

        Ok(self)
    }

    /// Declare the stack effect of an instruction.
    /// Pseudo instructions, that never make it into the encoded byte code,
    /// may have an effect without being defined as an opcode.
    pub fn effect(&mut self, name: &'static str, effect: StackEffect) -> Result<&mut Self> {
        if self.registry.effects.contains_key(name) {
            return Err(Error::DuplicateStackEffect(name.to_string()));
        }

        log::trace!("stack effect {} = {:?}", name, effect);
        self.registry.effects.insert(name, effect);
        Ok(self)
    }

    pub fn build(self) -> Registry {
        let registry = self.registry;

        for op in registry.iter() {
            if !registry.effects.contains_key(op.name) {
                log::warn!("opcode {} has no stack effect", op.name);
            }
        }

        log::debug!(
            "opcode registry built: {} opcodes, {} carriers, {} stack effects",
            registry.len(),
            registry.extended.len(),
            registry.effects.len()
        );

        registry
    }

    fn insert(&mut self, name: &'static str, code: u32, kind: Option<OperandKind>) -> Result<()> {
        if code as usize >= CODE_SPACE {
            return Err(Error::CodeOutOfRange {
                name: name.to_string(),
                code,
            });
        }
        let code = code as CodeType;

        if self.registry.by_name.contains_key(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }

        if let Some(existing) = &self.registry.by_code[code as usize] {
            return Err(Error::DuplicateCode {
                name: name.to_string(),
                code,
                existing: existing.name.to_string(),
            });
        }

        if kind.is_some() && code < HAVE_ARGUMENT {
            return Err(Error::MissingArgument {
                name: name.to_string(),
                code,
            });
        }

        log::trace!("define {} = {}", name, code);
        self.registry.by_name.insert(name, code);
        self.registry.by_code[code as usize] = Some(OpCode::new(name, code));

        match kind {
            Some(kind) => self.classify(code, kind),
            None => Ok(()),
        }
    }

    fn classify(&mut self, code: CodeType, kind: OperandKind) -> Result<()> {
        let op = self.registry.by_code[code as usize]
            .as_mut()
            .ok_or(Error::UnknownCode(code))?;

        if !op.has_argument() {
            return Err(Error::MissingArgument {
                name: op.name.to_string(),
                code,
            });
        }

        if kind.is_jump() && op.kinds.jump().map_or(false, |existing| existing != kind) {
            return Err(Error::ConflictingJumpKind(op.name.to_string()));
        }

        op.kinds.insert(kind);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> RegistryBuilder {
        RegistryBuilder::new(Settings::default())
    }

    #[test]
    fn define_registers_both_directions() {
        let mut b = builder();
        b.define("POP", 1).unwrap().define("PUSH", 100).unwrap();
        let registry = b.build();

        assert_eq!(registry.lookup_by_name("POP"), Ok(1));
        assert_eq!(registry.lookup_by_code(100), Ok("PUSH"));
        assert!(!registry.get("POP").unwrap().has_argument());
        assert!(registry.get("PUSH").unwrap().has_argument());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn define_rejects_duplicates() {
        let mut b = builder();
        b.define("POP", 1).unwrap();

        assert_matches!(b.define("POP", 2), Err(Error::DuplicateName(_)));
        assert_matches!(
            b.define("DROP", 1),
            Err(Error::DuplicateCode { code: 1, .. })
        );
    }

    #[test]
    fn define_rejects_codes_out_of_range() {
        assert_matches!(
            builder().define("BIG", 256),
            Err(Error::CodeOutOfRange { code: 256, .. })
        );
        assert!(builder().define("EDGE", 255).is_ok());
    }

    #[test]
    fn operand_kinds_require_an_argument() {
        assert_matches!(
            builder().define_with_name_argument("LOAD", 89),
            Err(Error::MissingArgument { code: 89, .. })
        );
        assert_matches!(
            builder().define_relative_jump("JUMP", 10),
            Err(Error::MissingArgument { .. })
        );
        assert!(builder().define_absolute_jump("JUMP", 90).is_ok());
    }

    #[test]
    fn jump_kinds_are_exclusive() {
        let mut b = builder();
        b.define_relative_jump("JUMP", 110).unwrap();

        assert_matches!(
            b.mark("JUMP", OperandKind::AbsoluteJump),
            Err(Error::ConflictingJumpKind(_))
        );
        assert!(b.mark("JUMP", OperandKind::RelativeJump).is_ok());
    }

    #[test]
    fn mark_adds_kinds() {
        let mut b = builder();
        b.define("LOAD_CONST", 100).unwrap();
        b.mark("LOAD_CONST", OperandKind::Constant).unwrap();
        let registry = b.build();

        assert_eq!(
            registry.classify(100),
            Ok(OperandKinds::of(OperandKind::Constant))
        );
        assert_eq!(registry.with_kind(OperandKind::Constant), vec![100]);
    }

    #[test]
    fn extended_ops_need_an_argument_bearing_carrier() {
        let mut b = builder();
        b.define("NOP", 9).unwrap().define("MULTI", 140).unwrap();

        assert_matches!(
            b.define_extended_op("NOPE", "ADD", 0),
            Err(Error::UnknownCarrier(_))
        );
        assert_matches!(
            b.define_extended_op("NOP", "ADD", 0),
            Err(Error::CarrierWithoutArgument(_))
        );

        b.define_extended_op("MULTI", "ADD", 0).unwrap();
        assert_matches!(
            b.define_extended_op("MULTI", "SUB", 0),
            Err(Error::DuplicateSelector { .. })
        );

        let registry = b.build();
        assert_eq!(registry.extended("MULTI").unwrap().name(0), Ok("ADD"));
        assert_matches!(registry.extended("NOP"), Err(Error::UnknownCarrier(_)));
        assert!(registry.extended_by_code(140).is_some());
    }

    #[test]
    fn effects_are_declared_once() {
        let mut b = builder();
        b.effect("NOP", StackEffect::Constant(0)).unwrap();

        assert_matches!(
            b.effect("NOP", StackEffect::Constant(1)),
            Err(Error::DuplicateStackEffect(_))
        );
    }

    #[test]
    fn lookups_fail_for_unknown_entries() {
        let registry = builder().build();

        assert_matches!(registry.lookup_by_name("NOPE"), Err(Error::UnknownName(_)));
        assert_matches!(registry.lookup_by_code(7), Err(Error::UnknownCode(7)));
        assert_matches!(registry.classify(7), Err(Error::UnknownCode(7)));
        assert!(!registry.contains_code(7));
        assert!(!registry.contains_name("NOPE"));
        assert!(registry.is_empty());
    }
}
