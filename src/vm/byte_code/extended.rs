//! Extended sub-operations.
//!
//! Some opcodes multiplex a family of specialized behaviors through their argument.
//! The opcode byte selects the carrier, the argument selects the sub-operation.
//! Each carrier owns its own selector namespace.
use super::error::{Error, Result};
use super::{CodeType, OpCode, Oparg};
use rustc_hash::FxHashMap;

pub type Selector = u8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubOperation {
    pub name: &'static str,
    pub selector: Selector,
}

/// The selector table of a single carrier
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedOps {
    carrier: OpCode,
    by_name: FxHashMap<&'static str, Selector>,
    by_selector: FxHashMap<Selector, &'static str>,
}

impl ExtendedOps {
    pub fn new(carrier: OpCode) -> Self {
        Self {
            carrier,
            by_name: FxHashMap::default(),
            by_selector: FxHashMap::default(),
        }
    }

    pub(crate) fn define(&mut self, name: &'static str, selector: u32) -> Result<()> {
        if selector > Selector::MAX as u32 {
            return Err(Error::SelectorOutOfRange {
                carrier: self.carrier.name.to_string(),
                selector,
            });
        }
        let selector = selector as Selector;

        if let Some(existing) = self.by_selector.get(&selector) {
            return Err(Error::DuplicateSelector {
                carrier: self.carrier.name.to_string(),
                selector: selector as u32,
                existing: existing.to_string(),
            });
        }

        if self.by_name.contains_key(name) {
            return Err(Error::DuplicateExtendedName {
                carrier: self.carrier.name.to_string(),
                name: name.to_string(),
            });
        }

        log::trace!("{}[{}] = {}", self.carrier.name, selector, name);
        self.by_name.insert(name, selector);
        self.by_selector.insert(selector, name);
        Ok(())
    }

    #[inline]
    pub fn carrier(&self) -> &OpCode {
        &self.carrier
    }

    #[inline]
    pub fn carrier_code(&self) -> CodeType {
        self.carrier.code
    }

    pub fn selector(&self, name: &str) -> Result<Selector> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownSubOperation {
                carrier: self.carrier.name.to_string(),
                name: name.to_string(),
            })
    }

    /// Resolve the sub-operation selected by an instruction argument
    pub fn name(&self, arg: Oparg) -> Result<&'static str> {
        let unknown = || Error::UnknownSelector {
            carrier: self.carrier.name.to_string(),
            selector: arg,
        };

        if arg > Selector::MAX as Oparg {
            return Err(unknown());
        }

        self.by_selector
            .get(&(arg as Selector))
            .copied()
            .ok_or_else(unknown)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// All sub-operations ordered by selector
    pub fn iter(&self) -> impl Iterator<Item = SubOperation> {
        let mut ops: Vec<SubOperation> = self
            .by_selector
            .iter()
            .map(|(selector, name)| SubOperation {
                name: *name,
                selector: *selector,
            })
            .collect();
        ops.sort_by_key(|op| op.selector);
        ops.into_iter()
    }
}
