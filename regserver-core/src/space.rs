//! Register spaces: non-overlapping ranges indexed by base address.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AddressError, ConfigError, HookError, Result};
use crate::hooks::{Hook, HookKind, HookRunner};
use crate::range::RegisterRange;

/// Modbus register tables served by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterKind {
    /// Read/write from the bus.
    Holding,
    /// Read-only from the bus.
    Input,
}

impl RegisterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterKind::Holding => "holding",
            RegisterKind::Input => "input",
        }
    }
}

/// Failure of a span access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    Address(AddressError),
    Hook(HookError),
}

impl From<AddressError> for AccessError {
    fn from(e: AddressError) -> Self {
        AccessError::Address(e)
    }
}

impl From<HookError> for AccessError {
    fn from(e: HookError) -> Self {
        AccessError::Hook(e)
    }
}

/// Serializable view of one range and its stored values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSnapshot {
    pub kind: RegisterKind,
    pub start_address: u16,
    pub count: u16,
    pub default: u16,
    pub on_read: bool,
    pub on_write: bool,
    pub values: Vec<u16>,
}

/// A set of register ranges of one kind.
#[derive(Debug, Clone)]
pub struct RegisterSpace {
    kind: RegisterKind,
    ranges: BTreeMap<u16, RegisterRange>,
}

impl RegisterSpace {
    pub fn new(kind: RegisterKind) -> Self {
        Self {
            kind,
            ranges: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> RegisterKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Ranges in address order.
    pub fn ranges(&self) -> impl Iterator<Item = &RegisterRange> {
        self.ranges.values()
    }

    /// Add a range, rejecting any overlap with existing ones.
    pub fn register_range(&mut self, range: RegisterRange) -> Result<()> {
        // Only the nearest neighbours on either side can intersect.
        let before = self.ranges.range(..=range.base_address()).next_back();
        let after = self.ranges.range(range.base_address()..).next();

        for (_, existing) in before.into_iter().chain(after) {
            if existing.overlaps(&range) {
                return Err(ConfigError::OverlappingRange {
                    start: range.base_address(),
                    count: range.count(),
                    existing_start: existing.base_address(),
                    existing_count: existing.count(),
                });
            }
        }

        tracing::debug!(
            kind = self.kind.as_str(),
            start = range.base_address(),
            count = range.count(),
            "Registered range"
        );
        self.ranges.insert(range.base_address(), range);
        Ok(())
    }

    /// Attach a hook to the range that starts at `start`.
    pub fn attach_hook(&mut self, start: u16, kind: HookKind, hook: Hook) -> Result<()> {
        let range = self
            .ranges
            .get_mut(&start)
            .ok_or(ConfigError::UnknownRange { start })?;
        range.hooks_mut().set(kind, hook);
        Ok(())
    }

    pub fn attach_read_hook(&mut self, start: u16, hook: Hook) -> Result<()> {
        self.attach_hook(start, HookKind::Read, hook)
    }

    pub fn attach_write_hook(&mut self, start: u16, hook: Hook) -> Result<()> {
        self.attach_hook(start, HookKind::Write, hook)
    }

    /// Find the range owning `address` and the offset of `address` in it.
    pub fn resolve(
        &self,
        address: u16,
    ) -> std::result::Result<(&RegisterRange, u16), AddressError> {
        self.ranges
            .range(..=address)
            .next_back()
            .map(|(_, range)| range)
            .filter(|range| range.contains(address))
            .map(|range| (range, address - range.base_address()))
            .ok_or(AddressError::Unmapped { address })
    }

    /// Resolve `[address, address + quantity)`, which must lie in one range.
    pub fn resolve_span(
        &self,
        address: u16,
        quantity: u16,
    ) -> std::result::Result<(&RegisterRange, u16), AddressError> {
        let (range, offset) = self.resolve(address)?;
        if address as u32 + quantity as u32 > range.end() {
            return Err(AddressError::SpanCrossesBoundary { address, quantity });
        }
        Ok((range, offset))
    }

    fn resolve_span_mut(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> std::result::Result<(&mut RegisterRange, u16), AddressError> {
        let (base, offset) = {
            let (range, offset) = self.resolve_span(address, quantity)?;
            (range.base_address(), offset)
        };
        let range = self
            .ranges
            .get_mut(&base)
            .ok_or(AddressError::Unmapped { address })?;
        Ok((range, offset))
    }

    /// Raw stored value at `address`, bypassing hooks.
    pub fn peek(&self, address: u16) -> std::result::Result<u16, AddressError> {
        let (range, offset) = self.resolve(address)?;
        Ok(range.get(offset))
    }

    /// Read `quantity` registers from `address`, applying the read hook.
    ///
    /// The hook's result is reported only; stored values do not change.
    pub fn read_span(
        &self,
        address: u16,
        quantity: u16,
        runner: &HookRunner,
    ) -> std::result::Result<Vec<u16>, AccessError> {
        let (range, offset) = self.resolve_span(address, quantity)?;
        let raw = range.cells(offset, quantity);

        match range.hooks().get(HookKind::Read) {
            None => Ok(raw.to_vec()),
            Some(hook) => raw
                .iter()
                .enumerate()
                .map(|(i, &value)| {
                    runner
                        .run(HookKind::Read, hook, address + i as u16, value)
                        .map_err(AccessError::from)
                })
                .collect(),
        }
    }

    /// Write `values` starting at `address`, applying the write hook.
    ///
    /// Every hook result is computed before the first store, so an error
    /// leaves the whole span untouched.
    pub fn write_span(
        &mut self,
        address: u16,
        values: &[u16],
        runner: &HookRunner,
    ) -> std::result::Result<(), AccessError> {
        let quantity = u16::try_from(values.len()).map_err(|_| {
            AccessError::Address(AddressError::SpanCrossesBoundary {
                address,
                quantity: u16::MAX,
            })
        })?;
        let (range, offset) = self.resolve_span_mut(address, quantity)?;

        let stored: Vec<u16> = match range.hooks().get(HookKind::Write) {
            None => values.to_vec(),
            Some(hook) => values
                .iter()
                .enumerate()
                .map(|(i, &value)| runner.run(HookKind::Write, hook, address + i as u16, value))
                .collect::<std::result::Result<_, _>>()?,
        };

        for (i, value) in stored.into_iter().enumerate() {
            range.set(offset + i as u16, value);
        }
        Ok(())
    }

    /// Store raw values from local application code, bypassing hooks.
    pub fn store(&mut self, address: u16, values: &[u16]) -> std::result::Result<(), AddressError> {
        let quantity = u16::try_from(values.len()).map_err(|_| {
            AddressError::SpanCrossesBoundary {
                address,
                quantity: u16::MAX,
            }
        })?;
        let (range, offset) = self.resolve_span_mut(address, quantity)?;
        for (i, &value) in values.iter().enumerate() {
            range.set(offset + i as u16, value);
        }
        Ok(())
    }

    /// Snapshot every range with its stored values.
    pub fn snapshot(&self) -> Vec<RangeSnapshot> {
        self.ranges
            .values()
            .map(|range| RangeSnapshot {
                kind: self.kind,
                start_address: range.base_address(),
                count: range.count(),
                default: range.default_value(),
                on_read: range.hooks().on_read.is_some(),
                on_write: range.hooks().on_write.is_some(),
                values: range.cells(0, range.count()).to_vec(),
            })
            .collect()
    }
}
