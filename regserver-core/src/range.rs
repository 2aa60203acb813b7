//! A contiguous block of 16-bit registers.

use crate::error::{ConfigError, Result};
use crate::hooks::{Hook, HookKind, HookSet};

/// One past the highest register address.
pub const ADDRESS_SPACE_END: u32 = 1 << 16;

/// A fixed-size block of registers starting at `base_address`.
#[derive(Debug, Clone)]
pub struct RegisterRange {
    base_address: u16,
    default_value: u16,
    cells: Vec<u16>,
    hooks: HookSet,
}

impl RegisterRange {
    /// Create a range of `count` registers, all set to `default_value`.
    pub fn new(base_address: u16, count: u16, default_value: u16) -> Result<Self> {
        if count == 0 {
            return Err(ConfigError::EmptyRange {
                start: base_address,
            });
        }
        if base_address as u32 + count as u32 > ADDRESS_SPACE_END {
            return Err(ConfigError::AddressOverflow {
                start: base_address,
                count,
            });
        }

        Ok(Self {
            base_address,
            default_value,
            cells: vec![default_value; count as usize],
            hooks: HookSet::default(),
        })
    }

    /// Attach a read hook.
    pub fn with_read_hook(mut self, hook: Hook) -> Self {
        self.hooks.set(HookKind::Read, hook);
        self
    }

    /// Attach a write hook.
    pub fn with_write_hook(mut self, hook: Hook) -> Self {
        self.hooks.set(HookKind::Write, hook);
        self
    }

    pub fn base_address(&self) -> u16 {
        self.base_address
    }

    pub fn count(&self) -> u16 {
        self.cells.len() as u16
    }

    pub fn default_value(&self) -> u16 {
        self.default_value
    }

    /// Exclusive end address, widened so a range ending at 65535 is representable.
    pub fn end(&self) -> u32 {
        self.base_address as u32 + self.cells.len() as u32
    }

    /// Whether `address` falls inside this range.
    pub fn contains(&self, address: u16) -> bool {
        address >= self.base_address && (address as u32) < self.end()
    }

    /// Whether this range and `other` share any address.
    pub fn overlaps(&self, other: &RegisterRange) -> bool {
        (self.base_address as u32) < other.end() && (other.base_address as u32) < self.end()
    }

    /// Stored value at `offset`.
    ///
    /// Panics if `offset >= count`; callers resolve offsets through the
    /// register space first.
    pub fn get(&self, offset: u16) -> u16 {
        self.cells[offset as usize]
    }

    /// Store `value` at `offset`. Same precondition as [`get`](Self::get).
    pub fn set(&mut self, offset: u16, value: u16) {
        self.cells[offset as usize] = value;
    }

    /// Stored values for `quantity` registers from `offset`.
    pub fn cells(&self, offset: u16, quantity: u16) -> &[u16] {
        let start = offset as usize;
        &self.cells[start..start + quantity as usize]
    }

    pub fn hooks(&self) -> &HookSet {
        &self.hooks
    }

    pub(crate) fn hooks_mut(&mut self) -> &mut HookSet {
        &mut self.hooks
    }
}
