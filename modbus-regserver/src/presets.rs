//! Turning configured hook presets and ranges into a server core.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Instant;

use regserver_core::{Hook, ModbusServerCore, RangeSpec, hook};

use crate::config::{ConfigError, HookPreset, RangeConfig, ServerConfig};

/// Compile a preset into a hook.
///
/// `started` is the process start time used by [`HookPreset::Uptime`].
pub fn compile(preset: &HookPreset, started: Instant) -> Hook {
    match *preset {
        HookPreset::Clamp { min, max } => hook(move |_, value| value.max(min).min(max)),
        HookPreset::Offset { value: delta } => {
            hook(move |_, value| (value as i64 + delta as i64).rem_euclid(1 << 16) as u16)
        }
        HookPreset::Scale {
            numerator,
            denominator,
        } => hook(move |_, value| {
            let scaled = value as u64 * numerator as u64 / denominator.max(1) as u64;
            scaled.min(u16::MAX as u64) as u16
        }),
        HookPreset::Constant { value: constant } => hook(move |_, _| constant),
        HookPreset::Mask { and, or } => hook(move |_, value| (value & and) | or),
        HookPreset::Counter => {
            let reads = Arc::new(AtomicU16::new(0));
            hook(move |_, _| reads.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
        }
        HookPreset::Uptime => hook(move |_, _| started.elapsed().as_secs() as u16),
    }
}

fn range_spec(range: &RangeConfig, started: Instant) -> RangeSpec {
    let mut spec = RangeSpec::new(range.start_address, range.number).with_default(range.default);
    if let Some(preset) = &range.on_read {
        spec = spec.on_read(compile(preset, started));
    }
    if let Some(preset) = &range.on_write {
        spec = spec.on_write(compile(preset, started));
    }
    spec
}

impl ServerConfig {
    /// Build the register engine described by this server entry.
    pub fn build_core(&self, started: Instant) -> Result<ModbusServerCore, ConfigError> {
        let mut builder =
            ModbusServerCore::builder(self.station_address).hook_budget(self.hook_budget());

        for range in &self.holding_registers {
            builder = builder.holding(range_spec(range, started));
        }
        for range in &self.input_registers {
            builder = builder.input(range_spec(range, started));
        }

        builder.build().map_err(|source| ConfigError::Layout {
            server: self.name.clone(),
            source,
        })
    }
}
