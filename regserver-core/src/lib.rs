//! Register engine for a Modbus server.
//!
//! This crate models the address space a Modbus server exposes and serves
//! already-decoded register requests against it:
//!
//! - [`range`] - `RegisterRange`, a fixed block of 16-bit cells
//! - [`space`] - `RegisterSpace`, non-overlapping ranges with span resolution
//! - [`hooks`] - read/write hooks and their panic-isolating runner
//! - [`request`] - decoded requests, replies and exception codes
//! - [`server`] - `ModbusServerCore`, request dispatch and station filtering
//! - [`error`] - error types
//!
//! Framing, CRCs and the serial line are left to the transport.

pub mod error;
pub mod hooks;
pub mod range;
pub mod request;
pub mod server;
pub mod space;

pub use error::{AddressError, ConfigError, HookError, Result};
pub use hooks::{Hook, HookKind, HookRunner, HookSet, hook};
pub use range::RegisterRange;
pub use request::{ExceptionCode, FunctionCode, Reply, Request};
pub use server::{
    BROADCAST_UNIT, Delivery, ModbusServerCore, RangeSpec, ServerCoreBuilder, ServerSnapshot,
};
pub use space::{AccessError, RangeSnapshot, RegisterKind, RegisterSpace};
