//! Error types for register space construction and request handling.

use thiserror::Error;

use crate::request::ExceptionCode;

/// Errors raised while building register spaces.
///
/// These are fatal: a server with an invalid register layout never starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A range was declared with zero registers.
    #[error("Register range at {start} must contain at least one register")]
    EmptyRange { start: u16 },

    /// A range runs past the end of the 16-bit address space.
    #[error("Register range at {start} with {count} registers exceeds address 65535")]
    AddressOverflow { start: u16, count: u16 },

    /// A range intersects one that is already registered.
    #[error(
        "Register range [{start}, {}) overlaps existing range [{existing_start}, {})",
        span_end(.start, .count),
        span_end(.existing_start, .existing_count)
    )]
    OverlappingRange {
        start: u16,
        count: u16,
        existing_start: u16,
        existing_count: u16,
    },

    /// A hook was attached to a start address that begins no range.
    #[error("No register range starts at address {start}")]
    UnknownRange { start: u16 },

    /// The station address is outside the unicast range 1-247.
    #[error("Station address {0} is invalid (use 1-247)")]
    InvalidStation(u16),
}

fn span_end(start: &u16, count: &u16) -> u32 {
    *start as u32 + *count as u32
}

/// Per-request address resolution failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AddressError {
    /// No configured range covers the address.
    #[error("Address {address} is not mapped")]
    Unmapped { address: u16 },

    /// The span starts inside a range but does not end inside it.
    #[error("Span of {quantity} registers at {address} crosses a range boundary")]
    SpanCrossesBoundary { address: u16, quantity: u16 },
}

/// A hook failed while servicing a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("Hook for address {address} panicked: {message}")]
    Panicked { address: u16, message: String },
}

impl From<AddressError> for ExceptionCode {
    fn from(_: AddressError) -> Self {
        ExceptionCode::IllegalDataAddress
    }
}

impl From<HookError> for ExceptionCode {
    fn from(_: HookError) -> Self {
        ExceptionCode::ServerDeviceFailure
    }
}

/// Result type alias for construction-time operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
