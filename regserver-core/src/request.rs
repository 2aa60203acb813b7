//! Decoded requests and replies exchanged with the transport.

use serde::{Deserialize, Serialize};

/// Largest quantity a single read request may ask for.
pub const MAX_READ_QUANTITY: u16 = 125;

/// Largest quantity a single write-multiple request may carry.
pub const MAX_WRITE_QUANTITY: u16 = 123;

/// Register function codes understood by the server core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    /// 0x03
    ReadHolding,
    /// 0x04
    ReadInput,
    /// 0x06
    WriteHolding,
    /// 0x10
    WriteMultipleHolding,
    /// Anything else the transport decoded.
    Unsupported(u8),
}

impl FunctionCode {
    /// Wire value of this function code.
    pub fn value(self) -> u8 {
        match self {
            FunctionCode::ReadHolding => 0x03,
            FunctionCode::ReadInput => 0x04,
            FunctionCode::WriteHolding => 0x06,
            FunctionCode::WriteMultipleHolding => 0x10,
            FunctionCode::Unsupported(code) => code,
        }
    }
}

impl From<u8> for FunctionCode {
    fn from(code: u8) -> Self {
        match code {
            0x03 => FunctionCode::ReadHolding,
            0x04 => FunctionCode::ReadInput,
            0x06 => FunctionCode::WriteHolding,
            0x10 => FunctionCode::WriteMultipleHolding,
            other => FunctionCode::Unsupported(other),
        }
    }
}

/// A request already decoded from its frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ReadHolding { address: u16, quantity: u16 },
    ReadInput { address: u16, quantity: u16 },
    WriteHolding { address: u16, value: u16 },
    WriteMultipleHolding { address: u16, values: Vec<u16> },
    Unsupported(u8),
}

impl Request {
    /// Function code of this request.
    pub fn function_code(&self) -> FunctionCode {
        match self {
            Request::ReadHolding { .. } => FunctionCode::ReadHolding,
            Request::ReadInput { .. } => FunctionCode::ReadInput,
            Request::WriteHolding { .. } => FunctionCode::WriteHolding,
            Request::WriteMultipleHolding { .. } => FunctionCode::WriteMultipleHolding,
            Request::Unsupported(code) => FunctionCode::Unsupported(*code),
        }
    }

    /// Whether serving this request mutates register state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Request::WriteHolding { .. } | Request::WriteMultipleHolding { .. }
        )
    }
}

/// A successful reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Values for a read request, one per requested register.
    Registers(Vec<u16>),
    /// Echo of a single register write.
    WriteSingle { address: u16, value: u16 },
    /// Echo of a multiple register write.
    WriteMultiple { address: u16, quantity: u16 },
}

/// Modbus exception codes the core can answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
}

impl ExceptionCode {
    /// Wire value of the exception.
    pub fn code(self) -> u8 {
        match self {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::ServerDeviceFailure => 0x04,
        }
    }
}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExceptionCode::IllegalFunction => "illegal function",
            ExceptionCode::IllegalDataAddress => "illegal data address",
            ExceptionCode::IllegalDataValue => "illegal data value",
            ExceptionCode::ServerDeviceFailure => "server device failure",
        };
        write!(f, "{} (0x{:02X})", name, self.code())
    }
}
