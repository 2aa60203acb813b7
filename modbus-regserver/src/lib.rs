//! Modbus server exposing configurable holding and input registers.
//!
//! Each configured server owns a register engine and serves it over a
//! serial line (RTU) or a TCP listener.
//!
//! # Configuration
//!
//! ```text
//! servers: [
//!   {
//!     name: "pump-skid",
//!     station_address: 1,
//!     transport: { type: "rtu", port: "/dev/ttyUSB0", baud_rate: 9600 },
//!     holding_registers: [
//!       { start_address: 0, number: 10, on_write: { type: "clamp", min: 0, max: 100 } },
//!     ],
//!     input_registers: [ { start_address: 100, on_read: { type: "uptime" } } ],
//!   },
//! ]
//! ```

pub mod config;
pub mod presets;
pub mod service;
pub mod transport;
