//! Configuration for the Modbus register server.

use regserver_common::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] regserver_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Server '{server}': {source}")]
    Layout {
        server: String,
        #[source]
        source: regserver_core::ConfigError,
    },
}

/// Complete server configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterServerConfig {
    /// Servers to run (one per serial line or TCP listener)
    pub servers: Vec<ServerConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for a single Modbus server instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server name (used in logs)
    pub name: String,

    /// Modbus station/unit address (1-247)
    pub station_address: u16,

    /// Transport the server listens on
    pub transport: TransportConfig,

    /// Time a hook may take before it is logged as slow, in milliseconds
    #[serde(default = "default_hook_budget_ms")]
    pub hook_budget_ms: u64,

    /// Holding register ranges
    #[serde(default)]
    pub holding_registers: Vec<RangeConfig>,

    /// Input register ranges
    #[serde(default)]
    pub input_registers: Vec<RangeConfig>,
}

fn default_hook_budget_ms() -> u64 {
    5
}

impl ServerConfig {
    pub fn hook_budget(&self) -> Duration {
        Duration::from_millis(self.hook_budget_ms)
    }
}

/// Transport configuration (RTU serial line or TCP listener).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Modbus RTU over a serial line
    Rtu {
        /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1")
        port: String,
        /// Baud rate (default: 9600)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Data bits (default: 8)
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        /// Parity: "none", "even", or "odd" (default: "none")
        #[serde(default = "default_parity")]
        parity: String,
        /// Stop bits: 1 or 2 (default: 1)
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
    },
    /// Modbus TCP listener
    Tcp {
        /// Socket address to bind (default: "0.0.0.0:502")
        #[serde(default = "default_bind")]
        bind: String,
    },
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

fn default_bind() -> String {
    "0.0.0.0:502".to_string()
}

/// Configuration for a range of registers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeConfig {
    /// First register address
    pub start_address: u16,

    /// Initial value of every register in the range (default: 0)
    #[serde(default)]
    pub default: u16,

    /// Number of registers (default: 1)
    #[serde(default = "default_number")]
    pub number: u16,

    /// Transform applied to values reported on read
    #[serde(default)]
    pub on_read: Option<HookPreset>,

    /// Transform applied to values before they are stored on write
    #[serde(default)]
    pub on_write: Option<HookPreset>,
}

fn default_number() -> u16 {
    1
}

/// Built-in hook behaviours selectable from the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HookPreset {
    /// Limit the value to `[min, max]`
    Clamp { min: u16, max: u16 },
    /// Add a signed offset, wrapping at 16 bits
    Offset { value: i32 },
    /// Multiply by `numerator / denominator`, saturating at 65535
    Scale { numerator: u32, denominator: u32 },
    /// Always yield `value`
    Constant { value: u16 },
    /// `(value & and) | or`
    Mask {
        #[serde(default = "default_mask_and")]
        and: u16,
        #[serde(default)]
        or: u16,
    },
    /// Number of reads served so far (read hooks only)
    Counter,
    /// Seconds since startup, low 16 bits (read hooks only)
    Uptime,
}

fn default_mask_and() -> u16 {
    0xFFFF
}

impl HookPreset {
    /// Return the string name for this preset.
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPreset::Clamp { .. } => "clamp",
            HookPreset::Offset { .. } => "offset",
            HookPreset::Scale { .. } => "scale",
            HookPreset::Constant { .. } => "constant",
            HookPreset::Mask { .. } => "mask",
            HookPreset::Counter => "counter",
            HookPreset::Uptime => "uptime",
        }
    }

    /// Whether the preset ignores its input and only makes sense on read.
    pub fn is_read_only(&self) -> bool {
        matches!(self, HookPreset::Counter | HookPreset::Uptime)
    }
}

impl RegisterServerConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: RegisterServerConfig = regserver_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Range sizes and overlaps are checked when the register spaces are
    /// built; this covers everything else.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::Validation(
                "At least one server must be configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for server in &self.servers {
            if server.name.is_empty() {
                return Err(ConfigError::Validation(
                    "Server name cannot be empty".to_string(),
                ));
            }

            if !names.insert(server.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate server name '{}'",
                    server.name
                )));
            }

            if !(1..=247).contains(&server.station_address) {
                return Err(ConfigError::Validation(format!(
                    "Server '{}': station_address must be 1-247",
                    server.name
                )));
            }

            if server.holding_registers.is_empty() && server.input_registers.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Server '{}': must define holding_registers or input_registers",
                    server.name
                )));
            }

            server.validate_transport()?;

            for range in &server.holding_registers {
                server.validate_range("holding", range)?;
            }
            for range in &server.input_registers {
                server.validate_range("input", range)?;
            }
        }

        Ok(())
    }
}

impl ServerConfig {
    fn validate_transport(&self) -> Result<(), ConfigError> {
        match &self.transport {
            TransportConfig::Rtu {
                parity,
                data_bits,
                stop_bits,
                ..
            } => {
                match parity.to_lowercase().as_str() {
                    "none" | "even" | "odd" => {}
                    _ => {
                        return Err(ConfigError::Validation(format!(
                            "Server '{}': invalid parity '{}' (use none, even, or odd)",
                            self.name, parity
                        )));
                    }
                }
                if !(5..=8).contains(data_bits) {
                    return Err(ConfigError::Validation(format!(
                        "Server '{}': data_bits must be 5-8",
                        self.name
                    )));
                }
                if !(1..=2).contains(stop_bits) {
                    return Err(ConfigError::Validation(format!(
                        "Server '{}': stop_bits must be 1 or 2",
                        self.name
                    )));
                }
            }
            TransportConfig::Tcp { bind } => {
                bind.parse::<SocketAddr>().map_err(|e| {
                    ConfigError::Validation(format!(
                        "Server '{}': invalid bind address '{}': {}",
                        self.name, bind, e
                    ))
                })?;
            }
        }
        Ok(())
    }

    fn validate_range(&self, kind: &str, range: &RangeConfig) -> Result<(), ConfigError> {
        if let Some(preset) = &range.on_write {
            if preset.is_read_only() {
                return Err(ConfigError::Validation(format!(
                    "Server '{}': {} range at {}: '{}' cannot be used as on_write",
                    self.name,
                    kind,
                    range.start_address,
                    preset.as_str()
                )));
            }
        }

        for preset in range.on_read.iter().chain(range.on_write.iter()) {
            match preset {
                HookPreset::Clamp { min, max } if min > max => {
                    return Err(ConfigError::Validation(format!(
                        "Server '{}': {} range at {}: clamp min {} exceeds max {}",
                        self.name, kind, range.start_address, min, max
                    )));
                }
                HookPreset::Scale { denominator: 0, .. } => {
                    return Err(ConfigError::Validation(format!(
                        "Server '{}': {} range at {}: scale denominator cannot be 0",
                        self.name, kind, range.start_address
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rtu_config() {
        let json = r#"{
            servers: [
                {
                    name: "pump-skid",
                    station_address: 5,
                    transport: {
                        type: "rtu",
                        port: "/dev/ttyUSB0",
                        baud_rate: 19200,
                        parity: "even"
                    },
                    holding_registers: [
                        { start_address: 0, number: 10 }
                    ]
                }
            ]
        }"#;

        let config: RegisterServerConfig = json5::from_str(json).unwrap();
        config.validate().unwrap();
        let server = &config.servers[0];

        assert_eq!(server.station_address, 5);
        assert_eq!(server.hook_budget_ms, 5);
        if let TransportConfig::Rtu {
            port,
            baud_rate,
            parity,
            data_bits,
            stop_bits,
        } = &server.transport
        {
            assert_eq!(port, "/dev/ttyUSB0");
            assert_eq!(*baud_rate, 19200);
            assert_eq!(parity, "even");
            assert_eq!(*data_bits, 8);
            assert_eq!(*stop_bits, 1);
        } else {
            panic!("Expected RTU transport");
        }
    }

    #[test]
    fn test_parse_tcp_config_with_defaults() {
        let json = r#"{
            servers: [
                {
                    name: "gateway",
                    station_address: 1,
                    transport: { type: "tcp" },
                    input_registers: [ { start_address: 100 } ]
                }
            ]
        }"#;

        let config: RegisterServerConfig = json5::from_str(json).unwrap();
        config.validate().unwrap();
        let server = &config.servers[0];

        if let TransportConfig::Tcp { bind } = &server.transport {
            assert_eq!(bind, "0.0.0.0:502");
        } else {
            panic!("Expected TCP transport");
        }
        let range = &server.input_registers[0];
        assert_eq!(range.default, 0);
        assert_eq!(range.number, 1);
        assert!(range.on_read.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_hook_presets() {
        let json = r#"{
            servers: [
                {
                    name: "plc",
                    station_address: 1,
                    transport: { type: "tcp", bind: "127.0.0.1:5020" },
                    holding_registers: [
                        { start_address: 0, number: 4, on_write: { type: "clamp", min: 0, max: 100 } },
                        { start_address: 4, on_write: { type: "mask", or: 1 } },
                    ],
                    input_registers: [
                        { start_address: 0, on_read: { type: "uptime" } },
                        { start_address: 1, on_read: { type: "scale", numerator: 10, denominator: 3 } },
                    ]
                }
            ]
        }"#;

        let config: RegisterServerConfig = json5::from_str(json).unwrap();
        config.validate().unwrap();
        let server = &config.servers[0];

        assert_eq!(
            server.holding_registers[0].on_write,
            Some(HookPreset::Clamp { min: 0, max: 100 })
        );
        assert_eq!(
            server.holding_registers[1].on_write,
            Some(HookPreset::Mask {
                and: 0xFFFF,
                or: 1
            })
        );
        assert_eq!(server.input_registers[0].on_read, Some(HookPreset::Uptime));
    }

    #[test]
    fn test_validate_empty_servers() {
        let config: RegisterServerConfig = json5::from_str("{ servers: [] }").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_station_address() {
        let json = r#"{
            servers: [
                {
                    name: "plc",
                    station_address: 0,
                    transport: { type: "tcp" },
                    holding_registers: [ { start_address: 0 } ]
                }
            ]
        }"#;

        let config: RegisterServerConfig = json5::from_str(json).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_duplicate_names() {
        let json = r#"{
            servers: [
                { name: "a", station_address: 1, transport: { type: "tcp", bind: "127.0.0.1:5020" },
                  holding_registers: [ { start_address: 0 } ] },
                { name: "a", station_address: 2, transport: { type: "tcp", bind: "127.0.0.1:5021" },
                  holding_registers: [ { start_address: 0 } ] },
            ]
        }"#;

        let config: RegisterServerConfig = json5::from_str(json).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate server name 'a'"));
    }

    #[test]
    fn test_validate_missing_registers() {
        let json = r#"{
            servers: [
                { name: "plc", station_address: 1, transport: { type: "tcp" } }
            ]
        }"#;

        let config: RegisterServerConfig = json5::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_parity_and_bind() {
        let rtu = r#"{
            servers: [
                { name: "plc", station_address: 1,
                  transport: { type: "rtu", port: "/dev/ttyS0", parity: "mark" },
                  holding_registers: [ { start_address: 0 } ] }
            ]
        }"#;
        let config: RegisterServerConfig = json5::from_str(rtu).unwrap();
        assert!(config.validate().is_err());

        let tcp = r#"{
            servers: [
                { name: "plc", station_address: 1,
                  transport: { type: "tcp", bind: "localhost" },
                  holding_registers: [ { start_address: 0 } ] }
            ]
        }"#;
        let config: RegisterServerConfig = json5::from_str(tcp).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_hook_presets() {
        let counter_on_write = r#"{
            servers: [
                { name: "plc", station_address: 1, transport: { type: "tcp" },
                  holding_registers: [ { start_address: 0, on_write: { type: "counter" } } ] }
            ]
        }"#;
        let config: RegisterServerConfig = json5::from_str(counter_on_write).unwrap();
        assert!(config.validate().is_err());

        let inverted_clamp = r#"{
            servers: [
                { name: "plc", station_address: 1, transport: { type: "tcp" },
                  holding_registers: [ { start_address: 0, on_read: { type: "clamp", min: 10, max: 1 } } ] }
            ]
        }"#;
        let config: RegisterServerConfig = json5::from_str(inverted_clamp).unwrap();
        assert!(config.validate().is_err());

        let zero_scale = r#"{
            servers: [
                { name: "plc", station_address: 1, transport: { type: "tcp" },
                  input_registers: [ { start_address: 0, on_read: { type: "scale", numerator: 1, denominator: 0 } } ] }
            ]
        }"#;
        let config: RegisterServerConfig = json5::from_str(zero_scale).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sample_config_is_valid() {
        let config: RegisterServerConfig =
            json5::from_str(include_str!("../../modbus-server.json5")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers[1].hook_budget(), Duration::from_millis(10));
    }

    #[test]
    fn test_load_missing_file() {
        let err = RegisterServerConfig::load_from_file("/nonexistent/modbus-server.json5")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Load(regserver_common::Error::Read { .. })));
    }
}
