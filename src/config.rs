//! Channel configuration and the engine factory
//!
//! Configuration is plain serde data so callers can load it from JSON
//! alongside their point tables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::{ModbusChannel, ModbusNode};
use crate::master::{ModbusIp, ModbusMaster, ModbusRtu};
use crate::message::FunctionCode;
use crate::segment::BatchPolicy;

fn default_station() -> u8 {
    1
}

fn default_read_code() -> FunctionCode {
    FunctionCode::ReadRegister
}

fn default_write_code() -> FunctionCode {
    FunctionCode::WriteRegister
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_validate_response() -> bool {
    true
}

#[cfg(feature = "serial")]
fn default_baudrate() -> u32 {
    9600
}

/// Wire variant and its endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Modbus TCP (MBAP over a TCP stream)
    Tcp { server: String },
    /// Modbus UDP (MBAP over datagrams)
    Udp { server: String },
    /// RTU framing carried over a TCP stream
    RtuOverTcp { server: String },
    /// RTU framing carried over UDP datagrams
    RtuOverUdp { server: String },
    /// RTU over a serial port
    #[cfg(feature = "serial")]
    Rtu {
        port_name: String,
        #[serde(default = "default_baudrate")]
        baudrate: u32,
    },
    /// ASCII over a serial port
    #[cfg(feature = "serial")]
    Ascii {
        port_name: String,
        #[serde(default = "default_baudrate")]
        baudrate: u32,
    },
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Tcp {
            server: "127.0.0.1:502".to_string(),
        }
    }
}

/// Full channel + node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModbusConfig {
    /// Slave station id
    pub station: u8,
    /// Default read code for region-less addresses
    pub read_code: FunctionCode,
    /// Default write code for region-less addresses
    pub write_code: FunctionCode,
    /// Exchange timeout in milliseconds
    pub timeout_ms: u64,
    /// Pause between consecutive segment reads in milliseconds
    pub request_delay_ms: u64,
    /// Maximum points per merged segment; 0 means unlimited
    pub batch_size: u16,
    /// Merge gap tolerance in address units
    pub gap: u16,
    /// Check declared byte counts on read replies
    pub validate_response: bool,
    /// MBAP protocol id override
    pub protocol_id: u16,
    /// Wire variant
    pub transport: TransportConfig,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            station: default_station(),
            read_code: default_read_code(),
            write_code: default_write_code(),
            timeout_ms: default_timeout_ms(),
            request_delay_ms: 0,
            batch_size: 0,
            gap: 0,
            validate_response: default_validate_response(),
            protocol_id: 0,
            transport: TransportConfig::default(),
        }
    }
}

impl ModbusConfig {
    /// Build the engine for the configured wire variant
    pub fn build_master(&self) -> Box<dyn ModbusMaster> {
        let timeout = Duration::from_millis(self.timeout_ms);

        match &self.transport {
            TransportConfig::Tcp { server } => Box::new(
                ModbusIp::tcp(server.clone())
                    .with_timeout(timeout)
                    .with_protocol_id(self.protocol_id)
                    .with_validate_response(self.validate_response),
            ),
            TransportConfig::Udp { server } => Box::new(
                ModbusIp::udp(server.clone())
                    .with_timeout(timeout)
                    .with_protocol_id(self.protocol_id)
                    .with_validate_response(self.validate_response),
            ),
            TransportConfig::RtuOverTcp { server } => Box::new(
                ModbusRtu::over_tcp(server.clone())
                    .with_timeout(timeout)
                    .with_validate_response(self.validate_response),
            ),
            TransportConfig::RtuOverUdp { server } => Box::new(
                ModbusRtu::over_udp(server.clone())
                    .with_timeout(timeout)
                    .with_validate_response(self.validate_response),
            ),
            #[cfg(feature = "serial")]
            TransportConfig::Rtu {
                port_name,
                baudrate,
            } => Box::new(
                ModbusRtu::serial(port_name.clone(), *baudrate)
                    .with_timeout(timeout)
                    .with_validate_response(self.validate_response),
            ),
            #[cfg(feature = "serial")]
            TransportConfig::Ascii {
                port_name,
                baudrate,
            } => Box::new(
                crate::master::ModbusAscii::serial(port_name.clone(), *baudrate)
                    .with_timeout(timeout)
                    .with_validate_response(self.validate_response),
            ),
        }
    }

    /// Build a node on a fresh channel
    pub fn open(&self) -> ModbusNode {
        self.open_on(ModbusChannel::new(self.build_master()))
    }

    /// Build a node sharing an existing channel
    pub fn open_on(&self, channel: ModbusChannel) -> ModbusNode {
        ModbusNode::new(channel, self.station)
            .with_codes(self.read_code, self.write_code)
            .with_policy(BatchPolicy {
                batch_size: self.batch_size,
                gap: self.gap,
            })
            .with_delay(Duration::from_millis(self.request_delay_ms))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ModbusConfig::default();
        assert_eq!(config.station, 1);
        assert_eq!(config.timeout_ms, 3000);
        assert!(config.validate_response);
        assert_eq!(config.batch_size, 0);
        assert!(matches!(config.transport, TransportConfig::Tcp { .. }));
    }

    #[test]
    fn test_parse_minimal_json() {
        let config: ModbusConfig = serde_json::from_str(
            r#"{
                "station": 3,
                "transport": { "type": "udp", "server": "10.0.0.5:1502" }
            }"#,
        )
        .expect("config should parse");

        assert_eq!(config.station, 3);
        assert_eq!(config.timeout_ms, 3000); // default fills in
        match config.transport {
            TransportConfig::Udp { ref server } => assert_eq!(server, "10.0.0.5:1502"),
            ref other => panic!("unexpected transport {other:?}"),
        }
    }

    #[test]
    fn test_parse_codes_and_policy() {
        let config: ModbusConfig = serde_json::from_str(
            r#"{
                "read_code": "ReadInput",
                "write_code": "WriteRegisters",
                "batch_size": 16,
                "gap": 2,
                "transport": { "type": "rtu_over_tcp", "server": "gw.local" }
            }"#,
        )
        .expect("config should parse");

        assert_eq!(config.read_code, FunctionCode::ReadInput);
        assert_eq!(config.write_code, FunctionCode::WriteRegisters);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.gap, 2);
    }

    #[cfg(feature = "serial")]
    #[test]
    fn test_parse_serial_transport() {
        let config: ModbusConfig = serde_json::from_str(
            r#"{ "transport": { "type": "rtu", "port_name": "/dev/ttyUSB0" } }"#,
        )
        .expect("config should parse");

        match config.transport {
            TransportConfig::Rtu {
                ref port_name,
                baudrate,
            } => {
                assert_eq!(port_name, "/dev/ttyUSB0");
                assert_eq!(baudrate, 9600);
            },
            ref other => panic!("unexpected transport {other:?}"),
        }
    }

    #[test]
    fn test_round_trip() {
        let config = ModbusConfig {
            station: 7,
            ..Default::default()
        };
        let text = serde_json::to_string(&config).expect("config should serialize");
        let back: ModbusConfig = serde_json::from_str(&text).expect("config should parse");
        assert_eq!(back.station, 7);
        assert_eq!(back.timeout_ms, config.timeout_ms);
    }
}
