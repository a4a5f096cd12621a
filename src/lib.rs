//! Modbus master stack for industrial data acquisition
//!
//! Implements the Modbus protocol family from the master/client side:
//! RTU, ASCII, TCP and UDP wire variants, a blocking request/response
//! transaction engine, and the point-to-register mapping that turns a set
//! of named logical points into the minimum number of physical reads.
//!
//! # Layers
//!
//! - [`checksum`], [`message`], [`frame`]: the wire codecs (CRC16/LRC,
//!   the transport-agnostic message, and per-transport framing)
//! - [`transport`]: blocking byte transports (TCP, UDP, serial behind
//!   the `serial` feature)
//! - [`master`]: one engine per wire variant behind the
//!   [`ModbusMaster`] trait with typed read/write operations
//! - [`point`], [`segment`], [`value`]: address parsing, segment
//!   batching/dispatch, and write-value conversion
//! - [`channel`], [`config`]: shared-channel handles, node-level batched
//!   reads and writes, serde configuration
//!
//! # Example
//!
//! ```no_run
//! use modlink::{ModbusConfig, ModbusPoint};
//!
//! let config: ModbusConfig = serde_json::from_str(
//!     r#"{ "station": 1, "transport": { "type": "tcp", "server": "192.168.1.10" } }"#,
//! )?;
//! let node = config.open();
//!
//! let points = vec![
//!     ModbusPoint::new("voltage", "4x0100"),
//!     ModbusPoint::new("current", "4x0101"),
//! ];
//! let values = node.read_points(&points)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod channel;
pub mod checksum;
pub mod config;
pub mod error;
pub mod frame;
pub mod master;
pub mod message;
pub mod point;
pub mod segment;
pub mod transport;
pub mod value;

pub use channel::{ModbusChannel, ModbusNode};
pub use config::{ModbusConfig, TransportConfig};
pub use error::{ExceptionCode, ModbusError, Result};
pub use master::{ModbusAscii, ModbusIp, ModbusMaster, ModbusRtu};
pub use message::{FunctionCode, ModbusMessage};
pub use point::{ModbusAddress, ModbusPoint, ModbusRange};
pub use segment::{BatchPolicy, Segment};
pub use transport::ByteTransport;
pub use value::{DataType, TypeResolver};
