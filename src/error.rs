//! Error types for the Modbus master stack

use thiserror::Error;

/// Result type alias using ModbusError
pub type Result<T> = std::result::Result<T, ModbusError>;

/// Modbus error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModbusError {
    /// Protocol-level error (malformed frame, length mismatch, etc.)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Slave returned a Modbus exception response
    #[error("Slave exception: {0}")]
    Exception(ExceptionCode),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Address parse error
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Unsupported function code or operation
    #[error("Not supported: {0}")]
    Unsupported(String),

    /// Value conversion error
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ModbusError {
    /// Create protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create unsupported-operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create conversion error
    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion(msg.into())
    }

    /// Create configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True when the error is a read timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                Self::Timeout(err.to_string())
            },
            _ => Self::Io(err.to_string()),
        }
    }
}

/// Standard Modbus exception codes returned by slave devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExceptionCode {
    /// Function code not recognized by the slave
    IllegalFunction = 0x01,
    /// Data address not allowed for this slave
    IllegalDataAddress = 0x02,
    /// Value in the request not accepted by the slave
    IllegalDataValue = 0x03,
    /// Unrecoverable error while the slave attempted the action
    SlaveDeviceFailure = 0x04,
    /// Request accepted, processing takes a long time
    Acknowledge = 0x05,
    /// Slave is busy with a long-duration command
    SlaveDeviceBusy = 0x06,
    /// Slave cannot perform the program function
    NegativeAcknowledge = 0x07,
    /// Parity error detected in extended memory
    MemoryParityError = 0x08,
    /// Gateway could not allocate an internal path
    GatewayPathUnavailable = 0x0A,
    /// Target device behind a gateway failed to respond
    GatewayTargetDeviceFailed = 0x0B,
    /// Any other (non-standard) code
    Unknown = 0xFF,
}

impl ExceptionCode {
    /// Map a raw exception byte to a code
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x01 => Self::IllegalFunction,
            0x02 => Self::IllegalDataAddress,
            0x03 => Self::IllegalDataValue,
            0x04 => Self::SlaveDeviceFailure,
            0x05 => Self::Acknowledge,
            0x06 => Self::SlaveDeviceBusy,
            0x07 => Self::NegativeAcknowledge,
            0x08 => Self::MemoryParityError,
            0x0A => Self::GatewayPathUnavailable,
            0x0B => Self::GatewayTargetDeviceFailed,
            _ => Self::Unknown,
        }
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::IllegalFunction => "Illegal Function",
            Self::IllegalDataAddress => "Illegal Data Address",
            Self::IllegalDataValue => "Illegal Data Value",
            Self::SlaveDeviceFailure => "Slave Device Failure",
            Self::Acknowledge => "Acknowledge",
            Self::SlaveDeviceBusy => "Slave Device Busy",
            Self::NegativeAcknowledge => "Negative Acknowledge",
            Self::MemoryParityError => "Memory Parity Error",
            Self::GatewayPathUnavailable => "Gateway Path Unavailable",
            Self::GatewayTargetDeviceFailed => "Gateway Target Device Failed to Respond",
            Self::Unknown => "Unknown Exception",
        }
    }
}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02X} {}", *self as u8, self.description())
    }
}
