//! Logical point addresses and their register ranges
//!
//! Addresses come in as text: a region prefix plus offset (`DO12`,
//! `4x0023`) or a bare number. Bare numbers at or above 10000 classify
//! into the DI/AI/AO bands; the coil band is never inferred from a bare
//! number because some non-standard devices start holding registers at 0.

use serde::{Deserialize, Serialize};

use crate::error::{ModbusError, Result};
use crate::message::FunctionCode;

/// Modbus address regions with their canonical numeric bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModbusRange {
    /// DO / 0x: coils, 0-9999
    Coil,
    /// DI / 1x: discrete inputs, 10000-19999
    Discrete,
    /// AI / 3x: input registers, 30000-39999
    Input,
    /// AO / 4x: holding registers, 40000-49999
    Holding,
}

impl ModbusRange {
    /// Inclusive band bounds for bare-numeric classification
    pub fn bounds(&self) -> (u16, u16) {
        match self {
            Self::Coil => (0, 9999),
            Self::Discrete => (10000, 19999),
            Self::Input => (30000, 39999),
            Self::Holding => (40000, 49999),
        }
    }

    /// True when `address` falls inside this band
    pub fn contains(&self, address: u16) -> bool {
        let (start, end) = self.bounds();
        (start..=end).contains(&address)
    }

    /// Default read function code for the region
    pub fn read_code(&self) -> FunctionCode {
        match self {
            Self::Coil => FunctionCode::ReadCoil,
            Self::Discrete => FunctionCode::ReadDiscrete,
            Self::Input => FunctionCode::ReadInput,
            Self::Holding => FunctionCode::ReadRegister,
        }
    }

    /// Default write function code; read-only regions have none
    pub fn write_code(&self) -> Option<FunctionCode> {
        match self {
            Self::Coil => Some(FunctionCode::WriteCoil),
            Self::Holding => Some(FunctionCode::WriteRegister),
            Self::Discrete | Self::Input => None,
        }
    }
}

/// Parsed point address: optional region plus numeric offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModbusAddress {
    /// Region when a prefix or band match decided it; `None` leaves the
    /// choice to the node's configured function codes
    pub range: Option<ModbusRange>,
    /// Numeric address (prefix forms keep the offset after the prefix,
    /// bare forms keep the raw value)
    pub address: u16,
}

impl ModbusAddress {
    /// Parse a textual point address
    ///
    /// A trailing `:` or `.` suffix selects a bit within the word and is
    /// stripped before classification.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ModbusError::InvalidAddress("empty address".to_string()));
        }

        // Drop the bit-selector suffix
        let body = match text.find([':', '.']) {
            Some(0) => return Err(ModbusError::InvalidAddress(text.to_string())),
            Some(p) => &text[..p],
            None => text,
        };

        let prefixes = [
            ("DO", ModbusRange::Coil),
            ("0X", ModbusRange::Coil),
            ("DI", ModbusRange::Discrete),
            ("1X", ModbusRange::Discrete),
            ("AI", ModbusRange::Input),
            ("3X", ModbusRange::Input),
            ("AO", ModbusRange::Holding),
            ("4X", ModbusRange::Holding),
        ];

        let upper = body.to_ascii_uppercase();
        for (prefix, range) in prefixes {
            if let Some(rest) = upper.strip_prefix(prefix) {
                let address = rest
                    .parse::<u16>()
                    .map_err(|_| ModbusError::InvalidAddress(text.to_string()))?;
                return Ok(Self {
                    range: Some(range),
                    address,
                });
            }
        }

        let address = body
            .parse::<u16>()
            .map_err(|_| ModbusError::InvalidAddress(text.to_string()))?;

        // Band classification for bare numbers; DO is deliberately skipped
        let range = if address >= 10000 {
            [ModbusRange::Discrete, ModbusRange::Input, ModbusRange::Holding]
                .into_iter()
                .find(|r| r.contains(address))
        } else {
            None
        };

        Ok(Self { range, address })
    }

    /// Read function code for this address, falling back to the caller's
    /// default when no region is known
    pub fn read_code_or(&self, default: FunctionCode) -> FunctionCode {
        self.range.map(|r| r.read_code()).unwrap_or(default)
    }

}

/// Named logical point mapped onto the register space
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusPoint {
    /// Point name, the key in result maps
    pub name: String,
    /// Textual address (`DO12`, `4x0023`, `40001`, `100.3`)
    pub address: String,
    /// Declared data type; resolved externally when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Data length in bytes (bits for coil/discrete points)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u16>,
}

impl ModbusPoint {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            data_type: None,
            length: None,
        }
    }

    /// Unit count for segment building: registers for word regions
    /// (`length / 2`, minimum 1), bits for bit regions (`length`,
    /// minimum 1)
    pub fn unit_count(&self, code: FunctionCode) -> u16 {
        let length = self.length.unwrap_or(0);
        if code.is_bit() {
            length.max(1)
        } else {
            (length / 2).max(1)
        }
    }
}
