//! Write-path value conversion: typed values to register words
//!
//! Read buffers go back to callers uninterpreted; only writes need the
//! declared point type to lay a value out as big-endian register words.
//!
//! Float and double conversion is a truncating numeric cast to an
//! unsigned integer of matching width, not an IEEE-754 bit
//! reinterpretation. Deployed devices expect integer-valued float points
//! laid out this way.

use serde_json::Value;

use crate::error::{ModbusError, Result};

/// Primitive point data types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Single bit / boolean, written as 0xFF00 / 0x0000
    Bit,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
}

impl DataType {
    /// Parse a declared type tag; accepts the common aliases
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "bit" | "bool" | "boolean" => Some(Self::Bit),
            "int16" | "short" | "i16" => Some(Self::Int16),
            "uint16" | "ushort" | "word" | "u16" => Some(Self::UInt16),
            "int32" | "int" | "i32" => Some(Self::Int32),
            "uint32" | "uint" | "u32" => Some(Self::UInt32),
            "int64" | "long" | "i64" => Some(Self::Int64),
            "uint64" | "ulong" | "u64" => Some(Self::UInt64),
            "float" | "float32" | "single" | "f32" => Some(Self::Float32),
            "double" | "float64" | "decimal" | "f64" => Some(Self::Float64),
            _ => None,
        }
    }

    /// Register words this type occupies
    pub fn register_count(&self) -> u16 {
        match self {
            Self::Bit | Self::Int16 | Self::UInt16 => 1,
            Self::Int32 | Self::UInt32 | Self::Float32 => 2,
            Self::Int64 | Self::UInt64 | Self::Float64 => 4,
        }
    }
}

/// External type-specification lookup, keyed by point name
pub trait TypeResolver: Send + Sync {
    fn resolve(&self, point_name: &str) -> Option<DataType>;
}

fn as_f64(value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ModbusError::conversion(format!("not a finite number: {n}"))),
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|_| ModbusError::conversion(format!("not a number: {s:?}"))),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(ModbusError::conversion(format!(
            "cannot convert {other} to a number"
        ))),
    }
}

fn as_i64(value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            // Fractional and oversized values truncate
            Ok(as_f64(value)? as i64)
        },
        _ => Ok(as_f64(value)? as i64),
    }
}

fn as_u64(value: &Value) -> Result<u64> {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                return Ok(u);
            }
            Ok(as_f64(value)? as u64)
        },
        _ => Ok(as_f64(value)? as u64),
    }
}

fn as_bool(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(_) => Ok(as_f64(value)? != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" => Ok(true),
            "false" | "0" | "off" => Ok(false),
            _ => Err(ModbusError::conversion(format!("not a boolean: {s:?}"))),
        },
        other => Err(ModbusError::conversion(format!(
            "cannot convert {other} to a boolean"
        ))),
    }
}

fn split_u32(value: u32) -> Vec<u16> {
    vec![(value >> 16) as u16, value as u16]
}

fn split_u64(value: u64) -> Vec<u16> {
    vec![
        (value >> 48) as u16,
        (value >> 32) as u16,
        (value >> 16) as u16,
        value as u16,
    ]
}

/// Convert a caller-supplied value to register words for writing
///
/// 16-bit types yield one word; 32-bit two words high-first; 64-bit four
/// words most-significant first. A JSON array is treated as raw bytes
/// and packed into big-endian word pairs regardless of the type tag.
pub fn to_registers(value: &Value, data_type: DataType) -> Result<Vec<u16>> {
    if let Value::Array(items) = value {
        return bytes_to_registers(items);
    }

    match data_type {
        DataType::Bit => Ok(vec![if as_bool(value)? { 0xFF00 } else { 0x0000 }]),
        DataType::Int16 => Ok(vec![(as_i64(value)? as i16) as u16]),
        DataType::UInt16 => Ok(vec![as_u64(value)? as u16]),
        DataType::Int32 => Ok(split_u32((as_i64(value)? as i32) as u32)),
        DataType::UInt32 => Ok(split_u32(as_u64(value)? as u32)),
        DataType::Int64 => Ok(split_u64(as_i64(value)? as u64)),
        DataType::UInt64 => Ok(split_u64(as_u64(value)?)),
        // Truncating cast, not an IEEE-754 bit pattern
        DataType::Float32 => Ok(split_u32(as_f64(value)? as u32)),
        DataType::Float64 => Ok(split_u64(as_f64(value)? as u64)),
    }
}

fn bytes_to_registers(items: &[Value]) -> Result<Vec<u16>> {
    if items.len() % 2 != 0 {
        return Err(ModbusError::conversion(format!(
            "byte array length {} is not register-aligned",
            items.len()
        )));
    }

    let mut bytes = Vec::with_capacity(items.len());
    for item in items {
        let b = as_u64(item)?;
        if b > 0xFF {
            return Err(ModbusError::conversion(format!("not a byte: {b}")));
        }
        bytes.push(b as u8);
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_type_parsing() {
        assert_eq!(DataType::parse("bool"), Some(DataType::Bit));
        assert_eq!(DataType::parse("short"), Some(DataType::Int16));
        assert_eq!(DataType::parse("UInt32"), Some(DataType::UInt32));
        assert_eq!(DataType::parse(" float "), Some(DataType::Float32));
        assert_eq!(DataType::parse("decimal"), Some(DataType::Float64));
        assert_eq!(DataType::parse("blob"), None);
    }

    #[test]
    fn test_register_counts() {
        assert_eq!(DataType::UInt16.register_count(), 1);
        assert_eq!(DataType::Float32.register_count(), 2);
        assert_eq!(DataType::Int64.register_count(), 4);
    }

    #[test]
    fn test_16_bit_conversion() {
        assert_eq!(
            to_registers(&json!(0x17), DataType::UInt16).expect("should convert"),
            vec![0x0017]
        );
        // Negative int16 wraps to its two's-complement word
        assert_eq!(
            to_registers(&json!(-2), DataType::Int16).expect("should convert"),
            vec![0xFFFE]
        );
    }

    #[test]
    fn test_32_bit_word_order() {
        assert_eq!(
            to_registers(&json!(0x0001_0002u32), DataType::UInt32).expect("should convert"),
            vec![0x0001, 0x0002]
        );
        assert_eq!(
            to_registers(&json!(-1), DataType::Int32).expect("should convert"),
            vec![0xFFFF, 0xFFFF]
        );
    }

    #[test]
    fn test_64_bit_word_order() {
        assert_eq!(
            to_registers(&json!(0x0001_0002_0003_0004u64), DataType::UInt64)
                .expect("should convert"),
            vec![0x0001, 0x0002, 0x0003, 0x0004]
        );
    }

    #[test]
    fn test_bool_coil_words() {
        assert_eq!(
            to_registers(&json!(true), DataType::Bit).expect("should convert"),
            vec![0xFF00]
        );
        assert_eq!(
            to_registers(&json!(0), DataType::Bit).expect("should convert"),
            vec![0x0000]
        );
        assert_eq!(
            to_registers(&json!("on"), DataType::Bit).expect("should convert"),
            vec![0xFF00]
        );
    }

    #[test]
    fn test_float_truncating_cast() {
        // 3.7 truncates to 3; the fraction is dropped, not bit-encoded
        assert_eq!(
            to_registers(&json!(3.7), DataType::Float32).expect("should convert"),
            vec![0x0000, 0x0003]
        );
        assert_eq!(
            to_registers(&json!(1e5), DataType::Float64).expect("should convert"),
            vec![0x0000, 0x0000, 0x0001, 0x86A0]
        );
    }

    #[test]
    fn test_numeric_strings_accepted() {
        assert_eq!(
            to_registers(&json!("291"), DataType::UInt16).expect("should convert"),
            vec![291]
        );
    }

    #[test]
    fn test_byte_array_packing() {
        assert_eq!(
            to_registers(&json!([0x12, 0x34, 0x00, 0xFF]), DataType::UInt16)
                .expect("should convert"),
            vec![0x1234, 0x00FF]
        );
        assert!(to_registers(&json!([1, 2, 3]), DataType::UInt16).is_err());
        assert!(to_registers(&json!([300, 0]), DataType::UInt16).is_err());
    }

    #[test]
    fn test_unconvertible_values_fail() {
        assert!(to_registers(&json!({"v": 1}), DataType::UInt16).is_err());
        assert!(to_registers(&json!(null), DataType::Float32).is_err());
        assert!(to_registers(&json!("abc"), DataType::Int32).is_err());
    }
}
