//! Base Modbus message codec
//!
//! A `ModbusMessage` is the transport-agnostic unit: station id, function
//! code, optional exception code, payload. Requests carry the register
//! address in the first two payload bytes (see `set_request`); most write
//! replies echo it back in the same position. Transport framing (CRC/LRC
//! trailers, MBAP header) lives in `frame`.

use serde::{Deserialize, Serialize};

use crate::error::{ExceptionCode, ModbusError, Result};

/// Modbus function codes supported by the master
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FunctionCode {
    /// 0x01 read coils
    ReadCoil = 0x01,
    /// 0x02 read discrete inputs
    ReadDiscrete = 0x02,
    /// 0x03 read holding registers
    ReadRegister = 0x03,
    /// 0x04 read input registers
    ReadInput = 0x04,
    /// 0x05 write single coil
    WriteCoil = 0x05,
    /// 0x06 write single register
    WriteRegister = 0x06,
    /// 0x0F write multiple coils
    WriteCoils = 0x0F,
    /// 0x10 write multiple registers
    WriteRegisters = 0x10,
}

impl FunctionCode {
    /// Map a raw function-code byte (error bit already stripped)
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::ReadCoil),
            0x02 => Some(Self::ReadDiscrete),
            0x03 => Some(Self::ReadRegister),
            0x04 => Some(Self::ReadInput),
            0x05 => Some(Self::WriteCoil),
            0x06 => Some(Self::WriteRegister),
            0x0F => Some(Self::WriteCoils),
            0x10 => Some(Self::WriteRegisters),
            _ => None,
        }
    }

    /// True for the four read codes (0x01-0x04)
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            Self::ReadCoil | Self::ReadDiscrete | Self::ReadRegister | Self::ReadInput
        )
    }

    /// True for bit-addressed codes (coils and discrete inputs)
    pub fn is_bit(&self) -> bool {
        matches!(self, Self::ReadCoil | Self::ReadDiscrete | Self::WriteCoil | Self::WriteCoils)
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::ReadCoil => "Read Coils",
            Self::ReadDiscrete => "Read Discrete Inputs",
            Self::ReadRegister => "Read Holding Registers",
            Self::ReadInput => "Read Input Registers",
            Self::WriteCoil => "Write Single Coil",
            Self::WriteRegister => "Write Single Register",
            Self::WriteCoils => "Write Multiple Coils",
            Self::WriteRegisters => "Write Multiple Registers",
        }
    }
}

impl std::fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02X} {}", *self as u8, self.description())
    }
}

/// Transport-agnostic Modbus message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusMessage {
    /// Response direction flag (affects logging only; the wire layout is
    /// symmetric because the address lives inside the payload)
    pub reply: bool,
    /// Station (slave) id
    pub station: u8,
    /// Function code
    pub function: FunctionCode,
    /// Exception code when the slave flagged an error; payload is empty then
    pub error: Option<ExceptionCode>,
    /// Payload bytes; for requests the first two bytes are the address
    pub payload: Vec<u8>,
}

impl ModbusMessage {
    /// Create a request message with an empty payload
    pub fn request(station: u8, function: FunctionCode) -> Self {
        Self {
            reply: false,
            station,
            function,
            error: None,
            payload: Vec::new(),
        }
    }

    /// Populate the payload as `[addressHi, addressLo, countHi, countLo]`
    pub fn set_request(&mut self, address: u16, count: u16) {
        self.payload.clear();
        self.payload.extend_from_slice(&address.to_be_bytes());
        self.payload.extend_from_slice(&count.to_be_bytes());
    }

    /// Populate the payload as address followed by raw bytes
    pub fn set_request_bytes(&mut self, address: u16, data: &[u8]) {
        self.payload.clear();
        self.payload.extend_from_slice(&address.to_be_bytes());
        self.payload.extend_from_slice(data);
    }

    /// Read the address from the first two payload bytes
    ///
    /// Works for requests and for the replies that echo the address
    /// (single and multi writes).
    pub fn address(&self) -> Option<u16> {
        if self.payload.len() < 2 {
            return None;
        }
        Some(u16::from_be_bytes([self.payload[0], self.payload[1]]))
    }

    /// Serialize into `buf`: station, function (bit 0x80 on error), then
    /// exception byte or payload verbatim
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.station);

        let mut code = self.function as u8;
        if self.error.is_some() {
            code |= 0x80;
        }
        buf.push(code);

        if let Some(err) = self.error {
            buf.push(err as u8);
            return;
        }

        buf.extend_from_slice(&self.payload);
    }

    /// Serialize into a fresh buffer
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + self.payload.len() + 1);
        self.encode_into(&mut buf);
        buf
    }

    /// Parse a message from raw bytes (framing already stripped)
    pub fn decode(data: &[u8], reply: bool) -> Result<Self> {
        if data.len() < 2 {
            return Err(ModbusError::protocol(format!(
                "message too short: {} bytes",
                data.len()
            )));
        }

        let station = data[0];
        let code_byte = data[1];
        let function = FunctionCode::from_u8(code_byte & 0x7F).ok_or_else(|| {
            ModbusError::protocol(format!("unknown function code {:02X}", code_byte & 0x7F))
        })?;

        if code_byte & 0x80 != 0 {
            let raw = *data.get(2).ok_or_else(|| {
                ModbusError::protocol("exception response missing exception code")
            })?;
            return Ok(Self {
                reply,
                station,
                function,
                error: Some(ExceptionCode::from_u8(raw)),
                payload: Vec::new(),
            });
        }

        Ok(Self {
            reply,
            station,
            function,
            error: None,
            payload: data[2..].to_vec(),
        })
    }
}

impl std::fmt::Display for ModbusMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(err) = self.error {
            return write!(f, "{} station={} error={}", self.function, self.station, err);
        }
        write!(
            f,
            "{} station={} payload={}",
            self.function,
            self.station,
            hex::encode(&self.payload)
        )
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_function_code_round_trip() {
        for code in [0x01u8, 0x02, 0x03, 0x04, 0x05, 0x06, 0x0F, 0x10] {
            let fc = FunctionCode::from_u8(code).expect("known function code");
            assert_eq!(fc as u8, code);
        }
        assert!(FunctionCode::from_u8(0x2B).is_none());
        assert!(FunctionCode::from_u8(0x00).is_none());
    }

    #[test]
    fn test_function_code_classification() {
        assert!(FunctionCode::ReadCoil.is_read());
        assert!(FunctionCode::ReadInput.is_read());
        assert!(!FunctionCode::WriteRegister.is_read());
        assert!(FunctionCode::ReadDiscrete.is_bit());
        assert!(FunctionCode::WriteCoils.is_bit());
        assert!(!FunctionCode::ReadRegister.is_bit());
    }

    #[test]
    fn test_request_encode() {
        let mut msg = ModbusMessage::request(1, FunctionCode::WriteRegister);
        msg.set_request(0x0001, 0x0017);
        assert_eq!(msg.encode(), vec![0x01, 0x06, 0x00, 0x01, 0x00, 0x17]);
        assert_eq!(msg.address(), Some(0x0001));
    }

    #[test]
    fn test_decode_round_trip() {
        let mut msg = ModbusMessage::request(0x11, FunctionCode::ReadRegister);
        msg.set_request(0x006B, 0x0003);

        let decoded =
            ModbusMessage::decode(&msg.encode(), false).expect("request should decode");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_decode_reply_payload_verbatim() {
        // FC03 reply: byte count then register data
        let data = [0x01, 0x03, 0x02, 0x12, 0x34];
        let msg = ModbusMessage::decode(&data, true).expect("reply should decode");
        assert_eq!(msg.function, FunctionCode::ReadRegister);
        assert_eq!(msg.payload, vec![0x02, 0x12, 0x34]);
        assert!(msg.error.is_none());
    }

    #[test]
    fn test_decode_exception() {
        let data = [0x01, 0x83, 0x02];
        let msg = ModbusMessage::decode(&data, true).expect("exception should decode");
        assert_eq!(msg.function, FunctionCode::ReadRegister);
        assert_eq!(msg.error, Some(crate::error::ExceptionCode::IllegalDataAddress));
        assert!(msg.payload.is_empty());
    }

    #[test]
    fn test_decode_errors() {
        assert!(ModbusMessage::decode(&[0x01], true).is_err());
        // Unknown function code
        assert!(ModbusMessage::decode(&[0x01, 0x2B, 0x00], true).is_err());
        // Exception frame missing its code byte
        assert!(ModbusMessage::decode(&[0x01, 0x83], true).is_err());
    }

    #[test]
    fn test_set_request_bytes() {
        let mut msg = ModbusMessage::request(2, FunctionCode::WriteRegisters);
        msg.set_request_bytes(0x0010, &[0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]);
        assert_eq!(msg.address(), Some(0x0010));
        assert_eq!(msg.payload.len(), 9);
    }
}
