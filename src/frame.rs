//! Per-transport framing: RTU (CRC16 trailer), ASCII (hex envelope with
//! LRC), and the MBAP header used by TCP/UDP.
//!
//! Checksum mismatches on RTU/ASCII frames are logged as warnings and the
//! decoded message is still returned.

use tracing::warn;

use crate::checksum::{crc16, lrc};
use crate::error::{ModbusError, Result};
use crate::message::ModbusMessage;

/// Minimum RTU frame: station + function + CRC16
pub const RTU_MIN_LEN: usize = 4;
/// Minimum ASCII frame: ':' + station + function + LRC digits (hex pairs)
pub const ASCII_MIN_LEN: usize = 1 + 2 + 2 + 2;
/// MBAP header length: transaction id + protocol id + length field
pub const MBAP_HEADER_LEN: usize = 6;

/// Encode an RTU frame: base message bytes + CRC16, low byte first
pub fn encode_rtu(msg: &ModbusMessage) -> Vec<u8> {
    let mut frame = msg.encode();
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Decode an RTU frame, validating the CRC16 trailer
///
/// A mismatching CRC is logged as a warning; the decoded message is
/// returned either way.
pub fn decode_rtu(data: &[u8], reply: bool) -> Result<ModbusMessage> {
    if data.len() < RTU_MIN_LEN {
        return Err(ModbusError::protocol(format!(
            "RTU frame too short: {} bytes",
            data.len()
        )));
    }

    let body = &data[..data.len() - 2];
    let received = u16::from_le_bytes([data[data.len() - 2], data[data.len() - 1]]);
    let computed = crc16(body);
    if received != computed {
        warn!(
            "CRC mismatch: computed {:04X}, received {:04X}, frame {}",
            computed,
            received,
            hex::encode(data)
        );
    }

    ModbusMessage::decode(body, reply)
}

/// Encode an ASCII frame: ':' + uppercase hex of the base bytes + two hex
/// LRC digits + CRLF
pub fn encode_ascii(msg: &ModbusMessage) -> Vec<u8> {
    let body = msg.encode();
    let check = lrc(&body);

    let mut frame = Vec::with_capacity(1 + body.len() * 2 + 2 + 2);
    frame.push(b':');
    frame.extend_from_slice(hex::encode_upper(&body).as_bytes());
    frame.extend_from_slice(hex::encode_upper([check]).as_bytes());
    frame.extend_from_slice(b"\r\n");
    frame
}

/// Decode an ASCII frame
///
/// Validates the ':' prefix and minimum length, locates CRLF, hex-decodes
/// the middle. An LRC mismatch is logged, not fatal.
pub fn decode_ascii(data: &[u8], reply: bool) -> Result<ModbusMessage> {
    if data.len() < ASCII_MIN_LEN || data[0] != b':' {
        return Err(ModbusError::protocol("malformed ASCII frame"));
    }

    let end = data
        .windows(2)
        .position(|w| w == b"\r\n")
        .ok_or_else(|| ModbusError::protocol("ASCII frame missing CRLF terminator"))?;

    let raw = hex::decode(&data[1..end])
        .map_err(|e| ModbusError::protocol(format!("invalid hex in ASCII frame: {e}")))?;
    if raw.len() < 3 {
        return Err(ModbusError::protocol("ASCII frame body too short"));
    }

    let body = &raw[..raw.len() - 1];
    let received = raw[raw.len() - 1];
    let computed = lrc(body);
    if received != computed {
        warn!(
            "LRC mismatch: computed {:02X}, received {:02X}, frame {}",
            computed,
            received,
            hex::encode(data)
        );
    }

    ModbusMessage::decode(body, reply)
}

/// MBAP-framed message for the IP transports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpFrame {
    /// Transaction id matching replies to outstanding requests
    pub transaction_id: u16,
    /// Protocol id, 0 for Modbus
    pub protocol_id: u16,
    /// Inner message
    pub message: ModbusMessage,
}

impl IpFrame {
    /// Encode with the MBAP header: transaction id, protocol id, length
    /// (bytes after the length field)
    pub fn encode(&self) -> Vec<u8> {
        let body = self.message.encode();

        let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + body.len());
        frame.extend_from_slice(&self.transaction_id.to_be_bytes());
        frame.extend_from_slice(&self.protocol_id.to_be_bytes());
        frame.extend_from_slice(&(body.len() as u16).to_be_bytes());
        frame.extend_from_slice(&body);
        frame
    }

    /// Decode a complete MBAP frame
    pub fn decode(data: &[u8], reply: bool) -> Result<Self> {
        if data.len() < MBAP_HEADER_LEN + 2 {
            return Err(ModbusError::protocol(format!(
                "IP frame too short: {} bytes",
                data.len()
            )));
        }

        let transaction_id = u16::from_be_bytes([data[0], data[1]]);
        let protocol_id = u16::from_be_bytes([data[2], data[3]]);
        let length = u16::from_be_bytes([data[4], data[5]]) as usize;

        if length < 2 || length > data.len() - MBAP_HEADER_LEN {
            return Err(ModbusError::protocol(format!(
                "invalid MBAP length {length}, {} bytes available",
                data.len() - MBAP_HEADER_LEN
            )));
        }

        let message = ModbusMessage::decode(&data[MBAP_HEADER_LEN..MBAP_HEADER_LEN + length], reply)?;
        Ok(Self {
            transaction_id,
            protocol_id,
            message,
        })
    }

    /// Declared full frame length once at least 6 header bytes are buffered
    pub fn declared_len(buf: &[u8]) -> Option<usize> {
        if buf.len() < MBAP_HEADER_LEN {
            return None;
        }
        Some(MBAP_HEADER_LEN + u16::from_be_bytes([buf[4], buf[5]]) as usize)
    }
}
