//! Transaction engines: one blocking request/response exchange at a time
//!
//! `ModbusMaster` carries the typed read/write operations shared by every
//! wire variant; each engine (`ModbusIp`, `ModbusRtu`, `ModbusAscii`)
//! implements `send_command` with its own framing and reassembly.
//!
//! A timeout is not an error: `send_command` and the wrappers return
//! `Ok(None)` so polling callers treat it as a transient miss. Slave
//! exceptions surface as `ModbusError::Exception`.

mod ascii;
mod ip;
mod rtu;

pub use ascii::ModbusAscii;
pub use ip::ModbusIp;
pub use rtu::ModbusRtu;

use std::time::Duration;

use crate::error::{ModbusError, Result};
use crate::message::{FunctionCode, ModbusMessage};

/// Default exchange timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);
/// Receive chunk size; a Modbus ADU never exceeds 256 bytes
pub const BUFFER_SIZE: usize = 256;

/// Typed Modbus master operations over an abstract exchange
pub trait ModbusMaster: Send {
    /// Send one request and block for its reply
    ///
    /// Returns `Ok(None)` on timeout or an unmatched response,
    /// `Err(ModbusError::Exception)` when the slave flags an error.
    fn send_command(&mut self, request: ModbusMessage) -> Result<Option<ModbusMessage>>;

    /// Whether read replies have their declared byte count checked
    fn validate_response(&self) -> bool {
        true
    }

    /// Close the underlying transport
    fn close(&mut self);

    /// Read `count` units starting at `address`, dispatching on the
    /// function code; unsupported codes fail fast
    fn read(
        &mut self,
        code: FunctionCode,
        station: u8,
        address: u16,
        count: u16,
    ) -> Result<Option<Vec<u8>>> {
        if !code.is_read() {
            return Err(ModbusError::unsupported(format!("read with {code}")));
        }

        let mut request = ModbusMessage::request(station, code);
        request.set_request(address, count);

        let reply = match self.send_command(request)? {
            Some(reply) => reply,
            None => return Ok(None),
        };
        Ok(unwrap_read_reply(&reply, self.validate_response()))
    }

    /// Read coils (0x01); count is in bits, reply is bit-packed
    fn read_coil(&mut self, station: u8, address: u16, count: u16) -> Result<Option<Vec<u8>>> {
        self.read(FunctionCode::ReadCoil, station, address, count)
    }

    /// Read discrete inputs (0x02); count is in bits, reply is bit-packed
    fn read_discrete(&mut self, station: u8, address: u16, count: u16) -> Result<Option<Vec<u8>>> {
        self.read(FunctionCode::ReadDiscrete, station, address, count)
    }

    /// Read holding registers (0x03)
    fn read_register(&mut self, station: u8, address: u16, count: u16) -> Result<Option<Vec<u8>>> {
        self.read(FunctionCode::ReadRegister, station, address, count)
    }

    /// Read input registers (0x04)
    fn read_input(&mut self, station: u8, address: u16, count: u16) -> Result<Option<Vec<u8>>> {
        self.read(FunctionCode::ReadInput, station, address, count)
    }

    /// Write `values` starting at `address`, dispatching on the function
    /// code; unsupported codes fail fast
    fn write(
        &mut self,
        code: FunctionCode,
        station: u8,
        address: u16,
        values: &[u16],
    ) -> Result<Option<u16>> {
        let single = || {
            values.first().copied().ok_or_else(|| {
                ModbusError::conversion("write requires at least one value")
            })
        };

        match code {
            FunctionCode::WriteCoil => self.write_coil(station, address, single()?),
            FunctionCode::WriteRegister => self.write_register(station, address, single()?),
            FunctionCode::WriteCoils => self.write_coils(station, address, values),
            FunctionCode::WriteRegisters => self.write_registers(station, address, values),
            other => Err(ModbusError::unsupported(format!("write with {other}"))),
        }
    }

    /// Write a single coil (0x05); `value` is 0xFF00 for on, 0x0000 for off
    fn write_coil(&mut self, station: u8, address: u16, value: u16) -> Result<Option<u16>> {
        let mut request = ModbusMessage::request(station, FunctionCode::WriteCoil);
        request.set_request(address, value);

        let reply = self.send_command(request)?;
        Ok(reply.as_ref().and_then(unwrap_write_reply))
    }

    /// Write a single holding register (0x06)
    fn write_register(&mut self, station: u8, address: u16, value: u16) -> Result<Option<u16>> {
        let mut request = ModbusMessage::request(station, FunctionCode::WriteRegister);
        request.set_request(address, value);

        let reply = self.send_command(request)?;
        Ok(reply.as_ref().and_then(unwrap_write_reply))
    }

    /// Write multiple coils (0x0F); each value is one bit, non-zero = on
    fn write_coils(&mut self, station: u8, address: u16, values: &[u16]) -> Result<Option<u16>> {
        let count = values.len() as u16;
        let packed = pack_coils(values);

        let mut body = Vec::with_capacity(3 + packed.len());
        body.extend_from_slice(&count.to_be_bytes());
        body.push(packed.len() as u8);
        body.extend_from_slice(&packed);

        let mut request = ModbusMessage::request(station, FunctionCode::WriteCoils);
        request.set_request_bytes(address, &body);

        let reply = self.send_command(request)?;
        Ok(reply.as_ref().and_then(unwrap_write_reply))
    }

    /// Write multiple holding registers (0x10)
    fn write_registers(&mut self, station: u8, address: u16, values: &[u16]) -> Result<Option<u16>> {
        let count = values.len() as u16;
        let packed = pack_registers(values);

        let mut body = Vec::with_capacity(3 + packed.len());
        body.extend_from_slice(&count.to_be_bytes());
        body.push(packed.len() as u8);
        body.extend_from_slice(&packed);

        let mut request = ModbusMessage::request(station, FunctionCode::WriteRegisters);
        request.set_request_bytes(address, &body);

        let reply = self.send_command(request)?;
        Ok(reply.as_ref().and_then(unwrap_write_reply))
    }
}

/// Strip the byte-count prefix from a read reply
///
/// When `validate` is on, a declared count larger than the remaining
/// bytes yields no data.
fn unwrap_read_reply(reply: &ModbusMessage, validate: bool) -> Option<Vec<u8>> {
    let (len, rest) = reply.payload.split_first()?;
    if validate && *len as usize > rest.len() {
        return None;
    }
    Some(rest.to_vec())
}

/// Strip the echoed address from a write reply, returning the echoed
/// value (single write) or count (multi write)
fn unwrap_write_reply(reply: &ModbusMessage) -> Option<u16> {
    if reply.payload.len() < 4 {
        return None;
    }
    Some(u16::from_be_bytes([reply.payload[2], reply.payload[3]]))
}

/// Pack coil values 8 per byte, first coil in bit 0
fn pack_coils(values: &[u16]) -> Vec<u8> {
    let mut packed = vec![0u8; values.len().div_ceil(8)];
    for (i, &value) in values.iter().enumerate() {
        if value != 0 {
            packed[i >> 3] |= 1 << (i & 7);
        }
    }
    packed
}

/// Pack register words as big-endian byte pairs
fn pack_registers(values: &[u16]) -> Vec<u8> {
    let mut packed = Vec::with_capacity(values.len() * 2);
    for &value in values {
        packed.extend_from_slice(&value.to_be_bytes());
    }
    packed
}
