//! ASCII engine: hex-text frames delimited by `:` and CRLF
//!
//! Frame boundaries are textual, so reassembly accumulates bytes until the
//! CRLF terminator shows up within the timeout window.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{ModbusError, Result};
use crate::frame::{decode_ascii, encode_ascii};
use crate::master::{ModbusMaster, BUFFER_SIZE, DEFAULT_TIMEOUT};
use crate::message::ModbusMessage;
use crate::transport::{ByteTransport, TcpTransport};

/// Modbus master speaking ASCII framing
pub struct ModbusAscii {
    transport: Box<dyn ByteTransport>,
    timeout: Duration,
    validate_response: bool,
}

impl ModbusAscii {
    /// Wrap an already-built transport
    pub fn new(transport: Box<dyn ByteTransport>) -> Self {
        Self {
            transport,
            timeout: DEFAULT_TIMEOUT,
            validate_response: true,
        }
    }

    /// Master on a serial port
    #[cfg(feature = "serial")]
    pub fn serial(port_name: impl Into<String>, baudrate: u32) -> Self {
        Self::new(Box::new(crate::transport::SerialTransport::new(
            port_name, baudrate,
        )))
    }

    /// ASCII framing carried over a TCP stream
    pub fn over_tcp(server: impl Into<String>) -> Self {
        Self::new(Box::new(TcpTransport::new(server)))
    }

    /// Override the exchange timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Toggle read-reply length validation
    pub fn with_validate_response(mut self, validate: bool) -> Self {
        self.validate_response = validate;
        self
    }
}

impl ModbusMaster for ModbusAscii {
    fn send_command(&mut self, request: ModbusMessage) -> Result<Option<ModbusMessage>> {
        self.transport.open()?;
        self.transport.discard_input()?;

        let frame = encode_ascii(&request);
        debug!("=> {}", String::from_utf8_lossy(&frame).trim_end());
        self.transport.send(&frame)?;

        let deadline = Instant::now() + self.timeout;
        let mut buf: Vec<u8> = Vec::with_capacity(BUFFER_SIZE);
        let mut chunk = [0u8; BUFFER_SIZE];

        // Accumulate until the CRLF terminator arrives
        while !buf.windows(2).any(|w| w == b"\r\n") {
            let remain = match deadline.checked_duration_since(Instant::now()) {
                Some(remain) if !remain.is_zero() => remain,
                _ => {
                    debug!("exchange timed out");
                    return Ok(None);
                },
            };

            match self.transport.receive(&mut chunk, remain) {
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.is_timeout() => {
                    debug!("exchange timed out");
                    return Ok(None);
                },
                Err(e) => return Err(e),
            }
        }

        debug!("<= {}", String::from_utf8_lossy(&buf).trim_end());
        let reply = decode_ascii(&buf, true)?;

        if let Some(code) = reply.error {
            return Err(ModbusError::Exception(code));
        }
        Ok(Some(reply))
    }

    fn validate_response(&self) -> bool {
        self.validate_response
    }

    fn close(&mut self) {
        self.transport.close();
    }
}
