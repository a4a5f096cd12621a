//! RTU engine: CRC-framed messages over serial or stream/datagram links
//!
//! RTU frames carry no length field, so serial reassembly reads a first
//! chunk with the full timeout and then keeps reading with a short
//! inter-byte timeout until the line goes quiet. Over TCP/UDP the same
//! loop applies; the first chunk usually carries the whole frame.

use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{ModbusError, Result};
use crate::frame::{decode_rtu, encode_rtu, RTU_MIN_LEN};
use crate::master::{ModbusMaster, BUFFER_SIZE, DEFAULT_TIMEOUT};
use crate::message::ModbusMessage;
use crate::transport::{ByteTransport, TcpTransport, UdpTransport};

/// Inter-byte gap marking the end of a frame
const DEFAULT_BYTE_TIMEOUT: Duration = Duration::from_millis(20);
/// Pause between writing a request and polling for the reply
const DEFAULT_SEND_DELAY: Duration = Duration::from_millis(10);

/// Modbus master speaking RTU framing
pub struct ModbusRtu {
    transport: Box<dyn ByteTransport>,
    timeout: Duration,
    byte_timeout: Duration,
    send_delay: Duration,
    validate_response: bool,
}

impl ModbusRtu {
    /// Wrap an already-built transport
    pub fn new(transport: Box<dyn ByteTransport>) -> Self {
        Self {
            transport,
            timeout: DEFAULT_TIMEOUT,
            byte_timeout: DEFAULT_BYTE_TIMEOUT,
            send_delay: DEFAULT_SEND_DELAY,
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

    /// RTU framing carried over a TCP stream
    pub fn over_tcp(server: impl Into<String>) -> Self {
        let mut rtu = Self::new(Box::new(TcpTransport::new(server)));
        rtu.send_delay = Duration::ZERO;
        rtu
    }

    /// RTU framing carried over a UDP socket
    pub fn over_udp(server: impl Into<String>) -> Self {
        let mut rtu = Self::new(Box::new(UdpTransport::new(server)));
        rtu.send_delay = Duration::ZERO;
        rtu
    }

    /// Override the exchange timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the inter-byte gap timeout
    pub fn with_byte_timeout(mut self, byte_timeout: Duration) -> Self {
        self.byte_timeout = byte_timeout;
        self
    }

    /// Toggle read-reply length validation
    pub fn with_validate_response(mut self, validate: bool) -> Self {
        self.validate_response = validate;
        self
    }

    /// Accumulate reply bytes until a quiet gap follows a plausible frame
    fn receive_frame(&mut self, deadline: Instant) -> Result<Option<Vec<u8>>> {
        let mut buf: Vec<u8> = Vec::with_capacity(BUFFER_SIZE);
        let mut chunk = [0u8; BUFFER_SIZE];

        loop {
            let remain = match deadline.checked_duration_since(Instant::now()) {
                Some(remain) if !remain.is_zero() => remain,
                _ => return Ok(if buf.len() >= RTU_MIN_LEN { Some(buf) } else { None }),
            };

            // Long wait for the first byte, short inter-byte wait after
            let wait = if buf.is_empty() {
                remain
            } else {
                self.byte_timeout.min(remain)
            };

            match self.transport.receive(&mut chunk, wait) {
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.is_timeout() => {
                    if buf.len() >= RTU_MIN_LEN {
                        return Ok(Some(buf));
                    }
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    // Partial header, keep waiting until the deadline
                },
                Err(e) => return Err(e),
            }
        }
    }
}

impl ModbusMaster for ModbusRtu {
    fn send_command(&mut self, request: ModbusMessage) -> Result<Option<ModbusMessage>> {
        self.transport.open()?;
        self.transport.discard_input()?;

        let frame = encode_rtu(&request);
        debug!("=> {}", hex::encode(&frame));
        self.transport.send(&frame)?;

        if !self.send_delay.is_zero() {
            thread::sleep(self.send_delay);
        }

        let deadline = Instant::now() + self.timeout;
        let buf = match self.receive_frame(deadline)? {
            Some(buf) => buf,
            None => {
                debug!("exchange timed out");
                return Ok(None);
            },
        };

        debug!("<= {}", hex::encode(&buf));
        let reply = decode_rtu(&buf, true)?;

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
