//! MBAP engine for the TCP and UDP transports
//!
//! Replies are length-prefixed, so reassembly accumulates chunks until the
//! declared frame length is met. Transaction ids reconcile replies with
//! the outstanding request: a stale lower id is discarded and reading
//! continues; a higher id fails the exchange.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{ModbusError, Result};
use crate::frame::IpFrame;
use crate::master::{ModbusMaster, BUFFER_SIZE, DEFAULT_TIMEOUT};
use crate::message::ModbusMessage;
use crate::transport::{ByteTransport, TcpTransport, UdpTransport};

/// Modbus master over TCP or UDP with MBAP framing
pub struct ModbusIp {
    transport: Box<dyn ByteTransport>,
    timeout: Duration,
    protocol_id: u16,
    validate_response: bool,
    next_transaction_id: u16,
}

impl ModbusIp {
    /// Wrap an already-built transport
    pub fn new(transport: Box<dyn ByteTransport>) -> Self {
        Self {
            transport,
            timeout: DEFAULT_TIMEOUT,
            protocol_id: 0,
            validate_response: true,
            next_transaction_id: 1,
        }
    }

    /// Master over a TCP stream, e.g. `"192.168.1.10:502"`
    pub fn tcp(server: impl Into<String>) -> Self {
        Self::new(Box::new(TcpTransport::new(server)))
    }

    /// Master over a connected UDP socket
    pub fn udp(server: impl Into<String>) -> Self {
        Self::new(Box::new(UdpTransport::new(server)))
    }

    /// Override the exchange timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the MBAP protocol id (0 for standard Modbus)
    pub fn with_protocol_id(mut self, protocol_id: u16) -> Self {
        self.protocol_id = protocol_id;
        self
    }

    /// Toggle read-reply length validation
    pub fn with_validate_response(mut self, validate: bool) -> Self {
        self.validate_response = validate;
        self
    }

    fn take_transaction_id(&mut self) -> u16 {
        let id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        id
    }
}

impl ModbusMaster for ModbusIp {
    fn send_command(&mut self, request: ModbusMessage) -> Result<Option<ModbusMessage>> {
        self.transport.open()?;

        let transaction_id = self.take_transaction_id();
        let frame = IpFrame {
            transaction_id,
            protocol_id: self.protocol_id,
            message: request,
        }
        .encode();

        debug!("=> {}", hex::encode(&frame));
        self.transport.send(&frame)?;

        let deadline = Instant::now() + self.timeout;
        let mut buf: Vec<u8> = Vec::with_capacity(BUFFER_SIZE);
        let mut chunk = [0u8; BUFFER_SIZE];

        loop {
            // Accumulate until the declared frame length is buffered
            let total = loop {
                if let Some(total) = IpFrame::declared_len(&buf) {
                    if buf.len() >= total {
                        break total;
                    }
                }

                let remain = match deadline.checked_duration_since(Instant::now()) {
                    Some(remain) if !remain.is_zero() => remain,
                    _ => {
                        debug!("exchange timed out, transaction {transaction_id}");
                        return Ok(None);
                    },
                };

                match self.transport.receive(&mut chunk, remain) {
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    Err(e) if e.is_timeout() => {
                        debug!("exchange timed out, transaction {transaction_id}");
                        return Ok(None);
                    },
                    Err(e) => return Err(e),
                }
            };

            debug!("<= {}", hex::encode(&buf[..total]));
            let reply = IpFrame::decode(&buf[..total], true)?;
            buf.drain(..total);

            if reply.transaction_id != transaction_id {
                warn!(
                    "transaction id mismatch: expected {}, got {}",
                    transaction_id, reply.transaction_id
                );
                // A lower id is a leftover from a previous exchange
                if reply.transaction_id < transaction_id {
                    continue;
                }
                return Ok(None);
            }

            if let Some(code) = reply.message.error {
                return Err(ModbusError::Exception(code));
            }
            return Ok(Some(reply.message));
        }
    }

    fn validate_response(&self) -> bool {
        self.validate_response
    }

    fn close(&mut self) {
        self.transport.close();
    }
}
