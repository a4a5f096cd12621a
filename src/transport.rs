//! Byte transport abstraction and the concrete TCP/UDP/serial transports
//!
//! A transport moves opaque bytes; framing and reassembly live in the
//! master engines. Every receive is a blocking single-chunk read bounded
//! by the timeout passed per call, so the engines can use a long timeout
//! for the first chunk of a frame and a short inter-byte timeout for the
//! rest.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::info;

use crate::error::{ModbusError, Result};

/// Default Modbus port for the IP transports
pub const DEFAULT_PORT: u16 = 502;

/// Blocking byte transport consumed by the master engines
pub trait ByteTransport: Send {
    /// Open the underlying channel; idempotent when already open
    fn open(&mut self) -> Result<()>;

    /// Write a full frame
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Read one chunk into `buf`, blocking up to `timeout`
    ///
    /// Expiry surfaces as `ModbusError::Timeout`.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Drop any bytes already buffered from a previous exchange
    fn discard_input(&mut self) -> Result<()> {
        Ok(())
    }

    /// Close the underlying channel
    fn close(&mut self);
}

/// Append the default port when the server string omits one
fn with_default_port(server: &str) -> String {
    if server.contains(':') {
        server.to_string()
    } else {
        format!("{server}:{DEFAULT_PORT}")
    }
}

/// TCP stream transport
pub struct TcpTransport {
    server: String,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: with_default_port(&server.into()),
            stream: None,
        }
    }
}

impl ByteTransport for TcpTransport {
    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let addr = self
            .server
            .to_socket_addrs()
            .map_err(|e| ModbusError::connection(format!("resolve {}: {e}", self.server)))?
            .next()
            .ok_or_else(|| ModbusError::connection(format!("no address for {}", self.server)))?;

        let stream = TcpStream::connect(addr)
            .map_err(|e| ModbusError::connection(format!("connect {}: {e}", self.server)))?;
        stream.set_nodelay(true)?;

        info!("TCP transport connected to {}", self.server);
        self.stream = Some(stream);
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(ModbusError::NotConnected)?;
        stream.write_all(data)?;
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(ModbusError::NotConnected)?;
        stream.set_read_timeout(Some(timeout))?;

        let n = stream.read(buf)?;
        if n == 0 {
            self.stream = None;
            return Err(ModbusError::connection("peer closed the connection"));
        }
        Ok(n)
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            info!("TCP transport to {} closed", self.server);
        }
    }
}

/// Connected UDP socket transport
pub struct UdpTransport {
    server: String,
    socket: Option<UdpSocket>,
}

impl UdpTransport {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: with_default_port(&server.into()),
            socket: None,
        }
    }
}

impl ByteTransport for UdpTransport {
    fn open(&mut self) -> Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }

        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| ModbusError::connection(format!("bind UDP socket: {e}")))?;
        socket
            .connect(&self.server)
            .map_err(|e| ModbusError::connection(format!("connect {}: {e}", self.server)))?;

        info!("UDP transport bound for {}", self.server);
        self.socket = Some(socket);
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        let socket = self.socket.as_ref().ok_or(ModbusError::NotConnected)?;
        socket.send(data)?;
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let socket = self.socket.as_ref().ok_or(ModbusError::NotConnected)?;
        socket.set_read_timeout(Some(timeout))?;
        Ok(socket.recv(buf)?)
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            info!("UDP transport for {} closed", self.server);
        }
    }
}

/// Serial port transport
#[cfg(feature = "serial")]
pub struct SerialTransport {
    port_name: String,
    baudrate: u32,
    port: Option<Box<dyn serialport::SerialPort>>,
}

#[cfg(feature = "serial")]
impl SerialTransport {
    pub fn new(port_name: impl Into<String>, baudrate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baudrate,
            port: None,
        }
    }
}

#[cfg(feature = "serial")]
impl ByteTransport for SerialTransport {
    fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }

        let port = serialport::new(&self.port_name, self.baudrate)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| {
                ModbusError::connection(format!("open serial port {}: {e}", self.port_name))
            })?;

        info!(
            "serial transport opened on {} at {} baud",
            self.port_name, self.baudrate
        );
        self.port = Some(port);
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(ModbusError::NotConnected)?;
        port.write_all(data)?;
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(ModbusError::NotConnected)?;
        port.set_timeout(timeout)
            .map_err(|e| ModbusError::Io(e.to_string()))?;
        Ok(port.read(buf)?)
    }

    fn discard_input(&mut self) -> Result<()> {
        let port = self.port.as_mut().ok_or(ModbusError::NotConnected)?;
        port.clear(serialport::ClearBuffer::Input)
            .map_err(|e| ModbusError::Io(e.to_string()))?;
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("serial transport on {} closed", self.port_name);
        }
    }
}
