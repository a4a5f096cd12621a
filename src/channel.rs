//! Shared channel handle and the point-level node operations
//!
//! One physical channel (a serial port or socket) serves every node that
//! targets the same endpoint. The handle is reference counted; clones
//! share the engine behind a mutex so concurrent callers serialize their
//! full send/receive exchanges, and the last handle dropped closes the
//! transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::error::{ModbusError, Result};
use crate::master::ModbusMaster;
use crate::message::FunctionCode;
use crate::point::{ModbusAddress, ModbusPoint};
use crate::segment::{build_segments, dispatch, BatchPolicy};
use crate::value::{to_registers, DataType, TypeResolver};

struct ChannelInner {
    master: Mutex<Box<dyn ModbusMaster>>,
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        match self.master.get_mut() {
            Ok(master) => master.close(),
            Err(poisoned) => poisoned.into_inner().close(),
        }
    }
}

/// Reference-counted handle over one mutex-guarded engine
#[derive(Clone)]
pub struct ModbusChannel {
    inner: Arc<ChannelInner>,
}

impl ModbusChannel {
    pub fn new(master: Box<dyn ModbusMaster>) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                master: Mutex::new(master),
            }),
        }
    }

    /// Number of live handles sharing this channel
    pub fn opens(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Lock the engine for one or more exchanges
    pub fn lock(&self) -> Result<MutexGuard<'_, Box<dyn ModbusMaster>>> {
        self.inner
            .master
            .lock()
            .map_err(|_| ModbusError::connection("channel mutex poisoned"))
    }
}

/// One logical slave device on a shared channel
#[derive(Clone)]
pub struct ModbusNode {
    /// Slave station id
    pub station: u8,
    /// Default read code for addresses without a region
    pub read_code: FunctionCode,
    /// Default write code for addresses without a region
    pub write_code: FunctionCode,
    policy: BatchPolicy,
    delay: Duration,
    channel: ModbusChannel,
}

impl ModbusNode {
    pub fn new(channel: ModbusChannel, station: u8) -> Self {
        Self {
            station,
            read_code: FunctionCode::ReadRegister,
            write_code: FunctionCode::WriteRegister,
            policy: BatchPolicy::default(),
            delay: Duration::ZERO,
            channel,
        }
    }

    /// Override the default read/write function codes
    pub fn with_codes(mut self, read_code: FunctionCode, write_code: FunctionCode) -> Self {
        self.read_code = read_code;
        self.write_code = write_code;
        self
    }

    /// Override the segment batch policy
    pub fn with_policy(mut self, policy: BatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Pause between consecutive segment reads, held under the channel
    /// lock so slow slaves are never hit back-to-back
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Channel handle backing this node
    pub fn channel(&self) -> &ModbusChannel {
        &self.channel
    }

    /// Batched read of named points
    ///
    /// Segments are read one by one; a failed segment is logged and
    /// skipped, so the result map may be partial but never poisoned by a
    /// single bad span.
    pub fn read_points(&self, points: &[ModbusPoint]) -> Result<HashMap<String, Vec<u8>>> {
        let mut segments = build_segments(points, self.read_code, &self.policy);

        {
            let mut master = self.channel.lock()?;
            for (i, seg) in segments.iter_mut().enumerate() {
                if i > 0 && !self.delay.is_zero() {
                    thread::sleep(self.delay);
                }

                match master.read(seg.code, self.station, seg.address, seg.count) {
                    Ok(Some(data)) => seg.data = Some(data),
                    Ok(None) => {
                        warn!(
                            "segment {}+{} ({}): no response",
                            seg.address, seg.count, seg.code
                        );
                    },
                    Err(e) => {
                        warn!(
                            "segment {}+{} ({}): read failed: {e}",
                            seg.address, seg.count, seg.code
                        );
                    },
                }
            }
        }

        dispatch(points, self.read_code, &segments)
    }

    /// Write one point
    ///
    /// The data type comes from the point declaration, then the resolver,
    /// then a default chosen by the write code. Unlike reads, failures
    /// are returned: a write's outcome must be unambiguous.
    pub fn write_point(
        &self,
        point: &ModbusPoint,
        value: &Value,
        resolver: Option<&dyn TypeResolver>,
    ) -> Result<()> {
        let address = ModbusAddress::parse(&point.address)?;
        let code = match address.range {
            Some(range) => range.write_code().ok_or_else(|| {
                ModbusError::unsupported(format!(
                    "point {} is in a read-only range",
                    point.name
                ))
            })?,
            None => self.write_code,
        };

        let data_type = match point.data_type.as_deref() {
            Some(tag) => DataType::parse(tag).ok_or_else(|| {
                ModbusError::conversion(format!("unknown data type {tag:?} on {}", point.name))
            })?,
            None => resolver
                .and_then(|r| r.resolve(&point.name))
                .unwrap_or(if code.is_bit() {
                    DataType::Bit
                } else {
                    DataType::UInt16
                }),
        };

        let words = to_registers(value, data_type)?;

        let mut master = self.channel.lock()?;
        let echoed = match code {
            FunctionCode::WriteCoil if words.len() == 1 => {
                master.write_coil(self.station, address.address, words[0])?
            },
            FunctionCode::WriteCoil | FunctionCode::WriteCoils => {
                master.write_coils(self.station, address.address, &words)?
            },
            FunctionCode::WriteRegister if words.len() == 1 => {
                master.write_register(self.station, address.address, words[0])?
            },
            FunctionCode::WriteRegister | FunctionCode::WriteRegisters => {
                master.write_registers(self.station, address.address, &words)?
            },
            other => return Err(ModbusError::unsupported(format!("write with {other}"))),
        };

        match echoed {
            Some(_) => Ok(()),
            None => Err(ModbusError::timeout(format!(
                "write to {} was not acknowledged",
                point.name
            ))),
        }
    }
}
