//! # Serial Transceiver Module
//!
//! Host backend for the node's five UARTs.
//!
//! This module handles:
//! - Opening the upstream port (required) and any configured child ports
//! - Starting and stopping receivers and transmitters per role
//! - Non-blocking and blocking single-byte reads
//! - Buffered frame writes flushed on transmit completion

pub mod port_trait;

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use tokio_serial::{ClearBuffer, DataBits, FlowControl, SerialPort, StopBits};
use tracing::{debug, info, warn};

use crate::config::SerialConfig;
use crate::error::{NodeError, Result};
use port_trait::{ChildPort, Link, Parity, Port, Transceiver};

/// One opened UART and the state of its two links
struct Uart {
    path: String,
    handle: Box<dyn SerialPort>,
    receiving: bool,
    transmitting: bool,
    pending: Vec<u8>,
}

/// Transceiver over real serial devices
///
/// Child ports without a configured device behave as permanently idle lines:
/// nothing is ever received on them and bytes sent to them are dropped.
pub struct SerialTransceiver {
    uarts: [Option<Uart>; 5],
}

impl std::fmt::Debug for SerialTransceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let paths: Vec<Option<&str>> = self
            .uarts
            .iter()
            .map(|uart| uart.as_ref().map(|uart| uart.path.as_str()))
            .collect();
        f.debug_struct("SerialTransceiver")
            .field("devices", &paths)
            .finish_non_exhaustive()
    }
}

impl SerialTransceiver {
    /// Open every configured serial device
    ///
    /// # Arguments
    ///
    /// * `config` - Serial section of the node configuration
    ///
    /// # Returns
    ///
    /// * `Result<SerialTransceiver>` - Transceiver with the upstream port open
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` if the upstream device cannot be opened.
    /// Child devices that fail to open are logged and left idle.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use revolute_node::config::Config;
    /// use revolute_node::serial::SerialTransceiver;
    ///
    /// let config = Config::default();
    /// let transceiver = SerialTransceiver::open(&config.serial)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.byte_timeout_ms);

        let upstream = Self::open_port(&config.upstream, config.baud_rate, timeout).map_err(|e| {
            warn!("{}", e);
            NodeError::SerialPortNotFound(config.upstream.clone())
        })?;
        info!("Upstream port opened at {}", config.upstream);

        let mut uarts: [Option<Uart>; 5] = Default::default();
        uarts[Port::Upstream.index()] = Some(Uart::new(&config.upstream, upstream));

        for (child, path) in ChildPort::ALL.into_iter().zip(config.child_paths()) {
            let Some(path) = path else {
                debug!("No device configured for child port {:?}", child);
                continue;
            };
            match Self::open_port(path, config.baud_rate, timeout) {
                Ok(handle) => {
                    info!("Child port {:?} opened at {}", child, path);
                    uarts[Port::Child(child).index()] = Some(Uart::new(path, handle));
                }
                Err(e) => warn!("Child port {:?} left idle: {}", child, e),
            }
        }

        Ok(Self { uarts })
    }

    /// Open a specific serial port with the node's line settings (8N1)
    fn open_port(path: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialPort>> {
        tokio_serial::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| NodeError::Serial(format!("Failed to open {}: {}", path, e)))
    }

    fn uart(&mut self, port: Port) -> Option<&mut Uart> {
        self.uarts[port.index()].as_mut()
    }
}

impl Uart {
    fn new(path: &str, handle: Box<dyn SerialPort>) -> Self {
        Self {
            path: path.to_string(),
            handle,
            receiving: false,
            transmitting: false,
            pending: Vec::new(),
        }
    }

    fn serial_error(&self, action: &str, e: impl std::fmt::Display) -> NodeError {
        NodeError::Serial(format!("Failed to {} on {}: {}", action, self.path, e))
    }
}

fn line_parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
    }
}

impl Transceiver for SerialTransceiver {
    fn start(&mut self, link: Link, parity: Parity) -> Result<()> {
        let Some(uart) = self.uart(link.port()) else {
            return Ok(());
        };

        uart.handle
            .set_parity(line_parity(parity))
            .map_err(|e| uart.serial_error("set parity", e))?;

        match link {
            Link::Receiver(_) => uart.receiving = true,
            Link::Transmitter(_) => {
                // Input heard before we talk is stale
                uart.handle
                    .clear(ClearBuffer::Input)
                    .map_err(|e| uart.serial_error("clear input", e))?;
                uart.pending.clear();
                uart.transmitting = true;
            }
        }
        Ok(())
    }

    fn stop(&mut self, link: Link) -> Result<()> {
        if let Some(uart) = self.uart(link.port()) {
            match link {
                Link::Receiver(_) => {
                    // Unread input belongs to the role being torn down
                    uart.handle
                        .clear(ClearBuffer::Input)
                        .map_err(|e| uart.serial_error("clear input", e))?;
                    uart.receiving = false;
                }
                Link::Transmitter(_) => {
                    uart.transmitting = false;
                    uart.pending.clear();
                }
            }
        }
        Ok(())
    }

    fn put_char(&mut self, port: Port, byte: u8) -> Result<()> {
        let Some(uart) = self.uart(port) else {
            return Ok(());
        };
        if !uart.transmitting {
            return Err(NodeError::Serial(format!("Transmitter on {} not started", port)));
        }
        uart.pending.push(byte);
        Ok(())
    }

    fn read_char(&mut self, port: Port) -> Result<Option<u8>> {
        let Some(uart) = self.uart(port) else {
            return Ok(None);
        };
        if !uart.receiving {
            return Ok(None);
        }

        let waiting = uart
            .handle
            .bytes_to_read()
            .map_err(|e| uart.serial_error("poll", e))?;
        if waiting == 0 {
            return Ok(None);
        }

        let mut byte = [0u8; 1];
        uart.handle.read_exact(&mut byte)?;
        Ok(Some(byte[0]))
    }

    fn get_char(&mut self, port: Port) -> Result<u8> {
        let Some(uart) = self.uart(port) else {
            return Err(NodeError::Starved(port));
        };
        if !uart.receiving {
            return Err(NodeError::Starved(port));
        }

        let mut byte = [0u8; 1];
        match uart.handle.read_exact(&mut byte) {
            Ok(()) => Ok(byte[0]),
            Err(e) if e.kind() == ErrorKind::TimedOut => Err(NodeError::Starved(port)),
            Err(e) => Err(e.into()),
        }
    }

    fn is_transmit_complete(&mut self, port: Port) -> Result<bool> {
        let Some(uart) = self.uart(port) else {
            return Ok(true);
        };
        if uart.pending.is_empty() {
            return Ok(true);
        }

        let frame = std::mem::take(&mut uart.pending);
        uart.handle.write_all(&frame)?;
        uart.handle.flush()?;
        debug!("Sent {} bytes on {}", frame.len(), port);
        Ok(true)
    }
}
