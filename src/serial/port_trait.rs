//! Trait abstraction for the node's transceiver so the protocol core can run
//! against real UARTs or a scripted fake

use std::fmt;

use crate::error::Result;

/// Downstream port a child node can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildPort {
    A,
    B,
    C,
    D,
}

impl ChildPort {
    /// Every child port, in the order they are scanned for hellos
    pub const ALL: [ChildPort; 4] = [ChildPort::A, ChildPort::B, ChildPort::C, ChildPort::D];

    /// Zero-based index of the port (A = 0)
    pub fn index(self) -> usize {
        match self {
            ChildPort::A => 0,
            ChildPort::B => 1,
            ChildPort::C => 2,
            ChildPort::D => 3,
        }
    }

    /// Byte advertised in hello responses (ASCII letter of the port)
    pub fn wire_code(self) -> u8 {
        b'A' + self.index() as u8
    }
}

/// Logical port of the transceiver
///
/// The upstream port faces the master and is shared with the local actuator;
/// child ports face downstream neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    Upstream,
    Child(ChildPort),
}

impl Port {
    /// Every port, upstream first
    pub const ALL: [Port; 5] = [
        Port::Upstream,
        Port::Child(ChildPort::A),
        Port::Child(ChildPort::B),
        Port::Child(ChildPort::C),
        Port::Child(ChildPort::D),
    ];

    /// Zero-based index of the port (upstream = 0)
    pub fn index(self) -> usize {
        match self {
            Port::Upstream => 0,
            Port::Child(child) => 1 + child.index(),
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Upstream => write!(f, "upstream port"),
            Port::Child(child) => write!(f, "child port {:?}", child),
        }
    }
}

/// Receiver or transmitter bound to a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Link {
    Receiver(Port),
    Transmitter(Port),
}

impl Link {
    pub fn port(self) -> Port {
        match self {
            Link::Receiver(port) | Link::Transmitter(port) => port,
        }
    }
}

/// UART parity setting used when starting a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Byte-level access to the node's receivers and transmitters
///
/// All operations run on the main execution context. `read_char` never
/// blocks; `get_char` blocks until a byte arrives or reports
/// [`NodeError::Starved`](crate::error::NodeError::Starved) when the line
/// goes quiet mid-frame.
pub trait Transceiver {
    /// Start a receiver or transmitter
    fn start(&mut self, link: Link, parity: Parity) -> Result<()>;

    /// Stop a receiver or transmitter (stopping an idle link is harmless)
    ///
    /// A stopped receiver discards whatever it had not yet handed out, so no
    /// byte survives into the next role.
    fn stop(&mut self, link: Link) -> Result<()>;

    /// Queue one byte on a started transmitter
    fn put_char(&mut self, port: Port, byte: u8) -> Result<()>;

    /// Take the next received byte if one is available
    fn read_char(&mut self, port: Port) -> Result<Option<u8>>;

    /// Take the next received byte, waiting for it
    fn get_char(&mut self, port: Port) -> Result<u8>;

    /// Whether everything queued on the port's transmitter has left the wire
    fn is_transmit_complete(&mut self, port: Port) -> Result<bool>;

    /// Queue a whole frame on a started transmitter
    fn put_all(&mut self, port: Port, bytes: &[u8]) -> Result<()> {
        for &byte in bytes {
            self.put_char(port, byte)?;
        }
        Ok(())
    }
}
