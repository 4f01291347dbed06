//! # Bus Pins and Indicators
//!
//! GPIO capability of a node: which ports are tied onto the shared bus, the
//! presence indicator, and the three-LED diagnostic display.

use std::fmt;

use tracing::{debug, info};

use crate::serial::port_trait::Port;

/// Set of ports connected to the shared bus
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct PortMask(u8);

impl PortMask {
    pub const NONE: PortMask = PortMask(0);
    pub const UPSTREAM: PortMask = PortMask(1);
    pub const ALL: PortMask = PortMask(0b1_1111);

    pub fn contains(self, port: Port) -> bool {
        self.0 & (1 << port.index()) != 0
    }
}

impl fmt::Debug for PortMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(Port::ALL.iter().filter(|port| self.contains(**port)))
            .finish()
    }
}

/// Pin-level control of the node hardware
#[cfg_attr(test, mockall::automock)]
pub trait HardwareBus {
    /// Force every bus pin idle-high and disconnect every port
    fn release(&mut self);

    /// Tie the ports in `mask` onto the shared bus
    fn connect(&mut self, mask: PortMask);

    /// Drive the "configured" indicator
    fn set_presence(&mut self, on: bool);

    /// Show a 3-bit pattern on the diagnostic LEDs (0 blanks them)
    fn show_diagnostic(&mut self, pattern: u8);
}

/// Diagnostic LED pattern for an actuator address
///
/// Only addresses 1 to 6 fit the display; anything else blanks it.
pub fn diagnostic_pattern(actuator_address: Option<u8>) -> u8 {
    match actuator_address {
        Some(address @ 1..=6) => address,
        _ => 0,
    }
}

/// Host stand-in for the node's GPIO: keeps the pin state and logs changes
#[derive(Debug, Default)]
pub struct HostPins {
    connected: PortMask,
    presence: bool,
    diagnostic: u8,
}

impl HostPins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connected(&self) -> PortMask {
        self.connected
    }

    pub fn presence(&self) -> bool {
        self.presence
    }

    pub fn diagnostic(&self) -> u8 {
        self.diagnostic
    }
}

impl HardwareBus for HostPins {
    fn release(&mut self) {
        self.connected = PortMask::NONE;
    }

    fn connect(&mut self, mask: PortMask) {
        debug!("Bus ports connected: {:?}", mask);
        self.connected = mask;
    }

    fn set_presence(&mut self, on: bool) {
        if self.presence != on {
            info!("Presence indicator {}", if on { "on" } else { "off" });
        }
        self.presence = on;
    }

    fn show_diagnostic(&mut self, pattern: u8) {
        if self.diagnostic != pattern {
            info!("Diagnostic display: {:03b}", pattern & 0b111);
        }
        self.diagnostic = pattern;
    }
}
